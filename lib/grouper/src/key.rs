use crate::constants::KEY_CAPACITY;
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// A canonical key: at most `max_key_len - 1` bytes of the raw record, stored inline.
///
/// Bytes past `len` are always zero, so the derived equality and hash agree
/// with byte-wise comparison of [`Key::as_bytes`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    len: u8,
    bytes: [u8; KEY_CAPACITY],
}

impl Key {
    /// Truncates `raw` to `max_key_len - 1` bytes. Overlong input is never an error.
    pub fn new(raw: &[u8], max_key_len: usize) -> Self {
        let keep = raw.len().min(max_key_len.saturating_sub(1)).min(KEY_CAPACITY);
        let mut bytes = [0u8; KEY_CAPACITY];
        bytes[..keep].copy_from_slice(&raw[..keep]);
        Key { len: keep as u8, bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.as_bytes())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_bytes(KeyVisitor)
    }
}

struct KeyVisitor;

impl<'de> Visitor<'de> for KeyVisitor {
    type Value = Key;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a byte string of at most {} bytes", KEY_CAPACITY)
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Key, E> {
        if v.len() > KEY_CAPACITY {
            return Err(E::invalid_length(v.len(), &self));
        }
        Ok(Key::new(v, KEY_CAPACITY + 1))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Key, A::Error> {
        let mut bytes = [0u8; KEY_CAPACITY];
        let mut len = 0usize;
        while let Some(b) = seq.next_element::<u8>()? {
            if len == KEY_CAPACITY {
                return Err(de::Error::invalid_length(len + 1, &self));
            }
            bytes[len] = b;
            len += 1;
        }
        Ok(Key { len: len as u8, bytes })
    }
}

/// One key and the number of times it occurs in the input a collection represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountEntry {
    pub key: Key,
    pub count: u64,
}

impl CountEntry {
    pub fn new(key: Key, count: u64) -> Self {
        Self { key, count }
    }
}
