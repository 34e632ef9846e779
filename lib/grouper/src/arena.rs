//! Append-only node store addressed by integer handles.
//!
//! Storage is a list of fixed-size blocks. When every slot is taken the arena
//! doubles its capacity by appending as many new blocks as it already has, so a
//! node never moves once allocated and a [`NodeId`] stays valid for the life of
//! the arena. Nodes are never freed individually; dropping the arena releases
//! everything at once.

use crate::error::{Error, Result};

/// Stable handle to a slot in an [`Arena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

pub struct Arena<T> {
    blocks: Vec<Vec<T>>,
    block_len: usize,
    len: usize,
}

impl<T> Arena<T> {
    pub fn new(block_len: usize) -> Self {
        Self { blocks: Vec::new(), block_len: block_len.max(1), len: 0 }
    }

    /// Stores `value` and returns its handle. Fails only when growth cannot be satisfied.
    pub fn alloc(&mut self, value: T) -> Result<NodeId> {
        if self.len == self.capacity() {
            self.grow()?;
        }
        let id = u32::try_from(self.len)
            .map_err(|_| Error::Allocation { what: "arena slots (handle space exhausted)", requested: 1 })?;
        let block = self.len / self.block_len;
        self.blocks[block].push(value);
        self.len += 1;
        Ok(NodeId(id))
    }

    pub fn get(&self, id: NodeId) -> &T {
        let i = id.index();
        &self.blocks[i / self.block_len][i % self.block_len]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut T {
        let i = id.index();
        &mut self.blocks[i / self.block_len][i % self.block_len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.blocks.len() * self.block_len
    }

    /// Nodes in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.blocks.iter().flat_map(|b| b.iter())
    }

    pub fn into_iter_nodes(self) -> impl Iterator<Item = T> {
        self.blocks.into_iter().flatten()
    }

    fn grow(&mut self) -> Result<()> {
        let new_blocks = self.blocks.len().max(1);
        self.blocks
            .try_reserve_exact(new_blocks)
            .map_err(|_| Error::Allocation { what: "arena blocks", requested: new_blocks })?;
        for _ in 0..new_blocks {
            let mut block = Vec::new();
            block
                .try_reserve_exact(self.block_len)
                .map_err(|_| Error::Allocation { what: "arena slots", requested: self.block_len })?;
            self.blocks.push(block);
        }
        Ok(())
    }
}
