use crate::key::CountEntry;
use crate::rank::write_report;
use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};

pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    fs::create_dir_all(path.as_ref()).with_context(|| format!("create_dir_all {}", path.as_ref().display()))
}

pub fn open_writer(path: impl AsRef<Path>) -> Result<BufWriter<File>> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    let file = File::create(path.as_ref()).with_context(|| format!("create {}", path.as_ref().display()))?;
    Ok(BufWriter::with_capacity(32 * 1024 * 1024, file))
}

pub fn open_reader(path: impl AsRef<Path>) -> Result<BufReader<File>> {
    let file = File::open(path.as_ref()).with_context(|| format!("open {}", path.as_ref().display()))?;
    Ok(BufReader::new(file))
}

/// Read-only bytes of an input file. Empty files are not mapped.
pub enum InputBuffer {
    Mapped(Mmap),
    Empty,
}

impl Deref for InputBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            InputBuffer::Mapped(map) => &map[..],
            InputBuffer::Empty => &[],
        }
    }
}

pub fn map_input(path: impl AsRef<Path>) -> Result<InputBuffer> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open input {}", path.display()))?;
    let len = file.metadata().with_context(|| format!("stat {}", path.display()))?.len();
    if len == 0 {
        return Ok(InputBuffer::Empty);
    }
    let map = unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", path.display()))?;
    Ok(InputBuffer::Mapped(map))
}

/// Writes the report next to `path` and renames it into place, so a failed run
/// never leaves a partial report behind.
pub fn write_report_file(path: impl AsRef<Path>, ranked: &[CountEntry]) -> Result<()> {
    let path = path.as_ref();
    let tmp = tmp_sibling(path);
    {
        let mut w = open_writer(&tmp)?;
        write_report(&mut w, ranked).with_context(|| format!("write {}", tmp.display()))?;
        w.flush().with_context(|| format!("flush {}", tmp.display()))?;
    }
    fs::rename(&tmp, path).with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".tmp-{}", std::process::id()));
    path.with_file_name(name)
}

/// First line where two reports disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// 1-based line number.
    pub line: usize,
    pub left: Option<String>,
    pub right: Option<String>,
}

/// `None` when both files have identical lines, otherwise the first difference
/// (a missing line on one side counts as a difference).
pub fn compare_reports(left: impl AsRef<Path>, right: impl AsRef<Path>) -> Result<Option<Mismatch>> {
    let mut a = open_reader(left)?.split(b'\n');
    let mut b = open_reader(right)?.split(b'\n');
    let mut line = 0usize;
    loop {
        line += 1;
        let la = a.next().transpose().context("read left report")?;
        let lb = b.next().transpose().context("read right report")?;
        match (la, lb) {
            (None, None) => return Ok(None),
            (x, y) if x == y => continue,
            (x, y) => {
                let show = |v: Option<Vec<u8>>| v.map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
                return Ok(Some(Mismatch { line, left: show(x), right: show(y) }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;

    #[test]
    fn empty_input_maps_to_empty_slice() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("empty.txt");
        fs::write(&p, b"").unwrap();
        assert!(map_input(&p).unwrap().is_empty());
        assert!(map_input(dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn report_file_is_complete_and_has_no_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out.txt");
        let ranked = vec![CountEntry::new(Key::new(b"ab", 33), 3), CountEntry::new(Key::new(b"cd", 33), 2)];
        write_report_file(&out, &ranked).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"2\nab 3\ncd 2\n");
        let names: Vec<_> = fs::read_dir(out.parent().unwrap()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn compare_finds_first_difference() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        let c = dir.path().join("c.txt");
        fs::write(&a, "2\nab 3\ncd 2\n").unwrap();
        fs::write(&b, "2\nab 3\ncd 2\n").unwrap();
        fs::write(&c, "2\nab 3\ncd 1\n").unwrap();
        assert_eq!(compare_reports(&a, &b).unwrap(), None);
        let m = compare_reports(&a, &c).unwrap().unwrap();
        assert_eq!(m.line, 3);
        assert_eq!(m.left.as_deref(), Some("cd 2"));
        assert_eq!(m.right.as_deref(), Some("cd 1"));

        fs::write(&c, "2\nab 3\n").unwrap();
        let m = compare_reports(&a, &c).unwrap().unwrap();
        assert_eq!(m.line, 3);
        assert_eq!(m.right, None);
    }
}
