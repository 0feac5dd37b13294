/// Source locations and the file registry.
///
/// A `Loc` is one `u64` covering a source range:
///
///   | first_line: 20 | first_column: 12 | line_delta: 8 | column_delta: 8 | file_ref: 16 |
///    63            44  43             32  31          24  23            16  15           0
///
/// Construction saturates each field to its maximum representable value;
/// `file_ref = 0xFFFF` and `first_line = 0xFFFFF` mark an invalid location.
///
/// The `SourceMap` interns file paths (canonical form, consecutive slashes
/// collapsed) and lazily loads source text for diagnostic rendering. File
/// references are stable for the process lifetime.
///
/// Persistence writes a `0xF00F`-tagged file table once per write context
/// followed by one `u64` per location; the reader remaps old file refs onto
/// the local registry by canonical name.

use std::collections::HashMap;
use std::fs;

use crate::fbuf::Fbuf;

const FILE_BITS: u32 = 16;
const CDELTA_BITS: u32 = 8;
const LDELTA_BITS: u32 = 8;
const COLUMN_BITS: u32 = 12;
const LINE_BITS: u32 = 20;

const FILE_SHIFT: u32 = 0;
const CDELTA_SHIFT: u32 = FILE_SHIFT + FILE_BITS;
const LDELTA_SHIFT: u32 = CDELTA_SHIFT + CDELTA_BITS;
const COLUMN_SHIFT: u32 = LDELTA_SHIFT + LDELTA_BITS;
const LINE_SHIFT: u32 = COLUMN_SHIFT + COLUMN_BITS;

pub const LINE_INVALID: u32 = (1 << LINE_BITS) - 1;
pub const COLUMN_MAX: u32 = (1 << COLUMN_BITS) - 1;
pub const DELTA_MAX: u32 = (1 << LDELTA_BITS) - 1;

/// Location stream magic number.
pub const LOC_MAGIC: u16 = 0xF00F;

// ---------------------------------------------------------------------------
// FileRef
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileRef(pub u16);

impl FileRef {
    pub const INVALID: FileRef = FileRef(0xFFFF);

    pub fn is_valid(self) -> bool {
        self != FileRef::INVALID
    }
}

// ---------------------------------------------------------------------------
// Loc
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Loc(u64);

impl Loc {
    pub fn invalid() -> Loc {
        Loc::new(FileRef::INVALID, LINE_INVALID, 0, 0, 0)
    }

    pub fn new(
        file: FileRef,
        first_line: u32,
        first_column: u32,
        line_delta: u32,
        column_delta: u32,
    ) -> Loc {
        let line = first_line.min(LINE_INVALID);
        let column = first_column.min(COLUMN_MAX);
        let ld = line_delta.min(DELTA_MAX);
        let cd = column_delta.min(DELTA_MAX);
        Loc(((line as u64) << LINE_SHIFT)
            | ((column as u64) << COLUMN_SHIFT)
            | ((ld as u64) << LDELTA_SHIFT)
            | ((cd as u64) << CDELTA_SHIFT)
            | ((file.0 as u64) << FILE_SHIFT))
    }

    pub fn from_raw(raw: u64) -> Loc {
        Loc(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn file(self) -> FileRef {
        FileRef(((self.0 >> FILE_SHIFT) & 0xFFFF) as u16)
    }

    pub fn line(self) -> u32 {
        ((self.0 >> LINE_SHIFT) & (LINE_INVALID as u64)) as u32
    }

    pub fn column(self) -> u32 {
        ((self.0 >> COLUMN_SHIFT) & (COLUMN_MAX as u64)) as u32
    }

    pub fn line_delta(self) -> u32 {
        ((self.0 >> LDELTA_SHIFT) & (DELTA_MAX as u64)) as u32
    }

    pub fn column_delta(self) -> u32 {
        ((self.0 >> CDELTA_SHIFT) & (DELTA_MAX as u64)) as u32
    }

    pub fn is_valid(self) -> bool {
        self.file().is_valid() && self.line() != LINE_INVALID
    }

    /// Merge two ranges into one covering both. Invalid operands are
    /// ignored; merging across files keeps `self`.
    pub fn merge(self, other: Loc) -> Loc {
        if !self.is_valid() {
            return other;
        }
        if !other.is_valid() || other.file() != self.file() {
            return self;
        }
        let (a, b) = if self.line() <= other.line() { (self, other) } else { (other, self) };
        let last_line = (b.line() + b.line_delta()).max(a.line() + a.line_delta());
        let last_col = if b.line() + b.line_delta() >= a.line() + a.line_delta() {
            b.column() + b.column_delta()
        } else {
            a.column() + a.column_delta()
        };
        let first_col = if a.line() == b.line() { a.column().min(b.column()) } else { a.column() };
        Loc::new(
            a.file(),
            a.line(),
            first_col,
            last_line - a.line(),
            last_col.saturating_sub(if last_line == a.line() { first_col } else { 0 }),
        )
    }
}

// ---------------------------------------------------------------------------
// SourceMap: the interned file registry
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct LocFile {
    pub name: String,
    content: Option<String>,
    tried_open: bool,
}

#[derive(Debug, Default)]
pub struct SourceMap {
    files: Vec<LocFile>,
}

/// Collapse consecutive separators: `a//b///c` becomes `a/b/c`.
fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_slash = false;
    for ch in name.chars() {
        if ch == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(ch);
    }
    out
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap { files: Vec::new() }
    }

    /// Intern a file path, returning its stable reference. Registration
    /// de-duplicates by canonical name.
    pub fn register(&mut self, name: &str) -> FileRef {
        let canon = canonical_name(name);
        if let Some(idx) = self.files.iter().position(|f| f.name == canon) {
            return FileRef(idx as u16);
        }
        assert!(self.files.len() < 0xFFFF, "too many source files");
        self.files.push(LocFile {
            name: canon,
            content: None,
            tried_open: false,
        });
        FileRef((self.files.len() - 1) as u16)
    }

    pub fn file_name(&self, file: FileRef) -> Option<&str> {
        self.files.get(file.0 as usize).map(|f| f.name.as_str())
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// The text of 1-based line `line` in `file`, loading and caching the
    /// file content on first use. A file that failed to open once is not
    /// retried.
    pub fn source_line(&mut self, file: FileRef, line: u32) -> Option<&str> {
        let rec = self.files.get_mut(file.0 as usize)?;
        if rec.content.is_none() {
            if rec.tried_open {
                return None;
            }
            rec.tried_open = true;
            match fs::read_to_string(&rec.name) {
                Ok(text) => rec.content = Some(text),
                Err(_) => return None,
            }
        }
        rec.content
            .as_ref()
            .and_then(|text| text.lines().nth(line.saturating_sub(1) as usize))
    }

    /// Preload file content (used by tests and by drivers that hold
    /// sources in memory).
    pub fn set_content(&mut self, file: FileRef, text: impl Into<String>) {
        let rec = &mut self.files[file.0 as usize];
        rec.content = Some(text.into());
        rec.tried_open = true;
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Per-stream write context; the file table header is emitted once, before
/// the first location.
#[derive(Default)]
pub struct LocWriteCtx {
    header_done: bool,
}

impl LocWriteCtx {
    pub fn new() -> Self {
        LocWriteCtx { header_done: false }
    }

    pub fn write(&mut self, f: &mut Fbuf, map: &SourceMap, loc: Loc) {
        if !self.header_done {
            self.header_done = true;
            f.put_u16(LOC_MAGIC);
            f.put_uint(map.files.len() as u64);
            for file in &map.files {
                f.put_str(&file.name);
            }
        }
        f.put_u64(loc.raw());
    }
}

/// Per-stream read context; old file references are remapped onto the
/// local registry the first time they are seen.
pub struct LocReadCtx {
    names: Vec<String>,
    remap: HashMap<u16, FileRef>,
    header_done: bool,
}

impl LocReadCtx {
    pub fn new() -> Self {
        LocReadCtx {
            names: Vec::new(),
            remap: HashMap::new(),
            header_done: false,
        }
    }

    pub fn read(&mut self, f: &mut Fbuf, map: &mut SourceMap) -> Loc {
        if !self.header_done {
            self.header_done = true;
            let magic = f.get_u16();
            if magic != LOC_MAGIC {
                panic!(
                    "{}: corrupt location table (bad magic {:#06x})",
                    f.file_name(),
                    magic
                );
            }
            let n_files = f.get_uint() as usize;
            for _ in 0..n_files {
                self.names.push(f.get_str());
            }
        }
        let loc = Loc::from_raw(f.get_u64());
        let old = loc.file();
        if !old.is_valid() {
            return loc;
        }
        let new = match self.remap.get(&old.0) {
            Some(&r) => r,
            None => {
                let name = self
                    .names
                    .get(old.0 as usize)
                    .unwrap_or_else(|| {
                        panic!("{}: invalid file reference {}", f.file_name(), old.0)
                    })
                    .clone();
                let r = map.register(&name);
                self.remap.insert(old.0, r);
                r
            }
        };
        Loc::new(
            new,
            loc.line(),
            loc.column(),
            loc.line_delta(),
            loc.column_delta(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack() {
        let mut map = SourceMap::new();
        let file = map.register("rtl/top.vhd");
        let loc = Loc::new(file, 120, 8, 2, 15);
        assert_eq!(loc.file(), file);
        assert_eq!(loc.line(), 120);
        assert_eq!(loc.column(), 8);
        assert_eq!(loc.line_delta(), 2);
        assert_eq!(loc.column_delta(), 15);
        assert!(loc.is_valid());
    }

    #[test]
    fn construction_saturates() {
        let mut map = SourceMap::new();
        let file = map.register("x.vhd");
        let loc = Loc::new(file, 5, 10_000, 700, 700);
        assert_eq!(loc.column(), COLUMN_MAX);
        assert_eq!(loc.line_delta(), DELTA_MAX);
        assert_eq!(loc.column_delta(), DELTA_MAX);

        let far = Loc::new(file, 0x20_0000, 1, 0, 0);
        assert_eq!(far.line(), LINE_INVALID);
        assert!(!far.is_valid());
        assert!(!Loc::invalid().is_valid());
    }

    #[test]
    fn registration_dedups_by_canonical_name() {
        let mut map = SourceMap::new();
        let a = map.register("lib//work/pkg.vhd");
        let b = map.register("lib/work/pkg.vhd");
        let c = map.register("lib/work/other.vhd");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(map.file_name(a), Some("lib/work/pkg.vhd"));
        assert_eq!(map.file_count(), 2);
    }

    #[test]
    fn merge_extends_range() {
        let mut map = SourceMap::new();
        let file = map.register("m.vhd");
        let a = Loc::new(file, 10, 4, 0, 3);
        let b = Loc::new(file, 12, 1, 0, 6);
        let m = a.merge(b);
        assert_eq!(m.line(), 10);
        assert_eq!(m.line_delta(), 2);
    }

    #[test]
    fn stream_round_trip_remaps_files() {
        let mut map = SourceMap::new();
        let f1 = map.register("a.vhd");
        let f2 = map.register("b.vhd");
        let l1 = Loc::new(f1, 3, 1, 0, 4);
        let l2 = Loc::new(f2, 7, 2, 1, 0);

        let mut buf = Fbuf::new("locs");
        let mut w = LocWriteCtx::new();
        w.write(&mut buf, &map, l1);
        w.write(&mut buf, &map, l2);

        // A fresh registry with one pre-existing entry exercises both the
        // match-by-name and the append paths.
        let mut map2 = SourceMap::new();
        map2.register("b.vhd");
        buf.rewind();
        let mut r = LocReadCtx::new();
        let r1 = r.read(&mut buf, &mut map2);
        let r2 = r.read(&mut buf, &mut map2);

        assert_eq!(map2.file_name(r1.file()), Some("a.vhd"));
        assert_eq!(map2.file_name(r2.file()), Some("b.vhd"));
        assert_eq!((r1.line(), r1.column()), (3, 1));
        assert_eq!((r2.line(), r2.line_delta()), (7, 1));
    }

    #[test]
    #[should_panic(expected = "bad magic")]
    fn corrupt_magic_is_fatal() {
        let mut buf = Fbuf::new("locs");
        buf.put_u16(0x1234);
        buf.put_u64(0);
        buf.rewind();
        let mut map = SourceMap::new();
        LocReadCtx::new().read(&mut buf, &mut map);
    }
}
