/// Interned identifiers.
///
/// Every name in the IR is interned exactly once; `Ident` is a small index
/// into the process-wide table and equality is index equality. The table
/// lives for the whole process, so interned strings can be handed out as
/// `&'static str` without lifetime plumbing.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ident(u32);

struct Interner {
    lookup: HashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

static TABLE: Lazy<Mutex<Interner>> = Lazy::new(|| {
    Mutex::new(Interner {
        lookup: HashMap::new(),
        strings: Vec::new(),
    })
});

/// Intern `s`, returning the canonical identifier for it.
pub fn intern(s: &str) -> Ident {
    let mut table = TABLE.lock();
    if let Some(&idx) = table.lookup.get(s) {
        return Ident(idx);
    }
    // Interned strings are never freed; leaking gives them 'static life.
    let owned: &'static str = Box::leak(s.to_owned().into_boxed_str());
    let idx = table.strings.len() as u32;
    table.strings.push(owned);
    table.lookup.insert(owned, idx);
    Ident(idx)
}

impl Ident {
    pub fn as_str(self) -> &'static str {
        TABLE.lock().strings[self.0 as usize]
    }

    /// Case-insensitive comparison against a bare string, for the
    /// predefined names (operators, attributes) that VHDL treats as
    /// case-blind.
    pub fn eq_ignore_case(self, other: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
