/// Velab configuration system.
///
/// A small property registry consumed by the diagnostic engine, the
/// evaluator, and the garbage collector. Properties are documented in the
/// registry below and accessed by name; unknown names are a caller bug.
///
/// There is deliberately no file-backed persistence here: the front-end is
/// a library and the driver owns option parsing. `Conf` is an explicit
/// context object threaded to the components that read it.

use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Property definitions
// ---------------------------------------------------------------------------

/// A configuration property with its documentation.
#[derive(Debug, Clone)]
pub struct PropDef {
    pub name: &'static str,
    pub default: i64,
    pub description: &'static str,
    pub category: Category,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Category {
    Diagnostics,
    Eval,
    Debug,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// All known configuration properties.
pub static ALL_PROPS: &[PropDef] = &[
    PropDef {
        name: "error_limit",
        default: 50,
        description: "Abort compilation after this many error diagnostics. \
                      Zero disables the limit.",
        category: Category::Diagnostics,
    },
    PropDef {
        name: "unit_test",
        default: 0,
        description: "Unit-test mode: count every emitted diagnostic against \
                      the error counter, regardless of level.",
        category: Category::Diagnostics,
    },
    PropDef {
        name: "message_compact",
        default: 0,
        description: "Render diagnostics in one-line file:line:col form \
                      instead of the full source-context form.",
        category: Category::Diagnostics,
    },
    PropDef {
        name: "color",
        default: 1,
        description: "Style diagnostics with ANSI colors when the consumer \
                      is a terminal.",
        category: Category::Diagnostics,
    },
    PropDef {
        name: "eval_warn",
        default: 0,
        description: "Emit a warning when a compile-time fold is prevented \
                      (impure call, non-static operand, missing body).",
        category: Category::Eval,
    },
    PropDef {
        name: "eval_budget",
        default: 100_000,
        description: "Maximum evaluator steps per fold attempt. An expression \
                      exceeding the budget is left unfolded.",
        category: Category::Eval,
    },
    PropDef {
        name: "gc_verbose",
        default: 0,
        description: "Log arena collections (marked roots, freed nodes, \
                      pause time) at debug level.",
        category: Category::Debug,
    },
];

// ---------------------------------------------------------------------------
// Conf: runtime values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Conf {
    values: HashMap<&'static str, i64>,
}

impl Conf {
    pub fn new() -> Self {
        Conf { values: HashMap::new() }
    }

    fn def(name: &str) -> &'static PropDef {
        ALL_PROPS
            .iter()
            .find(|p| p.name == name)
            .unwrap_or_else(|| panic!("unknown configuration property '{}'", name))
    }

    /// Read a property, falling back to its documented default.
    pub fn get(&self, name: &str) -> i64 {
        let def = Self::def(name);
        self.values.get(def.name).copied().unwrap_or(def.default)
    }

    pub fn set(&mut self, name: &str, value: i64) {
        let def = Self::def(name);
        self.values.insert(def.name, value);
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name) != 0
    }
}

impl Default for Conf {
    fn default() -> Self {
        Conf::new()
    }
}
