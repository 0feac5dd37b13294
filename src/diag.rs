/// Diagnostic engine.
///
/// A `Diag` collects a message, location hints, and an optional
/// stack-style trace; the `Reporter` renders it with source context:
///
///   error: width of port "din" does not match formal
///      > rtl/top.vhd:12
///    11 |   port map (
///    12 |     din => data(15 downto 0),
///       |            ^^^^^^^^^^^^^^^^^ actual is 16 bits wide
///
/// Hints attached to the same location coalesce (the later text wins).
/// Hints in other files render as freestanding notes. The reporter also
/// owns the process error counter, the error limit, and the optional
/// consumer and hint callbacks; it is an explicit context object threaded
/// through the passes.

use std::io::{self, Write};

use colored::Colorize;

use crate::conf::Conf;
use crate::loc::{Loc, SourceMap};

// ---------------------------------------------------------------------------
// Levels and hints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Note,
    Warn,
    Error,
    Fatal,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Note => "note",
            Level::Warn => "warning",
            Level::Error => "error",
            Level::Fatal => "fatal error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Hint {
    pub loc: Loc,
    pub text: String,
    pub priority: i32,
}

/// Hint priorities start far below zero so location hints always sort
/// ahead of (positive) trace entries.
const HINT_PRIO_BASE: i32 = -1_000_000;

#[derive(Debug)]
pub struct Diag {
    pub level: Level,
    msg: String,
    hints: Vec<Hint>,
    trace: Vec<Hint>,
}

impl Diag {
    /// Allocate a diagnostic; a valid `loc` seeds the primary hint with
    /// empty text.
    pub fn new(level: Level, loc: Loc) -> Diag {
        let mut d = Diag {
            level,
            msg: String::new(),
            hints: Vec::new(),
            trace: Vec::new(),
        };
        if loc.is_valid() {
            d.hints.push(Hint {
                loc,
                text: String::new(),
                priority: HINT_PRIO_BASE,
            });
        }
        d
    }

    /// Append to the message text.
    pub fn msg(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.msg.push_str(text.as_ref());
        self
    }

    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Attach a hint. A hint at an already-hinted location replaces that
    /// hint's text; otherwise the hint is appended with a priority that
    /// keeps insertion order under sorting.
    pub fn hint(&mut self, loc: Loc, text: impl Into<String>) -> &mut Self {
        let text = text.into();
        if let Some(h) = self.hints.iter_mut().find(|h| h.loc == loc) {
            h.text = text;
        } else {
            let priority = HINT_PRIO_BASE + self.hints.len() as i32;
            self.hints.push(Hint { loc, text, priority });
        }
        self
    }

    /// Append a stack-trace entry. Trace priorities are positive and
    /// ascending.
    pub fn trace(&mut self, loc: Loc, text: impl Into<String>) -> &mut Self {
        let priority = self.trace.len() as i32 + 1;
        self.trace.push(Hint {
            loc,
            text: text.into(),
            priority,
        });
        self
    }

    pub fn hints(&self) -> &[Hint] {
        &self.hints
    }

    fn primary_loc(&self) -> Loc {
        self.hints.first().map(|h| h.loc).unwrap_or(Loc::invalid())
    }
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Full,
    Compact,
}

pub type Consumer = Box<dyn FnMut(&Diag)>;
pub type HintFn = Box<dyn Fn(&mut Diag, Loc)>;

pub struct Reporter {
    style: Style,
    color: bool,
    width: usize,
    unit_test: bool,
    error_limit: u32,
    n_errors: u32,
    consumer: Option<Consumer>,
    hint_fn: Option<HintFn>,
}

fn terminal_width() -> usize {
    match crossterm::terminal::size() {
        Ok((cols, _)) if cols > 20 => cols as usize,
        _ => 80,
    }
}

impl Reporter {
    pub fn new(conf: &Conf) -> Reporter {
        Reporter {
            style: if conf.is_set("message_compact") {
                Style::Compact
            } else {
                Style::Full
            },
            color: conf.is_set("color"),
            width: terminal_width(),
            unit_test: conf.is_set("unit_test"),
            error_limit: conf.get("error_limit") as u32,
            n_errors: 0,
            consumer: None,
            hint_fn: None,
        }
    }

    /// Replace the renderer with a custom consumer; emitted diagnostics
    /// are handed over instead of being printed.
    pub fn set_consumer(&mut self, consumer: Consumer) {
        self.consumer = Some(consumer);
    }

    /// Install the callback invoked on every new diagnostic with a valid
    /// location, used to attach contextual notes.
    pub fn set_hint_fn(&mut self, hint_fn: HintFn) {
        self.hint_fn = Some(hint_fn);
    }

    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    pub fn set_width(&mut self, width: usize) {
        self.width = width.max(20);
    }

    pub fn error_count(&self) -> u32 {
        self.n_errors
    }

    /// Allocate a diagnostic, running the hint callback.
    pub fn diag(&self, level: Level, loc: Loc) -> Diag {
        let mut d = Diag::new(level, loc);
        if loc.is_valid() {
            if let Some(hint_fn) = &self.hint_fn {
                hint_fn(&mut d, loc);
            }
        }
        d
    }

    /// Emit to standard error.
    pub fn emit(&mut self, map: &mut SourceMap, d: Diag) {
        let mut err = io::stderr();
        self.femit(&mut err, map, d);
    }

    pub fn femit(&mut self, out: &mut dyn Write, map: &mut SourceMap, d: Diag) {
        if let Some(mut consumer) = self.consumer.take() {
            consumer(&d);
            self.consumer = Some(consumer);
            self.count(d.level, out, map);
            return;
        }
        match self.style {
            Style::Compact => self.render_compact(out, map, &d),
            Style::Full => self.render_full(out, map, &d),
        }
        let level = d.level;
        if level == Level::Fatal {
            panic!("fatal error: {}", d.message());
        }
        self.count(level, out, map);
    }

    fn count(&mut self, level: Level, out: &mut dyn Write, map: &mut SourceMap) {
        if level >= Level::Error || self.unit_test {
            self.n_errors += 1;
            if self.error_limit > 0 && self.n_errors >= self.error_limit {
                let mut d = Diag::new(Level::Fatal, Loc::invalid());
                d.msg("too many errors, giving up");
                match self.style {
                    Style::Compact => self.render_compact(out, map, &d),
                    Style::Full => self.render_full(out, map, &d),
                }
                panic!("fatal error: too many errors, giving up");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    fn paint(&self, s: &str, f: impl Fn(&str) -> colored::ColoredString) -> String {
        if self.color {
            f(s).to_string()
        } else {
            s.to_string()
        }
    }

    fn level_prefix(&self, level: Level) -> String {
        let label = level.label();
        match level {
            Level::Note => self.paint(label, |s| s.bold()),
            Level::Warn => self.paint(label, |s| s.yellow().bold()),
            Level::Error | Level::Fatal => self.paint(label, |s| s.red().bold()),
        }
    }

    fn render_compact(&self, out: &mut dyn Write, map: &SourceMap, d: &Diag) {
        let loc = d.primary_loc();
        if loc.is_valid() {
            let file = map.file_name(loc.file()).unwrap_or("?");
            let _ = writeln!(
                out,
                "{}:{}:{}: {}: {}",
                file,
                loc.line(),
                loc.column(),
                d.level.label(),
                d.message()
            );
        } else {
            let _ = writeln!(out, "{}: {}", d.level.label(), d.message());
        }
    }

    fn render_full(&self, out: &mut dyn Write, map: &mut SourceMap, d: &Diag) {
        let prefix = self.level_prefix(d.level);
        let indent = d.level.label().len() + 2;
        let lines = wrap(d.message(), self.width.saturating_sub(indent));
        for (i, line) in lines.iter().enumerate() {
            if i == 0 {
                let _ = writeln!(out, "{}: {}", prefix, line);
            } else {
                let _ = writeln!(out, "{:indent$}{}", "", line, indent = indent);
            }
        }
        if lines.is_empty() {
            let _ = writeln!(out, "{}:", prefix);
        }

        let primary_loc = d.primary_loc();
        if !d.hints.is_empty() && primary_loc.is_valid() {
            let mut hints = d.hints.clone();
            hints.sort_by_key(|h| (h.loc.file().0, h.loc.line(), h.priority));

            let same_file: Vec<&Hint> = hints
                .iter()
                .filter(|h| h.loc.is_valid() && h.loc.file() == primary_loc.file())
                .collect();
            let other_file: Vec<&Hint> = hints
                .iter()
                .filter(|h| h.loc.is_valid() && h.loc.file() != primary_loc.file())
                .collect();

            self.render_file_group(out, map, d, primary_loc, &same_file);

            for hint in other_file {
                for (i, line) in wrap(&hint.text, self.width.saturating_sub(6)).iter().enumerate() {
                    if i == 0 {
                        let _ = writeln!(out, "{} {}", self.paint("Note:", |s| s.bold()), line);
                    } else {
                        let _ = writeln!(out, "      {}", line);
                    }
                }
                let file = map.file_name(hint.loc.file()).unwrap_or("?");
                let _ = writeln!(out, "   > {}:{}", file, hint.loc.line());
            }
        }

        // A trace consisting of the primary location alone adds nothing.
        let redundant = d.trace.len() == 1 && d.trace[0].loc == primary_loc;
        if !d.trace.is_empty() && !redundant {
            let mut trace = d.trace.clone();
            trace.sort_by_key(|h| h.priority);
            for entry in &trace {
                if entry.loc.is_valid() {
                    let file = map.file_name(entry.loc.file()).unwrap_or("?");
                    let _ = writeln!(out, "   > {} at {}:{}", entry.text, file, entry.loc.line());
                } else {
                    let _ = writeln!(out, "   > {}", entry.text);
                }
            }
        }
    }

    fn render_file_group(
        &self,
        out: &mut dyn Write,
        map: &mut SourceMap,
        d: &Diag,
        primary_loc: Loc,
        hints: &[&Hint],
    ) {
        if hints.is_empty() {
            return;
        }
        let file = primary_loc.file();
        let file_name = map.file_name(file).unwrap_or("?").to_string();
        let _ = writeln!(out, "   > {}:{}", file_name, primary_loc.line());

        let max_line = hints.iter().map(|h| h.loc.line()).max().unwrap_or(0);
        let gutter = max_line.to_string().len().max(2);

        let mut prev_line: Option<u32> = None;
        let mut i = 0;
        while i < hints.len() {
            let line = hints[i].loc.line();
            // All hints targeting this line, already priority-sorted.
            let mut on_line = Vec::new();
            while i < hints.len() && hints[i].loc.line() == line {
                on_line.push(hints[i]);
                i += 1;
            }

            if let Some(prev) = prev_line {
                if line > prev + 1 {
                    let _ = writeln!(out, "{:>width$}", "...", width = gutter + 1);
                }
            }
            prev_line = Some(line);

            let source = map.source_line(file, line).map(|s| s.to_string());
            if let Some(text) = &source {
                let _ = writeln!(out, "{:>gutter$} | {}", line, text, gutter = gutter);
            }

            for hint in on_line {
                let col = hint.loc.column().max(1) as usize;
                let run = hint.loc.column_delta() as usize + 1;
                let carets = "^".repeat(run);
                let is_primary = hint.loc == primary_loc;
                let red = is_primary && d.level >= Level::Error && hints.len() > 1;
                let painted = if red {
                    self.paint(&carets, |s| s.red().bold())
                } else {
                    self.paint(&carets, |s| s.green())
                };
                if hint.text.is_empty() && hints.len() == 1 {
                    // A bare primary hint under its own source line.
                    let _ = writeln!(
                        out,
                        "{:>gutter$} | {:pad$}{}",
                        "",
                        "",
                        painted,
                        gutter = gutter,
                        pad = col - 1
                    );
                } else {
                    let _ = writeln!(
                        out,
                        "{:>gutter$} | {:pad$}{} {}",
                        "",
                        "",
                        painted,
                        hint.text,
                        gutter = gutter,
                        pad = col - 1
                    );
                }
            }
        }
    }
}

/// Greedy word wrap; long words are kept whole.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(20);
    let mut out = Vec::new();
    for para in text.split('\n') {
        let mut line = String::new();
        for word in para.split_whitespace() {
            if line.is_empty() {
                line.push_str(word);
            } else if line.len() + 1 + word.len() <= width {
                line.push(' ');
                line.push_str(word);
            } else {
                out.push(std::mem::take(&mut line));
                line.push_str(word);
            }
        }
        if !line.is_empty() || !para.is_empty() {
            out.push(line);
        }
    }
    out
}
