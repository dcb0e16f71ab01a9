// File: src/errors.rs
//
// Error reporting for three kinds: compile-time (lex/parse), runtime (with a
// frame backtrace), and fatal. Uses `colored` terminal rendering (kind
// header, source arrow, optional backtrace) for the CLI/REPL surface; the
// compiler and VM themselves report narrower errors inline as plain strings
// and have no dependency on `colored`.

use colored::Colorize;
use std::fmt;

/// Source location. This engine doesn't track source columns, so a location
/// carries only a line number (plus an optional file name for multi-file
/// error messages).
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLocation {
    pub line: u32,
    pub file: Option<String>,
}

impl SourceLocation {
    pub fn new(line: u32) -> Self {
        Self { line, file: None }
    }

    pub fn with_file(line: u32, file: String) -> Self {
        Self { line, file: Some(file) }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{file}:{}", self.line),
            None => write!(f, "line {}", self.line),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    Compile,
    Runtime,
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::Compile => write!(f, "Compile Error"),
            ErrorKind::Runtime => write!(f, "Runtime Error"),
            ErrorKind::Fatal => write!(f, "Fatal Error"),
        }
    }
}

/// A reportable engine error, pretty-printed to the terminal with a kind
/// header, source arrow, and optional backtrace.
#[derive(Debug, Clone)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<SourceLocation>,
    /// Runtime-only: one line per frame, innermost first, matching spec
    /// §7's "backtrace of frames (function name or `script`, line derived
    /// from `ip - 1`)".
    pub backtrace: Vec<String>,
}

impl EngineError {
    pub fn compile(message: String) -> Self {
        Self { kind: ErrorKind::Compile, message, location: None, backtrace: Vec::new() }
    }

    pub fn runtime(message: String, backtrace: Vec<String>) -> Self {
        Self { kind: ErrorKind::Runtime, message, location: None, backtrace }
    }

    pub fn fatal(message: String) -> Self {
        Self { kind: ErrorKind::Fatal, message, location: None, backtrace: Vec::new() }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind_str = format!("{}", self.kind);
        writeln!(f, "{}: {}", kind_str.red().bold(), self.message.bold())?;
        if let Some(loc) = &self.location {
            writeln!(f, "{}", format!("  --> {loc}").bright_blue())?;
        }
        for frame in &self.backtrace {
            writeln!(f, "   {} {}", "at".dimmed(), frame.bright_blue())?;
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {}

/// Renders the raw per-error strings a `CompileError` `interpret()` call
/// leaves in `Vm::last_errors` (one already-formatted `[line N] Error ...:
/// message` diagnostic per panic-mode-recovered error) as colored
/// `EngineError` reports.
pub fn render_compile_errors(raw: &[String]) -> String {
    raw.iter().map(|e| EngineError::compile(e.clone()).to_string()).collect()
}

/// Renders the single raw fault string a `RuntimeError` `interpret()` call
/// leaves in `Vm::last_errors` as a colored `EngineError` report with its
/// frame backtrace.
pub fn render_runtime_fault(raw: &str) -> String {
    let (message, backtrace) = split_runtime_fault(raw);
    EngineError::runtime(message, backtrace).to_string()
}

/// Parses the `[line N] Error ...: message` lines the compiler's panic-mode
/// synchronization accumulates and the `\n[line N] in name` backtrace the VM
/// appends to a runtime message, splitting a VM fault's raw text into the
/// message/backtrace split `EngineError::runtime` expects.
pub fn split_runtime_fault(raw: &str) -> (String, Vec<String>) {
    let mut lines = raw.lines();
    let message = lines.next().unwrap_or_default().to_string();
    let backtrace = lines
        .map(|l| l.trim_start_matches('[').replacen(']', "", 1).trim().to_string())
        .collect();
    (message, backtrace)
}

/// Levenshtein distance, used for "did you mean?" hints when reporting an
/// undefined global/property name.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let len1 = s1.chars().count();
    let len2 = s2.chars().count();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut matrix = vec![vec![0; len2 + 1]; len1 + 1];
    for (i, row) in matrix.iter_mut().enumerate().take(len1 + 1) {
        row[0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();

    for i in 1..=len1 {
        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };
            matrix[i][j] = std::cmp::min(
                std::cmp::min(matrix[i - 1][j] + 1, matrix[i][j - 1] + 1),
                matrix[i - 1][j - 1] + cost,
            );
        }
    }

    matrix[len1][len2]
}

/// Finds the closest candidate within edit distance 3, else `None`.
pub fn find_closest_match<'a>(target: &str, candidates: &'a [String]) -> Option<&'a str> {
    let mut best_match = None;
    let mut best_distance = usize::MAX;
    for candidate in candidates {
        let distance = levenshtein_distance(target, candidate);
        if distance <= 3 && distance < best_distance {
            best_distance = distance;
            best_match = Some(candidate.as_str());
        }
    }
    best_match
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_symmetric_for_identical_strings() {
        assert_eq!(levenshtein_distance("clock", "clock"), 0);
    }

    #[test]
    fn finds_close_typo() {
        let candidates = vec!["clock".to_string(), "gcHeapSize".to_string()];
        assert_eq!(find_closest_match("clcok", &candidates), Some("clock"));
    }

    #[test]
    fn splits_runtime_fault_backtrace() {
        let raw = "Undefined variable 'x'.\n[line 3] in f\n[line 7] in script";
        let (message, backtrace) = split_runtime_fault(raw);
        assert_eq!(message, "Undefined variable 'x'.");
        assert_eq!(backtrace, vec!["line 3 in f".to_string(), "line 7 in script".to_string()]);
    }
}
