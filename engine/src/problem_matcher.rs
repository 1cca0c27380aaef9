//! Compiler output matcher for build tasks.
//!
//! Recognizes `<file>:<line>:<column>: <warning|error|note>: <message>` with an
//! absolute file path. Anything else on the line (progress output, linker
//! chatter, relative paths) is ignored.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use kestrel_types::DiagnosticSeverity;
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilerDiagnostic {
    pub file: PathBuf,
    /// 1-indexed, as printed.
    pub line: u32,
    /// 1-indexed, as printed.
    pub column: u32,
    pub severity: DiagnosticSeverity,
    pub message: String,
}

fn diagnostic_regex() -> &'static Regex {
    static DIAGNOSTIC: OnceLock<Regex> = OnceLock::new();
    DIAGNOSTIC.get_or_init(|| {
        Regex::new(r"^(.+?):(\d+):(\d+):\s+(warning|error|note):\s+(.*)$")
            .expect("diagnostic regex is valid")
    })
}

/// `C:\` and `\\server\` count as absolute on every host so Windows build
/// logs match regardless of where Kestrel runs.
fn is_absolute(file: &str) -> bool {
    let bytes = file.as_bytes();
    let drive = bytes.len() > 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && matches!(bytes[2], b'\\' | b'/');
    drive || file.starts_with("\\\\") || Path::new(file).is_absolute() || file.starts_with('/')
}

#[must_use]
pub fn match_line(line: &str) -> Option<CompilerDiagnostic> {
    let caps = diagnostic_regex().captures(line.trim_end_matches(['\r', '\n']))?;
    let file = caps.get(1)?.as_str();
    if !is_absolute(file) {
        return None;
    }
    Some(CompilerDiagnostic {
        file: PathBuf::from(file),
        line: caps.get(2)?.as_str().parse().ok()?,
        column: caps.get(3)?.as_str().parse().ok()?,
        severity: DiagnosticSeverity::from_compiler_label(caps.get(4)?.as_str())?,
        message: caps.get(5)?.as_str().trim().to_string(),
    })
}

/// Every diagnostic in a build log, in output order.
#[must_use]
pub fn match_output(output: &str) -> Vec<CompilerDiagnostic> {
    output.lines().filter_map(match_line).collect()
}
