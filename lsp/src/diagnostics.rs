//! Per-file diagnostics published by the language servers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::types::{DiagnosticsSnapshot, FileDiagnostics, ServerDiagnostic};

#[derive(Debug, Default)]
pub(crate) struct DiagnosticsStore {
    data: HashMap<PathBuf, Vec<ServerDiagnostic>>,
}

impl DiagnosticsStore {
    /// Replace the diagnostics for `path`. An empty list clears the file.
    pub fn update(&mut self, path: PathBuf, items: Vec<ServerDiagnostic>) {
        if items.is_empty() {
            self.data.remove(&path);
        } else {
            self.data.insert(path, items);
        }
    }

    /// Drop every file under `root`.
    pub fn clear_under(&mut self, root: &Path) -> usize {
        let before = self.data.len();
        self.data.retain(|path, _| !path.starts_with(root));
        before - self.data.len()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let mut files: Vec<FileDiagnostics> = self
            .data
            .iter()
            .map(|(path, items)| FileDiagnostics {
                path: path.clone(),
                items: items.clone(),
            })
            .collect();

        files.sort_by(|a, b| {
            let a_err = a.items.iter().any(|d| d.severity().is_error());
            let b_err = b.items.iter().any(|d| d.severity().is_error());
            b_err.cmp(&a_err).then_with(|| a.path.cmp(&b.path))
        });

        DiagnosticsSnapshot::new(files)
    }
}
