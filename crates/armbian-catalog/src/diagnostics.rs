use std::collections::BTreeSet;

use tracing::warn;

/// Non-fatal data-quality findings collected during a run and reported once
/// at the end. Nothing in here ever changes the exit code.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    warnings: BTreeSet<String>,
}

impl Diagnostics {
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.insert(message.into());
    }

    pub fn missing_board_field(&mut self, slug: &str, field: &str) {
        self.warn(format!("board '{slug}' has no {field}"));
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.warnings.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn flush(&self) {
        if self.warnings.is_empty() {
            return;
        }
        warn!(count = self.warnings.len(), "data quality warnings");
        for w in &self.warnings {
            warn!("  {w}");
        }
    }
}
