//! Per-run outcome accounting for the batch pipeline
//!
//! One [`BatchOutcome`] per pipeline invocation, mutated monotonically
//! while the run progresses and handed to the caller by value when it
//! finishes or is cancelled. Never shared across concurrent runs.

use std::fmt;

/// Terminal category of one processed row (or one run-level event)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeCategory {
    /// Output document written
    Success,
    /// Template file absent; the row never touched the server
    TemplateMissing,
    /// Template opened but no attribute matched any mapped field
    NoAttributesFound,
    /// Output key already used this run; file got a numeric suffix
    /// (informational — the row still succeeds)
    Duplicate,
    /// Hard failure, exception text attached
    Error,
}

impl fmt::Display for OutcomeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::TemplateMissing => "template missing",
            Self::NoAttributesFound => "no attributes found",
            Self::Duplicate => "duplicate",
            Self::Error => "error",
        };
        write!(f, "{label}")
    }
}

/// Accumulated statistics for one batch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub total: usize,
    pub success: usize,
    pub template_missing: usize,
    pub no_attributes_found: usize,
    pub duplicates: usize,
    pub errors: usize,
    /// Categorized detail lines, in the order events happened
    pub details: Vec<(OutcomeCategory, String)>,
}

impl BatchOutcome {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record_success(&mut self, detail: impl Into<String>) {
        self.success += 1;
        self.details.push((OutcomeCategory::Success, detail.into()));
    }

    pub fn record_template_missing(&mut self, detail: impl Into<String>) {
        self.template_missing += 1;
        self.details
            .push((OutcomeCategory::TemplateMissing, detail.into()));
    }

    pub fn record_no_attributes(&mut self, detail: impl Into<String>) {
        self.no_attributes_found += 1;
        self.details
            .push((OutcomeCategory::NoAttributesFound, detail.into()));
    }

    pub fn record_duplicate(&mut self, detail: impl Into<String>) {
        self.duplicates += 1;
        self.details
            .push((OutcomeCategory::Duplicate, detail.into()));
    }

    pub fn record_error(&mut self, detail: impl Into<String>) {
        self.errors += 1;
        self.details.push((OutcomeCategory::Error, detail.into()));
    }

    /// Detail lines for one category, in event order
    pub fn details_for(&self, category: OutcomeCategory) -> Vec<&str> {
        self.details
            .iter()
            .filter(|(c, _)| *c == category)
            .map(|(_, d)| d.as_str())
            .collect()
    }

    /// Multi-line human-readable report
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("total:              {}\n", self.total));
        out.push_str(&format!("success:            {}\n", self.success));
        out.push_str(&format!("template missing:   {}\n", self.template_missing));
        out.push_str(&format!("no attributes:      {}\n", self.no_attributes_found));
        out.push_str(&format!("duplicates handled: {}\n", self.duplicates));
        out.push_str(&format!("errors:             {}", self.errors));
        out
    }
}
