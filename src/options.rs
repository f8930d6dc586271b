//! Options for contract splitting.

/// Options for controlling the end-to-end splitting pipeline.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Whether to run the tail audit on the last clause.
    pub enable_tail_audit: bool,

    /// Whether to run the clause-merge pass over the clause list.
    pub audit_clause_boundaries: bool,

    /// Line preprocessing.
    pub preprocess: PreprocessOptions,

    /// Candidate detection tuning.
    pub detector: DetectorConfig,

    /// Retry bound for the boundary audit.
    pub audit: LlmAuditConfig,

    /// Retry bound for the clause merge.
    pub merge: MergeConfig,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            enable_tail_audit: true,
            audit_clause_boundaries: true,
            preprocess: PreprocessOptions::default(),
            detector: DetectorConfig::default(),
            audit: LlmAuditConfig::default(),
            merge: MergeConfig::default(),
        }
    }
}

impl SplitOptions {
    /// Creates new options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables the tail audit (the last clause keeps its trailing lines).
    pub fn without_tail_audit(mut self) -> Self {
        self.enable_tail_audit = false;
        self
    }

    /// Disables the clause-merge pass.
    pub fn without_clause_merge(mut self) -> Self {
        self.audit_clause_boundaries = false;
        self
    }

    /// Disables both classifier-backed passes.
    pub fn deterministic_only(self) -> Self {
        self.without_tail_audit().without_clause_merge()
    }

    /// Sets the number of extra audit attempts.
    pub fn with_audit_retries(mut self, retries: usize) -> Self {
        self.audit.max_retries = retries;
        self
    }

    /// Sets the number of extra merge attempts.
    pub fn with_merge_retries(mut self, retries: usize) -> Self {
        self.merge.max_retries = retries;
        self
    }

    /// Returns true if any step needs a classifier.
    pub fn uses_classifier(&self) -> bool {
        self.enable_tail_audit || self.audit_clause_boundaries
    }
}

/// Line preprocessing applied before splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessOptions {
    /// Keep blank lines (line numbers then match the source).
    pub preserve_empty_lines: bool,

    /// Apply Unicode NFC normalization. Off by default: NFC maps CJK
    /// compatibility ideographs to their unified forms.
    pub normalize_unicode: bool,

    /// Width of the zero-padded line number in the audit context.
    pub line_number_width: usize,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            preserve_empty_lines: true,
            normalize_unicode: false,
            line_number_width: 3,
        }
    }
}

impl PreprocessOptions {
    /// Drops blank lines during preprocessing.
    pub fn drop_empty_lines(mut self) -> Self {
        self.preserve_empty_lines = false;
        self
    }

    /// Applies NFC to every line.
    pub fn with_unicode_normalization(mut self) -> Self {
        self.normalize_unicode = true;
        self
    }

    /// Sets the line number width (at least 1).
    pub fn with_line_number_width(mut self, width: usize) -> Self {
        self.line_number_width = width.max(1);
        self
    }
}

/// Tuning constants for boundary candidate detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Raw hits at most this many lines apart collapse into one candidate.
    pub merge_distance: usize,

    /// A weak signature hit is confirmed by a date line at most this many
    /// lines away.
    pub date_window: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            merge_distance: 2,
            date_window: 5,
        }
    }
}

impl DetectorConfig {
    /// Sets the candidate merge distance.
    pub fn with_merge_distance(mut self, lines: usize) -> Self {
        self.merge_distance = lines;
        self
    }

    /// Sets the date proximity window for weak hits.
    pub fn with_date_window(mut self, lines: usize) -> Self {
        self.date_window = lines;
        self
    }
}

/// Retry configuration for the boundary audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmAuditConfig {
    /// Extra attempts after the first failed reply.
    pub max_retries: usize,
}

impl Default for LlmAuditConfig {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

/// Retry configuration for the clause merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeConfig {
    /// Extra attempts after the first malformed reply.
    pub max_retries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_options_defaults() {
        let options = SplitOptions::default();
        assert!(options.enable_tail_audit);
        assert!(options.audit_clause_boundaries);
        assert_eq!(options.audit.max_retries, 1);
        assert_eq!(options.merge.max_retries, 0);
        assert_eq!(options.detector.merge_distance, 2);
        assert_eq!(options.detector.date_window, 5);
        assert!(options.uses_classifier());
        assert!(!options.preprocess.normalize_unicode);
    }

    #[test]
    fn test_deterministic_only() {
        let options = SplitOptions::new().deterministic_only();
        assert!(!options.uses_classifier());
    }

    #[test]
    fn test_line_number_width_clamped() {
        let options = PreprocessOptions::default().with_line_number_width(0);
        assert_eq!(options.line_number_width, 1);
    }
}
