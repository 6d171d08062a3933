//! Configuration for filling forms.

/// How strictly a template must match the mapping authored for it.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplatePolicy {
    /// Minimum share of mapping entries that must resolve to a field.
    pub min_coverage: f64,

    /// Maximum number of resolvable entries whose declared kind differs
    /// from the discovered kind.
    pub max_kind_mismatches: usize,

    /// Allowed absolute difference per kind when the mapping declares a
    /// fingerprint.
    pub fingerprint_tolerance: usize,
}

impl Default for TemplatePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplatePolicy {
    /// Create a policy with defaults: 75% coverage, no kind mismatches,
    /// exact fingerprint.
    pub fn new() -> Self {
        Self {
            min_coverage: 0.75,
            max_kind_mismatches: 0,
            fingerprint_tolerance: 0,
        }
    }

    /// Set the minimum coverage (clamped to 0.0..=1.0).
    pub fn with_min_coverage(mut self, coverage: f64) -> Self {
        self.min_coverage = coverage.clamp(0.0, 1.0);
        self
    }

    /// Set the tolerated number of kind mismatches.
    pub fn with_max_kind_mismatches(mut self, count: usize) -> Self {
        self.max_kind_mismatches = count;
        self
    }

    /// Set the fingerprint tolerance.
    pub fn with_fingerprint_tolerance(mut self, tolerance: usize) -> Self {
        self.fingerprint_tolerance = tolerance;
        self
    }
}

/// Fill configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FillConfig {
    /// Appearance state written for a checked button.
    pub on_state: String,

    /// Appearance state written for an unchecked button.
    pub off_state: String,

    /// Set `/NeedAppearances true` on the form after filling.
    pub need_appearances: bool,

    /// Check the template against the mapping before filling.
    pub verify_template: bool,

    /// Policy used when `verify_template` is set.
    pub policy: TemplatePolicy,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FillConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            on_state: "Yes".to_string(),
            off_state: "Off".to_string(),
            need_appearances: true,
            verify_template: true,
            policy: TemplatePolicy::default(),
        }
    }

    /// Set the checked and unchecked state names.
    pub fn with_states(mut self, on: impl Into<String>, off: impl Into<String>) -> Self {
        self.on_state = on.into();
        self.off_state = off.into();
        self
    }

    /// Enable or disable `/NeedAppearances`.
    pub fn with_need_appearances(mut self, enable: bool) -> Self {
        self.need_appearances = enable;
        self
    }

    /// Enable or disable template verification.
    pub fn with_verify_template(mut self, enable: bool) -> Self {
        self.verify_template = enable;
        self
    }

    /// Set the template policy.
    pub fn with_policy(mut self, policy: TemplatePolicy) -> Self {
        self.policy = policy;
        self
    }
}
