//! Verify-exclusion rules.

use regex::Regex;

use super::error::{PlanError, PlanResult};

/// Compiled `verify_exclusion` patterns.
///
/// A local file whose manifest path matches any rule is trusted without
/// re-hashing, as long as the manifest carries a hash for it. Patterns are
/// regular expressions searched anywhere in the slash-separated path; anchor
/// them (`^...$`) to match whole paths.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    patterns: Vec<Regex>,
}

impl ExclusionRules {
    /// Compile patterns in manifest order.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> PlanResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|source| PlanError::InvalidPattern {
                    pattern: p.as_ref().to_string(),
                    source,
                })
            })
            .collect::<PlanResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Rules that exclude nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether any rule matches `path`.
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(path))
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether there are no rules.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
