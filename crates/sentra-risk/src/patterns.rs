//! Ordered heuristic pattern table.
//!
//! Patterns are evaluated top-to-bottom and the first match wins. The order
//! is itself policy: narrow read-only patterns come first and disk-level
//! destruction last, so a command matching several categories (for example
//! `sudo rm -rf /`) is caught by the most specific dangerous pattern before
//! a generic one can under-classify it. Reordering entries changes decisions
//! and is pinned by tests.

use regex::Regex;
use std::sync::LazyLock;

/// Partial override of [`crate::RiskDimensions`] asserted by one pattern.
///
/// Only the dimensions the pattern has an opinion about are set; the rest
/// default to the neutral baseline when the override is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DimensionOverride {
    /// Asserted uniqueness score.
    pub uniqueness: Option<u8>,
    /// Asserted complexity score.
    pub complexity: Option<u8>,
    /// Asserted irreversibility score.
    pub irreversibility: Option<u8>,
    /// Asserted consequences score.
    pub consequences: Option<u8>,
    /// Asserted confidence score.
    pub confidence: Option<u8>,
}

/// One entry of the heuristic table: a predicate and the dimensions it asserts.
#[derive(Debug)]
pub struct RiskPattern {
    /// Human-readable category, used in assessment reasoning.
    pub name: &'static str,
    /// Predicate over the normalized command text.
    pub pattern: Regex,
    /// Partial dimension override applied on match.
    pub dimensions: DimensionOverride,
}

static COMMON_PATTERNS: LazyLock<Vec<RiskPattern>> = LazyLock::new(|| {
    let entry = |name, pattern: &str, dimensions| RiskPattern {
        name,
        pattern: Regex::new(pattern).expect("static risk pattern must compile"),
        dimensions,
    };
    vec![
        // Trivial read-only commands
        entry(
            "read-only command",
            r"(?i)^(ls|pwd|whoami|date|uptime|free|df|cat|head|tail|grep|find|which|echo)\b",
            DimensionOverride {
                uniqueness: Some(5),
                complexity: Some(5),
                irreversibility: Some(0),
                consequences: Some(0),
                confidence: Some(95),
            },
        ),
        // Network diagnostics
        entry(
            "network diagnostic",
            r"(?i)^(ping|curl|wget|nslookup|dig|traceroute|netstat|ss)\b",
            DimensionOverride {
                uniqueness: Some(15),
                complexity: Some(10),
                irreversibility: Some(0),
                consequences: Some(5),
                confidence: Some(90),
            },
        ),
        // Package managers: reversible but consequential
        entry(
            "package install",
            r"(?i)^(npm|yarn|pip|apt|brew)\s+(install|add)\b",
            DimensionOverride {
                uniqueness: Some(10),
                complexity: Some(20),
                irreversibility: Some(30),
                consequences: Some(40),
                confidence: Some(85),
            },
        ),
        // Recursive deletion
        entry(
            "recursive delete",
            r"(?i)\brm\s+(-rf?|--recursive)\b",
            DimensionOverride {
                uniqueness: Some(20),
                complexity: Some(15),
                irreversibility: Some(95),
                consequences: Some(80),
                confidence: Some(60),
            },
        ),
        // Privilege escalation
        entry(
            "privileged command",
            r"(?i)^sudo\b",
            DimensionOverride {
                irreversibility: Some(70),
                consequences: Some(70),
                confidence: Some(50),
                ..DimensionOverride::default()
            },
        ),
        // Disk-level operations
        entry(
            "disk operation",
            r"(?i)\b(dd|mkfs|fdisk|parted)\b",
            DimensionOverride {
                uniqueness: Some(80),
                complexity: Some(60),
                irreversibility: Some(100),
                consequences: Some(100),
                confidence: Some(30),
            },
        ),
    ]
});

/// Match a command against the ordered table; first match wins.
///
/// Returns the matching pattern, or `None` when no heuristic applies and the
/// caller should fall back to a model-based assessment.
#[must_use]
pub fn match_common_pattern(command: &str) -> Option<&'static RiskPattern> {
    let normalized = command.trim();
    COMMON_PATTERNS.iter().find(|p| p.pattern.is_match(normalized))
}
