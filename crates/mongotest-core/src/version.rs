//! Version parsing and range expressions
//!
//! Ranges use the npm-style syntax found in test metadata: comparators
//! separated by whitespace or commas, `||` alternatives, and partial versions
//! (`3.6` means any `3.6.x`).

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A parsed range expression such as `>=3.4.0 <4.0 || >=4.2`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    source: String,
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    /// Parse a range expression
    pub fn parse(expr: &str) -> Result<Self, String> {
        let mut alternatives = Vec::new();
        for alternative in expr.split("||") {
            let normalized = normalize_comparators(alternative)?;
            let req = if normalized.is_empty() {
                VersionReq::STAR
            } else {
                VersionReq::parse(&normalized)
                    .map_err(|e| format!("invalid version range '{}': {}", expr.trim(), e))?
            };
            alternatives.push(req);
        }

        Ok(Self {
            source: expr.trim().to_string(),
            alternatives,
        })
    }

    /// Check whether a version satisfies any alternative of this range
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// The expression as written
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for VersionRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionRange {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionRange> for String {
    fn from(range: VersionRange) -> Self {
        range.source
    }
}

/// Turn `>= 3.4 <4.0` into the comma-separated form `semver` expects
fn normalize_comparators(alternative: &str) -> Result<String, String> {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;

    for token in alternative
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
    {
        let op_len = token
            .find(|c: char| !matches!(c, '>' | '<' | '=' | '~' | '^'))
            .unwrap_or(token.len());
        let (op, rest) = token.split_at(op_len);

        if rest.is_empty() {
            if pending_op.is_some() {
                return Err(format!("dangling operator in '{}'", alternative.trim()));
            }
            pending_op = Some(op.to_string());
            continue;
        }

        let op = match pending_op.take() {
            Some(p) if op.is_empty() => p,
            Some(_) => return Err(format!("dangling operator in '{}'", alternative.trim())),
            None => op.to_string(),
        };
        let rest = rest.trim_start_matches('v');

        if matches!(rest, "*" | "x" | "X") {
            continue;
        }
        // A bare version is an exact match on the components given
        let op = if op.is_empty() { "=".to_string() } else { op };
        comparators.push(format!("{}{}", op, rest));
    }

    if pending_op.is_some() {
        return Err(format!("dangling operator in '{}'", alternative.trim()));
    }
    Ok(comparators.join(", "))
}

/// Parse a reported version leniently (`v18.2.0`, `4.0`, `4.4.0-rc0`)
pub fn parse_version(raw: &str) -> Option<Version> {
    let token = raw.split_whitespace().next()?.trim_start_matches('v');
    if let Ok(version) = Version::parse(token) {
        return Some(version);
    }

    let (core, suffix) = match token.find(|c: char| c == '-' || c == '+') {
        Some(idx) => token.split_at(idx),
        None => (token, ""),
    };
    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }
    Version::parse(&format!("{}{}", parts.join("."), suffix)).ok()
}
