//! # Path Policy
//!
//! Decides, before authentication runs, whether a request path is public or
//! protected. Rules are evaluated in order and the first match wins; a path that
//! matches nothing gets the operator's default policy.
//!
//! Pattern syntax:
//! - `*` matches exactly one non-empty path segment
//! - `**` matches any number of trailing segments, including none; it must be the
//!   last segment of the pattern
//! - anything else matches the segment literally

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::config::PolicyRule;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::IncomingRequest;

/// How requests to a path are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathPolicy {
    /// Bypass the authentication pipeline
    Public,
    /// Require a valid bearer credential
    Protected,
}

/// Result of evaluating a request against the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// CORS preflight, always permitted
    Preflight,
    Public,
    Protected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Single,
    Trailing,
}

/// A compiled path pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> GatewayResult<Self> {
        if !pattern.starts_with('/') {
            return Err(GatewayError::config(format!(
                "pattern '{}' must start with '/'",
                pattern
            )));
        }

        let parts: Vec<&str> = split_segments(pattern).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (index, part) in parts.iter().enumerate() {
            let segment = match *part {
                "**" if index + 1 == parts.len() => Segment::Trailing,
                "**" => {
                    return Err(GatewayError::config(format!(
                        "pattern '{}': '**' is only allowed as the last segment",
                        pattern
                    )))
                }
                "*" => Segment::Single,
                literal if literal.contains('*') => {
                    return Err(GatewayError::config(format!(
                        "pattern '{}': wildcards must span a whole segment",
                        pattern
                    )))
                }
                literal => Segment::Literal(literal.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, path: &str) -> bool {
        let mut parts = split_segments(path);
        for segment in &self.segments {
            match segment {
                Segment::Trailing => return true,
                Segment::Single => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(expected) => match parts.next() {
                    Some(part) if part == expected => {}
                    _ => return false,
                },
            }
        }
        parts.next().is_none()
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Empty segments are ignored, so `/a//b/` and `/a/b` are the same path.
fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Ordered path policy with an explicit default
#[derive(Debug, Clone)]
pub struct AuthorizationPolicy {
    rules: Vec<(PathPattern, PathPolicy)>,
    default_policy: PathPolicy,
}

impl AuthorizationPolicy {
    pub fn new(default_policy: PathPolicy) -> Self {
        Self {
            rules: Vec::new(),
            default_policy,
        }
    }

    /// Build from configuration rules, preserving their order
    pub fn from_rules(rules: &[PolicyRule], default_policy: PathPolicy) -> GatewayResult<Self> {
        let mut policy = Self::new(default_policy);
        for rule in rules {
            policy = policy.rule(&rule.pattern, rule.policy)?;
        }
        Ok(policy)
    }

    /// Append a rule; it is consulted after all rules added before it
    pub fn rule(mut self, pattern: &str, policy: PathPolicy) -> GatewayResult<Self> {
        self.rules.push((PathPattern::parse(pattern)?, policy));
        Ok(self)
    }

    pub fn default_policy(&self) -> PathPolicy {
        self.default_policy
    }

    /// Policy for a path: first matching rule, else the default
    pub fn resolve(&self, path: &str) -> PathPolicy {
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(_, policy)| *policy)
            .unwrap_or(self.default_policy)
    }

    pub fn evaluate(&self, request: &IncomingRequest) -> Access {
        if request.is_preflight() {
            return Access::Preflight;
        }
        match self.resolve(request.path()) {
            PathPolicy::Public => Access::Public,
            PathPolicy::Protected => Access::Protected,
        }
    }
}
