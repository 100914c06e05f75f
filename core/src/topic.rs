//! Topic and tuning-knob resolution from the environment.
//!
//! Topic names are configured through variables such as
//! `EVENT_TOPIC_REACTOR_STATUS`. An unset variable resolves to its own name,
//! which keeps local development working without any configuration.

use std::env;
use std::str::FromStr;

/// Resolve a topic variable.
///
/// # Examples
///
/// ```
/// use realm_core::topic;
///
/// assert_eq!(topic::resolve("EVENT_TOPIC_SURELY_UNSET_FOR_DOCS"), "EVENT_TOPIC_SURELY_UNSET_FOR_DOCS");
/// ```
#[must_use]
pub fn resolve(variable: &str) -> String {
    env::var(variable)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| variable.to_string())
}

/// Read a parsed variable, falling back to `default` when unset or invalid.
#[must_use]
pub fn env_or<T: FromStr>(variable: &str, default: T) -> T {
    env::var(variable)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
