//! Version parsing for plugin manifests.
//!
//! Plugin authors write short versions like `1.2` or `v2`; these are padded
//! to three components before being parsed as semver.

use std::cmp::Ordering;

use semver::Version;

/// Parse a version, padding missing minor/patch components with zeros.
pub fn parse_lenient(raw: &str) -> Result<Version, semver::Error> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split_at);

    let mut padded = core.to_string();
    for _ in core.matches('.').count()..2 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);

    Version::parse(&padded)
}

/// Compare two version strings; `None` when either cannot be parsed.
pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    let a = parse_lenient(a).ok()?;
    let b = parse_lenient(b).ok()?;
    Some(a.cmp(&b))
}

/// Whether `available` is strictly newer than `installed`.
///
/// Unparseable versions never count as newer.
pub fn is_newer(available: &str, installed: &str) -> bool {
    compare(available, installed) == Some(Ordering::Greater)
}

/// Whether `current` satisfies a minimum version requirement.
pub fn meets_minimum(current: &Version, minimum: &str) -> bool {
    parse_lenient(minimum).is_ok_and(|min| *current >= min)
}
