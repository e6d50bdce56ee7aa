//! Version selection against a registry root document.

use super::error::PkgError;
use super::registry::RootDoc;
use semver::{Version, VersionReq};

/// Resolve a spec against a root document.
///
/// # Rules
/// - Empty spec or `latest`: the version `dist-tags.latest` points at.
/// - A spec that is an exact key of `versions`: selected directly, never
///   parsed as a range.
/// - Otherwise the spec is parsed as a semver constraint (npm flavors
///   included: `1.x`, `*`, hyphen ranges, `||` alternatives, space-separated
///   AND comparators) and the highest satisfying version wins.
pub fn resolve_version(name: &str, doc: &RootDoc, spec: &str) -> Result<String, PkgError> {
    let spec = spec.trim();

    if spec.is_empty() || spec == "latest" {
        return doc
            .latest()
            .map(String::from)
            .ok_or_else(|| PkgError::protocol(format!("No dist-tags.latest for {name}")));
    }

    if doc.versions.contains_key(spec) {
        return Ok(spec.to_string());
    }

    let mut parsed: Vec<Version> = doc
        .versions
        .keys()
        .filter_map(|v| Version::parse(v).ok())
        .collect();
    parsed.sort_by(|a, b| b.cmp(a));

    if spec.contains("||") {
        return resolve_or_range(name, spec, &parsed);
    }

    let req = parse_range(spec)?;
    parsed
        .iter()
        .find(|v| req.matches(v))
        .map(std::string::ToString::to_string)
        .ok_or_else(|| PkgError::no_matching_version(name, spec))
}

/// Resolve an OR range like `^1.0.0 || ^2.0.0`: the highest version matching
/// any alternative wins.
fn resolve_or_range(name: &str, spec: &str, versions: &[Version]) -> Result<String, PkgError> {
    let reqs: Vec<VersionReq> = spec
        .split("||")
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .filter_map(|alt| parse_range(alt).ok())
        .collect();

    if reqs.is_empty() {
        return Err(PkgError::resolution(format!(
            "Invalid version range '{spec}': no valid alternatives"
        )));
    }

    versions
        .iter()
        .find(|v| reqs.iter().any(|req| req.matches(v)))
        .map(std::string::ToString::to_string)
        .ok_or_else(|| PkgError::no_matching_version(name, spec))
}

/// Parse a single range, normalizing npm syntax the semver crate rejects.
fn parse_range(range: &str) -> Result<VersionReq, PkgError> {
    let range = range.trim();

    // Hyphen ranges: "1.0.0 - 2.0.0" means ">=1.0.0, <=2.0.0".
    if let Some((start, end)) = range.split_once(" - ") {
        let (start, end) = (start.trim(), end.trim());
        if !start.is_empty() && !end.is_empty() {
            let converted = format!(">={start}, <={end}");
            return VersionReq::parse(&converted)
                .map_err(|e| PkgError::resolution(format!("Invalid version range '{range}': {e}")));
        }
    }

    // X-ranges: "1.x", "1.2.X", "*".
    if range == "*" || range.contains(['x', 'X']) {
        let converted = convert_x_range(range);
        return VersionReq::parse(&converted)
            .map_err(|e| PkgError::resolution(format!("Invalid version range '{range}': {e}")));
    }

    // npm treats whitespace between comparators as AND; semver wants commas.
    let converted = join_comparators(range);

    VersionReq::parse(&converted)
        .map_err(|e| PkgError::resolution(format!("Invalid version range '{range}': {e}")))
}

/// Rejoin whitespace-separated comparators with commas, keeping bare
/// operators attached to the version that follows (">= 1.2.0 < 2.0.0"
/// becomes ">=1.2.0, <2.0.0").
fn join_comparators(range: &str) -> String {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op = String::new();

    for token in range.split_whitespace() {
        if token.chars().any(|c| c.is_ascii_digit()) {
            comparators.push(format!("{pending_op}{token}"));
            pending_op.clear();
        } else {
            // Operator with the version in the next token.
            pending_op.push_str(token);
        }
    }
    if !pending_op.is_empty() {
        comparators.push(pending_op);
    }

    if comparators.is_empty() {
        range.to_string()
    } else {
        comparators.join(", ")
    }
}

/// Convert an x-range to comparator form.
fn convert_x_range(range: &str) -> String {
    let range = range.trim();

    if range == "*" || range == "x" || range == "X" {
        return ">=0.0.0".to_string();
    }

    let parts: Vec<&str> = range.split('.').collect();
    match parts.as_slice() {
        [major, "x" | "X" | "*"] => {
            if let Ok(m) = major.parse::<u64>() {
                return format!(">={m}.0.0, <{}.0.0", m + 1);
            }
        }
        [major, minor, "x" | "X" | "*"] => {
            if let (Ok(m), Ok(n)) = (major.parse::<u64>(), minor.parse::<u64>()) {
                return format!(">={m}.{n}.0, <{m}.{}.0", n + 1);
            }
        }
        _ => {}
    }

    range.replace(['x', 'X'], "0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::registry::{Dist, VersionMeta};
    use std::collections::BTreeMap;

    fn make_doc(versions: &[&str], latest: &str) -> RootDoc {
        let mut doc = RootDoc::default();
        doc.dist_tags
            .insert("latest".to_string(), latest.to_string());
        for v in versions {
            doc.versions.insert(
                (*v).to_string(),
                VersionMeta {
                    name: "test-pkg".to_string(),
                    version: (*v).to_string(),
                    dependencies: BTreeMap::new(),
                    dist: Dist {
                        tarball: format!("https://example.com/{v}.tgz"),
                        integrity: None,
                        shasum: None,
                    },
                },
            );
        }
        doc
    }

    #[test]
    fn test_resolve_latest() {
        let doc = make_doc(&["1.0.0", "2.0.0", "3.0.0"], "3.0.0");
        assert_eq!(resolve_version("p", &doc, "").unwrap(), "3.0.0");
        assert_eq!(resolve_version("p", &doc, "latest").unwrap(), "3.0.0");
    }

    #[test]
    fn test_resolve_latest_missing_tag() {
        let mut doc = make_doc(&["1.0.0"], "1.0.0");
        doc.dist_tags.clear();
        let err = resolve_version("p", &doc, "").unwrap_err();
        assert_eq!(err.code(), crate::pkg::codes::PROTOCOL_ERROR);
    }

    #[test]
    fn test_resolve_exact_version() {
        let doc = make_doc(&["1.0.0", "2.0.0", "3.0.0"], "3.0.0");
        assert_eq!(resolve_version("p", &doc, "2.0.0").unwrap(), "2.0.0");
    }

    #[test]
    fn test_resolve_caret_range() {
        let doc = make_doc(&["1.0.0", "1.5.0", "2.0.0", "2.5.0"], "2.5.0");
        assert_eq!(resolve_version("p", &doc, "^1.0.0").unwrap(), "1.5.0");
    }

    #[test]
    fn test_resolve_tilde_range() {
        let doc = make_doc(&["1.0.0", "1.0.5", "1.1.0", "2.0.0"], "2.0.0");
        assert_eq!(resolve_version("p", &doc, "~1.0.0").unwrap(), "1.0.5");
    }

    #[test]
    fn test_resolve_no_match() {
        let doc = make_doc(&["1.0.0", "2.0.0"], "2.0.0");
        let err = resolve_version("p", &doc, "^3.0.0").unwrap_err();
        assert_eq!(err.code(), crate::pkg::codes::RESOLUTION_ERROR);
    }

    #[test]
    fn test_resolve_prerelease_discipline() {
        let doc = make_doc(
            &["1.0.0", "2.0.0-alpha.1", "2.0.0-beta.1", "2.0.0"],
            "2.0.0",
        );
        // Caret ranges do not match prereleases by default.
        assert_eq!(resolve_version("p", &doc, "^2.0.0").unwrap(), "2.0.0");
    }

    #[test]
    fn test_invalid_range() {
        let doc = make_doc(&["1.0.0"], "1.0.0");
        assert!(resolve_version("p", &doc, "not-a-range!!!").is_err());
    }

    #[test]
    fn test_or_range_picks_highest() {
        let doc = make_doc(&["1.5.0", "2.5.0"], "2.5.0");
        assert_eq!(
            resolve_version("p", &doc, "^1.0.0 || ^2.0.0").unwrap(),
            "2.5.0"
        );
    }

    #[test]
    fn test_or_range_only_one_side_matches() {
        let doc = make_doc(&["1.0.0", "1.5.0"], "1.5.0");
        assert_eq!(
            resolve_version("p", &doc, "^1.0.0 || ^2.0.0").unwrap(),
            "1.5.0"
        );
    }

    #[test]
    fn test_or_range_without_spaces() {
        let doc = make_doc(&["14.0.0", "15.0.0"], "15.0.0");
        assert_eq!(
            resolve_version("p", &doc, "^14.0.0||^15.0.0").unwrap(),
            "15.0.0"
        );
    }

    #[test]
    fn test_or_range_no_match() {
        let doc = make_doc(&["1.0.0", "2.0.0"], "2.0.0");
        assert!(resolve_version("p", &doc, "^3.0.0 || ^4.0.0").is_err());
    }

    #[test]
    fn test_x_range() {
        let doc = make_doc(&["1.0.0", "1.5.0", "2.0.0"], "2.0.0");
        assert_eq!(resolve_version("p", &doc, "1.x").unwrap(), "1.5.0");
    }

    #[test]
    fn test_minor_x_range() {
        let doc = make_doc(&["1.2.0", "1.2.9", "1.3.0"], "1.3.0");
        assert_eq!(resolve_version("p", &doc, "1.2.x").unwrap(), "1.2.9");
    }

    #[test]
    fn test_star_matches_all() {
        let doc = make_doc(&["0.5.0", "1.0.0"], "1.0.0");
        assert_eq!(resolve_version("p", &doc, "*").unwrap(), "1.0.0");
    }

    #[test]
    fn test_hyphen_range() {
        let doc = make_doc(&["1.0.0", "1.5.0", "2.0.0", "3.0.0"], "3.0.0");
        assert_eq!(
            resolve_version("p", &doc, "1.0.0 - 2.0.0").unwrap(),
            "2.0.0"
        );
    }

    #[test]
    fn test_space_separated_comparators() {
        let doc = make_doc(&["2.0.0", "2.1.2", "2.5.0", "3.0.0"], "3.0.0");
        assert_eq!(
            resolve_version("p", &doc, ">= 2.1.2 < 3.0.0").unwrap(),
            "2.5.0"
        );
        assert_eq!(
            resolve_version("p", &doc, ">=2.1.2 <3.0.0").unwrap(),
            "2.5.0"
        );
    }

    #[test]
    fn test_major_only_range() {
        let doc = make_doc(&["1.0.0", "1.5.0", "2.0.0", "2.5.0"], "2.5.0");
        assert_eq!(resolve_version("p", &doc, "2").unwrap(), "2.5.0");
    }

    #[test]
    fn test_determinism() {
        let doc = make_doc(&["1.0.0", "1.2.0", "1.4.0"], "1.4.0");
        let first = resolve_version("p", &doc, "^1.0.0").unwrap();
        for _ in 0..10 {
            assert_eq!(resolve_version("p", &doc, "^1.0.0").unwrap(), first);
        }
    }
}
