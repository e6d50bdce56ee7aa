//! Requirement string parsing.
//!
//! A requirement is `name` or `name@spec`, where the name may be scoped
//! (`@scope/name`) and the spec is a range, exact version or tag:
//! `react`, `react@18.2.0`, `lodash@^4.17.0`, `@types/node@^20`.

use super::error::PkgError;

/// A parsed package requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Full package name (e.g., "@scope/name" or "name").
    pub name: String,
    /// Version range, exact version or tag. `None` means latest.
    pub range: Option<String>,
}

impl PackageSpec {
    /// Parse a requirement string.
    ///
    /// The version delimiter is the *last* `@`; an `@` at position 0 is a
    /// scope marker, never a delimiter.
    pub fn parse(input: &str) -> Result<Self, PkgError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(PkgError::resolution("Empty package spec"));
        }

        let (name, range) = match input.rfind('@') {
            None | Some(0) => (input, None),
            Some(at) => {
                let range = &input[at + 1..];
                if range.is_empty() {
                    return Err(PkgError::resolution(format!(
                        "Empty version range in '{input}'"
                    )));
                }
                (&input[..at], Some(range))
            }
        };

        validate_name(name)?;

        Ok(Self {
            name: name.to_string(),
            range: range.map(str::to_string),
        })
    }

    /// The spec to resolve with: the explicit range, or `""` meaning latest.
    #[must_use]
    pub fn range_or_latest(&self) -> &str {
        self.range.as_deref().unwrap_or("")
    }
}

/// A name is one path-safe segment, or `@scope/segment` with exactly one
/// slash.
fn validate_name(name: &str) -> Result<(), PkgError> {
    if let Some(scoped) = name.strip_prefix('@') {
        let Some((scope, bare)) = scoped.split_once('/') else {
            return Err(PkgError::resolution(format!(
                "Scoped name '{name}' is missing its '/'"
            )));
        };
        if bare.contains('/') {
            return Err(PkgError::resolution(format!(
                "Scoped name '{name}' has more than one '/'"
            )));
        }
        validate_segment(scope, name)?;
        validate_segment(bare, name)
    } else {
        validate_segment(name, name)
    }
}

fn validate_segment(segment: &str, full: &str) -> Result<(), PkgError> {
    if segment.is_empty() {
        return Err(PkgError::resolution(format!(
            "Invalid package name '{full}'"
        )));
    }
    match segment
        .chars()
        .find(|&c| !c.is_alphanumeric() && c != '-' && c != '_' && c != '.')
    {
        Some(c) => Err(PkgError::resolution(format!(
            "Invalid character '{c}' in package name '{full}'"
        ))),
        None => Ok(()),
    }
}
