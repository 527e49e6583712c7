//! Branch name validation and newtype.
//!
//! Branch names arrive from API clients and end up as reference names in
//! the object store, so they are checked against git's reference rules
//! before any lookup happens.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Characters git refuses in reference names.
const FORBIDDEN_CHARS: &[char] = &[' ', '~', '^', ':', '?', '*', '[', '\\'];

/// Sequences git refuses anywhere in a reference name.
const FORBIDDEN_SEQUENCES: &[&str] = &["..", "//", "@{", "/."];

/// A validated branch name.
///
/// # Examples
///
/// ```
/// use mergeway_core::BranchName;
///
/// assert!(BranchName::new("feature/auth").is_ok());
/// assert!(BranchName::new("../etc/passwd").is_err());
/// assert!(BranchName::new("branch..name").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidReference`] if the name violates git's
    /// reference naming rules.
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        if let Some(reason) = violation(&name) {
            return Err(Error::InvalidReference { name, reason });
        }
        Ok(Self(name))
    }

    /// Get the branch name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for BranchName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for BranchName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Serialize for BranchName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BranchName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// Describe the first rule `name` breaks, if any.
fn violation(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("branch name cannot be empty".into());
    }
    if name == "@" {
        return Some("branch name cannot be '@'".into());
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Some("branch name cannot start or end with '.'".into());
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Some("branch name cannot start or end with '/'".into());
    }
    // git's rule is case-sensitive
    #[allow(clippy::case_sensitive_file_extension_comparisons)]
    if name.ends_with(".lock") {
        return Some("branch name cannot end with '.lock'".into());
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return Some("branch name cannot contain control characters".into());
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Some(format!("branch name cannot contain '{c}'"));
    }
    FORBIDDEN_SEQUENCES
        .iter()
        .find(|seq| name.contains(**seq))
        .map(|seq| format!("branch name cannot contain '{seq}'"))
}
