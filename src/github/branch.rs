//! Feature branch naming.

use std::fmt;

/// Normalise a free-form type name for use inside a branch name.
///
/// Lower-cases, maps whitespace, `/`, `:` and `-` to `_`, collapses runs of
/// `_` and strips leading/trailing `_`. Applying it twice gives the same
/// result as applying it once.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        let c = if c.is_whitespace() || matches!(c, '/' | ':' | '-') {
            '_'
        } else {
            c
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').to_string()
}

/// Branch name of the form `auto/{type}/issue-{n}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchName(String);

impl BranchName {
    /// Build the branch name for an issue. An empty sanitized type becomes
    /// `general`.
    #[must_use]
    pub fn for_issue(kind: &str, issue_number: u64) -> Self {
        let clean = sanitize(kind);
        let clean = if clean.is_empty() {
            "general".to_string()
        } else {
            clean
        };
        Self(format!("auto/{}/issue-{}", clean, issue_number))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
