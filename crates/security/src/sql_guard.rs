//! Lexical read-only gate for generated SQL.
//!
//! This is a fast first check, not a parser. Obfuscated statements can get
//! past any keyword blacklist, so the store connection itself must be
//! read-only.

use serde::{Deserialize, Serialize};

/// Keywords that make a statement a write or a schema change.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
];

/// Leading keywords of an accepted statement.
pub const ALLOWED_PREFIXES: &[&str] = &["SELECT", "WITH"];

/// Why a statement was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum GuardViolation {
    Empty,
    ForbiddenKeyword { keyword: String },
    NotAQuery { leading: String },
}

impl std::fmt::Display for GuardViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty statement"),
            Self::ForbiddenKeyword { keyword } => write!(f, "forbidden keyword {keyword}"),
            Self::NotAQuery { leading } => {
                write!(f, "statement starts with {leading:?}, expected SELECT or WITH")
            }
        }
    }
}

/// Split into maximal runs of ASCII letters, digits and `_`.
fn tokens(upper: &str) -> impl Iterator<Item = &str> {
    upper
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
}

/// Configurable read-only gate. `SqlGuard::default()` applies the standard
/// keyword list.
#[derive(Debug, Clone)]
pub struct SqlGuard {
    forbidden: Vec<String>,
}

impl Default for SqlGuard {
    fn default() -> Self {
        Self {
            forbidden: FORBIDDEN_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl SqlGuard {
    /// Add more forbidden keywords (e.g. `ATTACH`, `PRAGMA`).
    pub fn with_extra_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.forbidden
            .extend(keywords.into_iter().map(|k| k.as_ref().to_ascii_uppercase()));
        self
    }

    /// Check a statement, reporting the first violation found.
    pub fn check(&self, sql: &str) -> Result<(), GuardViolation> {
        let upper = sql.trim().to_uppercase();
        if upper.is_empty() {
            return Err(GuardViolation::Empty);
        }

        // Substring match: `dropped` or `x_update` is refused along with `DROP`.
        if let Some(keyword) = self.forbidden.iter().find(|k| upper.contains(k.as_str())) {
            return Err(GuardViolation::ForbiddenKeyword {
                keyword: keyword.clone(),
            });
        }

        if !ALLOWED_PREFIXES.iter().any(|p| upper.starts_with(p)) {
            let leading = tokens(&upper).next().unwrap_or_default().to_string();
            return Err(GuardViolation::NotAQuery { leading });
        }

        Ok(())
    }

    pub fn is_safe(&self, sql: &str) -> bool {
        self.check(sql).is_ok()
    }
}

/// Whether `sql` is a read-only query under the standard keyword list.
pub fn is_safe(sql: &str) -> bool {
    SqlGuard::default().is_safe(sql)
}
