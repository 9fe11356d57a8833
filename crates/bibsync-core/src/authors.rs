use serde::{Deserialize, Serialize};

use crate::normalize::normalize_text;

/// A structured author as delivered by APIs that split given and family names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    pub given: String,
    pub family: String,
}

impl PersonName {
    pub fn new(given: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            given: given.into(),
            family: family.into(),
        }
    }

    /// "Given Family", trimmed when either half is missing.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.given, self.family).trim().to_string()
    }
}

/// The author side of a match: a free-text list or a structured list.
///
/// Providers resolve their own payload shapes into one of these two forms so
/// the matcher never sees provider-specific JSON.
#[derive(Debug, Clone, Copy)]
pub enum AuthorCandidate<'a> {
    /// Comma-separated "Given Family, Given Family" text.
    Text(&'a str),
    Structured(&'a [PersonName]),
}

impl<'a> From<&'a str> for AuthorCandidate<'a> {
    fn from(s: &'a str) -> Self {
        AuthorCandidate::Text(s)
    }
}

impl<'a> From<&'a String> for AuthorCandidate<'a> {
    fn from(s: &'a String) -> Self {
        AuthorCandidate::Text(s.as_str())
    }
}

impl<'a> From<&'a [PersonName]> for AuthorCandidate<'a> {
    fn from(names: &'a [PersonName]) -> Self {
        AuthorCandidate::Structured(names)
    }
}

impl<'a> From<&'a Vec<PersonName>> for AuthorCandidate<'a> {
    fn from(names: &'a Vec<PersonName>) -> Self {
        AuthorCandidate::Structured(names.as_slice())
    }
}

impl AuthorCandidate<'_> {
    /// Flatten into "First Last" strings, one per author.
    fn names(&self) -> Vec<String> {
        match self {
            AuthorCandidate::Text(s) => s.split(',').map(|n| n.to_string()).collect(),
            AuthorCandidate::Structured(list) => list
                .iter()
                .map(|p| format!("{} {}", p.given, p.family))
                .collect(),
        }
    }
}

/// A normalized (first name, last name) pair.
///
/// The first whitespace token is the first name; all remaining tokens form the
/// last name, so multi-part surnames ("van der Berg") stay intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorName {
    pub first: String,
    pub last: String,
}

impl AuthorName {
    /// Parse and normalize a name. Returns `None` for fewer than two tokens.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = normalize_text(name);
        let parts: Vec<&str> = normalized.split_whitespace().collect();
        if parts.len() < 2 {
            return None;
        }
        Some(Self {
            first: parts[0].to_string(),
            last: parts[1..].join(" "),
        })
    }

    /// Whether `candidate` names the same person as `self` (the query).
    ///
    /// Last names must be equal. First names must be equal, or the candidate
    /// must carry only an initial ("m.") that agrees with the query's first
    /// letter. A partial given name such as "ma" is not accepted.
    pub fn matches(&self, candidate: &AuthorName) -> bool {
        if self.last != candidate.last {
            return false;
        }
        if self.first == candidate.first {
            return true;
        }
        is_initial_of(&candidate.first, &self.first)
    }
}

/// `token` is exactly "<letter>." and the letter is the first letter of `name`.
fn is_initial_of(token: &str, name: &str) -> bool {
    let mut chars = token.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(initial), Some('.'), None) => name.chars().next() == Some(initial),
        _ => false,
    }
}

/// Decide whether `query_name` appears among the candidate authors.
///
/// A query with fewer than two name tokens never matches; there is not enough
/// information to tell authors apart.
pub fn author_matches<'a>(query_name: &str, candidate: impl Into<AuthorCandidate<'a>>) -> bool {
    let Some(query) = AuthorName::parse(query_name) else {
        tracing::debug!(query = query_name, "author query has fewer than two name tokens");
        return false;
    };

    candidate
        .into()
        .names()
        .iter()
        .filter_map(|n| AuthorName::parse(n))
        .any(|c| query.matches(&c))
}

/// Case-insensitive equality of the whitespace-token sets of two names.
///
/// Used to pick an author profile on services that return several homonyms;
/// token order does not matter ("Doe Jane" equals "Jane Doe").
pub fn exact_author_match(query_name: &str, author_name: &str) -> bool {
    use std::collections::HashSet;
    let lower_q = query_name.to_lowercase();
    let lower_a = author_name.to_lowercase();
    let q: HashSet<&str> = lower_q.split_whitespace().collect();
    let a: HashSet<&str> = lower_a.split_whitespace().collect();
    !q.is_empty() && q == a
}
