//! Message flags.

use std::fmt;

/// A message flag or keyword.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// `\Seen`
    Seen,
    /// `\Answered`
    Answered,
    /// `\Flagged`
    Flagged,
    /// `\Deleted`
    Deleted,
    /// `\Draft`
    Draft,
    /// `\Recent` (session-only, never stored)
    Recent,
    /// `$Forwarded` keyword
    Forwarded,
    /// Any other keyword, or `\*` in PERMANENTFLAGS.
    Keyword(String),
}

impl Flag {
    /// Parses a flag atom (case-insensitive for system flags).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "\\seen" => Self::Seen,
            "\\answered" => Self::Answered,
            "\\flagged" => Self::Flagged,
            "\\deleted" => Self::Deleted,
            "\\draft" => Self::Draft,
            "\\recent" => Self::Recent,
            "$forwarded" => Self::Forwarded,
            _ => Self::Keyword(s.to_string()),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seen => f.write_str("\\Seen"),
            Self::Answered => f.write_str("\\Answered"),
            Self::Flagged => f.write_str("\\Flagged"),
            Self::Deleted => f.write_str("\\Deleted"),
            Self::Draft => f.write_str("\\Draft"),
            Self::Recent => f.write_str("\\Recent"),
            Self::Forwarded => f.write_str("$Forwarded"),
            Self::Keyword(k) => f.write_str(k),
        }
    }
}

/// Renders flags as a parenthesized IMAP list.
pub(crate) fn flag_list(flags: &[Flag]) -> String {
    let inner: Vec<String> = flags.iter().map(ToString::to_string).collect();
    format!("({})", inner.join(" "))
}
