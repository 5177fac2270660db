//! Wire action tokens for table-scoped delta batches.

use std::fmt;
use std::str::FromStr;

use crate::error::BookError;

/// How a delta batch mutates its target table.
///
/// `update/insert` is a real token on some table feeds (e.g. instrument);
/// it amends an existing row or inserts it when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Full snapshot; replaces any prior state for the affected symbols.
    Partial,
    /// New rows; duplicates of existing keys are a protocol fault.
    Insert,
    /// In-place amendment of existing rows.
    Update,
    /// Removal of existing rows.
    Delete,
    /// Amend when the key exists, insert otherwise.
    UpdateInsert,
}

impl Action {
    /// Parse a wire token. Matching is exact; the venue never varies case.
    pub fn parse(token: &str) -> Result<Self, BookError> {
        match token {
            "partial" => Ok(Self::Partial),
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "update/insert" => Ok(Self::UpdateInsert),
            other => Err(BookError::InvalidAction {
                token: other.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Partial => "partial",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::UpdateInsert => "update/insert",
        }
    }
}

impl FromStr for Action {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
