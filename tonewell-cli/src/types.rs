//! Common types used across CLI modules

use anyhow::{Result, bail};
use uuid::Uuid;

/// A job named by its full id or by an unambiguous leading fragment of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrPrefix {
    Full(Uuid),
    /// Lowercased, as printed by `job list`
    Prefix(String),
}

impl IdOrPrefix {
    /// Parses a full UUID, falling back to a prefix of one
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if let Ok(uuid) = Uuid::parse_str(input) {
            return Ok(IdOrPrefix::Full(uuid));
        }

        if input.is_empty() {
            bail!("Job id must not be empty");
        }
        if !input.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
            bail!("'{}' is not a job id or id prefix", input);
        }

        Ok(IdOrPrefix::Prefix(input.to_ascii_lowercase()))
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            IdOrPrefix::Full(uuid) => Some(*uuid),
            IdOrPrefix::Prefix(_) => None,
        }
    }

    /// Whether `id` is the job this names
    pub fn matches(&self, id: &Uuid) -> bool {
        match self {
            IdOrPrefix::Full(uuid) => uuid == id,
            IdOrPrefix::Prefix(prefix) => id.hyphenated().to_string().starts_with(prefix.as_str()),
        }
    }
}

impl std::fmt::Display for IdOrPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdOrPrefix::Full(uuid) => write!(f, "{}", uuid),
            IdOrPrefix::Prefix(prefix) => write!(f, "{}", prefix),
        }
    }
}
