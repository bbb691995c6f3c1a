//! Identifier types shared by the Templar crates.
//!
//! A [`TemplateId`] names one fixture configuration. It ends up embedded in a
//! PostgreSQL database name, so the accepted alphabet is restricted to
//! characters that are safe inside an identifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest accepted template id.
pub const MAX_TEMPLATE_ID_LEN: usize = 30;

/// Error returned when a template id fails validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl IdParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

/// Identity of a template database's fixture content.
///
/// Matches `[0-9a-zA-Z_]{1,30}`. Two ids are equal iff their strings are
/// equal; the same id must always describe the same fixture rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TemplateId(String);

impl TemplateId {
    pub fn new(value: impl Into<String>) -> Result<Self, IdParseError> {
        let value = value.into();
        validate(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(value: &str) -> Result<(), IdParseError> {
    if value.is_empty() || value.len() > MAX_TEMPLATE_ID_LEN {
        return Err(IdParseError::new(format!(
            "Invalid template ID '{}': must be 1 to {} characters",
            value, MAX_TEMPLATE_ID_LEN
        )));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
    {
        return Err(IdParseError::new(format!(
            "Invalid template ID '{}': unexpected character {:?}",
            value, bad
        )));
    }
    Ok(())
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TemplateId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for TemplateId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TemplateId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TemplateId> for String {
    fn from(id: TemplateId) -> Self {
        id.0
    }
}
