use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::UserId;

/// Research group assigned to new profiles.
pub const DEFAULT_RESEARCH_GROUP: char = 'a';

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProfileError {
    #[error("research group must be a single character, got {0:?}")]
    InvalidResearchGroup(String),
}

//
// ─── RESEARCH GROUP ────────────────────────────────────────────────────────────
//

/// Single-character code selecting which curriculum hierarchy applies to a user.
///
/// The code doubles as the hierarchy name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResearchGroup(char);

impl ResearchGroup {
    /// # Errors
    ///
    /// Returns `ProfileError::InvalidResearchGroup` for whitespace or control characters.
    pub fn new(code: char) -> Result<Self, ProfileError> {
        if code.is_whitespace() || code.is_control() {
            return Err(ProfileError::InvalidResearchGroup(code.to_string()));
        }
        Ok(Self(code))
    }

    #[must_use]
    pub fn code(&self) -> char {
        self.0
    }

    /// Name of the hierarchy this group studies.
    #[must_use]
    pub fn hierarchy_name(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ResearchGroup {
    fn default() -> Self {
        Self(DEFAULT_RESEARCH_GROUP)
    }
}

impl fmt::Display for ResearchGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResearchGroup {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::new(c),
            _ => Err(ProfileError::InvalidResearchGroup(s.to_owned())),
        }
    }
}

impl TryFrom<String> for ResearchGroup {
    type Error = ProfileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResearchGroup> for String {
    fn from(value: ResearchGroup) -> Self {
        value.0.to_string()
    }
}

//
// ─── PROFILE ───────────────────────────────────────────────────────────────────
//

/// Per-user study profile. Progress figures are derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub research_group: ResearchGroup,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl UserProfile {
    #[must_use]
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            research_group: ResearchGroup::default(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Move the profile to another research group, touching `modified_at`.
    pub fn assign_group(&mut self, group: ResearchGroup, now: DateTime<Utc>) {
        self.research_group = group;
        self.modified_at = now;
    }

    #[must_use]
    pub fn default_hierarchy_name(&self) -> String {
        self.research_group.hierarchy_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn new_profile_uses_default_group() {
        let profile = UserProfile::new(UserId::new(1), fixed_now());
        assert_eq!(profile.research_group.code(), 'a');
        assert_eq!(profile.default_hierarchy_name(), "a");
        assert_eq!(profile.created_at, profile.modified_at);
    }

    #[test]
    fn research_group_parses_single_char_only() {
        assert_eq!("b".parse::<ResearchGroup>().unwrap().code(), 'b');
        assert!("".parse::<ResearchGroup>().is_err());
        assert!("ab".parse::<ResearchGroup>().is_err());
        assert!(" ".parse::<ResearchGroup>().is_err());
    }

    #[test]
    fn assign_group_touches_modified() {
        let mut profile = UserProfile::new(UserId::new(1), fixed_now());
        let later = fixed_now() + chrono::Duration::minutes(5);
        profile.assign_group(ResearchGroup::new('c').unwrap(), later);
        assert_eq!(profile.research_group.code(), 'c');
        assert_eq!(profile.modified_at, later);
        assert_eq!(profile.created_at, fixed_now());
    }
}
