use serde::{Deserialize, Serialize};

use crate::model::ids::UserId;

/// An account as seen by the tutoring core.
///
/// Authentication lives elsewhere; this only carries the flags the reports
/// and access rules look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub username: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl UserAccount {
    /// Study participants are enrolled as inactive accounts.
    #[must_use]
    pub fn is_participant(&self) -> bool {
        !self.is_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_accounts_are_participants() {
        let mut user = UserAccount {
            id: UserId::new(1),
            username: "p001".into(),
            is_active: false,
            is_staff: false,
            is_superuser: false,
        };
        assert!(user.is_participant());
        user.is_active = true;
        assert!(!user.is_participant());
    }
}
