use std::sync::Arc;

use async_trait::async_trait;
use storage::repository::{NewUserRecord, ProfileRepository, StorageError, UserRepository};
use tracing::info;
use tutor_core::model::{ResearchGroup, UserAccount, UserId, UserProfile};

use crate::Clock;
use crate::error::AccountError;

/// Runs after an account has been stored.
#[async_trait]
pub trait PostCreateHook: Send + Sync {
    /// # Errors
    ///
    /// Returns `AccountError` if the follow-up work fails; the account stays created.
    async fn after_create(&self, user: &UserAccount) -> Result<(), AccountError>;
}

/// Gives every new account its study profile in the default research group.
#[derive(Clone)]
pub struct CreateProfileHook {
    clock: Clock,
    profiles: Arc<dyn ProfileRepository>,
}

impl CreateProfileHook {
    #[must_use]
    pub fn new(clock: Clock, profiles: Arc<dyn ProfileRepository>) -> Self {
        Self { clock, profiles }
    }
}

#[async_trait]
impl PostCreateHook for CreateProfileHook {
    async fn after_create(&self, user: &UserAccount) -> Result<(), AccountError> {
        self.profiles
            .get_or_create_profile(user.id, self.clock.now())
            .await?;
        Ok(())
    }
}

/// Account creation plus the hooks that must follow it.
#[derive(Clone)]
pub struct AccountService {
    clock: Clock,
    users: Arc<dyn UserRepository>,
    profiles: Arc<dyn ProfileRepository>,
    hooks: Vec<Arc<dyn PostCreateHook>>,
}

impl AccountService {
    /// Service with the profile hook registered.
    #[must_use]
    pub fn new(
        clock: Clock,
        users: Arc<dyn UserRepository>,
        profiles: Arc<dyn ProfileRepository>,
    ) -> Self {
        let profile_hook: Arc<dyn PostCreateHook> =
            Arc::new(CreateProfileHook::new(clock, Arc::clone(&profiles)));
        Self {
            clock,
            users,
            profiles,
            hooks: vec![profile_hook],
        }
    }

    /// Register another hook; hooks run in registration order.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn PostCreateHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Store the account and run every hook on it.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::BlankUsername` for an empty name and
    /// `AccountError::Storage` with `Conflict` when the name is taken.
    pub async fn create_user(&self, record: NewUserRecord) -> Result<UserAccount, AccountError> {
        let username = record.username.trim().to_owned();
        if username.is_empty() {
            return Err(AccountError::BlankUsername);
        }
        let user = self
            .users
            .insert_user(NewUserRecord { username, ..record })
            .await?;
        for hook in &self.hooks {
            hook.after_create(&user).await?;
        }
        info!(user = %user.id, username = %user.username, "created account");
        Ok(user)
    }

    /// # Errors
    ///
    /// Returns `AccountError::Storage` on repository failures.
    pub async fn get_user(&self, user_id: UserId) -> Result<Option<UserAccount>, AccountError> {
        Ok(self.users.get_user(user_id).await?)
    }

    /// Move a user to another research group.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::Storage` with `NotFound` for an unknown user.
    pub async fn assign_research_group(
        &self,
        user_id: UserId,
        group: ResearchGroup,
    ) -> Result<UserProfile, AccountError> {
        if self.users.get_user(user_id).await?.is_none() {
            return Err(StorageError::NotFound.into());
        }
        let now = self.clock.now();
        let mut profile = self.profiles.get_or_create_profile(user_id, now).await?;
        profile.assign_group(group, now);
        self.profiles.update_profile(&profile).await?;
        info!(user = %user_id, group = %group, "assigned research group");
        Ok(profile)
    }
}
