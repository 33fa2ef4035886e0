//! The credential gate: registration and login against the user table.

use thiserror::Error;

use crate::db::{Database, User};
use crate::password::PasswordPolicy;

/// Failed credential checks. The `Display` text is what the client sees.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Passwords do not match.")]
    PasswordMismatch,
    #[error("{0}")]
    Policy(String),
    #[error("Username {0} already exists.")]
    UsernameTaken(String),
    #[error("User {0} does not exist.")]
    UnknownUser(String),
    #[error("User {0} does not match password.")]
    WrongPassword(String),
    #[error("internal error: {0}")]
    Store(#[from] rusqlite::Error),
}

pub struct AuthHandler {
    db: Database,
    policy: PasswordPolicy,
}

impl AuthHandler {
    pub fn new(db: Database, policy: PasswordPolicy) -> Self {
        Self { db, policy }
    }

    /// Register a new account. Checks run in order: repeated password,
    /// password policy, username availability.
    pub fn register(&self, username: &str, password: &str, repeated: &str) -> Result<(), AuthError> {
        if password != repeated {
            return Err(AuthError::PasswordMismatch);
        }
        self.policy.check(password).map_err(AuthError::Policy)?;
        if self.db.user_by_name(username)?.is_some() {
            return Err(AuthError::UsernameTaken(username.to_owned()));
        }
        self.db.add_user(&User {
            username: username.to_owned(),
            password: password.to_owned(),
        })?;
        tracing::info!(user = %username, "registered new user");
        Ok(())
    }

    /// Validate a login attempt against the stored credentials.
    pub fn login(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let Some(user) = self.db.user_by_name(username)? else {
            return Err(AuthError::UnknownUser(username.to_owned()));
        };
        if user.password != password {
            return Err(AuthError::WrongPassword(username.to_owned()));
        }
        Ok(())
    }
}
