use crate::{
    domain::{CredentialRepository, ProfileRepository},
    errors::{AppError, RepoError},
    identity::{AuthError, IdentityProvider},
    models::{Credential, Profile},
    passwords::{PasswordError, PasswordHasher},
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing;

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Username must be 3-32 characters of letters, digits, '_' or '-'")]
    InvalidUsername,
    #[error("Password must be at least 8 characters")]
    WeakPassword,
    #[error("Email address is not valid")]
    InvalidEmail,
    #[error("Username is already taken")]
    UsernameTaken,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Password hashing failed: {0}")]
    Password(#[from] PasswordError),
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidUsername | AccountError::WeakPassword | AccountError::InvalidEmail => {
                AppError::InvalidInput(err.to_string())
            }
            AccountError::UsernameTaken => AppError::Conflict(err.to_string()),
            AccountError::InvalidCredentials => AppError::Unauthorized(err.to_string()),
            AccountError::Repo(e) => e.into(),
            AccountError::Auth(e) => e.into(),
            AccountError::Password(e) => AppError::InternalServerError(e.to_string()),
        }
    }
}

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn valid_username(username: &str) -> bool {
    (3..=32).contains(&username.len())
        && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !email.contains(char::is_whitespace),
        None => false,
    }
}

/// Registration, login and profile lookup.
#[derive(Clone)]
pub struct AccountService {
    credentials: Arc<dyn CredentialRepository>,
    profiles: Arc<dyn ProfileRepository>,
    identity: Arc<dyn IdentityProvider>,
    hasher: PasswordHasher,
}

impl AccountService {
    pub fn new(
        credentials: Arc<dyn CredentialRepository>,
        profiles: Arc<dyn ProfileRepository>,
        identity: Arc<dyn IdentityProvider>,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            credentials,
            profiles,
            identity,
            hasher,
        }
    }

    /// Creates credentials and an empty profile, then returns a fresh token.
    pub async fn register(&self, username: &str, password: &str, email: &str) -> Result<String, AccountError> {
        if !valid_username(username) {
            return Err(AccountError::InvalidUsername);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountError::WeakPassword);
        }
        let email = email.trim();
        if !valid_email(email) {
            return Err(AccountError::InvalidEmail);
        }

        let credential = Credential {
            username: username.to_string(),
            password_hash: self.hasher.hash(password)?,
        };
        match self.credentials.insert(&credential).await {
            Ok(()) => {}
            Err(RepoError::Conflict(_)) => return Err(AccountError::UsernameTaken),
            Err(e) => return Err(e.into()),
        }

        let profile = Profile::new(username, email, unix_timestamp());
        match self.profiles.create(&profile).await {
            Ok(()) => {}
            Err(RepoError::Conflict(_)) => {
                // A profile without credentials is left from an earlier partial registration.
                tracing::warn!(%username, "Profile already existed for newly registered credentials");
            }
            Err(e) => {
                tracing::error!(%username, error = %e, "Profile creation failed, removing credentials");
                if let Err(cleanup) = self.credentials.delete(username).await {
                    tracing::error!(%username, error = %cleanup, "Failed to remove orphaned credentials");
                }
                return Err(e.into());
            }
        }

        tracing::info!(%username, "User registered");
        Ok(self.identity.issue_token(username)?)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<String, AccountError> {
        let Some(credential) = self.credentials.get(username).await? else {
            tracing::debug!(%username, "Login for unknown user");
            return Err(AccountError::InvalidCredentials);
        };
        if !self.hasher.verify(password, &credential.password_hash)? {
            tracing::debug!(%username, "Login with wrong password");
            return Err(AccountError::InvalidCredentials);
        }
        tracing::info!(%username, "User logged in");
        Ok(self.identity.issue_token(username)?)
    }

    pub async fn profile(&self, username: &str) -> Result<Option<Profile>, AccountError> {
        Ok(self.profiles.get(username).await?)
    }
}
