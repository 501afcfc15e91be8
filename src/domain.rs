use crate::errors::{RepoError, StorageError};
use crate::models::{Credential, Direction, Meme, Profile};
use async_trait::async_trait;
use uuid::Uuid;

/// Trait defining operations for storing and retrieving Meme metadata.
#[async_trait]
pub trait MemeRepository: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    /// Inserts a new meme. Fails with `RepoError::Conflict` if the ID is taken.
    async fn create(&self, meme: &Meme) -> Result<(), RepoError>;

    /// Returns Ok(None) if the meme is not found.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Meme>, RepoError>;

    /// Lists all meme metadata.
    /// WARNING: This can be inefficient on large datasets.
    async fn list_all(&self) -> Result<Vec<Meme>, RepoError>;

    /// Returns whether a meme was actually removed.
    async fn delete(&self, id: Uuid) -> Result<bool, RepoError>;

    /// Atomically adds `delta` to the meme's score.
    /// Returns the new score, or Ok(None) if the meme does not exist.
    async fn adjust_votes(&self, id: Uuid, delta: i64) -> Result<Option<i64>, RepoError>;
}

/// Precondition on a user's current vote for one meme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteCondition {
    /// Only require the profile to exist.
    Any,
    /// Require the recorded vote to equal this value (`None` = no vote).
    Equals(Option<Direction>),
}

/// Per-user profile documents, including the `voted_memes` map.
#[async_trait]
pub trait ProfileRepository: Send + Sync + 'static {
    /// Fails with `RepoError::Conflict` if the username is taken.
    async fn create(&self, profile: &Profile) -> Result<(), RepoError>;

    async fn get(&self, username: &str) -> Result<Option<Profile>, RepoError>;

    /// Sets (`Some`) or removes (`None`) the vote for `meme_id` in a single
    /// atomic update of the profile document.
    ///
    /// Returns Ok(false) when the profile is missing or `condition` does not hold.
    async fn write_vote(
        &self,
        username: &str,
        meme_id: Uuid,
        next: Option<Direction>,
        condition: VoteCondition,
    ) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait CredentialRepository: Send + Sync + 'static {
    /// Fails with `RepoError::Conflict` if the username is taken.
    async fn insert(&self, credential: &Credential) -> Result<(), RepoError>;

    async fn get(&self, username: &str) -> Result<Option<Credential>, RepoError>;

    async fn delete(&self, username: &str) -> Result<(), RepoError>;
}

/// A stored object and its content type, if known.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

/// Trait defining operations for storing and retrieving file data (meme images).
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError>;

    /// Fails with `StorageError::NotFound` if no object exists under `key`.
    async fn download(&self, key: &str) -> Result<StoredObject, StorageError>;

    /// Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
