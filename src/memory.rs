//! Process-local store backends. Each map sits behind one mutex, so every
//! operation is atomic with respect to the document it touches.

use crate::{
    domain::{CredentialRepository, FileStorage, MemeRepository, ProfileRepository, StoredObject, VoteCondition},
    errors::{RepoError, StorageError},
    models::{Credential, Direction, Meme, Profile},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, anyhow::Error> {
    mutex
        .lock()
        .map_err(|_| anyhow::anyhow!("in-memory {} store lock poisoned", what))
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryMemeRepository {
    inner: Arc<Mutex<HashMap<Uuid, Meme>>>,
}

impl InMemoryMemeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemeRepository for InMemoryMemeRepository {
    async fn create(&self, meme: &Meme) -> Result<(), RepoError> {
        let mut memes = lock(&self.inner, "meme")?;
        match memes.entry(meme.meme_id) {
            Entry::Occupied(_) => Err(RepoError::Conflict(format!("meme {}", meme.meme_id))),
            Entry::Vacant(slot) => {
                slot.insert(meme.clone());
                Ok(())
            }
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Meme>, RepoError> {
        Ok(lock(&self.inner, "meme")?.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Meme>, RepoError> {
        Ok(lock(&self.inner, "meme")?.values().cloned().collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
        Ok(lock(&self.inner, "meme")?.remove(&id).is_some())
    }

    async fn adjust_votes(&self, id: Uuid, delta: i64) -> Result<Option<i64>, RepoError> {
        let mut memes = lock(&self.inner, "meme")?;
        Ok(memes.get_mut(&id).map(|meme| {
            meme.votes += delta;
            meme.votes
        }))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryProfileRepository {
    inner: Arc<Mutex<HashMap<String, Profile>>>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn create(&self, profile: &Profile) -> Result<(), RepoError> {
        let mut profiles = lock(&self.inner, "profile")?;
        match profiles.entry(profile.username.clone()) {
            Entry::Occupied(_) => Err(RepoError::Conflict(format!("profile {}", profile.username))),
            Entry::Vacant(slot) => {
                slot.insert(profile.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, username: &str) -> Result<Option<Profile>, RepoError> {
        Ok(lock(&self.inner, "profile")?.get(username).cloned())
    }

    async fn write_vote(
        &self,
        username: &str,
        meme_id: Uuid,
        next: Option<Direction>,
        condition: VoteCondition,
    ) -> Result<bool, RepoError> {
        let mut profiles = lock(&self.inner, "profile")?;
        let Some(profile) = profiles.get_mut(username) else {
            return Ok(false);
        };

        if let VoteCondition::Equals(expected) = condition {
            if profile.voted_memes.get(&meme_id).copied() != expected {
                return Ok(false);
            }
        }

        match next {
            Some(direction) => {
                profile.voted_memes.insert(meme_id, direction);
            }
            None => {
                profile.voted_memes.remove(&meme_id);
            }
        }
        Ok(true)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialRepository {
    inner: Arc<Mutex<HashMap<String, Credential>>>,
}

impl InMemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn insert(&self, credential: &Credential) -> Result<(), RepoError> {
        let mut credentials = lock(&self.inner, "credential")?;
        match credentials.entry(credential.username.clone()) {
            Entry::Occupied(_) => Err(RepoError::Conflict(format!("username {}", credential.username))),
            Entry::Vacant(slot) => {
                slot.insert(credential.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, username: &str) -> Result<Option<Credential>, RepoError> {
        Ok(lock(&self.inner, "credential")?.get(username).cloned())
    }

    async fn delete(&self, username: &str) -> Result<(), RepoError> {
        lock(&self.inner, "credential")?.remove(username);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryFileStorage {
    inner: Arc<Mutex<HashMap<String, StoredObject>>>,
}

impl InMemoryFileStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileStorage for InMemoryFileStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError> {
        lock(&self.inner, "file")?.insert(key.to_string(), StoredObject { data, content_type });
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<StoredObject, StorageError> {
        lock(&self.inner, "file")?
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        lock(&self.inner, "file")?.remove(key);
        Ok(())
    }
}
