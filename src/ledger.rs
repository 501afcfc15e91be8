use crate::{
    domain::{ProfileRepository, VoteCondition},
    errors::RepoError,
    models::Direction,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Per-user record of which memes a user currently has a vote on, and in
/// which direction. Backed by the `voted_memes` map of the profile document;
/// every call reads or writes exactly one profile.
#[derive(Clone)]
pub struct VoteLedger {
    profiles: Arc<dyn ProfileRepository>,
}

impl VoteLedger {
    pub fn new(profiles: Arc<dyn ProfileRepository>) -> Self {
        Self { profiles }
    }

    /// Current vote of `username` on `meme_id`; `None` also covers unknown users.
    pub async fn get_vote(&self, username: &str, meme_id: Uuid) -> Result<Option<Direction>, RepoError> {
        Ok(self
            .votes_for(username)
            .await?
            .and_then(|votes| votes.get(&meme_id).copied()))
    }

    /// All active votes of `username`, or `None` if the user has no profile.
    pub async fn votes_for(&self, username: &str) -> Result<Option<HashMap<Uuid, Direction>>, RepoError> {
        Ok(self.profiles.get(username).await?.map(|profile| profile.voted_memes))
    }

    /// Upserts the vote. Returns false if the profile does not exist.
    pub async fn set_vote(&self, username: &str, meme_id: Uuid, direction: Direction) -> Result<bool, RepoError> {
        self.profiles
            .write_vote(username, meme_id, Some(direction), VoteCondition::Any)
            .await
    }

    /// Removes the vote; a missing entry is a no-op. Returns false if the profile does not exist.
    pub async fn clear_vote(&self, username: &str, meme_id: Uuid) -> Result<bool, RepoError> {
        self.profiles
            .write_vote(username, meme_id, None, VoteCondition::Any)
            .await
    }

    /// Moves the entry from `expected` to `next` only if it still holds
    /// `expected`. Returns false if another request changed it first or the
    /// profile is gone.
    pub async fn replace_vote(
        &self,
        username: &str,
        meme_id: Uuid,
        expected: Option<Direction>,
        next: Option<Direction>,
    ) -> Result<bool, RepoError> {
        self.profiles
            .write_vote(username, meme_id, next, VoteCondition::Equals(expected))
            .await
    }
}
