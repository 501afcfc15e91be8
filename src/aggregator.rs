use crate::{
    domain::MemeRepository,
    errors::RepoError,
    ledger::VoteLedger,
    models::Direction,
};
use std::sync::Arc;
use tracing;
use uuid::Uuid;

/// Attempts at the conditional ledger write before giving up on a request
/// whose user keeps changing the same vote concurrently.
const MAX_LEDGER_ATTEMPTS: usize = 3;

/// Why a vote request changed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Unclick with no active vote.
    NothingToRemove,
    /// Click on the direction that is already active.
    AlreadyVoted,
    /// Unclick of the opposite direction to the active one.
    DirectionMismatch,
    /// The user's vote kept changing underneath this request.
    Contended,
}

/// What a vote request does, derived only from the recorded vote and the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Register(Direction),
    Switch { from: Direction, to: Direction },
    Remove(Direction),
    Reject(RejectReason),
}

impl Decision {
    pub fn decide(recorded: Option<Direction>, direction: Direction, clicked: bool) -> Self {
        match (recorded, clicked) {
            (None, true) => Decision::Register(direction),
            (None, false) => Decision::Reject(RejectReason::NothingToRemove),
            (Some(current), true) if current == direction => Decision::Reject(RejectReason::AlreadyVoted),
            (Some(current), true) => Decision::Switch { from: current, to: direction },
            (Some(current), false) if current == direction => Decision::Remove(current),
            (Some(_), false) => Decision::Reject(RejectReason::DirectionMismatch),
        }
    }

    /// Change to the meme's score.
    pub fn delta(&self) -> i64 {
        match *self {
            Decision::Register(direction) => direction.weight(),
            Decision::Switch { from, to } => to.weight() - from.weight(),
            Decision::Remove(direction) => -direction.weight(),
            Decision::Reject(_) => 0,
        }
    }

    /// Ledger entry after the decision is applied, given the one before it.
    pub fn next_vote(&self, recorded: Option<Direction>) -> Option<Direction> {
        match *self {
            Decision::Register(direction) => Some(direction),
            Decision::Switch { to, .. } => Some(to),
            Decision::Remove(_) => None,
            Decision::Reject(_) => recorded,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Decision::Register(_) => "registered",
            Decision::Switch { .. } => "switched",
            Decision::Remove(_) => "removed",
            Decision::Reject(_) => "rejected",
        }
    }
}

/// Result of `cast_vote`. Not-found and rejected cases are ordinary values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Applied {
        decision: Decision,
        votes: i64,
        user_vote: Option<Direction>,
    },
    /// Processed successfully with no effect; `votes` is the score observed
    /// while handling the request.
    Rejected {
        reason: RejectReason,
        votes: i64,
        user_vote: Option<Direction>,
    },
    ItemNotFound,
    ProfileNotFound,
}

impl VoteOutcome {
    pub fn delta(&self) -> i64 {
        match self {
            VoteOutcome::Applied { decision, .. } => decision.delta(),
            _ => 0,
        }
    }
}

/// Applies vote intents to meme scores while keeping them consistent with
/// the ledger.
#[derive(Clone)]
pub struct VoteAggregator {
    ledger: VoteLedger,
    memes: Arc<dyn MemeRepository>,
}

impl VoteAggregator {
    pub fn new(ledger: VoteLedger, memes: Arc<dyn MemeRepository>) -> Self {
        Self { ledger, memes }
    }

    pub fn ledger(&self) -> &VoteLedger {
        &self.ledger
    }

    /// Records `username`'s vote intent on `meme_id`.
    ///
    /// The ledger write is conditional on the vote the decision was derived
    /// from, so duplicate submissions racing each other resolve to one
    /// applied change and rejections for the rest. The score is adjusted only
    /// after the ledger write succeeds.
    pub async fn cast_vote(
        &self,
        meme_id: Uuid,
        direction: Direction,
        clicked: bool,
        username: &str,
    ) -> Result<VoteOutcome, RepoError> {
        let Some(meme) = self.memes.get_by_id(meme_id).await? else {
            tracing::debug!(%meme_id, %username, "Vote on unknown meme");
            return Ok(VoteOutcome::ItemNotFound);
        };

        for attempt in 1..=MAX_LEDGER_ATTEMPTS {
            let Some(votes) = self.ledger.votes_for(username).await? else {
                tracing::debug!(%meme_id, %username, "Vote from user without profile");
                return Ok(VoteOutcome::ProfileNotFound);
            };
            let recorded = votes.get(&meme_id).copied();

            let decision = Decision::decide(recorded, direction, clicked);
            if let Decision::Reject(reason) = decision {
                tracing::debug!(%meme_id, %username, ?reason, ?recorded, "Vote rejected");
                return Ok(VoteOutcome::Rejected {
                    reason,
                    votes: meme.votes,
                    user_vote: recorded,
                });
            }

            let next = decision.next_vote(recorded);
            if !self.ledger.replace_vote(username, meme_id, recorded, next).await? {
                tracing::debug!(%meme_id, %username, attempt, "Ledger changed concurrently, re-deciding");
                continue;
            }

            return match self.memes.adjust_votes(meme_id, decision.delta()).await? {
                Some(votes) => {
                    tracing::info!(%meme_id, %username, decision = decision.label(), delta = decision.delta(), votes, "Vote applied");
                    Ok(VoteOutcome::Applied {
                        decision,
                        votes,
                        user_vote: next,
                    })
                }
                None => {
                    // Meme deleted between the existence check and the score write.
                    self.undo_ledger_write(username, meme_id, next, recorded).await?;
                    Ok(VoteOutcome::ItemNotFound)
                }
            };
        }

        tracing::warn!(%meme_id, %username, "Vote abandoned after repeated concurrent ledger changes");
        Ok(VoteOutcome::Rejected {
            reason: RejectReason::Contended,
            votes: meme.votes,
            user_vote: self.ledger.get_vote(username, meme_id).await?,
        })
    }

    async fn undo_ledger_write(
        &self,
        username: &str,
        meme_id: Uuid,
        written: Option<Direction>,
        previous: Option<Direction>,
    ) -> Result<(), RepoError> {
        if self.ledger.replace_vote(username, meme_id, written, previous).await? {
            tracing::info!(%meme_id, %username, "Rolled back ledger entry for deleted meme");
        } else {
            tracing::warn!(%meme_id, %username, "Ledger entry changed before rollback; left as is");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProfileRepository;
    use crate::memory::{InMemoryMemeRepository, InMemoryProfileRepository};
    use crate::models::{Meme, Profile};
    use async_trait::async_trait;

    use crate::models::Direction::{Down, Up};

    struct Fixture {
        aggregator: VoteAggregator,
        memes: Arc<InMemoryMemeRepository>,
        meme_id: Uuid,
    }

    fn meme(meme_id: Uuid) -> Meme {
        Meme {
            meme_id,
            title: "distracted boyfriend".to_string(),
            username: "owner".to_string(),
            image_key: format!("{}.png", meme_id),
            content_type: "image/png".to_string(),
            votes: 0,
            created_at: 1_700_000_000,
        }
    }

    async fn fixture() -> Fixture {
        let memes = Arc::new(InMemoryMemeRepository::new());
        let profiles = Arc::new(InMemoryProfileRepository::new());
        profiles.create(&Profile::new("alice", "alice@example.com", 0)).await.unwrap();
        profiles.create(&Profile::new("bob", "bob@example.com", 0)).await.unwrap();

        let meme_id = Uuid::new_v4();
        memes.create(&meme(meme_id)).await.unwrap();

        let aggregator = VoteAggregator::new(VoteLedger::new(profiles), memes.clone());
        Fixture { aggregator, memes, meme_id }
    }

    impl Fixture {
        async fn score(&self) -> i64 {
            self.memes.get_by_id(self.meme_id).await.unwrap().unwrap().votes
        }

        async fn vote(&self, user: &str, direction: Direction, clicked: bool) -> VoteOutcome {
            self.aggregator
                .cast_vote(self.meme_id, direction, clicked, user)
                .await
                .unwrap()
        }

        async fn recorded(&self, user: &str) -> Option<Direction> {
            self.aggregator.ledger().get_vote(user, self.meme_id).await.unwrap()
        }
    }

    #[test]
    fn decision_table() {
        assert_eq!(Decision::decide(None, Up, true), Decision::Register(Up));
        assert_eq!(Decision::decide(None, Down, true), Decision::Register(Down));
        assert_eq!(Decision::decide(None, Up, false), Decision::Reject(RejectReason::NothingToRemove));
        assert_eq!(Decision::decide(Some(Up), Up, true), Decision::Reject(RejectReason::AlreadyVoted));
        assert_eq!(Decision::decide(Some(Up), Down, true), Decision::Switch { from: Up, to: Down });
        assert_eq!(Decision::decide(Some(Down), Down, false), Decision::Remove(Down));
        assert_eq!(Decision::decide(Some(Down), Up, false), Decision::Reject(RejectReason::DirectionMismatch));
    }

    #[test]
    fn decision_deltas() {
        assert_eq!(Decision::Register(Up).delta(), 1);
        assert_eq!(Decision::Register(Down).delta(), -1);
        assert_eq!(Decision::Switch { from: Up, to: Down }.delta(), -2);
        assert_eq!(Decision::Switch { from: Down, to: Up }.delta(), 2);
        assert_eq!(Decision::Remove(Up).delta(), -1);
        assert_eq!(Decision::Remove(Down).delta(), 1);
        assert_eq!(Decision::Reject(RejectReason::AlreadyVoted).delta(), 0);
    }

    #[tokio::test]
    async fn duplicate_click_counts_once() {
        let fx = fixture().await;

        let first = fx.vote("alice", Up, true).await;
        assert_eq!(first.delta(), 1);
        let second = fx.vote("alice", Up, true).await;
        assert!(matches!(second, VoteOutcome::Rejected { reason: RejectReason::AlreadyVoted, votes: 1, .. }));

        assert_eq!(fx.score().await, 1);
        assert_eq!(fx.recorded("alice").await, Some(Up));
    }

    #[tokio::test]
    async fn unclick_restores_previous_score() {
        let fx = fixture().await;

        fx.vote("alice", Down, true).await;
        assert_eq!(fx.score().await, -1);
        let outcome = fx.vote("alice", Down, false).await;

        assert_eq!(outcome.delta(), 1);
        assert_eq!(fx.score().await, 0);
        assert_eq!(fx.recorded("alice").await, None);
    }

    #[tokio::test]
    async fn switching_direction_moves_score_by_two() {
        let fx = fixture().await;

        fx.vote("alice", Up, true).await;
        let outcome = fx.vote("alice", Down, true).await;

        assert_eq!(
            outcome,
            VoteOutcome::Applied {
                decision: Decision::Switch { from: Up, to: Down },
                votes: -1,
                user_vote: Some(Down),
            }
        );
        assert_eq!(fx.recorded("alice").await, Some(Down));
    }

    #[tokio::test]
    async fn removing_a_vote_that_was_never_cast_is_rejected() {
        let fx = fixture().await;

        let outcome = fx.vote("alice", Down, false).await;

        assert!(matches!(outcome, VoteOutcome::Rejected { reason: RejectReason::NothingToRemove, .. }));
        assert_eq!(fx.score().await, 0);
    }

    #[tokio::test]
    async fn removing_the_opposite_direction_is_rejected() {
        let fx = fixture().await;

        fx.vote("alice", Up, true).await;
        let outcome = fx.vote("alice", Down, false).await;

        assert!(matches!(outcome, VoteOutcome::Rejected { reason: RejectReason::DirectionMismatch, user_vote: Some(Up), .. }));
        assert_eq!(fx.score().await, 1);
        assert_eq!(fx.recorded("alice").await, Some(Up));
    }

    #[tokio::test]
    async fn click_unclick_walkthrough() {
        let fx = fixture().await;

        fx.vote("alice", Up, true).await;
        assert_eq!((fx.score().await, fx.recorded("alice").await), (1, Some(Up)));

        assert!(matches!(fx.vote("alice", Up, true).await, VoteOutcome::Rejected { .. }));
        assert_eq!(fx.score().await, 1);

        fx.vote("alice", Up, false).await;
        assert_eq!((fx.score().await, fx.recorded("alice").await), (0, None));

        assert!(matches!(fx.vote("alice", Down, false).await, VoteOutcome::Rejected { .. }));
        assert_eq!(fx.score().await, 0);
    }

    #[tokio::test]
    async fn score_matches_ledger_across_users() {
        let fx = fixture().await;

        fx.vote("alice", Up, true).await;
        fx.vote("bob", Down, true).await;
        fx.vote("bob", Up, true).await;

        assert_eq!(fx.score().await, 2);
        assert_eq!(fx.recorded("alice").await, Some(Up));
        assert_eq!(fx.recorded("bob").await, Some(Up));
    }

    #[tokio::test]
    async fn unknown_meme_leaves_ledger_untouched() {
        let fx = fixture().await;
        let missing = Uuid::new_v4();

        let outcome = fx.aggregator.cast_vote(missing, Up, true, "alice").await.unwrap();

        assert_eq!(outcome, VoteOutcome::ItemNotFound);
        assert!(fx.aggregator.ledger().votes_for("alice").await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_user_leaves_score_untouched() {
        let fx = fixture().await;

        let outcome = fx.vote("mallory", Up, true).await;

        assert_eq!(outcome, VoteOutcome::ProfileNotFound);
        assert_eq!(fx.score().await, 0);
    }

    /// Meme repository whose items vanish right before the score write.
    struct VanishingMemes(InMemoryMemeRepository);

    #[async_trait]
    impl MemeRepository for VanishingMemes {
        async fn create(&self, meme: &Meme) -> Result<(), RepoError> {
            self.0.create(meme).await
        }
        async fn get_by_id(&self, id: Uuid) -> Result<Option<Meme>, RepoError> {
            self.0.get_by_id(id).await
        }
        async fn list_all(&self) -> Result<Vec<Meme>, RepoError> {
            self.0.list_all().await
        }
        async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
            self.0.delete(id).await
        }
        async fn adjust_votes(&self, id: Uuid, _delta: i64) -> Result<Option<i64>, RepoError> {
            self.0.delete(id).await?;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn ledger_write_is_rolled_back_when_meme_disappears() {
        let profiles = Arc::new(InMemoryProfileRepository::new());
        profiles.create(&Profile::new("alice", "alice@example.com", 0)).await.unwrap();
        let memes = VanishingMemes(InMemoryMemeRepository::new());
        let meme_id = Uuid::new_v4();
        memes.create(&meme(meme_id)).await.unwrap();

        let aggregator = VoteAggregator::new(VoteLedger::new(profiles), Arc::new(memes));
        let outcome = aggregator.cast_vote(meme_id, Up, true, "alice").await.unwrap();

        assert_eq!(outcome, VoteOutcome::ItemNotFound);
        assert_eq!(aggregator.ledger().get_vote("alice", meme_id).await.unwrap(), None);
    }
}
