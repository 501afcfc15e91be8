use std::sync::Arc;

use meme_arena::aggregator::{VoteAggregator, VoteOutcome};
use meme_arena::domain::{MemeRepository, ProfileRepository};
use meme_arena::ledger::VoteLedger;
use meme_arena::memory::{InMemoryMemeRepository, InMemoryProfileRepository};
use meme_arena::models::{Direction, Meme, Profile};
use uuid::Uuid;

struct Arena {
    aggregator: VoteAggregator,
    memes: Arc<InMemoryMemeRepository>,
    profiles: Arc<InMemoryProfileRepository>,
    meme_id: Uuid,
}

async fn arena(users: &[String]) -> Arena {
    let memes = Arc::new(InMemoryMemeRepository::new());
    let profiles = Arc::new(InMemoryProfileRepository::new());
    for user in users {
        profiles
            .create(&Profile::new(user.clone(), format!("{}@example.com", user), 0))
            .await
            .unwrap();
    }

    let meme_id = Uuid::new_v4();
    memes
        .create(&Meme {
            meme_id,
            title: "contested".to_string(),
            username: "owner".to_string(),
            image_key: format!("{}.png", meme_id),
            content_type: "image/png".to_string(),
            votes: 0,
            created_at: 0,
        })
        .await
        .unwrap();

    let aggregator = VoteAggregator::new(VoteLedger::new(profiles.clone()), memes.clone());
    Arena {
        aggregator,
        memes,
        profiles,
        meme_id,
    }
}

impl Arena {
    async fn score(&self) -> i64 {
        self.memes.get_by_id(self.meme_id).await.unwrap().unwrap().votes
    }

    /// Score implied by the ledger entries of `users`.
    async fn ledger_sum(&self, users: &[String]) -> i64 {
        let mut sum = 0;
        for user in users {
            let profile = self.profiles.get(user).await.unwrap().unwrap();
            sum += profile.voted_memes.get(&self.meme_id).map_or(0, |d| d.weight());
        }
        sum
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_voters_keep_score_equal_to_ledger() {
    let users: Vec<String> = (0..40).map(|i| format!("user{i}")).collect();
    let arena = Arc::new(arena(&users).await);

    let mut handles = Vec::new();
    for (i, user) in users.iter().cloned().enumerate() {
        let arena = arena.clone();
        handles.push(tokio::spawn(async move {
            let agg = &arena.aggregator;
            let id = arena.meme_id;
            agg.cast_vote(id, Direction::Up, true, &user).await.unwrap();
            match i % 4 {
                // switch without unclicking
                0 => {
                    agg.cast_vote(id, Direction::Down, true, &user).await.unwrap();
                }
                // unclick
                1 => {
                    agg.cast_vote(id, Direction::Up, false, &user).await.unwrap();
                }
                // stale retry and mismatched unclick, both no-ops
                2 => {
                    agg.cast_vote(id, Direction::Up, true, &user).await.unwrap();
                    agg.cast_vote(id, Direction::Down, false, &user).await.unwrap();
                }
                _ => {}
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // 10 down, 10 removed, 20 up.
    assert_eq!(arena.score().await, 10);
    assert_eq!(arena.score().await, arena.ledger_sum(&users).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_duplicate_clicks_apply_once() {
    let users = vec!["alice".to_string()];
    let arena = Arc::new(arena(&users).await);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let arena = arena.clone();
        handles.push(tokio::spawn(async move {
            arena
                .aggregator
                .cast_vote(arena.meme_id, Direction::Up, true, "alice")
                .await
                .unwrap()
        }));
    }

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            VoteOutcome::Applied { .. } => applied += 1,
            VoteOutcome::Rejected { .. } => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(arena.score().await, 1);
    assert_eq!(arena.ledger_sum(&users).await, 1);
}
