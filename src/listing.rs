use crate::{
    config::MAX_LIST_PAGE_SIZE,
    domain::MemeRepository,
    errors::RepoError,
    ledger::VoteLedger,
    models::{MemeSummary, PageRequest},
};
use std::cmp::Reverse;
use std::sync::Arc;
use tracing;

/// Read path for meme listings. Never mutates anything.
#[derive(Clone)]
pub struct MemeFeed {
    memes: Arc<dyn MemeRepository>,
    ledger: VoteLedger,
    default_page_size: usize,
}

impl MemeFeed {
    pub fn new(memes: Arc<dyn MemeRepository>, ledger: VoteLedger, default_page_size: usize) -> Self {
        Self {
            memes,
            ledger,
            default_page_size: default_page_size.clamp(1, MAX_LIST_PAGE_SIZE),
        }
    }

    /// Highest-voted memes first (newest first among ties), each annotated
    /// with `viewer`'s current vote. The viewer's profile is read once per call.
    pub async fn list(&self, viewer: Option<&str>, page: PageRequest) -> Result<Vec<MemeSummary>, RepoError> {
        let limit = page.limit.unwrap_or(self.default_page_size).clamp(1, MAX_LIST_PAGE_SIZE);
        let offset = page.offset.unwrap_or(0);

        let mut memes = self.memes.list_all().await?;
        memes.sort_by_key(|meme| (Reverse(meme.votes), Reverse(meme.created_at), meme.meme_id));

        let viewer_votes = match viewer {
            Some(username) => self.ledger.votes_for(username).await?.unwrap_or_default(),
            None => Default::default(),
        };

        let page: Vec<MemeSummary> = memes
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|meme| MemeSummary {
                user_vote: viewer_votes.get(&meme.meme_id).copied(),
                id: meme.meme_id,
                title: meme.title,
                username: meme.username,
                votes: meme.votes,
                created_at: meme.created_at,
            })
            .collect();

        tracing::debug!(viewer = ?viewer, limit, offset, returned = page.len(), "Listed memes");
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::VoteAggregator;
    use crate::domain::ProfileRepository;
    use crate::memory::{InMemoryMemeRepository, InMemoryProfileRepository};
    use crate::models::{Direction, Meme, Profile};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn meme(title: &str, votes: i64, created_at: i64) -> Meme {
        let meme_id = Uuid::new_v4();
        Meme {
            meme_id,
            title: title.to_string(),
            username: "owner".to_string(),
            image_key: format!("{}.jpg", meme_id),
            content_type: "image/jpeg".to_string(),
            votes,
            created_at,
        }
    }

    /// Counts profile reads so listings can be checked for a single lookup.
    #[derive(Default)]
    struct CountingProfiles {
        inner: InMemoryProfileRepository,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl ProfileRepository for CountingProfiles {
        async fn create(&self, profile: &Profile) -> Result<(), RepoError> {
            self.inner.create(profile).await
        }
        async fn get(&self, username: &str) -> Result<Option<Profile>, RepoError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(username).await
        }
        async fn write_vote(
            &self,
            username: &str,
            meme_id: Uuid,
            next: Option<Direction>,
            condition: crate::domain::VoteCondition,
        ) -> Result<bool, RepoError> {
            self.inner.write_vote(username, meme_id, next, condition).await
        }
    }

    #[tokio::test]
    async fn orders_by_votes_then_recency_and_pages() {
        let memes = Arc::new(InMemoryMemeRepository::new());
        for m in [meme("old-top", 5, 10), meme("new-top", 5, 20), meme("low", -3, 30), meme("mid", 1, 5)] {
            memes.create(&m).await.unwrap();
        }
        let ledger = VoteLedger::new(Arc::new(InMemoryProfileRepository::new()));
        let feed = MemeFeed::new(memes, ledger, 8);

        let all = feed.list(None, PageRequest::default()).await.unwrap();
        let titles: Vec<_> = all.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["new-top", "old-top", "mid", "low"]);

        let second_page = feed
            .list(None, PageRequest { limit: Some(2), offset: Some(2) })
            .await
            .unwrap();
        let titles: Vec<_> = second_page.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["mid", "low"]);
    }

    #[tokio::test]
    async fn annotates_only_the_viewers_votes() {
        let memes = Arc::new(InMemoryMemeRepository::new());
        let voted = meme("voted", 0, 1);
        let other = meme("other", 0, 2);
        memes.create(&voted).await.unwrap();
        memes.create(&other).await.unwrap();

        let profiles = Arc::new(CountingProfiles::default());
        profiles.create(&Profile::new("alice", "alice@example.com", 0)).await.unwrap();
        profiles.create(&Profile::new("bob", "bob@example.com", 0)).await.unwrap();
        let ledger = VoteLedger::new(profiles.clone());
        let aggregator = VoteAggregator::new(ledger.clone(), memes.clone());
        aggregator
            .cast_vote(voted.meme_id, Direction::Up, true, "alice")
            .await
            .unwrap();

        let feed = MemeFeed::new(memes, ledger, 8);

        let reads_before = profiles.reads.load(Ordering::SeqCst);
        let as_alice = feed.list(Some("alice"), PageRequest::default()).await.unwrap();
        assert_eq!(profiles.reads.load(Ordering::SeqCst) - reads_before, 1);

        for summary in &as_alice {
            let expected = (summary.id == voted.meme_id).then_some(Direction::Up);
            assert_eq!(summary.user_vote, expected, "{}", summary.title);
        }

        let as_bob = feed.list(Some("bob"), PageRequest::default()).await.unwrap();
        assert!(as_bob.iter().all(|m| m.user_vote.is_none()));

        let anonymous = feed.list(None, PageRequest::default()).await.unwrap();
        assert!(anonymous.iter().all(|m| m.user_vote.is_none()));

        let stranger = feed.list(Some("nobody"), PageRequest::default()).await.unwrap();
        assert!(stranger.iter().all(|m| m.user_vote.is_none()));
    }

    #[tokio::test]
    async fn limit_is_capped() {
        let memes = Arc::new(InMemoryMemeRepository::new());
        for i in 0..(MAX_LIST_PAGE_SIZE as i64 + 5) {
            memes.create(&meme("bulk", 0, i)).await.unwrap();
        }
        let feed = MemeFeed::new(memes, VoteLedger::new(Arc::new(InMemoryProfileRepository::new())), 8);

        assert_eq!(feed.list(None, PageRequest::default()).await.unwrap().len(), 8);
        let capped = feed
            .list(None, PageRequest { limit: Some(1_000), offset: None })
            .await
            .unwrap();
        assert_eq!(capped.len(), MAX_LIST_PAGE_SIZE);
    }
}
