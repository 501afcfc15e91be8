use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Direction of a single user's vote on a meme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn from_upvote(upvote: bool) -> Self {
        if upvote { Direction::Up } else { Direction::Down }
    }

    /// Contribution of one vote in this direction to a meme's score.
    pub fn weight(self) -> i64 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Meme {
    pub meme_id: Uuid,
    pub title: String,
    /// Owner of the meme.
    pub username: String,
    pub image_key: String,
    pub content_type: String,
    pub votes: i64,
    /// Unix seconds.
    pub created_at: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Profile {
    pub username: String,
    pub email: String,
    pub created_at: i64,
    /// Active votes only; a missing key means no vote.
    pub voted_memes: HashMap<Uuid, Direction>,
}

impl Profile {
    pub fn new(username: impl Into<String>, email: impl Into<String>, created_at: i64) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            created_at,
            voted_memes: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password_hash: String,
}

// --- API payloads ---

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct VoteRequest {
    pub upvote: bool,
    pub clicked: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokenResponse {
    pub auth_token: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub username: String,
    pub email: String,
    pub is_admin: bool,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MemeCreatedResponse {
    pub meme_id: Uuid,
}

/// One entry of a listing, annotated with the caller's vote.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemeSummary {
    pub id: Uuid,
    pub title: String,
    pub username: String,
    pub votes: i64,
    pub created_at: i64,
    pub user_vote: Option<Direction>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MemeListResponse {
    pub memes: Vec<MemeSummary>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub outcome: String,
    pub delta: i64,
    pub votes: i64,
    pub user_vote: Option<Direction>,
}

#[derive(Deserialize, Debug, Clone, Copy, Default)]
pub struct PageRequest {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}
