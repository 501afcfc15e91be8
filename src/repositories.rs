use crate::{
    domain::{CredentialRepository, MemeRepository, ProfileRepository, VoteCondition},
    errors::RepoError,
    models::{Credential, Direction, Meme, Profile},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    types::{AttributeValue, ReturnValue},
    Client as DynamoDbClient,
};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{self, info};
use uuid::Uuid;

type Item = HashMap<String, AttributeValue>;

// --- Memes ---

#[derive(Debug, Clone)]
pub struct DynamoDbMemeRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbMemeRepository {
    /// Creates a new repository instance configured for a specific table.
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbMemeRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl MemeRepository for DynamoDbMemeRepository {
    /// Stores a `Meme` using a PutItem guarded against overwriting an existing ID.
    async fn create(&self, meme: &Meme) -> Result<(), RepoError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("meme_id", AttributeValue::S(meme.meme_id.to_string()))
            .item("title", AttributeValue::S(meme.title.clone()))
            .item("username", AttributeValue::S(meme.username.clone()))
            .item("image_key", AttributeValue::S(meme.image_key.clone()))
            .item("content_type", AttributeValue::S(meme.content_type.clone()))
            .item("votes", AttributeValue::N(meme.votes.to_string()))
            .item("created_at", AttributeValue::N(meme.created_at.to_string()))
            .condition_expression("attribute_not_exists(meme_id)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_conditional_check_failed_exception()) => {
                Err(RepoError::Conflict(format!("meme {}", meme.meme_id)))
            }
            Err(err) => Err(RepoError::BackendError(anyhow::Error::new(err).context(format!(
                "DynamoDB (table: {}): Failed to put meme (id: {})",
                self.table_name, meme.meme_id
            )))),
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Meme>, RepoError> {
        let id_str = id.to_string();
        let resp = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("meme_id", AttributeValue::S(id_str.clone()))
            .consistent_read(true)
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get meme (id: {})", self.table_name, id_str))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => match item_to_meme(&item) {
                Some(meme) => Ok(Some(meme)),
                None => {
                    tracing::error!(meme_id = %id_str, table_name = %self.table_name, "DynamoDB: Retrieved item but failed to parse into Meme");
                    Err(RepoError::DataCorruption(format!(
                        "Failed to parse meme data retrieved from DynamoDB table '{}' for id {}",
                        self.table_name, id_str
                    )))
                }
            },
            None => Ok(None),
        }
    }

    /// Lists all memes using DynamoDB Scan. Handles pagination.
    async fn list_all(&self) -> Result<Vec<Meme>, RepoError> {
        tracing::debug!("DynamoDB: Scanning table '{}' for all memes", self.table_name);
        let mut memes: Vec<Meme> = Vec::new();
        let mut last_evaluated_key: Option<Item> = None;

        loop {
            let mut request_builder = self.client.scan().table_name(&self.table_name);

            if let Some(lek) = last_evaluated_key {
                request_builder = request_builder.set_exclusive_start_key(Some(lek));
            }

            let resp = request_builder
                .send()
                .await
                .context(format!("DynamoDB: Failed to scan table '{}'", self.table_name))
                .map_err(RepoError::BackendError)?;

            for item in resp.items.unwrap_or_default() {
                match item_to_meme(&item) {
                    Some(meme) => memes.push(meme),
                    None => {
                        let item_id = item.get("meme_id").and_then(|v| v.as_s().ok());
                        tracing::error!(item.id = ?item_id, table_name = %self.table_name, "DynamoDB: Failed to parse item from scan into Meme");
                        return Err(RepoError::DataCorruption(format!(
                            "DynamoDB: Failed to parse item {:?} during scan of table '{}'",
                            item_id, self.table_name
                        )));
                    }
                }
            }

            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
            tracing::debug!("DynamoDB Scan (table: {}): Continuing with LastEvaluatedKey...", self.table_name);
        }

        tracing::debug!("DynamoDB (table: {}): Scanned {} memes", self.table_name, memes.len());
        Ok(memes)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
        let id_str = id.to_string();
        tracing::debug!(meme_id = %id_str, table_name = %self.table_name, "DynamoDB: Deleting item");

        let resp = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("meme_id", AttributeValue::S(id_str.clone()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to delete meme (id: {})", self.table_name, id_str))
            .map_err(RepoError::BackendError)?;

        Ok(resp.attributes.is_some_and(|old| !old.is_empty()))
    }

    /// Applies `ADD votes :delta`, conditional on the item existing, so
    /// concurrent voters never lose updates and a deleted meme is never recreated.
    async fn adjust_votes(&self, id: Uuid, delta: i64) -> Result<Option<i64>, RepoError> {
        let id_str = id.to_string();
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("meme_id", AttributeValue::S(id_str.clone()))
            .update_expression("ADD votes :delta")
            .condition_expression("attribute_exists(meme_id)")
            .expression_attribute_values(":delta", AttributeValue::N(delta.to_string()))
            .return_values(ReturnValue::UpdatedNew)
            .send()
            .await;

        match result {
            Ok(output) => {
                let votes = output
                    .attributes()
                    .and_then(|attrs| number_attr::<i64>(attrs, "votes"))
                    .ok_or_else(|| {
                        RepoError::DataCorruption(format!(
                            "DynamoDB (table: {}): votes missing after update of meme {}",
                            self.table_name, id_str
                        ))
                    })?;
                Ok(Some(votes))
            }
            Err(err) if err.as_service_error().is_some_and(|e| e.is_conditional_check_failed_exception()) => {
                tracing::debug!(meme_id = %id_str, "DynamoDB: Vote adjustment skipped, meme does not exist");
                Ok(None)
            }
            Err(err) => Err(RepoError::BackendError(anyhow::Error::new(err).context(format!(
                "DynamoDB (table: {}): Failed to adjust votes (id: {})",
                self.table_name, id_str
            )))),
        }
    }
}

// --- Profiles ---

#[derive(Debug, Clone)]
pub struct DynamoDbProfileRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbProfileRepository {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbProfileRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl ProfileRepository for DynamoDbProfileRepository {
    async fn create(&self, profile: &Profile) -> Result<(), RepoError> {
        let voted_memes = profile
            .voted_memes
            .iter()
            .map(|(id, dir)| (id.to_string(), AttributeValue::S(dir.as_str().to_string())))
            .collect();

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("username", AttributeValue::S(profile.username.clone()))
            .item("email", AttributeValue::S(profile.email.clone()))
            .item("created_at", AttributeValue::N(profile.created_at.to_string()))
            // The map must exist for `SET voted_memes.#meme` to succeed later.
            .item("voted_memes", AttributeValue::M(voted_memes))
            .condition_expression("attribute_not_exists(username)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_conditional_check_failed_exception()) => {
                Err(RepoError::Conflict(format!("profile {}", profile.username)))
            }
            Err(err) => Err(RepoError::BackendError(anyhow::Error::new(err).context(format!(
                "DynamoDB (table: {}): Failed to put profile (username: {})",
                self.table_name, profile.username
            )))),
        }
    }

    async fn get(&self, username: &str) -> Result<Option<Profile>, RepoError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("username", AttributeValue::S(username.to_string()))
            .consistent_read(true)
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get profile (username: {})", self.table_name, username))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => item_to_profile(&item).map(Some).ok_or_else(|| {
                tracing::error!(%username, table_name = %self.table_name, "DynamoDB: Retrieved item but failed to parse into Profile");
                RepoError::DataCorruption(format!(
                    "Failed to parse profile retrieved from DynamoDB table '{}' for {}",
                    self.table_name, username
                ))
            }),
            None => Ok(None),
        }
    }

    async fn write_vote(
        &self,
        username: &str,
        meme_id: Uuid,
        next: Option<Direction>,
        condition: VoteCondition,
    ) -> Result<bool, RepoError> {
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("username", AttributeValue::S(username.to_string()))
            .expression_attribute_names("#votes", "voted_memes")
            .expression_attribute_names("#meme", meme_id.to_string());

        request = match next {
            Some(direction) => request
                .update_expression("SET #votes.#meme = :next")
                .expression_attribute_values(":next", AttributeValue::S(direction.as_str().to_string())),
            None => request.update_expression("REMOVE #votes.#meme"),
        };

        request = match condition {
            VoteCondition::Any => request.condition_expression("attribute_exists(username)"),
            VoteCondition::Equals(None) => request
                .condition_expression("attribute_exists(username) AND attribute_not_exists(#votes.#meme)"),
            VoteCondition::Equals(Some(expected)) => request
                .condition_expression("#votes.#meme = :expected")
                .expression_attribute_values(":expected", AttributeValue::S(expected.as_str().to_string())),
        };

        match request.send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_conditional_check_failed_exception()) => {
                tracing::debug!(%username, %meme_id, ?condition, "DynamoDB: Vote write precondition failed");
                Ok(false)
            }
            Err(err) => Err(RepoError::BackendError(anyhow::Error::new(err).context(format!(
                "DynamoDB (table: {}): Failed to write vote (username: {}, meme: {})",
                self.table_name, username, meme_id
            )))),
        }
    }
}

// --- Credentials ---

#[derive(Debug, Clone)]
pub struct DynamoDbCredentialRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbCredentialRepository {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbCredentialRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl CredentialRepository for DynamoDbCredentialRepository {
    async fn insert(&self, credential: &Credential) -> Result<(), RepoError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("username", AttributeValue::S(credential.username.clone()))
            .item("password_hash", AttributeValue::S(credential.password_hash.clone()))
            .condition_expression("attribute_not_exists(username)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_conditional_check_failed_exception()) => {
                Err(RepoError::Conflict(format!("username {}", credential.username)))
            }
            Err(err) => Err(RepoError::BackendError(anyhow::Error::new(err).context(format!(
                "DynamoDB (table: {}): Failed to put credentials (username: {})",
                self.table_name, credential.username
            )))),
        }
    }

    async fn get(&self, username: &str) -> Result<Option<Credential>, RepoError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("username", AttributeValue::S(username.to_string()))
            .consistent_read(true)
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get credentials (username: {})", self.table_name, username))
            .map_err(RepoError::BackendError)?;

        Ok(resp.item.and_then(|item| {
            Some(Credential {
                username: string_attr(&item, "username")?,
                password_hash: string_attr(&item, "password_hash")?,
            })
        }))
    }

    async fn delete(&self, username: &str) -> Result<(), RepoError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("username", AttributeValue::S(username.to_string()))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to delete credentials (username: {})", self.table_name, username))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }
}

// --- Item conversion helpers ---

fn string_attr(item: &Item, name: &str) -> Option<String> {
    item.get(name)?.as_s().ok().cloned()
}

fn number_attr<T: FromStr>(item: &Item, name: &str) -> Option<T> {
    item.get(name)?.as_n().ok()?.parse().ok()
}

fn item_to_meme(item: &Item) -> Option<Meme> {
    let meme_id = item
        .get("meme_id")?
        .as_s()
        .ok()
        .and_then(|s| Uuid::parse_str(s).ok())?;

    Some(Meme {
        meme_id,
        title: string_attr(item, "title")?,
        username: string_attr(item, "username")?,
        image_key: string_attr(item, "image_key")?,
        content_type: string_attr(item, "content_type").unwrap_or_else(|| "application/octet-stream".to_string()),
        votes: number_attr(item, "votes").unwrap_or(0),
        created_at: number_attr(item, "created_at")?,
    })
}

fn item_to_profile(item: &Item) -> Option<Profile> {
    let mut voted_memes = HashMap::new();
    if let Some(map) = item.get("voted_memes").and_then(|v| v.as_m().ok()) {
        for (key, value) in map {
            let parsed = Uuid::parse_str(key)
                .ok()
                .zip(value.as_s().ok().and_then(|s| Direction::parse(s)));
            match parsed {
                Some((meme_id, direction)) => {
                    voted_memes.insert(meme_id, direction);
                }
                None => tracing::warn!(meme_key = %key, "DynamoDB: Skipping unparseable voted_memes entry"),
            }
        }
    }

    Some(Profile {
        username: string_attr(item, "username")?,
        email: string_attr(item, "email").unwrap_or_default(),
        created_at: number_attr(item, "created_at").unwrap_or(0),
        voted_memes,
    })
}
