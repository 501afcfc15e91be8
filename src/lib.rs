pub mod accounts;
pub mod aggregator;
pub mod aws_clients;
pub mod config;
pub mod domain;
pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod identity;
pub mod ledger;
pub mod listing;
pub mod memory;
pub mod models;
pub mod passwords;
pub mod repositories;
pub mod routes;
pub mod startup;
pub mod storage;


use std::sync::Arc;

use crate::{
    accounts::AccountService,
    aggregator::VoteAggregator,
    aws_clients::{create_dynamodb_client, create_s3_client, create_sdk_config},
    config::{Config, DataBackend},
    domain::{CredentialRepository, FileStorage, MemeRepository, ProfileRepository},
    errors::AppError,
    identity::{IdentityProvider, JwtIdentityProvider},
    ledger::VoteLedger,
    listing::MemeFeed,
    memory::{InMemoryCredentialRepository, InMemoryFileStorage, InMemoryMemeRepository, InMemoryProfileRepository},
    passwords::PasswordHasher,
    repositories::{DynamoDbCredentialRepository, DynamoDbMemeRepository, DynamoDbProfileRepository},
    storage::S3FileStorage,
};

/// Store capabilities the services are built from.
#[derive(Clone)]
pub struct Stores {
    pub memes: Arc<dyn MemeRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub credentials: Arc<dyn CredentialRepository>,
    pub files: Arc<dyn FileStorage>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            memes: Arc::new(InMemoryMemeRepository::new()),
            profiles: Arc::new(InMemoryProfileRepository::new()),
            credentials: Arc::new(InMemoryCredentialRepository::new()),
            files: Arc::new(InMemoryFileStorage::new()),
        }
    }

    /// Builds AWS clients and makes sure the tables and bucket exist.
    pub async fn aws(config: &Config) -> Result<Self, AppError> {
        let sdk_config = create_sdk_config(config).await;
        let db_client = create_dynamodb_client(&sdk_config);
        let s3_client = create_s3_client(&sdk_config);

        startup::init_resources(
            &db_client,
            &s3_client,
            &config.tables,
            &config.meme_bucket_name,
            &config.aws_region,
        )
        .await?;

        Ok(Self {
            memes: Arc::new(DynamoDbMemeRepository::new(db_client.clone(), config.tables.memes.clone())),
            profiles: Arc::new(DynamoDbProfileRepository::new(db_client.clone(), config.tables.profiles.clone())),
            credentials: Arc::new(DynamoDbCredentialRepository::new(db_client, config.tables.credentials.clone())),
            files: Arc::new(S3FileStorage::new(s3_client, config.meme_bucket_name.clone())),
        })
    }
}

/// AppState holds shared resources for the web server.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub meme_repo: Arc<dyn MemeRepository>,
    pub file_storage: Arc<dyn FileStorage>,
    pub identity: Arc<dyn IdentityProvider>,
    pub accounts: AccountService,
    pub aggregator: VoteAggregator,
    pub feed: MemeFeed,
}

impl AppState {
    pub fn new(config: Config, stores: Stores) -> Self {
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(JwtIdentityProvider::new(&config.jwt_secret, config.token_ttl));
        let ledger = VoteLedger::new(stores.profiles.clone());

        let accounts = AccountService::new(
            stores.credentials,
            stores.profiles,
            identity.clone(),
            PasswordHasher::new(config.password_hash_iterations),
        );
        let aggregator = VoteAggregator::new(ledger.clone(), stores.memes.clone());
        let feed = MemeFeed::new(stores.memes.clone(), ledger, config.list_page_size);

        Self {
            config,
            meme_repo: stores.memes,
            file_storage: stores.files,
            identity,
            accounts,
            aggregator,
            feed,
        }
    }

    /// Connects the backend selected by `config.data_backend`.
    pub async fn connect(config: Config) -> Result<Self, AppError> {
        let stores = match config.data_backend {
            DataBackend::Aws => Stores::aws(&config).await?,
            DataBackend::Memory => {
                tracing::warn!("Using in-memory data backend; all data is lost on shutdown");
                Stores::in_memory()
            }
        };
        Ok(Self::new(config, stores))
    }
}
