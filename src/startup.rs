use crate::config::TableNames;
use crate::errors::AppError;
use aws_sdk_dynamodb::{
    error::SdkError as DynamoSdkError,
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType},
    Client as DynamoDbClient,
};
use aws_sdk_s3::{
    error::SdkError as S3SdkError,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client as S3Client,
};
use backoff::ExponentialBackoff;
use std::time::Duration;
use tracing;

/// How long startup keeps retrying while LocalStack/AWS comes up.
const INIT_RETRY_BUDGET: Duration = Duration::from_secs(30);

/// Creates a DynamoDB table keyed by a single string hash key, if it doesn't exist.
async fn create_dynamodb_table_if_not_exists(
    client: &DynamoDbClient,
    table_name: &str,
    key_attribute: &str,
) -> Result<(), AppError> {
    let result = client
        .create_table()
        .table_name(table_name)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(key_attribute)
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(key_attribute)
                .key_type(KeyType::Hash)
                .build()?,
        )
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await;
    match result {
        Ok(_) => {
            tracing::info!("Startup: Table '{}' created successfully or setup initiated.", table_name);
            Ok(())
        }
        Err(e) => {
            if let DynamoSdkError::ServiceError(service_err) = &e {
                if service_err.err().is_resource_in_use_exception() {
                    tracing::info!("Startup: Table '{}' already exists, no action needed.", table_name);
                    Ok(())
                } else {
                    let context = format!("Startup: Service error creating DynamoDB table '{}'", table_name);
                    tracing::error!("{}: {:?}", context, service_err);
                    Err(AppError::InitError(format!("{}: {}", context, e)))
                }
            } else {
                let context = format!("Startup: SDK error creating DynamoDB table '{}'", table_name);
                tracing::error!("{}: {}", context, e);
                Err(AppError::InitError(format!("{}: {}", context, e)))
            }
        }
    }
}

/// Ensures the S3 bucket exists, creating it with the correct location constraint if needed.
async fn ensure_s3_bucket_exists(client: &S3Client, bucket_name: &str, region_str: &str) -> Result<(), AppError> {
    let bucket_config = if region_str != "us-east-1" {
        Some(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region_str))
                .build(),
        )
    } else {
        None
    };

    let mut create_bucket_req_builder = client.create_bucket().bucket(bucket_name);
    if let Some(config) = bucket_config {
        create_bucket_req_builder = create_bucket_req_builder.create_bucket_configuration(config);
    }

    match create_bucket_req_builder.send().await {
        Ok(_) => {
            tracing::info!("Startup: S3 bucket '{}' created or already exists.", bucket_name);
            Ok(())
        }
        Err(sdk_err) => {
            if let S3SdkError::ServiceError(service_err) = &sdk_err {
                let code = service_err.err().meta().code();
                if code == Some("BucketAlreadyOwnedByYou") || code == Some("BucketAlreadyExists") {
                    tracing::info!("Startup: S3 bucket '{}' already exists.", bucket_name);
                    Ok(())
                } else {
                    let context = format!("Startup: Service error creating S3 bucket '{}'", bucket_name);
                    tracing::error!("{}: {:?}", context, service_err);
                    Err(AppError::InitError(format!("{}: {}", context, sdk_err)))
                }
            } else {
                let context = format!("Startup: SDK error creating S3 bucket '{}'", bucket_name);
                tracing::error!("{}: {}", context, sdk_err);
                Err(AppError::InitError(format!("{}: {}", context, sdk_err)))
            }
        }
    }
}

async fn init_resources_once(
    db_client: &DynamoDbClient,
    s3_client: &S3Client,
    tables: &TableNames,
    bucket_name: &str,
    region_str: &str,
) -> Result<(), AppError> {
    create_dynamodb_table_if_not_exists(db_client, &tables.memes, "meme_id").await?;
    create_dynamodb_table_if_not_exists(db_client, &tables.profiles, "username").await?;
    create_dynamodb_table_if_not_exists(db_client, &tables.credentials, "username").await?;
    ensure_s3_bucket_exists(s3_client, bucket_name, region_str).await?;
    Ok(())
}

/// Initializes required AWS resources (DynamoDB tables, S3 bucket),
/// retrying with exponential backoff for a bounded time.
pub async fn init_resources(
    db_client: &DynamoDbClient,
    s3_client: &S3Client,
    tables: &TableNames,
    bucket_name: &str,
    region_str: &str,
) -> Result<(), AppError> {
    tracing::info!("Startup: Initializing AWS resources...");
    let policy = ExponentialBackoff {
        max_elapsed_time: Some(INIT_RETRY_BUDGET),
        ..ExponentialBackoff::default()
    };
    backoff::future::retry(policy, || async move {
        init_resources_once(db_client, s3_client, tables, bucket_name, region_str)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Startup: AWS resource initialization failed, will retry");
                backoff::Error::transient(e)
            })
    })
    .await?;
    tracing::info!("Startup: AWS resource initialization complete.");
    Ok(())
}
