use std::{env, fmt::Display, net::SocketAddr, str::FromStr, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
    #[error(transparent)]
    DotEnvError(#[from] dotenvy::Error),
}

/// Where memes, profiles and images are kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataBackend {
    /// DynamoDB tables plus an S3 bucket.
    Aws,
    /// Process-local maps; everything is lost on restart.
    Memory,
}

impl FromStr for DataBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(DataBackend::Aws),
            "memory" => Ok(DataBackend::Memory),
            other => Err(format!("unknown data backend '{}', expected 'aws' or 'memory'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TableNames {
    pub memes: String,
    pub profiles: String,
    pub credentials: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            memes: "memes".to_string(),
            profiles: "profiles".to_string(),
            credentials: "credentials".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub data_backend: DataBackend,
    pub meme_bucket_name: String,
    // Store region as string for simplicity here, aws_clients can convert
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub localstack_endpoint: Option<String>,
    pub tables: TableNames,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub admin_username: String,
    /// Empty means any origin is allowed.
    pub cors_allowed_origins: Vec<String>,
    pub store_timeout: Duration,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
    pub list_page_size: usize,
    pub password_hash_iterations: u32,
}

/// Upper bound for the `limit` query parameter of listings.
pub const MAX_LIST_PAGE_SIZE: usize = 50;

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors, relies on env vars otherwise)
        dotenvy::dotenv().ok();

        let bind_address = parse_var("BIND_ADDRESS", "0.0.0.0:3000".parse::<SocketAddr>().ok())?;
        let data_backend = parse_var("DATA_BACKEND", Some(DataBackend::Aws))?;

        let meme_bucket_name = match (env::var("MEME_BUCKET_NAME"), data_backend) {
            (Ok(name), _) => name,
            (Err(_), DataBackend::Memory) => String::new(),
            (Err(_), DataBackend::Aws) => return Err(ConfigError::MissingVar("MEME_BUCKET_NAME".into())),
        };

        let aws_region = env::var("AWS_DEFAULT_REGION").unwrap_or_else(|_| "ca-central-1".to_string());

        // Allow overriding endpoint for localstack/testing
        let localstack_endpoint = env::var("AWS_ENDPOINT_URL").ok();

        let defaults = TableNames::default();
        let tables = TableNames {
            memes: env::var("MEMES_TABLE").unwrap_or(defaults.memes),
            profiles: env::var("PROFILES_TABLE").unwrap_or(defaults.profiles),
            credentials: env::var("CREDENTIALS_TABLE").unwrap_or(defaults.credentials),
        };

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::MissingVar("JWT_SECRET".into()))?;
        if jwt_secret.len() < 16 {
            return Err(ConfigError::InvalidVar(
                "JWT_SECRET".into(),
                "must be at least 16 characters".into(),
            ));
        }

        let token_ttl = Duration::from_secs(parse_var("TOKEN_TTL_SECS", Some(86_400u64))?);
        let admin_username = env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
        let cors_allowed_origins = parse_origins(&env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default());
        let store_timeout = Duration::from_millis(parse_var("STORE_TIMEOUT_MS", Some(5_000u64))?);
        let request_timeout = Duration::from_millis(parse_var("REQUEST_TIMEOUT_MS", Some(15_000u64))?);
        let max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", Some(10 * 1024 * 1024usize))?;
        let list_page_size = parse_var("LIST_PAGE_SIZE", Some(8usize))?.clamp(1, MAX_LIST_PAGE_SIZE);
        let password_hash_iterations = parse_var("PASSWORD_HASH_ITERATIONS", Some(100_000u32))?.max(1);

        Ok(Config {
            bind_address,
            data_backend,
            meme_bucket_name,
            aws_region,
            localstack_endpoint,
            tables,
            jwt_secret,
            token_ttl,
            admin_username,
            cors_allowed_origins,
            store_timeout,
            request_timeout,
            max_upload_bytes,
            list_page_size,
            password_hash_iterations,
        })
    }
}

/// Reads `name` and parses it, falling back to `default` when unset.
/// A `None` default makes the variable required.
fn parse_var<T>(name: &str, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidVar(name.into(), e.to_string())),
        Err(_) => default.ok_or_else(|| ConfigError::MissingVar(name.into())),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_backend_parses_case_insensitively() {
        assert_eq!("AWS".parse::<DataBackend>(), Ok(DataBackend::Aws));
        assert_eq!(" memory ".parse::<DataBackend>(), Ok(DataBackend::Memory));
        assert!("mongo".parse::<DataBackend>().is_err());
    }

    #[test]
    fn origins_split_on_commas_and_skip_blanks() {
        assert_eq!(
            parse_origins("http://localhost:5173, https://memes.example ,,"),
            vec!["http://localhost:5173".to_string(), "https://memes.example".to_string()]
        );
        assert!(parse_origins("").is_empty());
    }
}
