//! Application configuration

pub mod prompts;

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

pub use prompts::resolve_system_prompt;

/// Attempt budget of the single-shot endpoint
const ONESHOT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub inference: InferenceConfig,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    pub prompt: PromptConfig,
    /// Conversation used when a request does not name one
    pub default_conversation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub region: String,
    pub model_id: String,
    /// Runtime endpoint; derived from the region when unset
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub oneshot_max_attempts: u32,
    pub initial_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Sqlite,
    Object,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" | "local" => Ok(Self::File),
            "sqlite" => Ok(Self::Sqlite),
            "object" | "s3" => Ok(Self::Object),
            other => bail!("unknown storage backend '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
    pub bucket: String,
    /// S3-compatible endpoint; regional S3 when unset
    pub object_endpoint: Option<String>,
    pub object_region: String,
    pub object_credentials: Option<ObjectCredentials>,
}

/// SigV4 credentials for object storage
#[derive(Clone, Serialize, Deserialize)]
pub struct ObjectCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for ObjectCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCredentials")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    pub file: Option<PathBuf>,
    pub persona: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            inference: InferenceConfig {
                region: "us-east-1".into(),
                model_id: "anthropic.claude-3-5-sonnet-20240620-v1:0".into(),
                endpoint: None,
                api_key: None,
                max_tokens: 500,
                temperature: 0.7,
                request_timeout: Duration::from_secs(60),
            },
            retry: RetryConfig {
                max_attempts: 10,
                oneshot_max_attempts: ONESHOT_MAX_ATTEMPTS,
                initial_delay: Duration::from_secs(5),
            },
            storage: StorageConfig {
                backend: StorageBackend::File,
                data_dir: PathBuf::from("./data"),
                bucket: "adhd-ai-logs".into(),
                object_endpoint: None,
                object_region: "us-east-1".into(),
                object_credentials: None,
            },
            prompt: PromptConfig {
                file: None,
                persona: "guided".into(),
            },
            default_conversation: "conversation_history".into(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let region = var("BEDROCK_REGION")
            .or_else(|| var("AWS_REGION"))
            .unwrap_or(defaults.inference.region);

        let max_attempts = parse_or(&var, "PARLEY_MAX_ATTEMPTS", defaults.retry.max_attempts)?;
        if max_attempts == 0 {
            bail!("PARLEY_MAX_ATTEMPTS must be at least 1");
        }

        let initial_delay: f64 = parse_or(
            &var,
            "PARLEY_INITIAL_DELAY_SECS",
            defaults.retry.initial_delay.as_secs_f64(),
        )?;
        if !initial_delay.is_finite() || initial_delay < 0.0 {
            bail!("PARLEY_INITIAL_DELAY_SECS must be a non-negative number of seconds");
        }

        let access_key = var("PARLEY_OBJECT_ACCESS_KEY").or_else(|| var("AWS_ACCESS_KEY_ID"));
        let secret_key =
            var("PARLEY_OBJECT_SECRET_KEY").or_else(|| var("AWS_SECRET_ACCESS_KEY"));
        let object_credentials = match (access_key, secret_key) {
            (Some(access_key), Some(secret_key)) => Some(ObjectCredentials {
                access_key,
                secret_key,
                session_token: var("AWS_SESSION_TOKEN"),
            }),
            (None, None) => None,
            _ => bail!("object storage needs both an access key and a secret key"),
        };

        let storage = StorageConfig {
            backend: parse_or(&var, "PARLEY_STORAGE", defaults.storage.backend)?,
            data_dir: var("PARLEY_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage.data_dir),
            bucket: var("PARLEY_BUCKET").unwrap_or(defaults.storage.bucket),
            object_endpoint: var("PARLEY_OBJECT_ENDPOINT"),
            object_region: var("PARLEY_OBJECT_REGION").unwrap_or_else(|| region.clone()),
            object_credentials,
        };

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse_or(&var, "PORT", defaults.port)?,
            inference: InferenceConfig {
                region,
                model_id: var("BEDROCK_MODEL_ID").unwrap_or(defaults.inference.model_id),
                endpoint: var("BEDROCK_ENDPOINT"),
                api_key: var("AWS_BEARER_TOKEN_BEDROCK"),
                max_tokens: parse_or(&var, "PARLEY_MAX_TOKENS", defaults.inference.max_tokens)?,
                temperature: parse_or(&var, "PARLEY_TEMPERATURE", defaults.inference.temperature)?,
                request_timeout: Duration::from_secs(parse_or(
                    &var,
                    "PARLEY_REQUEST_TIMEOUT_SECS",
                    defaults.inference.request_timeout.as_secs(),
                )?),
            },
            retry: RetryConfig {
                max_attempts,
                oneshot_max_attempts: defaults.retry.oneshot_max_attempts,
                initial_delay: Duration::from_secs_f64(initial_delay),
            },
            storage,
            prompt: PromptConfig {
                file: var("PARLEY_SYSTEM_PROMPT_FILE").map(PathBuf::from),
                persona: var("PARLEY_PERSONA").unwrap_or(defaults.prompt.persona),
            },
            default_conversation: var("PARLEY_DEFAULT_CONVERSATION")
                .unwrap_or(defaults.default_conversation),
        })
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
