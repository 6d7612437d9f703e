use std::collections::HashMap;

use crate::error::{PipelineError, Result};

pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_REGION: &str = "AWS_REGION";
pub const SNOWFLAKE_ACCOUNT: &str = "SNOWFLAKE_ACCOUNT";
pub const SNOWFLAKE_USER: &str = "SNOWFLAKE_USER";

/// Source of credentials for the stages. Stages never read the process
/// environment directly.
pub trait SecretProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn require(&self, key: &'static str) -> Result<String> {
        self.get(key).ok_or(PipelineError::MissingSecret(key))
    }
}

/// Reads the process environment; call [`EnvSecrets::with_dotenv`] to load a
/// `.env` file first.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecrets;

impl EnvSecrets {
    pub fn with_dotenv() -> Self {
        dotenvy::dotenv().ok();
        EnvSecrets
    }
}

impl SecretProvider for EnvSecrets {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Default, Clone)]
pub struct StaticSecrets(HashMap<String, String>);

impl StaticSecrets {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl SecretProvider for StaticSecrets {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: Option<String>,
}

impl AwsCredentials {
    /// AWS keys are optional; without them the SDK's default chain applies.
    pub fn from_provider(provider: &dyn SecretProvider) -> Self {
        Self {
            access_key_id: provider.get(AWS_ACCESS_KEY_ID),
            secret_access_key: provider.get(AWS_SECRET_ACCESS_KEY),
            region: provider.get(AWS_REGION),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseCredentials {
    pub account: String,
    pub user: String,
}

impl WarehouseCredentials {
    pub fn from_provider(provider: &dyn SecretProvider) -> Result<Self> {
        Ok(Self {
            account: provider.require(SNOWFLAKE_ACCOUNT)?,
            user: provider.require(SNOWFLAKE_USER)?,
        })
    }
}
