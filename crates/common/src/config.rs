// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Configuration for the NFT sync pipeline.
//!
//! Configuration is read from TOML, where every section falls back to its defaults, and then
//! overridden from environment variables. Environment values are parsed strictly as typed
//! values; a malformed value fails the load.

use std::{collections::HashSet, fmt::Display, path::Path, str::FromStr, time::Duration};

use nftsync_core::env::{parse_bool, parse_list, parse_value};
use nftsync_model::{Chain, ChainRegistry, RpcEndpoint, Subscriber};
use nftsync_network::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::KeySpace;

/// Prefix shared by every key the pipeline writes to the key-value store.
pub const DEFAULT_KEY_PREFIX: &str = "nft:";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid environment variable '{key}': {message}")]
    Env { key: String, message: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the Redis connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// The database host address. If `None`, the typical default should be used.
    pub host: Option<String>,
    /// The database port. If `None`, the typical default should be used.
    pub port: Option<u16>,
    /// The account username for the database connection.
    pub username: Option<String>,
    /// The account password for the database connection.
    pub password: Option<String>,
    /// If the database should use an SSL-enabled connection.
    pub ssl: bool,
    /// The logical database index.
    pub db: u8,
    /// The timeout (in seconds) to wait for a new connection.
    pub connection_timeout: u16,
    /// The timeout (in seconds) to wait for a response.
    pub response_timeout: u16,
    /// The number of retry attempts with exponential backoff for connection attempts.
    pub number_of_retries: usize,
    /// The base value for exponential backoff calculation.
    pub exponent_base: u64,
    /// The maximum delay between retry attempts (in seconds).
    pub max_delay: u64,
    /// The multiplication factor for retry delay calculation.
    pub factor: u64,
}

impl Default for DatabaseConfig {
    /// Creates a new default [`DatabaseConfig`] instance.
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            username: None,
            password: None,
            ssl: false,
            db: 0,
            connection_timeout: 20,
            response_timeout: 20,
            number_of_retries: 100,
            exponent_base: 2,
            max_delay: 1000,
            factor: 2,
        }
    }
}

/// Configuration for the Postgres connection pool.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// The schema holding the pipeline tables.
    pub schema: String,
    pub max_connections: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "nftsync".to_string(),
            password: "pass".to_string(),
            database: "nftsync".to_string(),
            schema: "public".to_string(),
            max_connections: 10,
        }
    }
}

impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(PostgresConfig))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Replaces the built-in endpoint pool or block increment of one chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainOverride {
    pub chain_id: u64,
    #[serde(default)]
    pub endpoints: Option<Vec<RpcEndpoint>>,
    #[serde(default)]
    pub block_increment: Option<u64>,
    /// First block synced when the chain has no persisted cursor.
    #[serde(default)]
    pub start_block: Option<u64>,
}

/// Settings of the per-chain transfer sync and reconciliation tasks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval between sync ticks of one chain.
    pub poll_interval_ms: u64,
    /// Time-to-live of the per-chain transfer cursor lock.
    pub lock_ttl_ms: u64,
    /// Timeout of each RPC request.
    pub rpc_timeout_ms: u64,
    /// How long the reconciler waits on an empty queue before checking for shutdown.
    pub receive_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3_000,
            lock_ttl_ms: 60_000,
            rpc_timeout_ms: 5_000,
            receive_timeout_ms: 1_000,
        }
    }
}

/// An outbound HTTP proxy for document fetches.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Returns the proxy URL including credentials when set.
    #[must_use]
    pub fn url(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("http://{user}:{pass}@{}:{}", self.host, self.port),
            (Some(user), None) => format!("http://{user}@{}:{}", self.host, self.port),
            _ => format!("http://{}:{}", self.host, self.port),
        }
    }
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ProxyConfig))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Settings of the metadata resolver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Maximum number of tokens resolved concurrently.
    pub workers: usize,
    /// Timeout of the token URI contract call.
    pub rpc_timeout_ms: u64,
    /// Timeout of the metadata document fetch.
    pub fetch_timeout_ms: u64,
    pub user_agent: String,
    pub proxy: Option<ProxyConfig>,
    /// Gateway prefix `ipfs://` URIs are rewritten to.
    pub ipfs_gateway: String,
    /// Gateway prefix `ar://` URIs are rewritten to.
    pub arweave_gateway: String,
    pub uri_cache_ttl_secs: u64,
    /// Time-to-live of the per-token resolution lock.
    pub lock_ttl_ms: u64,
    /// Upload inline base64 images to the object store instead of dropping them.
    pub upload_images: bool,
    /// Base URL of the object store serving uploaded images.
    pub object_store_url: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            rpc_timeout_ms: 5_000,
            fetch_timeout_ms: 5_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            ipfs_gateway: "https://cloudflare-ipfs.com/ipfs/".to_string(),
            arweave_gateway: "https://arweave.net/".to_string(),
            uri_cache_ttl_secs: 3_600,
            lock_ttl_ms: 60_000,
            upload_images: false,
            object_store_url: "https://static.nftsync.local".to_string(),
        }
    }
}

impl MetadataConfig {
    #[must_use]
    pub const fn uri_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.uri_cache_ttl_secs)
    }
}

/// Settings of the delayed requeue of failed queue items.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Base delay, jittered up to twice its value.
    pub base_delay_ms: u64,
    /// Attempts after which an item is dropped.
    pub max_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 300_000,
            max_attempts: 3,
        }
    }
}

/// Settings of the subscriber fanout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    pub subscribers: Vec<Subscriber>,
    /// Number of publishes in flight at once.
    pub chunk_size: usize,
    /// Number of failure records replayed per pass.
    pub replay_batch: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
            chunk_size: 10,
            replay_batch: 100,
        }
    }
}

/// Settings of the third-party NFT data provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider name, used as the rate limiter scope.
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    /// Rate limiter cost of each call.
    pub call_cost: u64,
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "moralis".to_string(),
            base_url: "https://deep-index.moralis.io/api/v2".to_string(),
            api_key: String::new(),
            call_cost: 5,
            timeout_ms: 5_000,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ProviderConfig))
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .field("call_cost", &self.call_cost)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Settings of the DingTalk alert robot.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    pub webhook: Option<String>,
    pub secret: Option<String>,
}

impl std::fmt::Debug for AlertingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(AlertingConfig))
            .field("webhook", &self.webhook)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Top-level configuration of an `nftsync` process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NftSyncConfig {
    /// The deployment name, scoping the caller rate window.
    pub app_name: String,
    pub key_prefix: String,
    /// Chain ids this process synchronizes.
    pub support_chains: Vec<u64>,
    pub chains: Vec<ChainOverride>,
    pub redis: DatabaseConfig,
    pub postgres: PostgresConfig,
    pub sync: SyncConfig,
    pub metadata: MetadataConfig,
    pub scheduler: SchedulerConfig,
    pub fanout: FanoutConfig,
    pub provider: Option<ProviderConfig>,
    pub alerting: AlertingConfig,
    /// In-place retries of individual RPC calls.
    pub rpc_retry: RetryConfig,
}

impl Default for NftSyncConfig {
    fn default() -> Self {
        Self {
            app_name: "nftsync".to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            support_chains: vec![1, 56, 137],
            chains: Vec::new(),
            redis: DatabaseConfig::default(),
            postgres: PostgresConfig::default(),
            sync: SyncConfig::default(),
            metadata: MetadataConfig::default(),
            scheduler: SchedulerConfig::default(),
            fanout: FanoutConfig::default(),
            provider: None,
            alerting: AlertingConfig::default(),
            rpc_retry: RetryConfig::rpc(),
        }
    }
}

fn env_parsed<T>(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .map(|raw| parse_value(key, &raw))
        .transpose()
        .map_err(|e| env_error(key, &e))
}

fn env_string(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_error(key: &str, e: &anyhow::Error) -> ConfigError {
    ConfigError::Env {
        key: key.to_string(),
        message: e.to_string(),
    }
}

impl NftSyncConfig {
    /// Parses configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or does not match the schema.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Loads configuration from an optional file, then the process environment, then validates.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, an environment value is malformed, or the
    /// result fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(&|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error naming the variable if a value cannot be parsed.
    pub fn apply_env(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(app_name) = env_string(lookup, "APP_NAME") {
            self.app_name = app_name;
        }
        if let Some(prefix) = env_string(lookup, "KEY_PREFIX") {
            self.key_prefix = prefix;
        }
        if let Some(raw) = env_string(lookup, "SUPPORT_CHAINS") {
            self.support_chains =
                parse_list("SUPPORT_CHAINS", &raw).map_err(|e| env_error("SUPPORT_CHAINS", &e))?;
        }

        if let Some(host) = env_string(lookup, "REDIS_HOST") {
            self.redis.host = Some(host);
        }
        if let Some(port) = env_parsed(lookup, "REDIS_PORT")? {
            self.redis.port = Some(port);
        }
        if let Some(username) = env_string(lookup, "REDIS_USER_NAME") {
            self.redis.username = Some(username);
        }
        if let Some(password) = env_string(lookup, "REDIS_PASSWORD") {
            self.redis.password = Some(password);
        }
        if let Some(db) = env_parsed(lookup, "REDIS_DB")? {
            self.redis.db = db;
        }
        if let Some(raw) = env_string(lookup, "REDIS_SSL") {
            self.redis.ssl = parse_bool("REDIS_SSL", &raw).map_err(|e| env_error("REDIS_SSL", &e))?;
        }

        if let Some(host) = env_string(lookup, "POSTGRES_HOST") {
            self.postgres.host = host;
        }
        if let Some(port) = env_parsed(lookup, "POSTGRES_PORT")? {
            self.postgres.port = port;
        }
        if let Some(username) = env_string(lookup, "POSTGRES_USERNAME") {
            self.postgres.username = username;
        }
        if let Some(password) = env_string(lookup, "POSTGRES_PASSWORD") {
            self.postgres.password = password;
        }
        if let Some(database) = env_string(lookup, "POSTGRES_DATABASE") {
            self.postgres.database = database;
        }
        if let Some(schema) = env_string(lookup, "POSTGRES_SCHEMA") {
            self.postgres.schema = schema;
        }

        if let Some(host) = env_string(lookup, "PROXY_HOST") {
            let port = env_parsed(lookup, "PROXY_PORT")?.ok_or_else(|| ConfigError::Env {
                key: "PROXY_PORT".to_string(),
                message: "must be set when PROXY_HOST is set".to_string(),
            })?;
            self.metadata.proxy = Some(ProxyConfig {
                host,
                port,
                username: env_string(lookup, "PROXY_AUTH_USERNAME"),
                password: env_string(lookup, "PROXY_AUTH_PASSWORD"),
            });
        }

        if let Some(api_key) = env_string(lookup, "MORALIS_API_KEY") {
            self.provider.get_or_insert_with(ProviderConfig::default).api_key = api_key;
        }

        if let Some(webhook) = env_string(lookup, "DINGDING_ROBOT_WEBHOOK") {
            self.alerting.webhook = Some(webhook);
        }
        if let Some(secret) = env_string(lookup, "DINGDING_ROBOT_SECRET") {
            self.alerting.secret = Some(secret);
        }

        if let Some(attempts) = env_parsed(lookup, "QUEUE_ATTEMPTS")? {
            self.scheduler.max_attempts = attempts;
        }
        if let Some(delay) = env_parsed(lookup, "QUEUE_BACKOFF_DELAY")? {
            self.scheduler.base_delay_ms = delay;
        }

        for subscriber in &mut self.fanout.subscribers {
            let key = format!("API_{}_SECRET", subscriber.source.to_ascii_uppercase());
            if let Some(secret) = env_string(lookup, &key) {
                subscriber.secret = secret;
            }
        }

        Ok(())
    }

    /// Checks the configuration for values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_name.trim().is_empty() {
            return Err(ConfigError::Invalid("app_name must not be empty".to_string()));
        }
        if self.support_chains.is_empty() {
            return Err(ConfigError::Invalid(
                "support_chains must name at least one chain".to_string(),
            ));
        }
        if self.metadata.workers == 0 {
            return Err(ConfigError::Invalid("metadata.workers must be positive".to_string()));
        }
        if self.fanout.chunk_size == 0 {
            return Err(ConfigError::Invalid("fanout.chunk_size must be positive".to_string()));
        }
        if self.scheduler.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_attempts must be positive".to_string(),
            ));
        }

        let mut sources = HashSet::new();
        for subscriber in &self.fanout.subscribers {
            if subscriber.source.trim().is_empty() {
                return Err(ConfigError::Invalid("subscriber source must not be empty".to_string()));
            }
            if subscriber.secret.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "subscriber '{}' has an empty secret",
                    subscriber.source
                )));
            }
            if !sources.insert(subscriber.source.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "subscriber '{}' configured more than once",
                    subscriber.source
                )));
            }
        }

        if let Some(provider) = &self.provider
            && provider.api_key.is_empty()
        {
            return Err(ConfigError::Invalid(format!(
                "provider '{}' has no api key",
                provider.name
            )));
        }

        if let Some(override_) = self
            .chains
            .iter()
            .find(|o| !self.support_chains.contains(&o.chain_id))
        {
            return Err(ConfigError::Invalid(format!(
                "override for chain {} which is not supported",
                override_.chain_id
            )));
        }

        self.chain_registry().map(|_| ())
    }

    /// Builds the registry of supported chains with overrides applied.
    ///
    /// # Errors
    ///
    /// Returns an error if a chain is unknown or an overridden chain is invalid.
    pub fn chain_registry(&self) -> Result<ChainRegistry, ConfigError> {
        let chains = self
            .support_chains
            .iter()
            .map(|chain_id| {
                let mut chain: Chain = Chain::from_chain_id(*chain_id)
                    .cloned()
                    .ok_or_else(|| ConfigError::Invalid(format!("unsupported chain id {chain_id}")))?;
                if let Some(override_) = self.chains.iter().find(|o| o.chain_id == *chain_id) {
                    if let Some(endpoints) = &override_.endpoints {
                        chain.endpoints.clone_from(endpoints);
                    }
                    if let Some(increment) = override_.block_increment {
                        chain.block_increment = increment;
                    }
                }
                Ok(chain)
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        ChainRegistry::new(chains).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Returns the key builder for this deployment.
    #[must_use]
    pub fn key_space(&self) -> KeySpace {
        KeySpace::new(self.key_prefix.clone())
    }

    /// Returns the configured first block of `chain_id`, if any.
    #[must_use]
    pub fn start_block(&self, chain_id: u64) -> Option<u64> {
        self.chains
            .iter()
            .find(|o| o.chain_id == chain_id)
            .and_then(|o| o.start_block)
    }

    /// Returns the subscriber registered under `source`.
    #[must_use]
    pub fn subscriber(&self, source: &str) -> Option<&Subscriber> {
        self.fanout.subscribers.iter().find(|s| s.source == source)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io::Write};

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[rstest]
    fn test_default_config_is_valid() {
        let config = NftSyncConfig::default();
        config.validate().unwrap();
        assert_eq!(config.key_prefix, "nft:");
        assert_eq!(config.metadata.uri_cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.scheduler.base_delay_ms, 300_000);
        assert_eq!(config.chain_registry().unwrap().len(), 3);
    }

    #[rstest]
    fn test_from_toml_partial_sections() {
        let config = NftSyncConfig::from_toml_str(
            r#"
            app_name = "indexer-a"
            support_chains = [1]

            [metadata]
            workers = 2

            [[fanout.subscribers]]
            source = "market"
            secret = "s3cret"

            [[chains]]
            chain_id = 1
            block_increment = 10
            endpoints = [{ target = "http://127.0.0.1:8545", weight = 3 }]
            "#,
        )
        .unwrap();

        assert_eq!(config.app_name, "indexer-a");
        assert_eq!(config.metadata.workers, 2);
        assert_eq!(config.metadata.fetch_timeout_ms, 5_000);
        assert_eq!(config.subscriber("market").unwrap().secret, "s3cret");

        let registry = config.chain_registry().unwrap();
        let chain = registry.get(1).unwrap();
        assert_eq!(chain.block_increment, 10);
        assert_eq!(chain.endpoints[0].weight, 3);
    }

    #[rstest]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "app_name = \"from-file\"").unwrap();
        let config = NftSyncConfig::from_file(file.path()).unwrap();
        assert_eq!(config.app_name, "from-file");
        assert!(matches!(
            NftSyncConfig::from_file(Path::new("/nonexistent/nftsync.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[rstest]
    fn test_apply_env_overrides() {
        let mut config = NftSyncConfig::default();
        config.fanout.subscribers.push(Subscriber::new("market", "file-secret"));
        let lookup = lookup_from(&[
            ("APP_NAME", "prod"),
            ("SUPPORT_CHAINS", "1, 137"),
            ("REDIS_PORT", "6380"),
            ("POSTGRES_HOST", "db"),
            ("PROXY_HOST", "proxy"),
            ("PROXY_PORT", "8080"),
            ("PROXY_AUTH_USERNAME", "u"),
            ("PROXY_AUTH_PASSWORD", "p"),
            ("MORALIS_API_KEY", "key"),
            ("API_MARKET_SECRET", "env-secret"),
        ]);

        config.apply_env(&lookup).unwrap();

        assert_eq!(config.app_name, "prod");
        assert_eq!(config.support_chains, vec![1, 137]);
        assert_eq!(config.redis.port, Some(6380));
        assert_eq!(config.postgres.host, "db");
        assert_eq!(
            config.metadata.proxy.as_ref().unwrap().url(),
            "http://u:p@proxy:8080"
        );
        assert_eq!(config.provider.as_ref().unwrap().api_key, "key");
        assert_eq!(config.subscriber("market").unwrap().secret, "env-secret");
        config.validate().unwrap();
    }

    #[rstest]
    #[case("POSTGRES_PORT", "5432 + 1")]
    #[case("REDIS_PORT", "eval(6379)")]
    #[case("SUPPORT_CHAINS", "1,two")]
    #[case("QUEUE_ATTEMPTS", "-1")]
    fn test_apply_env_rejects_malformed(#[case] key: &str, #[case] value: &str) {
        let mut config = NftSyncConfig::default();
        let err = config.apply_env(&lookup_from(&[(key, value)])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { key: k, .. } if k == key));
    }

    #[rstest]
    fn test_proxy_host_requires_port() {
        let mut config = NftSyncConfig::default();
        assert!(config
            .apply_env(&lookup_from(&[("PROXY_HOST", "proxy")]))
            .is_err());
    }

    #[rstest]
    fn test_validate_rejects_unknown_chain() {
        let config = NftSyncConfig {
            support_chains: vec![1, 999],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[rstest]
    fn test_validate_rejects_zero_weight() {
        let config = NftSyncConfig {
            support_chains: vec![1],
            chains: vec![ChainOverride {
                chain_id: 1,
                endpoints: Some(vec![RpcEndpoint::new("http://a", 0)]),
                block_increment: None,
                start_block: None,
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[rstest]
    fn test_validate_rejects_zero_increment() {
        let config = NftSyncConfig {
            support_chains: vec![56],
            chains: vec![ChainOverride {
                chain_id: 56,
                endpoints: None,
                block_increment: Some(0),
                start_block: None,
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[rstest]
    fn test_validate_rejects_empty_secret() {
        let mut config = NftSyncConfig::default();
        config.fanout.subscribers.push(Subscriber::new("market", ""));
        assert!(config.validate().is_err());
    }

    #[rstest]
    fn test_validate_rejects_duplicate_subscriber() {
        let mut config = NftSyncConfig::default();
        config.fanout.subscribers.push(Subscriber::new("market", "a"));
        config.fanout.subscribers.push(Subscriber::new("market", "b"));
        assert!(config.validate().is_err());
    }

    #[rstest]
    fn test_debug_redacts_secrets() {
        let config = NftSyncConfig {
            provider: Some(ProviderConfig {
                api_key: "topsecret".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("topsecret"));
        assert!(!rendered.contains("\"pass\""));
    }
}
