//! Configuration management for the taskhook service.

use std::{collections::BTreeMap, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use taskhook_core::VerifierConfig;
use taskhook_dispatch::{
    queue::DEFAULT_API_BASE_URL, CloudTasksConfig, DispatcherConfig, QueueLocation,
};

use crate::buffer::IngressConfig;

const CONFIG_FILE: &str = "taskhook.toml";

/// Environment variables read verbatim into the field of the same name.
const DIRECT_ENV_KEYS: &[&str] = &[
    "host",
    "port",
    "request_timeout",
    "ingress_queue_capacity",
    "ingress_max_body_bytes",
    "ingress_workers",
    "shutdown_timeout",
    "metadata_namespace",
    "database_url",
    "database_max_connections",
    "service_url",
    "tasks_api_base_url",
    "tasks_auth_token",
    "upstream_api_base_url",
    "upstream_timeout",
    "secrets_dir",
    "rust_log",
    "log_format",
];

/// Fields whose environment variable differs from the field name, with every
/// accepted variable in precedence order. Later entries are legacy names kept
/// for deployments that predate the current ones.
pub const ENV_ALIASES: &[(&str, &[&str])] = &[
    ("provider", &["WEBHOOK_PROVIDER"]),
    ("tasks_queue_project", &["TASKS_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCP_PROJECT"]),
    ("tasks_queue_location", &["TASKS_LOCATION", "CLOUD_TASKS_LOCATION", "QUEUE_LOCATION"]),
    ("tasks_queue_name", &["TASKS_QUEUE", "CLOUD_TASKS_QUEUE", "WEBHOOK_QUEUE_NAME"]),
    ("tasks_callback_url", &["TASKS_CALLBACK_URL", "WEBHOOK_CALLBACK_URL"]),
];

/// Resolves [`ENV_ALIASES`] against `lookup`.
///
/// For each field the first variable with a non-blank value wins. Fields with
/// no set variable are left out so lower-priority sources keep their value.
pub fn resolve_env_aliases<F>(lookup: F) -> BTreeMap<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    ENV_ALIASES
        .iter()
        .filter_map(|(field, names)| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .find(|value| !value.trim().is_empty())
                .map(|value| ((*field).to_string(), value))
        })
        .collect()
}

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority), including legacy aliases
/// 2. Configuration file (`taskhook.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// # Example
///
/// ```no_run
/// use taskhook_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Server will bind to {}:{}", config.host, config.port);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port")]
    pub port: u16,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Provider slug used in route paths and signature header names.
    ///
    /// Environment variable: `WEBHOOK_PROVIDER`
    #[serde(default = "default_provider")]
    pub provider: String,

    // Ingress
    /// Capacity of the in-process ingress buffer.
    ///
    /// Environment variable: `INGRESS_QUEUE_CAPACITY`
    #[serde(default = "default_queue_capacity")]
    pub ingress_queue_capacity: usize,
    /// Largest ingress body that is captured; bigger bodies are dropped.
    ///
    /// Environment variable: `INGRESS_MAX_BODY_BYTES`
    #[serde(default = "default_max_body_bytes")]
    pub ingress_max_body_bytes: usize,
    /// Concurrent verify-and-dispatch jobs run by the buffer consumer.
    ///
    /// Environment variable: `INGRESS_WORKERS`
    #[serde(default = "default_ingress_workers")]
    pub ingress_workers: usize,
    /// Seconds allowed for draining the ingress buffer at shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    // Tenant metadata
    /// Namespace tenant metadata documents live under.
    ///
    /// Environment variable: `METADATA_NAMESPACE`
    #[serde(default = "default_metadata_namespace")]
    pub metadata_namespace: String,
    /// PostgreSQL connection URL.
    ///
    /// Environment variable: `DATABASE_URL`
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Maximum number of database connections in the pool.
    ///
    /// Environment variable: `DATABASE_MAX_CONNECTIONS`
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    // Durable queue
    /// Project owning the durable queue.
    ///
    /// Environment variables: `TASKS_PROJECT`, `GOOGLE_CLOUD_PROJECT`,
    /// `GCP_PROJECT`
    #[serde(default)]
    pub tasks_queue_project: String,
    /// Region of the durable queue.
    ///
    /// Environment variables: `TASKS_LOCATION`, `CLOUD_TASKS_LOCATION`,
    /// `QUEUE_LOCATION`
    #[serde(default = "default_queue_location")]
    pub tasks_queue_location: String,
    /// Name of the durable queue.
    ///
    /// Environment variables: `TASKS_QUEUE`, `CLOUD_TASKS_QUEUE`,
    /// `WEBHOOK_QUEUE_NAME`
    #[serde(default = "default_queue_name")]
    pub tasks_queue_name: String,
    /// Full URL the queue delivers to.
    ///
    /// Environment variables: `TASKS_CALLBACK_URL`, `WEBHOOK_CALLBACK_URL`
    #[serde(default)]
    pub tasks_callback_url: Option<String>,
    /// Public base URL of this service, used to derive the callback URL when
    /// none is set explicitly.
    ///
    /// Environment variable: `SERVICE_URL`
    #[serde(default)]
    pub service_url: Option<String>,
    /// Base URL of the queue REST API.
    ///
    /// Environment variable: `TASKS_API_BASE_URL`
    #[serde(default = "default_tasks_api_base_url")]
    pub tasks_api_base_url: String,
    /// Bearer token for the queue REST API.
    ///
    /// Environment variable: `TASKS_AUTH_TOKEN`
    #[serde(default, skip_serializing)]
    pub tasks_auth_token: Option<String>,

    // Upstream Task API
    /// Base URL of the upstream Task API.
    ///
    /// Environment variable: `UPSTREAM_API_BASE_URL`
    #[serde(default = "default_upstream_api_base_url")]
    pub upstream_api_base_url: String,
    /// Upstream request timeout in seconds.
    ///
    /// Environment variable: `UPSTREAM_TIMEOUT`
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout: u64,

    // Secrets
    /// Directory holding one file per secret. Secrets come from environment
    /// variables when unset.
    ///
    /// Environment variable: `SECRETS_DIR`
    #[serde(default)]
    pub secrets_dir: Option<String>,

    // Logging
    /// Log filter directives.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub rust_log: String,
    /// `text` or `json`.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides.
    pub fn load() -> Result<Self> {
        let aliases = resolve_env_aliases(|name| std::env::var(name).ok());
        let figment = Self::figment(aliases).merge(Env::raw().only(DIRECT_ENV_KEYS));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the config file, then resolved environment aliases.
    fn figment(aliases: BTreeMap<String, String>) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Serialized::globals(aliases))
    }

    /// Parse server socket address from host and port configuration.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Path of the ingress route.
    pub fn ingress_path(&self) -> String {
        format!("/webhooks/{}", self.provider)
    }

    /// Path of the durable-dispatch callback route.
    pub fn callback_path(&self) -> String {
        format!("/tasks/{}-webhook", self.provider)
    }

    /// URL the durable queue delivers to: the explicit callback URL, or the
    /// callback path under `service_url`. Empty when neither is set.
    pub fn callback_url(&self) -> String {
        let explicit = self.tasks_callback_url.as_deref().filter(|url| !url.trim().is_empty());
        if let Some(url) = explicit {
            return url.to_string();
        }

        match self.service_url.as_deref().filter(|url| !url.trim().is_empty()) {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), self.callback_path()),
            None => String::new(),
        }
    }

    /// Convert to the dispatcher's configuration.
    pub fn to_dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            queue: QueueLocation {
                project: self.tasks_queue_project.clone(),
                location: self.tasks_queue_location.clone(),
                queue: self.tasks_queue_name.clone(),
            },
            callback_url: self.callback_url(),
        }
    }

    /// Convert to the queue client's configuration.
    pub fn to_cloud_tasks_config(&self) -> CloudTasksConfig {
        CloudTasksConfig {
            base_url: self.tasks_api_base_url.clone(),
            auth_token: self.tasks_auth_token.clone(),
            ..CloudTasksConfig::default()
        }
    }

    /// Convert to the verifier's probe configuration.
    pub fn to_verifier_config(&self) -> VerifierConfig {
        VerifierConfig::for_provider(&self.provider)
    }

    /// Convert to the ingress buffer's configuration.
    pub fn to_ingress_config(&self) -> IngressConfig {
        IngressConfig {
            capacity: self.ingress_queue_capacity,
            workers: self.ingress_workers,
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout),
        }
    }

    /// Timeout applied to every HTTP request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Timeout applied to upstream Task API calls.
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout)
    }

    /// Whether logs should be emitted as JSON.
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Get database URL with password masked for logging.
    pub fn database_url_masked(&self) -> String {
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let mut masked = self.database_url.clone();
                masked.replace_range(colon_pos + 1..at_pos, "***");
                return masked;
            }
        }
        self.database_url.clone()
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.provider.trim().is_empty() {
            anyhow::bail!("provider must not be empty");
        }

        if self.ingress_queue_capacity == 0 {
            anyhow::bail!("ingress_queue_capacity must be greater than 0");
        }

        if self.ingress_max_body_bytes == 0 {
            anyhow::bail!("ingress_max_body_bytes must be greater than 0");
        }

        if self.ingress_workers == 0 {
            anyhow::bail!("ingress_workers must be greater than 0");
        }

        if self.database_max_connections == 0 {
            anyhow::bail!("database_max_connections must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            provider: default_provider(),
            ingress_queue_capacity: default_queue_capacity(),
            ingress_max_body_bytes: default_max_body_bytes(),
            ingress_workers: default_ingress_workers(),
            shutdown_timeout: default_shutdown_timeout(),
            metadata_namespace: default_metadata_namespace(),
            database_url: default_database_url(),
            database_max_connections: default_max_connections(),
            tasks_queue_project: String::new(),
            tasks_queue_location: default_queue_location(),
            tasks_queue_name: default_queue_name(),
            tasks_callback_url: None,
            service_url: None,
            tasks_api_base_url: default_tasks_api_base_url(),
            tasks_auth_token: None,
            upstream_api_base_url: default_upstream_api_base_url(),
            upstream_timeout: default_upstream_timeout(),
            secrets_dir: None,
            rust_log: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_provider() -> String {
    "rentwise".to_string()
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_ingress_workers() -> usize {
    std::thread::available_parallelism().map_or(2, |n| n.get().max(2))
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_metadata_namespace() -> String {
    taskhook_core::resolver::DEFAULT_NAMESPACE.to_string()
}

fn default_database_url() -> String {
    "postgresql://localhost/taskhook".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_queue_location() -> String {
    "us-central1".to_string()
}

fn default_queue_name() -> String {
    "webhook-processing".to_string()
}

fn default_tasks_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_upstream_api_base_url() -> String {
    "https://api.rentwise.com/v1".to_string()
}

fn default_upstream_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info,taskhook=debug,tower_http=debug".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}
