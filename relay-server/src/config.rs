//! Configuration for the chat relay.

use std::path::PathBuf;

use config::{Config as ConfigLoader, Environment, File};
use serde::Deserialize;

pub use config::ConfigError;

/// Main configuration structure for the relay.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// TLS listener configuration. Key and certificate are PEM files provisioned
/// outside the relay.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cert_path: default_cert_path(),
            key_path: default_key_path(),
        }
    }
}

/// Static asset serving.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetsConfig {
    /// Directory every served file must live under.
    #[serde(default = "default_assets_root")]
    pub root: PathBuf,
    /// File served for `/` and the empty path.
    #[serde(default = "default_document")]
    pub default_document: String,
    /// Page served with 404 responses.
    #[serde(default = "default_not_found_page")]
    pub not_found_page: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            root: default_assets_root(),
            default_document: default_document(),
            not_found_page: default_not_found_page(),
        }
    }
}

/// Inference engine connection.
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// System turn seeding the shared conversation.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: Option<String>,
    /// Maximum number of tokens generated per reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Upper bound on a single generation.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Text broadcast to every session when a generation fails.
    #[serde(default = "default_error_message")]
    pub error_message: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            model: default_model(),
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout(),
            error_message: default_error_message(),
        }
    }
}

/// Conversation retention.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct HistoryConfig {
    /// Maximum non-system turns kept. Unset keeps everything.
    #[serde(default)]
    pub max_turns: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_true() -> bool {
    true
}
fn default_cert_path() -> PathBuf {
    PathBuf::from("server.cert")
}
fn default_key_path() -> PathBuf {
    PathBuf::from("server.key")
}
fn default_assets_root() -> PathBuf {
    PathBuf::from("public")
}
fn default_document() -> String {
    "index.html".to_string()
}
fn default_not_found_page() -> PathBuf {
    PathBuf::from("404.html")
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3.2:1b".to_string()
}
fn default_system_prompt() -> Option<String> {
    Some(
        "You are a language teacher speaking both English and French. \
         The student wants to learn French. The student writes in French. \
         Check the correctness of the French sentences and always provide feedback \
         about the correctness. Provide English explanation of the errors. \
         Provide the correct sentence in French."
            .to_string(),
    )
}
fn default_max_tokens() -> u32 {
    256
}
fn default_timeout() -> u64 {
    120
}
fn default_error_message() -> String {
    "Error generating response.".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            tls: TlsConfig::default(),
            assets: AssetsConfig::default(),
            inference: InferenceConfig::default(),
            history: HistoryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (RELAY__SECTION__KEY format)
    /// 2. The given file, or relay.toml if present
    /// 3. Built-in defaults
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name("relay").required(false),
        };

        let config = ConfigLoader::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("RELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
