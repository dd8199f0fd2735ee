//! Environment-driven configuration

use std::path::PathBuf;

/// Default system prompt for the assistant
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a knowledgeable real estate assistant. \
Resolve user queries related to real estate. Help the users with buy, sell, purchase and rent \
of properties. When the user asks for listings, use the search_properties tool.";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    /// `None` allows any origin
    pub cors_origin: Option<String>,
    pub llm: LlmConfig,
    pub relay: RelayConfig,
}

/// Completion provider settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

/// Conversation assembly and streaming settings
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub system_prompt: String,
    /// Most recent messages sent as history; `None` sends all
    pub history_limit: Option<usize>,
    pub max_tokens: Option<u32>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            history_limit: Some(DEFAULT_HISTORY_LIMIT),
            max_tokens: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = parse_or(get("PORT"), "PORT", DEFAULT_PORT);

        let db_path = get("RELAY_DB_PATH").map_or_else(
            || {
                let home = get("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".estate-relay").join("relay.db")
            },
            PathBuf::from,
        );

        let cors_origin = match get("CORS_ORIGIN") {
            Some(origin) if origin.trim() == "*" => None,
            Some(origin) => Some(origin),
            None => Some(DEFAULT_CORS_ORIGIN.to_string()),
        };

        let llm = LlmConfig {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: get("RELAY_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };

        let history_limit = match parse_or(
            get("RELAY_HISTORY_LIMIT"),
            "RELAY_HISTORY_LIMIT",
            DEFAULT_HISTORY_LIMIT,
        ) {
            0 => None,
            n => Some(n),
        };

        let max_tokens = get("RELAY_MAX_TOKENS").and_then(|raw| match raw.trim().parse() {
            Ok(n) => Some(n),
            Err(_) => {
                tracing::warn!(value = %raw, "Ignoring invalid RELAY_MAX_TOKENS");
                None
            }
        });

        let relay = RelayConfig {
            system_prompt: get("RELAY_SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            history_limit,
            max_tokens,
        };

        Self {
            port,
            db_path,
            cors_origin,
            llm,
            relay,
        }
    }
}

fn parse_or<T: std::str::FromStr + Copy>(raw: Option<String>, key: &str, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            default
        }),
    }
}
