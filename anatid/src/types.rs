use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One message on a tribune board, normalized across backend formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub time: String,
    pub info: String,
    pub login: String,
    pub message: String,
    pub tribune: String,
}

/// Serialized message queued for viewers. Shared between every viewer queue of a publish.
pub type Payload = Arc<str>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Tab separated `id, time, info, login, message` rows.
    #[default]
    Tsv,
    /// `<board><post id=".." time="..">..</post></board>` documents.
    Xml,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    None,
    /// Forward the viewer's OAuth2 access token as a `bearer_token` form field.
    #[serde(alias = "oauth2")]
    Bearer,
}

/// Static description of one tribune backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tribune {
    pub name: String,
    pub backend_url: String,
    pub post_url: String,
    #[serde(default = "default_post_field")]
    pub post_field: String,
    #[serde(default)]
    pub backend_type: BackendType,
    #[serde(default)]
    pub auth_type: AuthType,
}

fn default_post_field() -> String {
    "message".to_string()
}

impl Tribune {
    pub fn new(name: &str, backend_url: &str, post_url: &str) -> Self {
        Self {
            name: name.to_string(),
            backend_url: backend_url.to_string(),
            post_url: post_url.to_string(),
            post_field: default_post_field(),
            backend_type: BackendType::Tsv,
            auth_type: AuthType::None,
        }
    }

    pub fn with_post_field(mut self, post_field: &str) -> Self {
        self.post_field = post_field.to_string();
        self
    }

    pub fn with_backend_type(mut self, backend_type: BackendType) -> Self {
        self.backend_type = backend_type;
        self
    }

    pub fn with_auth_type(mut self, auth_type: AuthType) -> Self {
        self.auth_type = auth_type;
        self
    }
}

/// OAuth2 credential blob sent by bearer-forwarding viewers in the `auth` field.
#[derive(Debug, Clone, Deserialize)]
pub struct BearerToken {
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "anatid/0.1".to_string(),
            timeout_seconds: 30,
            max_retries: 1,
            retry_delay_seconds: 1,
            max_feed_size_mb: 10,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: reqwest::StatusCode },

    #[error("XML backend parse error: {0}")]
    Xml(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Duplicate tribune: {name}")]
    DuplicateTribune { name: String },

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Broadcast hub is no longer running")]
    HubClosed,
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
