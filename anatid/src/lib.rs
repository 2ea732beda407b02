//! Live relay for tribune boards.
//!
//! Tribune backends are polled for their delimited-text or XML feeds, normalized into
//! [`Post`]s and pushed to every viewer connected over WebSocket or server-sent events.
//! Viewer submissions are forwarded to the backend, which is then re-polled right away.

pub mod types;
pub mod tribune;
pub mod fetcher;
pub mod parser;
pub mod traits;
pub mod client;
pub mod hub;
pub mod poller;
pub mod relay;
pub mod server;
pub mod settings;

pub use types::*;
pub use tribune::Tribunes;
pub use fetcher::Fetcher;
pub use parser::FeedParser;
pub use traits::Client;
pub use client::{ClientHandle, ClientId, Mailbox, SseClient, WsClient};
pub use hub::{Hub, HubHandle};
pub use poller::{PollTrigger, Poller};
pub use relay::{PostForm, Relay};
pub use server::{AppState, ServerOptions};
pub use settings::Settings;
