use crate::client::{self, Mailbox, SseClient, WsClient};
use crate::fetcher::Fetcher;
use crate::hub::{Hub, HubHandle, DEFAULT_COMMAND_CAPACITY};
use crate::poller::{Poller, DEFAULT_POLL_INTERVAL};
use crate::relay::{PostForm, Relay};
use crate::tribune::Tribunes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response, Sse};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub poll_interval: Duration,
    pub queue_capacity: usize,
    pub keep_alive: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            queue_capacity: 8,
            keep_alive: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub relay: Relay,
    pub tribunes: Arc<Tribunes>,
    pub queue_capacity: usize,
    pub keep_alive: Duration,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Spawn the hub and the poller and wire the relay to them.
    pub fn start(tribunes: Arc<Tribunes>, fetcher: Fetcher, options: &ServerOptions) -> Self {
        let hub = Hub::spawn(DEFAULT_COMMAND_CAPACITY);

        let (poller, trigger) = Poller::new(
            tribunes.clone(),
            fetcher.clone(),
            hub.clone(),
            options.poll_interval,
        );
        tokio::spawn(poller.run());

        Self {
            hub,
            relay: Relay::new(tribunes.clone(), fetcher, trigger),
            tribunes,
            queue_capacity: options.queue_capacity,
            keep_alive: options.keep_alive,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    viewers: usize,
    tribunes: Vec<String>,
    started_at: DateTime<Utc>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/anatid/poll", get(subscribe_ws))
        .route("/anatid/poll/sse", get(subscribe_sse))
        .route("/anatid/post", post(submit))
        .route("/anatid/status", get(status))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listen to {}", addr);
    }
    axum::serve(listener, router(state)).await
}

async fn welcome() -> &'static str {
    "Welcome to anatid server."
}

async fn subscribe_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (handle, mailbox) = Mailbox::new(state.queue_capacity);
        let client = WsClient::new(mailbox, socket);
        client::serve(handle, Box::new(client), state.hub).await;
    })
}

async fn subscribe_sse(State(state): State<AppState>) -> impl IntoResponse {
    let (handle, mailbox) = Mailbox::new(state.queue_capacity);
    let (client, stream) = SseClient::new(mailbox, state.keep_alive);
    tokio::spawn(client::serve(handle, Box::new(client), state.hub.clone()));

    ([(header::CONNECTION, "keep-alive")], Sse::new(stream))
}

async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<PostForm>,
) -> StatusCode {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    tokio::spawn(async move {
        state.relay.relay(form, user_agent).await;
    });

    StatusCode::OK
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusReport>, StatusCode> {
    let viewers = state.hub.client_count().await.map_err(|e| {
        error!("Status unavailable: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    Ok(Json(StatusReport {
        viewers,
        tribunes: state.tribunes.names(),
        started_at: state.started_at,
    }))
}
