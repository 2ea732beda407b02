#![allow(dead_code)]

use anatid::{AppState, FetchConfig, Fetcher, ServerOptions, Tribune, Tribunes};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Form, Router};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const TSV_FEED: &str = "12\t20200101120000\tMozilla\tbob\tsecond\n\
    10\t20200101115900\tMozilla\talice\tfirst\n\
    bad\t20200101120100\tMozilla\tmallory\tnot a number\n\
    11\t20200101120000\tshort row\n";

pub const XML_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<board site="http://batavie.example">
  <post id="7" time="20200101120700">
    <info>Firefox</info>
    <login>carol</login>
    <message>later</message>
  </post>
  <post id="3" time="20200101120300">
    <info>Firefox</info>
    <login>dave</login>
    <message>earlier</message>
  </post>
</board>"#;

/// A submission received by the fake backend.
#[derive(Debug, Clone)]
pub struct Submitted {
    pub fields: HashMap<String, String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
struct BackendState {
    tsv: Arc<str>,
    xml: Arc<str>,
    submissions: mpsc::UnboundedSender<Submitted>,
}

/// Local stand-in for tribune backends.
pub struct Backend {
    pub base: String,
    pub submissions: mpsc::UnboundedReceiver<Submitted>,
}

impl Backend {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn tsv_tribune(&self, name: &str) -> Tribune {
        Tribune::new(name, &self.url("/backend.tsv"), &self.url("/add"))
    }

    pub fn xml_tribune(&self, name: &str) -> Tribune {
        Tribune::new(name, &self.url("/remote.xml"), &self.url("/add"))
            .with_backend_type(anatid::BackendType::Xml)
    }

    pub fn broken_tribune(&self, name: &str) -> Tribune {
        Tribune::new(name, &self.url("/broken"), &self.url("/reject"))
    }

    /// Next submission, failing the test if none arrives in time.
    pub async fn next_submission(&mut self) -> Submitted {
        tokio::time::timeout(Duration::from_secs(5), self.submissions.recv())
            .await
            .expect("timed out waiting for a submission")
            .expect("backend stopped")
    }
}

async fn record(
    State(state): State<BackendState>,
    headers: HeaderMap,
    Form(fields): Form<HashMap<String, String>>,
) -> StatusCode {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let _ = state.submissions.send(Submitted { fields, user_agent });
    StatusCode::OK
}

async fn reject(
    State(state): State<BackendState>,
    Form(fields): Form<HashMap<String, String>>,
) -> StatusCode {
    let _ = state.submissions.send(Submitted {
        fields,
        user_agent: None,
    });
    StatusCode::FORBIDDEN
}

pub async fn spawn_backend() -> Backend {
    spawn_backend_with(TSV_FEED, XML_FEED).await
}

pub async fn spawn_backend_with(tsv: &str, xml: &str) -> Backend {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = BackendState {
        tsv: tsv.into(),
        xml: xml.into(),
        submissions: tx,
    };

    let app = Router::new()
        .route(
            "/backend.tsv",
            get(|State(s): State<BackendState>| async move { s.tsv.to_string() }),
        )
        .route(
            "/remote.xml",
            get(|State(s): State<BackendState>| async move { s.xml.to_string() }),
        )
        .route(
            "/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "down") }),
        )
        .route("/add", post(record))
        .route("/reject", post(reject))
        .with_state(state);

    let addr = serve_app(app).await;
    Backend {
        base: format!("http://{}", addr),
        submissions: rx,
    }
}

async fn serve_app(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn test_fetcher() -> Fetcher {
    Fetcher::new(FetchConfig {
        user_agent: "anatid-test/1.0".to_string(),
        timeout_seconds: 5,
        max_retries: 0,
        ..FetchConfig::default()
    })
    .unwrap()
}

/// Start a full anatid server on a local port. Returns its base URL and shared state.
pub async fn spawn_anatid(tribunes: Vec<Tribune>, options: ServerOptions) -> (String, AppState) {
    let tribunes = Arc::new(Tribunes::new(tribunes).unwrap());
    let state = AppState::start(tribunes, test_fetcher(), &options);
    let addr = serve_app(anatid::server::router(state.clone())).await;
    (format!("http://{}", addr), state)
}

/// Wait until the hub reports `expected` viewers.
pub async fn wait_for_viewers(state: &AppState, expected: usize) {
    for _ in 0..250 {
        if state.hub.client_count().await.unwrap() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("hub never reached {} viewers", expected);
}
