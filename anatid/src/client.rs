use crate::hub::HubHandle;
use crate::traits::Client;
use crate::types::Payload;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::response::sse::Event;
use futures::{SinkExt, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type ClientId = Uuid;

/// Body stream backing an SSE viewer's HTTP response.
pub type SseStream = ReceiverStream<Result<Event, Infallible>>;

const KEEP_ALIVE_TEXT: &str = "thump";

/// Why a payload could not be queued for a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// The viewer is not keeping up.
    Full,
    /// The viewer's delivery loop is gone.
    Closed,
}

/// Hub-side end of a viewer's outbound queue. Dropping it closes the queue.
#[derive(Debug)]
pub struct ClientHandle {
    id: ClientId,
    tx: mpsc::Sender<Payload>,
}

impl ClientHandle {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Queue a payload without waiting.
    pub fn offer(&self, payload: Payload) -> Result<(), Rejected> {
        self.tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => Rejected::Full,
            TrySendError::Closed(_) => Rejected::Closed,
        })
    }
}

/// Viewer-side end of the outbound queue.
#[derive(Debug)]
pub struct Mailbox {
    id: ClientId,
    rx: mpsc::Receiver<Payload>,
}

impl Mailbox {
    /// Create a bounded queue for a new viewer.
    pub fn new(capacity: usize) -> (ClientHandle, Mailbox) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (ClientHandle { id, tx }, Mailbox { id, rx })
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Next payload; buffered payloads are still returned after the hub closed the queue.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }
}

/// Viewer connected through a WebSocket. Inbound frames are read only to notice the peer leaving.
pub struct WsClient {
    mailbox: Mailbox,
    socket: WebSocket,
}

impl WsClient {
    pub fn new(mailbox: Mailbox, socket: WebSocket) -> Self {
        Self { mailbox, socket }
    }
}

#[async_trait]
impl Client for WsClient {
    fn id(&self) -> ClientId {
        self.mailbox.id()
    }

    fn transport(&self) -> &'static str {
        "websocket"
    }

    async fn write_loop(self: Box<Self>) {
        let WsClient { mut mailbox, socket } = *self;
        let id = mailbox.id();
        let (mut sink, mut incoming) = socket.split();

        loop {
            tokio::select! {
                payload = mailbox.recv() => match payload {
                    Some(payload) => {
                        if let Err(e) = sink.send(Message::Text(payload.as_ref().into())).await {
                            debug!("WebSocket send to {} failed: {}", id, e);
                            break;
                        }
                    }
                    None => break,
                },
                frame = incoming.next() => match frame {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("WebSocket read from {} failed: {}", id, e);
                        break;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }

        let _ = sink.close().await;
    }
}

/// Viewer connected through a server-sent event stream.
pub struct SseClient {
    mailbox: Mailbox,
    events: mpsc::Sender<Result<Event, Infallible>>,
    keep_alive: Duration,
}

impl SseClient {
    /// Returns the client and the stream to hand to the HTTP response.
    pub fn new(mailbox: Mailbox, keep_alive: Duration) -> (Self, SseStream) {
        // One slot: every event is handed to the response body before the next is taken.
        let (events, rx) = mpsc::channel(1);
        let client = Self {
            mailbox,
            events,
            keep_alive,
        };
        (client, ReceiverStream::new(rx))
    }
}

#[async_trait]
impl Client for SseClient {
    fn id(&self) -> ClientId {
        self.mailbox.id()
    }

    fn transport(&self) -> &'static str {
        "sse"
    }

    async fn write_loop(self: Box<Self>) {
        let SseClient {
            mut mailbox,
            events,
            keep_alive,
        } = *self;
        let id = mailbox.id();

        let mut idle = interval_at(Instant::now() + keep_alive, keep_alive);
        idle.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                payload = mailbox.recv() => match payload {
                    Some(payload) => {
                        if events.send(Ok(Event::default().data(payload.as_ref()))).await.is_err() {
                            debug!("SSE stream for {} dropped during send", id);
                            break;
                        }
                        idle.reset();
                    }
                    None => break,
                },
                _ = idle.tick() => {
                    if events.send(Ok(Event::default().comment(KEEP_ALIVE_TEXT))).await.is_err() {
                        break;
                    }
                }
                _ = events.closed() => {
                    debug!("SSE peer {} disconnected", id);
                    break;
                }
            }
        }
    }
}

/// Run one viewer for its whole life: register, deliver, unregister.
pub async fn serve(handle: ClientHandle, client: Box<dyn Client>, hub: HubHandle) {
    let id = client.id();
    let transport = client.transport();

    if let Err(e) = hub.join(handle).await {
        warn!("Viewer {} could not join: {}", id, e);
        return;
    }
    info!("Viewer {} connected over {}", id, transport);

    client.write_loop().await;

    if let Err(e) = hub.leave(id).await {
        debug!("Viewer {} could not leave: {}", id, e);
    }
    info!("Viewer {} disconnected", id);
}
