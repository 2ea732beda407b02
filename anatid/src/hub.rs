//! Broadcast hub.
//!
//! The registry of connected viewers lives inside a single task. Everything else talks to it
//! through [`HubHandle`], so joins, leaves and publishes are applied one at a time in arrival
//! order and the registry needs no lock.

use crate::client::{ClientHandle, ClientId, Rejected};
use crate::types::{AggregatorError, Payload, Result};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

#[derive(Debug)]
enum Command {
    Join(ClientHandle),
    Leave(ClientId),
    Publish(Payload),
    ClientCount(oneshot::Sender<usize>),
}

/// Cloneable address of the hub task.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
}

impl HubHandle {
    pub async fn join(&self, client: ClientHandle) -> Result<()> {
        self.send(Command::Join(client)).await
    }

    /// Unregister a viewer and close its queue. Unknown ids are ignored.
    pub async fn leave(&self, id: ClientId) -> Result<()> {
        self.send(Command::Leave(id)).await
    }

    /// Queue `payload` for every registered viewer, evicting those that cannot take it.
    pub async fn publish(&self, payload: Payload) -> Result<()> {
        self.send(Command::Publish(payload)).await
    }

    pub async fn client_count(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::ClientCount(tx)).await?;
        rx.await.map_err(|_| AggregatorError::HubClosed)
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AggregatorError::HubClosed)
    }
}

pub struct Hub {
    clients: HashMap<ClientId, ClientHandle>,
    commands: mpsc::Receiver<Command>,
}

impl Hub {
    pub fn new(capacity: usize) -> (Hub, HubHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let hub = Hub {
            clients: HashMap::new(),
            commands: rx,
        };
        (hub, HubHandle { commands: tx })
    }

    /// Start the hub on the current runtime.
    pub fn spawn(capacity: usize) -> HubHandle {
        let (hub, handle) = Hub::new(capacity);
        tokio::spawn(hub.run());
        handle
    }

    /// Process commands until every handle has been dropped.
    pub async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        debug!("Hub stopped with {} viewers registered", self.clients.len());
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Join(client) => {
                self.clients.insert(client.id(), client);
            }
            Command::Leave(id) => {
                // Dropping the handle closes the viewer's queue.
                self.clients.remove(&id);
            }
            Command::Publish(payload) => self.publish(payload),
            Command::ClientCount(reply) => {
                let _ = reply.send(self.clients.len());
            }
        }
    }

    fn publish(&mut self, payload: Payload) {
        let mut evicted = Vec::new();

        for (id, client) in &self.clients {
            match client.offer(payload.clone()) {
                Ok(()) => {}
                Err(Rejected::Full) => {
                    info!("Evicting viewer {}: queue full", id);
                    evicted.push(*id);
                }
                Err(Rejected::Closed) => evicted.push(*id),
            }
        }

        for id in evicted {
            self.clients.remove(&id);
        }
    }
}
