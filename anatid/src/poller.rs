use crate::fetcher::Fetcher;
use crate::hub::HubHandle;
use crate::parser;
use crate::tribune::Tribunes;
use crate::types::{Payload, Result, Tribune};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const TRIGGER_CAPACITY: usize = 16;

/// Asks the poller to refresh one tribune as soon as it is free.
#[derive(Debug, Clone)]
pub struct PollTrigger {
    requests: mpsc::Sender<String>,
}

impl PollTrigger {
    /// A trigger and the receiving end the poller listens on.
    pub fn channel() -> (PollTrigger, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(TRIGGER_CAPACITY);
        (PollTrigger { requests: tx }, rx)
    }

    /// Best effort: the request is dropped if the poller is saturated or gone.
    pub fn request(&self, tribune: &str) {
        match self.requests.try_send(tribune.to_string()) {
            Ok(()) => {}
            Err(TrySendError::Full(name)) => debug!("Poll of {} already pending, dropping request", name),
            Err(TrySendError::Closed(name)) => warn!("Poller stopped, cannot poll {}", name),
        }
    }
}

/// Drives every backend poll. Timer sweeps and on-demand requests go through the same loop,
/// so a tribune is never fetched twice at once.
pub struct Poller {
    tribunes: Arc<Tribunes>,
    fetcher: Fetcher,
    hub: HubHandle,
    interval: Duration,
    requests: mpsc::Receiver<String>,
}

impl Poller {
    pub fn new(
        tribunes: Arc<Tribunes>,
        fetcher: Fetcher,
        hub: HubHandle,
        interval: Duration,
    ) -> (Poller, PollTrigger) {
        let (trigger, requests) = PollTrigger::channel();
        let poller = Poller {
            tribunes,
            fetcher,
            hub,
            interval,
            requests,
        };
        (poller, trigger)
    }

    pub async fn run(mut self) {
        info!(
            "Polling {} tribunes every {:?}",
            self.tribunes.len(),
            self.interval
        );

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut requests_open = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep().await,
                request = self.requests.recv(), if requests_open => match request {
                    Some(name) => self.poll_named(&name).await,
                    None => {
                        debug!("Every poll trigger dropped, sweeping on the timer only");
                        requests_open = false;
                    }
                },
            }
        }
    }

    /// Poll every tribune in turn. A failing tribune is logged and skipped.
    pub async fn sweep(&self) {
        for tribune in self.tribunes.iter() {
            if let Err(e) = self.poll_tribune(tribune).await {
                error!("Poll of {} failed: {}", tribune.name, e);
            }
        }
    }

    async fn poll_named(&self, name: &str) {
        match self.tribunes.get(name) {
            Some(tribune) => {
                if let Err(e) = self.poll_tribune(tribune).await {
                    error!("Poll of {} failed: {}", name, e);
                }
            }
            None => warn!("Poll requested for unknown tribune {}", name),
        }
    }

    /// Fetch one tribune and publish its whole current snapshot as a JSON array.
    ///
    /// Returns the number of posts published.
    pub async fn poll_tribune(&self, tribune: &Tribune) -> Result<usize> {
        debug!("Poll {}", tribune.name);
        let posts = parser::poll(&self.fetcher, tribune).await?;

        if posts.is_empty() {
            return Ok(0);
        }

        let payload: Payload = serde_json::to_string(&posts)?.into();
        self.hub.publish(payload).await?;
        Ok(posts.len())
    }
}
