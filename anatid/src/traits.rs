use crate::client::ClientId;
use async_trait::async_trait;

/// A connected viewer: owns the receiving end of its outbound queue and one push transport.
///
/// The hub keeps the sending end (`ClientHandle`). Payloads enqueued there are delivered by
/// `write_loop`, which returns once the transport fails or the queue is closed and drained.
#[async_trait]
pub trait Client: Send {
    /// Registry key for this viewer.
    fn id(&self) -> ClientId;

    /// Transport name used in log lines.
    fn transport(&self) -> &'static str;

    /// Drain the queue onto the transport until either side ends, then release the transport.
    async fn write_loop(self: Box<Self>);
}
