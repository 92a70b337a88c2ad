//! Seams between transports and processing.

use async_trait::async_trait;

/// Consumes raw message bodies delivered by a transport.
///
/// Implementations must not fail: anything they cannot process is logged
/// and dropped so the transport can acknowledge and move on.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]);
}
