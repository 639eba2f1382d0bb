// File: lnnfc-common/src/traits/transport_traits.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::TransportError;
use crate::models::tag::TagId;

/// Driver for a single NFC reader/writer.
///
/// Byte buffers are the tag's user memory image starting at the first TLV;
/// framing them is the codec's job.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait TagTransport: Send {
    async fn connect(&mut self) -> Result<(), TransportError>;
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Blocks until a tag enters the field or `timeout` elapses.
    async fn wait_for_tag(&mut self, timeout: Duration) -> Result<Option<TagId>, TransportError>;

    /// `None` when the tag holds no formatted data.
    async fn read_message(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    async fn write_message(&mut self, data: &[u8]) -> Result<bool, TransportError>;

    /// Leaves an empty NDEF message on the tag.
    async fn clear(&mut self) -> Result<bool, TransportError>;
}

/// One transport per process; holders lock it for a whole hardware sequence.
pub type SharedTransport = Arc<Mutex<dyn TagTransport>>;

pub fn shared<T: TagTransport + 'static>(transport: T) -> SharedTransport {
    Arc::new(Mutex::new(transport))
}
