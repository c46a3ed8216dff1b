mod backoff;
mod connection;
mod endpoint;
mod feeds;
mod fetch;
mod manager;
mod schema;
mod transport;

pub use backoff::Backoff;
pub use connection::{ConnectionEntry, ConnectionStatus, Notice, SocketEvent, StreamEvent, StreamKey, StreamSignal};
pub use endpoint::{Endpoint, EndpointError};
pub use feeds::{ChatBody, ChatMessage, Contact, DeviceFeed, PacketFeed, ReplyStatus};
pub use fetch::fetch_snapshot;
pub use manager::{Inbound, StreamManager};
pub use schema::{
    DeviceSnapshot, HubSnapshot, PacketRecord, PacketTransfer, Snapshot, StateMessage,
    decode_snapshot, parse_state_message,
};
pub use transport::{TokioTransport, Transport};
#[cfg(test)]
pub(crate) use transport::recording::RecordingTransport;

/// Everything background tasks report to the render thread.
#[derive(Debug)]
pub enum NetEvent {
    SnapshotLoaded {
        silent: bool,
        result: Result<Snapshot, String>,
    },
    Stream(StreamEvent),
}
