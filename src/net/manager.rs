use tracing::{debug, warn};

use super::backoff::Backoff;
use super::connection::{
    ConnectionEntry, ConnectionStatus, EntryOutcome, Notice, StreamEvent, StreamKey, StreamSignal,
};
use super::endpoint::Endpoint;
use super::feeds::{DeviceFeed, PacketFeed};
use super::schema::{FeedMessage, parse_feed_message};
use super::transport::Transport;

/// What the render thread needs to act on after a stream event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    StateText(String),
    StateNotice(Notice),
    DeviceStreaming { device_id: String, streaming: bool },
}

/// Owns the state-update stream plus at most one hub packet feed and one
/// device event feed.
pub struct StreamManager {
    transport: Box<dyn Transport>,
    backoff: Backoff,
    endpoint: Option<Endpoint>,
    state: ConnectionEntry<()>,
    hub: Option<ConnectionEntry<PacketFeed>>,
    device: Option<ConnectionEntry<DeviceFeed>>,
}

impl StreamManager {
    pub fn new(transport: Box<dyn Transport>, endpoint: Option<Endpoint>, backoff: Backoff) -> Self {
        Self {
            transport,
            backoff,
            endpoint,
            state: ConnectionEntry::new(StreamKey::State, ()),
            hub: None,
            device: None,
        }
    }

    pub fn state_status(&self) -> ConnectionStatus {
        self.state.status()
    }

    pub fn hub_feed(&self) -> Option<&ConnectionEntry<PacketFeed>> {
        self.hub.as_ref()
    }

    pub fn device_feed(&self) -> Option<&ConnectionEntry<DeviceFeed>> {
        self.device.as_ref()
    }

    pub fn connect_state(&mut self, reset: bool) -> bool {
        let url = self.endpoint.as_ref().map(Endpoint::updates_url);
        self.state.connect(url, reset, self.transport.as_mut())
    }

    /// The state feed announced itself with a `ready` message.
    pub fn mark_state_ready(&mut self) -> bool {
        self.state.mark_ready()
    }

    /// Opens the packet feed for `hub_id`, replacing any other hub's feed. A
    /// feed already waiting out its backoff keeps its timer.
    pub fn open_hub_feed(&mut self, hub_id: &str) {
        let key = StreamKey::HubPackets(hub_id.to_owned());
        if self.hub.as_ref().is_some_and(|entry| entry.key() != &key) {
            self.close_hub_feed();
        }

        if self.hub.as_ref().is_some_and(ConnectionEntry::has_pending_reconnect) {
            return;
        }

        let url = self.endpoint.as_ref().map(|endpoint| endpoint.hub_packets_url(hub_id));
        let entry = self
            .hub
            .get_or_insert_with(|| ConnectionEntry::new(key, PacketFeed::default()));
        entry.connect(url, false, self.transport.as_mut());
    }

    /// `streaming` seeds the feed's indicator from the graph node.
    pub fn open_device_feed(&mut self, device_id: &str, streaming: bool) {
        let key = StreamKey::DeviceEvents(device_id.to_owned());
        if self.device.as_ref().is_some_and(|entry| entry.key() != &key) {
            self.close_device_feed();
        }

        if self.device.as_ref().is_some_and(ConnectionEntry::has_pending_reconnect) {
            return;
        }

        let url = self
            .endpoint
            .as_ref()
            .map(|endpoint| endpoint.device_events_url(device_id));
        let entry = self
            .device
            .get_or_insert_with(|| ConnectionEntry::new(key, DeviceFeed::new(streaming)));
        entry.connect(url, false, self.transport.as_mut());
    }

    pub fn close_hub_feed(&mut self) {
        if let Some(mut entry) = self.hub.take() {
            entry.close();
        }
    }

    pub fn close_device_feed(&mut self) {
        if let Some(mut entry) = self.device.take() {
            entry.close();
        }
    }

    /// A full snapshot is authoritative for the open device feed's indicator.
    pub fn override_device_streaming(&mut self, device_id: &str, streaming: bool) -> bool {
        match self.device.as_mut() {
            Some(entry) if entry.key().subject() == Some(device_id) => {
                entry.feed.override_streaming(streaming);
                true
            }
            _ => false,
        }
    }

    pub fn handle(&mut self, event: StreamEvent) -> Option<Inbound> {
        let StreamEvent { key, signal } = event;
        let transport = self.transport.as_mut();

        match &key {
            StreamKey::State => match drive(&mut self.state, signal, &self.backoff, transport) {
                EntryOutcome::Text(text) => Some(Inbound::StateText(text)),
                EntryOutcome::Notice(notice) => Some(Inbound::StateNotice(notice)),
                EntryOutcome::StatusChanged | EntryOutcome::Ignored => None,
            },
            StreamKey::HubPackets(_) => {
                let entry = self.hub.as_mut().filter(|entry| entry.key() == &key)?;
                if let EntryOutcome::Text(text) = drive(entry, signal, &self.backoff, transport) {
                    match parse_feed_message(&text) {
                        Ok(FeedMessage::Ready) => {
                            entry.mark_ready();
                        }
                        Ok(FeedMessage::Keepalive) => {}
                        Ok(FeedMessage::Payload(payload)) => {
                            if !entry.feed.push_payload(&payload) {
                                debug!(%key, "hub feed message without a packet");
                            }
                        }
                        Err(error) => warn!(%key, %error, "ignoring malformed hub feed message"),
                    }
                }
                None
            }
            StreamKey::DeviceEvents(device_id) => {
                let entry = self.device.as_mut().filter(|entry| entry.key() == &key)?;
                let streaming = match drive(entry, signal, &self.backoff, transport) {
                    EntryOutcome::Ignored => return None,
                    EntryOutcome::Text(text) => match parse_feed_message(&text) {
                        Ok(FeedMessage::Ready) => {
                            entry.mark_ready();
                            entry.feed.refresh_streaming()
                        }
                        Ok(FeedMessage::Keepalive) => return None,
                        Ok(FeedMessage::Payload(payload)) => entry.feed.process(&payload),
                        Err(error) => {
                            warn!(%key, %error, "ignoring malformed device event");
                            return None;
                        }
                    },
                    EntryOutcome::StatusChanged | EntryOutcome::Notice(_) => {
                        entry.feed.refresh_streaming()
                    }
                };
                Some(Inbound::DeviceStreaming {
                    device_id: device_id.clone(),
                    streaming,
                })
            }
        }
    }
}

fn drive<F>(
    entry: &mut ConnectionEntry<F>,
    signal: StreamSignal,
    backoff: &Backoff,
    transport: &mut dyn Transport,
) -> EntryOutcome {
    match signal {
        StreamSignal::Socket { generation, event } => {
            entry.handle_socket(generation, event, backoff, transport)
        }
        StreamSignal::ReconnectDue { ticket } => {
            if entry.handle_timer(ticket, transport) {
                EntryOutcome::StatusChanged
            } else {
                EntryOutcome::Ignored
            }
        }
    }
}
