use std::fmt;

use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::transport::{TaskHandle, Transport};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
    Error,
}

impl ConnectionStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "not connected",
            Self::Connecting => "connecting...",
            Self::Open => "receiving",
            Self::Closed => "disconnected",
            Self::Error => "error",
        }
    }

    pub fn is_live(self) -> bool {
        match self {
            Self::Connecting | Self::Open => true,
            Self::Idle | Self::Closed | Self::Error => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StreamKey {
    State,
    HubPackets(String),
    DeviceEvents(String),
}

impl StreamKey {
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::State => None,
            Self::HubPackets(id) | Self::DeviceEvents(id) => Some(id),
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State => f.write_str("updates"),
            Self::HubPackets(id) => write!(f, "hub:{id}/packets"),
            Self::DeviceEvents(id) => write!(f, "device:{id}/events"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketEvent {
    Opened,
    Text(String),
    Closed { clean: bool },
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamSignal {
    Socket { generation: u64, event: SocketEvent },
    ReconnectDue { ticket: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEvent {
    pub key: StreamKey,
    pub signal: StreamSignal,
}

/// User-facing connectivity changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Reconnected,
    Interrupted,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryOutcome {
    Ignored,
    StatusChanged,
    Text(String),
    Notice(Notice),
}

struct PendingTimer {
    ticket: u64,
    _handle: TaskHandle,
}

/// One streamed endpoint: the socket it owns, where it is in the
/// `Idle -> Connecting -> Open -> Closed | Error` cycle, and whatever the feed
/// accumulated from it.
pub struct ConnectionEntry<F> {
    key: StreamKey,
    url: Option<String>,
    status: ConnectionStatus,
    generation: u64,
    attempts: u32,
    socket: Option<TaskHandle>,
    timer: Option<PendingTimer>,
    next_ticket: u64,
    pub feed: F,
}

impl<F> ConnectionEntry<F> {
    pub fn new(key: StreamKey, feed: F) -> Self {
        Self {
            key,
            url: None,
            status: ConnectionStatus::Idle,
            generation: 0,
            attempts: 0,
            socket: None,
            timer: None,
            next_ticket: 0,
            feed,
        }
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.timer.is_some()
    }

    /// Returns `true` when a new socket was opened.
    pub fn connect(
        &mut self,
        url: Option<String>,
        reset: bool,
        transport: &mut dyn Transport,
    ) -> bool {
        self.timer = None;

        let Some(url) = url else {
            warn!(key = %self.key, "no endpoint to connect to");
            self.socket = None;
            self.url = None;
            self.status = ConnectionStatus::Error;
            return false;
        };

        let same_target = self.url.as_deref() == Some(url.as_str());
        if !reset && same_target && self.socket.is_some() && self.status.is_live() {
            return false;
        }

        self.socket = None;
        if reset {
            self.attempts = 0;
        }
        self.generation += 1;
        info!(
            key = %self.key,
            %url,
            generation = self.generation,
            attempts = self.attempts,
            "opening stream"
        );
        self.socket = Some(transport.open(&self.key, self.generation, &url));
        self.url = Some(url);
        self.status = ConnectionStatus::Connecting;
        true
    }

    pub fn close(&mut self) {
        self.timer = None;
        if self.socket.take().is_some() {
            debug!(key = %self.key, "stream closed locally");
        }
        if self.status != ConnectionStatus::Idle {
            self.status = ConnectionStatus::Closed;
        }
    }

    pub fn handle_socket(
        &mut self,
        generation: u64,
        event: SocketEvent,
        backoff: &Backoff,
        transport: &mut dyn Transport,
    ) -> EntryOutcome {
        if generation != self.generation || self.socket.is_none() {
            debug!(key = %self.key, generation, current = self.generation, "dropping stale socket event");
            return EntryOutcome::Ignored;
        }

        match event {
            SocketEvent::Opened => {
                let recovered = self.attempts > 0;
                self.attempts = 0;
                self.status = ConnectionStatus::Open;
                if recovered {
                    EntryOutcome::Notice(Notice::Reconnected)
                } else {
                    EntryOutcome::StatusChanged
                }
            }
            SocketEvent::Text(text) => EntryOutcome::Text(text),
            SocketEvent::Closed { clean: true } => {
                self.socket = None;
                self.status = ConnectionStatus::Closed;
                EntryOutcome::StatusChanged
            }
            SocketEvent::Closed { clean: false } => {
                self.socket = None;
                self.status = ConnectionStatus::Closed;
                self.schedule_reconnect(backoff, transport);
                EntryOutcome::Notice(Notice::Interrupted)
            }
            SocketEvent::Failed(reason) => {
                self.socket = None;
                self.status = ConnectionStatus::Error;
                self.schedule_reconnect(backoff, transport);
                EntryOutcome::Notice(Notice::Failed(reason))
            }
        }
    }

    /// Returns `true` when the timer was current and a reconnect was issued.
    pub fn handle_timer(&mut self, ticket: u64, transport: &mut dyn Transport) -> bool {
        if self.timer.as_ref().map(|timer| timer.ticket) != Some(ticket) {
            return false;
        }
        self.timer = None;
        let url = self.url.clone();
        self.connect(url, false, transport);
        true
    }

    /// A `ready` message from the server. Returns `true` if the status moved.
    pub fn mark_ready(&mut self) -> bool {
        let changed = self.status != ConnectionStatus::Open;
        self.status = ConnectionStatus::Open;
        changed
    }

    fn schedule_reconnect(&mut self, backoff: &Backoff, transport: &mut dyn Transport) {
        self.timer = None;
        if self.url.is_none() {
            return;
        }

        self.attempts = self.attempts.saturating_add(1);
        let delay = backoff.delay(self.attempts);
        self.next_ticket += 1;
        info!(
            key = %self.key,
            attempt = self.attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        let handle = transport.schedule_reconnect(&self.key, self.next_ticket, delay);
        self.timer = Some(PendingTimer {
            ticket: self.next_ticket,
            _handle: handle,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::net::transport::recording::RecordingTransport;

    const URL: &str = "ws://localhost:8000/updates";

    fn entry() -> ConnectionEntry<()> {
        ConnectionEntry::new(StreamKey::State, ())
    }

    #[test]
    fn opens_once_per_target() {
        let mut transport = RecordingTransport::default();
        let mut entry = entry();

        assert!(entry.connect(Some(URL.to_owned()), false, &mut transport));
        assert_eq!(entry.status(), ConnectionStatus::Connecting);
        assert!(!entry.connect(Some(URL.to_owned()), false, &mut transport));

        let backoff = Backoff::default();
        entry.handle_socket(1, SocketEvent::Opened, &backoff, &mut transport);
        assert_eq!(entry.status(), ConnectionStatus::Open);
        assert!(!entry.connect(Some(URL.to_owned()), false, &mut transport));
        assert_eq!(transport.opens().len(), 1);

        assert!(entry.connect(Some(URL.to_owned()), true, &mut transport));
        assert!(entry.connect(Some("ws://elsewhere/updates".to_owned()), false, &mut transport));
        assert_eq!(transport.opens().len(), 3);
        assert_eq!(transport.opens()[2].1, 3);
    }

    #[test]
    fn failures_back_off_and_success_resets_the_counter() {
        let mut transport = RecordingTransport::default();
        let backoff = Backoff::default();
        let mut entry = entry();
        entry.connect(Some(URL.to_owned()), false, &mut transport);

        let mut generation = 1;
        for expected in [1, 2, 4] {
            let outcome = entry.handle_socket(
                generation,
                SocketEvent::Failed("refused".to_owned()),
                &backoff,
                &mut transport,
            );
            assert_eq!(outcome, EntryOutcome::Notice(Notice::Failed("refused".to_owned())));
            assert_eq!(entry.status(), ConnectionStatus::Error);

            let (_, ticket, delay) = transport.timers().last().cloned().expect("timer armed");
            assert_eq!(delay, Duration::from_secs(expected));
            assert!(entry.handle_timer(ticket, &mut transport));
            assert_eq!(entry.status(), ConnectionStatus::Connecting);
            generation += 1;
        }

        let outcome = entry.handle_socket(generation, SocketEvent::Opened, &backoff, &mut transport);
        assert_eq!(outcome, EntryOutcome::Notice(Notice::Reconnected));
        assert_eq!(entry.attempts(), 0);
    }

    #[test]
    fn first_open_is_not_announced() {
        let mut transport = RecordingTransport::default();
        let mut entry = entry();
        entry.connect(Some(URL.to_owned()), false, &mut transport);
        let outcome = entry.handle_socket(1, SocketEvent::Opened, &Backoff::default(), &mut transport);
        assert_eq!(outcome, EntryOutcome::StatusChanged);
    }

    #[test]
    fn stale_generations_are_ignored() {
        let mut transport = RecordingTransport::default();
        let backoff = Backoff::default();
        let mut entry = entry();
        entry.connect(Some(URL.to_owned()), false, &mut transport);
        entry.connect(Some(URL.to_owned()), true, &mut transport);

        let outcome = entry.handle_socket(
            1,
            SocketEvent::Closed { clean: false },
            &backoff,
            &mut transport,
        );
        assert_eq!(outcome, EntryOutcome::Ignored);
        assert_eq!(entry.status(), ConnectionStatus::Connecting);
        assert!(transport.timers().is_empty());
    }

    #[test]
    fn clean_close_does_not_reconnect_but_abrupt_close_does() {
        let mut transport = RecordingTransport::default();
        let backoff = Backoff::default();

        let mut clean = entry();
        clean.connect(Some(URL.to_owned()), false, &mut transport);
        let outcome = clean.handle_socket(1, SocketEvent::Closed { clean: true }, &backoff, &mut transport);
        assert_eq!(outcome, EntryOutcome::StatusChanged);
        assert_eq!(clean.status(), ConnectionStatus::Closed);
        assert!(!clean.has_pending_reconnect());

        let mut abrupt = entry();
        abrupt.connect(Some(URL.to_owned()), false, &mut transport);
        let outcome = abrupt.handle_socket(1, SocketEvent::Closed { clean: false }, &backoff, &mut transport);
        assert_eq!(outcome, EntryOutcome::Notice(Notice::Interrupted));
        assert!(abrupt.has_pending_reconnect());
    }

    #[test]
    fn reconnecting_replaces_the_pending_timer() {
        let mut transport = RecordingTransport::default();
        let backoff = Backoff::default();
        let mut entry = entry();
        entry.connect(Some(URL.to_owned()), false, &mut transport);
        entry.handle_socket(1, SocketEvent::Failed("boom".to_owned()), &backoff, &mut transport);
        let (_, first_ticket, _) = transport.timers()[0].clone();

        entry.connect(Some(URL.to_owned()), true, &mut transport);
        assert!(!entry.has_pending_reconnect());
        assert!(!entry.handle_timer(first_ticket, &mut transport));
        assert_eq!(transport.opens().len(), 2);
        assert_eq!(transport.calls().len(), 3);
    }

    #[test]
    fn close_is_idempotent_and_missing_urls_fail() {
        let mut transport = RecordingTransport::default();
        let mut entry = entry();
        entry.close();
        assert_eq!(entry.status(), ConnectionStatus::Idle);

        entry.connect(Some(URL.to_owned()), false, &mut transport);
        entry.close();
        entry.close();
        assert_eq!(entry.status(), ConnectionStatus::Closed);

        assert!(!entry.connect(None, false, &mut transport));
        assert_eq!(entry.status(), ConnectionStatus::Error);
        assert_eq!(entry.url(), None);
    }

    #[test]
    fn ready_marks_the_entry_open() {
        let mut transport = RecordingTransport::default();
        let mut entry = entry();
        entry.connect(Some(URL.to_owned()), false, &mut transport);
        assert!(entry.mark_ready());
        assert!(!entry.mark_ready());
        assert_eq!(entry.status(), ConnectionStatus::Open);
    }
}
