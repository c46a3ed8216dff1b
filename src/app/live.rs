use eframe::egui::Vec2;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::net::{
    Inbound, Notice, Snapshot, StateMessage, StreamEvent, StreamManager, parse_state_message,
};

use super::graph::{Graph, NodeKind, ReconcileConfig, ReconcileContext, ReconcileSummary, reconcile};
use super::overlay::PacketOverlay;
use super::physics;
use super::{INITIAL_BOUNDS, LiveView, PhysicsConfig, StatusKind, StatusLine};

/// Status text for the `reason` carried by a full-state event.
pub(in crate::app) fn describe_reason(reason: &str) -> &'static str {
    match reason {
        "init" => "Initial state received",
        "hub.created" => "Hub added",
        "hub.deleted" => "Hub removed",
        "hub.connection.created" => "Hub link updated",
        "hub.connection.removed" => "Hub link removed",
        "device.created" => "Device added",
        "device.deleted" => "Device removed",
        "device.moved" => "Device moved to another hub",
        "device.streaming" => "Device reply state updated",
        _ => "Live update",
    }
}

impl LiveView {
    pub(in crate::app) fn new(
        streams: StreamManager,
        live_updates: bool,
        endpoint_label: String,
        rng: StdRng,
    ) -> Self {
        Self {
            graph: Graph::default(),
            overlay: PacketOverlay::default(),
            streams,
            live_updates,
            selected: None,
            status: StatusLine::default(),
            refreshing: false,
            pan: Vec2::ZERO,
            zoom: 1.0,
            bounds: INITIAL_BOUNDS,
            rng,
            reconcile: ReconcileConfig::default(),
            physics: PhysicsConfig::default(),
            live_physics: true,
            endpoint_label,
        }
    }

    pub(in crate::app) fn connect_state(&mut self, reset: bool) {
        if self.live_updates {
            self.streams.connect_state(reset);
        }
    }

    /// Merges a snapshot into the graph. Non-silent loads drop the selection;
    /// silent ones keep it when the selected id survived.
    pub(in crate::app) fn apply_snapshot(
        &mut self,
        snapshot: &Snapshot,
        silent: bool,
        message: Option<&str>,
        now: f64,
    ) -> ReconcileSummary {
        if !silent {
            self.set_selected(None);
        }

        let ctx = ReconcileContext {
            bounds: self.bounds,
            now,
            config: self.reconcile,
        };
        let summary = reconcile(&mut self.graph, snapshot, &ctx, &mut self.rng);

        let feed_device = self
            .streams
            .device_feed()
            .and_then(|entry| entry.key().subject())
            .map(str::to_owned);
        if let Some(device_id) = feed_device
            && let Some(device) = snapshot.devices.iter().find(|device| device.id == device_id)
        {
            self.streams.override_device_streaming(&device_id, device.streaming);
        }

        match message {
            Some(message) if silent => self.status.set_if_not_busy(message),
            Some(message) => self.status.set(message, StatusKind::Idle),
            None if !silent && snapshot.is_empty() => {
                self.status.set("The service reports no hubs or devices", StatusKind::Idle);
            }
            None if !silent => self.status.set(
                format!(
                    "Loaded {} hubs, {} devices",
                    snapshot.hubs.len(),
                    snapshot.devices.len()
                ),
                StatusKind::Idle,
            ),
            None => {}
        }

        if silent {
            self.revalidate_selection();
        }
        summary
    }

    /// Starts a manual reload.
    pub(in crate::app) fn begin_refresh(&mut self) {
        self.refreshing = true;
        self.set_selected(None);
        self.status.set("Loading...", StatusKind::Loading);
    }

    pub(in crate::app) fn finish_refresh(&mut self, silent: bool, result: Result<Snapshot, String>, now: f64) {
        self.refreshing = false;
        match result {
            Ok(snapshot) => {
                self.apply_snapshot(&snapshot, silent, None, now);
                if !silent {
                    self.connect_state(true);
                }
            }
            Err(error) => self.status.set(format!("Fetch failed: {error}"), StatusKind::Error),
        }
    }

    pub(in crate::app) fn handle_stream_event(&mut self, event: StreamEvent, now: f64) {
        match self.streams.handle(event) {
            Some(Inbound::StateText(text)) => self.handle_state_text(&text, now),
            Some(Inbound::StateNotice(notice)) => self.handle_state_notice(&notice),
            Some(Inbound::DeviceStreaming {
                device_id,
                streaming,
            }) => {
                self.graph.set_device_streaming(&device_id, streaming, now);
            }
            None => {}
        }
    }

    fn handle_state_text(&mut self, text: &str, now: f64) {
        match parse_state_message(text) {
            Ok(StateMessage::FullState {
                event,
                reason,
                snapshot,
            }) => {
                debug!(event = ?event, reason = ?reason, "full state received");
                let message = reason.as_deref().map(describe_reason);
                self.apply_snapshot(&snapshot, true, message, now);
            }
            Ok(StateMessage::PacketTransfer(transfer)) => {
                if !self.overlay.push(&transfer, &self.graph, now) {
                    debug!(
                        source = %transfer.source,
                        target = %transfer.target,
                        "packet transfer between unknown nodes"
                    );
                }
            }
            Ok(StateMessage::Ready) => {
                self.streams.mark_state_ready();
            }
            Ok(StateMessage::Keepalive) => {}
            Ok(StateMessage::Ignored(event)) => debug!(event = ?event, "ignoring state event"),
            Err(error) => warn!(%error, "ignoring malformed state message"),
        }
    }

    fn handle_state_notice(&mut self, notice: &Notice) {
        match notice {
            Notice::Reconnected => self.status.set_if_not_busy("Connected to live updates"),
            Notice::Interrupted => {
                self.status
                    .set_if_not_busy("Live updates interrupted, reconnecting...");
            }
            Notice::Failed(reason) => {
                warn!(%reason, "live update stream failed");
                self.status.set_if_not_busy("Live update connection error");
            }
        }
    }

    /// Changes the selection and opens the matching detail feed. Hubs get a
    /// packet feed, devices an event feed; the other kind is closed.
    pub(in crate::app) fn set_selected(&mut self, selected: Option<String>) {
        if self.selected == selected {
            return;
        }
        self.selected = selected;
        self.sync_feeds();
    }

    fn revalidate_selection(&mut self) {
        let Some(id) = self.selected.as_deref() else {
            return;
        };
        if self.graph.node(id).is_none() {
            info!(id, "selected node disappeared");
            self.selected = None;
        }
        self.sync_feeds();
    }

    fn sync_feeds(&mut self) {
        let selected = self
            .selected
            .as_deref()
            .and_then(|id| self.graph.node(id))
            .map(|node| (node.id.clone(), node.kind, node.streaming));

        match selected {
            Some((id, NodeKind::Hub, _)) if self.live_updates => {
                self.streams.close_device_feed();
                self.streams.open_hub_feed(&id);
            }
            Some((id, NodeKind::Device, streaming)) if self.live_updates => {
                self.streams.close_hub_feed();
                self.streams.open_device_feed(&id, streaming);
            }
            _ => {
                self.streams.close_hub_feed();
                self.streams.close_device_feed();
            }
        }
    }

    /// Advances pulses and runs one physics step.
    pub(in crate::app) fn tick(&mut self, now: f64) {
        self.overlay.advance(now, &self.graph);
        if self.live_physics {
            physics::step(&mut self.graph, self.bounds, &self.physics);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use serde_json::json;

    use super::*;
    use crate::net::{
        Backoff, ConnectionStatus, Endpoint, RecordingTransport, SocketEvent, StreamKey,
        StreamSignal, decode_snapshot,
    };

    fn view() -> (LiveView, RecordingTransport) {
        let transport = RecordingTransport::default();
        let endpoint = Endpoint::parse("http://localhost:8000").ok();
        let streams = StreamManager::new(Box::new(transport.clone()), endpoint, Backoff::default());
        let view = LiveView::new(
            streams,
            true,
            "http://localhost:8000".to_owned(),
            StdRng::seed_from_u64(3),
        );
        (view, transport)
    }

    fn snapshot() -> Snapshot {
        decode_snapshot(
            &json!([
                {"id": "H1", "name": "Lobby", "connectedHubs": ["H2"], "connectedDevices": ["D1"]},
                {"id": "H2"}
            ]),
            &json!([
                {"id": "D1", "hubUuid": "H1"},
                {"id": "D2", "hubUuid": "H2", "isStreaming": true}
            ]),
        )
    }

    fn state_text(raw: serde_json::Value) -> StreamEvent {
        StreamEvent {
            key: StreamKey::State,
            signal: StreamSignal::Socket {
                generation: 1,
                event: SocketEvent::Text(raw.to_string()),
            },
        }
    }

    fn loaded() -> (LiveView, RecordingTransport) {
        let (mut view, transport) = view();
        view.apply_snapshot(&snapshot(), false, None, 0.0);
        view.connect_state(false);
        (view, transport)
    }

    #[test]
    fn initial_load_builds_the_graph() {
        let (view, transport) = loaded();
        assert_eq!(view.graph.nodes.len(), 4);
        assert_eq!(view.graph.edges.len(), 3);
        assert_eq!(view.status.kind, StatusKind::Idle);
        assert_eq!(view.status.text, "Loaded 2 hubs, 2 devices");
        assert_eq!(transport.opens().len(), 1);
    }

    #[test]
    fn full_state_events_reconcile_and_describe_the_reason() {
        let (mut view, _transport) = loaded();
        let before = view.graph.node("H1").map(|node| node.pos);

        view.handle_stream_event(
            state_text(json!({
                "event": "state.update",
                "reason": "device.created",
                "hubs": [{"id": "H1", "connectedDevices": ["D1", "D3"]}, {"id": "H2"}],
                "devices": [{"id": "D1", "hubUuid": "H1"}, {"id": "D3", "hubUuid": "H1"}]
            })),
            1.0,
        );

        assert!(view.graph.node("D3").is_some());
        assert!(view.graph.node("D2").is_none());
        assert_eq!(view.graph.node("H1").map(|node| node.pos), before);
        assert_eq!(view.status.text, "Device added");
    }

    #[test]
    fn state_init_maps_to_the_init_message() {
        let (mut view, _transport) = loaded();
        view.handle_stream_event(
            state_text(json!({"event": "state.init", "hubs": [], "devices": []})),
            1.0,
        );
        assert!(view.graph.is_empty());
        assert_eq!(view.status.text, "Initial state received");
    }

    #[test]
    fn packet_transfers_start_pulses_without_reconciling() {
        let (mut view, _transport) = loaded();
        let nodes_before = view.graph.nodes.len();

        view.handle_stream_event(
            state_text(json!({
                "event": "packet.transfer",
                "sourceUuid": "H1",
                "targetUuid": "D1",
                "packet": {"type": "talk"}
            })),
            2.0,
        );
        view.handle_stream_event(
            state_text(json!({
                "event": "packet.transfer",
                "sourceUuid": "H1",
                "targetUuid": "ghost",
                "packet": {"type": "talk"}
            })),
            2.0,
        );

        assert_eq!(view.overlay.len(), 1);
        assert_eq!(view.graph.nodes.len(), nodes_before);
    }

    #[test]
    fn malformed_state_text_changes_nothing() {
        let (mut view, _transport) = loaded();
        let status = view.status.clone();
        view.handle_stream_event(state_text(json!("not an object")), 1.0);
        assert_eq!(view.status, status);
        assert_eq!(view.graph.nodes.len(), 4);
    }

    #[test]
    fn selecting_switches_between_hub_and_device_feeds() {
        let (mut view, transport) = loaded();

        view.set_selected(Some("H1".to_owned()));
        assert!(view.streams.hub_feed().is_some());
        assert!(view.streams.device_feed().is_none());

        view.set_selected(Some("D2".to_owned()));
        assert!(view.streams.hub_feed().is_none());
        let device = view.streams.device_feed().expect("device feed open");
        assert_eq!(device.key().subject(), Some("D2"));
        assert!(device.feed.streaming());

        view.set_selected(None);
        assert!(view.streams.hub_feed().is_none());
        assert!(view.streams.device_feed().is_none());

        let urls = transport
            .opens()
            .into_iter()
            .map(|(_, _, url)| url)
            .collect::<Vec<_>>();
        assert_eq!(
            urls,
            vec![
                "ws://localhost:8000/updates".to_owned(),
                "ws://localhost:8000/hubs/H1/packets".to_owned(),
                "ws://localhost:8000/devices/D2/events".to_owned(),
            ]
        );
    }

    #[test]
    fn silent_updates_keep_or_drop_the_selection() {
        let (mut view, _transport) = loaded();
        view.set_selected(Some("D1".to_owned()));

        view.handle_stream_event(
            state_text(json!({
                "event": "state.update",
                "reason": "hub.deleted",
                "hubs": [{"id": "H1", "connectedDevices": ["D1"]}],
                "devices": [{"id": "D1", "hubUuid": "H1"}]
            })),
            1.0,
        );
        assert_eq!(view.selected.as_deref(), Some("D1"));
        assert!(view.streams.device_feed().is_some());

        view.handle_stream_event(
            state_text(json!({
                "event": "state.update",
                "reason": "device.deleted",
                "hubs": [{"id": "H1"}],
                "devices": []
            })),
            2.0,
        );
        assert_eq!(view.selected, None);
        assert!(view.streams.device_feed().is_none());
    }

    #[test]
    fn silent_updates_leave_a_failed_feed_backing_off() {
        let (mut view, transport) = loaded();
        let key = StreamKey::HubPackets("H1".to_owned());
        view.set_selected(Some("H1".to_owned()));
        view.handle_stream_event(
            StreamEvent {
                key: key.clone(),
                signal: StreamSignal::Socket {
                    generation: 1,
                    event: SocketEvent::Failed("refused".to_owned()),
                },
            },
            1.0,
        );

        view.apply_snapshot(&snapshot(), true, None, 2.0);

        let hub_opens = transport
            .opens()
            .into_iter()
            .filter(|(opened, _, _)| *opened == key)
            .count();
        assert_eq!(hub_opens, 1);
        let entry = view.streams.hub_feed().expect("hub feed kept");
        assert!(entry.has_pending_reconnect());
        assert_eq!(entry.status(), ConnectionStatus::Error);
    }

    #[test]
    fn snapshots_override_the_device_feed_indicator() {
        let (mut view, _transport) = loaded();
        view.set_selected(Some("D2".to_owned()));
        assert!(view.graph.node("D2").is_some_and(|node| node.streaming));

        view.handle_stream_event(
            state_text(json!({
                "event": "state.update",
                "reason": "device.streaming",
                "hubs": [{"id": "H2", "connectedDevices": ["D2"]}],
                "devices": [{"id": "D2", "hubUuid": "H2", "isStreaming": false}]
            })),
            3.0,
        );

        assert!(!view.streams.device_feed().expect("device feed open").feed.streaming());
        let node = view.graph.node("D2").expect("device kept");
        assert!(!node.streaming);
        assert_eq!(node.streaming_since, None);
    }

    #[test]
    fn device_events_drive_the_node_indicator() {
        let (mut view, _transport) = loaded();
        view.set_selected(Some("D1".to_owned()));

        view.handle_stream_event(
            StreamEvent {
                key: StreamKey::DeviceEvents("D1".to_owned()),
                signal: StreamSignal::Socket {
                    generation: 1,
                    event: SocketEvent::Text(
                        json!({"type": "assistant.delta", "responseId": "r1", "delta": {"content": "hi"}})
                            .to_string(),
                    ),
                },
            },
            4.0,
        );

        let node = view.graph.node("D1").expect("device present");
        assert!(node.streaming);
        assert_eq!(node.streaming_since, Some(4.0));
    }

    #[test]
    fn notices_respect_busy_status() {
        let (mut view, _transport) = loaded();
        view.handle_state_notice(&Notice::Interrupted);
        assert_eq!(view.status.text, "Live updates interrupted, reconnecting...");

        view.begin_refresh();
        view.handle_state_notice(&Notice::Reconnected);
        assert_eq!(view.status.kind, StatusKind::Loading);
        assert_eq!(view.status.text, "Loading...");
    }

    #[test]
    fn refresh_resets_the_state_stream() {
        let (mut view, transport) = loaded();
        view.handle_stream_event(
            StreamEvent {
                key: StreamKey::State,
                signal: StreamSignal::Socket {
                    generation: 1,
                    event: SocketEvent::Opened,
                },
            },
            0.5,
        );
        assert_eq!(view.streams.state_status(), ConnectionStatus::Open);

        view.set_selected(Some("H1".to_owned()));
        view.begin_refresh();
        assert_eq!(view.selected, None);

        view.finish_refresh(false, Ok(snapshot()), 1.0);
        assert!(!view.refreshing);
        assert_eq!(view.streams.state_status(), ConnectionStatus::Connecting);
        let state_opens = transport
            .opens()
            .into_iter()
            .filter(|(key, _, _)| *key == StreamKey::State)
            .count();
        assert_eq!(state_opens, 2);
    }

    #[test]
    fn failed_refresh_reports_an_error() {
        let (mut view, _transport) = loaded();
        view.begin_refresh();
        view.finish_refresh(false, Err("connection refused".to_owned()), 1.0);
        assert_eq!(view.status.kind, StatusKind::Error);
        assert_eq!(view.status.text, "Fetch failed: connection refused");
        assert_eq!(view.graph.nodes.len(), 4);
    }

    #[test]
    fn disabled_live_updates_open_nothing() {
        let transport = RecordingTransport::default();
        let streams = StreamManager::new(
            Box::new(transport.clone()),
            Endpoint::parse("http://localhost:8000").ok(),
            Backoff::default(),
        );
        let mut view = LiveView::new(streams, false, String::new(), StdRng::seed_from_u64(1));
        view.apply_snapshot(&snapshot(), false, None, 0.0);
        view.connect_state(false);
        view.set_selected(Some("H1".to_owned()));
        assert!(transport.opens().is_empty());
    }

    #[test]
    fn tick_moves_nodes_and_expires_pulses() {
        let (mut view, _transport) = loaded();
        view.handle_stream_event(
            state_text(json!({
                "event": "packet.transfer",
                "sourceUuid": "H1",
                "targetUuid": "H2",
                "packet": {"type": "ping"}
            })),
            0.0,
        );
        let before = view.graph.nodes.iter().map(|node| node.pos).collect::<Vec<_>>();

        view.tick(0.5);
        assert_eq!(view.overlay.len(), 1);
        let after = view.graph.nodes.iter().map(|node| node.pos).collect::<Vec<_>>();
        assert_ne!(before, after);

        view.tick(5.0);
        assert!(view.overlay.is_empty());
    }
}
