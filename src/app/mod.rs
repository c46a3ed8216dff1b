use eframe::egui::{self, Context, Vec2, vec2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

use crate::config::Config;
use crate::net::{Backoff, NetEvent, Snapshot, StreamManager, TokioTransport, fetch_snapshot};

mod graph;
mod live;
mod overlay;
mod physics;
mod render_utils;
mod ui;

use graph::{Graph, ReconcileConfig};
use overlay::PacketOverlay;

const INITIAL_BOUNDS: Vec2 = vec2(1200.0, 800.0);

pub struct HubScopeApp {
    config: Config,
    runtime: Handle,
    client: reqwest::Client,
    events_tx: UnboundedSender<NetEvent>,
    events_rx: UnboundedReceiver<NetEvent>,
    state: AppState,
}

enum AppState {
    Loading,
    Ready(Box<LiveView>),
    Error(String),
}

/// Everything the render loop mutates: the graph, its overlay, the streams
/// feeding it and the viewer state around them.
struct LiveView {
    graph: Graph,
    overlay: PacketOverlay,
    streams: StreamManager,
    live_updates: bool,
    selected: Option<String>,
    status: StatusLine,
    refreshing: bool,
    pan: Vec2,
    zoom: f32,
    bounds: Vec2,
    rng: StdRng,
    reconcile: ReconcileConfig,
    physics: PhysicsConfig,
    live_physics: bool,
    endpoint_label: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StatusKind {
    Idle,
    Loading,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct StatusLine {
    text: String,
    kind: StatusKind,
}

impl StatusLine {
    fn set(&mut self, text: impl Into<String>, kind: StatusKind) {
        self.text = text.into();
        self.kind = kind;
    }

    /// Background notices never overwrite a loading or error message.
    fn set_if_not_busy(&mut self, text: impl Into<String>) {
        if self.kind == StatusKind::Idle {
            self.text = text.into();
        }
    }
}

impl Default for StatusLine {
    fn default() -> Self {
        Self {
            text: "Idle".to_owned(),
            kind: StatusKind::Idle,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct PhysicsConfig {
    repulsion: f32,
    repulsion_epsilon: f32,
    centering: f32,
    max_velocity: f32,
    damping: f32,
    edge_target_factor: f32,
    edge_min_gap: f32,
    edge_attraction: f32,
    edge_settle: f32,
    edge_compression: f32,
    device_attraction_boost: f32,
    avoidance_radius: f32,
    avoidance_strength: f32,
    avoidance_reaction: f32,
    avoidance_max_adjustment: f32,
    bounds_padding: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            repulsion: 2400.0,
            repulsion_epsilon: 0.01,
            centering: 0.008,
            max_velocity: 4.5,
            damping: 0.9,
            edge_target_factor: 0.6,
            edge_min_gap: 28.0,
            edge_attraction: 1.8,
            edge_settle: 0.7,
            edge_compression: 2.4,
            device_attraction_boost: 1.25,
            avoidance_radius: 32.0,
            avoidance_strength: 0.22,
            avoidance_reaction: 0.45,
            avoidance_max_adjustment: 1.4,
            bounds_padding: 12.0,
        }
    }
}

impl HubScopeApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: Config, runtime: Handle) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let app = Self {
            config,
            runtime,
            client: reqwest::Client::new(),
            events_tx,
            events_rx,
            state: AppState::Loading,
        };
        app.spawn_fetch(false);
        app
    }

    fn spawn_fetch(&self, silent: bool) {
        let client = self.client.clone();
        let endpoint = self.config.endpoint.clone();
        let events = self.events_tx.clone();

        self.runtime.spawn(async move {
            let result = fetch_snapshot(&client, &endpoint)
                .await
                .map_err(|error| format!("{error:#}"));
            if let Err(error) = &result {
                warn!(%error, "snapshot fetch failed");
            }
            let _ = events.send(NetEvent::SnapshotLoaded { silent, result });
        });
    }

    fn new_live_view(&self) -> LiveView {
        let transport = TokioTransport::new(self.runtime.clone(), self.events_tx.clone());
        let streams = StreamManager::new(
            Box::new(transport),
            Some(self.config.endpoint.clone()),
            Backoff::default(),
        );
        LiveView::new(
            streams,
            self.config.live_updates,
            self.config.endpoint.to_string(),
            StdRng::from_os_rng(),
        )
    }

    fn drain_events(&mut self, now: f64) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                NetEvent::SnapshotLoaded { silent, result } => {
                    self.on_snapshot_loaded(silent, result, now);
                }
                NetEvent::Stream(event) => {
                    if let AppState::Ready(view) = &mut self.state {
                        view.handle_stream_event(event, now);
                    }
                }
            }
        }
    }

    fn on_snapshot_loaded(&mut self, silent: bool, result: Result<Snapshot, String>, now: f64) {
        if let AppState::Ready(view) = &mut self.state {
            view.finish_refresh(silent, result, now);
            return;
        }

        self.state = match result {
            Ok(snapshot) => {
                let mut view = self.new_live_view();
                view.apply_snapshot(&snapshot, false, None, now);
                view.connect_state(false);
                info!(
                    hubs = snapshot.hubs.len(),
                    devices = snapshot.devices.len(),
                    "initial snapshot loaded"
                );
                AppState::Ready(Box::new(view))
            }
            Err(error) => AppState::Error(error),
        };
    }
}

impl eframe::App for HubScopeApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        let now = ctx.input(|input| input.time);
        self.drain_events(now);

        let mut fetch_requested = false;
        let mut transition = None;
        match &mut self.state {
            AppState::Loading => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(120.0);
                        ui.heading("Loading hub network...");
                        ui.add_space(8.0);
                        ui.label(self.config.endpoint.to_string());
                        ui.add_space(8.0);
                        ui.spinner();
                    });
                });
            }
            AppState::Error(error) => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.heading("Failed to load the hub network");
                    ui.add_space(6.0);
                    ui.label(error.as_str());
                    ui.add_space(10.0);
                    if ui.button("Retry").clicked() {
                        fetch_requested = true;
                    }
                });
                if fetch_requested {
                    transition = Some(AppState::Loading);
                }
            }
            AppState::Ready(view) => {
                fetch_requested = view.show(ctx, now);
            }
        }

        if let Some(next_state) = transition {
            self.state = next_state;
        }
        if fetch_requested {
            self.spawn_fetch(false);
        }
        ctx.request_repaint();
    }
}
