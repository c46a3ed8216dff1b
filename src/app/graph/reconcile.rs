use std::collections::{HashMap, HashSet};
use std::f32::consts::TAU;

use eframe::egui::{Vec2, vec2};
use rand::Rng;
use tracing::{debug, warn};

use crate::net::{DeviceSnapshot, HubSnapshot, Snapshot};

use super::model::{
    DEVICE_MASS, DEVICE_RADIUS, Edge, EdgeKey, EdgeKind, Graph, HUB_MASS, Node, NodeInfo,
    NodeKind, display_label, hub_radius,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub(in crate::app) struct ReconcileConfig {
    pub(in crate::app) hub_edge_length: f32,
    pub(in crate::app) device_edge_length: f32,
    pub(in crate::app) spring: f32,
    /// Spring multiplier for device edges listed by a hub.
    pub(in crate::app) listed_device_spring: f32,
    /// Spring multiplier for device edges implied by a device's own hub.
    pub(in crate::app) assigned_device_spring: f32,
    pub(in crate::app) reposition_distance: f32,
    pub(in crate::app) hub_jitter: f32,
    pub(in crate::app) fallback_radius: f32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            hub_edge_length: 240.0,
            device_edge_length: 170.0,
            spring: 0.005,
            listed_device_spring: 1.3,
            assigned_device_spring: 1.2,
            reposition_distance: 100.0,
            hub_jitter: 40.0,
            fallback_radius: 200.0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(in crate::app) struct ReconcileContext {
    pub(in crate::app) bounds: Vec2,
    pub(in crate::app) now: f64,
    pub(in crate::app) config: ReconcileConfig,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(in crate::app) struct ReconcileSummary {
    pub(in crate::app) created: usize,
    pub(in crate::app) reused: usize,
    pub(in crate::app) repositioned: usize,
    pub(in crate::app) dropped: usize,
    pub(in crate::app) duplicates: usize,
    pub(in crate::app) edges: usize,
}

/// Merges `snapshot` into `graph`, reusing nodes by id so their position and
/// velocity survive. Nodes and edges are refilled in place.
pub(in crate::app) fn reconcile<R: Rng + ?Sized>(
    graph: &mut Graph,
    snapshot: &Snapshot,
    ctx: &ReconcileContext,
    rng: &mut R,
) -> ReconcileSummary {
    let config = &ctx.config;
    let center = ctx.bounds * 0.5;
    let short_side = ctx.bounds.x.min(ctx.bounds.y);
    let seed_radius = if short_side.is_finite() && short_side > 0.0 {
        short_side / 3.0
    } else {
        config.fallback_radius
    };

    let mut prior = graph
        .nodes
        .drain(..)
        .map(|node| (node.id.clone(), node))
        .collect::<HashMap<_, _>>();
    graph.index_by_id.clear();
    graph.edges.clear();

    let mut summary = ReconcileSummary::default();
    let hub_count = snapshot.hubs.len().max(1) as f32;

    for (index, hub) in snapshot.hubs.iter().enumerate() {
        if graph.index_by_id.contains_key(&hub.id) {
            warn!(id = %hub.id, "duplicate hub id in snapshot, keeping the first");
            summary.duplicates += 1;
            continue;
        }

        let node = match prior.remove(&hub.id) {
            Some(mut node) => {
                summary.reused += 1;
                refresh_hub(&mut node, hub);
                node
            }
            None => {
                summary.created += 1;
                let angle = index as f32 / hub_count * TAU;
                let jitter = vec2(
                    rng.random_range(-config.hub_jitter..=config.hub_jitter),
                    rng.random_range(-config.hub_jitter..=config.hub_jitter),
                );
                let pos = center + vec2(angle.cos(), angle.sin()) * seed_radius + jitter;
                Node::hub(hub.clone(), pos)
            }
        };
        insert_node(graph, node);
    }

    for device in &snapshot.devices {
        if graph.index_by_id.contains_key(&device.id) {
            warn!(id = %device.id, "duplicate device id in snapshot, keeping the first");
            summary.duplicates += 1;
            continue;
        }

        let node = match prior.remove(&device.id) {
            Some(mut node) => {
                summary.reused += 1;
                if node.assigned_hub() != device.hub_id.as_deref() {
                    node.pos = reposition(graph, device, center, seed_radius, config, rng);
                    node.vel = Vec2::ZERO;
                    summary.repositioned += 1;
                }
                refresh_device(&mut node, device, ctx.now);
                node
            }
            None => {
                summary.created += 1;
                let spread = seed_radius * 0.75;
                let offset = vec2(
                    rng.random_range(-spread..=spread),
                    rng.random_range(-spread..=spread),
                );
                Node::device(device.clone(), center + offset, ctx.now)
            }
        };
        insert_node(graph, node);
    }

    summary.dropped = prior.len();
    rebuild_edges(graph, config);
    summary.edges = graph.edges.len();

    debug!(
        created = summary.created,
        reused = summary.reused,
        repositioned = summary.repositioned,
        dropped = summary.dropped,
        edges = summary.edges,
        "graph reconciled"
    );
    summary
}

fn insert_node(graph: &mut Graph, node: Node) {
    graph.index_by_id.insert(node.id.clone(), graph.nodes.len());
    graph.nodes.push(node);
}

fn refresh_hub(node: &mut Node, hub: &HubSnapshot) {
    let empty = hub.connected_devices.is_empty();
    node.kind = NodeKind::Hub;
    node.mass = HUB_MASS;
    node.radius = hub_radius(empty);
    node.empty_hub = empty;
    node.label = display_label(&hub.id, hub.name.as_deref());
    node.streaming = false;
    node.streaming_since = None;
    node.info = NodeInfo::Hub(hub.clone());
}

fn refresh_device(node: &mut Node, device: &DeviceSnapshot, now: f64) {
    if node.kind != NodeKind::Device {
        node.streaming = false;
        node.streaming_since = None;
    }
    node.kind = NodeKind::Device;
    node.mass = DEVICE_MASS;
    node.radius = DEVICE_RADIUS;
    node.empty_hub = false;
    node.label = display_label(&device.id, device.name.as_deref());
    node.set_streaming(device.streaming, now);
    node.info = NodeInfo::Device(device.clone());
}

fn reposition<R: Rng + ?Sized>(
    graph: &Graph,
    device: &DeviceSnapshot,
    center: Vec2,
    seed_radius: f32,
    config: &ReconcileConfig,
    rng: &mut R,
) -> Vec2 {
    let hub = device
        .hub_id
        .as_deref()
        .and_then(|hub_id| graph.node(hub_id))
        .filter(|node| node.kind == NodeKind::Hub);

    match hub {
        Some(hub) => {
            let angle = rng.random_range(0.0..TAU);
            let distance = config.reposition_distance * rng.random_range(0.6..1.2);
            hub.pos + vec2(angle.cos(), angle.sin()) * distance
        }
        None => {
            let spread = seed_radius * 0.5;
            center
                + vec2(
                    rng.random_range(-spread..=spread),
                    rng.random_range(-spread..=spread),
                )
        }
    }
}

fn rebuild_edges(graph: &mut Graph, config: &ReconcileConfig) {
    let Graph {
        nodes,
        edges,
        index_by_id,
        ..
    } = graph;

    let mut seen = HashSet::new();
    let mut link = |source: usize, target: usize, kind: EdgeKind, spring: f32| {
        if source == target {
            return;
        }
        if !seen.insert(EdgeKey::new(&nodes[source].id, &nodes[target].id)) {
            return;
        }
        let length = match kind {
            EdgeKind::Hub => config.hub_edge_length,
            EdgeKind::Device => config.device_edge_length,
        };
        edges.push(Edge {
            source,
            target,
            kind,
            length,
            spring,
        });
    };
    let lookup = |id: &str, kind: NodeKind| {
        index_by_id
            .get(id)
            .copied()
            .filter(|&index| nodes[index].kind == kind)
    };

    for (source, node) in nodes.iter().enumerate() {
        let NodeInfo::Hub(hub) = &node.info else {
            continue;
        };
        for peer in &hub.connected_hubs {
            if let Some(target) = lookup(peer, NodeKind::Hub) {
                link(source, target, EdgeKind::Hub, config.spring);
            }
        }
        for device in &hub.connected_devices {
            if let Some(target) = lookup(device, NodeKind::Device) {
                link(
                    source,
                    target,
                    EdgeKind::Device,
                    config.spring * config.listed_device_spring,
                );
            }
        }
    }

    for (target, node) in nodes.iter().enumerate() {
        if let Some(source) = node
            .assigned_hub()
            .and_then(|hub_id| lookup(hub_id, NodeKind::Hub))
        {
            link(
                source,
                target,
                EdgeKind::Device,
                config.spring * config.assigned_device_spring,
            );
        }
    }
}
