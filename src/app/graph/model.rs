use std::collections::HashMap;

use eframe::egui::Vec2;

use crate::net::{DeviceSnapshot, HubSnapshot};
use crate::util::short_id;

pub(in crate::app) const HUB_MASS: f32 = 2.8;
pub(in crate::app) const DEVICE_MASS: f32 = 1.4;
pub(in crate::app) const HUB_RADIUS: f32 = 20.0;
pub(in crate::app) const EMPTY_HUB_RADIUS: f32 = 16.0;
pub(in crate::app) const DEVICE_RADIUS: f32 = 12.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(in crate::app) enum NodeKind {
    Hub,
    Device,
}

impl NodeKind {
    pub(in crate::app) fn label(self) -> &'static str {
        match self {
            Self::Hub => "Hub",
            Self::Device => "Device",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(in crate::app) enum NodeInfo {
    Hub(HubSnapshot),
    Device(DeviceSnapshot),
}

#[derive(Clone, Debug)]
pub(in crate::app) struct Node {
    pub(in crate::app) id: String,
    pub(in crate::app) kind: NodeKind,
    pub(in crate::app) pos: Vec2,
    pub(in crate::app) vel: Vec2,
    pub(in crate::app) radius: f32,
    pub(in crate::app) mass: f32,
    pub(in crate::app) label: String,
    pub(in crate::app) info: NodeInfo,
    pub(in crate::app) streaming: bool,
    /// Render-clock seconds at which the current streaming run started.
    pub(in crate::app) streaming_since: Option<f64>,
    pub(in crate::app) empty_hub: bool,
}

impl Node {
    pub(in crate::app) fn hub(snapshot: HubSnapshot, pos: Vec2) -> Self {
        let empty_hub = snapshot.connected_devices.is_empty();
        Self {
            id: snapshot.id.clone(),
            kind: NodeKind::Hub,
            pos,
            vel: Vec2::ZERO,
            radius: hub_radius(empty_hub),
            mass: HUB_MASS,
            label: display_label(&snapshot.id, snapshot.name.as_deref()),
            info: NodeInfo::Hub(snapshot),
            streaming: false,
            streaming_since: None,
            empty_hub,
        }
    }

    pub(in crate::app) fn device(snapshot: DeviceSnapshot, pos: Vec2, now: f64) -> Self {
        let streaming = snapshot.streaming;
        Self {
            id: snapshot.id.clone(),
            kind: NodeKind::Device,
            pos,
            vel: Vec2::ZERO,
            radius: DEVICE_RADIUS,
            mass: DEVICE_MASS,
            label: display_label(&snapshot.id, snapshot.name.as_deref()),
            info: NodeInfo::Device(snapshot),
            streaming,
            streaming_since: streaming.then_some(now),
            empty_hub: false,
        }
    }

    /// The hub a device is assigned to.
    pub(in crate::app) fn assigned_hub(&self) -> Option<&str> {
        match &self.info {
            NodeInfo::Device(device) => device.hub_id.as_deref(),
            NodeInfo::Hub(_) => None,
        }
    }

    pub(in crate::app) fn set_streaming(&mut self, streaming: bool, now: f64) {
        if self.streaming != streaming {
            self.streaming = streaming;
            self.streaming_since = streaming.then_some(now);
        } else if streaming && self.streaming_since.is_none() {
            self.streaming_since = Some(now);
        }
    }
}

pub(in crate::app) fn hub_radius(empty: bool) -> f32 {
    if empty { EMPTY_HUB_RADIUS } else { HUB_RADIUS }
}

pub(in crate::app) fn display_label(id: &str, name: Option<&str>) -> String {
    match name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => name.to_owned(),
        None => short_id(id).to_owned(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(in crate::app) enum EdgeKind {
    Hub,
    Device,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(in crate::app) struct Edge {
    pub(in crate::app) source: usize,
    pub(in crate::app) target: usize,
    pub(in crate::app) kind: EdgeKind,
    pub(in crate::app) length: f32,
    pub(in crate::app) spring: f32,
}

/// Undirected pair of node ids, smaller id first.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(in crate::app) struct EdgeKey(String, String);

impl EdgeKey {
    pub(in crate::app) fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self(a.to_owned(), b.to_owned())
        } else {
            Self(b.to_owned(), a.to_owned())
        }
    }

    pub(in crate::app) fn ends(&self) -> (&str, &str) {
        (&self.0, &self.1)
    }
}

#[derive(Default)]
pub(in crate::app) struct PhysicsScratch {
    pub(in crate::app) impulses: Vec<Vec2>,
}

/// Nodes, derived edges, and the id index, mutated in place across snapshots.
#[derive(Default)]
pub(in crate::app) struct Graph {
    pub(in crate::app) nodes: Vec<Node>,
    pub(in crate::app) edges: Vec<Edge>,
    pub(in crate::app) index_by_id: HashMap<String, usize>,
    pub(in crate::app) scratch: PhysicsScratch,
}

impl Graph {
    pub(in crate::app) fn index_of(&self, id: &str) -> Option<usize> {
        self.index_by_id.get(id).copied()
    }

    pub(in crate::app) fn node(&self, id: &str) -> Option<&Node> {
        self.index_of(id).and_then(|index| self.nodes.get(index))
    }

    pub(in crate::app) fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        let index = self.index_of(id)?;
        self.nodes.get_mut(index)
    }

    pub(in crate::app) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(in crate::app) fn edge_key(&self, edge: &Edge) -> Option<EdgeKey> {
        let source = self.nodes.get(edge.source)?;
        let target = self.nodes.get(edge.target)?;
        Some(EdgeKey::new(&source.id, &target.id))
    }

    /// Returns `false` when `id` is not a device in this graph.
    pub(in crate::app) fn set_device_streaming(&mut self, id: &str, streaming: bool, now: f64) -> bool {
        match self.node_mut(id) {
            Some(node) if node.kind == NodeKind::Device => {
                node.set_streaming(streaming, now);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_keys_ignore_direction() {
        assert_eq!(EdgeKey::new("H2", "H1"), EdgeKey::new("H1", "H2"));
        assert_eq!(EdgeKey::new("H2", "H1").ends(), ("H1", "H2"));
    }

    #[test]
    fn streaming_since_tracks_transitions() {
        let device = DeviceSnapshot {
            id: "D1".to_owned(),
            ..DeviceSnapshot::default()
        };
        let mut node = Node::device(device, Vec2::ZERO, 1.0);
        assert_eq!(node.streaming_since, None);

        node.set_streaming(true, 2.0);
        node.set_streaming(true, 3.0);
        assert_eq!(node.streaming_since, Some(2.0));

        node.set_streaming(false, 4.0);
        assert_eq!(node.streaming_since, None);
    }

    #[test]
    fn labels_fall_back_to_short_ids() {
        assert_eq!(display_label("abcdef0123456789", Some("  ")), "abcdef01");
        assert_eq!(display_label("abcdef0123456789", Some("Lobby")), "Lobby");
    }
}
