use std::collections::{HashMap, VecDeque};

use eframe::egui::Color32;

use crate::net::PacketTransfer;

use super::graph::{EdgeKey, Graph};
use super::render_utils::packet_color;

pub(in crate::app) const PACKET_DURATION_SECS: f64 = 1.2;
pub(in crate::app) const MAX_ANIMATIONS: usize = 300;

#[derive(Clone, Debug)]
pub(in crate::app) struct PacketAnimation {
    pub(in crate::app) source_id: String,
    pub(in crate::app) target_id: String,
    pub(in crate::app) edge_key: EdgeKey,
    pub(in crate::app) started_at: f64,
    pub(in crate::app) duration: f64,
    pub(in crate::app) packet_type: String,
    pub(in crate::app) color: Color32,
    pub(in crate::app) progress: f32,
}

/// Packets travelling along edges, plus the edge glow they cause.
pub(in crate::app) struct PacketOverlay {
    animations: VecDeque<PacketAnimation>,
    highlights: HashMap<EdgeKey, f32>,
    capacity: usize,
    duration: f64,
}

impl Default for PacketOverlay {
    fn default() -> Self {
        Self::new(MAX_ANIMATIONS, PACKET_DURATION_SECS)
    }
}

/// Peaks at the middle of the trip and fades out towards both ends.
pub(in crate::app) fn highlight_intensity(progress: f32) -> f32 {
    (1.0 - (progress - 0.5).abs() * 1.8).max(0.0)
}

impl PacketOverlay {
    pub(in crate::app) fn new(capacity: usize, duration: f64) -> Self {
        Self {
            animations: VecDeque::new(),
            highlights: HashMap::new(),
            capacity: capacity.max(1),
            duration,
        }
    }

    /// Starts a pulse when both endpoints are in the graph.
    pub(in crate::app) fn push(&mut self, transfer: &PacketTransfer, graph: &Graph, now: f64) -> bool {
        if graph.node(&transfer.source).is_none() || graph.node(&transfer.target).is_none() {
            return false;
        }

        let packet_type = transfer.packet.type_label();
        self.animations.push_back(PacketAnimation {
            source_id: transfer.source.clone(),
            target_id: transfer.target.clone(),
            edge_key: EdgeKey::new(&transfer.source, &transfer.target),
            started_at: now,
            duration: self.duration,
            color: packet_color(&packet_type),
            packet_type,
            progress: 0.0,
        });
        while self.animations.len() > self.capacity {
            self.animations.pop_front();
        }
        true
    }

    /// Recomputes progress, drops finished or orphaned pulses, and rebuilds the
    /// per-edge highlight map.
    pub(in crate::app) fn advance(&mut self, now: f64, graph: &Graph) {
        self.highlights.clear();
        let highlights = &mut self.highlights;

        self.animations.retain_mut(|animation| {
            if animation.duration <= 0.0
                || graph.node(&animation.source_id).is_none()
                || graph.node(&animation.target_id).is_none()
            {
                return false;
            }

            let progress = (now - animation.started_at).max(0.0) / animation.duration;
            if progress >= 1.0 {
                return false;
            }
            animation.progress = progress as f32;

            let intensity = highlight_intensity(animation.progress);
            let entry = highlights.entry(animation.edge_key.clone()).or_insert(intensity);
            *entry = entry.max(intensity);
            true
        });
    }

    pub(in crate::app) fn animations(&self) -> impl Iterator<Item = &PacketAnimation> {
        self.animations.iter()
    }

    pub(in crate::app) fn highlight(&self, key: &EdgeKey) -> f32 {
        self.highlights.get(key).copied().unwrap_or(0.0)
    }

    pub(in crate::app) fn is_empty(&self) -> bool {
        self.animations.is_empty()
    }

    pub(in crate::app) fn len(&self) -> usize {
        self.animations.len()
    }
}
