use eframe::egui::Vec2;

use super::super::PhysicsConfig;
use super::super::graph::{Edge, EdgeKind, Node};

pub(super) fn accumulate_repulsion(nodes: &[Node], config: &PhysicsConfig, impulses: &mut [Vec2]) {
    for a in 0..nodes.len() {
        for b in (a + 1)..nodes.len() {
            let delta = nodes[b].pos - nodes[a].pos;
            let distance_sq = delta.length_sq() + config.repulsion_epsilon;
            let distance = distance_sq.sqrt();
            let force = delta * (config.repulsion / distance_sq / distance);

            impulses[a] -= force / nodes[a].mass;
            impulses[b] += force / nodes[b].mass;
        }
    }
}

pub(super) fn accumulate_springs(
    nodes: &[Node],
    edges: &[Edge],
    config: &PhysicsConfig,
    impulses: &mut [Vec2],
) {
    for edge in edges {
        let (source, target) = (edge.source, edge.target);
        if source >= nodes.len() || target >= nodes.len() || source == target {
            continue;
        }

        let delta = nodes[target].pos - nodes[source].pos;
        let mut distance = delta.length();
        if distance <= 0.0 {
            distance = 0.001;
        }

        let min_distance = nodes[source].radius + nodes[target].radius + config.edge_min_gap;
        let preferred = min_distance.max(edge.length * config.edge_target_factor);

        let mut difference = distance - preferred;
        let mut multiplier = if difference > 0.0 {
            config.edge_attraction
        } else {
            config.edge_settle
        };
        if edge.kind == EdgeKind::Device && difference > 0.0 {
            multiplier *= config.device_attraction_boost;
        }
        if distance < min_distance {
            difference = distance - min_distance;
            multiplier = config.edge_compression;
        }

        let force = delta / distance * (edge.spring * difference * multiplier);
        impulses[source] += force / nodes[source].mass;
        impulses[target] -= force / nodes[target].mass;
    }
}

/// Pushes nodes off edges they sit on, with part of the push returned to the
/// edge's endpoints.
pub(super) fn accumulate_edge_avoidance(
    nodes: &[Node],
    edges: &[Edge],
    config: &PhysicsConfig,
    impulses: &mut [Vec2],
) {
    for edge in edges {
        let (source, target) = (edge.source, edge.target);
        if source >= nodes.len() || target >= nodes.len() {
            continue;
        }

        let start = nodes[source].pos;
        let segment = nodes[target].pos - start;
        let segment_length_sq = segment.length_sq();
        if segment_length_sq < 0.0001 {
            continue;
        }

        for (index, node) in nodes.iter().enumerate() {
            if index == source || index == target {
                continue;
            }

            let t = (node.pos - start).dot(segment) / segment_length_sq;
            if t <= 0.0 || t >= 1.0 {
                continue;
            }

            let offset = node.pos - (start + segment * t);
            let distance_sq = offset.length_sq();
            if distance_sq <= 0.0 {
                continue;
            }

            let distance = distance_sq.sqrt();
            let clearance = node.radius + config.avoidance_radius;
            if distance >= clearance {
                continue;
            }

            let adjustment =
                ((clearance - distance) * config.avoidance_strength).min(config.avoidance_max_adjustment);
            if !adjustment.is_finite() || adjustment <= 0.0 {
                continue;
            }

            let push = offset / distance * adjustment;
            impulses[index] += push / node.mass;

            let reaction = push * config.avoidance_reaction;
            impulses[source] -= reaction / nodes[source].mass;
            impulses[target] -= reaction / nodes[target].mass;
        }
    }
}
