mod forces;

use eframe::egui::Vec2;

use super::PhysicsConfig;
use super::graph::Graph;
use forces::{accumulate_edge_avoidance, accumulate_repulsion, accumulate_springs};

/// Advances every node by one frame. Forces are read from the positions at the
/// start of the step, so the result depends only on node and edge order.
pub(super) fn step(graph: &mut Graph, bounds: Vec2, config: &PhysicsConfig) {
    let Graph {
        nodes,
        edges,
        scratch,
        ..
    } = graph;
    if nodes.is_empty() {
        return;
    }

    let impulses = &mut scratch.impulses;
    impulses.clear();
    impulses.resize(nodes.len(), Vec2::ZERO);

    accumulate_repulsion(nodes, config, impulses);
    accumulate_springs(nodes, edges, config, impulses);
    accumulate_edge_avoidance(nodes, edges, config, impulses);

    let center = bounds * 0.5;
    let max_velocity = config.max_velocity;
    for (node, impulse) in nodes.iter_mut().zip(impulses.iter()) {
        let mut vel = node.vel + *impulse + (center - node.pos) * config.centering;
        vel.x = vel.x.max(-max_velocity).min(max_velocity);
        vel.y = vel.y.max(-max_velocity).min(max_velocity);
        vel *= config.damping;
        if !vel.x.is_finite() || !vel.y.is_finite() {
            vel = Vec2::ZERO;
        }

        node.vel = vel;
        node.pos += vel;

        let margin = node.radius + config.bounds_padding;
        node.pos.x = node.pos.x.min(bounds.x - margin).max(margin);
        node.pos.y = node.pos.y.min(bounds.y - margin).max(margin);
    }
}
