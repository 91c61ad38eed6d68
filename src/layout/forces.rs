use eframe::egui::{Vec2, vec2};

use super::quadtree::QuadNode;
use super::{SimLink, SimNode};
use crate::config::LayoutConfig;

const EPSILON: f32 = 0.0001;

pub(super) struct ForceContext<'a> {
    pub(super) nodes: &'a [SimNode],
    pub(super) links: &'a [SimLink],
    pub(super) config: &'a LayoutConfig,
    pub(super) alpha: f32,
}

pub(super) type Force = fn(&ForceContext<'_>, &mut [Vec2]);

/// Forces in application order; each adds velocity deltas into the buffer.
pub(super) const FORCES: [Force; 6] = [
    link_attraction,
    charge_repulsion,
    collision,
    main_buffer,
    pendulum_maintenance,
    arrow_clearance,
];

fn fallback_direction(from: usize, to: usize) -> Vec2 {
    let angle = ((from as f32) * 0.618_034 + (to as f32) * 0.414_214) * std::f32::consts::TAU;
    vec2(angle.cos(), angle.sin())
}

pub(super) fn link_attraction(ctx: &ForceContext<'_>, deltas: &mut [Vec2]) {
    let node_count = ctx.nodes.len();
    let mut degree = vec![0usize; node_count];
    for link in ctx.links {
        if link.source < node_count && link.target < node_count {
            degree[link.source] += 1;
            degree[link.target] += 1;
        }
    }

    for link in ctx.links {
        let (from, to) = (link.source, link.target);
        if from >= node_count || to >= node_count || from == to {
            continue;
        }

        let source = &ctx.nodes[from];
        let target = &ctx.nodes[to];
        let delta = (target.position + target.velocity) - (source.position + source.velocity);
        let distance = delta.length();
        if distance <= EPSILON {
            continue;
        }

        let (preferred, strength) = if link.between_mains {
            (ctx.config.main_link_distance, ctx.config.main_link_strength)
        } else {
            let (main, counterparty) = if source.is_main {
                (source, target)
            } else {
                (target, source)
            };
            (
                ctx.config
                    .pendulum_distance(main.radius, counterparty.radius),
                ctx.config.counterparty_link_strength,
            )
        };

        let strength = strength / degree[from].min(degree[to]).max(1) as f32;
        let correction = delta * ((distance - preferred) / distance * strength * ctx.alpha);
        let bias = degree[from] as f32 / (degree[from] + degree[to]) as f32;

        deltas[to] -= correction * bias;
        deltas[from] += correction * (1.0 - bias);
    }
}

fn repulsion_between(point: Vec2, other: Vec2, charge: f32, softening: f32) -> Vec2 {
    let delta = point - other;
    let distance_sq = delta.length_sq();
    if distance_sq <= EPSILON * EPSILON {
        return Vec2::ZERO;
    }
    (delta / distance_sq.sqrt()) * (charge / (distance_sq + softening))
}

fn accumulate_repulsion_for_node(
    tree: &QuadNode,
    index: usize,
    positions: &[Vec2],
    charges: &[f32],
    softening: f32,
    theta: f32,
    force: &mut Vec2,
) {
    if tree.charge <= 0.0 {
        return;
    }

    let point = positions[index];

    if tree.is_leaf() {
        for &other in &tree.indices {
            if other == index {
                continue;
            }
            *force += repulsion_between(point, positions[other], charges[other], softening);
        }
        return;
    }

    let delta = point - tree.center_of_charge;
    let distance_sq = delta.length_sq().max(EPSILON);
    let distance = distance_sq.sqrt();
    let can_approximate = !tree.bounds.contains(point)
        && (tree.bounds.side_length() / distance) < theta
        && tree.count > 1;

    if can_approximate {
        *force += (delta / distance) * (tree.charge / (distance_sq + softening));
        return;
    }

    for child in tree.children.iter().flatten() {
        accumulate_repulsion_for_node(child, index, positions, charges, softening, theta, force);
    }
}

pub(super) fn charge_repulsion(ctx: &ForceContext<'_>, deltas: &mut [Vec2]) {
    if ctx.nodes.len() < 2 {
        return;
    }

    let positions = ctx.nodes.iter().map(|node| node.position).collect::<Vec<_>>();
    let charges = ctx
        .nodes
        .iter()
        .map(|node| {
            if node.is_main {
                ctx.config.main_charge
            } else {
                ctx.config.counterparty_charge
            }
        })
        .collect::<Vec<_>>();

    let Some(tree) = QuadNode::build(&positions, &charges) else {
        return;
    };

    for (index, delta) in deltas.iter_mut().enumerate() {
        let mut force = Vec2::ZERO;
        accumulate_repulsion_for_node(
            &tree,
            index,
            &positions,
            &charges,
            ctx.config.charge_softening,
            ctx.config.barnes_hut_theta,
            &mut force,
        );
        *delta += force * ctx.alpha;
    }
}

#[derive(Clone, Copy)]
struct CollisionParams {
    strength: f32,
    max_distance_sq: f32,
}

fn push_apart(
    from: usize,
    to: usize,
    positions: &[Vec2],
    radii: &[f32],
    params: CollisionParams,
    deltas: &mut [Vec2],
) {
    let delta = positions[from] - positions[to];
    let distance = delta.length();
    let min_distance = radii[from] + radii[to];
    if distance >= min_distance {
        return;
    }

    let direction = if distance > EPSILON {
        delta / distance
    } else {
        fallback_direction(from, to)
    };
    let push = (min_distance - distance) * params.strength * 0.5;
    deltas[from] += direction * push;
    deltas[to] -= direction * push;
}

fn accumulate_collision_pairs(
    node_a: &QuadNode,
    node_b: &QuadNode,
    same_node: bool,
    positions: &[Vec2],
    radii: &[f32],
    params: CollisionParams,
    deltas: &mut [Vec2],
) {
    if node_a.bounds.distance_sq_to(node_b.bounds) > params.max_distance_sq {
        return;
    }

    if node_a.is_leaf() && node_b.is_leaf() {
        if same_node {
            for (offset, &from) in node_a.indices.iter().enumerate() {
                for &to in &node_a.indices[offset + 1..] {
                    push_apart(from, to, positions, radii, params, deltas);
                }
            }
        } else {
            for &from in &node_a.indices {
                for &to in &node_b.indices {
                    push_apart(from, to, positions, radii, params, deltas);
                }
            }
        }
        return;
    }

    if same_node {
        for first in 0..4 {
            let Some(child_a) = node_a.children[first].as_ref() else {
                continue;
            };

            accumulate_collision_pairs(child_a, child_a, true, positions, radii, params, deltas);

            for second in (first + 1)..4 {
                let Some(child_b) = node_a.children[second].as_ref() else {
                    continue;
                };
                accumulate_collision_pairs(
                    child_a, child_b, false, positions, radii, params, deltas,
                );
            }
        }
        return;
    }

    let split_a = if node_a.is_leaf() {
        false
    } else if node_b.is_leaf() {
        true
    } else {
        node_a.bounds.half_extent >= node_b.bounds.half_extent
    };

    if split_a {
        for child in node_a.children.iter().flatten() {
            accumulate_collision_pairs(child, node_b, false, positions, radii, params, deltas);
        }
    } else {
        for child in node_b.children.iter().flatten() {
            accumulate_collision_pairs(node_a, child, false, positions, radii, params, deltas);
        }
    }
}

/// Keeps circles from overlapping. Not scaled by alpha.
pub(super) fn collision(ctx: &ForceContext<'_>, deltas: &mut [Vec2]) {
    if ctx.nodes.len() < 2 {
        return;
    }

    let positions = ctx.nodes.iter().map(|node| node.position).collect::<Vec<_>>();
    let radii = ctx
        .nodes
        .iter()
        .map(|node| {
            let padding = if node.is_main {
                ctx.config.main_collision_padding
            } else {
                ctx.config.collision_padding
            };
            node.radius + padding
        })
        .collect::<Vec<_>>();
    let max_reach = radii.iter().copied().fold(0.0_f32, f32::max) * 2.0;

    let Some(tree) = QuadNode::build(&positions, &vec![1.0; positions.len()]) else {
        return;
    };

    accumulate_collision_pairs(
        &tree,
        &tree,
        true,
        &positions,
        &radii,
        CollisionParams {
            strength: ctx.config.collision_strength,
            max_distance_sq: max_reach * max_reach,
        },
        deltas,
    );
}

pub(super) fn main_buffer(ctx: &ForceContext<'_>, deltas: &mut [Vec2]) {
    for (main_index, main) in ctx.nodes.iter().enumerate() {
        if !main.is_main {
            continue;
        }
        let zone = main.radius * ctx.config.buffer_multiplier;

        for (index, node) in ctx.nodes.iter().enumerate() {
            if node.is_main || index == main_index {
                continue;
            }
            let offset = node.position - main.position;
            let distance = offset.length();
            if distance <= EPSILON || distance >= zone {
                continue;
            }
            deltas[index] +=
                (offset / distance) * ((zone - distance) * ctx.config.buffer_strength * ctx.alpha);
        }
    }
}

pub(super) fn pendulum_maintenance(ctx: &ForceContext<'_>, deltas: &mut [Vec2]) {
    for (index, node) in ctx.nodes.iter().enumerate() {
        if node.is_main || node.locked {
            continue;
        }
        let Some(anchor) = node.anchor.and_then(|anchor| ctx.nodes.get(anchor)) else {
            continue;
        };

        let offset = node.position - anchor.position;
        let distance = offset.length();
        if distance <= EPSILON {
            continue;
        }

        let ideal = ctx.config.pendulum_distance(anchor.radius, node.radius);
        let error = ideal - distance;
        if error.abs() <= ctx.config.pendulum_tolerance {
            continue;
        }

        let excess = error.signum() * (error.abs() - ctx.config.pendulum_tolerance);
        deltas[index] += (offset / distance) * (excess * ctx.config.pendulum_strength * ctx.alpha);
    }
}

pub(super) fn arrow_clearance(ctx: &ForceContext<'_>, deltas: &mut [Vec2]) {
    let mains = ctx
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| node.is_main)
        .map(|(index, _)| index)
        .collect::<Vec<_>>();

    for (offset, &first) in mains.iter().enumerate() {
        for &second in &mains[offset + 1..] {
            let start = ctx.nodes[first].position;
            let segment = ctx.nodes[second].position - start;
            let length_sq = segment.length_sq();
            if length_sq <= EPSILON {
                continue;
            }

            for (index, node) in ctx.nodes.iter().enumerate() {
                if node.is_main {
                    continue;
                }

                let t = (node.position - start).dot(segment) / length_sq;
                if !(0.0..=1.0).contains(&t) {
                    continue;
                }

                let away = node.position - (start + segment * t);
                let distance = away.length();
                let clearance = ctx.config.arrow_clearance + node.radius;
                if distance >= clearance {
                    continue;
                }

                let normal = if distance > EPSILON {
                    away / distance
                } else {
                    segment.normalized().rot90()
                };
                deltas[index] +=
                    normal * ((clearance - distance) * ctx.config.arrow_strength * ctx.alpha);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, is_main: bool, position: Vec2) -> SimNode {
        let mut node = SimNode::new(id, is_main, if is_main { 40.0 } else { 10.0 });
        node.position = position;
        node
    }

    fn apply(force: Force, nodes: &[SimNode], links: &[SimLink]) -> Vec<Vec2> {
        let config = LayoutConfig::default();
        let ctx = ForceContext {
            nodes,
            links,
            config: &config,
            alpha: 1.0,
        };
        let mut deltas = vec![Vec2::ZERO; nodes.len()];
        force(&ctx, &mut deltas);
        deltas
    }

    #[test]
    fn link_pulls_far_counterparty_inward() {
        let nodes = vec![
            node("main", true, Vec2::ZERO),
            node("cp", false, vec2(800.0, 0.0)),
        ];
        let links = vec![SimLink::new(0, 1, false)];
        let deltas = apply(link_attraction, &nodes, &links);
        assert!(deltas[1].x < 0.0);
        assert!(deltas[0].x > 0.0);
    }

    #[test]
    fn link_pushes_close_mains_apart() {
        let nodes = vec![
            node("a", true, Vec2::ZERO),
            node("b", true, vec2(100.0, 0.0)),
        ];
        let links = vec![SimLink::new(0, 1, true)];
        let deltas = apply(link_attraction, &nodes, &links);
        assert!(deltas[1].x > 0.0);
        assert!(deltas[0].x < 0.0);
    }

    #[test]
    fn charge_repels_and_favors_mains() {
        let nodes = vec![
            node("main", true, Vec2::ZERO),
            node("cp", false, vec2(60.0, 0.0)),
        ];
        let deltas = apply(charge_repulsion, &nodes, &[]);
        assert!(deltas[1].x > 0.0);
        assert!(deltas[0].x < 0.0);
        assert!(deltas[1].length() > deltas[0].length());
    }

    #[test]
    fn collision_separates_overlapping_circles() {
        let nodes = vec![
            node("a", false, Vec2::ZERO),
            node("b", false, vec2(5.0, 0.0)),
            node("far", false, vec2(500.0, 0.0)),
        ];
        let deltas = apply(collision, &nodes, &[]);
        assert!(deltas[0].x < 0.0);
        assert!(deltas[1].x > 0.0);
        assert_eq!(deltas[2], Vec2::ZERO);
    }

    #[test]
    fn collision_resolves_coincident_nodes() {
        let nodes = vec![node("a", false, Vec2::ZERO), node("b", false, Vec2::ZERO)];
        let deltas = apply(collision, &nodes, &[]);
        assert!(deltas.iter().all(|delta| delta.x.is_finite() && delta.y.is_finite()));
        assert!(deltas[0].length() > 0.0);
    }

    #[test]
    fn buffer_only_pushes_counterparties_inside_zone() {
        let nodes = vec![
            node("main", true, Vec2::ZERO),
            node("inside", false, vec2(50.0, 0.0)),
            node("outside", false, vec2(0.0, 200.0)),
            node("center", false, Vec2::ZERO),
        ];
        let deltas = apply(main_buffer, &nodes, &[]);
        assert_eq!(deltas[0], Vec2::ZERO);
        assert!(deltas[1].x > 0.0);
        assert_eq!(deltas[2], Vec2::ZERO);
        assert_eq!(deltas[3], Vec2::ZERO);
    }

    #[test]
    fn pendulum_skips_locked_and_tolerated_nodes() {
        let config = LayoutConfig::default();
        let ideal = config.pendulum_distance(40.0, 10.0);

        let mut far = node("far", false, vec2(ideal + 120.0, 0.0));
        far.anchor = Some(0);
        let mut locked = node("locked", false, vec2(0.0, ideal + 120.0));
        locked.anchor = Some(0);
        locked.locked = true;
        let mut near = node("near", false, vec2(-(ideal + 5.0), 0.0));
        near.anchor = Some(0);

        let nodes = vec![node("main", true, Vec2::ZERO), far, locked, near];
        let deltas = apply(pendulum_maintenance, &nodes, &[]);
        assert!(deltas[1].x < 0.0);
        assert_eq!(deltas[2], Vec2::ZERO);
        assert_eq!(deltas[3], Vec2::ZERO);
    }

    #[test]
    fn arrow_clearance_pushes_perpendicular_to_segment() {
        let nodes = vec![
            node("a", true, Vec2::ZERO),
            node("b", true, vec2(400.0, 0.0)),
            node("above", false, vec2(200.0, -5.0)),
            node("on-line", false, vec2(100.0, 0.0)),
            node("beyond", false, vec2(500.0, 0.0)),
        ];
        let deltas = apply(arrow_clearance, &nodes, &[]);
        assert!(deltas[2].y < 0.0);
        assert!(deltas[2].x.abs() < 1e-4);
        assert!(deltas[3].length() > 0.0);
        assert_eq!(deltas[4], Vec2::ZERO);
    }

    #[test]
    fn arrow_clearance_ignores_coincident_mains() {
        let nodes = vec![
            node("a", true, Vec2::ZERO),
            node("b", true, Vec2::ZERO),
            node("cp", false, vec2(1.0, 1.0)),
        ];
        let deltas = apply(arrow_clearance, &nodes, &[]);
        assert!(deltas.iter().all(|delta| *delta == Vec2::ZERO));
    }
}
