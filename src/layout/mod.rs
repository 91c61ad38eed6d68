mod drag;
mod forces;
mod quadtree;

use std::collections::{HashMap, HashSet};

use eframe::egui::{Vec2, vec2};

use crate::config::LayoutConfig;
use crate::flow::{FlowGraph, FlowLink};
use crate::util::stable_pair;
use drag::DragSession;
use forces::{FORCES, ForceContext};

#[derive(Clone, Debug, PartialEq)]
pub struct SimNode {
    pub id: String,
    pub is_main: bool,
    pub locked: bool,
    pub position: Vec2,
    pub velocity: Vec2,
    pub pinned: Option<Vec2>,
    pub radius: f32,
    pub anchor: Option<usize>,
}

impl SimNode {
    pub fn new(id: &str, is_main: bool, radius: f32) -> Self {
        Self {
            id: id.to_owned(),
            is_main,
            locked: false,
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            pinned: None,
            radius,
            anchor: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FanSlot {
    pub index: usize,
    pub total: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimLink {
    pub source: usize,
    pub target: usize,
    pub between_mains: bool,
    pub fan: Option<FanSlot>,
    pub origin: usize,
}

impl SimLink {
    pub fn new(source: usize, target: usize, between_mains: bool) -> Self {
        Self {
            source,
            target,
            between_mains,
            fan: None,
            origin: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DragRelease {
    pub id: String,
    pub pinned: bool,
    pub locked: bool,
}

#[derive(Clone, Copy, Debug)]
struct NodeState {
    position: Vec2,
    velocity: Vec2,
    pinned: Option<Vec2>,
}

#[derive(Clone, Debug, Default)]
pub struct LayoutSnapshot {
    states: HashMap<String, NodeState>,
}

impl LayoutSnapshot {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<Vec2> {
        self.states.get(id).map(|state| state.position)
    }
}

pub struct Simulation {
    config: LayoutConfig,
    nodes: Vec<SimNode>,
    links: Vec<SimLink>,
    index_by_id: HashMap<String, usize>,
    alpha: f32,
    alpha_target: f32,
    drag: Option<DragSession>,
    deltas: Vec<Vec2>,
}

impl Simulation {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            links: Vec::new(),
            index_by_id: HashMap::new(),
            alpha: 0.0,
            alpha_target: 0.0,
            drag: None,
            deltas: Vec::new(),
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn links(&self) -> &[SimLink] {
        &self.links
    }

    pub fn node(&self, id: &str) -> Option<&SimNode> {
        self.index_by_id.get(id).map(|&index| &self.nodes[index])
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index_by_id.get(id).copied()
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn is_settled(&self) -> bool {
        self.alpha < self.config.alpha_min && self.alpha_target < self.config.alpha_min
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn kinetic_energy(&self) -> f32 {
        self.nodes
            .iter()
            .map(|node| 0.5 * node.velocity.length_sq())
            .sum()
    }

    pub fn snapshot(&self) -> LayoutSnapshot {
        LayoutSnapshot {
            states: self
                .nodes
                .iter()
                .map(|node| {
                    (
                        node.id.clone(),
                        NodeState {
                            position: node.position,
                            velocity: node.velocity,
                            pinned: node.pinned,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Replaces the topology, keeping positions and pins of surviving nodes.
    ///
    /// `radii` is indexed like `graph.nodes`. Nodes new to the layout are
    /// placed at a pendulum offset around their first connected main.
    pub fn rebuild(
        &mut self,
        graph: &FlowGraph,
        links: &[FlowLink],
        radii: &[f32],
        locked: &HashSet<String>,
    ) {
        let snapshot = self.snapshot();
        let first_build = self.nodes.is_empty();
        let drag = self.drag.take().and_then(|session| {
            let id = self.nodes.get(session.node)?.id.clone();
            Some((id, session))
        });

        let mut nodes = Vec::with_capacity(graph.nodes.len());
        let mut fresh = Vec::new();
        for (index, flow_node) in graph.nodes.iter().enumerate() {
            let radius = radii
                .get(index)
                .copied()
                .unwrap_or(self.config.min_radius);
            let mut node = SimNode::new(&flow_node.id, flow_node.is_main, radius);
            node.locked = !flow_node.is_main && locked.contains(&flow_node.id);
            node.anchor = flow_node
                .anchor_main()
                .and_then(|main| graph.index_by_id.get(main).copied());

            match snapshot.states.get(&flow_node.id) {
                Some(state) => {
                    node.position = state.position;
                    node.velocity = state.velocity;
                    let dragged = drag.as_ref().is_some_and(|(id, _)| *id == flow_node.id);
                    if flow_node.is_main || node.locked || dragged {
                        node.pinned = state.pinned;
                    }
                }
                None => fresh.push(index),
            }
            if node.locked && node.pinned.is_none() {
                node.pinned = Some(node.position);
            }
            nodes.push(node);
        }

        self.nodes = nodes;
        self.index_by_id = graph.index_by_id.clone();
        self.links = sim_links(&self.nodes, &self.index_by_id, links);

        let mut placed = vec![true; self.nodes.len()];
        for &index in &fresh {
            placed[index] = false;
        }
        fresh.sort_by_key(|&index| !self.nodes[index].is_main);
        for index in fresh {
            let position = self.seed_position(graph, index, &placed);
            placed[index] = true;
            let node = &mut self.nodes[index];
            node.position = position;
            if node.locked {
                node.pinned = Some(position);
            }
        }

        self.drag = drag.and_then(|(id, session)| {
            let index = self.index_by_id.get(&id).copied()?;
            Some(session.rebind(&self.nodes, &self.links, index))
        });

        if first_build {
            self.alpha = 1.0;
        } else {
            self.reheat(self.config.gentle_alpha);
        }

        log::debug!(
            "layout rebuilt: {} nodes, {} links, {} restored",
            self.nodes.len(),
            self.links.len(),
            snapshot.len().min(self.nodes.len())
        );
    }

    pub fn replace_links(&mut self, links: &[FlowLink]) {
        self.links = sim_links(&self.nodes, &self.index_by_id, links);
        self.reheat(self.config.gentle_alpha);
    }

    pub fn set_radii(&mut self, radii: &[f32]) {
        for (node, &radius) in self.nodes.iter_mut().zip(radii) {
            node.radius = radius;
        }
        self.reheat(self.config.gentle_alpha);
    }

    /// Raises alpha to at least `alpha` without cooling a hotter layout.
    pub fn reheat(&mut self, alpha: f32) {
        self.alpha = self.alpha.max(alpha.clamp(0.0, 1.0));
    }

    fn seed_position(&self, graph: &FlowGraph, index: usize, placed: &[bool]) -> Vec2 {
        let node = &self.nodes[index];
        let (jx, jy) = stable_pair(&node.id);

        if node.is_main {
            let mains = self
                .nodes
                .iter()
                .zip(placed)
                .filter(|(candidate, placed)| **placed && candidate.is_main)
                .map(|(candidate, _)| candidate.position)
                .collect::<Vec<_>>();
            if mains.is_empty() {
                return Vec2::ZERO;
            }

            let centroid = mains
                .iter()
                .fold(Vec2::ZERO, |sum, &position| sum + position)
                / mains.len() as f32;
            let angle = (mains.len() as f32 * 2.399_963) + jx * 0.3;
            return centroid + vec2(angle.cos(), angle.sin()) * self.config.main_link_distance;
        }

        let net_flow = graph.nodes.get(index).map_or(0.0, |flow| flow.net_usd_flow);
        let side = if net_flow > 0.0 {
            -1.0
        } else if net_flow < 0.0 {
            1.0
        } else if jx < 0.0 {
            -1.0
        } else {
            1.0
        };
        let angle = jy * 0.6;
        let direction = vec2(side * angle.cos(), angle.sin());

        let (center, arm) = match node.anchor.and_then(|anchor| self.nodes.get(anchor)) {
            Some(main) => (
                main.position,
                self.config.pendulum_distance(main.radius, node.radius),
            ),
            None => (
                Vec2::ZERO,
                self.config
                    .pendulum_distance(self.config.main_radius, node.radius),
            ),
        };
        center + direction * arm * (0.9 + 0.2 * jx.abs())
    }

    pub fn pin(&mut self, id: &str, position: Vec2) -> bool {
        let Some(&index) = self.index_by_id.get(id) else {
            return false;
        };
        let node = &mut self.nodes[index];
        node.pinned = Some(position);
        node.position = position;
        node.velocity = Vec2::ZERO;
        true
    }

    pub fn unpin(&mut self, id: &str) -> bool {
        let Some(&index) = self.index_by_id.get(id) else {
            return false;
        };
        let node = &mut self.nodes[index];
        node.locked = false;
        node.pinned = None;
        self.reheat(self.config.gentle_alpha);
        true
    }

    pub fn lock(&mut self, id: &str) -> bool {
        let Some(&index) = self.index_by_id.get(id) else {
            return false;
        };
        let node = &mut self.nodes[index];
        if node.is_main {
            return false;
        }
        node.locked = true;
        node.pinned = Some(node.position);
        node.velocity = Vec2::ZERO;
        true
    }

    pub fn unlock(&mut self, id: &str) -> bool {
        match self.node(id) {
            Some(node) if node.locked => self.unpin(id),
            _ => false,
        }
    }

    pub fn drag_start(&mut self, id: &str) -> bool {
        let Some(&index) = self.index_by_id.get(id) else {
            return false;
        };
        let session = DragSession::begin(&self.nodes, &self.links, index);
        log::debug!(
            "drag started on {id} with {} following counterparties",
            session.anchored_count()
        );

        let node = &mut self.nodes[index];
        node.pinned = Some(node.position);
        node.velocity = Vec2::ZERO;
        self.drag = Some(session);
        self.alpha_target = self.config.drag_alpha;
        self.reheat(self.config.drag_alpha);
        true
    }

    pub fn drag_to(&mut self, position: Vec2) -> bool {
        let Some(index) = self.drag.as_ref().map(|session| session.node) else {
            return false;
        };
        if !position.x.is_finite() || !position.y.is_finite() {
            return false;
        }
        let node = &mut self.nodes[index];
        node.pinned = Some(position);
        node.position = position;
        true
    }

    /// Mains stay pinned where released; counterparties lock only if moved.
    pub fn drag_end(&mut self) -> Option<DragRelease> {
        let session = self.drag.take()?;
        self.alpha_target = 0.0;

        let lock_displacement = self.config.lock_displacement;
        let node = self.nodes.get_mut(session.node)?;
        if node.is_main {
            node.pinned = Some(node.position);
        } else if session.displacement(node.position) > lock_displacement || session.was_locked
        {
            node.locked = true;
            node.pinned = Some(node.position);
        } else {
            node.pinned = None;
        }

        let release = DragRelease {
            id: node.id.clone(),
            pinned: node.pinned.is_some(),
            locked: node.locked,
        };
        log::debug!(
            "drag released {}: pinned={} locked={}",
            release.id,
            release.pinned,
            release.locked
        );
        Some(release)
    }

    pub fn tick(&mut self) -> bool {
        if self.is_settled() || self.nodes.is_empty() {
            if self.alpha > 0.0 || self.nodes.iter().any(|node| node.velocity != Vec2::ZERO) {
                self.alpha = 0.0;
                for node in &mut self.nodes {
                    node.velocity = Vec2::ZERO;
                }
            }
            return false;
        }

        self.alpha += (self.alpha_target - self.alpha) * self.config.alpha_decay;

        let node_count = self.nodes.len();
        self.deltas.clear();
        self.deltas.resize(node_count, Vec2::ZERO);

        let ctx = ForceContext {
            nodes: &self.nodes,
            links: &self.links,
            config: &self.config,
            alpha: self.alpha,
        };
        for force in FORCES {
            force(&ctx, &mut self.deltas);
        }
        if let Some(session) = &self.drag {
            session.apply_follow(&self.nodes, &self.config, &mut self.deltas);
        }

        let retain = 1.0 - self.config.velocity_decay;
        let max_speed = self.config.max_speed;
        for (node, delta) in self.nodes.iter_mut().zip(&self.deltas) {
            if let Some(pin) = node.pinned {
                node.position = pin;
                node.velocity = Vec2::ZERO;
                continue;
            }

            let mut velocity = (node.velocity + *delta) * retain;
            if !velocity.x.is_finite() || !velocity.y.is_finite() {
                velocity = Vec2::ZERO;
            }
            let speed = velocity.length();
            if speed > max_speed {
                velocity *= max_speed / speed;
            }

            node.velocity = velocity;
            node.position += velocity;
        }

        true
    }

    pub fn run_until_settled(&mut self, max_ticks: usize) -> usize {
        let mut ticks = 0;
        while ticks < max_ticks && self.tick() {
            ticks += 1;
        }
        ticks
    }
}

fn sim_links(
    nodes: &[SimNode],
    index_by_id: &HashMap<String, usize>,
    links: &[FlowLink],
) -> Vec<SimLink> {
    links
        .iter()
        .enumerate()
        .filter_map(|(origin, link)| {
            let source = *index_by_id.get(link.source())?;
            let target = *index_by_id.get(link.target())?;
            if source == target {
                return None;
            }
            let mut sim_link = SimLink {
                origin,
                ..SimLink::new(source, target, nodes[source].is_main && nodes[target].is_main)
            };
            sim_link.fan = link
                .as_transaction()
                .filter(|transaction| transaction.total_transactions > 1)
                .map(|transaction| FanSlot {
                    index: transaction.transaction_index,
                    total: transaction.total_transactions,
                });
            Some(sim_link)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{
        CounterpartyRecord, FlowFilter, GraphOverrides, WalletDataset, build_graph,
    };

    fn record(address: &str, netflow: f64) -> CounterpartyRecord {
        CounterpartyRecord {
            interacting_address: address.to_owned(),
            volume_in_usd: netflow.max(0.0),
            volume_out_usd: (-netflow).max(0.0),
            usd_netflow: netflow,
            ..CounterpartyRecord::default()
        }
    }

    fn flow_graph(datasets: &[WalletDataset]) -> FlowGraph {
        build_graph(datasets, &GraphOverrides::default(), &FlowFilter::default())
    }

    fn radii(graph: &FlowGraph) -> Vec<f32> {
        graph
            .nodes
            .iter()
            .map(|node| if node.is_main { 40.0 } else { 12.0 })
            .collect()
    }

    fn simulation(graph: &FlowGraph) -> Simulation {
        let mut simulation = Simulation::new(LayoutConfig::default());
        simulation.rebuild(graph, &graph.links, &radii(graph), &HashSet::new());
        simulation
    }

    fn two_mains() -> FlowGraph {
        flow_graph(&[
            WalletDataset::new(
                "0xA",
                vec![record("0xB", 40.0), record("0xC", 500.0), record("0xD", -90.0)],
            ),
            WalletDataset::new("0xB", vec![record("0xC", -200.0), record("0xE", 75.0)]),
        ])
    }

    fn all_finite(simulation: &Simulation) -> bool {
        simulation
            .nodes()
            .iter()
            .all(|node| node.position.x.is_finite() && node.position.y.is_finite())
    }

    #[test]
    fn new_counterparties_sit_left_or_right_by_net_flow() {
        let graph = flow_graph(&[WalletDataset::new(
            "0xA",
            vec![record("0xIn", 500.0), record("0xOut", -500.0)],
        )]);
        let simulation = simulation(&graph);

        let main = simulation.node("0xA").unwrap().position;
        let incoming = simulation.node("0xIn").unwrap().position;
        let outgoing = simulation.node("0xOut").unwrap().position;
        assert!(incoming.x < main.x);
        assert!(outgoing.x > main.x);
        assert!(incoming != Vec2::ZERO && outgoing != Vec2::ZERO);
        assert_eq!(simulation.alpha(), 1.0);
    }

    #[test]
    fn pinned_nodes_do_not_move() {
        let graph = two_mains();
        let mut simulation = simulation(&graph);
        assert!(simulation.pin("0xA", vec2(10.0, 20.0)));

        for _ in 0..50 {
            simulation.tick();
        }
        let main = simulation.node("0xA").unwrap();
        assert_eq!(main.position, vec2(10.0, 20.0));
        assert_eq!(main.velocity, Vec2::ZERO);
    }

    #[test]
    fn layout_settles_within_bounded_ticks() {
        let graph = two_mains();
        let mut simulation = simulation(&graph);

        let ticks = simulation.run_until_settled(2_000);
        assert!(ticks < 2_000);
        assert!(simulation.is_settled());
        assert!(!simulation.tick());
        assert_eq!(simulation.kinetic_energy(), 0.0);
        assert!(all_finite(&simulation));
    }

    #[test]
    fn settled_counterparties_rest_near_pendulum_distance() {
        let graph = flow_graph(&[WalletDataset::new(
            "0xA",
            vec![record("0xB", 10.0), record("0xC", -10.0), record("0xD", 30.0)],
        )]);
        let mut simulation = simulation(&graph);
        simulation.run_until_settled(2_000);

        let config = LayoutConfig::default();
        let main = simulation.node("0xA").unwrap().position;
        let ideal = config.pendulum_distance(40.0, 12.0);
        for id in ["0xB", "0xC", "0xD"] {
            let distance = (simulation.node(id).unwrap().position - main).length();
            assert!((distance - ideal).abs() < ideal * 0.5, "{id} at {distance}");
        }
    }

    #[test]
    fn rebuild_preserves_positions_and_main_pins() {
        let graph = two_mains();
        let mut simulation = simulation(&graph);
        simulation.run_until_settled(300);
        simulation.pin("0xA", vec2(-300.0, 0.0));
        let before = simulation.snapshot();

        let grown = flow_graph(&[
            WalletDataset::new(
                "0xA",
                vec![record("0xB", 40.0), record("0xC", 500.0), record("0xD", -90.0)],
            ),
            WalletDataset::new("0xB", vec![record("0xC", -200.0), record("0xE", 75.0)]),
            WalletDataset::new("0xF", vec![record("0xC", 12.0)]),
        ]);
        simulation.rebuild(&grown, &grown.links, &radii(&grown), &HashSet::new());

        for id in ["0xB", "0xC", "0xD", "0xE"] {
            assert_eq!(simulation.node(id).unwrap().position, before.position(id).unwrap());
        }
        assert_eq!(simulation.node("0xA").unwrap().pinned, Some(vec2(-300.0, 0.0)));
        assert!(simulation.node("0xF").unwrap().position != Vec2::ZERO);
        assert!(simulation.alpha() >= LayoutConfig::default().gentle_alpha);
        assert!(simulation.alpha() < 1.0);
    }

    #[test]
    fn locked_counterparty_stays_put_and_survives_rebuild() {
        let graph = two_mains();
        let mut simulation = simulation(&graph);
        assert!(simulation.lock("0xD"));
        assert!(!simulation.lock("0xA"));
        let held = simulation.node("0xD").unwrap().position;

        simulation.run_until_settled(200);
        assert_eq!(simulation.node("0xD").unwrap().position, held);

        let locked = HashSet::from(["0xD".to_owned()]);
        simulation.rebuild(&graph, &graph.links, &radii(&graph), &locked);
        let node = simulation.node("0xD").unwrap();
        assert!(node.locked);
        assert_eq!(node.pinned, Some(held));

        assert!(simulation.unlock("0xD"));
        assert!(simulation.node("0xD").unwrap().pinned.is_none());
    }

    #[test]
    fn dragged_main_pins_on_release() {
        let graph = two_mains();
        let mut simulation = simulation(&graph);
        simulation.run_until_settled(300);

        assert!(simulation.drag_start("0xA"));
        assert!(simulation.drag_to(vec2(250.0, -250.0)));
        for _ in 0..5 {
            simulation.tick();
        }
        let release = simulation.drag_end().unwrap();
        assert!(release.pinned);
        assert!(!release.locked);
        assert_eq!(simulation.node("0xA").unwrap().pinned, Some(vec2(250.0, -250.0)));
    }

    #[test]
    fn counterparty_locks_only_when_displaced() {
        let graph = two_mains();
        let mut simulation = simulation(&graph);
        simulation.run_until_settled(300);

        let origin = simulation.node("0xE").unwrap().position;
        assert!(simulation.drag_start("0xE"));
        assert!(simulation.drag_to(origin + vec2(1.0, 0.0)));
        let release = simulation.drag_end().unwrap();
        assert!(!release.locked);
        assert!(simulation.node("0xE").unwrap().pinned.is_none());

        assert!(simulation.drag_start("0xE"));
        assert!(simulation.drag_to(origin + vec2(80.0, 0.0)));
        let release = simulation.drag_end().unwrap();
        assert!(release.locked);
        assert!(simulation.node("0xE").unwrap().locked);
    }

    #[test]
    fn replacing_links_reheats_without_moving_nodes() {
        let graph = two_mains();
        let mut simulation = simulation(&graph);
        simulation.run_until_settled(2_000);
        let before = simulation.snapshot();

        simulation.replace_links(&graph.links[..1]);
        assert_eq!(simulation.links().len(), 1);
        assert!(simulation.alpha() >= LayoutConfig::default().gentle_alpha);
        assert!(simulation.alpha() < 1.0);
        for node in simulation.nodes() {
            assert_eq!(Some(node.position), before.position(&node.id));
        }
    }

    #[test]
    fn coincident_nodes_stay_finite() {
        let graph = two_mains();
        let mut simulation = simulation(&graph);
        for node in &mut simulation.nodes {
            node.position = Vec2::ZERO;
        }
        for _ in 0..100 {
            simulation.tick();
        }
        assert!(all_finite(&simulation));
    }

    #[test]
    fn empty_layout_is_settled() {
        let mut simulation = Simulation::new(LayoutConfig::default());
        assert!(!simulation.tick());
        assert_eq!(simulation.kinetic_energy(), 0.0);
    }
}
