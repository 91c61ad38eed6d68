use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use eframe::egui::Vec2;

use crate::config::LayoutConfig;
use crate::expansion::{ExpansionOutcome, ExpansionStore, ToggleRequest, ToggleResult};
use crate::flow::{
    CounterpartyRecord, DataSource, FetchError, FlowFilter, FlowGraph, FlowLink, GraphOverrides,
    SizeMetric, Timeframe, WalletDataset, build_graph,
};
use crate::geometry::{NodeSizing, link_geometries, radii_for};
use crate::layout::{DragRelease, Simulation};
use crate::util::same_address;

#[derive(Clone, Debug, PartialEq)]
pub struct NodeFrame {
    pub id: String,
    pub position: Vec2,
    pub radius: f32,
    pub pinned: bool,
    pub locked: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LinkFrame {
    pub key: String,
    pub source: String,
    pub target: String,
    pub value: f64,
    pub path: String,
    pub arrow: Option<String>,
}

/// Everything a renderer needs for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickFrame {
    pub positions: Vec<NodeFrame>,
    pub paths: Vec<LinkFrame>,
    pub settled: bool,
}

pub struct FlowSession {
    config: LayoutConfig,
    source: Arc<dyn DataSource>,
    datasets: Vec<WalletDataset>,
    overrides: GraphOverrides,
    locked: HashSet<String>,
    highlights: HashMap<String, [u8; 3]>,
    filter: FlowFilter,
    sizing: NodeSizing,
    graph: FlowGraph,
    links: Vec<FlowLink>,
    expansions: ExpansionStore,
    simulation: Simulation,
}

impl FlowSession {
    pub fn new(source: Arc<dyn DataSource>, config: LayoutConfig, timeframe: Timeframe) -> Self {
        Self {
            expansions: ExpansionStore::new(Arc::clone(&source), timeframe),
            simulation: Simulation::new(config.clone()),
            config,
            source,
            datasets: Vec::new(),
            overrides: GraphOverrides::default(),
            locked: HashSet::new(),
            highlights: HashMap::new(),
            filter: FlowFilter::default(),
            sizing: NodeSizing::default(),
            graph: FlowGraph::default(),
            links: Vec::new(),
        }
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn links(&self) -> &[FlowLink] {
        &self.links
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn expansions(&self) -> &ExpansionStore {
        &self.expansions
    }

    pub fn filter(&self) -> &FlowFilter {
        &self.filter
    }

    pub fn sizing(&self) -> NodeSizing {
        self.sizing
    }

    pub fn timeframe(&self) -> Timeframe {
        self.expansions.timeframe()
    }

    pub fn wallets(&self) -> impl Iterator<Item = &str> {
        self.datasets.iter().map(|dataset| dataset.address.as_str())
    }

    pub fn deleted(&self) -> &HashSet<String> {
        &self.overrides.deleted
    }

    pub fn is_locked(&self, id: &str) -> bool {
        self.locked.contains(id)
    }

    pub fn highlight(&self, id: &str) -> Option<[u8; 3]> {
        self.highlights.get(id).copied()
    }

    pub fn position(&self, id: &str) -> Option<Vec2> {
        self.simulation.node(id).map(|node| node.position)
    }

    pub fn add_wallet(&mut self, address: &str) -> Result<usize, FetchError> {
        let address = address.trim();
        if address.is_empty() {
            return Ok(0);
        }

        log::info!("fetching counterparties for {address}");
        let records = self
            .source
            .fetch_counterparties(address, self.timeframe())
            .inspect_err(|error| log::warn!("counterparty fetch for {address} failed: {error}"))?;
        let count = records.len();
        self.add_wallet_records(address, records);
        Ok(count)
    }

    pub fn add_wallet_records(&mut self, address: &str, records: Vec<CounterpartyRecord>) {
        match self
            .datasets
            .iter_mut()
            .find(|dataset| same_address(&dataset.address, address))
        {
            Some(dataset) => dataset.records = records,
            None => self.datasets.push(WalletDataset::new(address, records)),
        }
        self.rebuild();
    }

    pub fn remove_wallet(&mut self, address: &str) -> bool {
        let before = self.datasets.len();
        self.datasets.retain(|dataset| !same_address(&dataset.address, address));
        if self.datasets.len() == before {
            return false;
        }

        log::info!("removed wallet {address}");
        self.expansions.remove_main(address);
        self.rebuild();
        true
    }

    pub fn set_timeframe(&mut self, timeframe: Timeframe) {
        if timeframe == self.timeframe() {
            return;
        }

        self.expansions.set_timeframe(timeframe);
        for dataset in &mut self.datasets {
            match self.source.fetch_counterparties(&dataset.address, timeframe) {
                Ok(records) => dataset.records = records,
                Err(error) => log::warn!(
                    "keeping previous counterparties for {}: {error}",
                    dataset.address
                ),
            }
        }
        self.rebuild();
    }

    pub fn toggle_expansion(&mut self, main: &str, counterparty: &str) -> ToggleRequest {
        let request = self.expansions.toggle(main, counterparty);
        if request == ToggleRequest::Collapsed {
            self.reproject();
        }
        request
    }

    /// Like [`Self::toggle_expansion`] but waits for the fetch to finish.
    pub fn toggle_expansion_blocking(&mut self, main: &str, counterparty: &str) -> ToggleResult {
        let revision = self.expansions.revision();
        let result = self.expansions.toggle_blocking(main, counterparty);
        if self.expansions.revision() != revision {
            self.reproject();
        }
        result
    }

    pub fn poll(&mut self) -> Vec<ExpansionOutcome> {
        let outcomes = self.expansions.poll();
        self.apply_outcomes(&outcomes);
        outcomes
    }

    pub fn wait_for_expansions(&mut self, timeout: Duration) -> Vec<ExpansionOutcome> {
        let outcomes = self.expansions.wait(timeout);
        self.apply_outcomes(&outcomes);
        outcomes
    }

    fn apply_outcomes(&mut self, outcomes: &[ExpansionOutcome]) {
        if outcomes.iter().any(ExpansionOutcome::changed_links) {
            self.reproject();
        }
    }

    pub fn lock(&mut self, id: &str) -> bool {
        if !self.simulation.lock(id) {
            return false;
        }
        self.locked.insert(id.to_owned());
        true
    }

    pub fn unlock(&mut self, id: &str) -> bool {
        let was_locked = self.locked.remove(id);
        self.simulation.unlock(id) || was_locked
    }

    /// Hides a counterparty; deleting a main removes the wallet.
    pub fn delete_node(&mut self, id: &str) -> bool {
        let Some(node) = self.graph.node(id) else {
            return false;
        };
        if node.is_main {
            return self.remove_wallet(id);
        }

        self.overrides.deleted.insert(id.to_owned());
        self.locked.remove(id);
        self.rebuild();
        true
    }

    pub fn restore_node(&mut self, id: &str) -> bool {
        if !self.overrides.deleted.remove(id) {
            return false;
        }
        self.rebuild();
        true
    }

    pub fn set_custom_label(&mut self, id: &str, label: Option<String>) {
        match label.map(|label| label.trim().to_owned()) {
            Some(label) if !label.is_empty() => {
                self.overrides.labels.insert(id.to_owned(), label);
            }
            _ => {
                self.overrides.labels.remove(id);
            }
        }
        self.rebuild();
    }

    pub fn set_custom_highlight(&mut self, id: &str, color: Option<[u8; 3]>) {
        match color {
            Some(color) => {
                self.highlights.insert(id.to_owned(), color);
            }
            None => {
                self.highlights.remove(id);
            }
        }
    }

    pub fn set_filter(&mut self, filter: FlowFilter) {
        if filter == self.filter {
            return;
        }
        self.filter = filter;
        self.rebuild();
    }

    pub fn set_size_metric(&mut self, metric: SizeMetric) {
        self.set_sizing(NodeSizing {
            metric,
            ..self.sizing
        });
    }

    pub fn set_size_damping(&mut self, damping: f32) {
        self.set_sizing(NodeSizing {
            damping: damping.max(0.0),
            ..self.sizing
        });
    }

    fn set_sizing(&mut self, sizing: NodeSizing) {
        if sizing == self.sizing {
            return;
        }
        self.sizing = sizing;
        let radii = radii_for(&self.graph, self.sizing, &self.config);
        self.simulation.set_radii(&radii);
    }

    pub fn drag_start(&mut self, id: &str) -> bool {
        self.simulation.drag_start(id)
    }

    pub fn drag_move(&mut self, position: Vec2) -> bool {
        self.simulation.drag_to(position)
    }

    pub fn drag_end(&mut self) -> Option<DragRelease> {
        let release = self.simulation.drag_end()?;
        if release.locked {
            self.locked.insert(release.id.clone());
        }
        Some(release)
    }

    pub fn tick(&mut self) -> TickFrame {
        self.simulation.tick();
        self.frame()
    }

    pub fn frame(&self) -> TickFrame {
        let nodes = self.simulation.nodes();
        let positions = nodes
            .iter()
            .map(|node| NodeFrame {
                id: node.id.clone(),
                position: node.position,
                radius: node.radius,
                pinned: node.pinned.is_some(),
                locked: node.locked,
            })
            .collect();

        let sim_links = self.simulation.links();
        let paths = sim_links
            .iter()
            .zip(link_geometries(nodes, sim_links, &self.config))
            .filter_map(|(sim_link, geometry)| {
                let geometry = geometry?;
                let link = self.links.get(sim_link.origin)?;
                let key = match link.as_transaction() {
                    Some(transaction) => {
                        format!("{}#{}", transaction.link_id, transaction.transaction_index)
                    }
                    None => link.pair_key(),
                };
                Some(LinkFrame {
                    key,
                    source: link.source().to_owned(),
                    target: link.target().to_owned(),
                    value: link.value(),
                    path: geometry.path.to_svg(),
                    arrow: geometry.arrow.map(|arrow| arrow.to_svg()),
                })
            })
            .collect();

        TickFrame {
            positions,
            paths,
            settled: self.simulation.is_settled(),
        }
    }

    fn rebuild(&mut self) {
        self.graph = build_graph(&self.datasets, &self.overrides, &self.filter);
        self.links = self
            .expansions
            .project(&self.graph.links, &self.graph.index_by_id);
        let radii = radii_for(&self.graph, self.sizing, &self.config);
        self.simulation
            .rebuild(&self.graph, &self.links, &radii, &self.locked);
    }

    fn reproject(&mut self) {
        self.links = self
            .expansions
            .project(&self.graph.links, &self.graph.index_by_id);
        self.simulation.replace_links(&self.links);
    }
}
