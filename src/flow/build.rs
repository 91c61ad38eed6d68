use std::collections::{HashMap, HashSet};

use super::graph::{AggregatedLink, FlowGraph, FlowLink, FlowNode, pair_key};
use super::records::CounterpartyRecord;
use crate::util::address_key;

#[derive(Clone, Debug, PartialEq)]
pub struct WalletDataset {
    pub address: String,
    pub records: Vec<CounterpartyRecord>,
}

impl WalletDataset {
    pub fn new(address: impl Into<String>, records: Vec<CounterpartyRecord>) -> Self {
        Self {
            address: address.into(),
            records,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlowFilter {
    /// Inclusive bounds on the absolute net flow of a record.
    pub usd_range: Option<(f64, f64)>,
    pub show_smart_contracts: bool,
    pub show_exchanges: bool,
    pub min_total_volume: f64,
}

impl Default for FlowFilter {
    fn default() -> Self {
        Self {
            usd_range: None,
            show_smart_contracts: true,
            show_exchanges: true,
            min_total_volume: 0.0,
        }
    }
}

impl FlowFilter {
    fn admits(&self, record: &CounterpartyRecord) -> bool {
        if let Some((low, high)) = self.usd_range {
            let magnitude = record.usd_netflow.abs();
            if magnitude < low || magnitude > high {
                return false;
            }
        }

        if !self.show_smart_contracts && record.is_contract {
            return false;
        }

        if !self.show_exchanges && record.looks_like_exchange() {
            return false;
        }

        record.total_volume() >= self.min_total_volume
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphOverrides {
    pub deleted: HashSet<String>,
    pub labels: HashMap<String, String>,
}

pub fn build_graph(
    datasets: &[WalletDataset],
    overrides: &GraphOverrides,
    filter: &FlowFilter,
) -> FlowGraph {
    let mut graph = FlowGraph::default();
    let mut slots: HashMap<String, usize> = HashMap::new();
    let deleted = overrides
        .deleted
        .iter()
        .map(|id| address_key(id))
        .collect::<HashSet<_>>();
    let labels = overrides
        .labels
        .iter()
        .map(|(id, label)| (address_key(id), label))
        .collect::<HashMap<_, _>>();

    for dataset in datasets {
        let key = address_key(&dataset.address);
        if key.is_empty() {
            continue;
        }
        let index = node_slot(&mut graph, &mut slots, key.clone(), dataset.address.trim());
        let node = &mut graph.nodes[index];
        node.is_main = true;
        if let Some(label) = labels.get(&key) {
            node.label = Some((*label).clone());
        }
    }

    let mut link_by_pair: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0usize;

    for dataset in datasets {
        let main_key = address_key(&dataset.address);
        let Some(&main_index) = slots.get(&main_key) else {
            continue;
        };
        let main = graph.nodes[main_index].id.clone();

        for record in &dataset.records {
            let key = address_key(&record.interacting_address);
            if key.is_empty()
                || key == main_key
                || deleted.contains(&key)
                || !record.has_flow()
                || !filter.admits(record)
            {
                skipped += 1;
                continue;
            }

            let existed = slots.contains_key(&key);
            let index = node_slot(
                &mut graph,
                &mut slots,
                key.clone(),
                record.interacting_address.trim(),
            );
            let node = &mut graph.nodes[index];
            if !existed {
                node.label = labels
                    .get(&key)
                    .map(|label| (*label).clone())
                    .or_else(|| record.label.clone());
                node.chain = record.chain.clone();
                node.is_contract = record.is_contract;
                node.is_exchange = record.looks_like_exchange();
            }
            node.net_usd_flow += record.usd_netflow;
            node.volume_in += record.volume_in_usd;
            node.volume_out += record.volume_out_usd;
            if !node.is_main {
                node.connect_main(&main);
            }

            let pair = pair_key(&main_key, &key);
            if let Some(&link_index) = link_by_pair.get(&pair) {
                if let FlowLink::Aggregated(link) = &mut graph.links[link_index] {
                    link.value += record.usd_netflow;
                }
                continue;
            }

            link_by_pair.insert(pair, graph.links.len());
            graph.links.push(FlowLink::Aggregated(AggregatedLink {
                source: main.clone(),
                target: graph.nodes[index].id.clone(),
                value: record.usd_netflow,
            }));
        }
    }

    log::debug!(
        "built flow graph: {} nodes, {} links, {} records skipped",
        graph.nodes.len(),
        graph.links.len(),
        skipped
    );
    graph
}

fn node_slot(
    graph: &mut FlowGraph,
    slots: &mut HashMap<String, usize>,
    key: String,
    id: &str,
) -> usize {
    if let Some(&index) = slots.get(&key) {
        return index;
    }

    let index = graph.nodes.len();
    graph.nodes.push(FlowNode::new(id, false));
    graph.index_by_id.insert(id.to_owned(), index);
    slots.insert(key, index);
    index
}
