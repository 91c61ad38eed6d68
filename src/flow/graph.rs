use std::collections::HashMap;
use std::sync::Arc;

use super::records::TransactionRecord;

pub fn pair_key(main: &str, counterparty: &str) -> String {
    format!("{main}-{counterparty}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }

    pub fn signed(self, volume: f64) -> f64 {
        match self {
            Self::Incoming => volume.abs(),
            Self::Outgoing => -volume.abs(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeMetric {
    NetFlow,
    Inflow,
    Outflow,
    TotalVolume,
    Uniform,
}

impl SizeMetric {
    pub const ALL: [Self; 5] = [
        Self::NetFlow,
        Self::Inflow,
        Self::Outflow,
        Self::TotalVolume,
        Self::Uniform,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::NetFlow => "Net flow",
            Self::Inflow => "Inflow",
            Self::Outflow => "Outflow",
            Self::TotalVolume => "Total volume",
            Self::Uniform => "Uniform",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlowNode {
    pub id: String,
    pub label: Option<String>,
    pub chain: Option<String>,
    pub is_main: bool,
    pub net_usd_flow: f64,
    pub volume_in: f64,
    pub volume_out: f64,
    pub connected_main_addresses: Vec<String>,
    pub is_contract: bool,
    pub is_exchange: bool,
}

impl FlowNode {
    pub fn new(id: &str, is_main: bool) -> Self {
        Self {
            id: id.to_owned(),
            label: None,
            chain: None,
            is_main,
            net_usd_flow: 0.0,
            volume_in: 0.0,
            volume_out: 0.0,
            connected_main_addresses: Vec::new(),
            is_contract: false,
            is_exchange: false,
        }
    }

    pub fn connect_main(&mut self, main: &str) {
        if !self.connected_main_addresses.iter().any(|known| known == main) {
            self.connected_main_addresses.push(main.to_owned());
        }
    }

    pub fn highlight_shared(&self) -> bool {
        !self.is_main && self.connected_main_addresses.len() > 1
    }

    pub fn total_volume(&self) -> f64 {
        self.volume_in + self.volume_out
    }

    pub fn metric(&self, metric: SizeMetric) -> f64 {
        match metric {
            SizeMetric::NetFlow => self.net_usd_flow.abs(),
            SizeMetric::Inflow => self.volume_in,
            SizeMetric::Outflow => self.volume_out,
            SizeMetric::TotalVolume => self.total_volume(),
            SizeMetric::Uniform => 1.0,
        }
    }

    pub fn anchor_main(&self) -> Option<&str> {
        self.connected_main_addresses.first().map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AggregatedLink {
    pub source: String,
    pub target: String,
    pub value: f64,
}

impl AggregatedLink {
    pub fn key(&self) -> String {
        pair_key(&self.source, &self.target)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransactionLink {
    pub source: String,
    pub target: String,
    pub value: f64,
    pub direction: Direction,
    pub transaction: Arc<TransactionRecord>,
    pub transaction_index: usize,
    pub total_transactions: usize,
    pub link_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FlowLink {
    Aggregated(AggregatedLink),
    Transaction(TransactionLink),
}

impl FlowLink {
    pub fn source(&self) -> &str {
        match self {
            Self::Aggregated(link) => &link.source,
            Self::Transaction(link) => &link.source,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Self::Aggregated(link) => &link.target,
            Self::Transaction(link) => &link.target,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Self::Aggregated(link) => link.value,
            Self::Transaction(link) => link.value,
        }
    }

    /// Pair key shared by every representation of the same (main, counterparty) pair.
    pub fn pair_key(&self) -> String {
        match self {
            Self::Aggregated(link) => link.key(),
            Self::Transaction(link) => link.link_id.clone(),
        }
    }

    pub fn as_transaction(&self) -> Option<&TransactionLink> {
        match self {
            Self::Transaction(link) => Some(link),
            Self::Aggregated(_) => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    pub links: Vec<FlowLink>,
    pub index_by_id: HashMap<String, usize>,
}

impl FlowGraph {
    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.index_by_id
            .get(id)
            .and_then(|&index| self.nodes.get(index))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn main_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|node| node.is_main)
            .map(|node| node.id.as_str())
    }

    pub fn metric_range(&self, metric: SizeMetric) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = 0.0_f64;
        for node in self.nodes.iter().filter(|node| !node.is_main) {
            let value = node.metric(metric);
            min = min.min(value);
            max = max.max(value);
        }
        if !min.is_finite() {
            min = 0.0;
        }
        (min, max.max(min))
    }
}
