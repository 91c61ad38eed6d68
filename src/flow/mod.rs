mod build;
mod graph;
mod records;
mod source;

pub use build::{FlowFilter, GraphOverrides, WalletDataset, build_graph};
pub use graph::{
    AggregatedLink, Direction, FlowGraph, FlowLink, FlowNode, SizeMetric, TransactionLink,
    pair_key,
};
pub use records::{CounterpartyRecord, TokenTransfer, TransactionRecord};
pub use source::{DataSource, FetchError, FixtureSource, Timeframe};
