use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::graph::pair_key;
use super::records::{CounterpartyRecord, TransactionRecord};
use crate::util::address_key;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Day,
    Week,
    #[default]
    Month,
    Year,
    All,
}

impl Timeframe {
    pub const ALL: [Self; 5] = [Self::Day, Self::Week, Self::Month, Self::Year, Self::All];

    pub fn label(self) -> &'static str {
        match self {
            Self::Day => "24h",
            Self::Week => "7d",
            Self::Month => "30d",
            Self::Year => "1y",
            Self::All => "all",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum FetchError {
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Status {
            status: 404,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) | Self::Decode(_) => None,
        }
    }
}

/// Remote provider of counterparty and transaction records.
///
/// Implementations are called from worker threads, so they must be shareable.
pub trait DataSource: Send + Sync {
    fn fetch_counterparties(
        &self,
        address: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<CounterpartyRecord>, FetchError>;

    fn fetch_transactions_between(
        &self,
        main: &str,
        counterparty: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<TransactionRecord>, FetchError>;
}

#[derive(Clone, Debug, Default)]
pub struct FixtureSource {
    counterparties: HashMap<String, Vec<CounterpartyRecord>>,
    transactions: HashMap<String, Vec<TransactionRecord>>,
    wallet_order: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FixtureDocument {
    #[serde(default)]
    counterparties: serde_json::Map<String, Value>,
    #[serde(default)]
    transactions: HashMap<String, Vec<TransactionRecord>>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read dataset {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("failed to parse dataset {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let document: FixtureDocument =
            serde_json::from_str(raw).context("invalid dataset JSON")?;

        let mut source = Self::new();
        for (address, value) in document.counterparties {
            let records = match value {
                Value::Array(_) => Vec::<CounterpartyRecord>::deserialize(value)
                    .with_context(|| format!("invalid counterparty list for {address}"))?,
                Value::Object(mut object) => {
                    let Some(inner) = object.remove("data") else {
                        return Err(anyhow!("counterparty entry for {address} has no data"));
                    };
                    Vec::<CounterpartyRecord>::deserialize(inner)
                        .with_context(|| format!("invalid counterparty list for {address}"))?
                }
                _ => return Err(anyhow!("unexpected counterparty entry for {address}")),
            };
            source = source.with_counterparties(&address, records);
        }
        source.transactions = document
            .transactions
            .into_iter()
            .map(|(pair, records)| (address_key(&pair), records))
            .collect();

        log::debug!(
            "loaded fixture with {} wallets and {} transaction pairs",
            source.wallet_order.len(),
            source.transactions.len()
        );
        Ok(source)
    }

    pub fn with_counterparties(mut self, address: &str, records: Vec<CounterpartyRecord>) -> Self {
        let key = address_key(address);
        if !self.counterparties.contains_key(&key) {
            self.wallet_order.push(address.to_owned());
        }
        self.counterparties.insert(key, records);
        self
    }

    pub fn with_transactions(
        mut self,
        main: &str,
        counterparty: &str,
        records: Vec<TransactionRecord>,
    ) -> Self {
        self.transactions
            .insert(address_key(&pair_key(main, counterparty)), records);
        self
    }

    /// Wallets with counterparty data, in load order.
    pub fn wallets(&self) -> &[String] {
        &self.wallet_order
    }
}

impl DataSource for FixtureSource {
    fn fetch_counterparties(
        &self,
        address: &str,
        _timeframe: Timeframe,
    ) -> Result<Vec<CounterpartyRecord>, FetchError> {
        self.counterparties
            .get(&address_key(address))
            .cloned()
            .ok_or_else(|| FetchError::not_found(format!("no counterparties for {address}")))
    }

    fn fetch_transactions_between(
        &self,
        main: &str,
        counterparty: &str,
        _timeframe: Timeframe,
    ) -> Result<Vec<TransactionRecord>, FetchError> {
        let key = pair_key(main, counterparty);
        self.transactions
            .get(&address_key(&key))
            .cloned()
            .ok_or_else(|| FetchError::not_found(format!("no transactions for {key}")))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const DOCUMENT: &str = r#"{
        "counterparties": {
            "0xA": [{"address": "0xC", "volume_in": 500, "netflow": 500}],
            "0xB": {"data": [{"address": "0xC", "volume_out": 200, "netflow": -200}]}
        },
        "transactions": {
            "0xA-0xC": [{"hash": "0x1", "volume": 500}]
        }
    }"#;

    #[test]
    fn fixture_serves_counterparties_and_transactions() {
        let source = FixtureSource::from_json_str(DOCUMENT).unwrap();

        let records = source.fetch_counterparties("0xB", Timeframe::Month).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].usd_netflow, -200.0);

        let transactions = source
            .fetch_transactions_between("0xA", "0xC", Timeframe::All)
            .unwrap();
        assert_eq!(transactions[0].transaction_hash, "0x1");
    }

    #[test]
    fn lookups_ignore_address_case() {
        let source = FixtureSource::from_json_str(DOCUMENT)
            .unwrap()
            .with_counterparties("0xb", Vec::new());

        assert!(source.fetch_counterparties("0xa", Timeframe::Week).is_ok());
        assert!(source.fetch_counterparties("0xB", Timeframe::Week).unwrap().is_empty());
        assert_eq!(source.wallets(), ["0xA", "0xB"]);

        let transactions = source
            .fetch_transactions_between("0xa", "0xc", Timeframe::Week)
            .unwrap();
        assert_eq!(transactions.len(), 1);
    }

    #[test]
    fn wallets_keep_document_order() {
        let source = FixtureSource::from_json_str(
            r#"{"counterparties": {"0xZ": [], "0xB": [], "0xA": []}}"#,
        )
        .unwrap();
        assert_eq!(source.wallets(), ["0xZ", "0xB", "0xA"]);
    }

    #[test]
    fn missing_pair_reports_not_found() {
        let source = FixtureSource::from_json_str(DOCUMENT).unwrap();
        let error = source
            .fetch_transactions_between("0xB", "0xC", Timeframe::Day)
            .unwrap_err();
        assert_eq!(error.status(), Some(404));
        assert!(error.to_string().contains("0xB-0xC"));
    }

    #[test]
    fn fixture_loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOCUMENT.as_bytes()).unwrap();

        let source = FixtureSource::from_path(file.path()).unwrap();
        assert_eq!(source.wallets().len(), 2);
    }

    #[test]
    fn malformed_fixture_is_an_error() {
        assert!(FixtureSource::from_json_str("[1, 2, 3]").is_err());
        assert!(FixtureSource::from_json_str(r#"{"counterparties": {"0xA": 4}}"#).is_err());
    }
}
