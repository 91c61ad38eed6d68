use serde::{Deserialize, Deserializer};
use serde_json::Value;

const EXCHANGE_KEYWORDS: [&str; 10] = [
    "exchange", "binance", "coinbase", "kraken", "okx", "bybit", "kucoin", "bitfinex", "gate.io",
    "huobi",
];

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CounterpartyRecord {
    #[serde(
        alias = "address",
        alias = "counterparty",
        alias = "counterparty_address",
        alias = "interactingAddress"
    )]
    pub interacting_address: String,
    #[serde(
        default,
        alias = "volume_in",
        alias = "inbound_volume",
        alias = "volumeIn",
        deserialize_with = "lenient_f64"
    )]
    pub volume_in_usd: f64,
    #[serde(
        default,
        alias = "volume_out",
        alias = "outbound_volume",
        alias = "volumeOut",
        deserialize_with = "lenient_f64"
    )]
    pub volume_out_usd: f64,
    #[serde(
        default,
        alias = "net_usd_flow",
        alias = "netflow",
        alias = "netUsdFlow",
        deserialize_with = "lenient_f64"
    )]
    pub usd_netflow: f64,
    #[serde(
        default,
        alias = "interacting_address_label",
        alias = "labels",
        deserialize_with = "label_or_list"
    )]
    pub label: Option<String>,
    #[serde(default, alias = "chain_id")]
    pub chain: Option<String>,
    #[serde(default, alias = "is_smart_contract", alias = "isContract")]
    pub is_contract: bool,
    #[serde(default, alias = "isExchange")]
    pub is_exchange: bool,
}

impl CounterpartyRecord {
    pub fn total_volume(&self) -> f64 {
        self.volume_in_usd.abs() + self.volume_out_usd.abs()
    }

    pub fn has_flow(&self) -> bool {
        self.volume_in_usd != 0.0 || self.volume_out_usd != 0.0 || self.usd_netflow != 0.0
    }

    pub fn looks_like_exchange(&self) -> bool {
        if self.is_exchange {
            return true;
        }

        let Some(label) = &self.label else {
            return false;
        };
        let label = label.to_ascii_lowercase();
        EXCHANGE_KEYWORDS
            .iter()
            .any(|keyword| label.contains(keyword))
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct TokenTransfer {
    #[serde(default, alias = "from", alias = "fromAddress", alias = "source")]
    pub from_address: Option<String>,
    #[serde(default, alias = "to", alias = "toAddress", alias = "destination")]
    pub to_address: Option<String>,
    #[serde(
        default,
        alias = "usd_value",
        alias = "value",
        alias = "valueUsd",
        deserialize_with = "lenient_f64"
    )]
    pub value_usd: f64,
    #[serde(default, alias = "symbol")]
    pub token_symbol: Option<String>,
}

impl TokenTransfer {
    pub fn sender(&self) -> &str {
        self.from_address.as_deref().unwrap_or_default()
    }

    pub fn receiver(&self) -> &str {
        self.to_address.as_deref().unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct TransactionRecord {
    #[serde(default, alias = "sent", alias = "tokensSent")]
    pub tokens_sent: Vec<TokenTransfer>,
    #[serde(default, alias = "received", alias = "tokensReceived")]
    pub tokens_received: Vec<TokenTransfer>,
    #[serde(
        default,
        alias = "volume",
        alias = "usd_volume",
        alias = "volumeUsd",
        deserialize_with = "lenient_opt_f64"
    )]
    pub volume_usd: Option<f64>,
    #[serde(default, alias = "timestamp", alias = "blockTimestamp")]
    pub block_timestamp: Option<String>,
    #[serde(default, alias = "tx_hash", alias = "hash", alias = "transactionHash")]
    pub transaction_hash: String,
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default, alias = "method_name")]
    pub method: Option<String>,
}

impl TransactionRecord {
    /// Reported USD volume, or the summed entry values when it is missing.
    pub fn usd_volume(&self) -> f64 {
        if let Some(volume) = self.volume_usd {
            return volume.abs();
        }

        self.tokens_sent
            .iter()
            .chain(self.tokens_received.iter())
            .map(|entry| entry.value_usd.abs())
            .sum()
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_f64(deserializer)?.unwrap_or(0.0))
}

fn lenient_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|value| value.is_finite()))
}

fn label_or_list<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let label = match value {
        Some(Value::String(text)) => Some(text),
        Some(Value::Array(items)) => items
            .into_iter()
            .find_map(|item| item.as_str().map(str::to_owned)),
        _ => None,
    };
    Ok(label.filter(|text| !text.trim().is_empty()))
}
