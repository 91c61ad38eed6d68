use std::sync::Arc;

use crate::flow::{Direction, TransactionLink, TransactionRecord, pair_key};
use crate::util::same_address;

/// Classifies a transaction relative to the pair's main wallet.
///
/// An unambiguous token entry between the two parties decides. Otherwise the
/// transaction is outgoing only when the main wallet shows up as a sender and
/// never as a receiver; anything else is treated as incoming.
pub fn infer_direction(
    transaction: &TransactionRecord,
    main: &str,
    counterparty: &str,
) -> Direction {
    let sent_to_counterparty = transaction.tokens_sent.iter().any(|entry| {
        same_address(entry.sender(), main) && same_address(entry.receiver(), counterparty)
    });
    let received_from_counterparty = transaction.tokens_received.iter().any(|entry| {
        same_address(entry.sender(), counterparty) && same_address(entry.receiver(), main)
    });

    match (sent_to_counterparty, received_from_counterparty) {
        (true, false) => return Direction::Outgoing,
        (false, true) => return Direction::Incoming,
        _ => {}
    }

    let main_sends = transaction
        .tokens_sent
        .iter()
        .any(|entry| same_address(entry.sender(), main));
    let main_receives = transaction
        .tokens_received
        .iter()
        .any(|entry| same_address(entry.receiver(), main));

    if main_sends && !main_receives {
        Direction::Outgoing
    } else {
        Direction::Incoming
    }
}

pub(super) fn transaction_links(
    main: &str,
    counterparty: &str,
    records: &[Arc<TransactionRecord>],
) -> Vec<TransactionLink> {
    let link_id = pair_key(main, counterparty);
    let total = records.len();

    records
        .iter()
        .enumerate()
        .map(|(index, transaction)| {
            let direction = infer_direction(transaction, main, counterparty);
            TransactionLink {
                source: main.to_owned(),
                target: counterparty.to_owned(),
                value: direction.signed(transaction.usd_volume()),
                direction,
                transaction: Arc::clone(transaction),
                transaction_index: index,
                total_transactions: total,
                link_id: link_id.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::TokenTransfer;

    fn transfer(from: &str, to: &str, value: f64) -> TokenTransfer {
        TokenTransfer {
            from_address: Some(from.to_owned()),
            to_address: Some(to.to_owned()),
            value_usd: value,
            token_symbol: None,
        }
    }

    fn transaction(sent: Vec<TokenTransfer>, received: Vec<TokenTransfer>) -> TransactionRecord {
        TransactionRecord {
            tokens_sent: sent,
            tokens_received: received,
            volume_usd: Some(75.0),
            transaction_hash: "0xhash".to_owned(),
            ..TransactionRecord::default()
        }
    }

    #[test]
    fn sent_entry_to_counterparty_is_outgoing() {
        let record = transaction(vec![transfer("0xMain", "0xCp", 75.0)], Vec::new());
        assert_eq!(infer_direction(&record, "0xmain", "0xCP"), Direction::Outgoing);

        let links = transaction_links("0xmain", "0xCP", &[Arc::new(record)]);
        assert_eq!(links[0].direction, Direction::Outgoing);
        assert_eq!(links[0].value, -75.0);
    }

    #[test]
    fn received_entry_from_counterparty_is_incoming() {
        let record = transaction(Vec::new(), vec![transfer("0xCp", "0xMain", 75.0)]);
        assert_eq!(infer_direction(&record, "0xMain", "0xCp"), Direction::Incoming);
    }

    #[test]
    fn fallback_uses_main_wallet_role() {
        let routed = transaction(vec![transfer("0xMain", "0xRouter", 75.0)], Vec::new());
        assert_eq!(infer_direction(&routed, "0xMain", "0xCp"), Direction::Outgoing);

        let swapped = transaction(
            vec![transfer("0xMain", "0xRouter", 75.0)],
            vec![transfer("0xRouter", "0xMain", 74.0)],
        );
        assert_eq!(infer_direction(&swapped, "0xMain", "0xCp"), Direction::Incoming);
    }

    #[test]
    fn conflicting_or_missing_addresses_default_to_incoming() {
        let conflicting = transaction(
            vec![transfer("0xMain", "0xCp", 75.0)],
            vec![transfer("0xCp", "0xMain", 75.0)],
        );
        assert_eq!(infer_direction(&conflicting, "0xMain", "0xCp"), Direction::Incoming);

        let empty = transaction(vec![TokenTransfer::default()], Vec::new());
        assert_eq!(infer_direction(&empty, "0xMain", "0xCp"), Direction::Incoming);
    }

    #[test]
    fn inference_is_deterministic() {
        let record = transaction(
            vec![transfer("0xMain", "0xOther", 10.0)],
            vec![transfer("0xCp", "0xElse", 10.0)],
        );
        let first = infer_direction(&record, "0xMain", "0xCp");
        for _ in 0..8 {
            assert_eq!(infer_direction(&record.clone(), "0xMain", "0xCp"), first);
        }
    }
}
