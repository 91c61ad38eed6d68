mod direction;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::flow::{DataSource, FetchError, FlowLink, Timeframe, TransactionRecord, pair_key};
use crate::util::same_address;

pub use direction::infer_direction;
use direction::transaction_links;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToggleRequest {
    Collapsed,
    Fetching,
    AlreadyFetching,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ToggleResult {
    Expanded(usize),
    Collapsed,
    Error(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExpansionOutcome {
    Expanded { pair: String, count: usize },
    Empty { pair: String },
    Failed { pair: String, error: FetchError },
    Discarded { pair: String },
}

impl ExpansionOutcome {
    pub fn pair(&self) -> &str {
        match self {
            Self::Expanded { pair, .. }
            | Self::Empty { pair }
            | Self::Failed { pair, .. }
            | Self::Discarded { pair } => pair,
        }
    }

    pub fn changed_links(&self) -> bool {
        matches!(self, Self::Expanded { .. })
    }

    fn into_toggle_result(self) -> ToggleResult {
        match self {
            Self::Expanded { count, .. } => ToggleResult::Expanded(count),
            Self::Empty { pair } => {
                ToggleResult::Error(format!("no transactions found for {pair}"))
            }
            Self::Failed { error, .. } => ToggleResult::Error(error.to_string()),
            Self::Discarded { pair } => {
                ToggleResult::Error(format!("expansion of {pair} was cancelled"))
            }
        }
    }
}

struct ExpandedPair {
    main: String,
    counterparty: String,
    records: Vec<Arc<TransactionRecord>>,
}

struct PendingFetch {
    ticket: u64,
    main: String,
    /// Cancelled while in flight; the entry stays until the worker reports back.
    stale: bool,
}

struct FetchMessage {
    ticket: u64,
    main: String,
    counterparty: String,
    result: Result<Vec<TransactionRecord>, FetchError>,
}

/// Per-pair expansion state, fed by background fetches.
///
/// Fetch workers only send messages; every mutation happens on the owner's
/// thread inside [`ExpansionStore::poll`].
pub struct ExpansionStore {
    source: Arc<dyn DataSource>,
    timeframe: Timeframe,
    expanded: HashMap<String, ExpandedPair>,
    pending: HashMap<String, PendingFetch>,
    next_ticket: u64,
    in_flight: usize,
    revision: u64,
    tx: Sender<FetchMessage>,
    rx: Receiver<FetchMessage>,
}

impl ExpansionStore {
    pub fn new(source: Arc<dyn DataSource>, timeframe: Timeframe) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            source,
            timeframe,
            expanded: HashMap::new(),
            pending: HashMap::new(),
            next_ticket: 0,
            in_flight: 0,
            revision: 0,
            tx,
            rx,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_expanded(&self, main: &str, counterparty: &str) -> bool {
        self.expanded.contains_key(&pair_key(main, counterparty))
    }

    pub fn is_fetching(&self, main: &str, counterparty: &str) -> bool {
        self.pending.contains_key(&pair_key(main, counterparty))
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight > 0
    }

    pub fn expanded_count(&self) -> usize {
        self.expanded.len()
    }

    pub fn transactions(
        &self,
        main: &str,
        counterparty: &str,
    ) -> Option<&[Arc<TransactionRecord>]> {
        self.expanded
            .get(&pair_key(main, counterparty))
            .map(|pair| pair.records.as_slice())
    }

    pub fn toggle(&mut self, main: &str, counterparty: &str) -> ToggleRequest {
        let key = pair_key(main, counterparty);
        if self.expanded.remove(&key).is_some() {
            self.revision += 1;
            log::debug!("collapsed {key}");
            return ToggleRequest::Collapsed;
        }

        if self.pending.contains_key(&key) {
            log::debug!("ignoring toggle for {key}: fetch already in flight");
            return ToggleRequest::AlreadyFetching;
        }

        let ticket = self.register(&key, main);
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        let timeframe = self.timeframe;
        let main = main.to_owned();
        let counterparty = counterparty.to_owned();
        self.in_flight += 1;

        log::debug!("fetching transactions for {key} ({})", timeframe.label());
        thread::spawn(move || {
            let result = source.fetch_transactions_between(&main, &counterparty, timeframe);
            let _ = tx.send(FetchMessage {
                ticket,
                main,
                counterparty,
                result,
            });
        });

        ToggleRequest::Fetching
    }

    pub fn toggle_blocking(&mut self, main: &str, counterparty: &str) -> ToggleResult {
        let key = pair_key(main, counterparty);
        if self.expanded.remove(&key).is_some() {
            self.revision += 1;
            return ToggleResult::Collapsed;
        }

        if self.pending.contains_key(&key) {
            return ToggleResult::Error(format!("a fetch for {key} is already in flight"));
        }

        let ticket = self.register(&key, main);
        let result = self
            .source
            .fetch_transactions_between(main, counterparty, self.timeframe);
        self.reduce(FetchMessage {
            ticket,
            main: main.to_owned(),
            counterparty: counterparty.to_owned(),
            result,
        })
        .into_toggle_result()
    }

    pub fn poll(&mut self) -> Vec<ExpansionOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            outcomes.push(self.reduce(message));
        }
        outcomes
    }

    pub fn wait(&mut self, timeout: Duration) -> Vec<ExpansionOutcome> {
        let deadline = Instant::now() + timeout;
        let mut outcomes = self.poll();

        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match self.rx.recv_timeout(remaining) {
                Ok(message) => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    outcomes.push(self.reduce(message));
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        outcomes
    }

    /// Drops expansions owned by `main`. Its in-flight fetches stay pending
    /// until they report back, so the pair cannot be fetched twice at once.
    pub fn remove_main(&mut self, main: &str) {
        let before = self.expanded.len();
        self.expanded.retain(|_, pair| !same_address(&pair.main, main));
        if self.expanded.len() != before {
            self.revision += 1;
        }

        for (key, fetch) in &mut self.pending {
            if !fetch.stale && same_address(&fetch.main, main) {
                log::debug!("cancelling in-flight fetch for {key}");
                fetch.stale = true;
            }
        }
    }

    pub fn set_timeframe(&mut self, timeframe: Timeframe) {
        if self.timeframe == timeframe {
            return;
        }

        self.timeframe = timeframe;
        for fetch in self.pending.values_mut() {
            fetch.stale = true;
        }
        if !self.expanded.is_empty() {
            self.expanded.clear();
            self.revision += 1;
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn project(
        &self,
        aggregated: &[FlowLink],
        index_by_id: &HashMap<String, usize>,
    ) -> Vec<FlowLink> {
        if self.expanded.is_empty() {
            return aggregated.to_vec();
        }

        let mut substituted = HashSet::new();
        let mut links = Vec::with_capacity(aggregated.len());
        for link in aggregated {
            let FlowLink::Aggregated(aggregate) = link else {
                links.push(link.clone());
                continue;
            };

            let key = aggregate.key();
            let Some(pair) = self.expanded.get(&key) else {
                links.push(link.clone());
                continue;
            };

            if !index_by_id.contains_key(&pair.main)
                || !index_by_id.contains_key(&pair.counterparty)
            {
                links.push(link.clone());
                continue;
            }

            if substituted.insert(key) {
                links.extend(
                    transaction_links(&pair.main, &pair.counterparty, &pair.records)
                        .into_iter()
                        .map(FlowLink::Transaction),
                );
            }
        }
        links
    }

    fn register(&mut self, key: &str, main: &str) -> u64 {
        self.next_ticket += 1;
        self.pending.insert(
            key.to_owned(),
            PendingFetch {
                ticket: self.next_ticket,
                main: main.to_owned(),
                stale: false,
            },
        );
        self.next_ticket
    }

    fn reduce(&mut self, message: FetchMessage) -> ExpansionOutcome {
        let pair = pair_key(&message.main, &message.counterparty);
        let Some(fetch) = self
            .pending
            .get(&pair)
            .filter(|fetch| fetch.ticket == message.ticket)
        else {
            log::debug!("discarding unexpected transactions for {pair}");
            return ExpansionOutcome::Discarded { pair };
        };
        let stale = fetch.stale;
        self.pending.remove(&pair);
        if stale {
            log::debug!("discarding stale transactions for {pair}");
            return ExpansionOutcome::Discarded { pair };
        }

        match message.result {
            Ok(records) if records.is_empty() => {
                log::info!("no transactions found for {pair}");
                ExpansionOutcome::Empty { pair }
            }
            Ok(records) => {
                let count = records.len();
                self.expanded.insert(
                    pair.clone(),
                    ExpandedPair {
                        main: message.main,
                        counterparty: message.counterparty,
                        records: records.into_iter().map(Arc::new).collect(),
                    },
                );
                self.revision += 1;
                log::info!("expanded {pair} into {count} transactions");
                ExpansionOutcome::Expanded { pair, count }
            }
            Err(error) => {
                log::warn!("failed to fetch transactions for {pair}: {error}");
                ExpansionOutcome::Failed { pair, error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::flow::{
        AggregatedLink, CounterpartyRecord, Direction, FixtureSource, TokenTransfer,
    };

    const WAIT: Duration = Duration::from_secs(5);

    fn tx(hash: &str, from: &str, to: &str, volume: f64) -> TransactionRecord {
        TransactionRecord {
            tokens_sent: vec![TokenTransfer {
                from_address: Some(from.to_owned()),
                to_address: Some(to.to_owned()),
                value_usd: volume,
                token_symbol: None,
            }],
            volume_usd: Some(volume),
            transaction_hash: hash.to_owned(),
            ..TransactionRecord::default()
        }
    }

    fn aggregated(main: &str, counterparty: &str, value: f64) -> FlowLink {
        FlowLink::Aggregated(AggregatedLink {
            source: main.to_owned(),
            target: counterparty.to_owned(),
            value,
        })
    }

    fn index(ids: &[&str]) -> HashMap<String, usize> {
        ids.iter()
            .enumerate()
            .map(|(index, id)| ((*id).to_owned(), index))
            .collect()
    }

    fn fixture() -> Arc<FixtureSource> {
        Arc::new(
            FixtureSource::new()
                .with_transactions(
                    "0xA",
                    "0xC",
                    vec![
                        tx("0x1", "0xA", "0xC", 10.0),
                        tx("0x2", "0xC", "0xA", 20.0),
                        tx("0x3", "0xA", "0xC", 30.0),
                    ],
                )
                .with_transactions("0xA", "0xE", Vec::new()),
        )
    }

    /// Source whose fetches block until the test releases them.
    struct GatedSource {
        gate: Mutex<Receiver<()>>,
        calls: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl DataSource for GatedSource {
        fn fetch_counterparties(
            &self,
            _address: &str,
            _timeframe: Timeframe,
        ) -> Result<Vec<CounterpartyRecord>, FetchError> {
            Ok(Vec::new())
        }

        fn fetch_transactions_between(
            &self,
            main: &str,
            counterparty: &str,
            _timeframe: Timeframe,
        ) -> Result<Vec<TransactionRecord>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            let _ = self.gate.lock().unwrap().recv();
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![tx("0xg", main, counterparty, 5.0)])
        }
    }

    fn gated() -> (Arc<GatedSource>, Sender<()>) {
        let (release, gate) = mpsc::channel();
        let source = Arc::new(GatedSource {
            gate: Mutex::new(gate),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        (source, release)
    }

    #[test]
    fn expanding_three_transactions_yields_three_links() {
        let mut store = ExpansionStore::new(fixture(), Timeframe::Month);
        assert_eq!(store.toggle("0xA", "0xC"), ToggleRequest::Fetching);
        let outcomes = store.wait(WAIT);
        assert_eq!(
            outcomes,
            vec![ExpansionOutcome::Expanded {
                pair: "0xA-0xC".to_owned(),
                count: 3
            }]
        );

        let links = store.project(
            &[aggregated("0xA", "0xC", -20.0), aggregated("0xA", "0xD", 5.0)],
            &index(&["0xA", "0xC", "0xD"]),
        );
        assert_eq!(links.len(), 4);

        let transactions = links
            .iter()
            .filter_map(FlowLink::as_transaction)
            .collect::<Vec<_>>();
        assert_eq!(transactions.len(), 3);
        for (expected_index, link) in transactions.iter().enumerate() {
            assert_eq!(link.link_id, "0xA-0xC");
            assert_eq!(link.transaction_index, expected_index);
            assert_eq!(link.total_transactions, 3);
        }
        assert_eq!(transactions[0].direction, Direction::Outgoing);
        assert_eq!(transactions[0].value, -10.0);
        assert_eq!(transactions[1].direction, Direction::Incoming);
        assert_eq!(transactions[1].value, 20.0);
        assert_eq!(links[3], aggregated("0xA", "0xD", 5.0));
    }

    #[test]
    fn expand_then_collapse_restores_aggregated_links() {
        let original = vec![aggregated("0xA", "0xC", -20.0), aggregated("0xA", "0xD", 5.0)];
        let nodes = index(&["0xA", "0xC", "0xD"]);
        let mut store = ExpansionStore::new(fixture(), Timeframe::Month);

        assert_eq!(store.toggle_blocking("0xA", "0xC"), ToggleResult::Expanded(3));
        assert_ne!(store.project(&original, &nodes), original);
        assert_eq!(store.toggle_blocking("0xA", "0xC"), ToggleResult::Collapsed);
        assert_eq!(store.project(&original, &nodes), original);
    }

    #[test]
    fn duplicate_aggregated_links_are_substituted_once() {
        let mut store = ExpansionStore::new(fixture(), Timeframe::Month);
        store.toggle_blocking("0xA", "0xC");

        let links = store.project(
            &[aggregated("0xA", "0xC", -20.0), aggregated("0xA", "0xC", -20.0)],
            &index(&["0xA", "0xC"]),
        );
        assert_eq!(links.len(), 3);
    }

    #[test]
    fn empty_and_failed_fetches_leave_state_untouched() {
        let mut store = ExpansionStore::new(fixture(), Timeframe::Month);
        let revision = store.revision();

        match store.toggle_blocking("0xA", "0xE") {
            ToggleResult::Error(message) => assert!(message.contains("no transactions")),
            other => panic!("unexpected result {other:?}"),
        }
        match store.toggle_blocking("0xA", "0xMissing") {
            ToggleResult::Error(message) => assert!(message.contains("404")),
            other => panic!("unexpected result {other:?}"),
        }

        assert_eq!(store.expanded_count(), 0);
        assert_eq!(store.revision(), revision);
        assert!(!store.is_fetching("0xA", "0xE"));
    }

    #[test]
    fn second_toggle_while_fetching_is_ignored() {
        let (source, release) = gated();
        let mut store = ExpansionStore::new(source.clone(), Timeframe::Month);

        assert_eq!(store.toggle("0xA", "0xC"), ToggleRequest::Fetching);
        assert_eq!(store.toggle("0xA", "0xC"), ToggleRequest::AlreadyFetching);
        assert!(store.is_fetching("0xA", "0xC"));

        release.send(()).unwrap();
        let outcomes = store.wait(WAIT);
        assert_eq!(outcomes.len(), 1);
        assert!(store.is_expanded("0xA", "0xC"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn toggles_on_different_pairs_do_not_interfere() {
        let (source, release) = gated();
        let mut store = ExpansionStore::new(source.clone(), Timeframe::Month);

        assert_eq!(store.toggle("0xA", "0xC"), ToggleRequest::Fetching);
        assert_eq!(store.toggle("0xB", "0xC"), ToggleRequest::Fetching);
        release.send(()).unwrap();
        release.send(()).unwrap();
        store.wait(WAIT);

        assert!(store.is_expanded("0xA", "0xC"));
        assert!(store.is_expanded("0xB", "0xC"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn results_for_removed_main_are_discarded() {
        let (source, release) = gated();
        let mut store = ExpansionStore::new(source, Timeframe::Month);

        store.toggle("0xA", "0xC");
        store.remove_main("0xA");
        assert!(store.is_fetching("0xA", "0xC"));

        release.send(()).unwrap();
        let outcomes = store.wait(WAIT);
        assert_eq!(
            outcomes,
            vec![ExpansionOutcome::Discarded {
                pair: "0xA-0xC".to_owned()
            }]
        );
        assert!(!store.is_expanded("0xA", "0xC"));
        assert!(!store.is_fetching("0xA", "0xC"));
    }

    #[test]
    fn cancelled_fetch_blocks_a_second_fetch_until_it_reports() {
        let (source, release) = gated();
        let mut store = ExpansionStore::new(source.clone(), Timeframe::Month);

        assert_eq!(store.toggle("0xA", "0xC"), ToggleRequest::Fetching);
        store.set_timeframe(Timeframe::Week);
        assert_eq!(store.toggle("0xA", "0xC"), ToggleRequest::AlreadyFetching);
        assert!(matches!(
            store.toggle_blocking("0xA", "0xC"),
            ToggleResult::Error(_)
        ));

        release.send(()).unwrap();
        let outcomes = store.wait(WAIT);
        assert!(matches!(outcomes[..], [ExpansionOutcome::Discarded { .. }]));
        assert!(!store.is_expanded("0xA", "0xC"));

        assert_eq!(store.toggle("0xA", "0xC"), ToggleRequest::Fetching);
        release.send(()).unwrap();
        store.wait(WAIT);
        assert!(store.is_expanded("0xA", "0xC"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_and_readded_main_waits_for_the_cancelled_fetch() {
        let (source, release) = gated();
        let mut store = ExpansionStore::new(source.clone(), Timeframe::Month);

        store.toggle("0xA", "0xC");
        store.remove_main("0xA");
        assert_eq!(store.toggle("0xA", "0xC"), ToggleRequest::AlreadyFetching);

        release.send(()).unwrap();
        store.wait(WAIT);
        assert_eq!(store.toggle("0xA", "0xC"), ToggleRequest::Fetching);
        release.send(()).unwrap();
        store.wait(WAIT);

        assert!(store.is_expanded("0xA", "0xC"));
        assert_eq!(source.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removing_main_drops_its_expansions() {
        let mut store = ExpansionStore::new(fixture(), Timeframe::Month);
        store.toggle_blocking("0xA", "0xC");
        assert!(store.is_expanded("0xA", "0xC"));

        store.remove_main("0xA");
        assert_eq!(store.expanded_count(), 0);
    }

    #[test]
    fn changing_timeframe_clears_expansions() {
        let mut store = ExpansionStore::new(fixture(), Timeframe::Month);
        store.toggle_blocking("0xA", "0xC");

        store.set_timeframe(Timeframe::Month);
        assert_eq!(store.expanded_count(), 1);
        store.set_timeframe(Timeframe::Week);
        assert_eq!(store.expanded_count(), 0);
        assert_eq!(store.timeframe(), Timeframe::Week);
    }
}
