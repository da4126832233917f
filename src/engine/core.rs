// 12.0 engine/core.rs: main settlement engine. holds all books, balances,
// positions, the fee cache and the insurance fund.

use crate::book::OrderBook;
use crate::config::EngineConfig;
use crate::events::{Event, EventId, EventPayload};
use crate::fee_cache::FeeCache;
use crate::fees::FeeKind;
use crate::insurance::InsuranceFund;
use crate::order::MarketKey;
use crate::position::PositionStore;
use crate::queue::IntakeQueue;
use crate::registry::{ContractPricing, ContractRegistry, ContractSpec};
use crate::tally::TallyStore;
use crate::trade::{TradeHistory, VolumeIndex};
use crate::types::{Address, Amount, AssetId, BlockHeight, ContractId, TxId};
use std::collections::BTreeMap;

/** 12.1: main engine struct. all consensus state lives here */
#[derive(Debug)]
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) tally: TallyStore,
    pub(super) positions: PositionStore,
    pub(super) fee_cache: FeeCache,
    pub(super) insurance: InsuranceFund,
    pub(super) registry: ContractRegistry,
    pub(super) books: BTreeMap<MarketKey, OrderBook>,
    pub(super) queue: IntakeQueue,
    pub(super) history: TradeHistory,
    pub(super) volume: VolumeIndex,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) current_block: BlockHeight,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            tally: TallyStore::new(),
            positions: PositionStore::new(),
            fee_cache: FeeCache::new(),
            insurance: InsuranceFund::new(),
            registry: ContractRegistry::new(),
            books: BTreeMap::new(),
            queue: IntakeQueue::new(),
            history: TradeHistory::new(),
            volume: VolumeIndex::new(),
            events: Vec::new(),
            next_event_id: 1,
            current_block: BlockHeight(0),
        }
    }

    pub fn set_block(&mut self, block: BlockHeight) {
        self.current_block = block;
    }

    pub fn block(&self) -> BlockHeight {
        self.current_block
    }

    pub fn register_contract(&mut self, spec: ContractSpec) -> ContractId {
        let id = self.registry.register(spec);
        self.books
            .entry(MarketKey::Contract(id))
            .or_insert_with(|| OrderBook::new(MarketKey::Contract(id)));
        id
    }

    pub fn add_spot_market(&mut self, a: AssetId, b: AssetId) -> MarketKey {
        let key = MarketKey::Spot(a, b);
        self.books.entry(key).or_insert_with(|| OrderBook::new(key));
        key
    }

    pub fn book(&self, market: MarketKey) -> Option<&OrderBook> {
        self.books.get(&market)
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    pub fn tally(&self) -> &TallyStore {
        &self.tally
    }

    pub fn positions(&self) -> &PositionStore {
        &self.positions
    }

    pub fn fee_cache(&self) -> &FeeCache {
        &self.fee_cache
    }

    pub fn insurance(&self) -> &InsuranceFund {
        &self.insurance
    }

    pub fn history(&self) -> &TradeHistory {
        &self.history
    }

    pub fn volume(&self) -> &VolumeIndex {
        &self.volume
    }

    pub fn pending_orders(&self) -> usize {
        self.queue.pending_count()
    }

    pub fn deposit(
        &mut self,
        address: &Address,
        asset: AssetId,
        amount: Amount,
        txid: &TxId,
    ) -> Result<(), crate::tally::LedgerError> {
        let block = self.current_block;
        self.tally.credit_available(address, asset, amount, block, txid)
    }

    pub fn fund_insurance(&mut self, asset: AssetId, amount: Amount) {
        self.insurance.deposit(asset, amount, self.current_block);
    }

    /// Revenue split kind for a market, derived from the registry.
    pub(super) fn fee_kind(&self, market: MarketKey) -> FeeKind {
        match market {
            MarketKey::Spot(_, _) => FeeKind::Spot,
            MarketKey::Contract(id) => match self.registry.get(id).map(|s| s.pricing) {
                Some(ContractPricing::Native) => FeeKind::NativeContract,
                _ => FeeKind::OracleContract,
            },
        }
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_block, payload);
        self.next_event_id += 1;

        if self.config.verbose {
            println!("[Event {}] {:?}", event.id.0, event.payload);
        }

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}
