//! Ledger accessor: per-(address, asset) balance tallies.
//!
//! Every balance is a five-bucket tally: available, reserved, margin, vesting,
//! channel. Mutation goes through `update_balance`, which checks the
//! non-negativity invariant atomically across all deltas: a mutation that would
//! drive any bucket below zero is a fatal error for the enclosing transaction,
//! never a clamp, because a silent clamp would diverge across nodes.
//!
//! Tallies are created on first reference and never deleted; an all-zero tally
//! is a valid resting state.

use crate::types::{Address, Amount, AssetId, BlockHeight, TxId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tally {
    pub available: Amount,
    pub reserved: Amount,
    pub margin: Amount,
    pub vesting: Amount,
    pub channel: Amount,
}

impl Tally {
    pub fn total(&self) -> Amount {
        self.available
            .add(self.reserved)
            .add(self.margin)
            .add(self.vesting)
            .add(self.channel)
    }

    pub fn is_zero(&self) -> bool {
        self.total().is_zero()
    }
}

/// Why a balance moved. Recorded with every mutation for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceReason {
    Deposit,
    OrderReserve,
    OrderCancel,
    FillRelease,
    SpotSettlement,
    MarginReserve,
    MarginRelease,
    FeeDebit,
    FeeRebate,
    PnlSettlement,
    LossSourcing,
    ForcedCancel,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error(
        "invariant violation: {reason:?} for {address} asset {asset:?} would drive {bucket} below zero (txid {txid})"
    )]
    InvariantViolation {
        address: Address,
        asset: AssetId,
        bucket: &'static str,
        reason: BalanceReason,
        txid: TxId,
    },
}

/// One ledger mutation, kept for audit and replay diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub address: Address,
    pub asset: AssetId,
    pub d_available: Amount,
    pub d_reserved: Amount,
    pub d_margin: Amount,
    pub d_vesting: Amount,
    pub reason: BalanceReason,
    pub block: BlockHeight,
    pub txid: TxId,
}

// 2.0: the tally store. one logical writer per block; every read-modify-write
// re-reads the latest value inside the same step.
#[derive(Debug, Clone, Default)]
pub struct TallyStore {
    tallies: BTreeMap<(Address, AssetId), Tally>,
    journal: Vec<BalanceUpdate>,
}

impl TallyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view. Missing tallies read as all-zero without being created.
    pub fn get(&self, address: &Address, asset: AssetId) -> Tally {
        self.tallies
            .get(&(address.clone(), asset))
            .cloned()
            .unwrap_or_default()
    }

    /// Applies all deltas atomically: either every bucket stays non-negative
    /// and the whole update lands, or nothing changes.
    pub fn update_balance(
        &mut self,
        address: &Address,
        asset: AssetId,
        d_available: Amount,
        d_reserved: Amount,
        d_margin: Amount,
        d_vesting: Amount,
        reason: BalanceReason,
        block: BlockHeight,
        txid: &TxId,
    ) -> Result<(), LedgerError> {
        let current = self.get(address, asset);

        let next = Tally {
            available: current.available.add(d_available),
            reserved: current.reserved.add(d_reserved),
            margin: current.margin.add(d_margin),
            vesting: current.vesting.add(d_vesting),
            channel: current.channel,
        };

        let violation = [
            ("available", next.available),
            ("reserved", next.reserved),
            ("margin", next.margin),
            ("vesting", next.vesting),
        ]
        .into_iter()
        .find(|(_, v)| v.is_negative());

        if let Some((bucket, _)) = violation {
            return Err(LedgerError::InvariantViolation {
                address: address.clone(),
                asset,
                bucket,
                reason,
                txid: txid.clone(),
            });
        }

        self.tallies.insert((address.clone(), asset), next);
        self.journal.push(BalanceUpdate {
            address: address.clone(),
            asset,
            d_available,
            d_reserved,
            d_margin,
            d_vesting,
            reason,
            block,
            txid: txid.clone(),
        });
        Ok(())
    }

    /// Credit fresh funds into available. Entry point for the sim and tests;
    /// the real deposit path lives outside this core.
    pub fn credit_available(
        &mut self,
        address: &Address,
        asset: AssetId,
        amount: Amount,
        block: BlockHeight,
        txid: &TxId,
    ) -> Result<(), LedgerError> {
        self.update_balance(
            address,
            asset,
            amount,
            Amount::zero(),
            Amount::zero(),
            Amount::zero(),
            BalanceReason::Deposit,
            block,
            txid,
        )
    }

    pub fn journal(&self) -> &[BalanceUpdate] {
        &self.journal
    }

    /// Sum of every bucket across every tally of one asset. Conservation
    /// checks in tests lean on this.
    pub fn asset_total(&self, asset: AssetId) -> Amount {
        self.tallies
            .iter()
            .filter(|((_, a), _)| *a == asset)
            .map(|(_, t)| t.total())
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(Address, AssetId), &Tally)> {
        self.tallies.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn addr(s: &str) -> Address {
        Address::new(s)
    }

    fn tx(s: &str) -> TxId {
        TxId::new(s)
    }

    #[test]
    fn missing_tally_reads_zero() {
        let store = TallyStore::new();
        let t = store.get(&addr("alice"), AssetId(1));
        assert!(t.is_zero());
    }

    #[test]
    fn update_applies_all_deltas() {
        let mut store = TallyStore::new();
        store
            .credit_available(&addr("alice"), AssetId(1), Amount::new(dec!(100)), BlockHeight(1), &tx("t0"))
            .unwrap();
        store
            .update_balance(
                &addr("alice"),
                AssetId(1),
                Amount::new(dec!(-40)),
                Amount::new(dec!(40)),
                Amount::zero(),
                Amount::zero(),
                BalanceReason::OrderReserve,
                BlockHeight(1),
                &tx("t1"),
            )
            .unwrap();

        let t = store.get(&addr("alice"), AssetId(1));
        assert_eq!(t.available.value(), dec!(60));
        assert_eq!(t.reserved.value(), dec!(40));
        assert_eq!(t.total().value(), dec!(100));
    }

    #[test]
    fn negative_bucket_is_fatal_and_atomic() {
        let mut store = TallyStore::new();
        store
            .credit_available(&addr("bob"), AssetId(2), Amount::new(dec!(10)), BlockHeight(1), &tx("t0"))
            .unwrap();

        // would push reserved negative even though available stays fine
        let err = store.update_balance(
            &addr("bob"),
            AssetId(2),
            Amount::new(dec!(5)),
            Amount::new(dec!(-1)),
            Amount::zero(),
            Amount::zero(),
            BalanceReason::SpotSettlement,
            BlockHeight(2),
            &tx("t1"),
        );
        assert!(matches!(
            err,
            Err(LedgerError::InvariantViolation { bucket: "reserved", .. })
        ));

        // nothing moved
        let t = store.get(&addr("bob"), AssetId(2));
        assert_eq!(t.available.value(), dec!(10));
        assert_eq!(t.reserved.value(), dec!(0));
        assert_eq!(store.journal().len(), 1);
    }

    #[test]
    fn asset_total_sums_buckets() {
        let mut store = TallyStore::new();
        store
            .credit_available(&addr("a"), AssetId(1), Amount::new(dec!(3)), BlockHeight(1), &tx("t0"))
            .unwrap();
        store
            .credit_available(&addr("b"), AssetId(1), Amount::new(dec!(4)), BlockHeight(1), &tx("t1"))
            .unwrap();
        store
            .credit_available(&addr("a"), AssetId(2), Amount::new(dec!(9)), BlockHeight(1), &tx("t2"))
            .unwrap();
        assert_eq!(store.asset_total(AssetId(1)).value(), dec!(7));
        assert_eq!(store.asset_total(AssetId(2)).value(), dec!(9));
    }
}
