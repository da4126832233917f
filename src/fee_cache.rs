// 6.0: fee cache. per-(asset, market) accrual rows splitting taker revenue into
// recognized protocol revenue ("value") and amounts pending buyback ("stash").
// mutated only by the fee accrual path in fees.rs.

use crate::order::MarketKey;
use crate::types::{Amount, AssetId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeeCacheRow {
    /// Revenue already recognized: native-contract and spot taker fees net of
    /// the insurance cut.
    pub value: Amount,
    /// Oracle-contract revenue held pending a future buyback.
    pub stash: Amount,
}

#[derive(Debug, Clone, Default)]
pub struct FeeCache {
    rows: BTreeMap<(AssetId, MarketKey), FeeCacheRow>,
}

impl FeeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, asset: AssetId, market: MarketKey) -> FeeCacheRow {
        self.rows.get(&(asset, market)).cloned().unwrap_or_default()
    }

    pub fn credit_value(&mut self, asset: AssetId, market: MarketKey, amount: Amount) {
        debug_assert!(!amount.is_negative());
        let row = self.rows.entry((asset, market)).or_default();
        row.value = row.value.add(amount);
    }

    pub fn credit_stash(&mut self, asset: AssetId, market: MarketKey, amount: Amount) {
        debug_assert!(!amount.is_negative());
        let row = self.rows.entry((asset, market)).or_default();
        row.stash = row.stash.add(amount);
    }

    /// Everything accrued for one asset across all markets. Conservation
    /// checks sum this against the insurance fund and tallies.
    pub fn asset_total(&self, asset: AssetId) -> Amount {
        self.rows
            .iter()
            .filter(|((a, _), _)| *a == asset)
            .map(|(_, row)| row.value.add(row.stash))
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(AssetId, MarketKey), &FeeCacheRow)> {
        self.rows.iter()
    }
}
