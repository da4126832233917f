//! Per-asset insurance fund. This core only deposits (the fee accrual cut and
//! nothing else); draws for liquidation shortfall are escalated upward to the
//! liquidation layer, which is an external collaborator.

use crate::types::{Amount, AssetId, BlockHeight};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InsuranceDeposit {
    pub asset: AssetId,
    pub amount: Amount,
    pub block: BlockHeight,
}

#[derive(Debug, Clone, Default)]
pub struct InsuranceFund {
    balances: BTreeMap<AssetId, Amount>,
    deposits: Vec<InsuranceDeposit>,
}

impl InsuranceFund {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&mut self, asset: AssetId, amount: Amount, block: BlockHeight) {
        debug_assert!(!amount.is_negative());
        if amount.is_zero() {
            return;
        }
        let balance = self.balances.entry(asset).or_default();
        *balance = balance.add(amount);
        self.deposits.push(InsuranceDeposit { asset, amount, block });
    }

    pub fn balance(&self, asset: AssetId) -> Amount {
        self.balances.get(&asset).copied().unwrap_or_default()
    }

    pub fn deposits(&self) -> &[InsuranceDeposit] {
        &self.deposits
    }
}
