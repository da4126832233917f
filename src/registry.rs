// 3.0: contract registry. static per-contract parameters the settlement pipeline
// reads but never writes: collateral asset, inverse/linear formula choice,
// notional per contract, initial margin fraction, native vs oracle pricing.

use crate::types::{Amount, AssetId, ContractId, Price};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a contract settles against on-chain collateral (native) or an
/// oracle-published price. Decides the fee accrual split: oracle revenue is
/// stashed for buyback, native revenue is recognized directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractPricing {
    Native,
    Oracle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSpec {
    pub id: ContractId,
    pub name: String,
    /// Asset margin, fees, and PnL are denominated in.
    pub collateral: AssetId,
    /// Fixed unit-of-account value each contract represents.
    pub notional_per_contract: Decimal,
    /// Reciprocal-price PnL formula when true.
    pub inverse: bool,
    pub pricing: ContractPricing,
    /// Fraction of notional reserved as initial margin per contract.
    pub init_margin_fraction: Decimal,
}

/// Per-contract notional at a given trade price, in collateral units.
#[derive(Debug, Clone, Copy)]
pub struct Notional {
    pub notional_value: Amount,
    pub notional_per_contract: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    specs: BTreeMap<ContractId, ContractSpec>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ContractSpec) -> ContractId {
        let id = spec.id;
        self.specs.insert(id, spec);
        id
    }

    pub fn get(&self, contract: ContractId) -> Option<&ContractSpec> {
        self.specs.get(&contract)
    }

    pub fn is_inverse(&self, contract: ContractId) -> bool {
        self.specs.get(&contract).map_or(false, |s| s.inverse)
    }

    pub fn collateral_id(&self, contract: ContractId) -> Option<AssetId> {
        self.specs.get(&contract).map(|s| s.collateral)
    }

    /// Collateral-denominated notional of one contract at `price`.
    /// Linear: npc * price. Inverse: npc / price.
    pub fn notional_value(&self, contract: ContractId, price: Price) -> Option<Notional> {
        let spec = self.specs.get(&contract)?;
        let per_contract = if spec.inverse {
            spec.notional_per_contract / price.value()
        } else {
            spec.notional_per_contract * price.value()
        };
        Some(Notional {
            notional_value: Amount::new(per_contract),
            notional_per_contract: spec.notional_per_contract,
        })
    }

    /// Initial margin to reserve per contract at `price`.
    pub fn initial_margin(&self, contract: ContractId, price: Price) -> Option<Amount> {
        let spec = self.specs.get(&contract)?;
        let notional = self.notional_value(contract, price)?;
        Some(notional.notional_value.mul(spec.init_margin_fraction))
    }

    /// All registered contracts settling in `collateral`, ascending by id.
    /// The cross-market leg of the loss waterfall walks this.
    pub fn contracts_for_collateral(&self, collateral: AssetId) -> Vec<ContractId> {
        self.specs
            .values()
            .filter(|s| s.collateral == collateral)
            .map(|s| s.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn linear_spec() -> ContractSpec {
        ContractSpec {
            id: ContractId(1),
            name: "ALL/LTC linear".to_string(),
            collateral: AssetId(2),
            notional_per_contract: dec!(1),
            inverse: false,
            pricing: ContractPricing::Native,
            init_margin_fraction: dec!(0.1),
        }
    }

    fn inverse_spec() -> ContractSpec {
        ContractSpec {
            id: ContractId(2),
            name: "LTC/USD inverse".to_string(),
            collateral: AssetId(2),
            notional_per_contract: dec!(10),
            inverse: true,
            pricing: ContractPricing::Oracle,
            init_margin_fraction: dec!(0.1),
        }
    }

    #[test]
    fn linear_notional_scales_with_price() {
        let mut reg = ContractRegistry::new();
        reg.register(linear_spec());
        let n = reg
            .notional_value(ContractId(1), Price::new_unchecked(dec!(20)))
            .unwrap();
        assert_eq!(n.notional_value.value(), dec!(20));
    }

    #[test]
    fn inverse_notional_is_reciprocal() {
        let mut reg = ContractRegistry::new();
        reg.register(inverse_spec());
        let n = reg
            .notional_value(ContractId(2), Price::new_unchecked(dec!(100)))
            .unwrap();
        assert_eq!(n.notional_value.value(), dec!(0.1)); // 10 / 100
    }

    #[test]
    fn initial_margin_is_fraction_of_notional() {
        let mut reg = ContractRegistry::new();
        reg.register(linear_spec());
        let im = reg
            .initial_margin(ContractId(1), Price::new_unchecked(dec!(20)))
            .unwrap();
        assert_eq!(im.value(), dec!(2)); // 20 * 0.1
    }

    #[test]
    fn contracts_for_collateral_filters() {
        let mut reg = ContractRegistry::new();
        reg.register(linear_spec());
        reg.register(inverse_spec());
        let ids = reg.contracts_for_collateral(AssetId(2));
        assert_eq!(ids, vec![ContractId(1), ContractId(2)]);
    }
}
