// 5.0: position tracking and fill decomposition.
// 5.1 decompose() splits a fill into closed / flipped / opened before anything
// mutates: those three quantities pick which of the three margin paths runs
// (pure-open, pure-close, flip). 5.2 has the linear and inverse pnl formulas.

use crate::types::{Address, Amount, ContractId, Price, SignedQty};
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub address: Address,
    pub contract: ContractId,
    /// Signed contract count: positive = long.
    pub contracts: SignedQty,
    /// Volume-weighted entry price. None while flat.
    pub avg_price: Option<Price>,
    /// Collateral held against the open contracts.
    pub margin: Amount,
    /// Cumulative realized PnL, signed.
    pub realized_pnl: Amount,
}

impl Position {
    pub fn flat(address: Address, contract: ContractId) -> Self {
        Self {
            address,
            contract,
            contracts: SignedQty::zero(),
            avg_price: None,
            margin: Amount::zero(),
            realized_pnl: Amount::zero(),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.contracts.is_zero()
    }
}

/// A fill split into its mutually exclusive components. Exactly one of three
/// shapes holds: all opened (same direction), all closed (opposite, smaller),
/// or closed-then-flipped (opposite, larger).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decomposition {
    /// Contracts closing existing exposure. PnL realizes on these.
    pub closed: Decimal,
    /// Contracts opening fresh exposure in the opposite direction. These need
    /// fresh margin: a flip is a new position, not a continuation.
    pub flipped: Decimal,
    /// Contracts extending the existing direction.
    pub opened: Decimal,
    pub new_contracts: SignedQty,
}

// 5.1: runs before any margin or pnl mutation, identically for both sides of a
// match with the sign flipped.
pub fn decompose(existing: SignedQty, delta: SignedQty) -> Decomposition {
    if delta.is_zero() {
        return Decomposition {
            closed: Decimal::ZERO,
            flipped: Decimal::ZERO,
            opened: Decimal::ZERO,
            new_contracts: existing,
        };
    }

    if existing.same_direction(delta) {
        return Decomposition {
            closed: Decimal::ZERO,
            flipped: Decimal::ZERO,
            opened: delta.abs(),
            new_contracts: existing.add(delta.value()),
        };
    }

    let closed = existing.abs().min(delta.abs());
    let flipped = delta.abs() - closed;
    let new_contracts = if flipped.is_zero() {
        SignedQty::new(existing.value() + delta.value())
    } else {
        SignedQty::new(delta.value().signum() * flipped)
    };

    Decomposition {
        closed,
        flipped,
        opened: Decimal::ZERO,
        new_contracts,
    }
}

// 5.2: pnl in the collateral asset for a closed leg. `was_long` is the
// direction of the leg being closed, not of the incoming fill.
pub fn realized_pnl(
    closed: Decimal,
    was_long: bool,
    avg_price: Price,
    trade_price: Price,
    notional_per_contract: Decimal,
    inverse: bool,
) -> Amount {
    let raw = if inverse {
        closed
            * notional_per_contract
            * (Decimal::ONE / avg_price.value() - Decimal::ONE / trade_price.value())
    } else {
        closed * notional_per_contract * (trade_price.value() - avg_price.value())
    };
    let signed = if was_long { raw } else { -raw };
    Amount::new(signed)
}

/// Volume-weighted entry price after extending a position.
pub fn weighted_entry(
    existing_abs: Decimal,
    existing_avg: Option<Price>,
    opened: Decimal,
    fill_price: Price,
) -> Price {
    match existing_avg {
        Some(avg) if !existing_abs.is_zero() => {
            let weighted =
                existing_abs * avg.value() + opened * fill_price.value();
            Price::new_unchecked(weighted / (existing_abs + opened))
        }
        _ => fill_price,
    }
}

// 5.3: position store. one writer per block; mutation only through the
// settlement pipeline, never direct field pokes from outside.
#[derive(Debug, Clone, Default)]
pub struct PositionStore {
    positions: BTreeMap<(Address, ContractId), Position>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &Address, contract: ContractId) -> Position {
        self.positions
            .get(&(address.clone(), contract))
            .cloned()
            .unwrap_or_else(|| Position::flat(address.clone(), contract))
    }

    pub fn write(&mut self, position: Position) {
        self.positions
            .insert((position.address.clone(), position.contract), position);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Net contracts across all addresses for one contract id. Longs and
    /// shorts mirror each other, so this stays zero.
    pub fn net_contracts(&self, contract: ContractId) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.contract == contract)
            .map(|p| p.contracts.value())
            .sum()
    }
}
