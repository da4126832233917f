// 1.0: all the primitives live here. nothing in the engine works without these types.
// addresses, asset/contract ids, block heights, fixed-point amounts. each is a newtype
// so the compiler catches type mixups between asset units, prices, and contract counts.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// Fractional digits carried by every balance, price, and fee amount.
pub const AMOUNT_SCALE: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractId(pub u32);

// 1.1: sender address. compared canonically (see queue.rs), stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId(pub String);

impl TxId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockHeight(pub u64);

impl BlockHeight {
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Buy = bid side of the book. Sell = ask side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

// 1.2: fixed-point amount, 8 fractional digits, exact satoshi-equivalent units.
// balances, fees, margin, and pnl all use this. no floating point anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    /// Normalizes to 8 fractional digits, rounding half up. The spot price
    /// computation (`offered / expected`) relies on this rounding mode.
    pub fn new(value: Decimal) -> Self {
        Self(value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn from_sats(sats: i64) -> Self {
        Self(Decimal::new(sats, AMOUNT_SCALE))
    }

    /// Exact integer satoshis. A fractional-satoshi amount here is a consensus
    /// divergence risk, so it fails loudly rather than rounding.
    pub fn to_sats(&self) -> i64 {
        let scaled = self.0 * Decimal::from(100_000_000u64);
        assert!(
            scaled.fract().is_zero(),
            "fractional satoshi amount: {}",
            self.0
        );
        scaled.to_i64().expect("satoshi amount out of i64 range")
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn add(&self, other: Amount) -> Self {
        Self(self.0 + other.0)
    }

    pub fn sub(&self, other: Amount) -> Self {
        Self(self.0 - other.0)
    }

    pub fn mul(&self, factor: Decimal) -> Self {
        Self::new(self.0 * factor)
    }

    pub fn min(&self, other: Amount) -> Self {
        Self(self.0.min(other.0))
    }

    pub fn negate(&self) -> Self {
        Self(-self.0)
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Amount {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, a| acc.add(a))
    }
}

// 1.3: limit price, units of the offered asset per unit expected. must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value.round_dp_with_strategy(
                AMOUNT_SCALE,
                RoundingStrategy::MidpointAwayFromZero,
            )))
        } else {
            None
        }
    }

    pub fn new_unchecked(value: Decimal) -> Self {
        debug_assert!(value > Decimal::ZERO);
        Self(value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.4: signed contract count: positive = long, negative = short. core to all
// position decomposition math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedQty(Decimal);

impl SignedQty {
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn from_side(side: Side, abs_qty: Decimal) -> Self {
        Self(side.sign() * abs_qty.abs())
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn abs(&self) -> Decimal {
        self.0.abs()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_long(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn same_direction(&self, other: SignedQty) -> bool {
        self.is_zero() || other.is_zero() || (self.is_long() == other.is_long())
    }

    pub fn add(&self, delta: Decimal) -> Self {
        Self(self.0 + delta)
    }
}

impl fmt::Display for SignedQty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.5: fee rate in parts per million. 500 ppm = 5 bps. ppm instead of bps so the
// channel rebate of 2.5 bps stays an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ppm(pub u32);

impl Ppm {
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Fee in satoshis for a notional expressed in satoshis, rounded half up.
    pub fn apply_sats(&self, notional_sats: i64) -> i64 {
        let num = (notional_sats as i128) * (self.0 as i128);
        (((num + 500_000) / 1_000_000) as i64).max(0)
    }

    pub fn halved(&self) -> Self {
        Self(self.0 / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn amount_normalizes_to_eight_digits() {
        let a = Amount::new(dec!(0.123456789));
        assert_eq!(a.value(), dec!(0.12345679)); // half up on the ninth digit
    }

    #[test]
    fn amount_sats_round_trip() {
        let a = Amount::from_sats(12_345_678);
        assert_eq!(a.value(), dec!(0.12345678));
        assert_eq!(a.to_sats(), 12_345_678);
    }

    #[test]
    fn signed_qty_direction() {
        let long = SignedQty::from_side(Side::Buy, dec!(10));
        assert!(long.is_long());
        let short = SignedQty::from_side(Side::Sell, dec!(10));
        assert!(short.is_short());
        assert_eq!(short.value(), dec!(-10));
        assert!(long.same_direction(SignedQty::zero()));
        assert!(!long.same_direction(short));
    }

    #[test]
    fn ppm_fee_rounding() {
        let taker = Ppm(500); // 5 bps
        assert_eq!(taker.apply_sats(1_000_000), 500);
        assert_eq!(taker.apply_sats(999), 0); // 0.4995 stays below the midpoint
        assert_eq!(taker.apply_sats(1_000), 1); // exactly 0.5 rounds up
    }

    #[test]
    fn price_rounds_half_up() {
        // 10 offered / 3 expected
        let p = Price::new_unchecked(dec!(10) / dec!(3));
        assert_eq!(p.value(), dec!(3.33333333));
    }
}
