//! Collateral movement for opening and closing contract legs.
//!
//! Opening (or flipping) reserves `im_per_contract * quantity` out of
//! available. When available cannot cover it, the requested quantity shrinks
//! by the shortfall instead of failing the match: the book side has already
//! partially executed, so a partial fill beats a dead transaction. Closing
//! releases margin proportionally, capped at what the position actually holds.

use crate::tally::{BalanceReason, LedgerError, TallyStore};
use crate::types::{Address, Amount, AssetId, BlockHeight, TxId};
use rust_decimal::Decimal;

pub fn required_margin(im_per_contract: Amount, quantity: Decimal) -> Amount {
    im_per_contract.mul(quantity)
}

/// Outcome of sizing an opening leg against the payer's available balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizedLeg {
    pub quantity: Decimal,
    pub margin: Amount,
    /// Contracts dropped because available could not cover them.
    pub shrunk_by: Decimal,
}

// shrink = ceil(shortfall / im_per_contract); never fails, never goes negative.
pub fn size_opening_leg(
    im_per_contract: Amount,
    quantity: Decimal,
    available: Amount,
) -> SizedLeg {
    if im_per_contract.is_zero() || quantity.is_zero() {
        return SizedLeg {
            quantity,
            margin: Amount::zero(),
            shrunk_by: Decimal::ZERO,
        };
    }

    let required = required_margin(im_per_contract, quantity);
    if available >= required {
        return SizedLeg {
            quantity,
            margin: required,
            shrunk_by: Decimal::ZERO,
        };
    }

    let shortfall = required.sub(available);
    let shrink = (shortfall.value() / im_per_contract.value()).ceil();
    let kept = (quantity - shrink).max(Decimal::ZERO);
    SizedLeg {
        quantity: kept,
        margin: required_margin(im_per_contract, kept),
        shrunk_by: quantity - kept,
    }
}

/// Moves an opening leg's margin out of available.
pub fn reserve(
    tally: &mut TallyStore,
    address: &Address,
    asset: AssetId,
    margin: Amount,
    block: BlockHeight,
    txid: &TxId,
) -> Result<(), LedgerError> {
    if margin.is_zero() {
        return Ok(());
    }
    tally.update_balance(
        address,
        asset,
        margin.negate(),
        Amount::zero(),
        margin,
        Amount::zero(),
        BalanceReason::MarginReserve,
        block,
        txid,
    )
}

/// Releases a closing leg's margin back to available. The caller has already
/// capped `release` at the position's held margin (fee subtracted first when
/// the fee was served from the margin bucket).
pub fn release(
    tally: &mut TallyStore,
    address: &Address,
    asset: AssetId,
    release: Amount,
    block: BlockHeight,
    txid: &TxId,
) -> Result<(), LedgerError> {
    if release.is_zero() {
        return Ok(());
    }
    tally.update_balance(
        address,
        asset,
        release,
        Amount::zero(),
        release.negate(),
        Amount::zero(),
        BalanceReason::MarginRelease,
        block,
        txid,
    )
}

/// Margin to free for `closed` contracts: proportional, capped at held margin.
pub fn release_for_close(
    im_per_contract: Amount,
    closed: Decimal,
    held_margin: Amount,
) -> Amount {
    required_margin(im_per_contract, closed).min(held_margin)
}
