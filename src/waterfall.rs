// 8.0: loss-sourcing waterfall. when a settlement realizes a loss the payer
// cannot cover from available alone, funds are drained in strict order:
//   (1) available balance
//   (2) up to the margin loss cap (49%) of held margin
//   (3) reserve freed by force-cancelling the payer's resting orders on the
//       same contract
//   (4) reserve freed the same way from the payer's other contract markets
// each step consumes only the minimum still needed; a cancelled order's freed
// reserve is consumed wholesale, so a covering step may overshoot and the
// excess stays in available. an exhausted waterfall reports the remainder
// upward as a value (the liquidation/insurance layer escalates), never a
// negative balance.

use crate::book::OrderBook;
use crate::order::MarketKey;
use crate::tally::{BalanceReason, LedgerError, TallyStore};
use crate::types::{Address, Amount, AssetId, BlockHeight, ContractId, TxId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossSource {
    Available,
    Margin,
    SameMarketReserve,
    CrossMarketReserve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcedStep {
    pub source: LossSource,
    /// Funds this step made reachable.
    pub freed: Amount,
    /// Funds this step actually drained toward the loss.
    pub consumed: Amount,
}

/// Structured outcome. `remaining > 0` is the ShortfallUnrecovered condition:
/// reported, not thrown.
#[derive(Debug, Clone)]
pub struct LossSourcing {
    pub needed: Amount,
    /// Total made reachable across steps (can exceed `needed` when a forced
    /// cancellation frees more than the remainder).
    pub sourced: Amount,
    /// Total drained. `consumed + remaining == needed`.
    pub consumed: Amount,
    pub remaining: Amount,
    pub steps: Vec<SourcedStep>,
    /// Orders force-cancelled along the way.
    pub canceled: Vec<TxId>,
}

impl LossSourcing {
    /// What step 2 pulled out of the payer's margin bucket. The caller owns
    /// the position records backing that bucket and must shed the same
    /// amount from them.
    pub fn margin_drained(&self) -> Amount {
        self.steps
            .iter()
            .filter(|s| s.source == LossSource::Margin)
            .fold(Amount::zero(), |acc, s| acc.add(s.consumed))
    }
}

fn drain_available(
    tally: &mut TallyStore,
    address: &Address,
    asset: AssetId,
    want: Amount,
    block: BlockHeight,
    txid: &TxId,
) -> Result<Amount, LedgerError> {
    let have = tally.get(address, asset).available;
    let take = want.min(have);
    if take.is_positive() {
        tally.update_balance(
            address,
            asset,
            take.negate(),
            Amount::zero(),
            Amount::zero(),
            Amount::zero(),
            BalanceReason::LossSourcing,
            block,
            txid,
        )?;
    }
    Ok(take)
}

/// Frees one order's remaining reserve back to available.
fn refund_reserve(
    tally: &mut TallyStore,
    address: &Address,
    asset: AssetId,
    freed: Amount,
    block: BlockHeight,
    txid: &TxId,
) -> Result<(), LedgerError> {
    if freed.is_zero() {
        return Ok(());
    }
    tally.update_balance(
        address,
        asset,
        freed,
        freed.negate(),
        Amount::zero(),
        Amount::zero(),
        BalanceReason::ForcedCancel,
        block,
        txid,
    )
}

fn drain_reserve_by_cancelling(
    tally: &mut TallyStore,
    book: &mut OrderBook,
    address: &Address,
    asset: AssetId,
    mut remainder: Amount,
    block: BlockHeight,
    txid: &TxId,
    canceled: &mut Vec<TxId>,
) -> Result<(Amount, Amount), LedgerError> {
    let mut freed_total = Amount::zero();
    let mut consumed_total = Amount::zero();

    while remainder.is_positive() {
        let Some(order) = book.cancel_next_for(address) else {
            break;
        };
        let freed = order.remaining_reserve();
        canceled.push(order.txid.clone());
        refund_reserve(tally, address, asset, freed, block, txid)?;

        let take = remainder.min(freed);
        let drained = drain_available(tally, address, asset, take, block, txid)?;
        freed_total = freed_total.add(freed);
        consumed_total = consumed_total.add(drained);
        remainder = remainder.sub(drained);
    }

    Ok((freed_total, consumed_total))
}

// 8.1: the waterfall proper. `same_collateral` lists every contract settling in
// `asset`, ascending, so the cross-market pass walks books in the same order on
// every node.
#[allow(clippy::too_many_arguments)]
pub fn source_funds_for_loss(
    tally: &mut TallyStore,
    books: &mut BTreeMap<MarketKey, OrderBook>,
    same_collateral: &[ContractId],
    address: &Address,
    asset: AssetId,
    contract: ContractId,
    needed: Amount,
    margin_loss_cap: Decimal,
    block: BlockHeight,
    txid: &TxId,
) -> Result<LossSourcing, LedgerError> {
    let mut steps = Vec::new();
    let mut canceled = Vec::new();
    let mut remaining = needed;
    let mut sourced = Amount::zero();
    let mut consumed = Amount::zero();

    // (1) available
    if remaining.is_positive() {
        let took = drain_available(tally, address, asset, remaining, block, txid)?;
        if took.is_positive() {
            steps.push(SourcedStep {
                source: LossSource::Available,
                freed: took,
                consumed: took,
            });
            sourced = sourced.add(took);
            consumed = consumed.add(took);
            remaining = remaining.sub(took);
        }
    }

    // (2) margin, never past the cap
    if remaining.is_positive() {
        let held = tally.get(address, asset).margin;
        let cap = held.mul(margin_loss_cap);
        let take = remaining.min(cap);
        if take.is_positive() {
            tally.update_balance(
                address,
                asset,
                Amount::zero(),
                Amount::zero(),
                take.negate(),
                Amount::zero(),
                BalanceReason::LossSourcing,
                block,
                txid,
            )?;
            steps.push(SourcedStep {
                source: LossSource::Margin,
                freed: take,
                consumed: take,
            });
            sourced = sourced.add(take);
            consumed = consumed.add(take);
            remaining = remaining.sub(take);
        }
    }

    // (3) same-contract reserve
    if remaining.is_positive() {
        if let Some(book) = books.get_mut(&MarketKey::Contract(contract)) {
            let (freed, took) = drain_reserve_by_cancelling(
                tally, book, address, asset, remaining, block, txid, &mut canceled,
            )?;
            if freed.is_positive() {
                steps.push(SourcedStep {
                    source: LossSource::SameMarketReserve,
                    freed,
                    consumed: took,
                });
                sourced = sourced.add(freed);
                consumed = consumed.add(took);
                remaining = remaining.sub(took);
            }
        }
    }

    // (4) cross-contract reserve, ascending contract id
    if remaining.is_positive() {
        for other in same_collateral {
            if *other == contract || !remaining.is_positive() {
                continue;
            }
            let Some(book) = books.get_mut(&MarketKey::Contract(*other)) else {
                continue;
            };
            let (freed, took) = drain_reserve_by_cancelling(
                tally, book, address, asset, remaining, block, txid, &mut canceled,
            )?;
            if freed.is_positive() {
                steps.push(SourcedStep {
                    source: LossSource::CrossMarketReserve,
                    freed,
                    consumed: took,
                });
                sourced = sourced.add(freed);
                consumed = consumed.add(took);
                remaining = remaining.sub(took);
            }
        }
    }

    Ok(LossSourcing {
        needed,
        sourced,
        consumed,
        remaining,
        steps,
        canceled,
    })
}
