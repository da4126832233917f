// 12.2 engine/orders.rs: order intake, collateral reservation, and matching.
// orders arrive through the canonical queue; insertion reserves the offered
// collateral, then the book uncrosses and the matches go to settlement.

use super::core::Engine;
use super::results::{EngineError, MatchOutcome};
use crate::events::{
    EventPayload, MatchProducedEvent, OrderCanceledEvent, OrderInsertedEvent, OrderQueuedEvent,
    OrderSkippedEvent, SkipReason, UncrossCappedEvent,
};
use crate::order::{MarketKey, Order, OrderKind};
use crate::tally::BalanceReason;
use crate::types::{Amount, AssetId, BlockHeight, Side, TxId};

impl Engine {
    /// Accepts a decoded on-chain order into the intake queue. It will be
    /// drained, in canonical order, when its effective height is processed.
    pub fn submit_order(&mut self, order: Order, effective_height: BlockHeight) {
        self.emit_event(EventPayload::OrderQueued(OrderQueuedEvent {
            market: order.market,
            sender: order.sender.clone(),
            txid: order.txid.clone(),
            effective_height,
        }));
        self.queue.submit(order, effective_height);
    }

    // 12.2.1: insert one order and uncross its book. matches come back
    // unsettled; the caller feeds them to process_matches in order.
    pub fn insert_and_match(&mut self, mut order: Order) -> Result<MatchOutcome, EngineError> {
        let market = order.market;
        let mut outcome = MatchOutcome::default();

        // stop orders wait on the external trigger layer
        if order.stop {
            self.emit_event(EventPayload::OrderSkipped(OrderSkippedEvent {
                market,
                txid: order.txid.clone(),
                reason: SkipReason::StopHeld,
            }));
            outcome.skipped = true;
            return Ok(outcome);
        }

        // reduce-only clamps to the open position before anything is reserved
        if order.reduce {
            if let MarketKey::Contract(cid) = market {
                let position = self.positions.get(&order.sender, cid);
                let opposes = match order.side {
                    Side::Buy => position.contracts.is_short(),
                    Side::Sell => position.contracts.is_long(),
                };
                if !opposes {
                    self.emit_event(EventPayload::OrderSkipped(OrderSkippedEvent {
                        market,
                        txid: order.txid.clone(),
                        reason: SkipReason::ReduceOnlyFlat,
                    }));
                    outcome.skipped = true;
                    return Ok(outcome);
                }
                let cap = position.contracts.abs();
                if order.remaining > cap {
                    order.amount = cap;
                    order.remaining = cap;
                }
            }
        }

        // reserve the offered collateral while the order rests. a sender who
        // cannot fund the reservation loses the order, never the block
        let reserve = self.order_reserve(&order)?;
        if let Some((asset, amount)) = reserve {
            if self.tally.get(&order.sender, asset).available < amount {
                self.emit_event(EventPayload::OrderSkipped(OrderSkippedEvent {
                    market,
                    txid: order.txid.clone(),
                    reason: SkipReason::Unfunded,
                }));
                outcome.canceled.push(order.txid);
                outcome.skipped = true;
                return Ok(outcome);
            }
            order.init_margin = amount;
            let block = self.current_block;
            self.tally.update_balance(
                &order.sender,
                asset,
                amount.negate(),
                amount,
                Amount::zero(),
                Amount::zero(),
                BalanceReason::OrderReserve,
                block,
                &order.txid,
            )?;
        }

        let sender = order.sender.clone();
        let txid = order.txid.clone();
        let kind = order.kind;

        let registry = &self.registry;
        let book = self
            .books
            .get_mut(&market)
            .ok_or(EngineError::MarketNotFound(market))?;

        let seq = book.insert(order);
        let uncross = {
            let im_at = |price| match market {
                MarketKey::Contract(cid) => {
                    registry.initial_margin(cid, price).unwrap_or(Amount::zero())
                }
                MarketKey::Spot(_, _) => Amount::zero(),
            };
            book.uncross(im_at, self.config.max_uncross_iterations)
        };

        // an unfilled market order never rests
        let market_remainder = if kind == OrderKind::Market {
            book.cancel(&txid)
        } else {
            None
        };

        self.emit_event(EventPayload::OrderInserted(OrderInsertedEvent {
            market,
            sender,
            txid: txid.clone(),
            seq,
        }));

        // self-trade resolution dropped whole orders; their reserve goes back
        let block = self.current_block;
        for dropped in uncross.canceled {
            let refund = dropped.remaining_reserve();
            if refund.is_positive() {
                let asset = self
                    .reserve_asset(&dropped)
                    .expect("reserved order has a reserve asset");
                self.tally.update_balance(
                    &dropped.sender,
                    asset,
                    refund,
                    refund.negate(),
                    Amount::zero(),
                    Amount::zero(),
                    BalanceReason::OrderCancel,
                    block,
                    &dropped.txid,
                )?;
            }
            self.emit_event(EventPayload::SelfTradeDropped(OrderCanceledEvent {
                market,
                sender: dropped.sender.clone(),
                txid: dropped.txid.clone(),
                reserve_returned: refund,
            }));
            outcome.canceled.push(dropped.txid);
        }

        if let Some(remainder) = market_remainder {
            let touched = uncross
                .matches
                .iter()
                .any(|m| m.buyer_txid == remainder.txid || m.seller_txid == remainder.txid);
            if !touched {
                self.emit_event(EventPayload::OrderSkipped(OrderSkippedEvent {
                    market,
                    txid: remainder.txid.clone(),
                    reason: SkipReason::MarketUnfilled,
                }));
            }
            outcome.canceled.push(remainder.txid);
        }

        if uncross.iteration_capped {
            self.emit_event(EventPayload::UncrossCapped(UncrossCappedEvent {
                market,
                matches_produced: uncross.matches.len(),
            }));
            outcome.iteration_capped = true;
        }

        for m in &uncross.matches {
            self.emit_event(EventPayload::MatchProduced(MatchProducedEvent {
                market,
                buyer: m.buyer.clone(),
                seller: m.seller.clone(),
                price: m.trade_price,
                amount: m.amount,
                maker: m.maker,
            }));
        }
        outcome.matches = uncross.matches;

        Ok(outcome)
    }

    /// Voluntary cancellation. Returns the remaining reserve to available.
    pub fn cancel_order(&mut self, market: MarketKey, txid: &TxId) -> Result<(), EngineError> {
        let book = self
            .books
            .get_mut(&market)
            .ok_or(EngineError::MarketNotFound(market))?;
        let order = book
            .cancel(txid)
            .ok_or_else(|| EngineError::OrderNotFound(txid.clone()))?;

        let refund = order.remaining_reserve();
        let block = self.current_block;
        if refund.is_positive() {
            let asset = self
                .reserve_asset(&order)
                .expect("reserved order has a reserve asset");
            self.tally.update_balance(
                &order.sender,
                asset,
                refund,
                refund.negate(),
                Amount::zero(),
                Amount::zero(),
                BalanceReason::OrderCancel,
                block,
                &order.txid,
            )?;
        }
        self.emit_event(EventPayload::OrderCanceled(OrderCanceledEvent {
            market,
            sender: order.sender,
            txid: order.txid,
            reserve_returned: refund,
        }));
        Ok(())
    }

    /// What an order has to put up to rest: sellers of a spot pair escrow
    /// token A, buyers escrow token B at their own limit, contract limits
    /// escrow initial margin at their limit price. Market orders put up
    /// nothing; their margin is taken at settlement.
    fn order_reserve(&self, order: &Order) -> Result<Option<(AssetId, Amount)>, EngineError> {
        match order.market {
            MarketKey::Spot(a, b) => match order.side {
                Side::Sell => Ok(Some((a, Amount::new(order.amount)))),
                Side::Buy => {
                    let price = order.price.expect("spot orders carry a limit price");
                    Ok(Some((b, Amount::new(order.amount).mul(price.value()))))
                }
            },
            MarketKey::Contract(cid) => match order.price {
                Some(price) => {
                    let im = self
                        .registry
                        .initial_margin(cid, price)
                        .ok_or(EngineError::ContractNotRegistered(cid))?;
                    Ok(Some((
                        self.registry
                            .collateral_id(cid)
                            .ok_or(EngineError::ContractNotRegistered(cid))?,
                        im.mul(order.amount),
                    )))
                }
                None => Ok(None),
            },
        }
    }

    /// Asset a resting order's reserve is denominated in.
    pub(super) fn reserve_asset(&self, order: &Order) -> Option<AssetId> {
        match order.market {
            MarketKey::Spot(a, _) if order.side == Side::Sell => Some(a),
            MarketKey::Spot(_, b) => Some(b),
            MarketKey::Contract(cid) => self.registry.collateral_id(cid),
        }
    }
}
