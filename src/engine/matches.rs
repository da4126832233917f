// 12.3 engine/matches.rs: match settlement. every Match from an uncross runs
// through here exactly once, in match order: reserve release, fee routing,
// decomposition, margin movement, pnl settlement, then the Trade record.

use super::core::Engine;
use super::results::EngineError;
use crate::book::{MakerRole, Match};
use crate::events::{
    EventPayload, FeeChargedEvent, QuantityShrunkEvent, ShortfallEvent, TradeSettledEvent,
};
use crate::fees::{accrue_fee, calculate_fee, credit_rebate, locate_fee, FeeKind, FeeQuote, LocatedFee};
use crate::margin;
use crate::order::MarketKey;
use crate::position::{decompose, realized_pnl, weighted_entry};
use crate::tally::BalanceReason;
use crate::trade::{block_timestamp, Trade};
use crate::types::{Address, Amount, AssetId, ContractId, Side, SignedQty, TxId};
use crate::waterfall::source_funds_for_loss;
use rust_decimal::Decimal;

/// Per-side settlement summary, folded into the Trade.
#[derive(Debug, Clone, Copy, Default)]
struct SideResult {
    closed: Decimal,
    flipped: Decimal,
    shortfall: Amount,
}

impl Engine {
    /// Settles a batch of matches in order. `is_channel` halves the taker
    /// rate for trades arriving through the off-chain channel layer.
    pub fn process_matches(
        &mut self,
        matches: Vec<Match>,
        is_channel: bool,
    ) -> Result<Vec<Trade>, EngineError> {
        let mut trades = Vec::with_capacity(matches.len());
        for m in matches {
            let trade = match m.market {
                MarketKey::Spot(a, b) => self.settle_spot(&m, a, b, is_channel)?,
                MarketKey::Contract(cid) => self.settle_contract(&m, cid, is_channel)?,
            };
            self.emit_event(EventPayload::TradeSettled(TradeSettledEvent {
                market: trade.market,
                buyer: trade.buyer.clone(),
                seller: trade.seller.clone(),
                price: trade.price,
                amount: trade.amount,
            }));
            self.volume.record(trade.market, trade.block, trade.amount);
            self.history.append(trade.clone());
            trades.push(trade);
        }
        Ok(trades)
    }

    // 12.3.1: spot settlement. the seller's escrowed token A goes to the buyer,
    // the buyer's escrowed token B covers the trade at the trade price, and
    // any price improvement against the buyer's own limit refunds to the
    // buyer. the taker fee is charged in the taker's given asset.
    fn settle_spot(
        &mut self,
        m: &Match,
        asset_a: AssetId,
        asset_b: AssetId,
        is_channel: bool,
    ) -> Result<Trade, EngineError> {
        let block = m.block;
        let amount_a = Amount::new(m.amount);
        let amount_b = m.amount_b;
        let buyer_release = m.buyer_reserve_release;

        // token A: seller's reserve to buyer's available
        self.tally.update_balance(
            &m.seller,
            asset_a,
            Amount::zero(),
            amount_a.negate(),
            Amount::zero(),
            Amount::zero(),
            BalanceReason::SpotSettlement,
            block,
            &m.seller_txid,
        )?;
        self.tally.update_balance(
            &m.buyer,
            asset_a,
            amount_a,
            Amount::zero(),
            Amount::zero(),
            Amount::zero(),
            BalanceReason::SpotSettlement,
            block,
            &m.buyer_txid,
        )?;

        // token B: buyer's reserve covers the trade; the improvement refunds
        self.tally.update_balance(
            &m.buyer,
            asset_b,
            buyer_release.sub(amount_b),
            buyer_release.negate(),
            Amount::zero(),
            Amount::zero(),
            BalanceReason::SpotSettlement,
            block,
            &m.buyer_txid,
        )?;
        self.tally.update_balance(
            &m.seller,
            asset_b,
            amount_b,
            Amount::zero(),
            Amount::zero(),
            Amount::zero(),
            BalanceReason::SpotSettlement,
            block,
            &m.seller_txid,
        )?;

        // fee in the taker's given asset
        let (mut buyer_fee, mut seller_fee) = (Amount::zero(), Amount::zero());
        let mut net_revenue = Amount::zero();
        let mut fee_asset = asset_b;
        match m.maker {
            MakerRole::Seller => {
                let quote = calculate_fee(amount_b, is_channel);
                fee_asset = asset_b;
                buyer_fee = self.charge_fee(&m.buyer, fee_asset, quote.taker, m, &m.buyer_txid)?;
                if buyer_fee.is_positive() {
                    // a short collection also shortens the rebate
                    let rebate = quote.half.min(buyer_fee);
                    credit_rebate(
                        &mut self.tally,
                        &m.seller,
                        fee_asset,
                        rebate,
                        block,
                        &m.seller_txid,
                    )?;
                    net_revenue = buyer_fee.sub(rebate);
                }
            }
            MakerRole::Buyer => {
                let quote = calculate_fee(amount_a, is_channel);
                fee_asset = asset_a;
                seller_fee = self.charge_fee(&m.seller, fee_asset, quote.taker, m, &m.seller_txid)?;
                if seller_fee.is_positive() {
                    let rebate = quote.half.min(seller_fee);
                    credit_rebate(
                        &mut self.tally,
                        &m.buyer,
                        fee_asset,
                        rebate,
                        block,
                        &m.buyer_txid,
                    )?;
                    net_revenue = seller_fee.sub(rebate);
                }
            }
            MakerRole::Neither => {
                // spot maker policy always picks a side; nothing to charge
                debug_assert!(false, "spot matches always have a maker");
            }
        }

        if net_revenue.is_positive() {
            accrue_fee(
                &mut self.fee_cache,
                &mut self.insurance,
                fee_asset,
                m.market,
                net_revenue,
                FeeKind::Spot,
                block,
            );
        }

        Ok(Trade {
            market: m.market,
            buyer: m.buyer.clone(),
            seller: m.seller.clone(),
            buyer_txid: m.buyer_txid.clone(),
            seller_txid: m.seller_txid.clone(),
            price: m.trade_price,
            amount: m.amount,
            amount_b,
            maker: m.maker,
            buyer_fee,
            seller_fee,
            buyer_closed: Decimal::ZERO,
            buyer_flipped: Decimal::ZERO,
            seller_closed: Decimal::ZERO,
            seller_flipped: Decimal::ZERO,
            buyer_shortfall: Amount::zero(),
            seller_shortfall: Amount::zero(),
            block: m.block,
            recorded_at: block_timestamp(m.block),
        })
    }

    // 12.3.2: contract settlement. fee first (the margin path needs its
    // bucket), then each side's decomposition drives margin movement and pnl.
    fn settle_contract(
        &mut self,
        m: &Match,
        cid: ContractId,
        is_channel: bool,
    ) -> Result<Trade, EngineError> {
        let spec = self
            .registry
            .get(cid)
            .ok_or(EngineError::ContractNotRegistered(cid))?;
        let collateral = spec.collateral;
        let inverse = spec.inverse;
        let notional = self
            .registry
            .notional_value(cid, m.trade_price)
            .ok_or(EngineError::ContractNotRegistered(cid))?;
        let fee_kind = self.fee_kind(m.market);
        let block = m.block;

        let fee_notional = notional.notional_value.mul(m.amount);
        let quote = calculate_fee(fee_notional, is_channel);

        // fee routing per the maker role; liquidation fills are fee-exempt
        let (buyer_due, seller_due, rebate_to) = Self::fee_split(m, &quote);
        let buyer_located = if buyer_due.is_positive() {
            locate_fee(&mut self.tally, &m.buyer, collateral, buyer_due, block, &m.buyer_txid)?
        } else {
            LocatedFee::none()
        };
        if buyer_located.amount.is_positive() {
            self.emit_event(EventPayload::FeeCharged(FeeChargedEvent {
                market: m.market,
                payer: m.buyer.clone(),
                fee: buyer_located.amount,
                bucket: buyer_located.bucket,
            }));
        }
        let seller_located = if seller_due.is_positive() {
            locate_fee(&mut self.tally, &m.seller, collateral, seller_due, block, &m.seller_txid)?
        } else {
            LocatedFee::none()
        };
        if seller_located.amount.is_positive() {
            self.emit_event(EventPayload::FeeCharged(FeeChargedEvent {
                market: m.market,
                payer: m.seller.clone(),
                fee: seller_located.amount,
                bucket: seller_located.bucket,
            }));
        }

        let collected = buyer_located.amount.add(seller_located.amount);
        let mut net_revenue = collected;
        if collected.is_positive() {
            if let Some(maker) = rebate_to {
                let (addr, txid) = match maker {
                    Side::Buy => (&m.buyer, &m.buyer_txid),
                    Side::Sell => (&m.seller, &m.seller_txid),
                };
                let rebate = quote.half.min(collected);
                credit_rebate(&mut self.tally, addr, collateral, rebate, block, txid)?;
                net_revenue = collected.sub(rebate);
            }
        }
        if net_revenue.is_positive() {
            accrue_fee(
                &mut self.fee_cache,
                &mut self.insurance,
                collateral,
                m.market,
                net_revenue,
                fee_kind,
                block,
            );
        }

        // settle the buyer leg, then the seller leg, in that fixed order
        let buyer = self.settle_contract_leg(
            m,
            cid,
            collateral,
            notional.notional_per_contract,
            inverse,
            Side::Buy,
            buyer_located,
            m.buyer_reserve_release,
        )?;
        let seller = self.settle_contract_leg(
            m,
            cid,
            collateral,
            notional.notional_per_contract,
            inverse,
            Side::Sell,
            seller_located,
            m.seller_reserve_release,
        )?;

        Ok(Trade {
            market: m.market,
            buyer: m.buyer.clone(),
            seller: m.seller.clone(),
            buyer_txid: m.buyer_txid.clone(),
            seller_txid: m.seller_txid.clone(),
            price: m.trade_price,
            amount: m.amount,
            amount_b: Amount::zero(),
            maker: m.maker,
            buyer_fee: buyer_located.amount,
            seller_fee: seller_located.amount,
            buyer_closed: buyer.closed,
            buyer_flipped: buyer.flipped,
            seller_closed: seller.closed,
            seller_flipped: seller.flipped,
            buyer_shortfall: buyer.shortfall,
            seller_shortfall: seller.shortfall,
            block: m.block,
            recorded_at: block_timestamp(m.block),
        })
    }

    /// Who owes what. The taker pays the full quote; with no maker both sides
    /// pay half and nobody is rebated. A liquidation fill owes nothing, and
    /// an unpaid fee earns no rebate.
    fn fee_split(m: &Match, quote: &FeeQuote) -> (Amount, Amount, Option<Side>) {
        match m.maker {
            MakerRole::Buyer => {
                let due = if m.seller_is_liq { Amount::zero() } else { quote.taker };
                let rebate = due.is_positive().then_some(Side::Buy);
                (Amount::zero(), due, rebate)
            }
            MakerRole::Seller => {
                let due = if m.buyer_is_liq { Amount::zero() } else { quote.taker };
                let rebate = due.is_positive().then_some(Side::Sell);
                (due, Amount::zero(), rebate)
            }
            MakerRole::Neither => {
                let buyer = if m.buyer_is_liq { Amount::zero() } else { quote.half };
                let seller = if m.seller_is_liq { Amount::zero() } else { quote.half };
                (buyer, seller, None)
            }
        }
    }

    // 12.3.3: one side's margin movement and pnl. runs after the fee debit so
    // a margin-served fee is subtracted from held margin before the release.
    #[allow(clippy::too_many_arguments)]
    fn settle_contract_leg(
        &mut self,
        m: &Match,
        cid: ContractId,
        collateral: AssetId,
        notional_per_contract: Decimal,
        inverse: bool,
        side: Side,
        fee: LocatedFee,
        reserve_release: Amount,
    ) -> Result<SideResult, EngineError> {
        let block = m.block;
        let (address, txid): (&Address, &TxId) = match side {
            Side::Buy => (&m.buyer, &m.buyer_txid),
            Side::Sell => (&m.seller, &m.seller_txid),
        };

        // the resting order's reserve converts back to available; the opening
        // path below re-reserves real position margin from it
        if reserve_release.is_positive() {
            self.tally.update_balance(
                address,
                collateral,
                reserve_release,
                reserve_release.negate(),
                Amount::zero(),
                Amount::zero(),
                BalanceReason::FillRelease,
                block,
                txid,
            )?;
        }

        let mut position = self.positions.get(address, cid);
        let existing = position.contracts;
        let delta = SignedQty::from_side(side, m.amount);
        let d = decompose(existing, delta);

        // a fee served from the margin bucket came out of this position
        if fee.from_margin() {
            position.margin = if position.margin >= fee.amount {
                position.margin.sub(fee.amount)
            } else {
                Amount::zero()
            };
        }

        let mut result = SideResult {
            closed: d.closed,
            flipped: d.flipped,
            shortfall: Amount::zero(),
        };

        // closing leg: release margin, realize pnl
        if !d.closed.is_zero() {
            let avg = position
                .avg_price
                .expect("open position carries an entry price");
            let pnl = realized_pnl(
                d.closed,
                existing.is_long(),
                avg,
                m.trade_price,
                notional_per_contract,
                inverse,
            );

            let release = margin::release_for_close(m.im_per_contract, d.closed, position.margin);
            margin::release(&mut self.tally, address, collateral, release, block, txid)?;
            position.margin = position.margin.sub(release);

            if pnl.is_positive() {
                self.tally.update_balance(
                    address,
                    collateral,
                    pnl,
                    Amount::zero(),
                    Amount::zero(),
                    Amount::zero(),
                    BalanceReason::PnlSettlement,
                    block,
                    txid,
                )?;
            } else if pnl.is_negative() {
                let needed = pnl.abs();
                let same_collateral = self.registry.contracts_for_collateral(collateral);
                let sourcing = source_funds_for_loss(
                    &mut self.tally,
                    &mut self.books,
                    &same_collateral,
                    address,
                    collateral,
                    cid,
                    needed,
                    self.config.margin_loss_cap,
                    block,
                    txid,
                )?;
                // the margin step drained a bucket shared by every position
                // in this collateral; the position records shed the same
                // amount, this one first, then the others ascending
                let mut drained = sourcing.margin_drained();
                if drained.is_positive() {
                    let own = drained.min(position.margin);
                    position.margin = position.margin.sub(own);
                    drained = drained.sub(own);
                    for other in &same_collateral {
                        if *other == cid || !drained.is_positive() {
                            continue;
                        }
                        let mut p = self.positions.get(address, *other);
                        let take = drained.min(p.margin);
                        if take.is_positive() {
                            p.margin = p.margin.sub(take);
                            drained = drained.sub(take);
                            self.positions.write(p);
                        }
                    }
                }
                if sourcing.remaining.is_positive() {
                    result.shortfall = sourcing.remaining;
                    self.emit_event(EventPayload::ShortfallUnrecovered(ShortfallEvent {
                        market: m.market,
                        address: address.clone(),
                        remaining: sourcing.remaining,
                    }));
                }
            }
            position.realized_pnl = position.realized_pnl.add(pnl);
        }

        // fresh exposure: pure open or the far side of a flip
        let fresh = d.opened + d.flipped;
        let mut kept = fresh;
        if !fresh.is_zero() {
            let available = self.tally.get(address, collateral).available;
            let leg = margin::size_opening_leg(m.im_per_contract, fresh, available);
            if !leg.shrunk_by.is_zero() {
                self.emit_event(EventPayload::QuantityShrunk(QuantityShrunkEvent {
                    market: m.market,
                    address: address.clone(),
                    requested: fresh,
                    kept: leg.quantity,
                }));
            }
            kept = leg.quantity;
            margin::reserve(&mut self.tally, address, collateral, leg.margin, block, txid)?;
            position.margin = position.margin.add(leg.margin);
        }

        // position arithmetic: the closed part walks toward zero, the kept
        // fresh part extends past it
        let sign = side.sign();
        let new_value = existing.value() + sign * (d.closed + kept);
        position.contracts = SignedQty::new(new_value);
        position.avg_price = if position.contracts.is_zero() {
            None
        } else if !kept.is_zero() && !d.flipped.is_zero() {
            // flip: the remainder is a new position at the trade price
            Some(m.trade_price)
        } else if !kept.is_zero() {
            Some(weighted_entry(
                existing.abs(),
                position.avg_price,
                kept,
                m.trade_price,
            ))
        } else {
            position.avg_price
        };

        self.positions.write(position);
        Ok(result)
    }

    fn charge_fee(
        &mut self,
        address: &Address,
        asset: AssetId,
        fee: Amount,
        m: &Match,
        txid: &TxId,
    ) -> Result<Amount, EngineError> {
        let located = locate_fee(&mut self.tally, address, asset, fee, m.block, txid)?;
        if located.amount.is_positive() {
            self.emit_event(EventPayload::FeeCharged(FeeChargedEvent {
                market: m.market,
                payer: address.clone(),
                fee: located.amount,
                bucket: located.bucket,
            }));
        }
        Ok(located.amount)
    }
}
