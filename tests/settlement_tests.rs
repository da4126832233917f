//! End-to-end settlement tests.
//!
//! Each test drives the engine through whole blocks, the way on-chain replay
//! would, and asserts the resulting balances to the satoshi.

use rust_decimal_macros::dec;
use settlement_core::*;

const LTC: AssetId = AssetId(0);
const USDL: AssetId = AssetId(1);

fn engine() -> Engine {
    Engine::new(EngineConfig::default())
}

fn fund(engine: &mut Engine, who: &Address, asset: AssetId, amount: rust_decimal::Decimal) {
    let txid = TxId::new(format!("dep-{}-{:?}", who.as_str(), asset));
    engine.deposit(who, asset, Amount::new(amount), &txid).unwrap();
}

fn oracle_contract() -> ContractSpec {
    ContractSpec {
        id: ContractId(1),
        name: "LTC/USD oracle".into(),
        collateral: LTC,
        notional_per_contract: dec!(1),
        inverse: false,
        pricing: ContractPricing::Oracle,
        init_margin_fraction: dec!(0.1),
    }
}

fn limit(
    market: MarketKey,
    sender: &Address,
    side: Side,
    qty: rust_decimal::Decimal,
    price: rust_decimal::Decimal,
    block: u64,
    txid: &str,
) -> Order {
    Order::new_limit(
        market,
        sender.clone(),
        side,
        qty,
        Price::new_unchecked(price),
        BlockHeight(block),
        TxId::new(txid),
    )
}

#[test]
fn spot_settlement_with_price_improvement() {
    let mut engine = engine();
    let market = engine.add_spot_market(LTC, USDL);

    let alice = Address::new("ltc1qalice7x");
    let bob = Address::new("ltc1qbob4k");
    fund(&mut engine, &alice, USDL, dec!(10000));
    fund(&mut engine, &bob, LTC, dec!(100));

    // bob's ask rests a block earlier, so bob is maker and his 95 prints
    engine.submit_order(
        limit(market, &bob, Side::Sell, dec!(10), dec!(95), 1, "aa01"),
        BlockHeight(1),
    );
    engine.submit_order(
        limit(market, &alice, Side::Buy, dec!(10), dec!(100), 2, "bb02"),
        BlockHeight(2),
    );

    engine.process_block(BlockHeight(1)).unwrap();
    let result = engine.process_block(BlockHeight(2)).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.maker, MakerRole::Seller);
    assert_eq!(trade.price.value(), dec!(95));
    assert_eq!(trade.amount_b, Amount::new(dec!(950)));

    // taker fee on 950 USDL at 5 bps: 0.475, already even in satoshis
    assert_eq!(trade.buyer_fee, Amount::new(dec!(0.475)));
    assert_eq!(trade.seller_fee, Amount::zero());

    // alice: reserved 1000 at her limit, 50 price improvement back, fee out
    let alice_usdl = engine.tally().get(&alice, USDL);
    assert_eq!(alice_usdl.available, Amount::new(dec!(9049.525)));
    assert_eq!(alice_usdl.reserved, Amount::zero());
    assert_eq!(engine.tally().get(&alice, LTC).available, Amount::new(dec!(10)));

    // bob: proceeds plus exactly half the taker fee as rebate
    let bob_usdl = engine.tally().get(&bob, USDL);
    assert_eq!(bob_usdl.available, Amount::new(dec!(950.2375)));
    assert_eq!(engine.tally().get(&bob, LTC).available, Amount::new(dec!(90)));

    // net revenue 0.2375 splits floor-half to insurance, remainder to value
    assert_eq!(engine.insurance().balance(USDL), Amount::new(dec!(0.11875)));
    assert_eq!(
        engine.fee_cache().get(USDL, market).value,
        Amount::new(dec!(0.11875))
    );
}

#[test]
fn contract_round_trip_realizes_pnl() {
    let mut engine = engine();
    let cid = engine.register_contract(oracle_contract());
    let market = MarketKey::Contract(cid);

    let carol = Address::new("ltc1qcarol2m");
    let dave = Address::new("ltc1qdave9z");
    fund(&mut engine, &carol, LTC, dec!(5000));
    fund(&mut engine, &dave, LTC, dec!(5000));

    // open 10 long / 10 short at 100
    engine.submit_order(
        limit(market, &carol, Side::Buy, dec!(10), dec!(100), 1, "c01"),
        BlockHeight(1),
    );
    engine.submit_order(
        limit(market, &dave, Side::Sell, dec!(10), dec!(100), 1, "d01"),
        BlockHeight(1),
    );
    let open = engine.process_block(BlockHeight(1)).unwrap();
    assert_eq!(open.trades.len(), 1);
    // same block, no post-only: neither is maker, both pay half of 0.5
    assert_eq!(open.trades[0].maker, MakerRole::Neither);
    assert_eq!(open.trades[0].buyer_fee, Amount::new(dec!(0.25)));
    assert_eq!(open.trades[0].seller_fee, Amount::new(dec!(0.25)));

    let pos = engine.positions().get(&carol, cid);
    assert_eq!(pos.contracts.value(), dec!(10));
    assert_eq!(pos.avg_price.unwrap().value(), dec!(100));
    assert_eq!(pos.margin, Amount::new(dec!(100)));

    // close both at 120
    engine.submit_order(
        limit(market, &carol, Side::Sell, dec!(10), dec!(120), 2, "c02"),
        BlockHeight(2),
    );
    engine.submit_order(
        limit(market, &dave, Side::Buy, dec!(10), dec!(120), 2, "d02"),
        BlockHeight(2),
    );
    let close = engine.process_block(BlockHeight(2)).unwrap();
    let trade = &close.trades[0];
    assert_eq!(trade.buyer_closed, dec!(10));
    assert_eq!(trade.seller_closed, dec!(10));

    // carol: +200 pnl, margin fully released, fees 0.25 + 0.3 paid
    let carol_pos = engine.positions().get(&carol, cid);
    assert!(carol_pos.is_flat());
    assert_eq!(carol_pos.realized_pnl, Amount::new(dec!(200)));
    let carol_tally = engine.tally().get(&carol, LTC);
    assert_eq!(carol_tally.available, Amount::new(dec!(5199.45)));
    assert_eq!(carol_tally.margin, Amount::zero());

    // dave mirrors the loss, covered entirely from available
    let dave_tally = engine.tally().get(&dave, LTC);
    assert_eq!(dave_tally.available, Amount::new(dec!(4799.45)));
    assert_eq!(trade.seller_shortfall, Amount::zero());
    assert_eq!(trade.buyer_shortfall, Amount::zero());

    // oracle accrual: floor-half insurance, remainder stashed
    assert_eq!(engine.insurance().balance(LTC), Amount::new(dec!(0.55)));
    assert_eq!(
        engine.fee_cache().get(LTC, market).stash,
        Amount::new(dec!(0.55))
    );

    // nothing minted, nothing burned
    let circulating = engine
        .tally()
        .asset_total(LTC)
        .add(engine.insurance().balance(LTC))
        .add(engine.fee_cache().asset_total(LTC));
    assert_eq!(circulating, Amount::new(dec!(10000)));
}

#[test]
fn flip_shrinks_opening_leg_to_available_margin() {
    let mut engine = engine();
    let cid = engine.register_contract(oracle_contract());
    let market = MarketKey::Contract(cid);

    let erin = Address::new("ltc1qerin5p");
    let frank = Address::new("ltc1qfrank1w");
    fund(&mut engine, &erin, LTC, dec!(36));
    fund(&mut engine, &frank, LTC, dec!(50000));

    // erin opens short 3 at 100
    engine.submit_order(
        limit(market, &erin, Side::Sell, dec!(3), dec!(100), 1, "e01"),
        BlockHeight(1),
    );
    engine.submit_order(
        limit(market, &frank, Side::Buy, dec!(3), dec!(100), 1, "f01"),
        BlockHeight(1),
    );
    engine.process_block(BlockHeight(1)).unwrap();
    assert_eq!(
        engine.positions().get(&erin, cid).contracts.value(),
        dec!(-3)
    );

    // frank's ask rests, then erin market-buys 10 to flip
    engine.submit_order(
        limit(market, &frank, Side::Sell, dec!(10), dec!(100), 2, "f02"),
        BlockHeight(2),
    );
    engine.process_block(BlockHeight(2)).unwrap();
    engine.submit_order(
        Order::new_market(cid, erin.clone(), Side::Buy, dec!(10), BlockHeight(3), TxId::new("e03")),
        BlockHeight(3),
    );
    let result = engine.process_block(BlockHeight(3)).unwrap();

    let trade = &result.trades[0];
    assert_eq!(trade.maker, MakerRole::Seller);
    assert_eq!(trade.buyer_closed, dec!(3));
    assert_eq!(trade.buyer_flipped, dec!(7));

    // after the 0.5 taker fee erin's 35.425 available covers 3 of the 7
    // requested contracts: shrink = ceil(34.575 / 10) = 4
    let pos = engine.positions().get(&erin, cid);
    assert_eq!(pos.contracts.value(), dec!(3));
    assert_eq!(pos.avg_price.unwrap().value(), dec!(100));
    assert_eq!(pos.margin, Amount::new(dec!(30)));
    assert_eq!(
        engine.tally().get(&erin, LTC).available,
        Amount::new(dec!(5.425))
    );

    let shrunk = engine.events().iter().any(|e| {
        matches!(
            &e.payload,
            EventPayload::QuantityShrunk(q) if q.requested == dec!(7) && q.kept == dec!(3)
        )
    });
    assert!(shrunk, "expected a QuantityShrunk event");
}

#[test]
fn loss_waterfall_drains_available_capped_margin_then_cancels() {
    let mut engine = engine();
    let cid = engine.register_contract(oracle_contract());
    let market = MarketKey::Contract(cid);

    let gina = Address::new("ltc1qgina8r");
    let hank = Address::new("ltc1qhank3t");
    fund(&mut engine, &gina, LTC, dec!(25));
    fund(&mut engine, &hank, LTC, dec!(100000));

    // gina longs 1 at 100
    engine.submit_order(
        limit(market, &gina, Side::Buy, dec!(1), dec!(100), 1, "g01"),
        BlockHeight(1),
    );
    engine.submit_order(
        limit(market, &hank, Side::Sell, dec!(1), dec!(100), 1, "h01"),
        BlockHeight(1),
    );
    engine.process_block(BlockHeight(1)).unwrap();

    // a resting bid whose reserve the waterfall will force-cancel into
    engine.submit_order(
        limit(market, &gina, Side::Buy, dec!(1), dec!(15), 2, "g02"),
        BlockHeight(2),
    );
    engine.process_block(BlockHeight(2)).unwrap();
    assert_eq!(
        engine.tally().get(&gina, LTC).reserved,
        Amount::new(dec!(1.5))
    );

    // the close at 20 realizes an 80 LTC loss gina cannot cover
    engine.submit_order(
        limit(market, &gina, Side::Sell, dec!(1), dec!(20), 3, "g03"),
        BlockHeight(3),
    );
    engine.submit_order(
        limit(market, &hank, Side::Buy, dec!(1), dec!(20), 3, "h03"),
        BlockHeight(3),
    );
    let result = engine.process_block(BlockHeight(3)).unwrap();

    // available 15.47, then 49% of the 8 margin, then the 1.5 reserve:
    // 80 - 15.47 - 3.92 - 1.5 = 59.11 unrecovered
    let trade = &result.trades[0];
    assert_eq!(trade.seller_shortfall, Amount::new(dec!(59.11)));

    let tally = engine.tally().get(&gina, LTC);
    assert_eq!(tally.available, Amount::zero());
    assert_eq!(tally.reserved, Amount::zero());
    assert_eq!(tally.margin, Amount::new(dec!(4.08)));
    assert_eq!(
        engine.positions().get(&gina, cid).margin,
        Amount::new(dec!(4.08))
    );

    // the resting bid was force-cancelled
    assert!(engine.book(market).unwrap().is_empty());

    let reported = engine.events().iter().any(|e| {
        matches!(
            &e.payload,
            EventPayload::ShortfallUnrecovered(s)
                if s.remaining == Amount::new(dec!(59.11)) && s.address == gina
        )
    });
    assert!(reported, "expected a ShortfallUnrecovered event");
}

#[test]
fn stop_orders_and_flat_reduce_only_are_skipped() {
    let mut engine = engine();
    let cid = engine.register_contract(oracle_contract());
    let market = MarketKey::Contract(cid);

    let ivy = Address::new("ltc1qivy6s");
    fund(&mut engine, &ivy, LTC, dec!(1000));

    engine.submit_order(
        limit(market, &ivy, Side::Buy, dec!(1), dec!(100), 1, "i01").stop_order(),
        BlockHeight(1),
    );
    engine.submit_order(
        limit(market, &ivy, Side::Sell, dec!(1), dec!(100), 1, "i02").reduce_only(),
        BlockHeight(1),
    );
    let result = engine.process_block(BlockHeight(1)).unwrap();

    assert_eq!(result.orders_processed, 2);
    assert_eq!(result.orders_skipped, 2);
    assert!(engine.book(market).unwrap().is_empty());
    // nothing was reserved for either order
    assert_eq!(engine.tally().get(&ivy, LTC).reserved, Amount::zero());
    assert_eq!(
        engine.tally().get(&ivy, LTC).available,
        Amount::new(dec!(1000))
    );
}

#[test]
fn same_block_arrival_order_does_not_matter() {
    let senders = ["ltc1qzz9", "ltc1qaa1", "ltc1qab2"];
    let mut outcomes = Vec::new();

    for permutation in [[0usize, 1, 2], [2, 1, 0], [1, 2, 0]] {
        let mut engine = engine();
        let market = engine.add_spot_market(LTC, USDL);
        for s in senders {
            fund(&mut engine, &Address::new(s), USDL, dec!(1000));
            fund(&mut engine, &Address::new(s), LTC, dec!(1000));
        }

        for idx in permutation {
            let side = if idx == 0 { Side::Sell } else { Side::Buy };
            engine.submit_order(
                limit(
                    market,
                    &Address::new(senders[idx]),
                    side,
                    dec!(5),
                    dec!(100),
                    1,
                    &format!("tx{idx}"),
                ),
                BlockHeight(1),
            );
        }
        let result = engine.process_block(BlockHeight(1)).unwrap();
        assert_eq!(result.trades.len(), 1);
        outcomes.push((
            result.trades[0].buyer.clone(),
            result.trades[0].seller.clone(),
            result.trades[0].price,
        ));
    }

    assert!(outcomes.windows(2).all(|w| w[0] == w[1]));
    // senders compare from the string end: "aa1" outranks "ab2" and "zz9"
    assert_eq!(outcomes[0].0, Address::new("ltc1qaa1"));
}

#[test]
fn unfunded_order_is_skipped_without_failing_the_block() {
    let mut engine = engine();
    let market = engine.add_spot_market(LTC, USDL);

    let alice = Address::new("ltc1qalice7x");
    let bob = Address::new("ltc1qbob4k");
    let zed = Address::new("ltc1qzed3q");
    fund(&mut engine, &alice, USDL, dec!(10000));
    fund(&mut engine, &bob, LTC, dec!(100));
    // zed never deposits anything

    engine.submit_order(limit(market, &bob, Side::Sell, dec!(10), dec!(95), 1, "b1"), BlockHeight(1));
    engine.process_block(BlockHeight(1)).unwrap();

    engine.submit_order(limit(market, &zed, Side::Buy, dec!(5), dec!(95), 2, "z2"), BlockHeight(2));
    engine.submit_order(limit(market, &alice, Side::Buy, dec!(10), dec!(95), 2, "a2"), BlockHeight(2));
    let result = engine.process_block(BlockHeight(2)).unwrap();

    // zed's order died alone; the funded pair still settled
    assert_eq!(result.orders_processed, 2);
    assert_eq!(result.orders_skipped, 1);
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].buyer, alice);

    let zed_usdl = engine.tally().get(&zed, USDL);
    assert!(zed_usdl.available.is_zero());
    assert!(zed_usdl.reserved.is_zero());
    assert!(engine
        .events()
        .iter()
        .any(|e| matches!(&e.payload, EventPayload::OrderSkipped(s)
            if s.txid == TxId::new("z2") && s.reason == SkipReason::Unfunded)));

    assert_eq!(engine.tally().get(&alice, LTC).available, Amount::new(dec!(10)));
    assert_eq!(engine.tally().get(&bob, LTC).available, Amount::new(dec!(90)));
}

#[test]
fn short_fee_is_capped_and_settlement_completes() {
    let mut engine = engine();
    let market = engine.add_spot_market(LTC, USDL);

    let bob = Address::new("ltc1qbob4k");
    let carol = Address::new("ltc1qcarol2m");
    fund(&mut engine, &bob, LTC, dec!(100));
    // the notional plus 0.2 of the 0.475 taker fee, not a satoshi more
    fund(&mut engine, &carol, USDL, dec!(950.2));

    engine.submit_order(limit(market, &bob, Side::Sell, dec!(10), dec!(95), 1, "b1"), BlockHeight(1));
    engine.process_block(BlockHeight(1)).unwrap();
    engine.submit_order(limit(market, &carol, Side::Buy, dec!(10), dec!(95), 2, "c2"), BlockHeight(2));
    let result = engine.process_block(BlockHeight(2)).unwrap();

    // the trade settled in full; only 0.2 of the fee existed to collect
    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.buyer_fee, Amount::new(dec!(0.2)));

    assert_eq!(engine.tally().get(&carol, LTC).available, Amount::new(dec!(10)));
    let carol_usdl = engine.tally().get(&carol, USDL);
    assert!(carol_usdl.available.is_zero());
    assert!(carol_usdl.reserved.is_zero());

    // the whole short collection went to the maker rebate, nothing accrued
    assert_eq!(engine.tally().get(&bob, USDL).available, Amount::new(dec!(950.2)));
    assert!(engine.insurance().balance(USDL).is_zero());
    assert!(engine.fee_cache().get(USDL, market).value.is_zero());
}

#[test]
fn margin_drain_keeps_positions_in_step_with_the_ledger() {
    let mut engine = engine();
    let c1 = engine.register_contract(oracle_contract());
    let c2 = engine.register_contract(ContractSpec {
        id: ContractId(2),
        name: "LTC/EUR oracle".into(),
        collateral: LTC,
        notional_per_contract: dec!(1),
        inverse: false,
        pricing: ContractPricing::Oracle,
        init_margin_fraction: dec!(0.1),
    });
    let m1 = MarketKey::Contract(c1);
    let m2 = MarketKey::Contract(c2);

    let pat = Address::new("ltc1qpat5u");
    let quinn = Address::new("ltc1qquinn7m");
    fund(&mut engine, &pat, LTC, dec!(30));
    fund(&mut engine, &quinn, LTC, dec!(100000));

    // pat opens 1 long on each contract at 100
    for (block, market, tx) in [(1u64, m1, "p1"), (2, m2, "p2")] {
        engine.submit_order(limit(market, &pat, Side::Buy, dec!(1), dec!(100), block, tx), BlockHeight(block));
        engine.submit_order(
            limit(market, &quinn, Side::Sell, dec!(1), dec!(100), block, &format!("q{block}")),
            BlockHeight(block),
        );
        engine.process_block(BlockHeight(block)).unwrap();
    }

    // the losing close on contract 1: entry 100, exit 40
    engine.submit_order(limit(m1, &pat, Side::Sell, dec!(1), dec!(40), 3, "p3"), BlockHeight(3));
    engine.submit_order(limit(m1, &quinn, Side::Buy, dec!(1), dec!(40), 3, "q3"), BlockHeight(3));
    let close = engine.process_block(BlockHeight(3)).unwrap();
    assert_eq!(close.trades[0].seller_shortfall, Amount::new(dec!(38.22)));

    // the 7.84 margin drain is mirrored: 6 from the closed position, the
    // rest from contract 2
    let tally = engine.tally().get(&pat, LTC);
    assert_eq!(tally.margin, Amount::new(dec!(8.16)));
    assert!(engine.positions().get(&pat, c1).margin.is_zero());
    assert_eq!(engine.positions().get(&pat, c2).margin, Amount::new(dec!(8.16)));

    // topped back up, the clean close on contract 2 settles at entry
    fund(&mut engine, &pat, LTC, dec!(10.1));
    engine.submit_order(limit(m2, &pat, Side::Sell, dec!(1), dec!(100), 4, "p4"), BlockHeight(4));
    engine.submit_order(limit(m2, &quinn, Side::Buy, dec!(1), dec!(100), 4, "q4"), BlockHeight(4));
    let flat = engine.process_block(BlockHeight(4)).unwrap();
    assert_eq!(flat.trades.len(), 1);
    assert!(flat.trades[0].seller_shortfall.is_zero());

    let tally = engine.tally().get(&pat, LTC);
    assert_eq!(tally.available, Amount::new(dec!(18.235)));
    assert!(tally.reserved.is_zero());
    assert!(tally.margin.is_zero());
    assert!(engine.positions().get(&pat, c2).contracts.is_zero());
}

#[test]
fn inverse_contract_round_trip() {
    let mut engine = engine();
    let cid = engine.register_contract(ContractSpec {
        id: ContractId(1),
        name: "USD/LTC inverse".into(),
        collateral: LTC,
        notional_per_contract: dec!(100),
        inverse: true,
        pricing: ContractPricing::Oracle,
        init_margin_fraction: dec!(0.1),
    });
    let market = MarketKey::Contract(cid);

    let rob = Address::new("ltc1qrob6y");
    let sue = Address::new("ltc1qsue2j");
    fund(&mut engine, &rob, LTC, dec!(10));
    fund(&mut engine, &sue, LTC, dec!(10));

    engine.submit_order(limit(market, &rob, Side::Buy, dec!(10), dec!(100), 1, "r1"), BlockHeight(1));
    engine.submit_order(limit(market, &sue, Side::Sell, dec!(10), dec!(100), 1, "s1"), BlockHeight(1));
    engine.process_block(BlockHeight(1)).unwrap();

    // notional at 100 is 100/100 = 1 per contract
    assert_eq!(engine.positions().get(&rob, cid).margin, Amount::new(dec!(1)));

    engine.submit_order(limit(market, &rob, Side::Sell, dec!(10), dec!(125), 2, "r2"), BlockHeight(2));
    engine.submit_order(limit(market, &sue, Side::Buy, dec!(10), dec!(125), 2, "s2"), BlockHeight(2));
    engine.process_block(BlockHeight(2)).unwrap();

    // pnl in collateral: 10 * 100 * (1/100 - 1/125) = 2 LTC to the long
    let rob_pos = engine.positions().get(&rob, cid);
    assert!(rob_pos.contracts.is_zero());
    assert_eq!(rob_pos.realized_pnl, Amount::new(dec!(2)));
    assert_eq!(engine.tally().get(&rob, LTC).available, Amount::new(dec!(11.7555)));
    assert_eq!(engine.tally().get(&sue, LTC).available, Amount::new(dec!(7.7955)));
    assert_eq!(engine.insurance().balance(LTC), Amount::new(dec!(0.0045)));
}

#[test]
fn channel_trade_pays_half_the_taker_rate() {
    let mut engine = engine();
    let market = engine.add_spot_market(LTC, USDL);

    let alice = Address::new("ltc1qalice7x");
    let bob = Address::new("ltc1qbob4k");
    fund(&mut engine, &alice, USDL, dec!(10000));
    fund(&mut engine, &bob, LTC, dec!(100));

    engine.set_block(BlockHeight(1));
    let resting = engine
        .insert_and_match(limit(market, &bob, Side::Sell, dec!(10), dec!(95), 1, "b1"))
        .unwrap();
    assert!(resting.matches.is_empty());

    engine.set_block(BlockHeight(2));
    let crossing = engine
        .insert_and_match(limit(market, &alice, Side::Buy, dec!(10), dec!(95), 2, "a2"))
        .unwrap();
    let trades = engine.process_matches(crossing.matches, true).unwrap();

    // on-chain taker fee on 950 would be 0.475; the channel rate is half
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].buyer_fee, Amount::new(dec!(0.2375)));

    assert_eq!(engine.tally().get(&alice, USDL).available, Amount::new(dec!(9049.7625)));
    assert_eq!(engine.tally().get(&bob, USDL).available, Amount::new(dec!(950.11875)));
    assert_eq!(engine.insurance().balance(USDL), Amount::new(dec!(0.059375)));
    assert_eq!(engine.fee_cache().get(USDL, market).value, Amount::new(dec!(0.059375)));
}
