//! Settlement Core Simulation.
//!
//! Demonstrates the full settlement lifecycle: canonical queue ordering,
//! spot and contract matching, fee routing, margin movement, and the
//! loss-sourcing waterfall.

use rust_decimal_macros::dec;
use settlement_core::*;

const LTC: AssetId = AssetId(0);
const USDL: AssetId = AssetId(1);

fn main() {
    println!("Settlement Core Engine Simulation");
    println!("Deterministic Matching, Margin, and Loss Sourcing\n");

    scenario_1_spot_settlement();
    scenario_2_contract_open_close();
    scenario_3_flip_and_shrink();
    scenario_4_loss_waterfall();
    scenario_5_canonical_ordering();

    println!("\nAll simulations completed successfully.");
}

fn fund(engine: &mut Engine, who: &Address, asset: AssetId, amount: &str) {
    let amount = Amount::new(amount.parse().unwrap());
    let txid = TxId::new(format!("deposit-{}-{:?}", who.as_str(), asset));
    engine.deposit(who, asset, amount, &txid).unwrap();
}

fn stdl_contract() -> ContractSpec {
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

/// Spot pair settlement with a price-improvement refund for the buyer.
fn scenario_1_spot_settlement() {
    println!("Scenario 1: Spot Settlement\n");

    let mut engine = Engine::new(EngineConfig::default());
    let market = engine.add_spot_market(LTC, USDL);

    let alice = Address::new("ltc1qalice7x");
    let bob = Address::new("ltc1qbob4k");
    fund(&mut engine, &alice, USDL, "10000");
    fund(&mut engine, &bob, LTC, "100");

    println!("  Alice deposits 10,000 USDL; Bob deposits 100 LTC");

    engine.submit_order(
        Order::new_limit(
            market,
            bob.clone(),
            Side::Sell,
            dec!(10),
            Price::new_unchecked(dec!(95)),
            BlockHeight(1),
            TxId::new("aa01"),
        ),
        BlockHeight(1),
    );
    engine.submit_order(
        Order::new_limit(
            market,
            alice.clone(),
            Side::Buy,
            dec!(10),
            Price::new_unchecked(dec!(100)),
            BlockHeight(2),
            TxId::new("bb02"),
        ),
        BlockHeight(2),
    );

    engine.process_block(BlockHeight(1)).unwrap();
    let result = engine.process_block(BlockHeight(2)).unwrap();

    let trade = &result.trades[0];
    println!(
        "  Matched {} LTC @ {} USDL (maker: {:?})",
        trade.amount,
        trade.price.value(),
        trade.maker
    );
    println!(
        "  Alice now holds {} LTC, {} USDL available",
        engine.tally().get(&alice, LTC).available.value(),
        engine.tally().get(&alice, USDL).available.value(),
    );
    println!(
        "  Taker fee {} USDL, rebate half to Bob\n",
        trade.buyer_fee.value()
    );
}

/// Contract position lifecycle: open, extend, close with PnL.
fn scenario_2_contract_open_close() {
    println!("Scenario 2: Contract Open and Close\n");

    let mut engine = Engine::new(EngineConfig::default());
    let cid = engine.register_contract(stdl_contract());
    let market = MarketKey::Contract(cid);

    let carol = Address::new("ltc1qcarol2m");
    let dave = Address::new("ltc1qdave9z");
    fund(&mut engine, &carol, LTC, "5000");
    fund(&mut engine, &dave, LTC, "5000");

    let mut block = 1u64;
    for (price, carol_side, qty) in [
        (dec!(100), Side::Buy, dec!(10)),
        (dec!(100), Side::Buy, dec!(5)),
        (dec!(120), Side::Sell, dec!(15)),
    ] {
        let h = BlockHeight(block);
        engine.submit_order(
            Order::new_limit(
                market,
                carol.clone(),
                carol_side,
                qty,
                Price::new_unchecked(price),
                h,
                TxId::new(format!("c{block:02}")),
            ),
            h,
        );
        engine.submit_order(
            Order::new_limit(
                market,
                dave.clone(),
                carol_side.opposite(),
                qty,
                Price::new_unchecked(price),
                h,
                TxId::new(format!("d{block:02}")),
            ),
            h,
        );
        let result = engine.process_block(h).unwrap();
        for t in &result.trades {
            println!(
                "  Block {}: {} contracts @ {} (closed {}, opened rest)",
                block,
                t.amount,
                t.price.value(),
                t.buyer_closed.max(t.seller_closed)
            );
        }
        block += 1;
    }

    let pos = engine.positions().get(&carol, cid);
    println!(
        "  Carol flat: {} contracts, realized pnl {} LTC",
        pos.contracts.value(),
        pos.realized_pnl.value()
    );
    println!(
        "  Insurance fund holds {} LTC from fee accrual\n",
        engine.insurance().balance(LTC).value()
    );
}

/// A short that flips long, with the opening leg shrunk to what margin the
/// buyer can actually cover.
fn scenario_3_flip_and_shrink() {
    println!("Scenario 3: Flip With Margin Shrink\n");

    let mut engine = Engine::new(EngineConfig::default());
    let cid = engine.register_contract(stdl_contract());
    let market = MarketKey::Contract(cid);

    let erin = Address::new("ltc1qerin5p");
    let frank = Address::new("ltc1qfrank1w");
    fund(&mut engine, &erin, LTC, "36");
    fund(&mut engine, &frank, LTC, "50000");

    let h = BlockHeight(1);
    engine.submit_order(
        Order::new_limit(market, erin.clone(), Side::Sell, dec!(3), Price::new_unchecked(dec!(100)), h, TxId::new("e01")),
        h,
    );
    engine.submit_order(
        Order::new_limit(market, frank.clone(), Side::Buy, dec!(3), Price::new_unchecked(dec!(100)), h, TxId::new("f01")),
        h,
    );
    engine.process_block(h).unwrap();

    let h = BlockHeight(2);
    engine.submit_order(
        Order::new_limit(market, frank.clone(), Side::Sell, dec!(10), Price::new_unchecked(dec!(100)), h, TxId::new("f02")),
        h,
    );
    engine.process_block(h).unwrap();

    // the flip arrives once the ask is resting
    let h = BlockHeight(3);
    engine.submit_order(
        Order::new_market(cid, erin.clone(), Side::Buy, dec!(10), h, TxId::new("e03")),
        h,
    );
    engine.process_block(h).unwrap();

    let pos = engine.positions().get(&erin, cid);
    println!(
        "  Erin flipped short 3 into long {} (margin {})",
        pos.contracts.value(),
        pos.margin.value()
    );
    for event in engine.recent_events(40) {
        if let EventPayload::QuantityShrunk(e) = &event.payload {
            println!(
                "  Opening leg shrunk: requested {}, kept {}",
                e.requested, e.kept
            );
        }
    }
    println!();
}

/// A losing close drains available, capped margin, then forced cancels.
fn scenario_4_loss_waterfall() {
    println!("Scenario 4: Loss Sourcing Waterfall\n");

    let mut engine = Engine::new(EngineConfig::default());
    let cid = engine.register_contract(stdl_contract());
    let market = MarketKey::Contract(cid);

    let gina = Address::new("ltc1qgina8r");
    let hank = Address::new("ltc1qhank3t");
    fund(&mut engine, &gina, LTC, "25");
    fund(&mut engine, &hank, LTC, "100000");

    // gina longs 1 contract at 100, then the price collapses to 20
    let h = BlockHeight(1);
    engine.submit_order(
        Order::new_limit(market, gina.clone(), Side::Buy, dec!(1), Price::new_unchecked(dec!(100)), h, TxId::new("g01")),
        h,
    );
    engine.submit_order(
        Order::new_limit(market, hank.clone(), Side::Sell, dec!(1), Price::new_unchecked(dec!(100)), h, TxId::new("h01")),
        h,
    );
    engine.process_block(h).unwrap();

    // a resting order whose reserve the waterfall will cancel into
    let h = BlockHeight(2);
    engine.submit_order(
        Order::new_limit(market, gina.clone(), Side::Buy, dec!(1), Price::new_unchecked(dec!(15)), h, TxId::new("g02")),
        h,
    );
    engine.process_block(h).unwrap();

    let h = BlockHeight(3);
    engine.submit_order(
        Order::new_limit(market, gina.clone(), Side::Sell, dec!(1), Price::new_unchecked(dec!(20)), h, TxId::new("g03")),
        h,
    );
    engine.submit_order(
        Order::new_limit(market, hank.clone(), Side::Buy, dec!(1), Price::new_unchecked(dec!(20)), h, TxId::new("h03")),
        h,
    );
    let result = engine.process_block(h).unwrap();

    let trade = &result.trades[0];
    println!("  Gina closed at 20 against entry 100: loss 80 LTC");
    println!("  Unrecovered shortfall: {} LTC", trade.seller_shortfall.value());
    let tally = engine.tally().get(&gina, LTC);
    println!(
        "  Gina after waterfall: available {}, reserved {}, margin {}\n",
        tally.available.value(),
        tally.reserved.value(),
        tally.margin.value()
    );
}

/// The same block contents settle identically regardless of arrival order.
fn scenario_5_canonical_ordering() {
    println!("Scenario 5: Canonical Queue Ordering\n");

    let senders = ["ltc1qzz9", "ltc1qaa1", "ltc1qab2"];
    let mut totals = Vec::new();

    for permutation in [[0usize, 1, 2], [2, 1, 0], [1, 2, 0]] {
        let mut engine = Engine::new(EngineConfig::default());
        let market = engine.add_spot_market(LTC, USDL);
        for s in senders {
            fund(&mut engine, &Address::new(s), USDL, "1000");
            fund(&mut engine, &Address::new(s), LTC, "1000");
        }

        let h = BlockHeight(1);
        for idx in permutation {
            let side = if idx == 0 { Side::Sell } else { Side::Buy };
            engine.submit_order(
                Order::new_limit(
                    market,
                    Address::new(senders[idx]),
                    side,
                    dec!(5),
                    Price::new_unchecked(dec!(100)),
                    h,
                    TxId::new(format!("tx{idx}")),
                ),
                h,
            );
        }
        let result = engine.process_block(h).unwrap();
        totals.push((
            result.trades.len(),
            result.trades.first().map(|t| t.buyer.clone()),
        ));
    }

    println!("  Three arrival orders, one outcome: {:?}", totals[0]);
    assert!(totals.windows(2).all(|w| w[0] == w[1]));
    println!("  All permutations settled identically\n");
}
