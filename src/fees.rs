// 7.0: fee computation, placement, and accrual.
// 7.1 calculate_fee: taker 500 ppm (5 bps), rebate = taker / 2, both halved on
//     channel trades. the satoshi fee is forced even before halving, so the
//     rebate is exactly half with no remainder lost.
// 7.2 locate_fee: a positive fee debits the first bucket that can cover it in
//     full, in strict order available -> reserve -> margin; never split.
// 7.3 accrue_fee: routes net taker revenue to the insurance fund and the fee
//     cache atomically with the debit. a fee is never left uncredited.

use crate::fee_cache::FeeCache;
use crate::insurance::InsuranceFund;
use crate::order::MarketKey;
use crate::tally::{BalanceReason, LedgerError, TallyStore};
use crate::types::{Address, Amount, AssetId, BlockHeight, Ppm, TxId};
use serde::{Deserialize, Serialize};

/// On-chain taker rate: 5 bps. Channel trades use half of this.
pub const TAKER_FEE_PPM: Ppm = Ppm(500);

/// Fee amounts for one match, all integer-satoshi exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    /// Full taker fee, forced even in satoshis.
    pub taker: Amount,
    /// Exactly half the taker fee. Paid to a maker, or charged to each side
    /// when neither is maker.
    pub half: Amount,
}

// 7.1
pub fn calculate_fee(notional: Amount, is_channel: bool) -> FeeQuote {
    let rate = if is_channel {
        TAKER_FEE_PPM.halved()
    } else {
        TAKER_FEE_PPM
    };
    let mut fee_sats = rate.apply_sats(notional.to_sats());
    if fee_sats % 2 != 0 {
        fee_sats += 1;
    }
    FeeQuote {
        taker: Amount::from_sats(fee_sats),
        half: Amount::from_sats(fee_sats / 2),
    }
}

/// Which bucket served a fee debit. The margin path needs to know whether the
/// fee came out of margin before computing the release on a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeBucket {
    Available,
    Reserve,
    Margin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatedFee {
    pub amount: Amount,
    pub bucket: FeeBucket,
}

impl LocatedFee {
    pub fn none() -> Self {
        Self {
            amount: Amount::zero(),
            bucket: FeeBucket::Available,
        }
    }

    pub fn from_margin(&self) -> bool {
        self.bucket == FeeBucket::Margin && self.amount.is_positive()
    }
}

// 7.2: debits the fee from the first bucket that covers it in full. when no
// bucket can, the richest bucket pays what it holds and the residue is
// simply never collected: a short fee shrinks revenue, it does not fail
// settlement.
pub fn locate_fee(
    tally: &mut TallyStore,
    address: &Address,
    asset: AssetId,
    fee: Amount,
    block: BlockHeight,
    txid: &TxId,
) -> Result<LocatedFee, LedgerError> {
    if fee.is_zero() {
        return Ok(LocatedFee::none());
    }
    debug_assert!(fee.is_positive(), "rebates go through credit_rebate");

    let current = tally.get(address, asset);
    let (bucket, take) = if current.available >= fee {
        (FeeBucket::Available, fee)
    } else if current.reserved >= fee {
        (FeeBucket::Reserve, fee)
    } else if current.margin >= fee {
        (FeeBucket::Margin, fee)
    } else if current.available >= current.reserved && current.available >= current.margin {
        (FeeBucket::Available, current.available)
    } else if current.reserved >= current.margin {
        (FeeBucket::Reserve, current.reserved)
    } else {
        (FeeBucket::Margin, current.margin)
    };
    if take.is_zero() {
        return Ok(LocatedFee::none());
    }

    let (d_avail, d_res, d_margin) = match bucket {
        FeeBucket::Available => (take.negate(), Amount::zero(), Amount::zero()),
        FeeBucket::Reserve => (Amount::zero(), take.negate(), Amount::zero()),
        FeeBucket::Margin => (Amount::zero(), Amount::zero(), take.negate()),
    };

    tally.update_balance(
        address,
        asset,
        d_avail,
        d_res,
        d_margin,
        Amount::zero(),
        BalanceReason::FeeDebit,
        block,
        txid,
    )?;

    Ok(LocatedFee { amount: take, bucket })
}

/// A maker rebate is a negative fee: always credited to available.
pub fn credit_rebate(
    tally: &mut TallyStore,
    address: &Address,
    asset: AssetId,
    rebate: Amount,
    block: BlockHeight,
    txid: &TxId,
) -> Result<(), LedgerError> {
    if rebate.is_zero() {
        return Ok(());
    }
    tally.update_balance(
        address,
        asset,
        rebate,
        Amount::zero(),
        Amount::zero(),
        Amount::zero(),
        BalanceReason::FeeRebate,
        block,
        txid,
    )
}

/// Where net taker revenue accrues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeKind {
    /// Spot pair: half insurance, half recognized cache value.
    Spot,
    /// Native contract: exposure is already on-chain collateral, so the whole
    /// net fee is recognized revenue with no insurance cut.
    NativeContract,
    /// Oracle contract: half insurance, half stashed pending buyback.
    OracleContract,
}

/// How one accrual split out, for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeAccrual {
    pub to_insurance: Amount,
    pub to_value: Amount,
    pub to_stash: Amount,
}

// 7.3: the insurance half floors in satoshis and the cache takes the
// remainder, so debit == rebate + insurance + cache to the satoshi.
pub fn accrue_fee(
    cache: &mut FeeCache,
    insurance: &mut InsuranceFund,
    asset: AssetId,
    market: MarketKey,
    net_revenue: Amount,
    kind: FeeKind,
    block: BlockHeight,
) -> FeeAccrual {
    debug_assert!(!net_revenue.is_negative());
    if net_revenue.is_zero() {
        return FeeAccrual {
            to_insurance: Amount::zero(),
            to_value: Amount::zero(),
            to_stash: Amount::zero(),
        };
    }

    match kind {
        FeeKind::NativeContract => {
            cache.credit_value(asset, market, net_revenue);
            FeeAccrual {
                to_insurance: Amount::zero(),
                to_value: net_revenue,
                to_stash: Amount::zero(),
            }
        }
        FeeKind::Spot => {
            let to_insurance = Amount::from_sats(net_revenue.to_sats() / 2);
            let to_value = net_revenue.sub(to_insurance);
            insurance.deposit(asset, to_insurance, block);
            cache.credit_value(asset, market, to_value);
            FeeAccrual {
                to_insurance,
                to_value,
                to_stash: Amount::zero(),
            }
        }
        FeeKind::OracleContract => {
            let to_insurance = Amount::from_sats(net_revenue.to_sats() / 2);
            let to_stash = net_revenue.sub(to_insurance);
            insurance.deposit(asset, to_insurance, block);
            cache.credit_stash(asset, market, to_stash);
            FeeAccrual {
                to_insurance,
                to_value: Amount::zero(),
                to_stash,
            }
        }
    }
}
