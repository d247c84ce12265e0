use primitive_types::U256;
use sails_rs::gstd::exec;
use sails_rs::prelude::{H256, Vec};
use crate::{errors::Error, types::*};

/// Current block time in unix seconds (the runtime reports milliseconds)
#[inline]
pub fn now() -> u64 {
    exec::block_timestamp() / 1_000
}

/// `a * b / c` without intermediate overflow, rounding down
pub fn mul_div(a: u128, b: u128, c: u128) -> Result<u128, Error> {
    if c == 0 {
        return Err(Error::MathOverflow);
    }
    let r = U256::from(a) * U256::from(b) / U256::from(c);
    if r > U256::from(u128::MAX) {
        return Err(Error::MathOverflow);
    }
    Ok(r.as_u128())
}

/// `amount * bps / 10_000`, rounding down
pub fn apply_bps(amount: u128, bps: u16) -> Result<u128, Error> {
    mul_div(amount, bps as u128, BPS_DENOMINATOR)
}

/// Audit digest of a settlement snapshot
pub fn settlement_digest(
    series_id: SeriesId,
    kind: SettlementKind,
    settlement_price: u128,
    total_payoff: Amount,
    total_fees: Amount,
    initiated_at: u64,
) -> H256 {
    use sp_core::hashing::keccak_256;
    let mut data = Vec::with_capacity(8 + 1 + 16 * 3 + 8);
    data.extend_from_slice(&series_id.to_be_bytes());
    data.push(match kind {
        SettlementKind::Cash => 0,
        SettlementKind::Physical => 1,
        SettlementKind::EarlyExercise => 2,
    });
    data.extend_from_slice(&settlement_price.to_be_bytes());
    data.extend_from_slice(&total_payoff.to_be_bytes());
    data.extend_from_slice(&total_fees.to_be_bytes());
    data.extend_from_slice(&initiated_at.to_be_bytes());
    H256::from(keccak_256(&data))
}
