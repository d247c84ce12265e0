// Shared setup for module tests

use sails_rs::prelude::*;
use crate::{
    types::*,
    modules::{oracle::OracleModule, protocol::ProtocolModule, vault::VaultModule},
    ClearingState,
};

pub const ADMIN: u64 = 1;
pub const FEED: u64 = 2;
pub const ALICE: u64 = 10;
pub const BOB: u64 = 11;
pub const CAROL: u64 = 12;

pub fn actor(n: u64) -> ActorId {
    ActorId::from(n)
}

pub fn units(n: u128) -> u128 {
    n * PRICE_SCALE
}

/// European cash-settled ETH call, contract size 1
pub fn call_params(strike_units: u128, expiry: u64) -> SeriesParams {
    SeriesParams {
        underlying: String::from("ETH"),
        strike: units(strike_units),
        expiry,
        option_type: OptionType::Call,
        contract_size: 1,
        settlement_style: SettlementStyle::Cash,
        exercise_style: ExerciseStyle::European,
    }
}

pub fn put(params: SeriesParams) -> SeriesParams {
    SeriesParams { option_type: OptionType::Put, ..params }
}

pub fn american(params: SeriesParams) -> SeriesParams {
    SeriesParams { exercise_style: ExerciseStyle::American, ..params }
}

pub fn physical(params: SeriesParams) -> SeriesParams {
    SeriesParams { settlement_style: SettlementStyle::Physical, ..params }
}

/// Fresh state with FEED whitelisted
pub fn world() -> ClearingState {
    let mut st = ClearingState::new(actor(ADMIN));
    OracleModule::whitelist_oracle(&mut st, actor(ADMIN), actor(FEED), 0).unwrap();
    st
}

pub fn series(st: &mut ClearingState, params: SeriesParams) -> SeriesId {
    ProtocolModule::create_series(st, actor(ADMIN), params, 0).unwrap()
}

/// ETH spot in whole units
pub fn push_price(st: &mut ClearingState, price_units: u128, at: u64) {
    OracleModule::push_price(st, actor(FEED), String::from("ETH"), units(price_units), 0, at).unwrap();
}

/// Ten samples ending at `end`, enough for a TWAP over the default window
pub fn price_history(st: &mut ClearingState, price_units: u128, end: u64) {
    for i in 0..10u64 {
        push_price(st, price_units, end - 90 + i * 10);
    }
}

/// Open a vault and deposit `amount_units`
pub fn fund(st: &mut ClearingState, who: u64, amount_units: u128) {
    VaultModule::create_vault(st, actor(who), String::from("USDC"), 0).unwrap();
    deposit(st, who, amount_units);
}

pub fn deposit(st: &mut ClearingState, who: u64, amount_units: u128) {
    VaultModule::deposit_collateral(st, actor(who), "USDC", units(amount_units), 0).unwrap();
}
