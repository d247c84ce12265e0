use sails_rs::prelude::*;
use crate::{
    types::*,
    errors::Error,
    events::ClearingEvent,
    modules::{
        access::AccessModule,
        compliance::ComplianceModule,
        margin::MarginModule,
        oracle::OracleModule,
        settlement::SettlementModule,
        vault::VaultModule,
    },
    ClearingState,
};

/// User-facing orchestration. Each operation validates everything it can
/// up front and only then calls into the component modules.
pub struct ProtocolModule;

impl ProtocolModule {
    pub fn pause(st: &mut ClearingState, caller: ActorId, now: u64) -> Result<(), Error> {
        AccessModule::require_any(&st.roles, caller, &[Role::Admin, Role::Guardian])?;
        if !st.paused {
            st.paused = true;
            st.emit(now, ClearingEvent::Paused { by: caller });
        }
        Ok(())
    }

    pub fn resume(st: &mut ClearingState, caller: ActorId, now: u64) -> Result<(), Error> {
        AccessModule::require_any(&st.roles, caller, &[Role::Admin, Role::Guardian])?;
        if st.paused {
            st.paused = false;
            st.emit(now, ClearingEvent::Resumed { by: caller });
        }
        Ok(())
    }

    pub fn update_config(st: &mut ClearingState, caller: ActorId, config: ProtocolConfig, now: u64) -> Result<(), Error> {
        AccessModule::require(&st.roles, caller, Role::Admin)?;
        validate_config(&config)?;
        if config.collateral_asset != st.config.collateral_asset && !st.vaults.is_empty() {
            return Err(Error::InvalidParameter);
        }
        st.config = config;
        st.emit(now, ClearingEvent::ConfigUpdated);
        Ok(())
    }

    pub fn create_series(st: &mut ClearingState, caller: ActorId, params: SeriesParams, now: u64) -> Result<SeriesId, Error> {
        AccessModule::require(&st.roles, caller, Role::Issuer)?;
        if params.underlying.is_empty() || params.contract_size == 0 {
            return Err(Error::InvalidParameter);
        }
        if params.strike == 0 || params.strike > MAX_VALID_PRICE {
            return Err(Error::InvalidPrice);
        }
        if params.expiry <= now {
            return Err(Error::SeriesExpired);
        }

        let id = st.generate_series_id();
        let underlying = params.underlying.clone();
        st.series.insert(
            id,
            OptionSeries {
                id,
                underlying: params.underlying,
                strike: params.strike,
                expiry: params.expiry,
                option_type: params.option_type,
                contract_size: params.contract_size,
                settlement_style: params.settlement_style,
                exercise_style: params.exercise_style,
                issuer: caller,
                created_at: now,
            },
        );
        st.stats.series_created += 1;
        st.emit(now, ClearingEvent::SeriesCreated { series_id: id, issuer: caller, underlying });
        Ok(id)
    }

    /// Open or grow a long. Buyers post no collateral but must carry the
    /// margin in their vault.
    pub fn buy(st: &mut ClearingState, caller: ActorId, series_id: SeriesId, quantity: u128, price: u128, now: u64) -> Result<Position, Error> {
        Self::check_trade(st, caller, series_id, Direction::Long, quantity, price, now)?;
        let is_american = st.get_series(series_id)?.is_american();
        let opened = !st.positions.contains_key(&PositionKey::new(caller, series_id));

        MarginModule::register_position(st, caller, series_id, Direction::Long, quantity, price, is_american, 0, now)?;

        if opened {
            st.stats.positions_opened += 1;
        }
        st.stats.long_volume = st.stats.long_volume.saturating_add(quantity);
        MarginModule::get_position(st, caller, series_id)
    }

    /// Open or grow a short. The position's margin is locked in the
    /// writer's vault.
    pub fn write(st: &mut ClearingState, caller: ActorId, series_id: SeriesId, quantity: u128, price: u128, now: u64) -> Result<Position, Error> {
        let margin = Self::check_trade(st, caller, series_id, Direction::Short, quantity, price, now)?;
        VaultModule::ensure_can_lock(st, caller, margin)?;
        let is_american = st.get_series(series_id)?.is_american();
        let opened = !st.positions.contains_key(&PositionKey::new(caller, series_id));

        VaultModule::lock_for_position(st, caller, margin, now)?;
        MarginModule::register_position(st, caller, series_id, Direction::Short, quantity, price, is_american, margin, now)?;

        if opened {
            st.stats.positions_opened += 1;
        }
        st.stats.short_volume = st.stats.short_volume.saturating_add(quantity);
        MarginModule::get_position(st, caller, series_id)
    }

    /// Shared pre-trade checks, in order: live series and inputs,
    /// compliance, then margin on the current mark. Returns the margin the
    /// trade adds.
    #[allow(clippy::too_many_arguments)]
    fn check_trade(
        st: &ClearingState,
        caller: ActorId,
        series_id: SeriesId,
        direction: Direction,
        quantity: u128,
        price: u128,
        now: u64,
    ) -> Result<Amount, Error> {
        st.ensure_not_paused()?;
        let series = st.get_series(series_id)?;
        if series.is_expired(now) {
            return Err(Error::SeriesExpired);
        }
        if st.settlements.contains_key(&series_id) {
            return Err(Error::AlreadySettled);
        }
        if quantity == 0 {
            return Err(Error::InvalidAmount);
        }
        if !(MIN_VALID_PRICE..=MAX_VALID_PRICE).contains(&price) {
            return Err(Error::InvalidPrice);
        }
        if st
            .positions
            .get(&PositionKey::new(caller, series_id))
            .is_some_and(|p| p.direction != direction)
        {
            return Err(Error::ConflictingPosition);
        }

        ComplianceModule::ensure_eligible(&st.compliance, caller, series_id)?;

        let mark = MarginModule::mark_price(st, series_id, now)?;
        let margin = MarginModule::margin_for(st, quantity, mark, series.is_american())?;
        let required = MarginModule::total_required_margin(st, caller)
            .checked_add(margin)
            .ok_or(Error::MathOverflow)?;
        if VaultModule::deposited(st, caller) < required {
            return Err(Error::InsufficientMargin);
        }
        Ok(margin)
    }

    /// Exercise at or after expiry: settles the series if nobody has yet,
    /// then runs (or resumes) disbursement.
    pub fn exercise(st: &mut ClearingState, caller: ActorId, series_id: SeriesId, now: u64) -> Result<SettlementRecord, Error> {
        st.ensure_not_paused()?;
        let series = st.get_series(series_id)?;
        if !series.is_expired(now) {
            return Err(Error::SeriesNotExpired);
        }
        let style = series.settlement_style;
        if !MarginModule::get_position(st, caller, series_id)?.is_long() {
            return Err(Error::PositionNotFound);
        }
        ComplianceModule::ensure_eligible(&st.compliance, caller, series_id)?;

        if !st.settlements.contains_key(&series_id) {
            SettlementModule::initiate(st, series_id, style, now)?;
        }
        SettlementModule::run_disbursement(st, series_id, u32::MAX, now)?;
        SettlementModule::get_settlement(st, series_id)
    }

    /// American early exercise at the underlying's fresh spot
    pub fn early_exercise(st: &mut ClearingState, caller: ActorId, series_id: SeriesId, quantity: u128, now: u64) -> Result<ExerciseId, Error> {
        st.ensure_not_paused()?;
        ComplianceModule::ensure_eligible(&st.compliance, caller, series_id)?;
        let underlying = &st.get_series(series_id)?.underlying;
        let spot = OracleModule::fresh_price(st, underlying, now)?;

        let exercise_id = SettlementModule::handle_early_exercise(st, caller, series_id, quantity, spot, now)?;
        MarginModule::recompute_portfolio(st, caller, now);
        st.stats.early_exercises += 1;
        Ok(exercise_id)
    }

    /// Remove one position of an under-margined account. A short's posted
    /// collateral goes to the insurance fund; returns the seized amount.
    pub fn liquidate(st: &mut ClearingState, caller: ActorId, account: ActorId, series_id: SeriesId, now: u64) -> Result<Amount, Error> {
        st.ensure_not_paused()?;
        AccessModule::require(&st.roles, caller, Role::Operator)?;
        let pos = MarginModule::get_position(st, account, series_id)?;
        Self::ensure_positions_open(st, series_id, now)?;
        if MarginModule::check_margin_requirements(st, account) {
            return Err(Error::PositionNotLiquidatable);
        }

        MarginModule::liquidate_position(st, series_id, account, now)?;
        let mut seized = 0;
        if pos.collateral_posted > 0 {
            let locked = st.vaults.get(&account).map(|v| v.locked).unwrap_or(0);
            seized = VaultModule::seize_locked(st, account, pos.collateral_posted.min(locked), now)?;
        }
        st.stats.insurance_fund = st.stats.insurance_fund.saturating_add(seized);
        st.stats.liquidations += 1;
        Ok(seized)
    }

    /// Close out every position of an under-margined account and seize
    /// all of its locked collateral
    pub fn liquidate_account(st: &mut ClearingState, caller: ActorId, account: ActorId, now: u64) -> Result<Amount, Error> {
        st.ensure_not_paused()?;
        AccessModule::require(&st.roles, caller, Role::Operator)?;
        let positions = MarginModule::account_positions(st, account);
        if positions.is_empty() {
            return Err(Error::PositionNotFound);
        }
        for pos in &positions {
            Self::ensure_positions_open(st, pos.series_id, now)?;
        }
        if MarginModule::check_margin_requirements(st, account) {
            return Err(Error::PositionNotLiquidatable);
        }

        for pos in &positions {
            MarginModule::liquidate_position(st, pos.series_id, account, now)?;
        }
        let seized = if st.vaults.contains_key(&account) {
            VaultModule::force_liquidate(st, account, now)?
        } else {
            0
        };
        st.stats.insurance_fund = st.stats.insurance_fund.saturating_add(seized);
        st.stats.liquidations += positions.len() as u64;
        Ok(seized)
    }

    pub fn refresh_margin(st: &mut ClearingState, account: ActorId, series_id: SeriesId, now: u64) -> Result<MarginUpdate, Error> {
        st.ensure_not_paused()?;
        Self::ensure_positions_open(st, series_id, now)?;
        MarginModule::update_position_margin(st, account, series_id, now)
    }

    /// Once a series expires its positions belong to settlement and must
    /// not be removed or re-marked.
    fn ensure_positions_open(st: &ClearingState, series_id: SeriesId, now: u64) -> Result<(), Error> {
        if st.settlements.contains_key(&series_id) {
            return Err(Error::AlreadySettled);
        }
        if st.get_series(series_id)?.is_expired(now) {
            return Err(Error::SeriesExpired);
        }
        Ok(())
    }

    pub fn stats(st: &ClearingState) -> ProtocolStats {
        st.stats.clone()
    }
}

pub fn validate_config(config: &ProtocolConfig) -> Result<(), Error> {
    let max_bps = BPS_DENOMINATOR as u16;
    if config.collateral_asset.is_empty() {
        return Err(Error::InvalidParameter);
    }
    if config.settlement_fee_bps > max_bps || config.early_exercise_fee_bps > max_bps || config.american_premium_bps > max_bps {
        return Err(Error::InvalidParameter);
    }
    if config.early_exercise_fee_bps <= config.settlement_fee_bps {
        return Err(Error::InvalidParameter);
    }
    if config.max_staleness_secs == 0
        || config.twap_window_secs == 0
        || config.min_twap_samples == 0
        || config.max_history_len == 0
        || config.journal_capacity == 0
    {
        return Err(Error::InvalidParameter);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::fixtures::{self, actor, units, ADMIN, ALICE, BOB, CAROL};

    fn market() -> (ClearingState, SeriesId) {
        let mut st = fixtures::world();
        fixtures::fund(&mut st, ALICE, 1_000);
        fixtures::fund(&mut st, BOB, 1_000);
        let series_id = fixtures::series(&mut st, fixtures::call_params(100, 5_000));
        fixtures::push_price(&mut st, 50, 0);
        (st, series_id)
    }

    #[test]
    fn guardian_pauses_user_calls_but_not_oracle() {
        let (mut st, series_id) = market();
        assert_eq!(ProtocolModule::pause(&mut st, actor(ALICE), 1), Err(Error::Unauthorized));
        AccessModule::grant_role(&mut st, actor(ADMIN), actor(CAROL), Role::Guardian, 1).unwrap();
        ProtocolModule::pause(&mut st, actor(CAROL), 2).unwrap();
        assert!(st.paused);

        assert_eq!(ProtocolModule::buy(&mut st, actor(ALICE), series_id, 1, units(5), 3), Err(Error::ProtocolPaused));
        assert_eq!(ProtocolModule::write(&mut st, actor(BOB), series_id, 1, units(5), 3), Err(Error::ProtocolPaused));
        fixtures::push_price(&mut st, 150, 3);

        ProtocolModule::resume(&mut st, actor(CAROL), 4).unwrap();
        ProtocolModule::buy(&mut st, actor(ALICE), series_id, 1, units(5), 5).unwrap();
    }

    #[test]
    fn create_series_validates_params() {
        let mut st = fixtures::world();
        let params = fixtures::call_params(100, 5_000);
        assert_eq!(ProtocolModule::create_series(&mut st, actor(ALICE), params.clone(), 0), Err(Error::Unauthorized));
        assert_eq!(
            ProtocolModule::create_series(&mut st, actor(ADMIN), SeriesParams { strike: 0, ..params.clone() }, 0),
            Err(Error::InvalidPrice)
        );
        assert_eq!(
            ProtocolModule::create_series(&mut st, actor(ADMIN), SeriesParams { contract_size: 0, ..params.clone() }, 0),
            Err(Error::InvalidParameter)
        );
        assert_eq!(ProtocolModule::create_series(&mut st, actor(ADMIN), params.clone(), 5_000), Err(Error::SeriesExpired));

        AccessModule::grant_role(&mut st, actor(ADMIN), actor(CAROL), Role::Issuer, 0).unwrap();
        assert_eq!(ProtocolModule::create_series(&mut st, actor(CAROL), params.clone(), 0), Ok(1));
        assert_eq!(ProtocolModule::create_series(&mut st, actor(CAROL), params, 0), Ok(2));
        assert_eq!(st.series[&1].issuer, actor(CAROL));
        assert_eq!(st.stats.series_created, 2);
    }

    #[test]
    fn buy_checks_compliance_before_margin() {
        let (mut st, series_id) = market();
        ComplianceModule::set_account_blocked(&mut st, actor(ADMIN), actor(CAROL), true, 1).unwrap();
        // Carol has no vault either; compliance is reported first
        assert_eq!(ProtocolModule::buy(&mut st, actor(CAROL), series_id, 1, units(5), 2), Err(Error::ComplianceRejected));
        ComplianceModule::set_account_blocked(&mut st, actor(ADMIN), actor(CAROL), false, 3).unwrap();
        assert_eq!(ProtocolModule::buy(&mut st, actor(CAROL), series_id, 1, units(5), 4), Err(Error::InsufficientMargin));

        assert_eq!(ProtocolModule::buy(&mut st, actor(ALICE), series_id, 21, units(50), 5), Err(Error::InsufficientMargin));
        let pos = ProtocolModule::buy(&mut st, actor(ALICE), series_id, 20, units(50), 5).unwrap();
        assert_eq!((pos.direction, pos.quantity, pos.required_margin, pos.collateral_posted), (Direction::Long, 20, units(1_000), 0));
        assert_eq!(st.vaults[&actor(ALICE)].locked, 0);
        assert_eq!((st.stats.positions_opened, st.stats.long_volume), (1, 20));
    }

    #[test]
    fn write_locks_margin_as_collateral() {
        let (mut st, series_id) = market();
        let pos = ProtocolModule::write(&mut st, actor(BOB), series_id, 4, units(50), 1).unwrap();
        assert_eq!(pos.collateral_posted, units(200));
        assert_eq!(st.vaults[&actor(BOB)].locked, units(200));

        // adding to the short locks the extra margin
        ProtocolModule::write(&mut st, actor(BOB), series_id, 2, units(50), 2).unwrap();
        assert_eq!(st.vaults[&actor(BOB)].locked, units(300));
        assert_eq!(MarginModule::get_position(&st, actor(BOB), series_id).unwrap().collateral_posted, units(300));
        assert_eq!((st.stats.positions_opened, st.stats.short_volume), (1, 6));

        assert_eq!(ProtocolModule::buy(&mut st, actor(BOB), series_id, 1, units(50), 3), Err(Error::ConflictingPosition));
        assert_eq!(ProtocolModule::write(&mut st, actor(BOB), series_id, 15, units(50), 3), Err(Error::InsufficientMargin));
    }

    #[test]
    fn write_needs_free_collateral_not_just_margin() {
        let (mut st, series_id) = market();
        let other = fixtures::series(&mut st, fixtures::put(fixtures::call_params(100, 5_000)));
        ProtocolModule::write(&mut st, actor(BOB), series_id, 20, units(50), 1).unwrap();
        assert_eq!(ProtocolModule::write(&mut st, actor(BOB), other, 1, units(1), 2), Err(Error::InsufficientMargin));

        fixtures::deposit(&mut st, BOB, 100);
        // margin now fits, but an unrelated lock holds the free balance
        VaultModule::lock_for_position(&mut st, actor(BOB), units(100), 3).unwrap();
        assert_eq!(ProtocolModule::write(&mut st, actor(BOB), other, 1, units(50), 4), Err(Error::InsufficientCollateral));
        assert!(MarginModule::get_position(&st, actor(BOB), other).is_err());
        assert_eq!(st.vaults[&actor(BOB)].locked, units(1_100));
    }

    #[test]
    fn trades_require_a_live_series() {
        let (mut st, series_id) = market();
        assert_eq!(ProtocolModule::buy(&mut st, actor(ALICE), series_id, 1, units(5), 5_000), Err(Error::SeriesExpired));
        assert_eq!(ProtocolModule::buy(&mut st, actor(ALICE), 42, 1, units(5), 1), Err(Error::SeriesNotFound));
        assert_eq!(ProtocolModule::buy(&mut st, actor(ALICE), series_id, 0, units(5), 1), Err(Error::InvalidAmount));
        assert_eq!(ProtocolModule::buy(&mut st, actor(ALICE), series_id, 1, 0, 1), Err(Error::InvalidPrice));
    }

    #[test]
    fn exercise_settles_and_disburses_once() {
        let (mut st, series_id) = market();
        ProtocolModule::buy(&mut st, actor(ALICE), series_id, 2, units(60), 1).unwrap();
        ProtocolModule::write(&mut st, actor(BOB), series_id, 2, units(60), 1).unwrap();
        assert_eq!(ProtocolModule::exercise(&mut st, actor(ALICE), series_id, 4_000), Err(Error::SeriesNotExpired));

        fixtures::price_history(&mut st, 150, 5_040);
        OracleModule::set_settlement_price(&mut st, actor(ADMIN), series_id, 5_050).unwrap();
        assert_eq!(ProtocolModule::exercise(&mut st, actor(BOB), series_id, 5_060), Err(Error::PositionNotFound));

        let record = ProtocolModule::exercise(&mut st, actor(ALICE), series_id, 5_060).unwrap();
        assert_eq!(record.status, SettlementStatus::Completed);
        assert_eq!(record.kind, SettlementKind::Cash);
        assert_eq!(ProtocolModule::exercise(&mut st, actor(ALICE), series_id, 5_070), Err(Error::PositionNotFound));
        assert_eq!(SettlementModule::settle_cash(&mut st, actor(ADMIN), series_id, 5_070), Err(Error::AlreadySettled));
    }

    #[test]
    fn exercise_resumes_a_partial_disbursement() {
        let (mut st, series_id) = market();
        ProtocolModule::buy(&mut st, actor(ALICE), series_id, 2, units(60), 1).unwrap();
        ProtocolModule::write(&mut st, actor(BOB), series_id, 2, units(60), 1).unwrap();
        fixtures::price_history(&mut st, 150, 5_040);
        OracleModule::set_settlement_price(&mut st, actor(ADMIN), series_id, 5_050).unwrap();
        SettlementModule::settle_cash(&mut st, actor(ADMIN), series_id, 5_050).unwrap();

        // the first batch settles Bob's short; Alice's exercise finishes the rest
        SettlementModule::disburse_batch(&mut st, actor(ADMIN), series_id, 1, 5_051).unwrap();
        assert_eq!(st.settlements[&series_id].status, SettlementStatus::InProgress);
        let record = ProtocolModule::exercise(&mut st, actor(ALICE), series_id, 5_052).unwrap();
        assert_eq!((record.status, record.positions_settled), (SettlementStatus::Completed, 2));
        assert_eq!(ProtocolModule::exercise(&mut st, actor(ALICE), series_id, 5_053), Err(Error::PositionNotFound));
    }

    #[test]
    fn early_exercise_uses_fresh_spot() {
        let mut st = fixtures::world();
        fixtures::fund(&mut st, ALICE, 1_000);
        fixtures::fund(&mut st, BOB, 1_000);
        let series_id = fixtures::series(&mut st, fixtures::american(fixtures::call_params(100, 10_000)));
        fixtures::push_price(&mut st, 60, 0);
        ProtocolModule::buy(&mut st, actor(ALICE), series_id, 2, units(5), 1).unwrap();
        ProtocolModule::write(&mut st, actor(BOB), series_id, 2, units(5), 1).unwrap();

        assert_eq!(ProtocolModule::early_exercise(&mut st, actor(ALICE), series_id, 1, 400), Err(Error::PriceStale));
        fixtures::push_price(&mut st, 130, 400);
        let exercise_id = ProtocolModule::early_exercise(&mut st, actor(ALICE), series_id, 1, 450).unwrap();
        let record = SettlementModule::get_early_exercise(&st, exercise_id).unwrap();
        assert_eq!(record.settlement_price, units(130));
        assert_eq!(record.total_payoff, units(30));
        assert_eq!(st.stats.early_exercises, 1);
        assert_eq!(MarginModule::get_portfolio_summary(&st, actor(ALICE)).long_quantity, 1);
    }

    #[test]
    fn liquidation_only_when_under_margined() {
        let (mut st, series_id) = market();
        ProtocolModule::write(&mut st, actor(BOB), series_id, 10, units(50), 1).unwrap();
        assert_eq!(ProtocolModule::liquidate(&mut st, actor(ADMIN), actor(BOB), series_id, 2), Err(Error::PositionNotLiquidatable));

        // spot rallies; the refreshed margin exceeds Bob's deposit
        fixtures::push_price(&mut st, 150, 10);
        let update = ProtocolModule::refresh_margin(&mut st, actor(BOB), series_id, 11).unwrap();
        assert_eq!(update.margin_after, units(1_500));
        assert!(!MarginModule::check_margin_requirements(&st, actor(BOB)));

        assert_eq!(ProtocolModule::liquidate(&mut st, actor(ALICE), actor(BOB), series_id, 12), Err(Error::Unauthorized));
        assert_eq!(ProtocolModule::liquidate(&mut st, actor(ADMIN), actor(BOB), series_id, 12), Ok(units(500)));
        let bob = &st.vaults[&actor(BOB)];
        assert_eq!((bob.deposited, bob.locked), (units(500), 0));
        assert_eq!(st.stats.insurance_fund, units(500));
        assert_eq!(st.stats.liquidations, 1);
        assert_eq!(ProtocolModule::liquidate(&mut st, actor(ADMIN), actor(BOB), series_id, 13), Err(Error::PositionNotFound));
    }

    #[test]
    fn margin_at_open_holds_on_refresh() {
        let (mut st, series_id) = market();
        fixtures::deposit(&mut st, BOB, 1_000);
        fixtures::push_price(&mut st, 150, 1);
        // a cheap premium does not shrink the margin; it follows the spot
        let pos = ProtocolModule::write(&mut st, actor(BOB), series_id, 10, units(5), 1).unwrap();
        assert_eq!(pos.required_margin, units(1_500));

        let update = ProtocolModule::refresh_margin(&mut st, actor(BOB), series_id, 2).unwrap();
        assert_eq!((update.margin_before, update.margin_after), (units(1_500), units(1_500)));
        assert!(MarginModule::check_margin_requirements(&st, actor(BOB)));
        assert_eq!(ProtocolModule::liquidate(&mut st, actor(ADMIN), actor(BOB), series_id, 3), Err(Error::PositionNotLiquidatable));
    }

    #[test]
    fn trades_need_a_fresh_mark() {
        let (mut st, series_id) = market();
        assert_eq!(ProtocolModule::write(&mut st, actor(BOB), series_id, 1, units(5), 301), Err(Error::PriceStale));
        assert!(st.vaults[&actor(BOB)].locked == 0 && st.positions.is_empty());
    }

    #[test]
    fn settling_series_positions_are_frozen() {
        let (mut st, series_id) = market();
        ProtocolModule::buy(&mut st, actor(ALICE), series_id, 2, units(5), 1).unwrap();
        ProtocolModule::write(&mut st, actor(BOB), series_id, 2, units(5), 1).unwrap();
        fixtures::price_history(&mut st, 150, 5_040);
        OracleModule::set_settlement_price(&mut st, actor(ADMIN), series_id, 5_050).unwrap();

        // expired but not yet settled
        assert_eq!(ProtocolModule::refresh_margin(&mut st, actor(ALICE), series_id, 5_050), Err(Error::SeriesExpired));
        assert_eq!(ProtocolModule::liquidate(&mut st, actor(ADMIN), actor(BOB), series_id, 5_050), Err(Error::SeriesExpired));

        SettlementModule::settle_cash(&mut st, actor(ADMIN), series_id, 5_050).unwrap();
        fixtures::push_price(&mut st, 1_000, 5_060);
        assert_eq!(ProtocolModule::refresh_margin(&mut st, actor(ALICE), series_id, 5_061), Err(Error::AlreadySettled));
        assert_eq!(ProtocolModule::liquidate(&mut st, actor(ADMIN), actor(ALICE), series_id, 5_061), Err(Error::AlreadySettled));
        assert_eq!(ProtocolModule::liquidate_account(&mut st, actor(ADMIN), actor(BOB), 5_061), Err(Error::AlreadySettled));
        assert_eq!(st.positions.len(), 2);

        let record = SettlementModule::disburse_payouts(&mut st, actor(ADMIN), series_id, 5_062).unwrap();
        assert_eq!((record.status, record.shortfall), (SettlementStatus::Completed, 0));
        assert_eq!(st.vaults[&actor(ALICE)].deposited, units(1_100) - units(100) / 1_000);
        assert_eq!(st.vaults[&actor(BOB)].deposited, units(900));
    }

    #[test]
    fn liquidate_account_clears_everything() {
        let (mut st, series_id) = market();
        let other = fixtures::series(&mut st, fixtures::put(fixtures::call_params(100, 5_000)));
        ProtocolModule::write(&mut st, actor(BOB), series_id, 4, units(50), 1).unwrap();
        ProtocolModule::write(&mut st, actor(BOB), other, 4, units(50), 1).unwrap();
        assert_eq!(ProtocolModule::liquidate_account(&mut st, actor(ADMIN), actor(BOB), 2), Err(Error::PositionNotLiquidatable));

        fixtures::push_price(&mut st, 300, 10);
        ProtocolModule::refresh_margin(&mut st, actor(BOB), series_id, 11).unwrap();
        assert_eq!(ProtocolModule::liquidate_account(&mut st, actor(ADMIN), actor(BOB), 12), Ok(units(400)));
        assert!(MarginModule::account_positions(&st, actor(BOB)).is_empty());
        let bob = &st.vaults[&actor(BOB)];
        assert_eq!((bob.deposited, bob.locked), (units(600), 0));
        assert_eq!(st.stats.liquidations, 2);
        assert_eq!(ProtocolModule::liquidate_account(&mut st, actor(ADMIN), actor(BOB), 13), Err(Error::PositionNotFound));
    }

    #[test]
    fn config_updates_are_validated() {
        let mut st = fixtures::world();
        let mut config = st.config.clone();
        config.early_exercise_fee_bps = config.settlement_fee_bps;
        assert_eq!(ProtocolModule::update_config(&mut st, actor(ADMIN), config.clone(), 1), Err(Error::InvalidParameter));

        config.early_exercise_fee_bps = 25;
        config.twap_window_secs = 0;
        assert_eq!(ProtocolModule::update_config(&mut st, actor(ADMIN), config.clone(), 1), Err(Error::InvalidParameter));

        config.twap_window_secs = 1_800;
        assert_eq!(ProtocolModule::update_config(&mut st, actor(ALICE), config.clone(), 1), Err(Error::Unauthorized));
        ProtocolModule::update_config(&mut st, actor(ADMIN), config.clone(), 1).unwrap();
        assert_eq!(st.config.twap_window_secs, 1_800);

        fixtures::fund(&mut st, ALICE, 1);
        config.collateral_asset = String::from("DAI");
        assert_eq!(ProtocolModule::update_config(&mut st, actor(ADMIN), config, 2), Err(Error::InvalidParameter));
    }
}
