use sails_rs::prelude::*;
use crate::{
    types::*,
    errors::Error,
    events::ClearingEvent,
    modules::{access::AccessModule, oracle::OracleModule, vault::VaultModule},
    utils,
    ClearingState,
};

pub struct MarginModule;

impl MarginModule {
    /// `base = quantity * price`, plus the early-exercise premium for
    /// American-style positions
    pub fn calculate_margin(quantity: u128, price: u128, is_american: bool, premium_bps: u16) -> Result<Amount, Error> {
        let base = quantity.checked_mul(price).ok_or(Error::MathOverflow)?;
        if !is_american {
            return Ok(base);
        }
        let premium = utils::apply_bps(base, premium_bps)?;
        base.checked_add(premium).ok_or(Error::MathOverflow)
    }

    /// Margin with the configured premium
    pub fn margin_for(st: &ClearingState, quantity: u128, price: u128, is_american: bool) -> Result<Amount, Error> {
        Self::calculate_margin(quantity, price, is_american, st.config.american_premium_bps)
    }

    /// Fresh spot of the series' underlying. Every margin figure is taken
    /// against it, at registration and on refresh alike.
    pub fn mark_price(st: &ClearingState, series_id: SeriesId, now: u64) -> Result<u128, Error> {
        let underlying = &st.get_series(series_id)?.underlying;
        OracleModule::fresh_price(st, underlying, now)
    }

    /// Open a position, or grow an existing one in the same direction
    /// (entry price becomes the quantity-weighted average). The added
    /// margin is sized on the current mark, not the trade price.
    #[allow(clippy::too_many_arguments)]
    pub fn register_position(
        st: &mut ClearingState,
        account: ActorId,
        series_id: SeriesId,
        direction: Direction,
        quantity: u128,
        entry_price: u128,
        is_american: bool,
        collateral_posted: Amount,
        now: u64,
    ) -> Result<PositionKey, Error> {
        if quantity == 0 {
            return Err(Error::InvalidAmount);
        }
        if entry_price == 0 {
            return Err(Error::InvalidPrice);
        }
        let key = PositionKey::new(account, series_id);
        let mark = Self::mark_price(st, series_id, now)?;
        let added_margin = Self::margin_for(st, quantity, mark, is_american)?;

        let pos = match st.positions.get(&key) {
            Some(existing) => {
                if existing.direction != direction {
                    return Err(Error::ConflictingPosition);
                }
                let total_qty = existing.quantity.checked_add(quantity).ok_or(Error::MathOverflow)?;
                let cost = existing.entry_price
                    .checked_mul(existing.quantity)
                    .and_then(|c| c.checked_add(entry_price.checked_mul(quantity)?))
                    .ok_or(Error::MathOverflow)?;
                let avg_entry = cost / total_qty;
                Position {
                    quantity: total_qty,
                    entry_price: avg_entry,
                    last_price: entry_price,
                    unrealized_pnl: unrealized_pnl(direction, avg_entry, entry_price, total_qty)?,
                    required_margin: existing.required_margin.checked_add(added_margin).ok_or(Error::MathOverflow)?,
                    collateral_posted: existing.collateral_posted.checked_add(collateral_posted).ok_or(Error::MathOverflow)?,
                    last_updated: now,
                    ..existing.clone()
                }
            }
            None => Position {
                account,
                series_id,
                direction,
                quantity,
                entry_price,
                last_price: entry_price,
                unrealized_pnl: 0,
                required_margin: added_margin,
                collateral_posted,
                is_american,
                last_updated: now,
            },
        };

        let required_margin = pos.required_margin;
        Self::insert_position(st, pos);
        st.emit(now, ClearingEvent::PositionRegistered { account, series_id, direction, quantity, required_margin });
        Self::recompute_portfolio(st, account, now);
        Ok(key)
    }

    /// Re-mark a position against the underlying's fresh spot price
    pub fn update_position_margin(st: &mut ClearingState, account: ActorId, series_id: SeriesId, now: u64) -> Result<MarginUpdate, Error> {
        let key = PositionKey::new(account, series_id);
        let pos = st.positions.get(&key).ok_or(Error::PositionNotFound)?;
        let price = Self::mark_price(st, series_id, now)?;

        let margin_before = pos.required_margin;
        let margin_after = Self::margin_for(st, pos.quantity, price, pos.is_american)?;
        let pnl = unrealized_pnl(pos.direction, pos.entry_price, price, pos.quantity)?;
        let delta = margin_after as i128 - margin_before as i128;

        let pos = st.positions.get_mut(&key).ok_or(Error::PositionNotFound)?;
        pos.required_margin = margin_after;
        pos.last_price = price;
        pos.unrealized_pnl = pnl;
        pos.last_updated = now;

        st.emit(now, ClearingEvent::MarginUpdated { account, series_id, margin_before, margin_after });
        Self::recompute_portfolio(st, account, now);
        Ok(MarginUpdate { account, series_id, margin_before, margin_after, delta })
    }

    pub fn total_required_margin(st: &ClearingState, account: ActorId) -> Amount {
        Self::account_positions(st, account)
            .iter()
            .fold(0u128, |acc, p| acc.saturating_add(p.required_margin))
    }

    /// Pure comparison; accounts without positions always pass
    pub fn check_margin_requirements(st: &ClearingState, account: ActorId) -> bool {
        Self::margin_deficit(st, account) == 0
    }

    pub fn margin_deficit(st: &ClearingState, account: ActorId) -> Amount {
        Self::total_required_margin(st, account).saturating_sub(VaultModule::deposited(st, account))
    }

    /// Notify indexers that an account is under-margined. Frees nothing.
    pub fn trigger_margin_call(st: &mut ClearingState, caller: ActorId, account: ActorId, now: u64) -> Result<Amount, Error> {
        st.ensure_not_paused()?;
        AccessModule::require(&st.roles, caller, Role::Operator)?;
        let deficit = Self::margin_deficit(st, account);
        if deficit == 0 {
            return Err(Error::MarginSufficient);
        }
        let margin_required = Self::total_required_margin(st, account);
        let margin_available = VaultModule::deposited(st, account);
        st.emit(now, ClearingEvent::MarginCall { account, margin_required, margin_available });
        Ok(deficit)
    }

    /// Remove the `(account, series)` position
    pub fn liquidate_position(st: &mut ClearingState, series_id: SeriesId, account: ActorId, now: u64) -> Result<Position, Error> {
        let pos = Self::remove_position(st, PositionKey::new(account, series_id)).ok_or(Error::PositionNotFound)?;
        st.emit(now, ClearingEvent::PositionLiquidated { account, series_id, quantity: pos.quantity });
        Self::recompute_portfolio(st, account, now);
        Ok(pos)
    }

    /// Shrink a position by `quantity`, scaling margin and posted collateral
    /// pro rata. Returns the collateral share that left the position.
    pub fn reduce_position(st: &mut ClearingState, key: PositionKey, quantity: u128, now: u64) -> Result<Amount, Error> {
        let pos = st.positions.get_mut(&key).ok_or(Error::PositionNotFound)?;
        if quantity == 0 {
            return Err(Error::InvalidAmount);
        }
        if quantity > pos.quantity {
            return Err(Error::InsufficientPosition);
        }
        let share = utils::mul_div(pos.collateral_posted, quantity, pos.quantity)?;
        if quantity == pos.quantity {
            Self::remove_position(st, key);
        } else {
            let remaining = pos.quantity - quantity;
            pos.required_margin = utils::mul_div(pos.required_margin, remaining, pos.quantity)?;
            pos.collateral_posted -= share;
            pos.unrealized_pnl = unrealized_pnl(pos.direction, pos.entry_price, pos.last_price, remaining)?;
            pos.quantity = remaining;
            pos.last_updated = now;
        }
        Self::recompute_portfolio(st, key.account, now);
        Ok(share)
    }

    pub fn insert_position(st: &mut ClearingState, pos: Position) {
        let key = pos.key();
        st.account_positions.entry(key.account).or_default().insert(key.series_id);
        st.series_positions.entry(key.series_id).or_default().insert(key.account);
        st.positions.insert(key, pos);
    }

    /// Remove a position and its index entries
    pub fn remove_position(st: &mut ClearingState, key: PositionKey) -> Option<Position> {
        let pos = st.positions.remove(&key)?;
        if let Some(set) = st.account_positions.get_mut(&key.account) {
            set.remove(&key.series_id);
            if set.is_empty() {
                st.account_positions.remove(&key.account);
            }
        }
        if let Some(set) = st.series_positions.get_mut(&key.series_id) {
            set.remove(&key.account);
            if set.is_empty() {
                st.series_positions.remove(&key.series_id);
            }
        }
        Some(pos)
    }

    pub fn recompute_portfolio(st: &mut ClearingState, account: ActorId, now: u64) -> PortfolioSummary {
        let mut summary = PortfolioSummary { account, updated_at: now, ..Default::default() };
        for pos in Self::account_positions(st, account) {
            summary.position_count += 1;
            match pos.direction {
                Direction::Long => summary.long_quantity = summary.long_quantity.saturating_add(pos.quantity),
                Direction::Short => summary.short_quantity = summary.short_quantity.saturating_add(pos.quantity),
            }
            summary.unrealized_pnl = summary.unrealized_pnl.saturating_add(pos.unrealized_pnl);
            summary.margin_required = summary.margin_required.saturating_add(pos.required_margin);
        }
        summary.margin_available = VaultModule::deposited(st, account);
        summary.risk_level = risk_level(summary.long_quantity, summary.short_quantity, summary.margin_required);
        st.portfolios.insert(account, summary.clone());
        summary
    }

    /// Stored summary with a live `margin_available`
    pub fn get_portfolio_summary(st: &ClearingState, account: ActorId) -> PortfolioSummary {
        let mut summary = st
            .portfolios
            .get(&account)
            .cloned()
            .unwrap_or_else(|| PortfolioSummary { account, ..Default::default() });
        summary.margin_available = VaultModule::deposited(st, account);
        summary
    }

    pub fn get_position(st: &ClearingState, account: ActorId, series_id: SeriesId) -> Result<Position, Error> {
        st.positions.get(&PositionKey::new(account, series_id)).cloned().ok_or(Error::PositionNotFound)
    }

    pub fn account_positions(st: &ClearingState, account: ActorId) -> Vec<Position> {
        st.account_positions
            .get(&account)
            .map(|series| {
                series
                    .iter()
                    .filter_map(|s| st.positions.get(&PositionKey::new(account, *s)).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Holders of a series in `ActorId` order
    pub fn series_accounts(st: &ClearingState, series_id: SeriesId) -> Vec<ActorId> {
        st.series_positions
            .get(&series_id)
            .map(|accounts| accounts.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// `(last - entry) * qty`, sign flipped for shorts
pub fn unrealized_pnl(direction: Direction, entry_price: u128, last_price: u128, quantity: u128) -> Result<i128, Error> {
    let entry = i128::try_from(entry_price).map_err(|_| Error::MathOverflow)?;
    let last = i128::try_from(last_price).map_err(|_| Error::MathOverflow)?;
    let qty = i128::try_from(quantity).map_err(|_| Error::MathOverflow)?;
    let pnl = (last - entry).checked_mul(qty).ok_or(Error::MathOverflow)?;
    Ok(match direction {
        Direction::Long => pnl,
        Direction::Short => -pnl,
    })
}

/// leverage = (long + short) * 100 / margin, margin taken in whole units
pub fn risk_level(long_quantity: u128, short_quantity: u128, margin_required: Amount) -> RiskLevel {
    if margin_required == 0 {
        return RiskLevel::Low;
    }
    let exposure = long_quantity.saturating_add(short_quantity).saturating_mul(100);
    let leverage = utils::mul_div(exposure, PRICE_SCALE, margin_required).unwrap_or(u128::MAX);
    if leverage > 10 {
        RiskLevel::High
    } else if leverage > 5 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::fixtures::{self, actor, ADMIN, ALICE, BOB};

    fn units(n: u128) -> u128 {
        n * PRICE_SCALE
    }

    #[test]
    fn american_margin_carries_twenty_percent_premium() {
        assert_eq!(MarginModule::calculate_margin(10, units(50), true, 2_000), Ok(units(600)));
        assert_eq!(MarginModule::calculate_margin(10, units(50), false, 2_000), Ok(units(500)));
    }

    #[test]
    fn american_margin_never_below_european() {
        for qty in [1u128, 3, 7, 10, 999] {
            for price in [1u128, 17, units(1), units(50) + 3, units(12_345)] {
                let american = MarginModule::calculate_margin(qty, price, true, 2_000).unwrap();
                let european = MarginModule::calculate_margin(qty, price, false, 2_000).unwrap();
                assert!(american >= european);
            }
        }
    }

    #[test]
    fn margin_overflow_is_an_error() {
        assert_eq!(MarginModule::calculate_margin(u128::MAX, 2, false, 0), Err(Error::MathOverflow));
    }

    /// Series 1 (call) and 2 (put) on ETH, with spot at `spot_units` from t=0
    fn priced_world(spot_units: u128) -> ClearingState {
        let mut st = fixtures::world();
        fixtures::series(&mut st, fixtures::call_params(100, 10_000));
        fixtures::series(&mut st, fixtures::put(fixtures::call_params(100, 10_000)));
        fixtures::push_price(&mut st, spot_units, 0);
        st
    }

    #[test]
    fn register_builds_portfolio_summary() {
        let mut st = priced_world(50);
        fixtures::fund(&mut st, ALICE, 10_000);
        MarginModule::register_position(&mut st, actor(ALICE), 1, Direction::Long, 10, units(5), true, 0, 5).unwrap();
        MarginModule::register_position(&mut st, actor(ALICE), 2, Direction::Short, 4, units(5), false, units(200), 6).unwrap();

        let summary = MarginModule::get_portfolio_summary(&st, actor(ALICE));
        assert_eq!(summary.position_count, 2);
        assert_eq!(summary.long_quantity, 10);
        assert_eq!(summary.short_quantity, 4);
        // 10 * 50 * 1.2 + 4 * 50, on the spot rather than the premium
        assert_eq!(summary.margin_required, units(800));
        assert_eq!(summary.margin_available, units(10_000));
        assert_eq!(summary.updated_at, 6);
        assert!(MarginModule::check_margin_requirements(&st, actor(ALICE)));
    }

    #[test]
    fn increase_averages_entry_and_rejects_opposite_direction() {
        let mut st = priced_world(60);
        MarginModule::register_position(&mut st, actor(ALICE), 1, Direction::Long, 10, units(50), false, 0, 1).unwrap();
        MarginModule::register_position(&mut st, actor(ALICE), 1, Direction::Long, 10, units(70), false, 0, 2).unwrap();
        let pos = MarginModule::get_position(&st, actor(ALICE), 1).unwrap();
        assert_eq!(pos.quantity, 20);
        assert_eq!(pos.entry_price, units(60));
        assert_eq!(pos.required_margin, units(1_200));
        assert_eq!(pos.unrealized_pnl, (units(70) - units(60)) as i128 * 20);

        let events = st.journal.len();
        assert_eq!(
            MarginModule::register_position(&mut st, actor(ALICE), 1, Direction::Short, 1, units(50), false, 0, 3),
            Err(Error::ConflictingPosition)
        );
        assert_eq!(MarginModule::get_position(&st, actor(ALICE), 1).unwrap(), pos);
        assert_eq!(st.journal.len(), events);
    }

    #[test]
    fn register_validates_inputs() {
        let mut st = fixtures::world();
        assert_eq!(
            MarginModule::register_position(&mut st, actor(ALICE), 1, Direction::Long, 0, units(50), false, 0, 1),
            Err(Error::InvalidAmount)
        );
        assert_eq!(
            MarginModule::register_position(&mut st, actor(ALICE), 1, Direction::Long, 1, 0, false, 0, 1),
            Err(Error::InvalidPrice)
        );
        assert_eq!(
            MarginModule::register_position(&mut st, actor(ALICE), 1, Direction::Long, 1, units(5), false, 0, 1),
            Err(Error::SeriesNotFound)
        );
        // a series without a mark cannot be margined
        fixtures::series(&mut st, fixtures::call_params(100, 10_000));
        assert_eq!(
            MarginModule::register_position(&mut st, actor(ALICE), 1, Direction::Long, 1, units(5), false, 0, 1),
            Err(Error::PriceNotAvailable)
        );
        assert!(st.positions.is_empty());
    }

    #[test]
    fn margin_refresh_reads_fresh_oracle_price() {
        let mut st = fixtures::world();
        let series_id = fixtures::series(&mut st, fixtures::american(fixtures::call_params(100, 10_000)));
        fixtures::push_price(&mut st, 50, 0);
        MarginModule::register_position(&mut st, actor(ALICE), series_id, Direction::Short, 10, units(50), true, 0, 1).unwrap();

        // same mark, same margin: opening never leaves the position short of margin
        let update = MarginModule::update_position_margin(&mut st, actor(ALICE), series_id, 2).unwrap();
        assert_eq!((update.margin_before, update.margin_after, update.delta), (units(600), units(600), 0));
        assert_eq!(MarginModule::update_position_margin(&mut st, actor(ALICE), series_id, 301), Err(Error::PriceStale));

        fixtures::push_price(&mut st, 60, 400);
        let update = MarginModule::update_position_margin(&mut st, actor(ALICE), series_id, 450).unwrap();
        assert_eq!(update.margin_before, units(600));
        assert_eq!(update.margin_after, units(720));
        assert_eq!(update.delta, units(120) as i128);

        let pos = MarginModule::get_position(&st, actor(ALICE), series_id).unwrap();
        assert_eq!(pos.last_price, units(60));
        // short loses when the mark rises
        assert_eq!(pos.unrealized_pnl, -(units(10) as i128) * 10);

        assert_eq!(MarginModule::update_position_margin(&mut st, actor(ALICE), series_id, 701), Err(Error::PriceStale));
        assert_eq!(MarginModule::update_position_margin(&mut st, actor(BOB), series_id, 450), Err(Error::PositionNotFound));
    }

    #[test]
    fn margin_check_and_margin_call() {
        let mut st = priced_world(50);
        assert!(MarginModule::check_margin_requirements(&st, actor(ALICE)));

        fixtures::fund(&mut st, ALICE, 400);
        MarginModule::register_position(&mut st, actor(ALICE), 1, Direction::Long, 10, units(50), false, 0, 1).unwrap();
        assert!(!MarginModule::check_margin_requirements(&st, actor(ALICE)));
        assert_eq!(MarginModule::margin_deficit(&st, actor(ALICE)), units(100));

        assert_eq!(MarginModule::trigger_margin_call(&mut st, actor(BOB), actor(ALICE), 2), Err(Error::Unauthorized));
        assert_eq!(MarginModule::trigger_margin_call(&mut st, actor(ADMIN), actor(ALICE), 2), Ok(units(100)));
        assert_eq!(
            st.journal.last(),
            Some(&ClearingEvent::MarginCall { account: actor(ALICE), margin_required: units(500), margin_available: units(400) })
        );
        // the call itself frees nothing
        assert_eq!(MarginModule::get_position(&st, actor(ALICE), 1).unwrap().quantity, 10);

        st.paused = true;
        assert_eq!(MarginModule::trigger_margin_call(&mut st, actor(ADMIN), actor(ALICE), 2), Err(Error::ProtocolPaused));
        st.paused = false;

        fixtures::deposit(&mut st, ALICE, 100);
        assert!(MarginModule::check_margin_requirements(&st, actor(ALICE)));
        assert_eq!(MarginModule::trigger_margin_call(&mut st, actor(ADMIN), actor(ALICE), 3), Err(Error::MarginSufficient));
    }

    #[test]
    fn liquidation_removes_only_the_keyed_position() {
        let mut st = priced_world(5);
        for (who, series) in [(ALICE, 1), (ALICE, 2), (BOB, 1)] {
            MarginModule::register_position(&mut st, actor(who), series, Direction::Long, 1, units(5), false, 0, 1).unwrap();
        }
        let removed = MarginModule::liquidate_position(&mut st, 1, actor(ALICE), 2).unwrap();
        assert_eq!((removed.account, removed.series_id), (actor(ALICE), 1));

        assert!(MarginModule::get_position(&st, actor(BOB), 1).is_ok());
        assert!(MarginModule::get_position(&st, actor(ALICE), 2).is_ok());
        assert_eq!(MarginModule::series_accounts(&st, 1), vec![actor(BOB)]);
        assert_eq!(MarginModule::get_portfolio_summary(&st, actor(ALICE)).position_count, 1);
        assert_eq!(MarginModule::liquidate_position(&mut st, 1, actor(ALICE), 3), Err(Error::PositionNotFound));

        MarginModule::liquidate_position(&mut st, 2, actor(ALICE), 4).unwrap();
        assert!(!st.account_positions.contains_key(&actor(ALICE)));
    }

    #[test]
    fn reduce_scales_margin_and_collateral() {
        let mut st = priced_world(60);
        MarginModule::register_position(&mut st, actor(BOB), 1, Direction::Short, 4, units(60), false, units(240), 1).unwrap();
        let key = PositionKey::new(actor(BOB), 1);

        assert_eq!(MarginModule::reduce_position(&mut st, key, 5, 2), Err(Error::InsufficientPosition));
        assert_eq!(MarginModule::reduce_position(&mut st, key, 1, 2), Ok(units(60)));
        let pos = MarginModule::get_position(&st, actor(BOB), 1).unwrap();
        assert_eq!((pos.quantity, pos.required_margin, pos.collateral_posted), (3, units(180), units(180)));

        assert_eq!(MarginModule::reduce_position(&mut st, key, 3, 3), Ok(units(180)));
        assert_eq!(MarginModule::get_position(&st, actor(BOB), 1), Err(Error::PositionNotFound));
        assert!(MarginModule::series_accounts(&st, 1).is_empty());
    }

    #[test]
    fn risk_level_thresholds() {
        assert_eq!(risk_level(0, 0, 0), RiskLevel::Low);
        assert_eq!(risk_level(5, 0, 0), RiskLevel::Low);
        // 10 contracts against 600 units of margin -> leverage 1
        assert_eq!(risk_level(10, 0, units(600)), RiskLevel::Low);
        assert_eq!(risk_level(6, 0, units(100)), RiskLevel::Medium);
        assert_eq!(risk_level(5, 0, units(100)), RiskLevel::Low);
        assert_eq!(risk_level(6, 5, units(100)), RiskLevel::High);
        assert_eq!(risk_level(10, 0, units(100)), RiskLevel::Medium);
    }
}
