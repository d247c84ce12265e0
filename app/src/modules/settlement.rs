use sails_rs::prelude::*;
use crate::{
    types::*,
    errors::Error,
    events::ClearingEvent,
    modules::{access::AccessModule, margin::MarginModule, oracle::OracleModule, vault::VaultModule},
    utils,
    ClearingState,
};

impl SettlementStatus {
    /// Forward-only transitions:
    /// Pending -> InProgress -> Completed | Failed, Pending -> EarlyExercised
    pub fn advance(self, next: SettlementStatus) -> Result<SettlementStatus, Error> {
        use SettlementStatus::*;
        match (self, next) {
            (Pending, InProgress)
            | (Pending, EarlyExercised)
            | (InProgress, Completed)
            | (InProgress, Failed) => Ok(next),
            _ => Err(Error::InvalidSettlementState),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SettlementStatus::Completed | SettlementStatus::Failed | SettlementStatus::EarlyExercised)
    }
}

/// One position's share of a disbursement batch
enum Leg {
    Long { account: ActorId, gross: Amount, fee: Amount, unpaid: Amount },
    Short { account: ActorId, release: Amount, debit: Amount },
}

/// A short assigned against an early exercise
struct Assignment {
    account: ActorId,
    quantity: u128,
    release: Amount,
    debit: Amount,
}

pub struct SettlementModule;

impl SettlementModule {
    /// Intrinsic value owed to the long side at `settlement_price`
    pub fn calculate_long_payoff(series: &OptionSeries, settlement_price: u128, quantity: u128) -> Result<Amount, Error> {
        let intrinsic = match series.option_type {
            OptionType::Call => settlement_price.saturating_sub(series.strike),
            OptionType::Put => series.strike.saturating_sub(settlement_price),
        };
        intrinsic
            .checked_mul(quantity)
            .and_then(|v| v.checked_mul(series.contract_size))
            .ok_or(Error::MathOverflow)
    }

    /// A short's share of what the long side is owed. Never more than the
    /// payoff of its own contracts.
    pub fn short_liability(payoff: Amount, total_payoff: Amount, quantity: u128, short_quantity: u128) -> Result<Amount, Error> {
        if short_quantity == 0 {
            return Ok(0);
        }
        Ok(payoff.min(utils::mul_div(total_payoff, quantity, short_quantity)?))
    }

    pub fn settle_cash(st: &mut ClearingState, caller: ActorId, series_id: SeriesId, now: u64) -> Result<SettlementRecord, Error> {
        st.ensure_not_paused()?;
        AccessModule::require(&st.roles, caller, Role::Operator)?;
        Self::initiate(st, series_id, SettlementStyle::Cash, now)
    }

    /// Physical delivery is booked at its cash equivalent against the
    /// frozen price; only the record kind differs.
    pub fn settle_physical(st: &mut ClearingState, caller: ActorId, series_id: SeriesId, now: u64) -> Result<SettlementRecord, Error> {
        st.ensure_not_paused()?;
        AccessModule::require(&st.roles, caller, Role::Operator)?;
        Self::initiate(st, series_id, SettlementStyle::Physical, now)
    }

    /// Open the series' settlement record. Exactly once per series: any
    /// later attempt sees the record and fails with `AlreadySettled`.
    pub(crate) fn initiate(st: &mut ClearingState, series_id: SeriesId, style: SettlementStyle, now: u64) -> Result<SettlementRecord, Error> {
        let series = st.get_series(series_id)?.clone();
        if !series.is_expired(now) {
            return Err(Error::SeriesNotExpired);
        }
        if series.settlement_style != style {
            return Err(Error::SettlementStyleMismatch);
        }
        if st.settlements.contains_key(&series_id) {
            return Err(Error::AlreadySettled);
        }
        let settlement_price = OracleModule::get_series_settlement_price(st, series_id)?.twap_price;

        let mut total_payoff: Amount = 0;
        let mut short_quantity: u128 = 0;
        for account in MarginModule::series_accounts(st, series_id) {
            let pos = st.positions.get(&PositionKey::new(account, series_id)).ok_or(Error::PositionNotFound)?;
            if pos.is_long() {
                let payoff = Self::calculate_long_payoff(&series, settlement_price, pos.quantity)?;
                total_payoff = total_payoff.checked_add(payoff).ok_or(Error::MathOverflow)?;
            } else {
                short_quantity = short_quantity.checked_add(pos.quantity).ok_or(Error::MathOverflow)?;
            }
        }
        let total_fees = utils::apply_bps(total_payoff, st.config.settlement_fee_bps)?;

        let kind = match style {
            SettlementStyle::Cash => SettlementKind::Cash,
            SettlementStyle::Physical => SettlementKind::Physical,
        };
        let status = SettlementStatus::Pending.advance(SettlementStatus::InProgress)?;
        let record = SettlementRecord {
            series_id,
            kind,
            settlement_price,
            status,
            total_payoff,
            total_fees,
            early_exercise_holder: None,
            positions_settled: 0,
            fees_accrued: 0,
            shortfall: 0,
            collected: 0,
            paid_to_longs: 0,
            short_quantity,
            pool_sealed: false,
            snapshot_hash: utils::settlement_digest(series_id, kind, settlement_price, total_payoff, total_fees, now),
            initiated_at: now,
            completed_at: None,
        };
        st.settlements.insert(series_id, record.clone());
        st.settlement_payouts.entry(series_id).or_default();
        st.emit(now, ClearingEvent::SettlementInitiated { series_id, kind, settlement_price, total_payoff, total_fees });
        Ok(record)
    }

    pub fn disburse_payouts(st: &mut ClearingState, caller: ActorId, series_id: SeriesId, now: u64) -> Result<SettlementRecord, Error> {
        Self::disburse_batch(st, caller, series_id, u32::MAX, now)?;
        st.settlements.get(&series_id).cloned().ok_or(Error::SettlementNotFound)
    }

    /// Pay out up to `limit` of the series' remaining positions. Returns
    /// the number processed in this call.
    pub fn disburse_batch(st: &mut ClearingState, caller: ActorId, series_id: SeriesId, limit: u32, now: u64) -> Result<u32, Error> {
        st.ensure_not_paused()?;
        AccessModule::require(&st.roles, caller, Role::Operator)?;
        Self::run_disbursement(st, series_id, limit, now)
    }

    /// Shorts come before longs, each group in `ActorId` order, so all
    /// short collateral is collected before the first long is paid.
    fn disbursement_order(st: &ClearingState, series_id: SeriesId) -> Vec<ActorId> {
        let (mut order, longs): (Vec<ActorId>, Vec<ActorId>) = MarginModule::series_accounts(st, series_id)
            .into_iter()
            .partition(|account| {
                st.positions
                    .get(&PositionKey::new(*account, series_id))
                    .is_some_and(|p| !p.is_long())
            });
        order.extend(longs);
        order
    }

    pub(crate) fn run_disbursement(st: &mut ClearingState, series_id: SeriesId, limit: u32, now: u64) -> Result<u32, Error> {
        if limit == 0 {
            return Err(Error::InvalidParameter);
        }
        let record = st.settlements.get(&series_id).ok_or(Error::SettlementNotFound)?;
        match record.status {
            SettlementStatus::InProgress => {}
            SettlementStatus::Completed => return Err(Error::AlreadySettled),
            _ => return Err(Error::InvalidSettlementState),
        }
        let price = record.settlement_price;
        let total_payoff = record.total_payoff;
        let short_quantity = record.short_quantity;
        let mut collected = record.collected;
        let mut sealed = record.pool_sealed;
        let series = st.get_series(series_id)?.clone();
        let fee_bps = st.config.settlement_fee_bps;

        // plan the whole batch before touching any ledger
        let mut drawn: Amount = 0;
        let mut legs = Vec::new();
        for account in Self::disbursement_order(st, series_id).into_iter().take(limit as usize) {
            let pos = st.positions.get(&PositionKey::new(account, series_id)).ok_or(Error::PositionNotFound)?;
            let payoff = Self::calculate_long_payoff(&series, price, pos.quantity)?;
            let leg = match pos.direction {
                Direction::Short => {
                    let locked = st.vaults.get(&account).map(|v| v.locked).unwrap_or(0);
                    let release = pos.collateral_posted.min(locked);
                    let liability = Self::short_liability(payoff, total_payoff, pos.quantity, short_quantity)?;
                    let debit = release.min(liability);
                    collected = collected.checked_add(debit).ok_or(Error::MathOverflow)?;
                    Leg::Short { account, release, debit }
                }
                Direction::Long => {
                    if !sealed {
                        // the insurance fund tops up what the shorts could not cover
                        drawn = st.stats.insurance_fund.min(total_payoff.saturating_sub(collected));
                        collected = collected.checked_add(drawn).ok_or(Error::MathOverflow)?;
                        sealed = true;
                    }
                    let gross = if collected >= total_payoff {
                        payoff
                    } else {
                        utils::mul_div(payoff, collected, total_payoff)?
                    };
                    let fee = utils::apply_bps(gross, fee_bps)?;
                    Leg::Long { account, gross, fee, unpaid: payoff - gross }
                }
            };
            legs.push(leg);
        }

        st.stats.insurance_fund = st.stats.insurance_fund.saturating_sub(drawn);
        let mut fees: Amount = 0;
        let mut paid: Amount = 0;
        let mut shortfall: Amount = 0;
        for leg in &legs {
            let account = match *leg {
                Leg::Long { account, gross, fee, unpaid } => {
                    if gross > fee {
                        let id = Self::pay(st, series_id, account, gross - fee, PayoutKind::LongPayoff, true, now)?;
                        st.settlement_payouts.entry(series_id).or_default().push(id);
                    }
                    fees = fees.saturating_add(fee);
                    paid = paid.saturating_add(gross);
                    shortfall = shortfall.saturating_add(unpaid);
                    account
                }
                Leg::Short { account, release, debit } => {
                    if release > 0 {
                        VaultModule::release_after_settlement(st, account, release, now)?;
                        VaultModule::debit_collateral(st, account, debit, now)?;
                    }
                    let returned = release - debit;
                    if returned > 0 {
                        let id = Self::pay(st, series_id, account, returned, PayoutKind::ShortCollateralReturn, false, now)?;
                        st.settlement_payouts.entry(series_id).or_default().push(id);
                    }
                    account
                }
            };
            MarginModule::remove_position(st, PositionKey::new(account, series_id));
            MarginModule::recompute_portfolio(st, account, now);
        }
        st.stats.bad_debt = st.stats.bad_debt.saturating_add(shortfall);

        let done = !st.series_positions.contains_key(&series_id);
        let record = st.settlements.get_mut(&series_id).ok_or(Error::SettlementNotFound)?;
        record.positions_settled = record.positions_settled.saturating_add(legs.len() as u32);
        record.fees_accrued = record.fees_accrued.saturating_add(fees);
        record.shortfall = record.shortfall.saturating_add(shortfall);
        record.paid_to_longs = record.paid_to_longs.saturating_add(paid);
        record.collected = collected;
        record.pool_sealed = sealed;

        if done {
            let fees_accrued = record.fees_accrued;
            let positions_settled = record.positions_settled;
            let shortfall = record.shortfall;
            // rounding left over from the pro-rata split
            let residue = record.collected.saturating_sub(record.paid_to_longs);
            record.status = record.status.advance(SettlementStatus::Completed)?;
            record.completed_at = Some(now);

            if fees_accrued > 0 {
                let treasury = st.config.treasury;
                let id = Self::pay(st, series_id, treasury, fees_accrued, PayoutKind::Fee, true, now)?;
                st.settlement_payouts.entry(series_id).or_default().push(id);
                st.stats.fees_collected = st.stats.fees_collected.saturating_add(fees_accrued);
            }
            st.stats.insurance_fund = st.stats.insurance_fund.saturating_add(residue);
            st.stats.settlements_completed += 1;
            st.emit(now, ClearingEvent::SettlementCompleted { series_id, positions_settled, shortfall });
        }
        Ok(legs.len() as u32)
    }

    /// Exercise `quantity` contracts of an American long before expiry at
    /// `current_price`. Shorts are assigned in `ActorId` order and the
    /// holder is paid from what they cover, topped up by the insurance fund.
    pub fn handle_early_exercise(
        st: &mut ClearingState,
        holder: ActorId,
        series_id: SeriesId,
        quantity: u128,
        current_price: u128,
        now: u64,
    ) -> Result<ExerciseId, Error> {
        let series = st.get_series(series_id)?.clone();
        if !series.is_american() {
            return Err(Error::NotAmericanStyle);
        }
        if series.is_expired(now) {
            return Err(Error::SeriesExpired);
        }
        if quantity == 0 {
            return Err(Error::InvalidAmount);
        }
        if !(MIN_VALID_PRICE..=MAX_VALID_PRICE).contains(&current_price) {
            return Err(Error::InvalidPrice);
        }
        let holder_key = PositionKey::new(holder, series_id);
        let long = st
            .positions
            .get(&holder_key)
            .filter(|p| p.is_long())
            .ok_or(Error::PositionNotFound)?;
        if long.quantity < quantity {
            return Err(Error::InsufficientPosition);
        }

        let payoff = Self::calculate_long_payoff(&series, current_price, quantity)?;
        if payoff == 0 {
            return Err(Error::InvalidParameter);
        }

        let mut remaining = quantity;
        let mut collected: Amount = 0;
        let mut assignments = Vec::new();
        for account in MarginModule::series_accounts(st, series_id) {
            if remaining == 0 {
                break;
            }
            let Some(short) = st.positions.get(&PositionKey::new(account, series_id)).filter(|p| !p.is_long()) else {
                continue;
            };
            let assigned = remaining.min(short.quantity);
            let share = utils::mul_div(short.collateral_posted, assigned, short.quantity)?;
            let locked = st.vaults.get(&account).map(|v| v.locked).unwrap_or(0);
            let release = share.min(locked);
            let debit = release.min(Self::calculate_long_payoff(&series, current_price, assigned)?);
            collected = collected.checked_add(debit).ok_or(Error::MathOverflow)?;
            assignments.push(Assignment { account, quantity: assigned, release, debit });
            remaining -= assigned;
        }
        let drawn = st.stats.insurance_fund.min(payoff - collected);
        let gross = collected + drawn;
        let fee = utils::apply_bps(gross, st.config.early_exercise_fee_bps)?;
        let shortfall = payoff - gross;

        for a in &assignments {
            if a.release > 0 {
                VaultModule::release_after_settlement(st, a.account, a.release, now)?;
                VaultModule::debit_collateral(st, a.account, a.debit, now)?;
            }
            MarginModule::reduce_position(st, PositionKey::new(a.account, series_id), a.quantity, now)?;
        }
        MarginModule::reduce_position(st, holder_key, quantity, now)?;
        st.stats.insurance_fund -= drawn;
        st.stats.bad_debt = st.stats.bad_debt.saturating_add(shortfall);

        let exercise_id = st.generate_exercise_id();
        if gross > fee {
            let payout_id = Self::pay(st, series_id, holder, gross - fee, PayoutKind::LongPayoff, true, now)?;
            st.early_exercise_payouts.insert(exercise_id, payout_id);
        }
        if fee > 0 {
            let treasury = st.config.treasury;
            VaultModule::credit_or_open(st, treasury, fee, now)?;
            st.stats.fees_collected = st.stats.fees_collected.saturating_add(fee);
        }

        let kind = SettlementKind::EarlyExercise;
        let record = SettlementRecord {
            series_id,
            kind,
            settlement_price: current_price,
            status: SettlementStatus::Pending.advance(SettlementStatus::EarlyExercised)?,
            total_payoff: payoff,
            total_fees: fee,
            early_exercise_holder: Some(holder),
            positions_settled: assignments.len() as u32 + 1,
            fees_accrued: fee,
            shortfall,
            collected: gross,
            paid_to_longs: gross,
            short_quantity: quantity - remaining,
            pool_sealed: true,
            snapshot_hash: utils::settlement_digest(series_id, kind, current_price, payoff, fee, now),
            initiated_at: now,
            completed_at: Some(now),
        };
        st.early_exercises.insert(exercise_id, record);
        st.emit(now, ClearingEvent::EarlyExercised { exercise_id, series_id, holder, quantity, payoff, fee });
        Ok(exercise_id)
    }

    /// Record a payout as Pending, move the value, then mark it Completed
    fn pay(
        st: &mut ClearingState,
        series_id: SeriesId,
        recipient: ActorId,
        amount: Amount,
        kind: PayoutKind,
        credit: bool,
        now: u64,
    ) -> Result<PayoutId, Error> {
        let id = st.generate_payout_id();
        st.payouts.insert(
            id,
            PayoutRecord { id, series_id, recipient, amount, kind, status: PayoutStatus::Pending, created_at: now, completed_at: None },
        );
        if credit {
            VaultModule::credit_or_open(st, recipient, amount, now)?;
        }
        if let Some(payout) = st.payouts.get_mut(&id) {
            payout.status = PayoutStatus::Completed;
            payout.completed_at = Some(now);
        }
        st.stats.total_payouts = st.stats.total_payouts.saturating_add(amount);
        st.emit(now, ClearingEvent::PayoutCompleted { payout_id: id, series_id, recipient, amount, kind });
        Ok(id)
    }

    pub fn get_settlement(st: &ClearingState, series_id: SeriesId) -> Result<SettlementRecord, Error> {
        st.settlements.get(&series_id).cloned().ok_or(Error::SettlementNotFound)
    }

    pub fn get_early_exercise(st: &ClearingState, exercise_id: ExerciseId) -> Result<SettlementRecord, Error> {
        st.early_exercises.get(&exercise_id).cloned().ok_or(Error::SettlementNotFound)
    }

    pub fn series_payouts(st: &ClearingState, series_id: SeriesId) -> Vec<PayoutRecord> {
        st.settlement_payouts
            .get(&series_id)
            .map(|ids| ids.iter().filter_map(|id| st.payouts.get(id).cloned()).collect())
            .unwrap_or_default()
    }
}
