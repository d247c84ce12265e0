use sails_rs::prelude::*;
use crate::{
    types::*,
    errors::Error,
    events::JournalEntry,
    modules::{margin::MarginModule, protocol::ProtocolModule, settlement::SettlementModule, vault::VaultModule},
    ClearingState,
};

#[derive(Default)]
pub struct ViewService;

impl ViewService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[service]
impl ViewService {
    #[export]
    pub fn get_series(&self, series_id: SeriesId) -> Result<OptionSeries, Error> {
        ClearingState::get().get_series(series_id).cloned()
    }

    #[export]
    pub fn list_series(&self) -> Vec<OptionSeries> {
        ClearingState::get().series.values().cloned().collect()
    }

    #[export]
    pub fn get_position(&self, account: ActorId, series_id: SeriesId) -> Result<Position, Error> {
        MarginModule::get_position(ClearingState::get(), account, series_id)
    }

    #[export]
    pub fn account_positions(&self, account: ActorId) -> Vec<Position> {
        MarginModule::account_positions(ClearingState::get(), account)
    }

    #[export]
    pub fn portfolio_summary(&self, account: ActorId) -> PortfolioSummary {
        MarginModule::get_portfolio_summary(ClearingState::get(), account)
    }

    #[export]
    pub fn check_margin(&self, account: ActorId) -> bool {
        MarginModule::check_margin_requirements(ClearingState::get(), account)
    }

    #[export]
    pub fn margin_deficit(&self, account: ActorId) -> Amount {
        MarginModule::margin_deficit(ClearingState::get(), account)
    }

    #[export]
    pub fn vault(&self, owner: ActorId) -> Result<VaultInfo, Error> {
        VaultModule::get_vault_info(ClearingState::get(), owner)
    }

    #[export]
    pub fn get_settlement(&self, series_id: SeriesId) -> Result<SettlementRecord, Error> {
        SettlementModule::get_settlement(ClearingState::get(), series_id)
    }

    #[export]
    pub fn get_early_exercise(&self, exercise_id: ExerciseId) -> Result<SettlementRecord, Error> {
        SettlementModule::get_early_exercise(ClearingState::get(), exercise_id)
    }

    #[export]
    pub fn series_payouts(&self, series_id: SeriesId) -> Vec<PayoutRecord> {
        SettlementModule::series_payouts(ClearingState::get(), series_id)
    }

    #[export]
    pub fn get_payout(&self, payout_id: PayoutId) -> Option<PayoutRecord> {
        ClearingState::get().payouts.get(&payout_id).cloned()
    }

    #[export]
    pub fn stats(&self) -> ProtocolStats {
        ProtocolModule::stats(ClearingState::get())
    }

    #[export]
    pub fn config(&self) -> ProtocolConfig {
        ClearingState::get().config.clone()
    }

    /// Journal page starting at sequence number `from`
    #[export]
    pub fn events_since(&self, from: u64, limit: u32) -> Vec<JournalEntry> {
        ClearingState::get().journal.since(from, limit)
    }

    #[export]
    pub fn next_event_seq(&self) -> u64 {
        ClearingState::get().journal.next_seq()
    }
}
