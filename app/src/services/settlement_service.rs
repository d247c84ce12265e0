use sails_rs::{prelude::*, gstd::msg};
use crate::{
    types::*,
    errors::Error,
    events::ClearingEvent,
    modules::settlement::SettlementModule,
    utils,
    ClearingState,
};

/// Operator-driven expiry settlement
#[derive(Default)]
pub struct SettlementService;

impl SettlementService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[service(events = ClearingEvent)]
impl SettlementService {
    #[export]
    pub fn settle_cash(&mut self, series_id: SeriesId) -> Result<SettlementRecord, Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = SettlementModule::settle_cash(st, caller, series_id, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn settle_physical(&mut self, series_id: SeriesId) -> Result<SettlementRecord, Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = SettlementModule::settle_physical(st, caller, series_id, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn disburse_payouts(&mut self, series_id: SeriesId) -> Result<SettlementRecord, Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = SettlementModule::disburse_payouts(st, caller, series_id, utils::now());
        self.publish(st);
        result
    }

    /// Settle at most `limit` positions; returns how many were processed
    #[export]
    pub fn disburse_batch(&mut self, series_id: SeriesId, limit: u32) -> Result<u32, Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = SettlementModule::disburse_batch(st, caller, series_id, limit, utils::now());
        self.publish(st);
        result
    }

    fn publish(&self, st: &mut ClearingState) {
        for event in st.take_events() {
            self.emit_event(event).expect("Failed to emit event");
        }
    }
}
