use sails_rs::{prelude::*, gstd::msg};
use crate::{
    types::*,
    errors::Error,
    events::ClearingEvent,
    modules::{margin::MarginModule, protocol::ProtocolModule},
    utils,
    ClearingState,
};

#[derive(Default)]
pub struct TradingService;

impl TradingService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[service(events = ClearingEvent)]
impl TradingService {
    /// Issuer role
    #[export]
    pub fn create_series(&mut self, params: SeriesParams) -> Result<SeriesId, Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = ProtocolModule::create_series(st, caller, params, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn buy(&mut self, series_id: SeriesId, quantity: u128, price: u128) -> Result<Position, Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = ProtocolModule::buy(st, caller, series_id, quantity, price, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn write(&mut self, series_id: SeriesId, quantity: u128, price: u128) -> Result<Position, Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = ProtocolModule::write(st, caller, series_id, quantity, price, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn exercise(&mut self, series_id: SeriesId) -> Result<SettlementRecord, Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = ProtocolModule::exercise(st, caller, series_id, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn early_exercise(&mut self, series_id: SeriesId, quantity: u128) -> Result<ExerciseId, Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = ProtocolModule::early_exercise(st, caller, series_id, quantity, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn refresh_margin(&mut self, account: ActorId, series_id: SeriesId) -> Result<MarginUpdate, Error> {
        let st = ClearingState::get_mut();
        let result = ProtocolModule::refresh_margin(st, account, series_id, utils::now());
        self.publish(st);
        result
    }

    /// Operator role; returns the deficit
    #[export]
    pub fn margin_call(&mut self, account: ActorId) -> Result<Amount, Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = MarginModule::trigger_margin_call(st, caller, account, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn liquidate(&mut self, account: ActorId, series_id: SeriesId) -> Result<Amount, Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = ProtocolModule::liquidate(st, caller, account, series_id, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn liquidate_account(&mut self, account: ActorId) -> Result<Amount, Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = ProtocolModule::liquidate_account(st, caller, account, utils::now());
        self.publish(st);
        result
    }

    fn publish(&self, st: &mut ClearingState) {
        for event in st.take_events() {
            self.emit_event(event).expect("Failed to emit event");
        }
    }
}
