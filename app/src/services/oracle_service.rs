use sails_rs::{prelude::*, gstd::msg};
use crate::{
    types::*,
    errors::Error,
    events::ClearingEvent,
    modules::oracle::OracleModule,
    utils,
    ClearingState,
};

/// Price feeds. Pushes stay open while the protocol is paused.
#[derive(Default)]
pub struct OracleService;

impl OracleService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[service(events = ClearingEvent)]
impl OracleService {
    #[export]
    pub fn whitelist_oracle(&mut self, oracle: ActorId) -> Result<(), Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = OracleModule::whitelist_oracle(st, caller, oracle, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn deactivate_oracle(&mut self, oracle: ActorId) -> Result<(), Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = OracleModule::deactivate_oracle(st, caller, oracle, utils::now());
        self.publish(st);
        result
    }

    /// Whitelisted oracles only
    #[export]
    pub fn push_price(&mut self, asset: String, price: u128, confidence: u128) -> Result<(), Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = OracleModule::push_price(st, caller, asset, price, confidence, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn set_feed_status(&mut self, asset: String, status: FeedStatus) -> Result<(), Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = OracleModule::set_feed_status(st, caller, asset, status, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn set_settlement_price(&mut self, series_id: SeriesId) -> Result<SettlementPrice, Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = OracleModule::set_settlement_price(st, caller, series_id, utils::now());
        self.publish(st);
        result
    }

    /// Latest price and its timestamp, fresh or not
    #[export]
    pub fn get_spot_price(&self, asset: String) -> Result<(u128, u64), Error> {
        OracleModule::get_spot_price(ClearingState::get(), &asset)
    }

    #[export]
    pub fn get_fresh_price(&self, asset: String) -> Result<u128, Error> {
        OracleModule::fresh_price(ClearingState::get(), &asset, utils::now())
    }

    #[export]
    pub fn get_twap_price(&self, asset: String, window_secs: u64) -> Result<u128, Error> {
        OracleModule::get_twap_price(ClearingState::get(), &asset, window_secs, utils::now())
    }

    #[export]
    pub fn get_feed(&self, asset: String) -> Result<PriceFeed, Error> {
        OracleModule::get_feed(ClearingState::get(), &asset)
    }

    #[export]
    pub fn get_series_settlement_price(&self, series_id: SeriesId) -> Result<SettlementPrice, Error> {
        OracleModule::get_series_settlement_price(ClearingState::get(), series_id)
    }

    #[export]
    pub fn is_whitelisted(&self, oracle: ActorId) -> bool {
        OracleModule::is_whitelisted(ClearingState::get(), oracle)
    }

    #[export]
    pub fn price_history(&self, asset: String) -> Vec<PriceSample> {
        OracleModule::history(ClearingState::get(), &asset)
    }

    fn publish(&self, st: &mut ClearingState) {
        for event in st.take_events() {
            self.emit_event(event).expect("Failed to emit event");
        }
    }
}
