use sails_rs::{prelude::*, gstd::msg};
use crate::{
    types::*,
    errors::Error,
    events::ClearingEvent,
    modules::{access::AccessModule, compliance::ComplianceModule, protocol::ProtocolModule},
    utils,
    ClearingState,
};

/// Roles, configuration, pause switch and the compliance registry
#[derive(Default)]
pub struct AdminService;

impl AdminService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[service(events = ClearingEvent)]
impl AdminService {
    #[export]
    pub fn grant_role(&mut self, account: ActorId, role: Role) -> Result<(), Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = AccessModule::grant_role(st, caller, account, role, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn revoke_role(&mut self, account: ActorId, role: Role) -> Result<(), Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = AccessModule::revoke_role(st, caller, account, role, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn update_config(&mut self, config: ProtocolConfig) -> Result<(), Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = ProtocolModule::update_config(st, caller, config, utils::now());
        self.publish(st);
        result
    }

    /// Admin or Guardian
    #[export]
    pub fn pause(&mut self) -> Result<(), Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = ProtocolModule::pause(st, caller, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn resume(&mut self) -> Result<(), Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = ProtocolModule::resume(st, caller, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn set_account_blocked(&mut self, account: ActorId, blocked: bool) -> Result<(), Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = ComplianceModule::set_account_blocked(st, caller, account, blocked, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn set_series_blocked(&mut self, series_id: SeriesId, blocked: bool) -> Result<(), Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = ComplianceModule::set_series_blocked(st, caller, series_id, blocked, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn roles_of(&self, account: ActorId) -> Vec<Role> {
        ClearingState::get().roles.roles_of(account)
    }

    #[export]
    pub fn is_paused(&self) -> bool {
        ClearingState::get().paused
    }

    fn publish(&self, st: &mut ClearingState) {
        for event in st.take_events() {
            self.emit_event(event).expect("Failed to emit event");
        }
    }
}
