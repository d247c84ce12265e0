use sails_rs::{prelude::*, gstd::msg};
use crate::{
    types::*,
    errors::Error,
    events::ClearingEvent,
    modules::vault::VaultModule,
    utils,
    ClearingState,
};

/// Collateral vaults (one per owner, in the configured collateral asset).
/// Balances are in-program; token custody lives outside this program.
#[derive(Default)]
pub struct VaultService;

impl VaultService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[service(events = ClearingEvent)]
impl VaultService {
    #[export]
    pub fn create_vault(&mut self, asset: String) -> Result<(), Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = VaultModule::create_vault(st, caller, asset, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn deposit(&mut self, asset: String, amount: Amount) -> Result<Amount, Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = VaultModule::deposit_collateral(st, caller, &asset, amount, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn withdraw(&mut self, asset: String, amount: Amount) -> Result<Amount, Error> {
        let caller = msg::source();
        let st = ClearingState::get_mut();
        let result = VaultModule::withdraw_collateral(st, caller, &asset, amount, utils::now());
        self.publish(st);
        result
    }

    #[export]
    pub fn vault_info(&self, owner: ActorId) -> Result<VaultInfo, Error> {
        VaultModule::get_vault_info(ClearingState::get(), owner)
    }

    #[export]
    pub fn my_vault(&self) -> Result<VaultInfo, Error> {
        let caller = msg::source();
        self.vault_info(caller)
    }

    fn publish(&self, st: &mut ClearingState) {
        for event in st.take_events() {
            self.emit_event(event).expect("Failed to emit event");
        }
    }
}
