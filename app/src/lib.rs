#![no_std]
#![warn(clippy::new_without_default)]
#![allow(static_mut_refs)]

extern crate alloc;

pub mod utils;
pub mod types;
pub mod events;
pub mod errors;
pub mod modules;
mod services;

use alloc::collections::BTreeSet;
use sails_rs::prelude::*;
use sails_rs::collections::BTreeMap;
use sails_rs::gstd::msg;

use errors::Error;
use events::{ClearingEvent, EventJournal};
use modules::{access::Roles, compliance::ComplianceRegistry, oracle::OracleState};
use types::*;

static mut STATE: Option<ClearingState> = None;

#[derive(Debug, Clone)]
pub struct ClearingState {
    pub roles: Roles,
    pub config: ProtocolConfig,
    pub paused: bool,
    pub oracle: OracleState,
    pub series: BTreeMap<SeriesId, OptionSeries>,
    pub vaults: BTreeMap<ActorId, Vault>,
    pub positions: BTreeMap<PositionKey, Position>,
    pub account_positions: BTreeMap<ActorId, BTreeSet<SeriesId>>,
    pub series_positions: BTreeMap<SeriesId, BTreeSet<ActorId>>,
    pub portfolios: BTreeMap<ActorId, PortfolioSummary>,
    pub settlements: BTreeMap<SeriesId, SettlementRecord>,
    pub early_exercises: BTreeMap<ExerciseId, SettlementRecord>,
    pub payouts: BTreeMap<PayoutId, PayoutRecord>,
    /// Payout ids of each series' expiry settlement
    pub settlement_payouts: BTreeMap<SeriesId, Vec<PayoutId>>,
    pub early_exercise_payouts: BTreeMap<ExerciseId, PayoutId>,
    pub compliance: ComplianceRegistry,
    pub stats: ProtocolStats,
    pub journal: EventJournal,
    /// Events raised by the current message, drained by the service layer
    pub pending_events: Vec<ClearingEvent>,
    pub next_series_id: SeriesId,
    pub next_payout_id: PayoutId,
    pub next_exercise_id: ExerciseId,
}

impl ClearingState {
    pub fn new(admin: ActorId) -> Self {
        Self {
            roles: Roles::new(admin),
            config: ProtocolConfig::with_treasury(admin),
            paused: false,
            oracle: OracleState::new(),
            series: BTreeMap::new(),
            vaults: BTreeMap::new(),
            positions: BTreeMap::new(),
            account_positions: BTreeMap::new(),
            series_positions: BTreeMap::new(),
            portfolios: BTreeMap::new(),
            settlements: BTreeMap::new(),
            early_exercises: BTreeMap::new(),
            payouts: BTreeMap::new(),
            settlement_payouts: BTreeMap::new(),
            early_exercise_payouts: BTreeMap::new(),
            compliance: ComplianceRegistry::default(),
            stats: ProtocolStats::default(),
            journal: EventJournal::new(),
            pending_events: Vec::new(),
            next_series_id: 1,
            next_payout_id: 1,
            next_exercise_id: 1,
        }
    }

    pub fn get() -> &'static Self {
        unsafe { STATE.as_ref().expect("State not initialized") }
    }

    pub fn get_mut() -> &'static mut Self {
        unsafe { STATE.as_mut().expect("State not initialized") }
    }

    pub fn init(admin: ActorId) {
        unsafe { STATE = Some(Self::new(admin)); }
    }

    /// Queue an event for emission and record it in the journal
    pub fn emit(&mut self, now: u64, event: ClearingEvent) {
        let capacity = self.config.journal_capacity;
        self.journal.push(now, event.clone(), capacity);
        self.pending_events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<ClearingEvent> {
        core::mem::take(&mut self.pending_events)
    }

    pub fn ensure_not_paused(&self) -> Result<(), Error> {
        if self.paused { Err(Error::ProtocolPaused) } else { Ok(()) }
    }

    pub fn get_series(&self, series_id: SeriesId) -> Result<&OptionSeries, Error> {
        self.series.get(&series_id).ok_or(Error::SeriesNotFound)
    }

    pub fn generate_series_id(&mut self) -> SeriesId {
        let id = self.next_series_id;
        self.next_series_id += 1;
        id
    }

    pub fn generate_payout_id(&mut self) -> PayoutId {
        let id = self.next_payout_id;
        self.next_payout_id += 1;
        id
    }

    pub fn generate_exercise_id(&mut self) -> ExerciseId {
        let id = self.next_exercise_id;
        self.next_exercise_id += 1;
        id
    }
}

use services::{
    AdminService, OracleService, SettlementService, TradingService, VaultService, ViewService,
};

pub struct OptionsClearingProgram(());

#[program]
impl OptionsClearingProgram {
    /// Admin is taken from msg::source()
    pub fn new() -> Self {
        let creator = msg::source();
        ClearingState::init(creator);
        Self(())
    }

    pub fn admin(&self) -> AdminService { AdminService::new() }
    pub fn oracle(&self) -> OracleService { OracleService::new() }
    pub fn vault(&self) -> VaultService { VaultService::new() }
    pub fn trading(&self) -> TradingService { TradingService::new() }
    pub fn settlement(&self) -> SettlementService { SettlementService::new() }
    pub fn view(&self) -> ViewService { ViewService::new() }
}
