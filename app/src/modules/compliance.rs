use alloc::collections::BTreeSet;
use sails_rs::prelude::*;
use crate::{errors::Error, events::ClearingEvent, types::{Role, SeriesId}, modules::access::AccessModule, ClearingState};

/// Eligibility predicate consulted before every trade.
/// The rule evaluation itself lives outside this program.
pub trait ComplianceGate {
    fn is_eligible(&self, account: ActorId, series_id: SeriesId) -> bool;
}

/// Operator-maintained block lists
#[derive(Debug, Clone, Default)]
pub struct ComplianceRegistry {
    pub blocked_accounts: BTreeSet<ActorId>,
    pub blocked_series: BTreeSet<SeriesId>,
}

impl ComplianceGate for ComplianceRegistry {
    fn is_eligible(&self, account: ActorId, series_id: SeriesId) -> bool {
        !self.blocked_accounts.contains(&account) && !self.blocked_series.contains(&series_id)
    }
}

pub struct ComplianceModule;

impl ComplianceModule {
    pub fn ensure_eligible<G: ComplianceGate + ?Sized>(gate: &G, account: ActorId, series_id: SeriesId) -> Result<(), Error> {
        if gate.is_eligible(account, series_id) { Ok(()) } else { Err(Error::ComplianceRejected) }
    }

    pub fn set_account_blocked(st: &mut ClearingState, caller: ActorId, account: ActorId, blocked: bool, now: u64) -> Result<(), Error> {
        AccessModule::require(&st.roles, caller, Role::Operator)?;
        if blocked {
            st.compliance.blocked_accounts.insert(account);
        } else {
            st.compliance.blocked_accounts.remove(&account);
        }
        st.emit(now, ClearingEvent::ComplianceUpdated { account: Some(account), series_id: None, blocked });
        Ok(())
    }

    pub fn set_series_blocked(st: &mut ClearingState, caller: ActorId, series_id: SeriesId, blocked: bool, now: u64) -> Result<(), Error> {
        AccessModule::require(&st.roles, caller, Role::Operator)?;
        if blocked {
            st.compliance.blocked_series.insert(series_id);
        } else {
            st.compliance.blocked_series.remove(&series_id);
        }
        st.emit(now, ClearingEvent::ComplianceUpdated { account: None, series_id: Some(series_id), blocked });
        Ok(())
    }
}
