use alloc::collections::BTreeSet;
use sails_rs::prelude::*;
use sails_rs::collections::BTreeMap;
use crate::{errors::Error, events::ClearingEvent, types::Role, ClearingState};

/// Role registry. The admin is fixed at init and satisfies every role.
#[derive(Debug, Clone)]
pub struct Roles {
    pub admin: ActorId,
    pub grants: BTreeMap<ActorId, BTreeSet<Role>>,
}

impl Roles {
    pub fn new(admin: ActorId) -> Self {
        Self { admin, grants: BTreeMap::new() }
    }

    pub fn has_role(&self, actor: ActorId, role: Role) -> bool {
        if actor == self.admin {
            return true;
        }
        self.grants.get(&actor).is_some_and(|roles| roles.contains(&role))
    }

    pub fn roles_of(&self, actor: ActorId) -> Vec<Role> {
        let mut roles: Vec<Role> = self.grants.get(&actor).map(|r| r.iter().copied().collect()).unwrap_or_default();
        if actor == self.admin {
            roles.insert(0, Role::Admin);
        }
        roles
    }
}

pub struct AccessModule;

impl AccessModule {
    pub fn require(roles: &Roles, actor: ActorId, role: Role) -> Result<(), Error> {
        if roles.has_role(actor, role) { Ok(()) } else { Err(Error::Unauthorized) }
    }

    pub fn require_any(roles: &Roles, actor: ActorId, allowed: &[Role]) -> Result<(), Error> {
        if allowed.iter().any(|r| roles.has_role(actor, *r)) {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }

    /// Grant a non-admin role (admin only)
    pub fn grant_role(st: &mut ClearingState, caller: ActorId, account: ActorId, role: Role, now: u64) -> Result<(), Error> {
        Self::require(&st.roles, caller, Role::Admin)?;
        if role == Role::Admin {
            return Err(Error::InvalidParameter);
        }
        let inserted = st.roles.grants.entry(account).or_default().insert(role);
        if inserted {
            st.emit(now, ClearingEvent::RoleGranted { account, role });
        }
        Ok(())
    }

    pub fn revoke_role(st: &mut ClearingState, caller: ActorId, account: ActorId, role: Role, now: u64) -> Result<(), Error> {
        Self::require(&st.roles, caller, Role::Admin)?;
        if role == Role::Admin {
            return Err(Error::InvalidParameter);
        }
        let removed = match st.roles.grants.get_mut(&account) {
            Some(set) => {
                let removed = set.remove(&role);
                if set.is_empty() {
                    st.roles.grants.remove(&account);
                }
                removed
            }
            None => false,
        };
        if removed {
            st.emit(now, ClearingEvent::RoleRevoked { account, role });
        }
        Ok(())
    }
}
