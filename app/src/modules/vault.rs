use sails_rs::prelude::*;
use crate::{
    types::*,
    errors::Error,
    events::ClearingEvent,
    ClearingState,
};

/// Per-owner collateral ledger. Every mutation keeps `locked <= deposited`.
pub struct VaultModule;

impl VaultModule {
    pub fn create_vault(st: &mut ClearingState, owner: ActorId, asset: String, now: u64) -> Result<(), Error> {
        st.ensure_not_paused()?;
        Self::open_vault(st, owner, asset, now)
    }

    fn open_vault(st: &mut ClearingState, owner: ActorId, asset: String, now: u64) -> Result<(), Error> {
        if st.vaults.contains_key(&owner) {
            return Err(Error::VaultAlreadyExists);
        }
        if asset != st.config.collateral_asset {
            return Err(Error::UnsupportedAsset);
        }
        st.vaults.insert(owner, Vault { owner, asset: asset.clone(), deposited: 0, locked: 0, created_at: now, updated_at: now });
        st.emit(now, ClearingEvent::VaultCreated { owner, asset });
        Ok(())
    }

    pub fn deposit_collateral(st: &mut ClearingState, owner: ActorId, asset: &str, amount: Amount, now: u64) -> Result<Amount, Error> {
        st.ensure_not_paused()?;
        if amount == 0 {
            return Err(Error::InvalidAmount);
        }
        let vault = st.vaults.get_mut(&owner).ok_or(Error::VaultNotFound)?;
        if vault.asset != asset {
            return Err(Error::AssetMismatch);
        }
        vault.deposited = vault.deposited.checked_add(amount).ok_or(Error::MathOverflow)?;
        vault.updated_at = now;
        let deposited = vault.deposited;
        st.emit(now, ClearingEvent::CollateralDeposited { owner, amount, deposited });
        Ok(deposited)
    }

    pub fn withdraw_collateral(st: &mut ClearingState, owner: ActorId, asset: &str, amount: Amount, now: u64) -> Result<Amount, Error> {
        st.ensure_not_paused()?;
        if amount == 0 {
            return Err(Error::InvalidAmount);
        }
        let vault = st.vaults.get_mut(&owner).ok_or(Error::VaultNotFound)?;
        if vault.asset != asset {
            return Err(Error::AssetMismatch);
        }
        if vault.available() < amount {
            return Err(Error::InsufficientCollateral);
        }
        vault.deposited -= amount;
        vault.updated_at = now;
        let deposited = vault.deposited;
        st.emit(now, ClearingEvent::CollateralWithdrawn { owner, amount, deposited });
        Ok(deposited)
    }

    /// Reserve free collateral against an open position
    pub fn lock_for_position(st: &mut ClearingState, owner: ActorId, amount: Amount, now: u64) -> Result<(), Error> {
        Self::ensure_can_lock(st, owner, amount)?;
        let vault = st.vaults.get_mut(&owner).ok_or(Error::VaultNotFound)?;
        vault.locked += amount;
        vault.updated_at = now;
        let locked = vault.locked;
        st.emit(now, ClearingEvent::CollateralLocked { owner, amount, locked });
        Ok(())
    }

    pub fn ensure_can_lock(st: &ClearingState, owner: ActorId, amount: Amount) -> Result<(), Error> {
        let vault = st.vaults.get(&owner).ok_or(Error::VaultNotFound)?;
        if vault.available() < amount {
            return Err(Error::InsufficientCollateral);
        }
        Ok(())
    }

    pub fn release_after_settlement(st: &mut ClearingState, owner: ActorId, amount: Amount, now: u64) -> Result<(), Error> {
        let vault = st.vaults.get_mut(&owner).ok_or(Error::VaultNotFound)?;
        if amount > vault.locked {
            return Err(Error::ReleaseExceedsLocked);
        }
        vault.locked -= amount;
        vault.updated_at = now;
        let locked = vault.locked;
        st.emit(now, ClearingEvent::CollateralReleased { owner, amount, locked });
        Ok(())
    }

    /// Move value out of a vault during settlement. Only free collateral
    /// can be debited; returns the amount actually taken.
    pub fn debit_collateral(st: &mut ClearingState, owner: ActorId, amount: Amount, now: u64) -> Result<Amount, Error> {
        let vault = st.vaults.get_mut(&owner).ok_or(Error::VaultNotFound)?;
        let taken = amount.min(vault.available());
        vault.deposited -= taken;
        vault.updated_at = now;
        Ok(taken)
    }

    pub fn credit_collateral(st: &mut ClearingState, owner: ActorId, amount: Amount, now: u64) -> Result<Amount, Error> {
        let vault = st.vaults.get_mut(&owner).ok_or(Error::VaultNotFound)?;
        vault.deposited = vault.deposited.checked_add(amount).ok_or(Error::MathOverflow)?;
        vault.updated_at = now;
        Ok(vault.deposited)
    }

    /// Credit settlement proceeds, opening a vault in the collateral asset
    /// for recipients that never had one (e.g. the treasury)
    pub fn credit_or_open(st: &mut ClearingState, owner: ActorId, amount: Amount, now: u64) -> Result<Amount, Error> {
        if !st.vaults.contains_key(&owner) {
            let asset = st.config.collateral_asset.clone();
            Self::open_vault(st, owner, asset, now)?;
        }
        Self::credit_collateral(st, owner, amount, now)
    }

    /// Confiscate collateral locked against one liquidated position
    pub fn seize_locked(st: &mut ClearingState, owner: ActorId, amount: Amount, now: u64) -> Result<Amount, Error> {
        let vault = st.vaults.get_mut(&owner).ok_or(Error::VaultNotFound)?;
        if amount > vault.locked {
            return Err(Error::ReleaseExceedsLocked);
        }
        vault.locked -= amount;
        vault.deposited -= amount;
        vault.updated_at = now;
        st.emit(now, ClearingEvent::VaultLiquidated { owner, seized: amount });
        Ok(amount)
    }

    /// Seize every locked unit. Both `locked` and `deposited` are debited,
    /// so the reported amount is exactly what left the owner's ledger.
    /// Free collateral stays with the owner.
    pub fn force_liquidate(st: &mut ClearingState, owner: ActorId, now: u64) -> Result<Amount, Error> {
        let vault = st.vaults.get_mut(&owner).ok_or(Error::VaultNotFound)?;
        let seized = vault.locked;
        vault.deposited -= seized;
        vault.locked = 0;
        vault.updated_at = now;
        st.emit(now, ClearingEvent::VaultLiquidated { owner, seized });
        Ok(seized)
    }

    pub fn get_vault_info(st: &ClearingState, owner: ActorId) -> Result<VaultInfo, Error> {
        let vault = st.vaults.get(&owner).ok_or(Error::VaultNotFound)?;
        Ok(VaultInfo { available: vault.available(), vault: vault.clone() })
    }

    pub fn deposited(st: &ClearingState, owner: ActorId) -> Amount {
        st.vaults.get(&owner).map(|v| v.deposited).unwrap_or(0)
    }
}
