use alloc::collections::VecDeque;
use sails_rs::prelude::*;
use sails_rs::collections::BTreeMap;
use crate::{
    types::*,
    errors::Error,
    events::ClearingEvent,
    modules::access::AccessModule,
    ClearingState,
};

/// Bounded, time-ordered samples for one asset
#[derive(Clone, Debug, Default)]
pub struct PriceHistory {
    pub samples: VecDeque<PriceSample>,
}

impl PriceHistory {
    /// Append, evicting the oldest samples once `max_len` is reached
    pub fn push(&mut self, sample: PriceSample, max_len: u32) {
        let max_len = max_len.max(1) as usize;
        while self.samples.len() >= max_len {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct OracleState {
    pub feeds: BTreeMap<String, PriceFeed>,
    pub history: BTreeMap<String, PriceHistory>,
    /// Append-only: revocation flips `active`, entries are never removed
    pub oracles: BTreeMap<ActorId, OracleEntry>,
    pub settlement_prices: BTreeMap<SeriesId, SettlementPrice>,
}

impl OracleState {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct OracleModule;

impl OracleModule {
    pub fn whitelist_oracle(st: &mut ClearingState, caller: ActorId, oracle: ActorId, now: u64) -> Result<(), Error> {
        AccessModule::require(&st.roles, caller, Role::Admin)?;
        match st.oracle.oracles.get_mut(&oracle) {
            Some(entry) if entry.active => return Err(Error::OracleAlreadyWhitelisted),
            Some(entry) => {
                entry.active = true;
                entry.updated_at = now;
            }
            None => {
                st.oracle.oracles.insert(oracle, OracleEntry { active: true, added_at: now, updated_at: now });
            }
        }
        st.emit(now, ClearingEvent::OracleWhitelisted { oracle });
        Ok(())
    }

    pub fn deactivate_oracle(st: &mut ClearingState, caller: ActorId, oracle: ActorId, now: u64) -> Result<(), Error> {
        AccessModule::require(&st.roles, caller, Role::Admin)?;
        let entry = st.oracle.oracles.get_mut(&oracle).ok_or(Error::OracleNotWhitelisted)?;
        if !entry.active {
            return Err(Error::OracleNotWhitelisted);
        }
        entry.active = false;
        entry.updated_at = now;
        st.emit(now, ClearingEvent::OracleDeactivated { oracle });
        Ok(())
    }

    pub fn is_whitelisted(st: &ClearingState, oracle: ActorId) -> bool {
        st.oracle.oracles.get(&oracle).is_some_and(|e| e.active)
    }

    /// Accept a price from a whitelisted oracle. Rejected updates leave
    /// both the feed and the history untouched.
    pub fn push_price(
        st: &mut ClearingState,
        caller: ActorId,
        asset: String,
        price: u128,
        confidence: u128,
        now: u64,
    ) -> Result<(), Error> {
        if !Self::is_whitelisted(st, caller) {
            return Err(Error::OracleNotWhitelisted);
        }
        if asset.is_empty() {
            return Err(Error::InvalidParameter);
        }
        if !(MIN_VALID_PRICE..=MAX_VALID_PRICE).contains(&price) {
            return Err(Error::InvalidPrice);
        }
        if st.oracle.feeds.get(&asset).is_some_and(|f| f.status == FeedStatus::Suspended) {
            return Err(Error::FeedSuspended);
        }

        let max_len = st.config.max_history_len;
        st.oracle
            .history
            .entry(asset.clone())
            .or_default()
            .push(PriceSample { price, timestamp: now }, max_len);
        st.oracle.feeds.insert(
            asset.clone(),
            PriceFeed { asset: asset.clone(), price, timestamp: now, status: FeedStatus::Active, source: caller, confidence },
        );
        st.emit(now, ClearingEvent::PriceUpdated { asset, price, timestamp: now, source: caller });
        Ok(())
    }

    pub fn set_feed_status(st: &mut ClearingState, caller: ActorId, asset: String, status: FeedStatus, now: u64) -> Result<(), Error> {
        AccessModule::require(&st.roles, caller, Role::Admin)?;
        let feed = st.oracle.feeds.get_mut(&asset).ok_or(Error::PriceNotAvailable)?;
        feed.status = status;
        st.emit(now, ClearingEvent::FeedStatusChanged { asset, status });
        Ok(())
    }

    pub fn get_feed(st: &ClearingState, asset: &str) -> Result<PriceFeed, Error> {
        st.oracle.feeds.get(asset).cloned().ok_or(Error::PriceNotAvailable)
    }

    /// Latest (price, timestamp). Freshness is the caller's concern.
    pub fn get_spot_price(st: &ClearingState, asset: &str) -> Result<(u128, u64), Error> {
        let feed = st.oracle.feeds.get(asset).ok_or(Error::PriceNotAvailable)?;
        Ok((feed.price, feed.timestamp))
    }

    pub fn is_fresh(st: &ClearingState, asset: &str, now: u64) -> bool {
        st.oracle
            .feeds
            .get(asset)
            .is_some_and(|f| now.saturating_sub(f.timestamp) <= st.config.max_staleness_secs)
    }

    /// Spot price that is active and within `max_staleness_secs`
    pub fn fresh_price(st: &ClearingState, asset: &str, now: u64) -> Result<u128, Error> {
        let feed = st.oracle.feeds.get(asset).ok_or(Error::PriceNotAvailable)?;
        if feed.status == FeedStatus::Suspended {
            return Err(Error::FeedSuspended);
        }
        if now.saturating_sub(feed.timestamp) > st.config.max_staleness_secs {
            return Err(Error::PriceStale);
        }
        Ok(feed.price)
    }

    pub fn get_twap_price(st: &ClearingState, asset: &str, window: u64, now: u64) -> Result<u128, Error> {
        if window == 0 {
            return Err(Error::InvalidParameter);
        }
        let history = st.oracle.history.get(asset).ok_or(Error::InsufficientHistory)?;
        compute_twap(history.samples.iter(), window, now, st.config.min_twap_samples)
    }

    /// Freeze the settlement price of an expired series: fresh spot plus a
    /// TWAP over `twap_window_secs`. Admin only, once per series.
    pub fn set_settlement_price(st: &mut ClearingState, caller: ActorId, series_id: SeriesId, now: u64) -> Result<SettlementPrice, Error> {
        AccessModule::require(&st.roles, caller, Role::Admin)?;
        if st.oracle.settlement_prices.contains_key(&series_id) {
            return Err(Error::SettlementPriceAlreadySet);
        }
        let series = st.get_series(series_id)?;
        if !series.is_expired(now) {
            return Err(Error::SeriesNotExpired);
        }
        let asset = series.underlying.clone();
        let spot_price = Self::fresh_price(st, &asset, now)?;
        let twap_price = Self::get_twap_price(st, &asset, st.config.twap_window_secs, now)?;

        let frozen = SettlementPrice { series_id, asset, spot_price, twap_price, frozen_at: now };
        st.oracle.settlement_prices.insert(series_id, frozen.clone());
        st.emit(now, ClearingEvent::SettlementPriceFrozen { series_id, spot_price, twap_price });
        Ok(frozen)
    }

    pub fn get_series_settlement_price(st: &ClearingState, series_id: SeriesId) -> Result<SettlementPrice, Error> {
        st.oracle.settlement_prices.get(&series_id).cloned().ok_or(Error::SettlementPriceNotSet)
    }

    pub fn history(st: &ClearingState, asset: &str) -> Vec<PriceSample> {
        st.oracle
            .history
            .get(asset)
            .map(|h| h.samples.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// Time-weighted average over samples with timestamp in
/// `[now - window, now]`. Each sample is weighted by its offset from
/// the window start, so later samples count more.
pub fn compute_twap<'a>(
    samples: impl Iterator<Item = &'a PriceSample>,
    window: u64,
    now: u64,
    min_samples: u32,
) -> Result<u128, Error> {
    let window_start = now.saturating_sub(window);
    let mut count: u32 = 0;
    let mut weighted: u128 = 0;
    let mut total_weight: u128 = 0;

    for s in samples.filter(|s| s.timestamp >= window_start && s.timestamp <= now) {
        let weight = (s.timestamp - window_start) as u128;
        weighted = s.price
            .checked_mul(weight)
            .and_then(|pw| weighted.checked_add(pw))
            .ok_or(Error::MathOverflow)?;
        total_weight += weight;
        count += 1;
    }

    if count < min_samples || total_weight == 0 {
        return Err(Error::InsufficientHistory);
    }
    Ok(weighted / total_weight)
}
