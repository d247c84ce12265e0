use alloc::collections::VecDeque;
use sails_rs::prelude::*;
use crate::types::*;

#[event]
#[derive(Encode, Decode, TypeInfo, Clone, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub enum ClearingEvent {
    // Vault
    VaultCreated { owner: ActorId, asset: String },
    CollateralDeposited { owner: ActorId, amount: Amount, deposited: Amount },
    CollateralWithdrawn { owner: ActorId, amount: Amount, deposited: Amount },
    CollateralLocked { owner: ActorId, amount: Amount, locked: Amount },
    CollateralReleased { owner: ActorId, amount: Amount, locked: Amount },
    VaultLiquidated { owner: ActorId, seized: Amount },

    // Positions
    SeriesCreated { series_id: SeriesId, issuer: ActorId, underlying: String },
    PositionRegistered { account: ActorId, series_id: SeriesId, direction: Direction, quantity: u128, required_margin: Amount },
    MarginUpdated { account: ActorId, series_id: SeriesId, margin_before: Amount, margin_after: Amount },
    MarginCall { account: ActorId, margin_required: Amount, margin_available: Amount },
    PositionLiquidated { account: ActorId, series_id: SeriesId, quantity: u128 },

    // Settlement
    SettlementInitiated { series_id: SeriesId, kind: SettlementKind, settlement_price: u128, total_payoff: Amount, total_fees: Amount },
    SettlementCompleted { series_id: SeriesId, positions_settled: u32, shortfall: Amount },
    EarlyExercised { exercise_id: ExerciseId, series_id: SeriesId, holder: ActorId, quantity: u128, payoff: Amount, fee: Amount },
    PayoutCompleted { payout_id: PayoutId, series_id: SeriesId, recipient: ActorId, amount: Amount, kind: PayoutKind },

    // Oracle
    PriceUpdated { asset: String, price: u128, timestamp: u64, source: ActorId },
    OracleWhitelisted { oracle: ActorId },
    OracleDeactivated { oracle: ActorId },
    FeedStatusChanged { asset: String, status: FeedStatus },
    SettlementPriceFrozen { series_id: SeriesId, spot_price: u128, twap_price: u128 },

    // Admin
    Paused { by: ActorId },
    Resumed { by: ActorId },
    RoleGranted { account: ActorId, role: Role },
    RoleRevoked { account: ActorId, role: Role },
    ConfigUpdated,
    ComplianceUpdated { account: Option<ActorId>, series_id: Option<SeriesId>, blocked: bool },
}

#[derive(Encode, Decode, TypeInfo, Clone, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct JournalEntry {
    pub seq: u64,
    pub timestamp: u64,
    pub event: ClearingEvent,
}

/// Recent event history, queryable through the view service.
/// Events themselves go out as program events; this copy is bounded and
/// drops the oldest entries once `capacity` is reached. Sequence numbers
/// keep increasing.
#[derive(Clone, Debug)]
pub struct EventJournal {
    entries: VecDeque<JournalEntry>,
    next_seq: u64,
}

impl EventJournal {
    pub fn new() -> Self {
        Self { entries: VecDeque::new(), next_seq: 0 }
    }

    pub fn push(&mut self, timestamp: u64, event: ClearingEvent, capacity: u32) {
        let capacity = capacity.max(1) as usize;
        while self.entries.len() >= capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(JournalEntry { seq: self.next_seq, timestamp, event });
        self.next_seq += 1;
    }

    /// Entries with `seq >= from`, at most `limit`
    pub fn since(&self, from: u64, limit: u32) -> Vec<JournalEntry> {
        self.entries
            .iter()
            .filter(|e| e.seq >= from)
            .take(limit as usize)
            .cloned()
            .collect()
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ClearingEvent> {
        self.entries.back().map(|e| &e.event)
    }
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paused(n: u64) -> ClearingEvent {
        ClearingEvent::Paused { by: ActorId::from(n) }
    }

    #[test]
    fn journal_evicts_oldest_and_keeps_sequence() {
        let mut journal = EventJournal::new();
        for i in 0..5u64 {
            journal.push(i * 10, paused(i), 3);
        }
        assert_eq!(journal.len(), 3);
        assert_eq!(journal.next_seq(), 5);

        let page = journal.since(0, 10);
        assert_eq!(page.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(page[0].timestamp, 20);
        assert_eq!(journal.last(), Some(&paused(4)));
    }

    #[test]
    fn since_pages_by_sequence() {
        let mut journal = EventJournal::default();
        for i in 0..6u64 {
            journal.push(i, paused(i), 100);
        }
        let page = journal.since(2, 2);
        assert_eq!(page.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![2, 3]);
        assert!(journal.since(6, 10).is_empty());
    }

    #[test]
    fn outbox_keeps_events_the_journal_evicted() {
        let mut st = crate::ClearingState::new(ActorId::from(1));
        st.config.journal_capacity = 2;
        for i in 0..3u64 {
            st.emit(i, paused(i));
        }
        assert_eq!(st.journal.len(), 2);
        assert_eq!(st.take_events(), vec![paused(0), paused(1), paused(2)]);
        assert!(st.take_events().is_empty());
        assert_eq!(st.journal.next_seq(), 3);
    }
}
