use sails_rs::prelude::*;

pub type SeriesId = u64;
pub type PayoutId = u64;
pub type ExerciseId = u64;

/// Fixed-point amount (micro-units of the collateral asset, 1e6)
pub type Amount = u128;
/// 1 unit = 1_000_000 micro-units
pub const PRICE_SCALE: u128 = 1_000_000;
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Accepted oracle price band, inclusive (fixed-point)
pub const MIN_VALID_PRICE: u128 = 1;
pub const MAX_VALID_PRICE: u128 = 1_000_000_000 * PRICE_SCALE;

#[derive(Encode, Decode, TypeInfo, Clone, Copy, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub enum OptionType {
    Call,
    Put,
}

#[derive(Encode, Decode, TypeInfo, Clone, Copy, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub enum SettlementStyle {
    Cash,
    Physical,
}

#[derive(Encode, Decode, TypeInfo, Clone, Copy, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub enum ExerciseStyle {
    European,
    American,
}

/// Option contract definition. Immutable once created.
#[derive(Encode, Decode, TypeInfo, Clone, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct OptionSeries {
    pub id: SeriesId,
    /// Underlying asset id as validated by the external registry (e.g. "ETH")
    pub underlying: String,
    /// Strike price (fixed-point)
    pub strike: u128,
    /// Expiry, unix seconds
    pub expiry: u64,
    pub option_type: OptionType,
    /// Units of underlying per contract
    pub contract_size: u128,
    pub settlement_style: SettlementStyle,
    pub exercise_style: ExerciseStyle,
    pub issuer: ActorId,
    pub created_at: u64,
}

impl OptionSeries {
    pub fn is_american(&self) -> bool {
        self.exercise_style == ExerciseStyle::American
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expiry
    }
}

/// Parameters for creating a series
#[derive(Encode, Decode, TypeInfo, Clone, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct SeriesParams {
    pub underlying: String,
    pub strike: u128,
    pub expiry: u64,
    pub option_type: OptionType,
    pub contract_size: u128,
    pub settlement_style: SettlementStyle,
    pub exercise_style: ExerciseStyle,
}

#[derive(Encode, Decode, TypeInfo, Clone, Copy, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub enum Direction {
    Long,
    Short,
}

/// One position per account per series
#[derive(Encode, Decode, TypeInfo, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct PositionKey {
    pub account: ActorId,
    pub series_id: SeriesId,
}

impl PositionKey {
    pub fn new(account: ActorId, series_id: SeriesId) -> Self {
        Self { account, series_id }
    }
}

#[derive(Encode, Decode, TypeInfo, Clone, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct Position {
    pub account: ActorId,
    pub series_id: SeriesId,
    pub direction: Direction,
    /// Contracts, always > 0 while the position exists
    pub quantity: u128,
    /// Weighted average trade price (fixed-point)
    pub entry_price: u128,
    /// Price used by the last margin refresh (fixed-point)
    pub last_price: u128,
    /// Signed, fixed-point
    pub unrealized_pnl: i128,
    pub required_margin: Amount,
    /// Collateral locked in the vault against this position (shorts only)
    pub collateral_posted: Amount,
    pub is_american: bool,
    pub last_updated: u64,
}

impl Position {
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.account, self.series_id)
    }

    pub fn is_long(&self) -> bool {
        self.direction == Direction::Long
    }
}

#[derive(Encode, Decode, TypeInfo, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Encode, Decode, TypeInfo, Clone, Debug, PartialEq, Eq, Default)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct PortfolioSummary {
    pub account: ActorId,
    pub position_count: u32,
    pub long_quantity: u128,
    pub short_quantity: u128,
    pub unrealized_pnl: i128,
    pub margin_required: Amount,
    /// Total collateral deposited in the account's vault
    pub margin_available: Amount,
    pub risk_level: RiskLevel,
    pub updated_at: u64,
}

/// Per-owner collateral ledger. `locked <= deposited` at all times.
#[derive(Encode, Decode, TypeInfo, Clone, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct Vault {
    pub owner: ActorId,
    pub asset: String,
    pub deposited: Amount,
    pub locked: Amount,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Vault {
    pub fn available(&self) -> Amount {
        self.deposited.saturating_sub(self.locked)
    }
}

#[derive(Encode, Decode, TypeInfo, Clone, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct VaultInfo {
    pub vault: Vault,
    pub available: Amount,
}

#[derive(Encode, Decode, TypeInfo, Clone, Copy, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub enum FeedStatus {
    Active,
    Suspended,
}

/// Live price for one asset, overwritten on every accepted update
#[derive(Encode, Decode, TypeInfo, Clone, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct PriceFeed {
    pub asset: String,
    pub price: u128,
    pub timestamp: u64,
    pub status: FeedStatus,
    pub source: ActorId,
    /// Half-width of the reported confidence interval (fixed-point)
    pub confidence: u128,
}

#[derive(Encode, Decode, TypeInfo, Clone, Copy, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct PriceSample {
    pub price: u128,
    pub timestamp: u64,
}

#[derive(Encode, Decode, TypeInfo, Clone, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct OracleEntry {
    pub active: bool,
    pub added_at: u64,
    pub updated_at: u64,
}

/// Frozen per-series settlement price. Payoffs use `twap_price`.
#[derive(Encode, Decode, TypeInfo, Clone, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct SettlementPrice {
    pub series_id: SeriesId,
    pub asset: String,
    pub spot_price: u128,
    pub twap_price: u128,
    pub frozen_at: u64,
}

#[derive(Encode, Decode, TypeInfo, Clone, Copy, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub enum SettlementKind {
    Cash,
    Physical,
    EarlyExercise,
}

#[derive(Encode, Decode, TypeInfo, Clone, Copy, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub enum SettlementStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    EarlyExercised,
}

#[derive(Encode, Decode, TypeInfo, Clone, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct SettlementRecord {
    pub series_id: SeriesId,
    pub kind: SettlementKind,
    pub settlement_price: u128,
    pub status: SettlementStatus,
    pub total_payoff: Amount,
    pub total_fees: Amount,
    pub early_exercise_holder: Option<ActorId>,
    /// Positions already paid out by disbursement batches
    pub positions_settled: u32,
    /// Fees withheld from long payouts so far
    pub fees_accrued: Amount,
    /// Long payoff left unpaid once short collateral and the insurance
    /// fund are exhausted
    pub shortfall: Amount,
    /// Value backing the long side: short debits plus any insurance draw
    pub collected: Amount,
    /// Gross value credited to longs so far
    pub paid_to_longs: Amount,
    /// Open short contracts at initiation; shorts owe `total_payoff` pro rata
    pub short_quantity: u128,
    /// Set once every short is processed and `collected` is final
    pub pool_sealed: bool,
    /// keccak256 over (series, kind, price, totals)
    pub snapshot_hash: H256,
    pub initiated_at: u64,
    pub completed_at: Option<u64>,
}

#[derive(Encode, Decode, TypeInfo, Clone, Copy, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub enum PayoutKind {
    LongPayoff,
    ShortCollateralReturn,
    Fee,
}

#[derive(Encode, Decode, TypeInfo, Clone, Copy, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub enum PayoutStatus {
    Pending,
    Completed,
}

#[derive(Encode, Decode, TypeInfo, Clone, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct PayoutRecord {
    pub id: PayoutId,
    pub series_id: SeriesId,
    pub recipient: ActorId,
    pub amount: Amount,
    pub kind: PayoutKind,
    pub status: PayoutStatus,
    pub created_at: u64,
    pub completed_at: Option<u64>,
}

/// Before/after of a margin refresh
#[derive(Encode, Decode, TypeInfo, Clone, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct MarginUpdate {
    pub account: ActorId,
    pub series_id: SeriesId,
    pub margin_before: Amount,
    pub margin_after: Amount,
    pub delta: i128,
}

#[derive(Encode, Decode, TypeInfo, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub enum Role {
    Admin,
    Guardian,
    Operator,
    Issuer,
}

/// Protocol parameters (admin-updatable)
#[derive(Encode, Decode, TypeInfo, Clone, Debug, PartialEq, Eq)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct ProtocolConfig {
    /// The single collateral asset vaults accept
    pub collateral_asset: String,
    /// Receives settlement fees
    pub treasury: ActorId,

    // Oracle
    pub max_staleness_secs: u64,
    pub twap_window_secs: u64,
    pub min_twap_samples: u32,
    pub max_history_len: u32,

    // Fees & margin
    pub settlement_fee_bps: u16,
    pub early_exercise_fee_bps: u16,
    pub american_premium_bps: u16,

    pub journal_capacity: u32,
}

impl ProtocolConfig {
    pub fn with_treasury(treasury: ActorId) -> Self {
        Self {
            collateral_asset: String::from("USDC"),
            treasury,
            max_staleness_secs: 300,
            twap_window_secs: 3_600,
            min_twap_samples: 10,
            max_history_len: 1_000,
            settlement_fee_bps: 10,
            early_exercise_fee_bps: 15,
            american_premium_bps: 2_000,
            journal_capacity: 10_000,
        }
    }
}

/// Running protocol totals
#[derive(Encode, Decode, TypeInfo, Clone, Debug, PartialEq, Eq, Default)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub struct ProtocolStats {
    pub series_created: u64,
    pub positions_opened: u64,
    /// Contracts bought
    pub long_volume: u128,
    /// Contracts written
    pub short_volume: u128,
    pub settlements_completed: u64,
    pub early_exercises: u64,
    pub liquidations: u64,
    pub total_payouts: Amount,
    pub fees_collected: Amount,
    /// Collateral seized by liquidations
    pub insurance_fund: Amount,
    /// Liability no collateral covered
    pub bad_debt: Amount,
}
