use sails_rs::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo)]
#[codec(crate = sails_rs::scale_codec)]
#[scale_info(crate = sails_rs::scale_info)]
pub enum Error {
    // Access
    Unauthorized,
    OracleNotWhitelisted,
    ComplianceRejected,
    ProtocolPaused,

    // Validation
    InvalidAmount,
    InvalidPrice,
    InvalidParameter,
    AssetMismatch,
    UnsupportedAsset,

    // Oracle
    OracleAlreadyWhitelisted,
    FeedSuspended,
    PriceNotAvailable,
    PriceStale,
    InsufficientHistory,
    SettlementPriceAlreadySet,
    SettlementPriceNotSet,

    // Vault
    VaultAlreadyExists,
    VaultNotFound,
    InsufficientCollateral,
    ReleaseExceedsLocked,

    // Series / positions
    SeriesNotFound,
    SeriesExpired,
    SeriesNotExpired,
    PositionNotFound,
    ConflictingPosition,
    InsufficientPosition,
    InsufficientMargin,
    MarginSufficient,
    PositionNotLiquidatable,

    // Settlement
    NotAmericanStyle,
    SettlementStyleMismatch,
    AlreadySettled,
    SettlementNotFound,
    InvalidSettlementState,

    // Other
    MathOverflow,
}
