mod admin_service;
mod oracle_service;
mod vault_service;
mod trading_service;
mod settlement_service;
mod view_service;

pub use admin_service::AdminService;
pub use oracle_service::OracleService;
pub use vault_service::VaultService;
pub use trading_service::TradingService;
pub use settlement_service::SettlementService;
pub use view_service::ViewService;
