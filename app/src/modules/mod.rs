// modules/mod.rs - Module exports

pub mod access;
pub mod compliance;
pub mod oracle;
pub mod vault;
pub mod margin;
pub mod settlement;
pub mod protocol;

#[cfg(test)]
pub(crate) mod fixtures;
