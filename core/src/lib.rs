pub mod chain;
pub mod defs;
pub mod error;
pub mod gas;
pub mod ledger;
