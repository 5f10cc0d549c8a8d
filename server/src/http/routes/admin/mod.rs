pub mod ledger;
pub mod metrics;
