pub mod ledger;
pub mod lock;
pub mod metrics;
pub mod rescue;
pub mod store;
