pub mod admin;
pub mod ledger;
pub mod rescue;
