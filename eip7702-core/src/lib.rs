pub mod authorization;
pub mod constants;
pub mod delegated_account;
pub mod transaction;
