pub mod access;
pub mod ledger;
pub mod notify;
