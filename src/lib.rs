pub mod config;
pub mod coverage;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod sequence;
pub mod service;
pub mod store;
pub mod utils;
