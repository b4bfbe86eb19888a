pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod storage;
