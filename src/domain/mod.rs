pub mod models;
pub mod order_id;
pub mod query;
pub mod refund;
pub mod service;
pub mod validation;
