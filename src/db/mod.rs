//! PostgreSQL metadata store adapter

mod postgres;
pub mod tables;

pub use postgres::Database;
