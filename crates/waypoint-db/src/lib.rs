//! Persistence layer for waypoint: connection pool, embedded migrations,
//! shared data model, and query modules per table.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
