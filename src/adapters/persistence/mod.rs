//! Persistence adapters. libsql (SQLite) implementation of every repository port.

mod sqlite_dispatch;
mod sqlite_incidents;
pub mod sqlite_repo;

pub use sqlite_repo::SqliteRepo;
