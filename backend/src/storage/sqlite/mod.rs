//! SQLite-backed document store.

pub mod db;

pub use db::DbConnection;
