// ABOUTME: PostgreSQL access layer for the dump tool
// ABOUTME: Exposes connection setup and the row source the dump pipeline reads from

pub mod connection;
pub mod source;

pub use connection::{connect, connect_with_retry};
pub use source::{RowSource, TableRows};
