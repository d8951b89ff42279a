// ABOUTME: User dump pipeline: identifier resolution, per-table queries, INSERT generation
// ABOUTME: Re-exports the pieces main.rs and the integration tests work with

pub mod error;
pub mod identifier;
pub mod numeric;
pub mod orchestrator;
pub mod row;
pub mod table;
pub mod value;

pub use error::DumpError;
pub use identifier::{resolve_user_id, Identifier, IdentifierArgs};
pub use orchestrator::{
    dump_file_name, dump_user, run, write_file, write_stdout, write_to, DumpOutput, FailurePolicy,
    SkippedTable, TableSummary,
};
pub use row::insert_statement;
pub use table::{dump_table, TableCatalog, TableDump, TableSpec, USER_TABLES};
pub use value::CellValue;
