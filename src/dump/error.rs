// ABOUTME: Error conditions callers of the dump pipeline need to tell apart
// ABOUTME: Travels inside anyhow::Error and is recovered with downcast_ref

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DumpError {
    #[error(
        "Provide either --user-id or --account-id, not both. \
         Or pass a positional argument (assumed to be a user id)."
    )]
    ConflictingIdentifiers,

    #[error(
        "No identifier given. Usage: pg-user-dump [--output] \
         [--user-id <ID> | --account-id <ID> | <USER_ID>]"
    )]
    MissingIdentifier,

    #[error("Could not find user_id {0} in the database")]
    UserNotFound(String),

    #[error("Could not find a user_id associated with account_id {0}")]
    AccountNotFound(String),

    #[error("Identifier '{value}' is not a valid {expected} value")]
    InvalidIdentifier { value: String, expected: String },

    #[error("Row for table '{table}' has {columns} columns but {values} values")]
    RowShapeMismatch {
        table: String,
        columns: usize,
        values: usize,
    },
}

impl DumpError {
    /// True for errors raised before any database access.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            DumpError::ConflictingIdentifiers | DumpError::MissingIdentifier
        )
    }
}
