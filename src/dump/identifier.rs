// ABOUTME: Resolves the identifier given on the command line to a canonical user id
// ABOUTME: Checks user existence or maps an account id to its owner before any dump runs

use anyhow::{Context, Result};

use super::error::DumpError;
use super::value::CellValue;
use crate::postgres::RowSource;
use crate::utils::sanitize_identifier;

pub const USER_EXISTS_QUERY: &str = "SELECT id FROM users WHERE id = $1";
pub const ACCOUNT_OWNER_QUERY: &str = "SELECT user_id FROM accounts WHERE id = $1";

/// Raw identifier options as typed by the user.
///
/// Empty strings count as not given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierArgs {
    pub positional: Option<String>,
    pub user_id: Option<String>,
    pub account_id: Option<String>,
}

/// The one identifier a dump is driven from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    User(String),
    Account(String),
}

impl IdentifierArgs {
    /// Pick the single identifier, rejecting conflicting or missing options.
    ///
    /// A positional value is read as a user id.
    ///
    /// # Examples
    ///
    /// ```
    /// # use pg_user_dump::dump::{DumpError, Identifier, IdentifierArgs};
    /// let args = IdentifierArgs { account_id: Some("A1".into()), ..Default::default() };
    /// assert_eq!(args.into_identifier(), Ok(Identifier::Account("A1".into())));
    ///
    /// let both = IdentifierArgs {
    ///     user_id: Some("U1".into()),
    ///     account_id: Some("A1".into()),
    ///     ..Default::default()
    /// };
    /// assert_eq!(both.into_identifier(), Err(DumpError::ConflictingIdentifiers));
    /// ```
    pub fn into_identifier(self) -> Result<Identifier, DumpError> {
        let given = |value: Option<String>| value.filter(|v| !v.is_empty());

        let mut candidates = [
            given(self.user_id).map(Identifier::User),
            given(self.account_id).map(Identifier::Account),
            given(self.positional).map(Identifier::User),
        ]
        .into_iter()
        .flatten();

        match (candidates.next(), candidates.next()) {
            (None, _) => Err(DumpError::MissingIdentifier),
            (Some(identifier), None) => Ok(identifier),
            (Some(_), Some(_)) => Err(DumpError::ConflictingIdentifiers),
        }
    }
}

/// Turn `identifier` into the user id every table query is keyed by.
///
/// An account id resolves to its owner, and the owner must then exist in
/// `users` just like a user id given directly.
///
/// # Errors
///
/// - [`DumpError::UserNotFound`] when the user id (given or owning the
///   account) has no row in `users`
/// - [`DumpError::AccountNotFound`] when the account id has no row in
///   `accounts`, or the row has no owner
/// - Any query failure, with context
pub async fn resolve_user_id<S>(source: &S, identifier: &Identifier) -> Result<String>
where
    S: RowSource + ?Sized,
{
    match identifier {
        Identifier::User(user_id) => find_user(source, user_id).await,
        Identifier::Account(account_id) => {
            let owner = lookup(source, ACCOUNT_OWNER_QUERY, account_id)
                .await
                .with_context(|| {
                    format!(
                        "Failed to look up account_id {}",
                        sanitize_identifier(account_id)
                    )
                })?;

            let owner = owner
                .and_then(|cell| cell.as_identifier())
                .ok_or_else(|| DumpError::AccountNotFound(sanitize_identifier(account_id)))?;

            tracing::info!(
                "Resolved account_id {} to user_id {}",
                sanitize_identifier(account_id),
                owner
            );
            find_user(source, &owner).await
        }
    }
}

/// Confirm `user_id` has a row in `users` and return the database's own
/// rendering of it.
async fn find_user<S>(source: &S, user_id: &str) -> Result<String>
where
    S: RowSource + ?Sized,
{
    let found = lookup(source, USER_EXISTS_QUERY, user_id)
        .await
        .with_context(|| format!("Failed to look up user_id {}", sanitize_identifier(user_id)))?;

    let canonical = found
        .and_then(|cell| cell.as_identifier())
        .ok_or_else(|| DumpError::UserNotFound(sanitize_identifier(user_id)))?;

    tracing::info!("Found user_id {}", canonical);
    Ok(canonical)
}

/// Single-value lookup where an identifier the key column cannot hold
/// (`abc` against a bigint) simply matches no row.
async fn lookup<S>(source: &S, query: &str, param: &str) -> Result<Option<CellValue>>
where
    S: RowSource + ?Sized,
{
    let result = source.fetch_optional(query, param).await;
    if let Err(e) = &result {
        if let Some(DumpError::InvalidIdentifier { .. }) = e.downcast_ref::<DumpError>() {
            tracing::debug!("{:#}", e);
            return Ok(None);
        }
    }
    result
}
