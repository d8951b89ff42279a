// ABOUTME: Row source abstraction the dump pipeline reads through
// ABOUTME: Implements prepared, single-parameter queries over tokio-postgres with streamed results

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use futures::TryStreamExt;
use std::error::Error;
use tokio_postgres::types::{to_sql_checked, IsNull, Kind, ToSql, Type};
use tokio_postgres::{Client, Statement};
use uuid::Uuid;

use crate::dump::{CellValue, DumpError};
use crate::utils::sanitize_identifier;

/// Result set of one query: the column list plus every decoded row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// Anything that can answer the dump's single-parameter queries.
///
/// Every query takes exactly one bound parameter: the identifier being dumped
/// or looked up.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Run `query` and return all rows with the column list read once up front.
    async fn fetch_rows(&self, query: &str, param: &str) -> Result<TableRows>;

    /// First column of the first row, or `None` when the query matches nothing.
    async fn fetch_optional(&self, query: &str, param: &str) -> Result<Option<CellValue>>;
}

/// The textual identifier converted to whatever type the server expects for `$1`.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentifierParam {
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Uuid(Uuid),
    Text(String),
}

impl IdentifierParam {
    /// Parse `raw` for a parameter of type `ty`.
    ///
    /// Integer and UUID parameters are parsed and textual ones (text, varchar,
    /// char, name, citext, enums) take the text unchanged. Any other
    /// parameter type has a binary form plain text cannot supply, so it is
    /// refused.
    pub fn for_type(ty: &Type, raw: &str) -> Result<Self> {
        let invalid = |expected: &str| DumpError::InvalidIdentifier {
            value: sanitize_identifier(raw),
            expected: expected.to_string(),
        };

        let param = match *ty {
            Type::INT2 => IdentifierParam::Int2(raw.trim().parse().map_err(|_| invalid("smallint"))?),
            Type::INT4 => IdentifierParam::Int4(raw.trim().parse().map_err(|_| invalid("integer"))?),
            Type::INT8 => IdentifierParam::Int8(raw.trim().parse().map_err(|_| invalid("bigint"))?),
            Type::UUID => IdentifierParam::Uuid(Uuid::parse_str(raw.trim()).map_err(|_| invalid("uuid"))?),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                IdentifierParam::Text(raw.to_string())
            }
            _ => match ty.kind() {
                Kind::Enum(_) => IdentifierParam::Text(raw.to_string()),
                _ if ty.name() == "citext" => IdentifierParam::Text(raw.to_string()),
                _ => return Err(invalid(ty.name()).into()),
            },
        };

        Ok(param)
    }
}

impl ToSql for IdentifierParam {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            IdentifierParam::Int2(v) => v.to_sql(ty, out),
            IdentifierParam::Int4(v) => v.to_sql(ty, out),
            IdentifierParam::Int8(v) => v.to_sql(ty, out),
            IdentifierParam::Uuid(v) => v.to_sql(ty, out),
            IdentifierParam::Text(v) => v.to_sql(ty, out),
        }
    }

    // The variant is always chosen from the statement's own parameter type.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

async fn prepare_bound(client: &Client, query: &str, param: &str) -> Result<(Statement, IdentifierParam)> {
    let statement = client
        .prepare(query)
        .await
        .with_context(|| format!("Failed to prepare query: {}", query))?;

    let param_types = statement.params();
    if param_types.len() != 1 {
        bail!(
            "Query must take exactly one parameter, found {}: {}",
            param_types.len(),
            query
        );
    }

    let bound = IdentifierParam::for_type(&param_types[0], param)?;
    tracing::debug!("Bound identifier as {} for query: {}", param_types[0], query);

    Ok((statement, bound))
}

#[async_trait]
impl RowSource for Client {
    async fn fetch_rows(&self, query: &str, param: &str) -> Result<TableRows> {
        let (statement, bound) = prepare_bound(self, query, param).await?;

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();

        let stream = self
            .query_raw(&statement, [&bound])
            .await
            .with_context(|| format!("Failed to execute query: {}", query))?;
        futures::pin_mut!(stream);

        let mut rows = Vec::new();
        while let Some(row) = stream
            .try_next()
            .await
            .with_context(|| format!("Failed to read rows for query: {}", query))?
        {
            let mut cells = Vec::with_capacity(columns.len());
            for (idx, column) in columns.iter().enumerate() {
                let cell: CellValue = row
                    .try_get(idx)
                    .with_context(|| format!("Failed to decode column '{}'", column))?;
                cells.push(cell);
            }
            rows.push(cells);
        }

        Ok(TableRows { columns, rows })
    }

    async fn fetch_optional(&self, query: &str, param: &str) -> Result<Option<CellValue>> {
        let (statement, bound) = prepare_bound(self, query, param).await?;

        let rows = self
            .query(&statement, &[&bound])
            .await
            .with_context(|| format!("Failed to execute query: {}", query))?;

        match rows.first() {
            Some(row) if !row.is_empty() => {
                let cell: CellValue = row
                    .try_get(0)
                    .with_context(|| format!("Failed to decode result of query: {}", query))?;
                Ok(Some(cell))
            }
            _ => Ok(None),
        }
    }
}
