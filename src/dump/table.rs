// ABOUTME: Fixed table specifications and the per-table dump runner
// ABOUTME: Runs one parameterized query and turns every row into an INSERT statement

use anyhow::{bail, Context, Result};
use std::collections::HashSet;

use super::row::insert_statement;
use crate::postgres::RowSource;
use crate::utils::validate_postgres_identifier;

/// A table name paired with the query that selects one user's rows from it.
///
/// The query takes the resolved user id as its only parameter (`$1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub query: &'static str,
}

/// Tables holding a user's footprint.
pub const USER_TABLES: [TableSpec; 5] = [
    TableSpec {
        name: "accounts",
        query: "SELECT * FROM accounts WHERE user_id = $1",
    },
    TableSpec {
        name: "users",
        query: "SELECT * FROM users WHERE id = $1",
    },
    TableSpec {
        name: "app_auth_tokens",
        query: "SELECT * FROM app_auth_tokens WHERE user_id = $1",
    },
    TableSpec {
        name: "user_identities",
        query: "SELECT * FROM user_identities WHERE user_id = $1",
    },
    TableSpec {
        name: "user_preferences",
        query: "SELECT * FROM user_preferences WHERE user_id = $1",
    },
];

/// Validated, name-ordered set of tables to dump.
///
/// Built once at startup and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCatalog {
    tables: Vec<TableSpec>,
}

impl TableCatalog {
    /// Validate `specs` and sort them by table name.
    ///
    /// # Errors
    ///
    /// Fails when a name is not a plain PostgreSQL identifier, appears twice,
    /// or its query does not select `FROM` that same table.
    pub fn new(specs: impl IntoIterator<Item = TableSpec>) -> Result<Self> {
        let mut tables: Vec<TableSpec> = specs.into_iter().collect();
        let mut seen = HashSet::new();

        for spec in &tables {
            validate_postgres_identifier(spec.name)
                .with_context(|| format!("Invalid table name '{}'", spec.name))?;
            if !seen.insert(spec.name) {
                bail!("Table '{}' is listed more than once", spec.name);
            }
            if !selects_from(spec.query, spec.name) {
                bail!(
                    "Query for table '{}' does not select from it: {}",
                    spec.name,
                    spec.query
                );
            }
        }

        tables.sort_by(|a, b| a.name.cmp(b.name));
        Ok(Self { tables })
    }

    /// Catalog of [`USER_TABLES`].
    pub fn user_tables() -> Result<Self> {
        Self::new(USER_TABLES)
    }

    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Whether `query` contains `FROM <table>` as a whole word (case-insensitive).
fn selects_from(query: &str, table: &str) -> bool {
    let query = query.to_lowercase();
    let needle = format!("from {}", table.to_lowercase());

    query.match_indices(&needle).any(|(start, _)| {
        let preceded_ok = query[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_ascii_alphanumeric() && c != '_');
        let followed_ok = query[start + needle.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_ascii_alphanumeric() && c != '_');
        preceded_ok && followed_ok
    })
}

/// INSERT statements produced for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDump {
    pub table: String,
    pub rows: usize,
    pub text: String,
}

/// Run `spec.query` for `user_id` and serialize every returned row.
///
/// Zero rows is a normal outcome and yields an empty block. Query failures are
/// returned with the table name attached; nothing is emitted for a table
/// whose rows were not all read and serialized.
pub async fn dump_table<S>(source: &S, spec: &TableSpec, user_id: &str) -> Result<TableDump>
where
    S: RowSource + ?Sized,
{
    tracing::debug!("Querying table '{}'", spec.name);

    let result = source
        .fetch_rows(spec.query, user_id)
        .await
        .with_context(|| format!("Failed to dump table '{}'", spec.name))?;

    let mut text = String::new();
    for row in &result.rows {
        let statement = insert_statement(spec.name, &result.columns, row)
            .with_context(|| format!("Failed to serialize a row of table '{}'", spec.name))?;
        text.push_str(&statement);
    }

    tracing::debug!("Table '{}': {} row(s)", spec.name, result.rows.len());

    Ok(TableDump {
        table: spec.name.to_string(),
        rows: result.rows.len(),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::{CellValue, DumpError};
    use crate::postgres::TableRows;
    use async_trait::async_trait;

    struct StaticSource(Result<TableRows, String>);

    #[async_trait]
    impl RowSource for StaticSource {
        async fn fetch_rows(&self, _query: &str, _param: &str) -> Result<TableRows> {
            self.0.clone().map_err(|e| anyhow::anyhow!(e))
        }

        async fn fetch_optional(&self, _query: &str, _param: &str) -> Result<Option<CellValue>> {
            Ok(None)
        }
    }

    const TOKENS: TableSpec = TableSpec {
        name: "app_auth_tokens",
        query: "SELECT * FROM app_auth_tokens WHERE user_id = $1",
    };

    #[test]
    fn test_user_tables_are_sorted() {
        let catalog = TableCatalog::user_tables().unwrap();
        let names: Vec<&str> = catalog.tables().iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "accounts",
                "app_auth_tokens",
                "user_identities",
                "user_preferences",
                "users"
            ]
        );
        assert_eq!(catalog.len(), 5);
    }

    #[test]
    fn test_catalog_rejects_unsafe_names() {
        let bad = TableSpec {
            name: "users\"; DROP TABLE users; --",
            query: "SELECT * FROM users WHERE id = $1",
        };
        assert!(TableCatalog::new([bad]).is_err());
    }

    #[test]
    fn test_catalog_rejects_duplicates() {
        assert!(TableCatalog::new([TOKENS, TOKENS]).is_err());
    }

    #[test]
    fn test_catalog_rejects_diverging_query() {
        let mismatched = TableSpec {
            name: "user_preferences",
            query: "SELECT * FROM user_identities WHERE user_id = $1",
        };
        assert!(TableCatalog::new([mismatched]).is_err());
    }

    #[test]
    fn test_selects_from_matches_whole_words() {
        assert!(selects_from("SELECT * FROM users WHERE id = $1", "users"));
        assert!(selects_from("select * from users", "users"));
        assert!(!selects_from("SELECT * FROM users_archive WHERE id = $1", "users"));
        assert!(!selects_from("SELECT * FROM app_users WHERE id = $1", "users"));
    }

    #[tokio::test]
    async fn test_zero_rows_is_empty_block() {
        let source = StaticSource(Ok(TableRows {
            columns: vec!["id".into(), "token".into()],
            rows: vec![],
        }));

        let dump = dump_table(&source, &TOKENS, "42").await.unwrap();
        assert_eq!(dump.rows, 0);
        assert_eq!(dump.text, "");
    }

    #[tokio::test]
    async fn test_rows_become_statements_in_order() {
        let source = StaticSource(Ok(TableRows {
            columns: vec!["id".into(), "token".into()],
            rows: vec![
                vec![CellValue::Other("1".into()), CellValue::text("abc")],
                vec![CellValue::Other("2".into()), CellValue::Null],
            ],
        }));

        let dump = dump_table(&source, &TOKENS, "42").await.unwrap();
        assert_eq!(dump.rows, 2);
        assert_eq!(
            dump.text,
            "INSERT INTO \"app_auth_tokens\" (id, token) VALUES ('1', 'abc');\n\
             INSERT INTO \"app_auth_tokens\" (id, token) VALUES ('2', NULL);\n"
        );
    }

    #[tokio::test]
    async fn test_query_failure_names_table() {
        let source = StaticSource(Err("relation does not exist".into()));

        let err = dump_table(&source, &TOKENS, "42").await.unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("app_auth_tokens"));
        assert!(msg.contains("relation does not exist"));
    }

    #[tokio::test]
    async fn test_malformed_row_is_an_error_not_partial_text() {
        let source = StaticSource(Ok(TableRows {
            columns: vec!["id".into(), "token".into()],
            rows: vec![
                vec![CellValue::Other("1".into()), CellValue::text("abc")],
                vec![CellValue::Other("2".into())],
            ],
        }));

        let err = dump_table(&source, &TOKENS, "42").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DumpError>(),
            Some(DumpError::RowShapeMismatch { .. })
        ));
    }
}
