// ABOUTME: Serializes one result row into an INSERT statement
// ABOUTME: Column names are embedded verbatim, values go through the cell formatter

use anyhow::Result;

use super::error::DumpError;
use super::value::CellValue;

/// Build `INSERT INTO "<table>" (<cols>) VALUES (<literals>);` plus a newline.
///
/// # Errors
///
/// Returns [`DumpError::RowShapeMismatch`] when `columns` and `values` differ
/// in length. The database driver never produces such a row.
///
/// # Examples
///
/// ```
/// # use pg_user_dump::dump::{insert_statement, CellValue};
/// let sql = insert_statement(
///     "users",
///     &["id".to_string(), "name".to_string()],
///     &[CellValue::Other("42".into()), CellValue::Null],
/// )
/// .unwrap();
/// assert_eq!(sql, "INSERT INTO \"users\" (id, name) VALUES ('42', NULL);\n");
/// ```
pub fn insert_statement(table: &str, columns: &[String], values: &[CellValue]) -> Result<String> {
    if columns.len() != values.len() {
        return Err(DumpError::RowShapeMismatch {
            table: table.to_string(),
            columns: columns.len(),
            values: values.len(),
        }
        .into());
    }

    let literals: Vec<String> = values.iter().map(CellValue::to_sql_literal).collect();

    Ok(format!(
        "INSERT INTO \"{}\" ({}) VALUES ({});\n",
        table,
        columns.join(", "),
        literals.join(", ")
    ))
}
