// ABOUTME: Drives a full user dump: resolve the identifier, dump every table, collect output
// ABOUTME: Applies the per-table failure policy and writes the result to stdout and files

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::error::DumpError;
use super::identifier::{resolve_user_id, Identifier};
use super::table::{dump_table, TableCatalog};
use crate::postgres::RowSource;

/// What to do when one table's query fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log a warning, leave the table out, keep going
    #[default]
    SkipTable,
    /// Stop the whole dump at the first failing table
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub name: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTable {
    pub name: String,
    pub reason: String,
}

/// The generated script plus a record of how it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpOutput {
    pub user_id: String,
    pub text: String,
    pub tables: Vec<TableSummary>,
    pub skipped: Vec<SkippedTable>,
}

impl DumpOutput {
    /// Total INSERT statements across all dumped tables.
    pub fn statement_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Resolve `identifier`, then dump every table in `catalog` for that user.
pub async fn run<S>(
    source: &S,
    identifier: &Identifier,
    catalog: &TableCatalog,
    policy: FailurePolicy,
) -> Result<DumpOutput>
where
    S: RowSource + ?Sized,
{
    let user_id = resolve_user_id(source, identifier).await?;
    dump_user(source, catalog, &user_id, policy).await
}

/// Dump every table in `catalog` for an already resolved `user_id`.
///
/// Tables run one after another in catalog order. Each dumped table
/// contributes `-- Insert for <table>`, its statements, and a blank line.
pub async fn dump_user<S>(
    source: &S,
    catalog: &TableCatalog,
    user_id: &str,
    policy: FailurePolicy,
) -> Result<DumpOutput>
where
    S: RowSource + ?Sized,
{
    tracing::info!(
        "Dumping {} table(s) for user_id {}",
        catalog.len(),
        user_id
    );

    let mut output = DumpOutput {
        user_id: user_id.to_string(),
        text: String::new(),
        tables: Vec::with_capacity(catalog.len()),
        skipped: Vec::new(),
    };

    for spec in catalog.tables() {
        let dump = match dump_table(source, spec, user_id).await {
            Ok(dump) => dump,
            Err(e) => {
                let malformed = matches!(
                    e.downcast_ref::<DumpError>(),
                    Some(DumpError::RowShapeMismatch { .. })
                );
                if malformed || policy == FailurePolicy::Abort {
                    return Err(e);
                }

                tracing::warn!("Skipping table {} due to error: {:#}", spec.name, e);
                output.skipped.push(SkippedTable {
                    name: spec.name.to_string(),
                    reason: format!("{:#}", e),
                });
                continue;
            }
        };

        output.text.push_str(&format!("-- Insert for {}\n", dump.table));
        output.text.push_str(&dump.text);
        output.text.push('\n');
        output.tables.push(TableSummary {
            name: dump.table,
            rows: dump.rows,
        });
    }

    tracing::info!(
        "Generated {} INSERT statement(s) across {} table(s), {} skipped",
        output.statement_count(),
        output.tables.len(),
        output.skipped.len()
    );

    Ok(output)
}

/// Write the script to any writer.
pub fn write_to<W: Write>(writer: &mut W, output: &DumpOutput) -> Result<()> {
    writer
        .write_all(output.text.as_bytes())
        .context("Failed to write SQL output")?;
    writer.flush().context("Failed to flush SQL output")
}

/// Write the script to standard output.
pub fn write_stdout(output: &DumpOutput) -> Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write_to(&mut handle, output)
}

/// File name for a user's dump: `user_<id>_dump.sql`.
///
/// Characters other than ASCII letters, digits, `_` and `-` become `_` so the
/// id can never escape the output directory.
///
/// # Examples
///
/// ```
/// # use pg_user_dump::dump::dump_file_name;
/// assert_eq!(dump_file_name("42"), "user_42_dump.sql");
/// assert_eq!(dump_file_name("../etc"), "user____etc_dump.sql");
/// ```
pub fn dump_file_name(user_id: &str) -> String {
    let safe: String = user_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("user_{}_dump.sql", safe)
}

/// Write the script to `dir/user_<id>_dump.sql` and return the path.
pub fn write_file(output: &DumpOutput, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(dump_file_name(&output.user_id));

    std::fs::write(&path, output.text.as_bytes())
        .with_context(|| format!("Failed to write SQL output to {}", path.display()))?;

    tracing::info!("Wrote SQL output to {}", path.display());
    Ok(path)
}
