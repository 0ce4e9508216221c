//! The CRUD facade: generic create/read/update/destroy against one
//! configured table, plus the `execute`/`query` helpers they are built on.

use std::sync::Arc;

use tracing::debug;

use crate::config::Settings;
use crate::error::QuerysetError;
use crate::escape;
use crate::mapper::TableBinding;
use crate::pool::ConnectionSource;
use crate::record::{Record, RecordAdapter};
use crate::results::{DbRow, ResultSet};
use crate::types::{CrudStatus, RowFormat, SqlArgs, SqlValue};

/// Outcome of a DML statement run through [`Queryset::execute`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOutcome {
    pub affected_rows: u64,
    /// Generated key, reported only for inserts that affected exactly one
    /// row.
    pub inserted_id: Option<u64>,
}

/// A row in the caller's requested output format.
#[derive(Debug, Clone)]
pub enum Row {
    /// Column-positional values.
    Tuple(Vec<SqlValue>),
    /// Column-name keyed values.
    Dict(DbRow),
    /// A typed record built by the configured adapter.
    Record(Record),
}

/// Result of a lookup by primary key: the row, or the id that missed.
#[derive(Debug, Clone)]
pub enum ReadOutcome {
    Found(Row),
    NotFound(i64),
}

impl ReadOutcome {
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, ReadOutcome::Found(_))
    }
}

/// Generic queryset over one configured table.
///
/// Holds the shared settings, the connection ownership (pooled or single),
/// an optional table binding, and the auto-commit flag. Every operation
/// checks a connection out, runs escaped SQL, and returns the connection by
/// dropping the lease, also on error paths.
pub struct Queryset {
    settings: Arc<Settings>,
    source: ConnectionSource,
    binding: Option<TableBinding>,
    auto_commit: bool,
    adapter: Option<Arc<dyn RecordAdapter>>,
}

impl std::fmt::Debug for Queryset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queryset")
            .field("binding", &self.binding)
            .field("auto_commit", &self.auto_commit)
            .field("has_adapter", &self.adapter.is_some())
            .finish_non_exhaustive()
    }
}

impl Queryset {
    /// Build a queryset. With `table_tag` the matching descriptor is bound
    /// immediately; without one, all table operations fail until a binding
    /// is set.
    ///
    /// # Errors
    ///
    /// Returns `QuerysetError::Configuration` when `table_tag` names no
    /// configured table.
    pub fn new(
        settings: Arc<Settings>,
        source: ConnectionSource,
        table_tag: Option<&str>,
    ) -> Result<Self, QuerysetError> {
        let binding = match table_tag {
            Some(tag) => Some(TableBinding::from_config(settings.table(tag)?)),
            None => None,
        };
        debug!(table = ?binding.as_ref().map(TableBinding::table_name), "queryset ready");
        Ok(Queryset {
            settings,
            source,
            binding,
            auto_commit: true,
            adapter: None,
        })
    }

    #[must_use]
    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    /// Attach the adapter that builds typed records from dict rows.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn RecordAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn binding(&self) -> Result<&TableBinding, QuerysetError> {
        self.binding.as_ref().ok_or_else(|| {
            QuerysetError::Configuration("table descriptor not set in queryset".to_string())
        })
    }

    /// The bound table name.
    ///
    /// # Errors
    ///
    /// Returns `QuerysetError::Configuration` when no table is bound.
    pub fn table_name(&self) -> Result<&str, QuerysetError> {
        Ok(self.binding()?.table_name())
    }

    fn adapter(&self) -> Result<&dyn RecordAdapter, QuerysetError> {
        self.adapter.as_deref().ok_or_else(|| {
            QuerysetError::Unimplemented(
                "record output requires a RecordAdapter on this queryset".to_string(),
            )
        })
    }

    /// Run a DML statement: escape, execute, commit or roll back.
    ///
    /// With `commit` unset the queryset's auto-commit flag applies. On an
    /// execution error the same statement is rolled back (when committing
    /// was requested) and the error propagates unchanged; the connection is
    /// returned either way.
    ///
    /// # Errors
    ///
    /// `QuerysetError::SqlFormatting` from substitution, otherwise whatever
    /// the driver reported.
    pub async fn execute(
        &self,
        sql: &str,
        args: &SqlArgs,
        is_insert: bool,
        commit: Option<bool>,
    ) -> Result<ExecOutcome, QuerysetError> {
        let commit = commit.unwrap_or(self.auto_commit);
        let sql = escape::substitute(sql, args)?;
        debug!(sql = %sql, "escaped SQL to execute");
        let mut lease = self.source.acquire().await?;
        let conn = lease.conn();
        match conn.execute(&sql).await {
            Ok(result) => {
                let inserted_id = if is_insert && result.affected_rows == 1 {
                    result.last_insert_id
                } else {
                    None
                };
                if commit {
                    conn.commit().await?;
                }
                Ok(ExecOutcome {
                    affected_rows: result.affected_rows,
                    inserted_id,
                })
            }
            Err(err) => {
                if commit {
                    if let Err(rb_err) = conn.rollback().await {
                        debug!(error = %rb_err, "rollback after failed statement also failed");
                    }
                }
                Err(err)
            }
        }
    }

    /// Run a SELECT and collect rows in the requested format.
    ///
    /// # Errors
    ///
    /// Substitution and driver errors, plus `QuerysetError::Unimplemented`
    /// for [`RowFormat::Record`] without an adapter.
    pub async fn query(
        &self,
        sql: &str,
        args: &SqlArgs,
        format: RowFormat,
    ) -> Result<Vec<Row>, QuerysetError> {
        let sql = escape::substitute(sql, args)?;
        debug!(sql = %sql, "escaped SQL to query");
        let result = {
            let mut lease = self.source.acquire().await?;
            lease.conn().query(&sql).await?
        };
        self.rows_from_result(result, format)
    }

    /// Get just the first row a query returns, if any.
    ///
    /// # Errors
    ///
    /// Same as [`Queryset::query`].
    pub async fn fetch(
        &self,
        sql: &str,
        args: &SqlArgs,
        format: RowFormat,
    ) -> Result<Option<Row>, QuerysetError> {
        Ok(self.query(sql, args, format).await?.into_iter().next())
    }

    /// Commit any open transaction on a checked-out connection.
    ///
    /// # Errors
    ///
    /// Driver commit failures.
    pub async fn commit(&self) -> Result<(), QuerysetError> {
        let mut lease = self.source.acquire().await?;
        lease.conn().commit().await
    }

    /// Probe whether a row with this primary key exists.
    ///
    /// # Errors
    ///
    /// Driver errors; requires a bound table.
    pub async fn item_exists(&self, id: i64) -> Result<bool, QuerysetError> {
        let binding = self.binding()?;
        let sql = format!(
            "SELECT count(*) FROM `{}` WHERE id = %s",
            binding.table_name()
        );
        let row = self
            .fetch(&sql, &SqlArgs::Scalar(SqlValue::Int(id)), RowFormat::Tuple)
            .await?;
        match row {
            Some(Row::Tuple(values)) => Ok(values
                .first()
                .and_then(SqlValue::as_int)
                .is_some_and(|count| *count > 0)),
            _ => Ok(false),
        }
    }

    fn rows_from_result(
        &self,
        result: ResultSet,
        format: RowFormat,
    ) -> Result<Vec<Row>, QuerysetError> {
        match format {
            RowFormat::Tuple => Ok(result
                .into_rows()
                .into_iter()
                .map(|row| Row::Tuple(row.into_values()))
                .collect()),
            RowFormat::Dict => Ok(result.into_rows().into_iter().map(Row::Dict).collect()),
            RowFormat::Record => {
                let adapter = self.adapter()?;
                result
                    .into_rows()
                    .into_iter()
                    .map(|row| adapter.record_from_row(&row).map(Row::Record))
                    .collect()
            }
        }
    }

    // ---- create ----

    /// Insert-or-update one record through `INSERT ... ON DUPLICATE KEY
    /// UPDATE`.
    ///
    /// Affected-rows `1` means created, `2` means the duplicate-key arm
    /// updated (the driver's doubled-count convention); anything else falls
    /// back to an existence probe to tell "no changes" from failure. A
    /// generated key is written back onto the record.
    ///
    /// # Errors
    ///
    /// Mapper, substitution, and driver errors.
    pub async fn create_one(&self, record: &mut Record) -> Result<CrudStatus, QuerysetError> {
        self.create_one_with_commit(record, None).await
    }

    /// [`Queryset::create_one`] with an explicit commit override.
    ///
    /// # Errors
    ///
    /// Same as [`Queryset::create_one`].
    pub async fn create_one_with_commit(
        &self,
        record: &mut Record,
        commit: Option<bool>,
    ) -> Result<CrudStatus, QuerysetError> {
        let binding = self.binding()?;
        let (insert_fmt, insert_values) = binding.insert_assignments(record)?;
        let (update_fmt, update_values) = binding.update_assignments(record)?;
        let sql = if update_fmt.is_empty() {
            format!("INSERT INTO `{}` SET {}", binding.table_name(), insert_fmt)
        } else {
            format!(
                "INSERT INTO `{}` SET {} ON DUPLICATE KEY UPDATE {}",
                binding.table_name(),
                insert_fmt,
                update_fmt
            )
        };
        let mut values = insert_values;
        values.extend(update_values);
        let outcome = self
            .execute(&sql, &SqlArgs::Positional(values), true, commit)
            .await?;

        let status = match outcome.affected_rows {
            1 => CrudStatus::Created,
            2 => CrudStatus::Updated,
            _ => {
                // The statement may have been a no-op; only an existence
                // probe can tell that apart from a failure.
                let exists = match record.id() {
                    Some(id) => self.item_exists(id).await?,
                    None => false,
                };
                if exists {
                    CrudStatus::NoChanges
                } else {
                    CrudStatus::Failed
                }
            }
        };
        if let Some(new_id) = outcome.inserted_id {
            debug!(inserted_id = new_id, "writing generated key back");
            record.set_id(i64::try_from(new_id).unwrap_or_default());
        }
        debug!(status = %status, affected = outcome.affected_rows, "create_one");
        Ok(status)
    }

    /// Apply [`Queryset::create_one`] to each record independently: no
    /// batching, no transaction across the set.
    ///
    /// # Errors
    ///
    /// The first failing record's error; earlier records stay applied.
    pub async fn create_many(
        &self,
        records: &mut [Record],
    ) -> Result<Vec<CrudStatus>, QuerysetError> {
        let mut statuses = Vec::with_capacity(records.len());
        for record in records.iter_mut() {
            statuses.push(self.create_one(record).await?);
        }
        Ok(statuses)
    }

    // ---- read ----

    /// Read every row of the bound table as dict rows.
    ///
    /// # Errors
    ///
    /// Driver errors; requires a bound table.
    pub async fn read_all(&self) -> Result<Vec<(CrudStatus, Row)>, QuerysetError> {
        let binding = self.binding()?;
        let sql = format!(
            "SELECT {} FROM `{}`",
            binding.select_column_list(None),
            binding.table_name()
        );
        let rows = self.query(&sql, &SqlArgs::empty(), RowFormat::Dict).await?;
        Ok(rows.into_iter().map(|row| (CrudStatus::Ok, row)).collect())
    }

    /// Read one row by primary key. The id is coerced to an integer first;
    /// a miss is a [`ReadOutcome::NotFound`] carrying the id, not an error.
    ///
    /// # Errors
    ///
    /// `QuerysetError::SqlFormatting` for a non-integer-like id, driver
    /// errors otherwise.
    pub async fn read_one(&self, id: &SqlValue) -> Result<ReadOutcome, QuerysetError> {
        let binding = self.binding()?;
        let id = coerce_id(id)?;
        let sql = format!(
            "SELECT {} FROM `{}` WHERE ID = %s",
            binding.select_column_list(None),
            binding.table_name()
        );
        let row = self
            .fetch(&sql, &SqlArgs::Scalar(SqlValue::Int(id)), RowFormat::Dict)
            .await?;
        Ok(match row {
            Some(row) => ReadOutcome::Found(row),
            None => ReadOutcome::NotFound(id),
        })
    }

    /// Sequential per-id reads.
    ///
    /// # Errors
    ///
    /// The first failing read's error.
    pub async fn read_many(&self, ids: &[SqlValue]) -> Result<Vec<ReadOutcome>, QuerysetError> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            outcomes.push(self.read_one(id).await?);
        }
        Ok(outcomes)
    }

    // ---- update ----

    /// Update one row by primary key over the mutable field subset.
    ///
    /// # Errors
    ///
    /// `QuerysetError::SqlFormatting` when the record carries no id; mapper
    /// and driver errors otherwise.
    pub async fn update_one(&self, record: &Record) -> Result<CrudStatus, QuerysetError> {
        let binding = self.binding()?;
        let id = record.id().ok_or_else(|| {
            QuerysetError::SqlFormatting("update_one requires a record with an id".to_string())
        })?;
        let (update_fmt, mut values) = binding.update_assignments(record)?;
        let sql = format!(
            "UPDATE `{}` SET {} WHERE id = %s",
            binding.table_name(),
            update_fmt
        );
        values.push(SqlValue::Int(id));
        let outcome = self
            .execute(&sql, &SqlArgs::Positional(values), false, None)
            .await?;
        let status = if outcome.affected_rows > 0 {
            CrudStatus::Updated
        } else if self.item_exists(id).await? {
            CrudStatus::NoChanges
        } else {
            CrudStatus::Failed
        };
        debug!(status = %status, id, "update_one");
        Ok(status)
    }

    /// Sequential per-record updates.
    ///
    /// # Errors
    ///
    /// The first failing update's error.
    pub async fn update_many(&self, records: &[Record]) -> Result<Vec<CrudStatus>, QuerysetError> {
        let mut statuses = Vec::with_capacity(records.len());
        for record in records {
            statuses.push(self.update_one(record).await?);
        }
        Ok(statuses)
    }

    // ---- destroy ----

    /// Delete one row by primary key, bounded by `LIMIT 1`.
    ///
    /// Returns `Updated` on a successful delete and `Failed` when nothing
    /// matched, paired with the coerced id.
    ///
    /// # Errors
    ///
    /// `QuerysetError::SqlFormatting` for a non-integer-like id, driver
    /// errors otherwise.
    pub async fn destroy_one(&self, id: &SqlValue) -> Result<(CrudStatus, i64), QuerysetError> {
        let binding = self.binding()?;
        let id = coerce_id(id)?;
        let sql = format!(
            "DELETE FROM `{}` WHERE id = %s LIMIT 1",
            binding.table_name()
        );
        let outcome = self
            .execute(&sql, &SqlArgs::Scalar(SqlValue::Int(id)), false, None)
            .await?;
        let status = if outcome.affected_rows > 0 {
            CrudStatus::Updated
        } else {
            CrudStatus::Failed
        };
        debug!(status = %status, id, "destroy_one");
        Ok((status, id))
    }

    /// Sequential per-id deletes.
    ///
    /// # Errors
    ///
    /// The first failing delete's error.
    pub async fn destroy_many(
        &self,
        ids: &[SqlValue],
    ) -> Result<Vec<(CrudStatus, i64)>, QuerysetError> {
        let mut statuses = Vec::with_capacity(ids.len());
        for id in ids {
            statuses.push(self.destroy_one(id).await?);
        }
        Ok(statuses)
    }

    // ---- typed-record helpers ----

    /// Read one row by primary key and build the typed record for it.
    ///
    /// # Errors
    ///
    /// `QuerysetError::NotFound` for a miss, `Unimplemented` without an
    /// adapter, plus anything [`Queryset::read_one`] raises.
    pub async fn read_one_record(&self, id: &SqlValue) -> Result<Record, QuerysetError> {
        match self.read_one(id).await? {
            ReadOutcome::Found(Row::Dict(row)) => self.adapter()?.record_from_row(&row),
            ReadOutcome::Found(_) => Err(QuerysetError::Execution(
                "read_one returned a non-dict row".to_string(),
            )),
            ReadOutcome::NotFound(id) => Err(QuerysetError::NotFound(id)),
        }
    }

    /// Build typed records from dict rows.
    ///
    /// # Errors
    ///
    /// `Unimplemented` without an adapter; adapter errors otherwise.
    pub fn records_from_rows(&self, rows: &[Row]) -> Result<Vec<Record>, QuerysetError> {
        let adapter = self.adapter()?;
        rows.iter()
            .filter_map(|row| match row {
                Row::Dict(db_row) => Some(adapter.record_from_row(db_row)),
                _ => None,
            })
            .collect()
    }

    /// Build typed records from `(status, row)` read results, keeping only
    /// the `Ok` entries.
    ///
    /// # Errors
    ///
    /// Same as [`Queryset::records_from_rows`].
    pub fn records_from_read(
        &self,
        results: &[(CrudStatus, Row)],
    ) -> Result<Vec<Record>, QuerysetError> {
        let adapter = self.adapter()?;
        results
            .iter()
            .filter(|(status, _)| *status == CrudStatus::Ok)
            .filter_map(|(_, row)| match row {
                Row::Dict(db_row) => Some(adapter.record_from_row(db_row)),
                _ => None,
            })
            .collect()
    }
}

/// The primary key is always an integer; anything else is rejected up
/// front.
fn coerce_id(value: &SqlValue) -> Result<i64, QuerysetError> {
    match value {
        SqlValue::Int(id) => Ok(*id),
        SqlValue::Text(raw) => raw.trim().parse::<i64>().map_err(|_| {
            QuerysetError::SqlFormatting(format!("id is not integer-like: {raw:?}"))
        }),
        other => Err(QuerysetError::SqlFormatting(format!(
            "id is not integer-like: {other:?}"
        ))),
    }
}
