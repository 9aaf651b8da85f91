//! SQLite adaptor.
//!
//! Works on a single connection with `foreign_keys` off, so that tables can be
//! recreated in any order, and `legacy_alter_table` on, so that renaming the
//! rebuilt table does not try to rewrite views of other grains.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use oxide_score::column::{quote, Column};
use oxide_score::foreign_key::ForeignKey;
use oxide_score::grain::SYSTEM_GRAIN;
use oxide_score::index::Index;
use oxide_score::sequence::Sequence;
use oxide_score::table::Table;
use oxide_score::view::{MaterializedView, ParameterizedView, View};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::ConnectOptions;
use tracing::debug;

use super::sqlite_ddl::{
    add_column_sql, alter_sequence_sql, create_index_sql, create_view_sql, default_lexeme,
    drop_column_sql, function_body, insert_sequence_sql, mv_fill_sql, parse_foreign_keys,
    parse_primary_key, parse_type, physical_name, quote_identifier, quoted_name,
    split_physical_name, versioning_trigger_name, versioning_trigger_sql, LiveColumn, LiveFk,
    LiveTable, MvTrigger, REBUILD_SUFFIX,
};
use super::DbAdaptor;
use crate::catalog::{
    GrainRecord, GrainState, TableCatalogEntry, TableType, FUNCTIONS_TABLE, GRAINS_TABLE,
    SEQUENCES_TABLE, TABLES_TABLE,
};
use crate::error::{DbSyncError, Result};
use crate::meta::{DbColumnInfo, DbFkInfo, DbIndexInfo, DbPkInfo, DbSequenceInfo, DialectQuirks};

type GrainRow = (String, String, i64, String, i64, String, String);

/// Adaptor for SQLite databases.
pub struct SqliteAdaptor {
    conn: SqliteConnection,
    ddl_log: Vec<String>,
}

impl SqliteAdaptor {
    /// Opens `url`, creating the database file if needed.
    pub async fn connect(url: &str) -> Result<Self> {
        let conn = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(false)
            .connect()
            .await?;
        Self::new(conn).await
    }

    /// Wraps an open connection.
    pub async fn new(mut conn: SqliteConnection) -> Result<Self> {
        sqlx::query("PRAGMA legacy_alter_table = ON")
            .execute(&mut conn)
            .await?;
        Ok(Self {
            conn,
            ddl_log: Vec::new(),
        })
    }

    /// Returns the underlying connection.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    async fn exec_ddl(&mut self, sql: &str) -> Result<()> {
        debug!(sql = %sql, "Executing SQL");
        sqlx::query(sql).execute(&mut self.conn).await?;
        self.ddl_log.push(sql.to_string());
        Ok(())
    }

    async fn object_exists(&mut self, kind: &str, name: &str) -> Result<bool> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2")
                .bind(kind)
                .bind(name)
                .fetch_one(&mut self.conn)
                .await?;
        Ok(count.0 > 0)
    }

    async fn object_sql(&mut self, kind: &str, name: &str) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT sql FROM sqlite_master WHERE type = ?1 AND name = ?2")
                .bind(kind)
                .bind(name)
                .fetch_optional(&mut self.conn)
                .await?;
        Ok(row.and_then(|(sql,)| sql))
    }

    /// Lists elements of `kind` owned by `grain`, by element name.
    async fn grain_objects(&mut self, kind: &str, grain: &str) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT name, tbl_name FROM sqlite_master \
             WHERE type = ?1 AND sql IS NOT NULL AND name LIKE ?2 ESCAPE '\\' ORDER BY name",
        )
        .bind(kind)
        .bind(format!("{grain}\\_%"))
        .fetch_all(&mut self.conn)
        .await?;

        let prefix = format!("{grain}_");
        Ok(rows
            .into_iter()
            .filter(|(name, _)| !name.ends_with(REBUILD_SUFFIX))
            .filter_map(|(name, table)| {
                let element = name.strip_prefix(&prefix)?.to_string();
                let table = table.strip_prefix(&prefix).unwrap_or(&table).to_string();
                Some((element, table))
            })
            .collect())
    }

    async fn raw_columns(&mut self, physical: &str) -> Result<Vec<LiveColumn>> {
        let rows: Vec<(String, String, i64, Option<String>)> = sqlx::query_as(
            "SELECT name, type, \"notnull\", dflt_value FROM pragma_table_info(?1) ORDER BY cid",
        )
        .bind(physical)
        .fetch_all(&mut self.conn)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, decl_type, not_null, default)| LiveColumn {
                name,
                decl_type,
                not_null: not_null != 0,
                default,
            })
            .collect())
    }

    async fn live_table(&mut self, grain: &str, table: &str) -> Result<LiveTable> {
        let physical = physical_name(grain, table);
        let sql = self
            .object_sql("table", &physical)
            .await?
            .ok_or_else(|| DbSyncError::Unsupported(format!("Table '{physical}' does not exist")))?;
        Ok(LiveTable {
            columns: self.raw_columns(&physical).await?,
            primary_key: parse_primary_key(&sql),
            foreign_keys: parse_foreign_keys(&sql),
        })
    }

    /// Recreates `grain.table` with `structure`, keeping its data, indices and
    /// triggers.
    async fn rebuild_table(&mut self, grain: &str, table: &str, structure: &LiveTable) -> Result<()> {
        let physical = physical_name(grain, table);
        let temporary = format!("{physical}{REBUILD_SUFFIX}");
        debug!(table = %physical, "Rebuilding table");

        let saved: Vec<(String,)> = sqlx::query_as(
            "SELECT sql FROM sqlite_master \
             WHERE tbl_name = ?1 AND type IN ('index', 'trigger') AND sql IS NOT NULL",
        )
        .bind(&physical)
        .fetch_all(&mut self.conn)
        .await?;

        let existing: Vec<String> = self
            .raw_columns(&physical)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        let copied = structure
            .columns
            .iter()
            .filter(|c| existing.contains(&c.name))
            .map(|c| quote_identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        self.exec_ddl(&structure.create_sql(&temporary)).await?;
        if !copied.is_empty() {
            self.exec_ddl(&format!(
                "INSERT INTO {} ({copied}) SELECT {copied} FROM {}",
                quote_identifier(&temporary),
                quote_identifier(&physical)
            ))
            .await?;
        }
        self.exec_ddl(&format!("DROP TABLE {}", quote_identifier(&physical)))
            .await?;
        self.exec_ddl(&format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_identifier(&temporary),
            quote_identifier(&physical)
        ))
        .await?;
        for (sql,) in saved {
            self.exec_ddl(&sql).await?;
        }
        Ok(())
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc).naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn grain_record(row: GrainRow) -> Result<GrainRecord> {
    let (id, version, length, checksum, state, lastmodified, message) = row;
    let corrupted = |message: String| DbSyncError::CorruptedRecord {
        grain: id.clone(),
        message,
    };
    let state =
        GrainState::from_code(state).ok_or_else(|| corrupted(format!("unknown state {state}")))?;
    let lastmodified = parse_timestamp(&lastmodified)
        .ok_or_else(|| corrupted(format!("invalid timestamp '{lastmodified}'")))?;
    Ok(GrainRecord {
        id,
        version,
        length,
        checksum,
        state,
        lastmodified,
        message,
    })
}

impl DbAdaptor for SqliteAdaptor {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quirks(&self) -> DialectQuirks {
        DialectQuirks {
            empty_string_default_forces_nullable: false,
            sequence_defaults_in_ddl: false,
        }
    }

    async fn table_exists(&mut self, grain: &str, table: &str) -> Result<bool> {
        self.object_exists("table", &physical_name(grain, table))
            .await
    }

    async fn user_tables_exist(&mut self) -> Result<bool> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'",
        )
        .fetch_one(&mut self.conn)
        .await?;
        Ok(count.0 > 0)
    }

    async fn create_schema_if_not_exists(&mut self, _grain: &str) -> Result<()> {
        Ok(())
    }

    async fn grain_record(&mut self, grain: &str) -> Result<Option<GrainRecord>> {
        let sql = format!(
            "SELECT \"id\", \"version\", \"length\", \"checksum\", \"state\", \
             CAST(\"lastmodified\" AS TEXT), \"message\" FROM {} WHERE \"id\" = ?1",
            quoted_name(SYSTEM_GRAIN, GRAINS_TABLE)
        );
        let row: Option<GrainRow> = sqlx::query_as(&sql)
            .bind(grain)
            .fetch_optional(&mut self.conn)
            .await?;
        row.map(grain_record).transpose()
    }

    async fn grain_records(&mut self) -> Result<Vec<GrainRecord>> {
        let sql = format!(
            "SELECT \"id\", \"version\", \"length\", \"checksum\", \"state\", \
             CAST(\"lastmodified\" AS TEXT), \"message\" FROM {} ORDER BY \"id\"",
            quoted_name(SYSTEM_GRAIN, GRAINS_TABLE)
        );
        let rows: Vec<GrainRow> = sqlx::query_as(&sql).fetch_all(&mut self.conn).await?;
        rows.into_iter().map(grain_record).collect()
    }

    async fn insert_grain_record(&mut self, record: &GrainRecord) -> Result<()> {
        debug!(grain = %record.id, state = %record.state, "Inserting grain record");
        let sql = format!(
            "INSERT INTO {} (\"id\", \"version\", \"length\", \"checksum\", \"state\", \"lastmodified\", \"message\") \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            quoted_name(SYSTEM_GRAIN, GRAINS_TABLE)
        );
        sqlx::query(&sql)
            .bind(&record.id)
            .bind(&record.version)
            .bind(record.length)
            .bind(&record.checksum)
            .bind(record.state.code())
            .bind(format_timestamp(&record.lastmodified))
            .bind(&record.message)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn update_grain_record(&mut self, record: &GrainRecord) -> Result<()> {
        debug!(grain = %record.id, state = %record.state, "Updating grain record");
        let sql = format!(
            "UPDATE {} SET \"version\" = ?2, \"length\" = ?3, \"checksum\" = ?4, \"state\" = ?5, \
             \"lastmodified\" = ?6, \"message\" = ?7 WHERE \"id\" = ?1",
            quoted_name(SYSTEM_GRAIN, GRAINS_TABLE)
        );
        sqlx::query(&sql)
            .bind(&record.id)
            .bind(&record.version)
            .bind(record.length)
            .bind(&record.checksum)
            .bind(record.state.code())
            .bind(format_timestamp(&record.lastmodified))
            .bind(&record.message)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn table_catalog(&mut self, grain: &str) -> Result<Vec<TableCatalogEntry>> {
        let sql = format!(
            "SELECT \"tablename\", \"tabletype\", \"orphaned\" FROM {} WHERE \"grainid\" = ?1 ORDER BY \"tablename\"",
            quoted_name(SYSTEM_GRAIN, TABLES_TABLE)
        );
        let rows: Vec<(String, String, i64)> = sqlx::query_as(&sql)
            .bind(grain)
            .fetch_all(&mut self.conn)
            .await?;
        rows.into_iter()
            .map(|(name, code, orphaned)| {
                let table_type =
                    TableType::from_code(&code).ok_or_else(|| DbSyncError::CorruptedRecord {
                        grain: grain.to_string(),
                        message: format!("unknown table type '{code}' for '{name}'"),
                    })?;
                Ok(TableCatalogEntry {
                    grain: grain.to_string(),
                    name,
                    table_type,
                    orphaned: orphaned != 0,
                })
            })
            .collect()
    }

    async fn upsert_table_catalog(&mut self, entry: &TableCatalogEntry) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (\"grainid\", \"tablename\", \"tabletype\", \"orphaned\") VALUES (?1, ?2, ?3, ?4)",
            quoted_name(SYSTEM_GRAIN, TABLES_TABLE)
        );
        sqlx::query(&sql)
            .bind(&entry.grain)
            .bind(&entry.name)
            .bind(entry.table_type.code())
            .bind(i64::from(entry.orphaned))
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn columns(&mut self, grain: &str, table: &str) -> Result<IndexMap<String, DbColumnInfo>> {
        let physical = physical_name(grain, table);
        let mut columns = IndexMap::new();
        for column in self.raw_columns(&physical).await? {
            let ty = parse_type(&column.decl_type).ok_or_else(|| {
                DbSyncError::Unsupported(format!(
                    "Column '{}' of table '{physical}' has unsupported type '{}'",
                    column.name, column.decl_type
                ))
            })?;
            let info = DbColumnInfo {
                name: column.name.clone(),
                ty,
                nullable: !column.not_null,
                default_value: column
                    .default
                    .map(|d| default_lexeme(&ty, &d))
                    .unwrap_or_default(),
            };
            columns.insert(column.name, info);
        }
        Ok(columns)
    }

    async fn primary_key(&mut self, grain: &str, table: &str) -> Result<DbPkInfo> {
        Ok(self
            .object_sql("table", &physical_name(grain, table))
            .await?
            .and_then(|sql| parse_primary_key(&sql))
            .unwrap_or_default())
    }

    async fn indices(&mut self, grain: &str) -> Result<Vec<DbIndexInfo>> {
        let mut indices = Vec::new();
        for (name, table) in self.grain_objects("index", grain).await? {
            let columns: Vec<(String,)> =
                sqlx::query_as("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")
                    .bind(physical_name(grain, &name))
                    .fetch_all(&mut self.conn)
                    .await?;
            indices.push(DbIndexInfo {
                table,
                name,
                columns: columns.into_iter().map(|(c,)| c).collect(),
            });
        }
        Ok(indices)
    }

    async fn foreign_keys(&mut self, grain: &str) -> Result<Vec<DbFkInfo>> {
        let mut keys = Vec::new();
        for (table, _) in self.grain_objects("table", grain).await? {
            let Some(sql) = self.object_sql("table", &physical_name(grain, &table)).await? else {
                continue;
            };
            keys.extend(
                parse_foreign_keys(&sql)
                    .iter()
                    .filter_map(|fk| fk.info(grain, &table)),
            );
        }
        Ok(keys)
    }

    async fn foreign_keys_referencing(&mut self, grain: &str, table: &str) -> Result<Vec<DbFkInfo>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT name, sql FROM sqlite_master WHERE type = 'table' AND sql IS NOT NULL ORDER BY name",
        )
        .fetch_all(&mut self.conn)
        .await?;
        let target = physical_name(grain, table);
        Ok(rows
            .iter()
            .filter_map(|(name, sql)| {
                let (owner_grain, owner_table) = split_physical_name(name)?;
                Some(
                    parse_foreign_keys(sql)
                        .into_iter()
                        .filter(|fk| fk.ref_table == target)
                        .filter_map(|fk| fk.info(owner_grain, owner_table))
                        .collect::<Vec<_>>(),
                )
            })
            .flatten()
            .collect())
    }

    async fn views(&mut self, grain: &str) -> Result<Vec<String>> {
        Ok(self
            .grain_objects("view", grain)
            .await?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    async fn parameterized_views(&mut self, grain: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT \"funcname\" FROM {} WHERE \"grainid\" = ?1 ORDER BY \"funcname\"",
            quoted_name(SYSTEM_GRAIN, FUNCTIONS_TABLE)
        );
        let rows: Vec<(String,)> = sqlx::query_as(&sql)
            .bind(grain)
            .fetch_all(&mut self.conn)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn sequences(&mut self, grain: &str) -> Result<Vec<DbSequenceInfo>> {
        let sql = format!(
            "SELECT \"seqname\", \"increment\", \"minvalue\", \"maxvalue\", \"cycle\" FROM {} \
             WHERE \"grainid\" = ?1 ORDER BY \"seqname\"",
            quoted_name(SYSTEM_GRAIN, SEQUENCES_TABLE)
        );
        let rows: Vec<(String, i64, i64, i64, i64)> = sqlx::query_as(&sql)
            .bind(grain)
            .fetch_all(&mut self.conn)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(name, increment_by, min_value, max_value, cycle)| DbSequenceInfo {
                name,
                increment_by,
                min_value,
                max_value,
                cycle: cycle != 0,
            })
            .collect())
    }

    async fn mv_trigger_body(&mut self, view: &MaterializedView) -> Result<Option<String>> {
        self.object_sql("trigger", &MvTrigger::Insert.name(view))
            .await
    }

    async fn create_table(&mut self, table: &Table) -> Result<()> {
        let physical = physical_name(table.grain(), table.name());
        self.exec_ddl(&LiveTable::declared(table).create_sql(&physical))
            .await
    }

    async fn drop_table(&mut self, grain: &str, table: &str) -> Result<()> {
        self.exec_ddl(&format!("DROP TABLE IF EXISTS {}", quoted_name(grain, table)))
            .await
    }

    async fn add_column(&mut self, table: &Table, column: &Column) -> Result<()> {
        let live = LiveColumn::declared(column);
        if live.can_be_added() {
            return self
                .exec_ddl(&add_column_sql(table.grain(), table.name(), &live))
                .await;
        }
        let mut structure = self.live_table(table.grain(), table.name()).await?;
        structure.columns.push(live);
        self.rebuild_table(table.grain(), table.name(), &structure)
            .await
    }

    async fn update_column(&mut self, table: &Table, column: &Column) -> Result<()> {
        let mut structure = self.live_table(table.grain(), table.name()).await?;
        let live = structure.column_mut(&column.name).ok_or_else(|| {
            DbSyncError::Unsupported(format!(
                "Column '{}' of table '{}' does not exist",
                column.name,
                table.name()
            ))
        })?;
        *live = LiveColumn::declared(column);
        self.rebuild_table(table.grain(), table.name(), &structure)
            .await
    }

    async fn drop_column(&mut self, table: &Table, column: &str) -> Result<()> {
        self.exec_ddl(&drop_column_sql(table.grain(), table.name(), column))
            .await
    }

    async fn create_primary_key(&mut self, table: &Table) -> Result<()> {
        if table.primary_key().is_empty() {
            return Ok(());
        }
        let mut structure = self.live_table(table.grain(), table.name()).await?;
        structure.primary_key = Some(DbPkInfo {
            name: table.pk_name().to_string(),
            columns: table.primary_key().to_vec(),
        });
        self.rebuild_table(table.grain(), table.name(), &structure)
            .await
    }

    async fn drop_primary_key(&mut self, table: &Table, name: &str) -> Result<()> {
        debug!(table = %table.name(), pk = %name, "Dropping primary key");
        let mut structure = self.live_table(table.grain(), table.name()).await?;
        structure.primary_key = None;
        self.rebuild_table(table.grain(), table.name(), &structure)
            .await
    }

    async fn update_versioning_trigger(&mut self, table: &Table) -> Result<()> {
        let name = versioning_trigger_name(table.grain(), table.name());
        let exists = self.object_exists("trigger", &name).await?;
        match table.rec_version_column() {
            Some(column) if !exists => {
                self.exec_ddl(&versioning_trigger_sql(table, &column.name))
                    .await
            }
            None if exists => {
                self.exec_ddl(&format!("DROP TRIGGER {}", quote_identifier(&name)))
                    .await
            }
            _ => Ok(()),
        }
    }

    async fn create_index(&mut self, index: &Index) -> Result<()> {
        self.exec_ddl(&create_index_sql(index)).await
    }

    async fn drop_index(&mut self, grain: &str, index: &DbIndexInfo) -> Result<()> {
        self.exec_ddl(&format!("DROP INDEX {}", quoted_name(grain, &index.name)))
            .await
    }

    async fn create_foreign_key(&mut self, fk: &ForeignKey) -> Result<()> {
        let mut structure = self.live_table(fk.grain(), fk.table()).await?;
        structure.foreign_keys.push(LiveFk::declared(fk));
        self.rebuild_table(fk.grain(), fk.table(), &structure).await
    }

    async fn drop_foreign_key(&mut self, fk: &DbFkInfo) -> Result<()> {
        debug!(table = %fk.table, fk = %fk.name, "Dropping foreign key");
        let mut structure = self.live_table(&fk.grain, &fk.table).await?;
        structure.foreign_keys.retain(|live| live.name != fk.name);
        self.rebuild_table(&fk.grain, &fk.table, &structure).await
    }

    async fn create_sequence(&mut self, sequence: &Sequence) -> Result<()> {
        let catalog = quoted_name(SYSTEM_GRAIN, SEQUENCES_TABLE);
        self.exec_ddl(&insert_sequence_sql(&catalog, sequence))
            .await
    }

    async fn alter_sequence(&mut self, sequence: &Sequence) -> Result<()> {
        let catalog = quoted_name(SYSTEM_GRAIN, SEQUENCES_TABLE);
        self.exec_ddl(&alter_sequence_sql(&catalog, sequence))
            .await
    }

    async fn create_view(&mut self, view: &View) -> Result<()> {
        self.exec_ddl(&create_view_sql(view)).await
    }

    async fn drop_view(&mut self, grain: &str, view: &str) -> Result<()> {
        self.exec_ddl(&format!("DROP VIEW IF EXISTS {}", quoted_name(grain, view)))
            .await
    }

    async fn create_parameterized_view(&mut self, view: &ParameterizedView) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (\"grainid\", \"funcname\", \"sql\") VALUES ({}, {}, {})",
            quoted_name(SYSTEM_GRAIN, FUNCTIONS_TABLE),
            quote(view.grain()),
            quote(view.name()),
            quote(&function_body(view))
        );
        self.exec_ddl(&sql).await
    }

    async fn drop_parameterized_view(&mut self, grain: &str, view: &str) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE \"grainid\" = {} AND \"funcname\" = {}",
            quoted_name(SYSTEM_GRAIN, FUNCTIONS_TABLE),
            quote(grain),
            quote(view)
        );
        self.exec_ddl(&sql).await
    }

    async fn init_mv_data(&mut self, view: &MaterializedView) -> Result<()> {
        self.exec_ddl(&mv_fill_sql(view, None)).await
    }

    async fn create_mv_triggers(&mut self, view: &MaterializedView) -> Result<()> {
        for trigger in MvTrigger::ALL {
            self.exec_ddl(&trigger.create_sql(view)).await?;
        }
        Ok(())
    }

    async fn drop_mv_triggers(&mut self, view: &MaterializedView) -> Result<()> {
        for trigger in MvTrigger::ALL {
            let name = trigger.name(view);
            if self.object_exists("trigger", &name).await? {
                self.exec_ddl(&format!("DROP TRIGGER {}", quote_identifier(&name)))
                    .await?;
            }
        }
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        sqlx::query("BEGIN").execute(&mut self.conn).await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        sqlx::query("COMMIT").execute(&mut self.conn).await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        sqlx::query("ROLLBACK").execute(&mut self.conn).await?;
        Ok(())
    }

    fn executed_ddl(&self) -> &[String] {
        &self.ddl_log
    }

    fn take_executed_ddl(&mut self) -> Vec<String> {
        std::mem::take(&mut self.ddl_log)
    }
}
