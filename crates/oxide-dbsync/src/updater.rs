//! Database updater.
//!
//! Walks the grains of a score in dependency order and brings the live
//! database in line with each one. Progress is recorded per grain in
//! `celesta_grains`, so an interrupted or failed run leaves a state that the
//! next run (or an operator) can act on.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use oxide_score::column::REC_VERSION;
use oxide_score::grain::Grain;
use oxide_score::score::Score;
use oxide_score::table::Table;
use oxide_score::version::{VersionOrdering, VersionString};
use oxide_score::view::MaterializedView;
use tracing::{debug, info, warn};

use crate::adaptor::DbAdaptor;
use crate::catalog::{declared_objects, GrainRecord, GrainState, TableCatalogEntry, GRAINS_TABLE};
use crate::error::{DbSyncError, Result};
use crate::meta::{DbColumnInfo, DbFkInfo};

/// Options of a database update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdaterConfig {
    force_init: bool,
}

impl UpdaterConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows creating the system tables in a database that already has tables.
    #[must_use]
    pub const fn force_init(mut self, enabled: bool) -> Self {
        self.force_init = enabled;
        self
    }

    /// Returns whether non-empty databases may be initialized.
    #[must_use]
    pub const fn is_force_init(&self) -> bool {
        self.force_init
    }
}

enum Decision {
    Skip(&'static str),
    Upgrade(GrainRecord),
}

/// Brings a database in line with a score.
pub struct DbUpdater<A: DbAdaptor> {
    adaptor: A,
    config: UpdaterConfig,
    /// Keys of other grains dropped while rebuilding a referenced primary key.
    displaced: Vec<DbFkInfo>,
}

impl<A: DbAdaptor> DbUpdater<A> {
    /// Creates an updater with the default configuration.
    pub fn new(adaptor: A) -> Self {
        Self {
            adaptor,
            config: UpdaterConfig::default(),
            displaced: Vec::new(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn config(mut self, config: UpdaterConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the adaptor.
    #[must_use]
    pub const fn adaptor(&self) -> &A {
        &self.adaptor
    }

    /// Returns the adaptor mutably.
    pub fn adaptor_mut(&mut self) -> &mut A {
        &mut self.adaptor
    }

    /// Consumes the updater, returning the adaptor.
    pub fn into_adaptor(self) -> A {
        self.adaptor
    }

    /// Updates every grain of `score`.
    ///
    /// Version conflicts and precondition failures stop the run. Failures
    /// while changing a grain are recorded in its `ERROR` state and the run
    /// continues; the result then lists the failed grains.
    pub async fn update_db(&mut self, score: &Score) -> Result<()> {
        self.bootstrap(score).await?;
        self.check_states(score).await?;

        let mut failed = Vec::new();
        for grain in score.grains() {
            match self.decide(grain).await? {
                Decision::Skip(reason) => {
                    debug!(grain = %grain.name(), reason, "Skipping grain");
                }
                Decision::Upgrade(record) => {
                    if !self.upgrade_grain(score, grain, record).await? {
                        failed.push(grain.name().to_string());
                    }
                }
            }
        }

        if failed.is_empty() {
            info!("Database is up to date");
            Ok(())
        } else {
            Err(DbSyncError::NotAllGrainsUpdated(failed))
        }
    }

    /// Creates the system tables when the catalog does not exist yet.
    async fn bootstrap(&mut self, score: &Score) -> Result<()> {
        let Some(system) = score.system_grain() else {
            return Err(DbSyncError::Unsupported(
                "Score does not contain the system grain".to_string(),
            ));
        };
        if self.adaptor.table_exists(system.name(), GRAINS_TABLE).await? {
            return Ok(());
        }
        if self.adaptor.user_tables_exist().await? && !self.config.force_init {
            return Err(DbSyncError::NonEmptyDatabase);
        }

        info!(adaptor = self.adaptor.name(), "Creating system tables");
        self.adaptor.begin().await?;
        match self.create_system_tables(system).await {
            Ok(()) => self.adaptor.commit().await,
            Err(e) => {
                self.rollback_quietly().await;
                Err(e)
            }
        }
    }

    async fn create_system_tables(&mut self, system: &Grain) -> Result<()> {
        self.adaptor.create_schema_if_not_exists(system.name()).await?;
        for table in system.tables().values() {
            self.adaptor.create_table(table).await?;
        }
        self.adaptor
            .insert_grain_record(&GrainRecord::for_grain(system, GrainState::Ready))
            .await?;
        for entry in declared_objects(system) {
            self.adaptor.upsert_table_catalog(&entry).await?;
        }
        Ok(())
    }

    /// Refuses to start while any grain is mid-upgrade or failed.
    async fn check_states(&mut self, score: &Score) -> Result<()> {
        for grain in score.grains() {
            if let Some(record) = self.adaptor.grain_record(grain.name()).await? {
                if matches!(record.state, GrainState::Upgrading | GrainState::Error) {
                    return Err(DbSyncError::InvalidGrainState {
                        grain: record.id,
                        state: record.state,
                    });
                }
            }
        }
        Ok(())
    }

    async fn decide(&mut self, grain: &Grain) -> Result<Decision> {
        let Some(record) = self.adaptor.grain_record(grain.name()).await? else {
            let record = GrainRecord::for_grain(grain, GrainState::Recover);
            self.adaptor.insert_grain_record(&record).await?;
            return Ok(Decision::Upgrade(record));
        };

        match record.state {
            GrainState::Lock => {
                warn!(grain = %grain.name(), "Grain is locked, skipping");
                Ok(Decision::Skip("locked"))
            }
            GrainState::Recover => Ok(Decision::Upgrade(record)),
            GrainState::Upgrading | GrainState::Error => Err(DbSyncError::InvalidGrainState {
                grain: record.id,
                state: record.state,
            }),
            GrainState::Ready => {
                let persisted = VersionString::parse(&record.version).map_err(|e| {
                    DbSyncError::CorruptedRecord {
                        grain: record.id.clone(),
                        message: e.to_string(),
                    }
                })?;
                match grain.version().compare(&persisted) {
                    ordering @ (VersionOrdering::Lower | VersionOrdering::Inconsistent) => {
                        Err(DbSyncError::VersionConflict {
                            grain: record.id,
                            declared: grain.version().to_string(),
                            persisted: record.version,
                            ordering,
                        })
                    }
                    VersionOrdering::Greater => Ok(Decision::Upgrade(record)),
                    VersionOrdering::Equals if record.matches(grain.fingerprint()) => {
                        Ok(Decision::Skip("up to date"))
                    }
                    VersionOrdering::Equals => Ok(Decision::Upgrade(record)),
                }
            }
        }
    }

    /// Upgrades one grain. Returns false when the grain ended in `ERROR`.
    async fn upgrade_grain(
        &mut self,
        score: &Score,
        grain: &Grain,
        record: GrainRecord,
    ) -> Result<bool> {
        info!(
            grain = %grain.name(),
            from = %record.version,
            to = %grain.version(),
            "Upgrading grain"
        );
        let record = record.with_state(GrainState::Upgrading);
        self.adaptor.update_grain_record(&record).await?;

        self.adaptor.begin().await?;
        self.displaced.clear();
        let outcome = match self.apply_grain(score, grain).await {
            Ok(()) => {
                let ready = GrainRecord::for_grain(grain, GrainState::Ready);
                match self.adaptor.update_grain_record(&ready).await {
                    Ok(()) => self.adaptor.commit().await,
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                info!(grain = %grain.name(), version = %grain.version(), "Grain upgraded");
                Ok(true)
            }
            Err(cause) => {
                warn!(grain = %grain.name(), error = %cause, "Grain upgrade failed");
                self.rollback_quietly().await;

                let mut failed = record.with_state(GrainState::Error);
                failed.message = GrainRecord::failure_message(grain, &cause.to_string());
                self.adaptor.begin().await?;
                self.adaptor.update_grain_record(&failed).await?;
                self.adaptor.commit().await?;
                Ok(false)
            }
        }
    }

    async fn rollback_quietly(&mut self) {
        if let Err(e) = self.adaptor.rollback().await {
            warn!(error = %e, "Rollback failed");
        }
    }

    /// Applies the structure of `grain`. Step order matters: everything that
    /// depends on a table is removed before the table changes and restored
    /// afterwards.
    async fn apply_grain(&mut self, score: &Score, grain: &Grain) -> Result<()> {
        self.adaptor
            .create_schema_if_not_exists(grain.name())
            .await?;
        self.drop_views(grain).await?;
        let altered = self.altered_columns(grain).await?;
        self.drop_stale_indices(grain, &altered).await?;
        self.drop_stale_foreign_keys(grain).await?;
        self.update_sequences(grain).await?;
        let modified = self.update_tables(grain, &altered).await?;
        self.create_indices(grain).await?;
        self.create_foreign_keys(grain).await?;
        self.restore_displaced_foreign_keys(score).await?;
        self.create_views(grain).await?;
        self.update_materialized_views(grain, &modified).await?;
        self.update_table_catalog(grain).await
    }

    // ========================================================================
    // Steps
    // ========================================================================

    async fn drop_views(&mut self, grain: &Grain) -> Result<()> {
        for view in self.adaptor.views(grain.name()).await? {
            self.adaptor.drop_view(grain.name(), &view).await?;
        }
        for view in self.adaptor.parameterized_views(grain.name()).await? {
            self.adaptor
                .drop_parameterized_view(grain.name(), &view)
                .await?;
        }
        Ok(())
    }

    /// Lists, per existing table, the declared columns whose live definition differs.
    async fn altered_columns(&mut self, grain: &Grain) -> Result<BTreeMap<String, Vec<String>>> {
        let quirks = self.adaptor.quirks();
        let mut altered = BTreeMap::new();
        for table in grain.tables().values().filter(|t| t.auto_update()) {
            if !self.adaptor.table_exists(grain.name(), table.name()).await? {
                continue;
            }
            let live = self.adaptor.columns(grain.name(), table.name()).await?;
            let changed: Vec<String> = table
                .columns()
                .filter(|c| live.get(&c.name).is_some_and(|l| !l.reflects(c, &quirks)))
                .map(|c| c.name.clone())
                .collect();
            if !changed.is_empty() {
                debug!(table = %table.name(), columns = ?changed, "Columns differ from declaration");
                altered.insert(table.name().to_string(), changed);
            }
        }
        Ok(altered)
    }

    async fn drop_stale_indices(
        &mut self,
        grain: &Grain,
        altered: &BTreeMap<String, Vec<String>>,
    ) -> Result<()> {
        for live in self.adaptor.indices(grain.name()).await? {
            let stale = !grain
                .indices()
                .get(&live.name)
                .is_some_and(|index| live.reflects(index));
            let touches_altered = altered
                .get(&live.table)
                .is_some_and(|columns| live.columns.iter().any(|c| columns.contains(c)));
            if stale || touches_altered {
                debug!(index = %live.name, "Dropping index");
                self.adaptor.drop_index(grain.name(), &live).await?;
            }
        }
        Ok(())
    }

    async fn drop_stale_foreign_keys(&mut self, grain: &Grain) -> Result<()> {
        for live in self.adaptor.foreign_keys(grain.name()).await? {
            let table = grain.table(&live.table);
            if table.is_some_and(|t| !t.auto_update()) {
                continue;
            }
            let current = table
                .and_then(|t| t.foreign_keys().iter().find(|fk| fk.name() == live.name))
                .is_some_and(|fk| live.reflects(fk));
            if !current {
                debug!(fk = %live.name, table = %live.table, "Dropping foreign key");
                self.adaptor.drop_foreign_key(&live).await?;
            }
        }
        Ok(())
    }

    async fn update_sequences(&mut self, grain: &Grain) -> Result<()> {
        let live = self.adaptor.sequences(grain.name()).await?;
        for sequence in grain.sequences().values() {
            match live.iter().find(|s| s.name == sequence.name()) {
                None => self.adaptor.create_sequence(sequence).await?,
                Some(current) if !current.reflects(sequence) => {
                    self.adaptor.alter_sequence(sequence).await?;
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Creates or alters every managed table. Returns the tables changed.
    async fn update_tables(
        &mut self,
        grain: &Grain,
        altered: &BTreeMap<String, Vec<String>>,
    ) -> Result<BTreeSet<String>> {
        let mut modified = BTreeSet::new();
        for table in grain.tables().values() {
            if !table.auto_update() {
                debug!(table = %table.name(), "Table is not updated automatically, skipping");
                continue;
            }
            let columns = altered.get(table.name()).map_or(&[][..], Vec::as_slice);
            if self.update_table(table, columns).await? {
                modified.insert(table.name().to_string());
            }
        }
        Ok(modified)
    }

    async fn update_table(&mut self, table: &Table, altered: &[String]) -> Result<bool> {
        let (grain, name) = (table.grain(), table.name());
        if !self.adaptor.table_exists(grain, name).await? {
            info!(grain = %grain, table = %name, "Creating table");
            self.adaptor.create_table(table).await?;
            self.adaptor.update_versioning_trigger(table).await?;
            return Ok(true);
        }

        let live = self.adaptor.columns(grain, name).await?;
        let mut modified = false;
        for column in table.columns() {
            if !live.contains_key(&column.name) {
                debug!(table = %name, column = %column.name, "Adding column");
                self.adaptor.add_column(table, column).await?;
                modified = true;
            }
        }

        let pk = self.adaptor.primary_key(grain, name).await?;
        let mut has_pk = !pk.is_empty();
        if has_pk && (!pk.reflects(table) || altered.iter().any(|c| pk.columns.contains(c))) {
            for fk in self.adaptor.foreign_keys_referencing(grain, name).await? {
                debug!(fk = %fk.name, table = %fk.table, "Dropping foreign key on primary key");
                self.adaptor.drop_foreign_key(&fk).await?;
                if fk.grain != grain {
                    self.displaced.push(fk);
                }
            }
            self.adaptor.drop_primary_key(table, &pk.name).await?;
            has_pk = false;
            modified = true;
        }

        for column in altered.iter().filter_map(|c| table.column(c)) {
            debug!(table = %name, column = %column.name, "Altering column");
            self.adaptor.update_column(table, column).await?;
            modified = true;
        }

        if self.sync_rec_version(table, &live).await? {
            modified = true;
        }

        if !has_pk && !table.primary_key().is_empty() {
            self.adaptor.create_primary_key(table).await?;
            modified = true;
        }
        Ok(modified)
    }

    /// Aligns the `recversion` column and its trigger with the table options.
    async fn sync_rec_version(
        &mut self,
        table: &Table,
        live: &IndexMap<String, DbColumnInfo>,
    ) -> Result<bool> {
        let quirks = self.adaptor.quirks();
        let mut changed = false;
        let current = live.get(REC_VERSION);
        if let Some(column) = table.rec_version_column() {
            match current {
                None => {
                    self.adaptor.add_column(table, &column).await?;
                    changed = true;
                }
                Some(info) if !info.reflects(&column, &quirks) => {
                    self.adaptor.update_column(table, &column).await?;
                    changed = true;
                }
                Some(_) => {}
            }
        }

        self.adaptor.update_versioning_trigger(table).await?;

        if table.rec_version_column().is_none() && current.is_some() {
            self.adaptor.drop_column(table, REC_VERSION).await?;
            changed = true;
        }
        Ok(changed)
    }

    async fn create_indices(&mut self, grain: &Grain) -> Result<()> {
        let live: Vec<String> = self
            .adaptor
            .indices(grain.name())
            .await?
            .into_iter()
            .map(|i| i.name)
            .collect();
        for index in grain.indices().values() {
            if grain.table(index.table()).is_some_and(|t| !t.auto_update()) {
                continue;
            }
            if !live.iter().any(|name| name == index.name()) {
                debug!(index = %index.name(), "Creating index");
                self.adaptor.create_index(index).await?;
            }
        }
        Ok(())
    }

    async fn create_foreign_keys(&mut self, grain: &Grain) -> Result<()> {
        let live = self.adaptor.foreign_keys(grain.name()).await?;
        for table in grain.tables().values().filter(|t| t.auto_update()) {
            for fk in table.foreign_keys() {
                let exists = live
                    .iter()
                    .any(|l| l.table == fk.table() && l.name == fk.name());
                if !exists {
                    debug!(fk = %fk.name(), table = %fk.table(), "Creating foreign key");
                    self.adaptor.create_foreign_key(fk).await?;
                }
            }
        }
        Ok(())
    }

    /// Recreates keys of other grains dropped with a referenced primary key,
    /// from their current declaration. Their grains may be up to date and
    /// would not restore them.
    async fn restore_displaced_foreign_keys(&mut self, score: &Score) -> Result<()> {
        for live in std::mem::take(&mut self.displaced) {
            let declared = score
                .grain(&live.grain)
                .and_then(|g| g.table(&live.table))
                .filter(|t| t.auto_update())
                .and_then(|t| t.foreign_keys().iter().find(|fk| fk.name() == live.name));
            let Some(fk) = declared else {
                warn!(fk = %live.name, table = %live.table, grain = %live.grain, "Dropped foreign key is no longer declared");
                continue;
            };
            let exists = self
                .adaptor
                .foreign_keys(&live.grain)
                .await?
                .iter()
                .any(|l| l.table == fk.table() && l.name == fk.name());
            if !exists {
                debug!(fk = %fk.name(), table = %fk.table(), grain = %fk.grain(), "Restoring foreign key");
                self.adaptor.create_foreign_key(fk).await?;
            }
        }
        Ok(())
    }

    async fn create_views(&mut self, grain: &Grain) -> Result<()> {
        for view in grain.views().values() {
            self.adaptor.create_view(view).await?;
        }
        for view in grain.parameterized_views().values() {
            self.adaptor.create_parameterized_view(view).await?;
        }
        Ok(())
    }

    /// Rebuilds materialized views whose source changed or whose triggers
    /// were generated from a different definition.
    async fn update_materialized_views(
        &mut self,
        grain: &Grain,
        modified: &BTreeSet<String>,
    ) -> Result<()> {
        for view in grain.materialized_views().values() {
            let exists = self.adaptor.table_exists(grain.name(), view.name()).await?;
            let body = self.adaptor.mv_trigger_body(view).await?;
            let checksum = view.checksum();
            let current = exists
                && !modified.contains(view.source_table())
                && body.as_deref().and_then(MaterializedView::extract_checksum)
                    == Some(checksum.as_str());
            if current {
                continue;
            }

            info!(grain = %grain.name(), view = %view.name(), "Rebuilding materialized view");
            self.adaptor.drop_mv_triggers(view).await?;
            if exists {
                self.adaptor.drop_table(grain.name(), view.name()).await?;
            }
            self.adaptor.create_table(view.table()).await?;
            self.adaptor.init_mv_data(view).await?;
            self.adaptor.create_mv_triggers(view).await?;
        }
        Ok(())
    }

    /// Records declared objects in `celesta_tables`; vanished ones are
    /// marked orphaned.
    async fn update_table_catalog(&mut self, grain: &Grain) -> Result<()> {
        let declared = declared_objects(grain);
        let live = self.adaptor.table_catalog(grain.name()).await?;

        for entry in &declared {
            if live.iter().find(|e| e.name == entry.name) != Some(entry) {
                self.adaptor.upsert_table_catalog(entry).await?;
            }
        }
        for entry in live {
            if !entry.orphaned && !declared.iter().any(|d| d.name == entry.name) {
                debug!(grain = %grain.name(), name = %entry.name, "Marking catalog entry orphaned");
                self.adaptor
                    .upsert_table_catalog(&TableCatalogEntry {
                        orphaned: true,
                        ..entry
                    })
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = UpdaterConfig::new();
        assert!(!config.is_force_init());
        assert!(config.force_init(true).is_force_init());
    }
}
