//! The grain: a named, versioned container of schema elements.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use tracing::debug;

use crate::checksum::Fingerprint;
use crate::error::{ErrorKind, Result, ScoreError};
use crate::foreign_key::ForeignKey;
use crate::identifier::check_identifier;
use crate::index::Index;
use crate::sequence::Sequence;
use crate::table::Table;
use crate::version::VersionString;
use crate::view::{MaterializedView, ParameterizedView, TableLookup, View};

/// Name of the system grain holding the reconciliation catalog.
pub const SYSTEM_GRAIN: &str = "celesta";

/// A named, versioned collection of tables, views, indices and sequences.
///
/// Element names share one namespace across all kinds. Constraint names
/// (primary and foreign keys) share another.
#[derive(Debug, Clone)]
pub struct Grain {
    name: String,
    version: VersionString,
    fingerprint: Fingerprint,
    dependency_order: Option<u32>,
    modified: bool,
    parsing_complete: bool,
    tables: IndexMap<String, Table>,
    indices: IndexMap<String, Index>,
    sequences: IndexMap<String, Sequence>,
    views: IndexMap<String, View>,
    materialized_views: IndexMap<String, MaterializedView>,
    parameterized_views: IndexMap<String, ParameterizedView>,
    constraint_names: BTreeSet<String>,
}

impl Grain {
    /// Creates an empty grain.
    pub fn new(name: &str, version: &str) -> Result<Self> {
        check_identifier(name, name)?;
        if name.contains('_') {
            return Err(ScoreError::grain(
                ErrorKind::IllegalIdentifier,
                name,
                format!("Invalid grain name '{name}'. No underscores are allowed for grain names."),
            ));
        }
        let version = VersionString::parse(version)
            .map_err(|e| ScoreError::grain(ErrorKind::MalformedVersion, name, e.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            version,
            fingerprint: Fingerprint::default(),
            dependency_order: None,
            modified: true,
            parsing_complete: false,
            tables: IndexMap::new(),
            indices: IndexMap::new(),
            sequences: IndexMap::new(),
            views: IndexMap::new(),
            materialized_views: IndexMap::new(),
            parameterized_views: IndexMap::new(),
            constraint_names: BTreeSet::new(),
        })
    }

    /// Sets the fingerprint of the source the grain was read from.
    #[must_use]
    pub const fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// Returns the grain name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared version.
    #[must_use]
    pub const fn version(&self) -> &VersionString {
        &self.version
    }

    /// Replaces the declared version.
    pub fn set_version(&mut self, version: &str) -> Result<()> {
        self.modify()?;
        self.version = VersionString::parse(version)
            .map_err(|e| ScoreError::grain(ErrorKind::MalformedVersion, &self.name, e.to_string()))?;
        Ok(())
    }

    /// Returns the source fingerprint.
    #[must_use]
    pub const fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Returns the position in the dependency order, once validation has completed.
    #[must_use]
    pub const fn dependency_order(&self) -> Option<u32> {
        self.dependency_order
    }

    /// Returns whether the grain changed since validation completed.
    #[must_use]
    pub const fn is_modified(&self) -> bool {
        self.modified
    }

    /// Returns whether validation has completed.
    #[must_use]
    pub const fn is_parsing_complete(&self) -> bool {
        self.parsing_complete
    }

    /// Returns whether this is the system grain.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.name == SYSTEM_GRAIN
    }

    fn modify(&mut self) -> Result<()> {
        if self.parsing_complete && self.is_system() {
            return Err(ScoreError::grain(
                ErrorKind::ReadOnlyGrain,
                &self.name,
                "You cannot modify system grain.",
            ));
        }
        self.modified = true;
        Ok(())
    }

    fn element_kind(&self, name: &str) -> Option<&'static str> {
        if self.tables.contains_key(name) {
            Some("table")
        } else if self.indices.contains_key(name) {
            Some("index")
        } else if self.sequences.contains_key(name) {
            Some("sequence")
        } else if self.views.contains_key(name) {
            Some("view")
        } else if self.materialized_views.contains_key(name) {
            Some("materialized view")
        } else if self.parameterized_views.contains_key(name) {
            Some("function")
        } else {
            None
        }
    }

    fn check_free(&self, name: &str) -> Result<()> {
        match self.element_kind(name) {
            Some(kind) => Err(ScoreError::element(
                ErrorKind::DuplicateName,
                &self.name,
                name,
                format!(
                    "Cannot create grain element '{name}', a {kind} with the same name already exists in grain '{}'.",
                    self.name
                ),
            )),
            None => Ok(()),
        }
    }

    fn check_constraint(&self, element: &str, constraint: &str) -> Result<()> {
        if self.constraint_names.contains(constraint) {
            return Err(ScoreError::element(
                ErrorKind::DuplicateName,
                &self.name,
                element,
                format!(
                    "Constraint '{constraint}' is defined more than once in grain '{}'.",
                    self.name
                ),
            ));
        }
        Ok(())
    }

    /// Registers a sequence.
    pub fn add_sequence(&mut self, sequence: Sequence) -> Result<()> {
        self.modify()?;
        self.check_free(sequence.name())?;
        self.sequences.insert(sequence.name().to_string(), sequence);
        Ok(())
    }

    /// Registers a table, finalizing its primary key.
    ///
    /// `NEXTVAL` defaults must name a sequence already registered in this grain.
    pub fn add_table(&mut self, mut table: Table) -> Result<()> {
        self.modify()?;
        self.check_free(table.name())?;
        table.finalize_pk()?;
        for column in table.columns() {
            if let Some(sequence) = column.sequence() {
                if !self.sequences.contains_key(sequence) {
                    return Err(ScoreError::element(
                        ErrorKind::Unresolved,
                        &self.name,
                        table.name(),
                        format!(
                            "Sequence '{sequence}' used by column '{}' is not defined in grain '{}'.",
                            column.name, self.name
                        ),
                    ));
                }
            }
        }
        if !table.primary_key().is_empty() {
            self.check_constraint(table.name(), table.pk_name())?;
            self.constraint_names.insert(table.pk_name().to_string());
        }
        self.tables.insert(table.name().to_string(), table);
        Ok(())
    }

    /// Registers an index after checking it against the key and the other indices.
    pub fn add_index(&mut self, index: Index) -> Result<()> {
        self.modify()?;
        self.check_free(index.name())?;
        let table = self.tables.get(index.table()).ok_or_else(|| {
            ScoreError::element(
                ErrorKind::Unresolved,
                &self.name,
                index.name(),
                format!("Table '{}' not found in grain '{}'.", index.table(), self.name),
            )
        })?;
        index.finalize_index(table, self.indices.values())?;
        self.indices.insert(index.name().to_string(), index);
        Ok(())
    }

    /// Attaches a resolved foreign key to `table`.
    pub fn add_foreign_key(&mut self, table: &str, fk: ForeignKey) -> Result<()> {
        self.modify()?;
        if !fk.is_resolved() {
            return Err(ScoreError::element(
                ErrorKind::Unresolved,
                &self.name,
                table,
                format!(
                    "Foreign key on columns ({}) has no referenced table.",
                    fk.columns().join(", ")
                ),
            ));
        }
        self.check_constraint(table, fk.name())?;
        let name = fk.name().to_string();
        let grain = self.name.clone();
        let owner = self.tables.get_mut(table).ok_or_else(|| {
            ScoreError::element(
                ErrorKind::Unresolved,
                &grain,
                table,
                format!("Table '{table}' not found in grain '{grain}'."),
            )
        })?;
        owner.add_foreign_key(fk)?;
        self.constraint_names.insert(name);
        Ok(())
    }

    /// Registers a view.
    pub fn add_view(&mut self, view: View) -> Result<()> {
        self.modify()?;
        self.check_free(view.name())?;
        self.views.insert(view.name().to_string(), view);
        Ok(())
    }

    /// Registers a materialized view together with its table's key constraint.
    pub fn add_materialized_view(&mut self, view: MaterializedView) -> Result<()> {
        self.modify()?;
        self.check_free(view.name())?;
        let pk_name = view.table().pk_name().to_string();
        self.check_constraint(view.name(), &pk_name)?;
        self.constraint_names.insert(pk_name);
        self.materialized_views.insert(view.name().to_string(), view);
        Ok(())
    }

    /// Registers a parameterized view.
    pub fn add_parameterized_view(&mut self, view: ParameterizedView) -> Result<()> {
        self.modify()?;
        self.check_free(view.name())?;
        self.parameterized_views.insert(view.name().to_string(), view);
        Ok(())
    }

    /// Completes validation and assigns the dependency order.
    ///
    /// `<table>_seq` is reserved for every table, so a sequence with that name is rejected.
    pub fn finalize(&mut self, order: u32) -> Result<()> {
        if let Some(sequence) = self.sequences.keys().find(|name| {
            name.strip_suffix("_seq")
                .is_some_and(|table| self.tables.contains_key(table))
        }) {
            return Err(ScoreError::element(
                ErrorKind::IllegalDefinition,
                &self.name,
                sequence,
                format!("Identifier '{sequence}' cannot be used as a sequence name: it is reserved for table sequences."),
            ));
        }
        self.dependency_order = Some(order);
        self.parsing_complete = true;
        self.modified = false;
        debug!(grain = %self.name, order, "Grain validated");
        Ok(())
    }

    /// Returns a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Returns the tables in declaration order.
    #[must_use]
    pub const fn tables(&self) -> &IndexMap<String, Table> {
        &self.tables
    }

    /// Returns the indices in declaration order.
    #[must_use]
    pub const fn indices(&self) -> &IndexMap<String, Index> {
        &self.indices
    }

    /// Returns the sequences in declaration order.
    #[must_use]
    pub const fn sequences(&self) -> &IndexMap<String, Sequence> {
        &self.sequences
    }

    /// Returns the views in declaration order.
    #[must_use]
    pub const fn views(&self) -> &IndexMap<String, View> {
        &self.views
    }

    /// Returns the materialized views in declaration order.
    #[must_use]
    pub const fn materialized_views(&self) -> &IndexMap<String, MaterializedView> {
        &self.materialized_views
    }

    /// Returns the parameterized views in declaration order.
    #[must_use]
    pub const fn parameterized_views(&self) -> &IndexMap<String, ParameterizedView> {
        &self.parameterized_views
    }
}

impl TableLookup for Grain {
    fn lookup_table(&self, grain: Option<&str>, table: &str) -> std::result::Result<&Table, String> {
        match grain {
            Some(other) if other != self.name => Err(format!(
                "Grain '{other}' is not accessible from grain '{}'.",
                self.name
            )),
            _ => self
                .tables
                .get(table)
                .ok_or_else(|| format!("Table '{}.{table}' not found.", self.name)),
        }
    }
}
