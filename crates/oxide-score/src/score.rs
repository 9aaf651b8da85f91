//! The score: every grain of a schema, validated and in dependency order.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::column::{Column, ColumnType, DefaultValue};
use crate::error::{ErrorKind, Result, ScoreBuildError, ScoreError};
use crate::foreign_key::{FkRule, ForeignKey};
use crate::grain::{Grain, SYSTEM_GRAIN};
use crate::identifier::check_identifier;
use crate::index::Index;
use crate::raw::{RawElement, RawForeignKey, RawGrain, RawTable};
use crate::sequence::{Sequence, SequenceParams};
use crate::table::Table;
use crate::view::{MaterializedView, ParameterizedView, TableLookup, View};

/// Definition of the system grain that holds the reconciliation catalog.
pub const SYSTEM_GRAIN_DEFINITION: &str = r#"{
  "name": "celesta",
  "version": "1.12",
  "elements": [
    {"kind": "table", "name": "grains", "options": {"with_version_check": false},
     "columns": [
       {"name": "id", "type": "VARCHAR", "length": 30, "nullable": false, "primary_key": true},
       {"name": "version", "type": "VARCHAR", "length": 2000, "nullable": false},
       {"name": "length", "type": "INT", "nullable": false},
       {"name": "checksum", "type": "VARCHAR", "length": 8, "nullable": false},
       {"name": "state", "type": "INT", "nullable": false, "default": "3"},
       {"name": "lastmodified", "type": "DATETIME", "nullable": false, "default": "GETDATE()"},
       {"name": "message", "type": "TEXT", "nullable": false, "default": "''"}
     ]},
    {"kind": "table", "name": "tables", "options": {"with_version_check": false},
     "columns": [
       {"name": "grainid", "type": "VARCHAR", "length": 30, "nullable": false},
       {"name": "tablename", "type": "VARCHAR", "length": 30, "nullable": false},
       {"name": "tabletype", "type": "VARCHAR", "length": 1, "nullable": false, "default": "'T'"},
       {"name": "orphaned", "type": "BIT", "nullable": false, "default": "FALSE"}
     ],
     "primary_key": {"columns": ["grainid", "tablename"]},
     "foreign_keys": [{"columns": ["grainid"], "references": {"table": "grains"}}]},
    {"kind": "table", "name": "sequences", "options": {"with_version_check": false},
     "columns": [
       {"name": "grainid", "type": "VARCHAR", "length": 30, "nullable": false},
       {"name": "seqname", "type": "VARCHAR", "length": 30, "nullable": false},
       {"name": "seqvalue", "type": "INT", "nullable": false},
       {"name": "increment", "type": "INT", "nullable": false, "default": "1"},
       {"name": "minvalue", "type": "INT", "nullable": false},
       {"name": "maxvalue", "type": "INT", "nullable": false},
       {"name": "cycle", "type": "BIT", "nullable": false, "default": "FALSE"}
     ],
     "primary_key": {"columns": ["grainid", "seqname"]},
     "foreign_keys": [{"columns": ["grainid"], "references": {"table": "grains"}}]},
    {"kind": "table", "name": "functions", "options": {"with_version_check": false},
     "columns": [
       {"name": "grainid", "type": "VARCHAR", "length": 30, "nullable": false},
       {"name": "funcname", "type": "VARCHAR", "length": 30, "nullable": false},
       {"name": "sql", "type": "TEXT", "nullable": false}
     ],
     "primary_key": {"columns": ["grainid", "funcname"]},
     "foreign_keys": [{"columns": ["grainid"], "references": {"table": "grains"}}]}
  ]
}"#;

/// Parses the system grain definition.
pub fn system_raw_grain() -> Result<RawGrain> {
    RawGrain::from_json(SYSTEM_GRAIN_DEFINITION).map_err(|e| {
        ScoreError::grain(ErrorKind::IllegalDefinition, SYSTEM_GRAIN, e.to_string())
    })
}

/// A validated, cross-referenced collection of grains.
#[derive(Debug, Clone)]
pub struct Score {
    grains: IndexMap<String, Grain>,
}

struct Pending {
    raw: RawGrain,
    grain: Grain,
    depends_on: Vec<String>,
}

impl Score {
    /// Validates `raw_grains` together with the system grain.
    ///
    /// A grain is validated in two steps. Sequences, tables and indices are
    /// local and checked first. Foreign keys and views may reach into other
    /// grains, so they are resolved only once every referenced grain has
    /// completed validation. Grains that never get there are reported as
    /// cycles or as consequences of earlier failures.
    pub fn build(raw_grains: Vec<RawGrain>) -> std::result::Result<Self, ScoreBuildError> {
        let mut errors = Vec::new();
        let mut failed: BTreeSet<String> = BTreeSet::new();
        let mut pending: IndexMap<String, Pending> = IndexMap::new();

        let system = system_raw_grain().map_err(|e| ScoreBuildError { errors: vec![e] })?;
        for raw in std::iter::once(system).chain(raw_grains) {
            if pending.contains_key(&raw.name) || failed.contains(&raw.name) {
                errors.push(if raw.name == SYSTEM_GRAIN {
                    ScoreError::grain(
                        ErrorKind::ReadOnlyGrain,
                        &raw.name,
                        "You cannot modify system grain.",
                    )
                } else {
                    ScoreError::grain(
                        ErrorKind::DuplicateName,
                        &raw.name,
                        format!("Grain '{}' is defined more than once.", raw.name),
                    )
                });
                continue;
            }
            match build_local(&raw) {
                Ok(grain) => {
                    let depends_on = raw
                        .referenced_grains()
                        .into_iter()
                        .map(ToString::to_string)
                        .collect();
                    pending.insert(
                        raw.name.clone(),
                        Pending {
                            raw,
                            grain,
                            depends_on,
                        },
                    );
                }
                Err(e) => {
                    failed.insert(raw.name);
                    errors.push(e);
                }
            }
        }

        let mut complete: IndexMap<String, Grain> = IndexMap::new();
        let mut order = 0;
        loop {
            let mut progress = false;
            let names: Vec<String> = pending.keys().cloned().collect();
            for name in names {
                let depends_on = pending[&name].depends_on.clone();
                let blocker = depends_on.iter().find(|dep| {
                    failed.contains(*dep)
                        || !(pending.contains_key(*dep) || complete.contains_key(*dep))
                });
                if let Some(dep) = blocker {
                    let message = if failed.contains(dep) {
                        format!(
                            "Grain '{name}' cannot be resolved due to previous errors in grain '{dep}'."
                        )
                    } else {
                        format!("Grain '{dep}' referenced from grain '{name}' does not exist.")
                    };
                    pending.shift_remove(&name);
                    errors.push(ScoreError::grain(ErrorKind::Unresolved, &name, message));
                    failed.insert(name);
                    progress = true;
                    continue;
                }
                if !depends_on.iter().all(|dep| complete.contains_key(dep)) {
                    continue;
                }
                let Some(Pending { raw, mut grain, .. }) = pending.shift_remove(&name) else {
                    continue;
                };
                progress = true;
                match resolve_references(&mut grain, &raw, &complete)
                    .and_then(|()| grain.finalize(order))
                {
                    Ok(()) => {
                        order += 1;
                        complete.insert(name, grain);
                    }
                    Err(e) => {
                        warn!(grain = %name, error = %e, "Grain failed validation");
                        errors.push(e);
                        failed.insert(name);
                    }
                }
            }
            if !progress {
                break;
            }
        }

        if !pending.is_empty() {
            errors.extend(stalled_grain_errors(&pending));
        }

        if errors.is_empty() {
            info!(grains = complete.len(), "Score built");
            Ok(Self { grains: complete })
        } else {
            Err(ScoreBuildError { errors })
        }
    }

    /// Returns the grains in dependency order, the system grain first.
    pub fn grains(&self) -> impl Iterator<Item = &Grain> {
        self.grains.values()
    }

    /// Returns a grain by name.
    #[must_use]
    pub fn grain(&self, name: &str) -> Option<&Grain> {
        self.grains.get(name)
    }

    /// Returns the system grain.
    #[must_use]
    pub fn system_grain(&self) -> Option<&Grain> {
        self.grains.get(SYSTEM_GRAIN)
    }
}

struct ScoreLookup<'a> {
    grain: &'a Grain,
    complete: &'a IndexMap<String, Grain>,
}

impl TableLookup for ScoreLookup<'_> {
    fn lookup_table(&self, grain: Option<&str>, table: &str) -> std::result::Result<&Table, String> {
        match grain {
            Some(other) if other != self.grain.name() => self
                .complete
                .get(other)
                .ok_or_else(|| format!("Grain '{other}' has not been validated yet."))?
                .table(table)
                .ok_or_else(|| format!("Table '{other}.{table}' not found.")),
            _ => self.grain.lookup_table(None, table),
        }
    }
}

fn build_local(raw: &RawGrain) -> Result<Grain> {
    let mut grain = Grain::new(&raw.name, &raw.version)?.with_fingerprint(raw.fingerprint);

    for element in &raw.elements {
        if let RawElement::Sequence(s) = element {
            check_identifier(&raw.name, &s.name)?;
            let params = SequenceParams {
                start_with: s.start_with,
                increment_by: s.increment_by,
                min_value: s.min_value,
                max_value: s.max_value,
                cycle: s.cycle,
            };
            grain.add_sequence(Sequence::new(&raw.name, &s.name, params)?)?;
        }
    }
    for element in &raw.elements {
        if let RawElement::Table(t) = element {
            grain.add_table(build_table(&raw.name, t)?)?;
        }
    }
    for element in &raw.elements {
        if let RawElement::Index(i) = element {
            let table = grain.table(&i.table).ok_or_else(|| {
                ScoreError::element(
                    ErrorKind::Unresolved,
                    &raw.name,
                    &i.name,
                    format!("Table '{}' not found in grain '{}'.", i.table, raw.name),
                )
            })?;
            let index = Index::new(table, &i.name, &i.columns)?;
            grain.add_index(index)?;
        }
    }
    debug!(grain = %raw.name, "Local elements validated");
    Ok(grain)
}

fn build_table(grain: &str, raw: &RawTable) -> Result<Table> {
    let mut table = Table::new(grain, &raw.name, raw.options)?;
    for raw_column in &raw.columns {
        let fail = |message: String| {
            ScoreError::element(
                ErrorKind::IllegalDefinition,
                grain,
                &raw.name,
                format!("Column '{}': {message}", raw_column.name),
            )
        };
        let ty = ColumnType::from_tag(
            &raw_column.type_tag,
            raw_column.length,
            raw_column.precision,
            raw_column.scale,
        )
        .map_err(fail)?;
        let mut column = Column::new(raw_column.name.as_str(), ty);
        if !raw_column.nullable {
            column = column.not_null();
        }
        if let Some(lexeme) = &raw_column.default {
            column = column.default_value(DefaultValue::parse(&ty, lexeme).map_err(fail)?);
        }
        table.add_column(column)?;
    }

    let inline: Vec<&str> = raw
        .columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| c.name.as_str())
        .collect();
    for name in &inline {
        table.add_pk_column(name)?;
    }
    if let Some(pk) = &raw.primary_key {
        if !inline.is_empty() {
            table.finalize_pk()?;
        }
        if let Some(name) = &pk.name {
            table.set_pk_name(name)?;
        }
        for name in &pk.columns {
            table.add_pk_column(name)?;
        }
    }
    Ok(table)
}

fn parse_rule(grain: &str, table: &str, rule: Option<&str>) -> Result<FkRule> {
    rule.map_or(Ok(FkRule::default()), |text| {
        FkRule::from_sql(text).ok_or_else(|| {
            ScoreError::element(
                ErrorKind::IllegalDefinition,
                grain,
                table,
                format!("Unknown foreign key rule '{text}'."),
            )
        })
    })
}

fn resolve_foreign_key(
    grain: &Grain,
    complete: &IndexMap<String, Grain>,
    table: &str,
    raw: &RawForeignKey,
) -> Result<ForeignKey> {
    let fail = |kind, message: String| ScoreError::element(kind, grain.name(), table, message);
    let parent = grain
        .table(table)
        .ok_or_else(|| fail(ErrorKind::Unresolved, format!("Table '{table}' not found.")))?;
    let mut fk = ForeignKey::new(parent, &raw.columns)?;
    if let Some(name) = &raw.name {
        fk.set_name(name)?;
    }
    fk.set_rules(
        parent,
        parse_rule(grain.name(), table, raw.on_delete.as_deref())?,
        parse_rule(grain.name(), table, raw.on_update.as_deref())?,
    )?;
    let lookup = ScoreLookup { grain, complete };
    let referenced_grain = raw.references.grain.as_deref().filter(|g| !g.is_empty());
    let target = lookup
        .lookup_table(referenced_grain, &raw.references.table)
        .map_err(|message| fail(ErrorKind::Unresolved, message))?;
    fk.set_referenced_table(parent, target, &raw.references.columns)?;
    Ok(fk)
}

fn resolve_references(
    grain: &mut Grain,
    raw: &RawGrain,
    complete: &IndexMap<String, Grain>,
) -> Result<()> {
    for element in &raw.elements {
        if let RawElement::Table(t) = element {
            for raw_fk in &t.foreign_keys {
                let fk = resolve_foreign_key(grain, complete, &t.name, raw_fk)?;
                grain.add_foreign_key(&t.name, fk)?;
            }
        }
    }
    for element in &raw.elements {
        match element {
            RawElement::View(v) => {
                let view = View::new(&raw.name, v.clone(), &ScoreLookup { grain: &*grain, complete })?;
                grain.add_view(view)?;
            }
            RawElement::MaterializedView(v) => {
                let view =
                    MaterializedView::new(&raw.name, v.clone(), &ScoreLookup { grain: &*grain, complete })?;
                grain.add_materialized_view(view)?;
            }
            RawElement::ParameterizedView(v) => {
                let view =
                    ParameterizedView::new(&raw.name, v.clone(), &ScoreLookup { grain: &*grain, complete })?;
                grain.add_parameterized_view(view)?;
            }
            RawElement::Table(_) | RawElement::Sequence(_) | RawElement::Index(_) => {}
        }
    }
    Ok(())
}

/// Explains why the remaining grains could not be validated.
fn stalled_grain_errors(pending: &IndexMap<String, Pending>) -> Vec<ScoreError> {
    let graph: IndexMap<String, Vec<String>> = pending
        .iter()
        .map(|(name, p)| {
            let edges = p
                .depends_on
                .iter()
                .filter(|dep| pending.contains_key(*dep))
                .cloned()
                .collect();
            (name.clone(), edges)
        })
        .collect();

    let mut errors = Vec::new();
    let mut in_cycle = BTreeSet::new();
    for mut component in strongly_connected_components(&graph) {
        if component.len() < 2 {
            continue;
        }
        component.sort();
        let names: Vec<String> = component.iter().map(|n| format!("'{n}'")).collect();
        let listed = match names.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{} and {last}", rest.join(", ")),
            _ => names.join(""),
        };
        errors.push(ScoreError::grain(
            ErrorKind::CyclicReference,
            &component[0],
            format!("Grain cycle reference involving grains {listed}."),
        ));
        in_cycle.extend(component);
    }
    for name in graph.keys().filter(|name| !in_cycle.contains(*name)) {
        errors.push(ScoreError::grain(
            ErrorKind::Unresolved,
            name,
            format!("Grain '{name}' cannot be resolved due to previous errors."),
        ));
    }
    errors
}

/// Tarjan's algorithm over a small dependency graph.
fn strongly_connected_components(graph: &IndexMap<String, Vec<String>>) -> Vec<Vec<String>> {
    struct State<'a> {
        graph: &'a IndexMap<String, Vec<String>>,
        next: usize,
        index: HashMap<&'a str, usize>,
        lowlink: HashMap<&'a str, usize>,
        stack: Vec<&'a str>,
        on_stack: HashSet<&'a str>,
        components: Vec<Vec<String>>,
    }

    impl<'a> State<'a> {
        fn visit(&mut self, node: &'a str) {
            self.index.insert(node, self.next);
            self.lowlink.insert(node, self.next);
            self.next += 1;
            self.stack.push(node);
            self.on_stack.insert(node);

            let graph = self.graph;
            for dep in graph.get(node).into_iter().flatten() {
                let dep = dep.as_str();
                if !self.index.contains_key(dep) {
                    self.visit(dep);
                    let low = self.lowlink[node].min(self.lowlink[dep]);
                    self.lowlink.insert(node, low);
                } else if self.on_stack.contains(dep) {
                    let low = self.lowlink[node].min(self.index[dep]);
                    self.lowlink.insert(node, low);
                }
            }

            if self.lowlink[node] == self.index[node] {
                let mut component = Vec::new();
                while let Some(member) = self.stack.pop() {
                    self.on_stack.remove(member);
                    component.push(member.to_string());
                    if member == node {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }

    let mut state = State {
        graph,
        next: 0,
        index: HashMap::new(),
        lowlink: HashMap::new(),
        stack: Vec::new(),
        on_stack: HashSet::new(),
        components: Vec::new(),
    };
    for node in graph.keys() {
        if !state.index.contains_key(node.as_str()) {
            state.visit(node);
        }
    }
    state.components
}
