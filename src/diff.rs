//! Schema diffing: reconcile the reflected live schema against the
//! compiled desired schema.
//!
//! All identity is by name or by ordered column tuple; constraint names
//! carried from the catalog never participate in comparisons. Destructive
//! enum edits (label removal or reordering) and identity-flag changes are
//! rejected here, before anything is planned or executed.

use crate::ddl::{
    BOOKKEEPING_TABLE, Column, ColumnType, EnumType, ForeignKey, Index, PrimaryKey, Schema, Table,
    UniqueConstraint,
};
use crate::error::SyncError;
use crate::grammar::normalize_default;
use std::collections::BTreeMap;

/// Complete diff between the live and desired schemas.
#[derive(Debug, Clone, Default)]
pub struct SchemaDiff {
    pub tables: TablesDiff,
    pub enums: EnumsDiff,
}

impl SchemaDiff {
    pub fn has_changes(&self) -> bool {
        self.tables.has_changes() || self.enums.has_changes()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_changes()
    }
}

/// Table-level diff.
#[derive(Debug, Clone, Default)]
pub struct TablesDiff {
    pub created: Vec<Table>,
    pub dropped: Vec<Table>,
    pub altered: Vec<TableDiff>,
}

impl TablesDiff {
    pub fn has_changes(&self) -> bool {
        !self.created.is_empty() || !self.dropped.is_empty() || !self.altered.is_empty()
    }
}

/// Edits for a table present on both sides.
#[derive(Debug, Clone)]
pub struct TableDiff {
    pub name: String,
    pub columns: ColumnsDiff,
    pub primary_key: Option<PrimaryKeyChange>,
    pub uniques: UniquesDiff,
    pub indexes: IndexesDiff,
    pub foreign_keys: ForeignKeysDiff,
}

impl TableDiff {
    pub fn has_changes(&self) -> bool {
        self.columns.has_changes()
            || self.primary_key.is_some()
            || self.uniques.has_changes()
            || self.indexes.has_changes()
            || self.foreign_keys.has_changes()
    }
}

/// Column-level diff.
#[derive(Debug, Clone, Default)]
pub struct ColumnsDiff {
    pub added: Vec<Column>,
    pub dropped: Vec<String>,
    pub altered: Vec<AlteredColumn>,
}

impl ColumnsDiff {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.dropped.is_empty() || !self.altered.is_empty()
    }
}

/// Per-column alterations; only the changed facets are set.
#[derive(Debug, Clone)]
pub struct AlteredColumn {
    pub name: String,
    pub ty: Option<ColumnType>,
    pub nullable: Option<bool>,
    /// `Some(None)` drops the default, `Some(Some(expr))` sets it.
    pub default: Option<Option<String>>,
}

/// An ordered primary-key column change.
#[derive(Debug, Clone)]
pub struct PrimaryKeyChange {
    pub from: PrimaryKey,
    pub to: PrimaryKey,
}

/// Unique constraints keyed by their ordered column tuple.
#[derive(Debug, Clone, Default)]
pub struct UniquesDiff {
    pub added: Vec<UniqueConstraint>,
    pub dropped: Vec<UniqueConstraint>,
}

impl UniquesDiff {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.dropped.is_empty()
    }
}

/// Plain indexes keyed by their ordered column tuple.
#[derive(Debug, Clone, Default)]
pub struct IndexesDiff {
    pub added: Vec<Index>,
    pub dropped: Vec<Index>,
}

impl IndexesDiff {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.dropped.is_empty()
    }
}

/// Foreign keys keyed by their local column.
#[derive(Debug, Clone, Default)]
pub struct ForeignKeysDiff {
    pub added: Vec<ForeignKey>,
    pub dropped: Vec<ForeignKey>,
    pub retargeted: Vec<RetargetedForeignKey>,
}

impl ForeignKeysDiff {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.dropped.is_empty() || !self.retargeted.is_empty()
    }
}

/// A foreign key whose local column is unchanged but whose target moved.
#[derive(Debug, Clone)]
pub struct RetargetedForeignKey {
    pub from: ForeignKey,
    pub to: ForeignKey,
}

/// Enum-type diff. Extension appends labels; anything else is unsupported.
#[derive(Debug, Clone, Default)]
pub struct EnumsDiff {
    pub created: Vec<EnumType>,
    pub dropped: Vec<String>,
    pub extended: Vec<ExtendedEnum>,
}

impl EnumsDiff {
    pub fn has_changes(&self) -> bool {
        !self.created.is_empty() || !self.dropped.is_empty() || !self.extended.is_empty()
    }
}

/// Labels appended to an existing enum, in order.
#[derive(Debug, Clone)]
pub struct ExtendedEnum {
    pub name: String,
    pub appended: Vec<String>,
}

/// Compute the diff between the live and desired schemas.
pub fn diff_schemas(live: &Schema, desired: &Schema) -> Result<SchemaDiff, SyncError> {
    Ok(SchemaDiff {
        tables: diff_tables(&live.tables, &desired.tables)?,
        enums: diff_enums(&live.enums, &desired.enums)?,
    })
}

fn diff_tables(
    live: &BTreeMap<String, Table>,
    desired: &BTreeMap<String, Table>,
) -> Result<TablesDiff, SyncError> {
    let mut diff = TablesDiff::default();

    for (name, table) in desired {
        if !live.contains_key(name) {
            diff.created.push(table.clone());
        }
    }

    for (name, table) in live {
        // The reflector already hides the bookkeeping table; the guard
        // here keeps it safe against alternative Schema sources.
        if !desired.contains_key(name) && name != BOOKKEEPING_TABLE {
            diff.dropped.push(table.clone());
        }
    }

    for (name, desired_table) in desired {
        if let Some(live_table) = live.get(name) {
            let altered = diff_table(live_table, desired_table)?;
            if altered.has_changes() {
                diff.altered.push(altered);
            }
        }
    }

    Ok(diff)
}

fn diff_table(live: &Table, desired: &Table) -> Result<TableDiff, SyncError> {
    let primary_key = if live.primary_key.columns != desired.primary_key.columns {
        Some(PrimaryKeyChange {
            from: live.primary_key.clone(),
            to: desired.primary_key.clone(),
        })
    } else {
        None
    };

    Ok(TableDiff {
        name: desired.name.clone(),
        columns: diff_columns(live, desired)?,
        primary_key,
        uniques: diff_uniques(&live.uniques, &desired.uniques),
        indexes: diff_indexes(&live.indexes, &desired.indexes),
        foreign_keys: diff_foreign_keys(&live.foreign_keys, &desired.foreign_keys),
    })
}

fn diff_columns(live: &Table, desired: &Table) -> Result<ColumnsDiff, SyncError> {
    let mut diff = ColumnsDiff::default();

    for column in &desired.columns {
        if live.column(&column.name).is_none() {
            diff.added.push(column.clone());
        }
    }

    for column in &live.columns {
        if desired.column(&column.name).is_none() {
            diff.dropped.push(column.name.clone());
        }
    }

    for desired_col in &desired.columns {
        let Some(live_col) = live.column(&desired_col.name) else {
            continue;
        };

        if live_col.identity != desired_col.identity {
            return Err(SyncError::UnsupportedDiff(format!(
                "column '{}.{}' changes its identity flag; drop and re-add the column instead",
                desired.name, desired_col.name
            )));
        }

        let ty = (live_col.ty != desired_col.ty).then(|| desired_col.ty.clone());
        let nullable = (live_col.nullable != desired_col.nullable).then_some(desired_col.nullable);
        let default = (!defaults_equal(live_col.default.as_deref(), desired_col.default.as_deref()))
            .then(|| desired_col.default.clone());

        if ty.is_some() || nullable.is_some() || default.is_some() {
            diff.altered.push(AlteredColumn {
                name: desired_col.name.clone(),
                ty,
                nullable,
                default,
            });
        }
    }

    Ok(diff)
}

/// Compare explicit defaults as normalized strings. Mismatches are treated
/// conservatively as a default change.
fn defaults_equal(live: Option<&str>, desired: Option<&str>) -> bool {
    match (live, desired) {
        (None, None) => true,
        (Some(l), Some(d)) => normalize_default(l) == normalize_default(d),
        _ => false,
    }
}

fn diff_uniques(live: &[UniqueConstraint], desired: &[UniqueConstraint]) -> UniquesDiff {
    let mut diff = UniquesDiff::default();

    for unique in desired {
        if !live.iter().any(|u| u.columns == unique.columns) {
            diff.added.push(unique.clone());
        }
    }
    for unique in live {
        if !desired.iter().any(|u| u.columns == unique.columns) {
            diff.dropped.push(unique.clone());
        }
    }

    diff
}

fn diff_indexes(live: &[Index], desired: &[Index]) -> IndexesDiff {
    let mut diff = IndexesDiff::default();

    for index in desired {
        if !live.iter().any(|i| i.columns == index.columns) {
            diff.added.push(index.clone());
        }
    }
    for index in live {
        if !desired.iter().any(|i| i.columns == index.columns) {
            diff.dropped.push(index.clone());
        }
    }

    diff
}

fn diff_foreign_keys(live: &[ForeignKey], desired: &[ForeignKey]) -> ForeignKeysDiff {
    let mut diff = ForeignKeysDiff::default();

    for fk in desired {
        match live.iter().find(|f| f.column == fk.column) {
            None => diff.added.push(fk.clone()),
            Some(live_fk) if !live_fk.same_target(fk) => {
                diff.retargeted.push(RetargetedForeignKey {
                    from: live_fk.clone(),
                    to: fk.clone(),
                });
            }
            Some(_) => {}
        }
    }
    for fk in live {
        if !desired.iter().any(|f| f.column == fk.column) {
            diff.dropped.push(fk.clone());
        }
    }

    diff
}

fn diff_enums(
    live: &BTreeMap<String, EnumType>,
    desired: &BTreeMap<String, EnumType>,
) -> Result<EnumsDiff, SyncError> {
    let mut diff = EnumsDiff::default();

    for (name, e) in desired {
        if !live.contains_key(name) {
            diff.created.push(e.clone());
        }
    }

    for name in live.keys() {
        if !desired.contains_key(name) {
            diff.dropped.push(name.clone());
        }
    }

    for (name, desired_enum) in desired {
        let Some(live_enum) = live.get(name) else {
            continue;
        };
        if live_enum.labels == desired_enum.labels {
            continue;
        }
        // Labels may only be appended: the live sequence must be a strict
        // prefix of the desired one.
        let is_prefix = desired_enum.labels.len() > live_enum.labels.len()
            && desired_enum.labels[..live_enum.labels.len()] == live_enum.labels[..];
        if !is_prefix {
            return Err(SyncError::UnsupportedDiff(format!(
                "enum '{}' removes or reorders labels ({:?} -> {:?}); only appending is supported",
                name, live_enum.labels, desired_enum.labels
            )));
        }
        diff.extended.push(ExtendedEnum {
            name: name.clone(),
            appended: desired_enum.labels[live_enum.labels.len()..].to_vec(),
        });
    }

    Ok(diff)
}
