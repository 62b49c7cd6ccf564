//! Plan linearization: turn a [`SchemaDiff`] into an ordered sequence of
//! DDL steps that honors type and referential dependencies.
//!
//! Phase order:
//!
//! 1. create enums, append enum labels
//! 2. drop foreign keys (diffed drops, the drop half of retargets,
//!    collateral drops around retypes and primary-key changes, and the
//!    keys owned by tables about to be dropped)
//! 3. drop uniques and indexes
//! 4. drop primary keys being changed
//! 5. drop columns
//! 6. drop tables
//! 7. alter columns (type, nullability, default)
//! 8. add columns
//! 9. add changed primary keys
//! 10. add uniques and indexes on surviving tables
//! 11. create tables (columns, primary key and uniques inline, never
//!     foreign keys) followed by their indexes
//! 12. add foreign keys (new tables, diffed adds, the add half of
//!     retargets, restoration of collateral drops)
//! 13. drop enums
//!
//! Creating tables without their foreign keys and adding every key in a
//! late pass makes circular table dependencies a non-event.

use crate::ddl::{Column, ColumnType, EnumType, ForeignKey, Index, PrimaryKey, Schema, Table, UniqueConstraint};
use crate::diff::SchemaDiff;
use std::collections::{BTreeMap, BTreeSet};

/// A single DDL operation of the plan.
#[derive(Debug, Clone)]
pub enum DdlStep {
    CreateEnum(EnumType),
    AddEnumValues {
        name: String,
        labels: Vec<String>,
    },
    DropForeignKey {
        table: String,
        fk: ForeignKey,
    },
    DropUnique {
        table: String,
        unique: UniqueConstraint,
    },
    DropIndex {
        table: String,
        index: Index,
    },
    DropPrimaryKey {
        table: String,
        pk: PrimaryKey,
    },
    DropColumn {
        table: String,
        column: String,
    },
    DropTable {
        table: String,
    },
    AlterColumnType {
        table: String,
        column: String,
        ty: ColumnType,
    },
    AlterColumnNullable {
        table: String,
        column: String,
        nullable: bool,
    },
    AlterColumnDefault {
        table: String,
        column: String,
        default: Option<String>,
    },
    AddColumn {
        table: String,
        column: Column,
    },
    AddPrimaryKey {
        table: String,
        pk: PrimaryKey,
    },
    AddUnique {
        table: String,
        unique: UniqueConstraint,
    },
    CreateIndex {
        table: String,
        index: Index,
    },
    CreateTable(Table),
    AddForeignKey {
        table: String,
        fk: ForeignKey,
    },
    DropEnum {
        name: String,
    },
}

impl std::fmt::Display for DdlStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DdlStep::CreateEnum(e) => write!(f, "create enum '{}'", e.name),
            DdlStep::AddEnumValues { name, labels } => {
                write!(f, "append {:?} to enum '{}'", labels, name)
            }
            DdlStep::DropForeignKey { table, fk } => {
                write!(f, "drop foreign key on '{}.{}'", table, fk.column)
            }
            DdlStep::DropUnique { table, unique } => {
                write!(f, "drop unique on '{}({})'", table, unique.columns.join(", "))
            }
            DdlStep::DropIndex { table, index } => {
                write!(f, "drop index on '{}({})'", table, index.columns.join(", "))
            }
            DdlStep::DropPrimaryKey { table, .. } => {
                write!(f, "drop primary key of '{}'", table)
            }
            DdlStep::DropColumn { table, column } => {
                write!(f, "drop column '{}.{}'", table, column)
            }
            DdlStep::DropTable { table } => write!(f, "drop table '{}'", table),
            DdlStep::AlterColumnType { table, column, .. } => {
                write!(f, "alter type of '{}.{}'", table, column)
            }
            DdlStep::AlterColumnNullable { table, column, .. } => {
                write!(f, "alter nullability of '{}.{}'", table, column)
            }
            DdlStep::AlterColumnDefault { table, column, .. } => {
                write!(f, "alter default of '{}.{}'", table, column)
            }
            DdlStep::AddColumn { table, column } => {
                write!(f, "add column '{}.{}'", table, column.name)
            }
            DdlStep::AddPrimaryKey { table, .. } => {
                write!(f, "add primary key of '{}'", table)
            }
            DdlStep::AddUnique { table, unique } => {
                write!(f, "add unique on '{}({})'", table, unique.columns.join(", "))
            }
            DdlStep::CreateIndex { table, index } => {
                write!(f, "create index on '{}({})'", table, index.columns.join(", "))
            }
            DdlStep::CreateTable(table) => write!(f, "create table '{}'", table.name),
            DdlStep::AddForeignKey { table, fk } => {
                write!(f, "add foreign key on '{}.{}'", table, fk.column)
            }
            DdlStep::DropEnum { name } => write!(f, "drop enum '{}'", name),
        }
    }
}

/// An ordered, dependency-respecting sequence of DDL steps.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub steps: Vec<DdlStep>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

/// A foreign key that must be dropped before other DDL can touch one of
/// its endpoints, then restored to the desired shape afterwards.
struct CollateralForeignKey {
    table: String,
    live: ForeignKey,
    desired: ForeignKey,
}

/// Linearize `diff` into a [`Plan`]. `live` and `desired` provide the
/// surrounding context needed to protect foreign keys whose endpoint
/// columns are being retyped or whose referenced primary key changes.
pub fn plan(diff: &SchemaDiff, live: &Schema, desired: &Schema) -> Plan {
    let mut steps = Vec::new();

    // 1. Enums first: new types and appended labels must exist before any
    // column DDL that uses them.
    for e in &diff.enums.created {
        steps.push(DdlStep::CreateEnum(e.clone()));
    }
    for e in &diff.enums.extended {
        steps.push(DdlStep::AddEnumValues {
            name: e.name.clone(),
            labels: e.appended.clone(),
        });
    }

    let collateral = collateral_foreign_keys(diff, live, desired);

    // 2. Drop foreign keys.
    for td in &diff.tables.altered {
        for fk in &td.foreign_keys.dropped {
            steps.push(DdlStep::DropForeignKey {
                table: td.name.clone(),
                fk: fk.clone(),
            });
        }
        for rt in &td.foreign_keys.retargeted {
            steps.push(DdlStep::DropForeignKey {
                table: td.name.clone(),
                fk: rt.from.clone(),
            });
        }
    }
    for c in &collateral {
        steps.push(DdlStep::DropForeignKey {
            table: c.table.clone(),
            fk: c.live.clone(),
        });
    }
    // Keys owned by dropped tables go first too, so tables can be dropped
    // in any order even when they reference each other.
    for table in &diff.tables.dropped {
        for fk in &table.foreign_keys {
            steps.push(DdlStep::DropForeignKey {
                table: table.name.clone(),
                fk: fk.clone(),
            });
        }
    }

    // 3. Drop uniques and indexes.
    for td in &diff.tables.altered {
        for unique in &td.uniques.dropped {
            steps.push(DdlStep::DropUnique {
                table: td.name.clone(),
                unique: unique.clone(),
            });
        }
        for index in &td.indexes.dropped {
            steps.push(DdlStep::DropIndex {
                table: td.name.clone(),
                index: index.clone(),
            });
        }
    }

    // 4. Drop changed primary keys before any of their columns go away.
    for td in &diff.tables.altered {
        if let Some(change) = &td.primary_key
            && !change.from.is_empty()
        {
            steps.push(DdlStep::DropPrimaryKey {
                table: td.name.clone(),
                pk: change.from.clone(),
            });
        }
    }

    // 5. Drop columns.
    for td in &diff.tables.altered {
        for column in &td.columns.dropped {
            steps.push(DdlStep::DropColumn {
                table: td.name.clone(),
                column: column.clone(),
            });
        }
    }

    // 6. Drop tables. Inbound keys from surviving tables were dropped in
    // phase 2 (a consistent desired schema cannot keep them).
    for table in &diff.tables.dropped {
        steps.push(DdlStep::DropTable {
            table: table.name.clone(),
        });
    }

    // 7. Alter columns.
    for td in &diff.tables.altered {
        for ac in &td.columns.altered {
            if let Some(ty) = &ac.ty {
                steps.push(DdlStep::AlterColumnType {
                    table: td.name.clone(),
                    column: ac.name.clone(),
                    ty: ty.clone(),
                });
            }
            if let Some(nullable) = ac.nullable {
                steps.push(DdlStep::AlterColumnNullable {
                    table: td.name.clone(),
                    column: ac.name.clone(),
                    nullable,
                });
            }
            if let Some(default) = &ac.default {
                steps.push(DdlStep::AlterColumnDefault {
                    table: td.name.clone(),
                    column: ac.name.clone(),
                    default: default.clone(),
                });
            }
        }
    }

    // 8. Add columns.
    for td in &diff.tables.altered {
        for column in &td.columns.added {
            steps.push(DdlStep::AddColumn {
                table: td.name.clone(),
                column: column.clone(),
            });
        }
    }

    // 9. Add changed primary keys, now that their columns exist.
    for td in &diff.tables.altered {
        if let Some(change) = &td.primary_key
            && !change.to.is_empty()
        {
            steps.push(DdlStep::AddPrimaryKey {
                table: td.name.clone(),
                pk: change.to.clone(),
            });
        }
    }

    // 10. Add uniques and indexes on surviving tables.
    for td in &diff.tables.altered {
        for unique in &td.uniques.added {
            steps.push(DdlStep::AddUnique {
                table: td.name.clone(),
                unique: unique.clone(),
            });
        }
        for index in &td.indexes.added {
            steps.push(DdlStep::CreateIndex {
                table: td.name.clone(),
                index: index.clone(),
            });
        }
    }

    // 11. Create tables, each followed by its indexes. Foreign keys wait
    // for phase 12.
    for table in &diff.tables.created {
        steps.push(DdlStep::CreateTable(table.clone()));
        for index in &table.indexes {
            steps.push(DdlStep::CreateIndex {
                table: table.name.clone(),
                index: index.clone(),
            });
        }
    }

    // 12. Add foreign keys.
    for table in &diff.tables.created {
        for fk in &table.foreign_keys {
            steps.push(DdlStep::AddForeignKey {
                table: table.name.clone(),
                fk: fk.clone(),
            });
        }
    }
    for td in &diff.tables.altered {
        for fk in &td.foreign_keys.added {
            steps.push(DdlStep::AddForeignKey {
                table: td.name.clone(),
                fk: fk.clone(),
            });
        }
        for rt in &td.foreign_keys.retargeted {
            steps.push(DdlStep::AddForeignKey {
                table: td.name.clone(),
                fk: rt.to.clone(),
            });
        }
    }
    for c in collateral {
        steps.push(DdlStep::AddForeignKey {
            table: c.table,
            fk: c.desired,
        });
    }

    // 13. Enums are dropped last, after every referencing column is gone
    // or retyped.
    for name in &diff.enums.dropped {
        steps.push(DdlStep::DropEnum { name: name.clone() });
    }

    Plan { steps }
}

/// Find surviving foreign keys that must be dropped and restored because
/// an endpoint column is retyped or the referenced table's primary key
/// changes over the referenced column.
fn collateral_foreign_keys(
    diff: &SchemaDiff,
    live: &Schema,
    desired: &Schema,
) -> Vec<CollateralForeignKey> {
    let mut retyped: BTreeSet<(&str, &str)> = BTreeSet::new();
    let mut pk_changed: BTreeMap<&str, &crate::diff::PrimaryKeyChange> = BTreeMap::new();
    for td in &diff.tables.altered {
        for ac in &td.columns.altered {
            if ac.ty.is_some() {
                retyped.insert((td.name.as_str(), ac.name.as_str()));
            }
        }
        if let Some(change) = &td.primary_key {
            pk_changed.insert(td.name.as_str(), change);
        }
    }

    let mut collateral = Vec::new();
    for (name, desired_table) in &desired.tables {
        let Some(live_table) = live.tables.get(name) else {
            continue;
        };
        for fk in &desired_table.foreign_keys {
            let Some(live_fk) = live_table.foreign_key(&fk.column) else {
                continue;
            };
            if !live_fk.same_target(fk) {
                // A retarget; the differ already drops and re-adds it.
                continue;
            }
            let pk_touches_target = pk_changed.get(fk.foreign_table.as_str()).is_some_and(|c| {
                c.from.columns.contains(&fk.foreign_column)
                    || c.to.columns.contains(&fk.foreign_column)
            });
            let needs_protection = retyped.contains(&(name.as_str(), fk.column.as_str()))
                || retyped.contains(&(fk.foreign_table.as_str(), fk.foreign_column.as_str()))
                || pk_touches_target;
            if needs_protection {
                collateral.push(CollateralForeignKey {
                    table: name.clone(),
                    live: live_fk.clone(),
                    desired: fk.clone(),
                });
            }
        }
    }
    collateral
}
