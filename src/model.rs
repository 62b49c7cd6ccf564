//! Caller-facing declarative schema model and the desired-schema compiler.
//!
//! The caller describes the target shape with [`SchemaModel`], [`TableDef`]
//! and [`ColumnDef`] builders; [`SchemaModel::compile`] validates the model
//! and lowers it into the shared [`Schema`] representation. Compilation is
//! pure: it performs no I/O and runs before the database is touched.

use crate::ddl::{
    BOOKKEEPING_TABLE, Column, ColumnType, EnumType, ForeignKey, Index, PrimaryKey, Schema, Table,
    UniqueConstraint,
};
use crate::error::SyncError;
use std::collections::BTreeSet;

// =============================================================================
// Declarative descriptors
// =============================================================================

/// A column declaration.
#[derive(Clone, Debug)]
pub struct ColumnDef {
    name: String,
    ty: ColumnType,
    nullable: bool,
    default: Option<String>,
    identity: bool,
    unique: bool,
    index: bool,
    primary_key: bool,
}

impl ColumnDef {
    /// Declare a column. Columns are nullable unless marked otherwise.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            default: None,
            identity: false,
            unique: false,
            index: false,
            primary_key: false,
        }
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Explicit default as a rendered SQL expression (`"'pending'"`,
    /// `"true"`, `"0"`).
    #[must_use]
    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Mark the column as identity-generated. Implies NOT NULL.
    #[must_use]
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Declare a single-column unique constraint on this column.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Declare a single-column plain index on this column.
    #[must_use]
    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    /// Make the column a member of the primary key. Order of declaration
    /// is the key's column order. Implies NOT NULL.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// A table declaration.
#[derive(Clone, Debug)]
pub struct TableDef {
    name: String,
    columns: Vec<ColumnDef>,
    uniques: Vec<Vec<String>>,
    indexes: Vec<Vec<String>>,
    foreign_keys: Vec<(String, String, String)>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            uniques: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    #[must_use]
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Composite unique constraint, kept verbatim.
    #[must_use]
    pub fn unique_together<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uniques
            .push(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Composite plain index.
    #[must_use]
    pub fn index_on<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes
            .push(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Single-column foreign key `local → foreign_table.foreign_column`.
    #[must_use]
    pub fn foreign_key(
        mut self,
        local: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        self.foreign_keys
            .push((local.into(), foreign_table.into(), foreign_column.into()));
        self
    }
}

/// The declarative registry the engine consumes: table descriptors plus the
/// enum types their columns may reference.
#[derive(Clone, Debug, Default)]
pub struct SchemaModel {
    tables: Vec<TableDef>,
    enums: Vec<EnumType>,
}

impl SchemaModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&mut self, table: TableDef) -> &mut Self {
        self.tables.push(table);
        self
    }

    /// Declare an enum type for use via [`ColumnType::Enum`]. Only enums
    /// actually referenced by a column end up in the compiled schema.
    pub fn enum_type<I, S>(&mut self, name: impl Into<String>, labels: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enums.push(EnumType {
            name: name.into(),
            labels: labels.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Compile and validate the model into a [`Schema`].
    ///
    /// `tenant_unique_column` is the multi-tenant widening policy: when set
    /// and a table carries that column, single-column uniques widen into
    /// the composite `(column, tenant_column)`.
    pub fn compile(&self, tenant_unique_column: Option<&str>) -> Result<Schema, SyncError> {
        let mut schema = Schema::new();

        for e in &self.enums {
            let mut seen = BTreeSet::new();
            for label in &e.labels {
                if !seen.insert(label.as_str()) {
                    return Err(SyncError::Compilation(format!(
                        "enum '{}' declares label '{}' more than once",
                        e.name, label
                    )));
                }
            }
        }

        for def in &self.tables {
            if def.name == BOOKKEEPING_TABLE {
                return Err(SyncError::Compilation(format!(
                    "table name '{}' is reserved for migration bookkeeping",
                    BOOKKEEPING_TABLE
                )));
            }
            let table = self.compile_table(def, tenant_unique_column)?;
            if schema.tables.contains_key(&table.name) {
                return Err(SyncError::Compilation(format!(
                    "table '{}' is declared more than once",
                    table.name
                )));
            }
            schema.add_table(table);
        }

        // Collect only the enums referenced by some column.
        for table in schema.tables.values() {
            for column in &table.columns {
                if let Some(enum_name) = column.ty.enum_name()
                    && !schema.enums.contains_key(enum_name)
                {
                    let declared = self
                        .enums
                        .iter()
                        .find(|e| e.name == enum_name)
                        .ok_or_else(|| {
                            SyncError::Compilation(format!(
                                "column '{}.{}' references undeclared enum '{}'",
                                table.name, column.name, enum_name
                            ))
                        })?;
                    schema.enums.insert(enum_name.to_string(), declared.clone());
                }
            }
        }

        validate_references(&schema)?;
        Ok(schema)
    }

    fn compile_table(
        &self,
        def: &TableDef,
        tenant_unique_column: Option<&str>,
    ) -> Result<Table, SyncError> {
        let mut table = Table::new(def.name.clone());
        let mut pk_columns = Vec::new();

        let has_tenant_column = tenant_unique_column
            .is_some_and(|tenant| def.columns.iter().any(|c| c.name == tenant));

        for col in &def.columns {
            if table.column(&col.name).is_some() {
                return Err(SyncError::Compilation(format!(
                    "table '{}' declares column '{}' more than once",
                    def.name, col.name
                )));
            }
            if col.identity && col.default.is_some() {
                return Err(SyncError::Compilation(format!(
                    "column '{}.{}' cannot combine identity with an explicit default",
                    def.name, col.name
                )));
            }

            // Primary key and identity membership force NOT NULL.
            let nullable = col.nullable && !col.primary_key && !col.identity;
            table.columns.push(Column {
                name: col.name.clone(),
                ty: col.ty.clone(),
                nullable,
                default: col.default.clone(),
                identity: col.identity,
            });
            if col.primary_key {
                pk_columns.push(col.name.clone());
            }
        }

        table.primary_key = PrimaryKey {
            name: None,
            columns: pk_columns,
        };

        for columns in &def.uniques {
            table.uniques.push(UniqueConstraint {
                name: None,
                columns: columns.clone(),
            });
        }

        // Synthesize single-column uniques, unless the column already
        // participates in an explicit composite constraint. The tenant
        // policy widens the synthesized constraint when enabled.
        for col in &def.columns {
            if !col.unique {
                continue;
            }
            let covered = def.uniques.iter().any(|u| u.contains(&col.name));
            if covered {
                continue;
            }
            let columns = match tenant_unique_column {
                Some(tenant) if has_tenant_column && col.name != tenant => {
                    vec![col.name.clone(), tenant.to_string()]
                }
                _ => vec![col.name.clone()],
            };
            table.uniques.push(UniqueConstraint {
                name: None,
                columns,
            });
        }

        for columns in &def.indexes {
            table.indexes.push(Index {
                name: None,
                columns: columns.clone(),
            });
        }
        for col in &def.columns {
            if col.index {
                table.indexes.push(Index {
                    name: None,
                    columns: vec![col.name.clone()],
                });
            }
        }

        for (local, foreign_table, foreign_column) in &def.foreign_keys {
            if table.foreign_key(local).is_some() {
                return Err(SyncError::Compilation(format!(
                    "table '{}' declares more than one foreign key on column '{}'",
                    def.name, local
                )));
            }
            table.foreign_keys.push(ForeignKey {
                name: None,
                column: local.clone(),
                foreign_table: foreign_table.clone(),
                foreign_column: foreign_column.clone(),
            });
        }

        Ok(table)
    }
}

/// Cross-table validation: constraint columns exist, foreign key targets
/// resolve within the model.
fn validate_references(schema: &Schema) -> Result<(), SyncError> {
    for table in schema.tables.values() {
        for col in &table.primary_key.columns {
            if table.column(col).is_none() {
                return Err(SyncError::Compilation(format!(
                    "primary key of '{}' names unknown column '{}'",
                    table.name, col
                )));
            }
        }
        for unique in &table.uniques {
            for col in &unique.columns {
                if table.column(col).is_none() {
                    return Err(SyncError::Compilation(format!(
                        "unique constraint on '{}' names unknown column '{}'",
                        table.name, col
                    )));
                }
            }
        }
        for index in &table.indexes {
            for col in &index.columns {
                if table.column(col).is_none() {
                    return Err(SyncError::Compilation(format!(
                        "index on '{}' names unknown column '{}'",
                        table.name, col
                    )));
                }
            }
        }
        for fk in &table.foreign_keys {
            if table.column(&fk.column).is_none() {
                return Err(SyncError::Compilation(format!(
                    "foreign key on '{}' names unknown local column '{}'",
                    table.name, fk.column
                )));
            }
            let target = schema.tables.get(&fk.foreign_table).ok_or_else(|| {
                SyncError::Compilation(format!(
                    "foreign key '{}.{}' references missing table '{}'",
                    table.name, fk.column, fk.foreign_table
                ))
            })?;
            if target.column(&fk.foreign_column).is_none() {
                return Err(SyncError::Compilation(format!(
                    "foreign key '{}.{}' references missing column '{}.{}'",
                    table.name, fk.column, fk.foreign_table, fk.foreign_column
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableDef {
        TableDef::new("users")
            .column(ColumnDef::new("id", ColumnType::Integer).primary_key().identity())
            .column(ColumnDef::new("email", ColumnType::VarChar(255)).not_null().unique())
            .column(ColumnDef::new("name", ColumnType::VarChar(100)))
    }

    #[test]
    fn test_compile_basic_table() {
        let mut model = SchemaModel::new();
        model.table(users());
        let schema = model.compile(None).unwrap();

        let table = &schema.tables["users"];
        assert_eq!(table.columns.len(), 3);
        assert_eq!(table.primary_key.columns, vec!["id"]);
        assert!(!table.column("id").unwrap().nullable);
        assert!(table.column("id").unwrap().identity);
        assert!(table.column("name").unwrap().nullable);
        assert_eq!(table.uniques.len(), 1);
        assert_eq!(table.uniques[0].columns, vec!["email"]);
    }

    #[test]
    fn test_composite_primary_key_order() {
        let mut model = SchemaModel::new();
        model.table(
            TableDef::new("user_roles")
                .column(ColumnDef::new("user_id", ColumnType::Integer).primary_key())
                .column(ColumnDef::new("role_id", ColumnType::Integer).primary_key()),
        );
        let schema = model.compile(None).unwrap();
        assert_eq!(
            schema.tables["user_roles"].primary_key.columns,
            vec!["user_id", "role_id"]
        );
    }

    #[test]
    fn test_unique_not_synthesized_when_covered_by_composite() {
        let mut model = SchemaModel::new();
        model.table(
            TableDef::new("members")
                .column(ColumnDef::new("id", ColumnType::Integer).primary_key())
                .column(ColumnDef::new("email", ColumnType::Text).unique())
                .column(ColumnDef::new("org", ColumnType::Integer))
                .unique_together(["email", "org"]),
        );
        let schema = model.compile(None).unwrap();
        let uniques = &schema.tables["members"].uniques;
        assert_eq!(uniques.len(), 1);
        assert_eq!(uniques[0].columns, vec!["email", "org"]);
    }

    #[test]
    fn test_tenant_widening_policy() {
        let mut model = SchemaModel::new();
        model.table(
            TableDef::new("users")
                .column(ColumnDef::new("id", ColumnType::Integer).primary_key())
                .column(ColumnDef::new("organization_id", ColumnType::Integer).not_null())
                .column(ColumnDef::new("email", ColumnType::VarChar(255)).unique()),
        );

        // Disabled by default: plain single-column unique.
        let schema = model.compile(None).unwrap();
        assert_eq!(schema.tables["users"].uniques[0].columns, vec!["email"]);

        // Enabled: widened into (email, organization_id).
        let schema = model.compile(Some("organization_id")).unwrap();
        assert_eq!(
            schema.tables["users"].uniques[0].columns,
            vec!["email", "organization_id"]
        );
    }

    #[test]
    fn test_enum_collection_and_validation() {
        let mut model = SchemaModel::new();
        model.enum_type("status", ["active", "inactive", "pending"]);
        model.enum_type("unused", ["a", "b"]);
        model.table(
            TableDef::new("tasks")
                .column(ColumnDef::new("id", ColumnType::Integer).primary_key())
                .column(ColumnDef::new("status", ColumnType::Enum("status".to_string()))),
        );

        let schema = model.compile(None).unwrap();
        assert!(schema.enums.contains_key("status"));
        // Unreferenced declarations are not part of the desired schema.
        assert!(!schema.enums.contains_key("unused"));
    }

    #[test]
    fn test_undeclared_enum_fails() {
        let mut model = SchemaModel::new();
        model.table(
            TableDef::new("tasks")
                .column(ColumnDef::new("status", ColumnType::Enum("status".to_string()))),
        );
        let err = model.compile(None).unwrap_err();
        assert!(matches!(err, SyncError::Compilation(_)));
    }

    #[test]
    fn test_missing_fk_target_fails() {
        let mut model = SchemaModel::new();
        model.table(
            TableDef::new("posts")
                .column(ColumnDef::new("id", ColumnType::Integer).primary_key())
                .column(ColumnDef::new("user_id", ColumnType::Integer))
                .foreign_key("user_id", "users", "id"),
        );
        let err = model.compile(None).unwrap_err();
        assert!(matches!(err, SyncError::Compilation(_)));
    }

    #[test]
    fn test_duplicate_fk_on_column_fails() {
        let mut model = SchemaModel::new();
        model.table(
            TableDef::new("posts")
                .column(ColumnDef::new("id", ColumnType::Integer).primary_key())
                .column(ColumnDef::new("user_id", ColumnType::Integer))
                .foreign_key("user_id", "users", "id")
                .foreign_key("user_id", "authors", "id"),
        );
        assert!(matches!(
            model.compile(None),
            Err(SyncError::Compilation(_))
        ));
    }

    #[test]
    fn test_bookkeeping_table_name_is_reserved() {
        let mut model = SchemaModel::new();
        model.table(
            TableDef::new("alembic_version")
                .column(ColumnDef::new("version_num", ColumnType::VarChar(32))),
        );
        assert!(matches!(
            model.compile(None),
            Err(SyncError::Compilation(_))
        ));
    }

    #[test]
    fn test_identity_with_default_fails() {
        let mut model = SchemaModel::new();
        model.table(
            TableDef::new("users").column(
                ColumnDef::new("id", ColumnType::Integer)
                    .identity()
                    .default("0"),
            ),
        );
        assert!(matches!(
            model.compile(None),
            Err(SyncError::Compilation(_))
        ));
    }
}
