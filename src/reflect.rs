//! Live-catalog reflection.
//!
//! Queries the PostgreSQL catalog for every user table in the working
//! namespace and rebuilds the shared [`Schema`] representation from it:
//! columns with canonical types, primary keys, unique constraints, plain
//! indexes, single-column foreign keys, and enum types with their ordered
//! labels. The migration-bookkeeping table is filtered out at this layer
//! and stays invisible to the rest of the engine.

use crate::ddl::{
    BOOKKEEPING_TABLE, Column, EnumType, ForeignKey, Index, PrimaryKey, Schema, Table,
    UniqueConstraint,
};
use crate::grammar::{column_type_from_catalog, is_serial_default, normalize_default};
use std::collections::{BTreeMap, BTreeSet};
use tokio_postgres::Client;

/// Error type for reflection failures, naming the offending table and
/// column when they are known.
#[derive(Debug, Clone)]
pub struct ReflectError {
    pub message: String,
    pub table: Option<String>,
    pub column: Option<String>,
}

impl ReflectError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            table: None,
            column: None,
        }
    }

    pub fn for_table(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            table: Some(table.into()),
            column: None,
        }
    }

    pub fn for_column(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            table: Some(table.into()),
            column: Some(column.into()),
        }
    }
}

impl std::fmt::Display for ReflectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.table, &self.column) {
            (Some(t), Some(c)) => write!(f, "reflection error for '{}.{}': {}", t, c, self.message),
            (Some(t), None) => write!(f, "reflection error for '{}': {}", t, self.message),
            _ => write!(f, "reflection error: {}", self.message),
        }
    }
}

impl std::error::Error for ReflectError {}

/// Result type for reflection.
pub type ReflectResult<T> = Result<T, ReflectError>;

// =============================================================================
// Raw query result types
// =============================================================================

/// Raw column row from `information_schema.columns`.
#[derive(Debug, Clone)]
pub struct RawColumnInfo {
    pub table: String,
    pub name: String,
    pub data_type: String,
    pub udt_name: String,
    pub char_max_length: Option<i32>,
    pub nullable: bool,
    pub default: Option<String>,
    pub is_identity: bool,
}

/// Raw constraint row (primary key or unique) with its ordered columns.
#[derive(Debug, Clone)]
pub struct RawConstraintInfo {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
}

/// Raw index row with its ordered columns.
#[derive(Debug, Clone)]
pub struct RawIndexInfo {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
}

/// Raw foreign key row.
#[derive(Debug, Clone)]
pub struct RawForeignKeyInfo {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
    pub table_to: String,
    pub columns_to: Vec<String>,
}

/// Raw enum row with labels in sort order.
#[derive(Debug, Clone)]
pub struct RawEnumInfo {
    pub name: String,
    pub labels: Vec<String>,
}

// =============================================================================
// Catalog queries
// =============================================================================

/// SQL queries for catalog reflection, all scoped to one namespace (`$1`).
pub mod queries {
    /// User tables in the namespace.
    pub const TABLES_QUERY: &str = r#"
        SELECT tablename AS name
        FROM pg_tables
        WHERE schemaname = $1
        ORDER BY tablename
    "#;

    /// Columns with catalog type, nullability, default, and identity flag.
    pub const COLUMNS_QUERY: &str = r#"
        SELECT
            c.table_name AS table,
            c.column_name AS name,
            c.data_type,
            c.udt_name,
            c.character_maximum_length,
            c.is_nullable = 'YES' AS nullable,
            c.column_default,
            c.is_identity = 'YES' AS is_identity
        FROM information_schema.columns c
        WHERE c.table_schema = $1
        ORDER BY c.table_name, c.ordinal_position
    "#;

    /// Primary key constraints with ordinal-ordered columns.
    pub const PRIMARY_KEYS_QUERY: &str = r#"
SELECT
    tbl.relname AS table,
    con.conname AS name,
    array_agg(att.attname ORDER BY s.ord) AS columns
FROM pg_constraint con
JOIN pg_class tbl ON tbl.oid = con.conrelid
JOIN pg_namespace ns ON ns.oid = tbl.relnamespace
JOIN unnest(con.conkey) WITH ORDINALITY AS s(attnum, ord) ON TRUE
JOIN pg_attribute att ON att.attrelid = tbl.oid AND att.attnum = s.attnum
WHERE con.contype = 'p'
  AND ns.nspname = $1
GROUP BY tbl.relname, con.conname
ORDER BY tbl.relname, con.conname
"#;

    /// Unique constraints with ordinal-ordered columns.
    pub const UNIQUES_QUERY: &str = r#"
SELECT
    tbl.relname AS table,
    con.conname AS name,
    array_agg(att.attname ORDER BY s.ord) AS columns
FROM pg_constraint con
JOIN pg_class tbl ON tbl.oid = con.conrelid
JOIN pg_namespace ns ON ns.oid = tbl.relnamespace
JOIN unnest(con.conkey) WITH ORDINALITY AS s(attnum, ord) ON TRUE
JOIN pg_attribute att ON att.attrelid = tbl.oid AND att.attnum = s.attnum
WHERE con.contype = 'u'
  AND ns.nspname = $1
GROUP BY tbl.relname, con.conname
ORDER BY tbl.relname, con.conname
"#;

    /// Unique indexes that do not back a constraint. These reflect into
    /// the unique-constraint set so both spellings converge.
    pub const UNIQUE_INDEXES_QUERY: &str = r#"
SELECT
    tbl.relname AS table,
    idx.relname AS name,
    array_agg(att.attname ORDER BY k.ord) AS columns
FROM pg_index ix
JOIN pg_class idx ON idx.oid = ix.indexrelid
JOIN pg_class tbl ON tbl.oid = ix.indrelid
JOIN pg_namespace ns ON ns.oid = tbl.relnamespace
JOIN unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord) ON k.attnum > 0
JOIN pg_attribute att ON att.attrelid = tbl.oid AND att.attnum = k.attnum
WHERE ix.indisunique
  AND NOT ix.indisprimary
  AND ix.indexprs IS NULL
  AND ix.indpred IS NULL
  AND ns.nspname = $1
  AND NOT EXISTS (SELECT 1 FROM pg_constraint con WHERE con.conindid = ix.indexrelid)
GROUP BY tbl.relname, idx.relname
ORDER BY tbl.relname, idx.relname
"#;

    /// Plain (non-unique, non-primary) column indexes.
    pub const INDEXES_QUERY: &str = r#"
SELECT
    tbl.relname AS table,
    idx.relname AS name,
    array_agg(att.attname ORDER BY k.ord) AS columns
FROM pg_index ix
JOIN pg_class idx ON idx.oid = ix.indexrelid
JOIN pg_class tbl ON tbl.oid = ix.indrelid
JOIN pg_namespace ns ON ns.oid = tbl.relnamespace
JOIN unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord) ON k.attnum > 0
JOIN pg_attribute att ON att.attrelid = tbl.oid AND att.attnum = k.attnum
WHERE NOT ix.indisunique
  AND NOT ix.indisprimary
  AND ix.indexprs IS NULL
  AND ix.indpred IS NULL
  AND ns.nspname = $1
GROUP BY tbl.relname, idx.relname
ORDER BY tbl.relname, idx.relname
"#;

    /// Foreign keys with local and referenced columns in matching order.
    pub const FOREIGN_KEYS_QUERY: &str = r#"
SELECT
    tbl.relname AS table,
    con.conname AS name,
    array_agg(src.attname ORDER BY s.ord) AS columns,
    tbl_to.relname AS table_to,
    array_agg(dst.attname ORDER BY s.ord) AS columns_to
FROM pg_constraint con
JOIN pg_class tbl ON tbl.oid = con.conrelid
JOIN pg_namespace ns ON ns.oid = tbl.relnamespace
JOIN pg_class tbl_to ON tbl_to.oid = con.confrelid
JOIN unnest(con.conkey) WITH ORDINALITY AS s(attnum, ord) ON TRUE
JOIN pg_attribute src ON src.attrelid = tbl.oid AND src.attnum = s.attnum
JOIN unnest(con.confkey) WITH ORDINALITY AS r(attnum, ord) ON r.ord = s.ord
JOIN pg_attribute dst ON dst.attrelid = tbl_to.oid AND dst.attnum = r.attnum
WHERE con.contype = 'f'
  AND ns.nspname = $1
GROUP BY tbl.relname, con.conname, tbl_to.relname
ORDER BY tbl.relname, con.conname
"#;

    /// Enum types with labels in sort order.
    pub const ENUMS_QUERY: &str = r#"
SELECT
    t.typname AS name,
    array_agg(e.enumlabel ORDER BY e.enumsortorder) AS labels
FROM pg_type t
JOIN pg_enum e ON t.oid = e.enumtypid
JOIN pg_namespace n ON n.oid = t.typnamespace
WHERE n.nspname = $1
GROUP BY t.typname
ORDER BY t.typname
"#;

    /// The connection's current schema, used when no namespace is given.
    pub const CURRENT_SCHEMA_QUERY: &str = "SELECT current_schema()::text";
}

// =============================================================================
// Processing functions
// =============================================================================

/// Lower a raw column row into the shared model.
///
/// Identity columns (declared identity or serial-style `nextval` default)
/// get the identity flag and no explicit default; other defaults are
/// normalized for comparison.
pub fn process_column(raw: &RawColumnInfo) -> ReflectResult<Column> {
    let ty = column_type_from_catalog(&raw.data_type, &raw.udt_name, raw.char_max_length)
        .ok_or_else(|| {
            ReflectError::for_column(
                &raw.table,
                &raw.name,
                format!("cannot canonicalize catalog type '{}'", raw.data_type),
            )
        })?;

    let serial = raw.default.as_deref().is_some_and(is_serial_default);
    let identity = raw.is_identity || serial;
    let default = if identity {
        None
    } else {
        raw.default.as_deref().map(normalize_default)
    };

    Ok(Column {
        name: raw.name.clone(),
        ty,
        nullable: raw.nullable,
        default,
        identity,
    })
}

/// Lower a raw foreign key row. Multi-column foreign keys are outside the
/// model and fail rather than being silently mis-shaped.
pub fn process_foreign_key(raw: &RawForeignKeyInfo) -> ReflectResult<ForeignKey> {
    if raw.columns.len() != 1 || raw.columns_to.len() != 1 {
        return Err(ReflectError::for_table(
            &raw.table,
            format!(
                "foreign key '{}' spans {} columns; only single-column keys are supported",
                raw.name,
                raw.columns.len()
            ),
        ));
    }
    Ok(ForeignKey {
        name: Some(raw.name.clone()),
        column: raw.columns[0].clone(),
        foreign_table: raw.table_to.clone(),
        foreign_column: raw.columns_to[0].clone(),
    })
}

/// Merge unique constraints and standalone unique indexes into one set,
/// deduplicated by the ordered column tuple.
pub fn merge_uniques(
    constraints: &[RawConstraintInfo],
    unique_indexes: &[RawIndexInfo],
) -> BTreeMap<String, Vec<UniqueConstraint>> {
    let mut by_table: BTreeMap<String, Vec<UniqueConstraint>> = BTreeMap::new();
    let mut seen: BTreeSet<(String, Vec<String>)> = BTreeSet::new();

    for c in constraints {
        if seen.insert((c.table.clone(), c.columns.clone())) {
            by_table.entry(c.table.clone()).or_default().push(UniqueConstraint {
                name: Some(c.name.clone()),
                columns: c.columns.clone(),
            });
        }
    }
    for i in unique_indexes {
        if seen.insert((i.table.clone(), i.columns.clone())) {
            by_table.entry(i.table.clone()).or_default().push(UniqueConstraint {
                name: Some(i.name.clone()),
                columns: i.columns.clone(),
            });
        }
    }
    by_table
}

// =============================================================================
// Reflection driver
// =============================================================================

fn query_failed(query: &str, err: tokio_postgres::Error) -> ReflectError {
    ReflectError::new(format!("catalog query for {} failed: {}", query, err))
}

/// Resolve the working namespace from the connection when the caller did
/// not name one.
pub async fn current_schema(client: &Client) -> ReflectResult<String> {
    let row = client
        .query_one(queries::CURRENT_SCHEMA_QUERY, &[])
        .await
        .map_err(|e| query_failed("current schema", e))?;
    Ok(row.get(0))
}

/// Reflect the live schema of `namespace`.
pub async fn reflect_schema(client: &Client, namespace: &str) -> ReflectResult<Schema> {
    let table_rows = client
        .query(queries::TABLES_QUERY, &[&namespace])
        .await
        .map_err(|e| query_failed("tables", e))?;
    let table_names: Vec<String> = table_rows
        .iter()
        .map(|row| row.get::<_, String>(0))
        .filter(|name| name != BOOKKEEPING_TABLE)
        .collect();

    let column_rows = client
        .query(queries::COLUMNS_QUERY, &[&namespace])
        .await
        .map_err(|e| query_failed("columns", e))?;
    let raw_columns: Vec<RawColumnInfo> = column_rows
        .iter()
        .map(|row| RawColumnInfo {
            table: row.get(0),
            name: row.get(1),
            data_type: row.get(2),
            udt_name: row.get(3),
            char_max_length: row.get(4),
            nullable: row.get(5),
            default: row.get(6),
            is_identity: row.get(7),
        })
        .collect();

    let pk_rows = client
        .query(queries::PRIMARY_KEYS_QUERY, &[&namespace])
        .await
        .map_err(|e| query_failed("primary keys", e))?;
    let raw_pks: Vec<RawConstraintInfo> = pk_rows
        .iter()
        .map(|row| RawConstraintInfo {
            table: row.get(0),
            name: row.get(1),
            columns: row.get(2),
        })
        .collect();

    let unique_rows = client
        .query(queries::UNIQUES_QUERY, &[&namespace])
        .await
        .map_err(|e| query_failed("unique constraints", e))?;
    let raw_uniques: Vec<RawConstraintInfo> = unique_rows
        .iter()
        .map(|row| RawConstraintInfo {
            table: row.get(0),
            name: row.get(1),
            columns: row.get(2),
        })
        .collect();

    let unique_index_rows = client
        .query(queries::UNIQUE_INDEXES_QUERY, &[&namespace])
        .await
        .map_err(|e| query_failed("unique indexes", e))?;
    let raw_unique_indexes: Vec<RawIndexInfo> = unique_index_rows
        .iter()
        .map(|row| RawIndexInfo {
            table: row.get(0),
            name: row.get(1),
            columns: row.get(2),
        })
        .collect();

    let index_rows = client
        .query(queries::INDEXES_QUERY, &[&namespace])
        .await
        .map_err(|e| query_failed("indexes", e))?;
    let raw_indexes: Vec<RawIndexInfo> = index_rows
        .iter()
        .map(|row| RawIndexInfo {
            table: row.get(0),
            name: row.get(1),
            columns: row.get(2),
        })
        .collect();

    let fk_rows = client
        .query(queries::FOREIGN_KEYS_QUERY, &[&namespace])
        .await
        .map_err(|e| query_failed("foreign keys", e))?;
    let raw_fks: Vec<RawForeignKeyInfo> = fk_rows
        .iter()
        .map(|row| RawForeignKeyInfo {
            table: row.get(0),
            name: row.get(1),
            columns: row.get(2),
            table_to: row.get(3),
            columns_to: row.get(4),
        })
        .collect();

    let enum_rows = client
        .query(queries::ENUMS_QUERY, &[&namespace])
        .await
        .map_err(|e| query_failed("enum types", e))?;
    let raw_enums: Vec<RawEnumInfo> = enum_rows
        .iter()
        .map(|row| RawEnumInfo {
            name: row.get(0),
            labels: row.get(1),
        })
        .collect();

    assemble_schema(
        &table_names,
        &raw_columns,
        &raw_pks,
        &raw_uniques,
        &raw_unique_indexes,
        &raw_indexes,
        &raw_fks,
        &raw_enums,
    )
}

/// Assemble processed raw rows into a [`Schema`]. Split from the query
/// driver so it can be exercised without a live database.
#[allow(clippy::too_many_arguments)]
pub fn assemble_schema(
    table_names: &[String],
    raw_columns: &[RawColumnInfo],
    raw_pks: &[RawConstraintInfo],
    raw_uniques: &[RawConstraintInfo],
    raw_unique_indexes: &[RawIndexInfo],
    raw_indexes: &[RawIndexInfo],
    raw_fks: &[RawForeignKeyInfo],
    raw_enums: &[RawEnumInfo],
) -> ReflectResult<Schema> {
    let mut schema = Schema::new();
    let mut uniques_by_table = merge_uniques(raw_uniques, raw_unique_indexes);

    for name in table_names {
        schema.add_table(Table::new(name.clone()));
    }

    for raw in raw_columns {
        if let Some(table) = schema.tables.get_mut(&raw.table) {
            table.columns.push(process_column(raw)?);
        }
    }

    for raw in raw_pks {
        if let Some(table) = schema.tables.get_mut(&raw.table) {
            table.primary_key = PrimaryKey {
                name: Some(raw.name.clone()),
                columns: raw.columns.clone(),
            };
        }
    }

    for (table_name, uniques) in uniques_by_table.iter_mut() {
        if let Some(table) = schema.tables.get_mut(table_name) {
            table.uniques.append(uniques);
        }
    }

    for raw in raw_indexes {
        if let Some(table) = schema.tables.get_mut(&raw.table) {
            table.indexes.push(Index {
                name: Some(raw.name.clone()),
                columns: raw.columns.clone(),
            });
        }
    }

    for raw in raw_fks {
        if let Some(table) = schema.tables.get_mut(&raw.table) {
            let fk = process_foreign_key(raw)?;
            table.foreign_keys.push(fk);
        }
    }

    for raw in raw_enums {
        schema.add_enum(EnumType {
            name: raw.name.clone(),
            labels: raw.labels.clone(),
        });
    }

    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::ColumnType;

    #[test]
    fn test_process_column_serial_becomes_identity() {
        let raw = RawColumnInfo {
            table: "users".to_string(),
            name: "id".to_string(),
            data_type: "integer".to_string(),
            udt_name: "int4".to_string(),
            char_max_length: None,
            nullable: false,
            default: Some("nextval('users_id_seq'::regclass)".to_string()),
            is_identity: false,
        };
        let col = process_column(&raw).unwrap();
        assert!(col.identity);
        assert_eq!(col.default, None);
        assert_eq!(col.ty, ColumnType::Integer);
    }

    #[test]
    fn test_process_column_normalizes_default() {
        let raw = RawColumnInfo {
            table: "users".to_string(),
            name: "email".to_string(),
            data_type: "character varying".to_string(),
            udt_name: "varchar".to_string(),
            char_max_length: Some(255),
            nullable: false,
            default: Some("'nobody'::character varying".to_string()),
            is_identity: false,
        };
        let col = process_column(&raw).unwrap();
        assert_eq!(col.default.as_deref(), Some("'nobody'"));
        assert_eq!(col.ty, ColumnType::VarChar(255));
    }

    #[test]
    fn test_process_column_rejects_unknown_type() {
        let raw = RawColumnInfo {
            table: "users".to_string(),
            name: "balance".to_string(),
            data_type: "numeric".to_string(),
            udt_name: "numeric".to_string(),
            char_max_length: None,
            nullable: true,
            default: None,
            is_identity: false,
        };
        let err = process_column(&raw).unwrap_err();
        assert_eq!(err.table.as_deref(), Some("users"));
        assert_eq!(err.column.as_deref(), Some("balance"));
    }

    #[test]
    fn test_process_foreign_key_rejects_composite() {
        let raw = RawForeignKeyInfo {
            table: "posts".to_string(),
            name: "posts_pair_fkey".to_string(),
            columns: vec!["a".to_string(), "b".to_string()],
            table_to: "users".to_string(),
            columns_to: vec!["a".to_string(), "b".to_string()],
        };
        assert!(process_foreign_key(&raw).is_err());
    }

    #[test]
    fn test_merge_uniques_deduplicates_by_column_tuple() {
        let constraints = vec![RawConstraintInfo {
            table: "users".to_string(),
            name: "users_email_key".to_string(),
            columns: vec!["email".to_string()],
        }];
        let indexes = vec![
            RawIndexInfo {
                table: "users".to_string(),
                name: "ix_users_email".to_string(),
                columns: vec!["email".to_string()],
            },
            RawIndexInfo {
                table: "users".to_string(),
                name: "ix_users_handle".to_string(),
                columns: vec!["handle".to_string()],
            },
        ];

        let merged = merge_uniques(&constraints, &indexes);
        let users = &merged["users"];
        assert_eq!(users.len(), 2);
        // The constraint wins over the same-tuple index.
        assert_eq!(users[0].name.as_deref(), Some("users_email_key"));
    }

    #[test]
    fn test_assemble_excludes_bookkeeping_table() {
        let tables = vec!["users".to_string()];
        let schema = assemble_schema(&tables, &[], &[], &[], &[], &[], &[], &[]).unwrap();
        assert!(schema.tables.contains_key("users"));
        assert!(!schema.tables.contains_key(BOOKKEEPING_TABLE));
    }
}
