//! Shared schema model used by the reflector, the desired-schema compiler,
//! and the differ.
//!
//! Identity is by name throughout: tables and enums by their name, columns
//! by name within a table, unique constraints and indexes by their ordered
//! column tuple, foreign keys by their local column. Constraint `name`
//! fields are carried metadata (the live catalog name, needed to emit
//! `DROP CONSTRAINT`) and never take part in identity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The migration-bookkeeping table reserved for external tooling. It is
/// invisible to the engine and never dropped.
pub const BOOKKEEPING_TABLE: &str = "alembic_version";

/// Logical column type tags, an abstraction over SQL types.
///
/// The tag plus its parameters is sufficient to produce the canonical SQL
/// form used for comparison (see [`crate::grammar::canonical_type`]).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ColumnType {
    Integer,
    BigInteger,
    Boolean,
    Float,
    Text,
    VarChar(u32),
    Enum(String),
}

impl ColumnType {
    /// The enum type name, if this is an enum column.
    pub fn enum_name(&self) -> Option<&str> {
        match self {
            ColumnType::Enum(name) => Some(name),
            _ => None,
        }
    }
}

/// A table column.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    pub nullable: bool,
    /// Explicit default as a rendered SQL expression. Identity-generated
    /// defaults are never stored here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub identity: bool,
}

/// A primary key. An empty column list means no declared key.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKey {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
}

impl PrimaryKey {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A unique constraint over an ordered column tuple. Single-column uniques
/// are composites of length one.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UniqueConstraint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// A plain (non-unique) index. Primary-key and unique-constraint indexes
/// are not members of this set.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// A single-column foreign key. Identity is the local column: a table has
/// at most one foreign key per local column.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

impl ForeignKey {
    /// Whether both keys point at the same target `table.column`.
    pub fn same_target(&self, other: &ForeignKey) -> bool {
        self.foreign_table == other.foreign_table && self.foreign_column == other.foreign_column
    }
}

/// A user-defined enumerated type. Labels are unique and ordered.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnumType {
    pub name: String,
    pub labels: Vec<String>,
}

/// A table with its columns and constraints.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: PrimaryKey,
    pub uniques: Vec<UniqueConstraint>,
    pub indexes: Vec<Index>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: PrimaryKey::default(),
            uniques: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a foreign key by its local column.
    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|f| f.column == column)
    }
}

/// A full schema: tables and enum types keyed by name.
///
/// Both the reflected live schema and the compiled desired schema use this
/// representation, so the differ compares like with like.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub tables: BTreeMap<String, Table>,
    pub enums: BTreeMap<String, EnumType>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn add_enum(&mut self, enum_type: EnumType) {
        self.enums.insert(enum_type.name.clone(), enum_type);
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.enums.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_table() -> Table {
        let mut table = Table::new("users");
        table.columns.push(Column {
            name: "id".to_string(),
            ty: ColumnType::Integer,
            nullable: false,
            default: None,
            identity: true,
        });
        table.primary_key = PrimaryKey {
            name: None,
            columns: vec!["id".to_string()],
        };
        table
    }

    #[test]
    fn test_schema_json_round_trip() {
        let mut schema = Schema::new();
        schema.add_table(users_table());
        schema.add_enum(EnumType {
            name: "status".to_string(),
            labels: vec!["active".to_string(), "inactive".to_string()],
        });

        let json = schema.to_json().unwrap();
        let parsed = Schema::from_json(&json).unwrap();
        assert_eq!(parsed, schema);
    }

    #[test]
    fn test_table_lookups() {
        let table = users_table();
        assert!(table.column("id").is_some());
        assert!(table.column("missing").is_none());
        assert!(table.foreign_key("id").is_none());
    }
}
