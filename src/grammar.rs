//! PostgreSQL grammar helpers: canonical type forms, identifier quoting,
//! and default naming conventions for constraints and indexes.

use crate::ddl::ColumnType;

// =============================================================================
// Identifier and literal quoting
// =============================================================================

/// Double-quote an identifier, escaping embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fully-qualified, quoted `"namespace"."name"` reference.
pub fn qualified(namespace: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(namespace), quote_ident(name))
}

/// Single-quote a string literal, escaping embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

// =============================================================================
// Naming conventions
// =============================================================================

/// Default name for a primary key constraint.
pub fn default_name_for_pk(table: &str) -> String {
    format!("{}_pkey", table)
}

/// Default name for a unique constraint.
pub fn default_name_for_unique(table: &str, columns: &[String]) -> String {
    format!("{}_{}_key", table, columns.join("_"))
}

/// Default name for an index.
pub fn default_name_for_index(table: &str, columns: &[String]) -> String {
    format!("{}_{}_idx", table, columns.join("_"))
}

/// Default name for a foreign key constraint.
pub fn default_name_for_fk(table: &str, column: &str) -> String {
    format!("{}_{}_fkey", table, column)
}

// =============================================================================
// Canonical type forms
// =============================================================================

/// Render the canonical textual form of a column type, used both for DDL
/// emission and for live-vs-desired comparison.
///
/// Enum types render as their bare type name here; DDL emission qualifies
/// them with the working namespace separately.
pub fn canonical_type(ty: &ColumnType) -> String {
    match ty {
        ColumnType::Integer => "integer".to_string(),
        ColumnType::BigInteger => "bigint".to_string(),
        ColumnType::Boolean => "boolean".to_string(),
        ColumnType::Float => "double precision".to_string(),
        ColumnType::Text => "text".to_string(),
        ColumnType::VarChar(n) => format!("character varying({})", n),
        ColumnType::Enum(name) => name.clone(),
    }
}

/// Map an `information_schema.columns` row back to a logical type tag.
///
/// Returns `None` for catalog types outside the supported set; the
/// reflector turns that into an error naming the offending column.
pub fn column_type_from_catalog(
    data_type: &str,
    udt_name: &str,
    char_max_length: Option<i32>,
) -> Option<ColumnType> {
    match data_type {
        "integer" => Some(ColumnType::Integer),
        "bigint" => Some(ColumnType::BigInteger),
        "boolean" => Some(ColumnType::Boolean),
        "double precision" => Some(ColumnType::Float),
        "text" => Some(ColumnType::Text),
        "character varying" => {
            let n = u32::try_from(char_max_length?).ok()?;
            Some(ColumnType::VarChar(n))
        }
        "USER-DEFINED" => Some(ColumnType::Enum(udt_name.to_string())),
        _ => None,
    }
}

// =============================================================================
// Default expression handling
// =============================================================================

/// Detect defaults produced by serial/sequence machinery.
///
/// Serial integer columns present a `nextval('…_seq'::regclass)` default;
/// these mark the column as identity-like and are never compared as
/// explicit defaults.
pub fn is_serial_default(expr: &str) -> bool {
    expr.trim_start().starts_with("nextval(")
}

/// Normalize a reflected default expression for comparison.
///
/// The catalog renders literal defaults with a trailing type cast
/// (`'x'::character varying`, `0::bigint`); the cast suffix is stripped so
/// the value compares equal to the caller's bare literal.
pub fn normalize_default(expr: &str) -> String {
    let trimmed = expr.trim();
    match trimmed.rfind("::") {
        // Only strip when the cast follows the literal, not inside quotes.
        Some(pos) if !trimmed[pos..].contains('\'') => trimmed[..pos].trim().to_string(),
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_canonical_types() {
        assert_eq!(canonical_type(&ColumnType::Integer), "integer");
        assert_eq!(canonical_type(&ColumnType::BigInteger), "bigint");
        assert_eq!(canonical_type(&ColumnType::Float), "double precision");
        assert_eq!(
            canonical_type(&ColumnType::VarChar(255)),
            "character varying(255)"
        );
        assert_eq!(
            canonical_type(&ColumnType::Enum("status".to_string())),
            "status"
        );
    }

    #[test]
    fn test_catalog_type_round_trip() {
        assert_eq!(
            column_type_from_catalog("integer", "int4", None),
            Some(ColumnType::Integer)
        );
        assert_eq!(
            column_type_from_catalog("character varying", "varchar", Some(100)),
            Some(ColumnType::VarChar(100))
        );
        assert_eq!(
            column_type_from_catalog("USER-DEFINED", "status", None),
            Some(ColumnType::Enum("status".to_string()))
        );
        assert_eq!(column_type_from_catalog("numeric", "numeric", None), None);
        // varchar without a length limit is not representable
        assert_eq!(
            column_type_from_catalog("character varying", "varchar", None),
            None
        );
    }

    #[test]
    fn test_serial_default_detection() {
        assert!(is_serial_default("nextval('users_id_seq'::regclass)"));
        assert!(!is_serial_default("'pending'::status"));
    }

    #[test]
    fn test_normalize_default_strips_cast() {
        assert_eq!(
            normalize_default("'default@example.com'::character varying"),
            "'default@example.com'"
        );
        assert_eq!(normalize_default("true"), "true");
        assert_eq!(normalize_default("0::bigint"), "0");
        // cast inside the literal is left alone
        assert_eq!(normalize_default("'a::b'"), "'a::b'");
    }

    #[test]
    fn test_default_constraint_names() {
        assert_eq!(default_name_for_pk("users"), "users_pkey");
        assert_eq!(
            default_name_for_unique("users", &["email".to_string()]),
            "users_email_key"
        );
        assert_eq!(
            default_name_for_index("users", &["email".to_string(), "name".to_string()]),
            "users_email_name_idx"
        );
        assert_eq!(default_name_for_fk("posts", "user_id"), "posts_user_id_fkey");
    }
}
