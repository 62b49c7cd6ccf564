//! DDL emission: render each [`DdlStep`] as PostgreSQL SQL.
//!
//! Identifiers are always quoted and table/type references are qualified
//! with the working namespace. Constraint names reflected from the catalog
//! are reused for drops; adds fall back to the default naming conventions.

use crate::ddl::{Column, ColumnType, ForeignKey, Table};
use crate::grammar::{
    canonical_type, default_name_for_fk, default_name_for_index, default_name_for_pk,
    default_name_for_unique, qualified, quote_ident, quote_literal,
};
use crate::plan::{DdlStep, Plan};

/// Renders plan steps against one working namespace.
pub struct SqlRenderer<'a> {
    namespace: &'a str,
}

impl<'a> SqlRenderer<'a> {
    pub fn new(namespace: &'a str) -> Self {
        Self { namespace }
    }

    /// Render every step of a plan, in order.
    pub fn render_plan(&self, plan: &Plan) -> Vec<String> {
        plan.steps.iter().map(|step| self.render(step)).collect()
    }

    pub fn render(&self, step: &DdlStep) -> String {
        match step {
            DdlStep::CreateEnum(e) => {
                let labels = e
                    .labels
                    .iter()
                    .map(|l| quote_literal(l))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "CREATE TYPE {} AS ENUM ({});",
                    qualified(self.namespace, &e.name),
                    labels
                )
            }
            DdlStep::AddEnumValues { name, labels } => labels
                .iter()
                .map(|label| {
                    format!(
                        "ALTER TYPE {} ADD VALUE {};",
                        qualified(self.namespace, name),
                        quote_literal(label)
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            DdlStep::DropEnum { name } => {
                format!("DROP TYPE {};", qualified(self.namespace, name))
            }
            DdlStep::CreateTable(table) => self.create_table(table),
            DdlStep::DropTable { table } => {
                format!("DROP TABLE {};", self.table_ref(table))
            }
            DdlStep::AddColumn { table, column } => {
                format!(
                    "ALTER TABLE {} ADD COLUMN {};",
                    self.table_ref(table),
                    self.column_def(column)
                )
            }
            DdlStep::DropColumn { table, column } => {
                format!(
                    "ALTER TABLE {} DROP COLUMN {};",
                    self.table_ref(table),
                    quote_ident(column)
                )
            }
            DdlStep::AlterColumnType { table, column, ty } => {
                format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DATA TYPE {};",
                    self.table_ref(table),
                    quote_ident(column),
                    self.type_def(ty)
                )
            }
            DdlStep::AlterColumnNullable {
                table,
                column,
                nullable,
            } => {
                let action = if *nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
                format!(
                    "ALTER TABLE {} ALTER COLUMN {} {};",
                    self.table_ref(table),
                    quote_ident(column),
                    action
                )
            }
            DdlStep::AlterColumnDefault {
                table,
                column,
                default,
            } => match default {
                Some(expr) => format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {};",
                    self.table_ref(table),
                    quote_ident(column),
                    expr
                ),
                None => format!(
                    "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT;",
                    self.table_ref(table),
                    quote_ident(column)
                ),
            },
            DdlStep::DropPrimaryKey { table, pk } => {
                let name = pk
                    .name
                    .clone()
                    .unwrap_or_else(|| default_name_for_pk(table));
                format!(
                    "ALTER TABLE {} DROP CONSTRAINT {};",
                    self.table_ref(table),
                    quote_ident(&name)
                )
            }
            DdlStep::AddPrimaryKey { table, pk } => {
                format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY({});",
                    self.table_ref(table),
                    quote_ident(&default_name_for_pk(table)),
                    column_list(&pk.columns)
                )
            }
            DdlStep::AddUnique { table, unique } => {
                let name = unique
                    .name
                    .clone()
                    .unwrap_or_else(|| default_name_for_unique(table, &unique.columns));
                format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE({});",
                    self.table_ref(table),
                    quote_ident(&name),
                    column_list(&unique.columns)
                )
            }
            DdlStep::DropUnique { table, unique } => {
                let name = unique
                    .name
                    .clone()
                    .unwrap_or_else(|| default_name_for_unique(table, &unique.columns));
                format!(
                    "ALTER TABLE {} DROP CONSTRAINT {};",
                    self.table_ref(table),
                    quote_ident(&name)
                )
            }
            DdlStep::CreateIndex { table, index } => {
                let name = index
                    .name
                    .clone()
                    .unwrap_or_else(|| default_name_for_index(table, &index.columns));
                format!(
                    "CREATE INDEX {} ON {} USING btree ({});",
                    quote_ident(&name),
                    self.table_ref(table),
                    column_list(&index.columns)
                )
            }
            DdlStep::DropIndex { table, index } => {
                let name = index
                    .name
                    .clone()
                    .unwrap_or_else(|| default_name_for_index(table, &index.columns));
                format!("DROP INDEX {};", qualified(self.namespace, &name))
            }
            DdlStep::AddForeignKey { table, fk } => {
                format!(
                    "ALTER TABLE {} ADD {};",
                    self.table_ref(table),
                    self.fk_def(table, fk)
                )
            }
            DdlStep::DropForeignKey { table, fk } => {
                let name = fk
                    .name
                    .clone()
                    .unwrap_or_else(|| default_name_for_fk(table, &fk.column));
                format!(
                    "ALTER TABLE {} DROP CONSTRAINT {};",
                    self.table_ref(table),
                    quote_ident(&name)
                )
            }
        }
    }

    fn table_ref(&self, table: &str) -> String {
        qualified(self.namespace, table)
    }

    fn type_def(&self, ty: &ColumnType) -> String {
        match ty {
            // Enum types live in the working namespace.
            ColumnType::Enum(name) => qualified(self.namespace, name),
            _ => canonical_type(ty),
        }
    }

    fn column_def(&self, column: &Column) -> String {
        let mut def = format!("{} {}", quote_ident(&column.name), self.type_def(&column.ty));
        if !column.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            def.push_str(&format!(" DEFAULT {}", default));
        }
        if column.identity {
            def.push_str(" GENERATED BY DEFAULT AS IDENTITY");
        }
        def
    }

    fn fk_def(&self, table: &str, fk: &ForeignKey) -> String {
        let name = fk
            .name
            .clone()
            .unwrap_or_else(|| default_name_for_fk(table, &fk.column));
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({})",
            quote_ident(&name),
            quote_ident(&fk.column),
            qualified(self.namespace, &fk.foreign_table),
            quote_ident(&fk.foreign_column)
        )
    }

    fn create_table(&self, table: &Table) -> String {
        let mut lines = Vec::new();

        for column in &table.columns {
            lines.push(format!("\t{}", self.column_def(column)));
        }

        if !table.primary_key.is_empty() {
            lines.push(format!(
                "\tCONSTRAINT {} PRIMARY KEY({})",
                quote_ident(&default_name_for_pk(&table.name)),
                column_list(&table.primary_key.columns)
            ));
        }

        for unique in &table.uniques {
            let name = unique
                .name
                .clone()
                .unwrap_or_else(|| default_name_for_unique(&table.name, &unique.columns));
            lines.push(format!(
                "\tCONSTRAINT {} UNIQUE({})",
                quote_ident(&name),
                column_list(&unique.columns)
            ));
        }

        format!(
            "CREATE TABLE {} (\n{}\n);",
            self.table_ref(&table.name),
            lines.join(",\n")
        )
    }
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::{EnumType, Index, PrimaryKey, UniqueConstraint};

    fn renderer() -> SqlRenderer<'static> {
        SqlRenderer::new("public")
    }

    #[test]
    fn test_create_enum() {
        let sql = renderer().render(&DdlStep::CreateEnum(EnumType {
            name: "status".to_string(),
            labels: vec!["active".to_string(), "it's".to_string()],
        }));
        assert_eq!(
            sql,
            "CREATE TYPE \"public\".\"status\" AS ENUM ('active', 'it''s');"
        );
    }

    #[test]
    fn test_add_enum_values_one_statement_per_label() {
        let sql = renderer().render(&DdlStep::AddEnumValues {
            name: "status".to_string(),
            labels: vec!["completed".to_string(), "archived".to_string()],
        });
        assert_eq!(
            sql,
            "ALTER TYPE \"public\".\"status\" ADD VALUE 'completed';\n\
             ALTER TYPE \"public\".\"status\" ADD VALUE 'archived';"
        );
    }

    #[test]
    fn test_create_table_with_pk_and_unique() {
        let mut table = Table::new("users");
        table.columns.push(Column {
            name: "id".to_string(),
            ty: ColumnType::Integer,
            nullable: false,
            default: None,
            identity: true,
        });
        table.columns.push(Column {
            name: "email".to_string(),
            ty: ColumnType::VarChar(255),
            nullable: false,
            default: None,
            identity: false,
        });
        table.primary_key = PrimaryKey {
            name: None,
            columns: vec!["id".to_string()],
        };
        table.uniques.push(UniqueConstraint {
            name: None,
            columns: vec!["email".to_string()],
        });

        let sql = renderer().render(&DdlStep::CreateTable(table));
        assert_eq!(
            sql,
            "CREATE TABLE \"public\".\"users\" (\n\
             \t\"id\" integer NOT NULL GENERATED BY DEFAULT AS IDENTITY,\n\
             \t\"email\" character varying(255) NOT NULL,\n\
             \tCONSTRAINT \"users_pkey\" PRIMARY KEY(\"id\"),\n\
             \tCONSTRAINT \"users_email_key\" UNIQUE(\"email\")\n\
             );"
        );
    }

    #[test]
    fn test_add_column_with_default() {
        let sql = renderer().render(&DdlStep::AddColumn {
            table: "users".to_string(),
            column: Column {
                name: "is_active".to_string(),
                ty: ColumnType::Boolean,
                nullable: true,
                default: Some("true".to_string()),
                identity: false,
            },
        });
        assert_eq!(
            sql,
            "ALTER TABLE \"public\".\"users\" ADD COLUMN \"is_active\" boolean DEFAULT true;"
        );
    }

    #[test]
    fn test_alter_column_type_to_enum_is_qualified() {
        let sql = renderer().render(&DdlStep::AlterColumnType {
            table: "tasks".to_string(),
            column: "status".to_string(),
            ty: ColumnType::Enum("status".to_string()),
        });
        assert_eq!(
            sql,
            "ALTER TABLE \"public\".\"tasks\" ALTER COLUMN \"status\" SET DATA TYPE \"public\".\"status\";"
        );
    }

    #[test]
    fn test_nullability_and_default_alters() {
        let set_not_null = renderer().render(&DdlStep::AlterColumnNullable {
            table: "users".to_string(),
            column: "email".to_string(),
            nullable: false,
        });
        assert_eq!(
            set_not_null,
            "ALTER TABLE \"public\".\"users\" ALTER COLUMN \"email\" SET NOT NULL;"
        );

        let drop_default = renderer().render(&DdlStep::AlterColumnDefault {
            table: "users".to_string(),
            column: "email".to_string(),
            default: None,
        });
        assert_eq!(
            drop_default,
            "ALTER TABLE \"public\".\"users\" ALTER COLUMN \"email\" DROP DEFAULT;"
        );
    }

    #[test]
    fn test_foreign_key_statements() {
        let add = renderer().render(&DdlStep::AddForeignKey {
            table: "posts".to_string(),
            fk: ForeignKey {
                name: None,
                column: "user_id".to_string(),
                foreign_table: "users".to_string(),
                foreign_column: "id".to_string(),
            },
        });
        assert_eq!(
            add,
            "ALTER TABLE \"public\".\"posts\" ADD CONSTRAINT \"posts_user_id_fkey\" \
             FOREIGN KEY (\"user_id\") REFERENCES \"public\".\"users\"(\"id\");"
        );

        let drop = renderer().render(&DdlStep::DropForeignKey {
            table: "posts".to_string(),
            fk: ForeignKey {
                name: Some("posts_user_id_fkey".to_string()),
                column: "user_id".to_string(),
                foreign_table: "users".to_string(),
                foreign_column: "id".to_string(),
            },
        });
        assert_eq!(
            drop,
            "ALTER TABLE \"public\".\"posts\" DROP CONSTRAINT \"posts_user_id_fkey\";"
        );
    }

    #[test]
    fn test_index_statements_reuse_reflected_name() {
        let create = renderer().render(&DdlStep::CreateIndex {
            table: "users".to_string(),
            index: Index {
                name: None,
                columns: vec!["email".to_string()],
            },
        });
        assert_eq!(
            create,
            "CREATE INDEX \"users_email_idx\" ON \"public\".\"users\" USING btree (\"email\");"
        );

        let drop = renderer().render(&DdlStep::DropIndex {
            table: "users".to_string(),
            index: Index {
                name: Some("ix_users_email".to_string()),
                columns: vec!["email".to_string()],
            },
        });
        assert_eq!(drop, "DROP INDEX \"public\".\"ix_users_email\";");
    }

    #[test]
    fn test_primary_key_statements() {
        let drop = renderer().render(&DdlStep::DropPrimaryKey {
            table: "user_roles".to_string(),
            pk: PrimaryKey {
                name: Some("user_roles_pkey".to_string()),
                columns: vec!["id".to_string()],
            },
        });
        assert_eq!(
            drop,
            "ALTER TABLE \"public\".\"user_roles\" DROP CONSTRAINT \"user_roles_pkey\";"
        );

        let add = renderer().render(&DdlStep::AddPrimaryKey {
            table: "user_roles".to_string(),
            pk: PrimaryKey {
                name: None,
                columns: vec!["user_id".to_string(), "role_id".to_string()],
            },
        });
        assert_eq!(
            add,
            "ALTER TABLE \"public\".\"user_roles\" ADD CONSTRAINT \"user_roles_pkey\" \
             PRIMARY KEY(\"user_id\", \"role_id\");"
        );
    }
}
