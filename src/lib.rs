//! schemasync - declarative schema synchronization for PostgreSQL
//!
//! Given a declarative description of the target schema, the engine
//! inspects the live database, computes the minimal set of structural
//! changes needed to make the database match, and applies them inside a
//! single transaction in a dependency-aware order. It is designed to run
//! on every application startup: a converged database produces an empty
//! plan and no DDL.
//!
//! # Pipeline
//!
//! 1. **Reflect** the live catalog into a [`Schema`] ([`reflect`])
//! 2. **Compile** the caller's [`SchemaModel`] into a [`Schema`] ([`model`])
//! 3. **Diff** live vs. desired ([`diff`])
//! 4. **Plan** the edits in dependency order ([`plan`])
//! 5. **Execute** the plan transactionally ([`execute`])
//!
//! # Example
//!
//! ```ignore
//! use schemasync::{ColumnDef, ColumnType, SchemaModel, Synchronizer, TableDef};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), schemasync::SyncError> {
//!     let mut model = SchemaModel::new();
//!     model.enum_type("status", ["active", "inactive", "pending"]);
//!     model.table(
//!         TableDef::new("users")
//!             .column(ColumnDef::new("id", ColumnType::Integer).primary_key().identity())
//!             .column(ColumnDef::new("email", ColumnType::VarChar(255)).not_null().unique())
//!             .column(ColumnDef::new("name", ColumnType::VarChar(100))),
//!     );
//!
//!     let report = Synchronizer::new(model)
//!         .run_url("host=localhost user=app dbname=app")
//!         .await?;
//!     println!("applied {} statements", report.statements.len());
//!     Ok(())
//! }
//! ```
//!
//! The table `alembic_version` is reserved for external migration tooling
//! and is never dropped or diffed.

pub mod ddl;
pub mod diff;
pub mod error;
pub mod execute;
pub mod grammar;
pub mod model;
pub mod plan;
pub mod reflect;
pub mod statements;

pub use ddl::{
    BOOKKEEPING_TABLE, Column, ColumnType, EnumType, ForeignKey, Index, PrimaryKey, Schema, Table,
    UniqueConstraint,
};
pub use diff::{SchemaDiff, diff_schemas};
pub use error::{SyncError, SyncResult};
pub use model::{ColumnDef, SchemaModel, TableDef};
pub use plan::{DdlStep, Plan};
pub use reflect::{ReflectError, reflect_schema};
pub use statements::SqlRenderer;

use tracing::info;

/// Options controlling a synchronization run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Working namespace. Defaults to the connection's current schema.
    pub namespace: Option<String>,
    /// Multi-tenant widening policy: when set and a table carries this
    /// column, single-column uniques widen into the composite
    /// `(column, tenant_column)`. Disabled by default.
    pub tenant_unique_column: Option<String>,
}

/// Outcome of a run: the DDL statements that were executed, in order.
/// Empty when the database already matched the desired schema.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub statements: Vec<String>,
}

impl SyncReport {
    /// Whether the run found the database already converged.
    pub fn is_noop(&self) -> bool {
        self.statements.is_empty()
    }
}

/// The schema-synchronization engine.
///
/// Owns nothing persistent: connection ownership stays with the caller,
/// and every run recomputes the live schema from the catalog. Running
/// against an already-converged database is a no-op.
pub struct Synchronizer {
    model: SchemaModel,
    options: SyncOptions,
}

impl Synchronizer {
    pub fn new(model: SchemaModel) -> Self {
        Self {
            model,
            options: SyncOptions::default(),
        }
    }

    pub fn with_options(model: SchemaModel, options: SyncOptions) -> Self {
        Self { model, options }
    }

    /// Run the full pipeline on an open connection.
    pub async fn run(&self, client: &mut tokio_postgres::Client) -> SyncResult<SyncReport> {
        let desired = self.compile_desired()?;
        self.run_compiled(&desired, client).await
    }

    /// Connect to `url`, spawn the connection task, and run the pipeline.
    /// The desired model is validated before anything is dialed.
    pub async fn run_url(&self, url: &str) -> SyncResult<SyncReport> {
        let desired = self.compile_desired()?;

        let (mut client, connection) = tokio_postgres::connect(url, tokio_postgres::NoTls)
            .await
            .map_err(SyncError::Connection)?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "connection task failed");
            }
        });

        self.run_compiled(&desired, &mut client).await
    }

    fn compile_desired(&self) -> SyncResult<Schema> {
        self.model
            .compile(self.options.tenant_unique_column.as_deref())
    }

    async fn run_compiled(
        &self,
        desired: &Schema,
        client: &mut tokio_postgres::Client,
    ) -> SyncResult<SyncReport> {
        let namespace = match &self.options.namespace {
            Some(ns) => ns.clone(),
            None => reflect::current_schema(client).await?,
        };

        let live = reflect_schema(client, &namespace).await?;
        info!(
            namespace = %namespace,
            live_tables = live.tables.len(),
            desired_tables = desired.tables.len(),
            "reflected live schema"
        );

        let diff = diff_schemas(&live, desired)?;
        if diff.is_empty() {
            info!("schema already converged, nothing to do");
            return Ok(SyncReport::default());
        }

        let plan = plan::plan(&diff, &live, desired);
        info!(steps = plan.len(), "applying schema changes");

        let statements = execute::apply_plan(client, &plan, &namespace).await?;
        Ok(SyncReport { statements })
    }
}
