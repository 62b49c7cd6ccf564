//! Plan execution: one transaction, statement by statement, rollback on
//! any failure.

use crate::error::{SyncError, SyncResult};
use crate::plan::Plan;
use crate::statements::SqlRenderer;
use tokio_postgres::Client;
use tracing::debug;

/// Apply `plan` inside a single transaction.
///
/// Each statement failure aborts the run: the error carries the statement
/// text and the edit it was applying, and dropping the unfinished
/// transaction rolls everything back. Returns the executed statements.
pub async fn apply_plan(
    client: &mut Client,
    plan: &Plan,
    namespace: &str,
) -> SyncResult<Vec<String>> {
    let renderer = SqlRenderer::new(namespace);

    let tx = client.transaction().await.map_err(SyncError::Connection)?;

    let mut executed = Vec::with_capacity(plan.len());
    for step in &plan.steps {
        let sql = renderer.render(step);
        debug!(statement = %sql, "executing");
        tx.batch_execute(&sql).await.map_err(|e| SyncError::Execution {
            statement: sql.clone(),
            edit: step.to_string(),
            source: e,
        })?;
        executed.push(sql);
    }

    tx.commit().await.map_err(|e| SyncError::Execution {
        statement: "COMMIT".to_string(),
        edit: "commit transaction".to_string(),
        source: e,
    })?;

    Ok(executed)
}
