//! API-surface tests that do not need a reachable database.

use schemasync::{ColumnDef, ColumnType, SchemaModel, SyncError, SyncOptions, Synchronizer, TableDef};

#[tokio::test]
async fn test_run_url_surfaces_connection_error() {
    let model = SchemaModel::new();
    let err = Synchronizer::new(model)
        .run_url("host=127.0.0.1 port=1 user=nobody dbname=nothing connect_timeout=1")
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Connection(_)));
}

#[tokio::test]
async fn test_inconsistent_model_fails_before_connecting() {
    let mut model = SchemaModel::new();
    model.table(
        TableDef::new("posts")
            .column(ColumnDef::new("id", ColumnType::Integer).primary_key())
            .column(ColumnDef::new("user_id", ColumnType::Integer))
            .foreign_key("user_id", "users", "id"),
    );

    // The URL is unreachable; a compilation failure must surface anyway,
    // proving validation happens before any I/O.
    let sync = Synchronizer::with_options(model, SyncOptions::default());
    let err = sync
        .run_url("host=127.0.0.1 port=1 user=nobody dbname=nothing connect_timeout=1")
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Compilation(_)));
}
