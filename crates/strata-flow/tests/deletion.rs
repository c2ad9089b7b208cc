//! Deletion invariants and teardown dispatch.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use serde_json::json;

use common::{Harness, vector_options};
use strata_flow::error::Error;
use strata_flow::model::{AssetType, ChangeLogEntry, Status};
use strata_flow::orchestrator::NewVersion;
use strata_flow::store::Store;

async fn latest_with_sibling(h: &Harness) {
    h.dataset("d").await;
    let (_, handle) = h
        .orchestrator
        .create_version(NewVersion::new("d", "v1", "vector", vector_options(&["a"], json!([]))).latest())
        .await
        .unwrap();
    handle.wait().await.unwrap();
    h.vector_version("d", "v2", vector_options(&["a"], json!([]))).await;
}

#[tokio::test]
async fn latest_version_with_siblings_cannot_be_deleted() {
    let h = Harness::new();
    latest_with_sibling(&h).await;

    let err = h.orchestrator.delete_version("d", "v1").await.unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
    assert_eq!(err.status_code(), 409);
    assert!(h.database.dropped().unwrap().is_empty());

    let (_, teardown) = h.orchestrator.delete_version("d", "v2").await.unwrap();
    teardown.wait().await.unwrap();
    let (deleted, teardown) = h.orchestrator.delete_version("d", "v1").await.unwrap();
    teardown.wait().await.unwrap();
    assert!(deleted.is_latest);
    assert!(h.store.list_versions("d").await.unwrap().is_empty());
    assert_eq!(h.store.task_count().unwrap(), 0);
}

#[tokio::test]
async fn default_asset_cannot_be_deleted_in_any_status() {
    let h = Harness::new();
    h.dataset("d").await;
    let asset = h.vector_version("d", "v1", vector_options(&["a"], json!([]))).await;

    let err = h.orchestrator.delete_asset(&asset.asset_id).await.unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));

    let task_id = h.task_ids(&asset).await.remove(0);
    h.orchestrator
        .report_task_completion(&task_id, ChangeLogEntry::failed("boom"))
        .await
        .unwrap();
    assert_eq!(h.asset(&asset).await.status, Status::Failed);
    let err = h.orchestrator.delete_asset(&asset.asset_id).await.unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
}

#[tokio::test]
async fn dataset_with_versions_cannot_be_deleted() {
    let h = Harness::new();
    h.dataset("d").await;
    h.vector_version("d", "v1", vector_options(&["a"], json!([]))).await;

    let err = h.orchestrator.delete_dataset("d").await.unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));

    let (_, teardown) = h.orchestrator.delete_version("d", "v1").await.unwrap();
    teardown.wait().await.unwrap();
    h.orchestrator.delete_dataset("d").await.unwrap();
    assert_eq!(
        h.orchestrator.delete_dataset("d").await.unwrap_err().status_code(),
        404
    );
}

#[tokio::test]
async fn version_teardown_clears_table_objects_and_cdn() {
    let h = Harness::new();
    h.dataset("d").await;
    h.table("d", "v1");
    h.objects.put("strata-data-lake", "d/v1/raw/a.gpkg").unwrap();
    h.objects.put("strata-tile-cache", "d/v1/default/0/0/0.pbf").unwrap();
    h.objects.put("strata-data-lake", "d/v10/raw/a.gpkg").unwrap();
    h.vector_version("d", "v1", vector_options(&["a"], json!([]))).await;

    let (_, teardown) = h.orchestrator.delete_version("d", "v1").await.unwrap();
    teardown.wait().await.unwrap();

    assert!(!h.database.has_table("d", "v1").unwrap());
    assert!(!h.objects.contains("strata-data-lake", "d/v1/raw/a.gpkg").unwrap());
    assert!(!h.objects.contains("strata-tile-cache", "d/v1/default/0/0/0.pbf").unwrap());
    assert!(h.objects.contains("strata-data-lake", "d/v10/raw/a.gpkg").unwrap());
    assert!(h.cdn.invalidated_paths().unwrap().contains(&"/d/v1/*".to_string()));
}

#[tokio::test]
async fn reports_for_deleted_assets_only_fail_lookup() {
    let h = Harness::new();
    h.dataset("d").await;
    let asset = h.vector_version("d", "v1", vector_options(&["a"], json!([]))).await;
    let task_id = h.task_ids(&asset).await.remove(0);

    let (_, teardown) = h.orchestrator.delete_version("d", "v1").await.unwrap();
    teardown.wait().await.unwrap();

    // The cluster job keeps running; its late report finds nothing to update.
    let err = h
        .orchestrator
        .report_task_completion(&task_id, ChangeLogEntry::success("ok"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn derived_asset_teardown_runs_in_background() {
    let h = Harness::new();
    h.dataset("d").await;
    h.table("d", "v1");
    let table = h.vector_version("d", "v1", vector_options(&["a"], json!([]))).await;
    for task_id in h.task_ids(&table).await {
        h.orchestrator
            .report_task_completion(&task_id, ChangeLogEntry::success("ok"))
            .await
            .unwrap();
    }
    let (export, handle) = h
        .orchestrator
        .create_asset("d", "v1", AssetType::Geopackage, json!({}))
        .await
        .unwrap();
    handle.wait().await.unwrap();

    let (deleted, teardown) = h.orchestrator.delete_asset(&export.asset_id).await.unwrap();
    teardown.wait().await.unwrap();
    assert_eq!(deleted.asset_id, export.asset_id);
    assert_eq!(
        h.objects.deleted().unwrap(),
        vec![(
            "strata-data-lake".to_string(),
            "d/v1/vector/epsg-4326/d_v1.gpkg".to_string()
        )]
    );
    assert!(h.store.get_asset(&export.asset_id).await.unwrap().is_none());
}

#[tokio::test]
async fn teardown_failures_are_observable() {
    let h = Harness::new();
    h.dataset("d").await;
    h.vector_version("d", "v1", vector_options(&["a"], json!([]))).await;
    h.cdn.set_failing(true).unwrap();

    let (_, teardown) = h.orchestrator.delete_version("d", "v1").await.unwrap();
    let err = teardown.wait().await.unwrap_err();
    assert!(matches!(err, Error::Collaborator { .. }));
    // Steps after the failing one still ran.
    assert!(!h.database.dropped().unwrap().is_empty());
    assert_eq!(h.orchestrator.background().failures().unwrap().len(), 1);
}
