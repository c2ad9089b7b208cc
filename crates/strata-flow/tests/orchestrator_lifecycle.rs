//! End-to-end orchestrator scenarios over in-memory collaborators.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use serde_json::json;

use common::{Harness, vector_options};
use strata_flow::error::Error;
use strata_flow::model::{AssetType, ChangeLogEntry, ChangeLogStatus, Status, TaskStatus};
use strata_flow::orchestrator::NewVersion;
use strata_flow::store::Store;
use strata_flow::submit::TASK_WRITE_ATTEMPTS;

/// Vector source with 2 layers and 1 index: 1 + 2 + 1 + 1 + 1 jobs. Every
/// task succeeds concurrently in interleaved order; the version cascades once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn vector_version_cascades_exactly_once() {
    let h = Harness::new();
    h.dataset("d").await;
    h.table("d", "v1");
    let options = vector_options(
        &["roads", "rivers"],
        json!([{ "index_type": "gist", "column_names": ["geom"] }]),
    );
    let asset = h.vector_version("d", "v1", options).await;

    let submitted: Vec<String> = h
        .cluster
        .submitted()
        .unwrap()
        .into_iter()
        .map(|job| job.request.job_name)
        .collect();
    assert_eq!(
        submitted,
        vec![
            "create_vector_schema",
            "load_vector_data_layer_0",
            "load_vector_data_layer_1",
            "add_gfw_fields",
            "create_index_geom_gist",
            "inherit_from_geostore",
        ]
    );
    let task_ids = h.task_ids(&asset).await;
    assert_eq!(task_ids.len(), 6);
    assert_eq!(h.version("d", "v1").await.status, Status::Pending);

    // Interleave: odd positions first, in reverse, then the even ones.
    let mut order: Vec<_> = task_ids.iter().skip(1).step_by(2).rev().cloned().collect();
    order.extend(task_ids.iter().step_by(2).cloned());

    let reports: Vec<_> = order
        .into_iter()
        .map(|task_id| {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .report_task_completion(&task_id, ChangeLogEntry::success("Job completed"))
                    .await
            })
        })
        .collect();
    for report in reports {
        let task = report.await.unwrap().unwrap();
        assert_eq!(task.status(), TaskStatus::Success);
    }

    let asset = h.asset(&asset).await;
    assert_eq!(asset.status, Status::Saved);
    let saved_entries = asset
        .change_log
        .iter()
        .filter(|e| e.status == ChangeLogStatus::Success)
        .count();
    assert_eq!(saved_entries, 1);
    assert_eq!(asset.metadata.fields.len(), 4);
    assert!(
        asset
            .metadata
            .fields
            .iter()
            .any(|f| f.name == "name" && f.is_filter)
    );

    let version = h.version("d", "v1").await;
    assert_eq!(version.status, Status::Saved);
    assert_eq!(version.change_log.len(), 1);
}

#[tokio::test]
async fn one_failed_task_fails_asset_and_version() {
    let h = Harness::new();
    h.dataset("d").await;
    let options = vector_options(&["roads"], json!([]));
    let asset = h.vector_version("d", "v1", options).await;
    let task_ids = h.task_ids(&asset).await;

    h.orchestrator
        .report_task_completion(&task_ids[0], ChangeLogEntry::success("ok"))
        .await
        .unwrap();
    h.orchestrator
        .report_task_completion(&task_ids[1], ChangeLogEntry::failed("gdal exited 1"))
        .await
        .unwrap();
    // Later reports still extend task history but never revive the asset.
    for task_id in &task_ids[2..] {
        h.orchestrator
            .report_task_completion(task_id, ChangeLogEntry::success("ok"))
            .await
            .unwrap();
    }

    let asset = h.asset(&asset).await;
    assert_eq!(asset.status, Status::Failed);
    let failure = asset.change_log.last().unwrap();
    assert_eq!(failure.message, "One or more tasks failed.");
    assert_eq!(
        failure.detail.as_deref(),
        Some(format!("Check /task/{} for more detail", task_ids[1]).as_str())
    );

    let version = h.version("d", "v1").await;
    assert_eq!(version.status, Status::Failed);
    assert_eq!(version.change_log.len(), 1);

    let last = h.orchestrator.get_task(&task_ids[2]).await.unwrap();
    assert_eq!(last.change_log.len(), 2);
}

#[tokio::test]
async fn ambiguous_and_unknown_reports_are_rejected() {
    let h = Harness::new();
    h.dataset("d").await;
    let asset = h.vector_version("d", "v1", vector_options(&["a"], json!([]))).await;
    let task_id = h.task_ids(&asset).await.remove(0);

    let err = h
        .orchestrator
        .report_task_completion(&task_id, ChangeLogEntry::pending("still running"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest { .. }));
    assert_eq!(err.status_code(), 400);
    assert_eq!(h.orchestrator.get_task(&task_id).await.unwrap().change_log.len(), 1);

    let unknown = strata_core::TaskId::new("no-such-job").unwrap();
    let err = h
        .orchestrator
        .report_task_completion(&unknown, ChangeLogEntry::success("ok"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn duplicate_default_asset_creates_no_tasks() {
    let h = Harness::new();
    h.dataset("d").await;
    let options = vector_options(&["a"], json!([]));
    h.vector_version("d", "v1", options.clone()).await;
    let tasks_before = h.store.task_count().unwrap();
    let jobs_before = h.cluster.submitted().unwrap().len();

    let err = h
        .orchestrator
        .create_default_asset("d", "v1", "vector", options)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RecordAlreadyExists { .. }));
    assert_eq!(h.store.task_count().unwrap(), tasks_before);
    assert_eq!(h.cluster.submitted().unwrap().len(), jobs_before);

    let err = h
        .orchestrator
        .create_version(NewVersion::new("d", "v1", "vector", vector_options(&["a"], json!([]))))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RecordAlreadyExists { .. }));
}

#[tokio::test]
async fn partial_submission_failure_leaves_consistent_tasks() {
    let h = Harness::new();
    h.dataset("d").await;
    h.cluster.fail_job("add_gfw_fields").unwrap();

    let (_, handle) = h
        .orchestrator
        .create_version(NewVersion::new(
            "d",
            "v1",
            "vector",
            vector_options(&["a", "b"], json!([])),
        ))
        .await
        .unwrap();
    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, Error::Submission { ref job_name, .. } if job_name == "add_gfw_fields"));

    let asset = h.default_asset("d", "v1").await;
    assert_eq!(asset.status, Status::Failed);
    assert_eq!(asset.expected_tasks, None);
    let failures: Vec<_> = asset
        .change_log
        .iter()
        .filter(|e| e.status == ChangeLogStatus::Failed)
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].message, "Failed to submit job add_gfw_fields");

    // Every job that reached the cluster has a task.
    let submitted = h.cluster.submitted().unwrap();
    assert_eq!(submitted.len(), 3);
    let task_ids = h.task_ids(&asset).await;
    assert_eq!(task_ids.len(), 3);
    for job in &submitted {
        assert!(task_ids.contains(&job.task_id));
    }

    assert_eq!(h.version("d", "v1").await.status, Status::Failed);
    assert_eq!(h.orchestrator.background().failures().unwrap().len(), 1);
}

#[tokio::test]
async fn transient_task_write_failure_is_retried() {
    let h = Harness::new();
    h.dataset("d").await;
    h.store.reject_task_writes(1).unwrap();

    let asset = h.vector_version("d", "v1", vector_options(&["a"], json!([]))).await;
    let submitted = h.cluster.submitted().unwrap();
    assert_eq!(asset.expected_tasks, Some(u32::try_from(submitted.len()).unwrap()));
    let task_ids = h.task_ids(&asset).await;
    assert_eq!(task_ids.len(), submitted.len());
    for job in &submitted {
        assert!(task_ids.contains(&job.task_id));
    }
}

#[tokio::test]
async fn unrecorded_cluster_job_is_named_in_failure() {
    let h = Harness::new();
    h.dataset("d").await;
    h.store.reject_task_writes(TASK_WRITE_ATTEMPTS).unwrap();

    let (_, handle) = h
        .orchestrator
        .create_version(NewVersion::new("d", "v1", "vector", vector_options(&["a"], json!([]))))
        .await
        .unwrap();
    let err = handle.wait().await.unwrap_err();
    let orphan = h.cluster.task_id_of("create_vector_schema").unwrap().unwrap();
    assert!(
        matches!(err, Error::Submission { ref job_name, ref message, .. }
            if job_name == "create_vector_schema" && message.contains(orphan.as_str()))
    );

    let asset = h.default_asset("d", "v1").await;
    assert_eq!(asset.status, Status::Failed);
    assert!(h.task_ids(&asset).await.is_empty());
    let failure = asset.change_log.last().unwrap();
    assert_eq!(failure.message, "Failed to submit job create_vector_schema");
    assert!(failure.detail.as_deref().unwrap().contains(orphan.as_str()));
    assert_eq!(h.cluster.submitted().unwrap().len(), 1);
}

#[tokio::test]
async fn unsupported_and_unimplemented_sources_store_nothing() {
    let h = Harness::new();
    h.dataset("d").await;

    let err = h
        .orchestrator
        .create_version(NewVersion::new("d", "v1", "lidar", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedSourceType { .. }));
    assert_eq!(err.status_code(), 501);

    let raster = json!({
        "source_uri": ["s3://uploads/tiles.geojson"],
        "srid": "epsg-4326",
        "grid": "10/40000",
        "pixel_meaning": "percent",
    });
    let err = h
        .orchestrator
        .create_version(NewVersion::new("d", "v1", "raster", raster))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotImplemented { .. }));

    assert!(h.store.list_versions("d").await.unwrap().is_empty());
    assert!(h.cluster.submitted().unwrap().is_empty());
}

#[tokio::test]
async fn saved_table_registers_dynamic_tile_cache() {
    let h = Harness::new();
    h.dataset("d").await;
    h.table("d", "v1");
    let options = json!({
        "source_driver": "GeoJSON",
        "source_uri": ["s3://uploads/d/roads.geojson"],
    });
    let table = h.vector_version("d", "v1", options).await;
    for task_id in h.task_ids(&table).await {
        h.orchestrator
            .report_task_completion(&task_id, ChangeLogEntry::success("ok"))
            .await
            .unwrap();
    }

    let assets = h.assets("d", "v1").await;
    assert_eq!(assets.len(), 2);
    let cache = assets
        .iter()
        .find(|a| a.asset_type == AssetType::DynamicVectorTileCache)
        .expect("tile cache asset");
    assert_eq!(cache.status, Status::Saved);
    assert!(cache.asset_uri.ends_with("/d/v1/dynamic/{z}/{x}/{y}.pbf"));
    assert_eq!(cache.metadata.max_zoom, Some(22));
    assert_eq!(cache.metadata.fields.len(), 4);
    assert_eq!(h.tiles.redeploys().unwrap(), 1);
    assert_eq!(h.version("d", "v1").await.status, Status::Saved);
}

#[tokio::test]
async fn failed_registration_only_logs_on_version() {
    let h = Harness::new();
    h.dataset("d").await;
    h.table("d", "v1");
    let options = json!({
        "source_driver": "GeoJSON",
        "source_uri": ["s3://uploads/d/roads.geojson"],
    });
    let table = h.vector_version("d", "v1", options).await;

    // Claims the cache URI while the table is pending; the inline check fails it.
    let (early, handle) = h
        .orchestrator
        .create_asset("d", "v1", AssetType::DynamicVectorTileCache, json!({}))
        .await
        .unwrap();
    handle.wait().await.unwrap();
    assert_eq!(h.asset(&early).await.status, Status::Failed);

    for task_id in h.task_ids(&table).await {
        h.orchestrator
            .report_task_completion(&task_id, ChangeLogEntry::success("ok"))
            .await
            .unwrap();
    }

    assert_eq!(h.asset(&table).await.status, Status::Saved);
    let version = h.version("d", "v1").await;
    assert_eq!(version.status, Status::Saved);
    assert!(
        version
            .change_log
            .iter()
            .any(|e| e.message == "Failed to create Dynamic Vector Tile Cache Asset")
    );
    assert_eq!(h.assets("d", "v1").await.len(), 2);
}

#[tokio::test]
async fn static_tile_cache_exports_then_tiles() {
    let h = Harness::new();
    h.dataset("d").await;
    h.table("d", "v1");
    let table = h
        .vector_version("d", "v1", vector_options(&["a"], json!([])))
        .await;
    for task_id in h.task_ids(&table).await {
        h.orchestrator
            .report_task_completion(&task_id, ChangeLogEntry::success("ok"))
            .await
            .unwrap();
    }

    let (cache, handle) = h
        .orchestrator
        .create_asset("d", "v1", AssetType::StaticVectorTileCache, json!({ "max_zoom": 10 }))
        .await
        .unwrap();
    handle.wait().await.unwrap();

    let task_ids = h.task_ids(&cache).await;
    assert_eq!(task_ids.len(), 2);
    let tiles = h.cluster.task_id_of("create_vector_tile_cache").unwrap().unwrap();
    let export = h.cluster.task_id_of("export_ndjson").unwrap().unwrap();
    let submitted = h.cluster.submitted().unwrap();
    let tile_job = submitted.iter().find(|j| j.task_id == tiles).unwrap();
    assert_eq!(tile_job.request.depends_on, vec![export]);

    for task_id in task_ids {
        h.orchestrator
            .report_task_completion(&task_id, ChangeLogEntry::success("ok"))
            .await
            .unwrap();
    }
    assert_eq!(h.asset(&cache).await.status, Status::Saved);
    assert_eq!(h.tiles.redeploys().unwrap(), 1);
}

#[tokio::test]
async fn set_latest_is_exclusive_and_invalidates() {
    let h = Harness::new();
    h.dataset("d").await;
    let (_, first) = h
        .orchestrator
        .create_version(NewVersion::new("d", "v1", "vector", vector_options(&["a"], json!([]))).latest())
        .await
        .unwrap();
    first.wait().await.unwrap();
    h.vector_version("d", "v2", vector_options(&["a"], json!([]))).await;

    let promoted = h.orchestrator.set_latest("d", "v2").await.unwrap();
    assert!(promoted.is_latest);
    assert!(!h.version("d", "v1").await.is_latest);

    let paths = h.cdn.invalidated_paths().unwrap();
    assert!(paths.contains(&"/_latest".to_string()));
    assert!(paths.contains(&"/d/v2/latest/*".to_string()));

    let err = h.orchestrator.set_latest("d", "v9").await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn resubmission_backs_off_after_oom() {
    use strata_flow::backoff::OOM_REASON;
    use strata_flow::cluster::JobAttempt;

    let h = Harness::new();
    h.dataset("d").await;
    let asset = h.vector_version("d", "v1", vector_options(&["a"], json!([]))).await;
    let task_id = h.task_ids(&asset).await.remove(0);
    h.cluster
        .set_history(
            &task_id,
            vec![
                JobAttempt::new(OOM_REASON, None),
                JobAttempt::new("Essential container in task exited", Some(1)),
                JobAttempt::new(OOM_REASON, None),
            ],
        )
        .unwrap();

    assert_eq!(h.orchestrator.resubmission_cores(&task_id, 96).await.unwrap(), 24);
    assert_eq!(h.orchestrator.resubmission_processes(&task_id, 5).await.unwrap(), 2);
    assert_eq!(h.orchestrator.resubmission_cores(&task_id, 0).await.unwrap(), 1);
}
