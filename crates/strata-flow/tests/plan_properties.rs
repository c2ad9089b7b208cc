//! Property-based tests for job graph construction.
//!
//! Every vector and table graph must be a valid topological order, keep job
//! names unique and stay under the cluster's dependency fan-in limit.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashSet;

use proptest::prelude::*;
use serde_json::{Value, json};

use strata_flow::config::OrchestratorConfig;
use strata_flow::creation_options::CreationOptions;
use strata_flow::dag::JobGraph;
use strata_flow::model::Asset;
use strata_flow::plan::{PlanContext, build_plan};

fn plan(source_type: &str, options: Value) -> JobGraph {
    let options = CreationOptions::for_source(source_type, options).unwrap();
    let asset_type = options.default_asset_type().unwrap();
    let asset = Asset::new("d", "v1", asset_type, "/d/v1/features")
        .as_default()
        .with_creation_options(options);
    let config = OrchestratorConfig::default();
    build_plan(&PlanContext {
        config: &config,
        asset: &asset,
        default_fields: &[],
    })
    .unwrap()
}

fn arb_indices() -> impl Strategy<Value = Vec<Value>> {
    let column = prop::sample::select(vec!["geom", "geom_wm", "name", "iso", "gfw_fid"]);
    let index_type = prop::sample::select(vec!["gist", "btree", "hash"]);
    prop::collection::hash_set((column, index_type), 0..4).prop_map(|set| {
        set.into_iter()
            .map(|(column, index_type)| json!({ "index_type": index_type, "column_names": [column] }))
            .collect()
    })
}

fn arb_vector() -> impl Strategy<Value = Value> {
    (1usize..40, arb_indices(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(layers, indices, geostore, cluster, csv)| {
            let layers: Vec<String> = (0..layers).map(|i| format!("layer_{i}")).collect();
            let uris: Vec<String> = (0..layers.len())
                .map(|i| format!("s3://uploads/part_{i}.csv"))
                .collect();
            let mut options = json!({
                "source_driver": if csv { "CSV" } else { "GPKG" },
                "source_uri": if csv { uris } else { vec!["s3://uploads/src.gpkg".to_string()] },
                "layers": layers,
                "indices": indices,
                "add_to_geostore": geostore,
            });
            if cluster {
                options["cluster"] = json!({ "index_type": "gist", "column_names": ["geom"] });
            }
            options
        },
    )
}

fn arb_table() -> impl Strategy<Value = Value> {
    (1usize..30, arb_indices(), 0u32..6, any::<bool>()).prop_map(
        |(files, indices, partitions, coordinates)| {
            let uris: Vec<String> = (0..files)
                .map(|i| format!("s3://uploads/part_{i}.tsv"))
                .collect();
            let mut options = json!({
                "source_driver": "text",
                "source_uri": uris,
                "indices": indices,
            });
            if partitions > 0 {
                options["partitions"] = json!({
                    "partition_column": "year",
                    "schema": {
                        "partition_type": "hash",
                        "partition_schema": { "partition_count": partitions },
                    },
                });
            }
            if coordinates {
                options["latitude"] = json!("lat");
                options["longitude"] = json!("lng");
            }
            options
        },
    )
}

fn assert_well_formed(graph: &JobGraph) -> Result<(), TestCaseError> {
    let order = graph.toposort().unwrap();
    prop_assert_eq!(order.len(), graph.len());

    let mut seen = HashSet::new();
    for job in &order {
        for parent in &job.parents {
            prop_assert!(seen.contains(parent.as_str()), "{} before its parent {}", job.name, parent);
        }
        prop_assert!(seen.insert(job.name.as_str()), "duplicate job {}", job.name);
    }
    prop_assert!(graph.max_fan_in() <= OrchestratorConfig::default().max_parents_per_job);
    prop_assert_eq!(graph.roots().len(), 1);
    Ok(())
}

proptest! {
    #[test]
    fn vector_graphs_are_topologically_ordered(options in arb_vector()) {
        let graph = plan("vector", options);
        assert_well_formed(&graph)?;
        prop_assert_eq!(graph.roots(), vec!["create_vector_schema"]);
    }

    #[test]
    fn table_graphs_are_topologically_ordered(options in arb_table()) {
        let graph = plan("table", options);
        assert_well_formed(&graph)?;
        prop_assert_eq!(graph.roots(), vec!["create_table"]);
    }
}
