//! Pipeline templates: creation options in, job graph out.
//!
//! ```text
//! vector:  create_vector_schema
//!            -> load_vector_data_layer_{i}   (chained into at most N queues)
//!            -> add_gfw_fields
//!            -> create_index_{cols}_{type}   (one per index)
//!            -> cluster_table                (optional)
//!            -> inherit_from_geostore        (optional)
//!
//! table:   create_table -> load_tabular_data_{i}   (all parallel)
//!            -> enrich_table
//!            -> create_index_{cols}_{type} -> cluster_partition_{suffix}
//! ```
//!
//! Templates are pure: they read the asset and configuration and never
//! touch a collaborator.

use tracing::debug;

use crate::config::OrchestratorConfig;
use crate::creation_options::{
    CreationOptions, IndexSpec, PartitionSchema, StaticVectorFileOptions,
    StaticVectorTileCacheOptions, TableSourceOptions, VectorDriver, VectorSourceOptions, file_name,
    is_zipped,
};
use crate::dag::JobGraph;
use crate::error::{Error, Result};
use crate::job::{EnvVar, Job, JobKind, command};
use crate::model::{Asset, AssetType, FieldMetadata};
use crate::paths;

/// Inputs of a pipeline template.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    /// Deployment configuration.
    pub config: &'a OrchestratorConfig,
    /// Asset the jobs produce.
    pub asset: &'a Asset,
    /// Field metadata of the version's default asset, used by exports.
    pub default_fields: &'a [FieldMetadata],
}

impl PlanContext<'_> {
    fn dataset(&self) -> &str {
        &self.asset.dataset
    }

    fn version(&self) -> &str {
        &self.asset.version
    }

    // Every job can report back and reach the database with the least
    // privilege its kind needs.
    fn environment(&self, kind: JobKind) -> Vec<EnvVar> {
        let connection = if kind.reads_only() {
            &self.config.reader
        } else {
            &self.config.writer
        };
        let mut env = connection.env();
        env.push(EnvVar::new("ASSET_ID", self.asset.asset_id.to_string()));
        env.push(EnvVar::new("STATUS_URL", &self.config.status_url));
        env.push(EnvVar::new("AWS_REGION", &self.config.region));
        env
    }

    fn job(&self, name: impl Into<String>, kind: JobKind, cmd: Vec<String>) -> Job {
        Job::new(name, kind, cmd).with_environment(self.environment(kind))
    }

    fn dv_args(&self, script: &str) -> Vec<String> {
        command([script, "-d", self.dataset(), "-v", self.version()])
    }
}

/// Builds the job graph for an asset.
///
/// An empty graph means the asset has no external jobs (dynamic vector tile
/// caches are checked inline).
///
/// # Errors
///
/// - `InvalidCreationOptions` if the options fail validation or do not fit
///   the asset type
/// - `NotImplemented` for raster pipelines and asset types without a template
pub fn build_plan(ctx: &PlanContext<'_>) -> Result<JobGraph> {
    let Some(options) = &ctx.asset.creation_options else {
        return Err(Error::invalid_options(format!(
            "asset {} has no creation options",
            ctx.asset.asset_id
        )));
    };
    options.validate()?;
    if !options.fits_asset_type(ctx.asset.asset_type) {
        return Err(Error::invalid_options(format!(
            "{} options do not apply to {}",
            options.kind(),
            ctx.asset.asset_type
        )));
    }

    let jobs = match options {
        CreationOptions::VectorSource(vector) => vector_source_jobs(ctx, vector),
        CreationOptions::TableSource(table) => table_source_jobs(ctx, table),
        CreationOptions::StaticVectorTileCache(cache) => static_tile_cache_jobs(ctx, cache)?,
        CreationOptions::StaticVectorFile(file) => static_vector_file_jobs(ctx, file)?,
        CreationOptions::DynamicVectorTileCache(_) => Vec::new(),
        CreationOptions::RasterSource(_)
        | CreationOptions::RasterTileSet(_)
        | CreationOptions::RasterTileCache(_) => {
            return Err(Error::not_implemented(format!(
                "{} pipeline is not available",
                options.kind()
            )));
        }
    };

    let graph = JobGraph::from_jobs(jobs)?;
    if graph.max_fan_in() > ctx.config.max_parents_per_job {
        return Err(Error::invalid_options(format!(
            "a job would depend on {} parents, the cluster allows {}",
            graph.max_fan_in(),
            ctx.config.max_parents_per_job
        )));
    }
    debug!(
        asset_id = %ctx.asset.asset_id,
        kind = options.kind(),
        jobs = graph.len(),
        "built job graph"
    );
    Ok(graph)
}

/// Chains jobs into at most `queues` parallel queues.
///
/// The first job of each queue depends on `root`, every later job on its
/// predecessor. Returns the jobs and the names of the queue tails.
fn chain_into_queues(root: &str, jobs: Vec<Job>, queues: usize) -> (Vec<Job>, Vec<String>) {
    let queues = queues.clamp(1, jobs.len().max(1));
    let mut tails: Vec<Option<String>> = vec![None; queues];
    let mut chained = Vec::with_capacity(jobs.len());

    for (i, job) in jobs.into_iter().enumerate() {
        let slot = i % queues;
        let parent = tails
            .get(slot)
            .cloned()
            .flatten()
            .unwrap_or_else(|| root.to_string());
        let name = job.name.clone();
        chained.push(job.with_parents([parent]));
        if let Some(tail) = tails.get_mut(slot) {
            *tail = Some(name);
        }
    }

    (chained, tails.into_iter().flatten().collect())
}

fn index_jobs(
    ctx: &PlanContext<'_>,
    indices: &[IndexSpec],
    parent: &str,
    timeout: Option<u64>,
) -> Vec<Job> {
    indices
        .iter()
        .map(|index| {
            let mut cmd = ctx.dv_args("create_index.sh");
            cmd.extend(command([
                "-C".to_string(),
                index.column_names.join(","),
                "-x".to_string(),
                index.index_type.as_str().to_string(),
            ]));
            ctx.job(
                format!("create_index_{}", index.slug()),
                JobKind::DatabaseClient,
                cmd,
            )
            .with_parents([parent])
            .with_timeout(timeout)
        })
        .collect()
}

fn names(jobs: &[Job]) -> Vec<String> {
    jobs.iter().map(|job| job.name.clone()).collect()
}

fn vector_source_jobs(ctx: &PlanContext<'_>, options: &VectorSourceOptions) -> Vec<Job> {
    let timeout = options.timeout;
    let layers = options.resolved_layers();
    let first_uri = options.source_uri.first().map_or("", String::as_str);
    let local_file = file_name(first_uri);
    let zipped = if is_zipped(first_uri) { "True" } else { "False" };

    let mut schema_cmd = ctx.dv_args("create_vector_schema.sh");
    schema_cmd.extend(command([
        "-s",
        first_uri,
        "-l",
        layers.first().map_or("", String::as_str),
        "-f",
        local_file,
        "-X",
        zipped,
    ]));
    if let Some(schema) = &options.table_schema {
        if let Ok(json) = serde_json::to_string(schema) {
            schema_cmd.extend(["-m".to_string(), json]);
        }
    }
    let schema = ctx
        .job("create_vector_schema", JobKind::GdalImport, schema_cmd)
        .with_timeout(timeout);
    let schema_name = schema.name.clone();

    let (loads, load_tails) = if options.source_driver == VectorDriver::Csv {
        // Each chunk loads several files so the enrich step stays under the
        // cluster's parent limit.
        let chunk_size = options
            .source_uri
            .len()
            .div_ceil(ctx.config.max_parents_per_job)
            .max(1);
        let loads: Vec<Job> = options
            .source_uri
            .chunks(chunk_size)
            .enumerate()
            .map(|(i, chunk)| {
                let mut cmd = ctx.dv_args("load_vector_csv_data.sh");
                for uri in chunk {
                    cmd.extend(["-s".to_string(), uri.clone()]);
                }
                ctx.job(format!("load_vector_csv_data_{i}"), JobKind::GdalImport, cmd)
                    .with_parents([schema_name.as_str()])
                    .with_timeout(timeout)
            })
            .collect();
        let tails = names(&loads);
        (loads, tails)
    } else {
        let loads = layers
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                let mut cmd = ctx.dv_args("load_vector_data.sh");
                cmd.extend(command([
                    "-s",
                    first_uri,
                    "-l",
                    layer.as_str(),
                    "-f",
                    local_file,
                    "-X",
                    zipped,
                ]));
                ctx.job(format!("load_vector_data_layer_{i}"), JobKind::GdalImport, cmd)
                    .with_timeout(timeout)
            })
            .collect();
        chain_into_queues(&schema_name, loads, ctx.config.max_load_queues)
    };

    let enrich = ctx
        .job(
            "add_gfw_fields",
            JobKind::DatabaseClient,
            ctx.dv_args("add_gfw_fields.sh"),
        )
        .with_parents(load_tails)
        .with_timeout(timeout);
    let enrich_name = enrich.name.clone();

    let indices = index_jobs(ctx, &options.indices, &enrich_name, timeout);
    let mut tails = names(&indices);

    let cluster = options.cluster.as_ref().map(|cluster| {
        let mut cmd = ctx.dv_args("cluster_table.sh");
        cmd.extend(command([
            "-C".to_string(),
            cluster.column_names.join(","),
            "-x".to_string(),
            cluster.index_type.as_str().to_string(),
        ]));
        let parents = if indices.is_empty() {
            vec![enrich_name.clone()]
        } else {
            names(&indices)
        };
        ctx.job("cluster_table", JobKind::DatabaseClient, cmd)
            .with_parents(parents)
            .with_timeout(timeout)
    });
    if let Some(cluster) = &cluster {
        tails.push(cluster.name.clone());
    }

    let inherit = options.add_to_geostore.then(|| {
        let parents = if tails.is_empty() {
            vec![enrich_name.clone()]
        } else {
            tails.clone()
        };
        ctx.job(
            "inherit_from_geostore",
            JobKind::DatabaseClient,
            ctx.dv_args("inherit_geostore.sh"),
        )
        .with_parents(parents)
        .with_timeout(timeout)
    });

    let mut jobs = Vec::with_capacity(loads.len() + indices.len() + 4);
    jobs.push(schema);
    jobs.extend(loads);
    jobs.push(enrich);
    jobs.extend(indices);
    jobs.extend(cluster);
    jobs.extend(inherit);
    jobs
}

fn table_source_jobs(ctx: &PlanContext<'_>, options: &TableSourceOptions) -> Vec<Job> {
    let timeout = options.timeout;
    let first_uri = options.source_uri.first().map_or("", String::as_str);

    let mut create_cmd = ctx.dv_args("create_tabular_schema.sh");
    create_cmd.extend(command(["-s", first_uri, "-D", options.delimiter.as_str()]));
    if let Some(partitions) = &options.partitions {
        let partition_type = match &partitions.schema {
            PartitionSchema::Hash(_) => "hash",
            PartitionSchema::List(_) => "list",
            PartitionSchema::Range(_) => "range",
        };
        create_cmd.extend(command([
            "-p",
            partition_type,
            "-c",
            partitions.partition_column.as_str(),
        ]));
    }
    let create = ctx
        .job("create_table", JobKind::DatabaseClient, create_cmd)
        .with_timeout(timeout);
    let create_name = create.name.clone();

    // Every load hangs off create_table; files are grouped only when there
    // are more of them than enrich_table may have parents.
    let chunk_size = options
        .source_uri
        .len()
        .div_ceil(ctx.config.max_parents_per_job)
        .max(1);
    let loads: Vec<Job> = options
        .source_uri
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, chunk)| {
            let mut cmd = ctx.dv_args("load_tabular_data.sh");
            for uri in chunk {
                cmd.extend(["-s".to_string(), uri.clone()]);
            }
            cmd.extend(command(["-D", options.delimiter.as_str()]));
            if !options.has_header {
                cmd.push("-H".to_string());
            }
            ctx.job(format!("load_tabular_data_{i}"), JobKind::DatabaseClient, cmd)
                .with_parents([create_name.as_str()])
                .with_timeout(timeout)
        })
        .collect();
    let load_tails = names(&loads);

    let mut enrich_cmd = ctx.dv_args("enrich_table.sh");
    if let (Some(lat), Some(lng)) = (&options.latitude, &options.longitude) {
        enrich_cmd.extend(command(["--lat", lat.as_str(), "--lng", lng.as_str()]));
    }
    let enrich = ctx
        .job("enrich_table", JobKind::DatabaseClient, enrich_cmd)
        .with_parents(load_tails)
        .with_timeout(timeout);
    let enrich_name = enrich.name.clone();

    let indices = index_jobs(ctx, &options.indices, &enrich_name, timeout);
    let cluster_parents = if indices.is_empty() {
        vec![enrich_name]
    } else {
        names(&indices)
    };

    let clusters: Vec<Job> = options
        .partitions
        .iter()
        .flat_map(|partitions| {
            partitions.suffixes().into_iter().map(move |suffix| {
                let mut cmd = ctx.dv_args("cluster_partition.sh");
                cmd.extend(command([
                    "-p".to_string(),
                    suffix.clone(),
                    "-c".to_string(),
                    partitions.partition_column.clone(),
                ]));
                (suffix, cmd)
            })
        })
        .map(|(suffix, cmd)| {
            ctx.job(
                format!("cluster_partition_{suffix}"),
                JobKind::DatabaseClient,
                cmd,
            )
            .with_parents(cluster_parents.iter().map(String::as_str))
            .with_timeout(timeout)
        })
        .collect();

    let mut jobs = Vec::with_capacity(loads.len() + indices.len() + clusters.len() + 2);
    jobs.push(create);
    jobs.extend(loads);
    jobs.push(enrich);
    jobs.extend(indices);
    jobs.extend(clusters);
    jobs
}

/// Feature info fields of the default asset, narrowed to a requested subset.
fn exported_fields(ctx: &PlanContext<'_>, requested: Option<&Vec<String>>) -> Result<Vec<String>> {
    let fields: Vec<String> = ctx
        .default_fields
        .iter()
        .filter(|field| field.is_feature_info)
        .filter(|field| requested.is_none_or(|wanted| wanted.contains(&field.name)))
        .map(|field| field.name.clone())
        .collect();
    if fields.is_empty() {
        return Err(Error::invalid_options(format!(
            "default asset of {}/{} exposes no exportable fields",
            ctx.dataset(),
            ctx.version()
        )));
    }
    Ok(fields)
}

fn static_tile_cache_jobs(
    ctx: &PlanContext<'_>,
    options: &StaticVectorTileCacheOptions,
) -> Result<Vec<Job>> {
    let fields = exported_fields(ctx, options.field_attributes.as_ref())?;
    let ndjson_uri = paths::vector_file_uri(
        &ctx.config.data_lake_bucket,
        ctx.dataset(),
        ctx.version(),
        "ndjson",
    );

    let mut export_cmd = ctx.dv_args("export_vector_data.sh");
    export_cmd.extend(command([
        "-f".to_string(),
        format!("{}_{}.ndjson", ctx.dataset(), ctx.version()),
        "-F".to_string(),
        VectorDriver::GeoJsonSeq.as_str().to_string(),
        "-T".to_string(),
        ndjson_uri.clone(),
        "-C".to_string(),
        fields.join(","),
    ]));
    let export = ctx.job("export_ndjson", JobKind::GdalExport, export_cmd);

    let mut tiles_cmd = ctx.dv_args("create_vector_tile_cache.sh");
    tiles_cmd.extend(command([
        "-s".to_string(),
        ndjson_uri,
        "-Z".to_string(),
        options.min_zoom.to_string(),
        "-z".to_string(),
        options.max_zoom.to_string(),
        "-t".to_string(),
        options.tile_strategy.as_str().to_string(),
        "-I".to_string(),
        options.implementation.clone(),
    ]));
    let tiles = ctx
        .job("create_vector_tile_cache", JobKind::TileCache, tiles_cmd)
        .with_parents([export.name.as_str()]);

    Ok(vec![export, tiles])
}

fn static_vector_file_jobs(
    ctx: &PlanContext<'_>,
    options: &StaticVectorFileOptions,
) -> Result<Vec<Job>> {
    let (driver, extension, zipped) = match ctx.asset.asset_type {
        AssetType::Shapefile => (VectorDriver::Shapefile, "shp", true),
        AssetType::Geopackage => (VectorDriver::Gpkg, "gpkg", false),
        other => {
            return Err(Error::not_implemented(format!(
                "no export template for {other}"
            )));
        }
    };
    let fields = exported_fields(ctx, options.field_attributes.as_ref())?;

    let mut cmd = ctx.dv_args("export_vector_data.sh");
    cmd.extend(command([
        "-f".to_string(),
        format!("{}_{}.{extension}", ctx.dataset(), ctx.version()),
        "-F".to_string(),
        driver.as_str().to_string(),
        "-T".to_string(),
        ctx.asset.asset_uri.clone(),
        "-C".to_string(),
        fields.join(","),
        "-X".to_string(),
        if zipped { "True" } else { "False" }.to_string(),
    ]));
    Ok(vec![ctx.job(
        format!("export_{extension}"),
        JobKind::GdalExport,
        cmd,
    )])
}
