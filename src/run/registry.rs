//! Run Registry - per-run state and directory layout
//!
//! One registry is live per process for the duration of a run. It owns every
//! metric/parameter/artifact record, decides whether this rank collects at
//! all, and lays out the on-disk run directory:
//!
//! ```text
//! {save_root}/{experiment_name}_{run_id}/
//!     artifacts/        model versions and other run outputs
//!     metrics_tmp/      per-rank metric files, scanned at graph-build time
//! ```
//!
//! The registry is an explicitly constructed object passed by reference to
//! buffer/store/builder calls. Callers must not log to the same
//! (name, context) key from multiple threads without external
//! synchronization.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::context::{Context, MetricSource};
use crate::run::{ArtifactRecord, MetricRecord, ParameterRecord};
use crate::store::{self, MetricFormat};
use crate::value::ParamValue;
use crate::Result;

/// Fold operation for a cumulative metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOp {
    /// Keep the minimum value seen.
    Min,
    /// Keep the maximum value seen.
    Max,
    /// Sum all values.
    Sum,
    /// Keep the last value logged.
    Last,
}

/// A monitored quantity folded across the whole run, reported in the
/// `final_run_statistics` entity of the provenance document.
#[derive(Debug, Clone, PartialEq)]
pub struct CumulativeMetric {
    fold: FoldOp,
    current: f64,
}

impl CumulativeMetric {
    const fn new(fold: FoldOp, initial: f64) -> Self {
        Self {
            fold,
            current: initial,
        }
    }

    fn fold(&mut self, value: f64) {
        self.current = match self.fold {
            FoldOp::Min => self.current.min(value),
            FoldOp::Max => self.current.max(value),
            FoldOp::Sum => self.current + value,
            FoldOp::Last => value,
        };
    }

    /// Accumulated value.
    #[must_use]
    pub const fn current(&self) -> f64 {
        self.current
    }
}

/// Distributed-rank triple for one process of a multi-rank run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankInfo {
    /// Rank across the whole job.
    pub global: u32,
    /// Rank within the node.
    pub local: u32,
    /// Node index.
    pub node: u32,
}

impl RankInfo {
    /// Read the rank triple from the SLURM environment, if present.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let parse = |var: &str| std::env::var(var).ok()?.parse().ok();
        Some(Self {
            global: parse("SLURM_PROCID")?,
            local: parse("SLURM_LOCALID").unwrap_or(0),
            node: parse("SLURM_NODEID").unwrap_or(0),
        })
    }
}

/// Configuration for [`RunRegistry::init`].
#[derive(Debug, Clone)]
pub struct RunConfig {
    experiment_name: String,
    save_root: PathBuf,
    namespace: String,
    collect_all_ranks: bool,
    rank: Option<RankInfo>,
    rank_from_env: bool,
}

impl RunConfig {
    /// Create a configuration for an experiment saved under `save_root`.
    #[must_use]
    pub fn new(experiment_name: impl Into<String>, save_root: impl Into<PathBuf>) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            save_root: save_root.into(),
            namespace: "runprov".to_string(),
            collect_all_ranks: false,
            rank: None,
            rank_from_env: true,
        }
    }

    /// Set the user namespace recorded in the provenance document.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Collect on every rank instead of rank 0 only.
    #[must_use]
    pub const fn collect_all_ranks(mut self, collect: bool) -> Self {
        self.collect_all_ranks = collect;
        self
    }

    /// Set the rank triple explicitly instead of reading the environment.
    #[must_use]
    pub const fn rank(mut self, rank: RankInfo) -> Self {
        self.rank = Some(rank);
        self.rank_from_env = false;
        self
    }

    /// Run as an unranked (single-process) job, ignoring the environment.
    #[must_use]
    pub const fn unranked(mut self) -> Self {
        self.rank = None;
        self.rank_from_env = false;
        self
    }
}

/// Process-wide run state: records, rank/collection policy, directory layout.
#[derive(Debug)]
pub struct RunRegistry {
    experiment_name: String,
    namespace: String,
    run_id: u32,
    save_root: PathBuf,
    experiment_dir: PathBuf,
    artifacts_dir: PathBuf,
    metrics_tmp_dir: PathBuf,
    rank: Option<RankInfo>,
    collecting: bool,
    metrics: BTreeMap<(String, Context), MetricRecord>,
    parameters: BTreeMap<String, ParameterRecord>,
    artifacts: Vec<ArtifactRecord>,
    cumulative: BTreeMap<String, CumulativeMetric>,
}

impl RunRegistry {
    /// Initialize run state: resolve the rank and collection policy, allocate
    /// the run id, and create the run directory layout.
    ///
    /// The run id is the count of existing `{experiment_name}_{N}` directories
    /// under the save root, so repeated runs of the same experiment land in
    /// successive directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the run directories cannot be created.
    pub fn init(config: RunConfig) -> Result<Self> {
        let rank = if config.rank_from_env {
            RankInfo::from_env()
        } else {
            config.rank
        };
        let collecting = rank.map_or(true, |r| r.global == 0) || config.collect_all_ranks;

        std::fs::create_dir_all(&config.save_root)?;
        let run_id = next_run_id(&config.save_root, &config.experiment_name)?;

        let experiment_dir = config
            .save_root
            .join(format!("{}_{run_id}", config.experiment_name));
        let artifacts_dir = experiment_dir.join("artifacts");
        let metrics_tmp_dir = experiment_dir.join("metrics_tmp");
        if collecting {
            std::fs::create_dir_all(&artifacts_dir)?;
            std::fs::create_dir_all(&metrics_tmp_dir)?;
        }

        debug!(
            experiment = %config.experiment_name,
            run_id,
            collecting,
            "initialized run registry"
        );

        Ok(Self {
            experiment_name: config.experiment_name,
            namespace: config.namespace,
            run_id,
            save_root: config.save_root,
            experiment_dir,
            artifacts_dir,
            metrics_tmp_dir,
            rank,
            collecting,
            metrics: BTreeMap::new(),
            parameters: BTreeMap::new(),
            artifacts: Vec::new(),
            cumulative: BTreeMap::new(),
        })
    }

    /// Experiment name as configured.
    #[must_use]
    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    /// Experiment name qualified with the global rank, used for entity and
    /// activity identifiers so ranked runs stay distinct.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match self.rank {
            Some(r) => format!("{}_GR{}", self.experiment_name, r.global),
            None => self.experiment_name.clone(),
        }
    }

    /// User namespace for the provenance document.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Numeric run id within the save root.
    #[must_use]
    pub const fn run_id(&self) -> u32 {
        self.run_id
    }

    /// Root directory all experiments are saved under.
    #[must_use]
    pub fn save_root(&self) -> &Path {
        &self.save_root
    }

    /// Directory for this run: `{save_root}/{experiment_name}_{run_id}`.
    #[must_use]
    pub fn experiment_dir(&self) -> &Path {
        &self.experiment_dir
    }

    /// Artifact directory for this run.
    #[must_use]
    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// Temporary directory holding per-rank metric files.
    #[must_use]
    pub fn metrics_tmp_dir(&self) -> &Path {
        &self.metrics_tmp_dir
    }

    /// Rank triple of this process, if running distributed.
    #[must_use]
    pub const fn rank(&self) -> Option<RankInfo> {
        self.rank
    }

    /// Whether this rank buffers and flushes at all. Non-collecting ranks'
    /// log calls are no-ops.
    #[must_use]
    pub const fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Buffered metric records keyed by (name, context).
    #[must_use]
    pub const fn metrics(&self) -> &BTreeMap<(String, Context), MetricRecord> {
        &self.metrics
    }

    /// Logged parameters keyed by name.
    #[must_use]
    pub const fn parameters(&self) -> &BTreeMap<String, ParameterRecord> {
        &self.parameters
    }

    /// All logged artifacts, in log order.
    #[must_use]
    pub fn artifacts(&self) -> &[ArtifactRecord] {
        &self.artifacts
    }

    /// Cumulative metrics keyed by name.
    #[must_use]
    pub const fn cumulative_metrics(&self) -> &BTreeMap<String, CumulativeMetric> {
        &self.cumulative
    }

    /// Append a metric sample, creating the (name, context) record on first
    /// occurrence.
    pub fn add_metric(
        &mut self,
        name: &str,
        value: f64,
        epoch: u32,
        timestamp_ms: i64,
        context: Context,
        source: MetricSource,
    ) {
        if !self.collecting {
            return;
        }

        let key = (name.to_string(), context);
        let record = self.metrics.entry(key).or_insert_with(|| {
            if name_shadows_context(name) {
                // The file name {name}_{CONTEXT} would parse back ambiguously.
                warn!(metric = name, "metric name ends in a context tag; rename to avoid ambiguous metric files");
            }
            MetricRecord::new(name, context, source)
        });
        record.add_sample(value, epoch, timestamp_ms);
    }

    /// Append a metric sample stamped with the current wall-clock time.
    pub fn log_metric(&mut self, name: &str, value: f64, epoch: u32, context: Context) {
        self.add_metric(
            name,
            value,
            epoch,
            Utc::now().timestamp_millis(),
            context,
            MetricSource::UserCode,
        );
    }

    /// Set a parameter; logging the same name again overwrites.
    pub fn add_parameter(&mut self, name: &str, value: impl Into<ParamValue>) {
        if !self.collecting {
            return;
        }
        self.parameters
            .insert(name.to_string(), ParameterRecord::new(name, value));
    }

    /// Record an artifact.
    ///
    /// An artifact logged under the same (name, context) as an earlier one
    /// replaces it in place, keeping its original position in log order.
    pub fn add_artifact(&mut self, artifact: ArtifactRecord) {
        if !self.collecting {
            return;
        }
        let key = (artifact.name().to_string(), artifact.context());
        if let Some(existing) = self
            .artifacts
            .iter_mut()
            .find(|a| (a.name().to_string(), a.context()) == key)
        {
            *existing = artifact;
        } else {
            self.artifacts.push(artifact);
        }
    }

    /// Fold a value into a cumulative metric, creating it on first use.
    ///
    /// The first value seeds the accumulator; only subsequent values are
    /// folded in.
    pub fn log_cumulative(&mut self, name: &str, value: f64, fold: FoldOp) {
        if !self.collecting {
            return;
        }
        match self.cumulative.entry(name.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(CumulativeMetric::new(fold, value));
            }
            Entry::Occupied(mut slot) => slot.get_mut().fold(value),
        }
    }

    /// All model-version artifacts, in log order.
    #[must_use]
    pub fn model_versions(&self) -> Vec<&ArtifactRecord> {
        self.artifacts
            .iter()
            .filter(|a| a.is_model_version())
            .collect()
    }

    /// The most recently logged model version, if any.
    #[must_use]
    pub fn final_model(&self) -> Option<&ArtifactRecord> {
        self.model_versions().last().copied()
    }

    /// Flush every buffered metric to a per-rank file under the metrics
    /// directory, clearing the in-memory buffers (counts are retained).
    ///
    /// # Errors
    ///
    /// Returns the first write error; a failed write surfaces immediately.
    pub fn flush_metrics(&mut self, format: MetricFormat, use_compression: bool) -> Result<()> {
        if !self.collecting {
            return Ok(());
        }
        let rank = self.rank.map(|r| r.global);
        let dir = self.metrics_tmp_dir.clone();
        for record in self.metrics.values_mut() {
            store::save_metric(record, &dir, format, use_compression, rank)?;
        }
        Ok(())
    }

    /// Clear all buffered state, returning the registry to its just-initialized
    /// shape. Directory layout and run id are unchanged.
    pub fn reset(&mut self) {
        self.metrics.clear();
        self.parameters.clear();
        self.artifacts.clear();
        self.cumulative.clear();
    }
}

/// Whether a metric name's trailing segment collides with a context tag,
/// making `{name}_{CONTEXT}` file names ambiguous to parse.
fn name_shadows_context(name: &str) -> bool {
    name.rsplit('_')
        .next()
        .is_some_and(|seg| seg.parse::<Context>().is_ok())
}

/// Count existing run directories for the experiment to allocate the next id.
fn next_run_id(save_root: &Path, experiment_name: &str) -> Result<u32> {
    let prefix = format!("{experiment_name}_");
    let mut count = 0u32;
    for entry in std::fs::read_dir(save_root)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(rest) = file_name.to_string_lossy().strip_prefix(&prefix).map(str::to_string)
        else {
            continue;
        };
        if rest.parse::<u32>().is_ok() {
            count += 1;
        }
    }
    Ok(count)
}
