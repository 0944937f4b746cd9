//! Provenance graph builder
//!
//! Folds the run registry state plus the per-rank metric files on disk into
//! one provenance document. Runs once, at run end, single-threaded; it assumes
//! no writer is still flushing metrics into the run's metrics directory.
//!
//! Construction discipline: every node goes through the document's
//! get-or-create, and every repeatable edge carries a deterministic
//! identifier, so building the same state twice yields the same identifier
//! set.

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::DateTime;
use tracing::{debug, warn};

use crate::context::Context;
use crate::graph::ProvDocument;
use crate::run::RunRegistry;
use crate::store;
use crate::Result;

/// Attribute keys are namespaced like the document's wire format.
const TYPE: &str = "prov-ml:type";

/// Build the provenance document for a finished run.
///
/// # Errors
///
/// Returns an error if the metrics directory cannot be scanned or a metric
/// file is malformed. Missing optional inputs (no parameters, no artifacts,
/// no git repository) degrade gracefully.
pub fn create_prov_document(registry: &RunRegistry) -> Result<ProvDocument> {
    let mut doc = ProvDocument::new(registry.namespace());

    let run_name = format!("{}_{}", registry.qualified_name(), registry.run_id());
    let run_activity = format!("{run_name}_execution");
    let user = current_user();

    // Run entity + activity with run metadata.
    let run_entity = doc.entity(&run_name);
    run_entity.insert(TYPE.to_string(), "LearningStage".to_string());
    run_entity.insert(
        "prov-ml:provenance_path".to_string(),
        registry.save_root().display().to_string(),
    );
    run_entity.insert(
        "prov-ml:artifact_uri".to_string(),
        registry.artifacts_dir().display().to_string(),
    );
    run_entity.insert("prov-ml:run_id".to_string(), registry.run_id().to_string());
    run_entity.insert("prov-ml:user_id".to_string(), user.clone());
    run_entity.insert(
        "prov-ml:library_version".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    if let Ok(toolchain) = std::env::var("RUSTUP_TOOLCHAIN") {
        run_entity.insert("prov-ml:toolchain_version".to_string(), toolchain);
    }
    if let Ok(manifest) = std::fs::read_to_string("Cargo.lock") {
        run_entity.insert("prov-ml:dependencies".to_string(), manifest);
    }
    if let Some(rank) = registry.rank() {
        run_entity.insert("prov-ml:global_rank".to_string(), rank.global.to_string());
        run_entity.insert("prov-ml:local_rank".to_string(), rank.local.to_string());
        run_entity.insert("prov-ml:node_rank".to_string(), rank.node.to_string());
    }

    doc.activity(&run_activity)
        .insert(TYPE.to_string(), "LearningExecution".to_string());

    // Experiment container entity.
    let experiment = registry.experiment_name().to_string();
    let experiment_attrs = doc.entity(&experiment);
    experiment_attrs.insert(TYPE.to_string(), "Experiment".to_string());
    experiment_attrs.insert("prov-ml:experiment_name".to_string(), experiment.clone());

    doc.agent(&user);
    doc.was_associated_with(&run_activity, &user);

    // Source code entity; the commit hash is a soft dependency.
    let source_code = doc.entity("source_code");
    source_code.insert(TYPE.to_string(), "SourceCode".to_string());
    source_code.insert("prov-ml:source_name".to_string(), source_name());
    source_code.insert(
        "prov-ml:source_type".to_string(),
        if registry.rank().is_some() { "SLURM" } else { "LOCAL" }.to_string(),
    );
    match git_commit_hash() {
        Some(commit) => {
            doc.activity("commit")
                .insert("prov-ml:source_git_commit".to_string(), commit);
            doc.was_generated_by("source_code", "commit", None);
            doc.was_informed_by(&run_activity, "commit");
        }
        None => {
            warn!("git commit hash unavailable, recording plain source usage");
            doc.used(&run_activity, "source_code");
        }
    }

    doc.had_member(&experiment, &run_name);
    doc.was_generated_by(&run_name, &run_activity, None);

    // Per-rank metric files, in sorted order for deterministic construction.
    for path in metric_files(registry)? {
        ingest_metric_file(&mut doc, &path, &run_activity)?;
    }

    // Parameter entities; dataset-related parameters are folded separately.
    for (name, param) in registry.parameters() {
        if name.contains("dataset") {
            continue;
        }
        let ent = doc.entity(name);
        ent.insert(TYPE.to_string(), "Parameter".to_string());
        ent.insert(
            "prov-ml:parameter_value".to_string(),
            param.value().to_string(),
        );
        doc.used(&run_activity, name);
    }

    // Final run statistics from the cumulative metrics.
    let stats = doc.entity("final_run_statistics");
    stats.insert(TYPE.to_string(), "RunStatistics".to_string());
    for (name, metric) in registry.cumulative_metrics() {
        stats.insert(format!("prov-ml:{name}"), metric.current().to_string());
    }
    doc.was_generated_by("final_run_statistics", &run_activity, None);

    // Dataset entities grouped under one container.
    doc.entity("datasets");
    for (name, param) in registry.parameters() {
        if !name.contains("dataset_stat") {
            continue;
        }
        let Some(prefix) = name.split('_').next() else {
            continue;
        };
        let dataset = format!("{prefix}_dataset");
        if !doc.has_entity(&dataset) {
            doc.entity(&dataset)
                .insert(TYPE.to_string(), "Dataset".to_string());
            doc.used(&run_activity, &dataset);
            doc.had_member("datasets", &dataset);
        }
        let label = name.rsplit('_').next().unwrap_or(name);
        doc.entity(&dataset)
            .insert(format!("prov-ml:{label}"), param.value().to_string());
    }
    doc.was_generated_by("datasets", &run_activity, None);

    // Canonical model version + registration activity + version history.
    let registration = "model_registration";
    let canonical = registry.final_model().map(|model| {
        let ent = doc.entity(model.path());
        ent.insert(TYPE.to_string(), "ModelVersion".to_string());
        ent.insert(
            "prov-ml:artifact_uri".to_string(),
            model.path().to_string(),
        );
        if let Some(step) = model.step() {
            ent.insert("prov-ml:creation_epoch".to_string(), step.to_string());
        }
        if let Some(ms) = model.created_at_ms() {
            ent.insert("prov-ml:creation_timestamp".to_string(), format_ms(ms));
        }
        if let Some(ms) = model.modified_at_ms() {
            ent.insert("prov-ml:last_modified_timestamp".to_string(), format_ms(ms));
        }
        let gen_id = format!("{}_gen", model.path());
        doc.was_generated_by(model.path(), &run_activity, Some(&gen_id));
        model.path().to_string()
    });

    doc.activity(registration)
        .insert(TYPE.to_string(), "ModelRegistration".to_string());
    doc.was_informed_by(registration, &run_activity);

    // Earlier versions become members of the canonical entity; when no model
    // exists the registration activity stands in as the referenced record.
    let history_target = canonical.as_deref().unwrap_or(registration);
    if let Some(model) = canonical.as_deref() {
        doc.was_generated_by(model, registration, None);
    }
    let versions = registry.model_versions();
    for prior in versions.iter().take(versions.len().saturating_sub(1)) {
        doc.had_member(history_target, prior.path());
    }

    doc.activity("data_preparation")
        .insert(TYPE.to_string(), "FeatureExtractionExecution".to_string());

    // Remaining (non-model-version) artifacts.
    for artifact in registry.artifacts() {
        if artifact.is_model_version() {
            continue;
        }
        doc.entity(artifact.path()).insert(
            "prov-ml:artifact_path".to_string(),
            artifact.path().to_string(),
        );
        if artifact.is_serialized_model() {
            doc.was_generated_by(artifact.path(), registration, None);
        } else {
            let gen_id = format!("{}_gen", artifact.path());
            doc.was_generated_by(artifact.path(), &run_activity, Some(&gen_id));
        }
    }

    debug!(
        entities = doc.entity_ids().count(),
        activities = doc.activity_ids().count(),
        "built provenance document"
    );
    Ok(doc)
}

/// Default location for the saved document:
/// `{experiment_dir}/provgraph_{qualified_name}_{run_id}.json`.
#[must_use]
pub fn document_path(registry: &RunRegistry) -> PathBuf {
    registry.experiment_dir().join(format!(
        "provgraph_{}_{}.json",
        registry.qualified_name(),
        registry.run_id()
    ))
}

/// Metric files under the run's metrics directory, filtered to this rank when
/// rank filtering is active, in sorted order.
fn metric_files(registry: &RunRegistry) -> Result<Vec<PathBuf>> {
    let dir = registry.metrics_tmp_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let own_rank = registry.rank().map(|r| r.global);
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some((_, _, rank)) = store::parse_metric_file_name(&file_name) else {
            warn!(file = %file_name, "skipping unrecognized file in metrics directory");
            continue;
        };
        if own_rank.is_some() && rank != own_rank {
            continue;
        }
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

/// Fold one metric file into the document: get-or-create the metric entity,
/// ensure the per-context activities exist, and append the epoch/value/
/// timestamp attribute lists in file-read order.
fn ingest_metric_file(doc: &mut ProvDocument, path: &Path, run_activity: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    // metric_files() only yields parseable names
    let Some((name, context, _)) = store::parse_metric_file_name(&file_name) else {
        return Ok(());
    };
    let contents = store::read_metric_file(path)?;

    let metric_entity = format!("{name}_{context}");
    if !doc.has_entity(&metric_entity) {
        let attrs = doc.entity(&metric_entity);
        attrs.insert(TYPE.to_string(), "Metric".to_string());
        attrs.insert("prov-ml:name".to_string(), name.clone());
        attrs.insert("prov-ml:context".to_string(), context.to_string());
        attrs.insert("prov-ml:source".to_string(), contents.source.to_string());
    }

    // Epoch groups keep first-occurrence order: a later flush may append a
    // smaller epoch, and the attribute lists must follow file-read order.
    let mut by_epoch: Vec<(u32, Vec<(f64, i64)>)> = Vec::new();
    for row in &contents.rows {
        match by_epoch.iter_mut().find(|(epoch, _)| *epoch == row.epoch) {
            Some((_, group)) => group.push((row.value, row.timestamp_ms)),
            None => by_epoch.push((row.epoch, vec![(row.value, row.timestamp_ms)])),
        }
    }

    for (epoch, _) in &by_epoch {
        match context {
            Context::Training => {
                let activity = format!("epoch_{epoch}");
                if !doc.has_activity(&activity) {
                    doc.activity(&activity)
                        .insert(TYPE.to_string(), "TrainingExecution".to_string());
                    doc.was_started_by(&activity, run_activity);
                }
                let gen_id = format!("{name}_train_{epoch}_gen");
                doc.was_generated_by(&metric_entity, &activity, Some(&gen_id));
            }
            Context::Validation => {
                let activity = format!("val_epoch_{epoch}");
                if !doc.has_activity(&activity) {
                    doc.activity(&activity)
                        .insert(TYPE.to_string(), "ValidationExecution".to_string());
                    doc.was_started_by(&activity, run_activity);
                }
                let gen_id = format!("{name}_val_{epoch}_gen");
                doc.was_generated_by(&metric_entity, &activity, Some(&gen_id));
            }
            Context::Evaluation => {
                if !doc.has_activity("test") {
                    doc.activity("test")
                        .insert(TYPE.to_string(), "TestingExecution".to_string());
                    doc.was_started_by("test", run_activity);
                }
                let gen_id = format!("{name}_test_gen");
                doc.was_generated_by(&metric_entity, "test", Some(&gen_id));
            }
        }
    }

    let mut epochs = Vec::new();
    let mut values = Vec::new();
    let mut timestamps = Vec::new();
    for (epoch, items) in &by_epoch {
        for (value, timestamp) in items {
            epochs.push(i64::from(*epoch));
            values.push(*value);
            timestamps.push(*timestamp);
        }
    }

    let attrs = doc.entity(&metric_entity);
    append_list_attr(attrs, "prov-ml:metric_epoch_list", &epochs)?;
    append_list_attr(attrs, "prov-ml:metric_value_list", &values)?;
    append_list_attr(attrs, "prov-ml:metric_timestamp_list", &timestamps)?;
    Ok(())
}

/// Extend a stringified list attribute, accumulating across all files that
/// contribute to the same metric entity.
fn append_list_attr<T: serde::Serialize>(
    attrs: &mut crate::graph::AttrMap,
    key: &str,
    items: &[T],
) -> Result<()> {
    let mut list: Vec<serde_json::Value> = match attrs.get(key) {
        Some(existing) => serde_json::from_str(existing)?,
        None => Vec::new(),
    };
    for item in items {
        list.push(serde_json::to_value(item)?);
    }
    attrs.insert(key.to_string(), serde_json::to_string(&list)?);
    Ok(())
}

fn format_ms(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |dt| dt.to_rfc3339())
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn source_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Current commit hash, if the working directory is a git checkout.
///
/// Absence is a first-class state for the builder, never an error.
fn git_commit_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!hash.is_empty()).then_some(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_list_attr_accumulates_in_order() {
        let mut attrs = crate::graph::AttrMap::new();
        append_list_attr(&mut attrs, "prov-ml:metric_epoch_list", &[0i64, 1]).unwrap();
        append_list_attr(&mut attrs, "prov-ml:metric_epoch_list", &[2i64]).unwrap();
        assert_eq!(attrs["prov-ml:metric_epoch_list"], "[0,1,2]");
    }

    #[test]
    fn test_format_ms() {
        assert!(format_ms(1_000).starts_with("1970-01-01T00:00:01"));
    }
}
