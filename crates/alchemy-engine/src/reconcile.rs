//! Orphan reconciliation
//!
//! After an `up` run, anything recorded under the run's prefix that is
//! no longer declared is an orphan and gets deleted — strictly one at a
//! time, in reverse dependency order computed over the *recorded*
//! dependency sets, so a resource is only deleted after everything that
//! depended on it. Failures are reported, not rolled back.

use crate::error::{EngineError, Result};
use crate::graph::DependencyGraph;
use crate::provider::{ProviderContext, ProviderRegistry};
use crate::report::ReconcileReport;
use crate::scope::{Phase, RunInner};
use alchemy_core::{ResourceRecord, ResourceStatus, Value, codec};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

pub(crate) async fn reconcile(
    run: &Arc<RunInner>,
    providers: &Arc<ProviderRegistry>,
    declared_keys: &[String],
) -> Result<ReconcileReport> {
    let prefix = run.prefix();
    let recorded = run.store.all(&prefix).await?;
    let declared: HashSet<&str> = declared_keys.iter().map(String::as_str).collect();

    let orphans: HashSet<&str> = recorded
        .keys()
        .map(String::as_str)
        .filter(|key| !declared.contains(key))
        .collect();
    if orphans.is_empty() {
        return Ok(ReconcileReport::default());
    }
    tracing::info!(count = orphans.len(), "reconciling orphaned resources");

    // Teardown order over everything recorded, then restricted to the
    // orphans; declared records still order their orphaned dependents.
    let mut graph = DependencyGraph::new();
    for key in recorded.keys() {
        graph.add_node(key.clone());
    }
    for (key, record) in &recorded {
        for dep_fqn in &record.dependencies {
            let dep_key = run.key_of(dep_fqn);
            if recorded.contains_key(&dep_key) {
                graph.add_dependency(key, &dep_key);
            }
        }
    }
    let order = graph.teardown_order()?;

    let mut report = ReconcileReport::default();
    for key in order {
        if !orphans.contains(key.as_str()) {
            continue;
        }
        let record = &recorded[&key];
        match delete_orphan(run, providers, &key, record).await {
            Ok(()) => {
                tracing::info!(key = %key, fqn = %record.fqn, "orphan deleted");
                report.deleted.push(key);
            }
            Err(e) => {
                tracing::warn!(key = %key, fqn = %record.fqn, error = %e, "orphan delete failed");
                report.failed.push((key, e.to_string()));
            }
        }
    }
    Ok(report)
}

async fn delete_orphan(
    run: &Arc<RunInner>,
    providers: &Arc<ProviderRegistry>,
    key: &str,
    record: &ResourceRecord,
) -> Result<()> {
    let provider =
        providers
            .get(&record.resource_type)
            .ok_or_else(|| EngineError::UnknownResourceType {
                fqn: record.fqn.clone(),
                resource_type: record.resource_type.clone(),
            })?;
    let prefix = run.prefix();
    let prior_output = record
        .output
        .as_ref()
        .map(|output| codec::decode(output, &run.cipher))
        .transpose()?
        .unwrap_or(Value::Null);

    let mut marker = record.clone();
    marker.transition(ResourceStatus::Deleting);
    run.store.set(&prefix, key, &marker).await?;

    let ctx = ProviderContext::new(
        record.fqn.clone(),
        run.stage.clone(),
        Phase::Destroy,
        run.credentials.clone(),
        IndexMap::new(),
    );
    if let Err(e) = provider.delete(&ctx, &prior_output).await {
        marker.transition(ResourceStatus::Failed);
        if let Err(persist) = run.store.set(&prefix, key, &marker).await {
            tracing::warn!(key = %key, error = %persist, "could not persist failed status");
        }
        return Err(EngineError::Provider {
            fqn: record.fqn.clone(),
            source: e,
        });
    }

    run.store.delete(&prefix, key).await?;
    Ok(())
}
