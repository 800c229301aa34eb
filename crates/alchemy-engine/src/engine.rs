//! Resource lifecycle engine
//!
//! Drives every declared resource through its state machine, fanning
//! out lifecycle calls for independent resources and joining on the
//! dependency graph's partial order. Three guarantees hold throughout:
//! a dependency's completion is observable before its dependents start,
//! a record is persisted before the resource's output is exposed, and a
//! failed dependency fails its dependents without invoking them.

use crate::error::{EngineError, Result};
use crate::graph::DependencyGraph;
use crate::provider::{Provider, ProviderContext, ProviderRegistry};
use crate::report::{ActionKind, ResourceOutcome, RunReport};
use crate::scope::{DeclaredResource, Phase, RunInner};
use alchemy_core::{ResourceRecord, ResourceStatus, Value, codec};
use indexmap::IndexMap;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, mpsc};

/// Execute the run's declared resource set.
pub(crate) async fn execute(
    run: Arc<RunInner>,
    providers: Arc<ProviderRegistry>,
) -> Result<RunReport> {
    let started = Instant::now();
    let decls: Vec<DeclaredResource> = {
        let resources = run.resources.lock().expect("scope mutex poisoned");
        resources.values().cloned().collect()
    };

    // Fail before touching anything if a declaration has no provider.
    for decl in &decls {
        if providers.get(&decl.resource_type).is_none() {
            return Err(EngineError::UnknownResourceType {
                fqn: decl.fqn.clone(),
                resource_type: decl.resource_type.clone(),
            });
        }
    }

    let mut graph = DependencyGraph::new();
    for decl in &decls {
        graph.add_node(&decl.fqn);
    }
    for decl in &decls {
        for dep in &decl.dependencies {
            graph.add_dependency(&decl.fqn, dep);
        }
    }
    // Validates cycles and dangling references; also the deterministic
    // sequential order used to seed scheduling.
    let mut seed_order = graph.execution_order()?;
    if run.phase == Phase::Destroy {
        seed_order.reverse();
    }

    tracing::info!(
        phase = %run.phase,
        resources = decls.len(),
        prefix = %run.prefix(),
        "run starting"
    );

    // Scheduling edges. Going up (or reading), a resource waits for its
    // dependencies; tearing down, for its dependents.
    let mut waits_on: HashMap<String, Vec<String>> = HashMap::with_capacity(decls.len());
    let mut unblocks: HashMap<String, Vec<String>> = HashMap::with_capacity(decls.len());
    for decl in &decls {
        waits_on.entry(decl.fqn.clone()).or_default();
        unblocks.entry(decl.fqn.clone()).or_default();
    }
    for decl in &decls {
        for dep in &decl.dependencies {
            let (waiter, blocker) = match run.phase {
                Phase::Up | Phase::Read => (decl.fqn.clone(), dep.clone()),
                Phase::Destroy => (dep.clone(), decl.fqn.clone()),
            };
            waits_on
                .get_mut(&waiter)
                .expect("all nodes seeded above")
                .push(blocker.clone());
            unblocks
                .get_mut(&blocker)
                .expect("all nodes seeded above")
                .push(waiter);
        }
    }

    let decl_map: HashMap<String, DeclaredResource> =
        decls.iter().map(|d| (d.fqn.clone(), d.clone())).collect();
    let total = decls.len();
    let (done_tx, mut done_rx) = mpsc::channel::<ResourceOutcome>(total.max(1));
    let semaphore = Arc::new(Semaphore::new(run.concurrency));

    let mut pending: HashMap<String, usize> = waits_on
        .iter()
        .map(|(fqn, blockers)| (fqn.clone(), blockers.len()))
        .collect();
    let mut settled: IndexMap<String, ResourceOutcome> = IndexMap::with_capacity(total);
    let mut cascade: VecDeque<ResourceOutcome> = VecDeque::new();

    let spawn_one = |fqn: &str, settled: &IndexMap<String, ResourceOutcome>| {
        let decl = decl_map.get(fqn).expect("scheduled fqn is declared").clone();
        let provider = providers
            .get(&decl.resource_type)
            .expect("pre-flight checked");
        // Outputs of direct dependencies that have settled successfully
        let dep_outputs: IndexMap<String, Value> = decl
            .dependencies
            .iter()
            .filter_map(|dep| {
                settled
                    .get(dep)
                    .and_then(|o| o.output.clone())
                    .map(|output| (dep.clone(), output))
            })
            .collect();
        let run = Arc::clone(&run);
        let tx = done_tx.clone();
        let semaphore = Arc::clone(&semaphore);
        tokio::spawn(async move {
            // The semaphore is never closed; a failed acquire just
            // means running uncapped.
            let _permit = semaphore.acquire_owned().await.ok();
            let outcome = match run.phase {
                Phase::Up => converge(&run, provider.as_ref(), &decl, dep_outputs).await,
                Phase::Destroy => destroy(&run, provider.as_ref(), &decl).await,
                Phase::Read => read(&run, provider.as_ref(), &decl).await,
            };
            let _ = tx.send(outcome).await;
        });
    };

    for fqn in &seed_order {
        if pending.get(fqn).copied() == Some(0) {
            spawn_one(fqn, &settled);
        }
    }

    while settled.len() < total {
        let outcome = match cascade.pop_front() {
            Some(outcome) => outcome,
            None => done_rx.recv().await.ok_or_else(|| {
                EngineError::Scheduler("completion channel closed unexpectedly".to_string())
            })?,
        };
        let fqn = outcome.fqn.clone();
        settled.insert(fqn.clone(), outcome);

        for waiter in &unblocks[&fqn] {
            let remaining = pending
                .get_mut(waiter)
                .expect("all nodes seeded above");
            *remaining -= 1;
            if *remaining > 0 {
                continue;
            }
            // Every blocker has settled; fail fast if any of them failed.
            let failed_blocker = waits_on[waiter]
                .iter()
                .find(|blocker| settled.get(*blocker).is_some_and(ResourceOutcome::is_failure));
            match failed_blocker {
                Some(blocker) => {
                    let decl = &decl_map[waiter];
                    tracing::warn!(fqn = %waiter, blocker = %blocker, "failing without provider call");
                    let error = EngineError::DependencyFailed {
                        fqn: waiter.clone(),
                        dependency: blocker.clone(),
                    };
                    cascade.push_back(ResourceOutcome {
                        fqn: waiter.clone(),
                        resource_type: decl.resource_type.clone(),
                        action: ActionKind::Skip,
                        // The durable record, if any, is left untouched.
                        status: None,
                        output: None,
                        error: Some(error.to_string()),
                    });
                }
                None => spawn_one(waiter, &settled),
            }
        }
    }

    // Report in declaration order regardless of completion order.
    let mut outcomes = IndexMap::with_capacity(total);
    for decl in &decls {
        if let Some(outcome) = settled.shift_remove(&decl.fqn) {
            outcomes.insert(decl.fqn.clone(), outcome);
        }
    }

    let report = RunReport {
        outcomes,
        reconcile: None,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    tracing::info!(summary = %report.summary(), "run finished");
    Ok(report)
}

fn context(run: &RunInner, fqn: &str, dep_outputs: IndexMap<String, Value>) -> ProviderContext {
    ProviderContext::new(
        fqn.to_string(),
        run.stage.clone(),
        run.phase,
        run.credentials.clone(),
        dep_outputs,
    )
}

fn decode_output(record: &ResourceRecord, run: &RunInner) -> Result<Option<Value>> {
    record
        .output
        .as_ref()
        .map(|output| codec::decode(output, &run.cipher))
        .transpose()
        .map_err(EngineError::from)
}

async fn converge(
    run: &RunInner,
    provider: &dyn Provider,
    decl: &DeclaredResource,
    dep_outputs: IndexMap<String, Value>,
) -> ResourceOutcome {
    match converge_inner(run, provider, decl, dep_outputs).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(fqn = %decl.fqn, error = %e, "resource failed");
            ResourceOutcome::failure(&decl.fqn, &decl.resource_type, ActionKind::Create, e.to_string())
        }
    }
}

async fn converge_inner(
    run: &RunInner,
    provider: &dyn Provider,
    decl: &DeclaredResource,
    dep_outputs: IndexMap<String, Value>,
) -> Result<ResourceOutcome> {
    let prefix = run.prefix();
    let ctx = context(run, &decl.fqn, dep_outputs);
    let prior = run.store.get(&prefix, &decl.key).await?;

    // Diff-based skip: identical props on a settled record mean no
    // provider call at all. Comparison happens on decoded values so
    // nondeterministic secret ciphertexts cannot defeat it.
    if let Some(record) = &prior
        && record.status.is_live()
    {
        let prior_props = codec::decode(&record.props, &run.cipher)?;
        if prior_props == decl.props {
            tracing::debug!(fqn = %decl.fqn, "props unchanged, skipping");
            return Ok(ResourceOutcome {
                fqn: decl.fqn.clone(),
                resource_type: decl.resource_type.clone(),
                action: ActionKind::Skip,
                status: Some(record.status),
                output: decode_output(record, run)?,
                error: None,
            });
        }
    }

    let props_json = codec::encode(&decl.props, &run.cipher)?;
    let (mut record, prior_output) = match prior {
        Some(record) => {
            let prior_output = decode_output(&record, run)?;
            (record, prior_output)
        }
        None => {
            let record = ResourceRecord::new(&decl.fqn, &decl.resource_type, props_json.clone())
                .with_scope_path(decl.scope_path.clone());
            // With no recorded state, adoption asks the provider
            // whether the identity already exists out-of-band and
            // takes the live object over as prior state.
            let adopted = if decl.adopt {
                let live = provider.read(&ctx, &decl.fqn).await.map_err(|e| {
                    EngineError::Provider {
                        fqn: decl.fqn.clone(),
                        source: e,
                    }
                })?;
                if live.is_some() {
                    tracing::info!(fqn = %decl.fqn, "adopting existing resource");
                }
                live
            } else {
                None
            };
            (record, adopted)
        }
    };
    record.props = props_json;
    record.dependencies = decl.dependencies.iter().cloned().collect();

    match prior_output {
        Some(prior_output) => {
            record.transition(ResourceStatus::Updating);
            run.store.set(&prefix, &decl.key, &record).await?;
            tracing::info!(fqn = %decl.fqn, "updating");
            let result = provider.update(&ctx, &prior_output, &decl.props).await;
            settle(run, decl, record, result, ActionKind::Update).await
        }
        None => {
            record.transition(ResourceStatus::Creating);
            run.store.set(&prefix, &decl.key, &record).await?;
            tracing::info!(fqn = %decl.fqn, "creating");
            let result = provider.create(&ctx, &decl.props, None).await;
            settle(run, decl, record, result, ActionKind::Create).await
        }
    }
}

/// Persist the result of a create/update call. Persistence happens
/// before the outcome is returned, so a crash after a successful
/// provider call still leaves a durable record to resume from.
async fn settle(
    run: &RunInner,
    decl: &DeclaredResource,
    mut record: ResourceRecord,
    result: anyhow::Result<Value>,
    action: ActionKind,
) -> Result<ResourceOutcome> {
    let prefix = run.prefix();
    match result {
        Ok(output) => {
            record.output = Some(codec::encode(&output, &run.cipher)?);
            record.transition(match action {
                ActionKind::Create => ResourceStatus::Created,
                _ => ResourceStatus::Updated,
            });
            run.store.set(&prefix, &decl.key, &record).await?;
            tracing::info!(fqn = %decl.fqn, status = %record.status, "resource settled");
            Ok(ResourceOutcome {
                fqn: decl.fqn.clone(),
                resource_type: decl.resource_type.clone(),
                action,
                status: Some(record.status),
                output: Some(output),
                error: None,
            })
        }
        Err(e) => {
            record.transition(ResourceStatus::Failed);
            if let Err(persist) = run.store.set(&prefix, &decl.key, &record).await {
                tracing::warn!(fqn = %decl.fqn, error = %persist, "could not persist failed status");
            }
            let error = EngineError::Provider {
                fqn: decl.fqn.clone(),
                source: e,
            };
            tracing::warn!(fqn = %decl.fqn, error = %error, "provider call failed");
            Ok(ResourceOutcome::failure(
                &decl.fqn,
                &decl.resource_type,
                action,
                error.to_string(),
            ))
        }
    }
}

async fn destroy(run: &RunInner, provider: &dyn Provider, decl: &DeclaredResource) -> ResourceOutcome {
    match destroy_inner(run, provider, decl).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(fqn = %decl.fqn, error = %e, "delete failed");
            ResourceOutcome::failure(&decl.fqn, &decl.resource_type, ActionKind::Delete, e.to_string())
        }
    }
}

async fn destroy_inner(
    run: &RunInner,
    provider: &dyn Provider,
    decl: &DeclaredResource,
) -> Result<ResourceOutcome> {
    let prefix = run.prefix();
    let Some(mut record) = run.store.get(&prefix, &decl.key).await? else {
        tracing::debug!(fqn = %decl.fqn, "nothing recorded, skipping delete");
        return Ok(ResourceOutcome {
            fqn: decl.fqn.clone(),
            resource_type: decl.resource_type.clone(),
            action: ActionKind::Skip,
            status: None,
            output: None,
            error: None,
        });
    };

    let prior_output = decode_output(&record, run)?.unwrap_or(Value::Null);
    record.transition(ResourceStatus::Deleting);
    run.store.set(&prefix, &decl.key, &record).await?;
    tracing::info!(fqn = %decl.fqn, "deleting");

    let ctx = context(run, &decl.fqn, IndexMap::new());
    match provider.delete(&ctx, &prior_output).await {
        Ok(()) => {
            // The delete transition is the only thing that ever
            // removes a record from the store.
            run.store.delete(&prefix, &decl.key).await?;
            Ok(ResourceOutcome {
                fqn: decl.fqn.clone(),
                resource_type: decl.resource_type.clone(),
                action: ActionKind::Delete,
                status: Some(ResourceStatus::Deleted),
                output: None,
                error: None,
            })
        }
        Err(e) => {
            record.transition(ResourceStatus::Failed);
            if let Err(persist) = run.store.set(&prefix, &decl.key, &record).await {
                tracing::warn!(fqn = %decl.fqn, error = %persist, "could not persist failed status");
            }
            let error = EngineError::Provider {
                fqn: decl.fqn.clone(),
                source: e,
            };
            Ok(ResourceOutcome::failure(
                &decl.fqn,
                &decl.resource_type,
                ActionKind::Delete,
                error.to_string(),
            ))
        }
    }
}

async fn read(run: &RunInner, provider: &dyn Provider, decl: &DeclaredResource) -> ResourceOutcome {
    match read_inner(run, provider, decl).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(fqn = %decl.fqn, error = %e, "read failed");
            ResourceOutcome::failure(&decl.fqn, &decl.resource_type, ActionKind::Read, e.to_string())
        }
    }
}

async fn read_inner(
    run: &RunInner,
    provider: &dyn Provider,
    decl: &DeclaredResource,
) -> Result<ResourceOutcome> {
    let prefix = run.prefix();
    let prior = run.store.get(&prefix, &decl.key).await?;
    let ctx = context(run, &decl.fqn, IndexMap::new());
    let live = provider
        .read(&ctx, &decl.fqn)
        .await
        .map_err(|e| EngineError::Provider {
            fqn: decl.fqn.clone(),
            source: e,
        })?;
    let output = match live {
        Some(live) => Some(live),
        None => match &prior {
            Some(record) => decode_output(record, run)?,
            None => None,
        },
    };
    // Read-only: nothing is persisted, the status stays whatever was
    // recorded before.
    Ok(ResourceOutcome {
        fqn: decl.fqn.clone(),
        resource_type: decl.resource_type.clone(),
        action: ActionKind::Read,
        status: prior.map(|record| record.status),
        output,
        error: None,
    })
}
