//! Dynamic fan-out: one task instance per manifest chunk.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pitgrid_core::{Chunk, ChunkId, ChunkResult, PipelineEvent, RedistributionManifest, RunId};

use crate::artifact::Artifacts;
use crate::error::{ChunkFailure, EngineError};
use crate::graph::ChunkTask;

/// Sends pipeline events to the run report.
#[derive(Clone)]
pub struct EventSink {
    run_id: RunId,
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl EventSink {
    /// Create a sink and the receiver that drains it.
    pub fn channel(run_id: RunId) -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { run_id, tx }, rx)
    }

    pub fn run_id(&self) -> RunId {
        self.run_id.clone()
    }

    /// Record an event. Dropped silently once the report is closed.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Run `template` once per chunk of `manifest`, at most `limit` at a time.
///
/// Instances are independent: a failing chunk never cancels its siblings,
/// every instance runs to completion before this returns. If any instance
/// failed the whole fan-out fails with every failing chunk listed, and no
/// results are returned. Results come back in manifest order.
pub async fn fan_out(
    node: &str,
    template: Arc<dyn ChunkTask>,
    manifest: &RedistributionManifest,
    inputs: Arc<Artifacts>,
    limit: Arc<Semaphore>,
    events: EventSink,
) -> Result<Vec<ChunkResult>, EngineError> {
    let total = manifest.len();
    info!(node = %node, instances = total, "Fanning out over manifest");
    events.emit(PipelineEvent::fan_out_resolved(events.run_id(), node, total));

    let handles: Vec<(ChunkId, JoinHandle<Result<ChunkResult, EngineError>>)> = manifest
        .chunks()
        .iter()
        .map(|chunk| {
            let handle = tokio::spawn(run_instance(
                node.to_string(),
                template.clone(),
                chunk.clone(),
                inputs.clone(),
                limit.clone(),
                events.clone(),
            ));
            (chunk.id.clone(), handle)
        })
        .collect();

    let mut results = Vec::with_capacity(total);
    let mut failed = Vec::new();
    for (chunk, handle) in handles {
        match handle.await {
            Ok(Ok(result)) => results.push(result),
            Ok(Err(e)) => failed.push(ChunkFailure {
                chunk,
                error: e.to_string(),
            }),
            Err(e) => {
                warn!(node = %node, chunk = %chunk, error = %e, "Chunk task aborted");
                failed.push(ChunkFailure {
                    chunk,
                    error: format!("task aborted: {}", e),
                });
            }
        }
    }

    if !failed.is_empty() {
        warn!(
            node = %node,
            failed = failed.len(),
            succeeded = results.len(),
            "Fan-out finished with failures"
        );
        return Err(EngineError::FanOutFailed {
            node: node.to_string(),
            total,
            failed,
        });
    }

    info!(node = %node, instances = total, "Fan-out completed");
    Ok(results)
}

async fn run_instance(
    node: String,
    template: Arc<dyn ChunkTask>,
    chunk: Chunk,
    inputs: Arc<Artifacts>,
    limit: Arc<Semaphore>,
    events: EventSink,
) -> Result<ChunkResult, EngineError> {
    let _permit = limit
        .acquire_owned()
        .await
        .map_err(|e| EngineError::Join(e.to_string()))?;

    let started = Instant::now();
    debug!(node = %node, chunk = %chunk.id, count = chunk.count, "Chunk started");
    events.emit(PipelineEvent::chunk_started(events.run_id(), &node, chunk.id.clone()));

    let outcome = template.run_chunk(&chunk, &inputs).await.and_then(|result| {
        if result.chunk != chunk.id {
            return Err(EngineError::Core(pitgrid_core::CoreError::UnexpectedChunkResult(
                result.chunk,
            )));
        }
        Ok(result)
    });

    match &outcome {
        Ok(result) => {
            debug!(
                node = %node,
                chunk = %chunk.id,
                values = result.values.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Chunk completed"
            );
            events.emit(PipelineEvent::chunk_completed(
                events.run_id(),
                &node,
                chunk.id.clone(),
                result.values.len(),
            ));
        }
        Err(e) => {
            warn!(node = %node, chunk = %chunk.id, error = %e, "Chunk failed");
            events.emit(PipelineEvent::chunk_failed(
                events.run_id(),
                &node,
                chunk.id.clone(),
                &e.to_string(),
            ));
        }
    }
    outcome
}
