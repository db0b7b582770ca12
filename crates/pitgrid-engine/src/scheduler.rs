//! Graph scheduler - runs ready nodes in parallel, bounded by `cpu_count`.
//!
//! A node starts once every node it depends on has completed. Plain task
//! nodes hold one parallelism slot while running; fan-out nodes hold none
//! themselves and let each instance take a slot. On a hard failure no new
//! node starts, nodes already running finish, and everything not yet
//! started is marked skipped.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{error, info, warn};

use pitgrid_core::{NodeStatus, PipelineEvent, RunId};

use crate::artifact::{Artifact, Artifacts};
use crate::error::EngineError;
use crate::fanout::{fan_out, EventSink};
use crate::graph::{Binding, NodeKind, TaskGraph, FAN_OUT_RESULTS};

/// Outcome of one graph execution.
#[derive(Debug)]
pub struct RunReport {
    /// Identifier of this execution.
    pub run_id: RunId,

    /// Final status of every node.
    pub statuses: HashMap<String, NodeStatus>,

    /// Outputs of completed nodes.
    pub outputs: HashMap<String, Artifacts>,

    /// Failures of nodes marked `allow_failure`.
    pub soft_failures: Vec<(String, String)>,

    /// Every event recorded during the run, in emission order.
    pub events: Vec<PipelineEvent>,

    /// The failure that halted the run, if any.
    pub error: Option<EngineError>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn status(&self, node: &str) -> NodeStatus {
        self.statuses.get(node).copied().unwrap_or_default()
    }

    /// Returns true if no node failed hard.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Outputs of a completed node.
    pub fn outputs_of(&self, node: &str) -> Option<&Artifacts> {
        self.outputs.get(node)
    }

    /// Wall-clock duration of the run.
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Graph scheduler.
pub struct Scheduler {
    cpu_count: usize,
}

impl Scheduler {
    /// Create a new Scheduler with the given parallelism bound.
    pub fn new(cpu_count: usize) -> Self {
        Self {
            cpu_count: cpu_count.max(1),
        }
    }

    /// Execute `graph` with the supplied graph inputs.
    ///
    /// Returns `Err` only when the inputs do not satisfy the graph; node
    /// failures are reported through [`RunReport::error`].
    pub async fn run(&self, graph: &TaskGraph, inputs: Artifacts) -> Result<RunReport, EngineError> {
        for name in graph.inputs() {
            if !inputs.contains(name) {
                return Err(EngineError::MissingInput(name.clone()));
            }
        }

        let run_id = RunId::generate();
        let started_at = Utc::now();
        let (events, mut event_rx) = EventSink::channel(run_id.clone());
        let limit = Arc::new(Semaphore::new(self.cpu_count));
        let nodes = graph.nodes();

        info!(
            run_id = %run_id,
            nodes = nodes.len(),
            cpu_count = self.cpu_count,
            "Starting graph execution"
        );

        let mut statuses = vec![NodeStatus::Pending; nodes.len()];
        let mut pending: Vec<usize> = (0..nodes.len()).map(|i| graph.deps(i).len()).collect();
        let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| pending[i] == 0).collect();
        let mut outputs: HashMap<usize, Artifacts> = HashMap::new();
        let mut soft_failures = Vec::new();
        let mut halt: Option<EngineError> = None;
        let mut running = JoinSet::new();
        let mut spawned: HashMap<task::Id, usize> = HashMap::new();

        loop {
            while halt.is_none() {
                let Some(i) = ready.pop_first() else { break };
                let node = &nodes[i];

                let resolved = match resolve_inputs(graph, i, &inputs, &outputs) {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        statuses[i] = NodeStatus::Failed;
                        events.emit(PipelineEvent::node_failed(run_id.clone(), &node.name, &e.to_string()));
                        halt = Some(EngineError::NodeFailed {
                            node: node.name.clone(),
                            source: Box::new(e),
                        });
                        break;
                    }
                };

                statuses[i] = NodeStatus::Running;
                info!(node = %node.name, "Node started");
                events.emit(PipelineEvent::node_started(run_id.clone(), &node.name));

                let name = node.name.clone();
                let kind = node.kind.clone();
                let limit = limit.clone();
                let events = events.clone();
                let handle = running.spawn(async move {
                    let started = Instant::now();
                    let result = execute_node(&name, kind, resolved, limit, events).await;
                    (result, started.elapsed())
                });
                spawned.insert(handle.id(), i);
            }

            let Some(joined) = running.join_next_with_id().await else { break };
            let (id, result, elapsed) = match joined {
                Ok((id, (result, elapsed))) => (id, result, elapsed),
                Err(e) => (e.id(), Err(EngineError::Join(e.to_string())), Duration::ZERO),
            };
            let Some(i) = spawned.remove(&id) else {
                error!(task_id = %id, "Joined a task with no node");
                continue;
            };
            let node = &nodes[i];
            let result = result.and_then(|out| check_outputs(&node.name, &node.outputs, out));

            match result {
                Ok(out) => {
                    statuses[i] = NodeStatus::Completed;
                    info!(node = %node.name, elapsed_ms = elapsed.as_millis() as u64, "Node completed");
                    events.emit(PipelineEvent::node_completed(
                        run_id.clone(),
                        &node.name,
                        elapsed.as_millis() as i64,
                    ));
                    outputs.insert(i, out);
                    for &k in graph.dependents(i) {
                        pending[k] -= 1;
                        if pending[k] == 0 && statuses[k] == NodeStatus::Pending {
                            ready.insert(k);
                        }
                    }
                }
                Err(e) => {
                    statuses[i] = NodeStatus::Failed;
                    events.emit(PipelineEvent::node_failed(run_id.clone(), &node.name, &e.to_string()));
                    if node.allow_failure {
                        warn!(node = %node.name, error = %e, "Optional node failed, continuing");
                        soft_failures.push((node.name.clone(), e.to_string()));
                        skip_dependents(graph, i, &mut statuses, &events, &run_id);
                    } else {
                        error!(node = %node.name, error = %e, "Node failed, halting graph");
                        halt.get_or_insert(EngineError::NodeFailed {
                            node: node.name.clone(),
                            source: Box::new(e),
                        });
                    }
                }
            }
        }

        for (i, status) in statuses.iter_mut().enumerate() {
            if !status.is_terminal() {
                *status = NodeStatus::Skipped;
                events.emit(PipelineEvent::node_skipped(run_id.clone(), &nodes[i].name));
            }
        }

        drop(events);
        let mut recorded = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            recorded.push(event);
        }

        match &halt {
            Some(e) => error!(run_id = %run_id, error = %e, "Graph execution failed"),
            None => info!(run_id = %run_id, "Graph execution completed"),
        }

        Ok(RunReport {
            run_id,
            statuses: nodes
                .iter()
                .zip(statuses)
                .map(|(n, s)| (n.name.clone(), s))
                .collect(),
            outputs: outputs
                .into_iter()
                .map(|(i, out)| (nodes[i].name.clone(), out))
                .collect(),
            soft_failures,
            events: recorded,
            error: halt,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

async fn execute_node(
    name: &str,
    kind: NodeKind,
    resolved: ResolvedInputs,
    limit: Arc<Semaphore>,
    events: EventSink,
) -> Result<Artifacts, EngineError> {
    match kind {
        NodeKind::Task(task) => {
            let _permit = limit
                .acquire_owned()
                .await
                .map_err(|e| EngineError::Join(e.to_string()))?;
            task.run(&resolved.inputs).await
        }
        NodeKind::FanOut { template, .. } => {
            let manifest = resolved.loop_source.ok_or_else(|| EngineError::MissingArtifact {
                node: name.to_string(),
                input: "loop source".to_string(),
            })?;
            let results = fan_out(
                name,
                template,
                &manifest,
                Arc::new(resolved.inputs),
                limit,
                events,
            )
            .await?;
            Ok(Artifacts::new(name).with(FAN_OUT_RESULTS, Artifact::ChunkResults(Arc::new(results))))
        }
    }
}

struct ResolvedInputs {
    inputs: Artifacts,
    loop_source: Option<Arc<pitgrid_core::RedistributionManifest>>,
}

fn resolve_inputs(
    graph: &TaskGraph,
    i: usize,
    graph_inputs: &Artifacts,
    outputs: &HashMap<usize, Artifacts>,
) -> Result<ResolvedInputs, EngineError> {
    let node = &graph.nodes()[i];
    let lookup = |node_name: &str, output: &str| -> Result<Artifact, EngineError> {
        let j = graph
            .nodes()
            .iter()
            .position(|n| n.name == node_name)
            .ok_or_else(|| EngineError::MissingInput(node_name.to_string()))?;
        let produced = outputs
            .get(&j)
            .ok_or_else(|| EngineError::MissingInput(format!("{}.{}", node_name, output)))?;
        produced.get(output).cloned()
    };

    let mut inputs = Artifacts::new(node.name.clone());
    for (name, binding) in &node.inputs {
        let value = match binding {
            Binding::Literal(v) => v.clone(),
            Binding::Input(input) => graph_inputs.get(input)?.clone(),
            Binding::Output(r) => lookup(&r.node, &r.output)?,
        };
        inputs.insert(name.clone(), value);
    }

    let loop_source = match &node.kind {
        NodeKind::FanOut { loop_source, .. } => {
            match lookup(&loop_source.node, &loop_source.output)? {
                Artifact::Manifest(m) => Some(m),
                other => {
                    return Err(EngineError::ArtifactType {
                        input: format!("{}.{}", loop_source.node, loop_source.output),
                        expected: "manifest",
                        actual: other.kind(),
                    })
                }
            }
        }
        NodeKind::Task(_) => None,
    };

    Ok(ResolvedInputs { inputs, loop_source })
}

fn check_outputs(node: &str, declared: &[String], out: Artifacts) -> Result<Artifacts, EngineError> {
    for name in declared {
        if !out.contains(name) {
            return Err(EngineError::MissingArtifact {
                node: node.to_string(),
                input: name.clone(),
            });
        }
    }
    Ok(out)
}

fn skip_dependents(
    graph: &TaskGraph,
    i: usize,
    statuses: &mut [NodeStatus],
    events: &EventSink,
    run_id: &RunId,
) {
    let mut stack: Vec<usize> = graph.dependents(i).to_vec();
    while let Some(k) = stack.pop() {
        if statuses[k] != NodeStatus::Pending {
            continue;
        }
        statuses[k] = NodeStatus::Skipped;
        events.emit(PipelineEvent::node_skipped(run_id.clone(), graph.nodes()[k].name()));
        stack.extend_from_slice(graph.dependents(k));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use async_trait::async_trait;
    use pitgrid_core::{partition, Chunk, ChunkResult, PartitionStrategy, WorkUnit};

    use crate::graph::tests::Emit;
    use crate::graph::{ChunkTask, GraphBuilder, NodeSpec, OutputRef, Task};

    struct Fail;

    #[async_trait]
    impl Task for Fail {
        async fn run(&self, _inputs: &Artifacts) -> Result<Artifacts, EngineError> {
            Err(EngineError::Malformed {
                path: PathBuf::from("x"),
                reason: "boom".into(),
            })
        }
    }

    struct Panics;

    #[async_trait]
    impl Task for Panics {
        async fn run(&self, _inputs: &Artifacts) -> Result<Artifacts, EngineError> {
            panic!("boom")
        }
    }

    struct Split;

    #[async_trait]
    impl Task for Split {
        async fn run(&self, inputs: &Artifacts) -> Result<Artifacts, EngineError> {
            let size: usize = inputs.text("size")?.parse().unwrap_or(0);
            let manifest = partition(
                &[WorkUnit::new("g", size, "g.pts")],
                PartitionStrategy::balanced(4, 1, 1),
            )?;
            Ok(Artifacts::new("split").with("manifest", manifest))
        }
    }

    struct Count;

    #[async_trait]
    impl ChunkTask for Count {
        async fn run_chunk(&self, chunk: &Chunk, _inputs: &Artifacts) -> Result<ChunkResult, EngineError> {
            Ok(ChunkResult::new(chunk.id.clone(), vec![1.0; chunk.count]))
        }
    }

    struct Sum;

    #[async_trait]
    impl Task for Sum {
        async fn run(&self, inputs: &Artifacts) -> Result<Artifacts, EngineError> {
            let results = inputs.chunk_results("results")?;
            let total: f64 = results.iter().flat_map(|r| r.values.iter()).sum();
            Ok(Artifacts::new("sum").with("total", total.to_string()))
        }
    }

    #[tokio::test]
    async fn test_dynamic_fan_out_width() {
        let graph = GraphBuilder::new()
            .input("size")
            .node(NodeSpec::task("split", Split).from_input("size", "size").output("manifest"))
            .node(NodeSpec::fan_out("trace", Count, OutputRef::new("split", "manifest")))
            .node(
                NodeSpec::task("sum", Sum)
                    .from_output("results", "trace", FAN_OUT_RESULTS)
                    .output("total"),
            )
            .build()
            .unwrap();

        let report = Scheduler::new(2)
            .run(&graph, Artifacts::new("graph").with("size", "10"))
            .await
            .unwrap();

        assert!(report.is_success());
        assert!(report.duration_ms() >= 0);
        assert_eq!(report.outputs_of("sum").unwrap().text("total").unwrap(), "10");
        let trace = report.outputs_of("trace").unwrap().chunk_results("results").unwrap();
        assert_eq!(trace.len(), 4);
    }

    #[tokio::test]
    async fn test_failure_halts_dependents() {
        let graph = GraphBuilder::new()
            .input("x")
            .node(NodeSpec::task("bad", Fail).from_input("x", "x").output("out"))
            .node(NodeSpec::task("after", Emit(vec!["out"])).from_output("v", "bad", "out").output("out"))
            .build()
            .unwrap();

        let report = Scheduler::new(1)
            .run(&graph, Artifacts::new("graph").with("x", "1"))
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.status("bad"), NodeStatus::Failed);
        assert_eq!(report.status("after"), NodeStatus::Skipped);
        assert!(matches!(report.error, Some(EngineError::NodeFailed { .. })));
    }

    #[tokio::test]
    async fn test_optional_failure_continues() {
        let graph = GraphBuilder::new()
            .input("x")
            .node(NodeSpec::task("viz", Fail).from_input("x", "x").allow_failure())
            .node(NodeSpec::task("copy", Emit(vec!["out"])).from_input("x", "x").output("out"))
            .build()
            .unwrap();

        let report = Scheduler::new(1)
            .run(&graph, Artifacts::new("graph").with("x", "1"))
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.status("viz"), NodeStatus::Failed);
        assert_eq!(report.status("copy"), NodeStatus::Completed);
        assert_eq!(report.soft_failures.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_graph_input() {
        let graph = GraphBuilder::new()
            .input("x")
            .node(NodeSpec::task("a", Emit(vec![])).from_input("x", "x"))
            .build()
            .unwrap();

        let result = Scheduler::new(1).run(&graph, Artifacts::new("graph")).await;
        assert!(matches!(result, Err(EngineError::MissingInput(_))));
    }

    #[tokio::test]
    async fn test_undeclared_output_fails_node() {
        let graph = GraphBuilder::new()
            .input("x")
            .node(NodeSpec::task("a", Emit(vec![])).from_input("x", "x").output("promised"))
            .build()
            .unwrap();

        let report = Scheduler::new(1)
            .run(&graph, Artifacts::new("graph").with("x", "1"))
            .await
            .unwrap();
        assert_eq!(report.status("a"), NodeStatus::Failed);
    }

    #[tokio::test]
    async fn test_panicking_node_is_failed_and_named() {
        let graph = GraphBuilder::new()
            .input("x")
            .node(NodeSpec::task("crash", Panics).from_input("x", "x").output("out"))
            .node(NodeSpec::task("after", Emit(vec!["out"])).from_output("v", "crash", "out").output("out"))
            .build()
            .unwrap();

        let report = Scheduler::new(1)
            .run(&graph, Artifacts::new("graph").with("x", "1"))
            .await
            .unwrap();

        assert_eq!(report.status("crash"), NodeStatus::Failed);
        assert_eq!(report.status("after"), NodeStatus::Skipped);
        match &report.error {
            Some(EngineError::NodeFailed { node, source }) => {
                assert_eq!(node, "crash");
                assert!(matches!(source.as_ref(), EngineError::Join(_)));
            }
            other => panic!("expected node failure, got {:?}", other),
        }
        assert!(report
            .events
            .iter()
            .any(|e| e.event_type == pitgrid_core::PipelineEventType::NodeFailed));
    }
}
