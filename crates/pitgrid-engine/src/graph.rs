//! Task graph declaration and build-time validation.
//!
//! A graph is a set of named nodes. Each node reads named inputs, which are
//! literals, graph inputs, or outputs of earlier nodes, and may list extra
//! ordering constraints in `needs`. A fan-out node additionally names a
//! manifest-producing output as its loop source; its instance count is only
//! known once that manifest exists.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use pitgrid_core::{Chunk, ChunkResult};

use crate::artifact::{Artifact, Artifacts};
use crate::error::EngineError;

/// Output name under which a fan-out node publishes its collected results.
pub const FAN_OUT_RESULTS: &str = "results";

/// A unit of computation run once per graph execution.
#[async_trait]
pub trait Task: Send + Sync {
    async fn run(&self, inputs: &Artifacts) -> Result<Artifacts, EngineError>;
}

/// A unit of computation run once per chunk by a fan-out node.
///
/// Instances share the same resolved inputs and must write only to
/// chunk-scoped destinations.
#[async_trait]
pub trait ChunkTask: Send + Sync {
    async fn run_chunk(&self, chunk: &Chunk, inputs: &Artifacts) -> Result<ChunkResult, EngineError>;
}

/// Reference to another node's declared output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRef {
    pub node: String,
    pub output: String,
}

impl OutputRef {
    pub fn new(node: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            output: output.into(),
        }
    }
}

/// Where a node input comes from.
#[derive(Debug, Clone)]
pub enum Binding {
    /// A constant.
    Literal(Artifact),
    /// A graph input supplied at run time.
    Input(String),
    /// An output of a prior node.
    Output(OutputRef),
}

/// What a node does.
#[derive(Clone)]
pub enum NodeKind {
    Task(Arc<dyn Task>),
    FanOut {
        template: Arc<dyn ChunkTask>,
        loop_source: OutputRef,
    },
}

/// Declaration of one node.
#[derive(Clone)]
pub struct NodeSpec {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) inputs: Vec<(String, Binding)>,
    pub(crate) outputs: Vec<String>,
    pub(crate) needs: Vec<String>,
    pub(crate) allow_failure: bool,
}

impl NodeSpec {
    /// A node that runs `task` once.
    pub fn task(name: impl Into<String>, task: impl Task + 'static) -> Self {
        Self::new(name.into(), NodeKind::Task(Arc::new(task)))
    }

    /// A node that runs `template` once per chunk of the manifest found at
    /// `loop_source`.
    pub fn fan_out(
        name: impl Into<String>,
        template: impl ChunkTask + 'static,
        loop_source: OutputRef,
    ) -> Self {
        let mut spec = Self::new(
            name.into(),
            NodeKind::FanOut {
                template: Arc::new(template),
                loop_source,
            },
        );
        spec.outputs.push(FAN_OUT_RESULTS.to_string());
        spec
    }

    fn new(name: String, kind: NodeKind) -> Self {
        Self {
            name,
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            needs: Vec::new(),
            allow_failure: false,
        }
    }

    /// Bind an input to a constant.
    pub fn literal(mut self, name: impl Into<String>, value: impl Into<Artifact>) -> Self {
        self.inputs.push((name.into(), Binding::Literal(value.into())));
        self
    }

    /// Bind an input to a graph input.
    pub fn from_input(mut self, name: impl Into<String>, graph_input: impl Into<String>) -> Self {
        self.inputs.push((name.into(), Binding::Input(graph_input.into())));
        self
    }

    /// Bind an input to another node's output.
    pub fn from_output(
        mut self,
        name: impl Into<String>,
        node: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        self.inputs
            .push((name.into(), Binding::Output(OutputRef::new(node, output))));
        self
    }

    /// Declare an output.
    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    /// Add an ordering constraint on another node.
    pub fn needs(mut self, node: impl Into<String>) -> Self {
        self.needs.push(node.into());
        self
    }

    /// Failure of this node is recorded but does not halt the graph.
    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_fan_out(&self) -> bool {
        matches!(self.kind, NodeKind::FanOut { .. })
    }

    /// Data dependencies: every node this one reads from.
    fn data_sources(&self) -> impl Iterator<Item = &OutputRef> {
        let loop_source = match &self.kind {
            NodeKind::FanOut { loop_source, .. } => Some(loop_source),
            NodeKind::Task(_) => None,
        };
        self.inputs
            .iter()
            .filter_map(|(_, b)| match b {
                Binding::Output(r) => Some(r),
                _ => None,
            })
            .chain(loop_source)
    }

    fn reads_graph_input(&self) -> bool {
        self.inputs.iter().any(|(_, b)| matches!(b, Binding::Input(_)))
    }
}

/// Collects graph inputs and nodes, then validates them into a [`TaskGraph`].
#[derive(Default)]
pub struct GraphBuilder {
    inputs: Vec<String>,
    nodes: Vec<NodeSpec>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a graph input.
    pub fn input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    /// Register a node. Declaration order breaks scheduling ties.
    pub fn node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    /// Validate and freeze the graph.
    ///
    /// Rejects duplicate names, references to unknown nodes or graph inputs,
    /// reads of outputs no prior node declares, cycles, and nodes that no
    /// graph input can reach.
    pub fn build(self) -> Result<TaskGraph, EngineError> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if index.insert(node.name.as_str(), i).is_some() {
                return Err(EngineError::DuplicateNode(node.name.clone()));
            }
        }
        let declared_inputs: HashSet<&str> = self.inputs.iter().map(String::as_str).collect();

        let mut deps: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for (_, binding) in &node.inputs {
                if let Binding::Input(name) = binding {
                    if !declared_inputs.contains(name.as_str()) {
                        return Err(EngineError::UnknownInput {
                            node: node.name.clone(),
                            input: name.clone(),
                        });
                    }
                }
            }

            for source in node.data_sources() {
                let &j = index.get(source.node.as_str()).ok_or_else(|| EngineError::UnknownNode {
                    node: node.name.clone(),
                    missing: source.node.clone(),
                })?;
                let declared = j < i && self.nodes[j].outputs.iter().any(|o| o == &source.output);
                if !declared {
                    return Err(EngineError::UnknownOutput {
                        node: node.name.clone(),
                        from: source.node.clone(),
                        output: source.output.clone(),
                    });
                }
                deps[i].push(j);
            }

            for need in &node.needs {
                let &j = index.get(need.as_str()).ok_or_else(|| EngineError::UnknownNode {
                    node: node.name.clone(),
                    missing: need.clone(),
                })?;
                deps[i].push(j);
            }

            deps[i].sort_unstable();
            deps[i].dedup();
        }

        let order = topological_order(&deps).map_err(|stuck| {
            EngineError::Cycle(stuck.into_iter().map(|i| self.nodes[i].name.clone()).collect())
        })?;

        let mut reachable = vec![false; self.nodes.len()];
        for &i in &order {
            reachable[i] = self.nodes[i].reads_graph_input() || deps[i].iter().any(|&j| reachable[j]);
            if !reachable[i] {
                return Err(EngineError::Unreachable(self.nodes[i].name.clone()));
            }
        }

        let mut dependents = vec![Vec::new(); self.nodes.len()];
        for (i, ds) in deps.iter().enumerate() {
            for &j in ds {
                dependents[j].push(i);
            }
        }

        Ok(TaskGraph {
            inputs: self.inputs,
            nodes: self.nodes,
            deps,
            dependents,
            order,
        })
    }
}

/// Kahn's algorithm; among ready nodes the earliest declared goes first.
/// On a cycle, returns the nodes that could not be ordered.
fn topological_order(deps: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let mut pending: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut dependents = vec![Vec::new(); deps.len()];
    for (i, ds) in deps.iter().enumerate() {
        for &j in ds {
            dependents[j].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..deps.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(deps.len());
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &k in &dependents[i] {
            pending[k] -= 1;
            if pending[k] == 0 {
                ready.insert(k);
            }
        }
    }

    if order.len() == deps.len() {
        Ok(order)
    } else {
        Err((0..deps.len()).filter(|&i| pending[i] > 0).collect())
    }
}

/// A validated, acyclic task graph.
pub struct TaskGraph {
    inputs: Vec<String>,
    nodes: Vec<NodeSpec>,
    deps: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl TaskGraph {
    /// Declared graph inputs.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// A linearization consistent with data and `needs` edges.
    pub fn execution_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.nodes[i].name.as_str()).collect()
    }

    pub(crate) fn deps(&self, i: usize) -> &[usize] {
        &self.deps[i]
    }

    pub(crate) fn dependents(&self, i: usize) -> &[usize] {
        &self.dependents[i]
    }
}
