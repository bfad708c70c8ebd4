//! Node slots and the compute-closure contract.

use std::fmt;

use dyb_core::{Array, Error, IntoPathKey, PathKey, Result};
use serde::Serialize;

use crate::switch::DataSourceSwitch;

/// Index of a node in its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Index of a parameter in its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl ParameterId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Cache status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Stale,
    Fresh,
}

/// Compute function of a node: upstream values in, new value out.
pub type ComputeFn = Box<dyn Fn(&Inputs<'_>) -> Result<Array> + Send + Sync>;

/// Values handed to a [`ComputeFn`], in declaration order.
pub struct Inputs<'a> {
    pub(crate) node: &'a PathKey,
    pub(crate) nodes: Vec<&'a Array>,
    pub(crate) parameters: Vec<&'a Array>,
}

impl<'a> Inputs<'a> {
    /// Path of the node being computed (for error messages).
    pub fn path(&self) -> &PathKey {
        self.node
    }

    /// Value of the `i`-th upstream node.
    pub fn node(&self, i: usize) -> Result<&'a Array> {
        self.nodes.get(i).copied().ok_or_else(|| {
            Error::Computation(format!(
                "node '{}' has {} inputs, asked for #{i}",
                self.node,
                self.nodes.len()
            ))
        })
    }

    /// Value of the `i`-th declared parameter.
    pub fn parameter(&self, i: usize) -> Result<&'a Array> {
        self.parameters.get(i).copied().ok_or_else(|| {
            Error::Computation(format!(
                "node '{}' has {} parameters, asked for #{i}",
                self.node,
                self.parameters.len()
            ))
        })
    }

    /// Scalar value of the `i`-th declared parameter.
    pub fn scalar(&self, i: usize) -> Result<f64> {
        let p = self.parameter(i)?;
        p.as_scalar().ok_or_else(|| {
            Error::Computation(format!(
                "node '{}': parameter #{i} has shape {:?}, expected a scalar",
                self.node,
                p.shape()
            ))
        })
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_parameters(&self) -> usize {
        self.parameters.len()
    }
}

pub(crate) enum NodeKind {
    /// Fixed data, always fresh
    Input,
    Compute(ComputeFn),
    /// Forwards the value of the selected dependency
    Switch(DataSourceSwitch),
    /// Value written by an eager bulk update (covariance matrices)
    Held,
}

impl NodeKind {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            NodeKind::Input => "input",
            NodeKind::Compute(_) => "compute",
            NodeKind::Switch(_) => "switch",
            NodeKind::Held => "held",
        }
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Switch(sw) => f.debug_tuple("Switch").field(sw).finish(),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct NodeSlot {
    pub(crate) path: PathKey,
    pub(crate) label: Option<String>,
    pub(crate) kind: NodeKind,
    pub(crate) dependencies: Vec<NodeId>,
    pub(crate) parameters: Vec<ParameterId>,
    pub(crate) dependents: Vec<NodeId>,
    pub(crate) status: NodeStatus,
    pub(crate) value: Option<Array>,
    pub(crate) frozen: bool,
    pub(crate) evaluations: u64,
}

impl NodeSlot {
    pub(crate) fn is_fresh(&self) -> bool {
        self.status == NodeStatus::Fresh && self.value.is_some()
    }

    /// Dependencies that must be fresh before this node can be computed.
    pub(crate) fn required_inputs(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Switch(sw) => {
                let i = sw.selected_index();
                &self.dependencies[i..i + 1]
            }
            NodeKind::Input | NodeKind::Held => &[],
            NodeKind::Compute(_) => &self.dependencies,
        }
    }

    /// Whether a change of upstream node `from` can affect this node. A switch only
    /// listens to its selected input.
    pub(crate) fn listens_to(&self, from: NodeId) -> bool {
        match &self.kind {
            NodeKind::Switch(sw) => self.dependencies[sw.selected_index()] == from,
            _ => true,
        }
    }

    /// Input and held nodes never go stale through invalidation.
    pub(crate) fn is_source(&self) -> bool {
        matches!(self.kind, NodeKind::Input | NodeKind::Held)
    }
}

/// Declaration of a computed node, consumed by [`crate::ModelBuilder::node`].
pub struct NodeSpec {
    pub(crate) compute: ComputeFn,
    pub(crate) dependencies: Vec<PathKey>,
    pub(crate) parameters: Vec<PathKey>,
    pub(crate) frozen: bool,
    pub(crate) label: Option<String>,
    pub(crate) error: Option<Error>,
}

impl NodeSpec {
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&Inputs<'_>) -> Result<Array> + Send + Sync + 'static,
    {
        Self {
            compute: Box::new(compute),
            dependencies: Vec::new(),
            parameters: Vec::new(),
            frozen: false,
            label: None,
            error: None,
        }
    }

    /// Upstream nodes, in the order [`Inputs::node`] sees them.
    pub fn depends_on<I>(mut self, paths: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoPathKey,
    {
        for p in paths {
            match p.into_path_key() {
                Ok(k) => self.dependencies.push(k),
                Err(e) => {
                    self.error.get_or_insert(e);
                }
            }
        }
        self
    }

    /// Parameters, in the order [`Inputs::parameter`] sees them.
    pub fn parameters<I>(mut self, paths: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoPathKey,
    {
        for p in paths {
            match p.into_path_key() {
                Ok(k) => self.parameters.push(k),
                Err(e) => {
                    self.error.get_or_insert(e);
                }
            }
        }
        self
    }

    /// Frozen nodes are computed once and then ignore invalidation until
    /// [`crate::Model::update_frozen_nodes`].
    pub fn frozen(mut self, frozen: bool) -> Self {
        self.frozen = frozen;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Read-only snapshot of a node's cache state.
#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub path: PathKey,
    pub kind: &'static str,
    pub status: NodeStatus,
    pub frozen: bool,
    /// Number of times the value was (re)computed
    pub evaluations: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}
