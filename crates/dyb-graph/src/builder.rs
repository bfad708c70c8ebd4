//! Model construction.
//!
//! Declarations register their paths in the storage immediately (so path conflicts are
//! reported at the offending call) and keep dependency paths unresolved until
//! [`ModelBuilder::build`], which allows declaring nodes in any order.

use dyb_core::{Array, Error, IntoPathKey, ParameterKind, PathKey, Result};
use tracing::info;

use crate::covariance::CovarianceBlock;
use crate::model::Model;
use crate::node::{NodeId, NodeKind, NodeSlot, NodeSpec, NodeStatus, ParameterId};
use crate::parameter::{Parameter, ParameterSpec};
use crate::storage::{Entry, Item, Storage};
use crate::switch::DataSourceSwitch;

/// Root of the parameter namespace.
pub const PARAMETERS_ROOT: &str = "parameters";

struct PendingNode {
    path: PathKey,
    label: Option<String>,
    kind: NodeKind,
    dependencies: Vec<PathKey>,
    parameters: Vec<PathKey>,
    frozen: bool,
    value: Option<Array>,
}

struct PendingCovariance {
    output: NodeId,
    target: PathKey,
    parameters: Vec<PathKey>,
}

/// Incremental builder of a [`Model`].
#[derive(Default)]
pub struct ModelBuilder {
    storage: Storage,
    parameters: Vec<Parameter>,
    nodes: Vec<PendingNode>,
    data_switch: Option<PathKey>,
    covariances: Vec<PendingCovariance>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter under `parameters.all.<name>`, aliased under
    /// `parameters.<kind>.<name>` (`free`, `constrained` or `constant`).
    pub fn parameter(&mut self, name: impl IntoPathKey, spec: ParameterSpec) -> Result<ParameterId> {
        let name = name.into_path_key()?;
        if name.is_root() {
            return Err(Error::InvalidPath("parameter name is empty".to_string()));
        }
        let root = PathKey::from_segments([PARAMETERS_ROOT])?;
        let canonical = root.join_segment("all").join(&name);
        let alias = root.join_segment(spec.kind.as_str()).join(&name);

        let id = ParameterId(self.parameters.len());
        let parameter = Parameter::from_spec(canonical.clone(), spec)?;
        self.storage.insert(&canonical, Item::Parameter(id))?;
        self.storage.insert(&alias, Item::Parameter(id))?;
        self.parameters.push(parameter);
        Ok(id)
    }

    /// Register a fixed data node.
    pub fn input(&mut self, path: impl IntoPathKey, value: Array) -> Result<NodeId> {
        let path = path.into_path_key()?;
        self.push_node(PendingNode {
            path,
            label: None,
            kind: NodeKind::Input,
            dependencies: Vec::new(),
            parameters: Vec::new(),
            frozen: false,
            value: Some(value),
        })
    }

    /// Register a computed node.
    pub fn node(&mut self, path: impl IntoPathKey, spec: NodeSpec) -> Result<NodeId> {
        let path = path.into_path_key()?;
        if let Some(e) = spec.error {
            return Err(e);
        }
        self.push_node(PendingNode {
            path,
            label: spec.label,
            kind: NodeKind::Compute(spec.compute),
            dependencies: spec.dependencies,
            parameters: spec.parameters,
            frozen: spec.frozen,
            value: None,
        })
    }

    /// Register a switch over named sources; the first source is selected.
    pub fn switch<I, S, P>(&mut self, path: impl IntoPathKey, sources: I) -> Result<NodeId>
    where
        I: IntoIterator<Item = (S, P)>,
        S: Into<String>,
        P: IntoPathKey,
    {
        let path = path.into_path_key()?;
        let mut names = Vec::new();
        let mut inputs = Vec::new();
        for (name, input) in sources {
            names.push(name.into());
            inputs.push(input.into_path_key()?);
        }
        let switch = DataSourceSwitch::new(names)?;
        self.push_node(PendingNode {
            path,
            label: None,
            kind: NodeKind::Switch(switch),
            dependencies: inputs,
            parameters: Vec::new(),
            frozen: false,
            value: None,
        })
    }

    /// Designate the switch driven by [`Model::switch_data`].
    pub fn data_switch(&mut self, path: impl IntoPathKey) -> Result<&mut Self> {
        self.data_switch = Some(path.into_path_key()?);
        Ok(self)
    }

    /// Declare a covariance matrix of `target` with respect to the constrained
    /// `parameters`, held at `output` and filled by
    /// [`Model::update_covariance_matrix`].
    pub fn covariance<I>(
        &mut self,
        output: impl IntoPathKey,
        target: impl IntoPathKey,
        parameters: I,
    ) -> Result<NodeId>
    where
        I: IntoIterator,
        I::Item: IntoPathKey,
    {
        let output = output.into_path_key()?;
        let target = target.into_path_key()?;
        let parameters = parameters
            .into_iter()
            .map(IntoPathKey::into_path_key)
            .collect::<Result<Vec<_>>>()?;
        let id = self.push_node(PendingNode {
            path: output,
            label: Some(format!("covariance of {target}")),
            kind: NodeKind::Held,
            dependencies: Vec::new(),
            parameters: Vec::new(),
            frozen: false,
            value: None,
        })?;
        self.covariances.push(PendingCovariance { output: id, target, parameters });
        Ok(id)
    }

    fn push_node(&mut self, node: PendingNode) -> Result<NodeId> {
        let id = NodeId(self.nodes.len());
        self.storage.insert(&node.path, Item::Node(id))?;
        self.nodes.push(node);
        Ok(id)
    }

    fn resolve_node(&self, owner: &PathKey, path: &PathKey) -> Result<NodeId> {
        match self.storage.get(path) {
            Ok(Entry::Item(Item::Node(id))) => Ok(id),
            Ok(_) => Err(Error::Validation(format!(
                "'{owner}' depends on '{path}', which is not a node"
            ))),
            Err(Error::KeyNotFound(_)) => Err(Error::KeyNotFound(path.to_dotted())),
            Err(e) => Err(e),
        }
    }

    fn resolve_parameter(&self, owner: &PathKey, path: &PathKey) -> Result<ParameterId> {
        match self.storage.get(path) {
            Ok(Entry::Item(Item::Parameter(id))) => Ok(id),
            Ok(_) => Err(Error::Validation(format!(
                "'{owner}' uses '{path}', which is not a parameter"
            ))),
            Err(e) => Err(e),
        }
    }

    /// Resolve dependencies, reject cycles and assemble the model.
    pub fn build(self) -> Result<Model> {
        let mut resolved = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let deps = node
                .dependencies
                .iter()
                .map(|p| self.resolve_node(&node.path, p))
                .collect::<Result<Vec<_>>>()?;
            let params = node
                .parameters
                .iter()
                .map(|p| self.resolve_parameter(&node.path, p))
                .collect::<Result<Vec<_>>>()?;
            resolved.push((deps, params));
        }

        let adjacency: Vec<Vec<usize>> =
            resolved.iter().map(|(deps, _)| deps.iter().map(|d| d.0).collect()).collect();
        let order = match topological_order(&adjacency) {
            Ok(order) => order,
            Err(cycle) => {
                let names: Vec<String> =
                    cycle.iter().map(|&i| self.nodes[i].path.to_dotted()).collect();
                return Err(Error::CyclicDependency(names.join(" -> ")));
            }
        };

        let data_switch = match &self.data_switch {
            None => None,
            Some(path) => {
                let id = self.resolve_node(path, path)?;
                if !matches!(self.nodes[id.0].kind, NodeKind::Switch(_)) {
                    return Err(Error::Validation(format!("data switch '{path}' is not a switch")));
                }
                Some(id)
            }
        };

        let mut covariances = Vec::with_capacity(self.covariances.len());
        for cov in &self.covariances {
            let owner = &self.nodes[cov.output.0].path;
            let target = self.resolve_node(owner, &cov.target)?;
            let parameters = cov
                .parameters
                .iter()
                .map(|p| self.resolve_parameter(owner, p))
                .collect::<Result<Vec<_>>>()?;
            for &pid in &parameters {
                let p = &self.parameters[pid.0];
                if p.kind != ParameterKind::Constrained {
                    return Err(Error::Validation(format!(
                        "covariance '{owner}': parameter '{}' is {}, expected constrained",
                        p.path, p.kind
                    )));
                }
            }
            covariances.push(CovarianceBlock { output: cov.output, target, parameters });
        }

        let mut parameters = self.parameters;
        let mut nodes: Vec<NodeSlot> = Vec::with_capacity(self.nodes.len());
        for (i, (pending, (deps, params))) in self.nodes.into_iter().zip(resolved).enumerate() {
            for &pid in &params {
                let dependents = &mut parameters[pid.0].dependents;
                if !dependents.contains(&NodeId(i)) {
                    dependents.push(NodeId(i));
                }
            }
            let status = match pending.kind {
                NodeKind::Input => NodeStatus::Fresh,
                _ => NodeStatus::Stale,
            };
            nodes.push(NodeSlot {
                path: pending.path,
                label: pending.label,
                kind: pending.kind,
                dependencies: deps,
                parameters: params,
                dependents: Vec::new(),
                status,
                value: pending.value,
                frozen: pending.frozen,
                evaluations: 0,
            });
        }
        for i in 0..nodes.len() {
            for j in 0..nodes[i].dependencies.len() {
                let dep = nodes[i].dependencies[j];
                let dependents = &mut nodes[dep.0].dependents;
                if !dependents.contains(&NodeId(i)) {
                    dependents.push(NodeId(i));
                }
            }
        }

        info!(
            nodes = nodes.len(),
            parameters = parameters.len(),
            covariances = covariances.len(),
            "model built"
        );

        Ok(Model::assemble(
            self.storage,
            nodes,
            parameters,
            order.into_iter().map(NodeId).collect(),
            data_switch,
            covariances,
        ))
    }
}

/// Dependencies-first order of a graph given as `node -> dependencies` adjacency.
/// On failure returns the offending cycle, first node repeated at the end.
fn topological_order(adjacency: &[Vec<usize>]) -> std::result::Result<Vec<usize>, Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let n = adjacency.len();
    let mut color = vec![Color::White; n];
    let mut order = Vec::with_capacity(n);

    for start in 0..n {
        if color[start] != Color::White {
            continue;
        }
        color[start] = Color::Gray;
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(top) = stack.last_mut() {
            let (node, next) = *top;
            let Some(&dep) = adjacency[node].get(next) else {
                color[node] = Color::Black;
                order.push(node);
                stack.pop();
                continue;
            };
            top.1 += 1;
            match color[dep] {
                Color::White => {
                    color[dep] = Color::Gray;
                    stack.push((dep, 0));
                }
                Color::Gray => {
                    let pos = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                    let mut cycle: Vec<usize> = stack[pos..].iter().map(|&(n, _)| n).collect();
                    cycle.push(dep);
                    return Err(cycle);
                }
                Color::Black => {}
            }
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topo_order_puts_dependencies_first() {
        // 0 <- 1 <- 2, 0 <- 2
        let order = topological_order(&[vec![], vec![0], vec![1, 0]]).unwrap();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn cycle_is_reported_in_order() {
        let cycle = topological_order(&[vec![1], vec![2], vec![0]]).unwrap_err();
        assert_eq!(cycle, vec![0, 1, 2, 0]);
        let selfloop = topological_order(&[vec![0]]).unwrap_err();
        assert_eq!(selfloop, vec![0, 0]);
    }
}
