//! The model: storage, parameters, switches and the invalidation engine.
//!
//! Mutations (parameter set/push/pop, switch selection, input replacement) mark every
//! transitively dependent node `Stale` by walking `dependents`. Reads go through
//! [`Model::get_or_compute`], which recomputes the requested node and its stale
//! ancestors only.
//!
//! A node that is already `Stale` is not walked again: all of its non-frozen
//! descendants are stale too, since none of them can be recomputed before it.
//! Frozen nodes stop propagation; see [`Model::update_frozen_nodes`].

use dyb_core::{Array, Error, IntoPathKey, ParameterRecord, PathKey, Result};
use tracing::{debug, trace};

use crate::covariance::CovarianceBlock;
use crate::handles::{ParameterHandle, SwitchHandle};
use crate::node::{Inputs, NodeId, NodeInfo, NodeKind, NodeSlot, NodeStatus, ParameterId};
use crate::parameter::{Parameter, parse_value};
use crate::storage::{Entry, Item, Storage, StorageView};
use crate::switch::DataSourceSwitch;

/// Computation graph addressed through a hierarchical [`Storage`].
#[derive(Debug)]
pub struct Model {
    pub(crate) storage: Storage,
    pub(crate) nodes: Vec<NodeSlot>,
    pub(crate) parameters: Vec<Parameter>,
    /// Dependencies-first order of all nodes
    pub(crate) order: Vec<NodeId>,
    pub(crate) data_switch: Option<NodeId>,
    pub(crate) covariances: Vec<CovarianceBlock>,
}

/// Mark `roots` and everything downstream of them `Stale`. Returns the number of
/// nodes whose status changed.
pub(crate) fn invalidate(nodes: &mut [NodeSlot], roots: &[NodeId]) -> usize {
    mark_stale(nodes, roots.iter().map(|&id| (None, id)).collect())
}

/// Mark everything downstream of the node `from`, whose value changed.
pub(crate) fn invalidate_dependents(nodes: &mut [NodeSlot], from: NodeId) -> usize {
    let stack = nodes[from.0].dependents.iter().map(|&d| (Some(from), d)).collect();
    mark_stale(nodes, stack)
}

fn mark_stale(nodes: &mut [NodeSlot], mut stack: Vec<(Option<NodeId>, NodeId)>) -> usize {
    let roots = stack.len();
    let mut marked = 0;
    while let Some((from, id)) = stack.pop() {
        let slot = &mut nodes[id.0];
        if slot.status == NodeStatus::Stale || slot.frozen || slot.is_source() {
            continue;
        }
        if let Some(from) = from
            && !slot.listens_to(from)
        {
            continue;
        }
        slot.status = NodeStatus::Stale;
        marked += 1;
        stack.extend(slot.dependents.iter().map(|&d| (Some(id), d)));
    }
    if marked > 0 {
        debug!(roots, marked, "invalidated");
    }
    marked
}

impl Model {
    pub(crate) fn assemble(
        storage: Storage,
        nodes: Vec<NodeSlot>,
        parameters: Vec<Parameter>,
        order: Vec<NodeId>,
        data_switch: Option<NodeId>,
        covariances: Vec<CovarianceBlock>,
    ) -> Self {
        Self { storage, nodes, parameters, order, data_switch, covariances }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Look up an item or a sub-storage.
    pub fn get(&self, path: impl IntoPathKey) -> Result<Entry<'_>> {
        self.storage.get(path)
    }

    /// Sub-storage below `prefix`.
    pub fn view(&self, prefix: impl IntoPathKey) -> Result<StorageView<'_>> {
        self.storage.view(prefix)
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_parameters(&self) -> usize {
        self.parameters.len()
    }

    pub fn node_id(&self, path: impl IntoPathKey) -> Result<NodeId> {
        let path = path.into_path_key()?;
        match self.storage.get(&path)? {
            Entry::Item(Item::Node(id)) => Ok(id),
            _ => Err(Error::Validation(format!("'{path}' is not a node"))),
        }
    }

    pub fn parameter_id(&self, path: impl IntoPathKey) -> Result<ParameterId> {
        let path = path.into_path_key()?;
        match self.storage.get(&path)? {
            Entry::Item(Item::Parameter(id)) => Ok(id),
            _ => Err(Error::Validation(format!("'{path}' is not a parameter"))),
        }
    }

    pub fn node_path(&self, id: NodeId) -> &PathKey {
        &self.nodes[id.0].path
    }

    /// Value at `path`, recomputing the node and its stale ancestors if needed.
    /// Parameter paths return the parameter's current value.
    pub fn get_or_compute(&mut self, path: impl IntoPathKey) -> Result<&Array> {
        let path = path.into_path_key()?;
        match self.storage.get(&path)? {
            Entry::Item(Item::Node(id)) => self.value_of(id),
            Entry::Item(Item::Parameter(id)) => Ok(&self.parameters[id.0].current),
            Entry::Storage(_) => Err(Error::Validation(format!(
                "'{path}' is a storage prefix, not a node"
            ))),
        }
    }

    /// Value of a node by id, recomputing as needed.
    pub fn value_of(&mut self, id: NodeId) -> Result<&Array> {
        self.refresh(id)?;
        self.nodes[id.0]
            .value
            .as_ref()
            .ok_or_else(|| Error::Computation(format!("node '{}' has no value", self.nodes[id.0].path)))
    }

    /// Cached value without recomputation, if any.
    pub fn cached(&self, id: NodeId) -> Option<&Array> {
        self.nodes[id.0].value.as_ref()
    }

    /// Bring `target` up to date: post-order over its stale required ancestors.
    pub(crate) fn refresh(&mut self, target: NodeId) -> Result<usize> {
        if self.nodes[target.0].is_fresh() {
            return Ok(0);
        }
        let mut computed = 0;
        let mut stack = vec![(target, false)];
        while let Some((id, expanded)) = stack.pop() {
            if self.nodes[id.0].is_fresh() {
                continue;
            }
            if expanded {
                self.recompute(id)?;
                computed += 1;
                continue;
            }
            stack.push((id, true));
            for &dep in self.nodes[id.0].required_inputs() {
                if !self.nodes[dep.0].is_fresh() {
                    stack.push((dep, false));
                }
            }
        }
        debug!(node = %self.nodes[target.0].path, computed, "refreshed");
        Ok(computed)
    }

    fn recompute(&mut self, id: NodeId) -> Result<()> {
        let value = {
            let slot = &self.nodes[id.0];
            trace!(node = %slot.path, kind = slot.kind.name(), "recompute");
            let upstream = |dep: &NodeId| {
                self.nodes[dep.0].value.as_ref().ok_or_else(|| {
                    Error::Computation(format!(
                        "'{}' needs '{}', which has no value",
                        slot.path, self.nodes[dep.0].path
                    ))
                })
            };
            match &slot.kind {
                NodeKind::Input => {
                    return Err(Error::Computation(format!("input '{}' has no value", slot.path)));
                }
                NodeKind::Held => {
                    return Err(Error::Computation(format!(
                        "'{}' is filled by update_covariance_matrix() and was never updated",
                        slot.path
                    )));
                }
                NodeKind::Switch(sw) => upstream(&slot.dependencies[sw.selected_index()])?.clone(),
                NodeKind::Compute(f) => {
                    let inputs = Inputs {
                        node: &slot.path,
                        nodes: slot.dependencies.iter().map(upstream).collect::<Result<Vec<_>>>()?,
                        parameters: slot
                            .parameters
                            .iter()
                            .map(|p| &self.parameters[p.0].current)
                            .collect(),
                    };
                    f(&inputs)?
                }
            }
        };
        let slot = &mut self.nodes[id.0];
        slot.value = Some(value);
        slot.status = NodeStatus::Fresh;
        slot.evaluations += 1;
        Ok(())
    }

    /// Eagerly refresh every node under `prefix`. Returns the number of recomputations.
    pub fn evaluate(&mut self, prefix: impl IntoPathKey) -> Result<usize> {
        let ids = self.node_ids_under(prefix)?;
        let mut computed = 0;
        for (_, id) in ids {
            computed += self.refresh(id)?;
        }
        Ok(computed)
    }

    /// `(path, id)` of every node under `prefix` (or the node itself if `prefix` is one).
    pub(crate) fn node_ids_under(&self, prefix: impl IntoPathKey) -> Result<Vec<(PathKey, NodeId)>> {
        let prefix = prefix.into_path_key()?;
        match self.storage.get(&prefix)? {
            Entry::Item(Item::Node(id)) => Ok(vec![(prefix, id)]),
            Entry::Item(Item::Parameter(_)) => Ok(Vec::new()),
            Entry::Storage(view) => Ok(view
                .walk_items()
                .filter_map(|(path, item)| match item {
                    Item::Node(id) => Some((path, id)),
                    Item::Parameter(_) => None,
                })
                .collect()),
        }
    }

    /// Distinct parameters under `prefix`, in walk order.
    pub(crate) fn parameter_ids_under(&self, prefix: impl IntoPathKey) -> Result<Vec<ParameterId>> {
        let prefix = prefix.into_path_key()?;
        let mut ids = Vec::new();
        match self.storage.get(&prefix)? {
            Entry::Item(Item::Parameter(id)) => ids.push(id),
            Entry::Item(Item::Node(_)) => {}
            Entry::Storage(view) => {
                for (_, item) in view.walk_items() {
                    if let Item::Parameter(id) = item
                        && !ids.contains(&id)
                    {
                        ids.push(id);
                    }
                }
            }
        }
        Ok(ids)
    }

    /// Snapshots of the distinct parameters under `prefix`.
    pub fn parameter_records(&self, prefix: impl IntoPathKey) -> Result<Vec<ParameterRecord>> {
        Ok(self
            .parameter_ids_under(prefix)?
            .into_iter()
            .map(|id| self.parameters[id.0].record())
            .collect())
    }

    pub fn node_info(&self, path: impl IntoPathKey) -> Result<NodeInfo> {
        let id = self.node_id(path)?;
        let slot = &self.nodes[id.0];
        Ok(NodeInfo {
            path: slot.path.clone(),
            kind: slot.kind.name(),
            status: slot.status,
            frozen: slot.frozen,
            evaluations: slot.evaluations,
            shape: slot.value.as_ref().map(|v| v.shape().to_vec()),
            label: slot.label.clone(),
        })
    }

    // ---------------------------------------------------------------------
    // Parameters
    // ---------------------------------------------------------------------

    pub fn parameter(&mut self, path: impl IntoPathKey) -> Result<ParameterHandle<'_>> {
        let id = self.parameter_id(path)?;
        Ok(ParameterHandle::new(self, id))
    }

    pub fn parameter_ref(&self, path: impl IntoPathKey) -> Result<&Parameter> {
        let id = self.parameter_id(path)?;
        Ok(&self.parameters[id.0])
    }

    pub fn parameter_by_id(&self, id: ParameterId) -> &Parameter {
        &self.parameters[id.0]
    }

    pub(crate) fn set_parameter(&mut self, id: ParameterId, value: Array) -> Result<()> {
        let parameter = &mut self.parameters[id.0];
        if parameter.current == value {
            return Ok(());
        }
        parameter.set(value)?;
        invalidate(&mut self.nodes, &self.parameters[id.0].dependents);
        Ok(())
    }

    pub(crate) fn push_parameter(&mut self, id: ParameterId, value: Array) -> Result<()> {
        self.parameters[id.0].push(value)?;
        invalidate(&mut self.nodes, &self.parameters[id.0].dependents);
        Ok(())
    }

    pub(crate) fn push_current_parameter(&mut self, id: ParameterId) {
        self.parameters[id.0].push_current();
    }

    pub(crate) fn pop_parameter(&mut self, id: ParameterId) -> Result<()> {
        self.parameters[id.0].pop()?;
        invalidate(&mut self.nodes, &self.parameters[id.0].dependents);
        Ok(())
    }

    /// Resolve a `--par` name: exact path first, then a unique dotted suffix.
    pub fn resolve_parameter(&self, name: &str) -> Result<ParameterId> {
        let unknown = || Error::AmbiguousOrUnknownParameter {
            name: name.to_string(),
            candidates: Vec::new(),
        };
        let key = PathKey::parse(name).map_err(|_| unknown())?;
        if key.is_root() {
            return Err(unknown());
        }
        if let Ok(Entry::Item(Item::Parameter(id))) = self.storage.get(&key) {
            return Ok(id);
        }

        let mut matches: Vec<ParameterId> = Vec::new();
        for (path, item) in self.storage.walk_items() {
            if let Item::Parameter(id) = item
                && path.ends_with(&key)
                && !matches.contains(&id)
            {
                matches.push(id);
            }
        }
        match matches.as_slice() {
            [id] => Ok(*id),
            _ => Err(Error::AmbiguousOrUnknownParameter {
                name: name.to_string(),
                candidates: matches.iter().map(|id| self.parameters[id.0].path.to_dotted()).collect(),
            }),
        }
    }

    /// Apply a `--par NAME VALUE` override.
    pub fn set_from_config(&mut self, name: &str, value: &str) -> Result<()> {
        let id = self.resolve_parameter(name)?;
        let parameter = &self.parameters[id.0];
        let value = parse_value(&parameter.path, value, &parameter.central)?;
        debug!(parameter = %parameter.path, ?value, "set from config");
        self.set_parameter(id, value)
    }

    // ---------------------------------------------------------------------
    // Switches and inputs
    // ---------------------------------------------------------------------

    pub fn switch(&mut self, path: impl IntoPathKey) -> Result<SwitchHandle<'_>> {
        let id = self.switch_id(path)?;
        Ok(SwitchHandle::new(self, id))
    }

    pub fn switch_ref(&self, path: impl IntoPathKey) -> Result<&DataSourceSwitch> {
        let id = self.switch_id(path)?;
        self.switch_state(id)
    }

    fn switch_id(&self, path: impl IntoPathKey) -> Result<NodeId> {
        let path = path.into_path_key()?;
        let id = self.node_id(&path)?;
        match self.nodes[id.0].kind {
            NodeKind::Switch(_) => Ok(id),
            _ => Err(Error::Validation(format!("'{path}' is not a switch"))),
        }
    }

    pub(crate) fn switch_state(&self, id: NodeId) -> Result<&DataSourceSwitch> {
        match &self.nodes[id.0].kind {
            NodeKind::Switch(sw) => Ok(sw),
            _ => Err(Error::Validation(format!("'{}' is not a switch", self.nodes[id.0].path))),
        }
    }

    pub(crate) fn select_input(&mut self, id: NodeId, index: i64) -> Result<()> {
        let slot = &mut self.nodes[id.0];
        let NodeKind::Switch(sw) = &mut slot.kind else {
            return Err(Error::Validation(format!("'{}' is not a switch", slot.path)));
        };
        if sw.select(&slot.path, index)? {
            debug!(switch = %slot.path, source = sw.current_name(), "switched");
            invalidate(&mut self.nodes, &[id]);
        }
        Ok(())
    }

    pub(crate) fn select_input_by_name(&mut self, id: NodeId, name: &str) -> Result<()> {
        let index = {
            let slot = &self.nodes[id.0];
            self.switch_state(id)?.resolve(&slot.path, name)?
        };
        self.select_input(id, index as i64)
    }

    /// Select `name` on the designated data switch.
    pub fn switch_data(&mut self, name: &str) -> Result<()> {
        let id = self
            .data_switch
            .ok_or_else(|| Error::Validation("model has no data switch".to_string()))?;
        self.select_input_by_name(id, name)
    }

    /// The designated data switch, if any.
    pub fn data_switch(&self) -> Option<&DataSourceSwitch> {
        self.data_switch.and_then(|id| self.switch_state(id).ok())
    }

    /// Replace the value of an input node and invalidate downstream.
    pub fn replace_input(&mut self, path: impl IntoPathKey, value: Array) -> Result<()> {
        let id = self.node_id(path)?;
        let slot = &mut self.nodes[id.0];
        if !matches!(slot.kind, NodeKind::Input) {
            return Err(Error::Validation(format!("'{}' is not an input node", slot.path)));
        }
        if let Some(old) = &slot.value
            && old.shape() != value.shape()
        {
            return Err(Error::Validation(format!(
                "input '{}': shape {:?} does not match {:?}",
                slot.path,
                value.shape(),
                old.shape()
            )));
        }
        slot.value = Some(value);
        invalidate_dependents(&mut self.nodes, id);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Frozen nodes
    // ---------------------------------------------------------------------

    /// Recompute every frozen node from current inputs, invalidating its dependents
    /// when the value changed. Returns the number of frozen nodes whose value changed.
    pub fn update_frozen_nodes(&mut self) -> Result<usize> {
        let frozen: Vec<NodeId> =
            self.order.iter().copied().filter(|id| self.nodes[id.0].frozen).collect();
        let mut changed = 0;
        for id in frozen {
            let previous = self.nodes[id.0].value.clone();
            self.nodes[id.0].status = NodeStatus::Stale;
            self.refresh(id)?;
            if self.nodes[id.0].value != previous {
                changed += 1;
                invalidate_dependents(&mut self.nodes, id);
            }
        }
        debug!(changed, "frozen nodes updated");
        Ok(changed)
    }
}
