//! Mutable handles returned by [`Model::parameter`] and [`Model::switch`].
//!
//! A handle borrows the model mutably, so every mutation it performs goes through the
//! model's invalidation engine.

use dyb_core::{Array, ParameterKind, PathKey, Result};

use crate::model::Model;
use crate::node::{NodeId, ParameterId};

/// Mutable access to one parameter.
pub struct ParameterHandle<'m> {
    model: &'m mut Model,
    id: ParameterId,
}

impl<'m> ParameterHandle<'m> {
    pub(crate) fn new(model: &'m mut Model, id: ParameterId) -> Self {
        Self { model, id }
    }

    pub fn id(&self) -> ParameterId {
        self.id
    }

    pub fn path(&self) -> &PathKey {
        self.model.parameters[self.id.0].path()
    }

    pub fn kind(&self) -> ParameterKind {
        self.model.parameters[self.id.0].kind()
    }

    pub fn value(&self) -> &Array {
        self.model.parameters[self.id.0].value()
    }

    pub fn central(&self) -> &Array {
        self.model.parameters[self.id.0].central()
    }

    pub fn sigma(&self) -> Option<&Array> {
        self.model.parameters[self.id.0].sigma()
    }

    pub fn depth(&self) -> usize {
        self.model.parameters[self.id.0].depth()
    }

    /// Set the current value; dependents go stale.
    pub fn set_value(&mut self, value: impl Into<Array>) -> Result<()> {
        self.model.set_parameter(self.id, value.into())
    }

    /// Stage `value`, remembering the current one for [`ParameterHandle::pop`].
    pub fn push(&mut self, value: impl Into<Array>) -> Result<()> {
        self.model.push_parameter(self.id, value.into())
    }

    /// Remember the current value without changing it.
    pub fn push_current(&mut self) {
        self.model.push_current_parameter(self.id);
    }

    /// Restore the most recently staged value.
    pub fn pop(&mut self) -> Result<()> {
        self.model.pop_parameter(self.id)
    }
}

/// Mutable access to one switch node.
pub struct SwitchHandle<'m> {
    model: &'m mut Model,
    id: NodeId,
}

impl<'m> SwitchHandle<'m> {
    pub(crate) fn new(model: &'m mut Model, id: NodeId) -> Self {
        Self { model, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Select input `index`; `IndexOutOfRange` unless `0 <= index < len`.
    pub fn switch_input(&mut self, index: i64) -> Result<()> {
        self.model.select_input(self.id, index)
    }

    pub fn switch_by_name(&mut self, name: &str) -> Result<()> {
        self.model.select_input_by_name(self.id, name)
    }

    pub fn selected_index(&self) -> usize {
        self.state().map(|sw| sw.selected_index()).unwrap_or_default()
    }

    pub fn current_name(&self) -> &str {
        self.state().map(|sw| sw.current_name()).unwrap_or_default()
    }

    pub fn available(&self) -> &[String] {
        self.state().map(|sw| sw.available()).unwrap_or_default()
    }

    fn state(&self) -> Option<&crate::DataSourceSwitch> {
        self.model.switch_state(self.id).ok()
    }
}
