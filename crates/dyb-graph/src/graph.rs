//! Dependency neighbourhoods of nodes as Graphviz DOT documents.
//!
//! The neighbourhood of a node spans `-min_depth` levels of upstream nodes and
//! `max_depth` levels of downstream nodes. Edges always point from dependency to
//! dependent; switch inputs that are not selected are drawn dashed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use dyb_core::{Error, IntoPathKey, Result};
use dyb_io::sanitize::escape_segment;
use serde::Deserialize;
use tracing::{debug, info};

use crate::model::Model;
use crate::node::{NodeId, NodeKind, ParameterId};
use crate::storage::Entry;

/// Options of [`Model::subgraph_dot`] and [`Model::save_graphs`].
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct GraphOptions {
    /// Upstream levels, zero or negative
    pub min_depth: i32,
    /// Downstream levels, zero or positive
    pub max_depth: i32,
    /// Draw the parameters read by the centre node and its upstream nodes
    pub parameters: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self { min_depth: -2, max_depth: 1, parameters: true }
    }
}

impl GraphOptions {
    fn validate(&self) -> Result<()> {
        if self.min_depth > 0 || self.max_depth < 0 {
            return Err(Error::Validation(format!(
                "graph depth window [{}, {}] must contain 0",
                self.min_depth, self.max_depth
            )));
        }
        Ok(())
    }
}

/// Quote a string for a DOT identifier or label.
fn quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl Model {
    /// Depth of every node in the window around `center` (negative upstream).
    fn neighbourhood(&self, center: NodeId, options: &GraphOptions) -> BTreeMap<NodeId, i32> {
        let mut depth = BTreeMap::from([(center, 0)]);

        let mut frontier = vec![center];
        for level in 1..=options.min_depth.unsigned_abs() {
            let mut next = Vec::new();
            for id in frontier {
                for &dep in &self.nodes[id.0].dependencies {
                    if !depth.contains_key(&dep) {
                        depth.insert(dep, -(level as i32));
                        next.push(dep);
                    }
                }
            }
            frontier = next;
        }

        let mut frontier = vec![center];
        for level in 1..=options.max_depth.unsigned_abs() {
            let mut next = Vec::new();
            for id in frontier {
                for &dependent in &self.nodes[id.0].dependents {
                    if !depth.contains_key(&dependent) {
                        depth.insert(dependent, level as i32);
                        next.push(dependent);
                    }
                }
            }
            frontier = next;
        }
        depth
    }

    /// DOT document of the dependency neighbourhood of the node at `path`.
    pub fn subgraph_dot(&self, path: impl IntoPathKey, options: &GraphOptions) -> Result<String> {
        options.validate()?;
        let center = self.node_id(path)?;
        Ok(self.dot_of(center, options))
    }

    fn dot_of(&self, center: NodeId, options: &GraphOptions) -> String {
        let depth = self.neighbourhood(center, options);

        let parameters: BTreeSet<ParameterId> = if options.parameters {
            depth
                .iter()
                .filter(|&(_, &d)| d <= 0)
                .flat_map(|(id, _)| self.nodes[id.0].parameters.iter().copied())
                .collect()
        } else {
            BTreeSet::new()
        };

        let mut dot = String::new();
        let title = self.nodes[center.0].path.to_dotted();
        let _ = writeln!(dot, "digraph {} {{", quoted(&title));
        let _ = writeln!(dot, "    rankdir=LR;");
        let _ = writeln!(dot, "    node [shape=box, fontsize=10];");

        for (&id, &d) in &depth {
            let slot = &self.nodes[id.0];
            let mut label = format!("{}\n{}", slot.path, slot.kind.name());
            if slot.frozen {
                label.push_str(", frozen");
            }
            if let NodeKind::Switch(sw) = &slot.kind {
                let _ = write!(label, ": {}", sw.current_name());
            }
            if let Some(text) = &slot.label {
                let _ = write!(label, "\n{text}");
            }
            let style = if d == 0 { ", style=filled, fillcolor=\"#ffd966\"" } else { "" };
            let _ = writeln!(dot, "    n{} [label={}{style}];", id.0, quoted(&label));
        }
        for &pid in &parameters {
            let p = &self.parameters[pid.0];
            let label = format!("{}\n{}", p.path, p.kind);
            let _ = writeln!(dot, "    p{} [label={}, shape=ellipse];", pid.0, quoted(&label));
        }

        for &id in depth.keys() {
            let slot = &self.nodes[id.0];
            let selected = match &slot.kind {
                NodeKind::Switch(sw) => Some(sw.selected_index()),
                _ => None,
            };
            for (i, dep) in slot.dependencies.iter().enumerate() {
                if !depth.contains_key(dep) {
                    continue;
                }
                let dashed = selected.is_some_and(|s| s != i);
                let attrs = if dashed { " [style=dashed]" } else { "" };
                let _ = writeln!(dot, "    n{} -> n{}{attrs};", dep.0, id.0);
            }
            for pid in &slot.parameters {
                if parameters.contains(pid) {
                    let _ = writeln!(dot, "    p{} -> n{};", pid.0, id.0);
                }
            }
        }
        dot.push_str("}\n");
        dot
    }

    /// Write the neighbourhood of every node under `prefix` into `folder` as
    /// `<path>.dot`, mirroring the storage hierarchy. Returns the written files.
    pub fn save_graphs(
        &self,
        prefix: impl IntoPathKey,
        folder: &Path,
        options: &GraphOptions,
    ) -> Result<Vec<PathBuf>> {
        options.validate()?;
        let prefix = prefix.into_path_key()?;
        let base = match self.storage.get(&prefix)? {
            Entry::Item(_) => prefix.parent().unwrap_or_default(),
            Entry::Storage(_) => prefix.clone(),
        };
        let ids = self.node_ids_under(&prefix)?;

        let mut written = Vec::with_capacity(ids.len());
        for (path, id) in ids {
            let name = path.strip_prefix(&base).unwrap_or_else(|| path.clone());
            let mut file = folder.to_path_buf();
            for segment in name.segments() {
                file.push(&*escape_segment(segment));
            }
            file.set_extension("dot");
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent)?;
            }
            let dot = self.dot_of(id, options);
            debug!(node = %path, file = %file.display(), "graph");
            fs::write(&file, dot)?;
            written.push(file);
        }
        info!(prefix = %prefix, files = written.len(), "graphs saved");
        Ok(written)
    }
}
