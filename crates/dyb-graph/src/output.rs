//! Bulk outputs of a storage subtree: export, rendering and text tables.

use std::fs;
use std::path::{Path, PathBuf};

use dyb_core::{Array, IntoPathKey, PathKey, Result};
use dyb_io::Format;
use dyb_io::report::{TableOptions, TableRow};
use dyb_io::sanitize::escape_segment;
use dyb_viz_render::config::RenderConfig;
use serde::Deserialize;
use tracing::{debug, info};

use crate::model::Model;
use crate::storage::{Entry, Item};

/// Options of [`Model::render`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Nodes with fewer elements are skipped
    pub min_size: usize,
    pub config: RenderConfig,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { min_size: 10, config: RenderConfig::default() }
    }
}

impl Model {
    /// Values of every node under `prefix`, named relative to it. A node path used as
    /// the prefix yields that node under its last segment.
    pub fn arrays(&mut self, prefix: impl IntoPathKey) -> Result<Vec<(PathKey, Array)>> {
        let prefix = prefix.into_path_key()?;
        let base = match self.storage.get(&prefix)? {
            Entry::Item(_) => prefix.parent().unwrap_or_default(),
            Entry::Storage(_) => prefix.clone(),
        };
        let ids = self.node_ids_under(&prefix)?;
        let mut out = Vec::with_capacity(ids.len());
        for (path, id) in ids {
            let value = self.value_of(id)?.clone();
            let name = path.strip_prefix(&base).unwrap_or(path);
            out.push((name, value));
        }
        Ok(out)
    }

    /// Serialize every node under `prefix` with a format adapter.
    pub fn export(
        &mut self,
        prefix: impl IntoPathKey,
        format: Format,
        target: &Path,
    ) -> Result<Vec<PathBuf>> {
        let prefix = prefix.into_path_key()?;
        let arrays = self.arrays(&prefix)?;
        let written = dyb_io::save(format, target, &arrays)?;
        info!(
            prefix = %prefix,
            %format,
            arrays = arrays.len(),
            files = written.len(),
            "exported"
        );
        Ok(written)
    }

    /// Write one SVG per node under `prefix` into `folder`, mirroring the storage
    /// hierarchy. Returns the written files.
    pub fn render(
        &mut self,
        prefix: impl IntoPathKey,
        folder: &Path,
        options: &RenderOptions,
    ) -> Result<Vec<PathBuf>> {
        let prefix = prefix.into_path_key()?;
        let mut written = Vec::new();
        for (name, array) in self.arrays(&prefix)? {
            if array.len() < options.min_size {
                debug!(node = %name, size = array.len(), "skip small array");
                continue;
            }
            let mut file = folder.to_path_buf();
            for segment in name.segments() {
                file.push(&*escape_segment(segment));
            }
            file.set_extension("svg");
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent)?;
            }
            let title = prefix.join(&name).to_dotted();
            let svg = dyb_viz_render::render_array(&title, &array, &options.config)?;
            dyb_viz_render::output::svg::save_svg(&svg, &file)?;
            written.push(file);
        }
        info!(prefix = %prefix, files = written.len(), "rendered");
        Ok(written)
    }

    /// Aligned text table of nodes and parameters under `prefix`.
    pub fn to_table(&mut self, prefix: impl IntoPathKey, options: &TableOptions) -> Result<String> {
        let prefix = prefix.into_path_key()?;
        let items: Vec<(PathKey, Item)> = match self.storage.get(&prefix)? {
            Entry::Item(item) => vec![(prefix.clone(), item)],
            Entry::Storage(view) => view.walk_items().collect(),
        };

        let mut rows = Vec::with_capacity(items.len());
        for (path, item) in items {
            let row = match item {
                Item::Node(id) => {
                    let value = self.value_of(id)?.clone();
                    let slot = &self.nodes[id.0];
                    let kind = if slot.frozen { "frozen" } else { slot.kind.name() };
                    TableRow::node(path.to_dotted(), kind, value)
                }
                Item::Parameter(id) => {
                    TableRow::parameter(path.to_dotted(), &self.parameters[id.0].record())
                }
            };
            rows.push(row);
        }
        Ok(dyb_io::report::format_table(&rows, options))
    }
}
