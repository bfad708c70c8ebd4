//! # dyb-graph
//!
//! Path-addressed computation graph with lazy invalidation.
//!
//! - [`Storage`]: hierarchical container of node and parameter ids
//! - [`Parameter`]: current/central/sigma values with a push/pop staging stack
//! - [`DataSourceSwitch`]: selects which upstream dataset feeds the graph
//! - [`Model`]: owns all of the above and keeps node caches consistent
//! - [`GraphOptions`]: DOT export of the dependency neighbourhood of a node
//!
//! ```
//! use dyb_core::Array;
//! use dyb_graph::{ModelBuilder, NodeSpec, ParameterSpec};
//!
//! let mut b = ModelBuilder::new();
//! b.parameter("scale", ParameterSpec::free(2.0)).unwrap();
//! b.input("inputs.x", Array::vector(vec![1.0, 2.0])).unwrap();
//! b.node(
//!     "outputs.y",
//!     NodeSpec::new(|i| {
//!         let s = i.scalar(0)?;
//!         Ok(i.node(0)?.map(|v| v * s))
//!     })
//!     .depends_on(["inputs.x"])
//!     .parameters(["parameters.all.scale"]),
//! )
//! .unwrap();
//! let mut model = b.build().unwrap();
//!
//! assert_eq!(model.get_or_compute("outputs.y").unwrap().data(), &[2.0, 4.0]);
//! model.parameter("parameters.free.scale").unwrap().push(3.0).unwrap();
//! assert_eq!(model.get_or_compute(("outputs", "y")).unwrap().data(), &[3.0, 6.0]);
//! ```

#![warn(clippy::all)]
#![allow(clippy::len_without_is_empty)]

pub mod builder;
pub mod covariance;
pub mod graph;
pub mod handles;
pub mod model;
pub mod node;
pub mod output;
pub mod parameter;
pub mod storage;
pub mod switch;

pub use builder::{ModelBuilder, PARAMETERS_ROOT};
pub use graph::GraphOptions;
pub use handles::{ParameterHandle, SwitchHandle};
pub use model::Model;
pub use node::{ComputeFn, Inputs, NodeId, NodeInfo, NodeSpec, NodeStatus, ParameterId};
pub use output::RenderOptions;
pub use parameter::{Parameter, ParameterSpec};
pub use storage::{Entry, Item, Keys, Storage, StorageView, Walk};
pub use switch::DataSourceSwitch;
