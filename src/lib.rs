//! In-memory graph of named reference frames connected by rigid-body
//! transforms, with tree-shaped snapshots derived on demand.
//!
//! [`LabeledGraph`] maps human-readable frame names to stable vertex handles
//! and keeps at most one directed transform per ordered frame pair.
//! [`TreeView`] projects the graph onto a rooted spanning tree via
//! breadth-first traversal; a live view stays subscribed to its graph and is
//! re-derived on every structural mutation.
//!
//! The crate is single-threaded by design: embeddings that share a graph
//! across threads must serialize access themselves.
//!
//! # Example
//! ```
//! use transform_graph::{LabeledGraph, Transform};
//!
//! let mut graph = LabeledGraph::new();
//! graph.add_frame("world")?;
//! graph.add_frame("robot")?;
//! graph.add_transform("world", "robot", Transform::identity())?;
//!
//! let view = graph.tree_view("world")?;
//! assert_eq!(view.len(), 2);
//! assert!(view.is_root(graph.lookup("world")?));
//! # Ok::<(), transform_graph::GraphError>(())
//! ```

pub mod error;
pub mod frame;
pub mod graph;
pub mod transform;
pub mod view;

pub use error::{GraphError, GraphResult};
pub use frame::{Frame, ItemHandle};
pub use graph::{FrameId, LabeledGraph, TransformId};
pub use transform::Transform;
pub use view::{ListenerId, TreeView, VertexRelation};
