//! The labeled frame graph.
//!
//! A directed graph whose vertices carry [`Frame`]s and whose edges carry
//! [`Transform`]s, backed by a petgraph `StableDiGraph` with a secondary
//! name index for O(1) lookup by label. At most one edge exists per ordered
//! (source, target) pair; adding over an existing pair replaces the payload.
//!
//! Handles ([`FrameId`], [`TransformId`]) embed a generation counter so a
//! handle kept across a removal can never alias a later occupant of the same
//! storage slot: resolving a stale handle fails instead of returning the
//! wrong frame.

use crate::error::{GraphError, GraphResult};
use crate::frame::Frame;
use crate::transform::Transform;
use crate::view::{self, TreeView, ViewRegistry};
use log::debug;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::Direction;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Handle to a frame vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId {
    pub(crate) index: NodeIndex,
    pub(crate) generation: u64,
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}@{}", self.index.index(), self.generation)
    }
}

/// Handle to a transform edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransformId {
    pub(crate) index: EdgeIndex,
    pub(crate) generation: u64,
}

impl fmt::Display for TransformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}@{}", self.index.index(), self.generation)
    }
}

#[derive(Debug)]
pub(crate) struct FrameRecord {
    pub(crate) generation: u64,
    pub(crate) frame: Frame,
}

#[derive(Debug)]
pub(crate) struct TransformRecord {
    pub(crate) generation: u64,
    pub(crate) transform: Transform,
}

pub(crate) type FrameGraph = StableDiGraph<FrameRecord, TransformRecord>;

/// The mutable graph of named frames and the transforms connecting them.
///
/// Names are the external addressing scheme; [`FrameId`]s are the stable
/// handles used internally and by [`TreeView`]s. Every mutating call either
/// fully succeeds or leaves the graph unchanged, and notifies the live views
/// subscribed through [`LabeledGraph::live_tree_view`].
pub struct LabeledGraph {
    graph: FrameGraph,
    names: HashMap<String, FrameId>,
    next_generation: u64,
    views: Rc<RefCell<ViewRegistry>>,
}

impl LabeledGraph {
    pub fn new() -> Self {
        LabeledGraph {
            graph: StableDiGraph::new(),
            names: HashMap::new(),
            next_generation: 0,
            views: Rc::new(RefCell::new(ViewRegistry::default())),
        }
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn resolve(&self, id: FrameId) -> GraphResult<NodeIndex> {
        match self.graph.node_weight(id.index) {
            Some(rec) if rec.generation == id.generation => Ok(id.index),
            _ => Err(GraphError::UnknownFrame(id.to_string())),
        }
    }

    fn resolve_transform(&self, id: TransformId) -> GraphResult<EdgeIndex> {
        match self.graph.edge_weight(id.index) {
            Some(rec) if rec.generation == id.generation => Ok(id.index),
            _ => Err(GraphError::UnknownTransform(id.to_string())),
        }
    }

    fn frame_id_of(&self, index: NodeIndex) -> GraphResult<FrameId> {
        match self.graph.node_weight(index) {
            Some(rec) => Ok(FrameId {
                index,
                generation: rec.generation,
            }),
            None => Err(GraphError::UnknownFrame(format!("v{}", index.index()))),
        }
    }

    fn notify_views(&mut self) {
        view::notify_all(&self.views, &self.graph);
    }

    /// Resolve a frame name to its handle. O(1) amortized.
    pub fn lookup(&self, name: &str) -> GraphResult<FrameId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownFrame(name.to_string()))
    }

    /// Add a new frame vertex under `name`.
    pub fn add_frame(&mut self, name: &str) -> GraphResult<FrameId> {
        self.add_frame_with(Frame::new(name))
    }

    /// Add a pre-built frame; the frame's name becomes its label.
    pub fn add_frame_with(&mut self, frame: Frame) -> GraphResult<FrameId> {
        if self.names.contains_key(frame.name()) {
            return Err(GraphError::DuplicateFrame(frame.name().to_string()));
        }
        let name = frame.name().to_string();
        let generation = self.bump_generation();
        let index = self.graph.add_node(FrameRecord { generation, frame });
        let id = FrameId { index, generation };
        self.names.insert(name.clone(), id);
        debug!("added frame '{name}' as {id}");
        self.notify_views();
        Ok(id)
    }

    /// Remove the frame named `name` and every transform incident to it.
    pub fn remove_frame(&mut self, name: &str) -> GraphResult<()> {
        let id = self.lookup(name)?;
        self.remove_frame_by_id(id)
    }

    /// Remove the frame behind `id` and every transform incident to it.
    pub fn remove_frame_by_id(&mut self, id: FrameId) -> GraphResult<()> {
        let index = self.resolve(id)?;
        let Some(record) = self.graph.remove_node(index) else {
            return Err(GraphError::UnknownFrame(id.to_string()));
        };
        self.names.remove(record.frame.name());
        debug!("removed frame '{}' ({id})", record.frame.name());
        self.notify_views();
        Ok(())
    }

    /// Add or update the transform on the directed edge `src -> dst`.
    ///
    /// The ordered pair carries at most one edge. Adding over an existing
    /// pair replaces the payload in place and returns the existing handle: a
    /// transform between two frames is a single time-varying relation, not a
    /// log of values.
    pub fn add_transform(
        &mut self,
        src: &str,
        dst: &str,
        tf: Transform,
    ) -> GraphResult<TransformId> {
        let src_id = self.lookup(src)?;
        let dst_id = self.lookup(dst)?;
        self.add_transform_by_id(src_id, dst_id, tf)
    }

    /// Handle-based variant of [`LabeledGraph::add_transform`].
    pub fn add_transform_by_id(
        &mut self,
        src: FrameId,
        dst: FrameId,
        tf: Transform,
    ) -> GraphResult<TransformId> {
        let src_ix = self.resolve(src)?;
        let dst_ix = self.resolve(dst)?;
        if let Some(edge) = self.graph.find_edge(src_ix, dst_ix) {
            let Some(record) = self.graph.edge_weight_mut(edge) else {
                return Err(GraphError::UnknownTransform(format!("{src} -> {dst}")));
            };
            record.transform = tf;
            let id = TransformId {
                index: edge,
                generation: record.generation,
            };
            debug!("updated transform {id} ({src} -> {dst})");
            self.notify_views();
            return Ok(id);
        }
        let generation = self.bump_generation();
        let index = self.graph.add_edge(
            src_ix,
            dst_ix,
            TransformRecord {
                generation,
                transform: tf,
            },
        );
        let id = TransformId { index, generation };
        debug!("added transform {id} ({src} -> {dst})");
        self.notify_views();
        Ok(id)
    }

    /// Remove the transform on `src -> dst`.
    ///
    /// With `destructive` set, an endpoint left with no incident edges is
    /// removed as well. Endpoints are checked independently, source first and
    /// then target, so the outcome is deterministic.
    pub fn remove_transform(&mut self, src: &str, dst: &str, destructive: bool) -> GraphResult<()> {
        let src_id = self.lookup(src)?;
        let dst_id = self.lookup(dst)?;
        self.remove_transform_by_id(src_id, dst_id, destructive)
            .map_err(|e| match e {
                GraphError::UnknownTransform(_) => {
                    GraphError::UnknownTransform(format!("'{src}' -> '{dst}'"))
                }
                other => other,
            })
    }

    /// Handle-based variant of [`LabeledGraph::remove_transform`].
    pub fn remove_transform_by_id(
        &mut self,
        src: FrameId,
        dst: FrameId,
        destructive: bool,
    ) -> GraphResult<()> {
        let src_ix = self.resolve(src)?;
        let dst_ix = self.resolve(dst)?;
        let edge = self
            .graph
            .find_edge(src_ix, dst_ix)
            .ok_or_else(|| GraphError::UnknownTransform(format!("{src} -> {dst}")))?;
        self.graph.remove_edge(edge);
        debug!("removed transform {src} -> {dst}");
        if destructive {
            for ix in [src_ix, dst_ix] {
                if self.graph.contains_node(ix) && self.degree(ix) == 0 {
                    if let Some(record) = self.graph.remove_node(ix) {
                        self.names.remove(record.frame.name());
                        debug!("removed isolated frame '{}'", record.frame.name());
                    }
                }
            }
        }
        self.notify_views();
        Ok(())
    }

    fn degree(&self, index: NodeIndex) -> usize {
        self.graph
            .edges_directed(index, Direction::Outgoing)
            .count()
            + self
                .graph
                .edges_directed(index, Direction::Incoming)
                .count()
    }

    /// The frame behind `id`. Fails if the handle is stale.
    pub fn get_frame(&self, id: FrameId) -> GraphResult<&Frame> {
        match self.graph.node_weight(id.index) {
            Some(rec) if rec.generation == id.generation => Ok(&rec.frame),
            _ => Err(GraphError::UnknownFrame(id.to_string())),
        }
    }

    /// Mutable access to a frame, for item manipulation. Frame payloads are
    /// not graph structure, so no view update is triggered.
    pub fn frame_mut(&mut self, id: FrameId) -> GraphResult<&mut Frame> {
        match self.graph.node_weight_mut(id.index) {
            Some(rec) if rec.generation == id.generation => Ok(&mut rec.frame),
            _ => Err(GraphError::UnknownFrame(id.to_string())),
        }
    }

    pub fn get_frame_by_name(&self, name: &str) -> GraphResult<&Frame> {
        let id = self.lookup(name)?;
        self.get_frame(id)
    }

    /// Handle of the transform on `src -> dst`, if that edge exists.
    pub fn find_transform(&self, src: FrameId, dst: FrameId) -> GraphResult<TransformId> {
        let src_ix = self.resolve(src)?;
        let dst_ix = self.resolve(dst)?;
        let edge = self
            .graph
            .find_edge(src_ix, dst_ix)
            .ok_or_else(|| GraphError::UnknownTransform(format!("{src} -> {dst}")))?;
        match self.graph.edge_weight(edge) {
            Some(record) => Ok(TransformId {
                index: edge,
                generation: record.generation,
            }),
            None => Err(GraphError::UnknownTransform(format!("{src} -> {dst}"))),
        }
    }

    /// The transform stored on `src -> dst`.
    pub fn get_transform(&self, src: &str, dst: &str) -> GraphResult<&Transform> {
        let src_id = self.lookup(src)?;
        let dst_id = self.lookup(dst)?;
        let id = self
            .find_transform(src_id, dst_id)
            .map_err(|_| GraphError::UnknownTransform(format!("'{src}' -> '{dst}'")))?;
        self.get_transform_by_id(id)
    }

    /// The transform behind `id`. Fails if the handle is stale.
    pub fn get_transform_by_id(&self, id: TransformId) -> GraphResult<&Transform> {
        match self.graph.edge_weight(id.index) {
            Some(rec) if rec.generation == id.generation => Ok(&rec.transform),
            _ => Err(GraphError::UnknownTransform(id.to_string())),
        }
    }

    /// Source frame of the given transform edge.
    pub fn source(&self, id: TransformId) -> GraphResult<FrameId> {
        let edge = self.resolve_transform(id)?;
        let (src, _) = self
            .graph
            .edge_endpoints(edge)
            .ok_or_else(|| GraphError::UnknownTransform(id.to_string()))?;
        self.frame_id_of(src)
    }

    /// Target frame of the given transform edge.
    pub fn target(&self, id: TransformId) -> GraphResult<FrameId> {
        let edge = self.resolve_transform(id)?;
        let (_, dst) = self
            .graph
            .edge_endpoints(edge)
            .ok_or_else(|| GraphError::UnknownTransform(id.to_string()))?;
        self.frame_id_of(dst)
    }

    /// Iterate over all frames.
    pub fn frames(&self) -> impl Iterator<Item = (FrameId, &Frame)> + '_ {
        self.graph.node_indices().filter_map(move |index| {
            self.graph.node_weight(index).map(|rec| {
                (
                    FrameId {
                        index,
                        generation: rec.generation,
                    },
                    &rec.frame,
                )
            })
        })
    }

    /// Iterate over all transforms.
    pub fn transforms(&self) -> impl Iterator<Item = (TransformId, &Transform)> + '_ {
        self.graph.edge_indices().filter_map(move |index| {
            self.graph.edge_weight(index).map(|rec| {
                (
                    TransformId {
                        index,
                        generation: rec.generation,
                    },
                    &rec.transform,
                )
            })
        })
    }

    pub fn num_frames(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_transforms(&self) -> usize {
        self.graph.edge_count()
    }

    /// Remove all frames and transforms. Live views become empty and are
    /// notified.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.names.clear();
        debug!("cleared graph");
        self.notify_views();
    }

    /// Derive a detached tree snapshot rooted at the frame named `root`.
    pub fn tree_view(&self, root: &str) -> GraphResult<TreeView> {
        let root_id = self
            .names
            .get(root)
            .copied()
            .ok_or_else(|| GraphError::InvalidRoot(root.to_string()))?;
        Ok(view::derive_view(&self.graph, root_id))
    }

    /// Derive a tree snapshot that stays subscribed to this graph: every
    /// structural mutation re-derives the view in place and fires its
    /// listeners. The view unsubscribes itself when dropped or detached.
    pub fn live_tree_view(&mut self, root: &str) -> GraphResult<TreeView> {
        let mut tv = self.tree_view(root)?;
        tv.attach(&self.views);
        Ok(tv)
    }
}

impl Default for LabeledGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LabeledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabeledGraph")
            .field("frames", &self.graph.node_count())
            .field("transforms", &self.graph.edge_count())
            .finish()
    }
}
