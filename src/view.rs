//! Tree-shaped snapshots of the frame graph.
//!
//! A [`TreeView`] is derived by traversing the graph breadth-first from a
//! root, treating transform edges as undirected connectivity. Edges that
//! would reconnect to an already-visited vertex are classified as cross
//! edges and kept out of the tree. The traversal scans incident edges in
//! ascending edge-index order, so deriving twice from the same graph state
//! yields an identical view.
//!
//! A live view stays registered with its source graph through a weak-handle
//! registry: the graph never owns the view, and the view deregisters itself
//! on drop. Moving a view moves its shared state, so the subscription
//! follows the value with no re-registration window. Cloning produces a
//! detached static snapshot.

use crate::graph::{FrameGraph, FrameId, TransformId};
use log::trace;
use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

/// Parent and children of a vertex inside a [`TreeView`]. The root carries
/// `parent: None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexRelation {
    pub parent: Option<FrameId>,
    pub children: HashSet<FrameId>,
}

/// Identifies a callback registered with [`TreeView::on_tree_updated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub(crate) struct ViewState {
    root: FrameId,
    tree: HashMap<FrameId, VertexRelation>,
    cross_edges: Vec<TransformId>,
    listeners: Vec<(ListenerId, Box<dyn FnMut()>)>,
    next_listener: u64,
}

/// Weak handles to the view states subscribed to a graph. The graph holds
/// the registry; views hold a weak back-reference for deregistration.
#[derive(Default)]
pub(crate) struct ViewRegistry {
    subscribers: Vec<Weak<RefCell<ViewState>>>,
}

impl ViewRegistry {
    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// A rooted spanning-tree snapshot of a [`crate::LabeledGraph`].
///
/// The handles stored in the view point into the identity space of the
/// source graph; they go stale if the graph removes the vertices or edges
/// behind them.
pub struct TreeView {
    state: Rc<RefCell<ViewState>>,
    registry: Option<Weak<RefCell<ViewRegistry>>>,
}

impl TreeView {
    /// The root the view was derived from.
    pub fn root(&self) -> FrameId {
        self.state.borrow().root
    }

    pub fn contains(&self, id: FrameId) -> bool {
        self.state.borrow().tree.contains_key(&id)
    }

    /// True if `id` is the vertex the tree hangs from.
    pub fn is_root(&self, id: FrameId) -> bool {
        self.state
            .borrow()
            .tree
            .get(&id)
            .is_some_and(|r| r.parent.is_none())
    }

    pub fn parent(&self, id: FrameId) -> Option<FrameId> {
        self.state.borrow().tree.get(&id).and_then(|r| r.parent)
    }

    pub fn children(&self, id: FrameId) -> Vec<FrameId> {
        self.state
            .borrow()
            .tree
            .get(&id)
            .map(|r| r.children.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn relation(&self, id: FrameId) -> Option<VertexRelation> {
        self.state.borrow().tree.get(&id).cloned()
    }

    /// Snapshot of the whole parent/children relation map.
    pub fn relations(&self) -> HashMap<FrameId, VertexRelation> {
        self.state.borrow().tree.clone()
    }

    /// Number of vertices in the tree.
    pub fn len(&self) -> usize {
        self.state.borrow().tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().tree.is_empty()
    }

    /// Edges of the source graph excluded from the tree, in the order the
    /// traversal first met them.
    pub fn cross_edges(&self) -> Vec<TransformId> {
        self.state.borrow().cross_edges.clone()
    }

    /// Register a callback fired after every re-derivation of a live view.
    /// Detached views never fire. The callback carries no payload; read the
    /// tree and cross edges back from the view.
    pub fn on_tree_updated(&self, callback: impl FnMut() + 'static) -> ListenerId {
        let mut st = self.state.borrow_mut();
        st.next_listener += 1;
        let id = ListenerId(st.next_listener);
        st.listeners.push((id, Box::new(callback)));
        id
    }

    /// Drop a registered callback. Returns false if it was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut st = self.state.borrow_mut();
        let before = st.listeners.len();
        st.listeners.retain(|(lid, _)| *lid != id);
        st.listeners.len() != before
    }

    /// True while the view is subscribed to a live source graph.
    pub fn is_live(&self) -> bool {
        self.registry.as_ref().and_then(Weak::upgrade).is_some()
    }

    /// Stop receiving updates. Safe to call on an already detached view.
    pub fn detach(&mut self) {
        if let Some(registry) = self.registry.take().and_then(|weak| weak.upgrade()) {
            let me = Rc::downgrade(&self.state);
            registry
                .borrow_mut()
                .subscribers
                .retain(|w| !Weak::ptr_eq(w, &me));
        }
    }

    pub(crate) fn attach(&mut self, registry: &Rc<RefCell<ViewRegistry>>) {
        self.detach();
        registry
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&self.state));
        self.registry = Some(Rc::downgrade(registry));
    }
}

impl Drop for TreeView {
    fn drop(&mut self) {
        self.detach();
    }
}

impl Clone for TreeView {
    /// A clone is a detached static snapshot: neither the subscription nor
    /// the registered listeners carry over.
    fn clone(&self) -> Self {
        let st = self.state.borrow();
        TreeView {
            state: Rc::new(RefCell::new(ViewState {
                root: st.root,
                tree: st.tree.clone(),
                cross_edges: st.cross_edges.clone(),
                listeners: Vec::new(),
                next_listener: 0,
            })),
            registry: None,
        }
    }
}

impl PartialEq for TreeView {
    fn eq(&self, other: &Self) -> bool {
        let a = self.state.borrow();
        let b = other.state.borrow();
        a.root == b.root && a.tree == b.tree && a.cross_edges == b.cross_edges
    }
}

impl fmt::Debug for TreeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("TreeView")
            .field("root", &st.root)
            .field("vertices", &st.tree.len())
            .field("cross_edges", &st.cross_edges.len())
            .field("live", &self.is_live())
            .finish()
    }
}

pub(crate) fn derive_view(graph: &FrameGraph, root: FrameId) -> TreeView {
    let (tree, cross_edges) = derive(graph, root);
    TreeView {
        state: Rc::new(RefCell::new(ViewState {
            root,
            tree,
            cross_edges,
            listeners: Vec::new(),
            next_listener: 0,
        })),
        registry: None,
    }
}

/// Re-derive every subscribed view against the current graph and fire its
/// listeners. Views whose root no longer resolves become empty. Dead weak
/// handles are pruned on the way.
pub(crate) fn notify_all(registry: &Rc<RefCell<ViewRegistry>>, graph: &FrameGraph) {
    let subscribers = {
        let mut reg = registry.borrow_mut();
        reg.subscribers.retain(|weak| weak.strong_count() > 0);
        reg.subscribers.clone()
    };
    trace!("notifying {} live tree views", subscribers.len());
    for weak in subscribers {
        let Some(state) = weak.upgrade() else { continue };
        {
            let mut st = state.borrow_mut();
            let root = st.root;
            if resolves(graph, root) {
                let (tree, cross_edges) = derive(graph, root);
                st.tree = tree;
                st.cross_edges = cross_edges;
            } else {
                st.tree.clear();
                st.cross_edges.clear();
            }
        }
        fire(&state);
    }
}

fn resolves(graph: &FrameGraph, id: FrameId) -> bool {
    graph
        .node_weight(id.index)
        .is_some_and(|rec| rec.generation == id.generation)
}

fn fire(state: &Rc<RefCell<ViewState>>) {
    // Listeners run with the state released so a callback can never observe
    // a held borrow.
    let mut listeners = std::mem::take(&mut state.borrow_mut().listeners);
    for (_, callback) in listeners.iter_mut() {
        callback();
    }
    let mut st = state.borrow_mut();
    let added_during_fire = std::mem::take(&mut st.listeners);
    st.listeners = listeners;
    st.listeners.extend(added_during_fire);
}

/// Pure function of (graph snapshot, root): breadth-first spanning tree plus
/// the cross edges excluded from it.
fn derive(
    graph: &FrameGraph,
    root: FrameId,
) -> (HashMap<FrameId, VertexRelation>, Vec<TransformId>) {
    let mut tree: HashMap<FrameId, VertexRelation> = HashMap::new();
    let mut cross_edges: Vec<TransformId> = Vec::new();
    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut classified: HashSet<EdgeIndex> = HashSet::new();
    let mut queue: VecDeque<NodeIndex> = VecDeque::new();

    tree.insert(root, VertexRelation::default());
    visited.insert(root.index);
    queue.push_back(root.index);

    while let Some(current) = queue.pop_front() {
        for (edge, neighbor) in incident_edges(graph, current) {
            if !classified.insert(edge) {
                // Either the edge we arrived over or one already classified
                // from its other endpoint.
                continue;
            }
            if visited.insert(neighbor) {
                let parent_id = frame_id(graph, current);
                let child_id = frame_id(graph, neighbor);
                tree.entry(parent_id).or_default().children.insert(child_id);
                tree.entry(child_id).or_default().parent = Some(parent_id);
                queue.push_back(neighbor);
            } else {
                cross_edges.push(transform_id(graph, edge));
            }
        }
    }

    (tree, cross_edges)
}

/// Incident edges of `vertex` in both directions, paired with the opposite
/// endpoint, in ascending edge-index order. Self loops show up once.
fn incident_edges(graph: &FrameGraph, vertex: NodeIndex) -> Vec<(EdgeIndex, NodeIndex)> {
    let mut edges: Vec<(EdgeIndex, NodeIndex)> = graph
        .edges_directed(vertex, Direction::Outgoing)
        .map(|e| (e.id(), e.target()))
        .chain(
            graph
                .edges_directed(vertex, Direction::Incoming)
                .map(|e| (e.id(), e.source())),
        )
        .collect();
    edges.sort_by_key(|(edge, _)| *edge);
    edges.dedup_by_key(|(edge, _)| *edge);
    edges
}

fn frame_id(graph: &FrameGraph, index: NodeIndex) -> FrameId {
    // Only reached for vertices the traversal just pulled out of the live
    // graph.
    let rec = graph.node_weight(index).unwrap();
    FrameId {
        index,
        generation: rec.generation,
    }
}

fn transform_id(graph: &FrameGraph, index: EdgeIndex) -> TransformId {
    let rec = graph.edge_weight(index).unwrap();
    TransformId {
        index,
        generation: rec.generation,
    }
}

#[cfg(test)]
mod tests {
    use crate::{LabeledGraph, Transform};
    use std::cell::Cell;
    use std::rc::Rc;

    fn chain(names: &[&str]) -> LabeledGraph {
        let mut graph = LabeledGraph::new();
        for name in names {
            graph.add_frame(name).unwrap();
        }
        for pair in names.windows(2) {
            graph
                .add_transform(pair[0], pair[1], Transform::identity())
                .unwrap();
        }
        graph
    }

    #[test]
    fn single_vertex_tree() {
        let mut graph = LabeledGraph::new();
        let root = graph.add_frame("root").unwrap();
        let view = graph.tree_view("root").unwrap();

        assert_eq!(view.len(), 1);
        assert!(view.is_root(root));
        assert!(view.children(root).is_empty());
        assert!(view.cross_edges().is_empty());
    }

    #[test]
    fn missing_root_is_rejected() {
        let graph = LabeledGraph::new();
        assert!(matches!(
            graph.tree_view("nope"),
            Err(crate::GraphError::InvalidRoot(_))
        ));
    }

    #[test]
    fn chain_becomes_a_path_tree() {
        let graph = chain(&["a", "b", "c"]);
        let a = graph.lookup("a").unwrap();
        let b = graph.lookup("b").unwrap();
        let c = graph.lookup("c").unwrap();

        let view = graph.tree_view("a").unwrap();
        assert_eq!(view.len(), 3);
        assert!(view.is_root(a));
        assert_eq!(view.parent(b), Some(a));
        assert_eq!(view.parent(c), Some(b));
        assert!(view.cross_edges().is_empty());
    }

    #[test]
    fn edge_direction_does_not_limit_reachability() {
        // b -> a and b -> c: from root a the traversal must climb the
        // incoming edge.
        let mut graph = LabeledGraph::new();
        graph.add_frame("a").unwrap();
        graph.add_frame("b").unwrap();
        graph.add_frame("c").unwrap();
        graph.add_transform("b", "a", Transform::identity()).unwrap();
        graph.add_transform("b", "c", Transform::identity()).unwrap();

        let view = graph.tree_view("a").unwrap();
        assert_eq!(view.len(), 3);
        let a = graph.lookup("a").unwrap();
        let b = graph.lookup("b").unwrap();
        assert_eq!(view.parent(b), Some(a));
        assert!(view.cross_edges().is_empty());
    }

    #[test]
    fn cycle_yields_exactly_one_cross_edge() {
        let mut graph = LabeledGraph::new();
        graph.add_frame("a").unwrap();
        graph.add_frame("b").unwrap();
        graph.add_frame("c").unwrap();
        graph.add_transform("a", "b", Transform::identity()).unwrap();
        graph.add_transform("b", "c", Transform::identity()).unwrap();
        graph.add_transform("c", "a", Transform::identity()).unwrap();

        let view = graph.tree_view("a").unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.cross_edges().len(), 1);
        for name in ["b", "c"] {
            let id = graph.lookup(name).unwrap();
            assert!(view.parent(id).is_some());
        }
    }

    #[test]
    fn unreachable_vertices_are_absent() {
        let mut graph = LabeledGraph::new();
        graph.add_frame("a").unwrap();
        graph.add_frame("b").unwrap();
        graph.add_frame("island").unwrap();
        graph.add_transform("a", "b", Transform::identity()).unwrap();

        let view = graph.tree_view("a").unwrap();
        assert_eq!(view.len(), 2);
        assert!(!view.contains(graph.lookup("island").unwrap()));
    }

    #[test]
    fn derivation_is_deterministic() {
        let mut graph = LabeledGraph::new();
        for name in ["a", "b", "c", "d"] {
            graph.add_frame(name).unwrap();
        }
        graph.add_transform("a", "b", Transform::identity()).unwrap();
        graph.add_transform("a", "c", Transform::identity()).unwrap();
        graph.add_transform("b", "d", Transform::identity()).unwrap();
        graph.add_transform("c", "d", Transform::identity()).unwrap();

        let first = graph.tree_view("a").unwrap();
        let second = graph.tree_view("a").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.cross_edges(), second.cross_edges());
        // The diamond closes over exactly one cross edge.
        assert_eq!(first.cross_edges().len(), 1);
    }

    #[test]
    fn live_view_tracks_mutations() {
        let mut graph = chain(&["a", "b"]);
        let view = graph.live_tree_view("a").unwrap();
        let count = Rc::new(Cell::new(0usize));
        let seen = count.clone();
        view.on_tree_updated(move || seen.set(seen.get() + 1));

        graph.add_frame("c").unwrap();
        graph.add_transform("b", "c", Transform::identity()).unwrap();
        assert_eq!(count.get(), 2);
        assert_eq!(view.len(), 3);
        assert_eq!(view, graph.tree_view("a").unwrap());

        graph.remove_transform("b", "c", false).unwrap();
        assert_eq!(count.get(), 3);
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn live_view_empties_when_root_is_removed() {
        let mut graph = chain(&["a", "b"]);
        let view = graph.live_tree_view("a").unwrap();
        graph.remove_frame("a").unwrap();
        assert!(view.is_empty());
        assert!(view.cross_edges().is_empty());
    }

    #[test]
    fn clear_empties_live_views_and_notifies() {
        let mut graph = chain(&["a", "b"]);
        let view = graph.live_tree_view("a").unwrap();
        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        view.on_tree_updated(move || flag.set(true));

        graph.clear();
        assert!(fired.get());
        assert!(view.is_empty());
    }

    #[test]
    fn moved_view_keeps_its_subscription() {
        let mut graph = chain(&["a", "b"]);
        let view = graph.live_tree_view("a").unwrap();
        let count = Rc::new(Cell::new(0usize));
        let seen = count.clone();
        view.on_tree_updated(move || seen.set(seen.get() + 1));

        // Move the view into a new binding and behind a Box.
        let moved = view;
        let boxed = Box::new(moved);
        graph.add_frame("c").unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(boxed.len(), 2);
        assert!(boxed.is_live());
    }

    #[test]
    fn dropped_view_receives_nothing() {
        let mut graph = chain(&["a", "b"]);
        let count = Rc::new(Cell::new(0usize));
        {
            let view = graph.live_tree_view("a").unwrap();
            let seen = count.clone();
            view.on_tree_updated(move || seen.set(seen.get() + 1));
            graph.add_frame("c").unwrap();
            assert_eq!(count.get(), 1);
        }
        graph.add_frame("d").unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn clone_is_a_detached_snapshot() {
        let mut graph = chain(&["a", "b"]);
        let live = graph.live_tree_view("a").unwrap();
        let snapshot = live.clone();
        assert!(!snapshot.is_live());

        graph.add_frame("c").unwrap();
        graph.add_transform("b", "c", Transform::identity()).unwrap();
        assert_eq!(live.len(), 3);
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn detach_is_idempotent() {
        let mut graph = chain(&["a", "b"]);
        let mut view = graph.live_tree_view("a").unwrap();
        assert!(view.is_live());
        view.detach();
        assert!(!view.is_live());
        view.detach();

        let count = Rc::new(Cell::new(0usize));
        let seen = count.clone();
        view.on_tree_updated(move || seen.set(seen.get() + 1));
        graph.add_frame("c").unwrap();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn listener_removal_stops_callbacks() {
        let mut graph = chain(&["a", "b"]);
        let view = graph.live_tree_view("a").unwrap();
        let count = Rc::new(Cell::new(0usize));
        let seen = count.clone();
        let listener = view.on_tree_updated(move || seen.set(seen.get() + 1));

        graph.add_frame("c").unwrap();
        assert_eq!(count.get(), 1);

        assert!(view.remove_listener(listener));
        assert!(!view.remove_listener(listener));
        graph.add_frame("d").unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn view_outliving_its_graph_is_harmless() {
        let view = {
            let mut graph = chain(&["a", "b"]);
            graph.live_tree_view("a").unwrap()
        };
        assert!(!view.is_live());
        assert_eq!(view.len(), 2);
    }
}
