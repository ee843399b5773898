// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use crate::errors::{CyclicError, DepdagError, Result};

/// Stable handle of a node inside a [`Graph`].
///
/// Handles are never reused: removing a node leaves its slot empty.
pub type NodeIndex = usize;

/// A single node of the dependency graph.
///
/// `children` and `parents` are non-owning indices into the graph's arena.
/// A node with several parents is one shared node reachable via multiple
/// paths, not a copy.
#[derive(Debug)]
pub struct Node<T> {
    index: NodeIndex,
    id: String,
    payload: Option<T>,
    children: Vec<NodeIndex>,
    parents: Vec<NodeIndex>,
}

impl<T> Node<T> {
    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Payload of this node. Only the root sentinel has none.
    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[NodeIndex] {
        &self.children
    }

    pub fn parents(&self) -> &[NodeIndex] {
        &self.parents
    }

    /// A leaf has no (remaining) children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Directed acyclic graph rooted at a sentinel node.
///
/// Nodes live in an arena (`slots`) and are addressed through `index`
/// (ID -> slot). The arena is the only owner of nodes; edges are plain
/// indices kept symmetric: every child edge has a matching parent edge.
/// Acyclicity is enforced by [`Graph::insert_node_at`].
#[derive(Debug)]
pub struct Graph<T> {
    slots: Vec<Option<Node<T>>>,
    index: HashMap<String, NodeIndex>,
    root: NodeIndex,
}

impl<T> Graph<T> {
    /// Create a graph containing only the root sentinel.
    pub fn new(root_id: impl Into<String>) -> Self {
        let root_id = root_id.into();
        let mut index = HashMap::new();
        index.insert(root_id.clone(), 0);

        Self {
            slots: vec![Some(Node {
                index: 0,
                id: root_id,
                payload: None,
                children: Vec::new(),
                parents: Vec::new(),
            })],
            index,
            root: 0,
        }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn root_node(&self) -> &Node<T> {
        // The root slot is never vacated (`remove_node` refuses the root).
        self.slots[self.root]
            .as_ref()
            .unwrap_or_else(|| unreachable!("root node slot is never emptied"))
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&Node<T>> {
        self.slots.get(idx).and_then(|slot| slot.as_ref())
    }

    pub fn get(&self, id: &str) -> Option<&Node<T>> {
        self.index_of(id).and_then(|idx| self.node(idx))
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Number of registered nodes, excluding the root sentinel.
    pub fn len(&self) -> usize {
        self.index.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// IDs of all registered nodes except the root, in slot order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.slots
            .iter()
            .flatten()
            .filter(|node| node.index != self.root)
            .map(|node| node.id.as_str())
    }

    /// Link `child_id` below `parent_id`.
    ///
    /// An existing node with `child_id` is reused (shared subtree) and
    /// `payload` is dropped; otherwise a new node is registered. Fails with
    /// [`DepdagError::NodeNotFound`] for an unknown parent and with
    /// [`DepdagError::Cyclic`] if `parent_id` is already reachable from
    /// `child_id`.
    pub fn insert_node_at(
        &mut self,
        parent_id: &str,
        child_id: &str,
        payload: T,
    ) -> Result<NodeIndex> {
        let parent = self
            .index_of(parent_id)
            .ok_or_else(|| DepdagError::NodeNotFound(parent_id.to_string()))?;

        let child = match self.index_of(child_id) {
            Some(existing) => {
                if let Some(path) = self.find_first_path(existing, parent) {
                    let mut cycle = Vec::with_capacity(path.len() + 1);
                    cycle.push(parent_id.to_string());
                    cycle.extend(path.iter().filter_map(|&idx| self.node(idx)).map(|n| n.id.clone()));
                    return Err(CyclicError { path: cycle }.into());
                }
                existing
            }
            None => self.register(child_id, payload),
        };

        self.link(parent, child);
        Ok(child)
    }

    /// Link two existing nodes without checking for cycles.
    pub fn add_edge(&mut self, from_id: &str, to_id: &str) -> Result<()> {
        let from = self
            .index_of(from_id)
            .ok_or_else(|| DepdagError::NodeNotFound(from_id.to_string()))?;
        let to = self
            .index_of(to_id)
            .ok_or_else(|| DepdagError::NodeNotFound(to_id.to_string()))?;

        self.link(from, to);
        Ok(())
    }

    /// First path (depth-first, children in insertion order) from `start`
    /// to `target`, both inclusive. `None` if `target` is unreachable.
    pub fn find_first_path(&self, start: NodeIndex, target: NodeIndex) -> Option<Vec<NodeIndex>> {
        let mut path = Vec::new();
        let mut exhausted = HashSet::new();
        if self.path_dfs(start, target, &mut path, &mut exhausted) {
            Some(path)
        } else {
            None
        }
    }

    fn path_dfs(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        path: &mut Vec<NodeIndex>,
        exhausted: &mut HashSet<NodeIndex>,
    ) -> bool {
        let Some(node) = self.node(current) else {
            return false;
        };

        path.push(current);
        if current == target {
            return true;
        }

        for &child in &node.children {
            // A fully explored subtree cannot contain the target.
            if exhausted.contains(&child) {
                continue;
            }
            if self.path_dfs(child, target, path, exhausted) {
                return true;
            }
        }

        exhausted.insert(current);
        path.pop();
        false
    }

    /// Pre-order walk over child edges starting at `start`.
    ///
    /// Shared nodes are visited once per path that reaches them. The walk
    /// stops at the first node for which `visit` returns `Ok(true)` and
    /// returns it; an `Err` aborts the walk and is returned as is.
    pub fn pre_order_search<E, F>(&self, start: NodeIndex, mut visit: F) -> std::result::Result<Option<NodeIndex>, E>
    where
        F: FnMut(&Node<T>) -> std::result::Result<bool, E>,
    {
        self.pre_order_inner(start, &mut visit)
    }

    fn pre_order_inner<E, F>(&self, current: NodeIndex, visit: &mut F) -> std::result::Result<Option<NodeIndex>, E>
    where
        F: FnMut(&Node<T>) -> std::result::Result<bool, E>,
    {
        let Some(node) = self.node(current) else {
            return Ok(None);
        };

        if visit(node)? {
            return Ok(Some(current));
        }

        for &child in &node.children {
            if let Some(found) = self.pre_order_inner(child, visit)? {
                return Ok(Some(found));
            }
        }

        Ok(None)
    }

    /// Post-order counterpart of [`Graph::pre_order_search`]: a node is
    /// visited after all of its children.
    pub fn post_order_search<E, F>(&self, start: NodeIndex, mut visit: F) -> std::result::Result<Option<NodeIndex>, E>
    where
        F: FnMut(&Node<T>) -> std::result::Result<bool, E>,
    {
        self.post_order_inner(start, &mut visit)
    }

    fn post_order_inner<E, F>(&self, current: NodeIndex, visit: &mut F) -> std::result::Result<Option<NodeIndex>, E>
    where
        F: FnMut(&Node<T>) -> std::result::Result<bool, E>,
    {
        let Some(node) = self.node(current) else {
            return Ok(None);
        };

        for &child in &node.children {
            if let Some(found) = self.post_order_inner(child, visit)? {
                return Ok(Some(found));
            }
        }

        if visit(node)? {
            return Ok(Some(current));
        }

        Ok(None)
    }

    /// First node without children in pre-order, starting at `start`.
    pub fn next_leaf(&self, start: NodeIndex) -> Option<NodeIndex> {
        self.pre_order_search(start, |node| Ok::<_, std::convert::Infallible>(node.is_leaf()))
            .unwrap_or_else(|never| match never {})
    }

    /// Remove a node entirely: it is detached from every parent and child and
    /// dropped from the registry. Former children stay registered.
    pub fn remove_node(&mut self, id: &str) -> Result<Node<T>> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| DepdagError::NodeNotFound(id.to_string()))?;
        if idx == self.root {
            return Err(DepdagError::ConfigError(format!(
                "cannot remove root node '{id}'"
            )));
        }

        let node = self.slots[idx]
            .take()
            .ok_or_else(|| DepdagError::NodeNotFound(id.to_string()))?;
        self.index.remove(id);

        for &parent in &node.parents {
            if let Some(parent) = self.slots[parent].as_mut() {
                parent.children.retain(|&c| c != idx);
            }
        }
        for &child in &node.children {
            if let Some(child) = self.slots[child].as_mut() {
                child.parents.retain(|&p| p != idx);
            }
        }

        Ok(node)
    }

    /// Remove a node like [`Graph::remove_node`], then re-attach every former
    /// child that was left without a parent to the root so that it stays
    /// reachable. Returns the re-attached children.
    pub fn remove_node_and_reparent(&mut self, id: &str) -> Result<Vec<NodeIndex>> {
        let removed = self.remove_node(id)?;

        let mut orphans = Vec::new();
        for &child in &removed.children {
            let orphaned = self
                .node(child)
                .is_some_and(|node| node.parents.is_empty());
            if orphaned {
                self.link(self.root, child);
                orphans.push(child);
            }
        }

        Ok(orphans)
    }

    fn register(&mut self, id: &str, payload: T) -> NodeIndex {
        let idx = self.slots.len();
        self.slots.push(Some(Node {
            index: idx,
            id: id.to_string(),
            payload: Some(payload),
            children: Vec::new(),
            parents: Vec::new(),
        }));
        self.index.insert(id.to_string(), idx);
        idx
    }

    /// Add `parent -> child` (and the back-reference) unless it already exists.
    fn link(&mut self, parent: NodeIndex, child: NodeIndex) {
        let already_linked = self
            .node(parent)
            .is_some_and(|node| node.children.contains(&child));
        if already_linked {
            return;
        }

        if let Some(node) = self.slots[parent].as_mut() {
            node.children.push(child);
        }
        if let Some(node) = self.slots[child].as_mut() {
            node.parents.push(parent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "root";
    const C1: &str = "rootChild1";
    const C2: &str = "rootChild2";
    const C3: &str = "rootChild3";
    const C2C1: &str = "rootChild2Child1";
    const C2C1C1: &str = "rootChild2Child1Child1";

    /// root -> {C1, C2, C3}, C2 -> C2C1 -> C2C1C1, C3 -> C2 (shared).
    fn diamond_graph() -> Graph<()> {
        let mut graph = Graph::new(ROOT);
        graph.insert_node_at(ROOT, C1, ()).unwrap();
        graph.insert_node_at(ROOT, C2, ()).unwrap();
        graph.insert_node_at(ROOT, C3, ()).unwrap();
        graph.insert_node_at(C2, C2C1, ()).unwrap();
        graph.insert_node_at(C2C1, C2C1C1, ()).unwrap();
        graph.insert_node_at(C3, C2, ()).unwrap();
        graph
    }

    fn collect_ids(graph: &Graph<()>, pre: bool) -> Vec<String> {
        let mut seen = Vec::new();
        let mut visit = |n: &Node<()>| {
            seen.push(n.id().to_string());
            Ok::<_, DepdagError>(false)
        };
        let found = if pre {
            graph.pre_order_search(graph.root(), &mut visit)
        } else {
            graph.post_order_search(graph.root(), &mut visit)
        };
        assert!(found.unwrap().is_none());
        seen
    }

    #[test]
    fn insert_at_unknown_parent_fails() {
        let mut graph: Graph<()> = Graph::new(ROOT);
        let err = graph.insert_node_at("does not exist", C1, ()).unwrap_err();
        assert!(matches!(err, DepdagError::NodeNotFound(ref id) if id == "does not exist"));
        assert_eq!(graph.len(), 0);
    }

    #[test]
    fn reinserting_existing_child_reuses_node() {
        let graph = diamond_graph();
        assert_eq!(graph.len(), 5);

        let shared = graph.get(C2).unwrap();
        let parents: Vec<&str> = shared
            .parents()
            .iter()
            .map(|&p| graph.node(p).unwrap().id())
            .collect();
        assert_eq!(parents, vec![ROOT, C3]);
    }

    #[test]
    fn cycle_error_lists_parent_then_existing_path() {
        let mut graph = diamond_graph();
        let err = graph.insert_node_at(C2C1C1, C3, ()).unwrap_err();

        let expected = "Cyclic dependency found: \n\
rootChild2Child1Child1\n\
rootChild3\n\
rootChild2\n\
rootChild2Child1\n\
rootChild2Child1Child1";
        assert_eq!(err.to_string(), expected);
        assert!(err.as_cyclic().is_some());

        // The rejected edge must not have been added.
        assert!(graph.get(C2C1C1).unwrap().is_leaf());
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let mut graph = diamond_graph();
        let err = graph.insert_node_at(C1, C1, ()).unwrap_err();
        assert_eq!(
            err.as_cyclic().unwrap().path,
            vec![C1.to_string(), C1.to_string()]
        );
    }

    #[test]
    fn find_first_path_follows_insertion_order() {
        let graph = diamond_graph();
        let c1 = graph.index_of(C1).unwrap();
        let c2 = graph.index_of(C2).unwrap();
        assert!(graph.find_first_path(c1, c2).is_none());

        let leaf = graph.index_of(C2C1C1).unwrap();
        let path: Vec<&str> = graph
            .find_first_path(graph.root(), leaf)
            .unwrap()
            .into_iter()
            .map(|idx| graph.node(idx).unwrap().id())
            .collect();
        assert_eq!(path, vec![ROOT, C2, C2C1, C2C1C1]);
    }

    #[test]
    fn pre_order_revisits_shared_nodes() {
        let graph = diamond_graph();
        assert_eq!(
            collect_ids(&graph, true),
            vec![ROOT, C1, C2, C2C1, C2C1C1, C3, C2, C2C1, C2C1C1]
        );
    }

    #[test]
    fn post_order_revisits_shared_nodes() {
        let graph = diamond_graph();
        assert_eq!(
            collect_ids(&graph, false),
            vec![C1, C2C1C1, C2C1, C2, C2C1C1, C2C1, C2, C3, ROOT]
        );
    }

    #[test]
    fn search_stops_at_requested_step() {
        let graph = diamond_graph();

        let mut count = 0;
        let found = graph
            .pre_order_search(graph.root(), |_| {
                let hit = count == 5;
                count += 1;
                Ok::<_, DepdagError>(hit)
            })
            .unwrap()
            .unwrap();
        assert_eq!(graph.node(found).unwrap().id(), C3);

        let mut count = 0;
        let found = graph
            .post_order_search(graph.root(), |_| {
                let hit = count == 5;
                count += 1;
                Ok::<_, DepdagError>(hit)
            })
            .unwrap()
            .unwrap();
        assert_eq!(graph.node(found).unwrap().id(), C2C1);
    }

    #[test]
    fn search_error_aborts_traversal() {
        let graph = diamond_graph();
        let mut visited = 0;
        let result = graph.pre_order_search(graph.root(), |n| {
            visited += 1;
            if n.id() == C2 {
                Err("boom")
            } else {
                Ok(false)
            }
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(visited, 3);
    }

    #[test]
    fn add_edge_requires_both_nodes() {
        let mut graph = diamond_graph();
        assert!(matches!(
            graph.add_edge("NotThere", C1),
            Err(DepdagError::NodeNotFound(_))
        ));
        assert!(matches!(
            graph.add_edge(C1, "NotThere"),
            Err(DepdagError::NodeNotFound(_))
        ));
        graph.add_edge(C1, C2C1C1).unwrap();
        assert_eq!(graph.get(C2C1C1).unwrap().parents().len(), 2);
    }

    #[test]
    fn pruning_leaves_empties_graph_bottom_up() {
        let mut graph = diamond_graph();
        assert_eq!(graph.node(graph.next_leaf(graph.root()).unwrap()).unwrap().id(), C1);

        let mut removed = Vec::new();
        while !graph.is_empty() {
            let leaf = graph.next_leaf(graph.root()).unwrap();
            let id = graph.node(leaf).unwrap().id().to_string();
            graph.remove_node(&id).unwrap();
            removed.push(id);
        }

        assert_eq!(removed, vec![C1, C2C1C1, C2C1, C2, C3]);
        assert!(graph.root_node().is_leaf());
    }

    #[test]
    fn remove_node_detaches_from_every_parent() {
        let mut graph = diamond_graph();
        let removed = graph.remove_node(C2).unwrap();
        assert_eq!(removed.id(), C2);
        assert!(!graph.contains(C2));
        assert!(graph.get(C3).unwrap().is_leaf());
        assert!(graph.get(C2C1).unwrap().parents().is_empty());
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn remove_root_or_unknown_fails() {
        let mut graph = diamond_graph();
        assert!(graph.remove_node(ROOT).is_err());
        assert!(matches!(
            graph.remove_node("missing"),
            Err(DepdagError::NodeNotFound(_))
        ));
    }

    #[test]
    fn reparenting_keeps_orphans_reachable() {
        let mut graph = diamond_graph();

        // C2C1 still has C2 as parent after C3 goes away.
        assert!(graph.remove_node_and_reparent(C3).unwrap().is_empty());

        let orphans = graph.remove_node_and_reparent(C2).unwrap();
        assert_eq!(orphans, vec![graph.index_of(C2C1).unwrap()]);
        assert_eq!(graph.get(C2C1).unwrap().parents(), &[graph.root()]);
        assert_eq!(collect_ids(&graph, true), vec![ROOT, C1, C2C1, C2C1C1]);
    }
}
