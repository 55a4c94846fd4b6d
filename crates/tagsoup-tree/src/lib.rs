//! # Tagsoup Tree
//!
//! The node model produced by the tagsoup tree assembler.
//!
//! ## Design
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. Parent and
//! child links are index pairs, so there are no reference cycles to break:
//! deleting a subtree frees its slots for reuse. Ids carry a generation, so
//! an id kept across a deletion never resolves to whatever node later
//! occupies the recycled slot.

pub mod attributes;
mod serialize;

pub use attributes::AttributeSet;

use tracing::trace;

/// Handle to a node in a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// The root node of every tree.
    pub const ROOT: NodeId = NodeId {
        index: 0,
        generation: 0,
    };

    /// Slot index of this id.
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// Type of a node: a tag name or one of the structural pseudo-types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// The tree root. Exactly one per tree.
    Root,
    /// An element with its tag type.
    Element(String),
    /// Character data.
    Data,
    /// A comment.
    Comment,
    /// A DTD declaration or processing instruction.
    Declaration,
}

impl NodeType {
    /// Tag name for elements, a `#`-prefixed pseudo name otherwise.
    pub fn name(&self) -> &str {
        match self {
            NodeType::Root => "#root",
            NodeType::Element(name) => name,
            NodeType::Data => "#data",
            NodeType::Comment => "#comment",
            NodeType::Declaration => "#declaration",
        }
    }

    /// Whether this is an element.
    pub fn is_element(&self) -> bool {
        matches!(self, NodeType::Element(_))
    }
}

/// A node in a [`Tree`].
#[derive(Debug, Clone)]
pub struct Node {
    node_type: NodeType,
    /// Un-escaped text for data nodes, verbatim markup for comments and
    /// declarations, `None` for elements and the root.
    value: Option<String>,
    attributes: AttributeSet,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    position: Option<usize>,
    marked: bool,
}

impl Node {
    fn new(node_type: NodeType, value: Option<String>, attributes: AttributeSet) -> Self {
        Self {
            node_type,
            value,
            attributes,
            children: Vec::new(),
            parent: None,
            position: None,
            marked: false,
        }
    }

    /// Node type.
    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    /// Tag name for element nodes.
    pub fn tag_name(&self) -> Option<&str> {
        match &self.node_type {
            NodeType::Element(name) => Some(name),
            _ => None,
        }
    }

    /// Value of data, comment and declaration nodes.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Attributes (empty for non-elements).
    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    /// Mutable attributes.
    pub fn attributes_mut(&mut self) -> &mut AttributeSet {
        &mut self.attributes
    }

    /// Get an attribute value.
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name)
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Parent node; `None` only for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Document-order number, once [`Tree::number_nodes`] has run.
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Consumer bookkeeping flag.
    pub fn is_marked(&self) -> bool {
        self.marked
    }

    /// Set the bookkeeping flag.
    pub fn set_marked(&mut self, marked: bool) {
        self.marked = marked;
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena-based markup tree.
#[derive(Debug, Clone)]
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Create a tree holding only the root node.
    pub fn new() -> Self {
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(Node::new(NodeType::Root, None, AttributeSet::new())),
            }],
            free: Vec::new(),
            live: 1,
        }
    }

    /// The root node id.
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Get a node by its id.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    /// Get a mutable reference to a node.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    /// Whether `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes, root included.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of allocated slots, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Append a new node as the last child of `parent`.
    ///
    /// Returns `None` if `parent` is not live.
    pub fn create_child(
        &mut self,
        parent: NodeId,
        node_type: NodeType,
        value: Option<String>,
        attributes: AttributeSet,
    ) -> Option<NodeId> {
        if !self.contains(parent) {
            return None;
        }
        let mut node = Node::new(node_type, value, attributes);
        node.parent = Some(parent);

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = u32::try_from(self.slots.len()).ok()?;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index,
                    generation: 0,
                }
            }
        };
        self.live += 1;

        if let Some(parent_node) = self.get_mut(parent) {
            parent_node.children.push(id);
        }
        Some(id)
    }

    /// Append an element node.
    pub fn create_element(
        &mut self,
        parent: NodeId,
        tag_name: impl Into<String>,
        attributes: AttributeSet,
    ) -> Option<NodeId> {
        self.create_child(parent, NodeType::Element(tag_name.into()), None, attributes)
    }

    /// Append a data, comment or declaration node.
    pub fn create_leaf(
        &mut self,
        parent: NodeId,
        node_type: NodeType,
        value: impl Into<String>,
    ) -> Option<NodeId> {
        self.create_child(parent, node_type, Some(value.into()), AttributeSet::new())
    }

    /// Remove `id` and all its descendants, freeing their slots.
    ///
    /// Idempotent: deleting a stale id does nothing. The root cannot be
    /// deleted. Returns the number of nodes freed.
    pub fn delete_subtree(&mut self, id: NodeId) -> usize {
        if id == NodeId::ROOT || !self.contains(id) {
            return 0;
        }

        if let Some(parent) = self.get(id).and_then(Node::parent) {
            if let Some(parent_node) = self.get_mut(parent) {
                parent_node.children.retain(|&child| child != id);
            }
        }

        let mut freed = 0;
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let slot = &mut self.slots[current.index()];
            if slot.generation != current.generation {
                continue;
            }
            if let Some(node) = slot.node.take() {
                pending.extend(node.children);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(current.index);
                freed += 1;
            }
        }
        self.live -= freed;
        trace!(freed, live = self.live, "Deleted subtree");
        freed
    }

    /// Children of a node (empty for stale ids).
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Parent of a node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Number of ancestors between `id` and the root (root children have
    /// depth 0).
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count().saturating_sub(1)
    }

    /// Iterate over all ancestors of a node, from parent to root.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            current: self.parent(id),
        }
    }

    /// Pre-order iteration over `id` and its descendants.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let stack = if self.contains(id) { vec![id] } else { Vec::new() };
        Descendants { tree: self, stack }
    }

    /// Assign consecutive document-order numbers to `id` and its
    /// descendants, starting at `base`. Returns the next unused number.
    pub fn number_nodes(&mut self, id: NodeId, base: usize) -> usize {
        let order: Vec<NodeId> = self.descendants(id).collect();
        let mut next = base;
        for node_id in order {
            if let Some(node) = self.get_mut(node_id) {
                node.position = Some(next);
                next += 1;
            }
        }
        next
    }

    /// Clear the bookkeeping flag on `id` and its descendants.
    pub fn clear_marks(&mut self, id: NodeId) {
        let order: Vec<NodeId> = self.descendants(id).collect();
        for node_id in order {
            if let Some(node) = self.get_mut(node_id) {
                node.marked = false;
            }
        }
    }

    /// Concatenated values of all data nodes below `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut result = String::new();
        for node_id in self.descendants(id) {
            if let Some(node) = self.get(node_id) {
                if node.node_type == NodeType::Data {
                    result.push_str(node.value().unwrap_or_default());
                }
            }
        }
        result
    }

    /// First element named `tag_name` at or below `id`, in document order.
    pub fn find_first(&self, id: NodeId, tag_name: &str) -> Option<NodeId> {
        self.descendants(id)
            .find(|&node_id| self.get(node_id).and_then(Node::tag_name) == Some(tag_name))
    }

    /// All elements named `tag_name` at or below `id`, in document order.
    pub fn find_all(&self, id: NodeId, tag_name: &str) -> Vec<NodeId> {
        self.descendants(id)
            .filter(|&node_id| self.get(node_id).and_then(Node::tag_name) == Some(tag_name))
            .collect()
    }

    /// Compare the subtree at `a` with the subtree at `b` in `other`:
    /// node types, values, attributes and children, in order.
    pub fn structurally_equal(&self, a: NodeId, other: &Tree, b: NodeId) -> bool {
        let mut pending = vec![(a, b)];
        while let Some((x, y)) = pending.pop() {
            let (Some(left), Some(right)) = (self.get(x), other.get(y)) else {
                return false;
            };
            if left.node_type != right.node_type
                || left.value != right.value
                || left.attributes != right.attributes
                || left.children.len() != right.children.len()
            {
                return false;
            }
            pending.extend(left.children.iter().copied().zip(right.children.iter().copied()));
        }
        true
    }
}

/// Iterator over ancestors of a node.
pub struct Ancestors<'a> {
    tree: &'a Tree,
    current: Option<NodeId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        self.current = self.tree.parent(id);
        Some(id)
    }
}

/// Pre-order iterator over a subtree.
pub struct Descendants<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.children(id).iter().rev().copied());
        Some(id)
    }
}
