//! Arena-backed document tree produced by the parser and read by the decoder.
//!
//! Nodes are owned top-down by [`NodeTree`]. Each node records its parent as a
//! plain [`NodeId`], which lets diagnostics walk upward to rebuild a path
//! without any shared ownership between parent and child.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Structural kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Scalar,
    Sequence,
    Mapping,
}

/// Resolved YAML tag of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Seq,
    Map,
}

impl Tag {
    /// Short YAML form used in messages, e.g. `!!map`.
    pub fn short(self) -> &'static str {
        match self {
            Tag::Null => "!!null",
            Tag::Bool => "!!bool",
            Tag::Int => "!!int",
            Tag::Float => "!!float",
            Tag::Str => "!!str",
            Tag::Seq => "!!seq",
            Tag::Map => "!!map",
        }
    }

    pub fn kind(self) -> NodeKind {
        match self {
            Tag::Seq => NodeKind::Sequence,
            Tag::Map => NodeKind::Mapping,
            _ => NodeKind::Scalar,
        }
    }

    pub fn is_container(self) -> bool {
        matches!(self, Tag::Seq | Tag::Map)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

/// Index of a node inside its [`NodeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    tag: Tag,
    value: String,
    line: usize,
    column: usize,
    parent: Option<NodeId>,
    /// Position among the parent's children.
    slot: usize,
    children: Vec<NodeId>,
}

/// Owned node arena. The first node pushed is the root.
#[derive(Debug, Clone, Default)]
pub struct NodeTree {
    nodes: Vec<Node>,
}

impl NodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node under `parent`. The first node pushed is the root and
    /// should be the only one pushed with `parent == None`.
    pub fn push(
        &mut self,
        parent: Option<NodeId>,
        tag: Tag,
        value: impl Into<String>,
        line: usize,
        column: usize,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let slot = match parent {
            Some(p) => {
                let siblings = &mut self.nodes[p.0].children;
                siblings.push(id);
                siblings.len() - 1
            }
            None => 0,
        };
        self.nodes.push(Node {
            tag,
            value: value.into(),
            line,
            column,
            parent,
            slot,
            children: Vec::new(),
        });
        id
    }

    /// Root node, or `None` for an empty tree.
    pub fn root(&self) -> Option<NodeRef<'_>> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(self.get(NodeId(0)))
        }
    }

    pub fn get(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { tree: self, id }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Borrowed handle to a node. Cheap to copy.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a NodeTree,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    fn node(&self) -> &'a Node {
        &self.tree.nodes[self.id.0]
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tag(&self) -> Tag {
        self.node().tag
    }

    pub fn kind(&self) -> NodeKind {
        self.node().tag.kind()
    }

    /// Raw scalar text. Empty for containers.
    pub fn value(&self) -> &'a str {
        &self.node().value
    }

    /// 1-based source line.
    pub fn line(&self) -> usize {
        self.node().line
    }

    /// 1-based source column.
    pub fn column(&self) -> usize {
        self.node().column
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.node().parent.map(|id| self.tree.get(id))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let tree = self.tree;
        self.node().children.iter().map(move |id| tree.get(*id))
    }

    pub fn child(&self, index: usize) -> Option<NodeRef<'a>> {
        self.node()
            .children
            .get(index)
            .map(|id| self.tree.get(*id))
    }

    /// Key/value pairs of a mapping node. Empty for other kinds.
    pub fn entries(&self) -> impl Iterator<Item = (NodeRef<'a>, NodeRef<'a>)> + 'a {
        let tree = self.tree;
        let children: &'a [NodeId] = if self.tag() == Tag::Map {
            &self.node().children
        } else {
            &[]
        };
        children
            .chunks_exact(2)
            .map(move |pair| (tree.get(pair[0]), tree.get(pair[1])))
    }

    /// Rebuilds the key/index path from the root down to this node.
    ///
    /// A key node resolves to its own key, so errors raised on a mapping key
    /// and on its value share the same path.
    pub fn path(&self) -> NodePath {
        let mut segments = Vec::new();
        let mut current = *self;
        while let Some(parent) = current.parent() {
            let slot = current.node().slot;
            match parent.tag() {
                Tag::Map => {
                    if let Some(key) = parent.child(slot - slot % 2) {
                        segments.push(PathSegment::Key(key.value().to_string()));
                    }
                }
                Tag::Seq => segments.push(PathSegment::Index(slot)),
                _ => {}
            }
            current = parent;
        }
        segments.reverse();
        NodePath { segments }
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("tag", &self.tag())
            .field("value", &self.value())
            .field("line", &self.line())
            .field("column", &self.column())
            .finish()
    }
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl Eq for NodeRef<'_> {}

/// One step of a [`NodePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// Path from the document root to a node, e.g. `servers[0].port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath {
    segments: Vec<PathSegment>,
}

impl NodePath {
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(_) if i > 0 => write!(f, ".{segment}")?,
                _ => write!(f, "{segment}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{NodeTree, PathSegment, Tag};

    #[test]
    fn root_has_empty_path() {
        let mut tree = NodeTree::new();
        tree.push(None, Tag::Map, "", 1, 1);
        let root = tree.root().unwrap();
        assert!(root.path().is_empty());
        assert_eq!(root.path().to_string(), "");
    }

    #[test]
    fn path_walks_keys_and_indices() {
        let mut tree = NodeTree::new();
        let root = tree.push(None, Tag::Map, "", 1, 1);
        tree.push(Some(root), Tag::Str, "servers", 1, 1);
        let seq = tree.push(Some(root), Tag::Seq, "", 2, 3);
        let item = tree.push(Some(seq), Tag::Map, "", 2, 5);
        let key = tree.push(Some(item), Tag::Str, "port", 2, 5);
        let value = tree.push(Some(item), Tag::Int, "80", 2, 11);

        let path = tree.get(value).path();
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("servers".to_string()),
                PathSegment::Index(0),
                PathSegment::Key("port".to_string()),
            ]
        );
        assert_eq!(path.to_string(), "servers[0].port");
        assert_eq!(tree.get(key).path(), path);
    }

    #[test]
    fn entries_pairs_mapping_children() {
        let mut tree = NodeTree::new();
        let root = tree.push(None, Tag::Map, "", 1, 1);
        tree.push(Some(root), Tag::Str, "a", 1, 1);
        tree.push(Some(root), Tag::Int, "1", 1, 4);
        tree.push(Some(root), Tag::Str, "b", 2, 1);
        tree.push(Some(root), Tag::Bool, "true", 2, 4);

        let pairs: Vec<(String, String)> = tree
            .root()
            .unwrap()
            .entries()
            .map(|(k, v)| (k.value().to_string(), v.value().to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "true".to_string())
            ]
        );
    }
}
