//! Recursive snapshot model for a room's shared document and presence.
//!
//! ```text
//! storage: [TreeNode]
//!    │
//!    ├── LiveObject { key: "settings" }
//!    │      ├── Json       { key: "theme",  payload: "dark" }
//!    │      └── LiveList   { key: "tags" }
//!    │             ├── Json { key: 0, payload: "a" }
//!    │             └── Json { key: 1, payload: "b" }
//!    └── LiveMap   { key: "cursors" }
//!
//! me / others: User { info, presence: [Json] }
//! ```
//!
//! Nodes are delivered as-is by the producer; child order reflects document
//! order and is never re-sorted here.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Position of a node inside its parent: a field name or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeKey {
    Index(u64),
    Name(String),
}

impl NodeKey {
    /// Key rendered as an object property name.
    pub fn as_property(&self) -> String {
        match self {
            NodeKey::Index(i) => i.to_string(),
            NodeKey::Name(name) => name.clone(),
        }
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKey::Index(i) => write!(f, "{i}"),
            NodeKey::Name(name) => write!(f, "{name}"),
        }
    }
}

impl From<&str> for NodeKey {
    fn from(name: &str) -> Self {
        NodeKey::Name(name.to_string())
    }
}

impl From<u64> for NodeKey {
    fn from(index: u64) -> Self {
        NodeKey::Index(index)
    }
}

/// Leaf holding an arbitrary JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonNode {
    pub id: String,
    pub key: NodeKey,
    pub payload: Value,
}

/// Map, list or object container. `payload` keeps delivery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerNode {
    pub id: String,
    pub key: NodeKey,
    pub payload: Vec<TreeNode>,
}

/// Presence root for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserNode {
    pub id: String,
    pub key: NodeKey,
    /// Transport-level connection number, when the producer reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<i64>,
    /// Arbitrary participant metadata.
    #[serde(default)]
    pub info: Value,
    #[serde(default)]
    pub presence: Vec<JsonNode>,
    #[serde(default)]
    pub is_read_only: bool,
}

impl UserNode {
    /// Presence entries folded back into a plain JSON object.
    pub fn presence_json(&self) -> Value {
        let mut map = Map::with_capacity(self.presence.len());
        for entry in &self.presence {
            map.insert(entry.key.as_property(), entry.payload.clone());
        }
        Value::Object(map)
    }
}

/// Discriminant of a [`TreeNode`], handy for icons and filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Json,
    LiveMap,
    LiveList,
    LiveObject,
    User,
}

/// One node of a storage or presence snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TreeNode {
    Json(JsonNode),
    LiveMap(ContainerNode),
    LiveList(ContainerNode),
    LiveObject(ContainerNode),
    User(UserNode),
}

impl TreeNode {
    /// Stable identity used as the render key.
    pub fn id(&self) -> &str {
        match self {
            TreeNode::Json(n) => &n.id,
            TreeNode::LiveMap(n) | TreeNode::LiveList(n) | TreeNode::LiveObject(n) => &n.id,
            TreeNode::User(n) => &n.id,
        }
    }

    pub fn key(&self) -> &NodeKey {
        match self {
            TreeNode::Json(n) => &n.key,
            TreeNode::LiveMap(n) | TreeNode::LiveList(n) | TreeNode::LiveObject(n) => &n.key,
            TreeNode::User(n) => &n.key,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            TreeNode::Json(_) => NodeKind::Json,
            TreeNode::LiveMap(_) => NodeKind::LiveMap,
            TreeNode::LiveList(_) => NodeKind::LiveList,
            TreeNode::LiveObject(_) => NodeKind::LiveObject,
            TreeNode::User(_) => NodeKind::User,
        }
    }

    /// Child nodes of a container; empty for leaves and user nodes.
    pub fn children(&self) -> &[TreeNode] {
        match self {
            TreeNode::LiveMap(n) | TreeNode::LiveList(n) | TreeNode::LiveObject(n) => &n.payload,
            TreeNode::Json(_) | TreeNode::User(_) => &[],
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self,
            TreeNode::LiveMap(_) | TreeNode::LiveList(_) | TreeNode::LiveObject(_)
        )
    }

    /// Depth-first search in document order, including `self`.
    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        if self.id() == id {
            return Some(self);
        }
        find_node(self.children(), id)
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + count_nodes(self.children())
    }

    /// Visit every node of this subtree in document order with its depth.
    pub fn walk<F: FnMut(&TreeNode, usize)>(&self, f: &mut F) {
        self.walk_at(0, f);
    }

    fn walk_at<F: FnMut(&TreeNode, usize)>(&self, depth: usize, f: &mut F) {
        f(self, depth);
        for child in self.children() {
            child.walk_at(depth + 1, f);
        }
    }

    /// Plain JSON view of this subtree.
    ///
    /// Maps and objects become JSON objects keyed by child key, lists become
    /// arrays in delivery order.
    pub fn to_json(&self) -> Value {
        match self {
            TreeNode::Json(n) => n.payload.clone(),
            TreeNode::LiveList(n) => Value::Array(n.payload.iter().map(TreeNode::to_json).collect()),
            TreeNode::LiveMap(n) | TreeNode::LiveObject(n) => to_json_object(&n.payload),
            TreeNode::User(n) => {
                let mut map = Map::new();
                if let Some(connection_id) = n.connection_id {
                    map.insert("connectionId".to_string(), Value::from(connection_id));
                }
                map.insert("info".to_string(), n.info.clone());
                map.insert("presence".to_string(), n.presence_json());
                Value::Object(map)
            }
        }
    }
}

/// Depth-first lookup across a top-level node sequence.
pub fn find_node<'a>(nodes: &'a [TreeNode], id: &str) -> Option<&'a TreeNode> {
    nodes.iter().find_map(|node| node.find(id))
}

/// Total number of nodes across a top-level node sequence.
pub fn count_nodes(nodes: &[TreeNode]) -> usize {
    nodes.iter().map(TreeNode::node_count).sum()
}

/// Fold a top-level node sequence into a JSON object keyed by node key.
pub fn to_json_object(nodes: &[TreeNode]) -> Value {
    let mut map = Map::with_capacity(nodes.len());
    for node in nodes {
        map.insert(node.key().as_property(), node.to_json());
    }
    Value::Object(map)
}
