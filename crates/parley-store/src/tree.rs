use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use parley_core::ids::NodeId;
use parley_core::turns::{ConversationTurn, Role};

use crate::error::StoreError;

/// One message in a conversation tree. Roots hold the system text.
#[derive(Clone, Debug, Serialize)]
pub struct MessageNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub role: Role,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip)]
    pub audio: Option<Bytes>,
    pub created_at: DateTime<Utc>,
}

/// Arena of message nodes linked by parent pointers.
///
/// Every conversation starts at a root node; each reply branches off an
/// existing node, so alternative continuations are siblings.
#[derive(Debug, Default)]
pub struct ConversationTree {
    nodes: Vec<MessageNode>,
}

impl ConversationTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, parent: Option<NodeId>, role: Role, text: String) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        self.nodes.push(MessageNode {
            id,
            parent,
            role,
            text,
            image: None,
            audio: None,
            created_at: Utc::now(),
        });
        id
    }

    /// Start a new conversation whose root carries `system_text`.
    pub fn add_root(&mut self, system_text: impl Into<String>) -> NodeId {
        self.push(None, Role::System, system_text.into())
    }

    pub fn reply(&mut self, parent: NodeId, role: Role, text: impl Into<String>) -> Result<NodeId, StoreError> {
        self.get(parent)?;
        Ok(self.push(Some(parent), role, text.into()))
    }

    pub fn get(&self, id: NodeId) -> Result<&MessageNode, StoreError> {
        self.nodes.get(id.index()).ok_or(StoreError::NotFound(id))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut MessageNode, StoreError> {
        self.nodes.get_mut(id.index()).ok_or(StoreError::NotFound(id))
    }

    pub fn set_image(&mut self, id: NodeId, url: impl Into<String>) -> Result<(), StoreError> {
        self.get_mut(id)?.image = Some(url.into());
        Ok(())
    }

    pub fn set_audio(&mut self, id: NodeId, audio: Bytes) -> Result<(), StoreError> {
        self.get_mut(id)?.audio = Some(audio);
        Ok(())
    }

    /// Path from the root to `leaf`, root first. The walk is bounded by the arena size.
    pub fn thread(&self, leaf: NodeId) -> Result<Vec<&MessageNode>, StoreError> {
        let mut path = Vec::new();
        let mut current = Some(leaf);
        while let Some(id) = current {
            if path.len() > self.nodes.len() {
                return Err(StoreError::BrokenChain(leaf));
            }
            let node = self.get(id)?;
            path.push(node);
            current = node.parent;
        }
        path.reverse();
        Ok(path)
    }

    pub fn root_of(&self, id: NodeId) -> Result<NodeId, StoreError> {
        self.thread(id)?
            .first()
            .map(|node| node.id)
            .ok_or(StoreError::NotFound(id))
    }

    /// Other replies to the same parent, including `id` itself. Roots have none.
    pub fn siblings(&self, id: NodeId) -> Result<Vec<NodeId>, StoreError> {
        let Some(parent) = self.get(id)?.parent else {
            return Ok(Vec::new());
        };
        Ok(self
            .nodes
            .iter()
            .filter(|node| node.parent == Some(parent))
            .map(|node| node.id)
            .collect())
    }

    /// System text and the conversation turns leading to `leaf`.
    pub fn turns(&self, leaf: NodeId) -> Result<(String, Vec<ConversationTurn>), StoreError> {
        let thread = self.thread(leaf)?;
        let Some((root, rest)) = thread.split_first() else {
            return Err(StoreError::NotFound(leaf));
        };
        let system = if root.role == Role::System {
            root.text.clone()
        } else {
            String::new()
        };
        let body = if root.role == Role::System { rest } else { &thread[..] };
        let turns = body
            .iter()
            .map(|node| {
                let turn = ConversationTurn::text(node.role, node.text.clone());
                match &node.image {
                    Some(url) => turn.with_image(url.clone()),
                    None => turn,
                }
            })
            .collect();
        Ok((system, turns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (ConversationTree, NodeId, NodeId) {
        let mut tree = ConversationTree::new();
        let root = tree.add_root("You are helpful.");
        let q = tree.reply(root, Role::User, "Hi").unwrap();
        let a = tree.reply(q, Role::Assistant, "Hello!").unwrap();
        (tree, root, a)
    }

    #[test]
    fn thread_runs_root_to_leaf() {
        let (tree, root, leaf) = sample();
        let texts: Vec<&str> = tree.thread(leaf).unwrap().iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["You are helpful.", "Hi", "Hello!"]);
        assert_eq!(tree.root_of(leaf).unwrap(), root);
        assert_eq!(tree.root_of(root).unwrap(), root);
    }

    #[test]
    fn turns_split_off_system_text() {
        let (mut tree, _, leaf) = sample();
        let q2 = tree.reply(leaf, Role::User, "What is this?").unwrap();
        tree.set_image(q2, "data:image/png;base64,AAAA").unwrap();

        let (system, turns) = tree.turns(q2).unwrap();
        assert_eq!(system, "You are helpful.");
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);
        assert!(turns[2].has_image());
    }

    #[test]
    fn branches_are_siblings() {
        let mut tree = ConversationTree::new();
        let root = tree.add_root("");
        let q = tree.reply(root, Role::User, "Hi").unwrap();
        let a1 = tree.reply(q, Role::Assistant, "one").unwrap();
        let a2 = tree.reply(q, Role::Assistant, "two").unwrap();
        assert_eq!(tree.siblings(a1).unwrap(), vec![a1, a2]);
        assert!(tree.siblings(root).unwrap().is_empty());
        assert_eq!(tree.thread(a2).unwrap().len(), 3);
    }

    #[test]
    fn unknown_nodes_are_errors() {
        let mut tree = ConversationTree::new();
        assert!(matches!(tree.reply(NodeId(7), Role::User, "x"), Err(StoreError::NotFound(NodeId(7)))));
        assert!(tree.thread(NodeId(0)).is_err());
    }

    #[test]
    fn corrupted_chain_is_bounded() {
        let mut tree = ConversationTree::new();
        let root = tree.add_root("");
        let child = tree.reply(root, Role::User, "x").unwrap();
        tree.get_mut(root).unwrap().parent = Some(child);
        assert!(matches!(tree.thread(child), Err(StoreError::BrokenChain(_))));
    }
}
