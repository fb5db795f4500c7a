use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use parley_core::ids::NodeId;
use parley_core::turns::Role;

use crate::error::StoreError;
use crate::tree::ConversationTree;

/// A persisted model reply, as reported in `generation_complete`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reply {
    pub id: NodeId,
    pub parent: NodeId,
    pub text: String,
    pub has_audio: bool,
    pub created_at: DateTime<Utc>,
}

/// Where finished generations are recorded.
#[async_trait]
pub trait ReplyStore: Send + Sync {
    async fn create_reply(&self, parent: NodeId, text: &str, audio: Option<Bytes>) -> Result<Reply, StoreError>;
}

/// Process-wide conversation tree behind a lock.
#[derive(Clone, Default)]
pub struct SharedTree {
    inner: Arc<RwLock<ConversationTree>>,
}

impl SharedTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<R>(&self, f: impl FnOnce(&ConversationTree) -> R) -> R {
        f(&self.inner.read())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut ConversationTree) -> R) -> R {
        f(&mut self.inner.write())
    }
}

#[async_trait]
impl ReplyStore for SharedTree {
    async fn create_reply(&self, parent: NodeId, text: &str, audio: Option<Bytes>) -> Result<Reply, StoreError> {
        self.write(|tree| {
            let id = tree.reply(parent, Role::Assistant, text)?;
            let has_audio = audio.is_some();
            if let Some(audio) = audio {
                tree.set_audio(id, audio)?;
            }
            let node = tree.get(id)?;
            debug!(%id, %parent, has_audio, "reply stored");
            Ok(Reply {
                id,
                parent,
                text: node.text.clone(),
                has_audio,
                created_at: node.created_at,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reply_attaches_to_parent_with_audio() {
        let store = SharedTree::new();
        let question = store.write(|tree| {
            let root = tree.add_root("sys");
            tree.reply(root, Role::User, "Hi")
        })
        .unwrap();

        let reply = store
            .create_reply(question, "Hello.", Some(Bytes::from_static(b"RIFF")))
            .await
            .unwrap();
        assert_eq!(reply.parent, question);
        assert!(reply.has_audio);

        store.read(|tree| {
            let node = tree.get(reply.id).unwrap();
            assert_eq!(node.role, Role::Assistant);
            assert_eq!(node.parent, Some(question));
            assert_eq!(node.audio.as_deref(), Some(&b"RIFF"[..]));
        });
    }

    #[tokio::test]
    async fn reply_to_missing_parent_fails() {
        let store = SharedTree::new();
        let err = store.create_reply(NodeId(3), "x", None).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(NodeId(3))));
    }

    #[test]
    fn reply_serializes_for_events() {
        let reply = Reply {
            id: NodeId(4),
            parent: NodeId(3),
            text: "Hi".into(),
            has_audio: false,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["id"], 4);
        assert_eq!(value["parent"], 3);
    }
}
