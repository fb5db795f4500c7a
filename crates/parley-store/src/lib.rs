pub mod error;
pub mod reply;
pub mod tree;

pub use error::StoreError;
pub use reply::{Reply, ReplyStore, SharedTree};
pub use tree::{ConversationTree, MessageNode};
