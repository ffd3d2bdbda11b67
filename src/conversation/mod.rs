//! Multi-step admin conversations.
//!
//! Each user has at most one [`ConversationState`], held in a
//! [`SessionStore`] with a TTL. Commands enter a flow explicitly, every
//! valid reply advances it, and `/cancel` or expiry returns to `Idle`.

mod state;
mod store;

pub use state::{AdDraft, ConversationState, is_skip, parse_button, parse_schedule, split_pair};
pub use store::SessionStore;
