//! Client-side reconciliation state for the chat screens.
//!
//! Nothing here does I/O. The caller feeds in REST results and gateway
//! events and renders whatever state comes out.

pub mod inbox;
pub mod view;

pub use inbox::Inbox;
pub use view::{ChatEntry, ChatView, Delivery, EntryId, Received, TempId};
