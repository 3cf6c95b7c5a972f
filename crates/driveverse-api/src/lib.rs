pub mod chats;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod router;
pub mod socket;
pub mod state;
pub mod uploads;
pub mod users;

pub use router::build_router;
pub use state::{ApiConfig, AppState, AppStateInner};
