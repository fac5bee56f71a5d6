//! WebSocket Gateway
//!
//! Real-time chat over WebSocket connections.

pub mod gateway;
pub mod handler;
pub mod messages;
pub mod session;

pub use gateway::Gateway;
pub use handler::{ws_handler, Connection};
pub use messages::{ClientEvent, Outbound, ServerEvent};
pub use session::{SessionPhase, SessionState};
