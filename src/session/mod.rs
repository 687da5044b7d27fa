//! Session table: keys, counters, replay windows, transport bindings.

mod counter;
mod session;
mod table;

pub use counter::{OutboundCounter, ReplayWindow};
pub use session::{AuthMode, Session, SessionSecrets, SessionState, TransportBinding};
pub use table::{SessionTable, DEFAULT_MAX_SESSIONS};
