//! Wire types for reporting agent activity to a war room.
//!
//! A war room is a shared, real-time monitoring surface. Reporting clients
//! publish a small vocabulary of events to it:
//!
//! ```text
//! Agent loop --[producer calls]--> Client --[WS /api/ws | POST /api/events]--> War room
//! ```
//!
//! Every event travels as a flat JSON object: the payload fields, tagged by
//! `type`, plus the routing metadata (`room`, `member`, `timestamp`) that the
//! client stamps on at dispatch time.

pub mod events;
pub mod status;

pub use events::{AgentLog, Envelope, EventKind, EventPayload};
pub use status::{AgentStatus, LogKind};
