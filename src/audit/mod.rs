//! Audit trail: classification, move coalescing, writing and querying.
//!
//! A mutation hands its before/after attribute maps to [`route`]. Position-only
//! diffs go to the [`MoveCoalescer`], which writes one MOVE per burst; every
//! other diff is classified and written immediately through the [`AuditLog`].
//! [`HistoryService`] answers the read queries.

pub mod classifier;
pub mod coalescer;
pub mod history;
pub mod log;

pub use classifier::{classify, move_description, route, AttributeDiff, ChangeRoute, Classification};
pub use coalescer::{MoveCoalescer, WithdrawnMoves};
pub use history::HistoryService;
pub use log::AuditLog;
