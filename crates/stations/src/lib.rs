//! Station aggregation: cached upstream access, bulk/fan-out/point loading,
//! the cumulative station store and the periodic refresh session.

pub mod cache;
pub mod service;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use cache::{CachedSource, TtlCache};
pub use service::{synthesized_id, StationService};
pub use session::MapSession;
pub use store::{RefreshOutcome, RefreshTicket, StationStore, StoreSnapshot};
