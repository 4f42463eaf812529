//! Order routing.
//!
//! Every order in the system passes through [`OrderRouter::submit`]:
//! validation, idempotency by client key, per-venue rate limiting, the
//! venue call, and the single ledger append when an order fills.

mod bucket;
mod router;

pub use router::{OrderRouter, RouterConfig};
