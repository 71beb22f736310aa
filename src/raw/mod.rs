//! Raw memory access to fixed-layout records
//!
//! Two targets implement [`RawAccess`]: [`HandleAccess`] resolves the
//! chunk through the service on every call, a
//! [`PinGuard`](crate::chunk::PinGuard) addresses pinned memory directly.

pub mod access;
pub mod record;

pub use access::{HandleAccess, RawAccess, RawAccessExt};
pub use record::{FixedRecordCodec, RecordAccess};
