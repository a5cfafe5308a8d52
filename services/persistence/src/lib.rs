//! Durable journaling and the event writer pipeline
//!
//! The [`OrderStore`] owns the on-disk truth: framed, checksummed,
//! append-only logs per instrument plus the order-id counter high-water
//! mark. Four [`Writer`] implementations feed it and its consumers:
//!
//! * [`QueuedDurableWriter`]: non-blocking enqueue, background apply.
//! * [`BroadcastWriter`]: lossy fan-out to subscribers.
//! * [`BackupWriter`]: plain-text event journal per instrument.
//! * [`CompositeWriter`]: ordered fan-out over all of the above.

pub mod backup;
pub mod broadcast;
pub mod composite;
pub mod frame;
pub mod queued;
pub mod store;
pub mod writer;

pub use backup::BackupWriter;
pub use broadcast::BroadcastWriter;
pub use composite::CompositeWriter;
pub use frame::FsyncPolicy;
pub use queued::{DurableWriterHealth, QueuedDurableWriter};
pub use store::{OrderStore, StoreConfig, StoreError};
pub use writer::{Writer, WriterError, WriterEvent};
