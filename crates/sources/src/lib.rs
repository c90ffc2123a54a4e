//! `jobshift-sources`: read-only adapters for legacy job stores.
//!
//! Each adapter turns its framework's native records into
//! [`jobshift_core::CanonicalJob`]s. Stores are reached through small
//! collaborator traits ([`KeyValueStore`], [`FaktoryApi`], [`RiverStore`]);
//! concrete drivers live in `jobshift-infra`.

pub mod bullmq;
pub mod celery;
pub mod error;
pub mod faktory;
pub mod river;
pub mod sidekiq;
pub mod source;
pub mod store;

pub use bullmq::{parse_bullmq_fields, parse_bullmq_job, BullMqSource};
pub use celery::{parse_celery_message, CelerySource, DEFAULT_CELERY_QUEUE};
pub use error::{SourceError, StoreError};
pub use faktory::{parse_faktory_job, FaktoryApi, FaktorySource, InMemoryFaktoryApi};
pub use river::{
    parse_river_job, parse_river_record, InMemoryRiverStore, RiverJobRecord, RiverSource, RiverStore,
    PENDING_STATES,
};
pub use sidekiq::{parse_sidekiq_job, SidekiqSource};
pub use source::{Exported, Source, DEFAULT_CALL_TIMEOUT};
pub use store::{InMemoryKeyValueStore, KeyValueStore};
