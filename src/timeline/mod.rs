//! Engagement timeline
//!
//! Source records are fetched concurrently ([`sources`]), mapped to
//! canonical events ([`normalize`]) and bounded into a newest-first
//! timeline ([`assemble`]). Field availability per environment comes from
//! [`schema`].

pub mod assemble;
pub mod event;
pub mod normalize;
pub mod opportunity;
pub mod schema;
pub mod sources;

pub use assemble::{IncludedCounts, Timeline, TimelineAssembler, TimelineMetadata};
pub use event::{Event, EventType, Importance};
pub use normalize::{objects, parse_instant, Normalizer, Record, DETAIL_MAX_CHARS};
pub use opportunity::{OpportunityEntry, OpportunityIndex};
pub use schema::{
    pick_existing_fields, InMemorySchemaCache, ObjectSchema, SchemaCache, SchemaDescriber,
    SchemaKey, SchemaResolver, SourceCapabilities,
};
pub use sources::{
    fetch_all, FetchStatus, SourceKind, SourceProvider, SourceQuery, SourceRecords, SourceReport,
    StaticSource,
};
