//! LeadPulse - Lead engagement timeline and sales summary engine
//!
//! LeadPulse gathers CRM and marketing-activity records about a sales lead,
//! normalizes them into one bounded, newest-first timeline, infers product
//! interest from URLs and text signals, and renders a short HTML summary for
//! sales reps. A text generator may write the summary; its output is gated
//! by the same guard as the deterministic renderer and replaced on any
//! violation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         SummaryEngine                             │
//! │                                                                   │
//! │  SourceProvider × N ──(concurrent, per-fetch timeout)──┐          │
//! │                                                        ▼          │
//! │                                                 SourceRecords     │
//! │          ┌─────────────────────────┬──────────────────┤          │
//! │          ▼                         ▼                  ▼          │
//! │   ┌─────────────┐        ┌──────────────────┐  ┌─────────────┐   │
//! │   │ Normalizer  │        │ EvidenceExtractor│  │ Record links│   │
//! │   └──────┬──────┘        └────────┬─────────┘  └──────┬──────┘   │
//! │          ▼                        ▼                   │          │
//! │   ┌─────────────┐        ┌──────────────────┐         │          │
//! │   │  Assembler  │        │ ProductInterest  │         │          │
//! │   └──────┬──────┘        └────────┬─────────┘         │          │
//! │          └──────────┬─────────────┘                   │          │
//! │                     ▼                                 │          │
//! │            ┌──────────────────┐                       │          │
//! │            │ NarrativeBuilder │                       │          │
//! │            └────────┬─────────┘                       │          │
//! │                     ▼                                 ▼          │
//! │   ┌──────────────────────────────────────────────────────────┐   │
//! │   │ SummaryRenderer: generator ─▶ OutputGuard ─▶ accept      │   │
//! │   │                  └── reject / fail ─▶ deterministic      │   │
//! │   └──────────────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`timeline`]: Source fan-out, event normalization and timeline assembly
//! - [`interest`]: Evidence extraction and product-interest inference
//! - [`narrative`]: Business-language narrative input
//! - [`summary`]: Sanitizer, output guard, renderers and generator seam
//! - [`privacy`]: Inline redaction of emails, phone numbers and identifiers
//! - [`engine`]: Per-request orchestration
//! - [`config`]: Configuration management

pub mod config;
pub mod engine;
pub mod error;
pub mod interest;
pub mod narrative;
pub mod privacy;
pub mod summary;
pub mod timeline;

pub use config::LeadPulseConfig;
pub use engine::{SummaryEngine, SummaryMeta, SummaryOutcome, SummaryRequest};
pub use error::{Error, Result};
