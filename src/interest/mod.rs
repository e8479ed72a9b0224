//! Product-interest inference
//!
//! ```text
//! web activity / campaigns / profile ──▶ EvidenceExtractor ──▶ Vec<Evidence>
//!                                                              │
//!                      RulesConfig ──▶ ProductInterestEngine ◀─┘ ──▶ ProductInterest
//! ```

pub mod evidence;
pub mod inference;

pub use evidence::{
    extract_urls, sanitize_url, Evidence, EvidenceCategory, EvidenceExtractor, EvidenceKind,
};
pub use inference::{Confidence, ProductInterest, ProductInterestEngine, ProductMatch};
