//! Privacy protection for activity text
//!
//! Provides the inline redaction applied to every free-text field before it
//! can reach evidence, the narrative input, or rendered output.

pub mod redact;

pub use redact::{
    looks_like_record_id, normalize_snippet, redact_email_address, redact_inline_text,
    scrub_identifiers, truncate_chars, InlineRedactor, EMAIL_PLACEHOLDER, PHONE_PLACEHOLDER,
};
