//! Inline redaction for free text that may flow into sales-facing output
//!
//! Every piece of activity text (event details, evidence snippets, labels)
//! passes through the same rule set before it is kept anywhere:
//! - email addresses become `*@redacted`
//! - phone-like runs with 8+ digits become `[redacted]`; calendar dates
//!   such as `2024-05-01` are left alone

use regex::Regex;
use std::sync::LazyLock;

/// Replacement for a redacted email address
pub const EMAIL_PLACEHOLDER: &str = "*@redacted";

/// Replacement for a redacted phone-like sequence
pub const PHONE_PLACEHOLDER: &str = "[redacted]";

static RE_EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").ok());

static RE_PHONE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d\s().-]{6,}\d").ok());

static RE_CALENDAR_DATE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}(?:\s\d{1,2})?$").ok());

/// Minimum digit count for a phone-like run
const MIN_PHONE_DIGITS: usize = 8;

static RE_WHITESPACE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s+").ok());

static RE_ALNUM_TOKEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9]{15,18}\b").ok());

static DEFAULT_REDACTOR: LazyLock<InlineRedactor> = LazyLock::new(InlineRedactor::new);

/// A single redaction rule
struct RedactionRule {
    name: &'static str,
    pattern: &'static LazyLock<Option<Regex>>,
    replacement: &'static str,
    /// Extra check on each match; rejected matches are kept as-is
    accept: fn(&str) -> bool,
}

impl RedactionRule {
    fn matches(&self, text: &str) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|re| re.find_iter(text).any(|m| (self.accept)(m.as_str())))
    }
}

fn any_match(_candidate: &str) -> bool {
    true
}

fn is_phone_like(candidate: &str) -> bool {
    let digits = candidate.chars().filter(|c| c.is_ascii_digit()).count();
    digits >= MIN_PHONE_DIGITS
        && !RE_CALENDAR_DATE
            .as_ref()
            .is_some_and(|re| re.is_match(candidate))
}

/// Rule-driven inline text redactor.
///
/// Rules are applied in order; emails first so the digits inside an address
/// never survive as a partial phone match.
pub struct InlineRedactor {
    rules: Vec<RedactionRule>,
}

impl InlineRedactor {
    /// Create a redactor with the built-in email and phone rules
    pub fn new() -> Self {
        Self {
            rules: vec![
                RedactionRule {
                    name: "email",
                    pattern: &RE_EMAIL,
                    replacement: EMAIL_PLACEHOLDER,
                    accept: any_match,
                },
                RedactionRule {
                    name: "phone",
                    pattern: &RE_PHONE,
                    replacement: PHONE_PLACEHOLDER,
                    accept: is_phone_like,
                },
            ],
        }
    }

    /// Redact sensitive data in text
    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();
        for rule in &self.rules {
            if let Some(re) = rule.pattern.as_ref() {
                result = re
                    .replace_all(&result, |caps: &regex::Captures| {
                        let found = &caps[0];
                        if (rule.accept)(found) {
                            rule.replacement.to_string()
                        } else {
                            found.to_string()
                        }
                    })
                    .into_owned();
            }
        }
        result
    }

    /// Check if text contains any data a rule would redact
    pub fn contains_sensitive(&self, text: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(text))
    }

    /// Names of the rules that match the text
    pub fn matching_rules(&self, text: &str) -> Vec<&'static str> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(text))
            .map(|rule| rule.name)
            .collect()
    }
}

impl Default for InlineRedactor {
    fn default() -> Self {
        Self::new()
    }
}

/// Redact emails and phone-like runs with the default rule set.
///
/// Returns `None` for empty input so callers can drop the field entirely.
pub fn redact_inline_text(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    Some(DEFAULT_REDACTOR.redact(text))
}

/// Mask the local part of an address, keeping only the domain (`*@example.com`).
pub fn redact_email_address(email: &str) -> Option<String> {
    let email = email.trim();
    if email.is_empty() {
        return None;
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
            Some(format!("*@{}", domain))
        }
        _ => Some(DEFAULT_REDACTOR.redact(email)),
    }
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Redact, collapse whitespace and cap a free-text snippet.
///
/// Snippets longer than `max` characters are cut and suffixed with `...`.
pub fn normalize_snippet(text: &str, max: usize) -> Option<String> {
    let redacted = redact_inline_text(text)?;
    let flat = match RE_WHITESPACE.as_ref() {
        Some(re) => re.replace_all(&redacted, " ").trim().to_string(),
        None => redacted.trim().to_string(),
    };
    if flat.is_empty() {
        return None;
    }
    if flat.chars().count() > max {
        return Some(format!("{}...", truncate_chars(&flat, max)));
    }
    Some(flat)
}

/// Whether a token has the shape of a CRM record identifier
/// (15 or 18 alphanumerics mixing letters and digits).
pub fn looks_like_record_id(token: &str) -> bool {
    let len = token.len();
    (len == 15 || len == 18)
        && token.chars().all(|c| c.is_ascii_alphanumeric())
        && token.chars().any(|c| c.is_ascii_digit())
        && token.chars().any(|c| c.is_ascii_alphabetic())
}

/// Remove record-identifier-shaped tokens from visible text.
pub fn scrub_identifiers(text: &str) -> String {
    let Some(re) = RE_ALNUM_TOKEN.as_ref() else {
        return text.to_string();
    };
    let scrubbed = re.replace_all(text, |caps: &regex::Captures<'_>| {
        let token = &caps[0];
        if looks_like_record_id(token) {
            "[record]".to_string()
        } else {
            token.to_string()
        }
    });
    scrubbed.into_owned()
}
