//! Allow-list HTML sanitizer
//!
//! A single left-to-right pass over a tag/attribute grammar:
//!
//! ```text
//! text        ──▶ kept (stray '<' / '>' escaped)
//! <p|strong|ul|li|em> ──▶ re-emitted bare, attributes dropped
//! <br ...>    ──▶ <br/>
//! <a ...>     ──▶ <a href=".." target="_blank" rel="noopener"> or <a>
//! <script|style|head> ──▶ dropped with their content
//! comments, doctype, any other tag ──▶ dropped
//! ```
//!
//! Output of [`sanitize_html`] is a fixed point: sanitizing it again returns
//! the same string.

/// Tags that survive sanitization
pub const ALLOWED_TAGS: [&str; 7] = ["p", "strong", "ul", "li", "br", "em", "a"];

/// Tags whose entire content is discarded
const DROPPED_CONTAINERS: [&str; 3] = ["script", "style", "head"];

/// Escape text for an HTML body or a double-quoted attribute value
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverse of [`escape_html`] for the five entities it emits
pub fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Whether an anchor target may be emitted: `https://` or a single-slash
/// root-relative path
pub fn is_safe_href(href: &str) -> bool {
    let href = href.trim();
    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:") || lower.starts_with("data:") {
        return false;
    }
    lower.starts_with("https://") || (href.starts_with('/') && !href.starts_with("//"))
}

/// Map typographic dashes and quotes to ASCII
fn normalize_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        })
        .collect::<String>()
        .replace("\r\n", "\n")
}

/// A parsed tag
struct Tag<'a> {
    name: String,
    closing: bool,
    attrs: &'a str,
}

/// Parse the inside of `<...>`; `None` when it does not start like a tag
fn parse_tag(inner: &str) -> Option<Tag<'_>> {
    let trimmed = inner.trim_start();
    let (closing, rest) = match trimmed.strip_prefix('/') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed),
    };
    if !rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    let name_len = rest
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(rest.len());
    Some(Tag {
        name: rest[..name_len].to_ascii_lowercase(),
        closing,
        attrs: &rest[name_len..],
    })
}

/// Attribute value by name (case-insensitive); quoted or bare values
fn attribute(attrs: &str, wanted: &str) -> Option<String> {
    let bytes = attrs.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        let name_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'='
            && bytes[i] != b'/'
        {
            i += 1;
        }
        let name = &attrs[name_start..i];
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let mut value = None;
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i];
                let start = i + 1;
                let end = attrs[start..]
                    .find(quote as char)
                    .map_or(attrs.len(), |off| start + off);
                value = Some(&attrs[start..end]);
                i = (end + 1).min(attrs.len());
            } else {
                let start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                value = Some(&attrs[start..i]);
            }
        }
        if name.is_empty() && value.is_none() {
            i += 1;
            continue;
        }
        if name.eq_ignore_ascii_case(wanted) {
            return value.map(str::to_string);
        }
    }
    None
}

/// Byte offset of the `>` closing a tag opened at `start`, honoring quotes
fn tag_end(s: &str, start: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (off, c) in s[start..].char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '>') => return Some(start + off),
            _ => {}
        }
    }
    None
}

/// Byte offset just past the closing tag of a dropped container
fn skip_container(s: &str, from: usize, name: &str) -> usize {
    let lower = s[from..].to_ascii_lowercase();
    let needle = format!("</{}", name);
    match lower.find(&needle) {
        Some(off) => {
            let close_start = from + off;
            tag_end(s, close_start).map_or(s.len(), |end| end + 1)
        }
        None => s.len(),
    }
}

fn render_anchor(attrs: &str) -> String {
    match attribute(attrs, "href").map(|raw| unescape_entities(raw.trim())) {
        Some(href) if is_safe_href(&href) => format!(
            "<a href=\"{}\" target=\"_blank\" rel=\"noopener\">",
            escape_html(&href)
        ),
        _ => "<a>".to_string(),
    }
}

/// Sanitize an HTML fragment down to the allow-listed grammar
pub fn sanitize_html(input: &str) -> String {
    let s = normalize_punctuation(input);
    let mut out = String::with_capacity(s.len());
    let mut i = 0;

    while let Some(c) = s[i..].chars().next() {
        match c {
            '<' => {
                let rest = &s[i + 1..];
                if rest.starts_with("!--") {
                    i = match rest[3..].find("-->") {
                        Some(off) => i + 1 + 3 + off + 3,
                        None => s.len(),
                    };
                    continue;
                }
                let Some(end) = tag_end(&s, i + 1) else {
                    out.push_str("&lt;");
                    i += 1;
                    continue;
                };
                let inner = &s[i + 1..end];
                if inner.starts_with('!') || inner.starts_with('?') {
                    i = end + 1;
                    continue;
                }
                let Some(tag) = parse_tag(inner) else {
                    out.push_str("&lt;");
                    i += 1;
                    continue;
                };
                i = end + 1;
                if !tag.closing && DROPPED_CONTAINERS.contains(&tag.name.as_str()) {
                    i = skip_container(&s, i, &tag.name);
                    continue;
                }
                match (tag.name.as_str(), tag.closing) {
                    ("br", _) => out.push_str("<br/>"),
                    ("a", false) => out.push_str(&render_anchor(tag.attrs)),
                    (name, closing) if ALLOWED_TAGS.contains(&name) => {
                        out.push('<');
                        if closing {
                            out.push('/');
                        }
                        out.push_str(name);
                        out.push('>');
                    }
                    _ => {}
                }
            }
            '>' => {
                out.push_str("&gt;");
                i += 1;
            }
            other => {
                out.push(other);
                i += other.len_utf8();
            }
        }
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_strips_attributes_and_unknown_tags() {
        let out = sanitize_html(
            r#"<div class="x"><p style="color:red">Hi <span>there</span></p><UL><li id="1">One</li></UL></div>"#,
        );
        assert_eq!(out, "<p>Hi there</p><ul><li>One</li></ul>");
    }

    #[test]
    fn test_drops_document_wrappers_and_scripts() {
        let out = sanitize_html(
            "<!DOCTYPE html><html><head><title>t</title></head><body>\
             <!-- note --><script>alert(1)</script><style>p{}</style><p>Body</p></body></html>",
        );
        assert_eq!(out, "<p>Body</p>");
    }

    #[test]
    fn test_br_variants() {
        assert_eq!(sanitize_html("a<br>b<BR />c<br/>"), "a<br/>b<br/>c<br/>");
    }

    #[test]
    fn test_anchor_rewrite() {
        assert_eq!(
            sanitize_html(r#"<a href="https://example.com/x" onclick="evil()">x</a>"#),
            r#"<a href="https://example.com/x" target="_blank" rel="noopener">x</a>"#
        );
        assert_eq!(
            sanitize_html("<a href='/lightning/r/1'>x</a>"),
            r#"<a href="/lightning/r/1" target="_blank" rel="noopener">x</a>"#
        );
        assert_eq!(sanitize_html(r#"<a href="javascript:alert(1)">x</a>"#), "<a>x</a>");
        assert_eq!(sanitize_html(r#"<a href="data:text/html,hi">x</a>"#), "<a>x</a>");
        assert_eq!(sanitize_html(r#"<a href="http://example.com">x</a>"#), "<a>x</a>");
        assert_eq!(sanitize_html(r#"<a href="//evil.example">x</a>"#), "<a>x</a>");
        assert_eq!(sanitize_html(r#"<a data-href="https://x.example">x</a>"#), "<a>x</a>");
    }

    #[test]
    fn test_stray_angle_brackets_escaped() {
        assert_eq!(sanitize_html("<p>3 < 5 and 7 > 2</p>"), "<p>3 &lt; 5 and 7 &gt; 2</p>");
    }

    #[test]
    fn test_punctuation_normalized() {
        assert_eq!(
            sanitize_html("<p>\u{201C}Hi\u{201D} \u{2014} it\u{2019}s</p>"),
            "<p>\"Hi\" - it's</p>"
        );
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            r#"<p onclick="x">A &amp; B</p><a href="https://e.example/?a=1&amp;b=2">l</a>"#,
            "<ul><li>1 < 2</li></ul><script>x</script>",
            r#"<a href="https://e.example/q?x=&quot;y&quot;">q</a>"#,
        ];
        for input in inputs {
            let once = sanitize_html(input);
            assert_eq!(sanitize_html(&once), once, "input: {}", input);
        }
    }

    #[test]
    fn test_is_safe_href() {
        assert!(is_safe_href("https://example.com"));
        assert!(is_safe_href("/relative"));
        assert!(!is_safe_href("//protocol-relative"));
        assert!(!is_safe_href("JavaScript:alert(1)"));
        assert!(!is_safe_href(""));
    }
}
