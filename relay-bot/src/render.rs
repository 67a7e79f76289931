//! Markdown to Telegram HTML conversion.
//!
//! Model replies are Markdown. Telegram's HTML parse mode needs far less
//! escaping than its Markdown modes, so each outgoing part is converted here
//! right before sending. Parts produced by the chunker have balanced fences,
//! which lets every part be converted on its own.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::chunker::is_fence_line;

// ============================================================================
// Regex Patterns
// ============================================================================

static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,6}) (.+)$").unwrap());
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\s*)[-*] (.*)$").unwrap());
static QUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^&gt; ?(.*)$").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`\n]+)`").unwrap());
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]\n]+)\]\((https?://[^)\s]+)\)").unwrap());
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*\n]+)\*\*").unwrap());
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[^\w])_([^_\n]+)_($|[^\w])").unwrap());

// ============================================================================
// Public API
// ============================================================================

/// Convert Markdown to Telegram-compatible HTML.
///
/// | Input            | Output                   |
/// |------------------|--------------------------|
/// | `# Title`        | `<b>Title</b>`           |
/// | `### Section`    | `<i>Section</i>`         |
/// | `- item`         | `• item`                 |
/// | `> quote`        | `┃ <i>quote</i>`         |
/// | fenced block     | `<pre>code</pre>`        |
/// | `**bold**`       | `<b>bold</b>`            |
/// | `_italic_`       | `<i>italic</i>`          |
/// | `` `code` ``     | `<code>code</code>`      |
/// | `[text](url)`    | `<a href="url">text</a>` |
///
/// Everything else is HTML-escaped. A fence left open at the end of the
/// input still yields a closed `<pre>`.
pub fn to_telegram_html(markdown: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut code: Option<Vec<&str>> = None;

    for line in markdown.split('\n') {
        if is_fence_line(line) {
            match code.take() {
                Some(block) => out.push(pre_block(&block)),
                None => code = Some(Vec::new()),
            }
            continue;
        }
        match code.as_mut() {
            Some(block) => block.push(line),
            None => out.push(convert_line(line)),
        }
    }
    if let Some(block) = code {
        out.push(pre_block(&block));
    }

    out.join("\n")
}

/// Escape the characters Telegram's HTML parser treats specially.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// ============================================================================
// Block Conversion
// ============================================================================

fn pre_block(lines: &[&str]) -> String {
    format!("<pre>{}</pre>", escape_html(&lines.join("\n")))
}

fn convert_line(line: &str) -> String {
    let escaped = escape_html(line);

    if let Some(caps) = HEADING.captures(&escaped) {
        let level = caps.get(1).map_or(1, |m| m.len());
        let title = convert_inline(caps.get(2).map_or("", |m| m.as_str()));
        return if level <= 2 {
            format!("<b>{title}</b>")
        } else {
            format!("<i>{title}</i>")
        };
    }

    if let Some(caps) = QUOTE.captures(&escaped) {
        let text = convert_inline(caps.get(1).map_or("", |m| m.as_str()));
        return format!("┃ <i>{text}</i>");
    }

    if let Some(caps) = BULLET.captures(&escaped) {
        let indent = caps.get(1).map_or("", |m| m.as_str());
        let item = convert_inline(caps.get(2).map_or("", |m| m.as_str()));
        return format!("{indent}• {item}");
    }

    convert_inline(&escaped)
}

// ============================================================================
// Inline Formatting
// ============================================================================

/// Apply inline rules to already-escaped text. Code spans are cut out first
/// so their content is never reformatted.
fn convert_inline(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut last = 0;

    for caps in INLINE_CODE.captures_iter(escaped) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&format_spans(&escaped[last..whole.start()]));
        out.push_str("<code>");
        out.push_str(body.as_str());
        out.push_str("</code>");
        last = whole.end();
    }
    out.push_str(&format_spans(&escaped[last..]));
    out
}

fn format_spans(text: &str) -> String {
    let linked = LINK.replace_all(text, |caps: &Captures| {
        let label = caps.get(1).map_or("", |m| m.as_str());
        let url = caps.get(2).map_or("", |m| m.as_str()).replace('"', "&quot;");
        format!("<a href=\"{url}\">{label}</a>")
    });
    let bold = BOLD.replace_all(&linked, "<b>$1</b>");
    ITALIC
        .replace_all(&bold, "${1}<i>${2}</i>${3}")
        .into_owned()
}
