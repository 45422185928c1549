//! Value rendering seam and the default repr-style formatter.

use crate::config::FormattingConfig;
use crate::value::{DebugValue, Scalar, ValueCategory, ValueView};
use serde::{Deserialize, Serialize};

/// Formatting options accepted at the variable-listing boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatOptions {
    /// Render integers as hexadecimal.
    #[serde(default)]
    pub hex: bool,
    /// Render strings unabridged and unquoted.
    #[serde(default)]
    pub raw_string: bool,
}

impl FormatOptions {
    pub fn hex() -> Self {
        Self {
            hex: true,
            raw_string: false,
        }
    }

    pub fn raw_string() -> Self {
        Self {
            hex: false,
            raw_string: true,
        }
    }
}

/// Type name and display string of a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueDetails {
    pub type_name: String,
    pub display: String,
}

/// Produces the detailed rendering of a value.
pub trait ValueFormatter: Send + Sync {
    fn describe(&self, value: &dyn DebugValue, fmt: &FormatOptions) -> ValueDetails;
}

/// Nested containers deeper than this are elided in previews.
const MAX_PREVIEW_DEPTH: usize = 2;

/// Repr-style formatter with bounded container previews.
#[derive(Debug, Clone)]
pub struct ReprFormatter {
    max_string_len: usize,
    max_items: usize,
}

impl ReprFormatter {
    pub fn new(config: &FormattingConfig) -> Self {
        Self {
            max_string_len: config.max_string_len,
            max_items: config.max_items,
        }
    }

    fn render(&self, value: &dyn DebugValue, fmt: &FormatOptions, depth: usize) -> String {
        match value.view() {
            ValueView::Scalar(scalar) => render_scalar(&scalar, fmt),
            ValueView::Text(text) => {
                if fmt.raw_string && depth == 0 {
                    text
                } else {
                    quote_text(&truncate_chars(&text, self.max_string_len))
                }
            }
            ValueView::Bytes(bytes) => {
                let escaped = bytes.escape_ascii().to_string();
                format!("b'{}'", truncate_chars(&escaped, self.max_string_len))
            }
            ValueView::Sequence(items) => {
                let (open, close) = if value.type_name() == "tuple" {
                    ("(", ")")
                } else {
                    ("[", "]")
                };
                if depth >= MAX_PREVIEW_DEPTH {
                    return format!("{}...{}", open, close);
                }
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| self.render(item.as_ref(), fmt, depth + 1))
                    .collect();
                format!("{}{}{}", open, self.join_bounded(parts), close)
            }
            ValueView::Mapping(entries) => {
                if depth >= MAX_PREVIEW_DEPTH {
                    return "{...}".to_string();
                }
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(key, val)| {
                        format!(
                            "{}: {}",
                            self.render(key.as_ref(), fmt, depth + 1),
                            self.render(val.as_ref(), fmt, depth + 1)
                        )
                    })
                    .collect();
                format!("{{{}}}", self.join_bounded(parts))
            }
            ValueView::Object(_) => format!("<{} object>", value.type_name()),
        }
    }

    fn join_bounded(&self, mut parts: Vec<String>) -> String {
        if parts.len() > self.max_items {
            parts.truncate(self.max_items);
            parts.push("...".to_string());
        }
        parts.join(", ")
    }
}

impl Default for ReprFormatter {
    fn default() -> Self {
        Self::new(&FormattingConfig::default())
    }
}

impl ValueFormatter for ReprFormatter {
    fn describe(&self, value: &dyn DebugValue, fmt: &FormatOptions) -> ValueDetails {
        let mut display = self.render(value, fmt, 0);
        let is_preview = matches!(
            value.category(),
            ValueCategory::Sequence | ValueCategory::Mapping
        );
        if is_preview && !fmt.raw_string {
            display = truncate_chars(&display, self.max_string_len);
        }
        ValueDetails {
            type_name: value.type_name(),
            display,
        }
    }
}

pub(crate) fn render_scalar(scalar: &Scalar, fmt: &FormatOptions) -> String {
    match scalar {
        Scalar::None => "None".to_string(),
        Scalar::Bool(true) => "True".to_string(),
        Scalar::Bool(false) => "False".to_string(),
        Scalar::Int(v) if fmt.hex => {
            if *v < 0 {
                format!("-0x{:x}", v.unsigned_abs())
            } else {
                format!("0x{:x}", v)
            }
        }
        Scalar::Int(v) => v.to_string(),
        Scalar::Float(v) => format!("{:?}", v),
    }
}

/// Single-quoted literal form of a string, as used in display values and
/// evaluable paths.
pub(crate) fn quote_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Truncates to `max` characters, appending `...` when anything was cut.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
#[path = "tests/format_tests.rs"]
mod tests;
