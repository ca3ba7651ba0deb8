//! Best-effort structured extraction of tool directives from model text.
//!
//! The wire grammar lives entirely in this module: a `<tool>NAME</tool>`
//! marker followed by a `<params>{json}</params>` block. Extraction returns
//! an option, never an error; malformed directives are ordinary prose.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

/// One extracted tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDirective {
    pub tool: String,
    pub params: serde_json::Value,
    /// Exact byte span of the directive in the source text, so the panel
    /// can splice it out of the visible transcript.
    pub span: Range<usize>,
}

fn directive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<tool>\s*([A-Za-z0-9_]+)\s*</tool>\s*<params>(.*?)</params>")
            .expect("directive regex is valid")
    })
}

/// Scan completed (non-partial) model text for the first tool directive.
/// First match wins; later matches in the same text are display-only.
/// A parameter block that does not parse as a JSON object yields `None`.
pub fn parse_tool_directive(text: &str) -> Option<ToolDirective> {
    let captures = directive_regex().captures(text)?;
    let full = captures.get(0)?;
    let tool = captures.get(1)?.as_str().to_string();
    let raw_params = captures.get(2)?.as_str().trim();

    let params = serde_json::from_str::<serde_json::Value>(raw_params).ok()?;
    if !params.is_object() {
        return None;
    }

    Some(ToolDirective {
        tool,
        params,
        span: full.start()..full.end(),
    })
}

/// Remove the directive span from the assistant text shown to the user,
/// so the raw directive is not duplicated next to its tool result.
pub fn strip_directive(text: &str, directive: &ToolDirective) -> String {
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..directive.span.start]);
    out.push_str(&text[directive.span.end..]);
    out.trim().to_string()
}
