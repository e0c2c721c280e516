//! In-band tool call detection.
//!
//! Providers are prompted to request tools by writing a JSON call (or an array
//! of calls) between [`CALL_BEGIN`] and [`CALL_END`]. Detection runs on the
//! complete text of a finished stream; a marker pair may span any number of
//! fragments.

use crate::domain::error::CallParseError;
use crate::domain::models::ToolCallRequest;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub const CALL_BEGIN: &str = "<|FunctionCallBegin|>";
pub const CALL_END: &str = "<|FunctionCallEnd|>";

static CALL_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?s){}(.*?){}",
        regex::escape(CALL_BEGIN),
        regex::escape(CALL_END)
    ))
    .expect("call block pattern is valid")
});

/// Cheap pre-check: both markers occur somewhere in `text`.
pub fn is_present(text: &str) -> bool {
    text.contains(CALL_BEGIN) && text.contains(CALL_END)
}

/// Raw contents of every marker pair, in order of appearance.
pub fn detect(text: &str) -> Vec<&str> {
    CALL_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Parses one block into its call requests. A single object yields one request,
/// an array yields one per element in array order.
pub fn parse_block(block: &str) -> Result<Vec<ToolCallRequest>, CallParseError> {
    let value: Value = serde_json::from_str(block.trim())?;
    let calls = match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ToolCallRequest>, _>>()?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(calls)
}

/// Example call shown to providers in the tool context.
pub fn example_call(tool_name: &str) -> String {
    format!(
        "{}[{{\"name\": \"{}\", \"parameters\": {{}}}}]{}",
        CALL_BEGIN, tool_name, CALL_END
    )
}
