//! Prompt text the gateway adds to conversations.

use crate::domain::detector::{example_call, CALL_BEGIN, CALL_END};
use crate::domain::models::{Message, Role, ToolCallResult, ToolDescriptor, ToolNamespace};

pub const TOOLS_LOADING_NOTICE: &str = "Tools are still loading, please try again shortly.";

pub fn tool_context_header() -> String {
    format!(
        "You can use the following MCP tools to help the user. To call a tool, reply with:\n\n\
         {}\n[{{\"name\": \"tool_name\", \"parameters\": {{\"param\": \"value\"}}}}]\n{}\n\n\
         Available MCP tools:\n\n",
        CALL_BEGIN, CALL_END
    )
}

pub fn tool_context_footer() -> &'static str {
    "\nImportant:\n\
     1. Pick the tool that matches what the user actually asked for\n\
     2. Make sure parameters are correct and complete before calling\n\
     3. Required parameters must not be empty; optional ones may be omitted or null\n\
     4. Call one tool at a time and wait for its result before deciding on another\n\
     5. Use the returned result to give the user a useful answer\n"
}

pub fn describe_namespace(namespace: &ToolNamespace) -> String {
    format!(
        "## {} ({})\nDescription: {}\n\n",
        namespace.label,
        namespace.id,
        namespace.description.as_deref().unwrap_or_default()
    )
}

/// Name, description, parameters and a worked example for one tool.
pub fn describe_tool(tool: &ToolDescriptor) -> String {
    let mut out = format!("### {}\nPurpose: {}\n", tool.name, tool.description);

    let params = tool.parameter_specs();
    if !params.is_empty() {
        out.push_str("Parameters:\n");
        for param in params {
            let mark = if param.required { "required" } else { "optional" };
            out.push_str(&format!(
                "  - {} ({}) ({}): {}\n",
                param.name, param.kind, mark, param.description
            ));
        }
    }

    out.push_str(&format!("Example: {}\n\n", example_call(&tool.name)));
    out
}

/// Appends `addendum` to a leading system message, or inserts one.
pub fn attach_system_context(mut messages: Vec<Message>, addendum: &str) -> Vec<Message> {
    match messages.first_mut() {
        Some(first) if first.role == Role::System => {
            first.content.push_str("\n\n");
            first.content.push_str(addendum);
        }
        _ => messages.insert(0, Message::system(addendum)),
    }
    messages
}

const ANALYST_SYSTEM_PROMPT: &str = "You are a professional data analysis assistant. \
Based on the provided function call results, write a clear and useful natural-language answer.";

/// Prompt asking the summarizing model to explain tool results.
pub fn analysis_prompt(results: &[ToolCallResult]) -> String {
    let mut prompt = String::from(
        "Using the function call results below, write a clear and useful answer for the user. Please:\n\n\
         1. Summarize the main findings\n\
         2. Offer valuable insights\n\
         3. Highlight the key information for query results\n\
         4. Keep the tone friendly and professional\n\
         5. Do not repeat the raw data; analyze and explain it instead\n\n\
         Function call results:\n\n",
    );

    for (i, record) in results.iter().enumerate() {
        prompt.push_str(&format!("## Call {}: {}\n", i + 1, record.function_name));
        prompt.push_str(&format!(
            "Parameters: {}\n",
            serde_json::Value::Object(record.parameters.clone())
        ));
        prompt.push_str(&format!("Result: {}\n\n", record.result));
    }

    prompt.push_str("\nWrite a professional, helpful answer based on the results above.\n");
    prompt
}

pub fn analysis_messages(results: &[ToolCallResult]) -> Vec<Message> {
    vec![
        Message::system(ANALYST_SYSTEM_PROMPT),
        Message::user(analysis_prompt(results)),
    ]
}
