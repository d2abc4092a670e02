//! Single-turn FM worker: prompt shape and tool-call output parsing.
//!
//! Tiny on-device models cannot hold a long agentic conversation, so each
//! turn is a fresh, fixed-shape prompt asking for exactly one tool call. The
//! model's output is rarely clean JSON; the parser degrades through three
//! formats before giving up with a structured error record.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Hard cap on the context excerpt embedded in a worker prompt.
pub const WORKER_CONTEXT_BUDGET: usize = 180;

/// Longest raw-output excerpt carried in a parse-error record.
const SNIPPET_LIMIT: usize = 200;

/// A successfully parsed tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedToolCall {
    pub name: String,
    pub arguments: Value,
}

/// Why the worker output could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailureReason {
    NoValidFormat,
    JsonParseError,
    MissingToolName,
}

/// Structured record emitted on parse failure, kept for post-hoc analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FmToolParseError {
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: ParseFailureReason,
    /// Truncated copy of the raw model output
    pub raw_snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: String,
}

impl FmToolParseError {
    fn new(reason: ParseFailureReason, raw: &str, details: Option<String>) -> Self {
        Self {
            kind: "FM_TOOL_PARSE_ERROR".to_string(),
            reason,
            raw_snippet: truncate_chars(raw, SNIPPET_LIMIT),
            details,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Fixed-shape single-action prompt for the FM worker.
#[derive(Debug, Clone)]
pub struct WorkerPrompt {
    pub tools: Vec<String>,
    pub action: String,
    pub context: String,
    pub previous_step: Option<String>,
}

impl WorkerPrompt {
    /// Render the prompt. The context excerpt is bounded so the whole prompt
    /// stays within a tiny model's window, and the prompt ends with an
    /// opening `<tool_call>` token to prime the expected output format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("Tools: ");
        out.push_str(&self.tools.join(", "));
        out.push('\n');
        out.push_str("Task: ");
        out.push_str(&self.action);
        out.push('\n');
        if !self.context.is_empty() {
            out.push_str("Context: ");
            out.push_str(&truncate_chars(&self.context, WORKER_CONTEXT_BUDGET));
            out.push('\n');
        }
        if let Some(prev) = &self.previous_step {
            out.push_str("Previous: ");
            out.push_str(&truncate_chars(prev, WORKER_CONTEXT_BUDGET));
            out.push('\n');
        }
        out.push_str("Respond with exactly one tool call.\n<tool_call>");
        out
    }
}

/// Parse a worker response into a tool call.
///
/// Attempted in order:
/// 1. `<tool_call>{...}</tool_call>` XML-wrapped JSON
/// 2. a fenced ```json block — bare call, `{"tool_call": {...}}` wrapper, or
///    a `{"response": "..."}` wrapper holding a descriptive call
/// 3. the descriptive form `Using <tool> tool with arguments: k=v, ...`
pub fn parse_tool_call(raw: &str) -> Result<ParsedToolCall, FmToolParseError> {
    if let Some(inner) = extract_between(raw, "<tool_call>", "</tool_call>") {
        return parse_call_json(inner.trim(), raw);
    }
    // The prompt pre-opens the tag, so an unclosed tag followed by JSON is common.
    if let Some(rest) = raw.split("<tool_call>").nth(1) {
        let candidate = rest.trim();
        if candidate.starts_with('{') {
            return parse_call_json(candidate, raw);
        }
    }

    if let Some(block) = extract_fenced_block(raw) {
        return parse_fenced(block.trim(), raw);
    }

    if let Some(call) = parse_descriptive(raw) {
        return Ok(call);
    }

    Err(FmToolParseError::new(
        ParseFailureReason::NoValidFormat,
        raw,
        None,
    ))
}

fn parse_call_json(candidate: &str, raw: &str) -> Result<ParsedToolCall, FmToolParseError> {
    // Trailing text after the closing brace is tolerated.
    let candidate = match balanced_json_prefix(candidate) {
        Some(prefix) => prefix,
        None => candidate,
    };
    let value: Value = serde_json::from_str(candidate).map_err(|e| {
        FmToolParseError::new(ParseFailureReason::JsonParseError, raw, Some(e.to_string()))
    })?;
    call_from_value(&value)
        .ok_or_else(|| FmToolParseError::new(ParseFailureReason::MissingToolName, raw, None))
}

fn parse_fenced(block: &str, raw: &str) -> Result<ParsedToolCall, FmToolParseError> {
    let value: Value = serde_json::from_str(block).map_err(|e| {
        FmToolParseError::new(ParseFailureReason::JsonParseError, raw, Some(e.to_string()))
    })?;

    if let Some(wrapped) = value.get("tool_call") {
        return call_from_value(wrapped)
            .ok_or_else(|| FmToolParseError::new(ParseFailureReason::MissingToolName, raw, None));
    }
    if let Some(Value::String(response)) = value.get("response") {
        if let Some(call) = parse_descriptive(response) {
            return Ok(call);
        }
        return Err(FmToolParseError::new(
            ParseFailureReason::NoValidFormat,
            raw,
            Some("response wrapper held no descriptive call".to_string()),
        ));
    }
    call_from_value(&value)
        .ok_or_else(|| FmToolParseError::new(ParseFailureReason::MissingToolName, raw, None))
}

/// Accept `name`/`tool`/`function` for the tool name and
/// `arguments`/`args`/`parameters` for the arguments object.
fn call_from_value(value: &Value) -> Option<ParsedToolCall> {
    let name = value
        .get("name")
        .or_else(|| value.get("tool"))
        .or_else(|| value.get("function"))?
        .as_str()?
        .to_string();
    let arguments = value
        .get("arguments")
        .or_else(|| value.get("args"))
        .or_else(|| value.get("parameters"))
        .cloned()
        .unwrap_or_else(|| json!({}));
    Some(ParsedToolCall { name, arguments })
}

/// `Using <tool> tool with arguments: k=v, ...`, case-insensitive.
fn parse_descriptive(raw: &str) -> Option<ParsedToolCall> {
    let lower = raw.to_ascii_lowercase();
    let start = lower.find("using ")?;
    let after = &raw[start + "using ".len()..];
    let after_lower = &lower[start + "using ".len()..];

    let tool_end = after_lower.find(" tool")?;
    let tool = after[..tool_end].trim().to_ascii_lowercase();
    if tool.is_empty() || tool.contains(' ') {
        return None;
    }

    let args_marker = after_lower.find("arguments:").or_else(|| after_lower.find("argument:"))?;
    let args_start = after_lower[args_marker..].find(':')? + args_marker + 1;
    let args_str = after[args_start..].trim();

    let arguments = split_descriptive_args(&tool, args_str);
    Some(ParsedToolCall {
        name: tool,
        arguments,
    })
}

/// Tool-aware splitting: free-text values (file contents, shell commands)
/// swallow commas, so only the known key boundaries split the string.
fn split_descriptive_args(tool: &str, args: &str) -> Value {
    match tool {
        "write_file" => split_on_keys(args, &["path", "content"]),
        "edit_file" => split_on_keys(args, &["path", "old_text", "new_text"]),
        "read_file" => split_on_keys(args, &["path"]),
        "run_command" => split_on_keys(args, &["command"]),
        _ => {
            // Generic k=v, k=v split for unknown tools.
            let mut map = Map::new();
            for part in args.split(',') {
                if let Some((k, v)) = part.split_once('=') {
                    map.insert(k.trim().to_string(), json!(v.trim()));
                }
            }
            Value::Object(map)
        }
    }
}

/// Split `args` at each `"<key>="` occurrence, in the order the keys appear.
fn split_on_keys(args: &str, keys: &[&str]) -> Value {
    let lower = args.to_ascii_lowercase();

    // Locate each key's value start.
    let mut positions: Vec<(usize, &str)> = Vec::new();
    for key in keys {
        let marker = format!("{key}=");
        if let Some(pos) = lower.find(&marker) {
            positions.push((pos, key));
        }
    }
    positions.sort_by_key(|(pos, _)| *pos);

    let mut map = Map::new();
    for (i, (pos, key)) in positions.iter().enumerate() {
        let value_start = pos + key.len() + 1;
        let value_end = positions
            .get(i + 1)
            .map(|(next_pos, _)| *next_pos)
            .unwrap_or(args.len());
        let mut value = args[value_start..value_end].trim();
        // Strip the separator that preceded the next key.
        value = value.trim_end_matches(',').trim_end();
        map.insert(key.to_string(), json!(value));
    }
    Value::Object(map)
}

fn extract_between<'a>(raw: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = raw.find(open)? + open.len();
    let end = raw[start..].find(close)? + start;
    Some(&raw[start..end])
}

fn extract_fenced_block(raw: &str) -> Option<&str> {
    let fence_start = raw.find("```")?;
    let after_fence = &raw[fence_start + 3..];
    // Skip a language tag on the fence line.
    let content_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let content = &after_fence[content_start..];
    let fence_end = content.find("```")?;
    Some(&content[..fence_end])
}

/// Longest balanced `{...}` prefix of a string that starts with `{`.
fn balanced_json_prefix(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    s.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_wrapped_json() {
        let raw = r#"<tool_call>{"name": "run_command", "arguments": {"command": "ls -la"}}</tool_call>"#;
        let call = parse_tool_call(raw).unwrap();
        assert_eq!(call.name, "run_command");
        assert_eq!(call.arguments["command"], "ls -la");
    }

    #[test]
    fn test_unclosed_xml_tag_with_json() {
        let raw = r#"<tool_call>{"name": "read_file", "arguments": {"path": "/app/x.txt"}} and then"#;
        let call = parse_tool_call(raw).unwrap();
        assert_eq!(call.name, "read_file");
    }

    #[test]
    fn test_fenced_json_bare() {
        let raw = "Sure:\n```json\n{\"name\": \"write_file\", \"arguments\": {\"path\": \"a.txt\", \"content\": \"hi\"}}\n```\n";
        let call = parse_tool_call(raw).unwrap();
        assert_eq!(call.name, "write_file");
        assert_eq!(call.arguments["path"], "a.txt");
    }

    #[test]
    fn test_fenced_json_tool_call_wrapper() {
        let raw = "```json\n{\"tool_call\": {\"tool\": \"run_command\", \"args\": {\"command\": \"pwd\"}}}\n```";
        let call = parse_tool_call(raw).unwrap();
        assert_eq!(call.name, "run_command");
        assert_eq!(call.arguments["command"], "pwd");
    }

    #[test]
    fn test_fenced_response_wrapper_with_descriptive_call() {
        let raw = "```json\n{\"response\": \"Using read_file tool with arguments: path=/app/data.csv\"}\n```";
        let call = parse_tool_call(raw).unwrap();
        assert_eq!(call.name, "read_file");
        assert_eq!(call.arguments["path"], "/app/data.csv");
    }

    #[test]
    fn test_descriptive_write_file_keeps_commas_in_content() {
        let raw = "Using write_file tool with arguments: path=hello.txt, content=Hello, world!";
        let call = parse_tool_call(raw).unwrap();
        assert_eq!(call.name, "write_file");
        assert_eq!(call.arguments["path"], "hello.txt");
        assert_eq!(call.arguments["content"], "Hello, world!");
    }

    #[test]
    fn test_descriptive_run_command_keeps_commas() {
        let raw = "Using run_command tool with arguments: command=echo a, b, c";
        let call = parse_tool_call(raw).unwrap();
        assert_eq!(call.arguments["command"], "echo a, b, c");
    }

    #[test]
    fn test_descriptive_case_insensitive() {
        let raw = "USING Read_File TOOL WITH ARGUMENTS: path=x.txt";
        let call = parse_tool_call(raw).unwrap();
        assert_eq!(call.name, "read_file");
    }

    #[test]
    fn test_descriptive_edit_file_three_keys() {
        let raw =
            "Using edit_file tool with arguments: path=main.py, old_text=def f(a, b):, new_text=def f(a, b, c):";
        let call = parse_tool_call(raw).unwrap();
        assert_eq!(call.arguments["path"], "main.py");
        assert_eq!(call.arguments["old_text"], "def f(a, b):");
        assert_eq!(call.arguments["new_text"], "def f(a, b, c):");
    }

    #[test]
    fn test_no_valid_format_yields_structured_error() {
        let long_garbage = "I cannot help with that request. ".repeat(20);
        let err = parse_tool_call(&long_garbage).unwrap_err();
        assert_eq!(err.kind, "FM_TOOL_PARSE_ERROR");
        assert_eq!(err.reason, ParseFailureReason::NoValidFormat);
        assert!(err.raw_snippet.chars().count() <= 200);
    }

    #[test]
    fn test_invalid_json_in_tag_yields_json_parse_error() {
        let raw = "<tool_call>{not json}</tool_call>";
        let err = parse_tool_call(raw).unwrap_err();
        assert_eq!(err.reason, ParseFailureReason::JsonParseError);
        assert!(err.details.is_some());
    }

    #[test]
    fn test_worker_prompt_bounded_and_primed() {
        let prompt = WorkerPrompt {
            tools: vec!["read_file".into(), "write_file".into()],
            action: "Write the regex".into(),
            context: "x".repeat(1000),
            previous_step: Some("read /app/task.md".into()),
        };
        let rendered = prompt.render();
        assert!(rendered.ends_with("<tool_call>"));
        assert!(rendered.contains("read_file, write_file"));
        // The oversized context is clamped to the worker budget.
        let context_line = rendered
            .lines()
            .find(|l| l.starts_with("Context: "))
            .unwrap();
        assert!(context_line.len() <= "Context: ".len() + WORKER_CONTEXT_BUDGET);
    }
}
