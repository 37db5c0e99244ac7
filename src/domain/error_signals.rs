// Error-line detection for debug logs.
// A line signals an error when its event type contains an error-like token.

const ERROR_TOKENS: [&str; 7] = ["EXCEPTION", "ERROR", "FATAL", "FAIL", "FAILED", "FAILURE", "FAULT"];

/// Uppercase alphabetic runs of an event type (`fatal.error` -> `FATAL`, `ERROR`).
pub fn tokenize_event_type(event_type: &str) -> Vec<String> {
    event_type
        .to_uppercase()
        .split(|c: char| !c.is_ascii_uppercase())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn is_error_event_type(event_type: &str) -> bool {
    tokenize_event_type(event_type)
        .iter()
        .any(|t| ERROR_TOKENS.contains(&t.as_str()))
}

/// The event type is the second pipe-delimited field.
pub fn extract_event_type(line: &str) -> Option<&str> {
    let event = line.split('|').nth(1)?.trim();
    (!event.is_empty()).then_some(event)
}

pub fn line_has_error_signal(line: &str) -> bool {
    extract_event_type(line).is_some_and(is_error_event_type)
}
