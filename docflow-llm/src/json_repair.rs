//! ABOUTME: Robust JSON parser (§4.7): four escalating repair strategies over raw LLM text

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

const VALID_SHORT_ESCAPES: &[char] = &['"', '\\', '/', 'b', 'f', 'n', 'r', 't'];

/// Attempts to parse a JSON object or array out of raw LLM response text,
/// escalating through four strategies until one succeeds. Never panics and
/// never propagates a parse error — total failure yields `None`.
#[must_use]
pub fn parse_llm_json(response: &str) -> Option<Value> {
    let span = extract_outermost_span(response).unwrap_or_else(|| response.to_string());

    if let Ok(value) = serde_json::from_str::<Value>(&span) {
        return Some(value);
    }

    let repaired = repair_json(&span);
    if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
        return Some(value);
    }

    regex_extract_partial(response)
}

/// Strategy 1: locate the outermost `{...}` or `[...]` span by tracking the
/// first opening bracket and its matching close, ignoring brackets that
/// occur inside string literals.
fn extract_outermost_span(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.iter().position(|c| *c == '{' || *c == '[')?;
    let opening = chars[start];
    let closing = if opening == '{' { '}' } else { ']' };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == opening => depth += 1,
            c if c == closing => {
                depth -= 1;
                if depth == 0 {
                    return Some(chars[start..=i].iter().collect());
                }
            }
            _ => {}
        }
    }
    None
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").unwrap())
}

fn python_literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(True|False|None)\b").unwrap())
}

fn fenced_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:json)?").unwrap())
}

fn missing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"("(?:[^"\\]|\\.)*")\s*\n\s*("(?:[^"\\]|\\.)*"\s*:)"#).unwrap())
}

/// Strategy 3: a sequence of textual repairs targeting the common ways LLMs
/// produce near-JSON, applied in order, then parsed once more.
fn repair_json(span: &str) -> String {
    let mut text = fenced_code_re().replace_all(span, "").to_string();

    text = python_literal_re()
        .replace_all(&text, |caps: &regex::Captures| match &caps[1] {
            "True" => "true",
            "False" => "false",
            _ => "null",
        })
        .to_string();

    text = maybe_single_to_double_quoted(&text);
    text = remove_control_characters(&text);
    text = fix_invalid_escapes(&text);
    text = missing_comma_re().replace_all(&text, "$1,\n$2").to_string();
    text = trailing_comma_re().replace_all(&text, "$1").to_string();

    text
}

/// If the text contains no double quotes at all but does contain single
/// quotes, treat the single quotes as the intended string delimiters.
fn maybe_single_to_double_quoted(text: &str) -> String {
    if text.contains('"') || !text.contains('\'') {
        return text.to_string();
    }
    text.replace('\'', "\"")
}

fn remove_control_characters(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Keeps only the standard JSON escape set; any other `\X` has its
/// backslash doubled so the parser sees a literal backslash followed by
/// `X` rather than an invalid escape.
fn fix_invalid_escapes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            let next = chars[i + 1];
            if VALID_SHORT_ESCAPES.contains(&next) {
                result.push(c);
                result.push(next);
                i += 2;
                continue;
            }
            if next == 'u' && i + 5 < chars.len() && chars[i + 2..i + 6].iter().all(|c| c.is_ascii_hexdigit())
            {
                result.push(c);
                result.push(next);
                for &hex in &chars[i + 2..i + 6] {
                    result.push(hex);
                }
                i += 6;
                continue;
            }
            result.push('\\');
            result.push('\\');
            result.push(next);
            i += 2;
            continue;
        }
        result.push(c);
        i += 1;
    }
    result
}

/// Strategy 4: last resort when the text cannot be coerced into valid JSON
/// at all. Regex-extracts the known top-level keys used by the pipeline's
/// prompt templates and synthesizes a partial object. Returns `None` if
/// none of the known keys are found.
fn regex_extract_partial(text: &str) -> Option<Value> {
    static SCORE_RE: OnceLock<Regex> = OnceLock::new();
    static PASSED_RE: OnceLock<Regex> = OnceLock::new();
    static ISSUES_RE: OnceLock<Regex> = OnceLock::new();
    static RECOMMENDATION_RE: OnceLock<Regex> = OnceLock::new();

    let score_re = SCORE_RE.get_or_init(|| Regex::new(r#""score"\s*:\s*(\d+)"#).unwrap());
    let passed_re =
        PASSED_RE.get_or_init(|| Regex::new(r#""passed"\s*:\s*(true|false)"#).unwrap());
    let issues_re =
        ISSUES_RE.get_or_init(|| Regex::new(r#""issues"\s*:\s*\[(?s)(.*?)\]"#).unwrap());
    let recommendation_re = RECOMMENDATION_RE
        .get_or_init(|| Regex::new(r#""recommendation"\s*:\s*"((?:[^"\\]|\\.)*)"#).unwrap());

    let mut map = Map::new();

    if let Some(caps) = score_re.captures(text) {
        if let Ok(score) = caps[1].parse::<u64>() {
            map.insert("score".to_string(), Value::from(score));
        }
    }
    if let Some(caps) = passed_re.captures(text) {
        map.insert("passed".to_string(), Value::from(&caps[1] == "true"));
    }
    if let Some(caps) = issues_re.captures(text) {
        let items: Vec<Value> = Regex::new(r#""((?:[^"\\]|\\.)*)""#)
            .unwrap()
            .captures_iter(&caps[1])
            .map(|c| Value::from(c[1].to_string()))
            .collect();
        map.insert("issues".to_string(), Value::Array(items));
    }
    if let Some(caps) = recommendation_re.captures(text) {
        map.insert("recommendation".to_string(), Value::from(caps[1].to_string()));
    }

    if map.is_empty() {
        None
    } else {
        Some(Value::Object(map))
    }
}
