//! Credential scrubbing for server diagnostics.
//!
//! The server's stderr is free-form log text and has been observed to carry
//! bearer tokens and provider API keys. Every line must pass through
//! [`redact_line`] before it reaches tracing or any other observer.

/// Replacement marker for scrubbed values.
pub const REDACTED: &str = "[REDACTED]";

/// JSON-ish field names whose string values are always scrubbed.
const SENSITIVE_FIELDS: &[&str] = &[
    "token",
    "api_key",
    "password",
    "access_token",
    "refresh_token",
];

/// Scrub one diagnostic line: `Bearer <token>` values, `sk-`-prefixed key
/// literals, and quoted values of [`SENSITIVE_FIELDS`] (case-insensitive).
pub fn redact_line(line: &str) -> String {
    let mut out = redact_bearer(line);
    out = redact_key_literals(&out);
    for field in SENSITIVE_FIELDS {
        out = redact_field(&out, field);
    }
    out
}

/// Case-insensitive substring search. The needle must be ASCII; matches in
/// multi-byte text cannot start mid-codepoint because continuation bytes
/// never compare equal to ASCII.
fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < from + n.len() {
        return None;
    }
    (from..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

fn redact_bearer(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut pos = 0;
    while let Some(i) = find_ci(line, "bearer ", pos) {
        let token_start = i + "bearer ".len();
        let token_end = line[token_start..]
            .find(|c: char| c.is_whitespace() || c == '"' || c == '\'')
            .map(|off| token_start + off)
            .unwrap_or(line.len());
        out.push_str(&line[pos..token_start]);
        if token_end > token_start {
            out.push_str(REDACTED);
        }
        pos = token_end;
    }
    out.push_str(&line[pos..]);
    out
}

/// Provider key literals: `sk-` followed by a run of at least 8 key chars,
/// not preceded by an alphanumeric (so "task-123" survives).
fn redact_key_literals(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut pos = 0;
    while let Some(i) = find_ci(line, "sk-", pos) {
        let at_boundary = line[..i]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_ascii_alphanumeric());
        let run_end = line[i..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .map(|off| i + off)
            .unwrap_or(line.len());
        if at_boundary && run_end - i >= "sk-".len() + 8 {
            out.push_str(&line[pos..i]);
            out.push_str(REDACTED);
            pos = run_end;
        } else {
            out.push_str(&line[pos..i + "sk-".len()]);
            pos = i + "sk-".len();
        }
    }
    out.push_str(&line[pos..]);
    out
}

/// Scrub `"<field>" : "<value>"` occurrences, keeping the quotes.
fn redact_field(line: &str, field: &str) -> String {
    let needle = format!("\"{field}\"");
    let mut out = String::with_capacity(line.len());
    let mut pos = 0;
    while let Some(start) = find_ci(line, &needle, pos) {
        let mut cursor = start + needle.len();
        while line[cursor..].starts_with([' ', '\t']) {
            cursor += 1;
        }
        if !line[cursor..].starts_with(':') {
            out.push_str(&line[pos..cursor]);
            pos = cursor;
            continue;
        }
        cursor += 1;
        while line[cursor..].starts_with([' ', '\t']) {
            cursor += 1;
        }
        if !line[cursor..].starts_with('"') {
            out.push_str(&line[pos..cursor]);
            pos = cursor;
            continue;
        }
        let value_start = cursor + 1;
        out.push_str(&line[pos..value_start]);
        out.push_str(REDACTED);
        match string_end(&line[value_start..]) {
            Some(off) => pos = value_start + off,
            None => {
                // Unterminated string: everything to end-of-line is value.
                return out;
            }
        }
    }
    out.push_str(&line[pos..]);
    out
}

/// Byte offset of the closing quote, honoring backslash escapes.
fn string_end(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => return Some(i),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_is_scrubbed() {
        let out = redact_line("Authorization: Bearer abc123");
        assert!(out.contains(REDACTED));
        assert!(!out.contains("abc123"));
    }

    #[test]
    fn bearer_is_case_insensitive() {
        let out = redact_line("auth=bearer SeCrEtToKeN rest");
        assert!(!out.contains("SeCrEtToKeN"));
        assert!(out.ends_with(" rest"));
    }

    #[test]
    fn api_key_field_is_scrubbed() {
        let out = redact_line(r#"request failed: {"api_key": "sk-xyz"}"#);
        assert!(out.contains(REDACTED));
        assert!(!out.contains("sk-xyz"));
    }

    #[test]
    fn field_names_match_case_insensitively() {
        let out = redact_line(r#"{"Access_Token":"deadbeef"}"#);
        assert!(!out.contains("deadbeef"));
        assert!(out.contains("Access_Token"));
    }

    #[test]
    fn all_sensitive_fields_are_covered() {
        for field in super::SENSITIVE_FIELDS {
            let line = format!(r#"{{"{field}": "hunter2"}}"#);
            let out = redact_line(&line);
            assert!(!out.contains("hunter2"), "leaked value of {field}");
        }
    }

    #[test]
    fn provider_key_literal_is_scrubbed() {
        let out = redact_line("using key sk-ant-api03-aAbBcC112233 for request");
        assert!(!out.contains("sk-ant-api03-aAbBcC112233"));
        assert!(out.contains(REDACTED));
        assert!(out.ends_with(" for request"));
    }

    #[test]
    fn short_sk_prefix_survives() {
        // Too short to be a key; "task-..." has sk- mid-word.
        assert_eq!(redact_line("sk-dev task-sk-123"), "sk-dev task-sk-123");
    }

    #[test]
    fn escaped_quotes_inside_value_stay_inside() {
        let out = redact_line(r#"{"password": "p\"w", "next": "keep"}"#);
        assert!(!out.contains(r#"p\"w"#));
        assert!(out.contains(r#""next": "keep""#));
    }

    #[test]
    fn unterminated_value_is_scrubbed_to_eol() {
        let out = redact_line(r#"oops "token": "half-a-secret"#);
        assert!(!out.contains("half-a-secret"));
        assert!(out.contains(REDACTED));
    }

    #[test]
    fn plain_lines_pass_through_unchanged() {
        let line = "listening on stdin, 7 tools registered";
        assert_eq!(redact_line(line), line);
    }

    #[test]
    fn token_field_does_not_match_access_token_twice() {
        // "token" only matches as a whole quoted field name.
        let out = redact_line(r#"{"access_token": "aaa", "tokens": 5}"#);
        assert!(!out.contains("aaa"));
        assert!(out.contains(r#""tokens": 5"#));
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let out = redact_line("日本語 Bearer ひみつ and more 日本語");
        assert!(!out.contains("ひみつ"));
    }
}
