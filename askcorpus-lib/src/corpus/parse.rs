use serde_json::Value;

/// Parse JSON text, retrying once with trailing commas removed.
///
/// Hand-edited corpus files often carry a `,` before a closing `]` or `}`.
/// If the strict parse fails and the relaxed one also fails, the strict
/// error is returned since its position refers to the original text.
pub fn parse_forgiving(text: &str) -> Result<Value, serde_json::Error> {
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(strict) => {
            tracing::debug!(error = %strict, "strict JSON parse failed, retrying without trailing commas");
            serde_json::from_str(&strip_trailing_commas(text)).map_err(|_| strict)
        }
    }
}

/// Remove every `,` that is followed (after optional whitespace) by `]` or `}`.
///
/// Commas inside string literals are left alone.
pub fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            out.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = text[i + 1..].trim_start().chars().next();
                if !matches!(next, Some(']' | '}')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strict_json_untouched() {
        let value = parse_forgiving(r#"{"a": [1, 2]}"#).unwrap();
        assert_eq!(value, json!({"a": [1, 2]}));
    }

    #[test]
    fn test_trailing_comma_in_array() {
        let value = parse_forgiving("[1, 2, 3,]").unwrap();
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[test]
    fn test_trailing_comma_in_object_with_whitespace() {
        let value = parse_forgiving("{\"a\": 1,\n  }").unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_nested_trailing_commas() {
        let text = r#"[{"name": "x", "tags": ["a", "b",],},]"#;
        let value = parse_forgiving(text).unwrap();
        assert_eq!(value, json!([{"name": "x", "tags": ["a", "b"]}]));
    }

    #[test]
    fn test_commas_inside_strings_preserved() {
        let text = r#"{"s": "a,]b \",}", "t": 1,}"#;
        let value = parse_forgiving(text).unwrap();
        assert_eq!(value["s"], "a,]b \",}");
    }

    #[test]
    fn test_garbage_still_fails() {
        assert!(parse_forgiving("{not json").is_err());
        assert!(parse_forgiving("[1,,]").is_err());
    }
}
