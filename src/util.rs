use chrono::Local;

/// Strips markdown code fences from a reasoning response. Models routinely
/// wrap JSON in ```json ... ``` despite being told not to.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) if rest[..idx].chars().all(|c| c.is_ascii_alphanumeric()) => &rest[idx + 1..],
        _ => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Local-time slug used in draft archive filenames.
pub fn timestamp_slug() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences_plain_text_untouched() {
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fences_json_fence() {
        let fenced = "```json\n{\"headline\": \"x\"}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"headline\": \"x\"}");
    }

    #[test]
    fn test_strip_code_fences_bare_fence() {
        let fenced = "```\n[1, 2]\n```";
        assert_eq!(strip_code_fences(fenced), "[1, 2]");
    }

    #[test]
    fn test_strip_code_fences_unterminated() {
        let fenced = "```json\n{\"a\": 1}";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
    }
}
