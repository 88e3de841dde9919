//! Fenced code block extraction from free-form AI replies.

const FENCE: &str = "```";

/// Returns the trimmed body of the first fenced block in `text`.
///
/// The opening fence may carry a language tag (`js`, `c++`, `objective-c`, ...)
/// which is skipped together with the newline after it. A block with no
/// closing fence, or with nothing but whitespace inside, yields `None`.
pub fn extract_code_block(text: &str) -> Option<String> {
    let open = text.find(FENCE)?;
    let after_open = &text[open + FENCE.len()..];
    let body_start = skip_info_string(after_open);
    let body = &after_open[body_start..];

    let close = body.find(FENCE)?;
    let code = body[..close].trim();

    if code.is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}

/// Byte offset just past `tag\n` when the fence opens with a language tag
/// (or with a bare newline); 0 when the code starts right after the fence.
fn skip_info_string(after_open: &str) -> usize {
    let Some(newline) = after_open.find('\n') else {
        return 0;
    };

    let tag = after_open[..newline].trim();
    if tag.chars().all(is_tag_char) {
        newline + 1
    } else {
        0
    }
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '#' | '.' | '-')
}
