const FENCE: &str = "```";

/// Remove a surrounding ``` fence pair (and its language tag) from LLM output.
///
/// Only the first complete block is kept when the reply holds several, so the
/// result never contains a fence marker. Falls back to the trimmed input when
/// no complete pair is present.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();

    let Some(start) = trimmed.find(FENCE) else {
        return trimmed.to_string();
    };
    let body_start = start + FENCE.len();
    let Some(len) = trimmed[body_start..].find(FENCE) else {
        return trimmed.to_string();
    };

    let inner = &trimmed[body_start..body_start + len];

    // ```fol\n...\n``` -> drop the tag line
    let inner = match inner.split_once('\n') {
        Some((first, rest)) if is_language_tag(first.trim()) => rest,
        _ => inner,
    };

    inner.trim().to_string()
}

fn is_language_tag(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
}
