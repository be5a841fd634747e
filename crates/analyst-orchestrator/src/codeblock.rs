/// Extract the first fenced code block (```` ```lang\n...\n``` ````) from a
/// model reply. A reply with no fenced block is a textual answer (the
/// `generate -> summarize` transition); a reply with one is executable (the
/// `generate -> execute` transition).
pub fn extract_code_block(content: &str) -> Option<String> {
    let start = content.find("```")?;
    let after_fence = &content[start + 3..];
    // Skip an optional language tag up to the first newline.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim_end_matches('\n').to_string())
}
