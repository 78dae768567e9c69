//! Planner output arrives as JSON embedded in prose, and selectors/URLs in it
//! commonly pick up HTML entities along the way. Normalization is applied
//! unconditionally to every selector and URL before use, never as a fallback
//! after a failed match.

/// Decode the five standard HTML entities and numeric character references.
pub fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match decode_one(tail) {
            Some((decoded, consumed)) => {
                out.push(decoded);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode a single entity at the start of `s` (which begins with `&`),
/// returning the character and the number of bytes consumed.
fn decode_one(s: &str) -> Option<(char, usize)> {
    let semi = s.find(';')?;
    let body = &s[1..semi];
    let decoded = match body {
        "nbsp" => ' ',
        "amp" => '&',
        "quot" => '"',
        "lt" => '<',
        "gt" => '>',
        _ => {
            let digits = body.strip_prefix('#')?;
            let code: u32 = digits.parse().ok()?;
            char::from_u32(code)?
        }
    };
    Some((decoded, semi + 1))
}

/// Normalize a planner-supplied selector: decode entities, then rewrite
/// `href=` equality matches to `href^=` prefix matches. Planners frequently
/// supply truncated or slightly-stale hrefs, and an exact match would
/// spuriously fail.
pub fn normalize_selector(raw: &str) -> String {
    decode_entities(raw).replace("href=", "href^=")
}

/// Normalize a planner-supplied URL. Only entity decoding applies; the
/// prefix-match rewrite is meaningful inside attribute selectors only.
pub fn normalize_url(raw: &str) -> String {
    decode_entities(raw)
}
