//! Plain-text extraction from scraped HTML pages.

/// Drop tags, `<script>`/`<style>` bodies and common entities, leaving the
/// visible text with tag boundaries collapsed to single spaces.
pub fn visible_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open..];
        let lower_head: String = after.chars().take(8).collect::<String>().to_ascii_lowercase();

        let skip_until = if lower_head.starts_with("<script") {
            Some("</script>")
        } else if lower_head.starts_with("<style") {
            Some("</style>")
        } else {
            None
        };

        rest = match skip_until {
            Some(end_tag) => match find_ci(after, end_tag) {
                Some(pos) => &after[pos + end_tag.len()..],
                None => "",
            },
            None => match after.find('>') {
                Some(pos) => &after[pos + 1..],
                None => "",
            },
        };
        if !out.ends_with(' ') {
            out.push(' ');
        }
    }
    out.push_str(rest);

    decode_entities(&out)
}

fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&nbsp;", " ")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

/// Parse a percentage string ("1.23" or " 1.23 ") into a fraction, rounded
/// to five decimals.
pub fn percent_to_fraction(text: &str) -> Option<f64> {
    let pct: f64 = text.trim().replace(',', "").parse().ok()?;
    if !pct.is_finite() {
        return None;
    }
    Some(((pct / 100.0) * 1e5).round() / 1e5)
}
