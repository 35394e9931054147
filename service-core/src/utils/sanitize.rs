//! Markup stripping for user-editable free text.
//!
//! Anything that looks like an HTML/XML tag is removed. The bodies of
//! `script` and `style` elements are dropped along with their tags. A `<` that
//! does not open a tag (`a < b`) is kept as text.

/// Elements whose content is never displayable text.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

/// Strip markup from `input` and trim surrounding whitespace.
pub fn strip_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];

        if !opens_tag(candidate) {
            out.push('<');
            rest = &candidate[1..];
            continue;
        }

        let Some(end) = candidate.find('>') else {
            // Unterminated tag swallows the remainder.
            rest = "";
            break;
        };

        let tag = &candidate[1..end];
        rest = &candidate[end + 1..];

        let name = tag_name(tag);
        if !tag.starts_with('/') && RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            rest = skip_past_closing(rest, &name);
        }
    }

    out.push_str(rest);
    out.trim().to_string()
}

fn opens_tag(candidate: &str) -> bool {
    matches!(
        candidate[1..].chars().next(),
        Some(c) if c.is_ascii_alphabetic() || c == '/' || c == '!' || c == '?'
    )
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn skip_past_closing<'a>(rest: &'a str, name: &str) -> &'a str {
    let closing = format!("</{}", name);
    let lowered = rest.to_ascii_lowercase();
    match lowered.find(&closing) {
        Some(pos) => match rest[pos..].find('>') {
            Some(end) => &rest[pos + end + 1..],
            None => "",
        },
        None => "",
    }
}
