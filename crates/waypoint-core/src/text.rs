//! Small string helpers shared by telemetry synthesis and rule indexing.

/// Truncate to at most `max` characters (not bytes), never splitting a
/// code point.
#[must_use]
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Normalize a URL or path to the form rules compare against.
///
/// Scheme and host are stripped, as are query and fragment. A trailing slash
/// is removed except for the root, a missing leading slash is added, and an
/// empty result becomes `/`.
#[must_use]
pub fn normalize_path(input: &str) -> String {
    let trimmed = input.trim();
    let without_origin = match trimmed.find("://") {
        Some(scheme_end) => {
            let rest = &trimmed[scheme_end + 3..];
            rest.find('/').map_or("", |slash| &rest[slash..])
        }
        None => trimmed,
    };
    let end = without_origin
        .find(['?', '#'])
        .unwrap_or(without_origin.len());
    let path = without_origin[..end].trim_end_matches('/');

    if path.is_empty() {
        "/".to_owned()
    } else if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}

/// `cart-count_badge` → `cartCountBadge`. Non-alphanumeric characters are
/// separators; the first segment stays lower-case.
#[must_use]
pub fn camel_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut upper_next = false;
    for c in input.chars() {
        if !c.is_alphanumeric() {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else if out.is_empty() {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Collapse runs of whitespace to single spaces and trim the ends.
#[must_use]
pub fn squash_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
