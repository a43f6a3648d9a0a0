//! Deterministic, DNS-safe names for managed objects.

use regex::Regex;
use std::sync::LazyLock;

/// Longest name a DNS label, and thus most Kubernetes objects, may carry.
pub const DNS_LABEL_MAX: usize = 63;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%\((?P<key>[A-Za-z_][A-Za-z0-9_]*)\)s").expect("placeholder pattern must compile")
});

/// Renders a `%(key)s` template.
///
/// Returns `None` when the template refers to a key not in `values`.
pub fn format_template(template: &str, values: &[(&str, &str)]) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let placeholder = caps.get(0)?;
        let key = caps.name("key")?.as_str();
        let (_, value) = values.iter().find(|(k, _)| *k == key)?;
        out.push_str(&template[last..placeholder.start()]);
        out.push_str(value);
        last = placeholder.end();
    }
    out.push_str(&template[last..]);
    Some(out)
}

/// Lower-cases `value` and reduces it to ASCII letters, digits and single
/// hyphens.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// The name every object managed for an outpost is created with.
///
/// Falls back to `outpost-<uuid>` when the template is empty, invalid, or
/// renders a name too long for a DNS label. It also falls back when the
/// template uses a name with no ASCII letters or digits, which would
/// otherwise collide with every other such outpost.
pub fn object_name(template: &str, name: &str, uuid_hex: &str) -> String {
    let fallback = || format!("outpost-{uuid_hex}");
    if template.trim().is_empty() {
        return fallback();
    }

    let slug = slugify(name);
    if slug.is_empty() && template.contains("%(name)s") {
        return fallback();
    }
    let Some(rendered) = format_template(template, &[("name", &slug), ("uuid", uuid_hex)]) else {
        tracing::warn!(%template, "Invalid object naming template");
        return fallback();
    };

    let label = slugify(&rendered);
    if label.is_empty() || label.len() > DNS_LABEL_MAX {
        return fallback();
    }
    label
}

/// Truncates a slug so it is usable as a label value.
pub fn label_value(value: &str) -> String {
    let slug = slugify(value);
    match slug.get(..DNS_LABEL_MAX) {
        Some(truncated) => truncated.trim_end_matches('-').to_string(),
        None => slug,
    }
}
