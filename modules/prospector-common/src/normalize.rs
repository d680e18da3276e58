//! Identity normalization for domains and organization names.

/// Corporate suffixes dropped from names before comparison.
const LEGAL_SUFFIXES: &[&str] = &[
    "inc", "incorporated", "llc", "ltd", "limited", "corp", "corporation", "co", "company", "pbc",
    "gmbh",
];

/// Normalize a URL or bare host to its registrable form: lowercase, scheme,
/// `www.`, port, path and trailing dot stripped. Returns `None` for input that
/// has no usable host.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let parsed = url::Url::parse(&with_scheme).ok()?;
    let host = parsed.host_str()?.trim_end_matches('.').to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    if host.is_empty() || !host.contains('.') {
        return None;
    }
    Some(host.to_string())
}

/// Normalize an organization name for identity comparison.
///
/// Dots are removed outright so that "A.I." and "AI" agree, other punctuation
/// becomes whitespace, whitespace is collapsed, and trailing legal suffixes
/// ("Inc", "LLC", ...) are dropped.
pub fn normalize_name(raw: &str) -> String {
    let lowered: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| *c != '.')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut words: Vec<&str> = lowered.split_whitespace().collect();
    while words.len() > 1 && words.last().is_some_and(|w| LEGAL_SUFFIXES.contains(w)) {
        words.pop();
    }
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_strips_scheme_www_and_path() {
        assert_eq!(normalize_domain("https://www.Acme.ai/about"), Some("acme.ai".into()));
        assert_eq!(normalize_domain("acme.ai"), Some("acme.ai".into()));
        assert_eq!(normalize_domain("http://acme.ai:8080/x?y=1"), Some("acme.ai".into()));
        assert_eq!(normalize_domain("WWW.ACME.AI."), Some("acme.ai".into()));
    }

    #[test]
    fn domain_rejects_hostless_input() {
        assert_eq!(normalize_domain(""), None);
        assert_eq!(normalize_domain("   "), None);
        assert_eq!(normalize_domain("localhost"), None);
        assert_eq!(normalize_domain("not a url at all"), None);
    }

    #[test]
    fn name_variants_collapse() {
        assert_eq!(normalize_name("Acme AI"), "acme ai");
        assert_eq!(normalize_name("Acme A.I."), "acme ai");
        assert_eq!(normalize_name("  Acme   AI, Inc. "), "acme ai");
        assert_eq!(normalize_name("Acme-AI LLC"), "acme ai");
    }

    #[test]
    fn lone_suffix_word_is_kept() {
        assert_eq!(normalize_name("Co"), "co");
    }
}
