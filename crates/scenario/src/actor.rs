//! Actor-name matching.
//!
//! Scenario actors may be declared as templates with a trailing `*`
//! (`signer_*`). Numbered actors (`signer_1`, `signer_2`) bind to the
//! template whose name equals their key with trailing digits replaced by `*`.

/// Template name for a numbered actor key, e.g. `signer_12` → `signer_*`.
///
/// Returns `None` if the key has no trailing digits.
pub fn template_name(key: &str) -> Option<String> {
    let stem = key.trim_end_matches(|c: char| c.is_ascii_digit());
    (stem.len() < key.len()).then(|| format!("{stem}*"))
}

/// Whether an actor pattern (`*`, an exact key, or a `*`-template) covers `key`.
pub fn matches_actor(pattern: &str, key: &str) -> bool {
    if pattern == "*" || pattern == key {
        return true;
    }
    pattern.ends_with('*') && template_name(key).as_deref() == Some(pattern)
}

/// Service name of a `service:<name>` actor entry.
pub fn service_name(entry: &str) -> Option<&str> {
    entry.strip_prefix("service:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_actors_map_to_templates() {
        assert_eq!(template_name("signer_1").as_deref(), Some("signer_*"));
        assert_eq!(template_name("signer42").as_deref(), Some("signer*"));
        assert_eq!(template_name("client"), None);
    }

    #[test]
    fn pattern_matching() {
        assert!(matches_actor("*", "anyone"));
        assert!(matches_actor("client", "client"));
        assert!(matches_actor("signer_*", "signer_3"));
        assert!(!matches_actor("signer_*", "signer_x"));
        assert!(!matches_actor("client", "supplier"));
    }

    #[test]
    fn service_entries() {
        assert_eq!(service_name("service:email"), Some("email"));
        assert_eq!(service_name("client"), None);
    }
}
