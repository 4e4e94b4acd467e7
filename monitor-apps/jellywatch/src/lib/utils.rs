//! Small shared helpers: the shutdown broadcast message and backend naming.

/// Message broadcast to all subsystem tasks when the daemon is going down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMessage {
    /// Stop every subsystem task.
    ShutdownAll,
}

/// Normalizes a backend display name into the identifier used in entity ids,
/// URL paths and log fields.
///
/// Lowercases ASCII alphanumerics, maps spaces, hyphens and underscores to a
/// single `_`, and drops everything else. Separator runs are collapsed and
/// never appear at either end, so `"Living Room - Jellyfin"` becomes
/// `"living_room_jellyfin"`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if matches!(c, ' ' | '-' | '_') && !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_joins_words() {
        assert_eq!(slugify("Living Room"), "living_room");
        assert_eq!(slugify("Jellyfin"), "jellyfin");
    }

    #[test]
    fn slugify_collapses_separator_runs() {
        assert_eq!(slugify("Den -- Main"), "den_main");
        assert_eq!(slugify("a__b  c"), "a_b_c");
    }

    #[test]
    fn slugify_drops_other_punctuation() {
        assert_eq!(slugify("Anna's Server (4K)!"), "annas_server_4k");
    }

    #[test]
    fn slugify_trims_separators_at_both_ends() {
        assert_eq!(slugify("  Edge  "), "edge");
        assert_eq!(slugify("-leading-and-trailing-"), "leading_and_trailing");
    }

    #[test]
    fn slugify_of_empty_or_symbol_only_names_is_empty() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
    }
}
