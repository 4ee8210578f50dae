use regex::RegexSet;

use super::error::CoreError;

/// A compiled set of entry-name patterns (`ignore` / `exclude`).
///
/// Every pattern is a regular expression tested against the bare entry name.
/// An empty set never matches and skips the matching pass entirely.
#[derive(Debug, Clone, Default)]
pub struct NamePatterns {
    set: Option<RegexSet>,
}

impl NamePatterns {
    /// Returns `true` when at least one pattern matches `name`.
    pub fn is_match(&self, name: &str) -> bool {
        match &self.set {
            Some(set) => set.is_match(name),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_none()
    }

    pub fn len(&self) -> usize {
        self.set.as_ref().map_or(0, RegexSet::len)
    }
}

/// Builds a `NamePatterns` from any number of pattern lists.
/// This is the centralized logic for name matching: all patterns are compiled
/// once, in-process, before any directory is read.
pub fn build_name_patterns<'a, I>(patterns: I) -> Result<NamePatterns, CoreError>
where
    I: IntoIterator<Item = &'a String>,
{
    let cleaned: Vec<&str> = patterns
        .into_iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();

    if cleaned.is_empty() {
        return Ok(NamePatterns::default());
    }

    let set = RegexSet::new(&cleaned)?;
    tracing::debug!("Compiled {} name patterns", set.len());

    Ok(NamePatterns { set: Some(set) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> NamePatterns {
        let owned: Vec<String> = list.iter().map(|s| s.to_string()).collect();
        build_name_patterns(&owned).unwrap()
    }

    #[test]
    fn test_empty_patterns_never_match() {
        let set = patterns(&[]);
        assert!(set.is_empty());
        assert!(!set.is_match("anything.js"));
    }

    #[test]
    fn test_blank_patterns_are_dropped() {
        let set = patterns(&["  ", ""]);
        assert!(set.is_empty());
    }

    #[test]
    fn test_regex_patterns_match_names() {
        let set = patterns(&[r"\.spec\.js$", "^dist"]);
        assert_eq!(set.len(), 2);
        assert!(set.is_match("util.spec.js"));
        assert!(set.is_match("dist.js"));
        assert!(!set.is_match("util.js"));
        assert!(!set.is_match("my-dist.js"));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let owned = vec!["(unclosed".to_string()];
        assert!(matches!(
            build_name_patterns(&owned),
            Err(CoreError::Pattern(_))
        ));
    }
}
