//! Ordered glob filters for label and annotation keys.
//!
//! A filter is a list of glob patterns evaluated left to right. A pattern
//! with a leading `!` excludes the keys it matches. For each key the last
//! matching pattern decides; a key no pattern matches is dropped. An empty
//! filter keeps every key.
//!
//! Globs support `*` (any run of characters, including `/`) and `?` (one
//! character). Everything else matches literally.

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    pattern: String,
    exclude: bool,
}

/// Compiled ordered filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFilter {
    rules: Vec<Rule>,
}

impl KeyFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let rules = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                match p.strip_prefix('!') {
                    Some(rest) => Rule { pattern: rest.to_string(), exclude: true },
                    None => Rule { pattern: p.to_string(), exclude: false },
                }
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Verdict of the last matching rule, `None` when no rule matches
    fn verdict(&self, key: &str) -> Option<bool> {
        self.rules
            .iter()
            .rev()
            .find(|rule| glob_match(&rule.pattern, key))
            .map(|rule| !rule.exclude)
    }

    /// Whether `key` survives this filter
    pub fn keeps(&self, key: &str) -> bool {
        self.is_empty() || self.verdict(key).unwrap_or(false)
    }

    /// Whether the filter positively selects `key`. Unlike `keeps`, an empty
    /// filter selects nothing.
    pub fn selects(&self, key: &str) -> bool {
        self.verdict(key).unwrap_or(false)
    }
}

/// Matches `text` against a glob supporting `*` and `?`
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last `*` and the text index it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('?') => {
                p += 1;
                t += 1;
            }
            Some(c) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kept<'a>(filter: &KeyFilter, keys: &[&'a str]) -> Vec<&'a str> {
        keys.iter().copied().filter(|key| filter.keeps(key)).collect()
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", ""));
        assert!(glob_match("*", "kubevirt.io/vm"));
        assert!(glob_match("key1", "key1"));
        assert!(!glob_match("key1", "key10"));
        assert!(glob_match("key?", "key2"));
        assert!(!glob_match("key?", "key"));
        assert!(glob_match("kubevirt.io/*", "kubevirt.io/created-by"));
        assert!(glob_match("*.io/*-by", "kubevirt.io/created-by"));
        assert!(!glob_match("*.io/*-by", "kubevirt.io/created-at"));
        assert!(glob_match("a*b*c", "aXXbYYbc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let filter = KeyFilter::new::<&str>(&[]);
        assert_eq!(kept(&filter, &["key1", "key2"]), vec!["key1", "key2"]);
        assert!(!filter.selects("key1"));
    }

    #[test]
    fn test_wildcard_with_exclusion() {
        let filter = KeyFilter::new(&["*", "!key2"]);
        assert_eq!(kept(&filter, &["key1", "key2"]), vec!["key1"]);
    }

    #[test]
    fn test_literal_include_only() {
        let filter = KeyFilter::new(&["key1"]);
        assert_eq!(kept(&filter, &["key1", "key2"]), vec!["key1"]);
    }

    #[test]
    fn test_last_match_wins() {
        let filter = KeyFilter::new(&["!key*", "key1"]);
        assert!(filter.keeps("key1"));
        assert!(!filter.keeps("key2"));

        let filter = KeyFilter::new(&["key1", "!key*"]);
        assert!(!filter.keeps("key1"));
    }

    #[test]
    fn test_only_exclusions_drop_everything() {
        let filter = KeyFilter::new(&["!key2"]);
        assert!(kept(&filter, &["key1", "key2"]).is_empty());
    }
}
