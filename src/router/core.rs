//! Path resolver core - runs on every cache miss.

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

/// Marker that turns a registered path into an explicit prefix pattern
pub const WILDCARD: char = '*';

/// Stateless matcher between registered paths and request paths
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl PathResolver {
    /// True if `registered` ends with the wildcard marker
    #[inline]
    #[must_use]
    pub fn is_wildcard(registered: &str) -> bool {
        registered.ends_with(WILDCARD)
    }

    /// The prefix a registration matches against
    ///
    /// Strips one trailing wildcard marker; bare paths are their own prefix.
    #[inline]
    #[must_use]
    pub fn effective_prefix(registered: &str) -> &str {
        registered.strip_suffix(WILDCARD).unwrap_or(registered)
    }

    /// Length of the matched prefix, or `None` if `registered` does not match
    #[inline]
    #[must_use]
    pub fn match_len(registered: &str, request_path: &str) -> Option<usize> {
        let prefix = Self::effective_prefix(registered);
        if request_path.len() >= prefix.len() && request_path.starts_with(prefix) {
            Some(prefix.len())
        } else {
            None
        }
    }

    /// True if `registered` serves `request_path` as an exact or prefix match
    #[inline]
    #[must_use]
    pub fn matches(registered: &str, request_path: &str) -> bool {
        Self::match_len(registered, request_path).is_some()
    }

    /// Scan every entry and keep the one with the longest matched prefix
    ///
    /// Ties go to the lexicographically smallest registered path. The scan is
    /// O(entries); callers cache singleton results to amortize it.
    pub fn find_longest_match<K, V, I>(entries: I, request_path: &str) -> Option<(K, V)>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut best: Option<(usize, K, V)> = None;
        for (key, value) in entries {
            let Some(len) = Self::match_len(key.as_ref(), request_path) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some((best_len, best_key, _)) => {
                    len > *best_len || (len == *best_len && key.as_ref() < best_key.as_ref())
                }
            };
            if better {
                best = Some((len, key, value));
            }
        }
        best.map(|(_, key, value)| (key, value))
    }
}
