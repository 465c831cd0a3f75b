//! Compile-once regex store.
//!
//! One cache per engine instance; patterns are bounded by the rule-set size
//! so there is no eviction. Compile failures are returned to the caller,
//! which must treat them as "condition does not match"; a bad pattern never
//! aborts evaluation.

use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct RegexCache {
    compiled: DashMap<String, Arc<Regex>>,
}

impl RegexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached compile for `pattern`, compiling and inserting it
    /// on first use.
    pub fn get(&self, pattern: &str) -> Result<Arc<Regex>, regex::Error> {
        if let Some(re) = self.compiled.get(pattern) {
            return Ok(re.clone());
        }
        let re = Arc::new(Regex::new(pattern)?);
        self.compiled.insert(pattern.to_string(), re.clone());
        Ok(re)
    }

    /// True when `text` matches `pattern`; false on compile failure.
    pub fn is_match(&self, text: &str, pattern: &str) -> bool {
        match self.get(pattern) {
            Ok(re) => re.is_match(text),
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_compiled_patterns() {
        let cache = RegexCache::new();
        assert!(cache.is_match("https://api.example.com", r"^https://api\."));
        assert_eq!(cache.len(), 1);
        assert!(cache.is_match("https://api.other.com", r"^https://api\."));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn compile_failure_fails_closed() {
        let cache = RegexCache::new();
        assert!(!cache.is_match("anything", "(unclosed"));
        assert!(cache.get("(unclosed").is_err());
        assert!(cache.is_empty());
    }
}
