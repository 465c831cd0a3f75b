//! Rule engine: stage-filtered evaluation with aggregate semantics.
//!
//! Every enabled rule of the event's stage is evaluated; all matches are
//! returned sorted by priority (descending, configuration order on ties).
//! Reads run concurrently under a read lock; [`RuleEngine::update`] swaps
//! the rule set exclusively.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use intercept_common::{Condition, Config, EngineStats, Match, Rule, RuleId, Stage};

use crate::context::EvalContext;
use crate::regex_cache::RegexCache;

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    matched: u64,
    by_rule: HashMap<RuleId, u64>,
}

/// Compiled rule set plus hit counters.
#[derive(Debug)]
pub struct RuleEngine {
    rules: RwLock<Arc<Vec<Arc<Rule>>>>,
    cache: RegexCache,
    counters: Mutex<Counters>,
}

impl RuleEngine {
    /// Create an engine from a configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            rules: RwLock::new(Arc::new(
                config.rules.iter().cloned().map(Arc::new).collect(),
            )),
            cache: RegexCache::new(),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Create an engine with no rules; everything passes through unmatched.
    pub fn empty() -> Self {
        Self {
            rules: RwLock::new(Arc::new(Vec::new())),
            cache: RegexCache::new(),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Replace the active rule set. Counters are preserved.
    pub fn update(&self, config: &Config) {
        let rules: Arc<Vec<Arc<Rule>>> =
            Arc::new(config.rules.iter().cloned().map(Arc::new).collect());
        *self.rules.write() = rules;
        debug!(rules = config.rules.len(), "rule set updated");
    }

    /// Evaluate the context and return matching enabled rules of `stage`,
    /// highest priority first (stable on ties).
    pub fn eval_for_stage(&self, ctx: &EvalContext, stage: Stage) -> Vec<Arc<Rule>> {
        let rules = self.rules.read().clone();

        let mut matched: Vec<Arc<Rule>> = rules
            .iter()
            .filter(|rule| rule.enabled && rule.stage == stage)
            .filter(|rule| self.match_rule(ctx, &rule.matcher))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut counters = self.counters.lock();
        counters.total += 1;
        if !matched.is_empty() {
            counters.matched += 1;
            for rule in &matched {
                *counters.by_rule.entry(rule.id.clone()).or_insert(0) += 1;
            }
        }

        matched
    }

    /// Snapshot the hit counters.
    pub fn stats(&self) -> EngineStats {
        let counters = self.counters.lock();
        EngineStats {
            total: counters.total,
            matched: counters.matched,
            by_rule: counters.by_rule.clone(),
        }
    }

    fn match_rule(&self, ctx: &EvalContext, matcher: &Match) -> bool {
        let all_ok = matcher.all_of.is_empty()
            || matcher.all_of.iter().all(|c| self.eval_condition(ctx, c));
        let any_ok = matcher.any_of.is_empty()
            || matcher.any_of.iter().any(|c| self.eval_condition(ctx, c));
        all_ok && any_ok
    }

    fn eval_condition(&self, ctx: &EvalContext, condition: &Condition) -> bool {
        use Condition::*;
        match condition {
            UrlEquals { value } => ctx.url == *value,
            UrlPrefix { value } => ctx.url.starts_with(value),
            UrlSuffix { value } => ctx.url.ends_with(value),
            UrlContains { value } => ctx.url.contains(value),
            UrlRegex { pattern } => self.cache.is_match(&ctx.url, pattern),

            Method { values } => values.iter().any(|v| ctx.method.eq_ignore_ascii_case(v)),
            ResourceType { values } => values.iter().any(|v| ctx.resource_type == *v),

            HeaderExists { name } => ctx.headers.contains_key(&name.to_lowercase()),
            HeaderNotExists { name } => !ctx.headers.contains_key(&name.to_lowercase()),
            HeaderEquals { name, value } => entry_eq(&ctx.headers, name, value),
            HeaderContains { name, value } => entry_contains(&ctx.headers, name, value),
            HeaderRegex { name, pattern } => self.entry_regex(&ctx.headers, name, pattern),

            QueryExists { name } => ctx.query.contains_key(&name.to_lowercase()),
            QueryNotExists { name } => !ctx.query.contains_key(&name.to_lowercase()),
            QueryEquals { name, value } => entry_eq(&ctx.query, name, value),
            QueryContains { name, value } => entry_contains(&ctx.query, name, value),
            QueryRegex { name, pattern } => self.entry_regex(&ctx.query, name, pattern),

            CookieExists { name } => ctx.cookies.contains_key(&name.to_lowercase()),
            CookieNotExists { name } => !ctx.cookies.contains_key(&name.to_lowercase()),
            CookieEquals { name, value } => entry_eq(&ctx.cookies, name, value),
            CookieContains { name, value } => entry_contains(&ctx.cookies, name, value),
            CookieRegex { name, pattern } => self.entry_regex(&ctx.cookies, name, pattern),

            BodyContains { value } => !ctx.body.is_empty() && ctx.body.contains(value),
            BodyRegex { pattern } => !ctx.body.is_empty() && self.cache.is_match(&ctx.body, pattern),
            BodyJsonPath { path, value } => {
                !ctx.body.is_empty()
                    && crate::jsonpatch::pointer_lookup_string(&ctx.body, path)
                        .is_some_and(|leaf| leaf == *value)
            }
        }
    }

    fn entry_regex(&self, map: &HashMap<String, String>, name: &str, pattern: &str) -> bool {
        map.get(&name.to_lowercase())
            .is_some_and(|v| self.cache.is_match(v, pattern))
    }
}

fn entry_eq(map: &HashMap<String, String>, name: &str, value: &str) -> bool {
    map.get(&name.to_lowercase()).is_some_and(|v| v == value)
}

fn entry_contains(map: &HashMap<String, String>, name: &str, value: &str) -> bool {
    map.get(&name.to_lowercase())
        .is_some_and(|v| v.contains(value))
}
