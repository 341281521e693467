//! `{Name}` token substitution for mapping templates.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::warn;

/// Upper bound on substitution passes; self-referencing tokens stop here.
pub const MAX_TOKEN_PASSES: usize = 10;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("token pattern is a valid regex"));

/// Replaces `{Name}` tokens with values from a property bag.
///
/// Substitution repeats so values may themselves contain tokens, and stops at
/// the first pass that changes nothing. Unknown tokens are left in place.
#[derive(Debug, Clone, Default)]
pub struct TokenParser {
    properties: BTreeMap<String, String>,
}

impl TokenParser {
    pub fn new(properties: BTreeMap<String, String>) -> Self {
        Self { properties }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn replace_tokens(&self, input: &str) -> String {
        let mut current = input.to_string();
        for _ in 0..MAX_TOKEN_PASSES {
            let next = TOKEN
                .replace_all(&current, |caps: &Captures<'_>| {
                    self.properties
                        .get(&caps[1])
                        .cloned()
                        .unwrap_or_else(|| caps[0].to_string())
                })
                .into_owned();
            if next == current {
                return current;
            }
            current = next;
        }
        warn!(
            passes = MAX_TOKEN_PASSES,
            "[TOKENS] Token substitution did not settle, returning last pass"
        );
        current
    }
}
