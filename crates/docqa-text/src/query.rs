//! Query normalization, synonym expansion and coarse intent detection.
//!
//! Pure string work: identical input always yields identical output.
use docqa_core::types::{Intent, ProcessedQuery};

use crate::tantivy_utils::is_stop_word;

/// Domain terms and their related terms. Order matters: expansion and
/// technical-term extraction walk the table top to bottom.
pub const TECHNICAL_TERMS: &[(&str, &[&str])] = &[
	("api", &["endpoint", "interface", "service", "rest", "graphql"]),
	("rest", &["restful", "http", "endpoint", "api"]),
	("graphql", &["gql", "query", "mutation", "subscription"]),
	("webhook", &["callback", "notification", "event"]),
	("oauth", &["authentication", "auth", "token", "authorization"]),
	("product", &["item", "goods", "inventory", "catalog"]),
	("order", &["purchase", "transaction", "sale", "checkout"]),
	("customer", &["buyer", "user", "client", "shopper"]),
	("theme", &["template", "design", "layout", "customization"]),
	("app", &["application", "extension", "integration", "plugin"]),
	("create", &["add", "insert", "post", "build", "make"]),
	("update", &["modify", "edit", "change", "put", "patch"]),
	("delete", &["remove", "destroy", "eliminate"]),
	("get", &["fetch", "retrieve", "find", "search"]),
];

/// Checked in order; the first intent with a phrase contained in the query wins.
pub const INTENT_PHRASES: &[(Intent, &[&str])] = &[
	(Intent::Api, &["api", "endpoint", "rest", "graphql", "webhook"]),
	(Intent::Technical, &["how to", "tutorial", "guide", "implement", "code"]),
	(Intent::Troubleshooting, &["error", "problem", "issue", "fix", "debug"]),
	(Intent::Beginner, &["getting started", "beginner", "new to", "first time"]),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryProcessor;

impl QueryProcessor {
	pub fn new() -> Self { Self }

	pub fn process(&self, query: &str) -> ProcessedQuery {
		let lower = query.to_lowercase();
		let keywords = keywords(&lower);
		let mut expanded = query.to_string();
		let mut technical_terms: Vec<String> = Vec::new();
		for (term, related) in TECHNICAL_TERMS {
			let has = |w: &str| keywords.iter().any(|k| k == w);
			if has(*term) {
				if let Some(first) = related.first() { expanded.push(' '); expanded.push_str(first); }
				push_unique(&mut technical_terms, term);
			}
			for &r in related.iter() { if has(r) { push_unique(&mut technical_terms, r); } }
		}
		ProcessedQuery { original: query.to_string(), expanded, keywords, intent: detect_intent(&lower), technical_terms }
	}
}

fn push_unique(out: &mut Vec<String>, term: &str) {
	if !out.iter().any(|t| t == term) { out.push(term.to_string()); }
}

/// Lowercased whitespace tokens with surrounding punctuation trimmed; short
/// tokens and stopwords are dropped.
pub fn keywords(lower: &str) -> Vec<String> {
	lower
		.split_whitespace()
		.map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
		.filter(|w| w.chars().count() > 2 && !is_stop_word(w))
		.map(str::to_string)
		.collect()
}

pub fn detect_intent(lower: &str) -> Intent {
	INTENT_PHRASES
		.iter()
		.find(|(_, phrases)| phrases.iter().any(|p| lower.contains(p)))
		.map(|(intent, _)| *intent)
		.unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_query_is_general_with_no_terms() {
		let p = QueryProcessor::new().process("");
		assert_eq!(p.intent, Intent::General);
		assert!(p.keywords.is_empty() && p.technical_terms.is_empty());
		assert_eq!(p.expanded, "");
	}

	#[test]
	fn expansion_appends_first_related_term_in_table_order() {
		let p = QueryProcessor::new().process("How do I create a webhook?");
		assert_eq!(p.keywords, vec!["create", "webhook"]);
		assert_eq!(p.expanded, "How do I create a webhook? callback add");
		assert_eq!(p.technical_terms, vec!["webhook", "create"]);
		assert_eq!(p.intent, Intent::Api);
	}

	#[test]
	fn related_terms_count_as_technical_terms() {
		let p = QueryProcessor::new().process("fetch the inventory");
		assert_eq!(p.expanded, p.original);
		assert_eq!(p.technical_terms, vec!["inventory", "fetch"]);
	}

	#[test]
	fn intent_priority_and_default() {
		assert_eq!(detect_intent("graphql error on checkout"), Intent::Api);
		assert_eq!(detect_intent("how to fix a broken theme"), Intent::Technical);
		assert_eq!(detect_intent("payment problem"), Intent::Troubleshooting);
		assert_eq!(detect_intent("first time setting up a store"), Intent::Beginner);
		assert_eq!(detect_intent("shipping zones"), Intent::General);
	}

	#[test]
	fn deterministic() {
		let qp = QueryProcessor::new();
		assert_eq!(qp.process("Update ORDER via REST api"), qp.process("Update ORDER via REST api"));
	}
}
