//! Index-time enrichment: extra searchable terms derived from a chunk.
use regex::Regex;
use std::sync::LazyLock;

use docqa_core::types::ChunkMetadata;

macro_rules! pattern {
	($name:ident, $re:expr) => {
		static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($re).ok());
	};
}

pattern!(TECH_API, r"(?i)\b(api|rest|graphql|webhook|oauth|jwt)\b");
pattern!(TECH_VERBS, r"(?i)\b(create|update|delete|get|post|put|patch)\b");
pattern!(TECH_OBJECTS, r"(?i)\b(product|order|customer|theme|app|shop)\b");
pattern!(TECH_HTTP, r"(?i)\b(endpoint|url|request|response|header|body)\b");
pattern!(TECH_AUTH, r"(?i)\b(authentication|authorization|token|key|secret)\b");
pattern!(SHOPIFY_ANY, r"(?i)\bshopify\w*\b");
pattern!(SHOPIFY_SURFACE, r"(?i)\b(admin|storefront|pos|checkout)\b");
pattern!(SHOPIFY_ROLE, r"(?i)\b(merchant|partner|developer)\b");
pattern!(SHOPIFY_STORE, r"(?i)\b(store|shop|business)\b");

pattern!(PATH_API, r"/api/[a-zA-Z0-9/\-_]+");
pattern!(PATH_ADMIN_API, r"/admin/api/[a-zA-Z0-9/\-_]+");
pattern!(PATH_STOREFRONT_API, r"/storefront/api/[a-zA-Z0-9/\-_]+");
pattern!(CONST_API, r"\b[A-Z_]+_API\b");
pattern!(CONST_ENDPOINT, r"\b[A-Z_]+_ENDPOINT\b");
pattern!(HOST_SHOPIFY, r"\b[a-z]+\.shopify\.com\b");

static KEYWORD_PATTERNS: [&LazyLock<Option<Regex>>; 9] = [
	&TECH_API, &TECH_VERBS, &TECH_OBJECTS, &TECH_HTTP, &TECH_AUTH,
	&SHOPIFY_ANY, &SHOPIFY_SURFACE, &SHOPIFY_ROLE, &SHOPIFY_STORE,
];

static ENDPOINT_PATTERNS: [&LazyLock<Option<Regex>>; 6] = [
	&PATH_API, &PATH_ADMIN_API, &PATH_STOREFRONT_API, &CONST_API, &CONST_ENDPOINT, &HOST_SHOPIFY,
];

fn push_unique(out: &mut Vec<String>, value: String) {
	if !value.is_empty() && !out.contains(&value) { out.push(value); }
}

fn collect(patterns: &[&LazyLock<Option<Regex>>], text: &str, out: &mut Vec<String>) {
	for pattern in patterns {
		let Some(re) = pattern.as_ref() else { continue };
		for m in re.find_iter(text) { push_unique(out, m.as_str().to_lowercase()); }
	}
}

/// Lowercased metadata labels plus domain terms found in the text, deduplicated
/// in first-seen order.
pub fn extract_keywords(text: &str, metadata: &ChunkMetadata) -> Vec<String> {
	let mut keywords = Vec::new();
	for label in [&metadata.title, &metadata.section, &metadata.category] { push_unique(&mut keywords, label.to_lowercase()); }
	collect(&KEYWORD_PATTERNS, text, &mut keywords);
	keywords
}

/// API paths, `*_API` / `*_ENDPOINT` constants and shopify hostnames.
pub fn extract_api_endpoints(text: &str) -> Vec<String> {
	let mut endpoints = Vec::new();
	collect(&ENDPOINT_PATTERNS, text, &mut endpoints);
	endpoints
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn keywords_include_metadata_and_domain_terms() {
		let meta = ChunkMetadata { title: "Webhooks".into(), section: "Setup".into(), category: "api".into(), ..Default::default() };
		let kws = extract_keywords("Create a Webhook on your Shopify store via the REST API.", &meta);
		assert_eq!(&kws[..3], &["webhooks", "setup", "api"]);
		for expected in ["rest", "webhook", "create", "shopify", "store"] { assert!(kws.contains(&expected.to_string()), "missing {expected}: {kws:?}"); }
		assert_eq!(kws.iter().filter(|k| k.as_str() == "api").count(), 1);
	}

	#[test]
	fn endpoints_are_lowercased_and_unique() {
		let eps = extract_api_endpoints("POST /admin/api/2024-01/orders.json then ADMIN_API at shop.shopify.com and /api/products");
		assert!(eps.contains(&"/admin/api/2024-01/orders".to_string()));
		assert!(eps.contains(&"/api/2024-01/orders".to_string()));
		assert!(eps.contains(&"/api/products".to_string()));
		assert!(eps.contains(&"admin_api".to_string()));
		assert!(eps.contains(&"shop.shopify.com".to_string()));
		assert!(extract_api_endpoints("nothing technical here").is_empty());
	}
}
