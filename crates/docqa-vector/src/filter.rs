//! Equality filters shared by the Lance and in-memory indexes.
use docqa_core::types::{ChunkMetadata, Filter};
use docqa_core::{Error, Result};

pub const FILTERABLE: &[&str] = &["id", "title", "section", "category", "merchant_level", "source_url"];

fn check_key(key: &str) -> Result<()> {
	if FILTERABLE.contains(&key) { Ok(()) } else { Err(Error::VectorIndex(format!("unsupported filter field '{key}'"))) }
}

/// `a = 'x' AND b = 'y'`, or `None` for an empty filter.
pub fn to_sql(filter: &Filter) -> Result<Option<String>> {
	if filter.is_empty() { return Ok(None); }
	let mut clauses = Vec::with_capacity(filter.len());
	for (k, v) in filter { check_key(k)?; clauses.push(format!("{} = '{}'", k, v.replace('\'', "''"))); }
	Ok(Some(clauses.join(" AND ")))
}

pub fn matches(id: &str, meta: &ChunkMetadata, filter: &Filter) -> Result<bool> {
	for (k, v) in filter {
		check_key(k)?;
		let actual = match k.as_str() {
			"id" => id,
			"title" => &meta.title,
			"section" => &meta.section,
			"category" => &meta.category,
			"merchant_level" => &meta.merchant_level,
			_ => &meta.source_url,
		};
		if actual != v { return Ok(false); }
	}
	Ok(true)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sql_escapes_quotes_and_joins_in_key_order() {
		let f: Filter = [("section".to_string(), "it's".to_string()), ("category".to_string(), "api".to_string())].into_iter().collect();
		assert_eq!(to_sql(&f).unwrap().as_deref(), Some("category = 'api' AND section = 'it''s'"));
		assert_eq!(to_sql(&Filter::new()).unwrap(), None);
	}

	#[test]
	fn unknown_keys_are_rejected() {
		let f: Filter = [("vector".to_string(), "x".to_string())].into_iter().collect();
		assert!(to_sql(&f).is_err());
		assert!(matches("a", &ChunkMetadata::default(), &f).is_err());
	}
}
