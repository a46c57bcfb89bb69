use anyhow::Result as AnyResult;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, Index, IndexReader, IndexWriter, TantivyDocument};
use tracing::{debug, info};

use docqa_core::corpus::Corpus;
use docqa_core::traits::KeywordIndex;
use docqa_core::types::{Chunk, KeywordField, KeywordMatch};
use docqa_core::{Error, Result};

use crate::enhance::{extract_api_endpoints, extract_keywords};
use crate::tantivy_utils::{build_schema, register_tokenizer};

const WRITER_HEAP_BYTES: usize = 50_000_000;

struct Fields {
	id: Field,
	/// In `KeywordField::ALL` order.
	searchable: Vec<Field>,
}

impl Fields {
	fn resolve(index: &Index) -> AnyResult<Self> {
		let schema = index.schema();
		let searchable = KeywordField::ALL.iter().map(|f| schema.get_field(f.name())).collect::<std::result::Result<Vec<_>, _>>()?;
		Ok(Self { id: schema.get_field("id")?, searchable })
	}

	fn get(&self, field: KeywordField) -> Field {
		let pos = KeywordField::ALL.iter().position(|f| *f == field).unwrap_or(0);
		self.searchable[pos]
	}
}

/// One-time bulk loader for [`TantivyKeywordIndex`]. The index lives in RAM.
pub struct KeywordIndexBuilder {
	index: Index,
	writer: IndexWriter,
	fields: Fields,
	count: usize,
}

impl KeywordIndexBuilder {
	pub fn new() -> AnyResult<Self> {
		let index = Index::create_in_ram(build_schema());
		register_tokenizer(&index);
		let writer: IndexWriter = index.writer(WRITER_HEAP_BYTES)?;
		let fields = Fields::resolve(&index)?;
		Ok(Self { index, writer, fields, count: 0 })
	}

	pub fn add(&mut self, chunk: &Chunk) -> AnyResult<()> {
		let f = &self.fields;
		let keywords = extract_keywords(&chunk.text, &chunk.metadata).join(" ");
		let api_endpoints = extract_api_endpoints(&chunk.text).join(" ");
		let m = &chunk.metadata;
		self.writer.add_document(doc!(
			f.id => chunk.id.clone(),
			f.get(KeywordField::Text) => chunk.text.clone(),
			f.get(KeywordField::Title) => m.title.clone(),
			f.get(KeywordField::Section) => m.section.clone(),
			f.get(KeywordField::Category) => m.category.clone(),
			f.get(KeywordField::Keywords) => keywords,
			f.get(KeywordField::ApiEndpoints) => api_endpoints,
		))?;
		self.count += 1;
		Ok(())
	}

	pub fn build(mut self) -> AnyResult<TantivyKeywordIndex> {
		self.writer.commit()?;
		let reader = self.index.reader()?;
		info!(documents = self.count, "keyword index built");
		Ok(TantivyKeywordIndex { index: self.index, reader, fields: self.fields, len: self.count })
	}
}

/// Read-only BM25 index over chunk text, metadata labels and extracted terms.
pub struct TantivyKeywordIndex {
	index: Index,
	reader: IndexReader,
	fields: Fields,
	len: usize,
}

impl TantivyKeywordIndex {
	pub fn from_corpus(corpus: &Corpus) -> AnyResult<Self> {
		let mut builder = KeywordIndexBuilder::new()?;
		for chunk in corpus.iter() { builder.add(chunk)?; }
		builder.build()
	}

	/// True when the analyzer keeps at least one token of `query`. A parsed
	/// query whose clauses all analyze away matches every document.
	fn has_terms(&self, query: &str, targets: &[Field]) -> AnyResult<bool> {
		for field in targets {
			let mut analyzer = self.index.tokenizer_for_field(*field)?;
			let mut stream = analyzer.token_stream(query);
			if stream.advance() { return Ok(true); }
		}
		Ok(false)
	}

	fn search_inner(&self, query: &str, limit: usize, fields: &[KeywordField]) -> AnyResult<Vec<KeywordMatch>> {
		let targets: Vec<Field> = fields.iter().map(|f| self.fields.get(*f)).collect();
		if !self.has_terms(query, &targets)? {
			debug!(query, "no searchable terms after analysis");
			return Ok(vec![]);
		}
		let searcher = self.reader.searcher();
		let qp = QueryParser::for_index(&self.index, targets);
		let (q, errors) = qp.parse_query_lenient(query);
		if !errors.is_empty() { debug!(?errors, query, "lenient query parse dropped clauses"); }
		let top_docs = searcher.search(&q, &TopDocs::with_limit(limit))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let Some(id) = doc.get_first(self.fields.id).and_then(|v| v.as_str()) else { continue };
			hits.push(KeywordMatch { id: id.to_string(), score: Some(score) });
		}
		Ok(hits)
	}
}

impl KeywordIndex for TantivyKeywordIndex {
	fn search(&self, query: &str, limit: usize, fields: Option<&[KeywordField]>) -> Result<Vec<KeywordMatch>> {
		let fields: &[KeywordField] = match fields { Some(f) if !f.is_empty() => f, _ => &KeywordField::ALL };
		if limit == 0 || query.trim().is_empty() { return Ok(vec![]); }
		self.search_inner(query, limit, fields).map_err(|e| Error::KeywordIndex(e.to_string()))
	}

	fn len(&self) -> usize { self.len }
}
