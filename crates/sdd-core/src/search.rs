use crate::{
    error::{Result, SddError},
    spec::{self, Spec},
};
use serde::Serialize;
use std::path::Path;
use tantivy::{
    collector::TopDocs,
    query::QueryParser,
    schema::{Field, Schema, Value, STORED, STRING, TEXT},
    Index, IndexWriter, ReloadPolicy, TantivyDocument,
};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub status: String,
    pub score: f32,
}

// ---------------------------------------------------------------------------
// SpecIndex
// ---------------------------------------------------------------------------

struct Fields {
    id: Field,
    title: Field,
    status: Field,
    body: Field,
}

pub struct SpecIndex {
    index: Index,
    reader: tantivy::IndexReader,
    fields: Fields,
}

fn search_err(e: impl std::fmt::Display) -> SddError {
    SddError::Search(e.to_string())
}

/// Description, requirement and scenario text flattened into one string.
fn body_text(s: &Spec) -> String {
    let mut parts: Vec<&str> = vec![s.id.as_str(), s.description.as_str()];
    for r in &s.requirements {
        parts.push(&r.id);
        parts.extend(r.title.as_deref());
        parts.push(&r.description);
    }
    for sc in &s.scenarios {
        parts.push(&sc.name);
        parts.extend(sc.given.iter().map(String::as_str));
        parts.push(&sc.when);
        parts.extend(sc.then.iter().map(String::as_str));
    }
    parts.retain(|p| !p.is_empty());
    parts.join(" ")
}

impl SpecIndex {
    /// Build an ephemeral in-RAM index.
    ///
    /// Indexed fields:
    /// - `id`: STRING (exact-match, stored), e.g. `id:auth`
    /// - `title`: TEXT (tokenized, stored)
    /// - `status`: STRING (exact-match, stored), e.g. `status:approved`
    /// - `body`: TEXT: id tokens, description, requirements, scenarios
    pub fn build(specs: &[Spec]) -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);

        let mut writer: IndexWriter = index.writer(15_000_000).map_err(search_err)?;
        for s in specs {
            let mut doc = TantivyDocument::default();
            doc.add_text(fields.id, &s.id);
            doc.add_text(fields.title, &s.title);
            doc.add_text(fields.status, s.status_str());
            doc.add_text(fields.body, body_text(s));
            writer.add_document(doc).map_err(search_err)?;
        }
        writer.commit().map_err(search_err)?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| search_err(e))?;

        tracing::debug!(docs = specs.len(), "built spec index");
        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    /// BM25 search, best first. Terms are ANDed by default; a query that
    /// does not parse yields no results.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let searcher = self.reader.searcher();
        let mut parser =
            QueryParser::for_index(&self.index, vec![self.fields.title, self.fields.body]);
        parser.set_conjunction_by_default();

        let query = match parser.parse_query(query_str) {
            Ok(q) => q,
            Err(_) => return Ok(vec![]),
        };

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit.max(1)))
            .map_err(search_err)?;

        let text = |doc: &TantivyDocument, field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr).map_err(search_err)?;
            results.push(SearchResult {
                id: text(&doc, self.fields.id),
                title: text(&doc, self.fields.title),
                status: text(&doc, self.fields.status),
                score,
            });
        }
        Ok(results)
    }
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();
    let id = builder.add_text_field("id", STRING | STORED);
    let title = builder.add_text_field("title", TEXT | STORED);
    let status = builder.add_text_field("status", STRING | STORED);
    let body = builder.add_text_field("body", TEXT);
    (
        builder.build(),
        Fields {
            id,
            title,
            status,
            body,
        },
    )
}

/// Index every spec under `root` and run `query`.
pub fn search(root: &Path, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
    crate::paths::ensure_initialized(root)?;
    let specs = spec::load_all(root)?;
    SpecIndex::build(&specs)?.search(query, limit)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
