//! BM25 keyword index over chunk texts, backed by tantivy.
//!
//! Documents are pre-tokenized with [`tokenize`] and indexed through a plain
//! whitespace analyzer, so query and document terms go through exactly the
//! same normalization. Each document stores its [`ChunkPosition`].

use std::path::Path;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    FAST, Field, IndexRecordOption, STORED, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::tokenizer::{TextAnalyzer, WhitespaceTokenizer};
use tantivy::{
    Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument as Document, Term, doc,
};
use thiserror::Error;

use super::tokenize::{expand_query, tokenize};
use crate::types::{Chunk, ChunkPosition};

const TOKENIZER_NAME: &str = "docsift_terms";
const BODY_FIELD: &str = "body";
const POSITION_FIELD: &str = "position";

/// Writer heap; one indexing thread keeps segment order equal to insertion order.
const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Error, Debug)]
pub enum KeywordError {
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keyword document {0:?} has no stored position")]
    MissingPosition(tantivy::DocAddress),

    #[error("Chunk position {0} does not fit the index")]
    PositionOverflow(u64),
}

/// A read-only BM25 index addressed by chunk position.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    body: Field,
    position: Field,
    doc_count: usize,
}

impl std::fmt::Debug for KeywordIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordIndex")
            .field("doc_count", &self.doc_count)
            .finish()
    }
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    let indexing = TextFieldIndexing::default()
        .set_tokenizer(TOKENIZER_NAME)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    builder.add_text_field(BODY_FIELD, TextOptions::default().set_indexing_options(indexing));
    builder.add_u64_field(POSITION_FIELD, STORED | FAST);
    builder.build()
}

fn register_tokenizer(index: &Index) {
    index.tokenizers().register(
        TOKENIZER_NAME,
        TextAnalyzer::builder(WhitespaceTokenizer::default()).build(),
    );
}

impl KeywordIndex {
    /// Build an in-memory index over `chunks`.
    pub fn build_in_ram(chunks: &[Chunk]) -> Result<Self, KeywordError> {
        let index = Index::create_in_ram(build_schema());
        Self::populate(index, chunks)
    }

    /// Build an on-disk index over `chunks` in an empty or missing directory.
    pub fn build_in_dir(dir: &Path, chunks: &[Chunk]) -> Result<Self, KeywordError> {
        std::fs::create_dir_all(dir)?;
        let index = Index::create_in_dir(dir, build_schema())?;
        Self::populate(index, chunks)
    }

    /// Open an index written by [`KeywordIndex::build_in_dir`].
    pub fn open(dir: &Path) -> Result<Self, KeywordError> {
        let index = Index::open_in_dir(dir)?;
        Self::from_index(index)
    }

    fn populate(index: Index, chunks: &[Chunk]) -> Result<Self, KeywordError> {
        register_tokenizer(&index);
        let schema = index.schema();
        let body = schema.get_field(BODY_FIELD)?;
        let position = schema.get_field(POSITION_FIELD)?;

        let mut writer: IndexWriter<Document> =
            index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
        for chunk in chunks {
            writer.add_document(doc!(
                body => tokenize(&chunk.text).join(" "),
                position => u64::from(chunk.position.get()),
            ))?;
        }
        writer.commit()?;
        writer.wait_merging_threads()?;

        Self::from_index(index)
    }

    fn from_index(index: Index) -> Result<Self, KeywordError> {
        register_tokenizer(&index);
        let schema = index.schema();
        let body = schema.get_field(BODY_FIELD)?;
        let position = schema.get_field(POSITION_FIELD)?;

        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        reader.reload()?;
        let doc_count = reader.searcher().num_docs() as usize;

        Ok(Self {
            index,
            reader,
            body,
            position,
            doc_count,
        })
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.doc_count
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count == 0
    }

    /// Score the synonym-expanded query; returns positive hits, best first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<(ChunkPosition, f32)>, KeywordError> {
        self.search_terms(&expand_query(query), limit)
    }

    /// BM25 over already-normalized terms, OR-combined.
    pub fn search_terms(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<(ChunkPosition, f32)>, KeywordError> {
        if terms.is_empty() || limit == 0 || self.doc_count == 0 {
            return Ok(Vec::new());
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .iter()
            .map(|term| {
                let query: Box<dyn Query> = Box::new(TermQuery::new(
                    Term::from_field_text(self.body, term),
                    IndexRecordOption::WithFreqs,
                ));
                (Occur::Should, query)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            if score <= 0.0 {
                continue;
            }
            let doc: Document = searcher.doc(address)?;
            let raw = doc
                .get_first(self.position)
                .and_then(|v| v.as_u64())
                .ok_or(KeywordError::MissingPosition(address))?;
            let position =
                u32::try_from(raw).map_err(|_| KeywordError::PositionOverflow(raw))?;
            hits.push((ChunkPosition::new(position), score));
        }

        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(hits)
    }

    /// The underlying tantivy index, for diagnostics.
    pub fn tantivy_index(&self) -> &Index {
        &self.index
    }
}
