//! Full-text index over article title, content and excerpt.

use std::{
    fmt,
    path::Path,
    sync::{Mutex, PoisonError},
};

use tantivy::{
    Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term,
    collector::TopDocs,
    doc,
    query::{BooleanQuery, BoostQuery, Occur, Query, TermQuery},
    schema::{
        Field, INDEXED, IndexRecordOption, OwnedValue, STORED, Schema, TextFieldIndexing,
        TextOptions,
    },
    tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer, TokenStream},
};
use thiserror::Error;
use tracing::debug;

use crate::types::Article;

const TOKENIZER: &str = "quire_tokenizer";
const TITLE_BOOST: f32 = 2.0;

/// Failures of the full-text index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Tantivy(#[from] tantivy::TantivyError),
    #[error("schema is missing field `{0}`")]
    MissingField(&'static str),
    #[error("index writer lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl<T> From<PoisonError<T>> for IndexError {
    fn from(_: PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

/// How query tokens combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matching {
    /// A document matches when any token does.
    Any,
    /// A document matches only when every token does.
    All,
}

/// A ranked hit: article id and relevance score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub id: u64,
    pub score: f32,
}

/// Full-text index over article title, content and excerpt.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    id_field: Field,
    title_field: Field,
    content_field: Field,
    excerpt_field: Field,
}

impl fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchIndex").finish_non_exhaustive()
    }
}

impl SearchIndex {
    /// Open (or create) the index stored in `dir`.
    ///
    /// # Errors
    /// Fails if the directory cannot be created or holds an unreadable index.
    pub fn open(dir: impl AsRef<Path>, writer_heap: usize) -> Result<Self, IndexError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let index = if dir.join("meta.json").exists() {
            Index::open_in_dir(dir)?
        } else {
            Index::create_in_dir(dir, Self::build_schema())?
        };
        debug!(dir = %dir.display(), "opened search index");
        Self::from_index(index, writer_heap)
    }

    /// An index that lives only in memory.
    ///
    /// # Errors
    /// Fails if tantivy cannot allocate the writer.
    pub fn in_memory(writer_heap: usize) -> Result<Self, IndexError> {
        Self::from_index(Index::create_in_ram(Self::build_schema()), writer_heap)
    }

    fn from_index(index: Index, writer_heap: usize) -> Result<Self, IndexError> {
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(40))
            .filter(LowerCaser)
            .build();
        index.tokenizers().register(TOKENIZER, analyzer);

        let schema = index.schema();
        let field = |name: &'static str| {
            schema
                .get_field(name)
                .map_err(|_| IndexError::MissingField(name))
        };
        let id_field = field("id")?;
        let title_field = field("title")?;
        let content_field = field("content")?;
        let excerpt_field = field("excerpt")?;

        let writer = index.writer_with_num_threads(1, writer_heap)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            id_field,
            title_field,
            content_field,
            excerpt_field,
        })
    }

    fn build_schema() -> Schema {
        let mut builder = Schema::builder();
        let text_field_indexing = TextFieldIndexing::default()
            .set_tokenizer(TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let text = TextOptions::default().set_indexing_options(text_field_indexing);

        builder.add_u64_field("id", INDEXED | STORED);
        builder.add_text_field("title", text.clone());
        builder.add_text_field("content", text.clone());
        builder.add_text_field("excerpt", text);
        builder.build()
    }

    /// Index `article`, replacing any earlier version of it.
    ///
    /// # Errors
    /// Fails if the document cannot be written or committed.
    pub fn upsert(&self, article: &Article) -> Result<(), IndexError> {
        let mut writer = self.writer.lock()?;
        writer.delete_term(Term::from_field_u64(self.id_field, article.id));
        writer.add_document(doc!(
            self.id_field => article.id,
            self.title_field => article.title.as_str(),
            self.content_field => article.content.as_str(),
            self.excerpt_field => article.excerpt.as_str(),
        ))?;
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(())
    }

    /// # Errors
    /// Fails if the deletion cannot be committed.
    pub fn remove(&self, id: u64) -> Result<(), IndexError> {
        let mut writer = self.writer.lock()?;
        writer.delete_term(Term::from_field_u64(self.id_field, id));
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(())
    }

    /// Drop everything and index `articles` from scratch.
    ///
    /// # Errors
    /// Fails if any document cannot be written or the batch cannot be committed.
    pub fn rebuild<'a>(
        &self,
        articles: impl IntoIterator<Item = &'a Article>,
    ) -> Result<usize, IndexError> {
        let mut writer = self.writer.lock()?;
        writer.delete_all_documents()?;
        let mut indexed = 0;
        for article in articles {
            writer.add_document(doc!(
                self.id_field => article.id,
                self.title_field => article.title.as_str(),
                self.content_field => article.content.as_str(),
                self.excerpt_field => article.excerpt.as_str(),
            ))?;
            indexed += 1;
        }
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(indexed)
    }

    /// Every document matching `query`, best first.
    ///
    /// The query text goes through the same analyzer as the documents. Each token
    /// may hit title, content or excerpt; title hits weigh double.
    ///
    /// # Errors
    /// Fails if the index cannot be searched.
    pub fn search(&self, query: &str, matching: Matching) -> Result<Vec<Hit>, IndexError> {
        let tokens = self.tokenize(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let occur = match matching {
            Matching::Any => Occur::Should,
            Matching::All => Occur::Must,
        };
        let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
            .iter()
            .map(|token| (occur, self.token_query(token)))
            .collect();
        let combined = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let limit = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX).max(1);
        let top_docs = searcher.search(&combined, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            if let Some(value) = doc.get_first(self.id_field) {
                let owned: OwnedValue = value.into();
                if let OwnedValue::U64(id) = owned {
                    hits.push(Hit { id, score });
                }
            }
        }
        debug!(query, hits = hits.len(), "full-text search");
        Ok(hits)
    }

    fn token_query(&self, token: &str) -> Box<dyn Query> {
        let term_query = |field: Field| -> Box<dyn Query> {
            Box::new(TermQuery::new(
                Term::from_field_text(field, token),
                IndexRecordOption::WithFreqs,
            ))
        };
        Box::new(BooleanQuery::new(vec![
            (
                Occur::Should,
                Box::new(BoostQuery::new(term_query(self.title_field), TITLE_BOOST)),
            ),
            (Occur::Should, term_query(self.content_field)),
            (Occur::Should, term_query(self.excerpt_field)),
        ]))
    }

    fn tokenize(&self, input: &str) -> Vec<String> {
        let Some(mut analyzer) = self.index.tokenizers().get(TOKENIZER) else {
            return Vec::new();
        };
        let mut stream = analyzer.token_stream(input);
        let mut tokens: Vec<String> = Vec::new();
        while stream.advance() {
            let text = &stream.token().text;
            if !tokens.contains(text) {
                tokens.push(text.clone());
            }
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn article(id: u64, title: &str, content: &str) -> Article {
        let mut article = Article::draft(1, title, format!("a-{id}"), content, datetime!(2024-01-01 0:00 UTC));
        article.id = id;
        article
    }

    fn index() -> SearchIndex {
        let index = SearchIndex::in_memory(15_000_000).unwrap();
        index.upsert(&article(1, "Rust ownership", "borrowing and lifetimes")).unwrap();
        index.upsert(&article(2, "Cooking pasta", "boil water, add rust-free pot")).unwrap();
        index.upsert(&article(3, "Go channels", "concurrency primitives")).unwrap();
        index
    }

    #[test]
    fn title_hits_rank_first() {
        let hits = index().search("rust", Matching::Any).unwrap();
        let ids: Vec<_> = hits.iter().map(|hit| hit.id).collect();
        assert_eq!(ids, [1, 2]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn all_tokens_must_match() {
        let index = index();
        assert_eq!(index.search("rust borrowing", Matching::Any).unwrap().len(), 2);
        let hits = index.search("rust borrowing", Matching::All).unwrap();
        assert_eq!(hits.iter().map(|hit| hit.id).collect::<Vec<_>>(), [1]);
    }

    #[test]
    fn upsert_replaces_and_remove_forgets() {
        let index = index();
        index.upsert(&article(3, "Go channels", "now about rust too")).unwrap();
        assert_eq!(index.search("rust", Matching::Any).unwrap().len(), 3);
        assert_eq!(index.search("channels", Matching::Any).unwrap().len(), 1);

        index.remove(3).unwrap();
        assert!(index.search("channels", Matching::Any).unwrap().is_empty());
    }

    #[test]
    fn rebuild_starts_over() {
        let index = index();
        let fresh = [article(9, "Only one", "left")];
        assert_eq!(index.rebuild(&fresh).unwrap(), 1);
        assert!(index.search("rust", Matching::Any).unwrap().is_empty());
        assert_eq!(index.search("left", Matching::Any).unwrap()[0].id, 9);
    }
}
