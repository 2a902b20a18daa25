//! Data types for documents, chunks, extracted features, and ranked results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::PayloadError;

/// A dense embedding vector. Every embedding in one deployment has the same
/// dimension.
pub type Embedding = Vec<f64>;

/// The outcome of decoding one stored payload at the store boundary.
pub type Decoded<T> = std::result::Result<T, PayloadError>;

/// Identifier of a stored chunk.
///
/// Stores assign ids monotonically, so ascending id order is insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(pub i64);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An ingested source document, identified by its storage locator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredDocument {
    /// Store-assigned identifier.
    pub id: DocumentId,
    /// Where the source file lives (for example an object-store URL).
    pub locator: String,
    /// When the document was created.
    pub created_at: DateTime<Utc>,
    /// Last time the document or one of its chunks was written.
    pub updated_at: DateTime<Utc>,
}

/// A named entity: `(surface text, label, start offset, end offset)`.
///
/// Persisted as a 4-element JSON array. Decoding also accepts the 2-element
/// `[text, label]` form and an object form written by older ingestion runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "EntityRepr", into = "(String, String, i64, i64)")]
pub struct Entity {
    /// Surface text as it appears in the passage.
    pub text: String,
    /// Entity label such as `ORG` or `GPE`.
    pub label: String,
    /// Start character offset.
    pub start: i64,
    /// End character offset (exclusive).
    pub end: i64,
}

impl Entity {
    /// Create an entity.
    pub fn new(text: impl Into<String>, label: impl Into<String>, start: i64, end: i64) -> Self {
        Self { text: text.into(), label: label.into(), start, end }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EntityRepr {
    Spanned(String, String, i64, i64),
    Labeled(String, String),
    Object {
        text: String,
        label: String,
        #[serde(default)]
        start: i64,
        #[serde(default)]
        end: i64,
    },
}

impl From<EntityRepr> for Entity {
    fn from(repr: EntityRepr) -> Self {
        match repr {
            EntityRepr::Spanned(text, label, start, end)
            | EntityRepr::Object { text, label, start, end } => Self { text, label, start, end },
            EntityRepr::Labeled(text, label) => Self { text, label, start: 0, end: 0 },
        }
    }
}

impl From<Entity> for (String, String, i64, i64) {
    fn from(entity: Entity) -> Self {
        (entity.text, entity.label, entity.start, entity.end)
    }
}

/// A part-of-speech annotation: `(text, coarse pos, fine tag)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String, String)", into = "(String, String, String)")]
pub struct PosTag {
    /// The token text.
    pub text: String,
    /// Coarse part of speech, e.g. `NOUN`.
    pub pos: String,
    /// Fine-grained tag, e.g. `NNP`.
    pub tag: String,
}

impl PosTag {
    /// Create a part-of-speech annotation.
    pub fn new(text: impl Into<String>, pos: impl Into<String>, tag: impl Into<String>) -> Self {
        Self { text: text.into(), pos: pos.into(), tag: tag.into() }
    }
}

impl From<(String, String, String)> for PosTag {
    fn from((text, pos, tag): (String, String, String)) -> Self {
        Self { text, pos, tag }
    }
}

impl From<PosTag> for (String, String, String) {
    fn from(tag: PosTag) -> Self {
        (tag.text, tag.pos, tag.tag)
    }
}

/// Everything the feature extractor derives from one piece of text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureRecord {
    /// Raw word tokens in order.
    pub tokens: Vec<String>,
    /// Lemmatised tokens with stopwords, punctuation and numbers removed.
    pub preprocessed_tokens: Vec<String>,
    /// Part-of-speech annotations in token order.
    pub pos: Vec<PosTag>,
    /// Named entities found in the text.
    pub entities: Vec<Entity>,
    /// Dense embedding of the whole text.
    pub embedding: Embedding,
}

impl FeatureRecord {
    /// Dimension of the embedding.
    pub fn dimensions(&self) -> usize {
        self.embedding.len()
    }
}

/// A chunk ready to be written to a [`ChunkStore`](crate::ChunkStore).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewChunk {
    /// The owning document.
    pub document_id: DocumentId,
    /// Raw passage text.
    pub text: String,
    /// Preprocessed token sequence.
    pub tokens: Vec<String>,
    /// Dense embedding of dimension D.
    pub embedding: Embedding,
    /// Part-of-speech annotations.
    pub pos: Vec<PosTag>,
    /// Named entities.
    pub entities: Vec<Entity>,
}

impl NewChunk {
    /// Build a chunk from a page of text and the features extracted from it.
    pub fn from_features(
        document_id: DocumentId,
        text: impl Into<String>,
        features: FeatureRecord,
    ) -> Self {
        Self {
            document_id,
            text: text.into(),
            tokens: features.preprocessed_tokens,
            embedding: features.embedding,
            pos: features.pos,
            entities: features.entities,
        }
    }
}

/// A column of a stored chunk that can be requested in a projection fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkField {
    /// Raw passage text.
    Text,
    /// Preprocessed tokens.
    Tokens,
    /// Dense embedding.
    Embedding,
    /// Part-of-speech annotations.
    Pos,
    /// Named entities.
    Entities,
}

impl ChunkField {
    /// The fields the dense reranker needs.
    pub const RERANK: &'static [ChunkField] =
        &[ChunkField::Text, ChunkField::Embedding, ChunkField::Entities];

    /// Every field.
    pub const ALL: &'static [ChunkField] = &[
        ChunkField::Text,
        ChunkField::Tokens,
        ChunkField::Embedding,
        ChunkField::Pos,
        ChunkField::Entities,
    ];

    /// Field name as used in logs and storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Tokens => "tokens",
            Self::Embedding => "embedding",
            Self::Pos => "pos",
            Self::Entities => "entities",
        }
    }
}

impl fmt::Display for ChunkField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A projection of a stored chunk.
///
/// Only the requested fields are populated; the rest are `None`. Payload
/// fields have already been normalised by the store adapter, so a `Some(Err)`
/// means the stored value could not be decoded whatever its physical format.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    /// Chunk identifier.
    pub id: ChunkId,
    /// The owning document.
    pub document_id: DocumentId,
    /// Raw passage text.
    pub text: Option<String>,
    /// Preprocessed tokens.
    pub tokens: Option<Decoded<Vec<String>>>,
    /// Dense embedding.
    pub embedding: Option<Decoded<Embedding>>,
    /// Part-of-speech annotations.
    pub pos: Option<Decoded<Vec<PosTag>>>,
    /// Named entities.
    pub entities: Option<Decoded<Vec<Entity>>>,
}

impl ChunkRecord {
    /// An empty projection of the given chunk.
    pub fn bare(id: ChunkId, document_id: DocumentId) -> Self {
        Self {
            id,
            document_id,
            text: None,
            tokens: None,
            embedding: None,
            pos: None,
            entities: None,
        }
    }
}

/// A lexical candidate: a chunk id and its full-text rank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkRef {
    /// Chunk identifier.
    pub id: ChunkId,
    /// Lexical relevance (higher is more relevant).
    pub rank: f64,
}

/// A candidate after dense reranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// Chunk identifier.
    pub id: ChunkId,
    /// Raw passage text.
    pub text: String,
    /// Cosine similarity to the query, `None` when undefined.
    pub similarity: Option<f64>,
    /// Whether the chunk shares an entity with the query.
    pub entity_match: bool,
    /// Final score: similarity plus boost, `-inf` when similarity is undefined.
    pub score: f64,
    /// Position in the sparse candidate list.
    pub sparse_position: usize,
}

/// One entry of the ranked result handed to callers.
///
/// Serialises as `{id, text}`; the score is kept for in-process consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// Chunk identifier.
    pub id: ChunkId,
    /// Raw passage text.
    pub text: String,
    /// Final reranking score.
    #[serde(skip)]
    pub score: f64,
}

impl From<ScoredChunk> for RetrievedPassage {
    fn from(scored: ScoredChunk) -> Self {
        Self { id: scored.id, text: scored.text, score: scored.score }
    }
}
