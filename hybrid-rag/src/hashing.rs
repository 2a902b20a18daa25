//! Deterministic built-in feature extractor.
//!
//! [`HashingExtractor`] needs no model files: it tokenises on Unicode word
//! boundaries, derives coarse part-of-speech tags and capitalised-span
//! entities, and embeds the preprocessed tokens with FNV-1a feature hashing.
//! It is meant for development, tests and air-gapped deployments; production
//! deployments plug a real linguistic model in through [`FeatureExtractor`].

use async_trait::async_trait;

use crate::config::ExtractorConfig;
use crate::document::{Entity, FeatureRecord, PosTag};
use crate::error::{RetrievalError, Result};
use crate::extractor::FeatureExtractor;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001B3;

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "he",
    "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "me", "my", "no", "not", "of",
    "on", "or", "our", "she", "so", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "those", "to", "was", "we", "were", "what", "when", "where", "which",
    "who", "why", "will", "with", "would", "you", "your",
];

/// Lowercase words allowed inside a capitalised entity span, as in
/// "University of the Philippines".
const ENTITY_CONNECTORS: &[&str] = &["of", "the", "and", "de", "for"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    Number,
    Punct,
}

#[derive(Debug, Clone)]
struct Token {
    text: String,
    kind: TokenKind,
    start: usize,
    end: usize,
}

impl Token {
    fn is_capitalised(&self) -> bool {
        self.kind == TokenKind::Word && self.text.chars().next().is_some_and(char::is_uppercase)
    }
}

/// Split text into word, number and punctuation tokens with character offsets.
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut start = 0;

    let flush = |current: &mut String, start: usize, end: usize, tokens: &mut Vec<Token>| {
        if current.is_empty() {
            return;
        }
        let kind = if current.chars().all(|c| c.is_numeric() || c == '.' || c == ',') {
            TokenKind::Number
        } else {
            TokenKind::Word
        };
        tokens.push(Token { text: std::mem::take(current), kind, start, end });
    };

    for (i, c) in text.chars().enumerate() {
        if c.is_alphanumeric() || (c == '\'' && !current.is_empty()) {
            if current.is_empty() {
                start = i;
            }
            current.push(c);
        } else {
            flush(&mut current, start, i, &mut tokens);
            if !c.is_whitespace() {
                let kind = TokenKind::Punct;
                tokens.push(Token { text: c.to_string(), kind, start: i, end: i + 1 });
            }
        }
    }
    let len = text.chars().count();
    flush(&mut current, start, len, &mut tokens);

    tokens
}

fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

/// Crude English lemma: lowercase and strip regular plural endings.
fn lemma(word: &str) -> String {
    let lower = word.to_lowercase();
    let chars = lower.chars().count();
    if chars > 4 && lower.ends_with("ies") {
        return format!("{}y", &lower[..lower.len() - 3]);
    }
    if chars > 3
        && lower.ends_with('s')
        && !lower.ends_with("ss")
        && !lower.ends_with("us")
        && !lower.ends_with("is")
    {
        return lower[..lower.len() - 1].to_string();
    }
    lower
}

/// Terms used for full-text ranking: lemmatised words and numbers without stopwords.
pub(crate) fn lexical_terms(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| t.kind != TokenKind::Punct)
        .map(|t| lemma(&t.text))
        .filter(|w| !is_stopword(w))
        .collect()
}

fn pos_tag(token: &Token) -> PosTag {
    let (pos, tag) = match token.kind {
        TokenKind::Punct => ("PUNCT", "PUNCT"),
        TokenKind::Number => ("NUM", "CD"),
        TokenKind::Word if is_stopword(&token.text.to_lowercase()) => ("X", "XX"),
        TokenKind::Word if token.is_capitalised() => ("PROPN", "NNP"),
        TokenKind::Word => ("NOUN", "NN"),
    };
    PosTag::new(token.text.clone(), pos, tag)
}

/// Maximal runs of capitalised words, optionally joined by connector words.
fn entities(text: &str, tokens: &[Token]) -> Vec<Entity> {
    let chars: Vec<char> = text.chars().collect();
    let mut found = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        if !tokens[i].is_capitalised() || is_stopword(&tokens[i].text.to_lowercase()) {
            i += 1;
            continue;
        }

        let first = i;
        let mut last = i;
        let mut j = i + 1;
        while j < tokens.len() {
            if tokens[j].is_capitalised() {
                last = j;
                j += 1;
                continue;
            }
            if ENTITY_CONNECTORS.contains(&tokens[j].text.as_str()) {
                j += 1;
                continue;
            }
            break;
        }

        let (start, end) = (tokens[first].start, tokens[last].end);
        let surface: String = chars[start..end].iter().collect();
        found.push(Entity::new(surface, "MISC", start as i64, end as i64));
        i = last + 1;
    }

    found
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn l2_normalize(v: &mut [f64]) {
    let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > f64::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// A model-free [`FeatureExtractor`] built on feature hashing.
#[derive(Debug, Clone)]
pub struct HashingExtractor {
    dimensions: usize,
}

impl HashingExtractor {
    /// Create an extractor producing embeddings of `config.dimensions`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] if the dimension is zero.
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        if config.dimensions == 0 {
            return Err(RetrievalError::ConfigError(
                "dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dimensions: config.dimensions })
    }

    fn embed(&self, terms: &[String]) -> Vec<f64> {
        let mut vector = vec![0.0; self.dimensions];
        for term in terms {
            let h = fnv1a(term.as_bytes());
            let bucket = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }

    /// Extract features synchronously.
    pub fn features(&self, text: &str) -> FeatureRecord {
        let tokens = tokenize(text);
        let preprocessed_tokens: Vec<String> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Word)
            .map(|t| lemma(&t.text))
            .filter(|w| !is_stopword(w))
            .collect();

        FeatureRecord {
            pos: tokens.iter().map(pos_tag).collect(),
            entities: entities(text, &tokens),
            embedding: self.embed(&preprocessed_tokens),
            tokens: tokens.into_iter().map(|t| t.text).collect(),
            preprocessed_tokens,
        }
    }
}

#[async_trait]
impl FeatureExtractor for HashingExtractor {
    async fn extract(&self, text: &str) -> Result<FeatureRecord> {
        Ok(self.features(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "fnv1a-hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(dimensions: usize) -> HashingExtractor {
        HashingExtractor::new(ExtractorConfig { dimensions }).unwrap()
    }

    #[test]
    fn stopwords_are_sorted_for_binary_search() {
        assert!(STOPWORDS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(HashingExtractor::new(ExtractorConfig { dimensions: 0 }).is_err());
    }

    #[test]
    fn tokens_keep_punctuation_and_offsets() {
        let tokens = tokenize("Hi, Ana.");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["Hi", ",", "Ana", "."]);
        assert_eq!((tokens[2].start, tokens[2].end), (4, 7));
    }

    #[test]
    fn preprocessing_drops_stopwords_numbers_and_punctuation() {
        let record = extractor(64).features("The 3 courses of Engineering, in 2024!");
        assert_eq!(record.preprocessed_tokens, vec!["course", "engineering"]);
    }

    #[test]
    fn capitalised_spans_become_entities() {
        let text = "The University of the Philippines offers Computer Science in Manila.";
        let record = extractor(64).features(text);
        let surfaces: Vec<&str> = record.entities.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(surfaces, vec!["University of the Philippines", "Computer Science", "Manila"]);

        let manila = &record.entities[2];
        let span: String = text
            .chars()
            .skip(manila.start as usize)
            .take((manila.end - manila.start) as usize)
            .collect();
        assert_eq!(span, "Manila");
    }

    #[test]
    fn pos_tags_align_with_tokens() {
        let record = extractor(64).features("Manila has 2 parks.");
        assert_eq!(record.pos.len(), record.tokens.len());
        assert_eq!(record.pos[0], PosTag::new("Manila", "PROPN", "NNP"));
        assert_eq!(record.pos[2].pos, "NUM");
        assert_eq!(record.pos[4].pos, "PUNCT");
    }

    #[test]
    fn embedding_is_deterministic_and_normalised() {
        let ex = extractor(128);
        let a = ex.features("hybrid retrieval engine");
        let b = ex.features("hybrid retrieval engine");
        assert_eq!(a.embedding, b.embedding);
        let norm: f64 = a.embedding.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_text_is_degenerate() {
        let record = extractor(16).features("");
        assert!(record.tokens.is_empty());
        assert!(record.entities.is_empty());
        assert_eq!(record.embedding, vec![0.0; 16]);
    }

    #[test]
    fn lexical_terms_keep_numbers() {
        assert_eq!(lexical_terms("The 2024 Courses!"), vec!["2024", "course"]);
    }

    #[test]
    fn lemma_strips_regular_plurals() {
        assert_eq!(lemma("Courses"), "course");
        assert_eq!(lemma("universities"), "university");
        assert_eq!(lemma("class"), "class");
        assert_eq!(lemma("campus"), "campus");
    }
}
