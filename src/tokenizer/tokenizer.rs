use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use stop_words::{get, LANGUAGE};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::TokenizerConfig;

/// Splits source text into the terms a document stream is built from
///
/// Words are found by Unicode word boundaries, then lowercased, length
/// filtered, stopword filtered and stemmed according to the config.
/// Term order is preserved since n-grams are built from adjacent terms.
pub struct Tokenizer {
    config: TokenizerConfig,
    stemmer: Option<Stemmer>,
    stopwords: HashSet<String>,
}

impl Tokenizer {
    pub fn new(config: &TokenizerConfig) -> Self {
        let stemmer = config.stem.then(|| Stemmer::create(Algorithm::English));

        let stopwords = if config.remove_stopwords {
            get(LANGUAGE::English)
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect()
        } else {
            HashSet::new()
        };

        Self {
            config: config.clone(),
            stemmer,
            stopwords,
        }
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Terms of `text` in source order; repeats are kept
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.terms(text).collect()
    }

    /// Lazy form of `tokenize`
    pub fn terms<'a>(&'a self, text: &'a str) -> impl Iterator<Item = String> + 'a {
        text.unicode_words().filter_map(move |word| self.normalize(word))
    }

    /// Normalize one word, or `None` if it is filtered out
    pub fn normalize(&self, word: &str) -> Option<String> {
        let token = if self.config.lowercase {
            word.to_lowercase()
        } else {
            word.to_string()
        };

        // Length limits apply to the surface form, before stemming
        let length = token.chars().count();
        if length < self.config.min_token_length || length > self.config.max_token_length {
            return None;
        }
        if self.stopwords.contains(&token) {
            return None;
        }

        Some(match &self.stemmer {
            Some(stemmer) => stemmer.stem(&token).into_owned(),
            None => token,
        })
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(&TokenizerConfig::default())
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("config", &self.config)
            .field("stopwords", &self.stopwords.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TokenizerConfig {
        TokenizerConfig {
            lowercase: true,
            remove_stopwords: false,
            stem: false,
            min_token_length: 1,
            max_token_length: 50,
        }
    }

    #[test]
    fn test_order_and_repeats_preserved() {
        let tokenizer = Tokenizer::new(&config());
        let tokens = tokenizer.tokenize("Hello World! hello again.");
        assert_eq!(tokens, vec!["hello", "world", "hello", "again"]);
    }

    #[test]
    fn test_case_preserved_without_lowercase() {
        let tokenizer = Tokenizer::new(&TokenizerConfig {
            lowercase: false,
            ..config()
        });
        assert_eq!(tokenizer.tokenize("Rust rust"), vec!["Rust", "rust"]);
    }

    #[test]
    fn test_stopword_removal() {
        let tokenizer = Tokenizer::new(&TokenizerConfig {
            remove_stopwords: true,
            ..config()
        });
        let tokens = tokenizer.tokenize("This is a document about the system");

        assert!(!tokens.contains(&"this".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
        assert!(tokens.contains(&"document".to_string()));
        assert!(tokens.contains(&"system".to_string()));
    }

    #[test]
    fn test_stemming() {
        let tokenizer = Tokenizer::new(&TokenizerConfig {
            stem: true,
            ..config()
        });
        let tokens = tokenizer.tokenize("running runs");
        assert_eq!(tokens, vec!["run", "run"]);
    }

    #[test]
    fn test_min_max_token_length() {
        let tokenizer = Tokenizer::new(&TokenizerConfig {
            min_token_length: 3,
            max_token_length: 5,
            ..config()
        });
        let tokens = tokenizer.tokenize("a ab abc abcd abcde abcdef");
        assert_eq!(tokens, vec!["abc", "abcd", "abcde"]);
    }

    #[test]
    fn test_length_counts_characters() {
        let tokenizer = Tokenizer::new(&TokenizerConfig {
            max_token_length: 4,
            ..config()
        });
        // Four characters, eight bytes
        assert_eq!(tokenizer.tokenize("ÅÄÖÜ"), vec!["åäöü"]);
    }

    #[test]
    fn test_empty_text() {
        let tokenizer = Tokenizer::default();
        assert!(tokenizer.tokenize("").is_empty());
        assert!(tokenizer.tokenize("  ,;  ").is_empty());
    }
}
