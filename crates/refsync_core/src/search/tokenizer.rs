//! Text tokenization for the search index.

use once_cell::sync::Lazy;
use regex::Regex;

static WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid word regex"));

/// Splits text into token groups, one group per word.
pub trait Tokenizer: Send + Sync {
    /// Returns, for every word of `text`, the tokens it contributes to an
    /// index entry. The last token of a group is the whole word.
    fn tokenize(&self, text: &str) -> Vec<Vec<String>>;

    /// Whole-word terms of `text`, used to match queries.
    fn terms(&self, text: &str) -> Vec<String> {
        self.tokenize(text)
            .into_iter()
            .filter_map(|mut group| group.pop())
            .collect()
    }
}

/// Emits every lowercase prefix of at least `min_token_len` characters, so
/// a whole-word query term matches words it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixTokenizer {
    min_token_len: usize,
}

impl PrefixTokenizer {
    pub fn new(min_token_len: usize) -> Self {
        Self {
            min_token_len: min_token_len.max(1),
        }
    }
}

impl Tokenizer for PrefixTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Vec<String>> {
        WORD_RE
            .find_iter(text)
            .map(|word| {
                let chars: Vec<char> = word.as_str().to_lowercase().chars().collect();
                let shortest = self.min_token_len.min(chars.len());
                (shortest..=chars.len())
                    .map(|end| chars[..end].iter().collect())
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{PrefixTokenizer, Tokenizer};

    #[test]
    fn emits_prefix_groups_per_word() {
        let tokenizer = PrefixTokenizer::new(2);
        assert_eq!(
            tokenizer.tokenize("Foo, Bar!"),
            vec![
                vec!["fo".to_string(), "foo".to_string()],
                vec!["ba".to_string(), "bar".to_string()],
            ]
        );
    }

    #[test]
    fn short_words_keep_a_single_token() {
        let tokenizer = PrefixTokenizer::new(3);
        assert_eq!(tokenizer.tokenize("a ok"), vec![vec!["a"], vec!["ok"]]);
    }

    #[test]
    fn terms_are_whole_lowercase_words() {
        let tokenizer = PrefixTokenizer::new(2);
        assert_eq!(tokenizer.terms("Rust 2021 Édition"), ["rust", "2021", "édition"]);
        assert!(tokenizer.terms("  --  ").is_empty());
    }
}
