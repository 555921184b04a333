//! Vocabulary lookup and subword-prefix handling.
//!
//! Loads a `token_string token_id` table (the same shape sherpa-onnx/NeMo
//! ship their `tokens.txt` in) and reconstructs text using the SentencePiece
//! `▁` word-boundary convention.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

/// SentencePiece word-boundary marker (U+2581).
const WORD_BOUNDARY: char = '\u{2581}';

/// Blank id = SOS id = 1024. The two are kept as a single constant: blank is
/// an output of the joint network, SOS is the initial predictor input when
/// no previous token exists, but both index the same vocabulary slot (see
/// DESIGN.md for why this implementation doesn't split them).
pub const BLANK_AND_SOS_ID: i32 = 1024;

pub struct Tokenizer {
    id_to_token: HashMap<i32, String>,
    blank_id: i32,
    vocab_size: usize,
}

impl Tokenizer {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::SttError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| crate::SttError::Io(format!("failed to read tokens file {:?}: {e}", path.as_ref())))?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, crate::SttError> {
        let mut id_to_token = HashMap::new();
        let mut max_id: i32 = -1;
        let mut blank_id: Option<i32> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.rsplitn(2, ' ').collect();
            if parts.len() != 2 {
                continue;
            }
            let id: i32 = parts[0]
                .parse()
                .map_err(|_| crate::SttError::Io(format!("failed to parse token id '{}'", parts[0])))?;
            let token = parts[1].to_string();

            if token == "<blk>" || token == "<blank>" {
                blank_id = Some(id);
            }
            max_id = max_id.max(id);
            id_to_token.insert(id, token);
        }

        let vocab_size = (max_id + 1) as usize;
        // If blank wasn't explicitly marked, assume it's the last token in
        // the table (the convention this pipeline's vocabularies use).
        let blank_id = blank_id.unwrap_or(max_id);
        info!(vocab_size, blank_id, "loaded tokenizer");

        Ok(Self {
            id_to_token,
            blank_id,
            vocab_size,
        })
    }

    pub fn blank_id(&self) -> i32 {
        self.blank_id
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn token_str(&self, id: i32) -> Option<&str> {
        self.id_to_token.get(&id).map(|s| s.as_str())
    }

    /// Decode a sequence of token ids to text, skipping blanks, replacing the
    /// word-boundary marker with a space, and trimming the result.
    pub fn decode(&self, tokens: &[i32]) -> String {
        let mut result = String::new();
        for &id in tokens {
            if id == self.blank_id {
                continue;
            }
            if let Some(token) = self.id_to_token.get(&id) {
                result.push_str(&token.replace(WORD_BOUNDARY, " "));
            }
        }
        result.trim().to_string()
    }

    pub fn starts_word(&self, id: i32) -> bool {
        self.id_to_token
            .get(&id)
            .map(|t| t.starts_with(WORD_BOUNDARY))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOCAB: &str = "<unk> 0\n\u{2581}t 1\n\u{2581}th 2\n\u{2581}a 3\nin 4\n\u{2581}the 5\n<blk> 6";

    #[test]
    fn parses_vocab_size_and_blank() {
        let tok = Tokenizer::from_str(VOCAB).unwrap();
        assert_eq!(tok.vocab_size(), 7);
        assert_eq!(tok.blank_id(), 6);
    }

    #[test]
    fn decode_replaces_word_boundary_with_space() {
        let tok = Tokenizer::from_str(VOCAB).unwrap();
        assert_eq!(tok.decode(&[5]), "the");
        assert_eq!(tok.decode(&[3, 4]), "ain");
    }

    #[test]
    fn decode_skips_blank() {
        let tok = Tokenizer::from_str(VOCAB).unwrap();
        assert_eq!(tok.decode(&[1, 6, 5]), "t the");
    }

    #[test]
    fn single_token_round_trip_matches_replace_and_trim_law() {
        let tok = Tokenizer::from_str(VOCAB).unwrap();
        for id in 0..6 {
            if let Some(s) = tok.token_str(id) {
                assert_eq!(tok.decode(&[id]), s.replace('\u{2581}', " ").trim());
            }
        }
    }
}
