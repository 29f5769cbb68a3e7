use crate::error::IngestError;
use regex::Regex;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    /// Tokens per window.
    pub chunk_size: usize,
    /// Tokens shared between consecutive windows.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 300,
            overlap: 100,
        }
    }
}

/// Normalizes extracted page text before chunking or indexing.
///
/// Joins words split by a hyphenated line break, folds single embedded
/// newlines into spaces while keeping paragraph breaks (runs of blank lines
/// collapse to one newline), and squeezes horizontal whitespace.
pub fn clean_text(text: &str) -> Result<String, IngestError> {
    let hyphen_break = Regex::new(r"(\w+)-\n(\w+)")?;
    let paragraph_break = Regex::new(r"\n{2,}")?;
    let horizontal_space = Regex::new(r"[ \t]+")?;

    let text = hyphen_break.replace_all(text, "$1$2");
    // Paragraph boundaries must survive the single-newline fold below, so
    // they are parked on a sentinel byte first.
    let text = paragraph_break.replace_all(&text, "\u{1}");
    let text = text.replace('\n', " ");
    let text = text.replace('\u{1}', "\n");
    let text = horizontal_space.replace_all(&text, " ");

    Ok(text.trim().to_string())
}

/// Splits `text` into overlapping windows of `chunk_size` whitespace tokens.
///
/// The window start advances by `chunk_size - overlap` tokens per step, so
/// every chunk except the last holds exactly `chunk_size` tokens and shares
/// `overlap` tokens with its predecessor. Empty input yields no chunks.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    if config.overlap == 0 || config.overlap >= config.chunk_size {
        return Err(IngestError::InvalidParameter(format!(
            "overlap must satisfy 0 < overlap < chunk_size, got chunk_size={} overlap={}",
            config.chunk_size, config.overlap
        )));
    }

    let cleaned = clean_text(text)?;
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let step = config.chunk_size - config.overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < tokens.len() {
        let end = (start + config.chunk_size).min(tokens.len());
        chunks.push(tokens[start..end].join(" "));
        if end == tokens.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            overlap,
        }
    }

    #[test]
    fn hyphenated_line_breaks_are_joined() {
        let cleaned = clean_text("an exam-\nple of a split word").unwrap();
        assert_eq!(cleaned, "an example of a split word");
    }

    #[test]
    fn single_newlines_become_spaces_but_paragraphs_survive() {
        let cleaned = clean_text("first line\nsecond line\n\n\nnext paragraph").unwrap();
        assert_eq!(cleaned, "first line second line\nnext paragraph");
    }

    #[test]
    fn horizontal_whitespace_collapses() {
        let cleaned = clean_text("  spaced\t\tout   text  ").unwrap();
        assert_eq!(cleaned, "spaced out text");
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let chunks = chunk_text("", config(300, 100)).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn short_input_yields_a_single_chunk() {
        let chunks = chunk_text("a b c", config(300, 100)).unwrap();
        assert_eq!(chunks, vec!["a b c".to_string()]);
    }

    #[test]
    fn zero_overlap_is_rejected() {
        let result = chunk_text("some text", config(300, 0));
        assert!(matches!(result, Err(IngestError::InvalidParameter(_))));
    }

    #[test]
    fn overlap_at_or_above_chunk_size_is_rejected() {
        assert!(matches!(
            chunk_text("some text", config(100, 100)),
            Err(IngestError::InvalidParameter(_))
        ));
        assert!(matches!(
            chunk_text("some text", config(100, 150)),
            Err(IngestError::InvalidParameter(_))
        ));
    }

    #[test]
    fn thousand_tokens_produce_five_overlapping_windows() {
        let text = (0..1000).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = chunk_text(&text, config(300, 100)).unwrap();

        let sizes: Vec<usize> = chunks
            .iter()
            .map(|chunk| chunk.split_whitespace().count())
            .collect();
        assert_eq!(sizes, vec![300, 300, 300, 300, 200]);

        // Window starts advance by chunk_size - overlap.
        assert!(chunks[1].starts_with("w200 "));
        assert!(chunks[4].starts_with("w800 "));
    }

    #[test]
    fn overlap_stripped_concatenation_reconstructs_the_input() {
        let tokens: Vec<String> = (0..500).map(|i| format!("t{i}")).collect();
        let text = tokens.join(" ");
        let chunks = chunk_text(&text, config(120, 40)).unwrap();

        let mut reconstructed: Vec<String> = Vec::new();
        for (position, chunk) in chunks.iter().enumerate() {
            let skip = if position == 0 { 0 } else { 40 };
            reconstructed.extend(chunk.split_whitespace().skip(skip).map(str::to_string));
        }
        assert_eq!(reconstructed, tokens);
    }

    #[test]
    fn every_chunk_except_the_last_is_full_size() {
        let text = (0..730).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = chunk_text(&text, config(200, 50)).unwrap();

        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(chunk.split_whitespace().count(), 200);
        }
        let last = chunks.last().unwrap().split_whitespace().count();
        assert!(last >= 1 && last <= 200);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let first = chunk_text(text, config(4, 2)).unwrap();
        let second = chunk_text(text, config(4, 2)).unwrap();
        assert_eq!(first, second);
    }
}
