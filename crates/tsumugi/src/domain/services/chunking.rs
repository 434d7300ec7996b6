//! Word-window chunking for document ingestion

use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 300;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub index: i32,
    pub content: String,
}

/// Split `text` into windows of `size` words, each sharing `overlap` words
/// with the previous one. The final window ends at the last word.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<TextChunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + size).min(words.len());
        chunks.push(TextChunk {
            index: chunks.len() as i32,
            content: words[start..end].join(" "),
        });
        if end == words.len() {
            break;
        }
        // Always advance, even when overlap >= size
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunk_text("", 300, 50).is_empty());
        assert!(chunk_text(" \n\t ", 300, 50).is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunk_text("alpha   beta\ngamma", 300, 50);
        assert_eq!(
            chunks,
            vec![TextChunk {
                index: 0,
                content: "alpha beta gamma".to_string()
            }]
        );
    }

    #[test]
    fn test_windows_overlap() {
        let chunks = chunk_text(&words(10), 4, 1);
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["w0 w1 w2 w3", "w3 w4 w5 w6", "w6 w7 w8 w9"]
        );
        assert_eq!(chunks[2].index, 2);
    }

    #[test]
    fn test_overlap_not_smaller_than_size_still_terminates() {
        let chunks = chunk_text(&words(5), 2, 5);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.last().unwrap().content, "w3 w4");
    }

    #[test]
    fn test_default_window() {
        let chunks = chunk_text(&words(600), DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].content.starts_with("w250 "));
        assert!(chunks[2].content.ends_with(" w599"));
    }
}
