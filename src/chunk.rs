//! Overlapping-window text chunker.
//!
//! Splits page text into chunks of at most `chunk_size` characters with a
//! trailing overlap of exactly `overlap` characters between consecutive
//! chunks. Within each window the cut prefers a paragraph boundary, then a
//! sentence boundary, then a line or word boundary, falling back to a hard
//! character cut; the next chunk always starts `overlap` characters before
//! the previous cut, so the overlap length is exact regardless of where the
//! boundary landed and the chunks fully cover the source text.

use crate::models::DocumentChunk;

/// Cut-point candidates, in preference order. The separator stays at the
/// end of the earlier chunk.
const BREAKS: [&str; 4] = ["\n\n", ". ", "\n", " "];

/// Split `text` into overlapping chunks. `overlap` must be smaller than
/// `chunk_size` (enforced at config load). Counts are in characters, not
/// bytes, so multibyte text never splits inside a code point.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    debug_assert!(overlap < chunk_size);

    if text.is_empty() {
        return Vec::new();
    }

    // Byte offset of each char boundary; offsets[n] == text.len().
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    offsets.push(text.len());
    let n = offsets.len() - 1;

    if n <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let hard_end = (start + chunk_size).min(n);
        let end = if hard_end == n {
            n
        } else {
            find_cut(text, &offsets, start, hard_end, overlap)
        };

        chunks.push(text[offsets[start]..offsets[end]].to_string());

        if end == n {
            break;
        }
        start = end - overlap;
    }

    chunks
}

/// Find the cut point (char index) for the window `[start, hard_end)`,
/// preferring the latest boundary that still advances past the overlap.
fn find_cut(text: &str, offsets: &[usize], start: usize, hard_end: usize, overlap: usize) -> usize {
    let window = &text[offsets[start]..offsets[hard_end]];

    for sep in BREAKS {
        if let Some(pos) = window.rfind(sep) {
            let cut_byte = offsets[start] + pos + sep.len();
            // Separators are ASCII, so cut_byte is a char boundary.
            let cut = match offsets.binary_search(&cut_byte) {
                Ok(i) => i,
                Err(_) => continue,
            };
            // The next chunk starts at cut - overlap; require forward progress.
            if cut > start + overlap {
                return cut;
            }
        }
    }

    hard_end
}

/// Chunk a page-tagged document. Pages are chunked independently (a chunk
/// never spans pages), whitespace-only pages are skipped, and pages are
/// numbered from 1.
pub fn chunk_pages(pages: &[String], chunk_size: usize, overlap: usize) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();
    for (page_idx, page) in pages.iter().enumerate() {
        if page.trim().is_empty() {
            continue;
        }
        for text in split_text(page, chunk_size, overlap) {
            chunks.push(DocumentChunk {
                text,
                page: page_idx as u32 + 1,
                index: chunks.len(),
            });
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_count(s: &str) -> usize {
        s.chars().count()
    }

    fn sample_text(paragraphs: usize) -> String {
        (0..paragraphs)
            .map(|i| format!("Paragraph {} talks about topic {}. It has two sentences.", i, i))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_text("Hello, world!", 500, 50);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_text("", 500, 50).is_empty());
    }

    #[test]
    fn chunks_respect_size_limit() {
        let text = sample_text(40);
        for chunk in split_text(&text, 500, 50) {
            assert!(char_count(&chunk) <= 500, "chunk too long: {}", char_count(&chunk));
        }
    }

    #[test]
    fn consecutive_chunks_overlap_exactly() {
        let text = sample_text(40);
        let chunks = split_text(&text, 500, 50);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let tail: String = pair[0]
                .chars()
                .skip(char_count(&pair[0]) - 50)
                .collect();
            let head: String = pair[1].chars().take(50).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn post_overlap_suffixes_reconstruct_the_text() {
        let text = sample_text(40);
        let chunks = split_text(&text, 500, 50);
        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.chars().skip(50));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn cuts_prefer_paragraph_boundaries() {
        let text = sample_text(40);
        let chunks = split_text(&text, 500, 50);
        assert!(chunks[0].ends_with("\n\n"));
    }

    #[test]
    fn hard_cut_when_no_boundary_exists() {
        let text: String = std::iter::repeat('x').take(1200).collect();
        let chunks = split_text(&text, 500, 50);
        assert!(chunks.len() > 1);
        assert_eq!(char_count(&chunks[0]), 500);
        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.chars().skip(50));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text: String = std::iter::repeat("héllo wörld 日本語 ").take(80).collect();
        let chunks = split_text(&text, 500, 50);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(char_count(chunk) <= 500);
        }
        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.chars().skip(50));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn pages_are_numbered_from_one_and_blank_pages_skipped() {
        let pages = vec![
            "First page text.".to_string(),
            "   ".to_string(),
            "Third page text.".to_string(),
        ];
        let chunks = chunk_pages(&pages, 500, 50);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[1].page, 3);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[1].index, 1);
    }
}
