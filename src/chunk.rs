//! Fixed-window overlapping text chunker.
//!
//! Splits extracted document text into retrieval-sized spans. Windows are
//! measured in characters (not bytes), so slicing is safe on any UTF-8
//! input. Consecutive chunks share `overlap` characters so that sentences
//! cut by a window boundary stay retrievable from at least one chunk.
//!
//! Chunk ids are derived from the document's partition and sequence index,
//! never from random state: re-ingesting an unchanged document produces the
//! same ids and overwrites in place.

/// Minimum trimmed length worth chunking. Shorter inputs are noise
/// (empty exports, decorative pages) rather than errors.
const MIN_TEXT_CHARS: usize = 10;

/// Split `text` into windows of `window` characters, each starting
/// `window - overlap` characters after the previous one. Slices are
/// trimmed; slices that are empty after trimming are dropped.
///
/// `overlap` must be smaller than `window` (validated at config load).
pub fn chunk_text(text: &str, window: usize, overlap: usize) -> Vec<String> {
    if text.trim().chars().count() < MIN_TEXT_CHARS {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let step = window - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + window).min(chars.len());
        let slice: String = chars[start..end].iter().collect();
        let trimmed = slice.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        start += step;
    }

    chunks
}

/// Deterministic chunk id: `{BRANCH}_{year}_{file-ref}_{index}`.
///
/// `file_ref` is the external file id when known, else the filename.
pub fn chunk_id(branch: &str, year: u8, file_ref: &str, index: usize) -> String {
    format!("{}_{}_{}_{}", branch.to_uppercase(), year, file_ref, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_yields_no_chunks() {
        assert!(chunk_text("tiny", 500, 50).is_empty());
        assert!(chunk_text("   \n  ", 500, 50).is_empty());
        assert!(chunk_text("", 500, 50).is_empty());
    }

    #[test]
    fn single_window_text_is_one_chunk() {
        let text = "a".repeat(300);
        let chunks = chunk_text(&text, 500, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn consecutive_chunks_start_one_stride_apart() {
        // Distinct characters at every position let us locate each chunk's
        // start in the source.
        let text: String = (0..1200)
            .map(|i| char::from_u32('a' as u32 + (i % 26) as u32).unwrap())
            .collect();
        let chunks = chunk_text(&text, 500, 50);
        let source: Vec<char> = text.chars().collect();

        for (i, chunk) in chunks.iter().enumerate() {
            let expected_start = i * 450;
            let expected: String = source
                [expected_start..(expected_start + 500).min(source.len())]
                .iter()
                .collect();
            assert_eq!(chunk, &expected, "chunk {} misaligned", i);
        }
    }

    #[test]
    fn overlapping_heads_reconstruct_the_source() {
        // No whitespace anywhere, so trimming is a no-op and the coverage
        // property holds exactly.
        let text: String = "abcdefghij".repeat(173);
        let chunks = chunk_text(&text, 500, 50);
        assert!(chunks.len() > 1);

        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            let tail: String = chunk.chars().skip(50).collect();
            rebuilt.push_str(&tail);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn final_chunk_may_be_short() {
        let text = "x".repeat(700);
        let chunks = chunk_text(&text, 500, 50);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 500);
        // Second window covers chars 450..700.
        assert_eq!(chunks[1].len(), 250);
    }

    #[test]
    fn all_whitespace_window_is_dropped() {
        let mut text = "x".repeat(500);
        text.push_str(&" ".repeat(450));
        let chunks = chunk_text(&text, 500, 50);
        // Window at 900 is whitespace only and must not appear.
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
    }

    #[test]
    fn multibyte_text_does_not_split_mid_character() {
        let text = "課程表データ".repeat(120);
        let chunks = chunk_text(&text, 500, 50);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 500);
        }
    }

    #[test]
    fn ids_are_stable_and_partition_scoped() {
        assert_eq!(chunk_id("cse", 2, "file-9", 0), "CSE_2_file-9_0");
        assert_eq!(
            chunk_id("CSE", 2, "file-9", 3),
            chunk_id("CSE", 2, "file-9", 3)
        );
        assert_ne!(chunk_id("CSE", 2, "f", 0), chunk_id("ECE", 2, "f", 0));
    }
}
