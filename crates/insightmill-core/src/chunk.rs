//! Splits transcript text into bounded chunks for per-chunk model calls.
//!
//! Chunks are contiguous slices of the input: concatenating them in order
//! reproduces the original text exactly.

/// Sentence-ending markers, in preference order.
const SENTENCE_MARKERS: [&str; 6] = [". ", ".\n", "? ", "?\n", "! ", "!\n"];

const PARAGRAPH_BREAK: &str = "\n\n";

/// A boundary is only taken past this fraction of the size cap, so chunks
/// do not collapse to tiny fragments when markers cluster early.
const MIN_BREAK_NUMERATOR: usize = 7;
const MIN_BREAK_DENOMINATOR: usize = 10;

/// Lazy iterator over bounded chunks of `text`.
///
/// Each chunk holds at most `max_chars` characters, except when the
/// paragraph spanning the cap has no usable break inside the window; that
/// paragraph is then emitted whole rather than cut mid-sentence. Text with
/// no boundary of any kind ahead is hard-cut at the cap.
pub struct Chunker<'a> {
    text: &'a str,
    max_chars: usize,
    pos: usize,
}

impl<'a> Chunker<'a> {
    pub fn new(text: &'a str, max_chars: usize) -> Self {
        assert!(max_chars > 0, "chunk size must be positive");
        Self {
            text,
            max_chars,
            pos: 0,
        }
    }
}

/// Byte offset of the `chars`-th character of `s`, or `None` when `s` has
/// fewer characters.
fn byte_offset_of_char(s: &str, chars: usize) -> Option<usize> {
    s.char_indices().nth(chars).map(|(i, _)| i)
}

/// Last boundary in `window` ending at or after `min_bytes`, preferring a
/// paragraph break over sentence markers. Returns the byte offset just past
/// the boundary marker.
fn last_boundary_past(window: &str, min_bytes: usize) -> Option<usize> {
    if let Some(i) = window.rfind(PARAGRAPH_BREAK) {
        if i >= min_bytes {
            return Some(i + PARAGRAPH_BREAK.len());
        }
    }
    for marker in SENTENCE_MARKERS {
        if let Some(i) = window.rfind(marker) {
            if i >= min_bytes {
                return Some(i + marker.len());
            }
        }
    }
    None
}

impl<'a> Iterator for Chunker<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let rest = &self.text[self.pos..];
        if rest.is_empty() {
            return None;
        }

        let end = match byte_offset_of_char(rest, self.max_chars) {
            // Remainder fits in one chunk.
            None => rest.len(),
            Some(window_end) => {
                let window = &rest[..window_end];
                let min_bytes = byte_offset_of_char(
                    rest,
                    self.max_chars * MIN_BREAK_NUMERATOR / MIN_BREAK_DENOMINATOR,
                )
                .unwrap_or(window_end);

                match last_boundary_past(window, min_bytes) {
                    Some(cut) => cut,
                    // No usable break inside the window: run on to the end
                    // of the paragraph spanning the cap, or hard-cut at the
                    // cap when no paragraph break exists ahead either.
                    None => match rest[window_end..].find(PARAGRAPH_BREAK) {
                        Some(j) => window_end + j + PARAGRAPH_BREAK.len(),
                        None => window_end,
                    },
                }
            }
        };

        self.pos += end;
        Some(&rest[..end])
    }
}

/// Convenience wrapper collecting the chunk sequence into owned strings.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    Chunker::new(text, max_chars)
        .map(|c| c.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(sentences: usize, word: &str) -> String {
        let sentence = format!("{} and again. ", word.repeat(8));
        sentence.repeat(sentences).trim_end().to_string()
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split_chunks("", 100).is_empty());
    }

    #[test]
    fn short_input_is_a_single_chunk() {
        let text = "One short paragraph.";
        assert_eq!(split_chunks(text, 100), vec![text.to_string()]);
    }

    #[test]
    fn concatenation_round_trips_exactly() {
        let text = format!(
            "{}\n\n{}\n\n{}",
            paragraph(20, "alpha"),
            paragraph(30, "beta"),
            paragraph(25, "gamma")
        );
        for max in [80, 200, 500, 5_000] {
            let chunks = split_chunks(&text, max);
            assert_eq!(chunks.concat(), text, "round trip failed for max={max}");
        }
    }

    #[test]
    fn chunks_respect_size_cap_when_breaks_exist() {
        let text = paragraph(100, "delta");
        let max = 300;
        for chunk in split_chunks(&text, max) {
            assert!(
                chunk.chars().count() <= max,
                "chunk of {} chars exceeds cap {max}",
                chunk.chars().count()
            );
        }
    }

    #[test]
    fn breaks_prefer_paragraph_boundaries() {
        let first = paragraph(3, "echo");
        let second = paragraph(3, "foxtrot");
        let text = format!("{first}\n\n{second}");
        // Cap slightly larger than the first paragraph so the break lands
        // past the 70% floor.
        let max = first.chars().count() + 10;
        let chunks = split_chunks(&text, max);
        assert_eq!(chunks[0], format!("{first}\n\n"));
    }

    #[test]
    fn unbreakable_paragraph_is_emitted_whole() {
        let giant = "x".repeat(1_000);
        let text = format!("{giant}\n\nshort tail.");
        let chunks = split_chunks(&text, 100);
        assert_eq!(chunks[0], format!("{giant}\n\n"));
        assert_eq!(chunks[1], "short tail.");
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn markerless_text_is_hard_cut_at_the_cap() {
        let text = "x".repeat(1_000);
        let chunks = split_chunks(&text, 100);
        assert_eq!(chunks.len(), 10);
        assert!(chunks.iter().all(|c| c.chars().count() == 100));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let sentence = "这是一个用来验证多字节安全的句子。";
        let text = sentence.repeat(50);
        let chunks = split_chunks(&text, 40);
        assert_eq!(chunks.concat(), text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 40);
        }
    }

    #[test]
    fn sentence_marker_used_when_no_paragraph_break_fits() {
        let text = paragraph(40, "golf");
        let chunks = split_chunks(&text, 200);
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(
                chunk.ends_with(". "),
                "expected sentence boundary, got {:?}",
                &chunk[chunk.len().saturating_sub(10)..]
            );
        }
    }
}
