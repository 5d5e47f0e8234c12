//! Sentence-respecting text segmentation
//!
//! Splits an utterance into backend-sized segments without ever losing a
//! character: concatenating the returned segments reproduces the input
//! exactly, which the offset math downstream depends on. Break points are
//! preferred in order: sentence punctuation followed by whitespace, clause
//! punctuation followed by whitespace, plain whitespace, hard character cut.
//! All offsets are in characters, not bytes.

/// A contiguous slice of the utterance sized for one backend request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    /// Character offset of the segment's first character in the utterance
    pub offset: usize,
}

impl Segment {
    /// Length in characters (not bytes)
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// `{word, offset}` pair used by the position estimator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordIndexEntry {
    pub word: String,
    /// Character offset of the word within its segment
    pub offset: usize,
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…' | '。' | '！' | '？')
}

fn is_clause_break(c: char) -> bool {
    matches!(c, ',' | ';' | ':' | '、' | '，' | '；' | '：')
}

/// Split `text` into segments of at most `max_chars` characters.
///
/// The only segments allowed to reach exactly `max_chars` via a hard cut are
/// ones containing a single unbreakable run longer than the limit. Pure
/// function; chunking happens once per `speak` call against whichever
/// backend is active at that moment.
pub fn chunk(text: &str, max_chars: usize) -> Vec<Segment> {
    let max = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    let mut segments = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let remaining = chars.len() - pos;
        if remaining <= max {
            segments.push(Segment {
                text: chars[pos..].iter().collect(),
                offset: pos,
            });
            break;
        }

        let window = &chars[pos..pos + max];
        let cut = find_break(window).unwrap_or(max);
        segments.push(Segment {
            text: window[..cut].iter().collect(),
            offset: pos,
        });
        pos += cut;
    }

    segments
}

/// Best cut length within a full-sized window, or `None` for a hard cut.
fn find_break(window: &[char]) -> Option<usize> {
    let mut clause_cut = None;
    let mut sentence_cut = None;
    for j in 0..window.len() - 1 {
        if window[j + 1].is_whitespace() {
            if is_sentence_end(window[j]) {
                // Include the trailing whitespace in the current segment.
                sentence_cut = Some(j + 2);
            } else if is_clause_break(window[j]) {
                clause_cut = Some(j + 2);
            }
        }
    }
    if sentence_cut.is_some() {
        return sentence_cut;
    }
    if clause_cut.is_some() {
        return clause_cut;
    }

    window
        .iter()
        .rposition(|c| c.is_whitespace())
        .map(|j| j + 1)
}

/// Build the per-segment word offset table.
pub fn word_index(segment_text: &str) -> Vec<WordIndexEntry> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut word_start = 0;

    for (i, c) in segment_text.chars().enumerate() {
        if c.is_whitespace() {
            if !current.is_empty() {
                entries.push(WordIndexEntry {
                    word: std::mem::take(&mut current),
                    offset: word_start,
                });
            }
        } else {
            if current.is_empty() {
                word_start = i;
            }
            current.push(c);
        }
    }
    if !current.is_empty() {
        entries.push(WordIndexEntry {
            word: current,
            offset: word_start,
        });
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(segments: &[Segment]) -> String {
        segments.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn test_concatenation_is_lossless() {
        let texts = [
            "One sentence. Another sentence follows! A third? Yes.",
            "No punctuation here just a very long run of plain words over and over again",
            "短い文です。もっと長い文が続きます。終わり。",
            "word",
            "",
            "trailing space ",
        ];
        for text in texts {
            for max in [1, 7, 20, 1000] {
                assert_eq!(join(&chunk(text, max)), text, "text={text:?} max={max}");
            }
        }
    }

    #[test]
    fn test_segment_length_bound() {
        let text = "Alpha beta gamma. Delta epsilon zeta, eta theta iota kappa lambda mu.";
        for max in [5, 12, 30] {
            for segment in chunk(text, max) {
                assert!(segment.char_len() <= max);
            }
        }
    }

    #[test]
    fn test_unbreakable_run_is_hard_cut_at_limit() {
        let text = "a".repeat(25);
        let segments = chunk(&text, 10);
        assert_eq!(segments[0].char_len(), 10);
        assert_eq!(segments[1].char_len(), 10);
        assert_eq!(segments[2].char_len(), 5);
        assert_eq!(join(&segments), text);
    }

    #[test]
    fn test_sentence_break_preferred_over_later_space() {
        // Window of 9 chars covers "Aaa. Bbb "; the sentence break at
        // position 3 wins over the later plain space.
        let segments = chunk("Aaa. Bbb ccc", 9);
        assert_eq!(segments[0].text, "Aaa. ");
        assert_eq!(segments[1].text, "Bbb ccc");
    }

    #[test]
    fn test_clause_break_preferred_over_plain_space() {
        let segments = chunk("aa, bb cc dd", 10);
        assert_eq!(segments[0].text, "aa, ");
    }

    #[test]
    fn test_offsets_are_global_character_positions() {
        let segments = chunk("First sentence. Second one here.", 16);
        assert_eq!(segments[0].offset, 0);
        let mut expected = 0;
        for segment in &segments {
            assert_eq!(segment.offset, expected);
            expected += segment.char_len();
        }
    }

    #[test]
    fn test_empty_text_yields_no_segments() {
        assert!(chunk("", 100).is_empty());
    }

    #[test]
    fn test_word_index_offsets() {
        let entries = word_index("Hello brave  world");
        assert_eq!(
            entries,
            vec![
                WordIndexEntry { word: "Hello".into(), offset: 0 },
                WordIndexEntry { word: "brave".into(), offset: 6 },
                WordIndexEntry { word: "world".into(), offset: 13 },
            ]
        );
    }

    #[test]
    fn test_word_index_empty_and_whitespace_only() {
        assert!(word_index("").is_empty());
        assert!(word_index("   ").is_empty());
    }
}
