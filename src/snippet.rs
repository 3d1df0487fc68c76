//! Highlighted excerpts for search results.
//!
//! Matching is case-insensitive and word based: the best line is the one containing the most
//! distinct query tokens, and the excerpt is the run of `window` words in that line covering the
//! most of them. All slicing happens on whitespace and `char` boundaries, so multi-byte text is
//! never split.

/// Words longer than this are cut (on a char boundary) before rendering.
pub const MAX_WORD_CHARS: usize = 64;
pub const ELLIPSIS: &str = "…";

struct Word<'a> {
    text: &'a str,
    /// Bitmask over the query tokens found in this word.
    hits: u64,
}

/// Return a bounded window of `content` around the best match for `tokens`, wrapping matching
/// words in `**`. With no usable tokens or no match, the opening words of the first non-blank
/// line are returned unhighlighted. Only the first 64 distinct tokens are considered.
pub fn match_snippet<S: AsRef<str>>(content: &str, tokens: &[S], window: usize) -> String {
    let window = window.max(1);
    let mut needles: Vec<String> = Vec::new();
    for token in tokens {
        let needle = token.as_ref().trim().to_lowercase();
        if !needle.is_empty() && !needles.contains(&needle) && needles.len() < 64 {
            needles.push(needle);
        }
    }

    let mut best: Option<(u32, Vec<Word>)> = None;
    if !needles.is_empty() {
        for line in content.lines() {
            let words: Vec<Word> = line
                .split_whitespace()
                .map(|text| Word {
                    text,
                    hits: word_hits(text, &needles),
                })
                .collect();
            let score = words.iter().fold(0u64, |acc, w| acc | w.hits).count_ones();
            if score > 0 && best.as_ref().is_none_or(|(s, _)| score > *s) {
                best = Some((score, words));
            }
        }
    }

    match best {
        Some((_, words)) => {
            let start = best_window(&words, window);
            render(&words, start, window)
        }
        None => {
            let Some(line) = content.lines().find(|l| !l.trim().is_empty()) else {
                return String::new();
            };
            let words: Vec<Word> = line
                .split_whitespace()
                .map(|text| Word { text, hits: 0 })
                .collect();
            render(&words, 0, window)
        }
    }
}

fn word_hits(word: &str, needles: &[String]) -> u64 {
    let lower = word.to_lowercase();
    needles
        .iter()
        .enumerate()
        .filter(|(_, needle)| lower.contains(needle.as_str()))
        .fold(0u64, |acc, (idx, _)| acc | (1u64 << idx))
}

/// Earliest start whose window covers the most distinct tokens.
fn best_window(words: &[Word], window: usize) -> usize {
    let last_start = words.len().saturating_sub(window);
    let mut best = (0u32, 0usize);
    for start in 0..=last_start {
        let end = (start + window).min(words.len());
        let covered = words[start..end]
            .iter()
            .fold(0u64, |acc, w| acc | w.hits)
            .count_ones();
        if covered > best.0 {
            best = (covered, start);
        }
    }
    best.1
}

fn render(words: &[Word], start: usize, window: usize) -> String {
    let end = (start + window).min(words.len());
    let mut parts: Vec<String> = Vec::with_capacity(end - start + 2);
    if start > 0 {
        parts.push(ELLIPSIS.to_string());
    }
    for word in &words[start..end] {
        let text = truncate_chars(word.text, MAX_WORD_CHARS);
        parts.push(if word.hits != 0 {
            highlight(&text)
        } else {
            text
        });
    }
    if end < words.len() {
        parts.push(ELLIPSIS.to_string());
    }
    parts.join(" ")
}

fn truncate_chars(word: &str, max: usize) -> String {
    match word.char_indices().nth(max) {
        Some((idx, _)) => format!("{}{ELLIPSIS}", &word[..idx]),
        None => word.to_string(),
    }
}

/// Bold the alphanumeric core of a word, leaving surrounding punctuation outside the markers.
fn highlight(word: &str) -> String {
    let is_edge = |c: char| !c.is_alphanumeric();
    let lead = word.len() - word.trim_start_matches(is_edge).len();
    let trail = word.len() - word.trim_end_matches(is_edge).len();
    if lead + trail >= word.len() {
        return format!("**{word}**");
    }
    format!(
        "{}**{}**{}",
        &word[..lead],
        &word[lead..word.len() - trail],
        &word[word.len() - trail..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlights_both_tokens_in_window() {
        let snippet = match_snippet("the quick brown fox", &["quick", "fox"], 5);
        assert_eq!(snippet, "the **quick** brown **fox**");
    }

    #[test]
    fn picks_line_with_most_tokens() {
        let content = "a fox alone\n\nthe quick brown fox jumps\nquick only";
        let snippet = match_snippet(content, &["QUICK", "fox"], 3);
        assert_eq!(snippet, "… **quick** brown **fox** …");
    }

    #[test]
    fn multibyte_text_is_never_split() {
        let snippet = match_snippet("día más rápido ünïcode", &["rápido"], 2);
        assert_eq!(snippet, "… más **rápido** …");
        let cjk = "漢".repeat(100);
        let long = match_snippet(&format!("{cjk} 字"), &["字"], 2);
        assert!(long.ends_with("**字**"));
        assert!(long.starts_with(&"漢".repeat(MAX_WORD_CHARS)));
    }

    #[test]
    fn punctuation_stays_outside_markers() {
        let snippet = match_snippet("(fox), said the heron.", &["fox", "heron"], 4);
        assert_eq!(snippet, "(**fox**), said the **heron**.");
    }

    #[test]
    fn falls_back_to_opening_words() {
        let content = "\n  \nfirst line of text here\nsecond";
        assert_eq!(match_snippet(content, &["absent"], 3), "first line of …");
        assert_eq!(match_snippet(content, &[" "], 10), "first line of text here");
        assert_eq!(match_snippet("", &["x"], 3), "");
    }
}
