//! Sliding-window chunking over whitespace-normalized text.
//!
//! Offsets count characters of the normalized text, so `end - start` always equals the
//! character length of the chunk text.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDraft {
    pub chunk_idx: u32,
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// Nearest Markdown heading at or before `start`; empty when there is none.
    pub section: String,
}

struct Normalized {
    text: String,
    /// (char offset in `text`, heading title), ascending.
    headings: Vec<(usize, String)>,
}

fn heading_title(line: &str) -> Option<&str> {
    let t = line.trim_start();
    let level = t.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &t[level..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim();
    (!title.is_empty()).then_some(title)
}

// Every whitespace run becomes one space; headings are recorded as we go.
fn normalize(raw: &str) -> Normalized {
    let mut text = String::with_capacity(raw.len());
    let mut chars = 0usize;
    let mut headings = Vec::new();

    for line in raw.lines() {
        let mut words = line.split_whitespace().peekable();
        if words.peek().is_none() {
            continue;
        }
        if chars > 0 {
            text.push(' ');
            chars += 1;
        }
        if let Some(title) = heading_title(line) {
            headings.push((chars, title.to_string()));
        }
        let mut first = true;
        for w in words {
            if !first {
                text.push(' ');
                chars += 1;
            }
            text.push_str(w);
            chars += w.chars().count();
            first = false;
        }
    }
    Normalized { text, headings }
}

fn section_at(headings: &[(usize, String)], offset: usize) -> String {
    let idx = headings.partition_point(|(pos, _)| *pos <= offset);
    if idx == 0 {
        String::new()
    } else {
        headings[idx - 1].1.clone()
    }
}

/// Split one document into overlapping windows of `chunk_chars` characters.
///
/// `overlap` is clamped below `chunk_chars` so the window always advances.
pub fn chunk_document(raw: &str, chunk_chars: usize, overlap: usize) -> Vec<ChunkDraft> {
    if chunk_chars == 0 {
        return Vec::new();
    }
    let overlap = overlap.min(chunk_chars - 1);
    let norm = normalize(raw);
    let chars: Vec<char> = norm.text.chars().collect();
    let n = chars.len();

    let mut out = Vec::new();
    let mut start = 0usize;
    while start < n {
        let end = (start + chunk_chars).min(n);
        let window = &chars[start..end];
        let lead = window.iter().take_while(|c| c.is_whitespace()).count();
        let trail = window[lead..].iter().rev().take_while(|c| c.is_whitespace()).count();
        let s = start + lead;
        let e = end - trail;
        if s < e {
            out.push(ChunkDraft {
                chunk_idx: out.len() as u32,
                start: s,
                end: e,
                text: chars[s..e].iter().collect(),
                section: section_at(&norm.headings, s),
            });
        }
        if end >= n {
            break;
        }
        start = end - overlap;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_whitespace_runs() {
        let chunks = chunk_document("  alpha \t beta\n\n\ngamma  ", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "alpha beta gamma");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 16));
    }

    #[test]
    fn windows_overlap_and_offsets_match_length() {
        let text = (0..400).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = chunk_document(&text, 300, 50);
        assert!(chunks.len() > 3);
        for c in &chunks {
            assert_eq!(c.end - c.start, c.text.chars().count());
            assert!(c.text.chars().count() <= 300);
        }
        for pair in chunks.windows(2) {
            assert!(pair[1].start > pair[0].start);
            assert!(pair[0].end.saturating_sub(pair[1].start) <= 50);
        }
        assert_eq!(chunks.last().unwrap().end, text.chars().count());
    }

    #[test]
    fn sections_follow_headings() {
        let doc = "# Encryption\nData is encrypted at rest.\n## Key Management\nKeys rotate yearly.";
        let chunks = chunk_document(doc, 20, 5);
        assert_eq!(chunks[0].section, "Encryption");
        let last = chunks.last().unwrap();
        assert_eq!(last.section, "Key Management");
    }

    #[test]
    fn blank_document_has_no_chunks() {
        assert!(chunk_document(" \n\t\n", 100, 10).is_empty());
        assert!(chunk_document("text", 0, 0).is_empty());
    }

    #[test]
    fn hashtags_are_not_headings() {
        assert_eq!(heading_title("#tag"), None);
        assert_eq!(heading_title("### Access ###"), Some("Access"));
        assert_eq!(heading_title("####### seven"), None);
    }
}
