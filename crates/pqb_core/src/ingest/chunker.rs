use crate::config::{validate_chunking, ChunkingConfig};
use crate::domain::{chunk_id_for, Chunk};
use crate::error::AppError;

/// Fixed-size, overlapping token windows over whitespace-separated tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    window_tokens: usize,
    overlap_tokens: usize,
}

/// One window produced by [`Chunker::chunk`]. `start..end` is the token span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkWindow {
    pub index: u32,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl ChunkWindow {
    pub fn into_chunk(self, paper_id: &str) -> Chunk {
        Chunk {
            chunk_id: chunk_id_for(paper_id, self.index),
            paper_id: paper_id.to_string(),
            index: self.index,
            start: self.start,
            end: self.end,
            text: self.text,
        }
    }
}

impl Chunker {
    pub fn new(window_tokens: usize, overlap_tokens: usize) -> Result<Self, AppError> {
        validate_chunking(window_tokens, overlap_tokens)?;
        Ok(Self {
            window_tokens,
            overlap_tokens,
        })
    }

    pub fn from_config(cfg: &ChunkingConfig) -> Result<Self, AppError> {
        Self::new(cfg.window_tokens, cfg.overlap_tokens)
    }

    pub fn window_tokens(&self) -> usize {
        self.window_tokens
    }

    pub fn overlap_tokens(&self) -> usize {
        self.overlap_tokens
    }

    /// Tokens the window advances between consecutive chunks.
    pub fn step(&self) -> usize {
        self.window_tokens - self.overlap_tokens
    }

    /// Lazily yield the windows of `text`. Each call starts from scratch.
    pub fn chunk<'a>(&self, text: &'a str) -> ChunkWindows<'a> {
        let tokens: Vec<&'a str> = text.split_whitespace().collect();
        let next_start = if tokens.is_empty() { None } else { Some(0) };
        ChunkWindows {
            tokens,
            window: self.window_tokens,
            step: self.step(),
            next_start,
            index: 0,
        }
    }

    pub fn chunk_paper(&self, paper_id: &str, text: &str) -> Vec<Chunk> {
        self.chunk(text).map(|w| w.into_chunk(paper_id)).collect()
    }
}

/// Convenience form of [`Chunker::new`] + [`Chunker::chunk`].
pub fn chunk(
    document_text: &str,
    window_tokens: usize,
    overlap_tokens: usize,
) -> Result<ChunkWindows<'_>, AppError> {
    Ok(Chunker::new(window_tokens, overlap_tokens)?.chunk(document_text))
}

#[derive(Debug, Clone)]
pub struct ChunkWindows<'a> {
    tokens: Vec<&'a str>,
    window: usize,
    step: usize,
    next_start: Option<usize>,
    index: u32,
}

impl Iterator for ChunkWindows<'_> {
    type Item = ChunkWindow;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_start?;
        let end = (start + self.window).min(self.tokens.len());
        // The last window is the one that reaches the end of the token stream.
        self.next_start = if end >= self.tokens.len() {
            None
        } else {
            Some(start + self.step)
        };

        let window = ChunkWindow {
            index: self.index,
            start,
            end,
            text: self.tokens[start..end].join(" "),
        };
        self.index += 1;
        Some(window)
    }
}

impl std::iter::FusedIterator for ChunkWindows<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::INVALID_CONFIGURATION;

    fn numbered_tokens(n: usize) -> String {
        (0..n).map(|i| format!("t{i}")).collect::<Vec<_>>().join(" ")
    }

    fn spans(text: &str, window: usize, overlap: usize) -> Vec<(usize, usize)> {
        chunk(text, window, overlap)
            .unwrap()
            .map(|w| (w.start, w.end))
            .collect()
    }

    #[test]
    fn seven_hundred_tokens_yield_three_windows() {
        let text = numbered_tokens(700);
        assert_eq!(spans(&text, 300, 60), vec![(0, 300), (240, 540), (480, 700)]);
    }

    #[test]
    fn chunking_is_deterministic_and_restartable() {
        let text = numbered_tokens(1234);
        let chunker = Chunker::new(300, 60).unwrap();
        let a: Vec<ChunkWindow> = chunker.chunk(&text).collect();
        let b: Vec<ChunkWindow> = chunker.chunk(&text).collect();
        assert_eq!(a, b);
        assert_eq!(a.iter().map(|w| w.index).collect::<Vec<_>>(), (0..a.len() as u32).collect::<Vec<_>>());
    }

    #[test]
    fn consecutive_windows_share_exactly_the_overlap() {
        let text = numbered_tokens(1000);
        let windows: Vec<ChunkWindow> = chunk(&text, 100, 25).unwrap().collect();
        for pair in windows.windows(2) {
            let left: Vec<&str> = pair[0].text.split(' ').collect();
            let right: Vec<&str> = pair[1].text.split(' ').collect();
            assert_eq!(left[left.len() - 25..], right[..25]);
        }
    }

    #[test]
    fn exact_fit_produces_no_empty_tail() {
        // 540 tokens: the second window ends exactly at the end of the text.
        let text = numbered_tokens(540);
        assert_eq!(spans(&text, 300, 60), vec![(0, 300), (240, 540)]);
        let short = numbered_tokens(10);
        assert_eq!(spans(&short, 300, 60), vec![(0, 10)]);
        assert!(spans("   ", 300, 60).is_empty());
    }

    #[test]
    fn rejects_invalid_parameters() {
        for (w, o) in [(300, 300), (60, 300), (0, 0), (300, 0)] {
            let err = Chunker::new(w, o).unwrap_err();
            assert_eq!(err.code, INVALID_CONFIGURATION);
        }
    }

    #[test]
    fn chunk_paper_assigns_padded_ids() {
        let chunks = Chunker::new(4, 1).unwrap().chunk_paper("paper-a", "a b c d e f g");
        let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["paper-a_chunk_0000", "paper-a_chunk_0001"]);
        assert_eq!(chunks[1].text, "d e f g");
    }
}
