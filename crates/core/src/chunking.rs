use crate::error::IngestError;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: 256,
            overlap: 40,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "window size must be positive".to_string(),
            ));
        }
        if self.overlap >= self.size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than window size {}",
                self.overlap, self.size
            )));
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.size - self.overlap
    }
}

/// Lazy overlapping word windows over a borrowed text.
#[derive(Debug, Clone)]
pub struct WordWindows<'a> {
    words: Vec<&'a str>,
    config: ChunkingConfig,
    start: usize,
    done: bool,
}

impl Iterator for WordWindows<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.start >= self.words.len() {
            return None;
        }

        let end = (self.start + self.config.size).min(self.words.len());
        let window = self.words[self.start..end].join(" ");
        if end == self.words.len() {
            self.done = true;
        } else {
            self.start += self.config.stride();
        }
        Some(window)
    }
}

pub fn chunk_words(text: &str, config: ChunkingConfig) -> Result<WordWindows<'_>, IngestError> {
    config.validate()?;
    Ok(WordWindows {
        words: text.split_whitespace().collect(),
        config,
        start: 0,
        done: false,
    })
}
