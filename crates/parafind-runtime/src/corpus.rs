//! Corpus sources.
//!
//! A corpus is an ordered, indexable collection of chat conversations. The
//! index of a record is its position and never changes, since resumption
//! keys off the largest stored index.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Errors from opening a corpus.
#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Failed to read corpus {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CorpusError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// One corpus record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(default)]
    pub conversation: Vec<ChatTurn>,
}

impl ConversationRecord {
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            conversation: vec![ChatTurn {
                role: "user".to_string(),
                content: prompt.into(),
            }],
        }
    }

    /// The first user message, trimmed.
    pub fn first_user_prompt(&self) -> Option<&str> {
        self.conversation
            .iter()
            .find(|turn| turn.role == "user")
            .map(|turn| turn.content.trim())
    }

    /// The prompt to classify, or `None` when it is missing or shorter than
    /// `min_chars` characters.
    pub fn eligible_prompt(&self, min_chars: usize) -> Option<&str> {
        self.first_user_prompt()
            .filter(|prompt| prompt.chars().count() >= min_chars)
    }
}

/// Ordered source of conversation records.
pub trait Corpus: Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records in `range`, clamped to the corpus length.
    fn batch(&self, range: Range<u64>) -> Result<Vec<(u64, ConversationRecord)>, CorpusError>;
}

/// Corpus held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCorpus {
    records: Vec<ConversationRecord>,
}

impl InMemoryCorpus {
    pub fn new(records: Vec<ConversationRecord>) -> Self {
        Self { records }
    }

    /// One single-turn conversation per prompt.
    pub fn from_prompts<I, S>(prompts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(prompts.into_iter().map(ConversationRecord::from_prompt).collect())
    }

    pub fn get(&self, index: u64) -> Option<&ConversationRecord> {
        usize::try_from(index).ok().and_then(|i| self.records.get(i))
    }
}

impl Corpus for InMemoryCorpus {
    fn len(&self) -> u64 {
        self.records.len() as u64
    }

    fn batch(&self, range: Range<u64>) -> Result<Vec<(u64, ConversationRecord)>, CorpusError> {
        Ok(range
            .map_while(|index| self.get(index).map(|record| (index, record.clone())))
            .collect())
    }
}

/// JSON Lines corpus: one `{"conversation": [{role, content}, ...]}` per line.
///
/// Opening only indexes where each line starts; records are parsed a batch
/// at a time. Every line is a record, so indices match line numbers. A blank
/// or malformed line reads as an empty record and is skipped like a short
/// prompt.
#[derive(Debug, Clone)]
pub struct JsonlCorpus {
    path: PathBuf,
    offsets: Vec<u64>,
}

impl JsonlCorpus {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| CorpusError::io(path, e))?;
        let mut reader = BufReader::new(file);

        let mut offsets = Vec::new();
        let mut line = Vec::new();
        let mut offset = 0u64;
        loop {
            line.clear();
            let read = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| CorpusError::io(path, e))?;
            if read == 0 {
                break;
            }
            offsets.push(offset);
            offset += read as u64;
        }

        info!(path = %path.display(), records = offsets.len(), "Corpus indexed");

        Ok(Self {
            path: path.to_path_buf(),
            offsets,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_line(index: u64, line: &[u8]) -> ConversationRecord {
        if line.iter().all(u8::is_ascii_whitespace) {
            return ConversationRecord::default();
        }
        serde_json::from_slice(line).unwrap_or_else(|e| {
            warn!(index, error = %e, "Malformed corpus line");
            ConversationRecord::default()
        })
    }
}

impl Corpus for JsonlCorpus {
    fn len(&self) -> u64 {
        self.offsets.len() as u64
    }

    fn batch(&self, range: Range<u64>) -> Result<Vec<(u64, ConversationRecord)>, CorpusError> {
        let end = range.end.min(self.len());
        let Some(&offset) = usize::try_from(range.start).ok().and_then(|i| self.offsets.get(i)) else {
            return Ok(Vec::new());
        };

        let io_err = |e| CorpusError::io(&self.path, e);
        let mut reader = BufReader::new(File::open(&self.path).map_err(io_err)?);
        reader.seek(SeekFrom::Start(offset)).map_err(io_err)?;

        let mut records = Vec::with_capacity(end.saturating_sub(range.start) as usize);
        let mut line = Vec::new();
        for index in range.start..end {
            line.clear();
            reader.read_until(b'\n', &mut line).map_err(io_err)?;
            records.push((index, Self::parse_line(index, &line)));
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_first_user_prompt() {
        let record = ConversationRecord {
            conversation: vec![
                ChatTurn { role: "system".into(), content: "Be nice.".into() },
                ChatTurn { role: "user".into(), content: "  Write 3 haiku  \n".into() },
                ChatTurn { role: "user".into(), content: "Another".into() },
            ],
        };
        assert_eq!(record.first_user_prompt(), Some("Write 3 haiku"));
        assert_eq!(ConversationRecord::default().first_user_prompt(), None);
    }

    #[test]
    fn test_eligibility_counts_chars() {
        let record = ConversationRecord::from_prompt("   héllo wörld   ");
        assert_eq!(record.eligible_prompt(11), Some("héllo wörld"));
        assert_eq!(record.eligible_prompt(12), None);
        assert_eq!(ConversationRecord::from_prompt("hi").eligible_prompt(10), None);
    }

    #[test]
    fn test_batch_clamps() {
        let corpus = InMemoryCorpus::from_prompts(["a", "b", "c"]);
        let batch = corpus.batch(1..100).unwrap();
        let indices: Vec<u64> = batch.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 2]);
        assert!(corpus.batch(5..10).unwrap().is_empty());
    }

    fn prompts(batch: &[(u64, ConversationRecord)]) -> Vec<(u64, Option<&str>)> {
        batch.iter().map(|(i, r)| (*i, r.first_user_prompt())).collect()
    }

    #[test]
    fn test_jsonl_keeps_indices_aligned() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"conversation": [{{"role": "user", "content": "first prompt here"}}]}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file).unwrap();
        write!(
            file,
            r#"{{"conversation": [{{"role": "user", "content": "fourth prompt here"}}], "model": "x"}}"#
        )
        .unwrap();

        let corpus = JsonlCorpus::open(file.path()).unwrap();
        assert_eq!(corpus.len(), 4);

        let all = corpus.batch(0..10).unwrap();
        assert_eq!(
            prompts(&all),
            vec![
                (0, Some("first prompt here")),
                (1, None),
                (2, None),
                (3, Some("fourth prompt here")),
            ]
        );
    }

    #[test]
    fn test_jsonl_batch_reads_from_offset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..5 {
            writeln!(file, r#"{{"conversation": [{{"role": "user", "content": "prompt number {}"}}]}}"#, i).unwrap();
        }
        let corpus = JsonlCorpus::open(file.path()).unwrap();

        let middle = corpus.batch(2..4).unwrap();
        assert_eq!(
            prompts(&middle),
            vec![(2, Some("prompt number 2")), (3, Some("prompt number 3"))]
        );
        assert!(corpus.batch(5..8).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file() {
        let err = JsonlCorpus::open("/nonexistent/parafind/corpus.jsonl").unwrap_err();
        assert!(matches!(err, CorpusError::Io { .. }));
    }
}
