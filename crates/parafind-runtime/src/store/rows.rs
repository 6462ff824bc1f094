use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parafind_core::{ClassificationResult, ValidationTier};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Number;
use tracing::{debug, warn};

use super::StoreError;

/// One row of the accepted-records file.
///
/// `data` is stored as embedded JSON text so every field stays a scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    pub index: u64,
    pub query_id: String,
    pub prompt: String,
    pub parallelizable: bool,
    pub category: Option<String>,
    pub is_novel_category: bool,
    pub category_description: Option<String>,
    pub serial: String,
    pub template: Option<String>,
    pub context: Option<String>,
    pub data: Option<String>,
    pub n: Option<Number>,
    pub validation_passed: bool,
    pub validation_tier: ValidationTier,
    pub timestamp: DateTime<Utc>,
}

impl RowRecord {
    pub fn from_result(result: &ClassificationResult) -> Result<Self, serde_json::Error> {
        let data = result.data.as_ref().map(serde_json::to_string).transpose()?;

        Ok(Self {
            index: result.index,
            query_id: result.query_id.clone(),
            prompt: result.prompt.clone(),
            parallelizable: result.parallelizable,
            category: result.category.clone(),
            is_novel_category: result.is_novel_category,
            category_description: result.category_description.clone(),
            serial: result.serial.clone(),
            template: result.template.clone(),
            context: result.context.clone(),
            data,
            n: result.n.clone(),
            validation_passed: result.validation_passed,
            validation_tier: result.validation_tier,
            timestamp: result.timestamp,
        })
    }

    /// Decode the embedded `data` list.
    pub fn data_items(&self) -> Option<Vec<String>> {
        self.data
            .as_deref()
            .and_then(|text| serde_json::from_str(text).ok())
    }
}

/// Append-only store of records that are parallelizable after validation.
#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    writer: Mutex<File>,
}

impl ResultStore {
    /// Opens (or creates) the row file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        terminate_torn_line(&mut file).map_err(|e| StoreError::io(&path, e))?;

        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `result` if it is parallelizable. Returns whether a row was written.
    ///
    /// The whole line is written and flushed under the lock.
    pub fn append(&self, result: &ClassificationResult) -> Result<bool, StoreError> {
        if !result.parallelizable {
            return Ok(false);
        }

        let row = RowRecord::from_result(result).map_err(|e| StoreError::json(&self.path, e))?;
        let mut line = serde_json::to_vec(&row).map_err(|e| StoreError::json(&self.path, e))?;
        line.push(b'\n');

        let mut guard = self.writer.lock();
        guard.write_all(&line).map_err(|e| StoreError::io(&self.path, e))?;
        guard.flush().map_err(|e| StoreError::io(&self.path, e))?;

        debug!(index = result.index, "Row appended");
        Ok(true)
    }

    /// Largest stored index, `None` for an empty store.
    pub fn max_index(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.load_all()?.iter().map(|row| row.index).max())
    }

    /// Read every well-formed row. Torn or malformed lines are skipped.
    pub fn load_all(&self) -> Result<Vec<RowRecord>, StoreError> {
        let file = File::open(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        let mut rows = Vec::new();

        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| StoreError::io(&self.path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RowRecord>(&line) {
                Ok(row) => rows.push(row),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping malformed row"
                ),
            }
        }

        Ok(rows)
    }
}

/// A crash mid-append leaves a line without its newline; close it so the
/// next row starts on a fresh line.
fn terminate_torn_line(file: &mut File) -> io::Result<()> {
    if file.metadata()?.len() == 0 {
        return Ok(());
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        file.write_all(b"\n")?;
        file.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parafind_core::RecordMeta;
    use tempfile::tempdir;

    fn accepted(index: u64) -> ClassificationResult {
        let mut result = ClassificationResult::fallback(RecordMeta::new(
            index,
            "0badc0de",
            "Translate into German: good morning. good night.",
        ));
        result.parallelizable = true;
        result.category = Some("Translation".to_string());
        result.template = Some("Translate into German: {data}".to_string());
        result.data = Some(vec!["good morning.".to_string(), "good night.".to_string()]);
        result.validation_tier = ValidationTier::HighConfidence;
        result.validation_passed = true;
        result
    }

    #[test]
    fn test_appends_only_parallelizable() {
        let dir = tempdir().unwrap();
        let store = ResultStore::open(dir.path().join("rows.jsonl")).unwrap();

        assert!(store.append(&accepted(4)).unwrap());

        let rejected = ClassificationResult::fallback(RecordMeta::new(5, "deadbeef", "hello there"));
        assert!(!store.append(&rejected).unwrap());

        let rows = store.load_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].index, 4);
        assert_eq!(rows[0].data.as_deref(), Some(r#"["good morning.","good night."]"#));
        assert_eq!(rows[0].data_items().unwrap().len(), 2);
    }

    #[test]
    fn test_max_index_skips_torn_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        let store = ResultStore::open(&path).unwrap();

        assert_eq!(store.max_index().unwrap(), None);

        store.append(&accepted(12)).unwrap();
        store.append(&accepted(3)).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"index": 99, "query_id": "#).unwrap();

        assert_eq!(store.max_index().unwrap(), Some(12));

        let reopened = ResultStore::open(&path).unwrap();
        reopened.append(&accepted(13)).unwrap();
        assert_eq!(reopened.max_index().unwrap(), Some(13));
        assert_eq!(reopened.load_all().unwrap().len(), 3);
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("rows.jsonl");

        ResultStore::open(&path).unwrap().append(&accepted(0)).unwrap();
        ResultStore::open(&path).unwrap().append(&accepted(1)).unwrap();

        assert_eq!(ResultStore::open(&path).unwrap().load_all().unwrap().len(), 2);
    }
}
