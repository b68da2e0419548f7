use crate::error::{Error, Result};
use crate::types::{Block, BlockRecord, Hash};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Newline-delimited JSON file of `{hash, block}` records in chain order.
///
/// The file is only ever opened for appending, so an interrupted write can damage at most
/// the final line. [`BlockLog::read_records`] detects and removes such a torn tail.
pub struct BlockLog {
    path: PathBuf,
    file: File,
}

impl BlockLog {
    /// Open the log for read + append, creating an empty one if missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in file order.
    pub fn read_records(&mut self) -> Result<Vec<BlockRecord>> {
        let content = fs::read(&self.path)?;
        let mut records = Vec::new();
        let mut offset = 0;
        let mut line_number = 0;
        while offset < content.len() {
            line_number += 1;
            let (line, next, terminated) = match content[offset..].iter().position(|b| *b == b'\n') {
                Some(length) => (&content[offset..offset + length], offset + length + 1, true),
                None => (&content[offset..], content.len(), false),
            };
            if line.iter().all(u8::is_ascii_whitespace) {
                offset = next;
                continue;
            }
            match serde_json::from_slice::<BlockRecord>(line) {
                Ok(record) => {
                    if !terminated {
                        // Record made it but its newline did not.
                        self.file.write_all(b"\n")?;
                        self.file.sync_data()?;
                    }
                    records.push(record);
                }
                Err(error) if !terminated => {
                    log::warn!(
                        "Dropping torn record at line {} of {:?}: {}",
                        line_number,
                        self.path,
                        error
                    );
                    self.rollback(offset as u64)?;
                    break;
                }
                Err(error) => {
                    return Err(Error::CorruptRecord {
                        line: line_number,
                        reason: error.to_string(),
                    })
                }
            }
            offset = next;
        }
        Ok(records)
    }

    /// Durably append one record as a single line. A failed append leaves the file as it was.
    pub fn append(&mut self, record: &BlockRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let length = self.file.metadata()?.len();
        if let Err(error) = self.write_line(&line) {
            if let Err(rollback_error) = self.rollback(length) {
                log::error!(
                    "Failed to roll back {:?} to {} bytes: {}",
                    self.path,
                    length,
                    rollback_error
                );
            }
            return Err(error.into());
        }
        Ok(())
    }

    fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.file.write_all(line)?;
        self.file.sync_data()
    }

    /// Cut off everything written after `length` bytes.
    fn rollback(&mut self, length: u64) -> Result<()> {
        self.file.set_len(length)?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Every block recorded after the one with hash `from`. The empty hash selects the whole
    /// log; an unknown hash selects nothing.
    pub fn blocks_after(&self, from: &Hash) -> Result<Vec<Block>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut blocks = Vec::new();
        let mut collecting = from.is_empty();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: BlockRecord = serde_json::from_str(&line).map_err(|error| Error::CorruptRecord {
                line: index + 1,
                reason: error.to_string(),
            })?;
            if collecting {
                blocks.push(record.value);
            } else if record.key == *from {
                collecting = true;
            }
        }
        Ok(blocks)
    }

    /// Flush and release the file handle.
    pub fn close(self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Transaction;
    use tempfile::TempDir;

    fn record(number: u64, parent: Hash) -> BlockRecord {
        let block = Block::new(parent, number, 0, number, vec![Transaction::reward("bob", number)]);
        BlockRecord {
            key: block.hash().unwrap(),
            value: block,
        }
    }

    fn chain(length: u64) -> Vec<BlockRecord> {
        let mut records: Vec<BlockRecord> = Vec::new();
        for number in 0..length {
            let parent = records.last().map(|r| r.key).unwrap_or_default();
            records.push(record(number, parent));
        }
        records
    }

    #[test]
    fn test_append_and_read() {
        let dir = TempDir::new().unwrap();
        let mut log = BlockLog::open(dir.path().join("block.db")).unwrap();
        assert!(log.read_records().unwrap().is_empty());

        let records = chain(3);
        for record in &records {
            log.append(record).unwrap();
        }
        assert_eq!(log.read_records().unwrap(), records);

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_blocks_after() {
        let dir = TempDir::new().unwrap();
        let mut log = BlockLog::open(dir.path().join("block.db")).unwrap();
        let records = chain(3);
        for record in &records {
            log.append(record).unwrap();
        }

        let all = log.blocks_after(&Hash::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], records[0].value);

        let after_first = log.blocks_after(&records[0].key).unwrap();
        assert_eq!(after_first, vec![records[1].value.clone(), records[2].value.clone()]);

        assert!(log.blocks_after(&records[2].key).unwrap().is_empty());
        assert!(log.blocks_after(&Hash::new([9u8; 32])).unwrap().is_empty());
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("block.db");
        let records = chain(2);
        {
            let mut log = BlockLog::open(&path).unwrap();
            log.append(&records[0]).unwrap();
            log.close().unwrap();
        }
        let intact_length = fs::metadata(&path).unwrap().len();
        let mut torn = serde_json::to_vec(&records[1]).unwrap();
        torn.truncate(torn.len() / 2);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&torn).unwrap();
        drop(file);

        let mut log = BlockLog::open(&path).unwrap();
        assert_eq!(log.read_records().unwrap(), vec![records[0].clone()]);
        assert_eq!(fs::metadata(&path).unwrap().len(), intact_length);

        log.append(&records[1]).unwrap();
        assert_eq!(log.read_records().unwrap(), records);
    }

    #[test]
    fn test_rollback_drops_partial_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("block.db");
        let records = chain(2);
        let mut log = BlockLog::open(&path).unwrap();
        log.append(&records[0]).unwrap();

        let length = fs::metadata(&path).unwrap().len();
        let partial = serde_json::to_vec(&records[1]).unwrap();
        log.file.write_all(&partial[..partial.len() / 2]).unwrap();
        log.rollback(length).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), length);

        log.append(&records[1]).unwrap();
        log.close().unwrap();
        let mut reopened = BlockLog::open(&path).unwrap();
        assert_eq!(reopened.read_records().unwrap(), records);
    }

    #[test]
    fn test_missing_final_newline_is_restored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("block.db");
        let records = chain(2);
        fs::write(&path, serde_json::to_vec(&records[0]).unwrap()).unwrap();

        let mut log = BlockLog::open(&path).unwrap();
        assert_eq!(log.read_records().unwrap(), vec![records[0].clone()]);
        log.append(&records[1]).unwrap();
        assert_eq!(log.read_records().unwrap(), records);
    }

    #[test]
    fn test_corrupt_middle_line_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("block.db");
        let good = serde_json::to_string(&record(0, Hash::default())).unwrap();
        fs::write(&path, format!("{{broken\n{}\n", good)).unwrap();

        let mut log = BlockLog::open(&path).unwrap();
        match log.read_records() {
            Err(Error::CorruptRecord { line, .. }) => assert_eq!(line, 1),
            other => panic!("unexpected result {:?}", other.map(|r| r.len())),
        }
    }
}
