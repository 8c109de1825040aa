//! Slot-addressed access to the data file
//!
//! The file has no header or footer: it is a plain array of slots, and the
//! slot at index `n` starts at byte offset `n * SLOT_SIZE`.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreResult;
use crate::storage::record::{Record, SlotFlags, SLOT_SIZE};

/// An open data file
pub struct SlotFile {
    /// File path
    pub path: PathBuf,
    /// Underlying file handle
    file: File,
}

impl SlotFile {
    /// Open an existing data file, creating an empty one if missing.
    ///
    /// Returns the file and whether it was newly created.
    pub fn open_or_create(path: &Path) -> StoreResult<(Self, bool)> {
        let created = !path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok((
            SlotFile {
                path: path.to_path_buf(),
                file,
            },
            created,
        ))
    }

    /// Create a data file, truncating any existing content
    pub fn create(path: &Path) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(SlotFile {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Current file length in bytes
    pub fn len(&self) -> StoreResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Number of complete slots, live or tombstoned
    pub fn slot_count(&self) -> StoreResult<u64> {
        Ok(self.len()? / SLOT_SIZE as u64)
    }

    /// Read and decode the slot at `offset`; `None` means tombstoned
    pub fn read_slot(&mut self, offset: u64) -> StoreResult<Option<Record>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut data = [0u8; SLOT_SIZE];
        self.file.read_exact(&mut data)?;
        Ok(Record::decode(&data)?)
    }

    /// Encode and write a slot at `offset`
    pub fn write_slot(&mut self, offset: u64, record: &Record, flags: SlotFlags) -> StoreResult<()> {
        let data = record.encode(flags);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&data)?;
        Ok(())
    }

    /// Append a live slot after the last complete slot, returning its offset.
    ///
    /// A torn partial slot at the end of the file is overwritten, so every
    /// offset stays a multiple of [`SLOT_SIZE`].
    pub fn append(&mut self, record: &Record) -> StoreResult<u64> {
        let length = self.len()?;
        let offset = self.slot_count()? * SLOT_SIZE as u64;
        if offset != length {
            tracing::warn!(
                "Overwriting {} trailing bytes in {:?}",
                length - offset,
                self.path
            );
        }
        self.write_slot(offset, record, SlotFlags::empty())?;
        Ok(offset)
    }

    /// Decode every live slot from offset 0 to end of file.
    ///
    /// A short trailing partial slot is ignored.
    pub fn scan(&mut self) -> StoreResult<Vec<(u64, Record)>> {
        let length = self.len()?;
        let whole = self.slot_count()? * SLOT_SIZE as u64;
        if whole != length {
            tracing::warn!(
                "Ignoring {} trailing bytes in {:?}",
                length - whole,
                self.path
            );
        }

        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut self.file);
        let mut records = Vec::new();
        let mut data = [0u8; SLOT_SIZE];
        let mut offset = 0u64;

        while offset < whole {
            reader.read_exact(&mut data)?;
            if let Some(record) = Record::decode(&data)? {
                records.push((offset, record));
            }
            offset += SLOT_SIZE as u64;
        }

        Ok(records)
    }

    /// Drop every slot
    pub fn truncate(&mut self) -> StoreResult<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Flush all writes to disk
    pub fn flush(&mut self) -> StoreResult<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stock.db");

        let (mut file, created) = SlotFile::open_or_create(&path).unwrap();
        assert!(created);
        assert_eq!(file.slot_count().unwrap(), 0);

        let first = file.append(&Record::new(1, "TV", 10, 49990.0, "DNS")).unwrap();
        let second = file.append(&Record::new(2, "Radio", 3, 990.0, "OZON")).unwrap();
        assert_eq!(first, 0);
        assert_eq!(second, SLOT_SIZE as u64);
        drop(file);

        let (mut file, created) = SlotFile::open_or_create(&path).unwrap();
        assert!(!created);
        assert_eq!(file.slot_count().unwrap(), 2);
        let record = file.read_slot(second).unwrap().unwrap();
        assert_eq!(record.name, "Radio");
    }

    #[test]
    fn test_scan_skips_tombstones_and_partial_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stock.db");
        let mut file = SlotFile::create(&path).unwrap();

        let tv = Record::new(1, "TV", 10, 49990.0, "DNS");
        let radio = Record::new(2, "Radio", 3, 990.0, "OZON");
        file.append(&tv).unwrap();
        let offset = file.append(&radio).unwrap();
        file.write_slot(0, &tv, SlotFlags::DELETED).unwrap();
        drop(file);

        // Simulate a torn write at the end of the file
        let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
        raw.write_all(&[1, 2, 3]).unwrap();
        drop(raw);

        let (mut file, _) = SlotFile::open_or_create(&path).unwrap();
        let records = file.scan().unwrap();
        assert_eq!(records, vec![(offset, radio)]);
    }

    #[test]
    fn test_append_overwrites_partial_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stock.db");
        let mut file = SlotFile::create(&path).unwrap();
        let tv = Record::new(1, "TV", 10, 49990.0, "DNS");
        file.append(&tv).unwrap();

        let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
        raw.write_all(&[1, 2, 3]).unwrap();
        drop(raw);

        let radio = Record::new(2, "Radio", 3, 990.0, "OZON");
        let offset = file.append(&radio).unwrap();
        assert_eq!(offset, SLOT_SIZE as u64);
        assert_eq!(file.len().unwrap(), 2 * SLOT_SIZE as u64);
        assert_eq!(file.scan().unwrap(), vec![(0, tv), (offset, radio)]);
    }

    #[test]
    fn test_truncate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stock.db");
        let mut file = SlotFile::create(&path).unwrap();
        file.append(&Record::new(1, "TV", 10, 49990.0, "DNS")).unwrap();

        file.truncate().unwrap();
        assert_eq!(file.len().unwrap(), 0);
        assert!(file.scan().unwrap().is_empty());
        assert_eq!(file.append(&Record::new(2, "Radio", 1, 1.0, "")).unwrap(), 0);
    }
}
