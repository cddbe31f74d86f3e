use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use ndchunk_storage::{
    Bytes, ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey,
    StoreKeys, StorePrefix, WritableStorageTraits,
};
use parking_lot::Mutex;

use crate::FilesystemStoreCreateError;

const MAGIC: &[u8; 8] = b"NDCHUNK1";

/// The value length marking an erased key.
const TOMBSTONE: u64 = u64::MAX;

#[derive(Copy, Clone, Debug)]
struct Record {
    offset: u64,
    len: u64,
}

#[derive(Debug)]
struct ContiguousFile {
    file: File,
    index: BTreeMap<StoreKey, Record>,
    end: u64,
}

/// A single-file store.
///
/// The file starts with an 8 byte magic number, followed by append-only records
/// ```text
/// [u16 key length][key][u64 value length][value]
/// ```
/// in little endian byte order. A later record for a key supersedes earlier ones, and a value
/// length of [`u64::MAX`] (with no value) marks the key as erased. The index of live records is
/// rebuilt by scanning the file on open.
#[derive(Debug)]
pub struct ContiguousFileStore {
    path: PathBuf,
    inner: Mutex<ContiguousFile>,
}

fn invalid_file(path: &Path, reason: impl Into<String>) -> FilesystemStoreCreateError {
    FilesystemStoreCreateError::InvalidFile {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

impl ContiguousFileStore {
    /// Create a new single-file store at `path`.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `path` already exists or the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, FilesystemStoreCreateError> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(FilesystemStoreCreateError::AlreadyExists(path));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(MAGIC)?;
        Ok(Self {
            path,
            inner: Mutex::new(ContiguousFile {
                file,
                index: BTreeMap::new(),
                end: MAGIC.len() as u64,
            }),
        })
    }

    /// Open an existing single-file store at `path`.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `path` does not exist, or is not a valid store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FilesystemStoreCreateError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(FilesystemStoreCreateError::NotFound(path));
        }
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let (index, end) = Self::read_index(&path, &file)?;
        log::debug!(
            "opened contiguous store {} with {} keys",
            path.display(),
            index.len()
        );
        Ok(Self {
            path,
            inner: Mutex::new(ContiguousFile { file, index, end }),
        })
    }

    fn read_index(
        path: &Path,
        file: &File,
    ) -> Result<(BTreeMap<StoreKey, Record>, u64), FilesystemStoreCreateError> {
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 8];
        if file_len < MAGIC.len() as u64 {
            return Err(invalid_file(path, "missing magic number"));
        }
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(invalid_file(path, "unrecognised magic number"));
        }

        let mut index = BTreeMap::new();
        let mut position = MAGIC.len() as u64;
        while position < file_len {
            let mut key_len = [0u8; 2];
            reader.read_exact(&mut key_len)?;
            let mut key = vec![0u8; usize::from(u16::from_le_bytes(key_len))];
            reader.read_exact(&mut key)?;
            let key = String::from_utf8(key)
                .ok()
                .and_then(|key| StoreKey::new(key).ok())
                .ok_or_else(|| invalid_file(path, format!("invalid key at offset {position}")))?;
            let mut value_len = [0u8; 8];
            reader.read_exact(&mut value_len)?;
            let value_len = u64::from_le_bytes(value_len);
            position = position
                .checked_add(2 + u64::from(u16::from_le_bytes(key_len)) + 8)
                .ok_or_else(|| invalid_file(path, "record offset overflow"))?;

            if value_len == TOMBSTONE {
                index.remove(&key);
                continue;
            }
            let value_end = position
                .checked_add(value_len)
                .filter(|end| *end <= file_len)
                .ok_or_else(|| invalid_file(path, format!("truncated value for key {key}")))?;
            index.insert(
                key,
                Record {
                    offset: position,
                    len: value_len,
                },
            );
            let skip = i64::try_from(value_len)
                .map_err(|_| invalid_file(path, "value length overflow"))?;
            reader.seek_relative(skip)?;
            position = value_end;
        }
        Ok((index, position))
    }

    /// Return the path of the store file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the size of the store file in bytes, including superseded records.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.inner.lock().end
    }

    fn append(
        inner: &mut ContiguousFile,
        key: &StoreKey,
        value: Option<&[u8]>,
    ) -> Result<(), StorageError> {
        let key_bytes = key.as_str().as_bytes();
        let key_len = u16::try_from(key_bytes.len())
            .map_err(|_| StorageError::Other(format!("key {key} is too long")))?;
        let value_len = value.map_or(TOMBSTONE, |value| value.len() as u64);

        let mut record =
            Vec::with_capacity(2 + key_bytes.len() + 8 + value.map_or(0, <[u8]>::len));
        record.extend_from_slice(&key_len.to_le_bytes());
        record.extend_from_slice(key_bytes);
        record.extend_from_slice(&value_len.to_le_bytes());
        if let Some(value) = value {
            record.extend_from_slice(value);
        }

        inner.file.seek(SeekFrom::Start(inner.end))?;
        inner.file.write_all(&record)?;

        let value_offset = inner.end + 2 + u64::from(key_len) + 8;
        inner.end += record.len() as u64;
        if value.is_some() {
            inner.index.insert(
                key.clone(),
                Record {
                    offset: value_offset,
                    len: value_len,
                },
            );
        } else {
            inner.index.remove(key);
        }
        Ok(())
    }
}

impl ReadableStorageTraits for ContiguousFileStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        let mut inner = self.inner.lock();
        let Some(record) = inner.index.get(key).copied() else {
            return Ok(None);
        };
        let len = usize::try_from(record.len)
            .map_err(|_| StorageError::Corrupt(format!("value for key {key} is too large")))?;
        let mut buffer = vec![0; len];
        inner.file.seek(SeekFrom::Start(record.offset))?;
        inner.file.read_exact(&mut buffer)?;
        Ok(Some(Bytes::from(buffer)))
    }
}

impl WritableStorageTraits for ContiguousFileStore {
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        Self::append(&mut inner, key, Some(&value))
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if inner.index.contains_key(key) {
            Self::append(&mut inner, key, None)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        inner.file.flush()?;
        inner.file.sync_data()?;
        Ok(())
    }
}

impl ListableStorageTraits for ContiguousFileStore {
    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
        Ok(self
            .inner
            .lock()
            .index
            .keys()
            .filter(|key| key.has_prefix(prefix))
            .cloned()
            .collect())
    }
}
