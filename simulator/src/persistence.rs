//! On-disk snapshot of the simulator store.
//!
//! Layout: magic, format version, entry count, then each live entry as
//! `Key`, `Value` and the key's version, all in the workspace codec.

use bytes::{Buf, BufMut};
use commonware_codec::{DecodeExt, Encode, EncodeSize, Error, Read, ReadExt, Write};
use memento_execution::Memory;
use memento_types::{Key, Value};
use std::{fs, io, path::Path};

const MAGIC: [u8; 4] = *b"MMTO";
const FORMAT_VERSION: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("snapshot io failed: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot is malformed: {0}")]
    Codec(#[from] Error),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub entries: Vec<(Key, Value, u64)>,
}

impl Snapshot {
    pub fn capture(memory: &Memory) -> Self {
        let mut entries: Vec<_> = memory
            .entries()
            .map(|(key, value, version)| (key.clone(), value.clone(), version))
            .collect();
        // Stable output for identical stores.
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self { entries }
    }

    pub fn into_memory(self) -> Memory {
        Memory::restore(self.entries)
    }
}

impl Write for Snapshot {
    fn write(&self, writer: &mut impl BufMut) {
        writer.put_slice(&MAGIC);
        FORMAT_VERSION.write(writer);
        (self.entries.len() as u64).write(writer);
        for (key, value, version) in &self.entries {
            key.write(writer);
            value.write(writer);
            version.write(writer);
        }
    }
}

impl Read for Snapshot {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &()) -> Result<Self, Error> {
        if reader.remaining() < MAGIC.len() {
            return Err(Error::EndOfBuffer);
        }
        let mut magic = [0u8; 4];
        reader.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(Error::Invalid("Snapshot", "bad magic"));
        }
        if u8::read(reader)? != FORMAT_VERSION {
            return Err(Error::Invalid("Snapshot", "unsupported format version"));
        }
        let count = u64::read(reader)?;
        // Every entry takes more than one byte.
        if count > reader.remaining() as u64 {
            return Err(Error::Invalid("Snapshot", "entry count exceeds data"));
        }
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let key = Key::read(reader)?;
            let value = Value::read(reader)?;
            let version = u64::read(reader)?;
            entries.push((key, value, version));
        }
        Ok(Self { entries })
    }
}

impl EncodeSize for Snapshot {
    fn encode_size(&self) -> usize {
        MAGIC.len()
            + FORMAT_VERSION.encode_size()
            + 0u64.encode_size()
            + self
                .entries
                .iter()
                .map(|(key, value, version)| {
                    key.encode_size() + value.encode_size() + version.encode_size()
                })
                .sum::<usize>()
    }
}

/// Writes `memory` to `path`, replacing the file atomically via a rename.
pub fn save(path: &Path, memory: &Memory) -> Result<(), PersistenceError> {
    let bytes = Snapshot::capture(memory).encode();
    let staging = path.with_extension("tmp");
    fs::write(&staging, &bytes)?;
    fs::rename(&staging, path)?;
    Ok(())
}

pub fn load(path: &Path) -> Result<Memory, PersistenceError> {
    let bytes = fs::read(path)?;
    let snapshot = Snapshot::decode(bytes.as_slice())?;
    Ok(snapshot.into_memory())
}
