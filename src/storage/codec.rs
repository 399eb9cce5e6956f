//! Durable record encoding.
//!
//! Every coordinator entity is persisted in the catalog store as one key/value
//! pair:
//!
//! ```text
//! key   = entity_tag:u8 || id:16
//! value = 0x00                          (tombstone)
//!       | 0x01 || bincode(payload)      (live record)
//! ```

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;
use crate::StorageError;

pub const KEY_SIZE: usize = 1 + 16;

/// Entity tags shared by record keys and catalog entries.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Unknown = 0,
    Table = 1,
    Tablet = 2,
    Namespace = 3,
    Snapshot = 4,
    SnapshotSchedule = 5,
}

impl EntityType {
    pub fn from_tag(tag: u8) -> Option<EntityType> {
        match tag {
            0 => Some(EntityType::Unknown),
            1 => Some(EntityType::Table),
            2 => Some(EntityType::Tablet),
            3 => Some(EntityType::Namespace),
            4 => Some(EntityType::Snapshot),
            5 => Some(EntityType::SnapshotSchedule),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Tombstone = 0x00,
    String = 0x01,
}

/// Decoded view of a record value.
#[derive(Debug, PartialEq, Eq)]
pub enum RecordValue<'a> {
    Tombstone,
    Payload(&'a [u8]),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritePair {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Ordered list of record writes applied atomically by the replicator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    pairs: Vec<WritePair>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pair(
        &mut self,
        key: Vec<u8>,
        value: Vec<u8>,
    ) {
        self.pairs.push(WritePair { key, value });
    }

    /// Adds a live record.
    pub fn put<P: Serialize>(
        &mut self,
        entity_type: EntityType,
        id: &[u8; 16],
        payload: &P,
    ) -> Result<()> {
        let value = encode_value(payload)?;
        self.add_pair(encode_key(entity_type, id), value);
        Ok(())
    }

    pub fn tombstone(
        &mut self,
        entity_type: EntityType,
        id: &[u8; 16],
    ) {
        self.add_pair(encode_key(entity_type, id), tombstone_value());
    }

    pub fn pairs(&self) -> &[WritePair] {
        &self.pairs
    }

    pub fn into_pairs(self) -> Vec<WritePair> {
        self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

pub fn encode_key(
    entity_type: EntityType,
    id: &[u8; 16],
) -> Vec<u8> {
    let mut key = Vec::with_capacity(KEY_SIZE);
    key.push(entity_type.tag());
    key.extend_from_slice(id);
    key
}

pub fn decode_key(key: &[u8]) -> Result<(EntityType, [u8; 16])> {
    if key.len() != KEY_SIZE {
        return Err(StorageError::InvalidKey(format!(
            "expected {} bytes, got {}",
            KEY_SIZE,
            key.len()
        ))
        .into());
    }
    let entity_type = EntityType::from_tag(key[0])
        .ok_or_else(|| StorageError::InvalidKey(format!("unknown entity tag {}", key[0])))?;
    let mut id = [0u8; 16];
    id.copy_from_slice(&key[1..]);
    Ok((entity_type, id))
}

pub fn encode_value<P: Serialize>(payload: &P) -> Result<Vec<u8>> {
    let mut value = vec![ValueType::String as u8];
    bincode::serialize_into(&mut value, payload)?;
    Ok(value)
}

pub fn tombstone_value() -> Vec<u8> {
    vec![ValueType::Tombstone as u8]
}

pub fn decode_value(value: &[u8]) -> Result<RecordValue<'_>> {
    match value.split_first() {
        None => Err(StorageError::Corruption("empty record value".into()).into()),
        Some((&tag, _)) if tag == ValueType::Tombstone as u8 => Ok(RecordValue::Tombstone),
        Some((&tag, rest)) if tag == ValueType::String as u8 => Ok(RecordValue::Payload(rest)),
        Some((&tag, _)) => Err(StorageError::Corruption(format!(
            "bad value type: {}, expected string while replaying write",
            tag
        ))
        .into()),
    }
}

pub fn decode_payload<P: DeserializeOwned>(bytes: &[u8]) -> Result<P> {
    Ok(bincode::deserialize(bytes)?)
}
