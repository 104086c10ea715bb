//! Append-only record log
//!
//! A flat `u32` word array of packed records, appended in write order and
//! scanned front to back. Compaction keeps only the latest non-deleted record
//! per key and invalidates all outstanding handles.

use indexmap::IndexMap;

use crate::record::{RecordHeader, RecordRef, RecordType, RECORD_HEADER_WORDS};

/// Key identifying the "current state" slot a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Key {
    Code(u8),
    Attribute(u8, u8),
    VarName(u8),
    Comment(u8),
    CommentPosition(u8),
}

/// The append-only log
#[derive(Debug, Default)]
pub struct RecordLog {
    words: Vec<u32>,
    generation: u32,
}

impl RecordLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Append one record; the body bytes are packed little-endian into words,
    /// zero padded to a word boundary.
    pub fn append(&mut self, record_type: RecordType, index: u8, aux: u8, body: &[u8]) -> RecordRef {
        let offset = self.words.len();
        let body_words = body.len().div_ceil(4);
        self.words
            .push(RecordHeader::pack_word0(record_type, index, aux));
        self.words.push(body_words as u32);
        for chunk in body.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.words.push(u32::from_le_bytes(word));
        }
        RecordRef {
            offset,
            generation: self.generation,
        }
    }

    /// Decode the header of a record; `None` for stale or corrupt handles
    pub fn header(&self, record: RecordRef) -> Option<RecordHeader> {
        if record.generation != self.generation {
            return None;
        }
        let word0 = *self.words.get(record.offset)?;
        let word1 = *self.words.get(record.offset + 1)?;
        let header = RecordHeader::unpack(word0, word1)?;
        if record.offset + RECORD_HEADER_WORDS + header.body_words > self.words.len() {
            return None;
        }
        Some(header)
    }

    /// The record's words, header included; the layout chunk code runs in
    pub fn words(&self, record: RecordRef) -> Option<&[u32]> {
        let header = self.header(record)?;
        let end = record.offset + RECORD_HEADER_WORDS + header.body_words;
        Some(&self.words[record.offset..end])
    }

    /// The record's body words only
    pub fn body(&self, record: RecordRef) -> Option<&[u32]> {
        self.words(record).map(|w| &w[RECORD_HEADER_WORDS..])
    }

    /// The record's body as little-endian bytes, padding included
    pub fn body_bytes(&self, record: RecordRef) -> Option<Vec<u8>> {
        let body = self.body(record)?;
        let mut bytes = Vec::with_capacity(body.len() * 4);
        for word in body {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        Some(bytes)
    }

    /// Iterate in write order: the record after `prev`, or the first record
    /// for `None`.
    pub fn record_after(&self, prev: Option<RecordRef>) -> Option<RecordRef> {
        let offset = match prev {
            None => 0,
            Some(record) => {
                let header = self.header(record)?;
                record.offset + RECORD_HEADER_WORDS + header.body_words
            }
        };
        if offset >= self.words.len() {
            return None;
        }
        Some(RecordRef {
            offset,
            generation: self.generation,
        })
    }

    /// All records in write order
    pub fn records(&self) -> impl Iterator<Item = RecordRef> + '_ {
        std::iter::successors(self.record_after(None), move |&prev| {
            self.record_after(Some(prev))
        })
    }

    /// Rewrite the log keeping only the latest non-deleted record per key.
    ///
    /// Deletion markers are consumed: a deleted key simply has no record in
    /// the compacted log. Surviving keys keep their first-seen relative order.
    /// All outstanding handles are invalidated; callers re-resolve by
    /// scanning.
    pub fn compact(&mut self) {
        let mut live: IndexMap<Key, (u32, Vec<u32>)> = IndexMap::new();
        for record in self.records() {
            let Some(header) = self.header(record) else {
                break;
            };
            let word0 = self.words[record.offset];
            let keep = || (word0, self.body(record).unwrap_or(&[]).to_vec());
            let index = header.index;
            match header.record_type {
                RecordType::ChunkCode => {
                    live.insert(Key::Code(index), keep());
                }
                RecordType::ChunkAttribute => {
                    live.insert(Key::Attribute(index, header.aux), keep());
                }
                RecordType::ChunkDeleted => {
                    live.shift_remove(&Key::Code(index));
                    live.retain(|key, _| !matches!(key, Key::Attribute(i, _) if *i == index));
                }
                RecordType::VarName => {
                    live.insert(Key::VarName(index), keep());
                }
                RecordType::VarDeleted => {
                    live.shift_remove(&Key::VarName(index));
                }
                RecordType::Comment => {
                    live.insert(Key::Comment(index), keep());
                }
                RecordType::CommentPosition => {
                    live.insert(Key::CommentPosition(index), keep());
                }
                RecordType::CommentDeleted => {
                    live.shift_remove(&Key::Comment(index));
                    live.shift_remove(&Key::CommentPosition(index));
                }
            }
        }

        let mut words = Vec::with_capacity(self.words.len());
        for (_, (word0, body)) in &live {
            words.push(*word0);
            words.push(body.len() as u32);
            words.extend_from_slice(body);
        }
        self.words = words;
        self.generation += 1;
    }
}
