//! Core runtime types
//!
//! Table entries and size constants for the chunk and task tables. Tables are
//! sized statically; the targets are small boards.

use tessera_persist::RecordRef;

/// Chunk table size; chunk indices are one byte on the wire
pub const MAX_CHUNKS: usize = 256;
/// Task table size
pub const MAX_TASKS: usize = 16;
/// Variable table size; variable indices are one byte on the wire
pub const MAX_VARS: usize = 256;

/// Reported in the version message
pub const VM_VERSION: &str = "v101";

/// What kind of script a chunk holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ChunkType {
    #[default]
    Unused = 0,
    Command = 1,
    Reporter = 2,
    Function = 3,
    StartHat = 4,
    WhenConditionHat = 5,
    BroadcastHat = 6,
}

impl ChunkType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        use ChunkType::*;
        match byte {
            0 => Some(Unused),
            1 => Some(Command),
            2 => Some(Reporter),
            3 => Some(Function),
            4 => Some(StartHat),
            5 => Some(WhenConditionHat),
            6 => Some(BroadcastHat),
            _ => None,
        }
    }

    /// Hats that `start all` launches
    pub fn is_auto_start(self) -> bool {
        matches!(self, ChunkType::StartHat | ChunkType::WhenConditionHat)
    }
}

/// One chunk table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkEntry {
    pub chunk_type: ChunkType,
    pub code: Option<RecordRef>,
}

impl ChunkEntry {
    pub fn is_unused(&self) -> bool {
        self.code.is_none() && self.chunk_type == ChunkType::Unused
    }

    pub fn clear(&mut self) {
        *self = ChunkEntry::default();
    }
}

/// Execution state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskStatus {
    #[default]
    Unused,
    Running,
    WaitingMicros,
    WaitingMillis,
    Polling,
    DoneWithValue,
}

/// One task table entry.
///
/// The instruction pointer is a word offset into the chunk's persistent
/// record, header included; `fp == 0` means the task is not inside a
/// function call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Task {
    pub status: TaskStatus,
    /// Chunk this task was started for
    pub task_chunk_index: u8,
    /// Chunk currently executing; differs from `task_chunk_index` during calls
    pub current_chunk_index: u8,
    pub code: Option<RecordRef>,
    pub ip: usize,
    pub sp: usize,
    pub fp: usize,
    /// Interpreter scratch for timed waits
    pub wake_time: u32,
}

impl Task {
    pub fn clear(&mut self) {
        *self = Task::default();
    }
}

/// Chunk attribute ids carried in the aux byte of attribute records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkAttr {
    Position = 0,
    BlockSource = 1,
    TextSource = 2,
}

/// Number of defined attribute ids
pub const ATTRIBUTE_COUNT: usize = 3;

impl ChunkAttr {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ChunkAttr::Position),
            1 => Some(ChunkAttr::BlockSource),
            2 => Some(ChunkAttr::TextSource),
            _ => None,
        }
    }
}
