//! Task table
//!
//! Fixed-size table of cooperative tasks plus the broadcast receiver match.
//! The interpreter advances Running tasks round-robin elsewhere; this module
//! only manages the table. `task_count` stays tight: entries at and beyond it
//! are unused, and stopping the last task pulls it back down.

use tracing::trace;

use tessera_persist::{RecordLog, RECORD_HEADER_WORDS};

use crate::opcodes;
use crate::types::{ChunkEntry, ChunkType, Task, TaskStatus, MAX_TASKS};

/// Result of a task start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new task occupies this slot
    Started(usize),
    /// The chunk already has a live task
    AlreadyRunning,
    /// Every slot is in use
    NoFreeSlot,
}

/// The task table
#[derive(Debug)]
pub struct TaskTable {
    tasks: [Task; MAX_TASKS],
    task_count: usize,
}

impl TaskTable {
    pub fn new() -> Self {
        TaskTable {
            tasks: [Task::default(); MAX_TASKS],
            task_count: 0,
        }
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Mutable access for the interpreter driving the tasks
    pub fn tasks_mut(&mut self) -> &mut [Task] {
        &mut self.tasks
    }

    /// Slot of the live task for a chunk, if any
    pub fn running_for_chunk(&self, chunk: u8) -> Option<usize> {
        self.tasks[..self.task_count]
            .iter()
            .position(|t| t.task_chunk_index == chunk && t.status != TaskStatus::Unused)
    }

    /// Start a task for a chunk. Idempotent: a chunk with a live task is left
    /// alone.
    pub fn start(&mut self, chunk: u8, entry: &ChunkEntry) -> StartOutcome {
        if self.running_for_chunk(chunk).is_some() {
            return StartOutcome::AlreadyRunning;
        }
        let Some(slot) = self
            .tasks
            .iter()
            .position(|t| t.status == TaskStatus::Unused)
        else {
            return StartOutcome::NoFreeSlot;
        };
        self.tasks[slot] = Task {
            status: TaskStatus::Running,
            task_chunk_index: chunk,
            current_chunk_index: chunk,
            code: entry.code,
            ip: RECORD_HEADER_WORDS,
            sp: 0,
            fp: 0,
            wake_time: 0,
        };
        if slot >= self.task_count {
            self.task_count = slot + 1;
        }
        trace!(chunk, slot, "task started");
        StartOutcome::Started(slot)
    }

    /// Stop the live task for a chunk; `true` if one existed
    pub fn stop(&mut self, chunk: u8) -> bool {
        let Some(slot) = self.running_for_chunk(chunk) else {
            return false;
        };
        self.tasks[slot].clear();
        if slot == self.task_count - 1 {
            self.task_count -= 1;
        }
        trace!(chunk, slot, "task stopped");
        true
    }

    /// Stop everything; returns the chunk index of each task that was live,
    /// in slot order, so the caller can report each termination.
    pub fn stop_all(&mut self) -> Vec<u8> {
        let stopped: Vec<u8> = self.tasks[..self.task_count]
            .iter()
            .filter(|t| t.status != TaskStatus::Unused)
            .map(|t| t.task_chunk_index)
            .collect();
        for task in &mut self.tasks {
            task.clear();
        }
        self.task_count = 0;
        stopped
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Chunks whose broadcast hat literal matches the payload byte-exact.
///
/// Instruction 0 of a broadcast hat is `initLocals`; the hat's name is pushed
/// by the `pushLiteral` right after it. A chunk that does not look like that
/// is silently skipped.
pub fn broadcast_receivers(chunks: &[ChunkEntry], log: &RecordLog, msg: &[u8]) -> Vec<u8> {
    chunks
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            if entry.chunk_type != ChunkType::BroadcastHat {
                return None;
            }
            let code = log.words(entry.code?)?;
            let name = opcodes::literal_string(code, RECORD_HEADER_WORDS + 1)?;
            (name.as_bytes() == msg).then_some(index as u8)
        })
        .collect()
}
