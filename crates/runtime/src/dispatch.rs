//! Message dispatcher
//!
//! [`Runtime`] owns the chunk, task, and variable tables, the persistence
//! log, the output ring, and the receive buffer: one owner rather than
//! globals, so the VM stays embeddable. One [`tick`](Runtime::tick) drains
//! one output byte, pulls one batch of inbound bytes, and dispatches at most
//! one frame; the external interpreter runs its quantum between ticks.

use tracing::{debug, info, instrument, trace};

use tessera_persist::{RecordLog, RecordRef, RecordType};
use tessera_wire::frame::{self, Deframe, FrameKind};
use tessera_wire::value::TAG_STRING;
use tessera_wire::{decode_value, encode_value, MessageType, Value};

use crate::error::TaskError;
use crate::host::HostPort;
use crate::ring::OutputRing;
use crate::scheduler::{broadcast_receivers, StartOutcome, TaskTable};
use crate::types::{
    ChunkAttr, ChunkEntry, ChunkType, TaskStatus, MAX_CHUNKS, MAX_VARS, VM_VERSION,
};

/// Receive buffer size
pub const RCVBUF_SIZE: usize = 1024;
/// Inter-byte timeout before an incomplete frame is abandoned
const RCV_TIMEOUT_USECS: u32 = 20_000;
/// Ceiling on a diagnostic string body, tag byte included
const DIAGNOSTIC_BYTES: usize = 200;
/// Arg byte marking a diagnostic rather than a task's output
const DIAGNOSTIC_ARG: u8 = 255;
/// Ring headroom kept when pushing a broadcast to the IDE
const BROADCAST_HEADROOM: usize = 50;

/// The VM core runtime
pub struct Runtime {
    chunks: [ChunkEntry; MAX_CHUNKS],
    vars: Vec<Value>,
    tasks: TaskTable,
    log: RecordLog,
    ring: OutputRing,
    rcv: [u8; RCVBUF_SIZE],
    rcv_count: usize,
    last_rcv_time: u32,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_log(RecordLog::new())
    }

    /// Build a runtime over an existing log (e.g. read back from flash);
    /// follow with [`restore`](Self::restore) to rebuild the chunk table.
    pub fn with_log(log: RecordLog) -> Self {
        info!(version = VM_VERSION, "runtime created");
        Runtime {
            chunks: [ChunkEntry::default(); MAX_CHUNKS],
            vars: vec![Value::Int(0); MAX_VARS],
            tasks: TaskTable::new(),
            log,
            ring: OutputRing::new(),
            rcv: [0; RCVBUF_SIZE],
            rcv_count: 0,
            last_rcv_time: 0,
        }
    }

    /// Rebuild the chunk table from the log: the latest non-deleted code
    /// record per index wins. Part of the boot sequence, before
    /// [`start_all`](Self::start_all).
    #[instrument(skip(self))]
    pub fn restore(&mut self) {
        let mut record = self.log.record_after(None);
        while let Some(r) = record {
            if let Some(header) = self.log.header(r) {
                match header.record_type {
                    RecordType::ChunkCode => {
                        if let Some(chunk_type) = ChunkType::from_u8(header.aux) {
                            self.chunks[header.index as usize] = ChunkEntry {
                                chunk_type,
                                code: Some(r),
                            };
                        }
                    }
                    RecordType::ChunkDeleted => {
                        self.chunks[header.index as usize].clear();
                    }
                    _ => {}
                }
            }
            record = self.log.record_after(Some(r));
        }
        info!(chunks = self.chunk_count(), "chunk table restored from log");
    }

    // ===== Tick =====

    /// One dispatcher tick: drain one output byte, gather inbound bytes,
    /// process at most one frame.
    pub fn tick(&mut self, host: &mut dyn HostPort) {
        self.ring.drain_one(host);

        let mut bytes_read = host.read_bytes(&mut self.rcv[self.rcv_count..]);
        self.rcv_count += bytes_read;
        if self.rcv_count == 0 {
            return;
        }
        while bytes_read > 0 {
            bytes_read = host.read_bytes(&mut self.rcv[self.rcv_count..]);
            self.rcv_count += bytes_read;
            self.last_rcv_time = host.microsecs();
        }

        match frame::deframe(&self.rcv[..self.rcv_count]) {
            Deframe::Empty => {}
            Deframe::Incomplete => {
                if self.receive_timeout(host) {
                    trace!("incomplete frame timed out, resynchronising");
                    self.resync_after(1);
                }
            }
            Deframe::Invalid => {
                // dropped bytes on the link; hunt for the next frame start
                trace!("bad frame, resynchronising");
                self.resync_after(1);
            }
            Deframe::Frame {
                kind,
                message,
                arg,
                body,
                consumed,
            } => {
                let body = self.rcv[body].to_vec();
                self.dispatch(host, kind, message, arg, &body);
                self.resync_after(consumed);
            }
        }
    }

    fn receive_timeout(&mut self, host: &mut dyn HostPort) -> bool {
        let usecs = host.microsecs();
        if usecs < self.last_rcv_time {
            self.last_rcv_time = 0; // clock wrap
        }
        usecs - self.last_rcv_time > RCV_TIMEOUT_USECS
    }

    /// Scan for the next frame start at or after `from` and shift it to the
    /// front; inter-frame garbage goes with it.
    fn resync_after(&mut self, from: usize) {
        match frame::resync_from(&self.rcv[..self.rcv_count], from) {
            Some(start) => {
                self.rcv.copy_within(start..self.rcv_count, 0);
                self.rcv_count -= start;
            }
            None => self.rcv_count = 0,
        }
    }

    fn dispatch(
        &mut self,
        host: &mut dyn HostPort,
        kind: FrameKind,
        message: u8,
        arg: u8,
        body: &[u8],
    ) {
        let Ok(message) = MessageType::try_from(message) else {
            trace!(message, "unknown message type ignored");
            return;
        };
        use MessageType::*;
        match (kind, message) {
            (FrameKind::Short, DeleteChunk) => self.delete_chunk(arg),
            (FrameKind::Short, StartChunk) => self.start_task_for_chunk(arg),
            (FrameKind::Short, StopChunk) => self.stop_task_for_chunk(arg),
            (FrameKind::Short, StartAll) => self.start_all(),
            (FrameKind::Short, StopAll) => {
                self.stop_all_tasks();
                self.output_string("All tasks stopped");
            }
            (FrameKind::Short, GetVar) => self.send_variable_value(arg),
            (FrameKind::Short, DeleteVar) => self.delete_var(arg),
            (FrameKind::Short, DeleteComment) => self.delete_comment(arg),
            (FrameKind::Short, GetVersion) => self.send_version(host),
            (FrameKind::Short, GetAllCode) => self.send_all_code(host),
            (FrameKind::Short, DeleteAllCode) => self.delete_all_chunks(),
            (FrameKind::Short, SystemReset) => host.system_reset(),
            (FrameKind::Short, Ping) => self.send_short(Ping, 0),
            (FrameKind::Long, ChunkCode) => self.store_chunk(arg, body),
            (FrameKind::Long, SetVar) => self.set_variable_value(arg, body),
            (FrameKind::Long, Broadcast) => self.start_receivers_of_broadcast(body),
            (FrameKind::Long, ChunkAttribute) => self.store_chunk_attribute(arg, body),
            (FrameKind::Long, VarName) => self.store_var_name(arg, body),
            (FrameKind::Long, Comment) => self.store_comment(arg, body),
            (FrameKind::Long, CommentPosition) => self.store_comment_position(arg, body),
            _ => trace!(?message, ?kind, "message ignored"),
        }
    }

    // ===== Chunk store =====

    /// Store a code chunk: the first body byte is the chunk type, the rest is
    /// the compiled code.
    pub fn store_chunk(&mut self, index: u8, body: &[u8]) {
        if index as usize >= MAX_CHUNKS {
            return;
        }
        let Some((&type_byte, code)) = body.split_first() else {
            return;
        };
        let Some(chunk_type) = ChunkType::from_u8(type_byte) else {
            trace!(chunk = index, type_byte, "unknown chunk type ignored");
            return;
        };
        let record = self
            .log
            .append(RecordType::ChunkCode, index, type_byte, code);
        self.chunks[index as usize] = ChunkEntry {
            chunk_type,
            code: Some(record),
        };
        debug!(chunk = index, ?chunk_type, bytes = code.len(), "code chunk stored");
    }

    /// Delete a chunk: its task is cancelled first, then the deletion is
    /// persisted.
    pub fn delete_chunk(&mut self, index: u8) {
        if index as usize >= MAX_CHUNKS {
            return;
        }
        self.stop_task_for_chunk(index);
        self.chunks[index as usize].clear();
        self.log.append(RecordType::ChunkDeleted, index, 0, &[]);
        debug!(chunk = index, "code chunk deleted");
    }

    pub fn delete_all_chunks(&mut self) {
        self.stop_all_tasks();
        for index in 0..MAX_CHUNKS {
            if !self.chunks[index].is_unused() {
                self.log
                    .append(RecordType::ChunkDeleted, index as u8, 0, &[]);
            }
            self.chunks[index].clear();
        }
        debug!("all code chunks deleted");
    }

    fn store_chunk_attribute(&mut self, index: u8, body: &[u8]) {
        let Some((&attr_byte, rest)) = body.split_first() else {
            return;
        };
        if index as usize >= MAX_CHUNKS || ChunkAttr::from_u8(attr_byte).is_none() {
            return;
        }
        self.log
            .append(RecordType::ChunkAttribute, index, attr_byte, rest);
        trace!(chunk = index, attr = attr_byte, "chunk attribute stored");
    }

    fn store_var_name(&mut self, index: u8, body: &[u8]) {
        self.log.append(RecordType::VarName, index, 0, body);
    }

    fn store_comment(&mut self, index: u8, body: &[u8]) {
        self.log.append(RecordType::Comment, index, 0, body);
    }

    fn store_comment_position(&mut self, index: u8, body: &[u8]) {
        if body.len() != 4 {
            return; // position is exactly two 16-bit coordinates
        }
        self.log.append(RecordType::CommentPosition, index, 0, body);
    }

    fn delete_var(&mut self, index: u8) {
        if (index as usize) >= MAX_VARS {
            return;
        }
        self.vars[index as usize] = Value::Int(0);
        self.log.append(RecordType::VarDeleted, index, 0, &[]);
    }

    fn delete_comment(&mut self, index: u8) {
        self.log.append(RecordType::CommentDeleted, index, 0, &[]);
    }

    // ===== Tasks =====

    /// Start a task for a chunk, if there is not one already
    pub fn start_task_for_chunk(&mut self, chunk: u8) {
        if chunk as usize >= MAX_CHUNKS {
            return;
        }
        let entry = self.chunks[chunk as usize];
        if entry.code.is_none() {
            return; // nothing to run
        }
        match self.tasks.start(chunk, &entry) {
            StartOutcome::Started(_) => self.send_short(MessageType::TaskStarted, chunk),
            StartOutcome::AlreadyRunning => {}
            StartOutcome::NoFreeSlot => self.output_string("No free task entries"),
        }
    }

    /// Stop the task for a chunk, if any
    pub fn stop_task_for_chunk(&mut self, chunk: u8) {
        if self.tasks.stop(chunk) {
            self.send_short(MessageType::TaskDone, chunk);
        }
    }

    /// Stop everything, then start every start and when-condition hat
    pub fn start_all(&mut self) {
        self.stop_all_tasks();
        for index in 0..MAX_CHUNKS {
            if self.chunks[index].chunk_type.is_auto_start() {
                self.start_task_for_chunk(index as u8);
            }
        }
    }

    /// Stop every live task, reporting each termination
    pub fn stop_all_tasks(&mut self) {
        for chunk in self.tasks.stop_all() {
            self.send_short(MessageType::TaskDone, chunk);
        }
    }

    /// Start every broadcast hat whose literal matches the payload
    pub fn start_receivers_of_broadcast(&mut self, msg: &[u8]) {
        for chunk in broadcast_receivers(&self.chunks, &self.log, msg) {
            self.start_task_for_chunk(chunk);
        }
    }

    // ===== Outbound messages =====

    fn send_short(&mut self, message: MessageType, arg: u8) {
        if !self.ring.has_space(frame::SHORT_FRAME_BYTES) {
            debug!(?message, "output ring full, message dropped");
            return;
        }
        self.ring.enqueue_all(&frame::short_frame(message, arg));
    }

    fn send_long(&mut self, message: MessageType, arg: u8, body: &[u8]) {
        if !self.ring.has_space(frame::LONG_HEADER_BYTES + body.len()) {
            debug!(?message, bytes = body.len(), "output ring full, message dropped");
            return;
        }
        self.ring
            .enqueue_all(&frame::long_header(message, arg, body.len()));
        self.ring.enqueue_all(body);
    }

    fn send_value_message(&mut self, message: MessageType, index: u8, value: &Value) {
        self.send_long(message, index, &encode_value(value));
    }

    /// Send a task's output value to the IDE
    pub fn output_value(&mut self, value: &Value, chunk: u8) {
        self.send_value_message(MessageType::OutputValue, chunk, value);
    }

    /// Send a diagnostic string to the IDE
    pub fn output_string(&mut self, s: &str) {
        let take = s.len().min(DIAGNOSTIC_BYTES - 1);
        let mut body = Vec::with_capacity(1 + take);
        body.push(TAG_STRING);
        body.extend_from_slice(&s.as_bytes()[..take]);
        self.send_long(MessageType::OutputValue, DIAGNOSTIC_ARG, &body);
    }

    /// Report natural completion of a task's run
    pub fn send_task_done(&mut self, chunk: u8) {
        self.send_short(MessageType::TaskDone, chunk);
    }

    /// Report a task runtime error: one-byte code plus the failing location
    pub fn send_task_error(&mut self, chunk: u8, error: TaskError, location: i32) {
        let mut body = [0u8; 5];
        body[0] = error.code();
        body[1..5].copy_from_slice(&location.to_le_bytes());
        self.send_long(MessageType::TaskError, chunk, &body);
    }

    /// Report the value a task's chunk returned
    pub fn send_task_return_value(&mut self, chunk: u8, value: &Value) {
        self.send_value_message(MessageType::TaskReturnedValue, chunk, value);
    }

    fn send_variable_value(&mut self, var: u8) {
        if (var as usize) < MAX_VARS {
            let value = self.vars[var as usize].clone();
            self.send_value_message(MessageType::VarValue, var, &value);
        }
    }

    fn set_variable_value(&mut self, var: u8, body: &[u8]) {
        if (var as usize) >= MAX_VARS {
            return;
        }
        match decode_value(body) {
            Ok(value) => self.vars[var as usize] = value,
            Err(error) => trace!(var, %error, "variable payload ignored"),
        }
    }

    fn send_version(&mut self, host: &mut dyn HostPort) {
        let text = format!("{} {}", VM_VERSION, host.board_type());
        let mut body = Vec::with_capacity(1 + text.len());
        body.push(TAG_STRING);
        body.extend_from_slice(text.as_bytes());
        self.send_long(MessageType::Version, 0, &body);
    }

    /// Push a broadcast raised by a script up to the IDE. Privileged: spins
    /// the ring down until the frame fits, with headroom left so queued
    /// status messages still have room behind it.
    pub fn send_broadcast_to_ide(&mut self, host: &mut dyn HostPort, msg: &[u8]) {
        self.ring
            .wait_for_space(host, msg.len() + BROADCAST_HEADROOM);
        self.send_long(MessageType::Broadcast, 0, msg);
    }

    // ===== Code dump =====

    /// Compact the store, then send every chunk's code and attributes.
    /// Privileged: each frame waits for ring space rather than dropping.
    #[instrument(skip(self, host))]
    fn send_all_code(&mut self, host: &mut dyn HostPort) {
        self.log.compact();
        self.rebind_records();
        for index in 0..MAX_CHUNKS {
            let Some(code) = self.chunks[index].code else {
                continue;
            };
            let Some(body) = self.log.body_bytes(code) else {
                continue;
            };
            self.ring
                .wait_for_space(host, frame::LONG_HEADER_BYTES + body.len());
            self.send_long(MessageType::ChunkCode, index as u8, &body);
            self.send_chunk_attributes(host, index as u8);
        }
        debug!("code dump sent");
    }

    /// Send the latest live attributes of one chunk, in a stable order
    fn send_chunk_attributes(&mut self, host: &mut dyn HostPort, chunk: u8) {
        let mut position = None;
        let mut block_source = None;
        let mut text_source = None;
        let mut record = self.log.record_after(None);
        while let Some(r) = record {
            if let Some(header) = self.log.header(r) {
                if header.index == chunk {
                    match header.record_type {
                        RecordType::ChunkAttribute => match ChunkAttr::from_u8(header.aux) {
                            Some(ChunkAttr::Position) => position = Some(r),
                            Some(ChunkAttr::BlockSource) => block_source = Some(r),
                            Some(ChunkAttr::TextSource) => text_source = Some(r),
                            None => {}
                        },
                        RecordType::ChunkDeleted => {
                            position = None;
                            block_source = None;
                            text_source = None;
                        }
                        _ => {}
                    }
                }
            }
            record = self.log.record_after(Some(r));
        }
        let ordered = [
            (ChunkAttr::BlockSource, block_source),
            (ChunkAttr::TextSource, text_source),
            (ChunkAttr::Position, position),
        ];
        for (attr, record) in ordered {
            if let Some(r) = record {
                self.send_attribute_message(host, chunk, attr, r);
            }
        }
    }

    fn send_attribute_message(
        &mut self,
        host: &mut dyn HostPort,
        chunk: u8,
        attr: ChunkAttr,
        record: RecordRef,
    ) {
        let Some(words) = self.log.body_bytes(record) else {
            return;
        };
        let mut body = Vec::with_capacity(1 + words.len());
        body.push(attr as u8);
        body.extend_from_slice(&words);
        self.ring
            .wait_for_space(host, frame::LONG_HEADER_BYTES + body.len());
        self.send_long(MessageType::ChunkAttribute, chunk, &body);
    }

    /// Compaction relocated every record; re-resolve the handles held by the
    /// chunk table and by live tasks.
    fn rebind_records(&mut self) {
        let mut record = self.log.record_after(None);
        while let Some(r) = record {
            if let Some(header) = self.log.header(r) {
                if header.record_type == RecordType::ChunkCode {
                    let entry = &mut self.chunks[header.index as usize];
                    if !entry.is_unused() {
                        entry.code = Some(r);
                    }
                }
            }
            record = self.log.record_after(Some(r));
        }
        let codes: Vec<Option<RecordRef>> = self
            .tasks
            .tasks()
            .iter()
            .map(|t| self.chunks[t.current_chunk_index as usize].code)
            .collect();
        for (task, code) in self.tasks.tasks_mut().iter_mut().zip(codes) {
            if task.status != TaskStatus::Unused {
                task.code = code;
            }
        }
    }

    // ===== Accessors =====

    pub fn chunk(&self, index: u8) -> &ChunkEntry {
        &self.chunks[index as usize]
    }

    /// Chunks currently holding code
    pub fn chunk_count(&self) -> usize {
        self.chunks.iter().filter(|c| !c.is_unused()).count()
    }

    pub fn variable(&self, index: u8) -> &Value {
        &self.vars[index as usize]
    }

    /// Mutable variable access for the interpreter
    pub fn variable_mut(&mut self, index: u8) -> &mut Value {
        &mut self.vars[index as usize]
    }

    pub fn task_table(&self) -> &TaskTable {
        &self.tasks
    }

    /// Mutable task access for the interpreter driving execution
    pub fn task_table_mut(&mut self) -> &mut TaskTable {
        &mut self.tasks
    }

    /// The code store and the mutable task table together, the pair the
    /// interpreter's step loop needs every quantum
    pub fn interp_view(&mut self) -> (&RecordLog, &mut TaskTable) {
        (&self.log, &mut self.tasks)
    }

    pub fn log(&self) -> &RecordLog {
        &self.log
    }

    /// Hand the log back, e.g. for the embedding to write it to flash
    pub fn into_log(self) -> RecordLog {
        self.log
    }

    /// Bytes queued on the output ring
    pub fn output_pending(&self) -> usize {
        self.ring.len()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
