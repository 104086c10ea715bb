//! Integration test harness for the Tessera VM
//!
//! Drives a [`Runtime`] against a scripted host port: tests queue IDE-side
//! bytes, tick the dispatcher, and read back what appeared on the wire.
//! Also provides builders for IDE frames and small compiled chunks.

use std::collections::VecDeque;

use tessera_runtime::{opcodes, ChunkType, HostPort, Runtime};
use tessera_wire::MessageType;

/// Host port with scripted input and captured output
pub struct ScriptedPort {
    pub input: VecDeque<u8>,
    pub sent: Vec<u8>,
    pub clock: u32,
    /// When false the link refuses bytes, like a saturated serial port
    pub accepting: bool,
    pub resets: usize,
}

impl ScriptedPort {
    pub fn new() -> Self {
        ScriptedPort {
            input: VecDeque::new(),
            sent: Vec::new(),
            clock: 0,
            accepting: true,
            resets: 0,
        }
    }
}

impl Default for ScriptedPort {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPort for ScriptedPort {
    fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.input.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.input.pop_front().unwrap();
        }
        n
    }

    fn send_byte(&mut self, byte: u8) -> bool {
        if self.accepting {
            self.sent.push(byte);
        }
        self.accepting
    }

    fn microsecs(&mut self) -> u32 {
        self.clock
    }

    fn system_reset(&mut self) {
        self.resets += 1;
    }

    fn board_type(&self) -> &str {
        "test-board"
    }
}

/// A runtime wired to a scripted port
pub struct TestHarness {
    pub runtime: Runtime,
    pub port: ScriptedPort,
}

impl TestHarness {
    pub fn new() -> Self {
        TestHarness {
            runtime: Runtime::new(),
            port: ScriptedPort::new(),
        }
    }

    /// Queue IDE-side bytes on the link
    pub fn feed(&mut self, bytes: &[u8]) {
        self.port.input.extend(bytes.iter().copied());
    }

    pub fn tick(&mut self) {
        self.runtime.tick(&mut self.port);
    }

    pub fn run_ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    pub fn advance_clock(&mut self, usecs: u32) {
        self.port.clock = self.port.clock.wrapping_add(usecs);
    }

    /// Tick until the output ring is empty, then take everything sent so far
    pub fn drain_wire(&mut self) -> Vec<u8> {
        while self.runtime.output_pending() > 0 {
            self.tick();
        }
        std::mem::take(&mut self.port.sent)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ===== IDE-side frame builders =====

/// A short frame as the IDE sends it
pub fn short_msg(message: MessageType, arg: u8) -> Vec<u8> {
    vec![0xFA, message.as_u8(), arg]
}

/// A long frame as the IDE sends it: terminated, length counts the terminator
pub fn long_msg(message: MessageType, arg: u8, body: &[u8]) -> Vec<u8> {
    let len = body.len() + 1;
    let mut bytes = Vec::with_capacity(5 + len);
    bytes.extend_from_slice(&[
        0xFB,
        message.as_u8(),
        arg,
        (len & 0xFF) as u8,
        ((len >> 8) & 0xFF) as u8,
    ]);
    bytes.extend_from_slice(body);
    bytes.push(0xFE);
    bytes
}

// ===== Chunk builders =====

/// A chunk-code message body: type byte plus compiled words
pub fn chunk_body(chunk_type: ChunkType, words: &[u32]) -> Vec<u8> {
    let mut body = vec![chunk_type as u8];
    for word in words {
        body.extend_from_slice(&word.to_le_bytes());
    }
    body
}

/// The smallest runnable script
pub fn command_chunk() -> Vec<u8> {
    chunk_body(
        ChunkType::Command,
        &[
            opcodes::instruction(opcodes::OP_INIT_LOCALS, 0),
            opcodes::instruction(opcodes::OP_HALT, 0),
        ],
    )
}

/// A hat launched by `start all`
pub fn start_hat_chunk() -> Vec<u8> {
    chunk_body(
        ChunkType::StartHat,
        &[
            opcodes::instruction(opcodes::OP_INIT_LOCALS, 0),
            opcodes::instruction(opcodes::OP_HALT, 0),
        ],
    )
}

/// A hat launched by a broadcast with the given name
pub fn broadcast_hat_chunk(name: &str) -> Vec<u8> {
    let mut words = vec![
        opcodes::instruction(opcodes::OP_INIT_LOCALS, 0),
        opcodes::instruction(opcodes::OP_PUSH_LITERAL, 1),
        opcodes::instruction(opcodes::OP_HALT, 0),
    ];
    words.extend(opcodes::literal_words(name));
    chunk_body(ChunkType::BroadcastHat, &words)
}

// ===== Wire parsing (VM-side frames carry no terminator) =====

/// One frame read back off the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Short { message: u8, arg: u8 },
    Long { message: u8, arg: u8, body: Vec<u8> },
}

impl WireFrame {
    pub fn message(&self) -> u8 {
        match self {
            WireFrame::Short { message, .. } | WireFrame::Long { message, .. } => *message,
        }
    }

    pub fn arg(&self) -> u8 {
        match self {
            WireFrame::Short { arg, .. } | WireFrame::Long { arg, .. } => *arg,
        }
    }
}

/// Split a captured byte stream into VM frames; panics on a malformed
/// stream so the failing test points at the corruption.
pub fn parse_frames(bytes: &[u8]) -> Vec<WireFrame> {
    let mut frames = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            0xFA => {
                assert!(i + 3 <= bytes.len(), "truncated short frame at {i}");
                frames.push(WireFrame::Short {
                    message: bytes[i + 1],
                    arg: bytes[i + 2],
                });
                i += 3;
            }
            0xFB => {
                assert!(i + 5 <= bytes.len(), "truncated long header at {i}");
                let len = bytes[i + 3] as usize | (bytes[i + 4] as usize) << 8;
                assert!(i + 5 + len <= bytes.len(), "truncated long body at {i}");
                frames.push(WireFrame::Long {
                    message: bytes[i + 1],
                    arg: bytes[i + 2],
                    body: bytes[i + 5..i + 5 + len].to_vec(),
                });
                i += 5 + len;
            }
            other => panic!("stray byte {other:#04x} at {i}"),
        }
    }
    frames
}

/// Frames of one message type
pub fn frames_of(frames: &[WireFrame], message: MessageType) -> Vec<WireFrame> {
    frames
        .iter()
        .filter(|f| f.message() == message.as_u8())
        .cloned()
        .collect()
}
