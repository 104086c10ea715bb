//! Tessera VM core runtime
//!
//! Chunk storage, cooperative task scheduling, broadcast routing, and the
//! framed byte link to the IDE. The byte-code interpreter is external: it
//! advances the tasks this crate schedules and reports back through the
//! completion hooks on [`Runtime`].

pub mod dispatch;
pub mod error;
pub mod host;
pub mod opcodes;
pub mod ring;
pub mod scheduler;
pub mod types;

pub use dispatch::Runtime;
pub use error::TaskError;
pub use host::HostPort;
pub use ring::OutputRing;
pub use scheduler::TaskTable;
pub use tessera_wire::Value;
pub use types::*;
