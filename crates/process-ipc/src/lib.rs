//! Process-lifecycle IPC: a fixed-size shared-slot RPC between a worker
//! and the host supervisor, carrying `fork`/`exec`/`exit`/`wait4`
//! requests that the syscall fast path cannot service purely from local
//! state.

pub mod process_table;
pub mod slot;
mod supervisor;

pub use process_table::{ProcessTable, MAX_ENTRIES, PID_BASE};
pub use slot::{IpcError, IpcResult, Opcode, Request, Slot, DEFAULT_TIMEOUT, EXIT_WAIT, PATH_FIELD_LEN};
pub use supervisor::Supervisor;
