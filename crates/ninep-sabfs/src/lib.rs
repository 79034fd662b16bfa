//! 9p VFS operation-vector adapter: the slow-path / fallback filesystem
//! surface the guest kernel's virtio-9p driver talks to. Delegates every
//! operation onto the same shared image the syscall fast path
//! accelerates, so a path that falls through the classifier (or simply
//! lies outside the accelerated prefix) still resolves consistently.

mod adapter;
mod error;
mod errno_abi;
mod path;

pub use adapter::{NinepAdapter, AT_REMOVEDIR};
pub use error::{NinepError, NinepResult};
pub use path::name_to_path;
