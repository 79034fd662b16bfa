//! The minimal projection of x86-64 architectural state the interceptor
//! needs. Everything else on the guest CPU is untouched on the fast
//! path.

/// Registers read and written by the interceptor, per the `SYSCALL`
/// fast-entry ABI: RAX/RDI/RSI/RDX/R10 carry the syscall number and its
/// first four arguments; RCX/R11 carry the saved return RIP/RFLAGS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuState {
    pub rax: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub r10: u64,
    pub rcx: u64,
    pub r11: u64,
    pub rip: u64,
    pub long_mode: bool,
}

impl CpuState {
    pub fn syscall_nr(&self) -> i64 {
        self.rax as i64
    }
}
