//! Classifies an intercepted `SYSCALL` entry and, where eligible,
//! completes it entirely in host code: computing RAX, advancing RIP, and
//! mirroring RCX, without the guest ever reaching kernel entry.

use std::sync::Arc;

use elf_cache::ElfCache;
use guest_mem::{read_guest_buffer, read_guest_string, write_guest_buffer, GuestMemory, MAX_PATH_LEN};
use process_ipc::{Opcode, Slot, DEFAULT_TIMEOUT};
use sabfs_vfs::{Vfs, ELF_CACHE_FD_BASE};
use tracing::{debug, instrument};

use crate::cpu::CpuState;
use crate::numbers::*;
use crate::statbuf::{write_stat, FlatStat};

/// Guest path prefix eligible for interception, and the image prefix it
/// is rewritten onto. The daemon populates this from
/// `FASTPATHD_ACCEL_PREFIX`/`FASTPATHD_IMAGE_PREFIX`; these defaults
/// match the documented example mount.
#[derive(Debug, Clone)]
pub struct Config {
    pub accel_prefix: String,
    pub image_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            accel_prefix: "/mnt/wasi1/".to_string(),
            image_prefix: "/pack/".to_string(),
        }
    }
}

impl Config {
    fn rewrite(&self, path: &str) -> Option<String> {
        path.strip_prefix(self.accel_prefix.as_str())
            .map(|tail| format!("{}{}", self.image_prefix, tail))
    }
}

/// Classifies and, where eligible, completes syscalls entirely on the
/// host side. One instance per worker thread.
pub struct Dispatcher {
    vfs: Arc<Vfs>,
    cache: Arc<ElfCache>,
    ipc: Arc<Slot>,
    config: Config,
    /// This worker's own simulated pid, as handed back by the fork that
    /// created it; used as the `EXIT` opcode's self-identifying argument.
    self_pid: i32,
}

impl Dispatcher {
    pub fn new(vfs: Arc<Vfs>, cache: Arc<ElfCache>, ipc: Arc<Slot>, config: Config, self_pid: i32) -> Self {
        Dispatcher { vfs, cache, ipc, config, self_pid }
    }

    /// Attempt to complete the syscall currently encoded in `cpu`
    /// entirely on the fast path. On success, `RAX`/`RIP`/`RCX` are
    /// updated and `true` is returned; on `false` the CPU state is left
    /// untouched and the caller must fall through to the guest kernel.
    #[instrument(level = "debug", skip(self, cpu, mem), fields(nr = cpu.syscall_nr()))]
    pub fn dispatch(&self, cpu: &mut CpuState, mem: &mut dyn GuestMemory, next_eip_addend: u64) -> bool {
        if !cpu.long_mode {
            return false;
        }
        let result = match cpu.syscall_nr() {
            OPEN => self.handle_open(cpu, mem),
            OPENAT => self.handle_openat(cpu, mem),
            CLOSE => self.handle_close(cpu),
            READ => self.handle_read(cpu, mem),
            WRITE => self.handle_write(cpu, mem),
            STAT => self.handle_stat(cpu, mem),
            FSTAT => self.handle_fstat(cpu, mem),
            CLONE | FORK | VFORK => self.handle_fork(),
            EXECVE => self.handle_execve(),
            EXIT | EXIT_GROUP => self.handle_exit(cpu),
            WAIT4 => self.handle_wait4(cpu, mem),
            _ => None,
        };

        match result {
            Some(rax) => {
                cpu.rax = rax as u64;
                cpu.rip = cpu.rip.wrapping_add(next_eip_addend);
                cpu.rcx = cpu.rip;
                debug!(rax, "completed on the fast path");
                true
            }
            None => false,
        }
    }

    fn handle_open(&self, cpu: &CpuState, mem: &dyn GuestMemory) -> Option<i64> {
        let path = read_guest_string(mem, cpu.rdi, MAX_PATH_LEN).ok()?;
        let image_path = self.config.rewrite(&path)?;
        Some(self.open_path(&image_path, cpu.rsi as i32, cpu.rdx as u32))
    }

    fn handle_openat(&self, cpu: &CpuState, mem: &dyn GuestMemory) -> Option<i64> {
        if cpu.rdi as i64 != AT_FDCWD {
            return None;
        }
        let path = read_guest_string(mem, cpu.rsi, MAX_PATH_LEN).ok()?;
        let image_path = self.config.rewrite(&path)?;
        Some(self.open_path(&image_path, cpu.rdx as i32, cpu.r10 as u32))
    }

    fn open_path(&self, image_path: &str, flags: i32, mode: u32) -> i64 {
        match self.vfs.open(image_path, flags, mode) {
            Ok(fd) => fd as i64,
            Err(e) => e.errno() as i64,
        }
    }

    fn handle_close(&self, cpu: &CpuState) -> Option<i64> {
        let fd = cpu.rdi as i32;
        if fd >= ELF_CACHE_FD_BASE {
            return Some(match self.cache.close(fd) {
                Ok(()) => 0,
                Err(e) => e.errno() as i64,
            });
        }
        if !self.vfs.owns(fd) {
            return None;
        }
        Some(match self.vfs.close(fd) {
            Ok(()) => 0,
            Err(e) => e.errno() as i64,
        })
    }

    fn handle_read(&self, cpu: &CpuState, mem: &mut dyn GuestMemory) -> Option<i64> {
        let fd = cpu.rdi as i32;
        let count = cpu.rdx.min(MAX_IO_LEN) as usize;
        let mut buf = vec![0u8; count];
        let n = if fd >= ELF_CACHE_FD_BASE {
            match self.cache.read(fd, &mut buf) {
                Ok(n) => n,
                Err(e) => return Some(e.errno() as i64),
            }
        } else if self.vfs.owns(fd) {
            match self.vfs.read(fd, &mut buf) {
                Ok(n) => n,
                Err(e) => return Some(e.errno() as i64),
            }
        } else {
            return None;
        };
        write_guest_buffer(mem, cpu.rsi, &buf[..n]).ok()?;
        Some(n as i64)
    }

    fn handle_write(&self, cpu: &CpuState, mem: &dyn GuestMemory) -> Option<i64> {
        let fd = cpu.rdi as i32;
        let count = cpu.rdx.min(MAX_IO_LEN) as usize;
        if fd >= ELF_CACHE_FD_BASE {
            // The preload cache is read-only program-loader storage; claim
            // the fd (it must never reach the kernel) but refuse the write.
            return Some(-(libc::EBADF as i64));
        }
        if !self.vfs.owns(fd) {
            return None;
        }
        let buf = read_guest_buffer(mem, cpu.rsi, count).ok()?;
        Some(match self.vfs.write(fd, &buf) {
            Ok(n) => n as i64,
            Err(e) => e.errno() as i64,
        })
    }

    fn handle_stat(&self, cpu: &CpuState, mem: &mut dyn GuestMemory) -> Option<i64> {
        let path = read_guest_string(mem, cpu.rdi, MAX_PATH_LEN).ok()?;
        let image_path = self.config.rewrite(&path)?;
        match self.vfs.stat(&image_path) {
            Ok(st) => {
                write_stat(mem, cpu.rsi, &FlatStat::from(st)).ok()?;
                Some(0)
            }
            Err(e) => Some(e.errno() as i64),
        }
    }

    fn handle_fstat(&self, cpu: &CpuState, mem: &mut dyn GuestMemory) -> Option<i64> {
        let fd = cpu.rdi as i32;
        if fd >= ELF_CACHE_FD_BASE {
            return Some(match self.cache.fstat(fd) {
                Ok(st) => {
                    write_stat(mem, cpu.rsi, &FlatStat::from(st)).ok()?;
                    0
                }
                Err(e) => e.errno() as i64,
            });
        }
        if !self.vfs.owns(fd) {
            return None;
        }
        Some(match self.vfs.fstat(fd) {
            Ok(st) => {
                write_stat(mem, cpu.rsi, &FlatStat::from(st)).ok()?;
                0
            }
            Err(e) => e.errno() as i64,
        })
    }

    fn handle_fork(&self) -> Option<i64> {
        Some(match self.ipc.post_request(Opcode::Fork, 0, 0, 0, "", DEFAULT_TIMEOUT) {
            Ok(pid) => pid,
            Err(e) => e.errno() as i64,
        })
    }

    /// Logged and side-channel-preloaded via IPC, but never completed on
    /// the fast path: rebuilding the guest address space is the kernel's
    /// job alone.
    fn handle_execve(&self) -> Option<i64> {
        debug!(self_pid = self.self_pid, "notifying supervisor of execve before falling through");
        self.ipc.post_fire_and_forget(Opcode::Exec, 0, 0, 0, "");
        None
    }

    /// Always deferred to the kernel after notifying the supervisor.
    fn handle_exit(&self, cpu: &CpuState) -> Option<i64> {
        let status = cpu.rdi as i64;
        debug!(self_pid = self.self_pid, status, "notifying supervisor of exit before falling through");
        self.ipc
            .post_fire_and_forget(Opcode::Exit, self.self_pid as i64, status, 0, "");
        None
    }

    fn handle_wait4(&self, cpu: &CpuState, mem: &mut dyn GuestMemory) -> Option<i64> {
        let pid = cpu.rdi as i64;
        let status_ptr = cpu.rsi;
        match self.ipc.post_request(Opcode::Wait, 0, pid, 0, "", DEFAULT_TIMEOUT) {
            Ok(status) => {
                if status_ptr != 0 {
                    write_guest_buffer(mem, status_ptr, &(status as u32).to_ne_bytes()).ok()?;
                }
                Some(pid)
            }
            Err(e) => Some(e.errno() as i64),
        }
    }
}
