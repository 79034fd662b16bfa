//! SYSCALL fast-entry classifier: recognizes accelerated file I/O and
//! process-lifecycle syscalls and completes them against the shared
//! image, preload cache, and IPC slot without the guest kernel ever
//! running.

mod cpu;
mod dispatcher;
mod numbers;
mod statbuf;

pub use cpu::CpuState;
pub use dispatcher::{Config, Dispatcher};
pub use numbers::{AT_FDCWD, MAX_IO_LEN};
pub use statbuf::{FlatStat, STAT_BUF_LEN};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use elf_cache::ElfCache;
    use guest_mem::MockGuestMemory;
    use process_ipc::Slot;
    use sabfs_image::Image;
    use sabfs_vfs::Vfs;

    fn fixture() -> (Dispatcher, Arc<Vfs>) {
        let image = Arc::new(Image::new());
        image.import_file("/pack/etc/hello", b"hi\n", 0o644).unwrap();
        let vfs = Arc::new(Vfs::new(image));
        let cache = Arc::new(ElfCache::new());
        let ipc = Arc::new(Slot::new());
        let dispatcher = Dispatcher::new(Arc::clone(&vfs), cache, ipc, Config::default(), 0);
        (dispatcher, vfs)
    }

    fn syscall_cpu(nr: i64, rdi: u64, rsi: u64, rdx: u64, r10: u64) -> CpuState {
        CpuState {
            rax: nr as u64,
            rdi,
            rsi,
            rdx,
            r10,
            rcx: 0,
            r11: 0,
            rip: 0x1000,
            long_mode: true,
        }
    }

    fn write_str(mem: &mut MockGuestMemory, va: u64, s: &str) {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        mem.write_at(va, &bytes);
    }

    #[test]
    fn open_read_close_under_prefix_matches_the_scenario() {
        let (dispatcher, _vfs) = fixture();
        let mut mem = MockGuestMemory::new(4096);
        write_str(&mut mem, 0, "/mnt/wasi1/etc/hello");

        let mut cpu = syscall_cpu(numbers::OPENAT, AT_FDCWD as u64, 0, libc::O_RDONLY as u64, 0);
        assert!(dispatcher.dispatch(&mut cpu, &mut mem, 2));
        let fd = cpu.rax as i32;
        assert!((sabfs_vfs::SABFS_FD_BASE..sabfs_vfs::ELF_CACHE_FD_BASE).contains(&fd));

        let mut cpu = syscall_cpu(numbers::READ, fd as u64, 256, 16, 0);
        assert!(dispatcher.dispatch(&mut cpu, &mut mem, 2));
        assert_eq!(cpu.rax, 3);
        assert_eq!(mem.read_at(256, 3), b"hi\n");

        let mut cpu = syscall_cpu(numbers::CLOSE, fd as u64, 0, 0, 0);
        assert!(dispatcher.dispatch(&mut cpu, &mut mem, 2));
        assert_eq!(cpu.rax, 0);

        let mut cpu = syscall_cpu(numbers::READ, fd as u64, 256, 16, 0);
        assert!(dispatcher.dispatch(&mut cpu, &mut mem, 2));
        assert_eq!(cpu.rax as i64, -(libc::EBADF as i64));
    }

    #[test]
    fn path_outside_prefix_falls_through() {
        let (dispatcher, _vfs) = fixture();
        let mut mem = MockGuestMemory::new(4096);
        write_str(&mut mem, 0, "/tmp/x");
        let mut cpu = syscall_cpu(numbers::OPEN, 0, 0, 0, 0);
        let before = cpu;
        assert!(!dispatcher.dispatch(&mut cpu, &mut mem, 2));
        assert_eq!(cpu, before);
    }

    #[test]
    fn fd_in_cache_range_is_checked_before_vfs_ownership() {
        let (dispatcher, vfs) = fixture();
        // A SABFS-range fd never collides with the cache range, but the
        // dispatcher still must not call `vfs.owns` for a cache-range fd
        // before the cache's own claim check runs.
        let fd = vfs.open("/pack/etc/hello", libc::O_RDONLY, 0).unwrap();
        assert!((sabfs_vfs::SABFS_FD_BASE..sabfs_vfs::ELF_CACHE_FD_BASE).contains(&fd));

        let mut mem = MockGuestMemory::new(4096);
        let mut cpu = syscall_cpu(numbers::CLOSE, sabfs_vfs::ELF_CACHE_FD_BASE as u64, 0, 0, 0);
        assert!(dispatcher.dispatch(&mut cpu, &mut mem, 2));
        assert_eq!(cpu.rax as i64, -(libc::EBADF as i64));
        vfs.close(fd).unwrap();
    }

    #[test]
    fn ipc_timeout_on_wait4_reports_etimedout_as_a_handled_result() {
        let image = Arc::new(Image::new());
        let vfs = Arc::new(Vfs::new(image));
        let cache = Arc::new(ElfCache::new());
        let ipc = Arc::new(Slot::new());
        let dispatcher = Dispatcher::new(vfs, cache, ipc, Config::default(), 0);
        let mut mem = MockGuestMemory::new(4096);

        let mut cpu = syscall_cpu(numbers::WAIT4, 99999, 0, 0, 0);
        let start = std::time::Instant::now();
        assert!(dispatcher.dispatch(&mut cpu, &mut mem, 2));
        assert_eq!(cpu.rax as i64, -(libc::ETIMEDOUT as i64));
        assert!(start.elapsed() < process_ipc::DEFAULT_TIMEOUT + Duration::from_millis(200));
    }

    #[test]
    fn execve_always_falls_through_after_notifying_the_supervisor() {
        let (dispatcher, _vfs) = fixture();
        let mut mem = MockGuestMemory::new(4096);
        write_str(&mut mem, 0, "/pack/bin/sh");
        let mut cpu = syscall_cpu(numbers::EXECVE, 0, 0, 0, 0);
        assert!(!dispatcher.dispatch(&mut cpu, &mut mem, 2));
    }
}
