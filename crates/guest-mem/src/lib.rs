//! Guest-memory access helpers sitting between the CPU state and host
//! buffers. Byte granularity keeps the implementation portable across
//! guest paging states; page boundaries and TLB misses are the load
//! port's problem, not this crate's.

use thiserror::Error;

/// Path strings pulled from guest memory are capped here before any host
/// use (filesystem invariant I4 in the design notes).
pub const MAX_PATH_LEN: usize = 512;

/// A single intercepted transfer is bounded at this many bytes, matching
/// the `count` clamp the dispatcher applies to `read`/`write`.
pub const MAX_TRANSFER_LEN: usize = 65536;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GuestMemError {
    #[error("guest virtual address out of range")]
    OutOfRange,
}

/// The data-port contract the interceptor needs from whatever backs
/// guest virtual memory (a DBT load/store port in production, a flat
/// buffer in tests).
pub trait GuestMemory {
    fn load_u8(&self, va: u64) -> Result<u8, GuestMemError>;
    fn store_u8(&mut self, va: u64, byte: u8) -> Result<(), GuestMemError>;
}

/// Fetch a NUL-terminated string, stopping at `max - 1` bytes if no NUL
/// is found first. Always NUL-terminates the returned `Vec` content
/// conceptually (the NUL itself is not included in the returned string).
pub fn read_guest_string(mem: &impl GuestMemory, va: u64, max: usize) -> Result<String, GuestMemError> {
    let cap = max.min(MAX_PATH_LEN).max(1);
    let mut bytes = Vec::with_capacity(cap);
    for i in 0..cap - 1 {
        let b = mem.load_u8(va.wrapping_add(i as u64))?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn read_guest_buffer(mem: &impl GuestMemory, va: u64, n: usize) -> Result<Vec<u8>, GuestMemError> {
    let n = n.min(MAX_TRANSFER_LEN);
    let mut buf = Vec::with_capacity(n);
    for i in 0..n {
        buf.push(mem.load_u8(va.wrapping_add(i as u64))?);
    }
    Ok(buf)
}

pub fn write_guest_buffer(mem: &mut impl GuestMemory, va: u64, data: &[u8]) -> Result<(), GuestMemError> {
    let n = data.len().min(MAX_TRANSFER_LEN);
    for (i, byte) in data[..n].iter().enumerate() {
        mem.store_u8(va.wrapping_add(i as u64), *byte)?;
    }
    Ok(())
}

/// A flat in-process buffer standing in for guest physical memory,
/// mapped 1:1 from virtual address 0. Used by tests and by anything in
/// this workspace that needs to drive the fast path without a real DBT
/// pipeline attached.
pub struct MockGuestMemory {
    bytes: Vec<u8>,
}

impl MockGuestMemory {
    pub fn new(size: usize) -> Self {
        MockGuestMemory { bytes: vec![0u8; size] }
    }

    pub fn write_at(&mut self, va: u64, data: &[u8]) {
        let start = va as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
    }

    pub fn read_at(&self, va: u64, n: usize) -> &[u8] {
        let start = va as usize;
        &self.bytes[start..start + n]
    }
}

impl GuestMemory for MockGuestMemory {
    fn load_u8(&self, va: u64) -> Result<u8, GuestMemError> {
        self.bytes.get(va as usize).copied().ok_or(GuestMemError::OutOfRange)
    }

    fn store_u8(&mut self, va: u64, byte: u8) -> Result<(), GuestMemError> {
        let slot = self.bytes.get_mut(va as usize).ok_or(GuestMemError::OutOfRange)?;
        *slot = byte;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_a_nul_terminated_string() {
        let mut mem = MockGuestMemory::new(64);
        mem.write_at(0, b"/mnt/wasi1/etc/hello\0");
        let s = read_guest_string(&mem, 0, MAX_PATH_LEN).unwrap();
        assert_eq!(s, "/mnt/wasi1/etc/hello");
    }

    #[test]
    fn truncates_at_max_minus_one_without_a_nul() {
        let mut mem = MockGuestMemory::new(16);
        mem.write_at(0, &[b'a'; 16]);
        let s = read_guest_string(&mem, 0, 8).unwrap();
        assert_eq!(s.len(), 7);
    }

    #[test]
    fn round_trips_a_buffer_through_write_then_read() {
        let mut mem = MockGuestMemory::new(64);
        write_guest_buffer(&mut mem, 10, b"hello").unwrap();
        let out = read_guest_buffer(&mem, 10, 5).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn clamps_transfers_to_the_maximum_length() {
        let mem = MockGuestMemory::new(MAX_TRANSFER_LEN + 16);
        let out = read_guest_buffer(&mem, 0, MAX_TRANSFER_LEN + 16).unwrap();
        assert_eq!(out.len(), MAX_TRANSFER_LEN);
    }
}
