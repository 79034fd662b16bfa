//! Simulated process table: tracks PIDs allocated by successful `fork`
//! requests and their recorded exit status, so a `wait4` against a child
//! whose exit has already been observed can be answered without a
//! further round-trip.

use std::collections::HashMap;

use sabfs_image::FdAllocator;

/// Base PID handed out for the first simulated child.
pub const PID_BASE: i32 = 20000;

/// At most this many simulated children are tracked at once.
pub const MAX_ENTRIES: usize = 64;

struct Entry {
    exited: bool,
    exit_code: i32,
}

pub struct ProcessTable {
    entries: HashMap<i32, Entry>,
    alloc: FdAllocator,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    pub fn new() -> Self {
        ProcessTable {
            entries: HashMap::new(),
            alloc: FdAllocator::new(PID_BASE, PID_BASE + MAX_ENTRIES as i32),
        }
    }

    /// Record a new child. Returns `None` if the table is full.
    pub fn record_fork(&mut self) -> Option<i32> {
        let entries = &self.entries;
        let pid = self.alloc.alloc(|pid| entries.contains_key(&pid))?;
        self.entries.insert(pid, Entry { exited: false, exit_code: 0 });
        Some(pid)
    }

    /// Record that `pid` has exited with `exit_code`. A no-op if `pid`
    /// was never recorded by `record_fork` (this table only tracks
    /// children it allocated itself).
    pub fn record_exit(&mut self, pid: i32, exit_code: i32) {
        if let Some(entry) = self.entries.get_mut(&pid) {
            entry.exited = true;
            entry.exit_code = exit_code;
        }
    }

    /// If `pid` is a known, already-exited child, consume its entry and
    /// return the encoded `wait4` status word. Otherwise `None` — the
    /// caller falls back to the IPC timeout path.
    pub fn try_wait(&mut self, pid: i32) -> Option<i32> {
        match self.entries.get(&pid) {
            Some(entry) if entry.exited => {
                let status = (entry.exit_code & 0xff) << 8;
                self.entries.remove(&pid);
                Some(status)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_then_exit_then_wait_returns_the_encoded_status() {
        let mut table = ProcessTable::new();
        let pid = table.record_fork().unwrap();
        table.record_exit(pid, 7);
        assert_eq!(table.try_wait(pid), Some(7 << 8));
        // Consumed: a second wait on the same pid finds nothing.
        assert_eq!(table.try_wait(pid), None);
    }

    #[test]
    fn wait_on_a_running_child_returns_none() {
        let mut table = ProcessTable::new();
        let pid = table.record_fork().unwrap();
        assert_eq!(table.try_wait(pid), None);
    }

    #[test]
    fn wait_on_an_unknown_pid_returns_none() {
        let mut table = ProcessTable::new();
        assert_eq!(table.try_wait(99999), None);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Fork,
        Exit(u8),
        Wait,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Fork),
            any::<u8>().prop_map(Op::Exit),
            Just(Op::Wait),
        ]
    }

    proptest! {
        /// Every pid `record_fork` hands out stays inside `[PID_BASE,
        /// PID_BASE + MAX_ENTRIES)`, and `try_wait` only ever reports a
        /// status for a pid that has actually been recorded as exited —
        /// never for one still running or never forked at all.
        #[test]
        fn fork_exit_wait_sequences_only_report_status_for_exited_children(
            ops in prop::collection::vec(op_strategy(), 0..64)
        ) {
            let mut table = ProcessTable::new();
            let mut live: Vec<i32> = Vec::new();
            let mut exited: HashMap<i32, u8> = HashMap::new();

            for op in ops {
                match op {
                    Op::Fork => {
                        if let Some(pid) = table.record_fork() {
                            prop_assert!(pid >= PID_BASE && pid < PID_BASE + MAX_ENTRIES as i32);
                            live.push(pid);
                        }
                    }
                    Op::Exit(code) => {
                        if let Some(pid) = live.pop() {
                            table.record_exit(pid, code as i32);
                            exited.insert(pid, code);
                        }
                    }
                    Op::Wait => {
                        let next = exited.keys().next().copied();
                        if let Some(pid) = next {
                            let code = exited.remove(&pid).unwrap();
                            prop_assert_eq!(table.try_wait(pid), Some((code as i32 & 0xff) << 8));
                        } else if let Some(&pid) = live.last() {
                            prop_assert_eq!(table.try_wait(pid), None);
                        }
                    }
                }
            }
        }
    }
}
