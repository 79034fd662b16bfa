//! The supervisor side of the process-lifecycle protocol: owns one slot
//! per registered worker and the simulated process table, and answers
//! FORK/EXEC/EXIT/WAIT requests as they land.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::process_table::ProcessTable;
use crate::slot::{Opcode, Slot};

pub struct Supervisor {
    slots: Mutex<HashMap<u32, Arc<Slot>>>,
    process_table: Mutex<ProcessTable>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Supervisor {
            slots: Mutex::new(HashMap::new()),
            process_table: Mutex::new(ProcessTable::new()),
        }
    }

    /// Register a new worker and return its slot handle. The worker
    /// posts requests on this handle; the supervisor services it via
    /// `service_once`/`service_all`.
    pub fn register_worker(&self, worker_id: u32) -> Arc<Slot> {
        let slot = Arc::new(Slot::new());
        self.slots.lock().unwrap().insert(worker_id, Arc::clone(&slot));
        slot
    }

    pub fn slot(&self, worker_id: u32) -> Option<Arc<Slot>> {
        self.slots.lock().unwrap().get(&worker_id).cloned()
    }

    /// Every currently registered worker id, for host-side inspection.
    pub fn worker_ids(&self) -> Vec<u32> {
        self.slots.lock().unwrap().keys().copied().collect()
    }

    /// Service a single pending request on one worker's slot, if any.
    /// Returns whether a request was found and answered.
    pub fn service_once(&self, worker_id: u32) -> bool {
        let Some(slot) = self.slot(worker_id) else {
            return false;
        };
        let Some(req) = slot.try_take_request() else {
            return false;
        };
        match req.opcode {
            Opcode::Fork => {
                let mut table = self.process_table.lock().unwrap();
                match table.record_fork() {
                    Some(pid) => slot.complete(pid as i64, 0),
                    None => slot.complete(-1, -(libc::ENOMEM as i64)),
                }
            }
            Opcode::Exit => {
                // arg1: the exiting process's own (simulated) pid.
                // arg2: its exit status.
                let mut table = self.process_table.lock().unwrap();
                table.record_exit(req.arg1 as i32, req.arg2 as i32);
                slot.complete(0, 0);
            }
            Opcode::Wait => {
                // arg2: the pid being waited for.
                let mut table = self.process_table.lock().unwrap();
                match table.try_wait(req.arg2 as i32) {
                    Some(status) => slot.complete(status as i64, 0),
                    None => slot.complete(-1, -(libc::ECHILD as i64)),
                }
            }
            Opcode::Exec => {
                // Logging/side-channel preload only; execve itself
                // always falls through to the guest kernel.
                slot.complete(0, 0);
            }
        }
        true
    }

    /// Service every registered worker's slot once. Intended to be
    /// polled on an interval by the host process (see the daemon's
    /// supervisor loop).
    pub fn service_all(&self) {
        let worker_ids: Vec<u32> = self.slots.lock().unwrap().keys().copied().collect();
        for id in worker_ids {
            self.service_once(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::DEFAULT_TIMEOUT;
    use std::thread;
    use std::time::Duration;

    fn spawn_servicer(sup: Arc<Supervisor>, worker_id: u32) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            for _ in 0..200 {
                if sup.service_once(worker_id) {
                    return;
                }
                thread::sleep(Duration::from_millis(2));
            }
        })
    }

    #[test]
    fn fork_then_wait_round_trips_through_the_process_table() {
        let sup = Arc::new(Supervisor::new());
        let slot = sup.register_worker(1);

        let servicer = spawn_servicer(Arc::clone(&sup), 1);
        let pid = slot
            .post_request(Opcode::Fork, 0, 0, 0, "", DEFAULT_TIMEOUT)
            .unwrap();
        servicer.join().unwrap();
        assert!(pid >= crate::process_table::PID_BASE as i64);

        let servicer = spawn_servicer(Arc::clone(&sup), 1);
        slot.post_fire_and_forget(Opcode::Exit, pid, 7, 0, "");
        servicer.join().unwrap();

        let servicer = spawn_servicer(Arc::clone(&sup), 1);
        let status = slot
            .post_request(Opcode::Wait, 0, pid, 0, "", DEFAULT_TIMEOUT)
            .unwrap();
        servicer.join().unwrap();
        assert_eq!(status, 7 << 8);
    }

    #[test]
    fn wait_on_a_nonexistent_child_eventually_times_out() {
        let sup = Supervisor::new();
        let slot = sup.register_worker(1);
        // No servicer running: the request sits as ECHILD forever, or
        // the worker times out if the supervisor never answers at all.
        let result = slot.post_request(Opcode::Wait, 0, 99999, 0, "", Duration::from_millis(100));
        assert_eq!(result, Err(crate::slot::IpcError::Timeout));
    }
}
