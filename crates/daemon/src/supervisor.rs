//! Owns the canonical shared image and the supervisor side of the
//! process-lifecycle IPC protocol, and republishes every mutation as a
//! [`DaemonEvent`] for `/events` subscribers.

use std::sync::Arc;
use std::time::Duration;

use process_ipc::{IpcError, Opcode, Supervisor as IpcSupervisor, DEFAULT_TIMEOUT, PID_BASE};
use sabfs_image::{DirEntry, Image, SabfsResult, Stat};
use tokio::sync::broadcast;

use crate::config::DaemonConfig;
use crate::events::DaemonEvent;

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const SERVICE_LOOP_INTERVAL: Duration = Duration::from_millis(20);

pub struct FastpathSupervisor {
    image: Arc<Image>,
    ipc: Arc<IpcSupervisor>,
    accel_prefix: String,
    image_prefix: String,
    events: broadcast::Sender<DaemonEvent>,
}

pub struct StatusReport {
    pub accel_prefix: String,
    pub image_prefix: String,
    pub open_fd_count: usize,
    pub registered_workers: usize,
}

impl FastpathSupervisor {
    pub fn new(config: &DaemonConfig) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(FastpathSupervisor {
            image: Arc::new(Image::new()),
            ipc: Arc::new(IpcSupervisor::new()),
            accel_prefix: config.accel_prefix.clone(),
            image_prefix: config.image_prefix.clone(),
            events: tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.events.subscribe()
    }

    pub fn broadcast_event(&self, event: DaemonEvent) {
        let _ = self.events.send(event);
    }

    /// Spawns the background task that polls every registered worker's
    /// IPC slot, mirroring the bare-metal worker's own dispatch loop
    /// servicing requests without a second real thread to drive it.
    pub fn spawn_service_loop(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SERVICE_LOOP_INTERVAL);
            loop {
                ticker.tick().await;
                this.ipc.service_all();
            }
        });
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            accel_prefix: self.accel_prefix.clone(),
            image_prefix: self.image_prefix.clone(),
            open_fd_count: self.image.open_fd_count(),
            registered_workers: self.ipc.worker_ids().len(),
        }
    }

    pub fn image_stat(&self, path: &str) -> SabfsResult<Stat> {
        self.image.stat(path)
    }

    pub fn image_import(&self, path: &str, data: &[u8], mode: u32) -> SabfsResult<()> {
        let result = self.image.import_file(path, data, mode);
        self.broadcast_event(DaemonEvent::ImageMutated {
            op: "import".to_string(),
            path: path.to_string(),
            ok: result.is_ok(),
            ts: chrono_now_ms(),
        });
        result
    }

    pub fn image_readdir(&self, path: &str) -> SabfsResult<Vec<DirEntry>> {
        self.image.readdir(path)
    }

    pub fn worker_ids(&self) -> Vec<u32> {
        self.ipc.worker_ids()
    }

    /// Registers `worker_id` if unseen, then drives a FORK request to
    /// completion on its slot. Used by the manual-testing HTTP surface
    /// in place of a real guest worker thread.
    pub async fn drive_fork(&self, worker_id: u32) -> Result<i64, IpcError> {
        let slot = self.ipc.slot(worker_id).unwrap_or_else(|| self.ipc.register_worker(worker_id));
        let result = tokio::task::spawn_blocking(move || {
            slot.post_request(Opcode::Fork, 0, 0, 0, "", DEFAULT_TIMEOUT)
        })
        .await
        .expect("blocking fork request task panicked");
        self.broadcast_event(DaemonEvent::IpcTransition {
            worker_id,
            opcode: "fork".to_string(),
            result: result.unwrap_or(-1),
            ts: chrono_now_ms(),
        });
        result
    }

    /// Registers `worker_id` if unseen, then drives a WAIT request for
    /// `pid` to completion on its slot.
    pub async fn drive_wait(&self, worker_id: u32, pid: i32) -> Result<i64, IpcError> {
        let slot = self.ipc.slot(worker_id).unwrap_or_else(|| self.ipc.register_worker(worker_id));
        let result = tokio::task::spawn_blocking(move || {
            slot.post_request(Opcode::Wait, 0, pid as i64, 0, "", DEFAULT_TIMEOUT)
        })
        .await
        .expect("blocking wait request task panicked");
        self.broadcast_event(DaemonEvent::IpcTransition {
            worker_id,
            opcode: "wait".to_string(),
            result: result.unwrap_or(-1),
            ts: chrono_now_ms(),
        });
        result
    }

    /// The base simulated PID a successful fork is guaranteed to be at
    /// or above; exposed so callers can sanity-check a returned pid.
    pub fn pid_base(&self) -> i32 {
        PID_BASE
    }
}

fn chrono_now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Arc<FastpathSupervisor> {
        let config = DaemonConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            accel_prefix: "/mnt/wasi1/".to_string(),
            image_prefix: "/pack/".to_string(),
        };
        FastpathSupervisor::new(&config)
    }

    #[test]
    fn image_import_then_stat_reports_the_written_size() {
        let sup = fixture();
        sup.image_import("/pack/hello", b"hi\n", 0o644).unwrap();
        let st = sup.image_stat("/pack/hello").unwrap();
        assert_eq!(st.size, 3);
    }

    #[tokio::test]
    async fn drive_fork_completes_once_the_service_loop_runs() {
        let sup = fixture();
        sup.spawn_service_loop();
        let pid = sup.drive_fork(1).await.unwrap();
        assert!(pid >= sup.pid_base() as i64);
    }
}
