//! A single IPC slot: `IDLE -> REQUEST -> RESPONSE -> IDLE`. Stands in
//! for the shared-buffer region plus atomic compare/wait primitive the
//! real bridge would use; a `Mutex` + `Condvar` pair plays the same role
//! in-process, with `Condvar::wait_timeout_while` standing in for the
//! atomic wait.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use thiserror::Error;

/// The worker's default blocking wait for a synchronous request (fork,
/// wait4).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// `exit`/`exit_group` notifications are fire-and-forget: a brief wait,
/// then reset regardless of whether the supervisor answered in time.
pub const EXIT_WAIT: Duration = Duration::from_millis(50);

/// Longest path the fixed-capacity path field can carry (matches the
/// 256-byte field in the shared-buffer layout).
pub const PATH_FIELD_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Fork = 1,
    Exec = 2,
    Exit = 3,
    Wait = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Idle,
    Request,
    Response,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IpcError {
    #[error("connection timed out")]
    Timeout,
    #[error("remote error {0}")]
    Remote(i32),
}

impl IpcError {
    pub fn errno(self) -> i32 {
        match self {
            IpcError::Timeout => -libc::ETIMEDOUT,
            IpcError::Remote(e) => e,
        }
    }
}

pub type IpcResult<T> = Result<T, IpcError>;

/// A request as observed by the supervisor side.
#[derive(Debug, Clone)]
pub struct Request {
    pub opcode: Opcode,
    pub arg1: i64,
    pub arg2: i64,
    pub arg3: i64,
    pub path: String,
}

struct Inner {
    control: Control,
    opcode: Opcode,
    arg1: i64,
    arg2: i64,
    arg3: i64,
    result: i64,
    error: i64,
    path: String,
}

pub struct Slot {
    inner: Mutex<Inner>,
    cv: Condvar,
}

impl Default for Slot {
    fn default() -> Self {
        Self::new()
    }
}

impl Slot {
    pub fn new() -> Self {
        Slot {
            inner: Mutex::new(Inner {
                control: Control::Idle,
                opcode: Opcode::Exit,
                arg1: 0,
                arg2: 0,
                arg3: 0,
                result: 0,
                error: 0,
                path: String::new(),
            }),
            cv: Condvar::new(),
        }
    }

    /// Worker side: post a request and block until the supervisor
    /// responds or `timeout` elapses. On timeout the slot is reset to
    /// `IDLE` and `IpcError::Timeout` is returned.
    pub fn post_request(
        &self,
        opcode: Opcode,
        arg1: i64,
        arg2: i64,
        arg3: i64,
        path: &str,
        timeout: Duration,
    ) -> IpcResult<i64> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.control = Control::Request;
            inner.opcode = opcode;
            inner.arg1 = arg1;
            inner.arg2 = arg2;
            inner.arg3 = arg3;
            inner.path = path.chars().take(PATH_FIELD_LEN - 1).collect();
            inner.result = 0;
            inner.error = 0;
        }
        self.cv.notify_all();

        let inner = self.inner.lock().unwrap();
        let (mut inner, wait_result) = self
            .cv
            .wait_timeout_while(inner, timeout, |i| i.control == Control::Request)
            .unwrap();

        if wait_result.timed_out() && inner.control == Control::Request {
            inner.control = Control::Idle;
            return Err(IpcError::Timeout);
        }

        let result = inner.result;
        let error = inner.error;
        inner.control = Control::Idle;
        drop(inner);
        self.cv.notify_all();

        if error != 0 {
            Err(IpcError::Remote(error as i32))
        } else {
            Ok(result)
        }
    }

    /// Fire-and-forget variant used for `exit`/`exit_group`: waits only
    /// `EXIT_WAIT`, and a timeout is not treated as a failure.
    pub fn post_fire_and_forget(&self, opcode: Opcode, arg1: i64, arg2: i64, arg3: i64, path: &str) {
        match self.post_request(opcode, arg1, arg2, arg3, path, EXIT_WAIT) {
            Ok(_) | Err(IpcError::Timeout) => {}
            Err(IpcError::Remote(_)) => {}
        }
    }

    /// Supervisor side: non-blocking poll for a pending request.
    pub fn try_take_request(&self) -> Option<Request> {
        let inner = self.inner.lock().unwrap();
        if inner.control == Control::Request {
            Some(Request {
                opcode: inner.opcode,
                arg1: inner.arg1,
                arg2: inner.arg2,
                arg3: inner.arg3,
                path: inner.path.clone(),
            })
        } else {
            None
        }
    }

    /// Supervisor side: answer the currently pending request.
    pub fn complete(&self, result: i64, error: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.result = result;
        inner.error = error;
        inner.control = Control::Response;
        drop(inner);
        self.cv.notify_all();
    }
}
