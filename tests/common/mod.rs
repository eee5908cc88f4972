//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use portkeeper::network::PortSource;
use portkeeper::services::CommandError;
use tokio::sync::Semaphore;

pub const HEADER: &str = "COMMAND PID USER FD TYPE DEVICE SIZE/OFF NODE NAME";

/// Builds `lsof` output with a header line from `(command, pid, proto, name)` rows.
pub fn lsof_output(rows: &[(&str, u32, &str, &str)]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for (command, pid, proto, name) in rows {
        let state = if *proto == "TCP" { " (LISTEN)" } else { "" };
        out.push_str(&format!(
            "{} {} user 10u IPv4 0x0 0t0 {} {}{}\n",
            command, pid, proto, name, state
        ));
    }
    out
}

/// A `PortSource` that replays queued responses.
///
/// `None` entries fail like a non-zero `lsof` exit. When the queue is empty the
/// fallback is used. A gated source blocks every fetch until `release` is called.
#[derive(Clone, Default)]
pub struct FakeSource {
    queue: Arc<Mutex<VecDeque<Option<String>>>>,
    fallback: Arc<Mutex<Option<String>>>,
    calls: Arc<AtomicUsize>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn push_ok(&self, output: impl Into<String>) {
        self.queue.lock().unwrap().push_back(Some(output.into()));
    }

    pub fn push_failure(&self) {
        self.queue.lock().unwrap().push_back(None);
    }

    pub fn set_fallback(&self, output: impl Into<String>) {
        *self.fallback.lock().unwrap() = Some(output.into());
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PortSource for FakeSource {
    fn fetch(&self) -> impl Future<Output = Result<String, CommandError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone());
        let gate = self.gate.clone();

        async move {
            if let Some(gate) = gate {
                gate.acquire().await.unwrap().forget();
            }
            next.ok_or_else(|| CommandError::Failed {
                program: "lsof".to_string(),
                code: 1,
                stderr: "lsof: permission denied".to_string(),
            })
        }
    }
}
