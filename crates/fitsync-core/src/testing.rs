//! Scripted collaborators shared by the unit tests

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::Notify;

use crate::network::{Probe, ProbeError};
use crate::queue::SyncQueueEntry;
use crate::remote::{OperationHandler, RemoteError};
use crate::storage::{DurableStorage, MemoryStorage, StorageError, StorageResult};

#[derive(Debug, Clone, Copy)]
pub enum ProbeStep {
    Succeed,
    Fail,
    Hang(Duration),
}

/// Probe that plays back a script, then repeats a fallback step
pub struct ScriptedProbe {
    script: Mutex<VecDeque<ProbeStep>>,
    fallback: ProbeStep,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(script: Vec<ProbeStep>, fallback: ProbeStep) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(step: ProbeStep) -> Self {
        Self::new(Vec::new(), step)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Probe for ScriptedProbe {
    fn check(&self) -> BoxFuture<'_, Result<(), ProbeError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);
        Box::pin(async move {
            match step {
                ProbeStep::Succeed => Ok(()),
                ProbeStep::Fail => Err(ProbeError::Status(503)),
                ProbeStep::Hang(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(())
                }
            }
        })
    }
}

#[derive(Debug, Clone)]
pub enum HandlerStep {
    Succeed,
    Transient,
    Offline,
    Reject,
}

impl HandlerStep {
    fn into_result(self) -> Result<(), RemoteError> {
        match self {
            HandlerStep::Succeed => Ok(()),
            HandlerStep::Transient => Err(RemoteError::Transient("HTTP 503".to_string())),
            HandlerStep::Offline => Err(RemoteError::Offline("connection refused".to_string())),
            HandlerStep::Reject => Err(RemoteError::Rejected {
                status: 422,
                message: "validation failed".to_string(),
            }),
        }
    }
}

/// Handler that decides per entry based on a payload field, and records calls
///
/// The payload's `"script"` string selects the outcome: `ok`, `transient`,
/// `offline`, `reject`, or `transient-then-ok:<n>` (fails n times).
#[derive(Default)]
pub struct RecordingHandler {
    calls: Mutex<Vec<SyncQueueEntry>>,
    gate: Mutex<Option<Arc<Notify>>>,
    healed: AtomicBool,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block every call until the returned notify is signalled
    pub fn gated(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    /// Ignore scripts from now on and succeed every call
    pub fn heal(&self) {
        self.healed.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SyncQueueEntry> {
        self.calls.lock().unwrap().clone()
    }

    /// Labels (`payload.label`) of the entries seen, in call order
    pub fn labels(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|e| e.payload["label"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    fn step_for(&self, entry: &SyncQueueEntry) -> HandlerStep {
        if self.healed.load(Ordering::SeqCst) {
            return HandlerStep::Succeed;
        }
        let script = entry.payload["script"].as_str().unwrap_or("ok");
        if let Some(n) = script.strip_prefix("transient-then-ok:") {
            let failures: u32 = n.parse().unwrap();
            return if entry.attempt_count < failures {
                HandlerStep::Transient
            } else {
                HandlerStep::Succeed
            };
        }
        match script {
            "transient" => HandlerStep::Transient,
            "offline" => HandlerStep::Offline,
            "reject" => HandlerStep::Reject,
            _ => HandlerStep::Succeed,
        }
    }
}

impl OperationHandler for RecordingHandler {
    fn apply<'a>(&'a self, entry: &'a SyncQueueEntry) -> BoxFuture<'a, Result<(), RemoteError>> {
        self.calls.lock().unwrap().push(entry.clone());
        let step = self.step_for(entry);
        let gate = self.gate.lock().unwrap().clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            step.into_result()
        })
    }
}

/// Storage whose every operation fails
pub struct BrokenStorage;

impl DurableStorage for BrokenStorage {
    fn read(&self, _key: &str) -> StorageResult<Option<String>> {
        Err(StorageError::Unavailable("disk unplugged".to_string()))
    }

    fn write(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Unavailable("disk unplugged".to_string()))
    }

    fn remove(&self, _key: &str) -> StorageResult<()> {
        Err(StorageError::Unavailable("disk unplugged".to_string()))
    }
}

/// Memory storage whose next writes can be made to fail
#[derive(Default)]
pub struct FlakyStorage {
    inner: MemoryStorage,
    failing_writes: AtomicUsize,
    permanent: AtomicBool,
    write_calls: AtomicUsize,
}

impl FlakyStorage {
    /// Fail the next `count` writes, with a permission error when `permanent`
    pub fn fail_writes(&self, count: usize, permanent: bool) {
        self.permanent.store(permanent, Ordering::SeqCst);
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }
}

impl DurableStorage for FlakyStorage {
    fn read(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.read(key)
    }

    fn write(&self, key: &str, value: &str) -> StorageResult<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_writes.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_writes.store(failing - 1, Ordering::SeqCst);
            return Err(if self.permanent.load(Ordering::SeqCst) {
                StorageError::PermissionDenied {
                    path: PathBuf::from("/data/fitfusion-sync-queue.json"),
                    source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
                }
            } else {
                StorageError::Unavailable("database is locked".to_string())
            });
        }
        self.inner.write(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner.remove(key)
    }
}
