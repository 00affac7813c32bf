//! In-memory device backend for tests.
//!
//! `RecordingBackend` performs no system calls. Every control call and every
//! written event is appended to a shared log, so a clone kept by the test can
//! inspect what a device (possibly moved into a daemon writer) did, in order.
//!
//! ```ignore
//! let backend = RecordingBackend::new();
//! let mut device = VirtualInputDevice::with_backend(backend.clone(), options);
//! device.send_key_press(KEY_A)?;
//! assert_eq!(backend.written().len(), 4);
//! ```

use crate::device::DeviceBackend;
use crate::error::{Error, Result};
use crate::protocol::{EventRecord, EventType};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One call made against the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    CheckAccess,
    CheckKernelSupport,
    Open,
    EnableEventType(EventType),
    EnableKey(u16),
    EnableRelativeAxis(u16),
    EnableAbsoluteAxis { code: u16, min: i32, max: i32 },
    Create(String),
    Write(EventRecord),
    Destroy,
    Close,
}

/// Stage at which the backend simulates an OS failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Access,
    KernelSupport,
    Open,
    Create,
    Write,
}

#[derive(Clone, Default)]
pub struct RecordingBackend {
    calls: Arc<Mutex<Vec<BackendCall>>>,
    fail_at: Option<FailAt>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(mut self, stage: FailAt) -> Self {
        self.fail_at = Some(stage);
        self
    }

    /// Every call so far, oldest first
    pub fn calls(&self) -> Vec<BackendCall> {
        self.log().clone()
    }

    /// Only the events that reached the device
    pub fn written(&self) -> Vec<EventRecord> {
        self.log()
            .iter()
            .filter_map(|call| match call {
                BackendCall::Write(record) => Some(*record),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&BackendCall) -> bool) -> usize {
        self.log().iter().filter(|call| predicate(call)).count()
    }

    fn log(&self) -> MutexGuard<'_, Vec<BackendCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: BackendCall) {
        self.log().push(call);
    }

    fn check(&self, stage: FailAt, op: &'static str) -> Result<()> {
        if self.fail_at != Some(stage) {
            return Ok(());
        }
        Err(match stage {
            FailAt::Access => Error::Permission {
                path: PathBuf::from("/dev/uinput"),
            },
            FailAt::KernelSupport => Error::Configuration("mock kernel has no uinput".into()),
            _ => Error::io(op, std::io::Error::other("mock failure")),
        })
    }
}

impl DeviceBackend for RecordingBackend {
    fn check_access(&self) -> Result<()> {
        self.record(BackendCall::CheckAccess);
        self.check(FailAt::Access, "access")
    }

    fn check_kernel_support(&self) -> Result<()> {
        self.record(BackendCall::CheckKernelSupport);
        self.check(FailAt::KernelSupport, "uname")
    }

    fn open(&mut self) -> Result<()> {
        self.check(FailAt::Open, "open")?;
        self.record(BackendCall::Open);
        Ok(())
    }

    fn enable_event_type(&mut self, event_type: EventType) -> Result<()> {
        self.record(BackendCall::EnableEventType(event_type));
        Ok(())
    }

    fn enable_key(&mut self, code: u16) -> Result<()> {
        self.record(BackendCall::EnableKey(code));
        Ok(())
    }

    fn enable_relative_axis(&mut self, code: u16) -> Result<()> {
        self.record(BackendCall::EnableRelativeAxis(code));
        Ok(())
    }

    fn enable_absolute_axis(&mut self, code: u16, min: i32, max: i32) -> Result<()> {
        self.record(BackendCall::EnableAbsoluteAxis { code, min, max });
        Ok(())
    }

    fn create(&mut self, name: &str) -> Result<()> {
        self.check(FailAt::Create, "UI_DEV_CREATE")?;
        self.record(BackendCall::Create(name.to_string()));
        Ok(())
    }

    fn write_event(&mut self, record: &EventRecord) -> Result<()> {
        self.check(FailAt::Write, "write")?;
        self.record(BackendCall::Write(*record));
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.record(BackendCall::Destroy);
        Ok(())
    }

    fn close(&mut self) {
        self.record(BackendCall::Close);
    }
}
