use crate::error::{Error, Result};
use crate::keys::{SUPPORTED_KEYS, codes::KEY_LEFTSHIFT};
use crate::protocol::{ABS_X, ABS_Y, EventRecord, EventType, REL_X, REL_Y, SYN_REPORT};
use crate::uinput::UinputBackend;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// The OS control surface behind a virtual input device.
///
/// `UinputBackend` talks to `/dev/uinput`; `mock::RecordingBackend` records
/// calls in memory.
pub trait DeviceBackend: Send {
    /// Fails with `Error::Permission` if the device node is not writable
    fn check_access(&self) -> Result<()>;
    /// Fails with `Error::Configuration` if the kernel lacks uinput support
    fn check_kernel_support(&self) -> Result<()>;
    fn open(&mut self) -> Result<()>;
    fn enable_event_type(&mut self, event_type: EventType) -> Result<()>;
    fn enable_key(&mut self, code: u16) -> Result<()>;
    fn enable_relative_axis(&mut self, code: u16) -> Result<()>;
    fn enable_absolute_axis(&mut self, code: u16, min: i32, max: i32) -> Result<()>;
    fn create(&mut self, name: &str) -> Result<()>;
    fn write_event(&mut self, record: &EventRecord) -> Result<()>;
    fn destroy(&mut self) -> Result<()>;
    /// Release the handle. Must be safe to call when nothing is open.
    fn close(&mut self);
}

/// Anything that accepts raw input events.
///
/// The provided methods build the logical actions every emitter needs out of
/// `emit_raw`; each one ends with a SYN_REPORT.
pub trait InputSink {
    fn emit_raw(&mut self, event_type: EventType, code: u16, value: i32) -> Result<()>;

    fn emit(&mut self, record: EventRecord) -> Result<()> {
        self.emit_raw(record.event_type, record.code, record.value)
    }

    fn emit_batch(&mut self, records: &[EventRecord]) -> Result<()> {
        for record in records {
            self.emit(*record)?;
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.emit_raw(EventType::Sync, SYN_REPORT, 0)
    }

    /// Key change followed by its SYN_REPORT
    fn send_key(&mut self, code: u16, value: i32) -> Result<()> {
        self.emit_raw(EventType::Key, code, value)?;
        self.sync()
    }

    fn send_key_press(&mut self, code: u16) -> Result<()> {
        self.send_key(code, 1)?;
        self.send_key(code, 0)
    }

    fn send_shifted_key_press(&mut self, code: u16) -> Result<()> {
        self.send_key(KEY_LEFTSHIFT, 1)?;
        self.send_key_press(code)?;
        self.send_key(KEY_LEFTSHIFT, 0)
    }
}

impl<S: InputSink + ?Sized> InputSink for &mut S {
    fn emit_raw(&mut self, event_type: EventType, code: u16, value: i32) -> Result<()> {
        (**self).emit_raw(event_type, code, value)
    }
}

/// Creation-time settings of the virtual device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceOptions {
    pub name: String,
    /// Time the kernel and compositor get to pick up a new device
    pub settle_ms: u64,
    /// Pause after every written event
    pub pacing_us: u64,
    pub abs_max_x: i32,
    pub abs_max_y: i32,
}

impl DeviceOptions {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_micros(self.pacing_us)
    }
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            name: "uinject virtual device".to_string(),
            settle_ms: 1000,
            pacing_us: 50,
            abs_max_x: 1920,
            abs_max_y: 1080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Uninitialized,
    Initializing,
    Ready,
    Destroyed,
}

/// The process-wide virtual keyboard and mouse.
///
/// Created lazily on the first emitted event (or by an explicit `init`) and
/// destroyed by `destroy` or on drop.
pub struct VirtualInputDevice<B: DeviceBackend = UinputBackend> {
    backend: B,
    options: DeviceOptions,
    state: DeviceState,
}

impl VirtualInputDevice<UinputBackend> {
    pub fn new(options: DeviceOptions) -> Self {
        Self::with_backend(UinputBackend::new(), options)
    }
}

impl<B: DeviceBackend> VirtualInputDevice<B> {
    pub fn with_backend(backend: B, options: DeviceOptions) -> Self {
        Self {
            backend,
            options,
            state: DeviceState::Uninitialized,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn options(&self) -> &DeviceOptions {
        &self.options
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Create the kernel device. A no-op once ready.
    ///
    /// On failure the handle is closed and the device stays uninitialized, so
    /// a later call may retry.
    pub fn init(&mut self) -> Result<()> {
        match self.state {
            DeviceState::Ready => return Ok(()),
            DeviceState::Destroyed => return Err(destroyed()),
            DeviceState::Uninitialized | DeviceState::Initializing => {}
        }

        self.state = DeviceState::Initializing;
        match self.create_device() {
            Ok(()) => {
                self.state = DeviceState::Ready;
                info!("Virtual input device '{}' ready", self.options.name);
                Ok(())
            }
            Err(e) => {
                self.backend.close();
                self.state = DeviceState::Uninitialized;
                Err(e)
            }
        }
    }

    fn create_device(&mut self) -> Result<()> {
        self.backend.check_access()?;
        self.backend.check_kernel_support()?;
        self.backend.open()?;

        for event_type in EventType::ALL {
            self.backend.enable_event_type(event_type)?;
        }
        for &code in SUPPORTED_KEYS {
            self.backend.enable_key(code)?;
        }
        for code in [REL_X, REL_Y] {
            self.backend.enable_relative_axis(code)?;
        }
        self.backend
            .enable_absolute_axis(ABS_X, 0, self.options.abs_max_x)?;
        self.backend
            .enable_absolute_axis(ABS_Y, 0, self.options.abs_max_y)?;

        self.backend.create(&self.options.name)?;

        // Events written before the device is picked up are lost
        let settle = self.options.settle();
        if !settle.is_zero() {
            debug!("Waiting {:?} for device to settle", settle);
            thread::sleep(settle);
        }
        Ok(())
    }

    /// Remove the kernel device. Idempotent; does nothing if never ready.
    pub fn destroy(&mut self) -> Result<()> {
        if self.state != DeviceState::Ready {
            return Ok(());
        }

        self.state = DeviceState::Destroyed;
        let result = self.backend.destroy();
        self.backend.close();
        info!("Virtual input device '{}' destroyed", self.options.name);
        result
    }
}

impl<B: DeviceBackend> InputSink for VirtualInputDevice<B> {
    fn emit_raw(&mut self, event_type: EventType, code: u16, value: i32) -> Result<()> {
        match self.state {
            DeviceState::Ready => {}
            DeviceState::Uninitialized => self.init()?,
            DeviceState::Initializing => {
                return Err(Error::io(
                    "emit",
                    std::io::Error::new(
                        std::io::ErrorKind::WouldBlock,
                        "device initialization in progress",
                    ),
                ));
            }
            DeviceState::Destroyed => return Err(destroyed()),
        }

        let record = EventRecord::new(event_type, code, value);
        trace!("emit {}", record);
        self.backend.write_event(&record)?;

        let pacing = self.options.pacing();
        if !pacing.is_zero() {
            thread::sleep(pacing);
        }
        Ok(())
    }
}

impl<B: DeviceBackend> Drop for VirtualInputDevice<B> {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            warn!("Failed to destroy virtual input device: {}", e);
        }
    }
}

fn destroyed() -> Error {
    Error::io(
        "emit",
        std::io::Error::new(std::io::ErrorKind::NotConnected, "device already destroyed"),
    )
}
