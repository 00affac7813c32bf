//! uinject - keyboard and mouse input injection through Linux uinput
//!
//! A [`VirtualInputDevice`] registers one virtual keyboard/mouse with the
//! kernel. An [`EventEmitter`] turns key chords, text and pointer actions into
//! raw events on any [`InputSink`]: the device itself, or a [`DaemonClient`]
//! talking to a [`DaemonServer`] that owns the device on behalf of
//! unprivileged users.

pub mod client;
pub mod config;
pub mod daemon;
pub mod device;
pub mod emitter;
pub mod error;
pub mod keys;
pub mod mock;
pub mod protocol;
pub mod uinput;

// Re-export commonly used types
pub use client::{DaemonClient, default_socket_path};
pub use config::DaemonConfig;
pub use daemon::DaemonServer;
pub use device::{DeviceBackend, DeviceOptions, DeviceState, InputSink, VirtualInputDevice};
pub use emitter::{EventEmitter, MouseButton};
pub use error::{Error, Result};
pub use keys::{ResolvedKey, ResolvedKeySequence, resolve, resolve_char};
pub use protocol::{EventRecord, EventType};
pub use uinput::UinputBackend;
