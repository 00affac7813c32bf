#![allow(non_camel_case_types)]

use crate::device::DeviceBackend;
use crate::error::{Error, Result};
use crate::protocol::{EventRecord, EventType};
use std::ffi::{CStr, CString};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// Uinput constants and structures
pub const UI_SET_EVBIT: u64 = 0x40045564;
pub const UI_SET_KEYBIT: u64 = 0x40045565;
pub const UI_SET_RELBIT: u64 = 0x40045566;
pub const UI_SET_ABSBIT: u64 = 0x40045567;
pub const UI_DEV_SETUP: u64 = 0x405c5503;
pub const UI_DEV_CREATE: u64 = 0x5501;
pub const UI_DEV_DESTROY: u64 = 0x5502;
pub const UI_ABS_SETUP: u64 = 0x401c5504;

pub const BUS_USB: u16 = 0x03;
pub const VENDOR_ID: u16 = 0x1234;
pub const PRODUCT_ID: u16 = 0x5678;

pub const UINPUT_PATH: &str = "/dev/uinput";
const MISC_CLASS_PATH: &str = "/sys/class/misc/uinput";
const MODULES_DIR: &str = "/lib/modules";
const SYSNAME_LEN: usize = 64;

// Get sysfs name for uinput device
pub fn ui_get_sysname(len: usize) -> u64 {
    // _IOC(_IOC_READ, 'U', 0x2c, len)
    0x80000000 | ((len as u64 & 0x1fff) << 16) | (b'U' as u64) << 8 | 0x2c
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct input_id {
    pub bustype: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

#[repr(C)]
#[derive(Debug)]
pub struct uinput_setup {
    pub id: input_id,
    pub name: [u8; 80],
    pub ff_effects_max: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct input_absinfo {
    pub value: i32,
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    pub flat: i32,
    pub resolution: i32,
}

#[repr(C)]
#[derive(Debug)]
pub struct uinput_abs_setup {
    pub code: u16,
    pub absinfo: input_absinfo,
}

/// Kernel `struct input_event`; the timestamp is left zeroed
#[repr(C)]
pub struct input_event {
    pub time: libc::timeval,
    pub type_: u16,
    pub code: u16,
    pub value: i32,
}

impl From<&EventRecord> for input_event {
    fn from(record: &EventRecord) -> Self {
        Self {
            time: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            type_: record.event_type.code(),
            code: record.code,
            value: record.value,
        }
    }
}

/// `DeviceBackend` over the kernel's `/dev/uinput`
pub struct UinputBackend {
    path: PathBuf,
    file: Option<File>,
}

impl UinputBackend {
    pub fn new() -> Self {
        Self::with_path(UINPUT_PATH)
    }

    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
        }
    }

    fn fd(&self, op: &'static str) -> Result<RawFd> {
        self.file.as_ref().map(|f| f.as_raw_fd()).ok_or_else(|| {
            Error::io(
                op,
                std::io::Error::new(std::io::ErrorKind::NotConnected, "uinput is not open"),
            )
        })
    }

    fn ioctl_value(&self, op: &'static str, request: u64, value: libc::c_int) -> Result<()> {
        let fd = self.fd(op)?;
        if unsafe { libc::ioctl(fd, request as _, value) } == -1 {
            return Err(Error::last_os(op));
        }
        Ok(())
    }

    fn ioctl_ptr<T>(&self, op: &'static str, request: u64, arg: *mut T) -> Result<()> {
        let fd = self.fd(op)?;
        if unsafe { libc::ioctl(fd, request as _, arg) } == -1 {
            return Err(Error::last_os(op));
        }
        Ok(())
    }

    fn sysname(&self) -> Option<String> {
        let mut buf = [0u8; SYSNAME_LEN];
        self.ioctl_ptr("UI_GET_SYSNAME", ui_get_sysname(SYSNAME_LEN), buf.as_mut_ptr())
            .ok()?;
        CStr::from_bytes_until_nul(&buf)
            .ok()
            .map(|s| s.to_string_lossy().into_owned())
    }
}

impl Default for UinputBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn kernel_release() -> Result<String> {
    let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
    if unsafe { libc::uname(&mut uts) } != 0 {
        return Err(Error::last_os("uname"));
    }
    let release = unsafe { CStr::from_ptr(uts.release.as_ptr()) };
    Ok(release.to_string_lossy().into_owned())
}

impl DeviceBackend for UinputBackend {
    fn check_access(&self) -> Result<()> {
        let path = CString::new(self.path.as_os_str().as_bytes())
            .map_err(|_| Error::Argument(format!("invalid device path {:?}", self.path)))?;
        if unsafe { libc::access(path.as_ptr(), libc::W_OK) } != 0 {
            return Err(Error::Permission {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    fn check_kernel_support(&self) -> Result<()> {
        // Loaded or built in
        if Path::new(MISC_CLASS_PATH).exists() {
            return Ok(());
        }

        // Otherwise the module must be loadable for the running kernel
        let modules = Path::new(MODULES_DIR).join(kernel_release()?);
        if !modules.is_dir() {
            return Err(Error::Configuration(format!(
                "{} does not exist; if the kernel was updated recently, reboot to use its modules",
                modules.display()
            )));
        }
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => Error::Permission {
                    path: self.path.clone(),
                },
                _ => Error::io("open", e),
            })?;
        debug!("Opened {}", self.path.display());
        self.file = Some(file);
        Ok(())
    }

    fn enable_event_type(&mut self, event_type: EventType) -> Result<()> {
        self.ioctl_value("UI_SET_EVBIT", UI_SET_EVBIT, event_type.code() as libc::c_int)
    }

    fn enable_key(&mut self, code: u16) -> Result<()> {
        self.ioctl_value("UI_SET_KEYBIT", UI_SET_KEYBIT, code as libc::c_int)
    }

    fn enable_relative_axis(&mut self, code: u16) -> Result<()> {
        self.ioctl_value("UI_SET_RELBIT", UI_SET_RELBIT, code as libc::c_int)
    }

    fn enable_absolute_axis(&mut self, code: u16, min: i32, max: i32) -> Result<()> {
        self.ioctl_value("UI_SET_ABSBIT", UI_SET_ABSBIT, code as libc::c_int)?;

        let mut setup = uinput_abs_setup {
            code,
            absinfo: input_absinfo {
                value: 0,
                minimum: min,
                maximum: max,
                fuzz: 0,
                flat: 0,
                resolution: 0,
            },
        };
        self.ioctl_ptr("UI_ABS_SETUP", UI_ABS_SETUP, &mut setup)
    }

    fn create(&mut self, name: &str) -> Result<()> {
        let mut setup = uinput_setup {
            id: input_id {
                bustype: BUS_USB,
                vendor: VENDOR_ID,
                product: PRODUCT_ID,
                version: 0,
            },
            name: [0; 80],
            ff_effects_max: 0,
        };
        // Leave room for the terminating NUL
        let len = name.len().min(setup.name.len() - 1);
        setup.name[..len].copy_from_slice(&name.as_bytes()[..len]);

        self.ioctl_ptr("UI_DEV_SETUP", UI_DEV_SETUP, &mut setup)?;
        self.ioctl_value("UI_DEV_CREATE", UI_DEV_CREATE, 0)?;

        match self.sysname() {
            Some(sysname) => info!("Created /sys/devices/virtual/input/{}", sysname),
            None => info!("Created uinput device '{}'", name),
        }
        Ok(())
    }

    fn write_event(&mut self, record: &EventRecord) -> Result<()> {
        let event = input_event::from(record);
        let bytes = unsafe {
            std::slice::from_raw_parts(
                (&event as *const input_event).cast::<u8>(),
                std::mem::size_of::<input_event>(),
            )
        };

        let file = self.file.as_mut().ok_or_else(|| {
            Error::io(
                "write",
                std::io::Error::new(std::io::ErrorKind::NotConnected, "uinput is not open"),
            )
        })?;
        let written = file.write(bytes).map_err(|e| Error::io("write", e))?;
        if written != bytes.len() {
            return Err(Error::io(
                "write",
                std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    format!("short write ({} of {} bytes)", written, bytes.len()),
                ),
            ));
        }
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.ioctl_value("UI_DEV_DESTROY", UI_DEV_DESTROY, 0)
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("Closed {}", self.path.display());
        }
    }
}
