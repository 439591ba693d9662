use std::ffi::{c_void, CString};

use libc::{c_char, c_int};

use crate::mode::{OpenMode, RwMode, SeekMode};
use crate::{Error, Result};

use super::TransportDelegate;

pub type NativeOpenFn = unsafe extern "C" fn(handle: *mut c_void, mode: *const c_char) -> c_int;
pub type NativeCloseFn = unsafe extern "C" fn(handle: *mut c_void) -> c_int;
pub type NativeReadFn = unsafe extern "C" fn(handle: *mut c_void, buf: *mut u8, len: usize) -> isize;
pub type NativeWriteFn =
    unsafe extern "C" fn(handle: *mut c_void, buf: *const u8, len: usize) -> isize;
pub type NativeCapabilitiesFn = unsafe extern "C" fn(handle: *mut c_void) -> c_int;
/// `whence`: 1 start, 2 current, 3 end, 0 enquire. `rw`: 0 last, 1 read, 2 write.
/// Returns the previous offset, or a negative value on failure.
pub type NativeSeekFn =
    unsafe extern "C" fn(handle: *mut c_void, offset: i64, whence: c_int, rw: c_int) -> i64;

pub const NATIVE_CAN_READ: c_int = 1;
pub const NATIVE_CAN_WRITE: c_int = 2;
pub const NATIVE_CAN_SEEK: c_int = 4;

/// Entry points resolved from a native library.
#[derive(Clone, Copy)]
pub struct NativeEntryPoints {
    pub open: NativeOpenFn,
    pub close: NativeCloseFn,
    pub read: NativeReadFn,
    pub write: NativeWriteFn,
    /// Capability query; without it the connection may read and write but not seek.
    pub capabilities: Option<NativeCapabilitiesFn>,
    pub seek: Option<NativeSeekFn>,
}

/// Opaque address handed back to every entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeHandle(*mut c_void);

// The handle is only dereferenced by the foreign side, one call at a time.
unsafe impl Send for NativeHandle {}
unsafe impl Sync for NativeHandle {}

impl NativeHandle {
    /// # Safety
    ///
    /// `ptr` must stay valid for every entry point call made through the
    /// connection until it is closed.
    pub unsafe fn new(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0
    }
}

#[derive(Clone)]
pub struct NativeSpec {
    pub handle: NativeHandle,
    pub entry_points: NativeEntryPoints,
    /// Class tag the runtime reports for the connection.
    pub class_name: String,
}

/// Connection whose I/O is implemented by foreign callbacks.
pub struct NativeDelegate {
    handle: NativeHandle,
    entry_points: NativeEntryPoints,
    capabilities: c_int,
    open: bool,
}

impl NativeDelegate {
    pub fn open(spec: &NativeSpec, mode: OpenMode) -> Result<Self> {
        let entry_points = spec.entry_points;
        let handle = spec.handle;
        let token = CString::new(mode.as_str()).map_err(|_| Error::Mode(mode.to_string()))?;
        let rc = unsafe { (entry_points.open)(handle.as_ptr(), token.as_ptr()) };
        if rc != 0 {
            return Err(Error::Transport(format!(
                "native open of '{}' failed with status {rc}",
                spec.class_name
            )));
        }
        let capabilities = match entry_points.capabilities {
            Some(query) => unsafe { query(handle.as_ptr()) },
            None => NATIVE_CAN_READ | NATIVE_CAN_WRITE,
        };
        Ok(Self {
            handle,
            entry_points,
            capabilities,
            open: true,
        })
    }

    fn has(&self, flag: c_int) -> bool {
        self.capabilities & flag != 0
    }
}

fn check_len(n: isize, op: &str) -> Result<usize> {
    usize::try_from(n).map_err(|_| Error::Transport(format!("native {op} failed with status {n}")))
}

impl TransportDelegate for NativeDelegate {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = unsafe { (self.entry_points.read)(self.handle.as_ptr(), buf.as_mut_ptr(), buf.len()) };
        check_len(n, "read")
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let n = unsafe { (self.entry_points.write)(self.handle.as_ptr(), buf.as_ptr(), buf.len()) };
        check_len(n, "write")
    }

    fn is_seekable(&self) -> bool {
        self.has(NATIVE_CAN_SEEK) && self.entry_points.seek.is_some()
    }

    fn seek(&mut self, offset: i64, mode: SeekMode, rw: RwMode) -> Result<u64> {
        let seek = match self.entry_points.seek {
            Some(seek) if self.has(NATIVE_CAN_SEEK) => seek,
            _ => return Err(Error::UnseekableConnection),
        };
        let whence = match mode {
            SeekMode::Enquire => 0,
            SeekMode::Start => 1,
            SeekMode::Current => 2,
            SeekMode::End => 3,
        };
        let rw = match rw {
            RwMode::Last => 0,
            RwMode::Read => 1,
            RwMode::Write => 2,
        };
        let previous = unsafe { seek(self.handle.as_ptr(), offset, whence, rw) };
        u64::try_from(previous)
            .map_err(|_| Error::Transport(format!("native seek failed with status {previous}")))
    }

    fn can_read(&self) -> bool {
        self.has(NATIVE_CAN_READ)
    }

    fn can_write(&self) -> bool {
        self.has(NATIVE_CAN_WRITE)
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let rc = unsafe { (self.entry_points.close)(self.handle.as_ptr()) };
        if rc != 0 {
            return Err(Error::Transport(format!("native close failed with status {rc}")));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::ffi::CStr;

    /// Byte buffer driven through the C ABI entry points.
    #[derive(Default)]
    pub struct Loopback {
        pub data: Vec<u8>,
        pub pos: usize,
        pub opened_with: String,
        pub closed: bool,
    }

    unsafe extern "C" fn lb_open(handle: *mut c_void, mode: *const c_char) -> c_int {
        let lb = &mut *(handle as *mut Loopback);
        lb.opened_with = CStr::from_ptr(mode).to_string_lossy().into_owned();
        lb.pos = 0;
        0
    }

    unsafe extern "C" fn lb_close(handle: *mut c_void) -> c_int {
        (*(handle as *mut Loopback)).closed = true;
        0
    }

    unsafe extern "C" fn lb_read(handle: *mut c_void, buf: *mut u8, len: usize) -> isize {
        let lb = &mut *(handle as *mut Loopback);
        let n = len.min(lb.data.len() - lb.pos);
        std::ptr::copy_nonoverlapping(lb.data.as_ptr().add(lb.pos), buf, n);
        lb.pos += n;
        n as isize
    }

    unsafe extern "C" fn lb_write(handle: *mut c_void, buf: *const u8, len: usize) -> isize {
        let lb = &mut *(handle as *mut Loopback);
        lb.data.extend_from_slice(std::slice::from_raw_parts(buf, len));
        len as isize
    }

    unsafe extern "C" fn lb_caps(_handle: *mut c_void) -> c_int {
        NATIVE_CAN_READ | NATIVE_CAN_WRITE
    }

    pub fn loopback_spec(lb: &mut Loopback) -> NativeSpec {
        NativeSpec {
            handle: unsafe { NativeHandle::new(lb as *mut Loopback as *mut c_void) },
            entry_points: NativeEntryPoints {
                open: lb_open,
                close: lb_close,
                read: lb_read,
                write: lb_write,
                capabilities: Some(lb_caps),
                seek: None,
            },
            class_name: "loopback".to_string(),
        }
    }

    #[test]
    fn entry_points_drive_io() {
        let mut lb = Loopback::default();
        let spec = loopback_spec(&mut lb);
        let mut native = NativeDelegate::open(&spec, OpenMode::ReadWriteBinary).unwrap();
        native.write(b"native bytes").unwrap();
        let mut buf = [0u8; 6];
        assert_eq!(native.read(&mut buf).unwrap(), 6);
        assert_eq!(&buf, b"native");
        assert!(!native.is_seekable());
        assert!(matches!(
            native.seek(0, SeekMode::Start, RwMode::Last),
            Err(Error::UnseekableConnection)
        ));
        native.close().unwrap();
        assert!(lb.closed);
        assert_eq!(lb.opened_with, "r+b");
    }
}
