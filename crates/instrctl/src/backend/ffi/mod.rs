//! Default binding: marshals the backend trait onto a foreign VISA library
//!
//! The shared library is loaded once per canonical path and shared by every
//! resource manager pointing at it; the cache holds weak references so the
//! library unloads when the last owner closes.

mod types;

use std::collections::HashMap;
use std::ffi::CString;
use std::os::raw::{c_char, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use once_cell::sync::Lazy;
use tracing::{debug, error, warn};

use crate::attributes::{self, AttrKind, AttrValue};
use crate::config::Config;
use crate::constants::{
    status, AccessMode, BufferOperation, DataWidth, EventMechanism, EventType, LockKind,
};
use crate::error::{Error, Result};

use super::{check_status, Backend, BackendHandler, HandlerId, RawEvent, Session, WaitResult};
use types::*;

/// Event attribute ids captured into snapshots at dispatch time.
const EVENT_ATTR_STATUS: u32 = 0x3FFF_4025;

static LIBRARIES: Lazy<Mutex<HashMap<PathBuf, Weak<VisaLibrary>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn lib_err(path: &Path, reason: impl Into<String>) -> Error {
    Error::Library {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// One loaded VISA shared library with its resolved entry points.
#[derive(Debug)]
pub struct VisaLibrary {
    path: PathBuf,
    symbols: SymbolTable,
    // Keeps the function pointers in `symbols` alive.
    _library: libloading::Library,
}

impl VisaLibrary {
    /// Fetch the library for `path`, loading it on first use. Two managers
    /// given the same path share one handle.
    pub fn cached(path: &Path) -> Result<Arc<Self>> {
        let mut cache = LIBRARIES.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lib) = cache.get(path).and_then(Weak::upgrade) {
            return Ok(lib);
        }
        let lib = Arc::new(Self::load(path)?);
        cache.insert(path.to_path_buf(), Arc::downgrade(&lib));
        Ok(lib)
    }

    fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading visa library");
        let library = unsafe { libloading::Library::new(path) }
            .map_err(|e| lib_err(path, e.to_string()))?;
        let symbols = unsafe { Self::resolve(&library, path)? };
        Ok(VisaLibrary {
            path: path.to_path_buf(),
            symbols,
            _library: library,
        })
    }

    unsafe fn resolve(library: &libloading::Library, path: &Path) -> Result<SymbolTable> {
        unsafe fn required<T: Copy>(
            library: &libloading::Library,
            path: &Path,
            name: &[u8],
        ) -> Result<T> {
            let symbol = library.get::<T>(name).map_err(|_| {
                lib_err(
                    path,
                    format!("missing symbol {}", String::from_utf8_lossy(&name[..name.len() - 1])),
                )
            })?;
            Ok(*symbol)
        }
        unsafe fn optional<T: Copy>(library: &libloading::Library, name: &[u8]) -> Option<T> {
            library.get::<T>(name).ok().map(|symbol| *symbol)
        }

        Ok(SymbolTable {
            vi_open_default_rm: required::<ViOpenDefaultRmFn>(library, path, b"viOpenDefaultRM\0")?,
            vi_open: required::<ViOpenFn>(library, path, b"viOpen\0")?,
            vi_close: required::<ViCloseFn>(library, path, b"viClose\0")?,
            vi_find_rsrc: required::<ViFindRsrcFn>(library, path, b"viFindRsrc\0")?,
            vi_find_next: required::<ViFindNextFn>(library, path, b"viFindNext\0")?,
            vi_read: required::<ViReadFn>(library, path, b"viRead\0")?,
            vi_write: required::<ViWriteFn>(library, path, b"viWrite\0")?,
            vi_get_attribute: required::<ViGetAttributeFn>(library, path, b"viGetAttribute\0")?,
            vi_set_attribute: required::<ViSetAttributeFn>(library, path, b"viSetAttribute\0")?,
            vi_lock: required::<ViLockFn>(library, path, b"viLock\0")?,
            vi_unlock: required::<ViUnlockFn>(library, path, b"viUnlock\0")?,
            vi_enable_event: required::<ViEnableEventFn>(library, path, b"viEnableEvent\0")?,
            vi_disable_event: required::<ViDisableEventFn>(library, path, b"viDisableEvent\0")?,
            vi_discard_events: required::<ViDiscardEventsFn>(library, path, b"viDiscardEvents\0")?,
            vi_wait_on_event: required::<ViWaitOnEventFn>(library, path, b"viWaitOnEvent\0")?,
            vi_install_handler: required::<ViInstallHandlerFn>(library, path, b"viInstallHandler\0")?,
            vi_uninstall_handler: required::<ViUninstallHandlerFn>(
                library,
                path,
                b"viUninstallHandler\0",
            )?,
            vi_clear: required::<ViClearFn>(library, path, b"viClear\0")?,
            vi_read_stb: required::<ViReadStbFn>(library, path, b"viReadSTB\0")?,
            vi_assert_trigger: required::<ViAssertTriggerFn>(library, path, b"viAssertTrigger\0")?,
            vi_flush: required::<ViFlushFn>(library, path, b"viFlush\0")?,
            vi_status_desc: optional::<ViStatusDescFn>(library, b"viStatusDesc\0"),
            vi_gpib_command: optional::<ViGpibCommandFn>(library, b"viGpibCommand\0"),
            vi_gpib_control_ren: optional::<ViGpibControlRenFn>(library, b"viGpibControlREN\0"),
            vi_gpib_control_atn: optional::<ViGpibControlAtnFn>(library, b"viGpibControlATN\0"),
            vi_gpib_send_ifc: optional::<ViGpibSendIfcFn>(library, b"viGpibSendIFC\0"),
            vi_gpib_pass_control: optional::<ViGpibPassControlFn>(library, b"viGpibPassControl\0"),
            vi_usb_control_in: optional::<ViUsbControlInFn>(library, b"viUsbControlIn\0"),
            vi_usb_control_out: optional::<ViUsbControlOutFn>(library, b"viUsbControlOut\0"),
            vi_in8: optional::<ViIn8Fn>(library, b"viIn8\0"),
            vi_in16: optional::<ViIn16Fn>(library, b"viIn16\0"),
            vi_in32: optional::<ViIn32Fn>(library, b"viIn32\0"),
            vi_in64: optional::<ViIn64Fn>(library, b"viIn64\0"),
            vi_out8: optional::<ViOut8Fn>(library, b"viOut8\0"),
            vi_out16: optional::<ViOut16Fn>(library, b"viOut16\0"),
            vi_out32: optional::<ViOut32Fn>(library, b"viOut32\0"),
            vi_out64: optional::<ViOut64Fn>(library, b"viOut64\0"),
            vi_move_in8: optional::<ViMoveIn8Fn>(library, b"viMoveIn8\0"),
            vi_move_in16: optional::<ViMoveIn16Fn>(library, b"viMoveIn16\0"),
            vi_move_in32: optional::<ViMoveIn32Fn>(library, b"viMoveIn32\0"),
            vi_move_in64: optional::<ViMoveIn64Fn>(library, b"viMoveIn64\0"),
            vi_move_out8: optional::<ViMoveOut8Fn>(library, b"viMoveOut8\0"),
            vi_move_out16: optional::<ViMoveOut16Fn>(library, b"viMoveOut16\0"),
            vi_move_out32: optional::<ViMoveOut32Fn>(library, b"viMoveOut32\0"),
            vi_move_out64: optional::<ViMoveOut64Fn>(library, b"viMoveOut64\0"),
            vi_map_address: optional::<ViMapAddressFn>(library, b"viMapAddress\0"),
            vi_unmap_address: optional::<ViUnmapAddressFn>(library, b"viUnmapAddress\0"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Context handed to the C dispatch thunk; one per installed handler.
struct ThunkContext {
    callback: BackendHandler,
}

/// C entry point registered with `viInstallHandler`. Panics are contained
/// here; unwinding across the foreign frame would be undefined behavior.
unsafe extern "system" fn dispatch_thunk(
    vi: ViSession,
    event_type: ViEventType,
    event: ViEvent,
    user: *mut c_void,
) -> ViStatus {
    if user.is_null() {
        return status::SUCCESS;
    }
    let context = &*(user as *const ThunkContext);
    let Some(event_type) = EventType::from_raw(event_type) else {
        return status::SUCCESS;
    };
    let raw = RawEvent {
        event_type,
        context: Some(u64::from(event)),
        attributes: HashMap::new(),
    };
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        (context.callback)(Session(vi), &raw);
    }));
    if outcome.is_err() {
        error!(session = vi, event = ?event_type, "event handler panicked; not propagated");
    }
    status::SUCCESS
}

#[derive(Debug)]
struct HandlerSlot {
    event: EventType,
    /// Leaked `Box<ThunkContext>` passed to the library as user data.
    context: usize,
}

/// The default backend: a safe facade over one foreign VISA library.
#[derive(Debug)]
pub struct FfiBackend {
    library: Arc<VisaLibrary>,
    handlers: Mutex<HashMap<u64, HandlerSlot>>,
    next_handler: AtomicU64,
}

impl FfiBackend {
    /// Open the binding for the configured library. `path` comes from the
    /// selector split; `dll_extra_paths` are tried in order when the hint
    /// alone does not load.
    pub fn open(config: &Config, path: Option<&Path>) -> Result<Arc<Self>> {
        let hint = match path {
            Some(p) => p.to_path_buf(),
            None if !config.library_path.is_empty() => PathBuf::from(&config.library_path),
            None => {
                return Err(Error::Library {
                    path: String::new(),
                    reason: "no visa library path configured".to_string(),
                })
            }
        };

        let mut last_err = None;
        for candidate in candidate_paths(&hint, &config.dll_extra_paths) {
            match VisaLibrary::cached(&candidate) {
                Ok(library) => {
                    return Ok(Arc::new(FfiBackend {
                        library,
                        handlers: Mutex::new(HashMap::new()),
                        next_handler: AtomicU64::new(1),
                    }))
                }
                Err(err) => {
                    debug!(candidate = %candidate.display(), %err, "library candidate rejected");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| lib_err(&hint, "library could not be loaded")))
    }

    /// Path of the library this binding wraps.
    pub fn library_path(&self) -> &Path {
        self.library.path()
    }

    fn symbols(&self) -> &SymbolTable {
        &self.library.symbols
    }

    /// Human-readable description for a status code, when the library
    /// provides one.
    pub fn status_description(&self, session: Session, code: i32) -> Option<String> {
        let desc_fn = self.symbols().vi_status_desc?;
        let mut buf = [0 as c_char; RESPONSE_BUF];
        let rc = unsafe { desc_fn(session.0, code, buf.as_mut_ptr()) };
        if status::is_error(rc) {
            return None;
        }
        Some(read_c_buf(&buf))
    }
}

fn candidate_paths(hint: &Path, extra: &[PathBuf]) -> Vec<PathBuf> {
    let mut candidates = vec![hint.to_path_buf()];
    if let Some(file_name) = hint.file_name() {
        for dir in extra {
            let candidate = dir.join(file_name);
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
    }
    candidates
}

fn to_cstring(text: &str, what: &str) -> Result<CString> {
    CString::new(text).map_err(|_| Error::Config {
        reason: format!("{what} contains an interior NUL byte"),
    })
}

fn read_c_buf(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

impl Backend for FfiBackend {
    fn name(&self) -> &str {
        super::DEFAULT_BACKEND
    }

    fn open_default_rm(&self) -> Result<Session> {
        let mut session: ViSession = 0;
        let rc = unsafe { (self.symbols().vi_open_default_rm)(&mut session) };
        check_status(rc, "viOpenDefaultRM")?;
        Ok(Session(session))
    }

    fn open(
        &self,
        rm: Session,
        resource_name: &str,
        access_mode: AccessMode,
        open_timeout_ms: u32,
    ) -> Result<(Session, i32)> {
        let name = to_cstring(resource_name, "resource name")?;
        let mut session: ViSession = 0;
        let rc = unsafe {
            (self.symbols().vi_open)(
                rm.0,
                name.as_ptr(),
                access_mode.bits(),
                open_timeout_ms,
                &mut session,
            )
        };
        let rc = check_status(rc, "viOpen")?;
        Ok((Session(session), rc))
    }

    fn close(&self, session: Session) -> Result<()> {
        let rc = unsafe { (self.symbols().vi_close)(session.0) };
        check_status(rc, "viClose")?;
        Ok(())
    }

    fn list_resources(&self, rm: Session, pattern: &str) -> Result<Vec<String>> {
        let pattern = to_cstring(pattern, "discovery pattern")?;
        let mut find_list: ViFindList = 0;
        let mut count: u32 = 0;
        let mut buf = [0 as c_char; RESPONSE_BUF];
        let rc = unsafe {
            (self.symbols().vi_find_rsrc)(
                rm.0,
                pattern.as_ptr(),
                &mut find_list,
                &mut count,
                buf.as_mut_ptr(),
            )
        };
        if rc == status::ERROR_RSRC_NFOUND {
            return Ok(Vec::new());
        }
        check_status(rc, "viFindRsrc")?;

        let mut names = Vec::with_capacity(count as usize);
        names.push(read_c_buf(&buf));
        for _ in 1..count {
            let rc = unsafe { (self.symbols().vi_find_next)(find_list, buf.as_mut_ptr()) };
            if rc == status::ERROR_RSRC_NFOUND {
                break;
            }
            check_status(rc, "viFindNext")?;
            names.push(read_c_buf(&buf));
        }
        let rc = unsafe { (self.symbols().vi_close)(find_list) };
        if status::is_error(rc) {
            warn!(status = rc, "closing find list failed");
        }
        Ok(names)
    }

    fn get_attr(&self, session: Session, attr: u32) -> Result<AttrValue> {
        let is_string = attributes::descriptor(attr)
            .map(|d| matches!(d.kind, AttrKind::String | AttrKind::Bytes))
            .unwrap_or(false);
        if is_string {
            let mut buf = [0 as c_char; RESPONSE_BUF];
            let rc = unsafe {
                (self.symbols().vi_get_attribute)(session.0, attr, buf.as_mut_ptr() as *mut c_void)
            };
            check_status(rc, "viGetAttribute")?;
            Ok(AttrValue::Str(read_c_buf(&buf)))
        } else {
            let mut state: ViAttrState = 0;
            let rc = unsafe {
                (self.symbols().vi_get_attribute)(
                    session.0,
                    attr,
                    (&mut state as *mut ViAttrState).cast::<c_void>(),
                )
            };
            check_status(rc, "viGetAttribute")?;
            Ok(AttrValue::Scalar(state))
        }
    }

    fn set_attr(&self, session: Session, attr: u32, value: AttrValue) -> Result<()> {
        let state = value.as_scalar().ok_or(Error::Io {
            status: status::ERROR_NSUP_ATTR_STATE,
            op: "viSetAttribute",
        })?;
        let rc = unsafe { (self.symbols().vi_set_attribute)(session.0, attr, state) };
        check_status(rc, "viSetAttribute")?;
        Ok(())
    }

    fn lock(
        &self,
        session: Session,
        kind: LockKind,
        timeout_ms: u32,
        requested_key: Option<&str>,
    ) -> Result<Option<String>> {
        match kind {
            LockKind::Exclusive => {
                let rc = unsafe {
                    (self.symbols().vi_lock)(
                        session.0,
                        AccessMode::EXCLUSIVE_LOCK.bits(),
                        timeout_ms,
                        std::ptr::null(),
                        std::ptr::null_mut(),
                    )
                };
                check_status(rc, "viLock")?;
                Ok(None)
            }
            LockKind::Shared => {
                let requested = match requested_key {
                    Some(key) => Some(to_cstring(key, "requested lock key")?),
                    None => None,
                };
                let mut granted = [0 as c_char; RESPONSE_BUF];
                let rc = unsafe {
                    (self.symbols().vi_lock)(
                        session.0,
                        AccessMode::SHARED_LOCK.bits(),
                        timeout_ms,
                        requested.as_ref().map_or(std::ptr::null(), |k| k.as_ptr()),
                        granted.as_mut_ptr(),
                    )
                };
                check_status(rc, "viLock")?;
                Ok(Some(read_c_buf(&granted)))
            }
        }
    }

    fn unlock(&self, session: Session) -> Result<()> {
        let rc = unsafe { (self.symbols().vi_unlock)(session.0) };
        check_status(rc, "viUnlock")?;
        Ok(())
    }

    fn read(&self, session: Session, count: usize) -> Result<(Vec<u8>, i32)> {
        let mut buf = vec![0u8; count];
        let mut ret_count: u32 = 0;
        let rc = unsafe {
            (self.symbols().vi_read)(session.0, buf.as_mut_ptr(), count as u32, &mut ret_count)
        };
        let rc = check_status(rc, "viRead")?;
        buf.truncate(ret_count as usize);
        Ok((buf, rc))
    }

    fn write(&self, session: Session, data: &[u8]) -> Result<(usize, i32)> {
        let mut ret_count: u32 = 0;
        let rc = unsafe {
            (self.symbols().vi_write)(session.0, data.as_ptr(), data.len() as u32, &mut ret_count)
        };
        let rc = check_status(rc, "viWrite")?;
        Ok((ret_count as usize, rc))
    }

    fn enable_event(
        &self,
        session: Session,
        event: EventType,
        mechanism: EventMechanism,
    ) -> Result<()> {
        let rc = unsafe {
            (self.symbols().vi_enable_event)(session.0, event.as_u32(), mechanism.bits(), 0)
        };
        check_status(rc, "viEnableEvent")?;
        Ok(())
    }

    fn disable_event(
        &self,
        session: Session,
        event: EventType,
        mechanism: EventMechanism,
    ) -> Result<()> {
        let rc =
            unsafe { (self.symbols().vi_disable_event)(session.0, event.as_u32(), mechanism.bits()) };
        check_status(rc, "viDisableEvent")?;
        Ok(())
    }

    fn discard_events(
        &self,
        session: Session,
        event: EventType,
        mechanism: EventMechanism,
    ) -> Result<()> {
        let rc = unsafe {
            (self.symbols().vi_discard_events)(session.0, event.as_u32(), mechanism.bits())
        };
        check_status(rc, "viDiscardEvents")?;
        Ok(())
    }

    fn wait_on_event(
        &self,
        session: Session,
        event: EventType,
        timeout_ms: u32,
    ) -> Result<WaitResult> {
        let mut out_type: ViEventType = 0;
        let mut out_event: ViEvent = 0;
        let rc = unsafe {
            (self.symbols().vi_wait_on_event)(
                session.0,
                event.as_u32(),
                timeout_ms,
                &mut out_type,
                &mut out_event,
            )
        };
        if rc == status::ERROR_TMO {
            return Ok(WaitResult {
                event: None,
                timed_out: true,
            });
        }
        check_status(rc, "viWaitOnEvent")?;

        // Snapshot what we need, then give the event context back to the
        // library; the returned record stays valid regardless.
        let mut attrs = HashMap::new();
        let mut state: ViAttrState = 0;
        let attr_rc = unsafe {
            (self.symbols().vi_get_attribute)(
                out_event,
                EVENT_ATTR_STATUS,
                (&mut state as *mut ViAttrState).cast::<c_void>(),
            )
        };
        if !status::is_error(attr_rc) {
            attrs.insert(EVENT_ATTR_STATUS, AttrValue::Scalar(state));
        }
        let close_rc = unsafe { (self.symbols().vi_close)(out_event) };
        if status::is_error(close_rc) {
            warn!(status = close_rc, "closing event context failed");
        }

        Ok(WaitResult {
            event: Some(RawEvent {
                event_type: EventType::from_raw(out_type).unwrap_or(event),
                context: Some(u64::from(out_event)),
                attributes: attrs,
            }),
            timed_out: false,
        })
    }

    fn install_handler(
        &self,
        session: Session,
        event: EventType,
        handler: BackendHandler,
    ) -> Result<HandlerId> {
        let context = Box::into_raw(Box::new(ThunkContext { callback: handler }));
        let rc = unsafe {
            (self.symbols().vi_install_handler)(
                session.0,
                event.as_u32(),
                dispatch_thunk,
                context.cast::<c_void>(),
            )
        };
        if let Err(err) = check_status(rc, "viInstallHandler") {
            // Reclaim the context we just leaked.
            drop(unsafe { Box::from_raw(context) });
            return Err(err);
        }
        let id = self.next_handler.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                HandlerSlot {
                    event,
                    context: context as usize,
                },
            );
        Ok(HandlerId(id))
    }

    fn uninstall_handler(&self, session: Session, event: EventType, id: HandlerId) -> Result<()> {
        let slot = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id.0)
            .ok_or(Error::Io {
                status: status::ERROR_INV_HNDLR_REF,
                op: "viUninstallHandler",
            })?;
        if slot.event != event {
            // Put it back; the caller named the wrong event type.
            self.handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id.0, slot);
            return Err(Error::Io {
                status: status::ERROR_INV_EVENT,
                op: "viUninstallHandler",
            });
        }
        let context = slot.context as *mut ThunkContext;
        let rc = unsafe {
            (self.symbols().vi_uninstall_handler)(
                session.0,
                event.as_u32(),
                dispatch_thunk,
                context.cast::<c_void>(),
            )
        };
        let result = check_status(rc, "viUninstallHandler");
        drop(unsafe { Box::from_raw(context) });
        result.map(|_| ())
    }

    fn assert_trigger(&self, session: Session, protocol: u16) -> Result<()> {
        let rc = unsafe { (self.symbols().vi_assert_trigger)(session.0, protocol) };
        check_status(rc, "viAssertTrigger")?;
        Ok(())
    }

    fn clear(&self, session: Session) -> Result<()> {
        let rc = unsafe { (self.symbols().vi_clear)(session.0) };
        check_status(rc, "viClear")?;
        Ok(())
    }

    fn read_stb(&self, session: Session) -> Result<u16> {
        let mut stb: u16 = 0;
        let rc = unsafe { (self.symbols().vi_read_stb)(session.0, &mut stb) };
        check_status(rc, "viReadSTB")?;
        Ok(stb)
    }

    fn flush(&self, session: Session, mask: BufferOperation) -> Result<()> {
        let rc = unsafe { (self.symbols().vi_flush)(session.0, mask.bits()) };
        check_status(rc, "viFlush")?;
        Ok(())
    }

    fn gpib_command(&self, session: Session, data: &[u8]) -> Result<usize> {
        let f = self
            .symbols()
            .vi_gpib_command
            .ok_or_else(|| self.unsupported("gpib_command"))?;
        let mut ret_count: u32 = 0;
        let rc = unsafe { f(session.0, data.as_ptr(), data.len() as u32, &mut ret_count) };
        check_status(rc, "viGpibCommand")?;
        Ok(ret_count as usize)
    }

    fn gpib_control_ren(&self, session: Session, mode: u16) -> Result<()> {
        let f = self
            .symbols()
            .vi_gpib_control_ren
            .ok_or_else(|| self.unsupported("gpib_control_ren"))?;
        check_status(unsafe { f(session.0, mode) }, "viGpibControlREN")?;
        Ok(())
    }

    fn gpib_control_atn(&self, session: Session, mode: u16) -> Result<()> {
        let f = self
            .symbols()
            .vi_gpib_control_atn
            .ok_or_else(|| self.unsupported("gpib_control_atn"))?;
        check_status(unsafe { f(session.0, mode) }, "viGpibControlATN")?;
        Ok(())
    }

    fn gpib_send_ifc(&self, session: Session) -> Result<()> {
        let f = self
            .symbols()
            .vi_gpib_send_ifc
            .ok_or_else(|| self.unsupported("gpib_send_ifc"))?;
        check_status(unsafe { f(session.0) }, "viGpibSendIFC")?;
        Ok(())
    }

    fn gpib_pass_control(&self, session: Session, primary: u16, secondary: Option<u16>) -> Result<()> {
        let f = self
            .symbols()
            .vi_gpib_pass_control
            .ok_or_else(|| self.unsupported("gpib_pass_control"))?;
        // 0xFFFF tells the library there is no secondary address.
        let secondary = secondary.unwrap_or(0xFFFF);
        check_status(unsafe { f(session.0, primary, secondary) }, "viGpibPassControl")?;
        Ok(())
    }

    fn usb_control_in(
        &self,
        session: Session,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> Result<Vec<u8>> {
        let f = self
            .symbols()
            .vi_usb_control_in
            .ok_or_else(|| self.unsupported("usb_control_in"))?;
        let mut buf = vec![0u8; usize::from(length)];
        let mut ret_count: u16 = 0;
        let rc = unsafe {
            f(
                session.0,
                i16::from(request_type),
                i16::from(request),
                value,
                index,
                length,
                buf.as_mut_ptr(),
                &mut ret_count,
            )
        };
        check_status(rc, "viUsbControlIn")?;
        buf.truncate(usize::from(ret_count));
        Ok(buf)
    }

    fn usb_control_out(
        &self,
        session: Session,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<()> {
        let f = self
            .symbols()
            .vi_usb_control_out
            .ok_or_else(|| self.unsupported("usb_control_out"))?;
        let rc = unsafe {
            f(
                session.0,
                i16::from(request_type),
                i16::from(request),
                value,
                index,
                data.len() as u16,
                data.as_ptr(),
            )
        };
        check_status(rc, "viUsbControlOut")?;
        Ok(())
    }

    fn mem_read(&self, session: Session, space: u16, offset: u64, width: DataWidth) -> Result<u64> {
        let symbols = self.symbols();
        match width {
            DataWidth::W8 => {
                let f = symbols.vi_in8.ok_or_else(|| self.unsupported("mem_read"))?;
                let mut value: u8 = 0;
                check_status(unsafe { f(session.0, space, offset, &mut value) }, "viIn8")?;
                Ok(u64::from(value))
            }
            DataWidth::W16 => {
                let f = symbols.vi_in16.ok_or_else(|| self.unsupported("mem_read"))?;
                let mut value: u16 = 0;
                check_status(unsafe { f(session.0, space, offset, &mut value) }, "viIn16")?;
                Ok(u64::from(value))
            }
            DataWidth::W32 => {
                let f = symbols.vi_in32.ok_or_else(|| self.unsupported("mem_read"))?;
                let mut value: u32 = 0;
                check_status(unsafe { f(session.0, space, offset, &mut value) }, "viIn32")?;
                Ok(u64::from(value))
            }
            DataWidth::W64 => {
                let f = symbols.vi_in64.ok_or_else(|| self.unsupported("mem_read"))?;
                let mut value: u64 = 0;
                check_status(unsafe { f(session.0, space, offset, &mut value) }, "viIn64")?;
                Ok(value)
            }
        }
    }

    fn mem_write(
        &self,
        session: Session,
        space: u16,
        offset: u64,
        width: DataWidth,
        value: u64,
    ) -> Result<()> {
        let symbols = self.symbols();
        match width {
            DataWidth::W8 => {
                let f = symbols.vi_out8.ok_or_else(|| self.unsupported("mem_write"))?;
                check_status(unsafe { f(session.0, space, offset, value as u8) }, "viOut8")?;
            }
            DataWidth::W16 => {
                let f = symbols.vi_out16.ok_or_else(|| self.unsupported("mem_write"))?;
                check_status(unsafe { f(session.0, space, offset, value as u16) }, "viOut16")?;
            }
            DataWidth::W32 => {
                let f = symbols.vi_out32.ok_or_else(|| self.unsupported("mem_write"))?;
                check_status(unsafe { f(session.0, space, offset, value as u32) }, "viOut32")?;
            }
            DataWidth::W64 => {
                let f = symbols.vi_out64.ok_or_else(|| self.unsupported("mem_write"))?;
                check_status(unsafe { f(session.0, space, offset, value) }, "viOut64")?;
            }
        }
        Ok(())
    }

    fn move_in(
        &self,
        session: Session,
        space: u16,
        offset: u64,
        length: u64,
        width: DataWidth,
    ) -> Result<Vec<u64>> {
        let symbols = self.symbols();
        let count = usize::try_from(length).map_err(|_| Error::Io {
            status: status::ERROR_INV_LENGTH,
            op: "viMoveIn",
        })?;
        match width {
            DataWidth::W8 => {
                let f = symbols.vi_move_in8.ok_or_else(|| self.unsupported("move_in"))?;
                let mut buf = vec![0u8; count];
                check_status(
                    unsafe { f(session.0, space, offset, length, buf.as_mut_ptr()) },
                    "viMoveIn8",
                )?;
                Ok(buf.into_iter().map(u64::from).collect())
            }
            DataWidth::W16 => {
                let f = symbols.vi_move_in16.ok_or_else(|| self.unsupported("move_in"))?;
                let mut buf = vec![0u16; count];
                check_status(
                    unsafe { f(session.0, space, offset, length, buf.as_mut_ptr()) },
                    "viMoveIn16",
                )?;
                Ok(buf.into_iter().map(u64::from).collect())
            }
            DataWidth::W32 => {
                let f = symbols.vi_move_in32.ok_or_else(|| self.unsupported("move_in"))?;
                let mut buf = vec![0u32; count];
                check_status(
                    unsafe { f(session.0, space, offset, length, buf.as_mut_ptr()) },
                    "viMoveIn32",
                )?;
                Ok(buf.into_iter().map(u64::from).collect())
            }
            DataWidth::W64 => {
                let f = symbols.vi_move_in64.ok_or_else(|| self.unsupported("move_in"))?;
                let mut buf = vec![0u64; count];
                check_status(
                    unsafe { f(session.0, space, offset, length, buf.as_mut_ptr()) },
                    "viMoveIn64",
                )?;
                Ok(buf)
            }
        }
    }

    fn move_out(
        &self,
        session: Session,
        space: u16,
        offset: u64,
        width: DataWidth,
        values: &[u64],
    ) -> Result<()> {
        let symbols = self.symbols();
        let length = values.len() as u64;
        match width {
            DataWidth::W8 => {
                let f = symbols.vi_move_out8.ok_or_else(|| self.unsupported("move_out"))?;
                let buf: Vec<u8> = values.iter().map(|&v| v as u8).collect();
                check_status(
                    unsafe { f(session.0, space, offset, length, buf.as_ptr()) },
                    "viMoveOut8",
                )?;
            }
            DataWidth::W16 => {
                let f = symbols.vi_move_out16.ok_or_else(|| self.unsupported("move_out"))?;
                let buf: Vec<u16> = values.iter().map(|&v| v as u16).collect();
                check_status(
                    unsafe { f(session.0, space, offset, length, buf.as_ptr()) },
                    "viMoveOut16",
                )?;
            }
            DataWidth::W32 => {
                let f = symbols.vi_move_out32.ok_or_else(|| self.unsupported("move_out"))?;
                let buf: Vec<u32> = values.iter().map(|&v| v as u32).collect();
                check_status(
                    unsafe { f(session.0, space, offset, length, buf.as_ptr()) },
                    "viMoveOut32",
                )?;
            }
            DataWidth::W64 => {
                let f = symbols.vi_move_out64.ok_or_else(|| self.unsupported("move_out"))?;
                check_status(
                    unsafe { f(session.0, space, offset, length, values.as_ptr()) },
                    "viMoveOut64",
                )?;
            }
        }
        Ok(())
    }

    fn map_address(&self, session: Session, space: u16, offset: u64, size: u64) -> Result<u64> {
        let f = self
            .symbols()
            .vi_map_address
            .ok_or_else(|| self.unsupported("map_address"))?;
        let mut address: *mut c_void = std::ptr::null_mut();
        let rc = unsafe {
            f(
                session.0,
                space,
                offset,
                size,
                0,
                std::ptr::null_mut(),
                &mut address,
            )
        };
        check_status(rc, "viMapAddress")?;
        Ok(address as u64)
    }

    fn unmap_address(&self, session: Session) -> Result<()> {
        let f = self
            .symbols()
            .vi_unmap_address
            .ok_or_else(|| self.unsupported("unmap_address"))?;
        check_status(unsafe { f(session.0) }, "viUnmapAddress")?;
        Ok(())
    }
}

impl Drop for FfiBackend {
    fn drop(&mut self) {
        // Reclaim thunk contexts for handlers never uninstalled; their
        // sessions are gone by now.
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, slot) in handlers.drain() {
            drop(unsafe { Box::from_raw(slot.context as *mut ThunkContext) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_paths_order() {
        let candidates = candidate_paths(
            Path::new("libvisa.so"),
            &[PathBuf::from("/opt/a"), PathBuf::from("/opt/b")],
        );
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("libvisa.so"),
                PathBuf::from("/opt/a/libvisa.so"),
                PathBuf::from("/opt/b/libvisa.so"),
            ]
        );
    }

    #[test]
    fn test_read_c_buf_stops_at_nul() {
        let mut buf = [0 as c_char; 8];
        for (i, &b) in b"GPIB".iter().enumerate() {
            buf[i] = b as c_char;
        }
        assert_eq!(read_c_buf(&buf), "GPIB");
    }

    #[test]
    fn test_open_without_path_fails() {
        let err = FfiBackend::open(&Config::default(), None).unwrap_err();
        assert!(matches!(err, Error::Library { .. }));
    }

    #[test]
    fn test_missing_library_reports_path() {
        let config = Config::default();
        let err = FfiBackend::open(&config, Some(Path::new("/nonexistent/libvisa.so"))).unwrap_err();
        let Error::Library { path, .. } = err else {
            panic!("expected library error");
        };
        assert!(path.contains("nonexistent"));
    }
}
