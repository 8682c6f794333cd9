//! Backend capability interface and selection
//!
//! The core talks to instruments exclusively through [`Backend`], the
//! narrow surface below. The default binding marshals every call to a
//! foreign VISA shared library; alternative implementations register under
//! a name and are selected with a trailing `@<name>` on the library hint.

pub mod ffi;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::attributes::AttrValue;
use crate::config::Config;
use crate::constants::{
    status, AccessMode, BufferOperation, DataWidth, EventMechanism, EventType, LockKind,
};
use crate::error::{Error, Result};

/// Default discovery pattern.
pub const DEFAULT_LIST_PATTERN: &str = "?*::INSTR";

/// Name of the default foreign-library binding.
pub const DEFAULT_BACKEND: &str = "ivi";

/// Opaque per-resource handle issued by a backend. Unique per live
/// resource; invalid after close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Session(pub u32);

/// Opaque handle identifying one installed handler. Produced at install
/// time and required to uninstall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

/// Event payload crossing the backend boundary. The snapshot stays valid
/// after the backend reclaims the underlying event context.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub event_type: EventType,
    /// Backend event-context handle, when one existed.
    pub context: Option<u64>,
    /// Attributes captured at dispatch time.
    pub attributes: HashMap<u32, AttrValue>,
}

/// Outcome of a queue wait. A timeout is a response, not an error.
#[derive(Debug, Clone)]
pub struct WaitResult {
    pub event: Option<RawEvent>,
    pub timed_out: bool,
}

/// Callback installed into a backend; invoked on whatever thread the
/// backend dispatches on.
pub type BackendHandler = Box<dyn Fn(Session, &RawEvent) + Send + Sync>;

/// The minimum capability surface the core needs from a transport.
///
/// Every operation maps onto one backend call; statuses of the warning
/// class come back in the `i32` halves of the I/O results, true errors as
/// [`Error`] values. Bus-specific helpers default to `Unsupported` so
/// software backends implement only what their transport has.
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    // Session lifecycle
    fn open_default_rm(&self) -> Result<Session>;
    fn open(
        &self,
        rm: Session,
        resource_name: &str,
        access_mode: AccessMode,
        open_timeout_ms: u32,
    ) -> Result<(Session, i32)>;
    fn close(&self, session: Session) -> Result<()>;

    // Discovery
    fn list_resources(&self, rm: Session, pattern: &str) -> Result<Vec<String>>;

    // Attributes
    fn get_attr(&self, session: Session, attr: u32) -> Result<AttrValue>;
    fn set_attr(&self, session: Session, attr: u32, value: AttrValue) -> Result<()>;

    // Locking
    fn lock(
        &self,
        session: Session,
        kind: LockKind,
        timeout_ms: u32,
        requested_key: Option<&str>,
    ) -> Result<Option<String>>;
    fn unlock(&self, session: Session) -> Result<()>;

    // I/O
    fn read(&self, session: Session, count: usize) -> Result<(Vec<u8>, i32)>;
    fn write(&self, session: Session, data: &[u8]) -> Result<(usize, i32)>;

    // Events
    fn enable_event(&self, session: Session, event: EventType, mechanism: EventMechanism)
        -> Result<()>;
    fn disable_event(
        &self,
        session: Session,
        event: EventType,
        mechanism: EventMechanism,
    ) -> Result<()>;
    fn discard_events(
        &self,
        session: Session,
        event: EventType,
        mechanism: EventMechanism,
    ) -> Result<()>;
    fn wait_on_event(&self, session: Session, event: EventType, timeout_ms: u32)
        -> Result<WaitResult>;
    fn install_handler(
        &self,
        session: Session,
        event: EventType,
        handler: BackendHandler,
    ) -> Result<HandlerId>;
    fn uninstall_handler(&self, session: Session, event: EventType, id: HandlerId) -> Result<()>;

    // Bus-specific helpers
    fn assert_trigger(&self, session: Session, _protocol: u16) -> Result<()> {
        let _ = session;
        Err(self.unsupported("assert_trigger"))
    }
    fn clear(&self, session: Session) -> Result<()> {
        let _ = session;
        Err(self.unsupported("clear"))
    }
    fn read_stb(&self, session: Session) -> Result<u16> {
        let _ = session;
        Err(self.unsupported("read_stb"))
    }
    fn flush(&self, session: Session, _mask: BufferOperation) -> Result<()> {
        let _ = session;
        Err(self.unsupported("flush"))
    }
    fn gpib_command(&self, session: Session, _data: &[u8]) -> Result<usize> {
        let _ = session;
        Err(self.unsupported("gpib_command"))
    }
    fn gpib_control_ren(&self, session: Session, _mode: u16) -> Result<()> {
        let _ = session;
        Err(self.unsupported("gpib_control_ren"))
    }
    fn gpib_control_atn(&self, session: Session, _mode: u16) -> Result<()> {
        let _ = session;
        Err(self.unsupported("gpib_control_atn"))
    }
    fn gpib_send_ifc(&self, session: Session) -> Result<()> {
        let _ = session;
        Err(self.unsupported("gpib_send_ifc"))
    }
    fn gpib_pass_control(&self, session: Session, _primary: u16, _secondary: Option<u16>) -> Result<()> {
        let _ = session;
        Err(self.unsupported("gpib_pass_control"))
    }
    fn usb_control_in(
        &self,
        session: Session,
        _request_type: u8,
        _request: u8,
        _value: u16,
        _index: u16,
        _length: u16,
    ) -> Result<Vec<u8>> {
        let _ = session;
        Err(self.unsupported("usb_control_in"))
    }
    fn usb_control_out(
        &self,
        session: Session,
        _request_type: u8,
        _request: u8,
        _value: u16,
        _index: u16,
        _data: &[u8],
    ) -> Result<()> {
        let _ = session;
        Err(self.unsupported("usb_control_out"))
    }
    fn mem_read(
        &self,
        session: Session,
        _space: u16,
        _offset: u64,
        _width: DataWidth,
    ) -> Result<u64> {
        let _ = session;
        Err(self.unsupported("mem_read"))
    }
    fn mem_write(
        &self,
        session: Session,
        _space: u16,
        _offset: u64,
        _width: DataWidth,
        _value: u64,
    ) -> Result<()> {
        let _ = session;
        Err(self.unsupported("mem_write"))
    }
    fn move_in(
        &self,
        session: Session,
        _space: u16,
        _offset: u64,
        _length: u64,
        _width: DataWidth,
    ) -> Result<Vec<u64>> {
        let _ = session;
        Err(self.unsupported("move_in"))
    }
    fn move_out(
        &self,
        session: Session,
        _space: u16,
        _offset: u64,
        _width: DataWidth,
        _values: &[u64],
    ) -> Result<()> {
        let _ = session;
        Err(self.unsupported("move_out"))
    }
    fn map_address(
        &self,
        session: Session,
        _space: u16,
        _offset: u64,
        _size: u64,
    ) -> Result<u64> {
        let _ = session;
        Err(self.unsupported("map_address"))
    }
    fn unmap_address(&self, session: Session) -> Result<()> {
        let _ = session;
        Err(self.unsupported("unmap_address"))
    }

    fn unsupported(&self, op: &'static str) -> Error {
        Error::Unsupported {
            op,
            kind: self.name().to_string(),
        }
    }
}

/// Map a VISA error status to the corresponding error variant. Timeout
/// deadlines are filled in by the layer that knows them.
pub fn status_to_error(code: i32, op: &'static str) -> Error {
    match code {
        status::ERROR_TMO => Error::Timeout { op, timeout_ms: 0 },
        status::ERROR_INV_OBJECT => Error::InvalidSession,
        status::ERROR_RSRC_NFOUND | status::ERROR_INV_RSRC_NAME => Error::ResourceNotFound,
        status::ERROR_RSRC_BUSY | status::ERROR_RSRC_LOCKED => Error::ResourceBusy,
        status::ERROR_INV_ACC_MODE | status::ERROR_INV_ACCESS_KEY => Error::AccessDenied,
        status::ERROR_NSUP_OPER | status::ERROR_NIMPL_OPER => Error::Unsupported {
            op,
            kind: "backend".to_string(),
        },
        _ => Error::Io { status: code, op },
    }
}

/// Turn a raw status into a result, keeping warning statuses as values.
pub fn check_status(code: i32, op: &'static str) -> Result<i32> {
    if status::is_error(code) {
        Err(status_to_error(code, op))
    } else {
        Ok(code)
    }
}

/// Split a library hint into its path part and backend name.
///
/// `"/opt/visa/libvisa.so@ivi"` selects the `ivi` binding with an explicit
/// path; a bare `"@sim"` selects the `sim` backend with no path. Without a
/// suffix the hint is all path and the default binding is used.
pub fn split_library_hint(hint: &str) -> Result<(Option<PathBuf>, String)> {
    let hint = hint.trim();
    match hint.rsplit_once('@') {
        Some((path, name)) => {
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
                return Err(Error::Config {
                    reason: format!("malformed backend selector {name:?}"),
                });
            }
            let path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
            Ok((path, name.to_ascii_lowercase()))
        }
        None => {
            let path = if hint.is_empty() {
                None
            } else {
                Some(PathBuf::from(hint))
            };
            Ok((path, DEFAULT_BACKEND.to_string()))
        }
    }
}

/// Factory producing a backend from the configuration and an optional
/// explicit library path.
pub type BackendFactory =
    Arc<dyn Fn(&Config, Option<&Path>) -> Result<Arc<dyn Backend>> + Send + Sync>;

static BACKENDS: Lazy<Mutex<HashMap<String, BackendFactory>>> = Lazy::new(|| {
    let mut map: HashMap<String, BackendFactory> = HashMap::new();
    map.insert(
        DEFAULT_BACKEND.to_string(),
        Arc::new(|config: &Config, path: Option<&Path>| {
            ffi::FfiBackend::open(config, path).map(|b| b as Arc<dyn Backend>)
        }),
    );
    Mutex::new(map)
});

/// Register a backend under a name. Re-registering a name replaces the
/// previous factory.
pub fn register_backend(name: &str, factory: BackendFactory) {
    let mut backends = BACKENDS.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    debug!(backend = name, "registering backend");
    backends.insert(name.to_ascii_lowercase(), factory);
}

/// Names currently registered, default binding included.
pub fn registered_backends() -> Vec<String> {
    let backends = BACKENDS.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let mut names: Vec<String> = backends.keys().cloned().collect();
    names.sort();
    names
}

/// Resolve the backend selected by the configuration: the `@<name>` suffix
/// of `library_path` wins, then the explicit `backend` field, then the
/// default binding.
pub fn resolve_backend(config: &Config) -> Result<Arc<dyn Backend>> {
    let (path, mut name) = split_library_hint(&config.library_path)?;
    if name == DEFAULT_BACKEND {
        if let Some(explicit) = &config.backend {
            name = explicit.to_ascii_lowercase();
        }
    }
    let factory = {
        let backends = BACKENDS.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        backends.get(&name).cloned()
    };
    let factory = factory.ok_or_else(|| Error::Config {
        reason: format!("no backend registered under {name:?}"),
    })?;
    debug!(backend = %name, path = ?path, "resolving backend");
    factory(config, path.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_library_hint() {
        let (path, name) = split_library_hint("/path/to/lib@ivi").unwrap();
        assert_eq!(path, Some(PathBuf::from("/path/to/lib")));
        assert_eq!(name, "ivi");

        let (path, name) = split_library_hint("@py").unwrap();
        assert_eq!(path, None);
        assert_eq!(name, "py");

        let (path, name) = split_library_hint("/usr/lib/libvisa.so").unwrap();
        assert_eq!(path, Some(PathBuf::from("/usr/lib/libvisa.so")));
        assert_eq!(name, DEFAULT_BACKEND);

        let (path, name) = split_library_hint("").unwrap();
        assert_eq!(path, None);
        assert_eq!(name, DEFAULT_BACKEND);

        // Underscores are legal in backend names.
        let (_, name) = split_library_hint("@my_backend").unwrap();
        assert_eq!(name, "my_backend");

        assert!(split_library_hint("lib@").is_err());
        assert!(split_library_hint("lib@bad name").is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_to_error(status::ERROR_TMO, "viRead"),
            Error::Timeout { op: "viRead", .. }
        ));
        assert!(matches!(
            status_to_error(status::ERROR_INV_OBJECT, "viWrite"),
            Error::InvalidSession
        ));
        assert!(matches!(
            status_to_error(status::ERROR_RSRC_NFOUND, "viOpen"),
            Error::ResourceNotFound
        ));
        assert!(matches!(
            status_to_error(status::ERROR_RSRC_LOCKED, "viLock"),
            Error::ResourceBusy
        ));
        assert!(matches!(
            status_to_error(status::ERROR_NSUP_OPER, "viMapAddress"),
            Error::Unsupported { .. }
        ));
        assert!(matches!(
            status_to_error(status::ERROR_IO, "viRead"),
            Error::Io { .. }
        ));
    }

    #[test]
    fn test_check_status_keeps_warnings() {
        assert_eq!(check_status(status::SUCCESS, "op").unwrap(), status::SUCCESS);
        assert_eq!(
            check_status(status::SUCCESS_MAX_CNT, "op").unwrap(),
            status::SUCCESS_MAX_CNT
        );
        assert!(check_status(status::ERROR_TMO, "op").is_err());
    }

    #[test]
    fn test_registry_resolution_errors() {
        let config = Config {
            library_path: "@not_registered_anywhere".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            resolve_backend(&config),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_register_and_list() {
        register_backend(
            "unit_test_backend",
            Arc::new(|_: &Config, _: Option<&Path>| {
                Err(Error::Config {
                    reason: "factory for registration test only".to_string(),
                })
            }),
        );
        assert!(registered_backends().contains(&"unit_test_backend".to_string()));
        assert!(registered_backends().contains(&DEFAULT_BACKEND.to_string()));
    }
}
