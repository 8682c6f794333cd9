//! Resource hierarchy: the shared core, capability traits and dispatch
//!
//! One [`ResourceCore`] backs every open resource. Capabilities are
//! expressed as traits with default methods over the core (message-based
//! I/O, register access, bus extras) instead of a class hierarchy; the
//! concrete per-bus types implement exactly the capabilities their kind
//! supports. Dispatch from a parsed name to a concrete type happens in
//! [`Resource::dispatch`].

pub mod gpib;
pub mod messagebased;
pub mod registers;
pub mod serial;
pub mod tcpip;
pub mod usb;

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::attributes::{attr, AttrValue};
use crate::backend::{Backend, HandlerId, Session};
use crate::constants::{
    status, EventMechanism, EventType, InterfaceType, IoProtocol, LockKind, ResourceClass, Timeout,
};
use crate::error::{Error, Result};
use crate::event::{make_dispatcher, EventHandler, EventRegistry, HandlerEntry, VisaEvent, WaitResponse};
use crate::rname::{ResourceInfo, ResourceName};

pub use gpib::{GpibInstrument, GpibInterface};
pub use messagebased::{
    BinaryReadOptions, BinaryWriteOptions, Encoding, Messaging, ReadMonitor, DEFAULT_CHUNK_SIZE,
};
pub use registers::{BackplaneResource, MappedWindow, RegisterBased, RegisterResource};
pub use serial::SerialInstrument;
pub use tcpip::{TcpipInstrument, TcpipSocket, VicpInstrument};
pub use usb::{UsbInstrument, UsbRaw};

/// Communication settings kept client-side per resource.
#[derive(Debug, Clone)]
pub(crate) struct CommSettings {
    pub read_termination: Option<String>,
    pub write_termination: String,
    pub chunk_size: usize,
    pub query_delay: Duration,
    pub encoding: Encoding,
    /// Retry the read leg of a query once after a timeout.
    pub query_retry: bool,
}

impl Default for CommSettings {
    fn default() -> Self {
        CommSettings {
            read_termination: None,
            write_termination: "\r\n".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            query_delay: Duration::ZERO,
            encoding: Encoding::Ascii,
            query_retry: false,
        }
    }
}

/// Shared state behind every resource type.
///
/// All backend calls for one resource funnel through [`with_session`],
/// which serializes them and fails with `InvalidSession` once the resource
/// is closed.
///
/// [`with_session`]: ResourceCore::with_session
pub struct ResourceCore {
    backend: Arc<dyn Backend>,
    name: ResourceName,
    canonical: String,
    session: Mutex<Option<Session>>,
    io: Mutex<()>,
    last_status: AtomicI32,
    /// Last timeout written through `set_timeout`, used to stamp deadline
    /// errors with the value that actually applied.
    timeout_hint_ms: AtomicU32,
    ignored_statuses: Mutex<Vec<i32>>,
    pub(crate) comm: Mutex<CommSettings>,
    pub(crate) events: EventRegistry,
}

impl ResourceCore {
    pub(crate) fn new(backend: Arc<dyn Backend>, name: ResourceName, session: Session) -> Arc<Self> {
        let canonical = name.canonical_string();
        Arc::new(ResourceCore {
            backend,
            name,
            canonical,
            session: Mutex::new(Some(session)),
            io: Mutex::new(()),
            last_status: AtomicI32::new(status::SUCCESS),
            timeout_hint_ms: AtomicU32::new(2000),
            ignored_statuses: Mutex::new(Vec::new()),
            comm: Mutex::new(CommSettings::default()),
            events: EventRegistry::default(),
        })
    }

    /// Canonical resource name.
    pub fn resource_name(&self) -> &str {
        &self.canonical
    }

    /// Parsed name record.
    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    pub fn interface_type(&self) -> InterfaceType {
        self.name.interface_type()
    }

    pub fn resource_class(&self) -> ResourceClass {
        self.name.resource_class()
    }

    pub fn is_open(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The live session handle, or `InvalidSession` after close.
    pub fn session(&self) -> Result<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ok_or(Error::InvalidSession)
    }

    /// Run one backend call against the live session. Serialized per
    /// resource; deadline errors get stamped with the applied timeout.
    pub(crate) fn with_session<T>(
        &self,
        f: impl FnOnce(&dyn Backend, Session) -> Result<T>,
    ) -> Result<T> {
        let _serialized = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        let session = self.session()?;
        f(self.backend.as_ref(), session).map_err(|err| self.stamp_timeout(err))
    }

    fn stamp_timeout(&self, err: Error) -> Error {
        match err {
            Error::Timeout { op, timeout_ms: 0 } => Error::Timeout {
                op,
                timeout_ms: self.timeout_hint_ms.load(Ordering::Relaxed),
            },
            other => other,
        }
    }

    /// Record a completion status; warnings are logged unless suppressed
    /// by a scoped [`WarningGuard`].
    pub(crate) fn record_status(&self, code: i32) {
        self.last_status.store(code, Ordering::Relaxed);
        if status::is_warning(code) {
            let suppressed = self
                .ignored_statuses
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&code);
            if !suppressed {
                warn!(
                    resource = self.canonical.as_str(),
                    status = code,
                    "operation completed with a warning status"
                );
            }
        }
    }

    /// Status observed on the most recent backend call.
    pub fn last_status(&self) -> i32 {
        self.last_status.load(Ordering::Relaxed)
    }

    pub fn get_attr(&self, id: u32) -> Result<AttrValue> {
        self.with_session(|backend, session| backend.get_attr(session, id))
    }

    pub fn set_attr(&self, id: u32, value: AttrValue) -> Result<()> {
        self.with_session(|backend, session| backend.set_attr(session, id, value.clone()))?;
        if id == attr::TMO_VALUE {
            if let Some(ms) = value.as_scalar() {
                self.timeout_hint_ms.store(ms as u32, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    pub fn lock(&self, kind: LockKind, timeout_ms: u32, key: Option<&str>) -> Result<Option<String>> {
        self.with_session(|backend, session| backend.lock(session, kind, timeout_ms, key))
    }

    pub fn unlock(&self) -> Result<()> {
        self.with_session(|backend, session| backend.unlock(session))
    }

    /// Close the session. Idempotent: the second call is a no-op. Every
    /// event enablement and handler registration dies with the session.
    pub fn close(&self) -> Result<()> {
        let _serialized = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        let taken = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(session) = taken else {
            return Ok(());
        };
        for (event_type, id) in self.events.installed_snapshot() {
            if let Err(err) = self.backend.uninstall_handler(session, event_type, id) {
                debug!(resource = self.canonical.as_str(), %err, "handler teardown on close failed");
            }
        }
        self.events.reset();
        debug!(resource = self.canonical.as_str(), session = session.0, "closing resource");
        self.backend.close(session)
    }
}

impl Drop for ResourceCore {
    fn drop(&mut self) {
        // Scope-exit guarantee: a resource that goes out of scope releases
        // its session even when close() was never called.
        if self.is_open() {
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for ResourceCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCore")
            .field("name", &self.canonical)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Scoped cooperative lock; released on every exit path.
pub struct LockGuard {
    core: Arc<ResourceCore>,
    key: Option<String>,
}

impl LockGuard {
    /// Access key granted for shared locks.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = self.core.unlock() {
            warn!(resource = self.core.resource_name(), %err, "unlock on scope exit failed");
        }
    }
}

/// Scoped warning suppression for the listed statuses.
pub struct WarningGuard {
    core: Arc<ResourceCore>,
    statuses: Vec<i32>,
}

impl Drop for WarningGuard {
    fn drop(&mut self) {
        let mut ignored = self
            .core
            .ignored_statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for code in &self.statuses {
            if let Some(index) = ignored.iter().position(|c| c == code) {
                ignored.remove(index);
            }
        }
    }
}

/// Base operations shared by every resource kind.
pub trait ResourceOps {
    fn core(&self) -> &Arc<ResourceCore>;

    fn session(&self) -> Result<Session> {
        self.core().session()
    }

    fn resource_name(&self) -> String {
        self.core().resource_name().to_string()
    }

    fn resource_info(&self) -> ResourceInfo {
        self.core().name().info()
    }

    fn interface_type(&self) -> InterfaceType {
        self.core().interface_type()
    }

    /// Status observed on the most recent backend call.
    fn last_status(&self) -> i32 {
        self.core().last_status()
    }

    /// Alias for [`last_status`](ResourceOps::last_status); the raw VISA
    /// status space.
    fn visa_status(&self) -> i32 {
        self.core().last_status()
    }

    fn get_visa_attribute(&self, id: u32) -> Result<AttrValue> {
        self.core().get_attr(id)
    }

    fn set_visa_attribute(&self, id: u32, value: AttrValue) -> Result<()> {
        self.core().set_attr(id, value)
    }

    /// Operation timeout; `0` reads back as `Immediate`, the reserved
    /// sentinel as `Infinite`.
    fn timeout(&self) -> Result<Timeout> {
        let raw = self
            .core()
            .get_attr(attr::TMO_VALUE)?
            .as_scalar()
            .unwrap_or(0);
        Ok(Timeout::from_raw(raw as u32))
    }

    fn set_timeout(&self, timeout: Timeout) -> Result<()> {
        self.core()
            .set_attr(attr::TMO_VALUE, AttrValue::Scalar(u64::from(timeout.as_raw())))
    }

    fn io_protocol(&self) -> Result<IoProtocol> {
        let raw = self.core().get_attr(attr::IO_PROT)?.as_scalar().unwrap_or(1);
        IoProtocol::from_raw(raw).ok_or(Error::Io {
            status: status::ERROR_NSUP_ATTR_STATE,
            op: "io_protocol",
        })
    }

    fn set_io_protocol(&self, protocol: IoProtocol) -> Result<()> {
        self.core()
            .set_attr(attr::IO_PROT, AttrValue::Scalar(protocol as u64))
    }

    fn spec_version(&self) -> Result<u64> {
        Ok(self
            .core()
            .get_attr(attr::RSRC_SPEC_VERSION)?
            .as_scalar()
            .unwrap_or(0))
    }

    fn implementation_version(&self) -> Result<u64> {
        Ok(self
            .core()
            .get_attr(attr::RSRC_IMPL_VERSION)?
            .as_scalar()
            .unwrap_or(0))
    }

    fn resource_manufacturer_name(&self) -> Result<String> {
        let value = self.core().get_attr(attr::RSRC_MANF_NAME)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn lock(&self, kind: LockKind, timeout_ms: u32, key: Option<&str>) -> Result<Option<String>> {
        self.core().lock(kind, timeout_ms, key)
    }

    fn unlock(&self) -> Result<()> {
        self.core().unlock()
    }

    /// Acquire a cooperative lock released on all exit paths, panics and
    /// early returns included.
    fn lock_context(
        &self,
        kind: LockKind,
        timeout_ms: u32,
        key: Option<&str>,
    ) -> Result<LockGuard> {
        let granted = self.core().lock(kind, timeout_ms, key)?;
        Ok(LockGuard {
            core: Arc::clone(self.core()),
            key: granted,
        })
    }

    /// Suppress warning logs for the listed statuses while the guard
    /// lives.
    fn ignore_warning(&self, statuses: &[i32]) -> WarningGuard {
        let core = Arc::clone(self.core());
        core.ignored_statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(statuses);
        WarningGuard {
            core,
            statuses: statuses.to_vec(),
        }
    }

    /// Idempotent: close twice and the second call is a no-op.
    fn close(&self) -> Result<()> {
        self.core().close()
    }

    // Events

    /// Arm delivery of `event_type` through `mechanism`. Enabling an
    /// already-enabled pair is a no-op.
    fn enable_event(&self, event_type: EventType, mechanism: EventMechanism) -> Result<()> {
        let core = self.core();
        if core.events.is_enabled(event_type, mechanism) {
            return Ok(());
        }
        core.with_session(|backend, session| backend.enable_event(session, event_type, mechanism))?;
        core.events.note_enabled(event_type, mechanism);
        Ok(())
    }

    fn disable_event(&self, event_type: EventType, mechanism: EventMechanism) -> Result<()> {
        let core = self.core();
        core.with_session(|backend, session| backend.disable_event(session, event_type, mechanism))?;
        core.events.note_disabled(event_type, mechanism);
        Ok(())
    }

    /// Empty the queue (or pending handler deliveries) without touching
    /// the enablement state.
    fn discard_events(&self, event_type: EventType, mechanism: EventMechanism) -> Result<()> {
        self.core()
            .with_session(|backend, session| backend.discard_events(session, event_type, mechanism))
    }

    /// Wait for a queued event. A timeout is reported in the response, not
    /// raised: the event is synthesized with `timed_out = true`.
    fn wait_on_event(&self, event_type: EventType, timeout_ms: u32) -> Result<WaitResponse> {
        let result = self
            .core()
            .with_session(|backend, session| backend.wait_on_event(session, event_type, timeout_ms))?;
        if result.timed_out {
            return Ok(WaitResponse {
                event: VisaEvent::synthesized_timeout(event_type),
                timed_out: true,
            });
        }
        let event = match result.event {
            Some(raw) => VisaEvent::from_raw(raw),
            None => VisaEvent::synthesized_timeout(event_type),
        };
        Ok(WaitResponse {
            event,
            timed_out: false,
        })
    }

    /// Install `callback` for `event_type`. The callback is wrapped so its
    /// signature is `(resource, event, user_handle)`; the returned opaque
    /// handle is what uninstalls it. Installing the same callable twice
    /// produces two distinct handles.
    fn install_handler(
        &self,
        event_type: EventType,
        callback: EventHandler,
        user_handle: Option<u64>,
    ) -> Result<HandlerId> {
        let core = self.core();
        let dispatcher = make_dispatcher(Arc::downgrade(core), callback.clone(), user_handle);
        let backend_id = core
            .with_session(|backend, session| backend.install_handler(session, event_type, dispatcher))?;
        core.events.push_handler(
            event_type,
            HandlerEntry {
                callback,
                backend_id,
                user_handle,
            },
        );
        Ok(backend_id)
    }

    /// Uninstall by the opaque handle produced at install time.
    fn uninstall_handler(&self, event_type: EventType, handle: HandlerId) -> Result<()> {
        let core = self.core();
        let entry = core
            .events
            .remove_handler(event_type, handle)
            .ok_or(Error::Io {
                status: status::ERROR_INV_HNDLR_REF,
                op: "uninstall_handler",
            })?;
        let result = core.with_session(|backend, session| {
            backend.uninstall_handler(session, event_type, entry.backend_id)
        });
        if result.is_err() {
            core.events.push_handler(event_type, entry);
        }
        result
    }
}

macro_rules! define_resource {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name {
            core: std::sync::Arc<$crate::resource::ResourceCore>,
        }

        impl $name {
            pub(crate) fn from_core(core: std::sync::Arc<$crate::resource::ResourceCore>) -> Self {
                Self { core }
            }
        }

        impl $crate::resource::ResourceOps for $name {
            fn core(&self) -> &std::sync::Arc<$crate::resource::ResourceCore> {
                &self.core
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("resource", &self.core.resource_name())
                    .finish()
            }
        }
    };
}
pub(crate) use define_resource;

define_resource! {
    /// Fallback for (interface, class) pairs without a dedicated type.
    /// Base operations only.
    GenericResource
}

/// An open resource, narrowed to the type matching its interface family
/// and resource class.
#[derive(Debug)]
pub enum Resource {
    Gpib(GpibInstrument),
    GpibInterface(GpibInterface),
    Serial(SerialInstrument),
    Usb(UsbInstrument),
    UsbRaw(UsbRaw),
    Tcpip(TcpipInstrument),
    Socket(TcpipSocket),
    Vicp(VicpInstrument),
    Vxi(VxiInstrument),
    Pxi(PxiInstrument),
    Register(RegisterResource),
    Backplane(BackplaneResource),
    Generic(GenericResource),
}

define_resource! {
    /// VXI instrument: message-based with register access.
    VxiInstrument
}
impl Messaging for VxiInstrument {}
impl RegisterBased for VxiInstrument {}

define_resource! {
    /// PXI instrument: message-based with register access.
    PxiInstrument
}
impl Messaging for PxiInstrument {}
impl RegisterBased for PxiInstrument {}

impl Resource {
    /// Pick the concrete type for an opened core. Unknown pairs fall back
    /// to the closest base with a warning.
    pub(crate) fn dispatch(core: Arc<ResourceCore>, class: ResourceClass) -> Resource {
        use InterfaceType::*;
        match (core.interface_type(), class) {
            (Gpib, ResourceClass::Instr) => Resource::Gpib(GpibInstrument::from_core(core)),
            (Gpib, ResourceClass::Intfc) => {
                Resource::GpibInterface(GpibInterface::from_core(core))
            }
            (Asrl, ResourceClass::Instr) => Resource::Serial(SerialInstrument::from_core(core)),
            (Usb, ResourceClass::Instr) => Resource::Usb(UsbInstrument::from_core(core)),
            (Usb, ResourceClass::Raw) => Resource::UsbRaw(UsbRaw::from_core(core)),
            (Tcpip, ResourceClass::Instr) => Resource::Tcpip(TcpipInstrument::from_core(core)),
            (Tcpip, ResourceClass::Socket) => Resource::Socket(TcpipSocket::from_core(core)),
            (Vicp, ResourceClass::Instr) => Resource::Vicp(VicpInstrument::from_core(core)),
            (Vxi, ResourceClass::Instr) => Resource::Vxi(VxiInstrument::from_core(core)),
            (Pxi, ResourceClass::Instr) => Resource::Pxi(PxiInstrument::from_core(core)),
            (Pxi | Vxi, ResourceClass::Memacc) => {
                Resource::Register(RegisterResource::from_core(core))
            }
            (Pxi | Vxi, ResourceClass::Backplane) => {
                Resource::Backplane(BackplaneResource::from_core(core))
            }
            (Vxi, ResourceClass::Servant) => Resource::Generic(GenericResource::from_core(core)),
            (interface, class) => {
                warn!(
                    resource = core.resource_name(),
                    ?interface,
                    ?class,
                    "no dedicated resource type; falling back to the generic base"
                );
                Resource::Generic(GenericResource::from_core(core))
            }
        }
    }

    /// Base operations of any variant.
    pub fn ops(&self) -> &dyn ResourceOps {
        match self {
            Resource::Gpib(r) => r,
            Resource::GpibInterface(r) => r,
            Resource::Serial(r) => r,
            Resource::Usb(r) => r,
            Resource::UsbRaw(r) => r,
            Resource::Tcpip(r) => r,
            Resource::Socket(r) => r,
            Resource::Vicp(r) => r,
            Resource::Vxi(r) => r,
            Resource::Pxi(r) => r,
            Resource::Register(r) => r,
            Resource::Backplane(r) => r,
            Resource::Generic(r) => r,
        }
    }

    /// Message-based view, when this kind supports it.
    pub fn messaging(&self) -> Option<&dyn Messaging> {
        match self {
            Resource::Gpib(r) => Some(r),
            Resource::Serial(r) => Some(r),
            Resource::Usb(r) => Some(r),
            Resource::UsbRaw(r) => Some(r),
            Resource::Tcpip(r) => Some(r),
            Resource::Socket(r) => Some(r),
            Resource::Vicp(r) => Some(r),
            Resource::Vxi(r) => Some(r),
            Resource::Pxi(r) => Some(r),
            _ => None,
        }
    }

    /// Register-based view, when this kind supports it.
    pub fn registers(&self) -> Option<&dyn RegisterBased> {
        match self {
            Resource::Vxi(r) => Some(r),
            Resource::Pxi(r) => Some(r),
            Resource::Register(r) => Some(r),
            Resource::Backplane(r) => Some(r),
            _ => None,
        }
    }

    pub fn resource_name(&self) -> String {
        self.ops().resource_name()
    }
}
