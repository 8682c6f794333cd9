//! Deterministic in-process loopback backend
//!
//! Implements the backend capability trait over scripted device state: a
//! responder maps written commands to queued response bytes, events fire
//! on demand from the test, and register space is a plain map. Everything
//! is synchronous and deterministic, so the scenario tests never sleep.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use instrctl::attributes::{self, attr, AttrKind, AttrValue};
use instrctl::backend::{
    Backend, BackendHandler, HandlerId, RawEvent, Session, WaitResult,
};
use instrctl::constants::{
    status, AccessMode, BufferOperation, DataWidth, EventMechanism, EventType, LockKind,
};
use instrctl::error::{Error, Result};
use instrctl::rm::pattern_matches;

/// Maps one written command line to optional response bytes.
pub type Responder = dyn Fn(&str) -> Option<Vec<u8>> + Send + Sync;

/// Built-in responder covering the common IEEE-488.2 queries.
pub fn default_responder(command: &str) -> Option<Vec<u8>> {
    match command.trim() {
        "*IDN?" => Some(b"LOOPBACK,MODEL-1,0,1.0\n".to_vec()),
        "*OPC?" => Some(b"1\n".to_vec()),
        _ => None,
    }
}

/// Scripted command/response table, loadable from a JSON fixture.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ResponseScript {
    pub responses: HashMap<String, String>,
}

type SharedHandler = Arc<dyn Fn(Session, &RawEvent) + Send + Sync>;

struct DeviceSession {
    name: String,
    attrs: HashMap<u32, u64>,
    input: VecDeque<u8>,
    written: Vec<u8>,
    lock: Option<LockKind>,
    enabled: HashMap<EventType, EventMechanism>,
    queue: VecDeque<RawEvent>,
    handlers: Vec<(u64, EventType, SharedHandler)>,
    memory: HashMap<(u16, u64), u64>,
    stb: u16,
    trigger_count: u32,
}

impl DeviceSession {
    fn new(name: String) -> Self {
        let mut attrs = HashMap::new();
        for descriptor in attributes::registry() {
            if let Some(default) = descriptor.default {
                attrs.insert(descriptor.id, default);
            }
        }
        DeviceSession {
            name,
            attrs,
            input: VecDeque::new(),
            written: Vec::new(),
            lock: None,
            enabled: HashMap::new(),
            queue: VecDeque::new(),
            handlers: Vec::new(),
            memory: HashMap::new(),
            stb: 0,
            trigger_count: 0,
        }
    }
}

struct State {
    next_session: u32,
    next_handler: u64,
    resources: Vec<String>,
    rm_sessions: HashSet<u32>,
    sessions: HashMap<u32, DeviceSession>,
    responder: Arc<Responder>,
}

/// A software instrument park for the integration tests.
pub struct LoopbackBackend {
    state: Mutex<State>,
}

impl LoopbackBackend {
    pub fn new(resources: &[&str]) -> Arc<Self> {
        Arc::new(LoopbackBackend {
            state: Mutex::new(State {
                next_session: 1,
                next_handler: 1,
                resources: resources.iter().map(|r| r.to_string()).collect(),
                rm_sessions: HashSet::new(),
                sessions: HashMap::new(),
                responder: Arc::new(default_responder),
            }),
        })
    }

    /// Replace the command responder.
    pub fn set_responder(
        &self,
        responder: impl Fn(&str) -> Option<Vec<u8>> + Send + Sync + 'static,
    ) {
        self.lock_state().responder = Arc::new(responder);
    }

    /// Answer commands from a scripted table instead of a closure.
    pub fn load_script(&self, script: ResponseScript) {
        self.set_responder(move |command| {
            script
                .responses
                .get(command.trim())
                .map(|response| response.clone().into_bytes())
        });
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_device<T>(
        &self,
        session: Session,
        f: impl FnOnce(&mut DeviceSession) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.lock_state();
        let device = state
            .sessions
            .get_mut(&session.0)
            .ok_or(Error::InvalidSession)?;
        f(device)
    }

    // Test hooks

    /// Queue raw bytes as if the instrument had sent them.
    pub fn push_input(&self, session: Session, bytes: &[u8]) {
        let _ = self.with_device(session, |device| {
            device.input.extend(bytes.iter().copied());
            Ok(())
        });
    }

    /// Everything written to the device so far.
    pub fn written(&self, session: Session) -> Vec<u8> {
        self.with_device(session, |device| Ok(device.written.clone()))
            .unwrap_or_default()
    }

    pub fn set_stb(&self, session: Session, stb: u16) {
        let _ = self.with_device(session, |device| {
            device.stb = stb;
            Ok(())
        });
    }

    pub fn is_locked(&self, session: Session) -> bool {
        self.with_device(session, |device| Ok(device.lock.is_some()))
            .unwrap_or(false)
    }

    pub fn trigger_count(&self, session: Session) -> u32 {
        self.with_device(session, |device| Ok(device.trigger_count))
            .unwrap_or(0)
    }

    /// Bytes the instrument has queued but the host has not read yet.
    pub fn pending_input(&self, session: Session) -> usize {
        self.with_device(session, |device| Ok(device.input.len()))
            .unwrap_or(0)
    }

    /// Number of events currently queued for the session.
    pub fn queued_events(&self, session: Session) -> usize {
        self.with_device(session, |device| Ok(device.queue.len()))
            .unwrap_or(0)
    }

    /// Fire an event: queued for the queue mechanism, dispatched
    /// synchronously to installed handlers for the handler mechanism.
    pub fn fire_event(&self, session: Session, event_type: EventType) {
        let raw = RawEvent {
            event_type,
            context: Some(u64::from(session.0)),
            attributes: HashMap::new(),
        };
        let to_dispatch: Vec<SharedHandler> = {
            let mut state = self.lock_state();
            let Some(device) = state.sessions.get_mut(&session.0) else {
                return;
            };
            let enabled = device
                .enabled
                .get(&event_type)
                .copied()
                .unwrap_or(EventMechanism::empty());
            if enabled.contains(EventMechanism::QUEUE) {
                device.queue.push_back(raw.clone());
            }
            if enabled.contains(EventMechanism::HANDLER) {
                device
                    .handlers
                    .iter()
                    .filter(|(_, ty, _)| *ty == event_type)
                    .map(|(_, _, handler)| Arc::clone(handler))
                    .collect()
            } else {
                Vec::new()
            }
        };
        // Dispatch outside the state lock so handlers can call back in.
        for handler in to_dispatch {
            handler(session, &raw);
        }
    }
}

impl Backend for LoopbackBackend {
    fn name(&self) -> &str {
        "loopback"
    }

    fn open_default_rm(&self) -> Result<Session> {
        let mut state = self.lock_state();
        let id = state.next_session;
        state.next_session += 1;
        state.rm_sessions.insert(id);
        debug!(session = id, "loopback default-RM session");
        Ok(Session(id))
    }

    fn open(
        &self,
        rm: Session,
        resource_name: &str,
        _access_mode: AccessMode,
        _open_timeout_ms: u32,
    ) -> Result<(Session, i32)> {
        let mut state = self.lock_state();
        if !state.rm_sessions.contains(&rm.0) {
            return Err(Error::InvalidSession);
        }
        if !state
            .resources
            .iter()
            .any(|r| r.eq_ignore_ascii_case(resource_name))
        {
            return Err(Error::ResourceNotFound);
        }
        let id = state.next_session;
        state.next_session += 1;
        state
            .sessions
            .insert(id, DeviceSession::new(resource_name.to_string()));
        Ok((Session(id), status::SUCCESS))
    }

    fn close(&self, session: Session) -> Result<()> {
        let mut state = self.lock_state();
        if state.rm_sessions.remove(&session.0) {
            return Ok(());
        }
        state
            .sessions
            .remove(&session.0)
            .map(|_| ())
            .ok_or(Error::InvalidSession)
    }

    fn list_resources(&self, rm: Session, pattern: &str) -> Result<Vec<String>> {
        let state = self.lock_state();
        if !state.rm_sessions.contains(&rm.0) {
            return Err(Error::InvalidSession);
        }
        Ok(state
            .resources
            .iter()
            .filter(|name| pattern_matches(pattern, name))
            .cloned()
            .collect())
    }

    fn get_attr(&self, session: Session, id: u32) -> Result<AttrValue> {
        self.with_device(session, |device| {
            if let Some(descriptor) = attributes::descriptor(id) {
                if matches!(descriptor.kind, AttrKind::String) {
                    let value = match id {
                        attr::RSRC_NAME => device.name.clone(),
                        attr::RSRC_MANF_NAME => "Loopback Instruments".to_string(),
                        _ => String::new(),
                    };
                    return Ok(AttrValue::Str(value));
                }
            }
            if id == attr::ASRL_AVAIL_NUM {
                return Ok(AttrValue::Scalar(device.input.len() as u64));
            }
            Ok(AttrValue::Scalar(
                device.attrs.get(&id).copied().unwrap_or(0),
            ))
        })
    }

    fn set_attr(&self, session: Session, id: u32, value: AttrValue) -> Result<()> {
        self.with_device(session, |device| {
            let scalar = value.as_scalar().ok_or(Error::Io {
                status: status::ERROR_NSUP_ATTR_STATE,
                op: "set_attr",
            })?;
            if let Some(descriptor) = attributes::descriptor(id) {
                if !descriptor.writable {
                    return Err(Error::Io {
                        status: status::ERROR_ATTR_READONLY,
                        op: "set_attr",
                    });
                }
                if let Some((min, max)) = descriptor.range {
                    if scalar < min || scalar > max {
                        return Err(Error::Io {
                            status: status::ERROR_NSUP_ATTR_STATE,
                            op: "set_attr",
                        });
                    }
                }
            }
            device.attrs.insert(id, scalar);
            Ok(())
        })
    }

    fn lock(
        &self,
        session: Session,
        kind: LockKind,
        _timeout_ms: u32,
        requested_key: Option<&str>,
    ) -> Result<Option<String>> {
        self.with_device(session, |device| {
            device.lock = Some(kind);
            Ok(match kind {
                LockKind::Exclusive => None,
                LockKind::Shared => Some(
                    requested_key
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("LOOPBACK_KEY_{}", session.0)),
                ),
            })
        })
    }

    fn unlock(&self, session: Session) -> Result<()> {
        self.with_device(session, |device| {
            if device.lock.take().is_none() {
                return Err(Error::Io {
                    status: status::ERROR_SESN_NLOCKED,
                    op: "unlock",
                });
            }
            Ok(())
        })
    }

    fn read(&self, session: Session, count: usize) -> Result<(Vec<u8>, i32)> {
        self.with_device(session, |device| {
            if device.input.is_empty() {
                let timeout_ms = device.attrs.get(&attr::TMO_VALUE).copied().unwrap_or(2000);
                return Err(Error::Timeout {
                    op: "read",
                    timeout_ms: timeout_ms as u32,
                });
            }
            let termchar_enabled = device.attrs.get(&attr::TERMCHAR_EN).copied() == Some(1);
            let termchar = device.attrs.get(&attr::TERMCHAR).copied().unwrap_or(0x0A) as u8;
            let mut out = Vec::with_capacity(count);
            while out.len() < count {
                match device.input.pop_front() {
                    Some(byte) => {
                        out.push(byte);
                        if termchar_enabled && byte == termchar {
                            return Ok((out, status::SUCCESS_TERM_CHAR));
                        }
                    }
                    None => break,
                }
            }
            let code = if device.input.is_empty() {
                status::SUCCESS
            } else {
                status::SUCCESS_MAX_CNT
            };
            Ok((out, code))
        })
    }

    fn write(&self, session: Session, data: &[u8]) -> Result<(usize, i32)> {
        let responder = Arc::clone(&self.lock_state().responder);
        self.with_device(session, |device| {
            device.written.extend_from_slice(data);
            let command = String::from_utf8_lossy(data);
            let command = command.trim_end_matches(['\r', '\n']);
            if let Some(response) = responder(command) {
                device.input.extend(response);
            }
            Ok((data.len(), status::SUCCESS))
        })
    }

    fn enable_event(
        &self,
        session: Session,
        event: EventType,
        mechanism: EventMechanism,
    ) -> Result<()> {
        self.with_device(session, |device| {
            let entry = device.enabled.entry(event).or_insert(EventMechanism::empty());
            *entry |= mechanism;
            Ok(())
        })
    }

    fn disable_event(
        &self,
        session: Session,
        event: EventType,
        mechanism: EventMechanism,
    ) -> Result<()> {
        self.with_device(session, |device| {
            if let Some(entry) = device.enabled.get_mut(&event) {
                *entry &= !mechanism;
                if entry.is_empty() {
                    device.enabled.remove(&event);
                }
            }
            Ok(())
        })
    }

    fn discard_events(
        &self,
        session: Session,
        event: EventType,
        _mechanism: EventMechanism,
    ) -> Result<()> {
        self.with_device(session, |device| {
            device.queue.retain(|raw| raw.event_type != event);
            Ok(())
        })
    }

    fn wait_on_event(
        &self,
        session: Session,
        event: EventType,
        _timeout_ms: u32,
    ) -> Result<WaitResult> {
        self.with_device(session, |device| {
            let position = device.queue.iter().position(|raw| raw.event_type == event);
            match position {
                Some(index) => Ok(WaitResult {
                    event: device.queue.remove(index),
                    timed_out: false,
                }),
                // Deterministic harness: an empty queue times out at once.
                None => Ok(WaitResult {
                    event: None,
                    timed_out: true,
                }),
            }
        })
    }

    fn install_handler(
        &self,
        session: Session,
        event: EventType,
        handler: BackendHandler,
    ) -> Result<HandlerId> {
        let mut state = self.lock_state();
        let id = state.next_handler;
        state.next_handler += 1;
        let device = state
            .sessions
            .get_mut(&session.0)
            .ok_or(Error::InvalidSession)?;
        device.handlers.push((id, event, Arc::from(handler)));
        Ok(HandlerId(id))
    }

    fn uninstall_handler(&self, session: Session, event: EventType, id: HandlerId) -> Result<()> {
        self.with_device(session, |device| {
            let before = device.handlers.len();
            device
                .handlers
                .retain(|(hid, ty, _)| !(*hid == id.0 && *ty == event));
            if device.handlers.len() == before {
                return Err(Error::Io {
                    status: status::ERROR_INV_HNDLR_REF,
                    op: "uninstall_handler",
                });
            }
            Ok(())
        })
    }

    fn assert_trigger(&self, session: Session, _protocol: u16) -> Result<()> {
        self.with_device(session, |device| {
            device.trigger_count += 1;
            Ok(())
        })
    }

    fn clear(&self, session: Session) -> Result<()> {
        self.with_device(session, |device| {
            device.input.clear();
            device.written.clear();
            Ok(())
        })
    }

    fn read_stb(&self, session: Session) -> Result<u16> {
        self.with_device(session, |device| Ok(device.stb))
    }

    fn flush(&self, session: Session, mask: BufferOperation) -> Result<()> {
        self.with_device(session, |device| {
            if mask.intersects(
                BufferOperation::READ_BUF
                    | BufferOperation::READ_BUF_DISCARD
                    | BufferOperation::IO_IN_BUF
                    | BufferOperation::IO_IN_BUF_DISCARD,
            ) {
                device.input.clear();
            }
            if mask.intersects(
                BufferOperation::WRITE_BUF
                    | BufferOperation::WRITE_BUF_DISCARD
                    | BufferOperation::IO_OUT_BUF
                    | BufferOperation::IO_OUT_BUF_DISCARD,
            ) {
                device.written.clear();
            }
            Ok(())
        })
    }

    fn mem_read(&self, session: Session, space: u16, offset: u64, _width: DataWidth) -> Result<u64> {
        self.with_device(session, |device| {
            Ok(device.memory.get(&(space, offset)).copied().unwrap_or(0))
        })
    }

    fn mem_write(
        &self,
        session: Session,
        space: u16,
        offset: u64,
        width: DataWidth,
        value: u64,
    ) -> Result<()> {
        self.with_device(session, |device| {
            let mask = match width {
                DataWidth::W8 => 0xFF,
                DataWidth::W16 => 0xFFFF,
                DataWidth::W32 => 0xFFFF_FFFF,
                DataWidth::W64 => u64::MAX,
            };
            device.memory.insert((space, offset), value & mask);
            Ok(())
        })
    }

    fn move_in(
        &self,
        session: Session,
        space: u16,
        offset: u64,
        length: u64,
        width: DataWidth,
    ) -> Result<Vec<u64>> {
        self.with_device(session, |device| {
            let stride = width.bytes() as u64;
            Ok((0..length)
                .map(|index| {
                    device
                        .memory
                        .get(&(space, offset + index * stride))
                        .copied()
                        .unwrap_or(0)
                })
                .collect())
        })
    }

    fn move_out(
        &self,
        session: Session,
        space: u16,
        offset: u64,
        width: DataWidth,
        values: &[u64],
    ) -> Result<()> {
        self.with_device(session, |device| {
            let stride = width.bytes() as u64;
            for (index, &value) in values.iter().enumerate() {
                device
                    .memory
                    .insert((space, offset + index as u64 * stride), value);
            }
            Ok(())
        })
    }

    fn map_address(&self, session: Session, _space: u16, offset: u64, _size: u64) -> Result<u64> {
        self.with_device(session, |_| Ok(offset))
    }

    fn unmap_address(&self, session: Session) -> Result<()> {
        self.with_device(session, |_| Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_device(backend: &Arc<LoopbackBackend>) -> (Session, Session) {
        let rm = backend.open_default_rm().unwrap();
        let (session, _) = backend
            .open(rm, "GPIB0::7::INSTR", AccessMode::NO_LOCK, 0)
            .unwrap();
        (rm, session)
    }

    fn test_backend() -> Arc<LoopbackBackend> {
        LoopbackBackend::new(&["GPIB0::7::INSTR", "TCPIP0::1.2.3.4::999::SOCKET"])
    }

    #[test]
    fn test_discovery_filters_by_pattern() {
        let backend = test_backend();
        let rm = backend.open_default_rm().unwrap();
        let instr = backend.list_resources(rm, "?*::INSTR").unwrap();
        assert_eq!(instr, vec!["GPIB0::7::INSTR"]);
        let all = backend.list_resources(rm, "*").unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let backend = test_backend();
        let (_, session) = open_device(&backend);
        backend.write(session, b"*IDN?\r\n").unwrap();
        let (bytes, code) = backend.read(session, 64).unwrap();
        assert_eq!(bytes, b"LOOPBACK,MODEL-1,0,1.0\n");
        assert_eq!(code, status::SUCCESS);
    }

    #[test]
    fn test_read_empty_times_out() {
        let backend = test_backend();
        let (_, session) = open_device(&backend);
        let err = backend.read(session, 16).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[test]
    fn test_termchar_split() {
        let backend = test_backend();
        let (_, session) = open_device(&backend);
        backend
            .set_attr(session, attr::TERMCHAR_EN, AttrValue::from(true))
            .unwrap();
        backend.push_input(session, b"AB\nCD");
        let (bytes, code) = backend.read(session, 16).unwrap();
        assert_eq!(bytes, b"AB\n");
        assert_eq!(code, status::SUCCESS_TERM_CHAR);
        let (bytes, code) = backend.read(session, 16).unwrap();
        assert_eq!(bytes, b"CD");
        assert_eq!(code, status::SUCCESS);
    }

    #[test]
    fn test_partial_read_reports_more_data() {
        let backend = test_backend();
        let (_, session) = open_device(&backend);
        backend.push_input(session, b"0123456789");
        let (bytes, code) = backend.read(session, 4).unwrap();
        assert_eq!(bytes, b"0123");
        assert_eq!(code, status::SUCCESS_MAX_CNT);
    }

    #[test]
    fn test_close_invalidates_session() {
        let backend = test_backend();
        let (_, session) = open_device(&backend);
        backend.close(session).unwrap();
        assert!(matches!(
            backend.read(session, 1),
            Err(Error::InvalidSession)
        ));
        assert!(matches!(backend.close(session), Err(Error::InvalidSession)));
    }

    #[test]
    fn test_memory_round_trip() {
        let backend = test_backend();
        let (_, session) = open_device(&backend);
        backend
            .mem_write(session, 1, 0x10, DataWidth::W16, 0x1_2345)
            .unwrap();
        // Values are truncated to the written width.
        assert_eq!(backend.mem_read(session, 1, 0x10, DataWidth::W16).unwrap(), 0x2345);
    }
}
