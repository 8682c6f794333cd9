//! Resource manager: discovery, typed opens and orderly shutdown
//!
//! Owns the default-RM session of its backend and tracks every resource it
//! opened in a weak live-set, so closing the manager closes the children
//! first. Two managers pointing at the same shared library share the
//! loaded handle but hold distinct default-RM sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::{debug, info, warn};

use crate::attributes::AttrValue;
use crate::backend::{resolve_backend, Backend, Session, DEFAULT_LIST_PATTERN};
use crate::config::Config;
use crate::constants::{status, AccessMode, ResourceClass};
use crate::error::{Error, Result};
use crate::resource::{Resource, ResourceCore};
use crate::rname::{ResourceInfo, ResourceName};

/// Options for [`ResourceManager::open_resource`].
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub access_mode: AccessMode,
    pub open_timeout_ms: u32,
    /// Force the resource class instead of the one in the name.
    pub resource_class_override: Option<ResourceClass>,
    /// Attribute overrides applied between open and registration; a
    /// failure rolls the open back.
    pub attributes: Vec<(u32, AttrValue)>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            access_mode: AccessMode::NO_LOCK,
            open_timeout_ms: 0,
            resource_class_override: None,
            attributes: Vec::new(),
        }
    }
}

struct RmInner {
    backend: Arc<dyn Backend>,
    session: Mutex<Option<Session>>,
    live: Mutex<Vec<(ResourceClass, Weak<ResourceCore>)>>,
    last_status: AtomicI32,
}

impl RmInner {
    fn session(&self) -> Result<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ok_or(Error::InvalidSession)
    }

    fn close(&self) -> Result<()> {
        let taken = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(session) = taken else {
            return Ok(());
        };

        // Children close before the parent session.
        let live: Vec<_> = {
            let mut tracked = self.live.lock().unwrap_or_else(PoisonError::into_inner);
            tracked.drain(..).collect()
        };
        for (_, weak) in live {
            if let Some(core) = weak.upgrade() {
                if let Err(err) = core.close() {
                    warn!(resource = core.resource_name(), %err, "closing tracked resource failed");
                }
            }
        }
        debug!(session = session.0, "closing default-RM session");
        self.backend.close(session)
    }
}

impl Drop for RmInner {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Entry point of the frontend: discovery plus typed resource opening.
pub struct ResourceManager {
    inner: Arc<RmInner>,
}

impl ResourceManager {
    /// Build a manager for the backend selected by the configuration (the
    /// `@<name>` suffix of `library_path`, then `backend`, then the
    /// default foreign binding).
    pub fn new(config: &Config) -> Result<Self> {
        config.apply();
        let backend = resolve_backend(config)?;
        Self::with_backend(backend)
    }

    /// Build a manager over an explicit backend instance.
    pub fn with_backend(backend: Arc<dyn Backend>) -> Result<Self> {
        let session = backend.open_default_rm()?;
        info!(backend = backend.name(), session = session.0, "default-RM session opened");
        Ok(ResourceManager {
            inner: Arc::new(RmInner {
                backend,
                session: Mutex::new(Some(session)),
                live: Mutex::new(Vec::new()),
                last_status: AtomicI32::new(status::SUCCESS),
            }),
        })
    }

    /// Name of the backend behind this manager.
    pub fn backend_name(&self) -> String {
        self.inner.backend.name().to_string()
    }

    /// The default-RM session handle.
    pub fn session(&self) -> Result<Session> {
        self.inner.session()
    }

    /// Status observed on the most recent open.
    pub fn last_status(&self) -> i32 {
        self.inner.last_status.load(Ordering::Relaxed)
    }

    /// Canonicalized names of resources matching `pattern`
    /// (default `?*::INSTR`).
    pub fn list_resources(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let session = self.inner.session()?;
        let pattern = pattern.unwrap_or(DEFAULT_LIST_PATTERN);
        let raw = self.inner.backend.list_resources(session, pattern)?;
        let mut names = Vec::with_capacity(raw.len());
        for name in raw {
            match ResourceName::parse(&name) {
                Ok(parsed) => names.push(parsed.canonical_string()),
                Err(err) => {
                    warn!(%name, %err, "discovery returned an unparseable name; keeping it verbatim");
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    /// Parsed records (plus aliases) for resources matching `pattern`.
    pub fn list_resources_info(&self, pattern: Option<&str>) -> Result<HashMap<String, ResourceInfo>> {
        let session = self.inner.session()?;
        let pattern = pattern.unwrap_or(DEFAULT_LIST_PATTERN);
        let raw = self.inner.backend.list_resources(session, pattern)?;
        let mut infos = HashMap::with_capacity(raw.len());
        for name in raw {
            let parsed = ResourceName::parse(&name)?;
            infos.insert(parsed.canonical_string(), parsed.info());
        }
        Ok(infos)
    }

    /// Open `name` and return the matching typed resource.
    pub fn open_resource(&self, name: &str, options: OpenOptions) -> Result<Resource> {
        let parsed = ResourceName::parse(name)?;
        let class = options
            .resource_class_override
            .unwrap_or_else(|| parsed.resource_class());
        let canonical = parsed.canonical_string();

        let rm_session = self.inner.session()?;
        let (session, open_status) = self.inner.backend.open(
            rm_session,
            &canonical,
            options.access_mode,
            options.open_timeout_ms,
        )?;
        self.inner.last_status.store(open_status, Ordering::Relaxed);

        let core = ResourceCore::new(Arc::clone(&self.inner.backend), parsed, session);
        core.record_status(open_status);

        // Attribute overrides apply before anyone can observe the session;
        // a failure closes it again.
        for (id, value) in &options.attributes {
            if let Err(err) = core.set_attr(*id, value.clone()) {
                let _ = core.close();
                return Err(err);
            }
        }

        {
            let mut live = self.inner.live.lock().unwrap_or_else(PoisonError::into_inner);
            live.retain(|(_, weak)| weak.strong_count() > 0);
            live.push((class, Arc::downgrade(&core)));
        }
        debug!(resource = %canonical, session = session.0, "resource opened");
        Ok(Resource::dispatch(core, class))
    }

    /// Snapshot of the currently-open resources this manager created.
    pub fn list_opened_resources(&self) -> Vec<Resource> {
        let live = self.inner.live.lock().unwrap_or_else(PoisonError::into_inner);
        live.iter()
            .filter_map(|(class, weak)| {
                let core = weak.upgrade()?;
                core.is_open().then(|| Resource::dispatch(core, *class))
            })
            .collect()
    }

    /// Close every tracked resource, then the default-RM session.
    /// Idempotent.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("backend", &self.inner.backend.name())
            .finish()
    }
}

/// Match a discovery pattern against a resource name, case-insensitively.
/// `?` matches one character, `*` any run including the empty one.
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    fn matches(pattern: &[u8], name: &[u8]) -> bool {
        match (pattern.first(), name.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                matches(&pattern[1..], name)
                    || (!name.is_empty() && matches(pattern, &name[1..]))
            }
            (Some(b'?'), Some(_)) => matches(&pattern[1..], &name[1..]),
            (Some(&p), Some(&n)) => {
                p.eq_ignore_ascii_case(&n) && matches(&pattern[1..], &name[1..])
            }
            _ => false,
        }
    }
    matches(pattern.as_bytes(), name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matches() {
        assert!(pattern_matches("?*::INSTR", "GPIB0::2::INSTR"));
        assert!(pattern_matches("GPIB?::*", "gpib0::12::instr"));
        assert!(pattern_matches("*", "anything"));
        assert!(pattern_matches("*::SOCKET", "TCPIP0::h::999::SOCKET"));
        assert!(!pattern_matches("?*::INSTR", "GPIB0::INTFC"));
        assert!(!pattern_matches("GPIB?::*", "USB0::1::2::S::INSTR"));
        assert!(!pattern_matches("?", ""));
        assert!(pattern_matches("", ""));
    }

    #[test]
    fn test_open_options_defaults() {
        let options = OpenOptions::default();
        assert_eq!(options.access_mode, AccessMode::NO_LOCK);
        assert_eq!(options.open_timeout_ms, 0);
        assert!(options.resource_class_override.is_none());
        assert!(options.attributes.is_empty());
    }
}
