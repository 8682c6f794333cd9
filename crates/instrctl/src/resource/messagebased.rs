//! Message-based I/O: chunked transfers, termination handling, value
//! streams
//!
//! Everything here funnels through the backend `read`/`write` pair. Reads
//! are chunked; a status other than "maximum count reached" means the
//! device ended the message (END indicator, termination character or a
//! legitimate short read) and is surfaced through `last_status`.

use std::sync::{Arc, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{trace, warn};

use crate::attributes::{attr, AttrValue};
use crate::codec::{self, BinaryValue, ByteOrder, HeaderFormat, DEFAULT_HEADER_SCAN_WINDOW};
use crate::constants::{status, BufferOperation};
use crate::error::{Error, Result};
use crate::resource::{CommSettings, ResourceCore, ResourceOps};

/// Default transfer chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 20_480;

/// Text encoding applied to reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Strict 7-bit ASCII (the default).
    #[default]
    Ascii,
    Utf8,
    Latin1,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Ascii => "ascii",
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "latin-1",
        }
    }

    /// Decode received bytes. Bytes already consumed from the session are
    /// not recoverable when this fails.
    pub fn decode(self, bytes: &[u8]) -> Result<String> {
        match self {
            Encoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                None => Ok(String::from_utf8_lossy(bytes).into_owned()),
                Some(offset) => Err(Error::Encoding {
                    encoding: self.name().to_string(),
                    offset,
                }),
            },
            Encoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| Error::Encoding {
                encoding: self.name().to_string(),
                offset: e.utf8_error().valid_up_to(),
            }),
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }

    pub fn encode(self, text: &str) -> Result<Vec<u8>> {
        match self {
            Encoding::Ascii => match text.bytes().position(|b| !b.is_ascii()) {
                None => Ok(text.as_bytes().to_vec()),
                Some(offset) => Err(Error::Encoding {
                    encoding: self.name().to_string(),
                    offset,
                }),
            },
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Latin1 => text
                .chars()
                .enumerate()
                .map(|(offset, c)| {
                    u8::try_from(u32::from(c)).map_err(|_| Error::Encoding {
                        encoding: self.name().to_string(),
                        offset,
                    })
                })
                .collect(),
        }
    }
}

/// Observer notified after every backend read with the byte delta.
pub trait ReadMonitor {
    fn update(&mut self, delta: usize);
}

/// Options for binary-block reads.
#[derive(Debug, Clone)]
pub struct BinaryReadOptions {
    pub header: HeaderFormat,
    pub byte_order: ByteOrder,
    /// Expect (and verify) a trailing termination byte after the payload.
    pub expect_termination: bool,
    /// Element count, required to bound empty-header and indefinite
    /// blocks when the stream carries no termination.
    pub data_points: Option<usize>,
    /// Per-call chunk size override.
    pub chunk_size: Option<usize>,
    /// Bytes scanned for the `#` sentinel before giving up.
    pub scan_window: usize,
}

impl Default for BinaryReadOptions {
    fn default() -> Self {
        BinaryReadOptions {
            header: HeaderFormat::Ieee,
            byte_order: ByteOrder::Little,
            expect_termination: true,
            data_points: None,
            chunk_size: None,
            scan_window: DEFAULT_HEADER_SCAN_WINDOW,
        }
    }
}

/// Options for binary-block writes.
#[derive(Debug, Clone, Default)]
pub struct BinaryWriteOptions {
    pub header: HeaderFormat,
    pub byte_order: ByteOrder,
}

/// Capabilities of message-based resources.
///
/// Generic value-transfer methods are `Self: Sized`; through a trait
/// object the byte- and string-level operations remain available.
pub trait Messaging: ResourceOps {
    // Client-side communication settings

    fn read_termination(&self) -> Option<String> {
        comm(self.core()).read_termination
    }

    /// Set the read termination and mirror it into the termination-
    /// character attributes so backend reads stop on it.
    fn set_read_termination(&self, termination: Option<&str>) -> Result<()> {
        let core = self.core();
        match termination.filter(|t| !t.is_empty()) {
            Some(term) => {
                let last = *term.as_bytes().last().expect("non-empty termination");
                core.set_attr(attr::TERMCHAR, AttrValue::from(u64::from(last)))?;
                core.set_attr(attr::TERMCHAR_EN, AttrValue::from(true))?;
                core.comm
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .read_termination = Some(term.to_string());
            }
            None => {
                core.set_attr(attr::TERMCHAR_EN, AttrValue::from(false))?;
                core.comm
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .read_termination = None;
            }
        }
        Ok(())
    }

    fn write_termination(&self) -> String {
        comm(self.core()).write_termination
    }

    fn set_write_termination(&self, termination: &str) {
        self.core()
            .comm
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_termination = termination.to_string();
    }

    fn chunk_size(&self) -> usize {
        comm(self.core()).chunk_size
    }

    fn set_chunk_size(&self, chunk_size: usize) {
        self.core()
            .comm
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .chunk_size = chunk_size.max(1);
    }

    fn query_delay(&self) -> Duration {
        comm(self.core()).query_delay
    }

    fn set_query_delay(&self, delay: Duration) {
        self.core()
            .comm
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .query_delay = delay;
    }

    fn encoding(&self) -> Encoding {
        comm(self.core()).encoding
    }

    fn set_encoding(&self, encoding: Encoding) {
        self.core()
            .comm
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .encoding = encoding;
    }

    /// Retry the read leg of a query once after a timeout.
    fn query_retry(&self) -> bool {
        comm(self.core()).query_retry
    }

    fn set_query_retry(&self, retry: bool) {
        self.core()
            .comm
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .query_retry = retry;
    }

    /// Whether the END indicator is asserted on the last write byte.
    fn send_end(&self) -> Result<bool> {
        Ok(self.core().get_attr(attr::SEND_END_EN)?.as_scalar() == Some(1))
    }

    fn set_send_end(&self, send_end: bool) -> Result<()> {
        self.core().set_attr(attr::SEND_END_EN, AttrValue::from(send_end))
    }

    // Byte-level I/O

    /// Read exactly `count` bytes unless the device legitimately ends the
    /// message early; a short read is visible in `last_status`.
    fn read_bytes(&self, count: usize) -> Result<Vec<u8>> {
        read_bytes_impl(self.core(), count, false, None, None)
    }

    /// `read_bytes` with termination-character break and a progress
    /// monitor. With `break_on_termchar` the read stops at the first
    /// termination character, which is included in the returned bytes.
    fn read_bytes_with(
        &self,
        count: usize,
        break_on_termchar: bool,
        chunk_size: Option<usize>,
        monitor: Option<&mut dyn ReadMonitor>,
    ) -> Result<Vec<u8>> {
        read_bytes_impl(self.core(), count, break_on_termchar, chunk_size, monitor)
    }

    /// Read one message worth of raw bytes, termination included.
    fn read_raw(&self) -> Result<Vec<u8>> {
        let settings = comm(self.core());
        read_message(
            self.core(),
            settings.read_termination.as_deref(),
            settings.chunk_size,
        )
    }

    /// Read a string, stripping the termination sequence.
    fn read(&self) -> Result<String> {
        let settings = comm(self.core());
        let mut bytes = read_message(
            self.core(),
            settings.read_termination.as_deref(),
            settings.chunk_size,
        )?;
        if let Some(term) = settings
            .read_termination
            .as_deref()
            .filter(|t| !t.is_empty())
        {
            if bytes.ends_with(term.as_bytes()) {
                bytes.truncate(bytes.len() - term.len());
            }
        }
        settings.encoding.decode(&bytes)
    }

    /// Write a message, appending the write termination exactly once.
    /// Fails when the message already ends with a non-empty termination.
    fn write(&self, message: &str) -> Result<usize> {
        let settings = comm(self.core());
        let term = &settings.write_termination;
        if !term.is_empty() && message.ends_with(term.as_str()) {
            return Err(Error::Protocol {
                reason: "message already ends with the write termination".to_string(),
            });
        }
        let mut payload = settings.encoding.encode(message)?;
        payload.extend_from_slice(term.as_bytes());
        write_raw_impl(self.core(), &payload)
    }

    /// Write raw bytes as given; no termination handling.
    fn write_raw(&self, data: &[u8]) -> Result<usize> {
        write_raw_impl(self.core(), data)
    }

    /// Write `command`, optionally sleep the query delay, then read the
    /// response. Errors from either leg propagate; with
    /// [`query_retry`](Messaging::query_retry) set, a timed-out read is
    /// retried once.
    fn query(&self, command: &str) -> Result<String> {
        let settings = comm(self.core());
        self.write(command)?;
        if settings.query_delay > Duration::ZERO {
            thread::sleep(settings.query_delay);
        }
        match self.read() {
            Err(Error::Timeout { .. }) if settings.query_retry => {
                warn!(
                    resource = self.core().resource_name(),
                    command, "query response timed out; retrying the read once"
                );
                self.read()
            }
            other => other,
        }
    }

    // Control operations

    fn clear(&self) -> Result<()> {
        self.core().with_session(|backend, session| backend.clear(session))
    }

    fn flush(&self, mask: BufferOperation) -> Result<()> {
        self.core()
            .with_session(|backend, session| backend.flush(session, mask))
    }

    fn read_stb(&self) -> Result<u16> {
        self.core()
            .with_session(|backend, session| backend.read_stb(session))
    }

    /// Status byte, read through the same path as [`read_stb`]
    /// (convenience wrapper).
    ///
    /// [`read_stb`]: Messaging::read_stb
    fn stb(&self) -> Result<u16> {
        self.read_stb()
    }

    // Value transfers

    fn read_ascii_values<T, C>(&self) -> Result<C>
    where
        T: std::str::FromStr,
        C: FromIterator<T>,
        Self: Sized,
    {
        let response = self.read()?;
        codec::parse_ascii_values(&response, codec::DEFAULT_ASCII_SEPARATOR)
    }

    fn read_ascii_values_with<T, C, F>(&self, separator: &str, convert: F) -> Result<C>
    where
        C: FromIterator<T>,
        F: Fn(&str) -> Result<T>,
        Self: Sized,
    {
        let response = self.read()?;
        codec::parse_ascii_values_with(&response, separator, convert)
    }

    fn query_ascii_values<T, C>(&self, command: &str) -> Result<C>
    where
        T: std::str::FromStr,
        C: FromIterator<T>,
        Self: Sized,
    {
        let response = self.query(command)?;
        codec::parse_ascii_values(&response, codec::DEFAULT_ASCII_SEPARATOR)
    }

    fn write_ascii_values<T>(&self, command: &str, values: &[T]) -> Result<usize>
    where
        T: std::fmt::Display,
        Self: Sized,
    {
        let block = codec::format_ascii_values(values, codec::DEFAULT_ASCII_SEPARATOR);
        self.write(&format!("{command}{block}"))
    }

    fn write_ascii_values_with<T, F>(
        &self,
        command: &str,
        values: &[T],
        separator: &str,
        format: F,
    ) -> Result<usize>
    where
        F: Fn(&T) -> String,
        Self: Sized,
    {
        let block = codec::format_ascii_values_with(values, separator, format);
        self.write(&format!("{command}{block}"))
    }

    fn read_binary_values<T, C>(&self, options: &BinaryReadOptions) -> Result<C>
    where
        T: BinaryValue,
        C: FromIterator<T>,
        Self: Sized,
    {
        let payload = read_binary_payload(self.core(), options, T::SIZE, None)?;
        Ok(codec::decode_values::<T>(&payload, options.byte_order)?
            .into_iter()
            .collect())
    }

    /// `read_binary_values` with a progress monitor.
    fn read_binary_values_monitored<T, C>(
        &self,
        options: &BinaryReadOptions,
        monitor: &mut dyn ReadMonitor,
    ) -> Result<C>
    where
        T: BinaryValue,
        C: FromIterator<T>,
        Self: Sized,
    {
        let payload = read_binary_payload(self.core(), options, T::SIZE, Some(monitor))?;
        Ok(codec::decode_values::<T>(&payload, options.byte_order)?
            .into_iter()
            .collect())
    }

    fn query_binary_values<T, C>(&self, command: &str, options: &BinaryReadOptions) -> Result<C>
    where
        T: BinaryValue,
        C: FromIterator<T>,
        Self: Sized,
    {
        let settings = comm(self.core());
        self.write(command)?;
        if settings.query_delay > Duration::ZERO {
            thread::sleep(settings.query_delay);
        }
        let payload = read_binary_payload(self.core(), options, T::SIZE, None)?;
        Ok(codec::decode_values::<T>(&payload, options.byte_order)?
            .into_iter()
            .collect())
    }

    fn write_binary_values<T>(
        &self,
        command: &str,
        values: &[T],
        options: &BinaryWriteOptions,
    ) -> Result<usize>
    where
        T: BinaryValue,
        Self: Sized,
    {
        let settings = comm(self.core());
        let term = &settings.write_termination;
        if !term.is_empty() && command.ends_with(term.as_str()) {
            return Err(Error::Protocol {
                reason: "message already ends with the write termination".to_string(),
            });
        }
        let payload = codec::encode_values(values, options.byte_order);
        let mut out = settings.encoding.encode(command)?;
        match options.header {
            HeaderFormat::Ieee => out.extend_from_slice(&codec::ieee_header(payload.len())?),
            HeaderFormat::Hp => out.extend_from_slice(&codec::hp_header(payload.len())?),
            HeaderFormat::Empty => {}
        }
        out.extend_from_slice(&payload);
        out.extend_from_slice(term.as_bytes());
        write_raw_impl(self.core(), &out)
    }
}

pub(crate) fn comm(core: &ResourceCore) -> CommSettings {
    core.comm
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// One backend read. Returns the bytes plus whether the backend signalled
/// "more data may remain" and whether it stopped on a termination char.
fn backend_read(core: &ResourceCore, size: usize) -> Result<(Vec<u8>, bool, bool)> {
    let (bytes, code) = core.with_session(|backend, session| backend.read(session, size))?;
    core.record_status(code);
    trace!(
        resource = core.resource_name(),
        requested = size,
        received = bytes.len(),
        status = code,
        "backend read"
    );
    Ok((
        bytes,
        code == status::SUCCESS_MAX_CNT,
        code == status::SUCCESS_TERM_CHAR,
    ))
}

fn write_raw_impl(core: &ResourceCore, data: &[u8]) -> Result<usize> {
    let (count, code) = core.with_session(|backend, session| backend.write(session, data))?;
    core.record_status(code);
    trace!(
        resource = core.resource_name(),
        written = count,
        status = code,
        "backend write"
    );
    Ok(count)
}

/// Read one message: chunks accumulate until the backend ends the message
/// or the termination sequence shows up. An absent termination means a
/// single chunk is read.
fn read_message(core: &ResourceCore, termination: Option<&str>, chunk_size: usize) -> Result<Vec<u8>> {
    match termination.filter(|t| !t.is_empty()) {
        None => {
            let (bytes, _, _) = backend_read(core, chunk_size)?;
            Ok(bytes)
        }
        Some(term) => {
            let term = term.as_bytes();
            let mut out = Vec::with_capacity(chunk_size);
            loop {
                let (bytes, more, _) = backend_read(core, chunk_size)?;
                out.extend_from_slice(&bytes);
                if out.ends_with(term) || !more {
                    return Ok(out);
                }
            }
        }
    }
}

/// Restores the termination-character attributes changed for a
/// `break_on_termchar` read.
struct TermcharOverride {
    core: Arc<ResourceCore>,
    old_char: u64,
    old_enabled: u64,
}

impl TermcharOverride {
    fn install(core: &Arc<ResourceCore>) -> Result<Self> {
        let settings = comm(core);
        let termchar = settings
            .read_termination
            .as_deref()
            .and_then(|t| t.as_bytes().last().copied())
            .unwrap_or(b'\n');
        let old_char = core.get_attr(attr::TERMCHAR)?.as_scalar().unwrap_or(0x0A);
        let old_enabled = core.get_attr(attr::TERMCHAR_EN)?.as_scalar().unwrap_or(0);
        core.set_attr(attr::TERMCHAR, AttrValue::from(u64::from(termchar)))?;
        core.set_attr(attr::TERMCHAR_EN, AttrValue::from(true))?;
        Ok(TermcharOverride {
            core: Arc::clone(core),
            old_char,
            old_enabled,
        })
    }
}

impl Drop for TermcharOverride {
    fn drop(&mut self) {
        let restore = self
            .core
            .set_attr(attr::TERMCHAR, AttrValue::Scalar(self.old_char))
            .and_then(|()| {
                self.core
                    .set_attr(attr::TERMCHAR_EN, AttrValue::Scalar(self.old_enabled))
            });
        if let Err(err) = restore {
            warn!(
                resource = self.core.resource_name(),
                %err,
                "restoring termination attributes failed"
            );
        }
    }
}

fn read_bytes_impl(
    core: &Arc<ResourceCore>,
    count: usize,
    break_on_termchar: bool,
    chunk_size: Option<usize>,
    mut monitor: Option<&mut dyn ReadMonitor>,
) -> Result<Vec<u8>> {
    let settings = comm(core);
    let chunk = chunk_size.unwrap_or(settings.chunk_size).max(1);
    let _restore = if break_on_termchar {
        Some(TermcharOverride::install(core)?)
    } else {
        None
    };

    let mut out = Vec::with_capacity(count.min(chunk * 4));
    while out.len() < count {
        let size = chunk.min(count - out.len());
        let (bytes, more, termchar) = backend_read(core, size)?;
        let delta = bytes.len();
        out.extend_from_slice(&bytes);
        if let Some(monitor) = monitor.as_deref_mut() {
            monitor.update(delta);
        }
        if break_on_termchar && termchar {
            break;
        }
        // A termination character alone does not end a byte-counted read;
        // only the END indicator (or a fatal error) may cut it short. The
        // caller sees a short read through last_status.
        if !more && !termchar && out.len() < count {
            break;
        }
    }
    Ok(out)
}

/// Collect the payload of one binary block per the options. Returns raw
/// payload bytes, header and termination stripped.
fn read_binary_payload(
    core: &Arc<ResourceCore>,
    options: &BinaryReadOptions,
    element_size: usize,
    mut monitor: Option<&mut dyn ReadMonitor>,
) -> Result<Vec<u8>> {
    let settings = comm(core);
    let chunk = options.chunk_size.unwrap_or(settings.chunk_size).max(1);
    let term_last = settings
        .read_termination
        .as_deref()
        .and_then(|t| t.as_bytes().last().copied())
        .unwrap_or(b'\n');

    let mut buf: Vec<u8> = Vec::new();
    let mut finished = false;

    let mut fill = |buf: &mut Vec<u8>, finished: &mut bool| -> Result<()> {
        let (bytes, more, _) = backend_read(core, chunk)?;
        let delta = bytes.len();
        buf.extend_from_slice(&bytes);
        if let Some(monitor) = monitor.as_deref_mut() {
            monitor.update(delta);
        }
        *finished = !more;
        Ok(())
    };

    // Locate the header (or start of payload for headerless streams).
    let header = match options.header {
        HeaderFormat::Empty => codec::BlockHeader {
            payload_offset: 0,
            payload_length: None,
        },
        HeaderFormat::Ieee | HeaderFormat::Hp => loop {
            let parsed = match options.header {
                HeaderFormat::Ieee => codec::parse_ieee_header(&buf, options.scan_window),
                _ => codec::parse_hp_header(&buf, options.scan_window),
            };
            match parsed {
                Ok(header) => break header,
                Err(err) => {
                    let window = options.scan_window.min(buf.len());
                    let sentinel_seen = buf[..window].contains(&b'#');
                    if !sentinel_seen && buf.len() >= options.scan_window {
                        return Err(err);
                    }
                    let before = buf.len();
                    fill(&mut buf, &mut finished)?;
                    if buf.len() == before && finished {
                        return Err(err);
                    }
                }
            }
        },
    };

    let declared = match header.payload_length {
        Some(length) => Some(length),
        // Indefinite and empty-header blocks are bounded by the declared
        // element count when the caller knows it.
        None => options.data_points.map(|points| points * element_size),
    };

    match declared {
        Some(length) => {
            let needed = header.payload_offset + length + usize::from(options.expect_termination);
            while buf.len() < needed {
                let before = buf.len();
                fill(&mut buf, &mut finished)?;
                // Termination bytes inside binary payload do not end the
                // block; only a read that makes no progress does.
                if buf.len() == before && finished {
                    return Err(Error::Protocol {
                        reason: format!(
                            "block ended after {} of {} expected bytes",
                            buf.len(),
                            needed
                        ),
                    });
                }
            }
            if options.expect_termination && buf[needed - 1] != term_last {
                return Err(Error::Protocol {
                    reason: "block is not followed by the termination character".to_string(),
                });
            }
            Ok(buf[header.payload_offset..header.payload_offset + length].to_vec())
        }
        None => {
            // Unbounded: drain until the backend ends the message or the
            // termination byte closes the block.
            loop {
                if finished || (options.expect_termination && buf.last() == Some(&term_last)) {
                    break;
                }
                fill(&mut buf, &mut finished)?;
            }
            let mut payload = buf.split_off(header.payload_offset.min(buf.len()));
            if options.expect_termination && payload.last() == Some(&term_last) {
                payload.pop();
            }
            Ok(payload)
        }
    }
}
