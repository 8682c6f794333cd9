//! GPIB instrument and interface (board controller) resources

use crate::constants::{EventMechanism, EventType, Timeout};
use crate::error::{Error, Result};
use crate::resource::{define_resource, Messaging, ResourceOps};

/// Interface-clear pulse and bus command bytes.
const CMD_GTL: u8 = 0x01;
const CMD_GET: u8 = 0x08;
const CMD_UNL: u8 = 0x3F;
const CMD_UNT: u8 = 0x5F;
const LISTEN_BASE: u8 = 0x20;

/// Remote-enable line modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RenMode {
    Deassert = 0,
    Assert = 1,
    DeassertGtl = 2,
    AssertAddress = 3,
    AssertLlo = 4,
    AssertAddressLlo = 5,
    AddressGtl = 6,
}

/// Default wait for a service request, in milliseconds.
pub const DEFAULT_SRQ_TIMEOUT_MS: u32 = 25_000;

define_resource! {
    /// A device on the GPIB bus (`GPIB<board>::<primary>[::<secondary>]::INSTR`).
    GpibInstrument
}

impl Messaging for GpibInstrument {}

impl GpibInstrument {
    /// Block until the instrument asserts SRQ. The queue is drained before
    /// arming so a stale request cannot satisfy the wait; a timeout is an
    /// error here, unlike the raw queue wait.
    pub fn wait_for_srq(&self, timeout_ms: Option<u32>) -> Result<()> {
        let timeout_ms = timeout_ms.unwrap_or(DEFAULT_SRQ_TIMEOUT_MS);
        self.enable_event(EventType::ServiceRequest, EventMechanism::QUEUE)?;
        self.discard_events(EventType::ServiceRequest, EventMechanism::QUEUE)?;
        let response = self.wait_on_event(EventType::ServiceRequest, timeout_ms)?;
        self.disable_event(EventType::ServiceRequest, EventMechanism::QUEUE)?;
        if response.timed_out {
            return Err(Error::Timeout {
                op: "wait_for_srq",
                timeout_ms,
            });
        }
        Ok(())
    }

    /// Write raw command bytes to the bus with ATN asserted.
    pub fn send_command(&self, data: &[u8]) -> Result<usize> {
        self.core()
            .with_session(|backend, session| backend.gpib_command(session, data))
    }

    /// Assert a device trigger using the default protocol.
    pub fn trigger(&self) -> Result<()> {
        self.core()
            .with_session(|backend, session| backend.assert_trigger(session, 0))
    }

    /// Service-request wait bounded by the session timeout instead of an
    /// explicit deadline.
    pub fn wait_for_srq_default(&self) -> Result<()> {
        let timeout = match self.timeout()? {
            Timeout::Millis(ms) => Some(ms),
            _ => None,
        };
        self.wait_for_srq(timeout)
    }
}

define_resource! {
    /// The GPIB board itself (`GPIB<board>::INTFC`): bus control without a
    /// message endpoint.
    GpibInterface
}

impl GpibInterface {
    /// Pulse the interface-clear line, making this board controller in
    /// charge.
    pub fn send_ifc(&self) -> Result<()> {
        self.core()
            .with_session(|backend, session| backend.gpib_send_ifc(session))
    }

    /// Write raw command bytes to the bus with ATN asserted.
    pub fn send_command(&self, data: &[u8]) -> Result<usize> {
        self.core()
            .with_session(|backend, session| backend.gpib_command(session, data))
    }

    /// Send several command groups back to back.
    pub fn send_list(&self, groups: &[&[u8]]) -> Result<usize> {
        let mut total = 0;
        for group in groups {
            total += self.send_command(group)?;
        }
        Ok(total)
    }

    pub fn control_ren(&self, mode: RenMode) -> Result<()> {
        self.core()
            .with_session(|backend, session| backend.gpib_control_ren(session, mode as u16))
    }

    /// Assert REN so addressed devices switch to remote operation.
    pub fn enable_remote(&self) -> Result<()> {
        self.control_ren(RenMode::Assert)
    }

    /// Deassert REN and return devices to local control.
    pub fn disable_remote(&self) -> Result<()> {
        self.control_ren(RenMode::Deassert)
    }

    /// Send the addressed devices back to local without dropping REN.
    pub fn go_to_local(&self, primary: u8) -> Result<usize> {
        self.send_command(&[CMD_UNL, LISTEN_BASE + primary, CMD_GTL])
    }

    /// Hand controller-in-charge to another device.
    pub fn pass_control(&self, primary: u8, secondary: Option<u8>) -> Result<()> {
        self.core().with_session(|backend, session| {
            backend.gpib_pass_control(session, u16::from(primary), secondary.map(u16::from))
        })
    }

    /// Address `listeners` and issue one group-execute-trigger so they all
    /// trigger simultaneously.
    pub fn group_execute_trigger(&self, listeners: &[u8]) -> Result<usize> {
        let mut command = Vec::with_capacity(listeners.len() + 3);
        command.push(CMD_UNL);
        command.push(CMD_UNT);
        for &primary in listeners {
            command.push(LISTEN_BASE + primary);
        }
        command.push(CMD_GET);
        self.send_command(&command)
    }
}
