//! Enumerations and constant tables shared by the whole frontend
//!
//! Numeric values follow the VISA specification so the default foreign
//! binding can pass them through unchanged. Software backends reuse the
//! same space.

use std::sync::atomic::{AtomicU16, Ordering};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Interface family of a resource.
///
/// The VICP value is not fixed by the published enumeration; it defaults to
/// 400 and can be adjusted through [`set_vicp_interface_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InterfaceType {
    Gpib,
    Vxi,
    GpibVxi,
    Asrl,
    Pxi,
    Tcpip,
    Usb,
    Firewire,
    Vicp,
    Unknown,
}

static VICP_INTERFACE_TYPE: AtomicU16 = AtomicU16::new(400);

/// Override the numeric value reported for the VICP interface family.
pub fn set_vicp_interface_type(value: u16) {
    VICP_INTERFACE_TYPE.store(value, Ordering::Relaxed);
}

impl InterfaceType {
    /// Numeric value on the VISA wire contract.
    pub fn visa_value(self) -> u16 {
        match self {
            InterfaceType::Gpib => 1,
            InterfaceType::Vxi => 2,
            InterfaceType::GpibVxi => 3,
            InterfaceType::Asrl => 4,
            InterfaceType::Pxi => 5,
            InterfaceType::Tcpip => 6,
            InterfaceType::Usb => 7,
            InterfaceType::Firewire => 9,
            InterfaceType::Vicp => VICP_INTERFACE_TYPE.load(Ordering::Relaxed),
            InterfaceType::Unknown => 0xFFFF,
        }
    }

    pub fn from_visa_value(value: u16) -> Self {
        match value {
            1 => InterfaceType::Gpib,
            2 => InterfaceType::Vxi,
            3 => InterfaceType::GpibVxi,
            4 => InterfaceType::Asrl,
            5 => InterfaceType::Pxi,
            6 => InterfaceType::Tcpip,
            7 => InterfaceType::Usb,
            9 => InterfaceType::Firewire,
            v if v == VICP_INTERFACE_TYPE.load(Ordering::Relaxed) => InterfaceType::Vicp,
            _ => InterfaceType::Unknown,
        }
    }

    /// Canonical upper-case token used in resource names.
    pub fn token(self) -> &'static str {
        match self {
            InterfaceType::Gpib => "GPIB",
            InterfaceType::Vxi => "VXI",
            InterfaceType::GpibVxi => "GPIB-VXI",
            InterfaceType::Asrl => "ASRL",
            InterfaceType::Pxi => "PXI",
            InterfaceType::Tcpip => "TCPIP",
            InterfaceType::Usb => "USB",
            InterfaceType::Firewire => "FIREWIRE",
            InterfaceType::Vicp => "VICP",
            InterfaceType::Unknown => "UNKNOWN",
        }
    }
}

/// Resource class suffix of a resource name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceClass {
    Instr,
    Intfc,
    Backplane,
    Memacc,
    Servant,
    Socket,
    Raw,
}

impl ResourceClass {
    pub fn token(self) -> &'static str {
        match self {
            ResourceClass::Instr => "INSTR",
            ResourceClass::Intfc => "INTFC",
            ResourceClass::Backplane => "BACKPLANE",
            ResourceClass::Memacc => "MEMACC",
            ResourceClass::Servant => "SERVANT",
            ResourceClass::Socket => "SOCKET",
            ResourceClass::Raw => "RAW",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "INSTR" => Some(ResourceClass::Instr),
            "INTFC" => Some(ResourceClass::Intfc),
            "BACKPLANE" => Some(ResourceClass::Backplane),
            "MEMACC" => Some(ResourceClass::Memacc),
            "SERVANT" => Some(ResourceClass::Servant),
            "SOCKET" => Some(ResourceClass::Socket),
            "RAW" => Some(ResourceClass::Raw),
            _ => None,
        }
    }
}

/// Serial parity setting (VI_ATTR_ASRL_PARITY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum Parity {
    None = 0,
    Odd = 1,
    Even = 2,
    Mark = 3,
    Space = 4,
}

impl Parity {
    pub fn from_raw(raw: u64) -> Option<Self> {
        match raw {
            0 => Some(Parity::None),
            1 => Some(Parity::Odd),
            2 => Some(Parity::Even),
            3 => Some(Parity::Mark),
            4 => Some(Parity::Space),
            _ => None,
        }
    }
}

/// Serial stop bits (VI_ATTR_ASRL_STOP_BITS). The wire value is the bit
/// count times ten so 1.5 stays integral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum StopBits {
    One = 10,
    OneAndAHalf = 15,
    Two = 20,
}

impl StopBits {
    pub fn from_raw(raw: u64) -> Option<Self> {
        match raw {
            10 => Some(StopBits::One),
            15 => Some(StopBits::OneAndAHalf),
            20 => Some(StopBits::Two),
            _ => None,
        }
    }
}

/// End-of-input policy for serial reads (VI_ATTR_ASRL_END_IN).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum SerialEndMode {
    None = 0,
    LastBit = 1,
    Termchar = 2,
    Break = 3,
}

impl SerialEndMode {
    pub fn from_raw(raw: u64) -> Option<Self> {
        match raw {
            0 => Some(SerialEndMode::None),
            1 => Some(SerialEndMode::LastBit),
            2 => Some(SerialEndMode::Termchar),
            3 => Some(SerialEndMode::Break),
            _ => None,
        }
    }
}

/// I/O protocol selector (VI_ATTR_IO_PROT).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum IoProtocol {
    Normal = 1,
    FastData = 2,
    Hs488 = 3,
    UsbTmcVendor = 5,
}

impl IoProtocol {
    pub fn from_raw(raw: u64) -> Option<Self> {
        match raw {
            1 => Some(IoProtocol::Normal),
            2 => Some(IoProtocol::FastData),
            3 => Some(IoProtocol::Hs488),
            5 => Some(IoProtocol::UsbTmcVendor),
            _ => None,
        }
    }
}

bitflags! {
    /// Serial flow control (VI_ATTR_ASRL_FLOW_CNTRL). A bit-flag set; NONE
    /// is the empty set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FlowControl: u16 {
        const XON_XOFF = 1;
        const RTS_CTS = 2;
        const DTR_DSR = 4;
    }
}

bitflags! {
    /// Access mode bits passed to open and lock operations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessMode: u32 {
        const NO_LOCK = 0;
        const EXCLUSIVE_LOCK = 1;
        const SHARED_LOCK = 2;
        const LOAD_CONFIG = 4;
    }
}

bitflags! {
    /// Delivery mechanism bits for the event subsystem.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventMechanism: u16 {
        const QUEUE = 1;
        const HANDLER = 2;
        const SUSPEND_HANDLER = 4;
        const ALL = Self::QUEUE.bits() | Self::HANDLER.bits();
    }
}

bitflags! {
    /// Buffer selector for flush operations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferOperation: u16 {
        const READ_BUF = 1;
        const WRITE_BUF = 2;
        const READ_BUF_DISCARD = 4;
        const WRITE_BUF_DISCARD = 8;
        const IO_IN_BUF = 16;
        const IO_OUT_BUF = 32;
        const IO_IN_BUF_DISCARD = 64;
        const IO_OUT_BUF_DISCARD = 128;
    }
}

/// Cooperative lock flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Exclusive,
    Shared,
}

impl LockKind {
    pub fn access_mode(self) -> AccessMode {
        match self {
            LockKind::Exclusive => AccessMode::EXCLUSIVE_LOCK,
            LockKind::Shared => AccessMode::SHARED_LOCK,
        }
    }
}

/// Asynchronous event classes a resource can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum EventType {
    IoCompletion = 0x3FFF_2009,
    Trig = 0xBFFF_200A,
    ServiceRequest = 0x3FFF_200B,
    Clear = 0x3FFF_200D,
    Exception = 0xBFFF_200E,
    GpibCic = 0x3FFF_2012,
    GpibTalk = 0x3FFF_2013,
    GpibListen = 0x3FFF_2014,
    VxiVmeSysfail = 0x3FFF_201D,
    VxiVmeSysreset = 0x3FFF_201E,
    VxiSigp = 0x3FFF_2020,
    TcpipConnect = 0x3FFF_2036,
    UsbInterrupt = 0x3FFF_2037,
}

/// Wildcard accepted by wait and discard operations.
pub const ALL_ENABLED_EVENTS: u32 = 0x3FFF_7FFF;

impl EventType {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x3FFF_2009 => Some(EventType::IoCompletion),
            0xBFFF_200A => Some(EventType::Trig),
            0x3FFF_200B => Some(EventType::ServiceRequest),
            0x3FFF_200D => Some(EventType::Clear),
            0xBFFF_200E => Some(EventType::Exception),
            0x3FFF_2012 => Some(EventType::GpibCic),
            0x3FFF_2013 => Some(EventType::GpibTalk),
            0x3FFF_2014 => Some(EventType::GpibListen),
            0x3FFF_201D => Some(EventType::VxiVmeSysfail),
            0x3FFF_201E => Some(EventType::VxiVmeSysreset),
            0x3FFF_2020 => Some(EventType::VxiSigp),
            0x3FFF_2036 => Some(EventType::TcpipConnect),
            0x3FFF_2037 => Some(EventType::UsbInterrupt),
            _ => None,
        }
    }
}

/// Address-space selector for register-based access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum AddressSpace {
    A16 = 1,
    A24 = 2,
    A32 = 3,
    A64 = 4,
    PxiCfg = 10,
    PxiBar0 = 11,
    PxiBar1 = 12,
    PxiBar2 = 13,
    PxiBar3 = 14,
    PxiBar4 = 15,
    PxiBar5 = 16,
}

/// Register access width in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataWidth {
    W8,
    W16,
    W32,
    W64,
}

impl DataWidth {
    pub fn bytes(self) -> usize {
        match self {
            DataWidth::W8 => 1,
            DataWidth::W16 => 2,
            DataWidth::W32 => 4,
            DataWidth::W64 => 8,
        }
    }
}

/// Timeout applied to blocking operations, in milliseconds.
///
/// `0` canonicalizes to `Immediate` and the reserved sentinel to
/// `Infinite`; conversions to the raw attribute value happen at the
/// backend boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Immediate,
    Millis(u32),
    Infinite,
}

/// Raw attribute value meaning "never time out".
pub const TIMEOUT_INFINITE: u32 = 0xFFFF_FFFF;

/// Raw attribute value meaning "fail unless immediately satisfiable".
pub const TIMEOUT_IMMEDIATE: u32 = 0;

impl Timeout {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            TIMEOUT_IMMEDIATE => Timeout::Immediate,
            TIMEOUT_INFINITE => Timeout::Infinite,
            ms => Timeout::Millis(ms),
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            Timeout::Immediate => TIMEOUT_IMMEDIATE,
            Timeout::Infinite => TIMEOUT_INFINITE,
            Timeout::Millis(ms) => ms,
        }
    }
}

/// VISA status-code space. Negative values are errors, positive values are
/// completion warnings, zero is plain success.
pub mod status {
    pub const SUCCESS: i32 = 0;
    pub const SUCCESS_EVENT_EN: i32 = 0x3FFF_0002;
    pub const SUCCESS_EVENT_DIS: i32 = 0x3FFF_0003;
    pub const SUCCESS_QUEUE_EMPTY: i32 = 0x3FFF_0004;
    pub const SUCCESS_TERM_CHAR: i32 = 0x3FFF_0005;
    pub const SUCCESS_MAX_CNT: i32 = 0x3FFF_0006;
    pub const SUCCESS_DEV_NPRESENT: i32 = 0x3FFF_007D;
    pub const SUCCESS_SYNC: i32 = 0x3FFF_009B;
    pub const SUCCESS_QUEUE_NEMPTY: i32 = 0x3FFF_0080;
    pub const SUCCESS_NESTED_SHARED: i32 = 0x3FFF_0099;
    pub const SUCCESS_NESTED_EXCLUSIVE: i32 = 0x3FFF_009A;

    pub const WARN_QUEUE_OVERFLOW: i32 = 0x3FFF_000C;
    pub const WARN_CONFIG_NLOADED: i32 = 0x3FFF_0077;
    pub const WARN_NULL_OBJECT: i32 = 0x3FFF_0082;
    pub const WARN_NSUP_ATTR_STATE: i32 = 0x3FFF_0084;
    pub const WARN_UNKNOWN_STATUS: i32 = 0x3FFF_0085;
    pub const WARN_NSUP_BUF: i32 = 0x3FFF_0088;

    pub const ERROR_SYSTEM_ERROR: i32 = 0xBFFF_0000_u32 as i32;
    pub const ERROR_INV_OBJECT: i32 = 0xBFFF_000E_u32 as i32;
    pub const ERROR_RSRC_LOCKED: i32 = 0xBFFF_000F_u32 as i32;
    pub const ERROR_INV_EXPR: i32 = 0xBFFF_0010_u32 as i32;
    pub const ERROR_RSRC_NFOUND: i32 = 0xBFFF_0011_u32 as i32;
    pub const ERROR_INV_RSRC_NAME: i32 = 0xBFFF_0012_u32 as i32;
    pub const ERROR_INV_ACC_MODE: i32 = 0xBFFF_0013_u32 as i32;
    pub const ERROR_TMO: i32 = 0xBFFF_0015_u32 as i32;
    pub const ERROR_CLOSING_FAILED: i32 = 0xBFFF_0016_u32 as i32;
    pub const ERROR_INV_DEGREE: i32 = 0xBFFF_001B_u32 as i32;
    pub const ERROR_INV_JOB_ID: i32 = 0xBFFF_001C_u32 as i32;
    pub const ERROR_NSUP_ATTR: i32 = 0xBFFF_001D_u32 as i32;
    pub const ERROR_NSUP_ATTR_STATE: i32 = 0xBFFF_001E_u32 as i32;
    pub const ERROR_ATTR_READONLY: i32 = 0xBFFF_001F_u32 as i32;
    pub const ERROR_INV_LOCK_TYPE: i32 = 0xBFFF_0020_u32 as i32;
    pub const ERROR_INV_ACCESS_KEY: i32 = 0xBFFF_0021_u32 as i32;
    pub const ERROR_INV_EVENT: i32 = 0xBFFF_0026_u32 as i32;
    pub const ERROR_INV_MECH: i32 = 0xBFFF_0027_u32 as i32;
    pub const ERROR_HNDLR_NINSTALLED: i32 = 0xBFFF_0028_u32 as i32;
    pub const ERROR_INV_HNDLR_REF: i32 = 0xBFFF_0029_u32 as i32;
    pub const ERROR_INV_CONTEXT: i32 = 0xBFFF_002A_u32 as i32;
    pub const ERROR_QUEUE_OVERFLOW: i32 = 0xBFFF_002D_u32 as i32;
    pub const ERROR_NENABLED: i32 = 0xBFFF_002F_u32 as i32;
    pub const ERROR_ABORT: i32 = 0xBFFF_0030_u32 as i32;
    pub const ERROR_RAW_WR_PROT_VIOL: i32 = 0xBFFF_0034_u32 as i32;
    pub const ERROR_RAW_RD_PROT_VIOL: i32 = 0xBFFF_0035_u32 as i32;
    pub const ERROR_OUTP_PROT_VIOL: i32 = 0xBFFF_0036_u32 as i32;
    pub const ERROR_INP_PROT_VIOL: i32 = 0xBFFF_0037_u32 as i32;
    pub const ERROR_BERR: i32 = 0xBFFF_0038_u32 as i32;
    pub const ERROR_IN_PROGRESS: i32 = 0xBFFF_0039_u32 as i32;
    pub const ERROR_INV_SETUP: i32 = 0xBFFF_003A_u32 as i32;
    pub const ERROR_QUEUE_ERROR: i32 = 0xBFFF_003B_u32 as i32;
    pub const ERROR_ALLOC: i32 = 0xBFFF_003C_u32 as i32;
    pub const ERROR_INV_MASK: i32 = 0xBFFF_003D_u32 as i32;
    pub const ERROR_IO: i32 = 0xBFFF_003E_u32 as i32;
    pub const ERROR_INV_FMT: i32 = 0xBFFF_003F_u32 as i32;
    pub const ERROR_NSUP_FMT: i32 = 0xBFFF_0041_u32 as i32;
    pub const ERROR_LINE_IN_USE: i32 = 0xBFFF_0042_u32 as i32;
    pub const ERROR_NSUP_MODE: i32 = 0xBFFF_0046_u32 as i32;
    pub const ERROR_SRQ_NOCCURRED: i32 = 0xBFFF_004A_u32 as i32;
    pub const ERROR_INV_SPACE: i32 = 0xBFFF_004E_u32 as i32;
    pub const ERROR_INV_OFFSET: i32 = 0xBFFF_0051_u32 as i32;
    pub const ERROR_INV_WIDTH: i32 = 0xBFFF_0052_u32 as i32;
    pub const ERROR_NSUP_OFFSET: i32 = 0xBFFF_0054_u32 as i32;
    pub const ERROR_NSUP_VAR_WIDTH: i32 = 0xBFFF_0055_u32 as i32;
    pub const ERROR_WINDOW_NMAPPED: i32 = 0xBFFF_0057_u32 as i32;
    pub const ERROR_RESP_PENDING: i32 = 0xBFFF_0059_u32 as i32;
    pub const ERROR_NLISTENERS: i32 = 0xBFFF_005F_u32 as i32;
    pub const ERROR_NCIC: i32 = 0xBFFF_0060_u32 as i32;
    pub const ERROR_NSYS_CNTLR: i32 = 0xBFFF_0061_u32 as i32;
    pub const ERROR_NSUP_OPER: i32 = 0xBFFF_0067_u32 as i32;
    pub const ERROR_INTR_PENDING: i32 = 0xBFFF_0068_u32 as i32;
    pub const ERROR_ASRL_PARITY: i32 = 0xBFFF_006A_u32 as i32;
    pub const ERROR_ASRL_FRAMING: i32 = 0xBFFF_006B_u32 as i32;
    pub const ERROR_ASRL_OVERRUN: i32 = 0xBFFF_006C_u32 as i32;
    pub const ERROR_TRIG_NMAPPED: i32 = 0xBFFF_006E_u32 as i32;
    pub const ERROR_NSUP_ALIGN_OFFSET: i32 = 0xBFFF_0070_u32 as i32;
    pub const ERROR_USER_BUF: i32 = 0xBFFF_0071_u32 as i32;
    pub const ERROR_RSRC_BUSY: i32 = 0xBFFF_0072_u32 as i32;
    pub const ERROR_NSUP_WIDTH: i32 = 0xBFFF_0076_u32 as i32;
    pub const ERROR_INV_PARAMETER: i32 = 0xBFFF_0078_u32 as i32;
    pub const ERROR_INV_PROT: i32 = 0xBFFF_0079_u32 as i32;
    pub const ERROR_INV_SIZE: i32 = 0xBFFF_007B_u32 as i32;
    pub const ERROR_WINDOW_MAPPED: i32 = 0xBFFF_0080_u32 as i32;
    pub const ERROR_NIMPL_OPER: i32 = 0xBFFF_0081_u32 as i32;
    pub const ERROR_INV_LENGTH: i32 = 0xBFFF_0083_u32 as i32;
    pub const ERROR_INV_MODE: i32 = 0xBFFF_0091_u32 as i32;
    pub const ERROR_SESN_NLOCKED: i32 = 0xBFFF_009C_u32 as i32;
    pub const ERROR_MEM_NSHARED: i32 = 0xBFFF_009D_u32 as i32;
    pub const ERROR_LIBRARY_NFOUND: i32 = 0xBFFF_009E_u32 as i32;
    pub const ERROR_NSUP_INTR: i32 = 0xBFFF_009F_u32 as i32;
    pub const ERROR_INV_LINE: i32 = 0xBFFF_00A0_u32 as i32;
    pub const ERROR_FILE_ACCESS: i32 = 0xBFFF_00A1_u32 as i32;
    pub const ERROR_FILE_IO: i32 = 0xBFFF_00A2_u32 as i32;
    pub const ERROR_LINE_NRESERVED: i32 = 0xBFFF_00A3_u32 as i32;
    pub const ERROR_MEM_NRESERVED: i32 = 0xBFFF_00A4_u32 as i32;
    pub const ERROR_INTF_NUM_NCONFIG: i32 = 0xBFFF_00A6_u32 as i32;
    pub const ERROR_CONN_LOST: i32 = 0xBFFF_00A7_u32 as i32;

    /// True when the status denotes a failed operation.
    pub fn is_error(status: i32) -> bool {
        status < 0
    }

    /// True for completion codes that are noteworthy but not failures.
    pub fn is_warning(status: i32) -> bool {
        status > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(!status::is_error(status::SUCCESS));
        assert!(!status::is_warning(status::SUCCESS));
        assert!(status::is_warning(status::SUCCESS_MAX_CNT));
        assert!(status::is_error(status::ERROR_TMO));
        assert!(status::ERROR_TMO < 0);
    }

    #[test]
    fn test_timeout_canonicalization() {
        assert_eq!(Timeout::from_raw(0), Timeout::Immediate);
        assert_eq!(Timeout::from_raw(TIMEOUT_INFINITE), Timeout::Infinite);
        assert_eq!(Timeout::from_raw(2500), Timeout::Millis(2500));
        assert_eq!(Timeout::Millis(2500).as_raw(), 2500);
        assert_eq!(Timeout::Infinite.as_raw(), TIMEOUT_INFINITE);
    }

    #[test]
    fn test_interface_type_round_trip() {
        for ty in [
            InterfaceType::Gpib,
            InterfaceType::Vxi,
            InterfaceType::Asrl,
            InterfaceType::Pxi,
            InterfaceType::Tcpip,
            InterfaceType::Usb,
            InterfaceType::Vicp,
        ] {
            assert_eq!(InterfaceType::from_visa_value(ty.visa_value()), ty);
        }
    }

    #[test]
    fn test_event_type_round_trip() {
        for ev in [
            EventType::ServiceRequest,
            EventType::Trig,
            EventType::Clear,
            EventType::Exception,
            EventType::UsbInterrupt,
        ] {
            assert_eq!(EventType::from_raw(ev.as_u32()), Some(ev));
        }
        assert_eq!(EventType::from_raw(0xDEAD_BEEF), None);
    }

    #[test]
    fn test_event_mechanism_all() {
        assert!(EventMechanism::ALL.contains(EventMechanism::QUEUE));
        assert!(EventMechanism::ALL.contains(EventMechanism::HANDLER));
        assert!(!EventMechanism::ALL.contains(EventMechanism::SUSPEND_HANDLER));
    }

    #[test]
    fn test_stop_bits_wire_encoding() {
        assert_eq!(StopBits::OneAndAHalf as u16, 15);
        assert_eq!(StopBits::from_raw(20), Some(StopBits::Two));
        assert_eq!(StopBits::from_raw(11), None);
    }
}
