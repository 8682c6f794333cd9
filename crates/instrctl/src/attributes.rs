//! VISA attribute descriptors and the process-wide registry
//!
//! The registry is data, not types: resource properties are thin wrappers
//! performing get/set against their session with compile-time-known ids,
//! and the table below is what discovery, validation and the foreign
//! binding consult to marshal values.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;

/// Well-known attribute ids.
pub mod attr {
    pub const RSRC_CLASS: u32 = 0xBFFF_0001;
    pub const RSRC_NAME: u32 = 0xBFFF_0002;
    pub const RSRC_IMPL_VERSION: u32 = 0x3FFF_0003;
    pub const RSRC_LOCK_STATE: u32 = 0x3FFF_0004;
    pub const MAX_QUEUE_LENGTH: u32 = 0x3FFF_0005;
    pub const SEND_END_EN: u32 = 0x3FFF_0016;
    pub const TERMCHAR: u32 = 0x3FFF_0018;
    pub const TMO_VALUE: u32 = 0x3FFF_001A;
    pub const GPIB_READDR_EN: u32 = 0x3FFF_001B;
    pub const IO_PROT: u32 = 0x3FFF_001C;
    pub const ASRL_BAUD: u32 = 0x3FFF_0021;
    pub const ASRL_DATA_BITS: u32 = 0x3FFF_0022;
    pub const ASRL_PARITY: u32 = 0x3FFF_0023;
    pub const ASRL_STOP_BITS: u32 = 0x3FFF_0024;
    pub const ASRL_FLOW_CNTRL: u32 = 0x3FFF_0025;
    pub const RD_BUF_SIZE: u32 = 0x3FFF_002A;
    pub const WR_BUF_SIZE: u32 = 0x3FFF_002E;
    pub const SUPPRESS_END_EN: u32 = 0x3FFF_0036;
    pub const TERMCHAR_EN: u32 = 0x3FFF_0038;
    pub const DEST_ACCESS_PRIV: u32 = 0x3FFF_0039;
    pub const DEST_BYTE_ORDER: u32 = 0x3FFF_003A;
    pub const SRC_ACCESS_PRIV: u32 = 0x3FFF_003C;
    pub const SRC_BYTE_ORDER: u32 = 0x3FFF_003D;
    pub const WIN_ACCESS_PRIV: u32 = 0x3FFF_0045;
    pub const WIN_BYTE_ORDER: u32 = 0x3FFF_0047;
    pub const GPIB_ATN_STATE: u32 = 0x3FFF_0057;
    pub const GPIB_ADDR_STATE: u32 = 0x3FFF_005C;
    pub const GPIB_CIC_STATE: u32 = 0x3FFF_005E;
    pub const GPIB_NDAC_STATE: u32 = 0x3FFF_0062;
    pub const GPIB_SRQ_STATE: u32 = 0x3FFF_0067;
    pub const GPIB_SYS_CNTRL_STATE: u32 = 0x3FFF_0068;
    pub const GPIB_HS488_CBL_LEN: u32 = 0x3FFF_0069;
    pub const ASRL_AVAIL_NUM: u32 = 0x3FFF_00AC;
    pub const ASRL_CTS_STATE: u32 = 0x3FFF_00AE;
    pub const ASRL_DCD_STATE: u32 = 0x3FFF_00AF;
    pub const ASRL_DSR_STATE: u32 = 0x3FFF_00B1;
    pub const ASRL_DTR_STATE: u32 = 0x3FFF_00B2;
    pub const ASRL_END_IN: u32 = 0x3FFF_00B3;
    pub const ASRL_END_OUT: u32 = 0x3FFF_00B4;
    pub const ASRL_REPLACE_CHAR: u32 = 0x3FFF_00BE;
    pub const ASRL_RI_STATE: u32 = 0x3FFF_00BF;
    pub const ASRL_RTS_STATE: u32 = 0x3FFF_00C0;
    pub const ASRL_XON_CHAR: u32 = 0x3FFF_00C1;
    pub const ASRL_XOFF_CHAR: u32 = 0x3FFF_00C2;
    pub const RM_SESSION: u32 = 0x3FFF_00C4;
    pub const MANF_ID: u32 = 0x3FFF_00D9;
    pub const MODEL_CODE: u32 = 0x3FFF_00DF;
    pub const RSRC_SPEC_VERSION: u32 = 0x3FFF_0170;
    pub const INTF_TYPE: u32 = 0x3FFF_0171;
    pub const GPIB_PRIMARY_ADDR: u32 = 0x3FFF_0172;
    pub const GPIB_SECONDARY_ADDR: u32 = 0x3FFF_0173;
    pub const RSRC_MANF_NAME: u32 = 0xBFFF_0174;
    pub const RSRC_MANF_ID: u32 = 0x3FFF_0175;
    pub const INTF_NUM: u32 = 0x3FFF_0176;
    pub const GPIB_REN_STATE: u32 = 0x3FFF_0181;
    pub const GPIB_UNADDR_EN: u32 = 0x3FFF_0184;
    pub const TCPIP_ADDR: u32 = 0xBFFF_0195;
    pub const TCPIP_HOSTNAME: u32 = 0xBFFF_0196;
    pub const TCPIP_PORT: u32 = 0x3FFF_0197;
    pub const TCPIP_DEVICE_NAME: u32 = 0xBFFF_0199;
    pub const TCPIP_NODELAY: u32 = 0x3FFF_019A;
    pub const TCPIP_KEEPALIVE: u32 = 0x3FFF_019B;
    pub const USB_SERIAL_NUM: u32 = 0xBFFF_01A0;
    pub const USB_INTFC_NUM: u32 = 0x3FFF_01A1;
    pub const USB_PROTOCOL: u32 = 0x3FFF_01A7;
    pub const USB_MAX_INTR_SIZE: u32 = 0x3FFF_01AF;
    pub const ASRL_BREAK_STATE: u32 = 0x3FFF_01A5;
    pub const ASRL_BREAK_LEN: u32 = 0x3FFF_01A6;
    pub const ASRL_ALLOW_TRANSMIT: u32 = 0x3FFF_01A8;
}

/// Dynamically-typed attribute value crossing the backend boundary.
///
/// Bus addresses and sizes are always 64-bit on the contract regardless of
/// host word size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AttrValue {
    Scalar(u64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
}

impl AttrValue {
    /// Numeric view; booleans coerce to 0/1.
    pub fn as_scalar(&self) -> Option<u64> {
        match self {
            AttrValue::Scalar(v) => Some(*v),
            AttrValue::Bool(b) => Some(u64::from(*b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        AttrValue::Scalar(v)
    }
}

impl From<u32> for AttrValue {
    fn from(v: u32) -> Self {
        AttrValue::Scalar(u64::from(v))
    }
}

impl From<u16> for AttrValue {
    fn from(v: u16) -> Self {
        AttrValue::Scalar(u64::from(v))
    }
}

impl From<u8> for AttrValue {
    fn from(v: u8) -> Self {
        AttrValue::Scalar(u64::from(v))
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

/// Shape of an attribute's value as marshalled by backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttrKind {
    Scalar,
    Enum,
    Flags,
    Bytes,
    String,
}

/// Descriptor for one VISA attribute.
#[derive(Debug, Clone, Serialize)]
pub struct AttrDescriptor {
    pub id: u32,
    pub name: &'static str,
    pub readable: bool,
    pub writable: bool,
    pub kind: AttrKind,
    /// Inclusive numeric range for scalar/enum attributes, when bounded.
    pub range: Option<(u64, u64)>,
    /// Default materialized on a fresh session, when defined.
    pub default: Option<u64>,
}

macro_rules! descriptor {
    ($id:expr, $name:expr, $r:expr, $w:expr, $kind:expr) => {
        AttrDescriptor {
            id: $id,
            name: $name,
            readable: $r,
            writable: $w,
            kind: $kind,
            range: None,
            default: None,
        }
    };
    ($id:expr, $name:expr, $r:expr, $w:expr, $kind:expr, $range:expr, $default:expr) => {
        AttrDescriptor {
            id: $id,
            name: $name,
            readable: $r,
            writable: $w,
            kind: $kind,
            range: $range,
            default: $default,
        }
    };
}

static REGISTRY: Lazy<Vec<AttrDescriptor>> = Lazy::new(|| {
    use attr::*;
    use AttrKind::*;
    vec![
        descriptor!(RSRC_CLASS, "VI_ATTR_RSRC_CLASS", true, false, String),
        descriptor!(RSRC_NAME, "VI_ATTR_RSRC_NAME", true, false, String),
        descriptor!(RSRC_IMPL_VERSION, "VI_ATTR_RSRC_IMPL_VERSION", true, false, Scalar),
        descriptor!(RSRC_LOCK_STATE, "VI_ATTR_RSRC_LOCK_STATE", true, false, Enum, Some((0, 2)), Some(0)),
        descriptor!(MAX_QUEUE_LENGTH, "VI_ATTR_MAX_QUEUE_LENGTH", true, true, Scalar, Some((1, u64::MAX)), Some(50)),
        descriptor!(SEND_END_EN, "VI_ATTR_SEND_END_EN", true, true, Scalar, Some((0, 1)), Some(1)),
        descriptor!(TERMCHAR, "VI_ATTR_TERMCHAR", true, true, Scalar, Some((0, 0xFF)), Some(0x0A)),
        descriptor!(TMO_VALUE, "VI_ATTR_TMO_VALUE", true, true, Scalar, None, Some(2000)),
        descriptor!(GPIB_READDR_EN, "VI_ATTR_GPIB_READDR_EN", true, true, Scalar, Some((0, 1)), Some(1)),
        descriptor!(IO_PROT, "VI_ATTR_IO_PROT", true, true, Enum, Some((1, 5)), Some(1)),
        descriptor!(ASRL_BAUD, "VI_ATTR_ASRL_BAUD", true, true, Scalar, None, Some(9600)),
        descriptor!(ASRL_DATA_BITS, "VI_ATTR_ASRL_DATA_BITS", true, true, Scalar, Some((5, 8)), Some(8)),
        descriptor!(ASRL_PARITY, "VI_ATTR_ASRL_PARITY", true, true, Enum, Some((0, 4)), Some(0)),
        descriptor!(ASRL_STOP_BITS, "VI_ATTR_ASRL_STOP_BITS", true, true, Enum, Some((10, 20)), Some(10)),
        descriptor!(ASRL_FLOW_CNTRL, "VI_ATTR_ASRL_FLOW_CNTRL", true, true, Flags, Some((0, 7)), Some(0)),
        descriptor!(RD_BUF_SIZE, "VI_ATTR_RD_BUF_SIZE", true, false, Scalar),
        descriptor!(WR_BUF_SIZE, "VI_ATTR_WR_BUF_SIZE", true, false, Scalar),
        descriptor!(SUPPRESS_END_EN, "VI_ATTR_SUPPRESS_END_EN", true, true, Scalar, Some((0, 1)), Some(0)),
        descriptor!(TERMCHAR_EN, "VI_ATTR_TERMCHAR_EN", true, true, Scalar, Some((0, 1)), Some(0)),
        descriptor!(DEST_BYTE_ORDER, "VI_ATTR_DEST_BYTE_ORDER", true, true, Enum, Some((0, 1)), Some(0)),
        descriptor!(SRC_BYTE_ORDER, "VI_ATTR_SRC_BYTE_ORDER", true, true, Enum, Some((0, 1)), Some(0)),
        descriptor!(WIN_BYTE_ORDER, "VI_ATTR_WIN_BYTE_ORDER", true, true, Enum, Some((0, 1)), Some(0)),
        descriptor!(GPIB_ATN_STATE, "VI_ATTR_GPIB_ATN_STATE", true, false, Enum),
        descriptor!(GPIB_ADDR_STATE, "VI_ATTR_GPIB_ADDR_STATE", true, false, Enum),
        descriptor!(GPIB_CIC_STATE, "VI_ATTR_GPIB_CIC_STATE", true, false, Scalar),
        descriptor!(GPIB_NDAC_STATE, "VI_ATTR_GPIB_NDAC_STATE", true, false, Enum),
        descriptor!(GPIB_SRQ_STATE, "VI_ATTR_GPIB_SRQ_STATE", true, false, Enum),
        descriptor!(GPIB_SYS_CNTRL_STATE, "VI_ATTR_GPIB_SYS_CNTRL_STATE", true, false, Scalar),
        descriptor!(GPIB_HS488_CBL_LEN, "VI_ATTR_GPIB_HS488_CBL_LEN", true, false, Scalar),
        descriptor!(ASRL_AVAIL_NUM, "VI_ATTR_ASRL_AVAIL_NUM", true, false, Scalar),
        descriptor!(ASRL_CTS_STATE, "VI_ATTR_ASRL_CTS_STATE", true, false, Enum),
        descriptor!(ASRL_DCD_STATE, "VI_ATTR_ASRL_DCD_STATE", true, false, Enum),
        descriptor!(ASRL_DSR_STATE, "VI_ATTR_ASRL_DSR_STATE", true, false, Enum),
        descriptor!(ASRL_DTR_STATE, "VI_ATTR_ASRL_DTR_STATE", true, true, Enum),
        descriptor!(ASRL_END_IN, "VI_ATTR_ASRL_END_IN", true, true, Enum, Some((0, 3)), Some(2)),
        descriptor!(ASRL_END_OUT, "VI_ATTR_ASRL_END_OUT", true, true, Enum, Some((0, 3)), Some(0)),
        descriptor!(ASRL_REPLACE_CHAR, "VI_ATTR_ASRL_REPLACE_CHAR", true, true, Scalar, Some((0, 0xFF)), Some(0)),
        descriptor!(ASRL_RI_STATE, "VI_ATTR_ASRL_RI_STATE", true, false, Enum),
        descriptor!(ASRL_RTS_STATE, "VI_ATTR_ASRL_RTS_STATE", true, true, Enum),
        descriptor!(ASRL_XON_CHAR, "VI_ATTR_ASRL_XON_CHAR", true, true, Scalar, Some((0, 0xFF)), Some(0x11)),
        descriptor!(ASRL_XOFF_CHAR, "VI_ATTR_ASRL_XOFF_CHAR", true, true, Scalar, Some((0, 0xFF)), Some(0x13)),
        descriptor!(RM_SESSION, "VI_ATTR_RM_SESSION", true, false, Scalar),
        descriptor!(MANF_ID, "VI_ATTR_MANF_ID", true, false, Scalar),
        descriptor!(MODEL_CODE, "VI_ATTR_MODEL_CODE", true, false, Scalar),
        descriptor!(RSRC_SPEC_VERSION, "VI_ATTR_RSRC_SPEC_VERSION", true, false, Scalar),
        descriptor!(INTF_TYPE, "VI_ATTR_INTF_TYPE", true, false, Enum),
        descriptor!(GPIB_PRIMARY_ADDR, "VI_ATTR_GPIB_PRIMARY_ADDR", true, false, Scalar, Some((0, 30)), None),
        descriptor!(GPIB_SECONDARY_ADDR, "VI_ATTR_GPIB_SECONDARY_ADDR", true, false, Scalar),
        descriptor!(RSRC_MANF_NAME, "VI_ATTR_RSRC_MANF_NAME", true, false, String),
        descriptor!(RSRC_MANF_ID, "VI_ATTR_RSRC_MANF_ID", true, false, Scalar),
        descriptor!(INTF_NUM, "VI_ATTR_INTF_NUM", true, false, Scalar, None, Some(0)),
        descriptor!(GPIB_REN_STATE, "VI_ATTR_GPIB_REN_STATE", true, false, Enum),
        descriptor!(GPIB_UNADDR_EN, "VI_ATTR_GPIB_UNADDR_EN", true, true, Scalar, Some((0, 1)), Some(0)),
        descriptor!(TCPIP_ADDR, "VI_ATTR_TCPIP_ADDR", true, false, String),
        descriptor!(TCPIP_HOSTNAME, "VI_ATTR_TCPIP_HOSTNAME", true, false, String),
        descriptor!(TCPIP_PORT, "VI_ATTR_TCPIP_PORT", true, false, Scalar, Some((1, 65535)), None),
        descriptor!(TCPIP_DEVICE_NAME, "VI_ATTR_TCPIP_DEVICE_NAME", true, false, String),
        descriptor!(TCPIP_NODELAY, "VI_ATTR_TCPIP_NODELAY", true, true, Scalar, Some((0, 1)), Some(0)),
        descriptor!(TCPIP_KEEPALIVE, "VI_ATTR_TCPIP_KEEPALIVE", true, true, Scalar, Some((0, 1)), Some(0)),
        descriptor!(USB_SERIAL_NUM, "VI_ATTR_USB_SERIAL_NUM", true, false, String),
        descriptor!(USB_INTFC_NUM, "VI_ATTR_USB_INTFC_NUM", true, false, Scalar),
        descriptor!(USB_PROTOCOL, "VI_ATTR_USB_PROTOCOL", true, false, Scalar),
        descriptor!(USB_MAX_INTR_SIZE, "VI_ATTR_USB_MAX_INTR_SIZE", true, true, Scalar),
        descriptor!(ASRL_BREAK_STATE, "VI_ATTR_ASRL_BREAK_STATE", true, true, Enum),
        descriptor!(ASRL_BREAK_LEN, "VI_ATTR_ASRL_BREAK_LEN", true, true, Scalar, Some((1, 500)), Some(250)),
        descriptor!(ASRL_ALLOW_TRANSMIT, "VI_ATTR_ASRL_ALLOW_TRANSMIT", true, true, Scalar, Some((0, 1)), Some(1)),
    ]
});

static BY_ID: Lazy<HashMap<u32, &'static AttrDescriptor>> =
    Lazy::new(|| REGISTRY.iter().map(|d| (d.id, d)).collect());

/// The full immutable attribute table.
pub fn registry() -> &'static [AttrDescriptor] {
    &REGISTRY
}

/// Look up a descriptor by attribute id.
pub fn descriptor(id: u32) -> Option<&'static AttrDescriptor> {
    BY_ID.get(&id).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_no_duplicate_ids() {
        assert_eq!(registry().len(), BY_ID.len());
    }

    #[test]
    fn test_lookup_by_id() {
        let d = descriptor(attr::TMO_VALUE).expect("timeout attribute registered");
        assert_eq!(d.name, "VI_ATTR_TMO_VALUE");
        assert!(d.readable);
        assert!(d.writable);
        assert_eq!(d.default, Some(2000));
    }

    #[test]
    fn test_read_only_attributes() {
        for id in [attr::RSRC_CLASS, attr::RSRC_NAME, attr::MANF_ID] {
            let d = descriptor(id).unwrap();
            assert!(d.readable);
            assert!(!d.writable, "{} must be read-only", d.name);
        }
    }

    #[test]
    fn test_gpib_primary_range() {
        let d = descriptor(attr::GPIB_PRIMARY_ADDR).unwrap();
        assert_eq!(d.range, Some((0, 30)));
    }

    #[test]
    fn test_attr_value_coercions() {
        assert_eq!(AttrValue::Bool(true).as_scalar(), Some(1));
        assert_eq!(AttrValue::Scalar(42).as_scalar(), Some(42));
        assert_eq!(AttrValue::from("inst0").as_str(), Some("inst0"));
        assert_eq!(AttrValue::Bytes(vec![1]).as_scalar(), None);
    }
}
