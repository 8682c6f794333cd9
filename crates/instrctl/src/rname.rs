//! Resource-name grammar: parse, normalize, render
//!
//! Parses strings like `GPIB0::12::INSTR` into a tagged record. Parsing is
//! case-insensitive; rendering produces the canonical upper-case form.
//! Re-rendering a parsed name yields a string that parses back to an equal
//! record.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::constants::{InterfaceType, ResourceClass};
use crate::error::{Error, Result};

/// Default LAN device name for TCPIP INSTR resources.
pub const DEFAULT_LAN_DEVICE: &str = "inst0";

/// Interface family token with an optional numeric suffix, e.g. `GPIB1`.
static HEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z]+)([0-9]*)$").expect("valid head regex"));

/// Serial aliases accepted for backend compatibility, e.g. `COM2`.
static SERIAL_ALIAS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)(COM|LPT)[0-9]+$").expect("valid alias regex"));

/// PXI bus-device-function triple, e.g. `1-12.3`.
static PXI_BDF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)-([0-9]+)(?:\.([0-9]+))?$").expect("valid bdf regex"));

/// PXI chassis/slot tokens.
static PXI_CHASSIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?i)CHASSIS([0-9]+)$").expect("valid chassis regex"));
static PXI_SLOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?i)SLOT([0-9]+)$").expect("valid slot regex"));
static PXI_FUNC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?i)FUNC([0-9]+)$").expect("valid func regex"));

/// Remote wrapper prefix, e.g. `visa://hostname:3537/GPIB0::12::INSTR`.
static REMOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)visa://([^:/]+)(?::([0-9]+))?/(.+)$").expect("valid remote regex"));

/// Structured, canonicalized resource name.
///
/// Numeric fields are integers, defaults are materialized, and the board
/// number is `None` only for serial names whose board token is an OS
/// device path or backend alias (preserved verbatim in `device`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ResourceName {
    GpibInstr {
        board: u32,
        /// Primary address, 0-30.
        primary: u8,
        /// Secondary address, 0-30. The VISA attribute encoding adds 96;
        /// see [`ResourceName::gpib_secondary_visa_value`].
        secondary: Option<u8>,
    },
    GpibIntfc {
        board: u32,
    },
    AsrlInstr {
        board: Option<u32>,
        /// Preserved original token for device-path or alias forms such as
        /// `ASRL/dev/ttyUSB0` or `COM2`.
        device: Option<String>,
    },
    /// Serial port reached through a LAN adapter: `ASRL0::host::port::INSTR`.
    AsrlNetwork {
        host: String,
        serial_port: String,
    },
    TcpipInstr {
        board: u32,
        host: String,
        lan_device: String,
    },
    TcpipSocket {
        board: u32,
        host: String,
        port: u16,
    },
    VicpInstr {
        board: u32,
        host: String,
    },
    UsbInstr {
        board: u32,
        manufacturer_id: u16,
        model_code: u16,
        serial_number: String,
        interface_number: Option<u8>,
    },
    UsbRaw {
        board: u32,
        manufacturer_id: u16,
        model_code: u16,
        serial_number: String,
        interface_number: Option<u8>,
    },
    PxiInstr {
        board: u32,
        bus: u8,
        device: u8,
        function: u8,
    },
    PxiChassisSlot {
        board: u32,
        chassis: u16,
        slot: u16,
        function: u8,
    },
    PxiMemacc {
        board: u32,
    },
    PxiBackplane {
        board: u32,
        chassis: u16,
    },
    VxiInstr {
        board: u32,
        logical_address: u8,
    },
    VxiMemacc {
        board: u32,
    },
    VxiServant {
        board: u32,
    },
    VxiBackplane {
        board: u32,
        logical_address: Option<u8>,
    },
    /// `visa://host[:port]/inner` wrapper around another resource name.
    /// Recursion is one level deep; the inner name cannot itself be remote.
    Remote {
        host: String,
        port: Option<u16>,
        inner: Box<ResourceName>,
    },
}

impl ResourceName {
    /// Parse a resource name. Case-insensitive; see the grammar table in
    /// the crate documentation.
    pub fn parse(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(parse_err(0, "empty resource name"));
        }

        if let Some(caps) = REMOTE.captures(trimmed) {
            let host = caps.get(1).unwrap().as_str().to_string();
            let port = match caps.get(2) {
                Some(m) => Some(parse_port(m.as_str(), m.start())?),
                None => None,
            };
            let inner_text = caps.get(3).unwrap().as_str();
            if REMOTE.is_match(inner_text) {
                return Err(parse_err(
                    caps.get(3).unwrap().start(),
                    "remote resource names cannot nest",
                ));
            }
            let inner = ResourceName::parse(inner_text)?;
            return Ok(ResourceName::Remote {
                host,
                port,
                inner: Box::new(inner),
            });
        }

        let parts = split_parts(trimmed);
        let (head_offset, head) = parts[0];

        // Backend aliases (`COM2`, `LPT1`) map to serial records with the
        // original token kept for re-emission.
        if SERIAL_ALIAS.is_match(head) {
            return finish_asrl_alias(head, &parts[1..]);
        }
        // Device-path serial names: `ASRL/dev/ttyUSB0::INSTR`.
        if head.len() > 4 && head[..4].eq_ignore_ascii_case("ASRL") && !head[4..].bytes().all(|b| b.is_ascii_digit())
        {
            return finish_asrl_alias(head, &parts[1..]);
        }

        let caps = HEAD
            .captures(head)
            .ok_or_else(|| parse_err(head_offset, "malformed interface token"))?;
        let family = caps.get(1).unwrap().as_str().to_ascii_uppercase();
        let board_text = caps.get(2).unwrap().as_str();
        let board: Option<u32> = if board_text.is_empty() {
            None
        } else {
            Some(
                board_text
                    .parse()
                    .map_err(|_| parse_err(head_offset, "board number out of range"))?,
            )
        };

        let rest = &parts[1..];
        match family.as_str() {
            "GPIB" => parse_gpib(board.unwrap_or(0), rest),
            "ASRL" => parse_asrl(board, rest),
            "TCPIP" => parse_tcpip(board.unwrap_or(0), rest),
            "VICP" => parse_vicp(board.unwrap_or(0), rest),
            "USB" => parse_usb(board.unwrap_or(0), rest),
            "PXI" => parse_pxi(board.unwrap_or(0), rest),
            "VXI" => parse_vxi(board.unwrap_or(0), rest),
            _ => Err(parse_err(head_offset, "unknown interface type")),
        }
    }

    /// Interface family. For remote names this is the family of the
    /// wrapped resource.
    pub fn interface_type(&self) -> InterfaceType {
        match self {
            ResourceName::GpibInstr { .. } | ResourceName::GpibIntfc { .. } => InterfaceType::Gpib,
            ResourceName::AsrlInstr { .. } | ResourceName::AsrlNetwork { .. } => InterfaceType::Asrl,
            ResourceName::TcpipInstr { .. } | ResourceName::TcpipSocket { .. } => InterfaceType::Tcpip,
            ResourceName::VicpInstr { .. } => InterfaceType::Vicp,
            ResourceName::UsbInstr { .. } | ResourceName::UsbRaw { .. } => InterfaceType::Usb,
            ResourceName::PxiInstr { .. }
            | ResourceName::PxiChassisSlot { .. }
            | ResourceName::PxiMemacc { .. }
            | ResourceName::PxiBackplane { .. } => InterfaceType::Pxi,
            ResourceName::VxiInstr { .. }
            | ResourceName::VxiMemacc { .. }
            | ResourceName::VxiServant { .. }
            | ResourceName::VxiBackplane { .. } => InterfaceType::Vxi,
            ResourceName::Remote { inner, .. } => inner.interface_type(),
        }
    }

    /// Board number, when the name carries a numeric one.
    pub fn board(&self) -> Option<u32> {
        match self {
            ResourceName::GpibInstr { board, .. }
            | ResourceName::GpibIntfc { board }
            | ResourceName::TcpipInstr { board, .. }
            | ResourceName::TcpipSocket { board, .. }
            | ResourceName::VicpInstr { board, .. }
            | ResourceName::UsbInstr { board, .. }
            | ResourceName::UsbRaw { board, .. }
            | ResourceName::PxiInstr { board, .. }
            | ResourceName::PxiChassisSlot { board, .. }
            | ResourceName::PxiMemacc { board }
            | ResourceName::PxiBackplane { board, .. }
            | ResourceName::VxiInstr { board, .. }
            | ResourceName::VxiMemacc { board }
            | ResourceName::VxiServant { board }
            | ResourceName::VxiBackplane { board, .. } => Some(*board),
            ResourceName::AsrlInstr { board, .. } => *board,
            ResourceName::AsrlNetwork { .. } => Some(0),
            ResourceName::Remote { inner, .. } => inner.board(),
        }
    }

    /// Resource class of the name.
    pub fn resource_class(&self) -> ResourceClass {
        match self {
            ResourceName::GpibIntfc { .. } => ResourceClass::Intfc,
            ResourceName::TcpipSocket { .. } => ResourceClass::Socket,
            ResourceName::UsbRaw { .. } => ResourceClass::Raw,
            ResourceName::PxiMemacc { .. } | ResourceName::VxiMemacc { .. } => ResourceClass::Memacc,
            ResourceName::PxiBackplane { .. } | ResourceName::VxiBackplane { .. } => {
                ResourceClass::Backplane
            }
            ResourceName::VxiServant { .. } => ResourceClass::Servant,
            ResourceName::Remote { inner, .. } => inner.resource_class(),
            _ => ResourceClass::Instr,
        }
    }

    /// VISA attribute encoding of the GPIB secondary address
    /// (`primary + 96` space), when present.
    pub fn gpib_secondary_visa_value(&self) -> Option<u8> {
        match self {
            ResourceName::GpibInstr {
                secondary: Some(sec),
                ..
            } => Some(sec + 96),
            _ => None,
        }
    }

    /// Preserved alias for serial device-path names, if any.
    pub fn alias(&self) -> Option<&str> {
        match self {
            ResourceName::AsrlInstr {
                device: Some(device),
                ..
            } => Some(device),
            _ => None,
        }
    }

    /// Canonical upper-case rendering; equivalent to `to_string`.
    pub fn canonical_string(&self) -> String {
        self.to_string()
    }

    /// Summary record handed out by discovery.
    pub fn info(&self) -> ResourceInfo {
        ResourceInfo {
            interface_type: self.interface_type(),
            interface_board_number: self.board(),
            resource_class: self.resource_class(),
            resource_name: self.canonical_string(),
            alias: self.alias().map(str::to_string),
        }
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceName::GpibInstr {
                board,
                primary,
                secondary,
            } => match secondary {
                Some(sec) => write!(f, "GPIB{board}::{primary}::{sec}::INSTR"),
                None => write!(f, "GPIB{board}::{primary}::INSTR"),
            },
            ResourceName::GpibIntfc { board } => write!(f, "GPIB{board}::INTFC"),
            ResourceName::AsrlInstr { board, device } => match device {
                Some(device) => write!(f, "{device}::INSTR"),
                None => write!(f, "ASRL{}::INSTR", board.unwrap_or(0)),
            },
            ResourceName::AsrlNetwork { host, serial_port } => {
                write!(f, "ASRL0::{host}::{serial_port}::INSTR")
            }
            ResourceName::TcpipInstr {
                board,
                host,
                lan_device,
            } => write!(f, "TCPIP{board}::{host}::{lan_device}::INSTR"),
            ResourceName::TcpipSocket { board, host, port } => {
                write!(f, "TCPIP{board}::{host}::{port}::SOCKET")
            }
            ResourceName::VicpInstr { board, host } => write!(f, "VICP{board}::{host}::INSTR"),
            ResourceName::UsbInstr {
                board,
                manufacturer_id,
                model_code,
                serial_number,
                interface_number,
            } => {
                write!(f, "USB{board}::0x{manufacturer_id:04X}::0x{model_code:04X}::{serial_number}")?;
                if let Some(iface) = interface_number {
                    write!(f, "::{iface}")?;
                }
                write!(f, "::INSTR")
            }
            ResourceName::UsbRaw {
                board,
                manufacturer_id,
                model_code,
                serial_number,
                interface_number,
            } => {
                write!(f, "USB{board}::0x{manufacturer_id:04X}::0x{model_code:04X}::{serial_number}")?;
                if let Some(iface) = interface_number {
                    write!(f, "::{iface}")?;
                }
                write!(f, "::RAW")
            }
            ResourceName::PxiInstr {
                board,
                bus,
                device,
                function,
            } => {
                if *bus != 0 {
                    if *function != 0 {
                        write!(f, "PXI{board}::{bus}-{device}.{function}::INSTR")
                    } else {
                        write!(f, "PXI{board}::{bus}-{device}::INSTR")
                    }
                } else if *function != 0 {
                    write!(f, "PXI{board}::{device}::{function}::INSTR")
                } else {
                    write!(f, "PXI{board}::{device}::INSTR")
                }
            }
            ResourceName::PxiChassisSlot {
                board,
                chassis,
                slot,
                function,
            } => {
                if *function != 0 {
                    write!(f, "PXI{board}::CHASSIS{chassis}::SLOT{slot}::FUNC{function}::INSTR")
                } else {
                    write!(f, "PXI{board}::CHASSIS{chassis}::SLOT{slot}::INSTR")
                }
            }
            ResourceName::PxiMemacc { board } => write!(f, "PXI{board}::MEMACC"),
            ResourceName::PxiBackplane { board, chassis } => {
                write!(f, "PXI{board}::{chassis}::BACKPLANE")
            }
            ResourceName::VxiInstr {
                board,
                logical_address,
            } => write!(f, "VXI{board}::{logical_address}::INSTR"),
            ResourceName::VxiMemacc { board } => write!(f, "VXI{board}::MEMACC"),
            ResourceName::VxiServant { board } => write!(f, "VXI{board}::SERVANT"),
            ResourceName::VxiBackplane {
                board,
                logical_address,
            } => match logical_address {
                Some(la) => write!(f, "VXI{board}::{la}::BACKPLANE"),
                None => write!(f, "VXI{board}::BACKPLANE"),
            },
            ResourceName::Remote { host, port, inner } => match port {
                Some(port) => write!(f, "visa://{host}:{port}/{inner}"),
                None => write!(f, "visa://{host}/{inner}"),
            },
        }
    }
}

/// Parsed record plus presentation fields, as returned by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceInfo {
    pub interface_type: InterfaceType,
    pub interface_board_number: Option<u32>,
    pub resource_class: ResourceClass,
    pub resource_name: String,
    pub alias: Option<String>,
}

fn parse_err(pos: usize, reason: &str) -> Error {
    Error::Parse {
        pos,
        reason: reason.to_string(),
    }
}

/// Split on `::`, keeping each part's byte offset for error reporting.
fn split_parts(s: &str) -> Vec<(usize, &str)> {
    let mut parts = Vec::new();
    let mut offset = 0;
    for part in s.split("::") {
        parts.push((offset, part));
        offset += part.len() + 2;
    }
    parts
}

fn parse_u32(text: &str, offset: usize, what: &str, max: u32) -> Result<u32> {
    let value: u32 = text
        .parse()
        .map_err(|_| parse_err(offset, &format!("expected a number for {what}")))?;
    if value > max {
        return Err(parse_err(offset, &format!("{what} out of range (max {max})")));
    }
    Ok(value)
}

fn parse_port(text: &str, offset: usize) -> Result<u16> {
    let value: u32 = text
        .parse()
        .map_err(|_| parse_err(offset, "expected a port number"))?;
    if value == 0 || value > 65535 {
        return Err(parse_err(offset, "port out of range (1-65535)"));
    }
    Ok(value as u16)
}

/// USB manufacturer/model codes: decimal, or hex with an `0x` marker.
fn parse_usb_id(text: &str, offset: usize) -> Result<u16> {
    let value = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|_| parse_err(offset, "malformed hex number"))?
    } else {
        text.parse::<u32>()
            .map_err(|_| parse_err(offset, "expected a decimal or 0x-prefixed number"))?
    };
    if value > 0xFFFF {
        return Err(parse_err(offset, "USB id out of range"));
    }
    Ok(value as u16)
}

fn is_class(part: &str, class: ResourceClass) -> bool {
    ResourceClass::from_token(part) == Some(class)
}

fn reject_trailing(rest: &[(usize, &str)]) -> Result<()> {
    match rest.first() {
        Some((offset, _)) => Err(parse_err(*offset, "trailing tokens after resource name")),
        None => Ok(()),
    }
}

fn finish_asrl_alias(head: &str, rest: &[(usize, &str)]) -> Result<ResourceName> {
    let rest = match rest {
        [(_, class), tail @ ..] if is_class(class, ResourceClass::Instr) => tail,
        _ => rest,
    };
    reject_trailing(rest)?;
    Ok(ResourceName::AsrlInstr {
        board: None,
        device: Some(head.to_string()),
    })
}

fn parse_gpib(board: u32, rest: &[(usize, &str)]) -> Result<ResourceName> {
    match rest {
        [(_, intfc)] if is_class(intfc, ResourceClass::Intfc) => Ok(ResourceName::GpibIntfc { board }),
        [] => Err(parse_err(0, "GPIB resource needs a primary address or INTFC")),
        [(offset, primary), tail @ ..] => {
            let primary = parse_u32(primary, *offset, "GPIB primary address", 30)? as u8;
            let (secondary, tail) = match tail {
                [(offset, sec), tail2 @ ..] if !is_class(sec, ResourceClass::Instr) => {
                    let sec = parse_u32(sec, *offset, "GPIB secondary address", 30)? as u8;
                    (Some(sec), tail2)
                }
                _ => (None, tail),
            };
            let tail = match tail {
                [(_, class), tail2 @ ..] if is_class(class, ResourceClass::Instr) => tail2,
                _ => tail,
            };
            reject_trailing(tail)?;
            Ok(ResourceName::GpibInstr {
                board,
                primary,
                secondary,
            })
        }
    }
}

fn parse_asrl(board: Option<u32>, rest: &[(usize, &str)]) -> Result<ResourceName> {
    match rest {
        [] => Ok(ResourceName::AsrlInstr {
            board: Some(board.unwrap_or(0)),
            device: None,
        }),
        [(_, class)] if is_class(class, ResourceClass::Instr) => Ok(ResourceName::AsrlInstr {
            board: Some(board.unwrap_or(0)),
            device: None,
        }),
        // ASRL0::host::serial_port[::INSTR]
        [(_, host), (offset, serial_port), tail @ ..] => {
            if tail.is_empty() && ResourceClass::from_token(serial_port).is_some() {
                return Err(parse_err(*offset, "serial-over-LAN name needs a port"));
            }
            let tail = match tail {
                [(_, class), tail2 @ ..] if is_class(class, ResourceClass::Instr) => tail2,
                _ => tail,
            };
            reject_trailing(tail)?;
            Ok(ResourceName::AsrlNetwork {
                host: host.to_string(),
                serial_port: serial_port.to_string(),
            })
        }
        [(offset, _)] => Err(parse_err(*offset, "unexpected token in serial resource name")),
    }
}

fn parse_tcpip(board: u32, rest: &[(usize, &str)]) -> Result<ResourceName> {
    match rest {
        [] => Err(parse_err(0, "TCPIP resource needs a host address")),
        // TCPIP[board]::host::port::SOCKET
        [(_, host), (port_offset, port), (_, class)] if is_class(class, ResourceClass::Socket) => {
            Ok(ResourceName::TcpipSocket {
                board,
                host: host.to_string(),
                port: parse_port(port, *port_offset)?,
            })
        }
        [(_, host), (offset, class)] if is_class(class, ResourceClass::Socket) => {
            let _ = host;
            Err(parse_err(*offset, "TCPIP SOCKET resource needs a port"))
        }
        // TCPIP[board]::host[::lan_device][::INSTR]
        [(_, host), tail @ ..] => {
            let (lan_device, tail) = match tail {
                [(_, dev), tail2 @ ..] if !is_class(dev, ResourceClass::Instr) => {
                    (dev.to_string(), tail2)
                }
                _ => (DEFAULT_LAN_DEVICE.to_string(), tail),
            };
            let tail = match tail {
                [(_, class), tail2 @ ..] if is_class(class, ResourceClass::Instr) => tail2,
                _ => tail,
            };
            reject_trailing(tail)?;
            Ok(ResourceName::TcpipInstr {
                board,
                host: host.to_string(),
                lan_device,
            })
        }
    }
}

fn parse_vicp(board: u32, rest: &[(usize, &str)]) -> Result<ResourceName> {
    match rest {
        [(_, host)] => Ok(ResourceName::VicpInstr {
            board,
            host: host.to_string(),
        }),
        [(_, host), (_, class)] if is_class(class, ResourceClass::Instr) => Ok(ResourceName::VicpInstr {
            board,
            host: host.to_string(),
        }),
        [] => Err(parse_err(0, "VICP resource needs a host address")),
        [_, (offset, _), ..] => Err(parse_err(*offset, "trailing tokens after resource name")),
    }
}

fn parse_usb(board: u32, rest: &[(usize, &str)]) -> Result<ResourceName> {
    let [(mfg_offset, mfg), (model_offset, model), (_, serial), tail @ ..] = rest else {
        return Err(parse_err(
            0,
            "USB resource needs manufacturer id, model code and serial number",
        ));
    };
    let manufacturer_id = parse_usb_id(mfg, *mfg_offset)?;
    let model_code = parse_usb_id(model, *model_offset)?;
    let serial_number = serial.to_string();

    let (interface_number, tail) = match tail {
        [(offset, iface), tail2 @ ..]
            if ResourceClass::from_token(iface).is_none() =>
        {
            (Some(parse_u32(iface, *offset, "USB interface number", 255)? as u8), tail2)
        }
        _ => (None, tail),
    };

    let (class, tail) = match tail {
        [(_, token), tail2 @ ..] if is_class(token, ResourceClass::Raw) => (ResourceClass::Raw, tail2),
        [(_, token), tail2 @ ..] if is_class(token, ResourceClass::Instr) => {
            (ResourceClass::Instr, tail2)
        }
        _ => (ResourceClass::Instr, tail),
    };
    reject_trailing(tail)?;

    Ok(match class {
        ResourceClass::Raw => ResourceName::UsbRaw {
            board,
            manufacturer_id,
            model_code,
            serial_number,
            interface_number,
        },
        _ => ResourceName::UsbInstr {
            board,
            manufacturer_id,
            model_code,
            serial_number,
            interface_number,
        },
    })
}

fn parse_pxi(board: u32, rest: &[(usize, &str)]) -> Result<ResourceName> {
    match rest {
        [(_, memacc)] if is_class(memacc, ResourceClass::Memacc) => {
            Ok(ResourceName::PxiMemacc { board })
        }
        [(offset, chassis), (_, class)] if is_class(class, ResourceClass::Backplane) => {
            Ok(ResourceName::PxiBackplane {
                board,
                chassis: parse_u32(chassis, *offset, "PXI chassis", u32::from(u16::MAX))? as u16,
            })
        }
        [(offset, first), tail @ ..] if PXI_CHASSIS.is_match(first) => {
            let chassis = {
                let caps = PXI_CHASSIS.captures(first).unwrap();
                parse_u32(caps.get(1).unwrap().as_str(), *offset, "PXI chassis", u32::from(u16::MAX))? as u16
            };
            let [(slot_offset, slot_token), tail @ ..] = tail else {
                return Err(parse_err(*offset, "PXI chassis form needs a SLOT token"));
            };
            let slot_caps = PXI_SLOT
                .captures(slot_token)
                .ok_or_else(|| parse_err(*slot_offset, "expected SLOT<n>"))?;
            let slot = parse_u32(
                slot_caps.get(1).unwrap().as_str(),
                *slot_offset,
                "PXI slot",
                u32::from(u16::MAX),
            )? as u16;
            let (function, tail) = match tail {
                [(func_offset, func_token), tail2 @ ..] if PXI_FUNC.is_match(func_token) => {
                    let caps = PXI_FUNC.captures(func_token).unwrap();
                    (
                        parse_u32(caps.get(1).unwrap().as_str(), *func_offset, "PXI function", 255)? as u8,
                        tail2,
                    )
                }
                _ => (0, tail),
            };
            let tail = match tail {
                [(_, class), tail2 @ ..] if is_class(class, ResourceClass::Instr) => tail2,
                _ => tail,
            };
            reject_trailing(tail)?;
            Ok(ResourceName::PxiChassisSlot {
                board,
                chassis,
                slot,
                function,
            })
        }
        // PXI[board]::bus-device[.function][::INSTR]
        [(offset, bdf), tail @ ..] if PXI_BDF.is_match(bdf) => {
            let caps = PXI_BDF.captures(bdf).unwrap();
            let bus = parse_u32(caps.get(1).unwrap().as_str(), *offset, "PXI bus", 255)? as u8;
            let device = parse_u32(caps.get(2).unwrap().as_str(), *offset, "PXI device", 255)? as u8;
            let function = match caps.get(3) {
                Some(m) => parse_u32(m.as_str(), *offset, "PXI function", 255)? as u8,
                None => 0,
            };
            let tail = match tail {
                [(_, class), tail2 @ ..] if is_class(class, ResourceClass::Instr) => tail2,
                _ => tail,
            };
            reject_trailing(tail)?;
            Ok(ResourceName::PxiInstr {
                board,
                bus,
                device,
                function,
            })
        }
        // PXI[board]::device[::function][::INSTR]
        [(offset, device), tail @ ..] => {
            let device = parse_u32(device, *offset, "PXI device", 255)? as u8;
            let (function, tail) = match tail {
                [(offset, func), tail2 @ ..] if !is_class(func, ResourceClass::Instr) => {
                    (parse_u32(func, *offset, "PXI function", 255)? as u8, tail2)
                }
                _ => (0, tail),
            };
            let tail = match tail {
                [(_, class), tail2 @ ..] if is_class(class, ResourceClass::Instr) => tail2,
                _ => tail,
            };
            reject_trailing(tail)?;
            Ok(ResourceName::PxiInstr {
                board,
                bus: 0,
                device,
                function,
            })
        }
        [] => Err(parse_err(0, "PXI resource needs a device or MEMACC")),
    }
}

fn parse_vxi(board: u32, rest: &[(usize, &str)]) -> Result<ResourceName> {
    match rest {
        [(_, memacc)] if is_class(memacc, ResourceClass::Memacc) => {
            Ok(ResourceName::VxiMemacc { board })
        }
        [(_, servant)] if is_class(servant, ResourceClass::Servant) => {
            Ok(ResourceName::VxiServant { board })
        }
        [(_, backplane)] if is_class(backplane, ResourceClass::Backplane) => {
            Ok(ResourceName::VxiBackplane {
                board,
                logical_address: None,
            })
        }
        [(offset, la), (_, backplane)] if is_class(backplane, ResourceClass::Backplane) => {
            Ok(ResourceName::VxiBackplane {
                board,
                logical_address: Some(parse_u32(la, *offset, "VXI logical address", 255)? as u8),
            })
        }
        [(offset, la), tail @ ..] => {
            let logical_address = parse_u32(la, *offset, "VXI logical address", 255)? as u8;
            let tail = match tail {
                [(_, class), tail2 @ ..] if is_class(class, ResourceClass::Instr) => tail2,
                _ => tail,
            };
            reject_trailing(tail)?;
            Ok(ResourceName::VxiInstr {
                board,
                logical_address,
            })
        }
        [] => Err(parse_err(0, "VXI resource needs a logical address")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(name: &str) -> ResourceName {
        ResourceName::parse(name).unwrap_or_else(|e| panic!("{name}: {e}"))
    }

    #[test]
    fn test_gpib_with_secondary() {
        let record = parse("gpib1::3::5::instr");
        assert_eq!(
            record,
            ResourceName::GpibInstr {
                board: 1,
                primary: 3,
                secondary: Some(5),
            }
        );
        assert_eq!(record.to_string(), "GPIB1::3::5::INSTR");
        assert_eq!(record.gpib_secondary_visa_value(), Some(101));
    }

    #[test]
    fn test_gpib_defaults() {
        assert_eq!(
            parse("GPIB::9"),
            ResourceName::GpibInstr {
                board: 0,
                primary: 9,
                secondary: None,
            }
        );
        assert_eq!(parse("GPIB::9").to_string(), "GPIB0::9::INSTR");
    }

    #[test]
    fn test_gpib_primary_bounds() {
        assert!(ResourceName::parse("GPIB0::0::INSTR").is_ok());
        assert!(ResourceName::parse("GPIB0::30::INSTR").is_ok());
        let err = ResourceName::parse("GPIB0::31::INSTR").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }), "got {err}");
    }

    #[test]
    fn test_gpib_intfc() {
        assert_eq!(parse("gpib2::intfc"), ResourceName::GpibIntfc { board: 2 });
        assert_eq!(parse("gpib2::intfc").to_string(), "GPIB2::INTFC");
    }

    #[test]
    fn test_tcpip_socket_literal() {
        let record = parse("TCPIP0::1.2.3.4::999::SOCKET");
        assert_eq!(
            record,
            ResourceName::TcpipSocket {
                board: 0,
                host: "1.2.3.4".to_string(),
                port: 999,
            }
        );
        assert_eq!(record.to_string(), "TCPIP0::1.2.3.4::999::SOCKET");
    }

    #[test]
    fn test_tcpip_instr_default_lan_device() {
        let record = parse("TCPIP::10.0.0.5");
        assert_eq!(
            record,
            ResourceName::TcpipInstr {
                board: 0,
                host: "10.0.0.5".to_string(),
                lan_device: "inst0".to_string(),
            }
        );
        assert_eq!(record.to_string(), "TCPIP0::10.0.0.5::inst0::INSTR");
    }

    #[test]
    fn test_tcpip_port_bounds() {
        assert!(ResourceName::parse("TCPIP0::h::0::SOCKET").is_err());
        assert!(ResourceName::parse("TCPIP0::h::65535::SOCKET").is_ok());
        assert!(ResourceName::parse("TCPIP0::h::65536::SOCKET").is_err());
    }

    #[test]
    fn test_usb_hex_and_suffix_selection() {
        let record = parse("usb::0x5678::0x33::SN999::instr");
        assert_eq!(
            record,
            ResourceName::UsbInstr {
                board: 0,
                manufacturer_id: 0x5678,
                model_code: 0x33,
                serial_number: "SN999".to_string(),
                interface_number: None,
            }
        );

        let raw = parse("USB0::0x1234::125::A22-5::RAW");
        assert_eq!(
            raw,
            ResourceName::UsbRaw {
                board: 0,
                manufacturer_id: 0x1234,
                model_code: 125,
                serial_number: "A22-5".to_string(),
                interface_number: None,
            }
        );
        assert_eq!(raw.resource_class(), ResourceClass::Raw);
        assert_eq!(raw.to_string(), "USB0::0x1234::0x007D::A22-5::RAW");
    }

    #[test]
    fn test_usb_interface_number() {
        let record = parse("USB1::0x1111::0x2222::S::3::INSTR");
        assert_eq!(
            record,
            ResourceName::UsbInstr {
                board: 1,
                manufacturer_id: 0x1111,
                model_code: 0x2222,
                serial_number: "S".to_string(),
                interface_number: Some(3),
            }
        );
    }

    #[test]
    fn test_asrl_plain_and_alias() {
        assert_eq!(
            parse("ASRL2"),
            ResourceName::AsrlInstr {
                board: Some(2),
                device: None,
            }
        );
        assert_eq!(parse("ASRL2").to_string(), "ASRL2::INSTR");

        let alias = parse("COM2");
        assert_eq!(
            alias,
            ResourceName::AsrlInstr {
                board: None,
                device: Some("COM2".to_string()),
            }
        );
        assert_eq!(alias.alias(), Some("COM2"));

        let path = parse("ASRL/dev/ttyUSB0::INSTR");
        assert_eq!(
            path,
            ResourceName::AsrlInstr {
                board: None,
                device: Some("ASRL/dev/ttyUSB0".to_string()),
            }
        );
        assert_eq!(path.to_string(), "ASRL/dev/ttyUSB0::INSTR");
    }

    #[test]
    fn test_asrl_network_form() {
        let record = parse("ASRL0::192.168.0.4::ttyS1::INSTR");
        assert_eq!(
            record,
            ResourceName::AsrlNetwork {
                host: "192.168.0.4".to_string(),
                serial_port: "ttyS1".to_string(),
            }
        );
    }

    #[test]
    fn test_vicp() {
        let record = parse("vicp::scope-lab7");
        assert_eq!(
            record,
            ResourceName::VicpInstr {
                board: 0,
                host: "scope-lab7".to_string(),
            }
        );
        assert_eq!(record.to_string(), "VICP0::scope-lab7::INSTR");
        assert_eq!(record.interface_type(), InterfaceType::Vicp);
    }

    #[test]
    fn test_pxi_forms() {
        assert_eq!(
            parse("PXI0::2::INSTR"),
            ResourceName::PxiInstr {
                board: 0,
                bus: 0,
                device: 2,
                function: 0,
            }
        );
        assert_eq!(
            parse("PXI0::1-12.3"),
            ResourceName::PxiInstr {
                board: 0,
                bus: 1,
                device: 12,
                function: 3,
            }
        );
        assert_eq!(
            parse("pxi0::chassis1::slot4::instr"),
            ResourceName::PxiChassisSlot {
                board: 0,
                chassis: 1,
                slot: 4,
                function: 0,
            }
        );
        assert_eq!(parse("PXI1::MEMACC"), ResourceName::PxiMemacc { board: 1 });
        assert_eq!(
            parse("PXI0::3::BACKPLANE"),
            ResourceName::PxiBackplane {
                board: 0,
                chassis: 3,
            }
        );
    }

    #[test]
    fn test_vxi_forms() {
        assert_eq!(
            parse("VXI::12"),
            ResourceName::VxiInstr {
                board: 0,
                logical_address: 12,
            }
        );
        assert_eq!(parse("VXI0::MEMACC"), ResourceName::VxiMemacc { board: 0 });
        assert_eq!(parse("VXI0::SERVANT"), ResourceName::VxiServant { board: 0 });
        assert_eq!(
            parse("VXI1::0::BACKPLANE"),
            ResourceName::VxiBackplane {
                board: 1,
                logical_address: Some(0),
            }
        );
    }

    #[test]
    fn test_remote_wrapper() {
        let record = parse("visa://lab-server:3537/GPIB0::12::INSTR");
        let ResourceName::Remote { host, port, inner } = &record else {
            panic!("expected remote record");
        };
        assert_eq!(host, "lab-server");
        assert_eq!(*port, Some(3537));
        assert_eq!(
            **inner,
            ResourceName::GpibInstr {
                board: 0,
                primary: 12,
                secondary: None,
            }
        );
        assert_eq!(record.to_string(), "visa://lab-server:3537/GPIB0::12::INSTR");
        assert_eq!(record.interface_type(), InterfaceType::Gpib);

        assert!(ResourceName::parse("visa://a/visa://b/GPIB0::1").is_err());
    }

    #[test]
    fn test_mixed_case_equals_upper_case() {
        for name in [
            "gpib1::3::5::instr",
            "tcpip0::Host.Example::SOCKET-not",
            "usb::0xABCD::0x1::sn::raw",
            "vxi0::servant",
        ] {
            let lower = ResourceName::parse(name);
            let upper = ResourceName::parse(&name.to_ascii_uppercase());
            match (lower, upper) {
                (Ok(a), Ok(b)) => {
                    // Free-text fields (hosts, serial numbers) keep their
                    // case; compare family and class only.
                    assert_eq!(a.interface_type(), b.interface_type());
                    assert_eq!(a.resource_class(), b.resource_class());
                }
                (Err(_), Err(_)) => {}
                (a, b) => panic!("case-sensitivity mismatch for {name}: {a:?} vs {b:?}"),
            }
        }
    }

    #[test]
    fn test_round_trip_law() {
        for name in [
            "GPIB0::2::INSTR",
            "GPIB1::3::5::INSTR",
            "GPIB2::INTFC",
            "ASRL1::INSTR",
            "ASRL0::h::p::INSTR",
            "TCPIP0::1.2.3.4::999::SOCKET",
            "TCPIP0::host::inst0::INSTR",
            "TCPIP2::host::gpib0,5::INSTR",
            "VICP0::h::INSTR",
            "USB0::0x1234::0x5678::SN::INSTR",
            "USB0::0x1234::0x5678::SN::0::RAW",
            "PXI0::2::INSTR",
            "PXI0::1-2.3::INSTR",
            "PXI0::CHASSIS1::SLOT4::FUNC2::INSTR",
            "PXI0::MEMACC",
            "PXI0::7::BACKPLANE",
            "VXI0::1::INSTR",
            "VXI0::MEMACC",
            "VXI0::SERVANT",
            "VXI0::BACKPLANE",
            "visa://h/GPIB0::1::INSTR",
            "visa://h:9999/TCPIP0::a::inst0::INSTR",
        ] {
            let record = parse(name);
            let rendered = record.to_string();
            let reparsed = parse(&rendered);
            assert_eq!(record, reparsed, "round trip failed for {name} -> {rendered}");
        }
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        for name in [
            "GPIB0::2::INSTR::extra",
            "TCPIP0::h::inst0::INSTR::x",
            "VXI0::1::INSTR::9",
            "USB0::0x1::0x2::SN::RAW::what",
        ] {
            assert!(
                matches!(ResourceName::parse(name), Err(Error::Parse { .. })),
                "{name} must fail"
            );
        }
    }

    #[test]
    fn test_unknown_interface() {
        let err = ResourceName::parse("FOO0::1::INSTR").unwrap_err();
        assert!(matches!(err, Error::Parse { pos: 0, .. }));
    }

    #[test]
    fn test_info_record() {
        let info = parse("GPIB0::7::INSTR").info();
        assert_eq!(info.interface_type, InterfaceType::Gpib);
        assert_eq!(info.interface_board_number, Some(0));
        assert_eq!(info.resource_class, ResourceClass::Instr);
        assert_eq!(info.resource_name, "GPIB0::7::INSTR");
        assert_eq!(info.alias, None);
    }
}

#[cfg(all(test, feature = "property-based-tests"))]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_name() -> impl Strategy<Value = ResourceName> {
        prop_oneof![
            (0u32..10, 0u8..=30, proptest::option::of(0u8..=30)).prop_map(
                |(board, primary, secondary)| ResourceName::GpibInstr {
                    board,
                    primary,
                    secondary,
                }
            ),
            (0u32..10).prop_map(|board| ResourceName::GpibIntfc { board }),
            ("[a-z][a-z0-9.]{0,12}", 1u16..=65535, 0u32..4).prop_map(|(host, port, board)| {
                ResourceName::TcpipSocket { board, host, port }
            }),
            (0u32..4, proptest::num::u16::ANY, proptest::num::u16::ANY, "[A-Z0-9]{1,8}").prop_map(
                |(board, manufacturer_id, model_code, serial_number)| ResourceName::UsbInstr {
                    board,
                    manufacturer_id,
                    model_code,
                    serial_number,
                    interface_number: None,
                }
            ),
            (0u32..4, proptest::num::u8::ANY).prop_map(|(board, logical_address)| {
                ResourceName::VxiInstr {
                    board,
                    logical_address,
                }
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_render_reparses_to_equal_record(record in arb_name()) {
            let rendered = record.to_string();
            let reparsed = ResourceName::parse(&rendered).expect("canonical form parses");
            prop_assert_eq!(record, reparsed);
        }
    }
}
