//! LAN instruments: VXI-11/HiSLIP devices, raw sockets and VICP scopes

use crate::attributes::{attr, AttrValue};
use crate::error::Result;
use crate::resource::{define_resource, Messaging, ResourceOps};

define_resource! {
    /// A LAN instrument addressed by device name
    /// (`TCPIP<board>::<host>::<lan_device>::INSTR`).
    TcpipInstrument
}

impl Messaging for TcpipInstrument {}

impl TcpipInstrument {
    pub fn hostname(&self) -> Result<String> {
        let value = self.core().get_attr(attr::TCPIP_HOSTNAME)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub fn address(&self) -> Result<String> {
        let value = self.core().get_attr(attr::TCPIP_ADDR)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub fn lan_device_name(&self) -> Result<String> {
        let value = self.core().get_attr(attr::TCPIP_DEVICE_NAME)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

define_resource! {
    /// A raw TCP socket connection (`TCPIP<board>::<host>::<port>::SOCKET`).
    TcpipSocket
}

impl Messaging for TcpipSocket {}

impl TcpipSocket {
    pub fn port(&self) -> Result<u16> {
        Ok(self.core().get_attr(attr::TCPIP_PORT)?.as_scalar().unwrap_or(0) as u16)
    }

    pub fn nodelay(&self) -> Result<bool> {
        Ok(self.core().get_attr(attr::TCPIP_NODELAY)?.as_scalar() == Some(1))
    }

    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.core().set_attr(attr::TCPIP_NODELAY, AttrValue::from(nodelay))
    }

    pub fn keepalive(&self) -> Result<bool> {
        Ok(self.core().get_attr(attr::TCPIP_KEEPALIVE)?.as_scalar() == Some(1))
    }

    pub fn set_keepalive(&self, keepalive: bool) -> Result<()> {
        self.core()
            .set_attr(attr::TCPIP_KEEPALIVE, AttrValue::from(keepalive))
    }
}

define_resource! {
    /// A LeCroy VICP scope (`VICP<board>::<host>::INSTR`).
    VicpInstrument
}

impl Messaging for VicpInstrument {}
