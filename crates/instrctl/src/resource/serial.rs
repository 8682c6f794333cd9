//! Serial (ASRL) instrument with typed line-parameter properties
//!
//! Every property is a thin wrapper over the corresponding session
//! attribute; nothing is cached client-side, so external changes to the
//! port are always visible.

use crate::attributes::{attr, AttrValue};
use crate::constants::{FlowControl, Parity, SerialEndMode, StopBits};
use crate::error::{Error, Result};
use crate::resource::{define_resource, Messaging, ResourceOps};

define_resource! {
    /// An instrument behind a serial port (`ASRL<board>::INSTR`, an OS
    /// device path, or a backend alias such as `COM2`).
    SerialInstrument
}

impl Messaging for SerialInstrument {}

impl SerialInstrument {
    pub fn baud_rate(&self) -> Result<u32> {
        Ok(self.core().get_attr(attr::ASRL_BAUD)?.as_scalar().unwrap_or(9600) as u32)
    }

    pub fn set_baud_rate(&self, baud: u32) -> Result<()> {
        self.core().set_attr(attr::ASRL_BAUD, AttrValue::from(baud))
    }

    /// Data bits per frame, 5 to 8.
    pub fn data_bits(&self) -> Result<u8> {
        Ok(self.core().get_attr(attr::ASRL_DATA_BITS)?.as_scalar().unwrap_or(8) as u8)
    }

    pub fn set_data_bits(&self, bits: u8) -> Result<()> {
        if !(5..=8).contains(&bits) {
            return Err(Error::Config {
                reason: format!("data bits must be 5-8, got {bits}"),
            });
        }
        self.core().set_attr(attr::ASRL_DATA_BITS, AttrValue::from(bits))
    }

    pub fn stop_bits(&self) -> Result<StopBits> {
        let raw = self.core().get_attr(attr::ASRL_STOP_BITS)?.as_scalar().unwrap_or(10);
        StopBits::from_raw(raw).ok_or(Error::Config {
            reason: format!("backend reported unknown stop-bit value {raw}"),
        })
    }

    pub fn set_stop_bits(&self, stop_bits: StopBits) -> Result<()> {
        self.core()
            .set_attr(attr::ASRL_STOP_BITS, AttrValue::Scalar(stop_bits as u64))
    }

    pub fn parity(&self) -> Result<Parity> {
        let raw = self.core().get_attr(attr::ASRL_PARITY)?.as_scalar().unwrap_or(0);
        Parity::from_raw(raw).ok_or(Error::Config {
            reason: format!("backend reported unknown parity value {raw}"),
        })
    }

    pub fn set_parity(&self, parity: Parity) -> Result<()> {
        self.core()
            .set_attr(attr::ASRL_PARITY, AttrValue::Scalar(parity as u64))
    }

    pub fn flow_control(&self) -> Result<FlowControl> {
        let raw = self.core().get_attr(attr::ASRL_FLOW_CNTRL)?.as_scalar().unwrap_or(0);
        Ok(FlowControl::from_bits_truncate(raw as u16))
    }

    pub fn set_flow_control(&self, flow: FlowControl) -> Result<()> {
        self.core()
            .set_attr(attr::ASRL_FLOW_CNTRL, AttrValue::from(flow.bits()))
    }

    /// How the end of a read is recognized: the last data bit or the
    /// termination character.
    pub fn end_input(&self) -> Result<SerialEndMode> {
        let raw = self.core().get_attr(attr::ASRL_END_IN)?.as_scalar().unwrap_or(2);
        SerialEndMode::from_raw(raw).ok_or(Error::Config {
            reason: format!("backend reported unknown end-input mode {raw}"),
        })
    }

    pub fn set_end_input(&self, mode: SerialEndMode) -> Result<()> {
        self.core()
            .set_attr(attr::ASRL_END_IN, AttrValue::Scalar(mode as u64))
    }

    pub fn end_output(&self) -> Result<SerialEndMode> {
        let raw = self.core().get_attr(attr::ASRL_END_OUT)?.as_scalar().unwrap_or(0);
        SerialEndMode::from_raw(raw).ok_or(Error::Config {
            reason: format!("backend reported unknown end-output mode {raw}"),
        })
    }

    pub fn set_end_output(&self, mode: SerialEndMode) -> Result<()> {
        self.core()
            .set_attr(attr::ASRL_END_OUT, AttrValue::Scalar(mode as u64))
    }

    /// Break pulse length in milliseconds (1-500).
    pub fn break_length(&self) -> Result<u16> {
        Ok(self.core().get_attr(attr::ASRL_BREAK_LEN)?.as_scalar().unwrap_or(250) as u16)
    }

    pub fn set_break_length(&self, millis: u16) -> Result<()> {
        if !(1..=500).contains(&millis) {
            return Err(Error::Config {
                reason: format!("break length must be 1-500 ms, got {millis}"),
            });
        }
        self.core().set_attr(attr::ASRL_BREAK_LEN, AttrValue::from(millis))
    }

    pub fn break_state(&self) -> Result<bool> {
        Ok(self.core().get_attr(attr::ASRL_BREAK_STATE)?.as_scalar() == Some(1))
    }

    pub fn set_break_state(&self, asserted: bool) -> Result<()> {
        self.core()
            .set_attr(attr::ASRL_BREAK_STATE, AttrValue::from(asserted))
    }

    pub fn xon_char(&self) -> Result<u8> {
        Ok(self.core().get_attr(attr::ASRL_XON_CHAR)?.as_scalar().unwrap_or(0x11) as u8)
    }

    pub fn set_xon_char(&self, c: u8) -> Result<()> {
        self.core().set_attr(attr::ASRL_XON_CHAR, AttrValue::from(c))
    }

    pub fn xoff_char(&self) -> Result<u8> {
        Ok(self.core().get_attr(attr::ASRL_XOFF_CHAR)?.as_scalar().unwrap_or(0x13) as u8)
    }

    pub fn set_xoff_char(&self, c: u8) -> Result<()> {
        self.core().set_attr(attr::ASRL_XOFF_CHAR, AttrValue::from(c))
    }

    /// Bytes currently waiting in the input buffer.
    pub fn bytes_in_buffer(&self) -> Result<u64> {
        Ok(self.core().get_attr(attr::ASRL_AVAIL_NUM)?.as_scalar().unwrap_or(0))
    }
}
