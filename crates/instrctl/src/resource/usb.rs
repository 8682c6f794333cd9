//! USB-TMC instrument and raw USB resources

use crate::attributes::attr;
use crate::error::Result;
use crate::resource::{define_resource, Messaging, ResourceOps};

define_resource! {
    /// A USB-TMC instrument (`USB<board>::<mfg>::<model>::<serial>::INSTR`).
    UsbInstrument
}

impl Messaging for UsbInstrument {}

impl UsbInstrument {
    /// Issue a control transfer reading up to `length` bytes from the
    /// device.
    pub fn control_in(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> Result<Vec<u8>> {
        self.core().with_session(|backend, session| {
            backend.usb_control_in(session, request_type, request, value, index, length)
        })
    }

    /// Issue a control transfer writing `data` to the device.
    pub fn control_out(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<()> {
        self.core().with_session(|backend, session| {
            backend.usb_control_out(session, request_type, request, value, index, data)
        })
    }

    pub fn manufacturer_id(&self) -> Result<u16> {
        Ok(self.core().get_attr(attr::MANF_ID)?.as_scalar().unwrap_or(0) as u16)
    }

    pub fn model_code(&self) -> Result<u16> {
        Ok(self.core().get_attr(attr::MODEL_CODE)?.as_scalar().unwrap_or(0) as u16)
    }

    pub fn serial_number(&self) -> Result<String> {
        let value = self.core().get_attr(attr::USB_SERIAL_NUM)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub fn usb_interface_number(&self) -> Result<u16> {
        Ok(self.core().get_attr(attr::USB_INTFC_NUM)?.as_scalar().unwrap_or(0) as u16)
    }
}

define_resource! {
    /// Raw (non-TMC) USB pipe (`USB<board>::…::RAW`).
    UsbRaw
}

impl Messaging for UsbRaw {}
