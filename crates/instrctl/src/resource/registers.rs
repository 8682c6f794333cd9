//! Register-based access for PXI/VXI memory and backplanes

use std::sync::Arc;

use tracing::warn;

use crate::constants::{AddressSpace, DataWidth};
use crate::error::Result;
use crate::resource::{define_resource, ResourceCore, ResourceOps};

/// A mapped register window; unmapped when dropped.
pub struct MappedWindow {
    core: Arc<ResourceCore>,
    address: u64,
    size: u64,
}

impl MappedWindow {
    /// Local address the window was mapped at.
    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for MappedWindow {
    fn drop(&mut self) {
        let result = self
            .core
            .with_session(|backend, session| backend.unmap_address(session));
        if let Err(err) = result {
            warn!(
                resource = self.core.resource_name(),
                %err,
                "unmapping register window on scope exit failed"
            );
        }
    }
}

/// Memory access shared by register-based resource kinds.
pub trait RegisterBased: ResourceOps {
    fn read_memory(&self, space: AddressSpace, offset: u64, width: DataWidth) -> Result<u64> {
        self.core()
            .with_session(|backend, session| backend.mem_read(session, space as u16, offset, width))
    }

    fn write_memory(
        &self,
        space: AddressSpace,
        offset: u64,
        width: DataWidth,
        value: u64,
    ) -> Result<()> {
        self.core().with_session(|backend, session| {
            backend.mem_write(session, space as u16, offset, width, value)
        })
    }

    fn read_u8(&self, space: AddressSpace, offset: u64) -> Result<u8> {
        Ok(self.read_memory(space, offset, DataWidth::W8)? as u8)
    }

    fn read_u16(&self, space: AddressSpace, offset: u64) -> Result<u16> {
        Ok(self.read_memory(space, offset, DataWidth::W16)? as u16)
    }

    fn read_u32(&self, space: AddressSpace, offset: u64) -> Result<u32> {
        Ok(self.read_memory(space, offset, DataWidth::W32)? as u32)
    }

    fn read_u64(&self, space: AddressSpace, offset: u64) -> Result<u64> {
        self.read_memory(space, offset, DataWidth::W64)
    }

    fn write_u8(&self, space: AddressSpace, offset: u64, value: u8) -> Result<()> {
        self.write_memory(space, offset, DataWidth::W8, u64::from(value))
    }

    fn write_u16(&self, space: AddressSpace, offset: u64, value: u16) -> Result<()> {
        self.write_memory(space, offset, DataWidth::W16, u64::from(value))
    }

    fn write_u32(&self, space: AddressSpace, offset: u64, value: u32) -> Result<()> {
        self.write_memory(space, offset, DataWidth::W32, u64::from(value))
    }

    fn write_u64(&self, space: AddressSpace, offset: u64, value: u64) -> Result<()> {
        self.write_memory(space, offset, DataWidth::W64, value)
    }

    /// Block transfer from device memory.
    fn move_in(
        &self,
        space: AddressSpace,
        offset: u64,
        length: u64,
        width: DataWidth,
    ) -> Result<Vec<u64>> {
        self.core().with_session(|backend, session| {
            backend.move_in(session, space as u16, offset, length, width)
        })
    }

    /// Block transfer into device memory.
    fn move_out(
        &self,
        space: AddressSpace,
        offset: u64,
        width: DataWidth,
        values: &[u64],
    ) -> Result<()> {
        self.core().with_session(|backend, session| {
            backend.move_out(session, space as u16, offset, width, values)
        })
    }

    /// Map a register window; the returned guard unmaps on every exit
    /// path.
    fn map_address(&self, space: AddressSpace, offset: u64, size: u64) -> Result<MappedWindow> {
        let address = self
            .core()
            .with_session(|backend, session| backend.map_address(session, space as u16, offset, size))?;
        Ok(MappedWindow {
            core: Arc::clone(self.core()),
            address,
            size,
        })
    }
}

define_resource! {
    /// Memory-access resource (`PXI<board>::MEMACC` / `VXI<board>::MEMACC`).
    RegisterResource
}

impl RegisterBased for RegisterResource {}

define_resource! {
    /// Chassis backplane (`PXI…::BACKPLANE` / `VXI…::BACKPLANE`): register
    /// access plus trigger control.
    BackplaneResource
}

impl RegisterBased for BackplaneResource {}

impl BackplaneResource {
    /// Assert a backplane trigger line using the given protocol value.
    pub fn assert_trigger(&self, protocol: u16) -> Result<()> {
        self.core()
            .with_session(|backend, session| backend.assert_trigger(session, protocol))
    }
}
