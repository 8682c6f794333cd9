//! C ABI types and the resolved symbol table of a foreign VISA library
//!
//! The contract is the 64-bit VISA ABI: attribute states, bus addresses
//! and sizes are 64-bit regardless of host word size. Function pointers
//! are copied out of the loaded library; the owning [`libloading::Library`]
//! must outlive them, which the cache in the parent module guarantees.

use std::os::raw::{c_char, c_void};

pub type ViStatus = i32;
pub type ViObject = u32;
pub type ViSession = ViObject;
pub type ViFindList = ViObject;
pub type ViEvent = ViObject;
pub type ViAttr = u32;
pub type ViAttrState = u64;
pub type ViEventType = u32;
pub type ViEventFilter = u32;
pub type ViAccessMode = u32;
pub type ViBusAddress = u64;
pub type ViBusSize = u64;

/// Response buffer size for string-valued calls (resource names, access
/// keys, status descriptions).
pub const RESPONSE_BUF: usize = 256;

/// C signature of an installed event handler.
pub type ViHndlr =
    unsafe extern "system" fn(ViSession, ViEventType, ViEvent, *mut c_void) -> ViStatus;

pub type ViOpenDefaultRmFn = unsafe extern "system" fn(*mut ViSession) -> ViStatus;
pub type ViOpenFn = unsafe extern "system" fn(
    ViSession,
    *const c_char,
    ViAccessMode,
    u32,
    *mut ViSession,
) -> ViStatus;
pub type ViCloseFn = unsafe extern "system" fn(ViObject) -> ViStatus;
pub type ViFindRsrcFn = unsafe extern "system" fn(
    ViSession,
    *const c_char,
    *mut ViFindList,
    *mut u32,
    *mut c_char,
) -> ViStatus;
pub type ViFindNextFn = unsafe extern "system" fn(ViFindList, *mut c_char) -> ViStatus;
pub type ViReadFn = unsafe extern "system" fn(ViSession, *mut u8, u32, *mut u32) -> ViStatus;
pub type ViWriteFn = unsafe extern "system" fn(ViSession, *const u8, u32, *mut u32) -> ViStatus;
pub type ViGetAttributeFn = unsafe extern "system" fn(ViObject, ViAttr, *mut c_void) -> ViStatus;
pub type ViSetAttributeFn = unsafe extern "system" fn(ViObject, ViAttr, ViAttrState) -> ViStatus;
pub type ViLockFn = unsafe extern "system" fn(
    ViSession,
    ViAccessMode,
    u32,
    *const c_char,
    *mut c_char,
) -> ViStatus;
pub type ViUnlockFn = unsafe extern "system" fn(ViSession) -> ViStatus;
pub type ViEnableEventFn =
    unsafe extern "system" fn(ViSession, ViEventType, u16, ViEventFilter) -> ViStatus;
pub type ViDisableEventFn = unsafe extern "system" fn(ViSession, ViEventType, u16) -> ViStatus;
pub type ViDiscardEventsFn = unsafe extern "system" fn(ViSession, ViEventType, u16) -> ViStatus;
pub type ViWaitOnEventFn = unsafe extern "system" fn(
    ViSession,
    ViEventType,
    u32,
    *mut ViEventType,
    *mut ViEvent,
) -> ViStatus;
pub type ViInstallHandlerFn =
    unsafe extern "system" fn(ViSession, ViEventType, ViHndlr, *mut c_void) -> ViStatus;
pub type ViUninstallHandlerFn =
    unsafe extern "system" fn(ViSession, ViEventType, ViHndlr, *mut c_void) -> ViStatus;
pub type ViClearFn = unsafe extern "system" fn(ViSession) -> ViStatus;
pub type ViReadStbFn = unsafe extern "system" fn(ViSession, *mut u16) -> ViStatus;
pub type ViAssertTriggerFn = unsafe extern "system" fn(ViSession, u16) -> ViStatus;
pub type ViGpibCommandFn =
    unsafe extern "system" fn(ViSession, *const u8, u32, *mut u32) -> ViStatus;
pub type ViGpibControlRenFn = unsafe extern "system" fn(ViSession, u16) -> ViStatus;
pub type ViGpibControlAtnFn = unsafe extern "system" fn(ViSession, u16) -> ViStatus;
pub type ViGpibSendIfcFn = unsafe extern "system" fn(ViSession) -> ViStatus;
pub type ViGpibPassControlFn = unsafe extern "system" fn(ViSession, u16, u16) -> ViStatus;
pub type ViFlushFn = unsafe extern "system" fn(ViSession, u16) -> ViStatus;
pub type ViUsbControlInFn = unsafe extern "system" fn(
    ViSession,
    i16,
    i16,
    u16,
    u16,
    u16,
    *mut u8,
    *mut u16,
) -> ViStatus;
pub type ViUsbControlOutFn =
    unsafe extern "system" fn(ViSession, i16, i16, u16, u16, u16, *const u8) -> ViStatus;
pub type ViIn8Fn = unsafe extern "system" fn(ViSession, u16, ViBusAddress, *mut u8) -> ViStatus;
pub type ViIn16Fn = unsafe extern "system" fn(ViSession, u16, ViBusAddress, *mut u16) -> ViStatus;
pub type ViIn32Fn = unsafe extern "system" fn(ViSession, u16, ViBusAddress, *mut u32) -> ViStatus;
pub type ViIn64Fn = unsafe extern "system" fn(ViSession, u16, ViBusAddress, *mut u64) -> ViStatus;
pub type ViOut8Fn = unsafe extern "system" fn(ViSession, u16, ViBusAddress, u8) -> ViStatus;
pub type ViOut16Fn = unsafe extern "system" fn(ViSession, u16, ViBusAddress, u16) -> ViStatus;
pub type ViOut32Fn = unsafe extern "system" fn(ViSession, u16, ViBusAddress, u32) -> ViStatus;
pub type ViOut64Fn = unsafe extern "system" fn(ViSession, u16, ViBusAddress, u64) -> ViStatus;
pub type ViMoveIn8Fn =
    unsafe extern "system" fn(ViSession, u16, ViBusAddress, ViBusSize, *mut u8) -> ViStatus;
pub type ViMoveIn16Fn =
    unsafe extern "system" fn(ViSession, u16, ViBusAddress, ViBusSize, *mut u16) -> ViStatus;
pub type ViMoveIn32Fn =
    unsafe extern "system" fn(ViSession, u16, ViBusAddress, ViBusSize, *mut u32) -> ViStatus;
pub type ViMoveIn64Fn =
    unsafe extern "system" fn(ViSession, u16, ViBusAddress, ViBusSize, *mut u64) -> ViStatus;
pub type ViMoveOut8Fn =
    unsafe extern "system" fn(ViSession, u16, ViBusAddress, ViBusSize, *const u8) -> ViStatus;
pub type ViMoveOut16Fn =
    unsafe extern "system" fn(ViSession, u16, ViBusAddress, ViBusSize, *const u16) -> ViStatus;
pub type ViMoveOut32Fn =
    unsafe extern "system" fn(ViSession, u16, ViBusAddress, ViBusSize, *const u32) -> ViStatus;
pub type ViMoveOut64Fn =
    unsafe extern "system" fn(ViSession, u16, ViBusAddress, ViBusSize, *const u64) -> ViStatus;
pub type ViMapAddressFn = unsafe extern "system" fn(
    ViSession,
    u16,
    ViBusAddress,
    ViBusSize,
    u16,
    *mut c_void,
    *mut *mut c_void,
) -> ViStatus;
pub type ViUnmapAddressFn = unsafe extern "system" fn(ViSession) -> ViStatus;
pub type ViStatusDescFn =
    unsafe extern "system" fn(ViObject, ViStatus, *mut c_char) -> ViStatus;

/// Function pointers resolved from one loaded VISA library.
///
/// Mandatory entry points fail the load when absent; bus-specific helpers
/// are optional and surface as `Unsupported` when a library omits them.
#[derive(Debug)]
pub struct SymbolTable {
    pub vi_open_default_rm: ViOpenDefaultRmFn,
    pub vi_open: ViOpenFn,
    pub vi_close: ViCloseFn,
    pub vi_find_rsrc: ViFindRsrcFn,
    pub vi_find_next: ViFindNextFn,
    pub vi_read: ViReadFn,
    pub vi_write: ViWriteFn,
    pub vi_get_attribute: ViGetAttributeFn,
    pub vi_set_attribute: ViSetAttributeFn,
    pub vi_lock: ViLockFn,
    pub vi_unlock: ViUnlockFn,
    pub vi_enable_event: ViEnableEventFn,
    pub vi_disable_event: ViDisableEventFn,
    pub vi_discard_events: ViDiscardEventsFn,
    pub vi_wait_on_event: ViWaitOnEventFn,
    pub vi_install_handler: ViInstallHandlerFn,
    pub vi_uninstall_handler: ViUninstallHandlerFn,
    pub vi_clear: ViClearFn,
    pub vi_read_stb: ViReadStbFn,
    pub vi_assert_trigger: ViAssertTriggerFn,
    pub vi_flush: ViFlushFn,
    pub vi_status_desc: Option<ViStatusDescFn>,
    pub vi_gpib_command: Option<ViGpibCommandFn>,
    pub vi_gpib_control_ren: Option<ViGpibControlRenFn>,
    pub vi_gpib_control_atn: Option<ViGpibControlAtnFn>,
    pub vi_gpib_send_ifc: Option<ViGpibSendIfcFn>,
    pub vi_gpib_pass_control: Option<ViGpibPassControlFn>,
    pub vi_usb_control_in: Option<ViUsbControlInFn>,
    pub vi_usb_control_out: Option<ViUsbControlOutFn>,
    pub vi_in8: Option<ViIn8Fn>,
    pub vi_in16: Option<ViIn16Fn>,
    pub vi_in32: Option<ViIn32Fn>,
    pub vi_in64: Option<ViIn64Fn>,
    pub vi_out8: Option<ViOut8Fn>,
    pub vi_out16: Option<ViOut16Fn>,
    pub vi_out32: Option<ViOut32Fn>,
    pub vi_out64: Option<ViOut64Fn>,
    pub vi_move_in8: Option<ViMoveIn8Fn>,
    pub vi_move_in16: Option<ViMoveIn16Fn>,
    pub vi_move_in32: Option<ViMoveIn32Fn>,
    pub vi_move_in64: Option<ViMoveIn64Fn>,
    pub vi_move_out8: Option<ViMoveOut8Fn>,
    pub vi_move_out16: Option<ViMoveOut16Fn>,
    pub vi_move_out32: Option<ViMoveOut32Fn>,
    pub vi_move_out64: Option<ViMoveOut64Fn>,
    pub vi_map_address: Option<ViMapAddressFn>,
    pub vi_unmap_address: Option<ViUnmapAddressFn>,
}
