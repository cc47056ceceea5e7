//! `extern "C"` entry points a SANE frontend dlopens this backend for.
//!
//! Handles are never raw pointers into driver state: each is an opaque
//! integer key into a process-wide registry, cast to `SANE_Handle`'s
//! `*mut c_void` shape only so it round-trips through the C ABI. This
//! sidesteps the cyclic handle/device reference that a `Box::into_raw`
//! scheme would otherwise create, at the cost of one `HashMap` lookup per
//! call — acceptable next to a USB round trip.

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::Mutex;

use once_cell::sync::Lazy;

use genesys_tables::{lookup_model, Model};

use crate::config::{parse_config, UsbAttach};
use crate::error::GenesysError;
use crate::interface::ScannerInterface;
use crate::lifecycle::Scanner;

use super::options::{self, OptionTable, OptionValue};
use super::params::parameters_for_session;

pub type SaneHandle = *mut c_void;
pub type SaneStatus = i32;

pub const SANE_STATUS_GOOD: SaneStatus = 0;
pub const SANE_STATUS_UNSUPPORTED: SaneStatus = 1;
pub const SANE_STATUS_CANCELLED: SaneStatus = 2;
pub const SANE_STATUS_DEVICE_BUSY: SaneStatus = 3;
pub const SANE_STATUS_INVAL: SaneStatus = 4;
pub const SANE_STATUS_EOF: SaneStatus = 5;
pub const SANE_STATUS_JAMMED: SaneStatus = 6;
pub const SANE_STATUS_NO_DOCS: SaneStatus = 7;
pub const SANE_STATUS_COVER_OPEN: SaneStatus = 8;
pub const SANE_STATUS_IO_ERROR: SaneStatus = 9;
pub const SANE_STATUS_NO_MEM: SaneStatus = 10;
pub const SANE_STATUS_ACCESS_DENIED: SaneStatus = 11;

/// `SANE_Action`.
const SANE_ACTION_GET_VALUE: i32 = 0;
const SANE_ACTION_SET_VALUE: i32 = 1;
const SANE_ACTION_SET_AUTO: i32 = 2;

fn status_from_name(name: &str) -> SaneStatus {
    match name {
        "SANE_STATUS_GOOD" => SANE_STATUS_GOOD,
        "SANE_STATUS_UNSUPPORTED" => SANE_STATUS_UNSUPPORTED,
        "SANE_STATUS_CANCELLED" => SANE_STATUS_CANCELLED,
        "SANE_STATUS_DEVICE_BUSY" => SANE_STATUS_DEVICE_BUSY,
        "SANE_STATUS_INVAL" => SANE_STATUS_INVAL,
        "SANE_STATUS_EOF" => SANE_STATUS_EOF,
        "SANE_STATUS_JAMMED" => SANE_STATUS_JAMMED,
        "SANE_STATUS_NO_DOCS" => SANE_STATUS_NO_DOCS,
        "SANE_STATUS_IO_ERROR" => SANE_STATUS_IO_ERROR,
        "SANE_STATUS_NO_MEM" => SANE_STATUS_NO_MEM,
        _ => SANE_STATUS_IO_ERROR,
    }
}

fn status_of(err: &GenesysError) -> SaneStatus {
    status_from_name(err.sane_status())
}

#[cfg(feature = "hardware")]
fn open_interface(model: &'static Model) -> crate::error::Result<Box<dyn ScannerInterface>> {
    let iface = crate::interface::UsbInterface::open(model.vendor_id, model.product_id, model.asic.bulk_write_max())?;
    Ok(Box::new(iface))
}

#[cfg(not(feature = "hardware"))]
fn open_interface(_model: &'static Model) -> crate::error::Result<Box<dyn ScannerInterface>> {
    Err(GenesysError::Unsupported("built without hardware support"))
}

struct HandleState {
    scanner: Scanner,
    iface: Box<dyn ScannerInterface>,
    model: &'static Model,
    options: OptionTable,
}

struct Registry {
    next_id: i32,
    handles: HashMap<i32, HandleState>,
    attaches: Vec<UsbAttach>,
    devices_built: bool,
    device_records: Vec<DeviceRecord>,
}

/// A leaked, process-lifetime-static `SANE_Device` plus the C strings it
/// points into, kept alive for as long as the backend is loaded.
struct DeviceRecord {
    sane_device: &'static CSaneDevice,
}

#[repr(C)]
pub struct CSaneDevice {
    name: *const c_char,
    vendor: *const c_char,
    model: *const c_char,
    kind: *const c_char,
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| {
    Mutex::new(Registry {
        next_id: 1,
        handles: HashMap::new(),
        attaches: Vec::new(),
        devices_built: false,
        device_records: Vec::new(),
    })
});

fn config_path() -> std::path::PathBuf {
    if let Ok(dir) = std::env::var("SANE_CONFIG_DIR") {
        return std::path::PathBuf::from(dir).join("genesys.conf");
    }
    std::path::PathBuf::from("/etc/sane.d/genesys.conf")
}

fn device_name(vendor_id: u16, product_id: u16) -> String {
    format!("{:04x}:{:04x}", vendor_id, product_id)
}

fn leak_cstring(s: &str) -> *const c_char {
    let c = CString::new(s).unwrap_or_else(|_| CString::new("?").unwrap());
    Box::leak(c.into_boxed_c_str()).as_ptr()
}

fn build_device_records(attaches: &[UsbAttach]) -> Vec<DeviceRecord> {
    let mut records = Vec::new();
    for attach in attaches {
        let Some(model) = lookup_model(attach.vendor_id, attach.product_id) else {
            log::warn!(
                "genesys.conf names unknown device {:04x}:{:04x}, skipping",
                attach.vendor_id,
                attach.product_id
            );
            continue;
        };
        let kind = if model.is_sheetfed { "sheetfed scanner" } else { "flatbed scanner" };
        let record = Box::leak(Box::new(CSaneDevice {
            name: leak_cstring(&device_name(model.vendor_id, model.product_id)),
            vendor: leak_cstring("Genesys Logic"),
            model: leak_cstring(model.name),
            kind: leak_cstring(kind),
        }));
        records.push(DeviceRecord { sane_device: record });
    }
    records
}

/// `sane_init`: loads `genesys.conf` (via `$SANE_CONFIG_DIR` or the
/// standard system path) and resets the device registry. Never fails —
/// a missing or empty config file just means no devices are advertised
/// until one is added.
#[no_mangle]
pub extern "C" fn sane_init(version_code: *mut i32, _authorize: *const c_void) -> SaneStatus {
    if !version_code.is_null() {
        // SANE_VERSION_CODE(1, 0, 0)
        unsafe { *version_code = (1 << 24) | (0 << 16) | 0 };
    }
    let contents = std::fs::read_to_string(config_path()).unwrap_or_else(|err| {
        log::warn!("could not read genesys.conf: {err}");
        String::new()
    });
    let attaches = parse_config(&contents);
    let mut registry = REGISTRY.lock().unwrap();
    registry.attaches = attaches;
    registry.devices_built = false;
    registry.device_records.clear();
    SANE_STATUS_GOOD
}

/// `sane_exit`: closes any handle the frontend forgot to close.
#[no_mangle]
pub extern "C" fn sane_exit() {
    let mut registry = REGISTRY.lock().unwrap();
    for (_, mut state) in registry.handles.drain() {
        let _ = state.scanner.close(state.iface.as_mut());
    }
    registry.attaches.clear();
    registry.devices_built = false;
    registry.device_records.clear();
}

/// `sane_get_devices`: builds the device list from the configured attach
/// entries the first time it's called after `sane_init`, then hands back
/// a cached, null-terminated array of leaked `SANE_Device*`.
#[no_mangle]
pub extern "C" fn sane_get_devices(device_list: *mut *mut *const CSaneDevice, _local_only: i32) -> SaneStatus {
    let mut registry = REGISTRY.lock().unwrap();
    if !registry.devices_built {
        registry.device_records = build_device_records(&registry.attaches.clone());
        registry.devices_built = true;
    }
    let mut pointers: Vec<*const CSaneDevice> = registry
        .device_records
        .iter()
        .map(|r| r.sane_device as *const CSaneDevice)
        .collect();
    pointers.push(std::ptr::null());
    let leaked = Box::leak(pointers.into_boxed_slice());
    if !device_list.is_null() {
        unsafe { *device_list = leaked.as_mut_ptr() };
    }
    SANE_STATUS_GOOD
}

fn resolve_attach(registry: &Registry, name: &str) -> Option<&'static Model> {
    if name.is_empty() {
        return registry.attaches.first().and_then(|a| lookup_model(a.vendor_id, a.product_id));
    }
    let (vendor_str, product_str) = name.split_once(':')?;
    let vendor_id = u16::from_str_radix(vendor_str, 16).ok()?;
    let product_id = u16::from_str_radix(product_str, 16).ok()?;
    lookup_model(vendor_id, product_id)
}

/// `sane_open`: an empty name picks the first configured device.
#[no_mangle]
pub extern "C" fn sane_open(devicename: *const c_char, handle: *mut SaneHandle) -> SaneStatus {
    let name = if devicename.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(devicename) }.to_string_lossy().into_owned()
    };

    let mut registry = REGISTRY.lock().unwrap();
    let Some(model) = resolve_attach(&registry, &name) else {
        return SANE_STATUS_INVAL;
    };

    let mut iface = match open_interface(model) {
        Ok(iface) => iface,
        Err(err) => return status_of(&err),
    };
    let cache_path = crate::config::cache_dir().join(format!("{:04x}-{:04x}.cal", model.vendor_id, model.product_id));
    let scanner = match Scanner::open(iface.as_mut(), model, cache_path) {
        Ok(scanner) => scanner,
        Err(err) => return status_of(&err),
    };

    let id = registry.next_id;
    registry.next_id += 1;
    registry.handles.insert(
        id,
        HandleState {
            scanner,
            iface,
            model,
            options: OptionTable::for_model(model),
        },
    );

    if !handle.is_null() {
        unsafe { *handle = id as SaneHandle };
    }
    SANE_STATUS_GOOD
}

fn handle_id(handle: SaneHandle) -> i32 {
    handle as i32
}

/// `sane_close`.
#[no_mangle]
pub extern "C" fn sane_close(handle: SaneHandle) {
    let mut registry = REGISTRY.lock().unwrap();
    if let Some(mut state) = registry.handles.remove(&handle_id(handle)) {
        let _ = state.scanner.close(state.iface.as_mut());
    }
}

/// `sane_get_option_descriptor`.
#[no_mangle]
pub extern "C" fn sane_get_option_descriptor(_handle: SaneHandle, n: i32) -> *const c_void {
    static DESCRIPTORS: Lazy<Vec<Box<CSaneOptionDescriptor>>> = Lazy::new(build_c_descriptors);
    if n < 0 {
        return std::ptr::null();
    }
    match DESCRIPTORS.get(n as usize) {
        Some(boxed) => boxed.as_ref() as *const CSaneOptionDescriptor as *const c_void,
        None => std::ptr::null(),
    }
}

#[repr(C)]
struct CSaneOptionDescriptor {
    name: *const c_char,
    title: *const c_char,
    desc: *const c_char,
    option_type: i32,
    unit: i32,
    size: i32,
    cap: i32,
    constraint_type: i32,
}

fn option_type_code(t: options::OptionType) -> i32 {
    match t {
        options::OptionType::Bool => 0,
        options::OptionType::Int => 1,
        options::OptionType::Fixed => 2,
        options::OptionType::String => 3,
        options::OptionType::Button => 4,
        options::OptionType::Group => 5,
    }
}

fn option_unit_code(u: options::OptionUnit) -> i32 {
    match u {
        options::OptionUnit::None => 0,
        options::OptionUnit::Pixel => 1,
        options::OptionUnit::Bit => 2,
        options::OptionUnit::Mm => 3,
        options::OptionUnit::Dpi => 4,
        options::OptionUnit::Percent => 5,
        options::OptionUnit::Microsecond => 6,
    }
}

fn constraint_type_code(c: &options::OptionConstraint) -> i32 {
    match c {
        options::OptionConstraint::None => 0,
        options::OptionConstraint::IntRange { .. } => 1,
        options::OptionConstraint::WordList(_) => 2,
        options::OptionConstraint::StringList(_) => 3,
    }
}

fn build_c_descriptors() -> Vec<Box<CSaneOptionDescriptor>> {
    options::OPTION_DESCRIPTORS
        .iter()
        .map(|d| {
            Box::new(CSaneOptionDescriptor {
                name: leak_cstring(d.name),
                title: leak_cstring(d.title),
                desc: leak_cstring(d.desc),
                option_type: option_type_code(d.option_type),
                unit: option_unit_code(d.unit),
                size: d.size as i32,
                cap: d.cap.0 as i32,
                constraint_type: constraint_type_code(&d.constraint),
            })
        })
        .collect()
}

/// `sane_control_option`. `value` points at a `SANE_Word` for
/// Bool/Int/Fixed, a caller-allocated byte buffer of at least the
/// descriptor's `size` for String, or is ignored for Button/Group.
#[no_mangle]
pub extern "C" fn sane_control_option(
    handle: SaneHandle,
    n: i32,
    action: i32,
    value: *mut c_void,
    info: *mut i32,
) -> SaneStatus {
    let mut registry = REGISTRY.lock().unwrap();
    let Some(state) = registry.handles.get_mut(&handle_id(handle)) else {
        return SANE_STATUS_INVAL;
    };
    let Some(descriptor) = options::descriptor(n as usize) else {
        return SANE_STATUS_INVAL;
    };
    if descriptor.option_type == options::OptionType::Group {
        return SANE_STATUS_INVAL;
    }

    match action {
        SANE_ACTION_GET_VALUE => get_option_value(state, descriptor, value),
        SANE_ACTION_SET_VALUE => set_option_value(state, descriptor, value, info),
        SANE_ACTION_SET_AUTO => SANE_STATUS_UNSUPPORTED,
        _ => SANE_STATUS_INVAL,
    }
}

fn get_option_value(state: &mut HandleState, descriptor: &options::OptionDescriptor, value: *mut c_void) -> SaneStatus {
    if value.is_null() {
        return SANE_STATUS_INVAL;
    }
    if descriptor.option_type == options::OptionType::Button {
        return SANE_STATUS_UNSUPPORTED;
    }
    if let Some(pressed) = buttons_group_value(state, descriptor.name) {
        unsafe { *(value as *mut i32) = pressed as i32 };
        return SANE_STATUS_GOOD;
    }
    let Some(v) = state.options.get(descriptor.name) else {
        return SANE_STATUS_INVAL;
    };
    write_option_value(v, descriptor, value);
    SANE_STATUS_GOOD
}

fn set_option_value(state: &mut HandleState, descriptor: &options::OptionDescriptor, value: *mut c_void, info: *mut i32) -> SaneStatus {
    if descriptor.option_type == options::OptionType::Button {
        let session = state.scanner.device().session.clone();
        let applied = options::apply_button(
            descriptor.name,
            &mut state.options,
            &mut state.scanner.device_mut().cache,
            session.as_ref(),
        );
        return if applied { SANE_STATUS_GOOD } else { SANE_STATUS_INVAL };
    }
    if value.is_null() {
        return SANE_STATUS_INVAL;
    }
    let parsed = match read_option_value(descriptor, value) {
        Some(v) => v,
        None => return SANE_STATUS_INVAL,
    };
    let Some(set_info) = state.options.set(descriptor.name, parsed) else {
        return SANE_STATUS_INVAL;
    };
    if !info.is_null() {
        unsafe { *info = set_info.0 as i32 };
    }
    SANE_STATUS_GOOD
}

fn buttons_group_value(state: &mut HandleState, name: &str) -> Option<bool> {
    let (buttons_mask, cache_empty) = {
        let device = state.scanner.device();
        let cache_empty = match &device.session {
            Some(session) => !device.cache.iter().any(|e| e.matches(session)),
            None => device.cache.is_empty(),
        };
        (device.buttons_mask, cache_empty)
    };
    let hardware = state.scanner.poll_sensors(state.iface.as_mut()).unwrap_or_default();
    options::sensor_value(name, buttons_mask, hardware, cache_empty)
}

fn write_option_value(v: OptionValue, descriptor: &options::OptionDescriptor, value: *mut c_void) {
    match v {
        OptionValue::Bool(b) => unsafe { *(value as *mut i32) = b as i32 },
        OptionValue::Int(n) => unsafe { *(value as *mut i32) = n },
        OptionValue::Fixed(f) => unsafe { *(value as *mut i32) = (f * 65536.0) as i32 },
        OptionValue::String(s) => unsafe {
            let bytes = s.as_bytes();
            let cap = descriptor.size.saturating_sub(1);
            let n = bytes.len().min(cap);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), value as *mut u8, n);
            *(value as *mut u8).add(n) = 0;
        },
        OptionValue::Unit => {}
    }
}

fn read_option_value(descriptor: &options::OptionDescriptor, value: *mut c_void) -> Option<OptionValue> {
    match descriptor.option_type {
        options::OptionType::Bool => Some(OptionValue::Bool(unsafe { *(value as *const i32) } != 0)),
        options::OptionType::Int => Some(OptionValue::Int(unsafe { *(value as *const i32) })),
        options::OptionType::Fixed => Some(OptionValue::Fixed(unsafe { *(value as *const i32) } as f64 / 65536.0)),
        options::OptionType::String => {
            let cstr = unsafe { CStr::from_ptr(value as *const c_char) };
            Some(OptionValue::String(cstr.to_string_lossy().into_owned()))
        }
        options::OptionType::Button | options::OptionType::Group => None,
    }
}

#[repr(C)]
pub struct CSaneParameters {
    format: i32,
    last_frame: i32,
    bytes_per_line: i32,
    pixels_per_line: i32,
    lines: i32,
    depth: i32,
}

fn frame_code(f: super::params::Frame) -> i32 {
    match f {
        super::params::Frame::Gray => 0,
        super::params::Frame::Rgb => 1,
        super::params::Frame::Red => 2,
        super::params::Frame::Green => 3,
        super::params::Frame::Blue => 4,
    }
}

/// `sane_get_parameters`.
#[no_mangle]
pub extern "C" fn sane_get_parameters(handle: SaneHandle, params: *mut CSaneParameters) -> SaneStatus {
    let mut registry = REGISTRY.lock().unwrap();
    let Some(state) = registry.handles.get_mut(&handle_id(handle)) else {
        return SANE_STATUS_INVAL;
    };
    let settings = state.options.to_settings();
    let device = state.scanner.device();
    let geometry = device.geometry(settings.scan_method);
    let session = crate::planner::plan(&settings, device.sensor, device.motor, device.asic, geometry);
    let is_sheetfed = device.is_sheetfed();
    let parameters = parameters_for_session(&session, is_sheetfed);
    if !params.is_null() {
        unsafe {
            *params = CSaneParameters {
                format: frame_code(parameters.format),
                last_frame: parameters.last_frame as i32,
                bytes_per_line: parameters.bytes_per_line as i32,
                pixels_per_line: parameters.pixels_per_line as i32,
                lines: parameters.lines,
                depth: parameters.depth as i32,
            };
        }
    }
    SANE_STATUS_GOOD
}

/// `sane_start`.
#[no_mangle]
pub extern "C" fn sane_start(handle: SaneHandle) -> SaneStatus {
    let mut registry = REGISTRY.lock().unwrap();
    let Some(state) = registry.handles.get_mut(&handle_id(handle)) else {
        return SANE_STATUS_INVAL;
    };
    let settings = state.options.to_settings();
    let expiration = if state.options.force_calibration {
        state.options.force_calibration = false;
        crate::calibration::ExpirationPolicy(0)
    } else {
        state.options.expiration_policy()
    };
    let now_minutes = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() / 60)
        .unwrap_or(0);
    let timestamp = now_minutes * 60;
    match state
        .scanner
        .start(state.iface.as_mut(), &settings, expiration, now_minutes, timestamp)
    {
        Ok(_) => SANE_STATUS_GOOD,
        Err(err) => status_of(&err),
    }
}

/// `sane_read`.
#[no_mangle]
pub extern "C" fn sane_read(handle: SaneHandle, data: *mut u8, max_length: i32, length: *mut i32) -> SaneStatus {
    if !length.is_null() {
        unsafe { *length = 0 };
    }
    if data.is_null() || max_length < 0 {
        return SANE_STATUS_INVAL;
    }
    let mut registry = REGISTRY.lock().unwrap();
    let Some(state) = registry.handles.get_mut(&handle_id(handle)) else {
        return SANE_STATUS_INVAL;
    };
    let out = unsafe { std::slice::from_raw_parts_mut(data, max_length as usize) };
    match state.scanner.read(state.iface.as_mut(), out) {
        Ok(n) => {
            if !length.is_null() {
                unsafe { *length = n as i32 };
            }
            if n == 0 {
                SANE_STATUS_EOF
            } else {
                SANE_STATUS_GOOD
            }
        }
        Err(err) => status_of(&err),
    }
}

/// `sane_cancel`.
#[no_mangle]
pub extern "C" fn sane_cancel(handle: SaneHandle) {
    let mut registry = REGISTRY.lock().unwrap();
    if let Some(state) = registry.handles.get_mut(&handle_id(handle)) {
        let _ = state.scanner.cancel(state.iface.as_mut());
    }
}

/// `sane_set_io_mode`: non-blocking I/O is not implemented.
#[no_mangle]
pub extern "C" fn sane_set_io_mode(_handle: SaneHandle, non_blocking: i32) -> SaneStatus {
    if non_blocking != 0 {
        SANE_STATUS_UNSUPPORTED
    } else {
        SANE_STATUS_GOOD
    }
}

/// `sane_get_select_fd`: no pollable descriptor exists for this backend's
/// synchronous bulk-transfer model.
#[no_mangle]
pub extern "C" fn sane_get_select_fd(_handle: SaneHandle, _fd: *mut i32) -> SaneStatus {
    SANE_STATUS_UNSUPPORTED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_error_names() {
        assert_eq!(status_from_name("SANE_STATUS_GOOD"), SANE_STATUS_GOOD);
        assert_eq!(status_from_name("SANE_STATUS_CANCELLED"), SANE_STATUS_CANCELLED);
        assert_eq!(status_from_name("SANE_STATUS_EOF"), SANE_STATUS_EOF);
        assert_eq!(status_from_name("unknown"), SANE_STATUS_IO_ERROR);
    }

    #[test]
    fn device_name_formats_as_hex_pair() {
        assert_eq!(device_name(0x04a9, 0x190e), "04a9:190e");
    }

    #[test]
    fn resolve_attach_picks_first_configured_device_for_empty_name() {
        let registry = Registry {
            next_id: 1,
            handles: HashMap::new(),
            attaches: vec![UsbAttach {
                vendor_id: 0x04a9,
                product_id: 0x190e,
            }],
            devices_built: false,
            device_records: Vec::new(),
        };
        let model = resolve_attach(&registry, "").unwrap();
        assert_eq!(model.vendor_id, 0x04a9);
    }

    #[test]
    fn resolve_attach_parses_explicit_name() {
        let registry = Registry {
            next_id: 1,
            handles: HashMap::new(),
            attaches: Vec::new(),
            devices_built: false,
            device_records: Vec::new(),
        };
        let model = resolve_attach(&registry, "04a9:190e").unwrap();
        assert_eq!(model.product_id, 0x190e);
    }
}
