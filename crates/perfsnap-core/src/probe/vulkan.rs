//! Vulkan loader binding used to detect the GPU.
//!
//! The loader is opened at runtime with `libloading` so the binary has no
//! link-time dependency on a graphics stack. Only the handful of entry points
//! needed to read device properties and heap sizes are bound; raw pointers
//! never leave this module.

use std::ffi::{CStr, c_char, c_void};
use std::mem;
use std::ptr;

use libloading::Library;
use tracing::{debug, info};

use super::{CapabilityProvider, GpuMemory, GpuMemoryQuery, GpuProperties, ProbeError, ProbedDevice};

/// Loader library names tried in order.
pub const DEFAULT_CANDIDATES: &[&str] = &[
    "libvulkan.so",
    "libvulkan.so.1",
    "/system/lib64/libvulkan.so",
    "/vendor/lib64/libvulkan.so",
    "/system/lib/libvulkan.so",
    "/vendor/lib/libvulkan.so",
];

// ---------------------------------------------------------------------------
// Raw ABI
// ---------------------------------------------------------------------------

type VkInstance = *mut c_void;
type VkPhysicalDevice = *mut c_void;
type VkResult = i32;

const VK_SUCCESS: VkResult = 0;
const VK_API_VERSION_1_0: u32 = 1 << 22;
const VK_STRUCTURE_TYPE_APPLICATION_INFO: i32 = 0;
const VK_STRUCTURE_TYPE_INSTANCE_CREATE_INFO: i32 = 1;
const VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_MEMORY_PROPERTIES_2: i32 = 1_000_059_006;
const VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_MEMORY_BUDGET_PROPERTIES_EXT: i32 = 1_000_237_000;
const VK_MEMORY_HEAP_DEVICE_LOCAL_BIT: u32 = 0x1;
const VK_MAX_MEMORY_TYPES: usize = 32;
const VK_MAX_MEMORY_HEAPS: usize = 16;
const VK_EXT_MEMORY_BUDGET: &[u8] = b"VK_EXT_memory_budget";

#[repr(C)]
#[allow(dead_code)] // ABI structs: most fields are only touched by the driver
struct VkApplicationInfo {
    s_type: i32,
    p_next: *const c_void,
    p_application_name: *const c_char,
    application_version: u32,
    p_engine_name: *const c_char,
    engine_version: u32,
    api_version: u32,
}

#[repr(C)]
#[allow(dead_code)]
struct VkInstanceCreateInfo {
    s_type: i32,
    p_next: *const c_void,
    flags: u32,
    p_application_info: *const VkApplicationInfo,
    enabled_layer_count: u32,
    pp_enabled_layer_names: *const *const c_char,
    enabled_extension_count: u32,
    pp_enabled_extension_names: *const *const c_char,
}

#[repr(C)]
#[allow(dead_code)]
struct VkPhysicalDeviceProperties {
    api_version: u32,
    driver_version: u32,
    vendor_id: u32,
    device_id: u32,
    device_type: i32,
    device_name: [c_char; 256],
    pipeline_cache_uuid: [u8; 16],
    // VkPhysicalDeviceLimits and VkPhysicalDeviceSparseProperties, never read.
    // Oversized so any driver's layout fits.
    _tail: [u64; 128],
}

#[repr(C)]
#[allow(dead_code)]
#[derive(Clone, Copy)]
struct VkMemoryType {
    property_flags: u32,
    heap_index: u32,
}

#[repr(C)]
#[allow(dead_code)]
#[derive(Clone, Copy)]
struct VkMemoryHeap {
    size: u64,
    flags: u32,
}

#[repr(C)]
#[allow(dead_code)]
struct VkPhysicalDeviceMemoryProperties {
    memory_type_count: u32,
    memory_types: [VkMemoryType; VK_MAX_MEMORY_TYPES],
    memory_heap_count: u32,
    memory_heaps: [VkMemoryHeap; VK_MAX_MEMORY_HEAPS],
}

#[repr(C)]
#[allow(dead_code)]
struct VkPhysicalDeviceMemoryProperties2 {
    s_type: i32,
    p_next: *mut c_void,
    memory_properties: VkPhysicalDeviceMemoryProperties,
}

#[repr(C)]
#[allow(dead_code)]
struct VkPhysicalDeviceMemoryBudgetPropertiesEXT {
    s_type: i32,
    p_next: *mut c_void,
    heap_budget: [u64; VK_MAX_MEMORY_HEAPS],
    heap_usage: [u64; VK_MAX_MEMORY_HEAPS],
}

#[repr(C)]
#[allow(dead_code)]
struct VkExtensionProperties {
    extension_name: [c_char; 256],
    spec_version: u32,
}

type VoidFunction = unsafe extern "system" fn();
type GetInstanceProcAddr = unsafe extern "system" fn(VkInstance, *const c_char) -> Option<VoidFunction>;
type EnumerateInstanceVersion = unsafe extern "system" fn(*mut u32) -> VkResult;
type CreateInstance =
    unsafe extern "system" fn(*const VkInstanceCreateInfo, *const c_void, *mut VkInstance) -> VkResult;
type DestroyInstance = unsafe extern "system" fn(VkInstance, *const c_void);
type EnumeratePhysicalDevices = unsafe extern "system" fn(VkInstance, *mut u32, *mut VkPhysicalDevice) -> VkResult;
type GetPhysicalDeviceProperties = unsafe extern "system" fn(VkPhysicalDevice, *mut VkPhysicalDeviceProperties);
type EnumerateDeviceExtensionProperties =
    unsafe extern "system" fn(VkPhysicalDevice, *const c_char, *mut u32, *mut VkExtensionProperties) -> VkResult;
type GetPhysicalDeviceMemoryProperties =
    unsafe extern "system" fn(VkPhysicalDevice, *mut VkPhysicalDeviceMemoryProperties);
type GetPhysicalDeviceMemoryProperties2 =
    unsafe extern "system" fn(VkPhysicalDevice, *mut VkPhysicalDeviceMemoryProperties2);

/// Resolves an entry point through `vkGetInstanceProcAddr`.
///
/// # Safety
/// `T` must be the function pointer type matching `name`'s Vulkan signature.
unsafe fn resolve<T: Copy>(gpa: GetInstanceProcAddr, instance: VkInstance, name: &CStr) -> Option<T> {
    debug_assert_eq!(mem::size_of::<T>(), mem::size_of::<VoidFunction>());
    // SAFETY: gpa is a valid loader entry point and name is NUL-terminated.
    let f = unsafe { gpa(instance, name.as_ptr()) }?;
    // SAFETY: the caller guarantees T is the matching function pointer type.
    Some(unsafe { mem::transmute_copy::<VoidFunction, T>(&f) })
}

fn required<T>(f: Option<T>, name: &str) -> Result<T, ProbeError> {
    f.ok_or_else(|| ProbeError::MissingEntryPoint(name.to_string()))
}

fn c_string_field(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Owns the loader library and one instance, destroyed on drop.
struct VulkanBackend {
    instance: VkInstance,
    physical_device: VkPhysicalDevice,
    destroy_instance: DestroyInstance,
    get_memory_properties: GetPhysicalDeviceMemoryProperties,
    get_memory_properties2: Option<GetPhysicalDeviceMemoryProperties2>,
    has_budget: bool,
    // Declared last: dropped after the instance is destroyed.
    _library: Library,
}

// SAFETY: the instance and physical device handles are only used for
// property queries, which Vulkan allows from any thread without external
// synchronization. Destruction happens once, in Drop, with exclusive access.
unsafe impl Send for VulkanBackend {}
unsafe impl Sync for VulkanBackend {}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        // SAFETY: instance was created by this backend and is destroyed once.
        unsafe { (self.destroy_instance)(self.instance, ptr::null()) };
    }
}

fn open_loader(candidates: &[String]) -> Result<Library, ProbeError> {
    let mut last_error = String::from("no candidates");
    for candidate in candidates {
        // SAFETY: the Vulkan loader has no unsound initialization routines.
        match unsafe { Library::new(candidate) } {
            Ok(lib) => {
                debug!(path = %candidate, "opened Vulkan loader");
                return Ok(lib);
            }
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(ProbeError::BackendNotFound(last_error))
}

impl VulkanBackend {
    fn init(candidates: &[String]) -> Result<(Self, GpuProperties), ProbeError> {
        let library = open_loader(candidates)?;

        // SAFETY: symbol type matches vkGetInstanceProcAddr.
        let gpa: GetInstanceProcAddr = unsafe {
            *library
                .get::<GetInstanceProcAddr>(b"vkGetInstanceProcAddr\0")
                .map_err(|e| ProbeError::MissingEntryPoint(format!("vkGetInstanceProcAddr: {}", e)))?
        };
        let null = ptr::null_mut();

        // SAFETY: every resolve below pairs a Vulkan name with its signature.
        let mut instance_version = VK_API_VERSION_1_0;
        if let Some(enumerate_version) =
            unsafe { resolve::<EnumerateInstanceVersion>(gpa, null, c"vkEnumerateInstanceVersion") }
            && unsafe { enumerate_version(&mut instance_version) } != VK_SUCCESS
        {
            instance_version = VK_API_VERSION_1_0;
        }

        let create_instance: CreateInstance = required(
            unsafe { resolve(gpa, null, c"vkCreateInstance") },
            "vkCreateInstance",
        )?;

        let app_name = c"perfsnap";
        let app_info = VkApplicationInfo {
            s_type: VK_STRUCTURE_TYPE_APPLICATION_INFO,
            p_next: ptr::null(),
            p_application_name: app_name.as_ptr(),
            application_version: 1 << 22,
            p_engine_name: app_name.as_ptr(),
            engine_version: 1 << 22,
            api_version: VK_API_VERSION_1_0,
        };
        let create_info = VkInstanceCreateInfo {
            s_type: VK_STRUCTURE_TYPE_INSTANCE_CREATE_INFO,
            p_next: ptr::null(),
            flags: 0,
            p_application_info: &app_info,
            enabled_layer_count: 0,
            pp_enabled_layer_names: ptr::null(),
            enabled_extension_count: 0,
            pp_enabled_extension_names: ptr::null(),
        };
        let mut instance: VkInstance = ptr::null_mut();
        // SAFETY: create_info and app_info outlive the call.
        let res = unsafe { create_instance(&create_info, ptr::null(), &mut instance) };
        if res != VK_SUCCESS || instance.is_null() {
            return Err(ProbeError::InstanceCreation(res));
        }

        let Some(destroy_instance) =
            (unsafe { resolve::<DestroyInstance>(gpa, instance, c"vkDestroyInstance") })
        else {
            // Without vkDestroyInstance the instance can only be leaked
            return Err(ProbeError::MissingEntryPoint("vkDestroyInstance".to_string()));
        };

        let enumerate_devices = unsafe { resolve::<EnumeratePhysicalDevices>(gpa, instance, c"vkEnumeratePhysicalDevices") };
        let get_properties = unsafe { resolve::<GetPhysicalDeviceProperties>(gpa, instance, c"vkGetPhysicalDeviceProperties") };
        let get_memory_properties =
            unsafe { resolve::<GetPhysicalDeviceMemoryProperties>(gpa, instance, c"vkGetPhysicalDeviceMemoryProperties") };
        let enumerate_extensions = unsafe {
            resolve::<EnumerateDeviceExtensionProperties>(gpa, instance, c"vkEnumerateDeviceExtensionProperties")
        };
        let get_memory_properties2 = unsafe {
            resolve::<GetPhysicalDeviceMemoryProperties2>(gpa, instance, c"vkGetPhysicalDeviceMemoryProperties2")
                .or_else(|| resolve(gpa, instance, c"vkGetPhysicalDeviceMemoryProperties2KHR"))
        };

        let missing = [
            ("vkEnumeratePhysicalDevices", enumerate_devices.is_none()),
            ("vkGetPhysicalDeviceProperties", get_properties.is_none()),
            ("vkGetPhysicalDeviceMemoryProperties", get_memory_properties.is_none()),
        ]
        .into_iter()
        .find(|(_, absent)| *absent);
        let (Some(enumerate_devices), Some(get_properties), Some(get_memory_properties)) =
            (enumerate_devices, get_properties, get_memory_properties)
        else {
            // SAFETY: instance is valid and not used afterwards.
            unsafe { destroy_instance(instance, ptr::null()) };
            let name = missing.map(|(n, _)| n).unwrap_or("vkEnumeratePhysicalDevices");
            return Err(ProbeError::MissingEntryPoint(name.to_string()));
        };

        // From here on the backend owns the instance and destroys it on error.
        let mut backend = VulkanBackend {
            instance,
            physical_device: ptr::null_mut(),
            destroy_instance,
            get_memory_properties,
            get_memory_properties2,
            has_budget: false,
            _library: library,
        };

        let mut count = 0u32;
        // SAFETY: count query with a null output array.
        let res = unsafe { enumerate_devices(instance, &mut count, ptr::null_mut()) };
        if res != VK_SUCCESS {
            return Err(ProbeError::Enumeration(res));
        }
        if count == 0 {
            return Err(ProbeError::NoDevices);
        }
        let mut devices: Vec<VkPhysicalDevice> = vec![ptr::null_mut(); count as usize];
        // SAFETY: devices has room for count handles.
        let res = unsafe { enumerate_devices(instance, &mut count, devices.as_mut_ptr()) };
        if res < VK_SUCCESS {
            return Err(ProbeError::Enumeration(res));
        }
        if count == 0 {
            return Err(ProbeError::NoDevices);
        }
        backend.physical_device = devices[0];

        // SAFETY: VkPhysicalDeviceProperties is plain data; zero is a valid bit pattern.
        let mut props: VkPhysicalDeviceProperties = unsafe { mem::zeroed() };
        unsafe { get_properties(backend.physical_device, &mut props) };

        let has_extension = enumerate_extensions
            .is_some_and(|f| unsafe { device_has_extension(f, backend.physical_device, VK_EXT_MEMORY_BUDGET) });
        backend.has_budget = has_extension && backend.get_memory_properties2.is_some();

        let properties = GpuProperties {
            device_name: c_string_field(&props.device_name),
            vendor_id: props.vendor_id,
            device_id: props.device_id,
            instance_version,
            api_version: props.api_version,
            driver_version: props.driver_version,
            has_memory_budget: backend.has_budget,
        };
        Ok((backend, properties))
    }
}

/// # Safety
/// `f` must be a valid `vkEnumerateDeviceExtensionProperties` for `device`.
unsafe fn device_has_extension(f: EnumerateDeviceExtensionProperties, device: VkPhysicalDevice, name: &[u8]) -> bool {
    let mut count = 0u32;
    if unsafe { f(device, ptr::null(), &mut count, ptr::null_mut()) } != VK_SUCCESS || count == 0 {
        return false;
    }
    let mut extensions: Vec<VkExtensionProperties> = (0..count)
        .map(|_| VkExtensionProperties {
            extension_name: [0; 256],
            spec_version: 0,
        })
        .collect();
    if unsafe { f(device, ptr::null(), &mut count, extensions.as_mut_ptr()) } < VK_SUCCESS {
        return false;
    }
    extensions
        .iter()
        .take(count as usize)
        .any(|ext| c_string_field(&ext.extension_name).as_bytes() == name)
}

impl GpuMemoryQuery for VulkanBackend {
    fn memory(&self) -> Result<GpuMemory, ProbeError> {
        let mut out = GpuMemory::default();

        // SAFETY: plain data output struct filled by the driver.
        let mut props: VkPhysicalDeviceMemoryProperties = unsafe { mem::zeroed() };
        unsafe { (self.get_memory_properties)(self.physical_device, &mut props) };
        let heap_count = (props.memory_heap_count as usize).min(VK_MAX_MEMORY_HEAPS);
        for heap in &props.memory_heaps[..heap_count] {
            let size = i64::try_from(heap.size).unwrap_or(i64::MAX);
            if heap.flags & VK_MEMORY_HEAP_DEVICE_LOCAL_BIT != 0 {
                out.dedicated_total_bytes = out.dedicated_total_bytes.saturating_add(size);
            } else {
                out.shared_total_bytes = out.shared_total_bytes.saturating_add(size);
            }
        }

        let Some(get_memory_properties2) = self.get_memory_properties2.filter(|_| self.has_budget) else {
            return Ok(out);
        };

        // SAFETY: both structs are plain data; the chain pointer stays valid for the call.
        let mut budget: VkPhysicalDeviceMemoryBudgetPropertiesEXT = unsafe { mem::zeroed() };
        budget.s_type = VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_MEMORY_BUDGET_PROPERTIES_EXT;
        let mut props2: VkPhysicalDeviceMemoryProperties2 = unsafe { mem::zeroed() };
        props2.s_type = VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_MEMORY_PROPERTIES_2;
        props2.p_next = (&mut budget as *mut VkPhysicalDeviceMemoryBudgetPropertiesEXT).cast();
        unsafe { get_memory_properties2(self.physical_device, &mut props2) };

        let heap_count = (props2.memory_properties.memory_heap_count as usize).min(VK_MAX_MEMORY_HEAPS);
        for (i, heap) in props2.memory_properties.memory_heaps[..heap_count].iter().enumerate() {
            let heap_budget = i64::try_from(budget.heap_budget[i]).unwrap_or(i64::MAX);
            let heap_usage = i64::try_from(budget.heap_usage[i]).unwrap_or(i64::MAX);
            if heap.flags & VK_MEMORY_HEAP_DEVICE_LOCAL_BIT != 0 {
                out.dedicated_budget_bytes = out.dedicated_budget_bytes.saturating_add(heap_budget);
                out.dedicated_used_bytes = out.dedicated_used_bytes.saturating_add(heap_usage);
            } else {
                out.shared_budget_bytes = out.shared_budget_bytes.saturating_add(heap_budget);
                out.shared_used_bytes = out.shared_used_bytes.saturating_add(heap_usage);
            }
        }
        out.has_budget = out.dedicated_budget_bytes > 0 || out.shared_budget_bytes > 0;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Detects the GPU through the system Vulkan loader.
#[derive(Debug, Clone)]
pub struct VulkanProvider {
    candidates: Vec<String>,
}

impl VulkanProvider {
    pub fn new() -> Self {
        Self::with_candidates(DEFAULT_CANDIDATES.iter().map(|s| s.to_string()).collect())
    }

    /// Uses a custom list of loader paths.
    pub fn with_candidates(candidates: Vec<String>) -> Self {
        Self { candidates }
    }
}

impl Default for VulkanProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityProvider for VulkanProvider {
    fn probe(&self) -> Result<ProbedDevice, ProbeError> {
        let (backend, properties) = VulkanBackend::init(&self.candidates)?;
        info!(
            device = %properties.device_name,
            api = %properties.api_version_string(),
            budget = properties.has_memory_budget,
            "Vulkan device detected"
        );
        Ok(ProbedDevice {
            properties,
            memory: Some(Box::new(backend)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_loader_reports_backend_not_found() {
        let provider = VulkanProvider::with_candidates(vec!["/nonexistent/libvulkan-perfsnap-test.so".to_string()]);
        match provider.probe() {
            Err(ProbeError::BackendNotFound(detail)) => assert!(!detail.is_empty()),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("probe succeeded without a loader"),
        }
    }

    #[test]
    fn test_empty_candidate_list() {
        let provider = VulkanProvider::with_candidates(Vec::new());
        assert!(matches!(provider.probe(), Err(ProbeError::BackendNotFound(_))));
    }

    #[test]
    fn test_c_string_field() {
        let mut raw = [0 as c_char; 16];
        for (i, b) in b"Adreno".iter().enumerate() {
            raw[i] = *b as c_char;
        }
        assert_eq!(c_string_field(&raw), "Adreno");
        assert_eq!(c_string_field(&[0 as c_char; 4]), "");
    }

    #[test]
    fn test_struct_layouts() {
        assert_eq!(mem::size_of::<VkMemoryHeap>(), 16);
        assert_eq!(mem::size_of::<VkPhysicalDeviceMemoryProperties>(), 520);
        assert_eq!(mem::size_of::<VkExtensionProperties>(), 260);
    }
}
