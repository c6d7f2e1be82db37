//! The loaded Vulkan library and the validation message forwarder.

use std::ffi::{CStr, CString};
use std::ops::Deref;

use anyhow::Result;
use ash::vk;

use crate::core::app_info::AppSettings;
use crate::util::string::{driver_string, NameList};

/// Represents the loaded vulkan instance.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct Instance {
    #[derivative(Debug = "ignore")]
    entry: ash::Entry,
    #[derivative(Debug = "ignore")]
    instance: ash::Instance,
}

impl Instance {
    /// Initializes the Vulkan API.
    /// # Errors
    /// * Can fail if the Vulkan loader was not found. Check for valid Vulkan drivers.
    /// * Can fail if an instance extension or layer was requested that is not supported. This can happen when
    ///   validation is enabled through [`AppSettings`], but the Vulkan SDK is not installed.
    pub fn new(settings: &AppSettings) -> Result<Self> {
        let entry = unsafe { ash::Entry::load()? };
        let instance = create_vk_instance(&entry, settings)?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkInstance {:p}", instance.handle());
        Ok(Instance {
            entry,
            instance,
        })
    }

    pub fn loader(&self) -> &ash::Entry {
        &self.entry
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkInstance {:p}", self.instance.handle());
        unsafe {
            self.instance.destroy_instance(None);
        }
    }
}

impl Deref for Instance {
    type Target = ash::Instance;

    fn deref(&self) -> &Self::Target {
        &self.instance
    }
}

fn create_vk_instance(entry: &ash::Entry, settings: &AppSettings) -> Result<ash::Instance> {
    let app_name = CString::new(settings.name.clone())?;
    let engine_name = CString::new("Lugdunum")?;
    let (major, minor, patch) = settings.version;
    let app_info = vk::ApplicationInfo::builder()
        .api_version(vk::make_api_version(0, 1, 3, 0))
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, major, minor, patch))
        .engine_name(&engine_name)
        .engine_version(vk::make_api_version(0, 0, 3, 0))
        .build();

    let mut layers = NameList::new();
    let mut extensions = NameList::new();

    if settings.enable_validation {
        layers.push(CString::new("VK_LAYER_KHRONOS_validation")?);
        extensions.push_cstr(ash::extensions::ext::DebugUtils::name());
    }

    if let Some(surface) = &settings.surface_settings {
        extensions.extend(
            ash_window::enumerate_required_extensions(surface.window.raw_display_handle())?
                .iter()
                .map(|&raw_str| unsafe { CString::from(CStr::from_ptr(raw_str)) }),
        );
    }

    info!("Enabled instance extensions:");
    for ext in extensions.names() {
        info!("{:?}", ext);
    }

    let instance_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_layer_names(layers.as_ptrs())
        .enabled_extension_names(extensions.as_ptrs())
        .build();

    Ok(unsafe { entry.create_instance(&instance_info, None)? })
}

/// Forwards validation layer messages to the `log` facade.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct DebugMessenger {
    handle: vk::DebugUtilsMessengerEXT,
    #[derivative(Debug = "ignore")]
    functions: ash::extensions::ext::DebugUtils,
}

impl DebugMessenger {
    pub fn new(instance: &Instance) -> Result<Self> {
        let functions = ash::extensions::ext::DebugUtils::new(instance.loader(), instance);
        let info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR)
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vk_debug_callback))
            .build();
        let handle = unsafe { functions.create_debug_utils_messenger(&info, None)? };
        Ok(DebugMessenger {
            handle,
            functions,
        })
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe {
            self.functions.destroy_debug_utils_messenger(self.handle, None);
        }
    }
}

extern "system" fn vk_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    msg_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = unsafe { *p_callback_data };
    let id_name = unsafe { driver_string(callback_data.p_message_id_name) };
    let message = unsafe { driver_string(callback_data.p_message) };
    let id = callback_data.message_id_number;

    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("[{msg_type:?}]: {id_name} ({id}): {message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!("[{msg_type:?}]: {id_name} ({id}): {message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => info!("[{msg_type:?}]: {id_name} ({id}): {message}"),
        _ => trace!("[{msg_type:?}]: {id_name} ({id}): {message}"),
    };

    vk::FALSE
}
