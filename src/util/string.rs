use std::ffi::{c_char, CStr, CString, NulError};

/// Owned list of layer or extension names, kept together with the pointer array Vulkan reads.
#[derive(Debug, Default)]
pub(crate) struct NameList {
    names: Vec<CString>,
    pointers: Vec<*const c_char>,
}

impl NameList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from Rust strings, failing on interior nul bytes.
    pub fn from_strs<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Result<Self, NulError> {
        let mut list = Self::new();
        for name in names {
            list.push(CString::new(name.as_ref())?);
        }
        Ok(list)
    }

    pub fn push(&mut self, name: CString) {
        // Moving a CString does not move its heap buffer, so earlier pointers stay valid.
        self.pointers.push(name.as_ptr());
        self.names.push(name);
    }

    pub fn push_cstr(&mut self, name: &CStr) {
        self.push(CString::from(name));
    }

    pub fn names(&self) -> &[CString] {
        &self.names
    }

    pub fn as_ptrs(&self) -> &[*const c_char] {
        &self.pointers
    }
}

impl Extend<CString> for NameList {
    fn extend<T: IntoIterator<Item = CString>>(&mut self, iter: T) {
        for name in iter {
            self.push(name);
        }
    }
}

/// Reads a nul terminated string returned by the driver. Null pointers read as an empty string.
///
/// # Safety
/// `ptr` must be null or point to a valid nul terminated string.
pub(crate) unsafe fn driver_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

/// Reads a fixed size name array such as `VkExtensionProperties::extensionName`.
pub(crate) fn name_from_array(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointers_follow_names() {
        let list = NameList::from_strs(["VK_KHR_swapchain", "VK_EXT_debug_utils"]).unwrap();
        assert_eq!(list.as_ptrs().len(), 2);
        for (name, &ptr) in list.names().iter().zip(list.as_ptrs()) {
            assert_eq!(unsafe { CStr::from_ptr(ptr) }, name.as_c_str());
        }
    }

    #[test]
    fn interior_nul_is_rejected() {
        assert!(NameList::from_strs(["bad\0name"]).is_err());
    }

    #[test]
    fn fixed_array_stops_at_nul() {
        let mut raw = [0 as c_char; 8];
        for (dst, src) in raw.iter_mut().zip(b"abc") {
            *dst = *src as c_char;
        }
        assert_eq!(name_from_array(&raw), "abc");
        assert_eq!(unsafe { driver_string(std::ptr::null()) }, "");
    }
}
