use ffmpeg_next::ffi::{
    av_hwdevice_find_type_by_name, av_hwdevice_get_type_name, av_hwdevice_iterate_types,
    AVHWDeviceType,
};
use std::ffi::{CStr, CString};

/// A hardware acceleration backend as identified by FFmpeg's device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwBackend(AVHWDeviceType);

impl HwBackend {
    pub fn new(device_type: AVHWDeviceType) -> Self {
        Self(device_type)
    }

    /// Resolves a backend from its FFmpeg name ("cuda", "vaapi", ...).
    /// An empty string or "none" means software decoding and yields `None`,
    /// as does any name FFmpeg doesn't know.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case("none") {
            return None;
        }
        let c_name = CString::new(name).ok()?;
        let device_type = unsafe { av_hwdevice_find_type_by_name(c_name.as_ptr()) };
        if device_type == AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
            log::warn!("Unknown hardware acceleration backend: {}", name);
            return None;
        }
        Some(Self(device_type))
    }

    pub fn device_type(&self) -> AVHWDeviceType {
        self.0
    }

    pub fn name(&self) -> String {
        unsafe {
            let name = av_hwdevice_get_type_name(self.0);
            if name.is_null() {
                return format!("{:?}", self.0);
            }
            CStr::from_ptr(name).to_string_lossy().into_owned()
        }
    }
}

/// Snapshot of the hardware backends compiled into FFmpeg on this host.
#[derive(Debug, Clone, Default)]
pub struct DeviceCatalog {
    backends: Vec<HwBackend>,
}

impl DeviceCatalog {
    /// Walks FFmpeg's device type list in enumeration order.
    pub fn enumerate() -> Self {
        let mut backends = Vec::new();
        let mut device_type = AVHWDeviceType::AV_HWDEVICE_TYPE_NONE;
        loop {
            device_type = unsafe { av_hwdevice_iterate_types(device_type) };
            if device_type == AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
                break;
            }
            backends.push(HwBackend(device_type));
        }
        Self { backends }
    }

    pub fn from_backends(backends: Vec<HwBackend>) -> Self {
        Self { backends }
    }

    pub fn backends(&self) -> &[HwBackend] {
        &self.backends
    }

    pub fn contains(&self, backend: HwBackend) -> bool {
        self.backends.contains(&backend)
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.iter().map(HwBackend::name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_and_empty_names_select_software() {
        assert_eq!(HwBackend::from_name(""), None);
        assert_eq!(HwBackend::from_name("none"), None);
        assert_eq!(HwBackend::from_name("NONE"), None);
        assert_eq!(HwBackend::from_name("definitely-not-a-device"), None);
    }

    #[test]
    fn known_names_resolve_and_round_trip() {
        let cuda = HwBackend::from_name("cuda").expect("cuda is a known device type name");
        assert_eq!(cuda.device_type(), AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA);
        assert_eq!(cuda.name(), "cuda");
    }

    #[test]
    fn enumeration_is_stable_and_named() {
        let first = DeviceCatalog::enumerate();
        let second = DeviceCatalog::enumerate();
        assert_eq!(first.backends(), second.backends());

        for backend in first.backends() {
            assert_ne!(backend.device_type(), AVHWDeviceType::AV_HWDEVICE_TYPE_NONE);
            assert!(!backend.name().is_empty());
            assert!(first.contains(*backend));
        }
        assert_eq!(first.names().len(), first.backends().len());
    }
}
