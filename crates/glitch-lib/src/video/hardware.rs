use super::catalog::{DeviceCatalog, HwBackend};
use ffmpeg_next::ffi::{
    av_buffer_ref, av_buffer_unref, av_get_pix_fmt_name, av_hwdevice_ctx_create,
    avcodec_get_hw_config, AVBufferRef, AVHWDeviceType, AVPixelFormat,
    AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX,
};
use ffmpeg_next::Codec;
use glitch_types::{ErrorKind, GlitchLibError};
use log::{info, warn};
use std::ffi::CStr;
use std::ptr::{null, null_mut};
use std::sync::Arc;

/// RAII wrapper for an FFmpeg hardware device context.
/// The decoder holds its own reference, so the device stays alive as long as
/// either the decoder or any `Arc` clone needs it.
pub struct HardwareContext {
    ctx: *mut AVBufferRef,
    backend: HwBackend,
    pix_fmt: AVPixelFormat,
}

impl HardwareContext {
    /// Opens the default device for `backend`.
    pub fn new(backend: HwBackend, pix_fmt: AVPixelFormat) -> Result<Arc<Self>, GlitchLibError> {
        let mut hw_device_ctx = null_mut();

        let ret = unsafe {
            av_hwdevice_ctx_create(
                &mut hw_device_ctx,
                backend.device_type(),
                null(),
                null_mut(),
                0,
            )
        };
        if ret < 0 || hw_device_ctx.is_null() {
            return Err(GlitchLibError::new(
                ErrorKind::DecoderInit,
                format!(
                    "Failed to create hardware device context for {}: {}",
                    backend.name(),
                    ffmpeg_next::Error::from(ret)
                ),
            ));
        }

        Ok(Arc::new(Self {
            ctx: hw_device_ctx,
            backend,
            pix_fmt,
        }))
    }

    /// New owned reference to the device buffer, for handing to a codec context.
    pub fn new_ref(&self) -> Result<*mut AVBufferRef, GlitchLibError> {
        let hw_ref = unsafe { av_buffer_ref(self.ctx) };
        if hw_ref.is_null() {
            return Err(GlitchLibError::new(
                ErrorKind::DecoderInit,
                "Failed to reference hardware context",
            ));
        }
        Ok(hw_ref)
    }

    pub fn backend(&self) -> HwBackend {
        self.backend
    }

    pub fn pixel_format(&self) -> AVPixelFormat {
        self.pix_fmt
    }
}

impl Drop for HardwareContext {
    fn drop(&mut self) {
        unsafe {
            if !self.ctx.is_null() {
                av_buffer_unref(&mut self.ctx);
            }
        }
    }
}

unsafe impl Send for HardwareContext {}
unsafe impl Sync for HardwareContext {}

/// One entry of a decoder's advertised hardware configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwConfig {
    pub device_type: AVHWDeviceType,
    pub pix_fmt: AVPixelFormat,
    pub methods: i32,
}

impl HwConfig {
    pub fn uses_device_ctx(&self) -> bool {
        (self.methods & AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX as i32) != 0
    }
}

/// Reads every hardware configuration the decoder advertises, in FFmpeg's order.
pub fn hw_configs(codec: &Codec) -> Vec<HwConfig> {
    let mut configs = Vec::new();
    let mut i = 0;
    unsafe {
        loop {
            let config = avcodec_get_hw_config(codec.as_ptr(), i);
            if config.is_null() {
                break;
            }
            let hw_config = &*config;
            configs.push(HwConfig {
                device_type: hw_config.device_type,
                pix_fmt: hw_config.pix_fmt,
                methods: hw_config.methods,
            });
            i += 1;
        }
    }
    configs
}

/// Picks the first device-context configuration for `requested`, provided the
/// host enumerates that backend at all.
pub fn select_hw_config(
    configs: &[HwConfig],
    requested: HwBackend,
    catalog: &DeviceCatalog,
) -> Option<HwConfig> {
    if !catalog.contains(requested) {
        return None;
    }
    configs
        .iter()
        .find(|config| config.device_type == requested.device_type() && config.uses_device_ctx())
        .copied()
}

/// Outcome of accelerator negotiation.
pub enum Acceleration {
    Accelerated {
        pix_fmt: AVPixelFormat,
        device: Arc<HardwareContext>,
    },
    Software,
}

impl Acceleration {
    pub fn is_accelerated(&self) -> bool {
        matches!(self, Acceleration::Accelerated { .. })
    }
}

impl std::fmt::Debug for Acceleration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Acceleration::Accelerated { pix_fmt, device } => f
                .debug_struct("Accelerated")
                .field("backend", &device.backend().name())
                .field("pix_fmt", pix_fmt)
                .finish(),
            Acceleration::Software => write!(f, "Software"),
        }
    }
}

pub(crate) fn pix_fmt_name(pix_fmt: AVPixelFormat) -> String {
    unsafe {
        let name = av_get_pix_fmt_name(pix_fmt);
        if name.is_null() {
            return format!("{:?}", pix_fmt);
        }
        CStr::from_ptr(name).to_string_lossy().into_owned()
    }
}

/// Resolves the requested backend against the catalog and the decoder's hardware
/// configurations. Never fails: every problem degrades to `Software`.
pub fn negotiate(
    codec: &Codec,
    requested: Option<HwBackend>,
    catalog: &DeviceCatalog,
) -> Acceleration {
    let Some(requested) = requested else {
        return Acceleration::Software;
    };

    if !catalog.contains(requested) {
        warn!(
            "Hardware acceleration not available: {}",
            requested.name()
        );
        return Acceleration::Software;
    }

    let Some(config) = select_hw_config(&hw_configs(codec), requested, catalog) else {
        warn!(
            "Decoder {} not supported by device: {}",
            codec.name(),
            requested.name()
        );
        return Acceleration::Software;
    };
    info!("Acceleration pixel format: {}", pix_fmt_name(config.pix_fmt));

    match HardwareContext::new(requested, config.pix_fmt) {
        Ok(device) => {
            info!("Hardware accelerated device: {}", requested.name());
            Acceleration::Accelerated {
                pix_fmt: config.pix_fmt,
                device,
            }
        }
        Err(e) => {
            warn!("Cannot create context for specified hardware device: {}", e);
            Acceleration::Software
        }
    }
}
