pub mod video;

use ffmpeg_next as ffmpeg;
use glitch_types::{
    ErrorKind, FramePipeline, FramePipelineOptions, GlitchLibError, GlitchLibInit, ReadStatus,
};
use video::{DeviceCatalog, GlitchPipeline, SessionConfig};

#[stabby::stabby]
#[stabby::export]
pub fn init_glitch_lib() -> stabby::result::Result<GlitchLibInit, GlitchLibError> {
    match ffmpeg::init() {
        Ok(_) => Ok(GlitchLibInit {}).into(),
        Err(e) => Err(GlitchLibError::new(ErrorKind::Unknown, e.to_string())).into(),
    }
}

fn stabby_names(names: Vec<String>) -> stabby::vec::Vec<stabby::string::String> {
    let mut out = stabby::vec::Vec::new();
    for name in names {
        out.push(stabby::string::String::from(name.as_str()));
    }
    out
}

struct FramePipelineWrapper {
    pipeline: GlitchPipeline,
}

impl FramePipeline for FramePipelineWrapper {
    extern "C" fn is_valid(&self) -> bool {
        self.pipeline.is_valid()
    }

    extern "C" fn is_accelerated(&self) -> bool {
        self.pipeline.is_accelerated()
    }

    extern "C" fn get_width(&self) -> u32 {
        self.pipeline.geometry().width
    }

    extern "C" fn get_height(&self) -> u32 {
        self.pipeline.geometry().height
    }

    extern "C" fn get_stride(&self) -> usize {
        self.pipeline.stride()
    }

    extern "C" fn data_ptr(&self) -> *const u8 {
        self.pipeline.buffer_ptr()
    }

    extern "C" fn data_len(&self) -> usize {
        self.pipeline.buffer().map_or(0, <[u8]>::len)
    }

    extern "C" fn list_hw_accelerators(&self) -> stabby::vec::Vec<stabby::string::String> {
        stabby_names(self.pipeline.list_hw_accelerators())
    }

    extern "C" fn last_error(&self) -> stabby::option::Option<GlitchLibError> {
        self.pipeline.last_error().cloned().into()
    }

    extern "C" fn read(&mut self, touch: bool) -> ReadStatus {
        self.pipeline.read(touch)
    }
}

/// Builds a pipeline over `locator`. Always returns a pipeline; check
/// `is_valid` before reading.
#[stabby::stabby]
#[stabby::export]
pub fn new_frame_pipeline(
    locator: stabby::string::String,
    options: FramePipelineOptions,
) -> stabby::dynptr!(stabby::boxed::Box<dyn FramePipeline>) {
    let locator = locator.to_string();
    let pipeline = GlitchPipeline::new(&locator, SessionConfig::from(&options));
    stabby::boxed::Box::new(FramePipelineWrapper { pipeline }).into()
}

#[stabby::stabby]
#[stabby::export]
pub fn list_hw_accelerators() -> stabby::vec::Vec<stabby::string::String> {
    stabby_names(DeviceCatalog::enumerate().names())
}

#[stabby::stabby]
#[stabby::export]
pub fn init_logging() {
    ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Warning);
    let _ = pretty_env_logger::try_init();
}
