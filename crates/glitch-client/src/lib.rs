use std::path::PathBuf;

pub use glitch_types;
use glitch_types::{FramePipeline, FramePipelineOptions, GlitchLibError, GlitchLibInit};
use stabby::libloading::StabbyLibrary;

mod test;

#[derive(Debug)]
pub enum GlitchClientError {
    GlitchLibError(GlitchLibError),
    UnknownError(String),
}

impl From<GlitchLibError> for GlitchClientError {
    fn from(error: GlitchLibError) -> Self {
        GlitchClientError::GlitchLibError(error)
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for GlitchClientError {
    fn from(error: Box<dyn std::error::Error + Send + Sync>) -> Self {
        GlitchClientError::UnknownError(error.to_string())
    }
}

impl std::fmt::Display for GlitchClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GlitchClientError::GlitchLibError(e) => write!(f, "{}", e),
            GlitchClientError::UnknownError(s) => write!(f, "Unknown error: {}", s),
        }
    }
}
impl std::error::Error for GlitchClientError {}

pub type NewFramePipelineFn = extern "C" fn(
    stabby::string::String,
    FramePipelineOptions,
) -> stabby::dynptr!(stabby::boxed::Box<dyn FramePipeline>);

type InitGlitchLibFn = extern "C" fn() -> stabby::result::Result<GlitchLibInit, GlitchLibError>;

pub type ListHwAcceleratorsFn = extern "C" fn() -> stabby::vec::Vec<stabby::string::String>;

/// Entry points of a loaded glitch library.
///
/// The library stays mapped for as long as the client lives; pipelines must
/// not outlive it.
pub struct GlitchClient {
    pub new_frame_pipeline: NewFramePipelineFn,
    pub list_hw_accelerators: ListHwAcceleratorsFn,
    _library: libloading::Library,
}

impl GlitchClient {
    pub fn open(
        &self,
        locator: &str,
        options: FramePipelineOptions,
    ) -> stabby::dynptr!(stabby::boxed::Box<dyn FramePipeline>) {
        (self.new_frame_pipeline)(stabby::string::String::from(locator), options)
    }

    pub fn accelerators(&self) -> Vec<String> {
        (self.list_hw_accelerators)()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }
}

pub fn load(lib: &PathBuf) -> Result<GlitchClient, GlitchClientError> {
    let library = unsafe { libloading::Library::new(lib) }
        .map_err(|e| GlitchClientError::UnknownError(e.to_string()))?;

    let init_glitch_lib =
        unsafe { library.get_stabbied::<InitGlitchLibFn>(b"init_glitch_lib") }?;
    let init: Result<GlitchLibInit, GlitchLibError> = init_glitch_lib().into();
    init?;

    let init_logging = unsafe { library.get_stabbied::<extern "C" fn()>(b"init_logging") }?;
    init_logging();

    let new_frame_pipeline =
        *unsafe { library.get_stabbied::<NewFramePipelineFn>(b"new_frame_pipeline") }?;
    let list_hw_accelerators =
        *unsafe { library.get_stabbied::<ListHwAcceleratorsFn>(b"list_hw_accelerators") }?;

    Ok(GlitchClient {
        new_frame_pipeline,
        list_hw_accelerators,
        _library: library,
    })
}
