use stabby::string::String;

/// Interleaved pixel layout of the output frame.
#[stabby::stabby]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    Bgr24, // B, G, R
    Rgb24, // R, G, B
    Rgba,  // R, G, B, A
}

impl OutputLayout {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            OutputLayout::Bgr24 | OutputLayout::Rgb24 => 3,
            OutputLayout::Rgba => 4,
        }
    }
}

/// Result of a single `read` call on a frame pipeline.
#[stabby::stabby]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The output buffer holds a new frame.
    FrameReady,
    /// Nothing was produced, call again.
    Retry,
    /// The decoder is drained, no further call will produce a frame.
    EndOfStream,
    /// The call failed, see `last_error`.
    Fatal,
}

#[stabby::stabby]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Open,
    NoStream,
    NoDecoder,
    DecoderInit,
    Submit,
    Decode,
    Transfer,
    Conversion,
    InvalidPipeline,
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Open => "open error",
            ErrorKind::NoStream => "no video stream",
            ErrorKind::NoDecoder => "no decoder",
            ErrorKind::DecoderInit => "decoder init error",
            ErrorKind::Submit => "submit error",
            ErrorKind::Decode => "decode error",
            ErrorKind::Transfer => "transfer error",
            ErrorKind::Conversion => "conversion error",
            ErrorKind::InvalidPipeline => "invalid pipeline",
            ErrorKind::Unknown => "unknown error",
        };
        write!(f, "{}", name)
    }
}

#[stabby::stabby]
#[derive(Debug, Clone)]
pub struct GlitchLibError {
    pub kind: ErrorKind,
    pub message: String,
}

impl GlitchLibError {
    pub fn new(kind: ErrorKind, message: impl AsRef<str>) -> Self {
        Self {
            kind,
            message: String::from(message.as_ref()),
        }
    }
}

impl std::fmt::Display for GlitchLibError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for GlitchLibError {}

#[stabby::stabby]
#[derive(Debug, Clone)]
pub struct FramePipelineOptions {
    /// Hardware backend name such as "cuda" or "vaapi". Empty or "none" selects software decoding.
    pub hw_backend: String,
    pub output_layout: OutputLayout,
    /// Fixed corruption seed. When absent the generator is seeded from OS entropy.
    pub seed: stabby::option::Option<u64>,
}

impl Default for FramePipelineOptions {
    fn default() -> Self {
        Self {
            hw_backend: String::from(""),
            output_layout: OutputLayout::Bgr24,
            seed: None.into(),
        }
    }
}

#[stabby::stabby]
pub trait FramePipeline {
    extern "C" fn is_valid(&self) -> bool;
    extern "C" fn is_accelerated(&self) -> bool;
    extern "C" fn get_width(&self) -> u32;
    extern "C" fn get_height(&self) -> u32;
    extern "C" fn get_stride(&self) -> usize;
    extern "C" fn data_ptr(&self) -> *const u8;
    extern "C" fn data_len(&self) -> usize;
    extern "C" fn list_hw_accelerators(&self) -> stabby::vec::Vec<String>;
    extern "C" fn last_error(&self) -> stabby::option::Option<GlitchLibError>;
    extern "C" fn read(&mut self, touch: bool) -> ReadStatus;
}

#[stabby::stabby]
pub struct GlitchLibInit {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_report_pixel_width() {
        assert_eq!(OutputLayout::Bgr24.bytes_per_pixel(), 3);
        assert_eq!(OutputLayout::Rgb24.bytes_per_pixel(), 3);
        assert_eq!(OutputLayout::Rgba.bytes_per_pixel(), 4);
    }

    #[test]
    fn error_display_includes_kind() {
        let err = GlitchLibError::new(ErrorKind::NoStream, "No video stream found");
        assert_eq!(err.to_string(), "no video stream: No video stream found");
    }

    #[test]
    fn default_options_select_software() {
        let options = FramePipelineOptions::default();
        assert!(options.hw_backend.is_empty());
        assert_eq!(options.output_layout, OutputLayout::Bgr24);
        let seed: Option<u64> = options.seed.into();
        assert!(seed.is_none());
    }
}
