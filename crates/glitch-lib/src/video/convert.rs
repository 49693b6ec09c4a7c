use ffmpeg_next::ffi::sws_scale;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{context::Context, flag::Flags};
use ffmpeg_next::util::frame::video::Video;
use glitch_types::{ErrorKind, GlitchLibError, OutputLayout};
use log::debug;

pub fn layout_pixel(layout: OutputLayout) -> Pixel {
    match layout {
        OutputLayout::Bgr24 => Pixel::BGR24,
        OutputLayout::Rgb24 => Pixel::RGB24,
        OutputLayout::Rgba => Pixel::RGBA,
    }
}

/// Converts decoded frames into one persistent interleaved output frame.
///
/// The output frame is allocated once and overwritten in place, so its data
/// pointer never changes. The scaling context is re-derived whenever the
/// source format or size differs from the previous frame; replacing it drops
/// the old context exactly once.
pub struct ColorConverter {
    scaler: Option<Context>,
    source: Option<(Pixel, u32, u32)>,
    output: Video,
    layout: OutputLayout,
}

impl ColorConverter {
    pub fn new(
        width: u32,
        height: u32,
        source_format: Pixel,
        layout: OutputLayout,
    ) -> Result<Self, GlitchLibError> {
        if width == 0 || height == 0 {
            return Err(GlitchLibError::new(
                ErrorKind::DecoderInit,
                format!("Invalid frame geometry {}x{}", width, height),
            ));
        }

        let output = Video::new(layout_pixel(layout), width, height);
        if output.data(0).is_empty() {
            return Err(GlitchLibError::new(
                ErrorKind::DecoderInit,
                "Cannot allocate output frame buffer",
            ));
        }

        let mut converter = Self {
            scaler: None,
            source: None,
            output,
            layout,
        };
        // Unknown source formats are resolved on the first frame instead.
        if source_format != Pixel::None {
            converter
                .prepare(source_format, width, height)
                .map_err(|e| GlitchLibError::new(ErrorKind::DecoderInit, e.message))?;
        }
        Ok(converter)
    }

    fn prepare(&mut self, format: Pixel, width: u32, height: u32) -> Result<(), GlitchLibError> {
        if self.scaler.is_some() && self.source == Some((format, width, height)) {
            return Ok(());
        }

        debug!(
            "Deriving conversion context {:?} {}x{} -> {:?} {}x{}",
            format,
            width,
            height,
            self.output.format(),
            self.output.width(),
            self.output.height()
        );
        let scaler = Context::get(
            format,
            width,
            height,
            self.output.format(),
            self.output.width(),
            self.output.height(),
            Flags::BICUBIC,
        )
        .map_err(|e| {
            GlitchLibError::new(
                ErrorKind::Conversion,
                format!("Cannot init SWS context for {:?}: {}", format, e),
            )
        })?;

        self.scaler = Some(scaler);
        self.source = Some((format, width, height));
        Ok(())
    }

    /// Writes `frame` into the output buffer.
    pub fn convert(&mut self, frame: &Video) -> Result<(), GlitchLibError> {
        let format = frame.format();
        if format == Pixel::None || frame.width() == 0 || frame.height() == 0 {
            return Err(GlitchLibError::new(
                ErrorKind::Conversion,
                "Cannot convert a frame without format or geometry",
            ));
        }
        self.prepare(format, frame.width(), frame.height())?;

        let scaler = self.scaler.as_mut().ok_or_else(|| {
            GlitchLibError::new(ErrorKind::Conversion, "Missing SWS context")
        })?;

        let out_height = unsafe {
            sws_scale(
                scaler.as_mut_ptr(),
                (*frame.as_ptr()).data.as_ptr() as *const *const _,
                (*frame.as_ptr()).linesize.as_ptr() as *const _,
                0,
                frame.height() as libc::c_int,
                (*self.output.as_mut_ptr()).data.as_ptr() as *const *mut _,
                (*self.output.as_mut_ptr()).linesize.as_ptr() as *const _,
            )
        };
        if out_height != self.output.height() as libc::c_int {
            return Err(GlitchLibError::new(
                ErrorKind::Conversion,
                format!("Cannot convert image, out height: {}", out_height),
            ));
        }
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.output.width()
    }

    pub fn height(&self) -> u32 {
        self.output.height()
    }

    pub fn stride(&self) -> usize {
        self.output.stride(0)
    }

    pub fn layout(&self) -> OutputLayout {
        self.layout
    }

    pub fn data(&self) -> &[u8] {
        self.output.data(0)
    }

    pub fn data_ptr(&self) -> *const u8 {
        self.output.data(0).as_ptr()
    }

    pub fn source_format(&self) -> Option<Pixel> {
        self.source.map(|(format, _, _)| format)
    }
}
