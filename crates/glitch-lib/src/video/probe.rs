use ffmpeg_next::codec::{self, Codec};
use ffmpeg_next::format::context::Input;
use ffmpeg_next::{media, Rational};
use glitch_types::{ErrorKind, GlitchLibError};
use log::info;

/// An opened container bound to its best video stream and the decoder that can read it.
pub struct ProbedStream {
    pub input: Input,
    pub stream_index: usize,
    pub codec: Codec,
    pub time_base: Rational,
    pub frame_rate: Rational,
}

impl ProbedStream {
    /// Builds a fresh (unopened) codec context from the chosen stream's parameters.
    pub fn codec_context(&self) -> Result<codec::Context, GlitchLibError> {
        let stream = self.input.stream(self.stream_index).ok_or_else(|| {
            GlitchLibError::new(ErrorKind::NoStream, "Video stream disappeared from input")
        })?;
        codec::Context::from_parameters(stream.parameters()).map_err(|e| {
            GlitchLibError::new(
                ErrorKind::DecoderInit,
                format!("Cannot copy decoder parameters to decoder context: {}", e),
            )
        })
    }
}

/// Opens `locator` (a path or URL) and picks the demuxer's best video stream.
pub fn probe(locator: &str) -> Result<ProbedStream, GlitchLibError> {
    let input = ffmpeg_next::format::input(&locator).map_err(|e| {
        GlitchLibError::new(
            ErrorKind::Open,
            format!("Cannot open input {}: {}", locator, e),
        )
    })?;

    let (stream_index, codec_id, time_base, frame_rate) = {
        let stream = input.streams().best(media::Type::Video).ok_or_else(|| {
            GlitchLibError::new(ErrorKind::NoStream, "No video stream found")
        })?;
        (
            stream.index(),
            stream.parameters().id(),
            stream.time_base(),
            stream.avg_frame_rate(),
        )
    };
    info!("Found video stream with index: {}", stream_index);

    let codec = match ffmpeg_next::decoder::find(codec_id) {
        Some(codec) if codec_id != codec::Id::None => codec,
        _ => {
            return Err(GlitchLibError::new(
                ErrorKind::NoDecoder,
                format!("Cannot find decoder for stream {} ({:?})", stream_index, codec_id),
            ))
        }
    };
    info!(
        "Found video decoder: {} ({})",
        codec.name(),
        codec.description()
    );

    Ok(ProbedStream {
        input,
        stream_index,
        codec,
        time_base,
        frame_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_open_error() {
        let _ = ffmpeg_next::init();
        let err = probe("/definitely/not/here/clip.mkv")
            .err()
            .expect("opening a missing file must fail");
        assert_eq!(err.kind, ErrorKind::Open);
    }
}
