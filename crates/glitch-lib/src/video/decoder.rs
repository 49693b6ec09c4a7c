use super::{
    catalog::DeviceCatalog,
    convert::ColorConverter,
    corrupt::PacketCorruptor,
    hardware::{negotiate, Acceleration, HardwareContext},
    probe::{probe, ProbedStream},
    types::{DecodeOutcome, FrameGeometry, SessionConfig},
};
use ffmpeg_next::ffi::{
    av_frame_unref, av_hwframe_transfer_data, av_packet_make_writable, av_packet_unref,
    avcodec_default_get_format, AVCodecContext, AVPixelFormat,
};
use ffmpeg_next::format::context::Input;
use ffmpeg_next::util::frame::video::Video;
use ffmpeg_next::{codec, Packet};
use glitch_types::{ErrorKind, GlitchLibError};
use log::{debug, info, trace, warn};
use std::sync::Arc;

/// Picks the negotiated hardware surface format out of the formats the decoder
/// offers. Bound to one codec context through its `opaque` pointer, so every
/// session carries its own choice.
struct HwFormatSelector {
    pix_fmt: AVPixelFormat,
}

impl HwFormatSelector {
    fn select(&self, offered: &[AVPixelFormat]) -> Option<AVPixelFormat> {
        offered.iter().copied().find(|format| *format == self.pix_fmt)
    }
}

unsafe extern "C" fn select_hw_format(
    ctx: *mut AVCodecContext,
    pix_fmts: *const AVPixelFormat,
) -> AVPixelFormat {
    let selector = (*ctx).opaque as *const HwFormatSelector;
    if selector.is_null() || pix_fmts.is_null() {
        return AVPixelFormat::AV_PIX_FMT_NONE;
    }

    let mut offered = Vec::new();
    let mut i = 0;
    loop {
        let format = *pix_fmts.offset(i);
        if format == AVPixelFormat::AV_PIX_FMT_NONE {
            break;
        }
        offered.push(format);
        i += 1;
    }

    match (*selector).select(&offered) {
        Some(format) => format,
        None => {
            warn!("Failed to get HW surface format, decoding in software");
            avcodec_default_get_format(ctx, pix_fmts)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Reading,
    Flushed,
    Ended,
}

/// Owns the demuxer, decoder, optional device context and every frame buffer
/// of one decode pipeline, and advances them one packet per `read`.
///
/// Fields drop in declaration order: the decoder goes before the format
/// selector its callback points at, and frames go before the device context.
pub struct DecodeSession {
    converter: ColorConverter,
    raw_frame: Video,
    host_frame: Video,
    packet: Packet,
    decoder: codec::decoder::Video,
    input: Input,
    _selector: Option<Box<HwFormatSelector>>,
    hardware_context: Option<Arc<HardwareContext>>,
    hw_pix_fmt: Option<AVPixelFormat>,
    stream_index: usize,
    corruptor: PacketCorruptor,
    state: SessionState,
    // Held packet the decoder refused while it still had output to hand out.
    pending: bool,
    pending_corrupted: bool,
    // Set once any packet of this session has been corrupted.
    glitched: bool,
    frames_decoded: u64,
}

impl DecodeSession {
    /// Probes `locator`, negotiates acceleration and opens the decoder.
    /// Any failure releases whatever was already allocated.
    pub fn open(
        locator: &str,
        config: &SessionConfig,
        catalog: &DeviceCatalog,
    ) -> Result<Self, GlitchLibError> {
        let probed = probe(locator)?;
        let mut context = probed.codec_context()?;

        let mut selector = None;
        let mut hardware_context = None;
        let mut hw_pix_fmt = None;
        if let Acceleration::Accelerated { pix_fmt, device } =
            negotiate(&probed.codec, config.hw_backend, catalog)
        {
            match device.new_ref() {
                Ok(hw_ref) => {
                    let boxed = Box::new(HwFormatSelector { pix_fmt });
                    unsafe {
                        let ctx = context.as_mut_ptr();
                        (*ctx).hw_device_ctx = hw_ref;
                        (*ctx).opaque =
                            &*boxed as *const HwFormatSelector as *mut std::ffi::c_void;
                        (*ctx).get_format = Some(select_hw_format);
                    }
                    selector = Some(boxed);
                    hardware_context = Some(device);
                    hw_pix_fmt = Some(pix_fmt);
                }
                Err(e) => warn!("Falling back to software decoding: {}", e),
            }
        }

        let ProbedStream {
            input,
            stream_index,
            codec: decoder_codec,
            time_base,
            frame_rate,
        } = probed;

        let decoder = context
            .decoder()
            .open_as(decoder_codec)
            .and_then(|opened| opened.video())
            .map_err(|e| {
                GlitchLibError::new(
                    ErrorKind::DecoderInit,
                    format!("Cannot open decoder for stream {}: {}", stream_index, e),
                )
            })?;
        info!(
            "Decoder opened: {}x{} {:?}, time base {}, frame rate {}",
            decoder.width(),
            decoder.height(),
            decoder.format(),
            time_base,
            frame_rate
        );

        let converter = ColorConverter::new(
            decoder.width(),
            decoder.height(),
            decoder.format(),
            config.output_layout,
        )?;

        let corruptor = match config.seed {
            Some(seed) => PacketCorruptor::seeded(seed),
            None => PacketCorruptor::from_entropy(),
        };

        Ok(Self {
            converter,
            raw_frame: Video::empty(),
            host_frame: Video::empty(),
            packet: Packet::empty(),
            decoder,
            input,
            _selector: selector,
            hardware_context,
            hw_pix_fmt,
            stream_index,
            corruptor,
            state: SessionState::Reading,
            pending: false,
            pending_corrupted: false,
            glitched: false,
            frames_decoded: 0,
        })
    }

    /// Advances the bitstream by at most one packet and tries to produce one frame.
    /// With `touch` set the packet is corrupted before it reaches the decoder, and
    /// decoder rejections caused by corrupted input are reported as `Retry`.
    pub fn read(&mut self, touch: bool) -> Result<DecodeOutcome, GlitchLibError> {
        match self.state {
            SessionState::Ended => return Ok(DecodeOutcome::EndOfStream),
            SessionState::Flushed => {}
            SessionState::Reading if self.pending => {
                if let Some(outcome) = self.submit()? {
                    return Ok(outcome);
                }
            }
            SessionState::Reading => match self.packet.read(&mut self.input) {
                Ok(()) => {
                    if self.packet.stream() != self.stream_index {
                        self.unref_packet();
                        return Ok(DecodeOutcome::Retry);
                    }

                    self.pending_corrupted = self.corrupt_packet(touch);
                    self.glitched |= self.pending_corrupted;
                    if let Some(outcome) = self.submit()? {
                        return Ok(outcome);
                    }
                }
                Err(ffmpeg_next::Error::Eof) => self.flush()?,
                Err(ffmpeg_next::Error::Other { errno }) if errno == libc::EAGAIN => {
                    self.unref_packet();
                    return Ok(DecodeOutcome::Retry);
                }
                Err(e) => {
                    warn!("Cannot read packet, treating source as exhausted: {}", e);
                    self.unref_packet();
                    self.flush()?;
                }
            },
        }

        self.receive()
    }

    /// Hands the current packet to the decoder. A refused packet stays held
    /// and is submitted again on the next read, before anything new is demuxed.
    fn submit(&mut self) -> Result<Option<DecodeOutcome>, GlitchLibError> {
        let sent = self.decoder.send_packet(&self.packet);
        if let Err(ffmpeg_next::Error::Other { errno }) = sent {
            if errno == libc::EAGAIN {
                trace!("Decoder has pending output, holding packet");
                self.pending = true;
                return Ok(None);
            }
        }

        let corrupted = self.pending_corrupted;
        self.pending = false;
        self.pending_corrupted = false;
        self.unref_packet();

        match sent {
            Ok(()) => Ok(None),
            // Known imprecision: any rejection of a corrupted packet is
            // blamed on the corruption.
            Err(e) if corrupted => {
                debug!("Decoder rejected corrupted packet: {}", e);
                Ok(Some(DecodeOutcome::Retry))
            }
            Err(e) => Err(GlitchLibError::new(
                ErrorKind::Submit,
                format!("Error submitting a packet for decoding: {}", e),
            )),
        }
    }

    fn flush(&mut self) -> Result<(), GlitchLibError> {
        debug!("Source exhausted, flushing decoder");
        self.state = SessionState::Flushed;
        self.decoder.send_eof().map_err(|e| {
            GlitchLibError::new(
                ErrorKind::Submit,
                format!("Error flushing the decoder: {}", e),
            )
        })
    }

    fn receive(&mut self) -> Result<DecodeOutcome, GlitchLibError> {
        match self.decoder.receive_frame(&mut self.raw_frame) {
            Ok(()) => {}
            Err(ffmpeg_next::Error::Other { errno }) if errno == libc::EAGAIN => {
                return Ok(DecodeOutcome::Retry)
            }
            Err(ffmpeg_next::Error::Eof) => {
                info!("Decoder drained after {} frames", self.frames_decoded);
                self.state = SessionState::Ended;
                return Ok(DecodeOutcome::EndOfStream);
            }
            Err(e) => return self.decode_failure(e),
        }

        if self.is_device_frame() {
            self.transfer()?;
            self.converter.convert(&self.host_frame)?;
        } else {
            self.converter.convert(&self.raw_frame)?;
        }

        self.frames_decoded += 1;
        trace!("Frame {} ready", self.frames_decoded);
        Ok(DecodeOutcome::FrameReady)
    }

    /// Decoder delay can surface the damage from a corrupted packet on any
    /// later call, including while draining, so once the session has glitched
    /// every decode error is tolerated.
    fn decode_failure(&self, e: ffmpeg_next::Error) -> Result<DecodeOutcome, GlitchLibError> {
        if self.glitched {
            debug!("Decoding glitched input failed: {}", e);
            return Ok(DecodeOutcome::Retry);
        }
        Err(GlitchLibError::new(
            ErrorKind::Decode,
            format!("Error decoding frame: {}", e),
        ))
    }

    fn corrupt_packet(&mut self, touch: bool) -> bool {
        if !touch || self.packet.size() == 0 {
            return false;
        }
        // Demuxed packets may share their buffer; corrupt a private copy.
        if unsafe { av_packet_make_writable(self.packet.as_mut_ptr()) } < 0 {
            warn!("Cannot make packet writable, skipping corruption");
            return false;
        }
        match self.packet.data_mut() {
            Some(data) => self.corruptor.corrupt(data, true) > 0,
            None => false,
        }
    }

    fn unref_packet(&mut self) {
        unsafe { av_packet_unref(self.packet.as_mut_ptr()) };
    }

    fn is_device_frame(&self) -> bool {
        match self.hw_pix_fmt {
            Some(pix_fmt) => unsafe { (*self.raw_frame.as_ptr()).format == pix_fmt as i32 },
            None => false,
        }
    }

    fn transfer(&mut self) -> Result<(), GlitchLibError> {
        let ret = unsafe {
            av_frame_unref(self.host_frame.as_mut_ptr());
            av_hwframe_transfer_data(self.host_frame.as_mut_ptr(), self.raw_frame.as_ptr(), 0)
        };
        if ret < 0 {
            return Err(GlitchLibError::new(
                ErrorKind::Transfer,
                format!(
                    "Cannot transfer HW data to system memory: {}",
                    ffmpeg_next::Error::from(ret)
                ),
            ));
        }
        Ok(())
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry {
            width: self.converter.width(),
            height: self.converter.height(),
        }
    }

    pub fn stride(&self) -> usize {
        self.converter.stride()
    }

    pub fn data(&self) -> &[u8] {
        self.converter.data()
    }

    pub fn data_ptr(&self) -> *const u8 {
        self.converter.data_ptr()
    }

    pub fn is_accelerated(&self) -> bool {
        self.hardware_context.is_some()
    }

    pub fn is_ended(&self) -> bool {
        self.state == SessionState::Ended
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{fixture, FRAMES};
    use super::*;
    use std::path::Path;

    fn open_fixture(path: &Path, seed: Option<u64>) -> DecodeSession {
        let config = SessionConfig {
            seed,
            ..SessionConfig::default()
        };
        let locator = path.to_str().expect("utf-8 path");
        DecodeSession::open(locator, &config, &DeviceCatalog::default()).expect("open session")
    }

    #[test]
    fn selector_picks_only_its_own_format() {
        let selector = HwFormatSelector {
            pix_fmt: AVPixelFormat::AV_PIX_FMT_CUDA,
        };
        let offered = [AVPixelFormat::AV_PIX_FMT_CUDA, AVPixelFormat::AV_PIX_FMT_YUV420P];
        assert_eq!(selector.select(&offered), Some(AVPixelFormat::AV_PIX_FMT_CUDA));
        assert_eq!(selector.select(&offered[1..]), None);
    }

    #[test]
    fn two_selectors_do_not_share_state() {
        let cuda = HwFormatSelector {
            pix_fmt: AVPixelFormat::AV_PIX_FMT_CUDA,
        };
        let vaapi = HwFormatSelector {
            pix_fmt: AVPixelFormat::AV_PIX_FMT_VAAPI,
        };
        let offered = [AVPixelFormat::AV_PIX_FMT_VAAPI, AVPixelFormat::AV_PIX_FMT_CUDA];
        assert_eq!(cuda.select(&offered), Some(AVPixelFormat::AV_PIX_FMT_CUDA));
        assert_eq!(vaapi.select(&offered), Some(AVPixelFormat::AV_PIX_FMT_VAAPI));
    }

    #[test]
    fn refused_packet_is_submitted_again() {
        let (_dir, path) = fixture();
        let mut session = open_fixture(&path, None);

        // Feed packets without taking frames out until the decoder refuses one.
        let mut refused = false;
        for _ in 0..4 {
            session.packet.read(&mut session.input).expect("demux packet");
            match session.decoder.send_packet(&session.packet) {
                Ok(()) => session.unref_packet(),
                Err(ffmpeg_next::Error::Other { errno }) if errno == libc::EAGAIN => {
                    session.pending = true;
                    refused = true;
                    break;
                }
                Err(e) => panic!("send failed: {}", e),
            }
        }

        let mut frames = 0;
        for _ in 0..1000 {
            match session.read(false).expect("clean read") {
                DecodeOutcome::FrameReady => frames += 1,
                DecodeOutcome::Retry => {}
                DecodeOutcome::EndOfStream => break,
            }
            refused |= session.pending;
        }

        assert!(refused, "decoder never refused a packet");
        assert_eq!(frames, FRAMES);
        assert!(session.is_ended());
    }

    #[test]
    fn glitched_session_tolerates_late_decode_errors() {
        let (_dir, path) = fixture();
        let mut session = open_fixture(&path, Some(3));
        session.read(true).expect("glitched read");
        assert!(session.glitched);

        // Errors from damaged input may only show up while draining.
        session.state = SessionState::Flushed;
        let outcome = session
            .decode_failure(ffmpeg_next::Error::InvalidData)
            .expect("tolerated");
        assert_eq!(outcome, DecodeOutcome::Retry);
    }

    #[test]
    fn clean_session_reports_decode_errors() {
        let (_dir, path) = fixture();
        let mut session = open_fixture(&path, Some(3));
        session.read(false).expect("clean read");
        assert!(!session.glitched);

        session.state = SessionState::Flushed;
        let err = session
            .decode_failure(ffmpeg_next::Error::InvalidData)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Decode);
    }
}
