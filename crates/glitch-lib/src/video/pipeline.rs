use super::{
    catalog::DeviceCatalog,
    decoder::DecodeSession,
    types::{DecodeOutcome, FrameGeometry, SessionConfig},
};
use glitch_types::{ErrorKind, GlitchLibError, ReadStatus};
use log::error;

/// Pull-based glitch pipeline over one video source.
///
/// Construction never fails outright: a pipeline that could not be built stays
/// around in an invalid state, reports `is_valid() == false`, and answers every
/// `read` with `ReadStatus::Fatal`.
pub struct GlitchPipeline {
    session: Result<DecodeSession, GlitchLibError>,
    catalog: DeviceCatalog,
    last_error: Option<GlitchLibError>,
}

impl GlitchPipeline {
    pub fn new(locator: &str, config: SessionConfig) -> Self {
        let catalog = DeviceCatalog::enumerate();
        let session = DecodeSession::open(locator, &config, &catalog);
        let last_error = match &session {
            Ok(_) => None,
            Err(e) => {
                error!("Cannot build pipeline for {}: {}", locator, e);
                Some(e.clone())
            }
        };
        Self {
            session,
            catalog,
            last_error,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.session.is_ok()
    }

    pub fn is_accelerated(&self) -> bool {
        self.session
            .as_ref()
            .map_or(false, DecodeSession::is_accelerated)
    }

    /// Backends available on this host, regardless of what was requested.
    pub fn list_hw_accelerators(&self) -> Vec<String> {
        self.catalog.names()
    }

    /// Frame size, `0x0` when the pipeline is invalid.
    pub fn geometry(&self) -> FrameGeometry {
        self.session
            .as_ref()
            .map_or(FrameGeometry { width: 0, height: 0 }, DecodeSession::geometry)
    }

    pub fn stride(&self) -> usize {
        self.session.as_ref().map_or(0, DecodeSession::stride)
    }

    /// The output frame, valid until the next `read`.
    pub fn buffer(&self) -> Option<&[u8]> {
        self.session.as_ref().ok().map(DecodeSession::data)
    }

    pub fn buffer_ptr(&self) -> *const u8 {
        self.session
            .as_ref()
            .map_or(std::ptr::null(), DecodeSession::data_ptr)
    }

    pub fn last_error(&self) -> Option<&GlitchLibError> {
        self.last_error.as_ref()
    }

    pub fn session(&self) -> Option<&DecodeSession> {
        self.session.as_ref().ok()
    }

    pub fn read(&mut self, touch: bool) -> ReadStatus {
        let session = match &mut self.session {
            Ok(session) => session,
            Err(cause) => {
                self.last_error = Some(GlitchLibError::new(
                    ErrorKind::InvalidPipeline,
                    format!("Pipeline construction failed: {}", cause),
                ));
                return ReadStatus::Fatal;
            }
        };

        match session.read(touch) {
            Ok(DecodeOutcome::FrameReady) => ReadStatus::FrameReady,
            Ok(DecodeOutcome::Retry) => ReadStatus::Retry,
            Ok(DecodeOutcome::EndOfStream) => ReadStatus::EndOfStream,
            Err(e) => {
                error!("{}", e);
                self.last_error = Some(e);
                ReadStatus::Fatal
            }
        }
    }
}
