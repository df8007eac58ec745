use std::io::{ErrorKind, Read};

use amqprims_transport::{Transport, TransportError};
use bytes::BytesMut;
use tracing::trace;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// Bytes that arrive ahead of the frame being read stay buffered for the
/// next call, including across read timeouts.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached. A
    /// stream read timeout surfaces as `FrameError::Io` with kind
    /// `WouldBlock` or `TimedOut`; partial data is kept.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.buffered_frame()? {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Decode a frame from already-buffered bytes without touching the stream.
    pub fn buffered_frame(&mut self) -> Result<Option<Frame>> {
        let frame = decode_frame(&mut self.buf, self.config.frame_max)?;
        if let Some(frame) = &frame {
            trace!(channel = frame.channel, kind = frame.kind(), "frame received");
        }
        Ok(frame)
    }

    /// True if bytes are waiting in the read buffer.
    pub fn has_buffered_data(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update the frame size limit for subsequent decoding (0 = no limit).
    pub fn set_frame_max(&mut self, frame_max: usize) {
        self.config.frame_max = frame_max;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: Transport> FrameReader<T> {
    /// Create a frame reader over a transport and apply the read timeout from config.
    pub fn with_transport(inner: T, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: TransportError) -> FrameError {
    match err {
        TransportError::Io(io) => FrameError::Io(io),
        TransportError::Connect { source, .. } | TransportError::Resolve { source, .. } => {
            FrameError::Io(source)
        }
        TransportError::Shutdown => FrameError::ConnectionClosed,
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
