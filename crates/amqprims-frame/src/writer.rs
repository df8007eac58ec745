use std::io::{ErrorKind, Write};

use amqprims_transport::Transport;
use bytes::BytesMut;
use tracing::trace;

use crate::codec::{check_frame_size, encode_frame, Frame, FrameConfig};
use crate::constants::PROTOCOL_HEADER;
use crate::error::{FrameError, Result};
use crate::method::Method;
use crate::reader::transport_to_frame_error;

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_frames(std::slice::from_ref(frame))
    }

    /// Encode a method and send it on a channel.
    pub fn send(&mut self, channel: u16, method: Method) -> Result<()> {
        self.write_frame(&Frame::method(channel, method))
    }

    /// Write a run of frames with a single write, so nothing interleaves.
    ///
    /// Every frame is checked against `frame_max` before any byte is sent.
    pub fn write_frames(&mut self, frames: &[Frame]) -> Result<()> {
        self.buf.clear();
        for frame in frames {
            let start = self.buf.len();
            encode_frame(frame, &mut self.buf)?;
            check_frame_size(self.buf.len() - start, self.config.frame_max)?;
            trace!(channel = frame.channel, kind = frame.kind(), "frame sent");
        }
        let wire = self.buf.split();
        self.write_all(&wire)
    }

    /// Send the 8-byte protocol header that opens a connection.
    pub fn write_protocol_header(&mut self) -> Result<()> {
        self.write_all(&PROTOCOL_HEADER)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update the frame size limit for subsequent writes (0 = no limit).
    pub fn set_frame_max(&mut self, frame_max: usize) {
        self.config.frame_max = frame_max;
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: Transport> FrameWriter<T> {
    /// Create a frame writer over a transport and apply the write timeout from config.
    pub fn with_transport(inner: T, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use bytes::{Bytes, BytesMut};

    use super::*;
    use crate::codec::{decode_frame, FramePayload};

    fn decode_all(bytes: Vec<u8>) -> Vec<Frame> {
        let mut wire = BytesMut::from(bytes.as_slice());
        let mut frames = Vec::new();
        while let Some(frame) = decode_frame(&mut wire, 0).unwrap() {
            frames.push(frame);
        }
        assert!(wire.is_empty());
        frames
    }

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(1, Method::ChannelOpen).unwrap();

        let frames = decode_all(writer.into_inner().into_inner());
        assert_eq!(frames, vec![Frame::method(1, Method::ChannelOpen)]);
    }

    #[test]
    fn write_frames_is_one_contiguous_write() {
        let sink = CountingWriter::default();
        let mut writer = FrameWriter::new(sink);
        let frames = [
            Frame::method(
                1,
                Method::BasicPublish {
                    exchange: "amq.direct".into(),
                    routing_key: "rk".into(),
                    mandatory: false,
                    immediate: false,
                },
            ),
            Frame::body(1, Bytes::from_static(b"one")),
            Frame::body(1, Bytes::from_static(b"two")),
        ];

        writer.write_frames(&frames).unwrap();

        let sink = writer.into_inner();
        assert_eq!(sink.writes, 1);
        assert_eq!(decode_all(sink.data), frames.to_vec());
    }

    #[test]
    fn oversized_frame_rejected_before_any_write() {
        let cfg = FrameConfig {
            frame_max: 16,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(CountingWriter::default(), cfg);

        let err = writer
            .write_frames(&[Frame::heartbeat(), Frame::body(1, vec![0u8; 9])])
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 17, max: 16 }));
        assert_eq!(writer.into_inner().writes, 0);
    }

    #[test]
    fn frame_at_exactly_frame_max_is_accepted() {
        let cfg = FrameConfig {
            frame_max: 16,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        writer.write_frame(&Frame::body(1, vec![0u8; 8])).unwrap();
        assert_eq!(writer.get_ref().get_ref().len(), 16);
    }

    #[test]
    fn protocol_header_bytes() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_protocol_header().unwrap();
        assert_eq!(writer.into_inner().into_inner(), b"AMQP\x00\x00\x09\x01");
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer.write_frame(&Frame::heartbeat()).unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn writer_over_borrowed_stream() {
        let mut sink = Cursor::new(Vec::<u8>::new());
        FrameWriter::new(&mut sink)
            .write_frame(&Frame::heartbeat())
            .unwrap();
        FrameWriter::new(&mut sink)
            .send(0, Method::ConnectionCloseOk)
            .unwrap();

        let frames = decode_all(sink.into_inner());
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].kind(), "connection.close-ok");
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let writer_impl = InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        };

        let mut writer = FrameWriter::new(writer_impl);
        writer.write_frame(&Frame::heartbeat()).unwrap();

        let inner = writer.into_inner();
        assert_eq!(decode_all(inner.data), vec![Frame::heartbeat()]);
    }

    #[test]
    fn write_timeout_is_reported() {
        let mut writer = FrameWriter::new(TimedOutWriter);
        let err = writer.write_frame(&Frame::heartbeat()).unwrap_err();
        assert!(matches!(err, FrameError::Io(ref e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.write_frame(&Frame::heartbeat()).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    #[cfg(unix)]
    fn applies_write_timeout_for_transport() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let cfg = FrameConfig {
            write_timeout: Some(std::time::Duration::from_millis(10)),
            ..FrameConfig::default()
        };

        let writer = FrameWriter::with_transport(left, cfg).unwrap();
        assert_eq!(
            writer.get_ref().write_timeout().unwrap(),
            Some(std::time::Duration::from_millis(10))
        );
    }

    #[test]
    fn written_bytes_decode() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.write_frame(&Frame::body(3, Bytes::from_static(b"z"))).unwrap();

        let wire = writer.into_inner().into_inner();
        let mut framed = crate::reader::FrameReader::new(Cursor::new(wire));
        let frame = framed.read_frame().unwrap();
        assert_eq!(frame.channel, 3);
        assert_eq!(frame.payload, FramePayload::Body(Bytes::from_static(b"z")));
    }

    #[derive(Default)]
    struct CountingWriter {
        writes: usize,
        data: Vec<u8>,
    }

    impl Write for CountingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.writes += 1;
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct TimedOutWriter;

    impl Write for TimedOutWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
