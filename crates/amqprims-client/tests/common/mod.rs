//! A scripted in-process broker over loopback TCP.
#![allow(dead_code)]

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use amqprims_client::{connect, ConnectOptions, Connection, FieldTable};
use amqprims_frame::{
    content_frames, BasicProperties, Frame, FrameConfig, FramePayload, FrameReader, FrameWriter,
    Method,
};
use amqprims_transport::AmqpStream;
use bytes::Bytes;

pub struct Broker {
    reader: FrameReader<TcpStream>,
    writer: FrameWriter<TcpStream>,
}

impl Broker {
    /// Next frame from the client, heartbeats included. `None` on EOF.
    pub fn next_frame(&mut self) -> Option<Frame> {
        self.reader.read_frame().ok()
    }

    /// Next method from the client, skipping heartbeats.
    pub fn recv(&mut self) -> (u16, Method) {
        loop {
            let frame = self.reader.read_frame().expect("client frame");
            let channel = frame.channel;
            match frame.payload {
                FramePayload::Heartbeat => continue,
                FramePayload::Method(method) => return (channel, method),
                other => panic!("expected a method on channel {channel}, got {other:?}"),
            }
        }
    }

    /// Next method, asserting its channel.
    pub fn recv_on(&mut self, channel: u16) -> Method {
        let (got, method) = self.recv();
        assert_eq!(got, channel, "method {method} on wrong channel");
        method
    }

    /// A published message: the publish method, its properties and body.
    pub fn recv_publish(&mut self, channel: u16) -> (Method, BasicProperties, Vec<u8>) {
        let method = self.recv_on(channel);
        assert!(matches!(method, Method::BasicPublish { .. }), "got {method}");
        let header = match self.reader.read_frame().expect("header frame").payload {
            FramePayload::Header(header) => header,
            other => panic!("expected header, got {other:?}"),
        };
        let mut body = Vec::new();
        while (body.len() as u64) < header.body_size {
            match self.reader.read_frame().expect("body frame").payload {
                FramePayload::Body(chunk) => body.extend_from_slice(&chunk),
                other => panic!("expected body, got {other:?}"),
            }
        }
        (method, header.properties, body)
    }

    pub fn send(&mut self, channel: u16, method: Method) {
        self.writer.send(channel, method).expect("broker send");
    }

    pub fn send_heartbeat(&mut self) {
        self.writer
            .write_frame(&Frame::heartbeat())
            .expect("broker heartbeat");
    }

    pub fn send_content(&mut self, channel: u16, method: Method, body: &[u8]) {
        let frames = content_frames(
            channel,
            method,
            BasicProperties::default(),
            Bytes::copy_from_slice(body),
            4096,
        );
        self.writer.write_frames(&frames).expect("broker send content");
    }

    pub fn deliver(&mut self, channel: u16, consumer_tag: &str, delivery_tag: u64, body: &[u8]) {
        self.send_content(
            channel,
            Method::BasicDeliver {
                consumer_tag: consumer_tag.to_string(),
                delivery_tag,
                redelivered: false,
                exchange: "amq.direct".to_string(),
                routing_key: "work".to_string(),
            },
            body,
        );
    }

    /// Answer start, tune and open with the given limits.
    pub fn handshake(&mut self, channel_max: u16, frame_max: u32, heartbeat: u16) {
        let mut server_properties = FieldTable::new();
        server_properties.insert("product", "FakeMQ");
        server_properties.insert("version", "3.13.0");
        self.send(
            0,
            Method::ConnectionStart {
                version_major: 0,
                version_minor: 9,
                server_properties,
                mechanisms: "AMQPLAIN PLAIN".to_string(),
                locales: "en_US".to_string(),
            },
        );
        assert!(matches!(self.recv_on(0), Method::ConnectionStartOk { .. }));
        self.send(
            0,
            Method::ConnectionTune {
                channel_max,
                frame_max,
                heartbeat,
            },
        );
        assert!(matches!(self.recv_on(0), Method::ConnectionTuneOk { .. }));
        assert!(matches!(self.recv_on(0), Method::ConnectionOpen { .. }));
        self.send(0, Method::ConnectionOpenOk);
        self.reader.set_frame_max(frame_max as usize);
        self.writer.set_frame_max(frame_max as usize);
    }

    /// Accept channel.open on `channel`.
    pub fn open_channel(&mut self, channel: u16) {
        assert_eq!(self.recv_on(channel), Method::ChannelOpen);
        self.send(channel, Method::ChannelOpenOk);
    }

    /// Wait for the client's connection.close and acknowledge it.
    pub fn expect_close(&mut self) {
        loop {
            let (channel, method) = self.recv();
            if channel == 0 && matches!(method, Method::ConnectionClose { .. }) {
                self.send(0, Method::ConnectionCloseOk);
                return;
            }
        }
    }

    /// Drain frames until the client goes away.
    pub fn drain(&mut self) {
        while self.next_frame().is_some() {}
    }
}

/// Start a broker on an ephemeral port running `script` for one client.
pub fn spawn_broker<F, R>(script: F) -> (u16, JoinHandle<R>)
where
    F: FnOnce(&mut Broker) -> R + Send + 'static,
    R: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let port = listener.local_addr().expect("local addr").port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept should succeed");
        let mut header = [0u8; 8];
        stream.read_exact(&mut header).expect("protocol header");
        assert_eq!(&header, b"AMQP\x00\x00\x09\x01");

        let config = FrameConfig::default();
        let mut broker = Broker {
            reader: FrameReader::with_config(
                stream.try_clone().expect("clone should succeed"),
                config.clone(),
            ),
            writer: FrameWriter::with_config(stream, config),
        };
        script(&mut broker)
    });
    (port, handle)
}

pub fn options(port: u16) -> ConnectOptions {
    ConnectOptions {
        port,
        timeout: Some(Duration::from_secs(5)),
        close_timeout: Duration::from_millis(500),
        ..ConnectOptions::default()
    }
}

/// Broker that completes the handshake with default limits, then runs `script`.
pub fn open_with<F, R>(script: F) -> (Connection<AmqpStream>, JoinHandle<R>)
where
    F: FnOnce(&mut Broker) -> R + Send + 'static,
    R: Send + 'static,
{
    let (port, handle) = spawn_broker(move |broker| {
        broker.handshake(2047, 131_072, 0);
        script(broker)
    });
    let conn = connect("127.0.0.1", &options(port)).expect("client should connect");
    (conn, handle)
}
