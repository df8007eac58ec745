mod common;

use std::time::{Duration, Instant};

use amqprims_client::{
    connect, BasicProperties, ConsumeOptions, ErrorKind, GetOptions, MessageSource, PublishOptions,
    QosOptions,
};
use amqprims_frame::{FramePayload, Method};
use common::{open_with, options, spawn_broker};

#[test]
fn published_message_comes_back_through_get() {
    let (mut conn, broker) = open_with(|broker| {
        broker.open_channel(1);
        let published = broker.recv_publish(1);
        assert!(matches!(broker.recv_on(1), Method::BasicGet { .. }));
        broker.send_content(
            1,
            Method::BasicGetOk {
                delivery_tag: 1,
                redelivered: false,
                exchange: "amq.direct".to_string(),
                routing_key: "jobs".to_string(),
                message_count: 0,
            },
            &published.2,
        );
        assert!(matches!(broker.recv_on(1), Method::BasicGet { .. }));
        broker.send(1, Method::BasicGetEmpty);
        broker.expect_close();
        published
    });

    conn.channel_open(1).expect("channel should open");
    let properties = BasicProperties {
        content_type: Some("text/plain".to_string()),
        ..BasicProperties::default()
    };
    conn.publish(1, "jobs", "hi", properties, &PublishOptions::default())
        .expect("publish should succeed");

    let message = conn
        .get(1, "jobs", &GetOptions::default())
        .expect("get should succeed")
        .expect("queue should hold the message");
    assert_eq!(message.body_str(), Some("hi"));
    assert_eq!(message.routing_key, "jobs");
    assert_eq!(message.delivery_tag, 1);
    assert_eq!(message.source, MessageSource::Fetched { message_count: 0 });
    assert!(message.consumer_tag().is_none());

    let empty = conn
        .get(1, "jobs", &GetOptions::default())
        .expect("get should succeed");
    assert!(empty.is_none());

    conn.disconnect().expect("disconnect should succeed");
    let (method, props, body) = broker.join().expect("broker thread should finish");
    assert_eq!(
        method,
        Method::BasicPublish {
            exchange: "amq.direct".to_string(),
            routing_key: "jobs".to_string(),
            mandatory: false,
            immediate: false,
        }
    );
    assert_eq!(props.content_type.as_deref(), Some("text/plain"));
    assert_eq!(body, b"hi");
}

#[test]
fn recv_honours_timeout_modes() {
    let (mut conn, broker) = open_with(|broker| {
        broker.open_channel(1);
        assert!(matches!(broker.recv_on(1), Method::BasicConsume { .. }));
        broker.send(
            1,
            Method::BasicConsumeOk {
                consumer_tag: "ctag-1".to_string(),
            },
        );
        std::thread::sleep(Duration::from_millis(300));
        broker.deliver(1, "ctag-1", 7, b"payload");
        let ack = broker.recv_on(1);
        assert!(matches!(broker.recv_on(1), Method::BasicCancel { .. }));
        broker.send(
            1,
            Method::BasicCancelOk {
                consumer_tag: "ctag-1".to_string(),
            },
        );
        broker.expect_close();
        ack
    });

    conn.channel_open(1).expect("channel should open");
    let options = ConsumeOptions {
        no_ack: false,
        ..ConsumeOptions::default()
    };
    let tag = conn.consume(1, "jobs", &options).expect("consume should succeed");
    assert_eq!(tag, "ctag-1");
    assert_eq!(conn.consumers().count(), 1);

    let started = Instant::now();
    assert!(conn.recv(-1).expect("buffered recv should succeed").is_none());
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(conn.recv(50).expect("timed recv should succeed").is_none());

    let message = conn
        .recv(0)
        .expect("blocking recv should succeed")
        .expect("blocking recv should return the delivery");
    assert_eq!(message.consumer_tag(), Some("ctag-1"));
    assert_eq!(message.delivery_tag, 7);
    assert_eq!(message.body.as_ref(), b"payload");
    assert_eq!(message.channel, 1);

    conn.ack(1, message.delivery_tag, false).expect("ack should succeed");
    assert!(conn.cancel(1, "ctag-1").expect("cancel should succeed"));
    assert!(!conn.cancel(1, "ctag-1").expect("second cancel should succeed"));
    assert_eq!(conn.consumers().count(), 0);

    conn.disconnect().expect("disconnect should succeed");
    let ack = broker.join().expect("broker thread should finish");
    assert_eq!(
        ack,
        Method::BasicAck {
            delivery_tag: 7,
            multiple: false,
        }
    );
}

#[test]
fn deliveries_are_buffered_during_calls_on_other_channels() {
    let (mut conn, broker) = open_with(|broker| {
        broker.open_channel(1);
        broker.open_channel(2);
        assert!(matches!(broker.recv_on(1), Method::BasicConsume { .. }));
        broker.send(
            1,
            Method::BasicConsumeOk {
                consumer_tag: "ctag-1".to_string(),
            },
        );
        assert!(matches!(broker.recv_on(2), Method::BasicQos { .. }));
        broker.deliver(1, "ctag-1", 1, b"first");
        broker.send(2, Method::BasicQosOk);
        broker.expect_close();
    });

    conn.channel_open(1).expect("channel 1 should open");
    conn.channel_open(2).expect("channel 2 should open");
    conn.consume(1, "jobs", &ConsumeOptions::default())
        .expect("consume should succeed");
    conn.basic_qos(2, &QosOptions::default())
        .expect("qos should succeed");
    assert_eq!(conn.pending_deliveries(), 1);

    let message = conn
        .recv(-1)
        .expect("recv should succeed")
        .expect("buffered delivery should be returned");
    assert_eq!(message.channel, 1);
    assert_eq!(message.body_str(), Some("first"));
    assert_eq!(conn.pending_deliveries(), 0);

    conn.disconnect().expect("disconnect should succeed");
    broker.join().expect("broker thread should finish");
}

#[test]
fn large_bodies_are_split_at_negotiated_frame_max() {
    let (port, broker) = spawn_broker(|broker| {
        broker.handshake(2047, 4096, 0);
        broker.open_channel(1);
        assert!(matches!(broker.recv_on(1), Method::BasicPublish { .. }));
        let header = broker.next_frame().expect("header frame");
        let body_size = match header.payload {
            FramePayload::Header(header) => header.body_size,
            other => panic!("expected header, got {other:?}"),
        };
        let mut chunks = Vec::new();
        let mut seen = 0u64;
        while seen < body_size {
            match broker.next_frame().expect("body frame").payload {
                FramePayload::Body(chunk) => {
                    seen += chunk.len() as u64;
                    chunks.push(chunk.len());
                }
                other => panic!("expected body, got {other:?}"),
            }
        }
        broker.expect_close();
        (body_size, chunks)
    });

    let mut conn = connect("127.0.0.1", &options(port)).expect("connect should succeed");
    assert_eq!(conn.frame_max(), 4096);
    conn.channel_open(1).expect("channel should open");
    conn.publish(
        1,
        "bulk",
        vec![0xAB; 10_000],
        BasicProperties::default(),
        &PublishOptions::default(),
    )
    .expect("publish should succeed");

    conn.disconnect().expect("disconnect should succeed");
    let (body_size, chunks) = broker.join().expect("broker thread should finish");
    assert_eq!(body_size, 10_000);
    assert_eq!(chunks, vec![4088, 4088, 1824]);
}

#[test]
fn unroutable_mandatory_message_is_returned() {
    let (mut conn, broker) = open_with(|broker| {
        broker.open_channel(1);
        let (_, _, body) = broker.recv_publish(1);
        broker.send_content(
            1,
            Method::BasicReturn {
                reply_code: 312,
                reply_text: "NO_ROUTE".to_string(),
                exchange: "amq.direct".to_string(),
                routing_key: "nowhere".to_string(),
            },
            &body,
        );
        assert!(matches!(broker.recv_on(1), Method::BasicQos { .. }));
        broker.send(1, Method::BasicQosOk);
        broker.expect_close();
    });

    conn.channel_open(1).expect("channel should open");
    let options = PublishOptions {
        mandatory: true,
        ..PublishOptions::default()
    };
    conn.publish(1, "nowhere", "lost", BasicProperties::default(), &options)
        .expect("publish should succeed");
    assert!(conn.take_returned(1).is_none());

    conn.basic_qos(1, &QosOptions::default())
        .expect("qos should succeed");
    let returned = conn.take_returned(1).expect("return should be queued");
    assert_eq!(returned.body_str(), Some("lost"));
    assert_eq!(returned.delivery_tag, 0);
    assert_eq!(
        returned.source,
        MessageSource::Returned {
            reply_code: 312,
            reply_text: "NO_ROUTE".to_string(),
        }
    );
    assert_eq!(conn.pending_deliveries(), 0);

    conn.disconnect().expect("disconnect should succeed");
    broker.join().expect("broker thread should finish");
}

#[test]
fn publisher_confirms_report_nacks() {
    let (mut conn, broker) = open_with(|broker| {
        broker.open_channel(1);
        assert_eq!(broker.recv_on(1), Method::ConfirmSelect { no_wait: false });
        broker.send(1, Method::ConfirmSelectOk);
        for _ in 0..3 {
            broker.recv_publish(1);
        }
        broker.send(
            1,
            Method::BasicAck {
                delivery_tag: 2,
                multiple: true,
            },
        );
        broker.send(
            1,
            Method::BasicNack {
                delivery_tag: 3,
                multiple: false,
                requeue: false,
            },
        );
        broker.recv_publish(1);
        broker.send(
            1,
            Method::BasicAck {
                delivery_tag: 4,
                multiple: false,
            },
        );
        broker.expect_close();
    });

    conn.channel_open(1).expect("channel should open");
    let err = conn
        .wait_for_confirms(1, Some(Duration::from_millis(10)))
        .expect_err("confirms are not enabled yet");
    assert_eq!(err.kind(), ErrorKind::Channel);

    conn.confirm_select(1).expect("confirm select should succeed");
    for n in 0..3 {
        conn.publish(
            1,
            "jobs",
            format!("m{n}"),
            BasicProperties::default(),
            &PublishOptions::default(),
        )
        .expect("publish should succeed");
    }
    let all_acked = conn
        .wait_for_confirms(1, Some(Duration::from_secs(5)))
        .expect("confirms should settle");
    assert!(!all_acked);

    conn.publish(1, "jobs", "m3", BasicProperties::default(), &PublishOptions::default())
        .expect("publish should succeed");
    let all_acked = conn
        .wait_for_confirms(1, Some(Duration::from_secs(5)))
        .expect("confirms should settle");
    assert!(all_acked);
    assert!(conn
        .wait_for_confirms(1, Some(Duration::from_millis(10)))
        .expect("nothing outstanding should settle at once"));
    let err = conn
        .tx_select(1)
        .expect_err("transactions should be refused in confirm mode");
    assert_eq!(err.kind(), ErrorKind::Channel);

    conn.disconnect().expect("disconnect should succeed");
    broker.join().expect("broker thread should finish");
}
