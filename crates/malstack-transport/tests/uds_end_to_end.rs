#![cfg(unix)]

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use malstack_encoding::{Blob, StreamFactory, Uri};
use malstack_message::{
    Area, HeaderFields, InteractionType, Message, MessageBody, Operation, OperationFields,
    QosProperties, Service,
};
use malstack_transport::{
    standard, Endpoint, FrameReader, GenericTransport, TransportConfig, UdsListener,
};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/malstack-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

#[test]
fn messages_cross_a_unix_socket() {
    let dir = unique_temp_dir("e2e");
    let sock_path = dir.join("ground.sock");
    let ground_base = format!("maluds://{}", sock_path.display());

    let config = TransportConfig {
        encoding: "spp".into(),
        ..TransportConfig::default()
    };

    let ground = GenericTransport::new(ground_base.clone(), config.clone()).unwrap();
    let archive = ground.create_endpoint("archive").unwrap();
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    archive.set_listener(Arc::new(move |_: &Endpoint, msg: Message| {
        let _ = tx.lock().unwrap().send(msg);
    }));
    archive.start();

    let listener = UdsListener::bind(&sock_path).unwrap();
    let dispatcher = ground.dispatcher();
    let frame_config = config.frame_config();
    let server = std::thread::spawn(move || {
        let stream = listener.accept().unwrap();
        dispatcher
            .serve(FrameReader::with_config(stream, frame_config))
            .unwrap()
    });

    let satellite = GenericTransport::new("malmem://sat", config).unwrap();
    satellite.connect_uds(ground_base.as_str(), &sock_path).unwrap();
    let app = satellite.create_endpoint("app").unwrap();

    let area = Area::new("COM", 2, 1);
    let service = Service::new("Archive", 3, &area);
    let op = Operation::new("store", 1, InteractionType::Submit, &service);
    for tid in 0..3 {
        let msg = app
            .create_message_for_operation(
                &op,
                OperationFields {
                    uri_to: archive.uri().clone(),
                    transaction_id: tid,
                    ..OperationFields::default()
                },
                MessageBody::from_parts([format!("record-{tid}")]),
                QosProperties::new(),
            )
            .unwrap();
        app.send(&msg).unwrap();
    }

    let factory = StreamFactory::for_name("spp").unwrap();
    for tid in 0..3 {
        let msg = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(msg.header().transaction_id(), tid);
        assert_eq!(msg.header().uri_from(), &Uri::new("malmem://sat/app"));
        assert_eq!(msg.header().fields().service_area, 2);
        let mut body = msg.body_reader(&factory).unwrap();
        assert_eq!(
            body.read_part::<String>().unwrap(),
            Some(format!("record-{tid}"))
        );
    }

    satellite.close();
    assert_eq!(server.join().unwrap(), 3);
    drop(ground);
    let _ = std::fs::remove_dir_all(&dir);
}

/// Accepts one connection and holds it open without reading until told to stop.
fn silent_peer(listener: UdsListener) -> (mpsc::Sender<()>, std::thread::JoinHandle<()>) {
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let handle = std::thread::spawn(move || {
        let _stream = listener.accept().unwrap();
        let _ = stop_rx.recv();
    });
    (stop_tx, handle)
}

fn oversized_message(ep: &Endpoint, to: &str) -> Message {
    ep.create_message(
        HeaderFields {
            uri_to: Uri::new(to),
            ..HeaderFields::default()
        },
        MessageBody::from_parts([Blob::from(vec![0u8; 8 * 1024 * 1024])]),
        QosProperties::new(),
    )
    .unwrap()
}

#[test]
fn write_timeout_fails_send_to_stalled_peer() {
    let dir = unique_temp_dir("wtimeout");
    let sock_path = dir.join("peer.sock");
    let peer_base = format!("maluds://{}", sock_path.display());
    let (stop, peer) = silent_peer(UdsListener::bind(&sock_path).unwrap());

    let transport = GenericTransport::new(
        "malmem://local",
        TransportConfig {
            write_timeout_ms: Some(100),
            ..TransportConfig::default()
        },
    )
    .unwrap();
    transport.connect_uds(peer_base.as_str(), &sock_path).unwrap();
    let ep = transport.create_endpoint("app").unwrap();

    let err = ep
        .send(&oversized_message(&ep, &format!("{peer_base}/sink")))
        .unwrap_err();
    assert_eq!(err.number, standard::DELIVERY_FAILED);

    transport.close();
    stop.send(()).unwrap();
    peer.join().unwrap();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn close_after_delivery_timeout_does_not_hang() {
    let dir = unique_temp_dir("dtimeout");
    let sock_path = dir.join("peer.sock");
    let peer_base = format!("maluds://{}", sock_path.display());
    let (stop, peer) = silent_peer(UdsListener::bind(&sock_path).unwrap());

    let transport = GenericTransport::new(
        "malmem://local",
        TransportConfig {
            delivery_timeout_ms: Some(200),
            ..TransportConfig::default()
        },
    )
    .unwrap();
    transport.connect_uds(peer_base.as_str(), &sock_path).unwrap();
    let ep = transport.create_endpoint("app").unwrap();

    let err = ep
        .send(&oversized_message(&ep, &format!("{peer_base}/sink")))
        .unwrap_err();
    assert_eq!(err.number, standard::DELIVERY_TIMEDOUT);

    // The worker is still blocked in the write; closing must unblock it.
    let (done_tx, done_rx) = mpsc::channel();
    std::thread::spawn(move || {
        transport.close();
        let _ = done_tx.send(());
    });
    done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("close returns while a write is blocked");

    stop.send(()).unwrap();
    peer.join().unwrap();
    let _ = std::fs::remove_dir_all(&dir);
}
