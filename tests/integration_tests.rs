//! End-to-end scenarios exercising the public API across module boundaries.

use std::thread;
use std::time::{Duration, Instant};

use netcore::prelude::*;

fn connect_retry(client: &mut TcpEndpoint, port: u16) {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if client.connect("127.0.0.1", &port.to_string()).is_ok() {
            return;
        }
        if Instant::now() > deadline {
            panic!("could not connect to test listener on port {port}");
        }
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn ipv4_parse_and_format() {
    let addr = IpAddress::parse("192.168.1.100").unwrap();
    assert_eq!(addr.family(), Family::V4);
    assert_eq!(addr.to_string(), "192.168.1.100");
    assert!(addr.is_private());
    assert!(!addr.is_loopback());

    let loopback = IpAddress::parse("127.0.0.1").unwrap();
    assert!(loopback.is_loopback());
}

#[test]
fn ipv6_canonicalization() {
    let addr = IpAddress::parse("2001:0db8:0000:0000:0000:0000:0000:0001").unwrap();
    assert_eq!(addr.family(), Family::V6);
    assert_eq!(addr.to_string(), "2001:db8::1");

    let loopback = IpAddress::parse("::1").unwrap();
    assert!(loopback.is_loopback());
}

#[test]
fn cidr_containment_and_bounds() {
    let net = IpNetwork::parse("10.0.0.0/24").unwrap();
    assert_eq!(net.prefix_len(), 24);
    assert!(net.contains(&IpAddress::parse("10.0.0.1").unwrap()));
    assert!(net.contains(&IpAddress::parse("10.0.0.255").unwrap()));
    assert!(!net.contains(&IpAddress::parse("10.0.1.1").unwrap()));
    assert_eq!(net.first().to_string(), "10.0.0.0");
    assert_eq!(net.last().to_string(), "10.0.0.255");
}

#[test]
fn netmask_form_cidr() {
    let net = IpNetwork::parse("192.168.0.0/255.255.255.0").unwrap();
    assert_eq!(net.prefix_len(), 24);
    assert!(net.contains(&IpAddress::parse("192.168.0.42").unwrap()));
}

#[test]
fn framed_echo_server_and_client() {
    let mut server = TcpEndpoint::new();
    server.bind("127.0.0.1", 0).unwrap();
    let port = server.local_addr().unwrap().port().unwrap();

    let stop = server.stop_flag();
    let handle = thread::spawn(move || {
        let mut handler = |mut conn: TcpEndpoint, _host: &str, _port: u16| {
            if let Ok(Some(msg)) = wait_message(&mut conn, Duration::from_secs(2), &NeverStop) {
                let _ = send_message(&mut conn, &msg, SendOptions::default());
            }
            AcceptDecision::Accept
        };
        server.listen(8, Duration::from_millis(20), &mut handler).unwrap();
    });

    let mut client = TcpEndpoint::new();
    connect_retry(&mut client, port);

    let msg = SocketMessage::new(1, 42, PayloadType::String, b"ping".to_vec());
    send_message(&mut client, &msg, SendOptions::default()).unwrap();

    let reply = wait_message(&mut client, Duration::from_secs(2), &NeverStop).unwrap().unwrap();
    assert_eq!(reply.as_string().unwrap(), "ping");

    stop.signal();
    handle.join().unwrap();
}

#[test]
fn compressed_large_payload_round_trips() {
    let mut server = TcpEndpoint::new();
    server.bind("127.0.0.1", 0).unwrap();
    let port = server.local_addr().unwrap().port().unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    let stop = server.stop_flag();
    let handle = thread::spawn(move || {
        let mut handler = move |endpoint: TcpEndpoint, _: &str, _: u16| {
            let _ = tx.send(endpoint);
            AcceptDecision::Accept
        };
        server.listen(8, Duration::from_millis(20), &mut handler).unwrap();
    });

    let mut client = TcpEndpoint::new();
    connect_retry(&mut client, port);
    let mut server_side = rx.recv_timeout(Duration::from_secs(2)).unwrap();

    let payload = vec![b'x'; 8192];
    let msg = SocketMessage::new(1, 7, PayloadType::Binary, payload.clone());
    send_message(&mut client, &msg, SendOptions::default()).unwrap();

    let received = wait_message(&mut server_side, Duration::from_secs(2), &NeverStop).unwrap().unwrap();
    assert_eq!(received.as_bytes().unwrap(), payload.as_slice());

    stop.signal();
    handle.join().unwrap();
}

#[test]
fn cancellable_accept_loop() {
    let mut server = TcpEndpoint::new();
    server.bind("127.0.0.1", 0).unwrap();
    let stop = server.stop_flag();

    let handle = thread::spawn(move || {
        let mut handler = |conn: TcpEndpoint, _: &str, _: u16| {
            drop(conn);
            AcceptDecision::Accept
        };
        server.listen(8, Duration::from_millis(10), &mut handler).unwrap();
    });

    thread::sleep(Duration::from_millis(50));
    stop.signal();

    let deadline = Instant::now() + Duration::from_secs(2);
    while !handle.is_finished() {
        if Instant::now() > deadline {
            panic!("accept loop did not exit after stop signal");
        }
        thread::sleep(Duration::from_millis(10));
    }
    handle.join().unwrap();
}

#[test]
fn read_loop_honors_watch_cancellation() {
    let mut server = TcpEndpoint::new();
    server.bind("127.0.0.1", 0).unwrap();
    let port = server.local_addr().unwrap().port().unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    let stop = server.stop_flag();
    let handle = thread::spawn(move || {
        let mut handler = move |endpoint: TcpEndpoint, _: &str, _: u16| {
            let _ = tx.send(endpoint);
            AcceptDecision::Accept
        };
        server.listen(8, Duration::from_millis(20), &mut handler).unwrap();
    });

    let mut client = TcpEndpoint::new();
    connect_retry(&mut client, port);
    let mut server_side = rx.recv_timeout(Duration::from_secs(2)).unwrap();

    let watch_stop = StopFlag::new();
    let watch_stop_clone = watch_stop.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        watch_stop_clone.signal();
    });

    let mut buf = [0u8; 16];
    let result = server_side.read_loop(&mut buf, Some(Duration::from_secs(5)), &watch_stop);
    assert!(result.is_err());

    stop.signal();
    handle.join().unwrap();
}

#[test]
fn tls_context_reference_counting() {
    let ctx = TlsContext::new();
    ctx.init(TlsMethod::Tls).unwrap();

    let handle_a = ctx.new_handle().unwrap();
    let handle_b = ctx.new_handle().unwrap();
    assert_eq!(ctx.reference_count(), 2);

    ctx.release_handle(handle_a).unwrap();
    assert_eq!(ctx.reference_count(), 1);

    ctx.release_handle(handle_b).unwrap();
    assert_eq!(ctx.reference_count(), 0);
}

#[test]
fn udp_connect_send_recv_round_trip() {
    let mut server = UdpEndpoint::new();
    server.bind("127.0.0.1", 0).unwrap();
    let port = server.local_addr().unwrap().port().unwrap();

    let mut client = UdpEndpoint::new();
    client.bind("127.0.0.1", 0).unwrap();
    client.connect("127.0.0.1", &port.to_string()).unwrap();
    client.write(b"hello").unwrap();

    let mut buf = [0u8; 5];
    let (n, _host, _port) = server.recv_from(&mut buf).unwrap();
    assert_eq!(n, 5);
    assert_eq!(&buf, b"hello");
}
