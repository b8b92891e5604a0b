//! A minimal echo server built on `netcore`'s blocking TCP endpoint.

use std::time::Duration;

use netcore::prelude::*;

fn main() -> Result<()> {
    env_logger::init();

    let mut server = TcpEndpoint::new();
    server.bind("0.0.0.0", 9000)?;
    log::info!("listening on 0.0.0.0:9000");

    let mut handler = |mut conn: TcpEndpoint, peer_host: &str, peer_port: u16| {
        log::info!("accepted connection from {peer_host}:{peer_port}");
        let mut buf = [0u8; 4096];
        loop {
            match conn.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if conn.write(&buf[..n]).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        AcceptDecision::Accept
    };

    server.listen(128, Duration::from_millis(100), &mut handler)
}
