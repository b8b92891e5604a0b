//! Connects to the echo server, sends a framed message, and prints the
//! echoed reply.

use std::time::Duration;

use netcore::prelude::*;

fn main() -> Result<()> {
    env_logger::init();

    let mut client = TcpEndpoint::new();
    client.set_connect_timeout(Some(Duration::from_secs(5)));
    client.connect("127.0.0.1", "9000")?;

    let msg = SocketMessage::new(1, 1, PayloadType::String, b"hello from the demo client".to_vec());
    send_message(&mut client, &msg, SendOptions::default())?;

    match wait_message(&mut client, Duration::from_secs(5), &NeverStop)? {
        Some(reply) => println!("server echoed: {}", reply.as_string()?),
        None => println!("no reply within the timeout"),
    }

    client.disconnect()
}
