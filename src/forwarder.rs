//! UDP forwarding of received messages.
//!
//! Every decoded message the arbiter drains is also handed to this task,
//! which relays its text to the configured UDP endpoint (a local digipeater
//! or logging sink). Send failures are logged and the message is dropped;
//! forwarding is best-effort and never blocks the arbiter.

use std::net::UdpSocket;

use log::{log, Level};

use crate::ForwardQueueReceiver;

#[cfg_attr(feature = "std", embassy_executor::task(pool_size = 8))]
pub(crate) async fn udp_forwarder_task(forward_addr: core::net::SocketAddrV4, forward_receiver: ForwardQueueReceiver) {
    let socket = match UdpSocket::bind("0.0.0.0:0") {
        Ok(socket) => Some(socket),
        Err(error) => {
            log!(Level::Error, "UDP forwarder could not bind a socket: {}", error);
            None
        }
    };

    loop {
        let message = forward_receiver.receive().await;
        let Some(socket) = socket.as_ref() else {
            continue;
        };
        match socket.send_to(message.as_text().as_bytes(), forward_addr) {
            Ok(_) => {
                log!(Level::Debug, "Forwarded {} bytes to {}", message.length(), forward_addr);
            }
            Err(error) => {
                log!(Level::Warn, "UDP forward to {} failed: {}", forward_addr, error);
            }
        }
    }
}
