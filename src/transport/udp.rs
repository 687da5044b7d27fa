//! UDP transport: one datagram per Matter frame.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::core::TransportError;
use crate::session::TransportBinding;

use super::TransportEvent;

/// Receive buffer size; a Matter frame always fits a datagram.
const RECV_BUFFER_SIZE: usize = 65535;

/// UDP socket handle; the receive loop runs in a spawned task.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind and spawn the receive loop; datagrams flow to `events`.
    pub async fn bind(
        addr: SocketAddr,
        events: mpsc::Sender<TransportEvent>,
    ) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);

        let recv_socket = Arc::clone(&socket);
        tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_SIZE];
            loop {
                match recv_socket.recv_from(&mut buf).await {
                    Ok((len, peer)) => {
                        let event = TransportEvent::Frame {
                            binding: TransportBinding::Udp(peer),
                            data: buf[..len].to_vec(),
                        };
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self { socket })
    }

    /// Bound address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Send one frame to a peer.
    pub async fn send_to(&self, addr: SocketAddr, data: &[u8]) -> Result<(), TransportError> {
        self.socket.send_to(data, addr).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_frame_event() {
        let (tx, mut rx) = mpsc::channel(16);
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), tx)
            .await
            .unwrap();
        let addr = transport.local_addr().unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"datagram", addr).await.unwrap();

        let Some(TransportEvent::Frame { binding, data }) = rx.recv().await else {
            panic!("expected frame event");
        };
        assert_eq!(data, b"datagram");
        assert_eq!(binding, TransportBinding::Udp(client.local_addr().unwrap()));
    }

    #[tokio::test]
    async fn test_udp_send_to() {
        let (tx, _rx) = mpsc::channel(16);
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), tx)
            .await
            .unwrap();

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        transport
            .send_to(peer.local_addr().unwrap(), b"reply")
            .await
            .unwrap();

        let mut buf = [0u8; 16];
        let (len, _) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"reply");
    }
}
