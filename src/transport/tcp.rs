//! TCP transport: 4-byte little-endian length framing over a stream.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};

use crate::core::{TransportError, TCP_LENGTH_PREFIX_SIZE};
use crate::session::TransportBinding;

use super::TransportEvent;

/// Frame a message for the stream: `len_le32 ‖ payload`.
pub fn frame_message(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(TCP_LENGTH_PREFIX_SIZE + payload.len());
    let mut prefix = [0u8; TCP_LENGTH_PREFIX_SIZE];
    LittleEndian::write_u32(&mut prefix, payload.len() as u32);
    out.extend_from_slice(&prefix);
    out.extend_from_slice(payload);
    out
}

/// Drain every complete frame from `buffer`, leaving any partial frame.
pub fn extract_frames(buffer: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    loop {
        if buffer.len() < TCP_LENGTH_PREFIX_SIZE {
            return frames;
        }
        let len = LittleEndian::read_u32(&buffer[..TCP_LENGTH_PREFIX_SIZE]) as usize;
        if buffer.len() < TCP_LENGTH_PREFIX_SIZE + len {
            return frames;
        }
        let frame = buffer[TCP_LENGTH_PREFIX_SIZE..TCP_LENGTH_PREFIX_SIZE + len].to_vec();
        buffer.drain(..TCP_LENGTH_PREFIX_SIZE + len);
        frames.push(frame);
    }
}

/// TCP listener plus the write halves of its accepted connections.
pub struct TcpTransport {
    local_addr: SocketAddr,
    writers: Arc<Mutex<HashMap<u64, OwnedWriteHalf>>>,
}

impl TcpTransport {
    /// Bind a listener and spawn the accept loop; frames and disconnects
    /// flow to `events`.
    pub async fn bind(
        addr: SocketAddr,
        events: mpsc::Sender<TransportEvent>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let writers: Arc<Mutex<HashMap<u64, OwnedWriteHalf>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let accept_writers = Arc::clone(&writers);
        tokio::spawn(async move {
            let next_conn_id = AtomicU64::new(1);
            loop {
                let Ok((stream, peer)) = listener.accept().await else {
                    break;
                };
                let conn_id = next_conn_id.fetch_add(1, Ordering::Relaxed);
                debug!("tcp connection {conn_id} from {peer}");
                let (read_half, write_half) = stream.into_split();
                accept_writers.lock().await.insert(conn_id, write_half);

                let events = events.clone();
                let writers = Arc::clone(&accept_writers);
                tokio::spawn(async move {
                    run_connection(conn_id, read_half, &events).await;
                    writers.lock().await.remove(&conn_id);
                    let _ = events
                        .send(TransportEvent::Closed {
                            binding: TransportBinding::Tcp(conn_id),
                        })
                        .await;
                });
            }
        });

        Ok(Self { local_addr, writers })
    }

    /// Bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send one framed message on a connection.
    pub async fn send(&self, conn_id: u64, payload: &[u8]) -> Result<(), TransportError> {
        let framed = frame_message(payload);
        let mut writers = self.writers.lock().await;
        let writer = writers.get_mut(&conn_id).ok_or(TransportError::NotConnected)?;
        writer.write_all(&framed).await?;
        Ok(())
    }
}

async fn run_connection(
    conn_id: u64,
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    events: &mpsc::Sender<TransportEvent>,
) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match read_half.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                for frame in extract_frames(&mut buffer) {
                    let event = TransportEvent::Frame {
                        binding: TransportBinding::Tcp(conn_id),
                        data: frame,
                    };
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Client-side helper: connect and return the stream (tests drive it
/// directly with `frame_message`).
pub async fn connect(addr: SocketAddr) -> io::Result<TcpStream> {
    TcpStream::connect(addr).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_hello() {
        assert_eq!(frame_message(b"hello"), b"\x05\x00\x00\x00hello");
    }

    #[test]
    fn test_extract_complete_and_partial() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(b"\x05\x00\x00\x00hello");
        buffer.extend_from_slice(b"\x0a\x00\x00\x00par");

        let frames = extract_frames(&mut buffer);
        assert_eq!(frames, vec![b"hello".to_vec()]);
        assert_eq!(buffer, b"\x0a\x00\x00\x00par");
    }

    #[test]
    fn test_extract_multiple_frames() {
        let mut buffer = frame_message(b"one");
        buffer.extend_from_slice(&frame_message(b""));
        buffer.extend_from_slice(&frame_message(b"three"));
        let frames = extract_frames(&mut buffer);
        assert_eq!(frames, vec![b"one".to_vec(), Vec::new(), b"three".to_vec()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_extract_nothing_from_short_prefix() {
        let mut buffer = vec![0x05, 0x00];
        assert!(extract_frames(&mut buffer).is_empty());
        assert_eq!(buffer.len(), 2);
    }

    #[tokio::test]
    async fn test_tcp_roundtrip() {
        let (tx, mut rx) = mpsc::channel(16);
        let transport = TcpTransport::bind("127.0.0.1:0".parse().unwrap(), tx)
            .await
            .unwrap();

        let mut client = connect(transport.local_addr()).await.unwrap();
        client.write_all(&frame_message(b"ping")).await.unwrap();

        let Some(TransportEvent::Frame { binding, data }) = rx.recv().await else {
            panic!("expected frame event");
        };
        assert_eq!(data, b"ping");
        let TransportBinding::Tcp(conn_id) = binding else {
            panic!("expected tcp binding");
        };

        transport.send(conn_id, b"pong").await.unwrap();
        let mut response = [0u8; 8];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(&response[..4], &[4, 0, 0, 0]);
        assert_eq!(&response[4..], b"pong");
    }

    #[tokio::test]
    async fn test_tcp_disconnect_event() {
        let (tx, mut rx) = mpsc::channel(16);
        let transport = TcpTransport::bind("127.0.0.1:0".parse().unwrap(), tx)
            .await
            .unwrap();
        let client = connect(transport.local_addr()).await.unwrap();
        drop(client);

        let Some(TransportEvent::Closed { binding }) = rx.recv().await else {
            panic!("expected closed event");
        };
        assert!(matches!(binding, TransportBinding::Tcp(_)));
    }
}
