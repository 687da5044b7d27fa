//! Async runtime around [`NodeCore`].
//!
//! One task owns the core; UDP and TCP driver tasks feed the event channel.
//! Cluster callbacks run synchronously inside the loop and must not block;
//! long work belongs on a worker task that responds through a later message.

use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use log::warn;
use tokio::sync::mpsc;

use crate::core::SUBSCRIPTION_TICK;
use crate::session::TransportBinding;
use crate::transport::{TcpTransport, TransportEvent, UdpTransport};

use super::core::{NodeConfig, NodeCore, NodeNotification};

const EVENT_CHANNEL_DEPTH: usize = 256;
const NOTIFICATION_CHANNEL_DEPTH: usize = 64;

/// A running Matter node bound to UDP and TCP.
pub struct Node {
    core: NodeCore,
    events_rx: mpsc::Receiver<TransportEvent>,
    udp: UdpTransport,
    tcp: TcpTransport,
    notifications_tx: mpsc::Sender<NodeNotification>,
}

impl Node {
    /// Bind both transports on `addr` (port 0 lets the OS pick) and build
    /// the node. Returns the node and its notification stream.
    pub async fn bind(
        config: NodeConfig,
        addr: SocketAddr,
    ) -> io::Result<(Self, mpsc::Receiver<NodeNotification>)> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);
        let (notifications_tx, notifications_rx) = mpsc::channel(NOTIFICATION_CHANNEL_DEPTH);

        let udp = UdpTransport::bind(addr, events_tx.clone()).await?;
        let mut tcp_addr = addr;
        tcp_addr.set_port(udp.local_addr()?.port());
        let tcp = TcpTransport::bind(tcp_addr, events_tx).await?;

        let node = Self {
            core: NodeCore::new(config),
            events_rx,
            udp,
            tcp,
            notifications_tx,
        };
        Ok((node, notifications_rx))
    }

    /// The bound UDP address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    /// The node state machine (declare clusters and fabrics before `run`).
    pub fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    /// Drive the node until every transport channel closes.
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(SUBSCRIPTION_TICK);
        loop {
            let deadline = self.core.next_deadline();
            tokio::select! {
                event = self.events_rx.recv() => {
                    match event {
                        Some(event) => {
                            self.core.handle_transport_event(event, Instant::now());
                        }
                        None => break,
                    }
                }
                _ = tick.tick() => {
                    let now = Instant::now();
                    self.core.tick_subscriptions(now);
                    self.core.poll_timers(now);
                }
                () = sleep_until_opt(deadline) => {
                    self.core.poll_timers(Instant::now());
                }
            }
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        for (binding, frame) in self.core.take_outbox() {
            let result = match binding {
                TransportBinding::Udp(addr) => self.udp.send_to(addr, &frame).await,
                TransportBinding::Tcp(conn_id) => self.tcp.send(conn_id, &frame).await,
                TransportBinding::Ble(_) => {
                    // BLE frames go out through the host's BleTransport
                    continue;
                }
            };
            if let Err(error) = result {
                warn!("transport send failed: {error}");
            }
        }
        for notification in self.core.take_notifications() {
            let _ = self.notifications_tx.send(notification).await;
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}
