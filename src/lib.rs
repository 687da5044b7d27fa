//! # matter-node
//!
//! The core of a Matter device-side protocol stack: the end-to-end pipeline
//! from raw transport frames to Interaction Model dispatch.
//!
//! - **Security**: AES-128-CCM secure framing, SPAKE2+ commissioning (PASE),
//!   certificate-authenticated operation (CASE), replay-safe counters
//! - **Reliability**: MRP acks and jittered exponential retransmits over UDP
//!   and BLE; TCP carries its own
//! - **Interaction Model**: read/write/invoke/subscribe against a hosted
//!   cluster tree with ACL enforcement and fabric scoping
//! - **Transports**: UDP datagrams, length-framed TCP, BTP over BLE GATT
//!
//! Cluster implementations, mDNS advertisement, credential persistence, and
//! BLE chipset drivers are external collaborators behind small interfaces.
//!
//! ## Module map
//!
//! - [`core`]: constants and error types
//! - [`tlv`]: Matter TLV codec
//! - [`crypto`]: HKDF/PBKDF2, AES-CCM, P-256, SPAKE2+
//! - [`cert`]: operational certificate parsing
//! - [`message`]: plaintext/protocol headers and secure framing
//! - [`session`]: session table, counters, replay windows
//! - [`exchange`]: exchange manager and MRP
//! - [`secure_channel`]: PASE and CASE state machines
//! - [`fabric`]: fabric credential table
//! - [`acl`]: access-control engine and the Access Control cluster
//! - [`im`]: Interaction Model codec, router, subscriptions
//! - [`btp`]: BLE Transport Protocol
//! - [`transport`]: UDP/TCP/BLE glue
//! - [`node`]: the node actor and its runtime
//! - [`setup`]: onboarding payload encoders
//!
//! ## Example
//!
//! ```no_run
//! use matter_node::node::{Node, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = NodeConfig {
//!         passcode: 20202021,
//!         pase_salt: vec![0x5B; 32],
//!         pase_iterations: 1000,
//!     };
//!     let (mut node, mut notifications) =
//!         Node::bind(config, "0.0.0.0:5540".parse().unwrap()).await?;
//!
//!     // declare hosted clusters before running
//!     // node.core_mut().data_model_mut().add_cluster(1, Box::new(my_cluster));
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = notifications.recv().await {
//!             println!("{event:?}");
//!         }
//!     });
//!     node.run().await;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod acl;
pub mod btp;
pub mod cert;
pub mod core;
pub mod crypto;
pub mod exchange;
pub mod fabric;
pub mod im;
pub mod message;
pub mod node;
pub mod secure_channel;
pub mod session;
pub mod setup;
pub mod tlv;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::acl::{AccessContext, AclEntry, Privilege};
    pub use crate::core::{
        BtpError, CodecError, HandshakeError, MatterError, SecurityError, TransportError,
    };
    pub use crate::im::{
        AttributeMetadata, AttributePath, ClusterHandler, ConcretePath, DataModel, ImStatus,
        InvokeReply, ValueKind,
    };
    pub use crate::node::{Node, NodeConfig, NodeCore, NodeNotification};
    pub use crate::session::{AuthMode, TransportBinding};
    pub use crate::tlv::TlvValue;
}

pub use crate::core::MatterError;
pub use node::{Node, NodeConfig, NodeNotification};
pub use tlv::TlvValue;
