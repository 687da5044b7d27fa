//! Interaction Model: payload codec, router, clusters, and subscriptions.

pub mod cluster;
pub mod messages;
pub mod path;
pub mod router;
pub mod subscription;

mod status;

pub use cluster::{AttributeMetadata, ClusterHandler, DataModel, InvokeReply, ValueKind};
pub use messages::ImOpcode;
pub use path::{AttributePath, CommandPath, ConcretePath};
pub use status::ImStatus;
pub use subscription::{ReportJob, SubscriptionEngine};
