// Backend collaborator interfaces and live-update feed handling.

pub mod backend;
pub mod feed;
pub mod reconnect;
pub mod subscription;

pub use backend::{FeedStream, MessageBackend, ObjectStorage, OutgoingMessage};
pub use feed::{FeedEvent, FeedEventKind};
pub use reconnect::ReconnectPolicy;
pub use subscription::{ChannelState, ChannelStatus, SubscriptionChannel, SubscriptionHandle};
