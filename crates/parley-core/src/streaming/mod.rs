pub mod socket_client;
pub mod types;

pub use socket_client::{PushChannel, PushHandle, SocketPushClient};
pub use types::{ChannelEvent, ClientEvent, ReceiveImage, ReceiveMessage, SendMessage, ServerEvent};
