//! Chat requests relayed to the remote service on behalf of stored accounts.

pub mod allocator;
pub mod errors;
pub mod protocol;
pub mod relay;
pub mod remote;

pub use allocator::{is_valid_conversation_id, Allocation, ConversationAllocator};
pub use errors::{RelayError, UpstreamError};
pub use protocol::{
    ChatEvent, ChunkSink, ConversationRef, MessageReply, RemoteApi, SendOutcome, SendRequest,
    SendResult,
};
pub use relay::ChatRelay;
pub use remote::WebChatClient;
