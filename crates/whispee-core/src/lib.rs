pub mod ids;
pub mod models;

pub use ids::{ConnectionId, MessageId, SessionId, UserId};
pub use models::{Chat, ChatId, Identifier, Message, User};
