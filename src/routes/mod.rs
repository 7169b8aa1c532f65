// Routes module

pub mod chats;
pub mod health;
pub mod messages;

pub use chats::chats_routes;
pub use health::health_routes;
pub use messages::messages_routes;
