// Services module

pub mod context;
pub mod store;

pub use context::{reply_guidance, ContextAssembler};
pub use store::ChatStore;
