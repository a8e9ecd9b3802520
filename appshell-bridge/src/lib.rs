pub mod args;
pub mod assets;
pub mod callbacks;
pub mod dispatch;
pub mod protocol;

pub use callbacks::{CallbackRegistry, ContextId};
pub use dispatch::{Bridge, BridgeConfig, Responder, ShellHost};
