pub mod chat;
pub mod websocket;

pub use chat::{ Message, Response, Role, Usage };
