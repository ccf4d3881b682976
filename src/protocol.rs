//! The protocol module, containing the typed frames exchanged with the server.
//! protocol 模块，包含与服务端交换的类型化帧。

pub mod action;
pub mod message;

pub use action::Action;
pub use message::{ConnectionDetails, ErrorFrame, ProtocolMessage};
