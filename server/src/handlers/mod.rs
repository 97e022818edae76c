//! Request handlers for document operations.

mod documents;
mod websocket;

pub use documents::*;
pub use websocket::*;
