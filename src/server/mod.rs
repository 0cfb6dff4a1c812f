//! Local file server
//!
//! Serves registered content files over the wire protocol, gated by a
//! caller-supplied authenticator.

pub mod auth;
pub mod registry;
pub mod server;

pub use auth::Authenticator;
pub use registry::{ContentEntry, ContentRegistry};
pub use server::{FileServer, FileServerBuilder, ServerState};
