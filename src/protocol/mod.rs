//! Wire protocol for the local file server
//!
//! Requests and responses are length-prefixed JSON documents; a successful
//! response is followed by the raw bytes of the requested span.

pub mod request;
pub mod response;
pub mod wire;

pub use request::{FileRequest, AUTHORIZATION_HEADER};
pub use response::{new_session_id, FileResponse, ResponseStatus};
pub use wire::{
    read_frame, read_request, read_response, write_frame, write_request, write_response,
    MAX_FRAME_LEN,
};
