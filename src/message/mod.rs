pub mod headers;
pub mod request;
pub mod response;

pub use headers::HeaderMap;
pub use request::{find_head_end, ParseError, Request};
pub use response::{default_error_body, status_text, Response};
