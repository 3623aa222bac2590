//! Hooks that ship with the proxy

pub mod access_log;
pub mod strip_headers;

pub use access_log::AccessLogger;
pub use strip_headers::StripHeadersDirector;
