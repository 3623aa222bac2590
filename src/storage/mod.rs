//! Filesystem side of the proxy: naming, provisioning and writing captures

pub mod file_sink;
pub mod mime;
pub mod paths;
pub mod provision;
pub mod writers;

pub use file_sink::FileSink;
pub use mime::{ExtensionLookup, MimeExtensions};
pub use paths::{PathResolver, StorageLayout};
pub use provision::ensure_dir;
pub use writers::{ArchiveBodyWriter, ArchiveHeadWriter, ClientCaptureWriter};
