//! Deterministic filesystem naming for captured exchanges
//!
//! - archive path: `<archive>/<host>/<url path>[.<ext>][.gz]`, one per
//!   resource, overwritten on every fetch
//! - client path: `<client>/<client ip>/<host>/<url path>/<timestamp>.bin`,
//!   one per request
//!
//! Both are pure functions of the exchange (and, for client paths, a clock
//! reading). Nothing here touches the filesystem.

use crate::proxy::exchange::Exchange;
use crate::proxy::types::{StorageRoot, DEFAULT_ARCHIVE_ROOT, DEFAULT_CLIENT_ROOT};
use crate::storage::mime::{ExtensionLookup, MimeExtensions};
use chrono::{DateTime, Local, TimeZone, Timelike};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File stem used when the URL path is empty or `/`
pub const INDEX_STEM: &str = "index";

/// Extension of per-request client capture files
pub const CLIENT_EXTENSION: &str = "bin";

/// Suffix appended to archive names of gzip-encoded responses
pub const GZIP_SUFFIX: &str = "gz";

/// Where archive snapshots and client captures live
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageLayout {
    pub archive_root: PathBuf,
    pub client_root: PathBuf,
}

impl StorageLayout {
    pub fn new(archive_root: &StorageRoot, client_root: &StorageRoot) -> Self {
        Self {
            archive_root: PathBuf::from(archive_root.as_ref()),
            client_root: PathBuf::from(client_root.as_ref()),
        }
    }

    /// Default directory names placed under `base`
    pub fn under(base: &Path) -> Self {
        Self {
            archive_root: base.join(DEFAULT_ARCHIVE_ROOT),
            client_root: base.join(DEFAULT_CLIENT_ROOT),
        }
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            archive_root: PathBuf::from(DEFAULT_ARCHIVE_ROOT),
            client_root: PathBuf::from(DEFAULT_CLIENT_ROOT),
        }
    }
}

/// Maps exchanges onto archive and client paths
#[derive(Clone)]
pub struct PathResolver {
    layout: StorageLayout,
    extensions: Arc<dyn ExtensionLookup>,
}

impl PathResolver {
    pub fn new(layout: StorageLayout) -> Self {
        Self::with_extensions(layout, Arc::new(MimeExtensions))
    }

    pub fn with_extensions(layout: StorageLayout, extensions: Arc<dyn ExtensionLookup>) -> Self {
        Self { layout, extensions }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Canonical snapshot location; the request method plays no part.
    pub fn archive_path(&self, exchange: &Exchange) -> PathBuf {
        let mut segments = resource_segments(exchange.path());

        if let Some(leaf) = segments.last_mut() {
            if !leaf.contains('.') {
                let extension = self.extensions.extension_for(exchange.content_type());
                if !extension.is_empty() {
                    leaf.push('.');
                    leaf.push_str(&extension);
                }
            }
            if exchange.is_gzip_encoded() {
                leaf.push('.');
                leaf.push_str(GZIP_SUFFIX);
            }
        }

        let mut path = self.layout.archive_root.join(safe_segment(exchange.host()));
        path.extend(segments);
        path
    }

    /// Per-request capture location stamped with the current local time
    pub fn client_path(&self, exchange: &Exchange) -> PathBuf {
        self.client_path_at(exchange, &Local::now())
    }

    /// Per-request capture location stamped with `at`
    pub fn client_path_at<Tz>(&self, exchange: &Exchange, at: &DateTime<Tz>) -> PathBuf
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let mut path = self
            .layout
            .client_root
            .join(exchange.remote_addr().ip().to_string())
            .join(safe_segment(exchange.host()));
        path.extend(resource_segments(exchange.path()));
        path.push(format!("{}.{CLIENT_EXTENSION}", timestamp(at)));
        path
    }
}

impl std::fmt::Debug for PathResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathResolver")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

/// Fixed-width `YYYYMMDD-HHMMSS-nnnnnnnnn`, so names sort chronologically
pub fn timestamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    // nanosecond() exceeds 999_999_999 only during a leap second
    format!(
        "{}-{:09}",
        at.format("%Y%m%d-%H%M%S"),
        at.nanosecond() % 1_000_000_000
    )
}

/// Decoded URL path split into safe segments; `index` when nothing remains.
fn resource_segments(url_path: &str) -> Vec<String> {
    let decoded = urlencoding::decode(url_path)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| url_path.to_string());

    let segments: Vec<String> = decoded
        .split('/')
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
        .map(safe_segment)
        .collect();

    if segments.is_empty() {
        vec![INDEX_STEM.to_string()]
    } else {
        segments
    }
}

fn safe_segment(segment: &str) -> String {
    segment.replace(['\\', '\0'], "_")
}
