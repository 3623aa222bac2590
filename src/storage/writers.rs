//! Filesystem-backed writers
//!
//! Each writer resolves its own path from the shared [`PathResolver`] and
//! provisions the directory it needs before opening anything.

use crate::proxy::exchange::Exchange;
use crate::proxy::headers::{header_block, response_head};
use crate::proxy::hooks::{HookError, Writer, WriterOutcome};
use crate::storage::file_sink::{write_file, FileSink};
use crate::storage::paths::PathResolver;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Suffix of the header snapshot stored next to an archived body
pub const HEAD_SUFFIX: &str = "head";

/// Canonical per-resource snapshot of the body, overwritten on every fetch
#[derive(Clone, Debug)]
pub struct ArchiveBodyWriter {
    paths: Arc<PathResolver>,
}

impl ArchiveBodyWriter {
    pub fn new(paths: Arc<PathResolver>) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl Writer for ArchiveBodyWriter {
    fn name(&self) -> &str {
        "archive-body"
    }

    async fn open(&self, exchange: &Exchange) -> Result<WriterOutcome, HookError> {
        let path = self.paths.archive_path(exchange);
        let sink = FileSink::create(path.clone())
            .await
            .map_err(|e| HookError::io(self.name(), &path, e))?;

        debug!(path = %path.display(), "archiving body");
        Ok(WriterOutcome::Stream(Box::new(sink)))
    }
}

/// Header snapshot stored at `<archive path>.head`
#[derive(Clone, Debug)]
pub struct ArchiveHeadWriter {
    paths: Arc<PathResolver>,
}

impl ArchiveHeadWriter {
    pub fn new(paths: Arc<PathResolver>) -> Self {
        Self { paths }
    }

    pub fn head_path(&self, exchange: &Exchange) -> PathBuf {
        let mut path = self.paths.archive_path(exchange).into_os_string();
        path.push(".");
        path.push(HEAD_SUFFIX);
        PathBuf::from(path)
    }
}

#[async_trait]
impl Writer for ArchiveHeadWriter {
    fn name(&self) -> &str {
        "archive-head"
    }

    async fn open(&self, exchange: &Exchange) -> Result<WriterOutcome, HookError> {
        let path = self.head_path(exchange);
        write_file(&path, &header_block(exchange.headers()))
            .await
            .map_err(|e| HookError::io(self.name(), &path, e))?;

        Ok(WriterOutcome::Completed)
    }
}

/// One record per request: status line, headers, blank line, then the body
#[derive(Clone, Debug)]
pub struct ClientCaptureWriter {
    paths: Arc<PathResolver>,
}

impl ClientCaptureWriter {
    pub fn new(paths: Arc<PathResolver>) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl Writer for ClientCaptureWriter {
    fn name(&self) -> &str {
        "client-capture"
    }

    async fn open(&self, exchange: &Exchange) -> Result<WriterOutcome, HookError> {
        let path = self.paths.client_path(exchange);
        let mut sink = FileSink::create_new(path.clone())
            .await
            .map_err(|e| HookError::io(self.name(), &path, e))?;

        sink.write_preamble(&response_head(exchange.status(), exchange.headers()))
            .await
            .map_err(|e| HookError::io(self.name(), sink.path(), e))?;

        debug!(path = %sink.path().display(), "capturing client exchange");
        Ok(WriterOutcome::Stream(Box::new(sink)))
    }
}
