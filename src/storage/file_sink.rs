//! Buffered file sinks

use crate::proxy::hooks::Sink;
use crate::storage::provision::ensure_parent;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

/// How many `-N` suffixes to try before giving up on a fresh name
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Writes a body copy to one file; flushes on close
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: BufWriter<File>,
}

impl FileSink {
    /// Create or truncate `path`, provisioning its directory first
    pub async fn create(path: PathBuf) -> io::Result<Self> {
        ensure_parent(&path).await?;
        let file = File::create(&path).await?;
        Ok(Self::wrap(path, file))
    }

    /// Create a file that did not exist before.
    ///
    /// When `path` is taken, `stem-1.ext`, `stem-2.ext` ... are tried instead.
    pub async fn create_new(path: PathBuf) -> io::Result<Self> {
        ensure_parent(&path).await?;

        let mut candidate = path.clone();
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(file) => return Ok(Self::wrap(candidate, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    candidate = numbered(&path, attempt);
                }
                Err(e) => return Err(e),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free name near {}", path.display()),
        ))
    }

    fn wrap(path: PathBuf, file: File) -> Self {
        Self {
            path,
            file: BufWriter::new(file),
        }
    }

    /// Path actually opened, including any collision suffix
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a prefix that precedes the streamed body
    pub async fn write_preamble(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes).await
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await
    }

    async fn close(mut self: Box<Self>) -> io::Result<()> {
        self.file.flush().await?;
        self.file.get_mut().sync_data().await
    }
}

/// Write a whole file at once, provisioning its directory first
pub async fn write_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    ensure_parent(path).await?;
    tokio::fs::write(path, contents).await
}

fn numbered(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{n}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{n}"),
    };
    path.with_file_name(name)
}
