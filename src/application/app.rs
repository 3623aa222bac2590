use crate::builtin::{AccessLogger, StripHeadersDirector};
use crate::config::Settings;
use crate::proxy::{HookPipeline, ProxyService};
use crate::storage::{
    ensure_dir, ArchiveBodyWriter, ArchiveHeadWriter, ClientCaptureWriter, PathResolver,
};
use crate::{Error, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

/// Main application struct that wires settings, hooks and the proxy together
pub struct Application {
    settings: Settings,
    paths: Arc<PathResolver>,
    service: ProxyService,
}

impl Application {
    #[instrument(skip(settings))]
    pub fn new(settings: Settings) -> Result<Self> {
        let paths = Arc::new(PathResolver::new(settings.storage_layout()));
        let pipeline = build_pipeline(&settings, &paths)?;
        let service = ProxyService::new(settings.proxy_config(), pipeline);

        Ok(Self {
            settings,
            paths,
            service,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Bind the configured address and serve until Ctrl-C
    #[instrument(skip(self))]
    pub async fn run(self) -> Result<()> {
        let addr = self.settings.server.bind.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let layout = self.paths.layout();
        ensure_dir(&layout.archive_root).await?;
        ensure_dir(&layout.client_root).await?;

        let local_addr = listener.local_addr()?;
        info!(
            %local_addr,
            archive_root = %layout.archive_root.display(),
            client_root = %layout.client_root.display(),
            "Starting tapwire proxy"
        );

        let router = self.service.into_router();
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(Error::Serve)?;

        info!("Proxy stopped");
        Ok(())
    }
}

/// Register the built-in hooks the settings enable
pub fn build_pipeline(settings: &Settings, paths: &Arc<PathResolver>) -> Result<HookPipeline> {
    let hooks = &settings.hooks;
    let mut builder = HookPipeline::builder();

    if !hooks.strip_response_headers.is_empty() {
        let director = StripHeadersDirector::try_from_names(&hooks.strip_response_headers)
            .map_err(|e| Error::invalid_setting("hooks.strip_response_headers", e))?;
        builder.add_director(director);
    }
    if hooks.archive_bodies {
        builder.add_writer(ArchiveBodyWriter::new(Arc::clone(paths)));
    }
    if hooks.archive_heads {
        builder.add_writer(ArchiveHeadWriter::new(Arc::clone(paths)));
    }
    if hooks.capture_clients {
        builder.add_writer(ClientCaptureWriter::new(Arc::clone(paths)));
    }
    if hooks.access_log {
        builder.add_logger(AccessLogger);
    }

    Ok(builder.build())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C; shutting down");
    }
    info!("Shutdown signal received");
}
