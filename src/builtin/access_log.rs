use crate::proxy::exchange::Exchange;
use crate::proxy::hooks::{HookError, Logger};
use async_trait::async_trait;
use tracing::info;

/// One access line per delivered exchange
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessLogger;

#[async_trait]
impl Logger for AccessLogger {
    fn name(&self) -> &str {
        "access-log"
    }

    async fn observe(&self, exchange: &Exchange) -> Result<(), HookError> {
        info!(
            exchange_id = %exchange.id(),
            method = %exchange.method(),
            uri = %exchange.target(),
            client = %exchange.remote_addr(),
            status = exchange.status().as_u16(),
            content_type = exchange.content_type(),
            content_encoding = exchange.content_encoding(),
            bytes = exchange.bytes_copied(),
            "exchange delivered"
        );
        Ok(())
    }
}
