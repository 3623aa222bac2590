use crate::proxy::exchange::Exchange;
use crate::proxy::hooks::{Director, HookError};
use async_trait::async_trait;
use http::header::{HeaderName, InvalidHeaderName};
use tracing::trace;

/// Removes a fixed set of response headers before they reach the client
#[derive(Clone, Debug)]
pub struct StripHeadersDirector {
    names: Vec<HeaderName>,
}

impl StripHeadersDirector {
    pub fn new(names: Vec<HeaderName>) -> Self {
        Self { names }
    }

    /// Parse header names from configuration
    pub fn try_from_names<I, S>(names: I) -> Result<Self, InvalidHeaderName>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|name| HeaderName::from_bytes(name.as_ref().trim().as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(names))
    }

    pub fn names(&self) -> &[HeaderName] {
        &self.names
    }
}

#[async_trait]
impl Director for StripHeadersDirector {
    fn name(&self) -> &str {
        "strip-headers"
    }

    async fn direct(&self, exchange: &mut Exchange) -> Result<(), HookError> {
        let headers = exchange.headers_mut();
        for name in &self.names {
            if headers.remove(name).is_some() {
                trace!(header = %name, "stripped response header");
            }
        }
        Ok(())
    }
}
