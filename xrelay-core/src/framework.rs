use crate::config::RelayConfig;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One `reqwest::Client` per external collaborator, so their timeouts stay
/// independent. Clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpClients {
    pub enrichment: reqwest::Client,
    pub reporting: reqwest::Client,
    pub signing: reqwest::Client,
}

impl HttpClients {
    pub fn new(config: &RelayConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            enrichment: reqwest::Client::builder()
                .timeout(config.enrichment.timeout)
                .build()?,
            reporting: reqwest::Client::builder()
                .timeout(config.reporting.timeout)
                .build()?,
            signing: reqwest::Client::builder()
                .timeout(config.signing.timeout)
                .build()?,
        })
    }
}

/// Owner of the pipeline's HTTP clients.
///
/// Components receive clones at startup. [`close`](Self::close) drops the
/// owned set once the components are gone, which releases the pooled
/// connections; after that every accessor returns `None`.
#[derive(Debug)]
pub struct HttpResources {
    clients: Mutex<Option<HttpClients>>,
}

impl HttpResources {
    pub fn new(clients: HttpClients) -> Self {
        Self {
            clients: Mutex::new(Some(clients)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<HttpClients>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enrichment(&self) -> Option<reqwest::Client> {
        self.lock().as_ref().map(|c| c.enrichment.clone())
    }

    pub fn reporting(&self) -> Option<reqwest::Client> {
        self.lock().as_ref().map(|c| c.reporting.clone())
    }

    pub fn signing(&self) -> Option<reqwest::Client> {
        self.lock().as_ref().map(|c| c.signing.clone())
    }

    /// Drop the shared clients.
    ///
    /// Returns `true` only for the call that performed the release; every
    /// later call is a no-op returning `false`.
    pub fn close(&self) -> bool {
        let released = self.lock().take();
        match released {
            Some(clients) => {
                drop(clients);
                tracing::info!("Shared HTTP resources released");
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn resources() -> HttpResources {
        HttpResources::new(HttpClients::new(&RelayConfig::default()).unwrap())
    }

    #[test]
    fn test_close_happens_once_across_threads() {
        let resources = Arc::new(resources());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resources = resources.clone();
                std::thread::spawn(move || resources.close())
            })
            .collect();
        let released = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|first| *first)
            .count();
        assert_eq!(released, 1);
        assert!(resources.is_closed());
    }

    #[test]
    fn test_closed_resources_hand_out_no_clients() {
        let resources = resources();
        assert!(resources.reporting().is_some());
        assert!(resources.close());
        assert!(resources.enrichment().is_none());
        assert!(resources.reporting().is_none());
        assert!(resources.signing().is_none());
    }
}
