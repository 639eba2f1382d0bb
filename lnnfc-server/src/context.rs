//! lnnfc-server/src/context.rs
//!
//! Everything a command needs: settings, the LNbits client and the reader.

use std::sync::Arc;

use tracing::{info, warn};

use lnnfc_common::traits::SharedTransport;
use lnnfc_core::services::TagLoader;
use lnnfc_core::transport::open_transport;
use lnnfc_core::{AppConfig, Error, LnbitsClient};

pub struct AppContext {
    pub config: AppConfig,
    pub lnbits: Arc<LnbitsClient>,
    pub transport: SharedTransport,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Result<Self, Error> {
        let lnbits = Arc::new(LnbitsClient::new(&config.lnbits)?);
        let transport = open_transport(&config.nfc_transport)?;
        Ok(Self { config, lnbits, transport })
    }

    pub async fn connect_reader(&self) -> Result<(), Error> {
        self.transport.lock().await.connect().await?;
        info!("NFC reader connected ({})", self.config.nfc_transport);
        Ok(())
    }

    pub async fn disconnect_reader(&self) {
        if let Err(e) = self.transport.lock().await.disconnect().await {
            warn!("Reader disconnect failed: {e}");
        }
    }

    /// Loader bound to this context's client and reader.
    pub fn tag_loader(&self) -> TagLoader {
        TagLoader::new(self.lnbits.clone(), self.transport.clone())
    }
}
