//! Adapter factory wiring vendor configurations to concrete transports

use std::sync::Arc;
use std::time::Duration;

use partsource_core::vendor::{AdapterFactory, VendorAdapter};
use partsource_domain::{ApiType, PartSourceError, Result, VendorConfig};
use reqwest::Client;

use super::document::DocumentDropAdapter;
use super::rest::RestVendorAdapter;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds a REST adapter or a document-drop adapter depending on the
/// vendor's API type. One HTTP client is shared by every REST vendor.
#[derive(Clone)]
pub struct DefaultAdapterFactory {
    client: Client,
}

impl DefaultAdapterFactory {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("partsource/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| PartSourceError::Config(format!("http client: {err}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl AdapterFactory for DefaultAdapterFactory {
    fn create(&self, vendor: &VendorConfig) -> Result<Arc<dyn VendorAdapter>> {
        match vendor.api_type {
            ApiType::Rest => Ok(Arc::new(RestVendorAdapter::new(vendor, self.client.clone())?)),
            ApiType::Edi | ApiType::Email | ApiType::Portal | ApiType::FileExport => {
                Ok(Arc::new(DocumentDropAdapter::new(vendor)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_type_selects_the_transport() {
        let factory = DefaultAdapterFactory::with_client(Client::new());

        let mut rest = VendorConfig::new("acme", "Acme", "ACM", ApiType::Rest);
        rest.endpoints.base_url = Some("http://localhost:1".into());
        assert_eq!(factory.create(&rest).unwrap().api_type(), ApiType::Rest);

        let mut edi = VendorConfig::new("edi", "Edi Parts", "EDI", ApiType::Edi);
        edi.endpoints.drop_directory = Some(std::env::temp_dir().join("partsource-edi"));
        assert_eq!(factory.create(&edi).unwrap().api_type(), ApiType::Edi);
    }

    #[test]
    fn email_vendor_needs_an_order_address() {
        let factory = DefaultAdapterFactory::with_client(Client::new());
        let mut email = VendorConfig::new("mail", "Mail Parts", "MPT", ApiType::Email);
        email.endpoints.drop_directory = Some(std::env::temp_dir());
        assert!(factory.create(&email).is_err());
    }
}
