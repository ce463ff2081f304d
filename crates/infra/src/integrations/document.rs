//! Document-drop adapter for EDI, email, portal and file-export vendors
//!
//! These vendors have no request/response API. Requests are written as
//! documents into a drop directory that an external relay (EDI VAN, mail
//! gateway, portal robot, SFTP sync) carries to the vendor:
//!
//! ```text
//! {drop}/rfq/{sourcing_request_id}.{ext}        request for quote
//! {drop}/responses/{sourcing_request_id}.json   vendor answer (RawQuote JSON)
//! {drop}/orders/{po_number}.{ext}               purchase order
//! ```
//!
//! Quote calls clear any answer left from an earlier round, then poll for
//! the response document until the caller's timeout. Relays should write
//! `{sourcing_request_id}.json.tmp` and rename it into place; only the
//! final name is read. A response that does not parse yet is read again
//! until the timeout, and reported as invalid only then.

use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use partsource_core::vendor::{AdapterError, OrderConfirmation, OrderRequest, VendorAdapter};
use partsource_domain::{ApiType, PartSourceError, QuoteCriteria, RawQuote, Result, VendorConfig};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, info};

type AdapterResult<T> = std::result::Result<T, AdapterError>;
type Rendered = std::result::Result<String, fmt::Error>;

const RESPONSE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Adapter exchanging documents through a drop directory
pub struct DocumentDropAdapter {
    vendor_id: String,
    vendor_code: String,
    api_type: ApiType,
    drop_directory: PathBuf,
    order_email: Option<String>,
}

impl DocumentDropAdapter {
    pub fn new(vendor: &VendorConfig) -> Result<Self> {
        let drop_directory = vendor.endpoints.drop_directory.clone().ok_or_else(|| {
            PartSourceError::Config(format!(
                "{} vendor '{}' has no drop directory",
                vendor.api_type, vendor.id
            ))
        })?;
        if vendor.api_type == ApiType::Email && vendor.endpoints.order_email.is_none() {
            return Err(PartSourceError::Config(format!(
                "email vendor '{}' has no order address",
                vendor.id
            )));
        }

        Ok(Self {
            vendor_id: vendor.id.clone(),
            vendor_code: vendor.vendor_code.clone(),
            api_type: vendor.api_type,
            drop_directory,
            order_email: vendor.endpoints.order_email.clone(),
        })
    }

    fn extension(&self) -> &'static str {
        match self.api_type {
            ApiType::Edi => "edi",
            ApiType::Email => "eml",
            ApiType::Rest | ApiType::Portal | ApiType::FileExport => "json",
        }
    }

    fn rfq_path(&self, criteria: &QuoteCriteria) -> PathBuf {
        self.drop_directory
            .join("rfq")
            .join(format!("{}.{}", criteria.sourcing_request_id, self.extension()))
    }

    fn response_path(&self, criteria: &QuoteCriteria) -> PathBuf {
        self.drop_directory.join("responses").join(format!("{}.json", criteria.sourcing_request_id))
    }

    fn order_path(&self, order: &OrderRequest) -> PathBuf {
        self.drop_directory.join("orders").join(format!("{}.{}", order.po_number, self.extension()))
    }

    fn render_rfq(&self, criteria: &QuoteCriteria) -> AdapterResult<String> {
        match self.api_type {
            ApiType::Edi => edi_rfq(&self.vendor_code, criteria).map_err(encoding_error),
            ApiType::Email => {
                email_rfq(self.order_email.as_deref(), criteria).map_err(encoding_error)
            }
            ApiType::Rest | ApiType::Portal | ApiType::FileExport => pretty_json(criteria),
        }
    }

    fn render_order(&self, order: &OrderRequest) -> AdapterResult<String> {
        match self.api_type {
            ApiType::Edi => edi_order(&self.vendor_code, order).map_err(encoding_error),
            ApiType::Email => {
                email_order(self.order_email.as_deref(), order).map_err(encoding_error)
            }
            ApiType::Rest | ApiType::Portal | ApiType::FileExport => pretty_json(order),
        }
    }

    async fn wait_for_response(&self, path: &Path, timeout: Duration) -> AdapterResult<RawQuote> {
        let deadline = Instant::now() + timeout;
        let mut unreadable: Option<String> = None;
        loop {
            match fs::read(path).await {
                Ok(body) => match serde_json::from_slice(&body) {
                    Ok(quote) => return Ok(quote),
                    Err(err) => {
                        debug!(path = %path.display(), error = %err, "response not readable yet");
                        unreadable = Some(err.to_string());
                    }
                },
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(io_error(&err)),
            }
            if Instant::now() + RESPONSE_POLL_INTERVAL >= deadline {
                return Err(match unreadable {
                    Some(reason) => AdapterError::InvalidResponse(reason),
                    None => AdapterError::Timeout(timeout),
                });
            }
            tokio::time::sleep(RESPONSE_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl VendorAdapter for DocumentDropAdapter {
    fn api_type(&self) -> ApiType {
        self.api_type
    }

    async fn quote(&self, criteria: &QuoteCriteria, timeout: Duration) -> AdapterResult<RawQuote> {
        let response = self.response_path(criteria);
        match fs::remove_file(&response).await {
            Ok(()) => debug!(path = %response.display(), "cleared stale response document"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_error(&err)),
        }

        let rfq = self.rfq_path(criteria);
        write_document(&rfq, &self.render_rfq(criteria)?, true).await?;
        debug!(vendor_id = %self.vendor_id, path = %rfq.display(), "rfq document written");

        self.wait_for_response(&response, timeout).await
    }

    async fn place_order(&self, order: &OrderRequest) -> AdapterResult<OrderConfirmation> {
        let path = self.order_path(order);
        let written = write_document(&path, &self.render_order(order)?, false).await?;
        if written {
            info!(
                vendor_id = %self.vendor_id,
                po_number = %order.po_number,
                "order document written"
            );
        } else {
            debug!(po_number = %order.po_number, "order document already present");
        }
        Ok(OrderConfirmation {
            confirmation_number: format!(
                "{}-{}",
                self.api_type.as_str().to_ascii_uppercase(),
                order.po_number
            ),
        })
    }

    async fn health_check(&self) -> AdapterResult<()> {
        fs::create_dir_all(&self.drop_directory).await.map_err(|err| io_error(&err))?;
        let metadata = fs::metadata(&self.drop_directory).await.map_err(|err| io_error(&err))?;
        if metadata.permissions().readonly() {
            return Err(AdapterError::Connection(format!(
                "drop directory {} is read-only",
                self.drop_directory.display()
            )));
        }
        Ok(())
    }
}

/// Write `body` to `path`; returns false when `overwrite` is off and the
/// document already exists
async fn write_document(path: &Path, body: &str, overwrite: bool) -> AdapterResult<bool> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|err| io_error(&err))?;
    }
    let mut options = fs::OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let mut file = match options.open(path).await {
        Ok(file) => file,
        Err(err) if !overwrite && err.kind() == std::io::ErrorKind::AlreadyExists => {
            return Ok(false);
        }
        Err(err) => return Err(io_error(&err)),
    };
    file.write_all(body.as_bytes()).await.map_err(|err| io_error(&err))?;
    file.flush().await.map_err(|err| io_error(&err))?;
    Ok(true)
}

fn io_error(err: &std::io::Error) -> AdapterError {
    AdapterError::Connection(format!("drop directory: {err}"))
}

fn encoding_error(err: impl fmt::Display) -> AdapterError {
    AdapterError::Rejected(format!("document encoding failed: {err}"))
}

fn pretty_json<T: serde::Serialize>(value: &T) -> AdapterResult<String> {
    serde_json::to_string_pretty(value).map_err(encoding_error)
}

fn part_identifier(part_number: Option<&str>, oem: Option<&str>, description: &str) -> String {
    part_number.or(oem).unwrap_or(description).to_string()
}

fn edi_rfq(vendor_code: &str, criteria: &QuoteCriteria) -> Rendered {
    let part = part_identifier(
        criteria.part_number.as_deref(),
        criteria.oem_part_number.as_deref(),
        &criteria.description,
    );
    let mut doc = String::new();
    writeln!(doc, "ST*840*0001~")?;
    writeln!(doc, "BQT*00*{}~", criteria.sourcing_request_id)?;
    writeln!(doc, "N1*SE*{vendor_code}~")?;
    writeln!(doc, "PO1*1*{}*EA***VP*{part}~", criteria.quantity)?;
    writeln!(doc, "PID*F****{}~", criteria.description)?;
    writeln!(doc, "SE*6*0001~")?;
    Ok(doc)
}

fn edi_order(vendor_code: &str, order: &OrderRequest) -> Rendered {
    let mut doc = String::new();
    writeln!(doc, "ST*850*0001~")?;
    writeln!(doc, "BEG*00*SA*{}**{}~", order.po_number, order.repair_order_number)?;
    writeln!(doc, "N1*SE*{vendor_code}~")?;
    for (index, line) in order.lines.iter().enumerate() {
        let part = part_identifier(
            line.part_number.as_deref(),
            line.oem_part_number.as_deref(),
            &line.description,
        );
        writeln!(
            doc,
            "PO1*{}*{}*EA*{:.2}**VP*{part}~",
            index + 1,
            line.quantity,
            line.unit_price
        )?;
    }
    writeln!(doc, "CTT*{}~", order.lines.len())?;
    writeln!(doc, "AMT*TT*{:.2}~", order.total_amount)?;
    writeln!(doc, "SE*{}*0001~", order.lines.len() + 6)?;
    Ok(doc)
}

fn email_rfq(to: Option<&str>, criteria: &QuoteCriteria) -> Rendered {
    let part = part_identifier(
        criteria.part_number.as_deref(),
        criteria.oem_part_number.as_deref(),
        &criteria.description,
    );
    let mut doc = String::new();
    writeln!(doc, "To: {}", to.unwrap_or_default())?;
    writeln!(doc, "Subject: Request for quote {}", criteria.sourcing_request_id)?;
    writeln!(doc)?;
    writeln!(doc, "Part: {part}")?;
    writeln!(doc, "Description: {}", criteria.description)?;
    writeln!(doc, "Quantity: {}", criteria.quantity)?;
    if let Some(vin) = &criteria.vehicle.vin {
        writeln!(doc, "VIN: {vin}")?;
    }
    Ok(doc)
}

fn email_order(to: Option<&str>, order: &OrderRequest) -> Rendered {
    let mut doc = String::new();
    writeln!(doc, "To: {}", to.unwrap_or_default())?;
    writeln!(doc, "Subject: Purchase order {}", order.po_number)?;
    writeln!(doc)?;
    writeln!(doc, "Repair order: {}", order.repair_order_number)?;
    for line in &order.lines {
        let part = part_identifier(
            line.part_number.as_deref(),
            line.oem_part_number.as_deref(),
            &line.description,
        );
        writeln!(
            doc,
            "{} x {part} ({}) @ {:.2} = {:.2}",
            line.quantity, line.description, line.unit_price, line.line_total
        )?;
    }
    writeln!(doc, "Total: {:.2}", order.total_amount)?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn criteria() -> QuoteCriteria {
        QuoteCriteria {
            sourcing_request_id: Uuid::now_v7(),
            part_number: Some("52119-0E903".into()),
            oem_part_number: None,
            description: "Front bumper cover".into(),
            category: None,
            quantity: 2,
            vehicle: Default::default(),
            acceptable_conditions: Vec::new(),
            acceptable_brand_types: Vec::new(),
        }
    }

    #[test]
    fn edi_rfq_carries_part_and_quantity() {
        let doc = edi_rfq("ACM", &criteria()).unwrap();
        assert!(doc.starts_with("ST*840"));
        assert!(doc.contains("PO1*1*2*EA***VP*52119-0E903~"));
    }

    #[test]
    fn vendor_without_drop_directory_is_rejected() {
        let vendor = VendorConfig::new("edi", "EDI Parts", "EDI", ApiType::Edi);
        assert!(matches!(DocumentDropAdapter::new(&vendor), Err(PartSourceError::Config(_))));
    }

    #[tokio::test]
    async fn health_check_creates_the_drop_directory() {
        let dir = TempDir::new().unwrap();
        let mut vendor = VendorConfig::new("ftp", "Ftp Parts", "FTP", ApiType::FileExport);
        vendor.endpoints.drop_directory = Some(dir.path().join("drop"));
        let adapter = DocumentDropAdapter::new(&vendor).unwrap();

        adapter.health_check().await.unwrap();

        assert!(dir.path().join("drop").is_dir());
    }
}
