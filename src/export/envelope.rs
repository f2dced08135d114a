//! Export file layout

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::Row;
use crate::manifest::format_timestamp;

use super::Document;

/// Top-level object of an export file
#[derive(Debug, Serialize)]
pub struct ExportEnvelope<T> {
    pub export_date: String,
    pub export_type: &'static str,
    pub total_records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_categories: Option<usize>,
    pub platform: String,
    pub data: T,
}

/// `data` section of the product catalog export
#[derive(Debug, Serialize)]
pub struct CatalogData {
    pub products: Vec<Document>,
    pub categories: Vec<Row>,
}

impl ExportEnvelope<CatalogData> {
    pub fn catalog(
        exported_at: &DateTime<Utc>,
        platform: &str,
        products: Vec<Document>,
        categories: Vec<Row>,
    ) -> Self {
        ExportEnvelope {
            export_date: format_timestamp(exported_at),
            export_type: "product_catalog",
            total_records: products.len(),
            total_categories: Some(categories.len()),
            platform: platform.to_string(),
            data: CatalogData { products, categories },
        }
    }
}

impl ExportEnvelope<Vec<Document>> {
    pub fn customers(exported_at: &DateTime<Utc>, platform: &str, customers: Vec<Document>) -> Self {
        ExportEnvelope {
            export_date: format_timestamp(exported_at),
            export_type: "customers",
            total_records: customers.len(),
            total_categories: None,
            platform: platform.to_string(),
            data: customers,
        }
    }
}

impl<T: Serialize> ExportEnvelope<T> {
    /// Serialize as pretty-printed JSON followed by a newline
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}
