//! Mirror work items and local path derivation
//!
//! ## Folder Structure
//! ```text
//! <output_root>/
//! ├── image_manifest.json
//! └── {product_sku}/
//!     ├── {filename}.{ext}                  # product-level image
//!     └── {filename}_{variant_sku}.{ext}    # variant-specific image
//! ```
//!
//! Downstream import tooling keys off these names.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use crate::export::Document;

/// One image to mirror
#[derive(Debug, Clone, PartialEq)]
pub struct AssetTask {
    /// `image_id` of the originating row
    pub image_id: Value,
    pub url: String,
    pub product_sku: String,
    pub variant_sku: Option<String>,
    pub alt_text: Option<String>,
    /// Destination, derived from the fields above
    pub local_path: PathBuf,
}

impl AssetTask {
    pub fn new(
        output_root: &Path,
        image_id: Value,
        url: impl Into<String>,
        product_sku: impl Into<String>,
        variant_sku: Option<String>,
        alt_text: Option<String>,
    ) -> Self {
        let url = url.into();
        let product_sku = product_sku.into();
        let variant_sku = variant_sku.filter(|s| !s.is_empty());
        let fallback = format!("image_{}", id_text(&image_id).unwrap_or_else(|| "unknown".to_string()));
        let local_path = derive_local_path(
            output_root,
            &product_sku,
            variant_sku.as_deref(),
            &url,
            &fallback,
        );

        AssetTask {
            image_id,
            url,
            product_sku,
            variant_sku,
            alt_text,
            local_path,
        }
    }

    /// Collect the images referenced by product documents
    ///
    /// An image's `variant_id` is resolved against the same product's
    /// `variants` to find the variant SKU. Images without a URL are skipped.
    pub fn discover(output_root: &Path, products: &[Document]) -> Vec<AssetTask> {
        let mut tasks = Vec::new();

        for product in products {
            let product_sku = product
                .get("sku")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("product_{}", product.id()));

            let variants = product.get("variants").and_then(Value::as_array);
            let images = match product.get("images").and_then(Value::as_array) {
                Some(images) => images,
                None => continue,
            };

            for image in images {
                let url = match image.get("image_url").and_then(Value::as_str).map(str::trim) {
                    Some(url) if !url.is_empty() => url,
                    _ => {
                        warn!(product_sku = %product_sku, image_id = %image.get("image_id").unwrap_or(&serde_json::Value::Null), "Image has no URL, skipping");
                        continue;
                    }
                };

                let variant_sku = image
                    .get("variant_id")
                    .filter(|v| !v.is_null())
                    .and_then(|variant_id| {
                        variants?
                            .iter()
                            .find(|v| v.get("variant_id") == Some(variant_id))
                    })
                    .and_then(|v| v.get("sku"))
                    .and_then(Value::as_str)
                    .map(str::to_string);

                tasks.push(AssetTask::new(
                    output_root,
                    image.get("image_id").cloned().unwrap_or(Value::Null),
                    url,
                    product_sku.clone(),
                    variant_sku,
                    image.get("alt_text").and_then(Value::as_str).map(str::to_string),
                ));
            }
        }

        tasks
    }
}

/// `<output_root>/<product_sku>/<name>[_<variant_sku>][.<ext>]`
///
/// `name.ext` is the last segment of the URL path. When the URL carries no
/// usable file name, `fallback` is used instead. Separators inside any
/// component are replaced so the result never leaves the product directory.
pub fn derive_local_path(
    output_root: &Path,
    product_sku: &str,
    variant_sku: Option<&str>,
    url: &str,
    fallback: &str,
) -> PathBuf {
    let file_name = file_name_from_url(url).unwrap_or_else(|| sanitize(fallback));
    let file_name = match variant_sku.filter(|s| !s.is_empty()) {
        Some(variant) => insert_suffix(&file_name, &sanitize(variant)),
        None => file_name,
    };
    output_root.join(sanitize(product_sku)).join(file_name)
}

/// Last path segment of `url`, ignoring query and fragment
fn file_name_from_url(url: &str) -> Option<String> {
    let segment = match url::Url::parse(url) {
        Ok(parsed) => parsed.path_segments()?.last()?.to_string(),
        Err(_) => {
            // relative locator: strip query/fragment by hand
            let path = url.split(['?', '#']).next().unwrap_or("");
            path.rsplit('/').next().unwrap_or("").to_string()
        }
    };

    match segment.as_str() {
        "" | "." | ".." => None,
        _ => Some(sanitize(&segment)),
    }
}

/// `img.jpg` + `V2` → `img_V2.jpg`; `img` + `V2` → `img_V2`
fn insert_suffix(file_name: &str, suffix: &str) -> String {
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}_{}{}", &file_name[..dot], suffix, &file_name[dot..]),
        _ => format!("{}_{}", file_name, suffix),
    }
}

fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

fn id_text(id: &Value) -> Option<String> {
    match id {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
