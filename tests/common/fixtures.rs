//! Fixture config and record creation

#![allow(dead_code)]

use super::constants::*;
use anyhow::Result;
use search_export_scheduler::bindings::NewBinding;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes a config declaring three backends, two languages, three models,
/// two exporters and the shop index. Returns the config path.
pub fn write_test_config(dir: &Path) -> Result<PathBuf> {
    let corpus_path = dir.join("shop_corpus.db");
    let broken_path = dir.join("missing").join("corpus.db");
    let config = format!(
        r#"
[worker]
poll_interval_ms = 10
max_retries = 1
initial_backoff_secs = 0
max_backoff_secs = 0

[[worker.channels]]
name = "root.search_engine"
capacity = 2

[[backends]]
id = {shop_id}
name = "{shop}"
kind = "fts5"
path = {corpus:?}

[[backends]]
id = {archive_id}
name = "Archive"
kind = "noop"

[[backends]]
id = {broken_id}
name = "Broken"
kind = "fts5"
path = {broken:?}

[[languages]]
id = {en_id}
code = "{en}"

[[languages]]
id = {fr_id}
code = "fr_FR"

[[models]]
id = {product_id}
model = "{product}"
name = "Product Template"
indexable = true

[[models]]
id = {partner_id}
model = "res.partner"
name = "Contact"
indexable = true

[[models]]
id = {wizard_id}
model = "product.import.wizard"
name = "Import Wizard"
indexable = true
transient = true

[[exporters]]
id = {card_id}
name = "Product card"
resource = "{product}"
fields = ["name", "price"]

[[exporters]]
id = {partner_exporter_id}
name = "Contact card"
resource = "res.partner"

[[indices]]
backend = "{shop}"
lang = "{en}"
model = "{product}"
exporter = "Product card"
batch_size = {batch_size}
"#,
        shop_id = SHOP_BACKEND_ID,
        shop = SHOP_BACKEND,
        corpus = corpus_path.to_string_lossy(),
        archive_id = ARCHIVE_BACKEND_ID,
        broken_id = BROKEN_BACKEND_ID,
        broken = broken_path.to_string_lossy(),
        en_id = EN_US_ID,
        en = EN_US,
        fr_id = FR_FR_ID,
        product_id = PRODUCT_MODEL_ID,
        product = PRODUCT_MODEL,
        partner_id = PARTNER_MODEL_ID,
        wizard_id = WIZARD_MODEL_ID,
        card_id = PRODUCT_CARD_EXPORTER_ID,
        partner_exporter_id = PARTNER_EXPORTER_ID,
        batch_size = SHOP_INDEX_BATCH_SIZE,
    );
    let path = dir.join("config.toml");
    fs::write(&path, config)?;
    Ok(path)
}

/// A product record with a name, a price and a field the product card
/// exporter leaves out.
pub fn product(record_id: &str, name: &str, price: f64) -> NewBinding {
    NewBinding {
        record_id: record_id.to_string(),
        source: json!({
            "id": record_id,
            "name": name,
            "price": price,
            "internal_note": "not exported",
        }),
    }
}

/// Products `r1..=rN` named `Product N`.
pub fn products(count: usize) -> Vec<NewBinding> {
    (1..=count)
        .map(|i| product(&format!("r{}", i), &format!("Product {}", i), i as f64))
        .collect()
}
