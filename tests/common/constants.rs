//! Shared constants for end-to-end tests
//!
//! Ids and names of the metadata written by the fixture config.

#![allow(dead_code)]

pub const SHOP_BACKEND: &str = "My Shop";
pub const SHOP_BACKEND_ID: i64 = 1;

/// No-op backend, accepts every export.
pub const ARCHIVE_BACKEND_ID: i64 = 2;

/// FTS5 backend whose corpus cannot be opened.
pub const BROKEN_BACKEND_ID: i64 = 3;

pub const EN_US: &str = "en_US";
pub const EN_US_ID: i64 = 1;
pub const FR_FR_ID: i64 = 2;

pub const PRODUCT_MODEL: &str = "product.template";
pub const PRODUCT_MODEL_ID: i64 = 1;
pub const PARTNER_MODEL_ID: i64 = 2;
/// Indexable but transient, never selectable.
pub const WIZARD_MODEL_ID: i64 = 3;

/// Exporter of product name and price.
pub const PRODUCT_CARD_EXPORTER_ID: i64 = 1;
/// Exporter reading partners.
pub const PARTNER_EXPORTER_ID: i64 = 2;

/// Name derived for the declared index.
pub const SHOP_INDEX_NAME: &str = "my_shop_product_template_en_US";
pub const SHOP_INDEX_BATCH_SIZE: i64 = 2;
