//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{products, TestEnv};
//!
//! #[tokio::test]
//! async fn test_export() {
//!     let env = TestEnv::new();
//!     let index = env.shop_index();
//!     env.import(&index, &products(3));
//!     env.app.manager.schedule_batch_export(index.id).unwrap();
//!     env.drain_queue().await;
//! }
//! ```

mod constants;
mod env;
mod fixtures;

pub use constants::*;
pub use env::TestEnv;
#[allow(unused_imports)]
pub use fixtures::{product, products};
