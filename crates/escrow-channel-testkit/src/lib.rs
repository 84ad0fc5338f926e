//! # Escrow Channel Testkit
//!
//! Testing utilities for the escrow channel client.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a judge and parties wired together over an in-memory network
//! - **Generators**: Proptest strategies for channel histories
//!
//! The end-to-end protocol scenarios live under `tests/`.
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use escrow_channel_testkit::fixtures::TestFixture;
//!
//! async fn example() {
//!     let fixture = TestFixture::new().await;
//!     let channel_id = fixture.open_channel(0, 1, b"genesis").await;
//!     fixture.agree_update(channel_id, 0, 1, b"next").await;
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use escrow_channel_testkit::generators::{apply_step, open_pair, HistoryParams};
//!
//! proptest! {
//!     #[test]
//!     fn sequence_never_decreases(params: HistoryParams) {
//!         let (a, b) = open_pair(&params);
//!         let mut sides = [a, b];
//!         for step in &params.steps {
//!             let before = sides[0].sequence();
//!             let _ = apply_step(&mut sides, step);
//!             prop_assert!(sides[0].sequence() >= before);
//!         }
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{recv, TestFixture, TestParty};
pub use generators::{apply_step, open_pair, HistoryParams, Step};
