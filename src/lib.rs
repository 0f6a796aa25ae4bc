//! Grade computation and assignment engine over a SQLite gradebook.
//!
//! Weighted totals and class statistics are computed on the fly from the
//! score rows in [`store`]; committed grades live in the [`ledger`] and
//! only change when an instructor writes them. [`engine`] coordinates the
//! two and owns the transactional operations; the banding and prediction
//! math itself sits in [`calc`] as pure functions.

pub mod calc;
pub mod db;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod store;

pub use error::{GradebookError, Result};
pub use store::GradingScheme;
