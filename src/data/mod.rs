//! Reading and presenting recorded vitals.
//!
//! ## Submodules
//!
//! - [`duration`]: Parsing of duration strings (e.g., "5s", "500ms")
//! - [`history`]: Windowed reads of the history log ([`HistoryQuery`], [`HistoryWindow`])
//! - [`units`]: Temperature conversion and display of absent readings
//!
//! ## Data Flow
//!
//! ```text
//! history log (remote, unordered map)
//!        │
//!        ▼
//! HistoryQuery::recent(limit)
//!        │  normalize, drop entries without `ts`, sort once
//!        ▼
//! HistoryWindow ──▶ ascending()  (chart)
//!               └─▶ descending() (table)
//! ```

pub mod duration;
pub mod history;
pub mod units;

pub use history::{HistoryQuery, HistoryWindow};
