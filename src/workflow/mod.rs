//! Stage sequencing for manuscripts.
//!
//! - [`WorkflowState`]: one manuscript's stage statuses and counters
//! - [`ManagingEditor`]: all workflows, with gated transitions
//! - [`ProjectStore`]: JSON persistence under `.quire/`

mod editor;
mod state;
mod store;

pub use editor::ManagingEditor;
pub use state::{ReportStatus, WorkflowRecord, WorkflowReport, WorkflowState};
pub use store::ProjectStore;
