//! What each editorial stage asks the backend to look for.
//!
//! Every stage owns a fixed list of [`FindingKind`]s. A kind knows how to
//! prompt for one category of findings and how to turn the backend's loosely
//! shaped answers into [`Issue`](crate::issue::Issue)s.
//!
//! ```
//! use quire::review::kinds_for;
//! use quire::stage::Stage;
//!
//! let proof = kinds_for(Stage::Proof);
//! assert!(proof.iter().any(|k| k.category == "typo"));
//! ```

mod catalog;

pub use catalog::{FindingKind, SeverityRule, kinds_for};
