//! Header/sample inspection of the data directory: derives a [`Schema`] per
//! file via a cheap head-only read, then groups columns across files by
//! semantic concept for a prompt-ready normalization guide.
//!
//! Side-effect free and cheap enough to run on every job; results are never
//! cached across jobs.

mod correspondence;
mod inspect;
mod lexicon;

pub use correspondence::{group_by_concept, render_normalization_guide};
pub use inspect::{SchemaInspector, DEFAULT_SAMPLE_ROWS};
