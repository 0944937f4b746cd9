//! Provenance Graph - document model and run-end builder
//!
//! The document ([`ProvDocument`]) is a deduplicated set of entities,
//! activities, and agents connected by typed relations; the builder
//! ([`create_prov_document`]) folds a finished run's registry state and
//! per-rank metric files into one such document.

mod builder;
mod document;

pub use builder::{create_prov_document, document_path};
pub use document::{AttrMap, ProvDocument, RelationKind};
