//! Core types for the intent router
//!
//! This crate provides the types shared by every other crate:
//! - The customer-service catalog (ids, canonical names, fallback)
//! - Classification results and their provenance

pub mod catalog;
pub mod classification;

pub use catalog::{Service, ServiceCatalog, ServiceId, FALLBACK_SERVICE_ID};
pub use classification::{Classification, ClassificationSource, FallbackReason};

use thiserror::Error;

/// Catalog errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Unknown service id: {0}")]
    UnknownService(u8),

    #[error("Duplicate service id: {0}")]
    DuplicateService(u8),

    #[error("Catalog is missing the fallback service {0}")]
    MissingFallback(u8),
}
