//! Data models for providers, orchestration results, and backfill units.

mod backfill;
mod book;
mod capability;
mod catalog;
mod lookup;

pub use backfill::{
    BackfillUnit, FailureKind, FailureNote, SeedRange, StatusSummary, UnitKey, UnitStats,
    UnitStatus,
};
pub use book::{
    AuthorBiography, BookMetadata, CoverResult, EditionVariant, ExternalIds, GeneratedBook,
    GenerationOutcome, GenerationRequest, MergedExternalIds, MergedMetadata, PublicDomainQuery,
    PublicDomainResult, RatingsResult, ResolutionQuery, ResolutionResult, Validate,
};
pub use capability::{Capability, ProviderKind};
pub use catalog::CatalogBook;
pub use lookup::Lookup;
