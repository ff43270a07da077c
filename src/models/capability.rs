//! Capability tags and provider kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A kind of metadata operation a provider may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    IsbnResolution,
    MetadataEnrichment,
    CoverImage,
    Ratings,
    PublicDomain,
    EditionVariants,
    ExternalIds,
    AuthorBiography,
    BookGeneration,
}

impl Capability {
    pub const ALL: [Capability; 9] = [
        Self::IsbnResolution,
        Self::MetadataEnrichment,
        Self::CoverImage,
        Self::Ratings,
        Self::PublicDomain,
        Self::EditionVariants,
        Self::ExternalIds,
        Self::AuthorBiography,
        Self::BookGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IsbnResolution => "isbn_resolution",
            Self::MetadataEnrichment => "metadata_enrichment",
            Self::CoverImage => "cover_image",
            Self::Ratings => "ratings",
            Self::PublicDomain => "public_domain",
            Self::EditionVariants => "edition_variants",
            Self::ExternalIds => "external_ids",
            Self::AuthorBiography => "author_biography",
            Self::BookGeneration => "book_generation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing class of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Free,
    Paid,
    Ai,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Paid => "paid",
            Self::Ai => "ai",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Self::Free),
            "paid" => Some(Self::Paid),
            "ai" => Some(Self::Ai),
            _ => None,
        }
    }
}
