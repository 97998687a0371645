//! Core data types used throughout stockroom.
//!
//! These types represent the products, import outcomes, and listing pages
//! that flow through the coordinator and the ingestion pipeline.

use serde::Serialize;

use crate::error::{CatalogError, CatalogResult};

/// A catalog record as stored.
///
/// `id` is assigned by the Catalog Store and never reused; `code` is the
/// globally unique business key; `image_ref` points into the Asset Store
/// when set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub image_ref: Option<String>,
}

/// Validated product fields for create/update, and the staged record type
/// for bulk ingestion. Construction through [`ProductDraft::new`] is the
/// only way to get one, so unvalidated shapes never travel further.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
}

impl ProductDraft {
    /// Trim and validate raw field values.
    ///
    /// `code` and `name` must be non-empty after trimming; `price` must be
    /// a finite, non-negative number. An empty description becomes `None`.
    pub fn new(
        code: &str,
        name: &str,
        description: Option<&str>,
        price: f64,
    ) -> CatalogResult<Self> {
        let code = code.trim().trim_start_matches('\u{feff}').trim();
        if code.is_empty() {
            return Err(CatalogError::validation("code", "must not be empty"));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::validation("name", "must not be empty"));
        }
        if !price.is_finite() || price < 0.0 {
            return Err(CatalogError::validation(
                "price",
                format!("must be a non-negative number, got {price}"),
            ));
        }
        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        Ok(Self {
            code: code.to_string(),
            name: name.to_string(),
            description,
            price,
        })
    }
}

/// Raw image bytes handed to the coordinator by the calling tier.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Outcome of [`remove_image`](crate::coordinator::Coordinator::remove_image).
///
/// Removing an image from a record that has none is a distinct outcome,
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveImageOutcome {
    Removed,
    NothingToRemove,
}

/// Why an ingested row was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Fewer than the four required positional columns.
    InsufficientColumns,
    /// The price cell did not parse to a non-negative number.
    InvalidPrice,
    /// Code or name trimmed to an empty string.
    MissingField,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::InsufficientColumns => write!(f, "insufficient columns"),
            RejectReason::InvalidPrice => write!(f, "invalid price"),
            RejectReason::MissingField => write!(f, "missing required field"),
        }
    }
}

/// One rejected input row. `row` is 1-based and counts data rows, i.e. the
/// first row after the header is row 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    pub row: usize,
    pub reason: RejectReason,
}

/// Outcome of one bulk ingestion pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    /// Rows newly inserted into the catalog.
    pub committed: u64,
    /// Rows skipped because their code already existed (previously
    /// committed, or duplicated within the batch).
    pub duplicates: u64,
    /// Rows dropped before staging, with the reason for each.
    pub rejected: Vec<RejectedRow>,
}

/// One page of catalog listings.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub items: Vec<Product>,
    pub total_count: i64,
    pub page: i64,
    pub page_count: i64,
}

impl Page {
    /// Inclusive page-number window for navigation display: up to five
    /// slots centered on the current page, clamped at both ends.
    pub fn nav_window(&self) -> (i64, i64) {
        if self.page_count == 0 {
            return (1, 0);
        }
        let mut start = (self.page - 2).max(1);
        let mut end = (self.page + 2).min(self.page_count);
        if self.page <= 3 {
            end = self.page_count.min(5);
        }
        if self.page >= self.page_count - 2 {
            start = (self.page_count - 4).max(1);
        }
        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_trims_and_normalizes() {
        let d = ProductDraft::new("  A1 ", " Hammer ", Some("  "), 9.99).unwrap();
        assert_eq!(d.code, "A1");
        assert_eq!(d.name, "Hammer");
        assert_eq!(d.description, None);
    }

    #[test]
    fn draft_rejects_empty_code() {
        let err = ProductDraft::new("  ", "Hammer", None, 1.0).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Validation { field: "code", .. }
        ));
    }

    #[test]
    fn draft_rejects_negative_price() {
        let err = ProductDraft::new("A1", "Hammer", None, -0.01).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Validation { field: "price", .. }
        ));
    }

    #[test]
    fn draft_rejects_nan_price() {
        assert!(ProductDraft::new("A1", "Hammer", None, f64::NAN).is_err());
    }

    #[test]
    fn draft_strips_bom_from_code() {
        let d = ProductDraft::new("\u{feff}A1", "Hammer", None, 1.0).unwrap();
        assert_eq!(d.code, "A1");
    }

    #[test]
    fn nav_window_centers_and_clamps() {
        let page = |p, pc| Page {
            items: Vec::new(),
            total_count: 0,
            page: p,
            page_count: pc,
        };
        assert_eq!(page(1, 10).nav_window(), (1, 5));
        assert_eq!(page(5, 10).nav_window(), (3, 7));
        assert_eq!(page(10, 10).nav_window(), (6, 10));
        assert_eq!(page(1, 2).nav_window(), (1, 2));
        assert_eq!(page(1, 0).nav_window(), (1, 0));
    }
}
