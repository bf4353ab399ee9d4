//! Shared DTO types and helpers used across multiple endpoints.

use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::Currency;
use crate::error::ServiceError;

/// Pagination metadata included in list responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginationMeta {
    /// Current page number.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
    /// Total number of items.
    pub total: u32,
    /// Total number of pages.
    pub total_pages: u32,
}

pub(crate) fn default_page() -> u32 {
    1
}

pub(crate) fn default_per_page() -> u32 {
    20
}

/// Slices one page out of `items`. `page` is 1-indexed; `per_page` is
/// clamped to 1..=100.
pub fn paginate<T>(items: Vec<T>, page: u32, per_page: u32) -> (Vec<T>, PaginationMeta) {
    let page = page.max(1);
    let per_page = per_page.clamp(1, 100);
    let total = u32::try_from(items.len()).unwrap_or(u32::MAX);
    let total_pages = total.div_ceil(per_page);

    let start = usize::try_from((page - 1).saturating_mul(per_page)).unwrap_or(usize::MAX);
    let data = items
        .into_iter()
        .skip(start)
        .take(per_page as usize)
        .collect();
    (
        data,
        PaginationMeta {
            page,
            per_page,
            total,
            total_pages,
        },
    )
}

/// Parses a decimal amount sent as a JSON string.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidRequest`] if the value is missing or not
/// a decimal number.
pub fn parse_amount(value: Option<&str>, field: &str) -> Result<Decimal, ServiceError> {
    let raw = value.ok_or_else(|| ServiceError::InvalidRequest(format!("missing {field}")))?;
    raw.trim()
        .parse()
        .map_err(|_| ServiceError::InvalidRequest(format!("invalid {field}: {raw}")))
}

/// Parses a required currency code.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidRequest`] if the code is missing or
/// malformed.
pub fn parse_currency(value: Option<&str>) -> Result<Currency, ServiceError> {
    Currency::new(value.ok_or_else(|| ServiceError::InvalidRequest("missing currency".to_string()))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn paginate_slices_and_counts() {
        let (page, meta) = paginate((1..=45).collect::<Vec<_>>(), 3, 20);
        assert_eq!(page, vec![41, 42, 43, 44, 45]);
        assert_eq!(meta.total, 45);
        assert_eq!(meta.total_pages, 3);
    }

    #[test]
    fn paginate_empty() {
        let (page, meta) = paginate(Vec::<u8>::new(), 1, 20);
        assert!(page.is_empty());
        assert_eq!(meta.total_pages, 0);
    }

    #[test]
    fn amounts_parse_from_strings() {
        assert!(matches!(parse_amount(Some("500.25"), "price"), Ok(v) if v == dec!(500.25)));
        assert!(parse_amount(Some("lots"), "price").is_err());
        assert!(parse_amount(None, "price").is_err());
    }
}
