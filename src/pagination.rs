use crate::error::ApiError;
use serde::Deserialize;

pub const DEFAULT_PAGE_SIZE: i64 = 6;

/// Zero-based inclusive row range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRange {
    pub from: i64,
    pub to: i64,
}

impl PageRange {
    pub fn limit(&self) -> i64 {
        self.to - self.from + 1
    }

    pub fn offset(&self) -> i64 {
        self.from
    }
}

/// Converts a 1-based page and a page size into a row range.
///
/// A missing or zero page means the first page, a missing size means
/// [`DEFAULT_PAGE_SIZE`]. Inputs are not validated here; see [`PageQuery`].
pub fn range(page: Option<i64>, size: Option<i64>) -> PageRange {
    let limit = size.unwrap_or(DEFAULT_PAGE_SIZE);
    match page {
        None | Some(0) => PageRange {
            from: 0,
            to: limit - 1,
        },
        Some(page) => {
            let from = (page - 1) * limit;
            PageRange {
                from,
                to: from + limit - 1,
            }
        }
    }
}

/// Raw `page` / `limit` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
}

/// Parsed pagination request, echoed back in list responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub range: PageRange,
}

impl PageQuery {
    pub fn parse(&self, max_limit: i64) -> Result<Pagination, ApiError> {
        let page = parse_param("page", self.page.as_deref())?;
        let limit = parse_param("limit", self.limit.as_deref())?;

        if let Some(p) = page {
            if p < 0 {
                return Err(ApiError::InvalidArgument(format!("page must be >= 1, got {}", p)));
            }
        }
        if let Some(l) = limit {
            if l <= 0 {
                return Err(ApiError::InvalidArgument(format!("limit must be >= 1, got {}", l)));
            }
        }
        let limit = limit.map(|l| l.min(max_limit));

        // The last row index of the page has to fit in an i64.
        if let Some(p) = page.filter(|p| *p > 0) {
            let size = limit.unwrap_or(DEFAULT_PAGE_SIZE);
            if (p - 1).checked_mul(size).and_then(|from| from.checked_add(size - 1)).is_none() {
                return Err(ApiError::InvalidArgument(format!("page {} is out of range", p)));
            }
        }

        Ok(Pagination {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE),
            range: range(page, limit),
        })
    }
}

fn parse_param(name: &str, raw: Option<&str>) -> Result<Option<i64>, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    raw.parse::<i64>()
        .map(Some)
        .map_err(|_| ApiError::InvalidArgument(format!("{} must be an integer, got {:?}", name, raw)))
}
