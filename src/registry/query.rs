//! Filtering, ordering and pagination over the run list

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{ModelRun, RunStatus, TriggerSource};
use crate::{Error, Result};

/// Largest page size a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Page size used when none is requested.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Optional filters on the run list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFilter {
    /// Only runs with this status
    pub status: Option<RunStatus>,
    /// Only runs started this way
    pub triggered_by: Option<TriggerSource>,
}

impl RunFilter {
    /// Whether `run` passes the filter.
    #[must_use]
    pub fn matches(&self, run: &ModelRun) -> bool {
        self.status.is_none_or(|status| run.status() == status)
            && self
                .triggered_by
                .is_none_or(|source| run.triggered_by() == source)
    }
}

/// Ordering by `start_time`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest first
    Ascending,
    /// Newest first
    #[default]
    Descending,
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Ascending),
            "desc" => Ok(Self::Descending),
            _ => Err(Error::validation("Invalid sort order. Must be one of: ASC, DESC")),
        }
    }
}

/// Requested page.
///
/// Only [`PageRequest::new`] and `Default` construct one, so `page >= 1` and
/// `limit >= 1` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl PageRequest {
    /// Create a page request after checking `page >= 1` and
    /// `1 <= limit <= max_limit`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when either bound is violated.
    pub fn new(page: u32, limit: u32, max_limit: u32) -> Result<Self> {
        if page == 0 {
            return Err(Error::validation("page must be at least 1"));
        }
        if limit == 0 || limit > max_limit {
            return Err(Error::validation(format!(
                "limit must be between 1 and {max_limit}"
            )));
        }
        Ok(Self { page, limit })
    }

    /// 1-based page number.
    #[must_use]
    pub const fn page(self) -> u32 {
        self.page
    }

    /// Page size.
    #[must_use]
    pub const fn limit(self) -> u32 {
        self.limit
    }

    fn offset(self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.limit as usize)
    }
}

/// Pagination metadata returned with every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// 1-based page number
    pub page: u32,
    /// Page size
    pub limit: u32,
    /// Runs matching the filter
    pub total: usize,
    /// `ceil(total / limit)`
    pub total_pages: usize,
}

impl Pagination {
    /// Metadata for `total` matching rows.
    #[must_use]
    pub const fn new(request: PageRequest, total: usize) -> Self {
        Self {
            page: request.page,
            limit: request.limit,
            total,
            total_pages: total.div_ceil(request.limit as usize),
        }
    }
}

/// One page of runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPage {
    /// Runs on this page
    pub data: Vec<ModelRun>,
    /// Page metadata
    pub pagination: Pagination,
}

/// Filter, order by `start_time`, and slice out the requested page.
#[must_use]
pub fn paginate(
    mut runs: Vec<ModelRun>,
    filter: RunFilter,
    order: SortOrder,
    request: PageRequest,
) -> RunPage {
    runs.retain(|run| filter.matches(run));
    match order {
        SortOrder::Ascending => runs.sort_by_key(ModelRun::start_time),
        SortOrder::Descending => {
            runs.sort_by_key(|run| std::cmp::Reverse(run.start_time()));
        }
    }

    let pagination = Pagination::new(request, runs.len());
    let data = runs
        .into_iter()
        .skip(request.offset())
        .take(request.limit as usize)
        .collect();

    RunPage { data, pagination }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HyperParameters;
    use chrono::{Duration, Utc};

    fn runs(n: i64) -> Vec<ModelRun> {
        let base = Utc::now();
        (0..n)
            .map(|i| {
                ModelRun::builder(format!("manual__{i}"), TriggerSource::Manual)
                    .hyper_parameters(HyperParameters::default())
                    .start_time(base + Duration::minutes(i))
                    .build()
            })
            .collect()
    }

    #[test]
    fn test_total_pages() {
        let request = PageRequest::new(1, 50, MAX_PAGE_LIMIT).unwrap();
        assert_eq!(Pagination::new(request, 6).total_pages, 1);
        assert_eq!(Pagination::new(request, 0).total_pages, 0);
        assert_eq!(Pagination::new(request, 50).total_pages, 1);
        assert_eq!(Pagination::new(request, 51).total_pages, 2);
    }

    #[test]
    fn test_page_request_bounds() {
        assert!(PageRequest::new(0, 10, MAX_PAGE_LIMIT).is_err());
        assert!(PageRequest::new(1, 0, MAX_PAGE_LIMIT).is_err());
        assert!(PageRequest::new(1, 101, MAX_PAGE_LIMIT).is_err());
        assert!(PageRequest::new(1, 100, MAX_PAGE_LIMIT).is_ok());
    }

    #[test]
    fn test_page_request_getters() {
        let request = PageRequest::new(3, 25, MAX_PAGE_LIMIT).unwrap();
        assert_eq!(request.page(), 3);
        assert_eq!(request.limit(), 25);
        assert_eq!(request.offset(), 50);
        assert_eq!(PageRequest::default().page(), 1);
        assert_eq!(PageRequest::default().limit(), DEFAULT_PAGE_LIMIT);
    }

    #[test]
    fn test_empty_page_never_divides_by_zero() {
        let page = paginate(vec![], RunFilter::default(), SortOrder::Ascending, PageRequest::default());
        assert_eq!(page.pagination.total_pages, 0);
        assert!(page.data.is_empty());
    }

    #[test]
    fn test_descending_is_default_and_newest_first() {
        let page = paginate(runs(5), RunFilter::default(), SortOrder::default(), PageRequest::default());
        assert_eq!(page.data[0].run_id(), "manual__4");
        assert_eq!(page.data[4].run_id(), "manual__0");
    }

    #[test]
    fn test_ascending_second_page() {
        let request = PageRequest::new(2, 2, MAX_PAGE_LIMIT).unwrap();
        let page = paginate(runs(5), RunFilter::default(), SortOrder::Ascending, request);
        let ids: Vec<&str> = page.data.iter().map(ModelRun::run_id).collect();
        assert_eq!(ids, vec!["manual__2", "manual__3"]);
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.total_pages, 3);
    }

    #[test]
    fn test_page_past_end_is_empty() {
        let request = PageRequest::new(9, 2, MAX_PAGE_LIMIT).unwrap();
        let page = paginate(runs(3), RunFilter::default(), SortOrder::Ascending, request);
        assert!(page.data.is_empty());
        assert_eq!(page.pagination.total, 3);
    }

    #[test]
    fn test_filter_by_status() {
        let mut all = runs(3);
        all[1].start().unwrap();
        let filter = RunFilter {
            status: Some(RunStatus::Running),
            ..RunFilter::default()
        };
        let page = paginate(all, filter, SortOrder::Descending, PageRequest::default());
        assert_eq!(page.pagination.total, 1);
        assert_eq!(page.data[0].run_id(), "manual__1");
    }

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!("ASC".parse::<SortOrder>().unwrap(), SortOrder::Ascending);
        assert_eq!("desc".parse::<SortOrder>().unwrap(), SortOrder::Descending);
        assert!("sideways".parse::<SortOrder>().is_err());
    }
}
