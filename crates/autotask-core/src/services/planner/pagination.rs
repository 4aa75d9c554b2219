//! Pagination helpers shared by every fetch path

/// Largest page the upstream API serves reliably
pub const MAX_PAGE_SIZE: usize = 500;

/// Page size used when the caller does not ask for one
pub const DEFAULT_PAGE_SIZE: usize = MAX_PAGE_SIZE;

/// Resolve a caller-requested page size
///
/// `None` gives the default. Zero or negative values follow the API's
/// "unlimited" convention and resolve to the ceiling, as does anything above
/// it.
pub fn resolve_page_size(requested: Option<i64>) -> usize {
    match requested {
        None => DEFAULT_PAGE_SIZE,
        Some(n) if n <= 0 => MAX_PAGE_SIZE,
        Some(n) => (n as u64).min(MAX_PAGE_SIZE as u64) as usize,
    }
}

/// Truncate a fetched page to the requested size
///
/// The upstream page size is a hint; it may return more.
pub fn trim_page<T>(mut items: Vec<T>, page_size: usize) -> Vec<T> {
    items.truncate(page_size);
    items
}

/// Number of pages needed for `total` records, capped at `max_pages`
pub fn page_count(total: u64, page_size: usize, max_pages: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    let pages = total.div_ceil(page_size as u64);
    pages.min(max_pages as u64) as u32
}
