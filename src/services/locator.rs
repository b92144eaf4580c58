// src/services/locator.rs

//! Pagination locator.
//!
//! Maps a calendar date to its bulletin file by walking the date-sorted
//! listing. Page 1 holds the most recent bulletins and each later page holds
//! older ones, so after probing page 1 the scan walks from the oldest
//! configured page toward page 2 and stops as soon as a page lists only
//! bulletins newer than the target.

use std::sync::Arc;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{PageListingEntry, SourceConfig, to_exchange_date};
use crate::services::page_cache::PageCache;
use crate::services::source::ListingSource;
use crate::utils::resolve_file_url;

/// A located bulletin file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulletinFile {
    pub url: String,
    pub bytes: Vec<u8>,
}

/// What a scan of the listing established about a date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// The bulletin was found and downloaded
    Found(BulletinFile),
    /// Every page read cleanly and the listing has no bulletin for the date
    Unlisted,
    /// No bulletin was found, but a page or file failed to download or the
    /// date lies beyond the scanned pages
    Unknown,
}

impl Located {
    pub fn file(self) -> Option<BulletinFile> {
        match self {
            Located::Found(file) => Some(file),
            _ => None,
        }
    }
}

/// What one listing page told us about the target date.
#[derive(Debug, Default)]
struct PageProbe {
    file: Option<BulletinFile>,
    range: Option<PageListingEntry>,
    failed: bool,
}

impl PageProbe {
    fn range_only(range: Option<PageListingEntry>) -> Self {
        Self {
            range,
            ..Self::default()
        }
    }

    fn unreadable(range: Option<PageListingEntry>) -> Self {
        Self {
            range,
            failed: true,
            ..Self::default()
        }
    }
}

/// Ranges seen during one scan, used to tell "not listed" from "not seen".
#[derive(Debug, Default)]
struct ScanEvidence {
    newer: bool,
    older: bool,
    spanned: bool,
    head_older: bool,
    incomplete: bool,
}

impl ScanEvidence {
    fn observe(&mut self, page: u32, probe: &PageProbe, target: &str) {
        self.incomplete |= probe.failed;
        let Some(range) = &probe.range else {
            return;
        };
        if range.last_date.as_str() > target {
            self.newer = true;
        } else if range.first_date.as_str() < target {
            self.older = true;
            self.head_older |= page == 1;
        } else {
            self.spanned = true;
        }
    }

    /// The listing is sorted, so a page spanning the date, pages on both
    /// sides of it, or a first page older than it all rule the date out.
    fn proves_absent(&self) -> bool {
        !self.incomplete && (self.spanned || self.head_older || (self.newer && self.older))
    }
}

/// Finds the bulletin for a date on the paginated listing.
pub struct PaginationLocator {
    source: Arc<dyn ListingSource>,
    cache: Arc<PageCache>,
    config: SourceConfig,
    listing_url: Url,
    link_regex: Regex,
    anchor_selector: Selector,
}

impl PaginationLocator {
    pub fn new(
        config: &SourceConfig,
        source: Arc<dyn ListingSource>,
        cache: Arc<PageCache>,
    ) -> Result<Self> {
        let anchor_selector = Selector::parse("a[href]")
            .map_err(|e| AppError::config(format!("invalid anchor selector: {e:?}")))?;

        Ok(Self {
            source,
            cache,
            config: config.clone(),
            listing_url: Url::parse(&config.base_url)?,
            link_regex: config.link_regex()?,
            anchor_selector,
        })
    }

    /// The page cache this locator reads and fills.
    pub fn cache(&self) -> &Arc<PageCache> {
        &self.cache
    }

    /// Find and download the bulletin for `date`.
    ///
    /// Page and file fetch failures are not fatal; the scan moves on, but
    /// a miss after a failure is reported as [`Located::Unknown`].
    pub async fn locate(&self, date: NaiveDate) -> Located {
        let target = to_exchange_date(date);
        let mut evidence = ScanEvidence::default();

        let latest = self.search_page(1, &target).await;
        if let Some(file) = latest.file {
            return Located::Found(file);
        }
        evidence.observe(1, &latest, &target);

        for page in (2..=self.config.max_pages).rev() {
            let probe = self.search_page(page, &target).await;
            if let Some(file) = probe.file {
                return Located::Found(file);
            }
            evidence.observe(page, &probe, &target);

            if probe
                .range
                .as_ref()
                .is_some_and(|range| range.last_date > target)
            {
                log::debug!("Page {page} lists only bulletins after {target}; stopping scan");
                break;
            }
        }

        if evidence.proves_absent() {
            log::debug!("Listing has no bulletin for {target}");
            Located::Unlisted
        } else {
            log::debug!("No bulletin link found for {target}");
            Located::Unknown
        }
    }

    /// Probe one listing page for the target date.
    async fn search_page(&self, page: u32, target: &str) -> PageProbe {
        let cached = self.cache.get(page);
        if rules_out(&cached, target) {
            return PageProbe::range_only(cached);
        }

        let page_url = self.config.page_url(page);
        let html = match self.source.fetch_text(&page_url).await {
            Ok(html) => html,
            Err(error) => {
                log::warn!("Failed to fetch listing page {page} ({page_url}): {error}");
                return PageProbe::unreadable(cached);
            }
        };

        let links = self.scan_links(&html);
        let range = match cached {
            Some(range) => Some(range),
            None => {
                let dates: Vec<String> = links.iter().map(|(date, _)| date.clone()).collect();
                let entry = PageListingEntry::from_dates(page, &dates);
                if let Some(entry) = &entry {
                    self.cache.put(page, entry.clone());
                }
                entry
            }
        };

        if rules_out(&range, target) {
            return PageProbe::range_only(range);
        }

        let Some((_, href)) = links.iter().find(|(date, _)| date == target) else {
            return PageProbe::range_only(range);
        };

        let file_url = resolve_file_url(&self.listing_url, href);
        match self.source.fetch_bytes(&file_url).await {
            Ok(bytes) => PageProbe {
                file: Some(BulletinFile { url: file_url, bytes }),
                range,
                failed: false,
            },
            Err(error) => {
                log::warn!("Failed to download bulletin {file_url}: {error}");
                PageProbe::unreadable(range)
            }
        }
    }

    /// Bulletin links on a page as `(YYYYMMDD, href)` pairs in page order.
    fn scan_links(&self, html: &str) -> Vec<(String, String)> {
        let document = Html::parse_document(html);
        document
            .select(&self.anchor_selector)
            .filter_map(|anchor| anchor.value().attr("href"))
            .filter_map(|href| {
                let date = self.link_regex.captures(href)?.get(1)?.as_str().to_string();
                Some((date, href.to_string()))
            })
            .collect()
    }
}

/// Whether a page's range excludes the target: its newest bulletin is older
/// or its oldest bulletin is newer.
fn rules_out(range: &Option<PageListingEntry>, target: &str) -> bool {
    range.as_ref().is_some_and(|range| {
        range.first_date.as_str() < target || range.last_date.as_str() > target
    })
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;

    const BASE: &str = "https://spimex.com/markets/oil_products/trades/results/";

    #[derive(Default)]
    struct FakeSource {
        pages: HashMap<String, String>,
        files: HashMap<String, Vec<u8>>,
        failing: HashSet<String>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn page(mut self, page: u32, dates: &[&str]) -> Self {
            let links: String = dates
                .iter()
                .map(|d| {
                    format!(
                        r#"<a class="accordeon-inner__item-title link xls" href="/upload/reports/oil_xls/oil_xls_{d}162000.xls?r=1">Бюллетень</a>"#
                    )
                })
                .collect();
            let html = format!("<html><body><div>{links}</div></body></html>");
            self.pages.insert(page_url(page), html);
            self
        }

        fn file(mut self, date: &str, bytes: &[u8]) -> Self {
            self.files.insert(
                format!("https://spimex.com/upload/reports/oil_xls/oil_xls_{date}162000.xls?r=1"),
                bytes.to_vec(),
            );
            self
        }

        fn failing(mut self, page: u32) -> Self {
            self.failing.insert(page_url(page));
            self
        }

        fn requested_pages(&self) -> Vec<String> {
            self.requests
                .lock()
                .iter()
                .filter(|url| !url.contains("oil_xls_"))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl ListingSource for FakeSource {
        async fn fetch_text(&self, url: &str) -> Result<String> {
            self.requests.lock().push(url.to_string());
            if self.failing.contains(url) {
                return Err(AppError::fetch(url, "connection reset"));
            }
            Ok(self.pages.get(url).cloned().unwrap_or_default())
        }

        async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
            self.requests.lock().push(url.to_string());
            self.files
                .get(url)
                .cloned()
                .ok_or_else(|| AppError::fetch(url, "404 Not Found"))
        }
    }

    fn page_url(page: u32) -> String {
        if page == 1 {
            BASE.to_string()
        } else {
            format!("{BASE}?page=page-{page}")
        }
    }

    fn config(max_pages: u32) -> SourceConfig {
        SourceConfig {
            max_pages,
            ..SourceConfig::default()
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn locator(source: &Arc<FakeSource>, cache: &Arc<PageCache>, max_pages: u32) -> PaginationLocator {
        let source: Arc<dyn ListingSource> = source.clone();
        PaginationLocator::new(&config(max_pages), source, Arc::clone(cache)).unwrap()
    }

    #[tokio::test]
    async fn test_locate_on_first_page() {
        let source = Arc::new(
            FakeSource::default()
                .page(1, &["20230117", "20230116", "20230115"])
                .file("20230115", b"bulletin"),
        );
        let cache = Arc::new(PageCache::new());

        let file = locator(&source, &cache, 5)
            .locate(ymd(2023, 1, 15))
            .await
            .file()
            .unwrap();
        assert_eq!(file.bytes, b"bulletin");
        assert_eq!(
            file.url,
            "https://spimex.com/upload/reports/oil_xls/oil_xls_20230115162000.xls?r=1"
        );
        assert_eq!(source.requested_pages(), vec![page_url(1)]);
        assert_eq!(cache.get(1).unwrap().first_date, "20230117");
    }

    #[tokio::test]
    async fn test_locate_scans_from_oldest_page() {
        let source = Arc::new(
            FakeSource::default()
                .page(1, &["20230120", "20230119"])
                .page(2, &["20230118", "20230117"])
                .page(3, &["20230116", "20230115"])
                .page(4, &["20230113", "20230112"])
                .file("20230115", b"found"),
        );
        let cache = Arc::new(PageCache::new());

        let file = locator(&source, &cache, 4)
            .locate(ymd(2023, 1, 15))
            .await
            .file()
            .unwrap();
        assert_eq!(file.bytes, b"found");
        assert_eq!(
            source.requested_pages(),
            vec![page_url(1), page_url(4), page_url(3)]
        );
        assert_eq!(cache.pages(), vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn test_cached_newer_page_stops_scan() {
        let source = Arc::new(
            FakeSource::default()
                .page(1, &["20230320", "20230319"])
                .page(6, &["20230301", "20230210"]),
        );
        let cache = Arc::new(PageCache::new());
        cache.put(
            6,
            PageListingEntry {
                page_number: 6,
                first_date: "20230301".to_string(),
                last_date: "20230210".to_string(),
            },
        );

        let found = locator(&source, &cache, 6).locate(ymd(2023, 1, 15)).await;
        assert_eq!(found, Located::Unknown);
        assert_eq!(source.requested_pages(), vec![page_url(1)]);
    }

    #[tokio::test]
    async fn test_cached_older_page_is_not_refetched() {
        let source = Arc::new(
            FakeSource::default()
                .page(1, &["20230120", "20230119"])
                .page(2, &["20230116", "20230115"])
                .file("20230115", b"found"),
        );
        let cache = Arc::new(PageCache::new());
        cache.put(
            3,
            PageListingEntry {
                page_number: 3,
                first_date: "20230110".to_string(),
                last_date: "20230105".to_string(),
            },
        );

        let file = locator(&source, &cache, 3).locate(ymd(2023, 1, 15)).await;
        assert!(matches!(file, Located::Found(_)));
        assert_eq!(source.requested_pages(), vec![page_url(1), page_url(2)]);
    }

    #[tokio::test]
    async fn test_failed_page_does_not_abort_scan() {
        let source = Arc::new(
            FakeSource::default()
                .page(1, &["20230120"])
                .page(2, &["20230116", "20230115"])
                .failing(3)
                .file("20230115", b"found"),
        );
        let cache = Arc::new(PageCache::new());

        let file = locator(&source, &cache, 3).locate(ymd(2023, 1, 15)).await;
        assert_eq!(file.file().unwrap().bytes, b"found");
        assert!(cache.get(3).is_none());
    }

    #[tokio::test]
    async fn test_page_without_links_is_not_a_prune_signal() {
        let source = Arc::new(
            FakeSource::default()
                .page(1, &["20230120"])
                .page(3, &[])
                .page(2, &["20230116", "20230115"])
                .file("20230115", b"found"),
        );
        let cache = Arc::new(PageCache::new());

        let file = locator(&source, &cache, 3).locate(ymd(2023, 1, 15)).await;
        assert!(matches!(file, Located::Found(_)));
        assert!(cache.get(3).is_none());
    }

    #[tokio::test]
    async fn test_missing_date_within_page_is_unlisted() {
        let source = Arc::new(
            FakeSource::default()
                .page(1, &["20230120", "20230119"])
                .page(2, &["20230116", "20230113"]),
        );
        let cache = Arc::new(PageCache::new());

        let found = locator(&source, &cache, 2).locate(ymd(2023, 1, 14)).await;
        assert_eq!(found, Located::Unlisted);
    }

    #[tokio::test]
    async fn test_missing_date_between_pages_is_unlisted() {
        let source = Arc::new(
            FakeSource::default()
                .page(1, &["20230117", "20230116"])
                .page(2, &["20230113", "20230112"]),
        );
        let cache = Arc::new(PageCache::new());

        // Saturday: page 1 is newer, page 2 is older
        let found = locator(&source, &cache, 2).locate(ymd(2023, 1, 14)).await;
        assert_eq!(found, Located::Unlisted);
    }

    #[tokio::test]
    async fn test_date_after_latest_bulletin_is_unlisted() {
        let source = Arc::new(FakeSource::default().page(1, &["20230117", "20230116"]));
        let cache = Arc::new(PageCache::new());

        let found = locator(&source, &cache, 1).locate(ymd(2023, 1, 18)).await;
        assert_eq!(found, Located::Unlisted);
    }

    #[tokio::test]
    async fn test_miss_after_failed_page_is_unknown() {
        let source = Arc::new(
            FakeSource::default()
                .page(1, &["20230117", "20230116"])
                .failing(2),
        );
        let cache = Arc::new(PageCache::new());

        let found = locator(&source, &cache, 2).locate(ymd(2023, 1, 14)).await;
        assert_eq!(found, Located::Unknown);
    }

    #[tokio::test]
    async fn test_date_older_than_scanned_pages_is_unknown() {
        let source = Arc::new(
            FakeSource::default()
                .page(1, &["20230117", "20230116"])
                .page(2, &["20230113", "20230112"]),
        );
        let cache = Arc::new(PageCache::new());

        let found = locator(&source, &cache, 2).locate(ymd(2022, 12, 1)).await;
        assert_eq!(found, Located::Unknown);
    }

    #[tokio::test]
    async fn test_failed_file_download_is_unknown() {
        let source = Arc::new(FakeSource::default().page(1, &["20230115"]));
        let cache = Arc::new(PageCache::new());

        let found = locator(&source, &cache, 1).locate(ymd(2023, 1, 15)).await;
        assert_eq!(found, Located::Unknown);
    }

    #[test]
    fn test_scan_links_in_page_order() {
        let source: Arc<dyn ListingSource> = Arc::new(FakeSource::default());
        let locator =
            PaginationLocator::new(&config(3), source, Arc::new(PageCache::new())).unwrap();

        let html = r#"
            <a href="/upload/oil_xls_20230117162000.xls">a</a>
            <a href="/news/item.html">news</a>
            <a href="upload/oil_xls_20230116162000.xls">b</a>
        "#;
        let links = locator.scan_links(html);
        assert_eq!(
            links,
            vec![
                ("20230117".to_string(), "/upload/oil_xls_20230117162000.xls".to_string()),
                ("20230116".to_string(), "upload/oil_xls_20230116162000.xls".to_string()),
            ]
        );
    }
}
