//! Link extraction for the crawler module
//!
//! Every anchor's `href` is resolved against the page URL with standard
//! relative-reference rules, the fragment is dropped, and the result is kept
//! when the predicate accepts it. Links are unique by URL; the first anchor
//! pointing at a URL supplies its label.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::trace;
use url::Url;

use crate::crawler::config::PAPER_FILES_PREFIX;
use crate::crawler::{CrawlTarget, TargetKind};

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector must parse"));

/// Extract the anchors of `html` accepted by `predicate`
///
/// # Arguments
///
/// * `html` - The document to scan
/// * `base` - URL the document was fetched from
/// * `kind` - Hierarchy level assigned to the returned targets
/// * `predicate` - Filter applied to each resolved URL
///
/// # Returns
///
/// The accepted targets in document order, without duplicate URLs
pub fn extract_links<P>(html: &str, base: &Url, kind: TargetKind, predicate: P) -> Vec<CrawlTarget>
where
    P: Fn(&Url) -> bool,
{
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for anchor in document.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let mut url = match base.join(href.trim()) {
            Ok(url) => url,
            Err(e) => {
                trace!("Skipping unresolvable href '{}': {}", href, e);
                continue;
            }
        };
        url.set_fragment(None);

        if !predicate(&url) || !seen.insert(url.clone()) {
            continue;
        }

        let label = anchor.text().collect::<String>().trim().to_string();
        targets.push(CrawlTarget { url, kind, label });
    }

    targets
}

/// `/paper_files/paper/<digits>` with an optional trailing slash
pub fn is_year_link(url: &Url) -> bool {
    url.path()
        .strip_prefix(PAPER_FILES_PREFIX)
        .map(|rest| rest.trim_end_matches('/'))
        .is_some_and(|year| !year.is_empty() && year.bytes().all(|b| b.is_ascii_digit()))
}

/// A detail page below the paper files prefix
pub fn is_paper_link(url: &Url) -> bool {
    let path = url.path();
    path.starts_with(PAPER_FILES_PREFIX) && path.ends_with(".html")
}

pub fn is_pdf_link(url: &Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(".pdf")
}

fn same_host(url: &Url, base: &Url) -> bool {
    url.host_str() == base.host_str()
}

/// Year index links of the site root, on the root's host
pub fn year_links(html: &str, base: &Url) -> Vec<CrawlTarget> {
    extract_links(html, base, TargetKind::Year, |url| same_host(url, base) && is_year_link(url))
}

/// Paper-detail links of a year index page, on the page's host
pub fn paper_links(html: &str, base: &Url) -> Vec<CrawlTarget> {
    extract_links(html, base, TargetKind::Paper, |url| same_host(url, base) && is_paper_link(url))
}

/// PDF links of a paper-detail page, on any host
pub fn pdf_links(html: &str, base: &Url) -> Vec<CrawlTarget> {
    extract_links(html, base, TargetKind::Pdf, is_pdf_link)
}
