//! Metadata extraction for paper-detail pages
//!
//! The only structural assumption is "label then adjacent sibling": the value
//! of a field is the first `<p>` following the heading that names it. Any
//! missing node yields the field's sentinel; extraction never fails.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::crawler::{NO_ABSTRACT, PaperMetadata, UNKNOWN_AUTHORS, UNKNOWN_TITLE};

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h4").expect("title selector must parse"));

static HEADING: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("h1, h2, h3, h4, h5, h6").expect("heading selector must parse")
});

/// Strip everything outside printable ASCII and trim
///
/// Empty input maps to `"N/A"`.
pub fn replace_illegal_chars(text: &str) -> String {
    if text.is_empty() {
        return "N/A".to_string();
    }
    text.chars()
        .filter(|c| matches!(c, '\x20'..='\x7e'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect()
}

/// First `<p>` sibling after the heading whose text is `label`
fn labeled_paragraph<'a>(document: &'a Html, label: &str) -> Option<ElementRef<'a>> {
    let heading = document
        .select(&HEADING)
        .find(|heading| element_text(*heading).trim() == label)?;

    heading
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|sibling| sibling.value().name() == "p")
}

/// Extract title, authors and abstract from a paper-detail page
///
/// # Arguments
///
/// * `html` - The HTML of the paper page
///
/// # Returns
///
/// The extracted metadata, with sentinels for missing fields
pub fn extract_metadata(html: &str) -> PaperMetadata {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(|h4| replace_illegal_chars(&element_text(h4)))
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    let authors = labeled_paragraph(&document, "Authors")
        .map(|p| replace_illegal_chars(&element_text(p)))
        .unwrap_or_else(|| UNKNOWN_AUTHORS.to_string());

    let abstract_text = labeled_paragraph(&document, "Abstract")
        .map(|p| replace_illegal_chars(&element_text(p)))
        .unwrap_or_else(|| NO_ABSTRACT.to_string());

    PaperMetadata {
        title,
        authors,
        abstract_text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAPER_PAGE: &str = r#"
        <html><body><div class="container-fluid">
          <h4>Scaling Laws for Caf&eacute; Models</h4>
          <p>Part of Advances in Neural Information Processing Systems 36</p>
          <a href="/paper_files/paper/2023/file/abc-Paper-Conference.pdf">Paper</a>
          <h4>Authors</h4>
          <p><i>Ada Lovelace, Alan Turing</i></p>
          <h4>Abstract</h4>
          <p>We study scaling.</p>
        </div></body></html>
    "#;

    #[test]
    fn test_extract_full_page() {
        let metadata = extract_metadata(PAPER_PAGE);
        assert_eq!(metadata.title, "Scaling Laws for Caf Models");
        assert_eq!(metadata.authors, "Ada Lovelace, Alan Turing");
        assert_eq!(metadata.abstract_text, "We study scaling.");
    }

    #[test]
    fn test_missing_headings_yield_sentinels() {
        let metadata = extract_metadata("<html><body><p>Nothing here</p></body></html>");
        assert_eq!(metadata.title, UNKNOWN_TITLE);
        assert_eq!(metadata.authors, UNKNOWN_AUTHORS);
        assert_eq!(metadata.abstract_text, NO_ABSTRACT);
    }

    #[test]
    fn test_heading_without_sibling_paragraph() {
        let html = r#"
            <h4>A Title</h4>
            <div><h4>Authors</h4></div>
            <p>Not a sibling of the heading</p>
            <h4>Abstract</h4>
        "#;
        let metadata = extract_metadata(html);
        assert_eq!(metadata.title, "A Title");
        assert_eq!(metadata.authors, UNKNOWN_AUTHORS);
        assert_eq!(metadata.abstract_text, NO_ABSTRACT);
    }

    #[test]
    fn test_label_must_match_exactly() {
        let html = r#"
            <h4>Title</h4>
            <h4>Authors and Affiliations</h4><p>Wrong</p>
            <h3> Abstract </h3><div>skip</div><p>Found after a div</p>
        "#;
        let metadata = extract_metadata(html);
        assert_eq!(metadata.authors, UNKNOWN_AUTHORS);
        assert_eq!(metadata.abstract_text, "Found after a div");
    }

    #[test]
    fn test_malformed_html_never_panics() {
        let metadata = extract_metadata("<h4>Unclosed <p><<<>>></h4></h4><p");
        assert_eq!(metadata.authors, UNKNOWN_AUTHORS);
        assert_eq!(metadata.abstract_text, NO_ABSTRACT);
    }

    #[test]
    fn test_replace_illegal_chars() {
        assert_eq!(replace_illegal_chars("  caf\u{e9}\n\tbar  "), "cafbar");
        assert_eq!(replace_illegal_chars(""), "N/A");
        assert_eq!(replace_illegal_chars("\u{2014}"), "");
    }
}
