//! Rich-text sanitization and content fingerprints.
//!
//! Paragraph content arrives as editor HTML. It is converted to plain
//! Markdown-flavoured text with the `htmd` crate, then run through a cleanup
//! pipeline that normalizes whitespace. The sanitized text is what the prompt
//! embeds and what [`content_version`] fingerprints.

mod cleanup;

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use tracing::{debug, warn};

use studyqa_shared::ContentVersion;

/// Tags whose content never reaches the prompt.
const SKIP_TAGS: [&str; 6] = ["script", "style", "iframe", "noscript", "svg", "template"];

/// Convert editor content to normalized plain text.
///
/// Plain text passes through the whitespace cleanup only. Conversion never
/// fails: if `htmd` rejects the input, text nodes are extracted with
/// `scraper` instead.
pub fn sanitize(content: &str) -> String {
    if !looks_like_html(content) {
        return cleanup::run_pipeline(content);
    }

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let converted = match converter.convert(content) {
        Ok(md) => md,
        Err(e) => {
            warn!(error = %e, "htmd conversion failed, extracting text nodes");
            extract_text(content)
        }
    };

    let stripped = cleanup::strip_leftover_html(&converted);
    let cleaned = cleanup::run_pipeline(&stripped);
    debug!(
        raw_len = content.len(),
        clean_len = cleaned.len(),
        "sanitized html content"
    );
    cleaned
}

/// Fingerprint of the sanitized form of `content`.
pub fn content_version(content: &str) -> ContentVersion {
    ContentVersion::of(&sanitize(content))
}

fn looks_like_html(content: &str) -> bool {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"</?[a-zA-Z][a-zA-Z0-9-]*(?:\s[^>]*)?/?>").expect("valid regex"));

    TAG_RE.is_match(content)
}

/// Fallback: concatenate text nodes, one block per line.
fn extract_text(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    doc.root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let text = "Photosynthesis converts light into chemical energy.";
        assert_eq!(sanitize(text), text);
    }

    #[test]
    fn html_converted_to_text() {
        let html = "<div>Photosynthesis converts light into chemical energy.</div>";
        assert_eq!(
            sanitize(html),
            "Photosynthesis converts light into chemical energy."
        );
    }

    #[test]
    fn script_and_style_dropped() {
        let html = "<p>Cells divide.</p><script>alert(1)</script><style>p { color: red }</style>";
        let text = sanitize(html);
        assert!(text.contains("Cells divide"));
        assert!(!text.contains("alert"));
        assert!(!text.contains("color"));
    }

    #[test]
    fn paragraphs_stay_separated() {
        let html = "<p>First idea.</p><p>Second idea.</p>";
        let text = sanitize(html);
        assert!(text.contains("First idea."));
        assert!(text.contains("Second idea."));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn whitespace_churn_keeps_version() {
        let a = content_version("<p>Light is energy.</p>");
        let b = content_version("<p>Light   is energy. </p>\n\n");
        assert_eq!(a, b);

        let c = content_version("Light is energy.");
        let d = content_version("  Light is energy.\r\n");
        assert_eq!(c, d);
    }

    #[test]
    fn real_edit_changes_version() {
        let a = content_version("<p>Light is energy.</p>");
        let b = content_version("<p>Light is matter.</p>");
        assert_ne!(a, b);
    }

    #[test]
    fn blank_markup_sanitizes_to_empty() {
        assert!(sanitize("").is_empty());
        assert!(sanitize("   \n\t").is_empty());
        assert!(sanitize("<div><br></div>").is_empty());
        assert!(!sanitize("<div>Text</div>").is_empty());
    }

    #[test]
    fn extract_text_fallback_joins_nodes() {
        let text = extract_text("<div><b>Bold</b> <i>words</i></div>");
        assert_eq!(text, "Bold\nwords");
    }
}
