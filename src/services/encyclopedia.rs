//! Species encyclopedia lookups.
//!
//! The summary REST endpoint answers for most species pages. When it does
//! not (older mirrors, odd titles), the article HTML is fetched instead and
//! the first substantial paragraph of the lead is scraped out.

use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::services::geoservices::{GeoClient, WebError};

/// Paragraphs shorter than this are coordinate stubs or empty leads.
const MIN_EXTRACT_LEN: usize = 40;

#[derive(Debug, Clone)]
pub struct EncyclopediaSummary {
    pub title: String,
    pub extract: String,
    pub url: String,
}

#[derive(Deserialize)]
struct SummaryResponse {
    title: String,
    #[serde(default)]
    extract: String,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Deserialize)]
struct ContentUrls {
    desktop: DesktopUrls,
}

#[derive(Deserialize)]
struct DesktopUrls {
    page: String,
}

/// Fetches and cleans encyclopedia extracts.
pub struct EncyclopediaService {
    /// Matches numbered footnote markers left in scraped text, `[3]`.
    footnote_pattern: Regex,

    /// Collapses runs of whitespace, newlines included.
    whitespace_pattern: Regex,
}

impl EncyclopediaService {
    pub fn new() -> Self {
        Self {
            footnote_pattern: Regex::new(r"\[\d+\]").expect("Invalid footnote regex"),
            whitespace_pattern: Regex::new(r"\s+").expect("Invalid whitespace regex"),
        }
    }

    /// Look a page title up, trying the summary API first and scraping the
    /// article lead when it fails.
    pub async fn lookup(
        &self,
        client: &GeoClient,
        title: &str,
    ) -> Result<EncyclopediaSummary, WebError> {
        let base = client.endpoints().encyclopedia.clone();
        let title = title.trim();
        if title.is_empty() {
            return Err(WebError::InvalidUrl {
                url: base,
                message: "empty page title".to_string(),
            });
        }

        let rest = summary_endpoint(&base, title);
        let rest_url = parse_url(&rest)?;
        match client.get_json::<SummaryResponse>(rest_url).await {
            Ok(summary) if !summary.extract.is_empty() => {
                let url = summary
                    .content_urls
                    .map(|c| c.desktop.page)
                    .unwrap_or_else(|| article_url(&base, title));
                return Ok(EncyclopediaSummary {
                    title: summary.title,
                    extract: self.clean(&summary.extract),
                    url,
                });
            }
            Ok(_) => debug!(title, "Summary API answered without an extract"),
            Err(err) => debug!(title, error = %err, "Summary API unavailable"),
        }

        let article = article_url(&base, title);
        let html = client.fetch_text(parse_url(&article)?).await?;
        let extract = self
            .first_paragraph(&html)
            .ok_or_else(|| WebError::Parse {
                url: article.clone(),
                message: "no readable lead paragraph".to_string(),
            })?;
        Ok(EncyclopediaSummary {
            title: title.to_string(),
            extract,
            url: article,
        })
    }

    /// First lead paragraph long enough to be prose.
    fn first_paragraph(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let selector = Selector::parse("div.mw-parser-output > p").ok()?;
        for node in document.select(&selector) {
            let text: String = node.text().collect();
            let text = self.clean(&text);
            if text.chars().count() >= MIN_EXTRACT_LEN {
                return Some(text);
            }
        }
        None
    }

    fn clean(&self, text: &str) -> String {
        let text = self.footnote_pattern.replace_all(text, "");
        self.whitespace_pattern
            .replace_all(&text, " ")
            .trim()
            .to_string()
    }
}

impl Default for EncyclopediaService {
    fn default() -> Self {
        Self::new()
    }
}

fn summary_endpoint(base: &str, title: &str) -> String {
    format!(
        "{}/api/rest_v1/page/summary/{}",
        base.trim_end_matches('/'),
        title.replace(' ', "_")
    )
}

fn article_url(base: &str, title: &str) -> String {
    format!(
        "{}/wiki/{}",
        base.trim_end_matches('/'),
        title.replace(' ', "_")
    )
}

fn parse_url(raw: &str) -> Result<Url, WebError> {
    Url::parse(raw).map_err(|err| WebError::InvalidUrl {
        url: raw.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_response_parses_rest_payload() {
        let body = r#"{
            "title": "Sonneur à ventre jaune",
            "extract": "Le Sonneur à ventre jaune (Bombina variegata) est une espèce d'amphibiens.",
            "content_urls": {
                "desktop": {"page": "https://fr.wikipedia.org/wiki/Sonneur_%C3%A0_ventre_jaune"}
            }
        }"#;

        let parsed: SummaryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.title, "Sonneur à ventre jaune");
        assert!(parsed.extract.contains("Bombina variegata"));
        assert!(parsed.content_urls.unwrap().desktop.page.ends_with("jaune"));
    }

    #[test]
    fn test_first_paragraph_skips_stubs_and_strips_footnotes() {
        let service = EncyclopediaService::new();
        let html = r#"<html><body><div class="mw-parser-output">
            <p><br/></p>
            <p>Court.</p>
            <p>Le <b>Sonneur à ventre jaune</b> (<i>Bombina variegata</i>) est une
            espèce d'amphibiens de la famille des Bombinatoridae, présente dans une
            grande partie de l'Europe.<sup class="reference">[1]</sup></p>
        </div></body></html>"#;

        let extract = service.first_paragraph(html).unwrap();
        assert!(extract.starts_with("Le Sonneur à ventre jaune (Bombina variegata)"));
        assert!(!extract.contains("[1]"));
        assert!(!extract.contains('\n'));
    }

    #[test]
    fn test_first_paragraph_none_without_lead() {
        let service = EncyclopediaService::new();
        assert!(service.first_paragraph("<html><body><p>Hors structure</p></body></html>").is_none());
    }

    #[test]
    fn test_urls_substitute_underscores() {
        assert_eq!(
            summary_endpoint("https://fr.wikipedia.org/", "Sonneur à ventre jaune"),
            "https://fr.wikipedia.org/api/rest_v1/page/summary/Sonneur_à_ventre_jaune"
        );
        assert_eq!(
            article_url("https://fr.wikipedia.org", "Drosera rotundifolia"),
            "https://fr.wikipedia.org/wiki/Drosera_rotundifolia"
        );
    }

    #[test]
    fn test_clean_collapses_whitespace() {
        let service = EncyclopediaService::new();
        assert_eq!(
            service.clean("  Une\n  espèce[12] rare  "),
            "Une espèce rare"
        );
    }
}
