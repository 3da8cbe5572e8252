//! Citation Validator (§4.4, §4.5): extracts claim URLs from a synthesized
//! artifact, matches them against the research source list, and computes a
//! citation score.

use std::collections::HashSet;

use once_cell_urls::extract_urls;
use url::Url;

/// A source the research phase actually fetched.
#[derive(Debug, Clone)]
pub struct ResearchSource {
    pub url: String,
    pub title: String,
    pub char_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CitationReport {
    pub cited_urls: Vec<String>,
    pub uncited_urls: Vec<String>,
    /// `cited_factual_paragraphs / total_factual_paragraphs`, `0.0` if the
    /// artifact has no paragraphs carrying a citation.
    pub citation_score: f64,
}

/// Splits `artifact` into paragraphs on blank lines and scores the fraction
/// that cite at least one URL present in `sources` (glossary: "citation
/// score"). A paragraph with no URL at all is not "factual" in the sense the
/// rubric cares about and is excluded from both the numerator and
/// denominator; an artifact with zero factual paragraphs scores 0.
pub fn validate(artifact: &str, sources: &[ResearchSource]) -> CitationReport {
    let known_urls: HashSet<&str> = sources.iter().map(|s| s.url.as_str()).collect();

    let mut cited_urls = Vec::new();
    let mut uncited_urls = Vec::new();
    let mut total_factual_paragraphs = 0u32;
    let mut cited_factual_paragraphs = 0u32;

    for paragraph in artifact.split("\n\n") {
        let urls = extract_urls(paragraph);
        if urls.is_empty() {
            continue;
        }
        total_factual_paragraphs += 1;
        let mut paragraph_has_known_citation = false;
        for found in urls {
            if known_urls.contains(found.as_str()) {
                paragraph_has_known_citation = true;
                if !cited_urls.contains(&found) {
                    cited_urls.push(found);
                }
            } else if !uncited_urls.contains(&found) {
                uncited_urls.push(found);
            }
        }
        if paragraph_has_known_citation {
            cited_factual_paragraphs += 1;
        }
    }

    let citation_score = if total_factual_paragraphs == 0 {
        0.0
    } else {
        f64::from(cited_factual_paragraphs) / f64::from(total_factual_paragraphs)
    };

    CitationReport { cited_urls, uncited_urls, citation_score }
}

/// Whether `candidate` parses as an absolute HTTP(S) URL, used to filter the
/// regex-extracted tokens down to things `url::Url` itself accepts.
pub fn is_valid_url(candidate: &str) -> bool {
    Url::parse(candidate).map(|u| u.scheme() == "http" || u.scheme() == "https").unwrap_or(false)
}

/// URL extraction kept in its own inline module (rather than a separate
/// file) since it is a single regex shared only by this validator.
mod once_cell_urls {
    use regex::Regex;
    use std::sync::OnceLock;

    static URL_PATTERN: OnceLock<Regex> = OnceLock::new();

    pub fn extract_urls(text: &str) -> Vec<String> {
        let pattern = URL_PATTERN.get_or_init(|| Regex::new(r"https?://[^\s)\]>,]+").expect("static URL pattern is valid"));
        pattern
            .find_iter(text)
            .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_string())
            .filter(|candidate| super::is_valid_url(candidate))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(url: &str) -> ResearchSource {
        ResearchSource { url: url.to_string(), title: "t".into(), char_count: 100 }
    }

    #[test]
    fn artifact_with_no_urls_scores_zero() {
        let report = validate("just prose, no links here.", &[source("https://example.com")]);
        assert_eq!(report.citation_score, 0.0);
    }

    #[test]
    fn fully_cited_artifact_scores_one() {
        let artifact = "Per https://example.com/a, the result holds.";
        let report = validate(artifact, &[source("https://example.com/a")]);
        assert_eq!(report.citation_score, 1.0);
        assert_eq!(report.cited_urls, vec!["https://example.com/a".to_string()]);
    }

    #[test]
    fn partial_citation_is_fractional() {
        let artifact = "Per https://example.com/a, the result holds.\n\nPer https://unknown.example/b, something else.";
        let report = validate(artifact, &[source("https://example.com/a")]);
        assert_eq!(report.citation_score, 0.5);
        assert_eq!(report.uncited_urls, vec!["https://unknown.example/b".to_string()]);
    }

    #[test]
    fn citation_score_is_always_in_unit_interval() {
        let artifacts = [
            "no citations at all",
            "https://example.com/a one citation",
            "https://example.com/a\n\nhttps://example.com/b\n\nhttps://unrelated.example/c",
        ];
        for artifact in artifacts {
            let report = validate(artifact, &[source("https://example.com/a"), source("https://example.com/b")]);
            assert!((0.0..=1.0).contains(&report.citation_score));
        }
    }
}
