use regex::Regex;
use std::sync::OnceLock;

use crate::core::types::AcademicSignals;

fn doi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b10\.\d{4,9}/[-._;()/:a-zA-Z0-9]+").unwrap())
}

fn arxiv_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"arXiv:\s?(\d{4}\.\d{4,5})").unwrap())
}

fn bracket_citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\d{1,3}\]").unwrap())
}

fn paren_citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(\d{1,3}\)").unwrap())
}

const LATEX_MARKERS: [&str; 5] = [r"\begin{", r"\cite{", r"\ref{", r"\frac{", "$$"];

/// Regex scan for academic signals over a page's distilled text. The
/// composite score weights hard identifiers (DOI, arXiv) highest and caps
/// at 10.
pub fn scan(content: &str) -> AcademicSignals {
    let lower = content.to_lowercase();

    let doi = doi_re()
        .find(content)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_string());
    let arxiv_id = arxiv_re()
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let has_latex = LATEX_MARKERS.iter().any(|m| content.contains(m));

    // Citation markers need at least two hits to count; a lone "[1]" is
    // far more often a footnote or array index.
    let citation_hits = lower.matches("et al.").count()
        + bracket_citation_re().find_iter(content).count()
        + paren_citation_re().find_iter(content).count();
    let has_citations = citation_hits >= 2;

    let has_references = lower.contains("references") || lower.contains("bibliography");
    let has_abstract = lower.contains("abstract");

    let mut score: f64 = 0.0;
    if doi.is_some() {
        score += 3.0;
    }
    if arxiv_id.is_some() {
        score += 3.0;
    }
    if has_latex {
        score += 1.5;
    }
    if has_citations {
        score += 1.0;
    }
    if has_references {
        score += 1.0;
    }
    if has_abstract {
        score += 0.5;
    }

    AcademicSignals {
        has_doi: doi.is_some(),
        doi,
        has_arxiv: arxiv_id.is_some(),
        arxiv_id,
        has_latex,
        has_citations,
        has_references,
        has_abstract,
        academic_score: score.min(10.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doi_and_arxiv_detected() {
        let text = "See doi 10.1145/3368089.3409746 and arXiv:2106.04554 for details.";
        let signals = scan(text);
        assert!(signals.has_doi);
        assert_eq!(signals.doi.as_deref(), Some("10.1145/3368089.3409746"));
        assert!(signals.has_arxiv);
        assert_eq!(signals.arxiv_id.as_deref(), Some("2106.04554"));
        assert_eq!(signals.academic_score, 6.0);
    }

    #[test]
    fn single_citation_marker_does_not_count() {
        let one = scan("As shown in [1], things happen.");
        assert!(!one.has_citations);
        let two = scan("As shown in [1] and later in [2], things happen.");
        assert!(two.has_citations);
        let et_al = scan("Smith et al. found X; Jones et al. found Y.");
        assert!(et_al.has_citations);
    }

    #[test]
    fn full_paper_scores_high() {
        let text = "Abstract. We present X. \\cite{smith} As in [1] and [2]. \
                    See doi 10.1000/xyz123 or arXiv:2001.00001. References follow.";
        let signals = scan(text);
        assert!(signals.has_abstract);
        assert!(signals.has_latex);
        assert!(signals.has_references);
        assert_eq!(signals.academic_score, 10.0);
    }

    #[test]
    fn plain_prose_scores_zero() {
        let signals = scan("A blog post about cooking pasta at home.");
        assert_eq!(signals.academic_score, 0.0);
        assert!(!signals.has_doi);
        assert!(!signals.has_citations);
    }
}
