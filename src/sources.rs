use crate::paper::Paper;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Paper pages the library knows how to identify
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KnownSource {
    Arxiv,
    OpenReview,
    Pmlr,
    NeurIps,
    Acl,
    BioRxiv,
}

impl KnownSource {
    pub const ALL: [KnownSource; 6] = [
        KnownSource::Arxiv,
        KnownSource::OpenReview,
        KnownSource::Pmlr,
        KnownSource::NeurIps,
        KnownSource::Acl,
        KnownSource::BioRxiv,
    ];

    /// Key used in stored records and on the command line
    pub fn key(self) -> &'static str {
        match self {
            KnownSource::Arxiv => "arxiv",
            KnownSource::OpenReview => "openreview",
            KnownSource::Pmlr => "pmlr",
            KnownSource::NeurIps => "neurips",
            KnownSource::Acl => "acl",
            KnownSource::BioRxiv => "biorxiv",
        }
    }

    fn id_prefix(self) -> &'static str {
        match self {
            KnownSource::Arxiv => "Arxiv",
            KnownSource::OpenReview => "OR",
            KnownSource::Pmlr => "PMLR",
            KnownSource::NeurIps => "NeurIPS",
            KnownSource::Acl => "ACL",
            KnownSource::BioRxiv => "Biorxiv",
        }
    }

    fn hosts(self) -> &'static [&'static str] {
        match self {
            KnownSource::Arxiv => &["arxiv.org", "www.arxiv.org", "export.arxiv.org"],
            KnownSource::OpenReview => &["openreview.net"],
            KnownSource::Pmlr => &["proceedings.mlr.press"],
            KnownSource::NeurIps => &["proceedings.neurips.cc", "papers.nips.cc", "papers.neurips.cc"],
            KnownSource::Acl => &["aclanthology.org", "www.aclweb.org"],
            KnownSource::BioRxiv => &["www.biorxiv.org", "biorxiv.org"],
        }
    }

    /// Identifier of the paper within this source, if the URL points at one
    fn source_id(self, url: &Url) -> Option<String> {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();

        match self {
            KnownSource::Arxiv => extract_arxiv_from_url(url.as_str()).map(|id| strip_version(&id)),
            KnownSource::OpenReview => {
                if !matches!(segments.first(), Some(&"forum") | Some(&"pdf")) {
                    return None;
                }
                url.query_pairs()
                    .find(|(k, _)| k == "id")
                    .map(|(_, v)| v.into_owned())
                    .filter(|v| !v.is_empty())
            }
            KnownSource::Pmlr => {
                // /v139/smith21a.html or /v139/smith21a/smith21a.pdf
                let volume = segments.first().filter(|v| v.starts_with('v'))?;
                let name = segments.get(1)?;
                let name = name.trim_end_matches(".html").trim_end_matches(".pdf");
                Some(format!("{}-{}", volume.trim_start_matches('v'), name))
            }
            KnownSource::NeurIps => {
                // /paper/2020/hash/<hash>-Abstract.html
                // /paper_files/paper/2020/file/<hash>-Paper.pdf
                let year_pos = segments.iter().position(|s| s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()))?;
                let year = segments[year_pos];
                let file = segments.get(year_pos + 2)?;
                let hash = file.split('-').next()?;
                if hash.len() < 8 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                    return None;
                }
                Some(format!("{}_{}", year, &hash[..8]))
            }
            KnownSource::Acl => {
                let last = segments.last()?;
                let id = last.trim_end_matches(".pdf");
                if id.contains('.') || id.contains('-') {
                    Some(id.to_string())
                } else {
                    None
                }
            }
            KnownSource::BioRxiv => {
                // /content/10.1101/2021.01.01.425001v1(.full.pdf)
                let pos = segments.iter().position(|s| *s == "10.1101")?;
                let suffix = segments.get(pos + 1)?;
                let suffix = suffix.trim_end_matches(".full.pdf").trim_end_matches(".full");
                Some(strip_version(suffix))
            }
        }
    }
}

impl fmt::Display for KnownSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for KnownSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KnownSource::ALL
            .into_iter()
            .find(|source| source.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let keys: Vec<_> = KnownSource::ALL.iter().map(|s| s.key()).collect();
                format!("unknown source '{}' (expected one of: {})", s, keys.join(", "))
            })
    }
}

/// A URL recognized as a paper page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMatch {
    pub source: KnownSource,
    /// Identifier within the source, e.g. `2101.00001`
    pub source_id: String,
    /// Library id, e.g. `Arxiv-2101.00001`
    pub paper_id: String,
    pub url: Url,
}

/// Match a URL against the known paper sources
pub fn classify(url: &Url) -> Option<SourceMatch> {
    let host = url.host_str()?.to_lowercase();
    let source = KnownSource::ALL
        .into_iter()
        .find(|s| s.hosts().contains(&host.as_str()))?;
    let source_id = source.source_id(url)?;
    Some(SourceMatch {
        source,
        paper_id: format!("{}-{}", source.id_prefix(), source_id),
        source_id,
        url: url.clone(),
    })
}

/// arXiv id of a library paper, from its id or its pdf link
pub fn arxiv_id_of(paper: &Paper) -> Option<String> {
    if let Some(id) = paper.id.strip_prefix("Arxiv-") {
        if is_arxiv_id(id) {
            return Some(id.to_string());
        }
    }
    extract_arxiv_from_url(&paper.pdf_link)
}

/// Check if a string looks like an arXiv ID
pub fn is_arxiv_id(s: &str) -> bool {
    // Old format: hep-th/9901001
    // New format: 2301.12345 or 2301.12345v1
    let s = s.trim();
    if s.contains('/') {
        let parts: Vec<&str> = s.split('/').collect();
        let number = parts.get(1).map(|p| p.split('v').next().unwrap_or(""));
        parts.len() == 2 && number.map_or(false, |n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
    } else {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 2 {
            return false;
        }
        let base = parts[1].split('v').next().unwrap_or("");
        parts[0].len() == 4
            && parts[0].chars().all(|c| c.is_ascii_digit())
            && !base.is_empty()
            && base.chars().all(|c| c.is_ascii_digit())
    }
}

/// Extract arXiv ID from a URL
pub fn extract_arxiv_from_url(url: &str) -> Option<String> {
    // https://arxiv.org/abs/2301.12345
    // https://arxiv.org/pdf/2301.12345.pdf
    if url.contains("arxiv.org") {
        let patterns = ["/abs/", "/pdf/"];
        for pattern in patterns {
            if let Some(idx) = url.find(pattern) {
                let rest = &url[idx + pattern.len()..];
                let id = rest
                    .split(|c: char| !c.is_alphanumeric() && c != '.' && c != '/' && c != '-')
                    .next()?;
                let id = id.trim_end_matches('/').trim_end_matches(".pdf");
                if is_arxiv_id(id) {
                    return Some(id.to_string());
                }
            }
        }
    }
    None
}

/// Drop a trailing `vN` version marker
fn strip_version(id: &str) -> String {
    match id.rfind('v') {
        Some(pos) if pos > 0 && pos + 1 < id.len() && id[pos + 1..].chars().all(|c| c.is_ascii_digit()) => {
            id[..pos].to_string()
        }
        _ => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_str(s: &str) -> Option<SourceMatch> {
        classify(&Url::parse(s).unwrap())
    }

    #[test]
    fn test_is_arxiv_id() {
        assert!(is_arxiv_id("2301.12345"));
        assert!(is_arxiv_id("2301.12345v1"));
        assert!(is_arxiv_id("hep-th/9901001"));
        assert!(!is_arxiv_id("not-an-arxiv-id"));
        assert!(!is_arxiv_id("10.1234/example"));
    }

    #[test]
    fn test_extract_arxiv_from_url() {
        assert_eq!(
            extract_arxiv_from_url("https://arxiv.org/abs/2301.12345"),
            Some("2301.12345".to_string())
        );
        assert_eq!(
            extract_arxiv_from_url("https://arxiv.org/pdf/2301.12345.pdf"),
            Some("2301.12345".to_string())
        );
        assert_eq!(
            extract_arxiv_from_url("https://arxiv.org/abs/hep-th/9901001"),
            Some("hep-th/9901001".to_string())
        );
        assert_eq!(extract_arxiv_from_url("https://example.com"), None);
    }

    #[test]
    fn test_classify_known_sources() {
        let arxiv = classify_str("https://arxiv.org/abs/2101.00001v3").unwrap();
        assert_eq!(arxiv.source, KnownSource::Arxiv);
        assert_eq!(arxiv.paper_id, "Arxiv-2101.00001");

        let or = classify_str("https://openreview.net/forum?id=H1gax6VtDB").unwrap();
        assert_eq!(or.paper_id, "OR-H1gax6VtDB");

        let pmlr = classify_str("http://proceedings.mlr.press/v139/smith21a.html").unwrap();
        assert_eq!(pmlr.paper_id, "PMLR-139-smith21a");

        let neurips = classify_str(
            "https://proceedings.neurips.cc/paper/2020/hash/4c5bcfec8584af0d967f1ab10179ca4b-Abstract.html",
        )
        .unwrap();
        assert_eq!(neurips.paper_id, "NeurIPS-2020_4c5bcfec");

        let acl = classify_str("https://aclanthology.org/2020.acl-main.1.pdf").unwrap();
        assert_eq!(acl.paper_id, "ACL-2020.acl-main.1");

        let bio = classify_str("https://www.biorxiv.org/content/10.1101/2021.01.01.425001v2").unwrap();
        assert_eq!(bio.paper_id, "Biorxiv-2021.01.01.425001");
    }

    #[test]
    fn test_classify_rejects_unknown_pages() {
        assert!(classify_str("https://example.com/paper.pdf").is_none());
        assert!(classify_str("https://arxiv.org/list/cs.LG/recent").is_none());
        assert!(classify_str("https://openreview.net/group?id=ICLR.cc").is_none());
    }

    #[test]
    fn test_source_from_str() {
        assert_eq!("OpenReview".parse::<KnownSource>(), Ok(KnownSource::OpenReview));
        assert!("scihub".parse::<KnownSource>().is_err());
    }

    #[test]
    fn test_arxiv_id_of_paper() {
        let paper = Paper::new("Arxiv-2006.11239", "X");
        assert_eq!(arxiv_id_of(&paper).as_deref(), Some("2006.11239"));

        let mut other = Paper::new("OR-abc", "X");
        assert_eq!(arxiv_id_of(&other), None);
        other.pdf_link = "https://arxiv.org/pdf/2006.11239v2.pdf".to_string();
        assert_eq!(arxiv_id_of(&other).as_deref(), Some("2006.11239v2"));
    }
}
