use serde::{Deserialize, Serialize};

/// How much structure the parser extracts from a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    Minimal,
    Cheap,
    Full,
}

impl ExtractionMode {
    pub fn parse_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "minimal" => Some(ExtractionMode::Minimal),
            "cheap" => Some(ExtractionMode::Cheap),
            "full" => Some(ExtractionMode::Full),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Minimal => "minimal",
            ExtractionMode::Cheap => "cheap",
            ExtractionMode::Full => "full",
        }
    }

    pub fn from_option(value: Option<&str>) -> Self {
        value.and_then(Self::parse_str).unwrap_or(ExtractionMode::Cheap)
    }
}

/// Post-parse judgement of how well extraction went.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionQuality {
    Minimal,
    Low,
    Ok,
    Degraded,
}

impl ExtractionQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionQuality::Minimal => "minimal",
            ExtractionQuality::Low => "low",
            ExtractionQuality::Ok => "ok",
            ExtractionQuality::Degraded => "degraded",
        }
    }
}

/// Classifier label for a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Academic,
    Docs,
    Wiki,
    News,
    Repo,
    Blog,
    Landing,
    #[default]
    Unknown,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Academic => "academic",
            ContentType::Docs => "docs",
            ContentType::Wiki => "wiki",
            ContentType::News => "news",
            ContentType::Repo => "repo",
            ContentType::Blog => "blog",
            ContentType::Landing => "landing",
            ContentType::Unknown => "unknown",
        }
    }

    pub fn parse_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "academic" => ContentType::Academic,
            "docs" => ContentType::Docs,
            "wiki" => ContentType::Wiki,
            "news" => ContentType::News,
            "repo" => ContentType::Repo,
            "blog" => ContentType::Blog,
            "landing" => ContentType::Landing,
            _ => ContentType::Unknown,
        }
    }
}

/// Coarse domain classification derived from the host suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DomainType {
    Gov,
    Edu,
    Academic,
    Mobile,
    #[default]
    Commercial,
}

impl DomainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainType::Gov => "gov",
            DomainType::Edu => "edu",
            DomainType::Academic => "academic",
            DomainType::Mobile => "mobile",
            DomainType::Commercial => "commercial",
        }
    }
}

/// Element kind a content block was lifted from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    P,
    Li,
    Code,
    Table,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::H1 => "h1",
            BlockKind::H2 => "h2",
            BlockKind::H3 => "h3",
            BlockKind::H4 => "h4",
            BlockKind::H5 => "h5",
            BlockKind::H6 => "h6",
            BlockKind::P => "p",
            BlockKind::Li => "li",
            BlockKind::Code => "code",
            BlockKind::Table => "table",
        }
    }

    /// 1–6 for headings, `None` for everything else.
    pub fn heading_level(&self) -> Option<u8> {
        match self {
            BlockKind::H1 => Some(1),
            BlockKind::H2 => Some(2),
            BlockKind::H3 => Some(3),
            BlockKind::H4 => Some(4),
            BlockKind::H5 => Some(5),
            BlockKind::H6 => Some(6),
            _ => None,
        }
    }

    pub fn heading(level: u8) -> Self {
        match level {
            1 => BlockKind::H1,
            2 => BlockKind::H2,
            3 => BlockKind::H3,
            4 => BlockKind::H4,
            5 => BlockKind::H5,
            _ => BlockKind::H6,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodeSnippet {
    #[serde(default)]
    pub language: Option<String>,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

/// Exactly one payload variant per block, keyed by kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockPayload {
    Text(String),
    Code(CodeSnippet),
    Table(TableData),
}

impl BlockPayload {
    pub fn text(&self) -> Option<&str> {
        match self {
            BlockPayload::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Plain-text rendering used by analytics and the specialized extractors.
    pub fn plain_text(&self) -> String {
        match self {
            BlockPayload::Text(t) => t.clone(),
            BlockPayload::Code(c) => c.content.clone(),
            BlockPayload::Table(t) => {
                let mut out = t.headers.join(" ");
                for row in &t.rows {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(&row.join(" "));
                }
                out
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Internal,
    External,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: LinkKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    #[serde(flatten)]
    pub payload: BlockPayload,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
    pub confidence: f64,
}

/// One node of the heading hierarchy. Level 0 is the synthesized root that
/// holds blocks appearing before the first real heading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: u32,
    pub level: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<ContentBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Section>,
}

impl Section {
    pub fn heading_text(&self) -> Option<&str> {
        self.heading.as_ref().and_then(|h| h.payload.text())
    }

    fn count_nested(&self) -> usize {
        1 + self.children.iter().map(Section::count_nested).sum::<usize>()
    }

    fn count_blocks(&self) -> usize {
        self.heading.iter().count()
            + self.blocks.len()
            + self.children.iter().map(Section::count_blocks).sum::<usize>()
    }
}

/// Academic-signal scan results over a page's distilled content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct AcademicSignals {
    pub has_doi: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    pub has_arxiv: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,
    pub has_latex: bool,
    pub has_citations: bool,
    pub has_references: bool,
    pub has_abstract: bool,
    pub academic_score: f64,
}

/// Flat per-page metadata record persisted as `metadata.yaml` and mirrored
/// into the URL classification row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub extraction_mode: ExtractionMode,
    pub extraction_quality: ExtractionQuality,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    pub domain_type: DomainType,
    pub domain_category: String,
    pub country: String,
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_subtype: Option<String>,
    /// Overall detection confidence on the 0–10 scale. Never conflated with
    /// per-block confidence, which lives in [0, 1].
    pub detection_confidence: f64,

    #[serde(default)]
    pub academic: AcademicSignals,

    pub word_count: usize,
    pub estimated_read_min: u32,
    pub section_count: usize,
    pub block_count: usize,
    pub image_count: usize,
    pub language: String,
    pub language_confidence: f64,

    pub status_code: u16,
    pub final_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_chain: Vec<String>,
    pub http_content_type: String,

    /// Whether the derived counts above have been materialized from content.
    pub computed: bool,
}

impl Default for PageMetadata {
    fn default() -> Self {
        Self {
            extraction_mode: ExtractionMode::Minimal,
            extraction_quality: ExtractionQuality::Minimal,
            author: None,
            excerpt: None,
            site_name: None,
            published_time: None,
            favicon: None,
            image: None,
            domain_type: DomainType::default(),
            domain_category: "general".to_string(),
            country: "unknown".to_string(),
            content_type: ContentType::Unknown,
            content_subtype: None,
            detection_confidence: 0.0,
            academic: AcademicSignals::default(),
            word_count: 0,
            estimated_read_min: 0,
            section_count: 0,
            block_count: 0,
            image_count: 0,
            language: "unknown".to_string(),
            language_confidence: 0.0,
            status_code: 0,
            final_url: String::new(),
            redirect_chain: Vec::new(),
            http_content_type: String::new(),
            computed: false,
        }
    }
}

/// In-memory parse result for one URL. Exactly one of `content` /
/// `flat_content` / neither is populated, according to the extraction mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Section>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flat_content: Vec<ContentBlock>,
    pub metadata: PageMetadata,
}

impl Page {
    /// Total sections across the tree, sentinel roots included.
    pub fn section_count(&self) -> usize {
        self.content.iter().map(Section::count_nested).sum()
    }

    pub fn block_count(&self) -> usize {
        let tree: usize = self.content.iter().map(Section::count_blocks).sum();
        tree + self.flat_content.len()
    }

    /// Depth-first iteration over every block in the page, tree or flat.
    pub fn for_each_block<'a>(&'a self, f: &mut dyn FnMut(&'a ContentBlock)) {
        fn walk<'a>(section: &'a Section, f: &mut dyn FnMut(&'a ContentBlock)) {
            if let Some(h) = &section.heading {
                f(h);
            }
            for b in &section.blocks {
                f(b);
            }
            for child in &section.children {
                walk(child, f);
            }
        }
        for section in &self.content {
            walk(section, f);
        }
        for b in &self.flat_content {
            f(b);
        }
    }

    /// Plain-text rendering of all block content, used for word counting
    /// and the academic scanner.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.for_each_block(&mut |b| {
            let t = b.payload.plain_text();
            if !t.is_empty() {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&t);
            }
        });
        out
    }
}

/// Token estimate used by summary writers: words / 2.5, rounded.
pub fn estimated_tokens(word_count: usize) -> u64 {
    (word_count as f64 / 2.5).round() as u64
}

/// Read-time estimate at 200 wpm, floored at one minute for non-empty pages.
pub fn estimated_read_min(word_count: usize) -> u32 {
    if word_count == 0 {
        return 0;
    }
    ((word_count as f64 / 200.0).ceil() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_block(id: u32, kind: BlockKind, text: &str) -> ContentBlock {
        ContentBlock {
            id,
            kind,
            payload: BlockPayload::Text(text.to_string()),
            links: Vec::new(),
            confidence: 0.5,
        }
    }

    #[test]
    fn section_counts_include_nested_children() {
        let page = Page {
            url: "https://example.com".into(),
            title: "t".into(),
            content: vec![Section {
                id: 0,
                level: 1,
                heading: Some(text_block(1, BlockKind::H1, "Top")),
                blocks: vec![text_block(2, BlockKind::P, "intro")],
                children: vec![Section {
                    id: 3,
                    level: 2,
                    heading: Some(text_block(4, BlockKind::H2, "Sub")),
                    blocks: vec![text_block(5, BlockKind::P, "body")],
                    children: Vec::new(),
                }],
            }],
            flat_content: Vec::new(),
            metadata: PageMetadata::default(),
        };

        assert_eq!(page.section_count(), 2);
        assert_eq!(page.block_count(), 4);
    }

    #[test]
    fn plain_text_walks_every_block() {
        let mut page = Page {
            url: "https://example.com".into(),
            title: "t".into(),
            content: Vec::new(),
            flat_content: vec![
                text_block(0, BlockKind::P, "alpha"),
                ContentBlock {
                    id: 1,
                    kind: BlockKind::Code,
                    payload: BlockPayload::Code(CodeSnippet {
                        language: Some("rust".into()),
                        content: "fn main() {}".into(),
                    }),
                    links: Vec::new(),
                    confidence: 0.95,
                },
            ],
            metadata: PageMetadata::default(),
        };
        page.metadata.extraction_mode = ExtractionMode::Cheap;

        let text = page.plain_text();
        assert!(text.contains("alpha"));
        assert!(text.contains("fn main"));
    }

    #[test]
    fn token_and_read_time_estimates() {
        assert_eq!(estimated_tokens(1000), 400);
        assert_eq!(estimated_read_min(0), 0);
        assert_eq!(estimated_read_min(50), 1);
        assert_eq!(estimated_read_min(1000), 5);
    }
}
