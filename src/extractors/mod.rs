pub mod academic;
pub mod docs;
pub mod wiki;

use serde::Serialize;

use crate::core::errors::{PipelineError, Result};
use crate::core::types::{ContentType, ExtractionMode, Page};
use crate::store::ArtifactKind;

pub use academic::AcademicExtract;
pub use docs::DocsExtract;
pub use wiki::WikiExtract;

/// Content-type specific distillation, produced only for full-mode parses.
#[derive(Clone, Debug)]
pub enum TypedExtract {
    Academic(AcademicExtract),
    Docs(DocsExtract),
    Wiki(WikiExtract),
}

impl TypedExtract {
    pub fn artifact_kind(&self) -> ArtifactKind {
        match self {
            TypedExtract::Academic(_) => ArtifactKind::Academic,
            TypedExtract::Docs(_) => ArtifactKind::Docs,
            TypedExtract::Wiki(_) => ArtifactKind::Wiki,
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        fn marshal<T: Serialize>(value: &T) -> Result<String> {
            serde_yaml::to_string(value).map_err(PipelineError::from)
        }
        match self {
            TypedExtract::Academic(e) => marshal(e),
            TypedExtract::Docs(e) => marshal(e),
            TypedExtract::Wiki(e) => marshal(e),
        }
    }
}

/// Dispatch on the classified content type. Anything other than a full-mode
/// parse, or a content type without a specialized extractor, yields nothing.
pub fn run(page: &Page) -> Option<TypedExtract> {
    if page.metadata.extraction_mode != ExtractionMode::Full {
        return None;
    }
    match page.metadata.content_type {
        ContentType::Academic => Some(TypedExtract::Academic(academic::extract(page))),
        ContentType::Docs => Some(TypedExtract::Docs(docs::extract(page))),
        ContentType::Wiki => Some(TypedExtract::Wiki(wiki::extract(page))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PageMetadata;

    fn page_with(content_type: ContentType, mode: ExtractionMode) -> Page {
        let mut metadata = PageMetadata::default();
        metadata.content_type = content_type;
        metadata.extraction_mode = mode;
        Page {
            url: "https://a.example".into(),
            title: "t".into(),
            content: Vec::new(),
            flat_content: Vec::new(),
            metadata,
        }
    }

    #[test]
    fn dispatch_requires_full_mode() {
        assert!(run(&page_with(ContentType::Wiki, ExtractionMode::Cheap)).is_none());
        assert!(run(&page_with(ContentType::Wiki, ExtractionMode::Full)).is_some());
    }

    #[test]
    fn dispatch_skips_untyped_content() {
        assert!(run(&page_with(ContentType::Blog, ExtractionMode::Full)).is_none());
        assert!(run(&page_with(ContentType::Unknown, ExtractionMode::Full)).is_none());
    }

    #[test]
    fn artifact_kinds_line_up() {
        let e = run(&page_with(ContentType::Academic, ExtractionMode::Full)).unwrap();
        assert_eq!(e.artifact_kind(), ArtifactKind::Academic);
        assert!(e.to_yaml().is_ok());
    }
}
