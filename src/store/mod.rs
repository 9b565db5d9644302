pub mod artifacts;
pub mod index;

pub use artifacts::{ArtifactKind, ArtifactStore, StoredArtifact};
pub use index::{RelationalIndex, SessionMember, SessionResultRow, SessionRow, UrlRow};
