pub mod artifact;
pub mod chat;
pub mod error;
pub mod events;
pub mod gallery;
pub mod history;
pub mod session;

pub use artifact::{Artifact, FileBlob, InlineImage};
pub use error::{StudioError, StudioResult};
pub use gallery::GalleryStore;
pub use history::{HistoryEntry, HistoryStack};
pub use session::{CharacterSession, GenerationTicket, SessionStatus};
