use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use crate::sync::SyncReport;

/// Notifications published by the engine after a write commits. Consumers (the rendering layer,
/// a CLI progress printer) receive them over a `std::sync::mpsc` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncEvent {
    /// Document path was (re)written to the store
    DocumentUpdated(String),
    /// Document path was removed from the store, either deleted on disk or no longer served
    DocumentRemoved(String),
    /// The last reference to an attachment went away
    AttachmentReleased(String),
    /// A file under the template root changed and templates/partials should be reloaded
    TemplateChanged(PathBuf),
    SyncCompleted(SyncReport),
}

impl Display for SyncEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncEvent::DocumentUpdated(path) => write!(f, "updated {path}"),
            SyncEvent::DocumentRemoved(path) => write!(f, "removed {path}"),
            SyncEvent::AttachmentReleased(path) => write!(f, "released attachment {path}"),
            SyncEvent::TemplateChanged(path) => write!(f, "template changed {}", path.display()),
            SyncEvent::SyncCompleted(report) => write!(f, "sync completed: {report}"),
        }
    }
}
