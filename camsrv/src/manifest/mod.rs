//! Aggregated HLS master manifest of a camera.
//!
//! The [`ManifestObserver`] watches a supervisor, inspects the first segment
//! of every live media playlist and folds the result into a [`Manifest`]
//! that is written through to a [`ManifestSink`] on every change.

mod entry;
mod inspector;
mod observer;
mod reader;
mod sink;
mod store;

pub use entry::{CODECS_ATTRIBUTE, ManifestEntry, MediaInfo};
pub use inspector::{FfprobeInspector, MediaInspector};
pub use observer::ManifestObserver;
pub use reader::first_segment;
pub use sink::{MASTER_PLAYLIST_NAME, ManifestSink, PlaylistFileSink};
pub use store::{Manifest, Upsert};
