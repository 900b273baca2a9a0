pub mod artifacts;
pub mod catalog;
pub mod local;
pub mod records;

pub use artifacts::{ArtifactStore, Artifacts, Bucket, StoredArtifact};
pub use catalog::{CatalogStore, JsonCatalog, collection_name};
pub use local::LocalFileStorage;
pub use records::{FileRecordStore, RecordStore};

pub fn get_extension_from_mime_type(mime_type: &str) -> &str {
    match mime_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        _ => "bin",
    }
}

/// Strips parameters from a `Content-Type` value: `image/png; q=1` -> `image/png`.
pub fn bare_mime_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_lowercase()
}
