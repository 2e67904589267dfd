//! Media helpers shared by the photo and story exporters.

use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::export::writers::write_error;
use crate::remote::{MediaLocation, MessageMedia};

/// File extension (with dot) for a MIME type.
pub fn extension_for_mime(mime: Option<&str>) -> String {
    match mime {
        Some("video/mp4") => ".mp4".into(),
        Some("image/png") => ".png".into(),
        Some("image/jpeg") => ".jpg".into(),
        Some("image/webp") => ".webp".into(),
        Some("audio/ogg") => ".ogg".into(),
        Some(other) => match other.split_once('/') {
            Some((_, subtype)) if is_safe_extension(subtype) => format!(".{subtype}"),
            _ => ".dat".into(),
        },
        None => ".dat".into(),
    }
}

/// A subtype is only used as an extension when it cannot escape the media folder.
fn is_safe_extension(subtype: &str) -> bool {
    !subtype.is_empty()
        && !subtype.contains(['/', '\\', ';'])
        && !subtype.contains("..")
}

/// Where to download media from and which extension to save it with.
pub fn media_source(media: &MessageMedia) -> Option<(MediaLocation, String)> {
    match media {
        MessageMedia::Photo { photo } => photo
            .largest_size()
            .map(|size| (size.location.clone(), ".jpg".to_string())),
        MessageMedia::Document { document } => Some((
            document.location.clone(),
            extension_for_mime(document.mime_type.as_deref()),
        )),
        MessageMedia::Other => None,
    }
}

/// Write media bytes into `dir`. Returns `false` if the file already existed.
pub async fn save_media(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<bool> {
    let path = dir.join(file_name);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        debug!("{} already exists, skipping", path.display());
        return Ok(false);
    }
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| write_error(&path, e))?;
    Ok(true)
}
