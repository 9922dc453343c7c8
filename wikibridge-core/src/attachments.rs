//! Copy of one binary asset from the source store to an existing target page.

use std::time::Duration;
use tracing::{debug, info};

use crate::contract::{AttachmentRef, NewAttachment, Namespace, SourceStore, TargetStore};
use crate::error::MigrationError;

/// Download `attachment` through its handle and upload it under the page.
///
/// The bytes are held only for the duration of this call. Either step failing,
/// or running past `timeout`, is an [`MigrationError::Attachment`] for this
/// file alone.
pub async fn migrate_attachment<S, T>(
    source: &S,
    target: &T,
    namespace: &Namespace,
    page_name: &str,
    attachment: &AttachmentRef,
    timeout: Duration,
) -> Result<String, MigrationError>
where
    S: SourceStore + ?Sized,
    T: TargetStore + ?Sized,
{
    let filename = attachment.filename.as_str();
    debug!(filename, handle = attachment.handle.as_str(), "[SYNC][ATTACH] Downloading");
    let bytes = match tokio::time::timeout(timeout, source.get_attachment_stream(&attachment.handle)).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => return Err(MigrationError::attachment(filename, format!("download: {e}"))),
        Err(_) => return Err(MigrationError::attachment(filename, "download timed out")),
    };

    let upload = NewAttachment {
        namespace,
        page_name,
        filename,
        bytes: &bytes,
        media_type: &attachment.media_type,
    };
    let location = match tokio::time::timeout(timeout, target.put_attachment(upload)).await {
        Ok(Ok(location)) => location,
        Ok(Err(e)) => return Err(MigrationError::attachment(filename, format!("upload: {e}"))),
        Err(_) => return Err(MigrationError::attachment(filename, "upload timed out")),
    };
    info!(filename, size = bytes.len(), %location, "[SYNC][ATTACH] Attachment migrated");
    Ok(location)
}
