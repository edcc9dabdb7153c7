//! Inbox scanning.

use std::path::Path;

use tokio::fs;

/// Raster image extensions accepted from the inbox (lowercase).
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp"];

/// Check whether a filename carries an allow-listed image extension.
pub fn is_supported_image(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        })
}

/// MIME type sent to the extraction service for an image filename.
pub fn mime_type_for(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Sort filenames case-insensitively; exact name breaks ties so the order is total.
pub fn sort_file_names(names: &mut [String]) {
    names.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
}

/// Snapshot the eligible files directly under `inbox`.
///
/// Files that appear after this returns belong to the next run.
pub async fn scan_inbox(inbox: &Path) -> std::io::Result<Vec<String>> {
    let mut names = list_files(inbox).await?;
    names.retain(|name| {
        let keep = is_supported_image(name);
        if !keep {
            tracing::debug!("Ignoring unsupported inbox file: {}", name);
        }
        keep
    });
    Ok(names)
}

/// Every regular file directly under `dir`, sorted.
pub async fn list_files(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut names = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let file_type = match entry.file_type().await {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if !file_type.is_file() {
            continue;
        }
        match entry.file_name().to_str() {
            Some(name) => names.push(name.to_string()),
            None => tracing::warn!(
                "Skipping non UTF-8 filename in {}: {:?}",
                dir.display(),
                entry.file_name()
            ),
        }
    }

    sort_file_names(&mut names);
    Ok(names)
}
