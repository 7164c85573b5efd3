//! Rendered capture output and how it lands on disk

use crate::{CaptureError, CaptureStats, ImageFormat};
use std::ffi::OsString;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Everything rendered from the page at capture time
#[derive(Debug, Clone)]
pub struct CaptureArtifacts {
    pub image: Vec<u8>,
    pub image_format: ImageFormat,
    pub html: String,
    pub text: Option<String>,
    pub stats: CaptureStats,
}

/// Files written for one capture
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArtifactPaths {
    pub image: PathBuf,
    pub html: PathBuf,
    pub text: Option<PathBuf>,
}

/// Append `.ext` to `base` without touching any dot already in the base name.
///
/// ```rust
/// use page_capture::artifact_path;
/// use std::path::Path;
///
/// assert_eq!(artifact_path(Path::new("shots/v1.2"), "png"), Path::new("shots/v1.2.png"));
/// ```
pub fn artifact_path(base: &Path, extension: &str) -> PathBuf {
    let mut path = OsString::from(base.as_os_str());
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

/// Re-encode the PNG rendered by the browser into the configured format.
pub fn encode_image(png_data: Vec<u8>, format: ImageFormat) -> Result<Vec<u8>, CaptureError> {
    let target = match format {
        ImageFormat::Png => return Ok(png_data),
        ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        ImageFormat::Webp => image::ImageFormat::WebP,
    };

    let img = image::load_from_memory(&png_data)?;
    // JPEG has no alpha channel
    let img = image::DynamicImage::ImageRgb8(img.to_rgb8());

    let mut encoded = Vec::new();
    img.write_to(&mut Cursor::new(&mut encoded), target)?;
    Ok(encoded)
}

impl CaptureArtifacts {
    pub fn paths(&self, output_base: &Path) -> ArtifactPaths {
        ArtifactPaths {
            image: artifact_path(output_base, self.image_format.extension()),
            html: artifact_path(output_base, "html"),
            text: self.text.as_ref().map(|_| artifact_path(output_base, "txt")),
        }
    }

    /// Write the image, the HTML and, when scraped, the text next to `output_base`.
    ///
    /// Either every file is written or none is left behind.
    pub async fn write(&self, output_base: &Path) -> Result<ArtifactPaths, CaptureError> {
        let paths = self.paths(output_base);

        if let Some(parent) = paths.image.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut files: Vec<(&Path, &[u8])> = vec![
            (paths.image.as_path(), self.image.as_slice()),
            (paths.html.as_path(), self.html.as_bytes()),
        ];
        if let (Some(path), Some(text)) = (&paths.text, &self.text) {
            files.push((path.as_path(), text.as_bytes()));
        }

        for (index, (path, contents)) in files.iter().enumerate() {
            if let Err(e) = tokio::fs::write(path, contents).await {
                for (written, _) in &files[..index] {
                    if let Err(cleanup) = tokio::fs::remove_file(written).await {
                        warn!("Could not remove partial output {}: {}", written.display(), cleanup);
                    }
                }
                return Err(CaptureError::IoError(format!(
                    "Failed to write {}: {}",
                    path.display(),
                    e
                )));
            }
        }

        debug!(
            "Wrote {} and {}",
            paths.image.display(),
            paths.html.display()
        );
        Ok(paths)
    }
}
