//! Exposure retrieval from the picture backing store.
//!
//! Pictures are keyed by `(position, condition)` and named
//! `<position>_picture_<condition>.<ext>` inside one directory. A missing file
//! is a deployment error (`PictureNotFound`), never a silent skip.

use image::{Pixel, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::metadata::{MetadataSource, PictureMetadata, RandomMetadata};
use crate::{CameraPosition, CaptureError, LightCondition};

pub const DEFAULT_PICTURE_EXTENSION: &str = "jpg";

/// One camera's picture plus its exposure telemetry.
#[derive(Clone, Debug)]
pub struct ImageWithMetadata {
    pub pixels: RgbImage,
    pub exposure_time_s: f64,
    pub aperture: f64,
    pub iso: u32,
}

impl ImageWithMetadata {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn channels(&self) -> u8 {
        Rgb::<u8>::CHANNEL_COUNT
    }

    pub fn metadata(&self) -> PictureMetadata {
        PictureMetadata {
            exposure_time_s: self.exposure_time_s,
            aperture: self.aperture,
            iso: self.iso,
        }
    }
}

/// Both camera positions for one light condition.
#[derive(Clone, Debug)]
pub struct ExposurePair {
    pub left: ImageWithMetadata,
    pub right: ImageWithMetadata,
}

pub struct ExposureRetriever {
    dir: PathBuf,
    extension: String,
    metadata: Arc<dyn MetadataSource>,
}

impl ExposureRetriever {
    pub fn new(
        dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        metadata: Arc<dyn MetadataSource>,
    ) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            metadata,
        }
    }

    /// Retriever with randomized telemetry and the default extension.
    pub fn with_random_metadata(dir: impl Into<PathBuf>) -> Self {
        Self::new(
            dir,
            DEFAULT_PICTURE_EXTENSION,
            Arc::new(RandomMetadata::new()),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn picture_path(&self, condition: LightCondition, position: CameraPosition) -> PathBuf {
        self.dir.join(format!(
            "{}_picture_{}.{}",
            position.id(),
            condition.id(),
            self.extension
        ))
    }

    pub fn retrieve(
        &self,
        condition: LightCondition,
        position: CameraPosition,
    ) -> Result<ImageWithMetadata, CaptureError> {
        let path = self.picture_path(condition, position);
        if !path.is_file() {
            return Err(CaptureError::PictureNotFound(path));
        }
        let meta = self.metadata.next_metadata();
        let pixels = image::open(&path)
            .map_err(|e| CaptureError::PictureDecode {
                path: path.clone(),
                message: e.to_string(),
            })?
            .into_rgb8();
        Ok(ImageWithMetadata {
            pixels,
            exposure_time_s: meta.exposure_time_s,
            aperture: meta.aperture,
            iso: meta.iso,
        })
    }

    pub fn retrieve_pair(&self, condition: LightCondition) -> Result<ExposurePair, CaptureError> {
        let left = self.retrieve(condition, CameraPosition::Left)?;
        let right = self.retrieve(condition, CameraPosition::Right)?;
        Ok(ExposurePair { left, right })
    }

    /// Paths of every expected picture that is absent.
    pub fn missing_pictures(&self) -> Vec<PathBuf> {
        LightCondition::ALL
            .iter()
            .flat_map(|&condition| {
                CameraPosition::ALL
                    .iter()
                    .map(move |&position| self.picture_path(condition, position))
            })
            .filter(|path| !path.is_file())
            .collect()
    }
}

/// Writes a tinted gradient for every `(position, condition)` key.
///
/// Used to bootstrap a picture directory for demos and tests.
pub fn write_placeholder_pictures(
    retriever: &ExposureRetriever,
    width: u32,
    height: u32,
) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(retriever.dir())?;
    let mut written = Vec::new();
    for condition in LightCondition::ALL {
        for position in CameraPosition::ALL {
            let path = retriever.picture_path(condition, position);
            let shade = match position {
                CameraPosition::Left => 64u8,
                CameraPosition::Right => 192u8,
            };
            let img = RgbImage::from_fn(width, height, |x, y| {
                let ramp = ((x + y) % 256) as u8;
                match condition {
                    LightCondition::Blue => Rgb([shade / 4, ramp / 2, shade]),
                    LightCondition::Green => Rgb([shade / 4, shade, ramp / 2]),
                }
            });
            img.save(&path)
                .map_err(|e| anyhow::anyhow!("failed to write {}: {}", path.display(), e))?;
            written.push(path);
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::metadata::FixedMetadata;
    use tempfile::tempdir;

    fn fixed() -> Arc<dyn MetadataSource> {
        Arc::new(FixedMetadata(PictureMetadata {
            exposure_time_s: 0.25,
            aperture: 5.6,
            iso: 200,
        }))
    }

    #[test]
    fn picture_path_follows_naming_scheme() {
        let retriever = ExposureRetriever::new("/srv/pictures", "jpg", fixed());
        assert_eq!(
            retriever.picture_path(LightCondition::Blue, CameraPosition::Left),
            PathBuf::from("/srv/pictures/left_picture_blue.jpg")
        );
        assert_eq!(
            retriever.picture_path(LightCondition::Green, CameraPosition::Right),
            PathBuf::from("/srv/pictures/right_picture_green.jpg")
        );
    }

    #[test]
    fn missing_picture_is_not_found() {
        let dir = tempdir().unwrap();
        let retriever = ExposureRetriever::new(dir.path(), "png", fixed());
        let err = retriever
            .retrieve(LightCondition::Blue, CameraPosition::Left)
            .unwrap_err();
        assert_eq!(err.code(), "PICTURE_NOT_FOUND");
        assert_eq!(retriever.missing_pictures().len(), 4);
    }

    #[test]
    fn retrieves_pair_with_metadata() {
        let dir = tempdir().unwrap();
        let retriever = ExposureRetriever::new(dir.path(), "png", fixed());
        write_placeholder_pictures(&retriever, 8, 6).unwrap();
        assert!(retriever.missing_pictures().is_empty());

        let pair = retriever.retrieve_pair(LightCondition::Green).unwrap();
        assert_eq!(pair.left.width(), 8);
        assert_eq!(pair.left.height(), 6);
        assert_eq!(pair.right.channels(), 3);
        assert_eq!(pair.left.iso, 200);
        assert_eq!(pair.right.aperture, 5.6);
        assert_eq!(pair.right.exposure_time_s, 0.25);
        assert_ne!(pair.left.pixels, pair.right.pixels);
    }

    #[test]
    fn undecodable_picture_reports_decode_error() {
        let dir = tempdir().unwrap();
        let retriever = ExposureRetriever::new(dir.path(), "png", fixed());
        let path = retriever.picture_path(LightCondition::Blue, CameraPosition::Right);
        std::fs::write(&path, b"not a png").unwrap();
        let err = retriever
            .retrieve(LightCondition::Blue, CameraPosition::Right)
            .unwrap_err();
        assert_eq!(err.code(), "PICTURE_DECODE_FAILED");
    }
}
