//! Region crops of aligned images and their on-disk persistence.

use crate::region::Region;
use crate::util::{AlignError, AlignResult};
use image::{imageops, ImageFormat, RgbImage};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Pixels of one region cut from one aligned image.
#[derive(Clone, Debug)]
pub struct CroppedArtifact {
    id: String,
    source_id: String,
    region_id: String,
    region_name: String,
    image: RgbImage,
}

impl CroppedArtifact {
    /// Unique identity `{source_stem}_{region_id}_{uuid-v7}`.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn region_id(&self) -> &str {
        &self.region_id
    }

    pub fn region_name(&self) -> &str {
        &self.region_name
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Writes the crop as `{dir}/{region_id}/{id}.png`.
    ///
    /// Creates missing directories. Never replaces an existing file: a
    /// collision fails with [`AlignError::ArtifactExists`].
    pub fn save_to(&self, dir: impl AsRef<Path>) -> AlignResult<PathBuf> {
        let region_dir = dir.as_ref().join(&self.region_id);
        let io_err = |path: &Path, err: std::io::Error| AlignError::ImageIo {
            path: path.display().to_string(),
            reason: err.to_string(),
        };
        fs::create_dir_all(&region_dir).map_err(|err| io_err(&region_dir, err))?;

        let path = region_dir.join(format!("{}.png", self.id));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| match err.kind() {
                ErrorKind::AlreadyExists => AlignError::ArtifactExists(path.display().to_string()),
                _ => io_err(&path, err),
            })?;
        let mut writer = BufWriter::new(file);
        self.image
            .write_to(&mut writer, ImageFormat::Png)
            .map_err(|err| AlignError::ImageIo {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?;
        Ok(path)
    }
}

/// Cuts region rectangles out of aligned images.
#[derive(Clone, Copy, Debug, Default)]
pub struct RegionCropper;

impl RegionCropper {
    pub fn new() -> Self {
        Self
    }

    /// Crops `region` from `aligned`.
    ///
    /// `source_id` names the image the crop came from; its file stem (if it
    /// looks like a path) prefixes the artifact id. Fails with
    /// [`AlignError::RegionOutOfBounds`] when the normalized rectangle does
    /// not fit entirely inside `aligned`.
    pub fn crop(
        &self,
        aligned: &RgbImage,
        source_id: &str,
        region: &Region,
    ) -> AlignResult<CroppedArtifact> {
        let rect = region.bounded_rect(aligned.width(), aligned.height())?;
        let (x, y, w, h) = rect.to_pixels();
        let image = imageops::crop_imm(aligned, x, y, w, h).to_image();
        Ok(CroppedArtifact {
            id: artifact_id(source_id, region.id()),
            source_id: source_id.to_string(),
            region_id: region.id().to_string(),
            region_name: region.name().to_string(),
            image,
        })
    }

    /// Crops every region in order; stops at the first out-of-bounds region.
    pub fn crop_all(
        &self,
        aligned: &RgbImage,
        source_id: &str,
        regions: &[Region],
    ) -> AlignResult<Vec<CroppedArtifact>> {
        regions
            .iter()
            .map(|region| self.crop(aligned, source_id, region))
            .collect()
    }
}

fn artifact_id(source_id: &str, region_id: &str) -> String {
    let stem = Path::new(source_id)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    format!("{stem}_{region_id}_{}", Uuid::now_v7().simple())
}

#[cfg(test)]
mod tests {
    use super::{artifact_id, RegionCropper};
    use crate::region::Region;
    use image::{Rgb, RgbImage};

    fn canvas() -> RgbImage {
        RgbImage::from_fn(64, 48, |x, y| Rgb([x as u8, y as u8, (x ^ y) as u8]))
    }

    #[test]
    fn crop_copies_normalized_rectangle() {
        let region = Region::new("lid", "Lid", (30, 20), (10, 5));
        let artifact = RegionCropper::new().crop(&canvas(), "shots/a.png", &region).unwrap();
        assert_eq!(artifact.image().dimensions(), (20, 15));
        assert_eq!(artifact.image().get_pixel(0, 0), canvas().get_pixel(10, 5));
        assert!(artifact.id().starts_with("a_lid_"));
        assert_eq!(artifact.region_name(), "Lid");
    }

    #[test]
    fn ids_never_repeat() {
        let a = artifact_id("x.jpg", "r");
        let b = artifact_id("x.jpg", "r");
        assert_ne!(a, b);
    }

    #[test]
    fn stemless_source_falls_back() {
        assert!(artifact_id("", "r").starts_with("image_r_"));
    }
}
