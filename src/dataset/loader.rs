//! Dataset directory discovery
//!
//! Lists the image, mask and edge folders of a dataset and pairs them into
//! records. Expected layout:
//!
//! ```text
//! <data_path>/<dataset>/
//! ├── Train/
//! │   ├── images/   0001.jpg, 0002.jpg, ...
//! │   ├── masks/    0001.png, 0002.png, ...
//! │   └── edges/    0001.png, 0002.png, ...
//! └── Test/
//!     ├── images/
//!     └── masks/
//! ```
//!
//! Listings are sorted by file name, and index `i` of each listing is the
//! same logical sample.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::dataset::split::{pair_test_records, pair_triplets, TestRecord, TripletRecord};
use crate::utils::error::{Result, SaliencyError};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

/// List the image files directly inside `dir`, sorted by file name
pub fn list_images<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(SaliencyError::Configuration(format!(
            "directory does not exist: {:?}",
            dir
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| {
            path.extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy().to_lowercase();
                    IMAGE_EXTENSIONS.contains(&ext.as_str())
                })
                .unwrap_or(false)
        })
        .collect();

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!("Found {} images in {:?}", files.len(), dir);

    Ok(files)
}

/// Pair `<root>/images`, `<root>/masks` and `<root>/edges` into triplets
pub fn discover_triplets<P: AsRef<Path>>(root: P) -> Result<Vec<TripletRecord>> {
    let root = root.as_ref();
    info!("Loading training triplets from: {:?}", root);

    let images = list_images(root.join("images"))?;
    let masks = list_images(root.join("masks"))?;
    let edges = list_images(root.join("edges"))?;

    let records = pair_triplets(images, masks, edges)?;
    info!("Loaded {} triplets", records.len());

    Ok(records)
}

/// List `<root>/images` and, when `have_gt`, pair them with `<root>/masks`
pub fn discover_test_set<P: AsRef<Path>>(root: P, have_gt: bool) -> Result<Vec<TestRecord>> {
    let root = root.as_ref();
    let images = list_images(root.join("images"))?;
    let masks = if have_gt {
        Some(list_images(root.join("masks"))?)
    } else {
        None
    };

    let records = pair_test_records(images, masks)?;
    info!("Loaded {} test images from {:?}", records.len(), root);

    Ok(records)
}

/// Sample counts for one dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetStats {
    pub name: String,
    pub train_triplets: Option<usize>,
    pub test_images: Option<usize>,
    pub test_masks: Option<usize>,
}

impl DatasetStats {
    /// Count files without failing on missing folders
    pub fn collect(data_path: &Path, name: &str) -> Self {
        let root = data_path.join(name);
        let count = |dir: PathBuf| list_images(dir).ok().map(|files| files.len());

        Self {
            name: name.to_string(),
            train_triplets: discover_triplets(root.join("Train")).ok().map(|r| r.len()),
            test_images: count(root.join("Test").join("images")),
            test_masks: count(root.join("Test").join("masks")),
        }
    }
}

impl std::fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |v: Option<usize>| v.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{:<10} train triplets: {:>6}  test images: {:>6}  test masks: {:>6}",
            self.name,
            show(self.train_triplets),
            show(self.test_images),
            show(self.test_masks)
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use tempfile::TempDir;

    /// Write `count` synthetic triplets under `<root>/{images,masks,edges}`
    pub(crate) fn write_triplets(root: &Path, count: usize, size: u32) {
        for sub in ["images", "masks", "edges"] {
            std::fs::create_dir_all(root.join(sub)).unwrap();
        }
        for i in 0..count {
            let name = format!("{:04}", i);
            let image = RgbImage::from_fn(size, size, |x, y| {
                Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, (i * 20 % 256) as u8])
            });
            let mask = GrayImage::from_fn(size, size, |x, y| {
                let inside = x > size / 4 && x < 3 * size / 4 && y > size / 4 && y < 3 * size / 4;
                Luma([if inside { 255 } else { 0 }])
            });
            let edge = GrayImage::from_fn(size, size, |x, _| {
                Luma([if x == size / 4 || x == 3 * size / 4 { 255 } else { 0 }])
            });
            image.save(root.join("images").join(format!("{}.jpg", name))).unwrap();
            mask.save(root.join("masks").join(format!("{}.png", name))).unwrap();
            edge.save(root.join("edges").join(format!("{}.png", name))).unwrap();
        }
    }

    #[test]
    fn test_list_images_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for name in ["b.png", "a.jpg", "c.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let files = list_images(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png"]);
    }

    #[test]
    fn test_missing_directory_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let result = list_images(dir.path().join("nope"));
        assert!(matches!(result, Err(SaliencyError::Configuration(_))));
    }

    #[test]
    fn test_discover_triplets() {
        let dir = TempDir::new().unwrap();
        write_triplets(dir.path(), 4, 16);

        let records = discover_triplets(dir.path()).unwrap();
        assert_eq!(records.len(), 4);
        assert!(records[2].mask.ends_with("masks/0002.png"));
        assert!(records[2].edge.ends_with("edges/0002.png"));
    }

    #[test]
    fn test_discover_triplets_count_mismatch() {
        let dir = TempDir::new().unwrap();
        write_triplets(dir.path(), 3, 16);
        std::fs::remove_file(dir.path().join("edges").join("0001.png")).unwrap();

        let result = discover_triplets(dir.path());
        assert!(matches!(result, Err(SaliencyError::Configuration(_))));
    }

    #[test]
    fn test_discover_test_set_without_gt() {
        let dir = TempDir::new().unwrap();
        write_triplets(dir.path(), 2, 16);

        let records = discover_test_set(dir.path(), false).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.gt.is_none()));

        let with_gt = discover_test_set(dir.path(), true).unwrap();
        assert!(with_gt.iter().all(|r| r.gt.is_some()));
    }

    #[test]
    fn test_dataset_stats() {
        let dir = TempDir::new().unwrap();
        write_triplets(&dir.path().join("ECSSD").join("Train"), 3, 16);

        let stats = DatasetStats::collect(dir.path(), "ECSSD");
        assert_eq!(stats.train_triplets, Some(3));
        assert_eq!(stats.test_images, None);
        assert!(stats.to_string().contains("ECSSD"));
    }
}
