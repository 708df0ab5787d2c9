//! Artifact layout and persistence helpers for the output directory.
//!
//! Every file a worker writes is keyed by page number, so concurrent workers
//! never touch the same path.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use image::{GrayImage, ImageFormat};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Run summary written by the dispatcher.
pub const SUMMARY_FILE: &str = "processing_summary.json";
/// Quality report written by the verifier.
pub const REPORT_FILE: &str = "verification_report.json";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to save image {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// File stem shared by a page's artifacts, e.g. `page_0007`.
pub fn page_stem(page_number: u32) -> String {
    format!("page_{:04}", page_number)
}

pub fn page_image_path(output_dir: &Path, page_number: u32) -> PathBuf {
    output_dir.join(format!("{}.png", page_stem(page_number)))
}

pub fn page_record_path(output_dir: &Path, page_number: u32) -> PathBuf {
    output_dir.join(format!("{}.json", page_stem(page_number)))
}

/// Serialize `value` as pretty JSON.
///
/// Writes to a sibling temp file first and renames it into place, so readers
/// never observe a half-written record.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("json.tmp");
    let write_err = |source| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, bytes).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let bytes = fs::read(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Save a preprocessed page as PNG.
pub fn save_page_image(path: &Path, image: &GrayImage) -> Result<(), ArtifactError> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|source| ArtifactError::Image {
            path: path.to_path_buf(),
            source,
        })
}

/// List `page_NNNN.json` records in `dir`, sorted by file name.
pub fn list_page_records(dir: &Path) -> Result<Vec<PathBuf>, ArtifactError> {
    let entries = fs::read_dir(dir).map_err(|source| ArtifactError::Read {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut records: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_page_record(path))
        .collect();
    records.sort();
    Ok(records)
}

fn is_page_record(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.strip_prefix("page_")
        .and_then(|rest| rest.strip_suffix(".json"))
        .map(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Compute the SHA-256 of a file's contents as lowercase hex.
pub fn compute_file_hash(path: &Path) -> io::Result<String> {
    compute_files_hash(std::slice::from_ref(&path.to_path_buf()))
}

/// Compute one SHA-256 over the concatenated contents of `paths`, in order.
pub fn compute_files_hash(paths: &[PathBuf]) -> io::Result<String> {
    let mut hasher = Sha256::new();
    for path in paths {
        let mut file = File::open(path)?;
        io::copy(&mut file, &mut hasher)?;
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        page: u32,
        name: String,
    }

    #[test]
    fn test_page_paths() {
        let dir = Path::new("/out");
        assert_eq!(page_stem(7), "page_0007");
        assert_eq!(page_image_path(dir, 12), PathBuf::from("/out/page_0012.png"));
        assert_eq!(page_record_path(dir, 1), PathBuf::from("/out/page_0001.json"));
    }

    #[test]
    fn test_json_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("record.json");
        let sample = Sample {
            page: 4,
            name: "four".to_string(),
        };

        write_json(&path, &sample).unwrap();

        let loaded: Sample = read_json(&path).unwrap();
        assert_eq!(loaded, sample);
        assert!(!temp_dir.path().join("record.json.tmp").exists());
    }

    #[test]
    fn test_write_json_into_missing_dir_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("record.json");
        let err = write_json(&path, &1u32).unwrap_err();
        assert!(matches!(err, ArtifactError::Write { .. }));
    }

    #[test]
    fn test_list_page_records_filters_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        for name in [
            "page_0002.json",
            "page_0001.json",
            "page_0001.png",
            "page_.json",
            "page_0003.json.tmp",
            SUMMARY_FILE,
        ] {
            fs::write(temp_dir.path().join(name), b"{}").unwrap();
        }

        let records = list_page_records(temp_dir.path()).unwrap();
        let names: Vec<_> = records
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["page_0001.json", "page_0002.json"]);
    }

    #[test]
    fn test_compute_file_hash() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.txt");
        fs::write(&path, b"hello world").unwrap();

        let hash = compute_file_hash(&path).unwrap();
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_compute_files_hash_is_order_sensitive() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        fs::write(&a, b"first").unwrap();
        fs::write(&b, b"second").unwrap();

        let ab = compute_files_hash(&[a.clone(), b.clone()]).unwrap();
        let ba = compute_files_hash(&[b, a]).unwrap();
        assert_ne!(ab, ba);
    }
}
