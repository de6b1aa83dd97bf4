//! JSON parameter store.
//!
//! The document has one key per calibration block: `C1`, `D1`, `C2`, `D2`,
//! `R`, `T`, `E`, `F`. Matrices are row-major nested arrays, distortion is
//! `[k1, k2, p1, p2, k3]`.

use std::fs;
use std::path::{Path, PathBuf};

use mpo3d_core::{mat3_from_rows, mat3_to_rows, BrownConrady5, Intrinsics, PinholeCamera, Real, Vec3};
use serde::{Deserialize, Serialize};

use crate::{CalibrationParameters, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredParameters {
    #[serde(rename = "C1")]
    c1: [[Real; 3]; 3],
    #[serde(rename = "D1")]
    d1: [Real; 5],
    #[serde(rename = "C2")]
    c2: [[Real; 3]; 3],
    #[serde(rename = "D2")]
    d2: [Real; 5],
    #[serde(rename = "R")]
    r: [[Real; 3]; 3],
    #[serde(rename = "T")]
    t: [Real; 3],
    #[serde(rename = "E")]
    e: [[Real; 3]; 3],
    #[serde(rename = "F")]
    f: [[Real; 3]; 3],
}

/// Parameter document at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterStore {
    path: PathBuf,
}

impl ParameterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn io(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn camera(&self, k: &[[Real; 3]; 3], d: [Real; 5], key: &'static str) -> Result<PinholeCamera, StoreError> {
        let k = Intrinsics::try_from_k_matrix(&mat3_from_rows(k))
            .filter(|k| k.fx > 0.0 && k.fy > 0.0)
            .ok_or(StoreError::InvalidBlock {
                path: self.path.clone(),
                key,
            })?;
        Ok(PinholeCamera::new(k, BrownConrady5::from_array(d)))
    }

    pub fn load(&self) -> Result<CalibrationParameters, StoreError> {
        let text = fs::read_to_string(&self.path).map_err(|e| self.io(e))?;
        let stored: StoredParameters =
            serde_json::from_str(&text).map_err(|source| StoreError::Format {
                path: self.path.clone(),
                source,
            })?;

        Ok(CalibrationParameters {
            left: self.camera(&stored.c1, stored.d1, "C1")?,
            right: self.camera(&stored.c2, stored.d2, "C2")?,
            rotation: mat3_from_rows(&stored.r),
            translation: Vec3::from(stored.t),
            essential: mat3_from_rows(&stored.e),
            fundamental: mat3_from_rows(&stored.f),
        })
    }

    /// Replace the document with `params`.
    ///
    /// The JSON is written to a sibling temporary file and renamed over the
    /// target, so readers see either the old or the new document.
    pub fn save(&self, params: &CalibrationParameters) -> Result<(), StoreError> {
        let stored = StoredParameters {
            c1: mat3_to_rows(&params.left.k.k_matrix()),
            d1: params.left.dist.to_array(),
            c2: mat3_to_rows(&params.right.k.k_matrix()),
            d2: params.right.dist.to_array(),
            r: mat3_to_rows(&params.rotation),
            t: params.translation.into(),
            e: mat3_to_rows(&params.essential),
            f: mat3_to_rows(&params.fundamental),
        };
        let json = serde_json::to_string_pretty(&stored).map_err(|source| StoreError::Format {
            path: self.path.clone(),
            source,
        })?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "parameters".to_owned());
        let tmp = self.path.with_file_name(format!(".{file_name}.tmp"));
        fs::write(&tmp, json).map_err(|e| self.io(e))?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(self.io(e));
        }
        log::debug!("wrote calibration to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpo3d_core::Mat3;

    fn params() -> CalibrationParameters {
        CalibrationParameters {
            left: PinholeCamera::new(
                Intrinsics::new(701.123456789, 699.987654321, 319.5, 239.25),
                BrownConrady5::from_array([-0.1234567, 0.0123, 1e-4, -2e-4, 0.0]),
            ),
            right: PinholeCamera::new(
                Intrinsics::new(705.0 / 3.0, 702.0, 321.1, 240.9),
                BrownConrady5::from_array([0.1, -0.2, 0.3, -0.4, 0.5]),
            ),
            rotation: mpo3d_core::rotation_from_rodrigues(&Vec3::new(0.01, -0.02, 0.003)),
            translation: Vec3::new(-60.0 / 7.0, 0.1, 0.2),
            essential: Mat3::from_fn(|r, c| (r * 3 + c) as Real / 11.0),
            fundamental: Mat3::from_fn(|r, c| 1e-7 * (r + 2 * c) as Real + 1.0 / 3.0),
        }
    }

    #[test]
    fn save_then_load_is_bit_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParameterStore::new(dir.path().join("stereo.json"));
        let p = params();
        store.save(&p).unwrap();
        let back = store.load().unwrap();
        assert_eq!(back, p);

        // A second save of the loaded values reproduces the same document.
        let first = fs::read_to_string(store.path()).unwrap();
        store.save(&back).unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), first);
    }

    #[test]
    fn document_uses_block_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParameterStore::new(dir.path().join("stereo.json"));
        store.save(&params()).unwrap();
        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        for key in ["C1", "D1", "C2", "D2", "R", "T", "E", "F"] {
            assert!(doc.get(key).is_some(), "missing {key}");
        }
        assert_eq!(doc["D1"].as_array().unwrap().len(), 5);
        assert_eq!(doc["C1"][2], serde_json::json!([0.0, 0.0, 1.0]));
        assert!(!dir.path().join(".stereo.json.tmp").exists());
    }

    #[test]
    fn missing_and_malformed_stores_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParameterStore::new(dir.path().join("absent.json"));
        assert!(!store.exists());
        assert!(matches!(store.load(), Err(StoreError::Io { .. })));

        let path = dir.path().join("bad.json");
        fs::write(&path, "{\"C1\": 3}").unwrap();
        assert!(matches!(
            ParameterStore::new(&path).load(),
            Err(StoreError::Format { .. })
        ));
    }

    #[test]
    fn non_triangular_camera_matrix_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParameterStore::new(dir.path().join("stereo.json"));
        store.save(&params()).unwrap();
        let mut doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        doc["C2"][1][0] = serde_json::json!(5.0);
        fs::write(store.path(), doc.to_string()).unwrap();
        assert!(matches!(
            store.load(),
            Err(StoreError::InvalidBlock { key: "C2", .. })
        ));
    }
}
