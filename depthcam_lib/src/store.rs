//! Locate bundled firmware images
//!
//! Images are opaque blobs keyed by product line. They live in a directory
//! (the working directory unless configured otherwise) under well-known file
//! names that the tool config can override.

use std::collections::HashMap;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::config;
use crate::product::FirmwareImageId;

pub struct FirmwareStore {
    dir: PathBuf,
    file_names: HashMap<FirmwareImageId, String>,
}

impl FirmwareStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let mut file_names = HashMap::new();
        for image in [FirmwareImageId::D4xx, FirmwareImageId::Sr3xx] {
            file_names.insert(image, image.default_file_name().to_string());
        }
        FirmwareStore {
            dir: dir.into(),
            file_names,
        }
    }

    /// Store as configured in the tool config, falling back to defaults
    pub fn from_config() -> Self {
        let firmware = config::load_config().unwrap_or_default();
        let mut store = FirmwareStore::new(firmware.dir.unwrap_or_else(|| ".".to_string()));
        if let Some(name) = firmware.d4xx_image {
            store.set_file_name(FirmwareImageId::D4xx, name);
        }
        if let Some(name) = firmware.sr3xx_image {
            store.set_file_name(FirmwareImageId::Sr3xx, name);
        }
        store
    }

    pub fn set_file_name(&mut self, image: FirmwareImageId, name: impl Into<String>) {
        self.file_names.insert(image, name.into());
    }

    pub fn path_for(&self, image: FirmwareImageId) -> PathBuf {
        let name = self
            .file_names
            .get(&image)
            .map(String::as_str)
            .unwrap_or_else(|| image.default_file_name());
        self.dir.join(name)
    }
}

/// SHA-256 of a firmware image, shown to the user before flashing
pub fn image_digest(image: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image);
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_use_defaults_and_overrides() {
        let mut store = FirmwareStore::new("/fw");
        assert_eq!(
            store.path_for(FirmwareImageId::D4xx),
            PathBuf::from("/fw/fw_d4xx.bin")
        );
        store.set_file_name(FirmwareImageId::D4xx, "d4xx-5.12.7.100.bin");
        assert_eq!(
            store.path_for(FirmwareImageId::D4xx),
            PathBuf::from("/fw/d4xx-5.12.7.100.bin")
        );
        assert_eq!(
            store.path_for(FirmwareImageId::Sr3xx),
            PathBuf::from("/fw/fw_sr3xx.bin")
        );
    }

    #[test]
    fn digest_matches_known_vector() {
        assert_eq!(
            image_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
