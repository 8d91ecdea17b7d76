//! On-disk layout for proof artifacts and crash-safe file writes
//!
//! ```text
//! <data_dir>/
//!   proofmark.db
//!   work/<proof_id>/g<generation>/<nn>_<stage>.<ext>   intermediate stage outputs
//!   proofs/proof_<proof_id>.jpg                       final image
//!   proofs/proof_<proof_id>.json                      manifest (same stem)
//! ```
//!
//! Every write goes to a temporary sibling, is fsynced, then renamed into place, so a
//! reader (or a restarted process) only ever sees complete files.

use crate::state_machine::Stage;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const WORK_DIR: &str = "work";
const PROOFS_DIR: &str = "proofs";
const PROOF_FILE_PREFIX: &str = "proof_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn work_dir(&self) -> PathBuf {
        self.root.join(WORK_DIR)
    }

    pub fn proofs_dir(&self) -> PathBuf {
        self.root.join(PROOFS_DIR)
    }

    /// Scratch directory owned by one run of a proof
    pub fn generation_dir(&self, proof_id: &str, generation: u64) -> PathBuf {
        self.work_dir()
            .join(proof_id)
            .join(format!("g{}", generation))
    }

    /// Fixed output path of a stage, so re-running it overwrites instead of accumulating
    pub fn stage_output(&self, proof_id: &str, generation: u64, stage: Stage, ext: &str) -> PathBuf {
        self.generation_dir(proof_id, generation).join(format!(
            "{:02}_{}.{}",
            stage.index() + 1,
            stage.as_str(),
            ext
        ))
    }

    pub fn final_image(&self, proof_id: &str) -> PathBuf {
        self.proofs_dir()
            .join(format!("{}{}.jpg", PROOF_FILE_PREFIX, proof_id))
    }

    pub fn manifest(&self, proof_id: &str) -> PathBuf {
        manifest_path_for_image(&self.final_image(proof_id))
    }

    /// Remove a run's scratch directory and, if now empty, the proof's work directory
    pub fn remove_generation_dir(&self, proof_id: &str, generation: u64) -> io::Result<()> {
        remove_dir_if_exists(&self.generation_dir(proof_id, generation))?;
        // Fails harmlessly while another generation still has files there
        let _ = fs::remove_dir(self.work_dir().join(proof_id));
        Ok(())
    }

    /// Remove every scratch directory and the published pair for `proof_id`
    pub fn purge_proof(&self, proof_id: &str) -> io::Result<()> {
        remove_dir_if_exists(&self.work_dir().join(proof_id))?;
        remove_file_if_exists(&self.final_image(proof_id))?;
        remove_file_if_exists(&self.manifest(proof_id))
    }
}

fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// The manifest shares the image's stem
pub fn manifest_path_for_image(image: &Path) -> PathBuf {
    image.with_extension("json")
}

/// The image shares the manifest's stem
pub fn image_path_for_manifest(manifest: &Path) -> PathBuf {
    manifest.with_extension("jpg")
}

fn temp_sibling(path: &Path) -> io::Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Path has no file name: {}", path.display()),
        )
    })?;
    Ok(path.with_file_name(format!(".{}.tmp", name.to_string_lossy())))
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Write `bytes` to `path` via temp file + fsync + rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    ensure_parent(path)?;
    let tmp = temp_sibling(path)?;
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    sync_parent(path)
}

/// Copy `src` to `dst` with the same all-or-nothing visibility as [`write_atomic`]
pub fn copy_atomic(src: &Path, dst: &Path) -> io::Result<u64> {
    ensure_parent(dst)?;
    let tmp = temp_sibling(dst)?;
    let copied = fs::copy(src, &tmp)?;
    File::open(&tmp)?.sync_all()?;
    fs::rename(&tmp, dst)?;
    sync_parent(dst)?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths_share_stem() {
        let layout = ArtifactLayout::new("/data");
        assert_eq!(
            layout.final_image("1700000000000"),
            PathBuf::from("/data/proofs/proof_1700000000000.jpg")
        );
        assert_eq!(
            layout.manifest("1700000000000"),
            PathBuf::from("/data/proofs/proof_1700000000000.json")
        );
        assert_eq!(
            image_path_for_manifest(&layout.manifest("p1")),
            layout.final_image("p1")
        );
    }

    #[test]
    fn test_stage_output_is_fixed_per_generation() {
        let layout = ArtifactLayout::new("/data");
        let first = layout.stage_output("p1", 2, Stage::Downscale, "png");
        assert_eq!(first, PathBuf::from("/data/work/p1/g2/03_downscale.png"));
        assert_eq!(first, layout.stage_output("p1", 2, Stage::Downscale, "png"));
        assert_ne!(first, layout.stage_output("p1", 3, Stage::Downscale, "png"));
    }

    #[test]
    fn test_write_atomic_overwrites_and_leaves_no_temp() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("nested").join("out.bin");

        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"second");
        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_copy_atomic() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src.jpg");
        let dst = temp_dir.path().join("proofs").join("proof_p1.jpg");
        fs::write(&src, b"jpeg bytes").unwrap();

        let copied = copy_atomic(&src, &dst).unwrap();
        assert_eq!(copied, 10);
        assert_eq!(fs::read(&dst).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn test_remove_generation_dir_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(temp_dir.path());
        let out = layout.stage_output("p1", 1, Stage::Normalize, "png");
        write_atomic(&out, b"x").unwrap();

        layout.remove_generation_dir("p1", 1).unwrap();
        assert!(!layout.generation_dir("p1", 1).exists());
        assert!(!layout.work_dir().join("p1").exists());
        layout.remove_generation_dir("p1", 1).unwrap();
    }

    #[test]
    fn test_purge_proof_removes_every_generation_and_published_pair() {
        let temp_dir = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(temp_dir.path());
        write_atomic(&layout.stage_output("p1", 1, Stage::Compress, "jpg"), b"old").unwrap();
        write_atomic(&layout.stage_output("p1", 2, Stage::Normalize, "png"), b"new").unwrap();
        write_atomic(&layout.final_image("p1"), b"jpeg").unwrap();
        write_atomic(&layout.manifest("p1"), b"{}").unwrap();
        write_atomic(&layout.final_image("p2"), b"other").unwrap();

        layout.purge_proof("p1").unwrap();
        assert!(!layout.work_dir().join("p1").exists());
        assert!(!layout.final_image("p1").exists());
        assert!(!layout.manifest("p1").exists());
        assert!(layout.final_image("p2").exists());

        // Nothing left to remove
        layout.purge_proof("p1").unwrap();
    }
}
