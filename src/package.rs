//! DACPAC container access.
//!
//! A DACPAC is a ZIP package. Parts are read by streaming them out to files,
//! replacements are staged, and [`DacPackage::commit`] rebuilds the archive
//! next to the original before renaming it into place. Entries that were not
//! replaced are raw-copied, so their compressed bytes never change.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Part holding the schema model.
pub const MODEL_PART: &str = "model.xml";

/// Part holding the integrity manifest.
pub const ORIGIN_PART: &str = "Origin.xml";

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("package {} has no part named {part}", path.display())]
    MissingPart { path: PathBuf, part: String },

    #[error("invalid package archive: {0}")]
    Zip(#[from] ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// An open package with any staged part replacements.
pub struct DacPackage {
    path: PathBuf,
    archive: ZipArchive<File>,
    /// Entry name and the file holding its new content
    staged: Vec<(String, PathBuf)>,
}

impl DacPackage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PackageError> {
        let path = path.as_ref().to_path_buf();
        let archive = ZipArchive::new(File::open(&path)?)?;
        log::debug!("opened package {} ({} entries)", path.display(), archive.len());
        Ok(Self {
            path,
            archive,
            staged: Vec::new(),
        })
    }

    /// Stream a part's decompressed content into a new file at `dest`.
    pub fn extract_part(&mut self, part: &str, dest: &Path) -> Result<u64, PackageError> {
        let name = self.require_entry(part)?;
        let mut entry = self.archive.by_name(&name)?;
        let mut out = File::create(dest)?;
        let written = io::copy(&mut entry, &mut out)?;
        out.sync_all()?;
        log::debug!("extracted {} ({} bytes) to {}", name, written, dest.display());
        Ok(written)
    }

    /// Stage `source` as the new content of `part`. Nothing is written until
    /// [`commit`](Self::commit).
    pub fn replace_part(&mut self, part: &str, source: &Path) -> Result<(), PackageError> {
        let name = self
            .entry_name(part)
            .unwrap_or_else(|| part.trim_start_matches('/').to_string());
        self.staged.retain(|(staged, _)| staged != &name);
        self.staged.push((name, source.to_path_buf()));
        Ok(())
    }

    /// Rebuild the archive with staged replacements and atomically swap it in.
    ///
    /// Replaced parts keep their position and are recompressed with Deflate;
    /// staged parts that did not exist before are appended.
    pub fn commit(self) -> Result<(), PackageError> {
        let DacPackage {
            path,
            mut archive,
            staged,
        } = self;

        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let temp = tempfile::NamedTempFile::new_in(parent)?;
        let mut writer = ZipWriter::new(temp);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut written = Vec::new();
        for idx in 0..archive.len() {
            let entry = archive.by_index_raw(idx)?;
            let name = entry.name().to_string();
            match staged.iter().find(|(staged, _)| *staged == name) {
                Some((_, source)) => {
                    drop(entry);
                    writer.start_file(name.as_str(), options)?;
                    io::copy(&mut File::open(source)?, &mut writer)?;
                    written.push(name);
                }
                None => writer.raw_copy_file(entry)?,
            }
        }

        for (name, source) in &staged {
            if !written.contains(name) {
                writer.start_file(name.as_str(), options)?;
                io::copy(&mut File::open(source)?, &mut writer)?;
            }
        }

        let temp = writer.finish()?;
        temp.as_file().sync_all()?;
        drop(archive);
        temp.persist(&path).map_err(|e| e.error)?;

        log::info!("committed {} part(s) to {}", staged.len(), path.display());
        Ok(())
    }

    /// Entry name for a part, matched ASCII case-insensitively and with or
    /// without the leading `/` of a part URI.
    fn entry_name(&self, part: &str) -> Option<String> {
        let wanted = part.trim_start_matches('/');
        self.archive
            .file_names()
            .find(|name| name.eq_ignore_ascii_case(wanted))
            .map(str::to_string)
    }

    fn require_entry(&self, part: &str) -> Result<String, PackageError> {
        self.entry_name(part).ok_or_else(|| PackageError::MissingPart {
            path: self.path.clone(),
            part: part.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn build_package(path: &Path, parts: &[(&str, &str)]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, content) in parts {
            writer
                .start_file(*name, SimpleFileOptions::default().compression_method(CompressionMethod::Stored))
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn sample(dir: &Path) -> PathBuf {
        let path = dir.join("db.dacpac");
        build_package(
            &path,
            &[
                ("[Content_Types].xml", "<Types/>"),
                ("model.xml", "<DataSchemaModel/>"),
                ("DacMetadata.xml", "<DacType/>"),
                ("Origin.xml", "<DacOrigin/>"),
            ],
        );
        path
    }

    fn entry_names(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    fn entry_text(path: &Path, name: &str) -> String {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        io::read_to_string(archive.by_name(name).unwrap()).unwrap()
    }

    #[test]
    fn test_part_lookup_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let mut package = DacPackage::open(sample(dir.path())).unwrap();
        let dest = dir.path().join("origin.xml");

        package.extract_part("/origin.XML", &dest).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "<DacOrigin/>");
    }

    #[test]
    fn test_missing_part() {
        let dir = tempfile::tempdir().unwrap();
        let mut package = DacPackage::open(sample(dir.path())).unwrap();
        let dest = dir.path().join("postdeploy.sql");

        let err = package.extract_part("postdeploy.sql", &dest).unwrap_err();
        assert!(matches!(err, PackageError::MissingPart { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn test_not_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.dacpac");
        fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(DacPackage::open(&path), Err(PackageError::Zip(_))));
    }

    #[test]
    fn test_extract_part() {
        let dir = tempfile::tempdir().unwrap();
        let mut package = DacPackage::open(sample(dir.path())).unwrap();
        let dest = dir.path().join("model.xml");

        assert_eq!(package.extract_part("model.xml", &dest).unwrap(), 18);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "<DataSchemaModel/>");
    }

    #[test]
    fn test_commit_replaces_in_place_and_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample(dir.path());
        let new_model = dir.path().join("new-model.xml");
        let new_origin = dir.path().join("new-origin.xml");
        fs::write(&new_model, "<DataSchemaModel><Model/></DataSchemaModel>").unwrap();
        fs::write(&new_origin, "<DacOrigin>x</DacOrigin>").unwrap();

        let mut package = DacPackage::open(&path).unwrap();
        package.replace_part("/Origin.xml", &new_origin).unwrap();
        package.replace_part("/model.xml", &new_model).unwrap();
        package.commit().unwrap();

        assert_eq!(
            entry_names(&path),
            vec!["[Content_Types].xml", "model.xml", "DacMetadata.xml", "Origin.xml"]
        );
        assert_eq!(
            entry_text(&path, "model.xml"),
            "<DataSchemaModel><Model/></DataSchemaModel>"
        );
        assert_eq!(entry_text(&path, "Origin.xml"), "<DacOrigin>x</DacOrigin>");
        assert_eq!(entry_text(&path, "DacMetadata.xml"), "<DacType/>");

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(
            archive.by_name("model.xml").unwrap().compression(),
            CompressionMethod::Deflated
        );
        assert_eq!(
            archive.by_name("DacMetadata.xml").unwrap().compression(),
            CompressionMethod::Stored
        );
    }

    #[test]
    fn test_restaging_keeps_last_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample(dir.path());
        let first = dir.path().join("first.xml");
        let second = dir.path().join("second.xml");
        fs::write(&first, "first").unwrap();
        fs::write(&second, "second").unwrap();

        let mut package = DacPackage::open(&path).unwrap();
        package.replace_part("model.xml", &first).unwrap();
        package.replace_part("MODEL.xml", &second).unwrap();
        package.replace_part("postdeploy.sql", &first).unwrap();
        package.commit().unwrap();

        assert_eq!(entry_text(&path, "model.xml"), "second");
        assert_eq!(entry_text(&path, "postdeploy.sql"), "first");
        assert_eq!(entry_names(&path).len(), 5);
    }

    #[test]
    fn test_dropping_without_commit_leaves_package_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample(dir.path());
        let before = fs::read(&path).unwrap();
        let replacement = dir.path().join("r.xml");
        fs::write(&replacement, "changed").unwrap();

        let mut package = DacPackage::open(&path).unwrap();
        package.replace_part("model.xml", &replacement).unwrap();
        drop(package);

        assert_eq!(fs::read(&path).unwrap(), before);
    }
}
