//! One edit run over a package: extract, rewrite, re-checksum, commit.

use crate::origin::{OriginError, OriginPatcher};
use crate::package::{DacPackage, PackageError, MODEL_PART, ORIGIN_PART};
use crate::pump::{ElementEditPump, PumpError, PumpStats};
use crate::transform::ElementTransform;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Input file {} does not exist!", path.display())]
    MissingInputFile { path: PathBuf },

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error("failed to rewrite model: {0}")]
    Pump(#[from] PumpError),

    #[error("failed to update manifest: {0}")]
    Origin(#[from] OriginError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    /// Run the whole pipeline but leave the package untouched
    pub dry_run: bool,
    /// Keep the model text before and after the run in the report
    pub capture_model: bool,
}

#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub stats: PumpStats,
    /// Checksum stored in the manifest for the rewritten model
    pub checksum: String,
    pub committed: bool,
    pub original_model: Option<String>,
    pub rewritten_model: Option<String>,
}

impl ProcessReport {
    pub fn model_changed(&self) -> Option<bool> {
        match (&self.original_model, &self.rewritten_model) {
            (Some(before), Some(after)) => Some(before != after),
            _ => None,
        }
    }
}

/// Fail with [`ProcessError::MissingInputFile`] for the first path that is not
/// an existing file.
pub fn check_input_files<'a, I>(paths: I) -> Result<(), ProcessError>
where
    I: IntoIterator<Item = &'a Path>,
{
    match paths.into_iter().find(|path| !path.is_file()) {
        Some(path) => Err(ProcessError::MissingInputFile {
            path: path.to_path_buf(),
        }),
        None => Ok(()),
    }
}

/// Rewrite the model of the package at `path` with `transform` and bring the
/// manifest checksum in line with the result.
///
/// Parts are worked on in a scratch directory that is removed when the run
/// ends, whether it succeeds or not. The package itself is only touched by
/// the final commit.
pub fn process_package<T>(
    path: &Path,
    transform: &mut T,
    options: &ProcessOptions,
) -> Result<ProcessReport, ProcessError>
where
    T: ElementTransform + ?Sized,
{
    let scratch = tempfile::tempdir()?;
    let source_model = scratch.path().join("source-model.xml");
    let model = scratch.path().join(MODEL_PART);
    let manifest = scratch.path().join(ORIGIN_PART);

    let mut package = DacPackage::open(path)?;
    package.extract_part(MODEL_PART, &source_model)?;
    package.extract_part(ORIGIN_PART, &manifest)?;

    log::info!("rewriting {} from {}", MODEL_PART, path.display());
    let stats = rewrite_model(&source_model, &model, transform)?;
    let checksum = OriginPatcher::default().patch_file(&model, &manifest)?;

    let (original_model, rewritten_model) = if options.capture_model {
        (Some(read_lossy(&source_model)?), Some(read_lossy(&model)?))
    } else {
        (None, None)
    };

    let committed = if options.dry_run {
        log::info!("dry run: {} left unchanged", path.display());
        false
    } else {
        package.replace_part(ORIGIN_PART, &manifest)?;
        package.replace_part(MODEL_PART, &model)?;
        package.commit()?;
        true
    };

    Ok(ProcessReport {
        stats,
        checksum,
        committed,
        original_model,
        rewritten_model,
    })
}

/// Pump the model document at `source` into a new file at `target`.
pub fn rewrite_model<T>(
    source: &Path,
    target: &Path,
    transform: &mut T,
) -> Result<PumpStats, ProcessError>
where
    T: ElementTransform + ?Sized,
{
    let sink = BufWriter::new(File::create(target)?);
    let mut pump = ElementEditPump::from_path(source, sink)?;
    let stats = pump.run(transform)?;

    let mut sink = pump.into_inner();
    sink.flush()?;
    sink.get_ref().sync_all()?;

    log::debug!(
        "{} element(s) transformed, {} node(s) copied",
        stats.target_elements,
        stats.copied_nodes
    );
    Ok(stats)
}

fn read_lossy(path: &Path) -> io::Result<String> {
    Ok(String::from_utf8_lossy(&fs::read(path)?).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::checksum_bytes;
    use crate::transform::{AddBeforeFirst, PassThrough};
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::{ZipArchive, ZipWriter};

    const MODEL: &str = "<DataSchemaModel>\r\n  <Model>\r\n    <Element Type=\"SqlTable\" Name=\"[dbo].[A]\" />\r\n  </Model>\r\n</DataSchemaModel>";

    const ORIGIN: &str = "<DacOrigin xmlns=\"http://schemas.microsoft.com/sqlserver/dac/Serialization/2012/02\"><Checksums><Checksum Uri=\"/model.xml\">00</Checksum></Checksums></DacOrigin>";

    fn build(dir: &Path, model: &str) -> PathBuf {
        let path = dir.join("db.dacpac");
        let mut writer = ZipWriter::new(File::create(&path).unwrap());
        for (name, content) in [("model.xml", model), ("Origin.xml", ORIGIN)] {
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    fn part(path: &Path, name: &str) -> String {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        io::read_to_string(archive.by_name(name).unwrap()).unwrap()
    }

    #[test]
    fn test_check_input_files() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        fs::write(&present, "x").unwrap();
        let missing = dir.path().join("missing.txt");

        assert!(check_input_files([present.as_path()]).is_ok());
        let err = check_input_files([present.as_path(), missing.as_path()]).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Input file {} does not exist!", missing.display())
        );
    }

    #[test]
    fn test_directory_is_not_an_input_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_input_files([dir.path()]).is_err());
    }

    #[test]
    fn test_pass_through_commits_identical_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(dir.path(), MODEL);

        let report = process_package(&path, &mut PassThrough, &ProcessOptions::default()).unwrap();

        assert!(report.committed);
        assert_eq!(report.stats.target_elements, 1);
        assert_eq!(part(&path, "model.xml"), MODEL);
        assert_eq!(report.checksum, checksum_bytes(MODEL.as_bytes()));
        assert!(part(&path, "Origin.xml").contains(&report.checksum));
    }

    #[test]
    fn test_dry_run_leaves_package_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(dir.path(), MODEL);
        let before = fs::read(&path).unwrap();

        let options = ProcessOptions {
            dry_run: true,
            capture_model: true,
        };
        let mut add = AddBeforeFirst::new("<Element Name=\"New\" />");
        let report = process_package(&path, &mut add, &options).unwrap();

        assert!(!report.committed);
        assert_eq!(report.model_changed(), Some(true));
        assert!(report
            .rewritten_model
            .as_deref()
            .unwrap()
            .contains("<Element Name=\"New\" /><Element Type"));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_malformed_model_leaves_package_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(dir.path(), "<DataSchemaModel><Model></DataSchemaModel>");
        let before = fs::read(&path).unwrap();

        let err = process_package(&path, &mut PassThrough, &ProcessOptions::default()).unwrap_err();

        assert!(matches!(err, ProcessError::Pump(_)));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_missing_model_part() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.dacpac");
        let mut writer = ZipWriter::new(File::create(&path).unwrap());
        writer.start_file("Origin.xml", SimpleFileOptions::default()).unwrap();
        writer.write_all(ORIGIN.as_bytes()).unwrap();
        writer.finish().unwrap();

        let err = process_package(&path, &mut PassThrough, &ProcessOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            ProcessError::Package(PackageError::MissingPart { .. })
        ));
    }
}
