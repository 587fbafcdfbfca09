//! Keeps the package's integrity manifest (`Origin.xml`) consistent with an
//! edited model document.
//!
//! The manifest records a SHA-256 of `model.xml` as uppercase hex in a
//! `Checksum` element whose `Uri` attribute names the part. After the model
//! is rewritten the digest is recomputed and that one entry is replaced; all
//! other manifest content is passed through event by event.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use quick_xml::Writer;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufRead, Write};
use std::path::Path;
use thiserror::Error;

/// Namespace of DAC package serialization documents.
pub const DAC_NAMESPACE: &str = "http://schemas.microsoft.com/sqlserver/dac/Serialization/2012/02";

/// Manifest URI designating the model document.
pub const MODEL_URI: &str = "/model.xml";

const CHECKSUM_ELEMENT: &[u8] = b"Checksum";

#[derive(Error, Debug)]
pub enum OriginError {
    #[error("expected exactly one checksum entry for {uri}, found {count}")]
    ChecksumTargetNotFound { uri: String, count: usize },

    #[error("malformed manifest: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// SHA-256 of a file's raw bytes as uppercase hex with no separators.
pub fn checksum_file(path: &Path) -> Result<String, OriginError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:X}", hasher.finalize()))
}

pub fn checksum_bytes(data: &[u8]) -> String {
    format!("{:X}", Sha256::digest(data))
}

#[derive(Debug, Clone)]
pub struct OriginPatcher {
    namespace: String,
    model_uri: String,
}

impl Default for OriginPatcher {
    fn default() -> Self {
        Self::new(DAC_NAMESPACE, MODEL_URI)
    }
}

impl OriginPatcher {
    pub fn new(namespace: impl Into<String>, model_uri: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            model_uri: model_uri.into(),
        }
    }

    /// Hash `model` and rewrite the manifest file at `manifest` in place.
    ///
    /// Returns the checksum that was stored.
    pub fn patch_file(&self, model: &Path, manifest: &Path) -> Result<String, OriginError> {
        let checksum = checksum_file(model)?;
        let original = fs::read(manifest)?;
        let mut patched = Vec::with_capacity(original.len());
        self.rewrite(original.as_slice(), &mut patched, &checksum)?;
        fs::write(manifest, patched)?;
        log::debug!("manifest checksum for {} set to {}", self.model_uri, checksum);
        Ok(checksum)
    }

    /// Copy `manifest` to `out`, replacing the content of the single matching
    /// checksum entry with `checksum`.
    pub fn rewrite<R: BufRead, W: Write>(
        &self,
        manifest: R,
        out: W,
        checksum: &str,
    ) -> Result<(), OriginError> {
        let mut reader = NsReader::from_reader(manifest);
        let mut buf = Vec::new();
        let mut events = Vec::new();
        let mut targets = Vec::new();

        loop {
            buf.clear();
            let (ns, event) = reader.read_resolved_event_into(&mut buf)?;
            let is_target = match &event {
                Event::Start(start) | Event::Empty(start) => self.is_checksum_entry(&ns, start)?,
                Event::Eof => break,
                _ => false,
            };
            if is_target {
                targets.push(events.len());
            }
            events.push(event.into_owned());
        }

        let [target] = targets[..] else {
            return Err(OriginError::ChecksumTargetNotFound {
                uri: self.model_uri.clone(),
                count: targets.len(),
            });
        };

        let mut writer = Writer::new(out);
        // Depth inside the entry being replaced while its old content is skipped
        let mut skipping: Option<usize> = None;

        for (idx, event) in events.into_iter().enumerate() {
            if idx == target {
                match event {
                    Event::Empty(start) => {
                        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                        writer.write_event(Event::Start(start))?;
                        writer.write_event(Event::Text(BytesText::new(checksum)))?;
                        writer.write_event(Event::End(BytesEnd::new(name)))?;
                    }
                    other => {
                        writer.write_event(other)?;
                        writer.write_event(Event::Text(BytesText::new(checksum)))?;
                        skipping = Some(0);
                    }
                }
                continue;
            }

            if let Some(depth) = skipping {
                match event {
                    Event::Start(_) => skipping = Some(depth + 1),
                    Event::End(_) if depth == 0 => {
                        skipping = None;
                        writer.write_event(event)?;
                    }
                    Event::End(_) => skipping = Some(depth - 1),
                    _ => {}
                }
                continue;
            }

            writer.write_event(event)?;
        }

        Ok(())
    }

    fn is_checksum_entry(
        &self,
        ns: &ResolveResult<'_>,
        start: &BytesStart<'_>,
    ) -> Result<bool, OriginError> {
        let in_namespace = matches!(
            ns,
            ResolveResult::Bound(Namespace(bound)) if *bound == self.namespace.as_bytes()
        );
        if !in_namespace || start.local_name().as_ref() != CHECKSUM_ELEMENT {
            return Ok(false);
        }

        let Some(uri) = start
            .try_get_attribute("Uri")
            .map_err(quick_xml::Error::from)?
        else {
            return Ok(false);
        };
        let uri = uri.unescape_value().map_err(quick_xml::Error::from)?;
        Ok(uri == self.model_uri)
    }
}
