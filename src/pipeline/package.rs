//! Packaging: hand finished outputs to an [`OutputSink`], bundling several
//! into a single archive when the user agrees.
//!
//! ```text
//! 1 output   ──▶ sink.deliver(name, bytes)
//! N outputs  ──▶ confirm("Download N files as ZIP file?")
//!                  yes ──▶ archiver.build(all) ──▶ sink.deliver(archive)
//!                  no  ──▶ sink.deliver(each)
//! ```

use crate::confirm::Confirm;
use crate::error::ImgPdfError;
use crate::output::{dedupe_output_names, EncodedOutput};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Bundles named blobs into one archive blob.
pub trait Archiver: Send + Sync {
    /// File extension including the leading dot, e.g. `.zip`.
    fn extension(&self) -> &'static str;

    fn build(&self, archive_name: &str, entries: &[EncodedOutput]) -> Result<Vec<u8>, ImgPdfError>;
}

/// Deflate-compressed ZIP.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiver;

impl Archiver for ZipArchiver {
    fn extension(&self) -> &'static str {
        ".zip"
    }

    fn build(&self, archive_name: &str, entries: &[EncodedOutput]) -> Result<Vec<u8>, ImgPdfError> {
        let archive_err = |detail: String| ImgPdfError::Archive {
            name: archive_name.to_string(),
            detail,
        };

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for entry in entries {
            zip.start_file(entry.filename.as_str(), options)
                .map_err(|e| archive_err(e.to_string()))?;
            zip.write_all(&entry.bytes)
                .map_err(|e| archive_err(e.to_string()))?;
        }

        let cursor = zip.finish().map_err(|e| archive_err(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

/// Gzip-compressed tarball.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzArchiver;

impl Archiver for TarGzArchiver {
    fn extension(&self) -> &'static str {
        ".tar.gz"
    }

    fn build(&self, archive_name: &str, entries: &[EncodedOutput]) -> Result<Vec<u8>, ImgPdfError> {
        let archive_err = |detail: String| ImgPdfError::Archive {
            name: archive_name.to_string(),
            detail,
        };

        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for entry in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(entry.bytes.len() as u64);
            header.set_mode(0o644);
            builder
                .append_data(&mut header, &entry.filename, entry.bytes.as_slice())
                .map_err(|e| archive_err(e.to_string()))?;
        }

        builder
            .into_inner()
            .and_then(|gz| gz.finish())
            .map_err(|e| archive_err(e.to_string()))
    }
}

/// Which [`Archiver`] to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    #[default]
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub fn archiver(self) -> Box<dyn Archiver> {
        match self {
            ArchiveFormat::Zip => Box::new(ZipArchiver),
            ArchiveFormat::TarGz => Box::new(TarGzArchiver),
        }
    }
}

/// Receives finished files.
pub trait OutputSink: Send + Sync {
    fn deliver(&self, name: &str, bytes: &[u8]) -> Result<(), ImgPdfError>;
}

/// Writes each delivery into a directory.
///
/// Files are written to a temporary file in the same directory and then
/// renamed, so a reader never sees a half-written output.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl OutputSink for DirectorySink {
    fn deliver(&self, name: &str, bytes: &[u8]) -> Result<(), ImgPdfError> {
        let target = self.dir.join(name);
        let write_err = |source: std::io::Error| ImgPdfError::OutputWriteFailed {
            path: target.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(write_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        tmp.write_all(bytes).map_err(write_err)?;
        tmp.persist(&target).map_err(|e| write_err(e.error))?;

        info!("Wrote {} ({} bytes)", target.display(), bytes.len());
        Ok(())
    }
}

/// Keeps deliveries in memory, in order.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far.
    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.files.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl OutputSink for MemorySink {
    fn deliver(&self, name: &str, bytes: &[u8]) -> Result<(), ImgPdfError> {
        self.files
            .lock()
            .map_err(|_| ImgPdfError::Internal("memory sink lock poisoned".into()))?
            .push((name.to_string(), bytes.to_vec()));
        Ok(())
    }
}

/// What a [`Packager::package`] call delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageReport {
    /// Names handed to the sink, in delivery order.
    pub delivered: Vec<String>,
    /// Whether the outputs were bundled into an archive.
    pub archived: bool,
}

/// Delivers a batch's outputs: directly, or bundled into one archive.
pub struct Packager<'a> {
    sink: &'a dyn OutputSink,
    archiver: &'a dyn Archiver,
    confirm: &'a dyn Confirm,
}

impl<'a> Packager<'a> {
    pub fn new(sink: &'a dyn OutputSink, archiver: &'a dyn Archiver, confirm: &'a dyn Confirm) -> Self {
        Self {
            sink,
            archiver,
            confirm,
        }
    }

    /// Deliver `outputs`.
    ///
    /// `archive_name` may carry a `.zip` suffix; it is replaced by the
    /// archiver's own extension. Repeated output names are numbered
    /// (`img.jpg`, `img-2.jpg`) so no entry or file replaces another. Sink
    /// failures propagate unchanged.
    pub fn package(
        &self,
        outputs: &[EncodedOutput],
        archive_name: &str,
    ) -> Result<PackageReport, ImgPdfError> {
        let mut renamed;
        let outputs = if has_repeated_names(outputs) {
            renamed = outputs.to_vec();
            dedupe_output_names(&mut renamed);
            renamed.as_slice()
        } else {
            outputs
        };

        match outputs {
            [] => Err(ImgPdfError::EmptyBatch("no outputs to deliver".into())),
            [single] => {
                self.sink.deliver(&single.filename, &single.bytes)?;
                Ok(PackageReport {
                    delivered: vec![single.filename.clone()],
                    archived: false,
                })
            }
            many => {
                let question = format!("Download {} files as ZIP file?", many.len());
                if self.confirm.confirm(&question) {
                    let name = archive_file_name(archive_name, self.archiver.extension());
                    let archive = self.archiver.build(&name, many)?;
                    info!(
                        "Created archive '{}' with {} entries ({} bytes)",
                        name,
                        many.len(),
                        archive.len()
                    );
                    self.sink.deliver(&name, &archive)?;
                    Ok(PackageReport {
                        delivered: vec![name],
                        archived: true,
                    })
                } else {
                    debug!("Archive declined; delivering {} files separately", many.len());
                    let mut delivered = Vec::with_capacity(many.len());
                    for output in many {
                        self.sink.deliver(&output.filename, &output.bytes)?;
                        delivered.push(output.filename.clone());
                    }
                    Ok(PackageReport {
                        delivered,
                        archived: false,
                    })
                }
            }
        }
    }
}

fn has_repeated_names(outputs: &[EncodedOutput]) -> bool {
    let mut seen = HashSet::with_capacity(outputs.len());
    !outputs.iter().all(|o| seen.insert(o.filename.as_str()))
}

/// `base` with any `.zip` / `.tar.gz` suffix replaced by `extension`.
pub fn archive_file_name(base: &str, extension: &str) -> String {
    let stem = base
        .strip_suffix(".zip")
        .or_else(|| base.strip_suffix(".tar.gz"))
        .unwrap_or(base);
    format!("{stem}{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::{AlwaysNo, AlwaysYes};
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn outputs(n: usize) -> Vec<EncodedOutput> {
        (0..n)
            .map(|i| EncodedOutput::new(format!("img-{i}.jpg"), vec![i as u8; 32 + i]))
            .collect()
    }

    /// Counts `build` calls and delegates to [`ZipArchiver`].
    #[derive(Default)]
    struct CountingArchiver {
        builds: AtomicUsize,
    }

    impl Archiver for CountingArchiver {
        fn extension(&self) -> &'static str {
            ".zip"
        }

        fn build(&self, name: &str, entries: &[EncodedOutput]) -> Result<Vec<u8>, ImgPdfError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            ZipArchiver.build(name, entries)
        }
    }

    struct FullDisk;

    impl OutputSink for FullDisk {
        fn deliver(&self, name: &str, _bytes: &[u8]) -> Result<(), ImgPdfError> {
            Err(ImgPdfError::OutputWriteFailed {
                path: PathBuf::from(name),
                source: std::io::Error::other("no space left on device"),
            })
        }
    }

    #[test]
    fn single_output_skips_archive() {
        let sink = MemorySink::new();
        let archiver = CountingArchiver::default();
        let report = Packager::new(&sink, &archiver, &AlwaysYes)
            .package(&outputs(1), "compressed-images.zip")
            .unwrap();

        assert_eq!(report.delivered, vec!["img-0.jpg".to_string()]);
        assert!(!report.archived);
        assert_eq!(archiver.builds.load(Ordering::SeqCst), 0);
        assert_eq!(sink.files().len(), 1);
    }

    #[test]
    fn many_outputs_archive_once_and_deliver_once() {
        let sink = MemorySink::new();
        let archiver = CountingArchiver::default();
        let report = Packager::new(&sink, &archiver, &AlwaysYes)
            .package(&outputs(3), "compressed-images.zip")
            .unwrap();

        assert!(report.archived);
        assert_eq!(archiver.builds.load(Ordering::SeqCst), 1);
        let files = sink.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "compressed-images.zip");

        let mut zip = zip::ZipArchive::new(Cursor::new(files[0].1.clone())).unwrap();
        assert_eq!(zip.len(), 3);
        let mut body = Vec::new();
        zip.by_name("img-2.jpg").unwrap().read_to_end(&mut body).unwrap();
        assert_eq!(body, vec![2u8; 34]);
    }

    #[test]
    fn declined_archive_delivers_each_in_order() {
        let sink = MemorySink::new();
        let report = Packager::new(&sink, &ZipArchiver, &AlwaysNo)
            .package(&outputs(3), "x.zip")
            .unwrap();
        assert!(!report.archived);
        assert_eq!(report.delivered, vec!["img-0.jpg", "img-1.jpg", "img-2.jpg"]);
    }

    #[test]
    fn prompt_names_the_file_count() {
        let sink = MemorySink::new();
        let seen = Mutex::new(String::new());
        let confirm = |q: &str| {
            *seen.lock().unwrap() = q.to_string();
            true
        };
        Packager::new(&sink, &ZipArchiver, &confirm)
            .package(&outputs(4), "x.zip")
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), "Download 4 files as ZIP file?");
    }

    #[test]
    fn tar_gz_archive_round_trips_names() {
        let sink = MemorySink::new();
        let report = Packager::new(&sink, &TarGzArchiver, &AlwaysYes)
            .package(&outputs(2), "batch-compressed-images.zip")
            .unwrap();
        assert_eq!(report.delivered, vec!["batch-compressed-images.tar.gz"]);

        let bytes = sink.files().remove(0).1;
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(bytes.as_slice()));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["img-0.jpg", "img-1.jpg"]);
    }

    #[test]
    fn sink_failure_propagates() {
        let err = Packager::new(&FullDisk, &ZipArchiver, &AlwaysYes)
            .package(&outputs(1), "x.zip")
            .unwrap_err();
        assert!(matches!(err, ImgPdfError::OutputWriteFailed { .. }));
    }

    #[test]
    fn directory_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("out"));
        sink.deliver("a.pdf", b"%PDF-1.5").unwrap();
        assert_eq!(std::fs::read(dir.path().join("out/a.pdf")).unwrap(), b"%PDF-1.5");
    }

    #[test]
    fn archive_names() {
        assert_eq!(archive_file_name("a.zip", ".tar.gz"), "a.tar.gz");
        assert_eq!(archive_file_name("a.tar.gz", ".zip"), "a.zip");
        assert_eq!(archive_file_name("plain", ".zip"), "plain.zip");
    }

    #[test]
    fn repeated_names_are_numbered_inside_the_archive() {
        let sink = MemorySink::new();
        let outputs = vec![
            EncodedOutput::new("photo-compressed.jpg", vec![1; 8]),
            EncodedOutput::new("photo-compressed.jpg", vec![2; 8]),
        ];
        let report = Packager::new(&sink, &ZipArchiver, &AlwaysYes)
            .package(&outputs, "compressed-images.zip")
            .unwrap();
        assert!(report.archived);

        let bytes = sink.files().remove(0).1;
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.len(), 2);
        let mut body = Vec::new();
        zip.by_name("photo-compressed.jpg").unwrap().read_to_end(&mut body).unwrap();
        assert_eq!(body, vec![1u8; 8]);
        body.clear();
        zip.by_name("photo-compressed-2.jpg").unwrap().read_to_end(&mut body).unwrap();
        assert_eq!(body, vec![2u8; 8]);
    }

    #[test]
    fn repeated_names_never_overwrite_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());
        let outputs = vec![
            EncodedOutput::new("img.jpg", b"first".to_vec()),
            EncodedOutput::new("img.jpg", b"second".to_vec()),
        ];
        let report = Packager::new(&sink, &ZipArchiver, &AlwaysNo)
            .package(&outputs, "x.zip")
            .unwrap();

        assert_eq!(report.delivered, vec!["img.jpg", "img-2.jpg"]);
        assert_eq!(std::fs::read(dir.path().join("img.jpg")).unwrap(), b"first");
        assert_eq!(std::fs::read(dir.path().join("img-2.jpg")).unwrap(), b"second");
    }

    #[test]
    fn empty_outputs_rejected() {
        let sink = MemorySink::new();
        let err = Packager::new(&sink, &ZipArchiver, &AlwaysYes)
            .package(&[], "x.zip")
            .unwrap_err();
        assert!(matches!(err, ImgPdfError::EmptyBatch(_)));
    }
}
