//! Output types shared by every operation, plus naming and size helpers.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

/// One produced file: a name and its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedOutput {
    pub filename: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub byte_len: u64,
}

impl EncodedOutput {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let byte_len = bytes.len() as u64;
        Self {
            filename: filename.into(),
            bytes,
            byte_len,
        }
    }
}

/// Outputs of one batch run, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub outputs: Vec<EncodedOutput>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.outputs.iter().map(|o| o.byte_len).sum()
    }

    pub fn into_outputs(self) -> Vec<EncodedOutput> {
        self.outputs
    }
}

/// Size accounting for one compressed image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressedItem {
    pub source_name: String,
    pub output_name: String,
    pub original_bytes: u64,
    pub compressed_bytes: u64,
    /// Quality of the encode that was kept.
    pub quality: f32,
    /// Encode passes performed, including the first.
    pub passes: u32,
    /// `false` when a size budget was set and not reached.
    pub budget_met: bool,
}

/// Result of a compression run.
#[derive(Debug, Clone, Serialize)]
pub struct CompressionReport {
    pub items: Vec<CompressedItem>,
    pub result: BatchResult,
}

impl CompressionReport {
    pub fn original_total(&self) -> u64 {
        self.items.iter().map(|i| i.original_bytes).sum()
    }

    pub fn compressed_total(&self) -> u64 {
        self.items.iter().map(|i| i.compressed_bytes).sum()
    }

    /// Percentage saved relative to the originals, rounded to one decimal.
    /// Negative when the outputs grew.
    pub fn savings_percent(&self) -> f64 {
        let original = self.original_total();
        if original == 0 {
            return 0.0;
        }
        let saved = original as f64 - self.compressed_total() as f64;
        (saved / original as f64 * 1000.0).round() / 10.0
    }
}

/// Human-readable byte count: `"0 Bytes"`, `"1.5 KB"`, `"2 MB"`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut exp = 0;
    while value >= 1024.0 && exp < UNITS.len() - 1 {
        value /= 1024.0;
        exp += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exp])
}

/// Drop the final `.ext` from a file name. Dots in directory components,
/// a leading dot, and a trailing dot are left alone.
pub fn strip_extension(name: &str) -> &str {
    let file_start = name.rfind('/').map_or(0, |i| i + 1);
    let file = &name[file_start..];
    match file.rfind('.') {
        Some(0) | None => name,
        Some(dot) if dot + 1 == file.len() => name,
        Some(dot) => &name[..file_start + dot],
    }
}

/// Make every name distinct, keeping order. A repeated name gets `-2`,
/// `-3`, ... inserted before its extension; first occurrences are unchanged.
pub fn unique_filenames<'a, I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut taken: HashSet<String> = HashSet::new();
    names
        .into_iter()
        .map(|name| {
            if taken.insert(name.to_string()) {
                return name.to_string();
            }
            let stem = strip_extension(name);
            let ext = &name[stem.len()..];
            (2u32..)
                .map(|n| format!("{stem}-{n}{ext}"))
                .find(|candidate| taken.insert(candidate.clone()))
                .unwrap_or_else(|| name.to_string())
        })
        .collect()
}

/// Rename outputs in place so no two share a file name.
pub fn dedupe_output_names(outputs: &mut [EncodedOutput]) {
    let names = unique_filenames(outputs.iter().map(|o| o.filename.as_str()));
    for (output, name) in outputs.iter_mut().zip(names) {
        output.filename = name;
    }
}

static RE_UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[^a-z0-9_\-.]").unwrap());

/// Replace characters outside `[a-z0-9_-.]` with `-` and trim leading and
/// trailing dashes. Falls back to `"converted"` when nothing is left.
pub fn sanitize_filename(name: &str) -> String {
    let replaced = RE_UNSAFE_FILENAME_CHARS.replace_all(name.trim(), "-");
    let trimmed = replaced.trim_matches('-');
    if trimmed.is_empty() {
        "converted".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_size_formatting() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3 GB");
    }

    #[test]
    fn file_size_caps_at_gigabytes() {
        assert_eq!(format_file_size(2048 * 1024 * 1024 * 1024), "2048 GB");
    }

    #[test]
    fn extension_stripping() {
        assert_eq!(strip_extension("photo.jpg"), "photo");
        assert_eq!(strip_extension("archive.tar.gz"), "archive.tar");
        assert_eq!(strip_extension("noext"), "noext");
        assert_eq!(strip_extension(".hidden"), ".hidden");
        assert_eq!(strip_extension("dir.v2/file"), "dir.v2/file");
        assert_eq!(strip_extension("dir.v2/file.png"), "dir.v2/file");
        assert_eq!(strip_extension("a."), "a.");
        assert_eq!(strip_extension("a.b."), "a.b.");
    }

    #[test]
    fn repeated_names_get_numbered() {
        let names = unique_filenames([
            "photo-compressed.jpg",
            "photo-compressed.jpg",
            "other.jpg",
            "photo-compressed.jpg",
        ]);
        assert_eq!(
            names,
            vec![
                "photo-compressed.jpg",
                "photo-compressed-2.jpg",
                "other.jpg",
                "photo-compressed-3.jpg",
            ]
        );
    }

    #[test]
    fn numbering_skips_names_already_in_use() {
        let names = unique_filenames(["a.jpg", "a-2.jpg", "a.jpg", "noext", "noext"]);
        assert_eq!(names, vec!["a.jpg", "a-2.jpg", "a-3.jpg", "noext", "noext-2"]);
    }

    #[test]
    fn dedupe_renames_outputs_in_place() {
        let mut outputs = vec![
            EncodedOutput::new("img.png", vec![1]),
            EncodedOutput::new("img.png", vec![2]),
        ];
        dedupe_output_names(&mut outputs);
        assert_eq!(outputs[0].filename, "img.png");
        assert_eq!(outputs[1].filename, "img-2.png");
        assert_eq!(outputs[1].bytes, vec![2]);
    }

    #[test]
    fn filename_sanitising() {
        assert_eq!(sanitize_filename("My Report (final).pdf"), "My-Report--final-.pdf");
        assert_eq!(sanitize_filename("  ok_name-1.pdf "), "ok_name-1.pdf");
        assert_eq!(sanitize_filename("///"), "converted");
    }

    #[test]
    fn savings_percentage() {
        let item = |orig, comp| CompressedItem {
            source_name: "a".into(),
            output_name: "a".into(),
            original_bytes: orig,
            compressed_bytes: comp,
            quality: 0.8,
            passes: 1,
            budget_met: true,
        };
        let report = CompressionReport {
            items: vec![item(1000, 250), item(1000, 500)],
            result: BatchResult::default(),
        };
        assert_eq!(report.original_total(), 2000);
        assert_eq!(report.compressed_total(), 750);
        assert_eq!(report.savings_percent(), 62.5);
    }

    #[test]
    fn batch_result_totals() {
        let result = BatchResult {
            outputs: vec![
                EncodedOutput::new("a.jpg", vec![0; 10]),
                EncodedOutput::new("b.jpg", vec![0; 5]),
            ],
        };
        assert_eq!(result.len(), 2);
        assert_eq!(result.total_bytes(), 15);
    }
}
