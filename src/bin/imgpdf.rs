//! CLI binary for edgequake-imgpdf.
//!
//! A thin shim over the library crate: reads files, maps flags to the
//! operation configs, runs the operation, and hands the outputs to a
//! [`Packager`] writing into `--output-dir`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_imgpdf::pipeline::input::{read_pdf, read_source};
use edgequake_imgpdf::{
    batch_process, compress_images, format_file_size, images_to_pdf, inspect_pdf, pdf_to_images,
    AlwaysNo, AlwaysYes, ArchiveFormat, BatchConfig, BatchMode, BatchProgressCallback, Codec,
    CompressionConfig, Confirm, DirectorySink, EncodedOutput, ImageCollection, ImageScale,
    ImageToPdfConfig, PackageReport, Packager, PageOrientation, PageSelection, PdfQuality,
    PdfRenderer, PdfToImageConfig, PdfiumRenderer, ProgressCallback, ProgressUpdate,
    COMPRESS_ARCHIVE_NAME, PDF_IMAGES_ARCHIVE_NAME,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished item.
struct CliProgressCallback {
    bar: ProgressBar,
    noun: &'static str,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` tells us the total.
    fn new(noun: &'static str) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar, noun })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  \
             [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {}  \
             ⏱ {{elapsed_precise}}  {{msg}}",
            self.noun
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Working");
        self.bar.reset_eta();
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total} {}…", self.noun))
        ));
    }

    fn on_progress(&self, update: &ProgressUpdate) {
        self.bar.set_message(update.message.clone());
    }

    fn on_item_complete(&self, index: usize, total: usize, output_len: u64) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format_file_size(output_len)),
        ));
        self.bar.inc(1);
    }

    fn on_batch_failed(&self, index: usize, error: &str) {
        self.bar.println(format!("  {} {:>3}  {}", red("✗"), index + 1, red(error)));
        self.bar.abandon();
    }

    fn on_batch_complete(&self, total: usize, total_bytes: u64) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} {} processed  {}",
            green("✔"),
            bold(&total.to_string()),
            self.noun,
            dim(&format_file_size(total_bytes))
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Compress photos to at most 200 KB each, bundled as a zip
  imgpdf compress *.jpg --target-kb 200 -o out/

  # Same, but write each file separately
  imgpdf compress *.jpg --target-kb 200 --separate -o out/

  # One PDF, landscape A4, 10 mm margin
  imgpdf to-pdf scan1.png scan2.png --orientation landscape --margin 10 --filename scans

  # Pages 3 to 7 of a PDF as JPEG at twice the size
  imgpdf to-images report.pdf --pages 3-7 --format jpeg --scale 2

  # Convert everything to WebP
  imgpdf batch *.png --mode convert --format webp

  # Page count only
  imgpdf inspect report.pdf --json

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH     Path to libpdfium (only needed for to-images / inspect)
  RUST_LOG            Override the log filter
  IMGPDF_*            Fallback for every flag, e.g. IMGPDF_OUTPUT_DIR
"#;

/// Convert images to PDF, PDF pages to images, and compress images.
#[derive(Parser, Debug)]
#[command(
    name = "imgpdf",
    version,
    about = "Convert images to PDF, PDF pages to images, and compress images to a size budget",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Directory the outputs are written to.
    #[arg(short, long, global = true, env = "IMGPDF_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Archive format used when an operation produces several files.
    #[arg(long, global = true, env = "IMGPDF_ARCHIVE", value_enum, default_value = "zip")]
    archive: ArchiveArg,

    /// Write every output as its own file instead of one archive
    /// (not used by `batch`, which always bundles).
    #[arg(long, global = true, env = "IMGPDF_SEPARATE")]
    separate: bool,

    /// Print a JSON report on stdout.
    #[arg(long, global = true, env = "IMGPDF_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "IMGPDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "IMGPDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "IMGPDF_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resize and re-encode images, optionally to a per-file size budget.
    Compress {
        /// Image files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Initial quality, 0.1–1.0.
        #[arg(long, env = "IMGPDF_QUALITY", default_value_t = 0.8)]
        quality: f32,

        /// Maximum output width in pixels.
        #[arg(long, env = "IMGPDF_MAX_WIDTH", default_value_t = 2000)]
        max_width: u32,

        /// Maximum output height in pixels.
        #[arg(long, env = "IMGPDF_MAX_HEIGHT", default_value_t = 2000)]
        max_height: u32,

        /// Target size per image in KB; 0 disables the size search.
        #[arg(long, env = "IMGPDF_TARGET_KB", default_value_t = 0)]
        target_kb: u64,

        /// Output format: jpeg, png or webp.
        #[arg(long, env = "IMGPDF_FORMAT", default_value = "jpeg")]
        format: Codec,
    },

    /// Combine images into one PDF, one image per page.
    ToPdf {
        /// Image files, in page order.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// A4 page orientation.
        #[arg(long, env = "IMGPDF_ORIENTATION", value_enum, default_value = "auto")]
        orientation: OrientationArg,

        /// How the image fills the page.
        #[arg(long, env = "IMGPDF_SCALE", value_enum, default_value = "fit")]
        scale: ScaleArg,

        /// Embedding quality: high, medium, low or lossless.
        #[arg(long, env = "IMGPDF_PDF_QUALITY", default_value = "high")]
        quality: PdfQuality,

        /// Margin on every side in millimetres.
        #[arg(long, env = "IMGPDF_MARGIN", default_value_t = 0.0)]
        margin: f32,

        /// Output file name without extension.
        #[arg(long, env = "IMGPDF_FILENAME", default_value = "converted")]
        filename: String,
    },

    /// Render PDF pages to images.
    ToImages {
        /// PDF file.
        input: PathBuf,

        /// Page selection: all, 5, 3-15, or 1,3,5,7.
        #[arg(long, env = "IMGPDF_PAGES", default_value = "all")]
        pages: PageSelection,

        /// Output format: png, jpeg or webp.
        #[arg(long, env = "IMGPDF_FORMAT", default_value = "png")]
        format: Codec,

        /// Render scale, 0.1–5.0.
        #[arg(long, env = "IMGPDF_RENDER_SCALE", default_value_t = 1.0)]
        scale: f32,

        /// PDF user password for encrypted documents.
        #[arg(long, env = "IMGPDF_PASSWORD")]
        password: Option<String>,

        /// Path to the pdfium library; defaults to PDFIUM_LIB_PATH or the system library.
        #[arg(long, env = "IMGPDF_PDFIUM_LIB")]
        pdfium_lib: Option<PathBuf>,
    },

    /// Run a fixed preset over many images.
    Batch {
        /// Image files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// What to do with the images.
        #[arg(long, env = "IMGPDF_MODE", value_enum, default_value = "pdf")]
        mode: ModeArg,

        /// Target format for `--mode convert`.
        #[arg(long, env = "IMGPDF_FORMAT", default_value = "jpeg")]
        format: Codec,
    },

    /// Print a PDF's page count and size.
    Inspect {
        /// PDF file.
        input: PathBuf,

        /// PDF user password for encrypted documents.
        #[arg(long, env = "IMGPDF_PASSWORD")]
        password: Option<String>,

        /// Path to the pdfium library.
        #[arg(long, env = "IMGPDF_PDFIUM_LIB")]
        pdfium_lib: Option<PathBuf>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ArchiveArg {
    Zip,
    TarGz,
}

impl From<ArchiveArg> for ArchiveFormat {
    fn from(v: ArchiveArg) -> Self {
        match v {
            ArchiveArg::Zip => ArchiveFormat::Zip,
            ArchiveArg::TarGz => ArchiveFormat::TarGz,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OrientationArg {
    Auto,
    Portrait,
    Landscape,
}

impl From<OrientationArg> for PageOrientation {
    fn from(v: OrientationArg) -> Self {
        match v {
            OrientationArg::Auto => PageOrientation::Auto,
            OrientationArg::Portrait => PageOrientation::Portrait,
            OrientationArg::Landscape => PageOrientation::Landscape,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ScaleArg {
    Fit,
    Fill,
    Original,
}

impl From<ScaleArg> for ImageScale {
    fn from(v: ScaleArg) -> Self {
        match v {
            ScaleArg::Fit => ImageScale::Fit,
            ScaleArg::Fill => ImageScale::Fill,
            ScaleArg::Original => ImageScale::Original,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Pdf,
    Compress,
    Convert,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let common = &cli.common;

    // ── Logging setup ────────────────────────────────────────────────────
    // The bar replaces INFO logs while it is visible.
    let show_progress = !common.quiet && !common.no_progress && !common.json;
    let filter = if common.verbose {
        "debug"
    } else if common.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress = |noun: &'static str| -> Option<ProgressCallback> {
        show_progress.then(|| CliProgressCallback::new(noun) as ProgressCallback)
    };

    match &cli.command {
        Command::Compress {
            inputs,
            quality,
            max_width,
            max_height,
            target_kb,
            format,
        } => {
            let images = load_images(inputs, common).await?;
            let mut builder = CompressionConfig::builder()
                .quality(*quality)
                .max_dimensions(*max_width, *max_height)
                .budget_kb(*target_kb)
                .codec(*format);
            if let Some(cb) = progress("images") {
                builder = builder.progress_callback(cb);
            }
            let config = builder.build().context("Invalid configuration")?;

            let report = compress_images(images.as_slice(), &config)
                .await
                .context("Error compressing images")?;
            let package = deliver(&report.result.outputs, COMPRESS_ARCHIVE_NAME, common)?;

            if common.json {
                print_json(&serde_json::json!({ "report": report, "package": package }))?;
            } else if !common.quiet {
                for item in &report.items {
                    let marker = if item.budget_met { green("✓") } else { cyan("⚠") };
                    eprintln!(
                        "  {} {}  {} → {}  {}",
                        marker,
                        item.source_name,
                        format_file_size(item.original_bytes),
                        format_file_size(item.compressed_bytes),
                        dim(&format!("q={:.2}, {} pass(es)", item.quality, item.passes)),
                    );
                }
                eprintln!(
                    "{}  {} → {}  (saved {}%)",
                    green("✔"),
                    format_file_size(report.original_total()),
                    bold(&format_file_size(report.compressed_total())),
                    report.savings_percent()
                );
                print_delivery(&package, &common.output_dir);
            }
        }

        Command::ToPdf {
            inputs,
            orientation,
            scale,
            quality,
            margin,
            filename,
        } => {
            let images = load_images(inputs, common).await?;
            let mut builder = ImageToPdfConfig::builder()
                .orientation((*orientation).into())
                .scale((*scale).into())
                .quality(*quality)
                .margin_mm(*margin)
                .filename(filename.clone());
            if let Some(cb) = progress("images") {
                builder = builder.progress_callback(cb);
            }
            let config = builder.build().context("Invalid configuration")?;

            let pdf = images_to_pdf(images.as_slice(), &config)
                .await
                .context("Error converting images to PDF")?;
            let package = deliver(std::slice::from_ref(&pdf), &pdf.filename, common)?;

            if common.json {
                print_json(&serde_json::json!({ "output": pdf, "package": package }))?;
            } else if !common.quiet {
                print_delivery(&package, &common.output_dir);
            }
        }

        Command::ToImages {
            input,
            pages,
            format,
            scale,
            password,
            pdfium_lib,
        } => {
            let pdf = read_pdf(input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let mut builder = PdfToImageConfig::builder()
                .pages(pages.clone())
                .codec(*format)
                .scale(*scale)
                .renderer(renderer(pdfium_lib.as_deref()));
            if let Some(pwd) = password {
                builder = builder.password(pwd.clone());
            }
            if let Some(cb) = progress("pages") {
                builder = builder.progress_callback(cb);
            }
            let config = builder.build().context("Invalid configuration")?;

            let result = pdf_to_images(&pdf.bytes, &config)
                .await
                .context("Error converting PDF to images")?;
            let package = deliver(&result.outputs, PDF_IMAGES_ARCHIVE_NAME, common)?;

            if common.json {
                print_json(&serde_json::json!({ "outputs": result, "package": package }))?;
            } else if !common.quiet {
                print_delivery(&package, &common.output_dir);
            }
        }

        Command::Batch {
            inputs,
            mode,
            format,
        } => {
            let images = load_images(inputs, common).await?;
            let mode = match mode {
                ModeArg::Pdf => BatchMode::ConvertToPdf,
                ModeArg::Compress => BatchMode::Compress,
                ModeArg::Convert => BatchMode::ConvertFormat(*format),
            };
            let mut builder = BatchConfig::builder().mode(mode);
            if let Some(cb) = progress("images") {
                builder = builder.progress_callback(cb);
            }
            let config = builder.build().context("Invalid configuration")?;

            let result = batch_process(images.as_slice(), &config)
                .await
                .context("Error processing batch")?;
            // Batch presets always bundle several outputs.
            if common.separate && !common.quiet {
                eprintln!("{} --separate is ignored by batch", cyan("⚠"));
            }
            let package =
                deliver_with(&result.outputs, &mode.archive_name(), common, &AlwaysYes)?;

            if common.json {
                print_json(&serde_json::json!({
                    "mode": mode,
                    "outputs": result,
                    "package": package,
                }))?;
            } else if !common.quiet {
                print_delivery(&package, &common.output_dir);
            }
        }

        Command::Inspect {
            input,
            password,
            pdfium_lib,
        } => {
            let pdf = read_pdf(input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let info = inspect_pdf(&pdf.bytes, renderer(pdfium_lib.as_deref()), password.as_deref())
                .await
                .context("Error inspecting PDF")?;

            if common.json {
                print_json(&info)?;
            } else {
                println!("File:   {}", input.display());
                println!("Pages:  {}", info.page_count);
                println!("Size:   {}", format_file_size(info.byte_len));
            }
        }
    }

    Ok(())
}

/// Read every input and add it to a collection. Rejected files are reported
/// and skipped; no accepted file at all is an error.
async fn load_images(paths: &[PathBuf], common: &CommonArgs) -> Result<ImageCollection> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = read_source(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.push((file.name, file.bytes));
    }

    let mut images = ImageCollection::new();
    let rejected = images.add_all(files);
    if !common.quiet {
        for err in &rejected {
            eprintln!("{} {}", cyan("⚠"), err);
        }
    }
    if images.is_empty() {
        anyhow::bail!("No supported images among {} input file(s)", paths.len());
    }
    Ok(images)
}

/// Hand the outputs to a directory sink, bundling them unless `--separate`.
fn deliver(outputs: &[EncodedOutput], archive_name: &str, common: &CommonArgs) -> Result<PackageReport> {
    let confirm: &dyn Confirm = if common.separate { &AlwaysNo } else { &AlwaysYes };
    deliver_with(outputs, archive_name, common, confirm)
}

fn deliver_with(
    outputs: &[EncodedOutput],
    archive_name: &str,
    common: &CommonArgs,
    confirm: &dyn Confirm,
) -> Result<PackageReport> {
    let sink = DirectorySink::new(&common.output_dir);
    let archiver = ArchiveFormat::from(common.archive).archiver();

    tokio::task::block_in_place(|| {
        Packager::new(&sink, archiver.as_ref(), confirm).package(outputs, archive_name)
    })
    .with_context(|| format!("Failed to write outputs to {}", common.output_dir.display()))
}

fn renderer(library: Option<&Path>) -> Arc<dyn PdfRenderer> {
    match library {
        Some(path) => Arc::new(PdfiumRenderer::with_library(path)),
        None => Arc::new(PdfiumRenderer::new()),
    }
}

fn print_delivery(package: &PackageReport, dir: &Path) {
    for name in &package.delivered {
        eprintln!("   → {}", bold(&dir.join(name).display().to_string()));
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}
