use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docpeek_core::{
    fetch_url, EventSink, FileCategory, PageText, PreviewConfig, PreviewController,
    PreviewSession, ServerClient, TesseractRecognizer,
};
use pdf_engine::default_engine;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "docpeek")]
#[command(about = "Progressive document preview and text extraction")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable document metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Render a document and write every rendered page as PNG.
    Preview {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
        /// One-based page to jump to; clamped to the document.
        #[arg(long)]
        page: Option<String>,
        #[arg(long, default_value_t = 100)]
        zoom: u16,
    },
    /// Print extracted text, one section per page.
    Extract {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Recognition language.
        #[arg(long, env = "DOCPEEK_OCR_LANG")]
        lang: Option<String>,
        /// Run OCR even when the document has embedded text.
        #[arg(long)]
        ocr: bool,
    },
    /// Download a file, falling back to the proxy when the direct request fails.
    Fetch {
        #[arg(value_name = "URL")]
        url: String,
        #[arg(long, value_name = "DIR", default_value = ".")]
        out: PathBuf,
    },
    /// Convert an office document to PDF through the conversion server.
    Convert {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, env = "DOCPEEK_SERVER_URL")]
        server: Option<String>,
        #[arg(long, value_name = "PDF")]
        out: PathBuf,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    category: FileCategory,
    page_count: Option<u32>,
    large: Option<bool>,
    render_scale: Option<f32>,
    scanned: Option<bool>,
    first_page_size_pt: Option<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct PreviewOutput {
    category: FileCategory,
    page_count: u32,
    rendered_pages: Vec<u32>,
    failed_pages: BTreeMap<u32, String>,
    current_page: u32,
    zoom_percent: u16,
    written: Vec<String>,
    banner: Option<String>,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    log::debug!("running {:?}", cli.command);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Preview { file, out, page, zoom } => {
            run_preview(&file, &out, page.as_deref(), zoom)
        }
        Commands::Extract { file, lang, ocr } => run_extract(&file, lang, ocr),
        Commands::Fetch { url, out } => run_fetch(&url, &out),
        Commands::Convert { file, server, out } => run_convert(&file, server, &out),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config() -> Result<PreviewConfig> {
    PreviewConfig::from_env().context("invalid configuration")
}

fn controller(config: PreviewConfig) -> PreviewController {
    let recognizer = Arc::new(TesseractRecognizer::new(config.ocr_language.clone()));
    PreviewController::new(default_engine(), recognizer, config)
}

fn run_info(file: &Path) -> Result<()> {
    ensure_file_exists(file)?;

    let category = FileCategory::detect(&file_name(file), None);
    let mut payload = InfoOutput {
        path: file.display().to_string(),
        category,
        page_count: None,
        large: None,
        render_scale: None,
        scanned: None,
        first_page_size_pt: None,
    };

    if category == FileCategory::Pdf {
        let engine = default_engine();
        let sink = EventSink::detached();
        let session = PreviewSession::open(engine.as_ref(), file.into(), sink)
            .context("failed to open PDF")?;
        let config = session.render_config();

        payload.page_count = Some(config.page_count);
        payload.large = Some(config.large);
        payload.render_scale = Some(config.scale);
        payload.scanned = Some(session.is_scanned());
        payload.first_page_size_pt = session
            .document()
            .page_size(0)
            .ok()
            .map(|size| PageSizeOutput { width: size.width_pt, height: size.height_pt });
    }

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_preview(file: &Path, out: &Path, page: Option<&str>, zoom: u16) -> Result<()> {
    ensure_file_exists(file)?;

    let mut controller = controller(load_config()?);
    controller.load_file(file).context("failed to open document")?;
    controller.wait_for_background();

    let session = controller
        .session()
        .cloned()
        .with_context(|| format!("{} has no pages to preview", file.display()))?;

    if let Some(page) = page {
        if controller.apply_page_input(page).is_none() {
            anyhow::bail!("--page must be a number, got {page:?}");
        }
    }
    let zoom_percent = controller.set_zoom(zoom);

    fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
    let mut written = Vec::new();
    for page_index in session.rasters().filled_pages() {
        let Some(raster) = session.raster(page_index) else { continue };
        let path = out.join(format!("page-{:04}.png", page_index + 1));
        raster
            .image
            .save(&path)
            .with_context(|| format!("failed to write image to {}", path.display()))?;
        written.push(path.display().to_string());
    }

    let summary = session.summary();
    let payload = PreviewOutput {
        category: controller.category().unwrap_or(FileCategory::Pdf),
        page_count: summary.page_count,
        rendered_pages: summary.rendered_pages.iter().map(|page| page + 1).collect(),
        failed_pages: summary
            .failed_pages
            .into_iter()
            .map(|(page, reason)| (page + 1, reason))
            .collect(),
        current_page: controller.view().current_page,
        zoom_percent,
        written,
        banner: controller.banner().map(str::to_owned),
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_extract(file: &Path, lang: Option<String>, force_ocr: bool) -> Result<()> {
    ensure_file_exists(file)?;

    let mut config = load_config()?;
    if let Some(lang) = lang {
        config = config.with_ocr_language(lang);
    }
    let mut controller = controller(config);
    controller.load_file(file).context("failed to open document")?;

    let pages = match controller.session().cloned() {
        Some(session) if !session.is_scanned() && !force_ocr => (0..session.page_count())
            .map(|page| session.embedded_text(page).map(|text| Some(PageText::Text(text))))
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read embedded text")?,
        Some(session) if !session.is_scanned() => {
            controller.toggle_extracted_text().context("text extraction failed")?;
            controller.wait_for_background();
            controller.extracted_text()
        }
        _ => {
            controller.wait_for_background();
            controller.extracted_text()
        }
    };

    if pages.iter().all(Option::is_none) {
        let banner = controller.banner().unwrap_or("no text could be extracted");
        anyhow::bail!("{banner}");
    }

    for (index, text) in pages.iter().enumerate() {
        println!("--- page {} ---", index + 1);
        match text {
            Some(PageText::Text(text)) => println!("{text}"),
            Some(PageText::Failed(reason)) => println!("[extraction failed: {reason}]"),
            None => println!("[not extracted]"),
        }
    }

    Ok(())
}

fn run_fetch(url: &str, out: &Path) -> Result<()> {
    let config = load_config()?;
    let fetched = fetch_url(&config, url).with_context(|| format!("failed to fetch {url}"))?;

    fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
    let path = out.join(&fetched.file_name);
    fs::write(&path, &fetched.bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;

    println!("{}", path.display());
    Ok(())
}

fn run_convert(file: &Path, server: Option<String>, out: &Path) -> Result<()> {
    ensure_file_exists(file)?;

    let mut config = load_config()?;
    if let Some(server) = server {
        config = config.with_server_url(server);
    }

    let name = file_name(file);
    if FileCategory::detect(&name, None) != FileCategory::Document {
        anyhow::bail!("{name} is not a convertible document");
    }

    let bytes = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let client = ServerClient::new(&config)?;
    let pdf = client
        .convert_document(&name, bytes)
        .map_err(|err| {
            let banner = err.banner();
            anyhow::Error::new(err).context(banner)
        })?;

    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(out, pdf).with_context(|| format!("failed to write {}", out.display()))?;

    println!("{}", out.display());
    Ok(())
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
