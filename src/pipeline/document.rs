//! Document loading: turn uploads into an ordered list of page images.
//!
//! Raster uploads (JPEG, PNG) decode straight into a single page. PDFs go
//! through a [`Rasterizer`]; the default one drives pdfium.
//!
//! pdfium opens documents by path, so PDF bytes are staged in a
//! [`NamedTempFile`] for the duration of the rasterizer call. The temp file is
//! owned by [`DocumentLoader::load`] and dropped before it returns, whether
//! the rasterizer succeeded, failed or panicked.

use crate::config::LoaderConfig;
use crate::error::InvoxtError;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

// ── Upload types ─────────────────────────────────────────────────────────

/// Raster formats accepted as direct uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Jpeg,
    Png,
}

impl RasterFormat {
    fn image_format(self) -> ImageFormat {
        match self {
            RasterFormat::Jpeg => ImageFormat::Jpeg,
            RasterFormat::Png => ImageFormat::Png,
        }
    }
}

/// The two accepted input forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    RasterImage(RasterFormat),
}

impl DocumentKind {
    /// Classify a MIME type. Parameters (`; charset=...`) and case are ignored.
    pub fn from_mime_type(mime_type: &str) -> Result<Self, InvoxtError> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Ok(DocumentKind::Pdf),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => {
                Ok(DocumentKind::RasterImage(RasterFormat::Jpeg))
            }
            "image/png" => Ok(DocumentKind::RasterImage(RasterFormat::Png)),
            _ => Err(InvoxtError::UnsupportedFormat {
                mime_type: mime_type.to_string(),
            }),
        }
    }

    /// Classify raw bytes by their leading signature.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            return Some(DocumentKind::Pdf);
        }
        match image::guess_format(bytes).ok()? {
            ImageFormat::Png => Some(DocumentKind::RasterImage(RasterFormat::Png)),
            ImageFormat::Jpeg => Some(DocumentKind::RasterImage(RasterFormat::Jpeg)),
            _ => None,
        }
    }
}

/// One uploaded file. Immutable once received.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    /// Display name (usually the original file name).
    pub name: String,
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    /// Build from a declared MIME type.
    pub fn new(
        name: impl Into<String>,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Self, InvoxtError> {
        Ok(Self {
            name: name.into(),
            kind: DocumentKind::from_mime_type(mime_type)?,
            bytes,
        })
    }

    /// Build by inspecting the bytes when no MIME type is available.
    pub fn sniff(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, InvoxtError> {
        let kind = DocumentKind::sniff(&bytes).ok_or_else(|| InvoxtError::UnsupportedFormat {
            mime_type: "application/octet-stream".to_string(),
        })?;
        Ok(Self {
            name: name.into(),
            kind,
            bytes,
        })
    }

    pub fn pdf(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            kind: DocumentKind::Pdf,
            bytes,
        }
    }

    pub fn image(name: impl Into<String>, format: RasterFormat, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            kind: DocumentKind::RasterImage(format),
            bytes,
        }
    }
}

/// One rendered page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 0-based index of the upload this page came from.
    pub document: usize,
    /// 1-based page number within that upload.
    pub page: usize,
    pub image: DynamicImage,
}

impl PageImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

// ── Rasterizer seam ──────────────────────────────────────────────────────

/// Renders every page of a PDF on disk, in page order.
///
/// Called from a blocking thread, never from an async worker.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, InvoxtError>;
}

/// pdfium-backed rasterizer.
pub struct PdfiumRasterizer {
    config: LoaderConfig,
}

impl PdfiumRasterizer {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Bind the pdfium library from the configured location, or the system
    /// library when none is configured.
    fn bind(&self) -> Result<Pdfium, InvoxtError> {
        let bindings = match &self.config.pdfium_library_path {
            Some(path) if path.is_dir() => {
                let dir = path.to_string_lossy().to_string();
                Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path(&dir))
            }
            Some(path) => Pdfium::bind_to_library(&path.to_string_lossy().to_string()),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| {
            InvoxtError::rasterization(format!(
                "could not load the pdfium library ({:?})\nSet PDFIUM_LIB_PATH or pass --pdfium-lib.",
                e
            ))
        })?;
        Ok(Pdfium::new(bindings))
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, InvoxtError> {
        let pdfium = self.bind()?;
        let password = self.config.password.as_deref();

        let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.to_lowercase().contains("password") {
                if password.is_some() {
                    InvoxtError::rasterization("wrong password for encrypted PDF")
                } else {
                    InvoxtError::rasterization(
                        "PDF is encrypted and requires a password\nProvide it with --password <PASSWORD>.",
                    )
                }
            } else {
                InvoxtError::rasterization(format!("PDF could not be opened: {}", err_str))
            }
        })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);

        let max_pixels = self.config.max_rendered_pixels as i32;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.config.dpi as f32 / 72.0)
            .set_maximum_width(max_pixels)
            .set_maximum_height(max_pixels);

        let mut images = Vec::with_capacity(total_pages);
        for idx in 0..total_pages {
            let page = pages.get(idx as u16).map_err(|e| {
                InvoxtError::rasterization(format!("page {}: {:?}", idx + 1, e))
            })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                InvoxtError::rasterization(format!("page {}: {:?}", idx + 1, e))
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        Ok(images)
    }
}

// ── Loader ───────────────────────────────────────────────────────────────

/// Normalises uploads into page images.
#[derive(Clone)]
pub struct DocumentLoader {
    rasterizer: Arc<dyn Rasterizer>,
    staging_dir: Option<PathBuf>,
}

impl DocumentLoader {
    /// Loader backed by pdfium, configured from `config`.
    pub fn new(config: &LoaderConfig) -> Self {
        Self::with_rasterizer(Arc::new(PdfiumRasterizer::new(config.clone())))
    }

    /// Loader backed by any [`Rasterizer`].
    pub fn with_rasterizer(rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self {
            rasterizer,
            staging_dir: None,
        }
    }

    /// Stage PDFs in `dir` instead of the system temp directory.
    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Load one upload. Raster images yield exactly one page; PDFs yield one
    /// page per PDF page, in page order.
    pub async fn load(&self, document: &UploadedDocument) -> Result<Vec<PageImage>, InvoxtError> {
        self.load_indexed(document, 0).await
    }

    /// Load several uploads, concatenating pages in document-then-page order.
    pub async fn load_all(
        &self,
        documents: &[UploadedDocument],
    ) -> Result<Vec<PageImage>, InvoxtError> {
        if documents.is_empty() {
            return Err(InvoxtError::empty(
                "upload at least one PDF or image before submitting",
            ));
        }
        let mut pages = Vec::new();
        for (index, document) in documents.iter().enumerate() {
            pages.extend(self.load_indexed(document, index).await?);
        }
        Ok(pages)
    }

    pub(crate) async fn load_indexed(
        &self,
        document: &UploadedDocument,
        index: usize,
    ) -> Result<Vec<PageImage>, InvoxtError> {
        let images = match document.kind {
            DocumentKind::RasterImage(format) => vec![decode_raster(&document.bytes, format)?],
            DocumentKind::Pdf => self.rasterize_pdf(&document.bytes).await?,
        };
        debug!("Loaded '{}' → {} page(s)", document.name, images.len());

        Ok(images
            .into_iter()
            .enumerate()
            .map(|(i, image)| PageImage {
                document: index,
                page: i + 1,
                image,
            })
            .collect())
    }

    async fn rasterize_pdf(&self, bytes: &[u8]) -> Result<Vec<DynamicImage>, InvoxtError> {
        if !bytes.starts_with(b"%PDF") {
            let magic: Vec<u8> = bytes.iter().take(4).copied().collect();
            return Err(InvoxtError::rasterization(format!(
                "upload is not a valid PDF (first bytes: {:?})",
                magic
            )));
        }

        let staged = self.stage(bytes)?;
        let path = staged.path().to_path_buf();
        let rasterizer = Arc::clone(&self.rasterizer);

        let joined = tokio::task::spawn_blocking(move || rasterizer.rasterize(&path)).await;

        // Remove the staged copy before inspecting the outcome.
        drop(staged);

        let images = joined
            .map_err(|e| InvoxtError::rasterization(format!("rasterizer task panicked: {}", e)))??;

        if images.is_empty() {
            return Err(InvoxtError::rasterization("rasterizer returned zero pages"));
        }
        Ok(images)
    }

    fn stage(&self, bytes: &[u8]) -> Result<NamedTempFile, InvoxtError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("invoxt-").suffix(".pdf");
        let created = match &self.staging_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        let mut tmp = created
            .map_err(|e| InvoxtError::rasterization(format!("could not stage PDF: {e}")))?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.flush())
            .map_err(|e| InvoxtError::rasterization(format!("could not stage PDF: {e}")))?;
        Ok(tmp)
    }
}

fn decode_raster(bytes: &[u8], format: RasterFormat) -> Result<DynamicImage, InvoxtError> {
    image::load_from_memory_with_format(bytes, format.image_format()).map_err(|e| {
        InvoxtError::ImageDecodeFailed {
            detail: e.to_string(),
        }
    })
}
