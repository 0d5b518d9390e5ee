//! Image encoding: `PageImage` → PNG bytes tagged with their MIME type.
//!
//! PNG is lossless, so small print on an invoice survives the trip to the
//! model. The `image` crate's PNG writer embeds no timestamps or other
//! incidental metadata, which keeps the output a pure function of the pixels.

use crate::error::InvoxtError;
use crate::pipeline::document::PageImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use futures::future::try_join_all;
use std::io::Cursor;
use tracing::debug;

/// MIME type of every encoded page.
pub const PAGE_MIME_TYPE: &str = "image/png";

/// Transport form of a page image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPage {
    pub mime_type: String,
    pub payload: Vec<u8>,
}

impl EncodedPage {
    /// Payload as standard base64, the form JSON APIs expect.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.payload)
    }

    /// Wrap for edgequake-llm providers. `detail: "high"` keeps fine print
    /// legible on OpenAI-style tilers.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.to_base64(), self.mime_type.as_str()).with_detail("high")
    }
}

/// Encode one page as PNG.
pub fn encode_page(page: &PageImage) -> Result<EncodedPage, InvoxtError> {
    let mut buf = Vec::new();
    page.image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| {
            InvoxtError::Internal(format!(
                "PNG encoding failed for document {} page {}: {}",
                page.document + 1,
                page.page,
                e
            ))
        })?;

    debug!(
        "Encoded document {} page {} → {} bytes PNG",
        page.document + 1,
        page.page,
        buf.len()
    );

    Ok(EncodedPage {
        mime_type: PAGE_MIME_TYPE.to_string(),
        payload: buf,
    })
}

/// Encode pages on blocking threads, one task per page. Output order matches
/// input order.
pub async fn encode_pages(pages: Vec<PageImage>) -> Result<Vec<EncodedPage>, InvoxtError> {
    let tasks = pages.into_iter().map(|page| async move {
        tokio::task::spawn_blocking(move || encode_page(&page))
            .await
            .map_err(|e| InvoxtError::Internal(format!("Encode task panicked: {}", e)))?
    });
    try_join_all(tasks).await
}
