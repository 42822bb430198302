//! Data Matrix barcodes as inline PNG data URIs

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use datamatrix::{DataMatrix, SymbolList};

use super::RenderError;

/// Blank modules around the symbol
const QUIET_ZONE: usize = 1;

const BLACK: u8 = 0x00;
const WHITE: u8 = 0xFF;

/// Encodes a payload into an image that can be embedded with `<img src=..>`
pub trait Barcode: Send + Sync {
    /// `scale` is the edge length in pixels of a single module
    fn data_uri(&self, payload: &str, scale: u32) -> Result<String, RenderError>;
}

/// ECC200 Data Matrix rendered as 8-bit grayscale PNG
#[derive(Debug, Clone, Copy, Default)]
pub struct DataMatrixPng;

impl Barcode for DataMatrixPng {
    fn data_uri(&self, payload: &str, scale: u32) -> Result<String, RenderError> {
        let png = encode_png(payload, scale)?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
    }
}

fn encode_png(payload: &str, scale: u32) -> Result<Vec<u8>, RenderError> {
    if scale == 0 {
        return Err(RenderError::Barcode("scale must be positive".to_string()));
    }

    let code = DataMatrix::encode(payload.as_bytes(), SymbolList::default())
        .map_err(|e| RenderError::Barcode(format!("{:?}", e)))?;
    let bitmap = code.bitmap();

    let scale = scale as usize;
    let width = (bitmap.width() + 2 * QUIET_ZONE) * scale;
    let height = (bitmap.height() + 2 * QUIET_ZONE) * scale;

    let mut pixels = vec![WHITE; width * height];
    for (x, y) in bitmap.pixels() {
        let left = (x + QUIET_ZONE) * scale;
        let top = (y + QUIET_ZONE) * scale;
        for row in top..top + scale {
            let start = row * width + left;
            pixels[start..start + scale].fill(BLACK);
        }
    }

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width as u32, height as u32);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder
            .write_header()
            .map_err(|e| RenderError::Barcode(e.to_string()))?;
        writer
            .write_image_data(&pixels)
            .map_err(|e| RenderError::Barcode(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| RenderError::Barcode(e.to_string()))?;
    }

    Ok(out)
}
