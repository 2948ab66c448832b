//! Image I/O boundary: decoding imports, PNG export, and the background jobs
//! that run both off the editing thread.

use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use image::codecs::png::PngEncoder;
use image::{ImageError, RgbaImage};

use crate::canvas::LayerId;
use crate::error::{EditError, EditResult};
use crate::ops::filters::{self, FilterKind};

/// Completion message posted by a background job.
pub enum IoResult {
    ImageDecoded {
        name: String,
        pixels: RgbaImage,
    },
    DecodeFailed {
        name: String,
        error: String,
    },
    FilterApplied {
        layer: LayerId,
        kind: FilterKind,
        pixels: RgbaImage,
    },
}

/// Decode any supported format into RGBA8.
pub fn decode_image(bytes: &[u8]) -> EditResult<RgbaImage> {
    let img = image::load_from_memory(bytes).map_err(|e| EditError::Decode(e.to_string()))?;
    Ok(img.to_rgba8())
}

pub fn load_image(path: &Path) -> EditResult<RgbaImage> {
    let bytes = std::fs::read(path)
        .map_err(|e| EditError::Decode(format!("{}: {}", path.display(), e)))?;
    decode_image(&bytes)
}

fn encode_png_into<W: Write>(image: &RgbaImage, writer: W) -> Result<(), ImageError> {
    let encoder = PngEncoder::new(writer);
    #[allow(deprecated)]
    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )
}

pub fn encode_png(image: &RgbaImage) -> EditResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    encode_png_into(image, &mut out).map_err(|e| EditError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

pub fn write_png(image: &RgbaImage, path: &Path) -> EditResult<()> {
    let file = File::create(path)
        .map_err(|e| EditError::Encode(format!("{}: {}", path.display(), e)))?;
    let mut writer = BufWriter::new(file);
    encode_png_into(image, &mut writer).map_err(|e| EditError::Encode(e.to_string()))?;
    writer
        .flush()
        .map_err(|e| EditError::Encode(format!("{}: {}", path.display(), e)))
}

/// Decode `bytes` on the rayon pool and post the outcome.
///
/// A closed channel means the session is gone; the result is dropped.
pub fn spawn_decode(bytes: Vec<u8>, name: String, sender: Sender<IoResult>) {
    rayon::spawn(move || {
        let msg = match decode_image(&bytes) {
            Ok(pixels) => IoResult::ImageDecoded { name, pixels },
            Err(e) => IoResult::DecodeFailed {
                name,
                error: e.to_string(),
            },
        };
        let _ = sender.send(msg);
    });
}

/// Filter a shared, immutable pixel buffer on the rayon pool.
pub fn spawn_filter(
    layer: LayerId,
    kind: FilterKind,
    source: Arc<RgbaImage>,
    sender: Sender<IoResult>,
) {
    rayon::spawn(move || {
        let pixels = filters::apply_to_image(&source, kind);
        let _ = sender.send(IoResult::FilterApplied {
            layer,
            kind,
            pixels,
        });
    });
}
