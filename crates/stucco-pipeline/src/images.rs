//! Image optimization.

use std::path::Path;

use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::files;

/// Result of the image task.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImageReport {
    /// Files written
    pub files: usize,

    /// Bytes saved by optimization
    pub saved_bytes: u64,
}

/// Copy every image to the output directory, recompressing PNGs.
///
/// At most `images.concurrency` files are processed at once.
pub fn optimize_images(config: &PipelineConfig) -> Result<ImageReport, PipelineError> {
    let src = config.images_src();
    let out = config.images_out();
    let sources = files::walk_files(&src);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.images.concurrency.max(1))
        .build()
        .map_err(|e| PipelineError::Image {
            path: src.clone(),
            message: e.to_string(),
        })?;

    let results: Vec<Result<u64, PipelineError>> = pool.install(|| {
        sources
            .par_iter()
            .map(|path| {
                let target = out.join(files::relative_to(path, &src));
                process_image(path, &target)
            })
            .collect()
    });

    let mut report = ImageReport::default();
    for result in results {
        report.saved_bytes += result?;
        report.files += 1;
    }

    Ok(report)
}

/// Write one image, returning the bytes saved.
fn process_image(path: &Path, target: &Path) -> Result<u64, PipelineError> {
    let original = files::read(path)?;

    let data = if files::has_extension(path, "png") {
        let optimized = optimize_png(&original).map_err(|e| PipelineError::Image {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if optimized.len() < original.len() {
            tracing::debug!(
                "{}: {} -> {} bytes",
                path.display(),
                original.len(),
                optimized.len()
            );
            optimized
        } else {
            original.clone()
        }
    } else {
        original.clone()
    };

    files::write(target, &data)?;
    Ok((original.len() - data.len()) as u64)
}

/// Losslessly recompress a PNG, keeping every ancillary chunk.
///
/// Animated PNGs are returned unchanged.
pub fn optimize_png(bytes: &[u8]) -> Result<Vec<u8>, oxipng::PngError> {
    if has_chunk(bytes, b"acTL") {
        return Ok(bytes.to_vec());
    }

    let mut options = oxipng::Options::from_preset(4);
    options.strip = oxipng::StripChunks::None;

    oxipng::optimize_from_memory(bytes, &options)
}

/// Whether a PNG stream contains a chunk of the given type before its image
/// data ends.
fn has_chunk(bytes: &[u8], name: &[u8; 4]) -> bool {
    const SIGNATURE: usize = 8;

    let mut pos = SIGNATURE;
    while pos + 8 <= bytes.len() {
        let len = u32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
            as usize;
        let kind = &bytes[pos + 4..pos + 8];
        if kind == name {
            return true;
        }
        if kind == b"IEND" {
            break;
        }
        pos = match pos.checked_add(12 + len) {
            Some(next) => next,
            None => break,
        };
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::png::{CompressionType, FilterType, PngEncoder};
    use image::{ImageEncoder, Rgba, RgbaImage};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn png_bytes() -> Vec<u8> {
        let image = RgbaImage::from_fn(32, 32, |x, _| {
            if x < 16 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        let mut bytes = Vec::new();
        PngEncoder::new_with_quality(&mut bytes, CompressionType::Fast, FilterType::NoFilter)
            .write_image(image.as_raw(), 32, 32, image::ColorType::Rgba8)
            .unwrap();
        bytes
    }

    #[test]
    fn optimized_png_decodes_to_same_pixels() {
        let original = png_bytes();

        let optimized = optimize_png(&original).unwrap();

        let a = image::load_from_memory(&original).unwrap().to_rgba8();
        let b = image::load_from_memory(&optimized).unwrap().to_rgba8();
        assert_eq!(a, b);
    }

    fn frame(i: u8) -> Vec<u8> {
        (0..64 * 64)
            .flat_map(|p| [(p % 64) as u8 * 4, i * 80, (p / 64) as u8 * 4, 255])
            .collect()
    }

    fn apng_bytes(frames: u8) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut encoder = png::Encoder::new(&mut bytes, 64, 64);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(png::Compression::Fast);
        encoder.set_animated(frames as u32, 0).unwrap();
        let mut writer = encoder.write_header().unwrap();
        for i in 0..frames {
            writer.write_image_data(&frame(i)).unwrap();
        }
        drop(writer);
        bytes
    }

    #[test]
    fn animated_png_keeps_every_frame() {
        let temp = tempdir().unwrap();
        let config = PipelineConfig::with_root(temp.path());
        let original = apng_bytes(3);
        files::write(&config.images_src().join("spinner.png"), &original).unwrap();

        optimize_images(&config).unwrap();

        let written = std::fs::read(config.images_out().join("spinner.png")).unwrap();
        assert_eq!(written, original);
        let reader = png::Decoder::new(Cursor::new(&written)).read_info().unwrap();
        assert_eq!(
            reader.info().animation_control.map(|ac| ac.num_frames),
            Some(3)
        );
    }

    #[test]
    fn keeps_colour_chunks() {
        let mut bytes = Vec::new();
        let mut encoder = png::Encoder::new(&mut bytes, 64, 64);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(png::Compression::Fast);
        encoder.set_source_gamma(png::ScaledFloat::new(0.45455));
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&frame(0)).unwrap();
        drop(writer);
        assert!(has_chunk(&bytes, b"gAMA"));

        let optimized = optimize_png(&bytes).unwrap();

        assert!(has_chunk(&optimized, b"gAMA"));
    }

    #[test]
    fn finds_chunks_in_stream() {
        let still = png_bytes();
        let animated = apng_bytes(2);

        assert!(has_chunk(&still, b"IHDR"));
        assert!(!has_chunk(&still, b"acTL"));
        assert!(has_chunk(&animated, b"acTL"));
        assert!(!has_chunk(b"not a png", b"acTL"));
    }

    #[test]
    fn copies_images_preserving_layout() {
        let temp = tempdir().unwrap();
        let config = PipelineConfig::with_root(temp.path());
        files::write(&config.images_src().join("logo.png"), png_bytes()).unwrap();
        files::write(&config.images_src().join("icons/menu.svg"), "<svg/>").unwrap();

        let report = optimize_images(&config).unwrap();

        assert_eq!(report.files, 2);
        let logo = std::fs::read(config.images_out().join("logo.png")).unwrap();
        assert!(logo.len() <= png_bytes().len());
        assert_eq!(
            std::fs::read_to_string(config.images_out().join("icons/menu.svg")).unwrap(),
            "<svg/>"
        );
    }

    #[test]
    fn corrupt_png_fails() {
        let temp = tempdir().unwrap();
        let config = PipelineConfig::with_root(temp.path());
        files::write(&config.images_src().join("broken.png"), "not a png").unwrap();

        assert!(matches!(
            optimize_images(&config),
            Err(PipelineError::Image { .. })
        ));
    }
}
