use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tojioo_api_core::{ShapeError, Tensor, TensorLike};

use super::{ImageSink, SavedImage};
use crate::config::PassthroughConfig;
use crate::error::NodeError;

/// Writes preview frames as PNG files into a temp directory, numbered
/// `{prefix}{counter:05}_.png`. The counter continues after the highest existing file.
#[derive(Debug)]
pub struct TempDirSink {
    root: PathBuf,
    subfolder: String,
    prefix: String,
    next: Option<u32>,
}

impl TempDirSink {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        TempDirSink {
            root: root.into(),
            subfolder: String::new(),
            prefix: prefix.into(),
            next: None,
        }
    }

    /// Sink rooted at `root` using the configured filename prefix.
    pub fn from_config(root: impl Into<PathBuf>, config: &PassthroughConfig) -> Self {
        Self::new(root, config.preview_prefix.clone())
    }

    pub fn with_subfolder(mut self, subfolder: impl Into<String>) -> Self {
        self.subfolder = subfolder.into();
        self.next = None;
        self
    }

    /// Directory frames are written to.
    pub fn output_dir(&self) -> PathBuf {
        if self.subfolder.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&self.subfolder)
        }
    }

    fn counter_from_name(&self, name: &str) -> Option<u32> {
        name.strip_prefix(self.prefix.as_str())?
            .strip_suffix("_.png")?
            .parse()
            .ok()
    }

    fn next_counter(&mut self, dir: &Path) -> Result<u32, NodeError> {
        if let Some(next) = self.next {
            return Ok(next);
        }
        fs::create_dir_all(dir)?;
        let mut highest = 0;
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            if let Some(n) = name.to_str().and_then(|n| self.counter_from_name(n)) {
                highest = highest.max(n);
            }
        }
        let next = highest
            .checked_add(1)
            .ok_or_else(|| NodeError::Encode(format!("preview counter exhausted in {}", dir.display())))?;
        debug!("preview: counter for {} starts at {next}", dir.display());
        Ok(next)
    }
}

impl ImageSink for TempDirSink {
    fn save(&mut self, frame: &Tensor, metadata: &[(String, String)]) -> Result<SavedImage, NodeError> {
        let dir = self.output_dir();
        let counter = self.next_counter(&dir)?;
        let filename = format!("{}{counter:05}_.png", self.prefix);
        let path = dir.join(&filename);
        if let Err(err) = write_png(&path, frame, metadata) {
            if let Err(cleanup) = fs::remove_file(&path) {
                debug!("preview: could not remove partial {}: {cleanup}", path.display());
            }
            return Err(err);
        }
        self.next = counter.checked_add(1);
        Ok(SavedImage {
            filename,
            subfolder: self.subfolder.clone(),
        })
    }
}

fn write_png(path: &Path, frame: &Tensor, metadata: &[(String, String)]) -> Result<(), NodeError> {
    let mut out = BufWriter::new(File::create(path)?);
    encode_png(&mut out, frame, metadata)?;
    out.flush()?;
    Ok(())
}

/// `0..=1` floats to 8-bit samples, saturating out-of-range values.
pub fn frame_to_bytes(frame: &Tensor) -> Vec<u8> {
    frame
        .data()
        .iter()
        .map(|v| (255.0 * v).clamp(0.0, 255.0) as u8)
        .collect()
}

fn valid_keyword(keyword: &str) -> bool {
    (1..=79).contains(&keyword.chars().count())
        && keyword.chars().all(|c| (c as u32) < 256)
        && !keyword.starts_with(' ')
        && !keyword.ends_with(' ')
}

/// Encode one `H,W,C` frame as an 8-bit PNG with text metadata.
pub fn encode_png<W: Write>(out: W, frame: &Tensor, metadata: &[(String, String)]) -> Result<(), NodeError> {
    let &[height, width, channels] = frame.shape() else {
        return Err(ShapeError::Rank {
            kind: "preview frame".to_string(),
            expected: 3,
            shape: frame.shape().to_vec(),
        }
        .into());
    };
    let color = match channels {
        1 => png::ColorType::Grayscale,
        3 => png::ColorType::Rgb,
        4 => png::ColorType::Rgba,
        other => return Err(NodeError::Encode(format!("unsupported channel count {other}"))),
    };
    let dim = |n: usize| u32::try_from(n).map_err(|_| NodeError::Encode(format!("dimension {n} too large")));

    let mut encoder = png::Encoder::new(out, dim(width)?, dim(height)?);
    encoder.set_color(color);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png::Compression::Fast);
    for (keyword, text) in metadata {
        if !valid_keyword(keyword) {
            warn!("preview: skipping metadata with invalid keyword '{keyword}'");
            continue;
        }
        if text.chars().all(|c| (c as u32) < 256) {
            encoder.add_text_chunk(keyword.clone(), text.clone())?;
        } else {
            encoder.add_itxt_chunk(keyword.clone(), text.clone())?;
        }
    }

    let mut writer = encoder.write_header()?;
    writer.write_image_data(&frame_to_bytes(frame))?;
    writer.finish()?;
    Ok(())
}
