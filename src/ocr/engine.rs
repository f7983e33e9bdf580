use anyhow::{anyhow, Result};
use image::GrayImage;
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;

use super::preprocess::{prepare, Preprocess};
use super::setup::TesseractPaths;
use crate::capture::CapturedRegion;

/// Turns a captured region into text.
///
/// An `Err` or an empty/garbled string is a soft failure: callers treat it as
/// "value unknown this tick" and poll again.
pub trait TextReader: Send {
    fn read(&self, region: &CapturedRegion) -> Result<String>;
}

/// Tesseract page segmentation modes used by the automation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageSegmentation {
    /// Treat the image as a single text line (numbers, labels)
    SingleLine,
    /// Assume a single uniform block of text (quest descriptions)
    Block,
}

impl PageSegmentation {
    fn as_arg(self) -> &'static str {
        match self {
            Self::SingleLine => "7",
            Self::Block => "6",
        }
    }
}

/// `TextReader` backed by the Tesseract command-line tool.
pub struct TesseractReader {
    executable: PathBuf,
    tessdata: Option<PathBuf>,
    preprocess: Preprocess,
    segmentation: PageSegmentation,
}

impl TesseractReader {
    pub fn new(paths: TesseractPaths, preprocess: Preprocess) -> Self {
        Self {
            executable: paths.executable,
            tessdata: paths.tessdata,
            preprocess,
            segmentation: PageSegmentation::Block,
        }
    }

    pub fn with_segmentation(mut self, segmentation: PageSegmentation) -> Self {
        self.segmentation = segmentation;
        self
    }

    /// Runs Tesseract on a preprocessed grayscale image and returns raw stdout text.
    pub fn recognize_image(&self, img: &GrayImage) -> Result<String> {
        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())?;

        let mut command = Command::new(&self.executable);
        command.arg(temp_input.path()).arg("stdout");
        if let Some(tessdata) = &self.tessdata {
            command.arg("--tessdata-dir").arg(tessdata);
        }
        let output = command
            .arg("-l")
            .arg("eng")
            .arg("--psm")
            .arg(self.segmentation.as_arg())
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl TextReader for TesseractReader {
    fn read(&self, region: &CapturedRegion) -> Result<String> {
        let prepared = prepare(&region.image, &self.preprocess);
        let text = self.recognize_image(&prepared)?;
        Ok(normalize_whitespace(&text))
    }
}

/// Collapses runs of whitespace (including newlines) into single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
