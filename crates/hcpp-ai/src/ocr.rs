//! Image-to-text through an external OCR engine.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::OcrError;

#[async_trait]
pub trait OcrEngine {
    /// Recognized text of one image, in reading order.
    ///
    /// In paragraph mode adjacent lines are merged into one entry per block;
    /// otherwise every non-blank line is its own entry.
    async fn read_text(&self, image: &Path, paragraph: bool) -> Result<Vec<String>, OcrError>;
}

/// Runs the `tesseract` command-line engine, one process per image.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    pub program: String,
    pub lang: String,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self {
            program: "tesseract".into(),
            lang: "eng".into(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn read_text(&self, image: &Path, paragraph: bool) -> Result<Vec<String>, OcrError> {
        debug!(image = %image.display(), paragraph, "running OCR");
        let output = Command::new(&self.program)
            .arg(image)
            .arg("stdout")
            .args(["-l", &self.lang])
            .output()
            .await
            .map_err(|source| OcrError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(OcrError::Failed {
                path: image.to_path_buf(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(split_output(&String::from_utf8_lossy(&output.stdout), paragraph))
    }
}

/// Split raw engine output into lines or blank-line separated paragraphs.
pub fn split_output(text: &str, paragraph: bool) -> Vec<String> {
    if !paragraph {
        return text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
    }
    let mut out = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !block.is_empty() {
                out.push(block.join(" "));
                block.clear();
            }
        } else {
            block.push(line);
        }
    }
    if !block.is_empty() {
        out.push(block.join(" "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "Allowed to read\n  Steps \n\nSleep\nHeart rate\n\n\n\x0c";

    #[test]
    fn line_mode_drops_blank_lines() {
        assert_eq!(
            split_output(RAW, false),
            vec!["Allowed to read", "Steps", "Sleep", "Heart rate"]
        );
    }

    #[test]
    fn paragraph_mode_merges_blocks() {
        assert_eq!(
            split_output("We collect\nyour steps.\n\nWe never sell data.\n", true),
            vec!["We collect your steps.", "We never sell data."]
        );
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let ocr = TesseractOcr {
            program: "definitely-not-an-ocr-binary".into(),
            ..Default::default()
        };
        let err = ocr.read_text(Path::new("x.png"), false).await.unwrap_err();
        assert!(matches!(err, OcrError::Spawn { .. }));
    }
}
