//! Locating the Tesseract OCR engine.
//!
//! Tesseract is a hard precondition for a session: it is checked once at
//! startup and its absence is reported to the operator with a retry option.
//! Installing it is out of scope.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::process::Command;

use crate::log;

#[cfg(windows)]
const EXECUTABLE_NAME: &str = "tesseract.exe";
#[cfg(not(windows))]
const EXECUTABLE_NAME: &str = "tesseract";

#[cfg(windows)]
const COMMON_INSTALL_DIRS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR",
    r"C:\Program Files (x86)\Tesseract-OCR",
];
#[cfg(not(windows))]
const COMMON_INSTALL_DIRS: &[&str] = &["/usr/bin", "/usr/local/bin", "/opt/homebrew/bin"];

/// Resolved engine locations.
#[derive(Clone, Debug)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    /// Explicit tessdata directory; `None` lets Tesseract use its built-in default
    pub tessdata: Option<PathBuf>,
}

/// Returns the directory for a private Tesseract copy.
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ngu-automation")
        .join("tesseract")
}

/// Verifies that Tesseract can be started. Call once at startup.
///
/// An error here is fatal for the session.
pub fn ensure_tesseract() -> Result<TesseractPaths> {
    let executable = find_tesseract_executable()?;

    let output = Command::new(&executable)
        .arg("--version")
        .output()
        .with_context(|| format!("Tesseract not found at {}", executable.display()))?;
    if !output.status.success() {
        return Err(anyhow!(
            "Tesseract at {} failed to report its version",
            executable.display()
        ));
    }

    let version = String::from_utf8_lossy(&output.stdout);
    let version = version.lines().next().unwrap_or("unknown version").trim();
    log(&format!("Tesseract found: {} ({})", executable.display(), version));

    Ok(TesseractPaths {
        executable,
        tessdata: find_tessdata_dir(),
    })
}

/// Finds the Tesseract executable, checking our local dir first, then PATH, then common paths.
pub fn find_tesseract_executable() -> Result<PathBuf> {
    let local_exe = get_tesseract_dir().join(EXECUTABLE_NAME);
    if local_exe.exists() {
        return Ok(local_exe);
    }

    // Check PATH
    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    for dir in COMMON_INSTALL_DIRS {
        let p = PathBuf::from(dir).join(EXECUTABLE_NAME);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!("Tesseract not found. Please install Tesseract-OCR."))
}

/// Finds a tessdata directory containing English data, if one is installed outside
/// Tesseract's default search path.
pub fn find_tessdata_dir() -> Option<PathBuf> {
    let mut candidates = vec![get_tesseract_dir().join("tessdata")];

    // TESSDATA_PREFIX may point at tessdata itself or at its parent
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        candidates.push(PathBuf::from(&prefix));
        candidates.push(PathBuf::from(&prefix).join("tessdata"));
    }

    candidates.extend(
        COMMON_INSTALL_DIRS
            .iter()
            .map(|dir| PathBuf::from(dir).join("tessdata")),
    );

    candidates
        .into_iter()
        .find(|p| p.join("eng.traineddata").exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tesseract_dir_is_app_scoped() {
        let dir = get_tesseract_dir();
        assert!(dir.ends_with(PathBuf::from("ngu-automation").join("tesseract")));
    }
}
