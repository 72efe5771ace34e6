//! Local engine: run LibreOffice headless as a subprocess.
//!
//! ## Argument layout
//!
//! ```text
//! soffice --headless --nologo --nolockcheck --norestore \
//!         [--infilter=<pdf import filter>] \
//!         --convert-to <output filter> --outdir <work dir> <input>
//! ```
//!
//! The input filter is only inserted for PDF sources, and always ahead of
//! `--convert-to`; without it LibreOffice opens PDFs in Draw and cannot export
//! them to Word, Calc or Impress formats.
//!
//! soffice writes its result next to the input's stem in `--outdir`
//! (`input.pdf` → `input.docx`), which is where [`expected_output`] looks.

use crate::error::GatewayError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Characters of stderr kept in a failure diagnostic.
pub const STDERR_TAIL_CHARS: usize = 1000;

/// Export filter name for `--convert-to`. Unlisted targets pass through.
pub fn output_filter(target: &str) -> String {
    match target {
        "docx" => "docx:MS Word 2007 XML".to_string(),
        "xlsx" => "xlsx:Calc MS Excel 2007 XML".to_string(),
        "pptx" => "pptx:Impress MS PowerPoint 2007 XML".to_string(),
        other => other.to_string(),
    }
}

/// Import filter for PDF sources, chosen by target application.
pub fn input_filter(source_ext: &str, target: &str) -> Option<&'static str> {
    if source_ext != "pdf" {
        return None;
    }
    match target {
        "pptx" | "ppt" => Some("impress_pdf_import"),
        "docx" => Some("writer_pdf_import"),
        "xlsx" => Some("calc_pdf_import"),
        _ => None,
    }
}

/// Full soffice argument list (without the program itself).
pub fn soffice_args(input: &Path, source_ext: &str, target: &str, out_dir: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["--headless", "--nologo", "--nolockcheck", "--norestore"]
        .into_iter()
        .map(OsString::from)
        .collect();
    if let Some(filter) = input_filter(source_ext, target) {
        args.push(format!("--infilter={filter}").into());
    }
    args.push("--convert-to".into());
    args.push(output_filter(target).into());
    args.push("--outdir".into());
    args.push(out_dir.as_os_str().to_owned());
    args.push(input.as_os_str().to_owned());
    args
}

/// Where soffice leaves its output for `input` converted to `target`.
pub fn expected_output(input: &Path, target: &str, out_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    out_dir.join(format!("{stem}.{target}"))
}

/// The last `max_chars` characters of `text`.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    let start = text
        .char_indices()
        .nth(skip)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[start..]
}

/// Drives one soffice conversion.
#[derive(Debug, Clone)]
pub struct LocalDriver<'a> {
    binary: &'a Path,
    timeout: Duration,
}

impl<'a> LocalDriver<'a> {
    pub fn new(binary: &'a Path, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    /// Convert `input` into `out_dir` and return the produced file's path.
    ///
    /// The child is killed if it outlives the timeout or if this future is
    /// dropped.
    pub async fn convert(
        &self,
        input: &Path,
        source_ext: &str,
        target: &str,
        out_dir: &Path,
    ) -> Result<PathBuf, GatewayError> {
        let args = soffice_args(input, source_ext, target, out_dir);
        info!(
            binary = %self.binary.display(),
            args = ?args,
            "running soffice"
        );

        let start = Instant::now();
        let child = Command::new(self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GatewayError::LocalConversionFailed {
                detail: format!("could not start {}: {e}", self.binary.display()),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(GatewayError::LocalConversionFailed {
                    detail: format!("waiting for soffice failed: {e}"),
                });
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "soffice timed out; killed");
                return Err(GatewayError::LocalConversionFailed {
                    detail: format!("soffice timed out after {:?}", self.timeout),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.is_empty() {
            debug!(stdout = %stdout, "soffice stdout");
        }
        if !stderr.is_empty() {
            debug!(stderr = %stderr, "soffice stderr");
        }

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            warn!(exit = %code, "soffice exited with failure");
            return Err(GatewayError::LocalConversionFailed {
                detail: format!(
                    "exit status {code}: {}",
                    tail_chars(stderr.trim_end(), STDERR_TAIL_CHARS)
                ),
            });
        }

        let produced = expected_output(input, target, out_dir);
        if !tokio::fs::try_exists(&produced).await.unwrap_or(false) {
            return Err(GatewayError::OutputArtifactMissing { path: produced });
        }

        info!(
            output = %produced.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "soffice conversion complete"
        );
        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lossy(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn filter_table() {
        assert_eq!(output_filter("docx"), "docx:MS Word 2007 XML");
        assert_eq!(output_filter("xlsx"), "xlsx:Calc MS Excel 2007 XML");
        assert_eq!(output_filter("pptx"), "pptx:Impress MS PowerPoint 2007 XML");
        assert_eq!(output_filter("pdf"), "pdf");
        assert_eq!(output_filter("odt"), "odt");
    }

    #[test]
    fn input_filter_only_for_pdf_sources() {
        assert_eq!(input_filter("pdf", "docx"), Some("writer_pdf_import"));
        assert_eq!(input_filter("pdf", "xlsx"), Some("calc_pdf_import"));
        assert_eq!(input_filter("pdf", "pptx"), Some("impress_pdf_import"));
        assert_eq!(input_filter("pdf", "ppt"), Some("impress_pdf_import"));
        assert_eq!(input_filter("pdf", "odt"), None);
        assert_eq!(input_filter("docx", "pdf"), None);
    }

    #[test]
    fn args_without_input_filter() {
        let args = soffice_args(
            Path::new("/w/input.docx"),
            "docx",
            "pdf",
            Path::new("/w"),
        );
        assert_eq!(
            lossy(&args),
            [
                "--headless",
                "--nologo",
                "--nolockcheck",
                "--norestore",
                "--convert-to",
                "pdf",
                "--outdir",
                "/w",
                "/w/input.docx",
            ]
        );
    }

    #[test]
    fn pdf_import_filter_precedes_convert_to() {
        let args = lossy(&soffice_args(
            Path::new("/w/input.pdf"),
            "pdf",
            "docx",
            Path::new("/w"),
        ));
        let infilter = args
            .iter()
            .position(|a| a == "--infilter=writer_pdf_import")
            .unwrap();
        let convert_to = args.iter().position(|a| a == "--convert-to").unwrap();
        assert_eq!(infilter + 1, convert_to);
        assert_eq!(args[convert_to + 1], "docx:MS Word 2007 XML");
    }

    #[test]
    fn args_are_deterministic() {
        let a = soffice_args(Path::new("/w/input.pdf"), "pdf", "pptx", Path::new("/w"));
        let b = soffice_args(Path::new("/w/input.pdf"), "pdf", "pptx", Path::new("/w"));
        assert_eq!(a, b);
    }

    #[test]
    fn expected_output_replaces_extension() {
        assert_eq!(
            expected_output(Path::new("/w/input.pdf"), "docx", Path::new("/w")),
            PathBuf::from("/w/input.docx")
        );
    }

    #[test]
    fn tail_keeps_last_chars() {
        assert_eq!(tail_chars("short", 10), "short");
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("ééééé", 2), "éé");
        let long = format!("{}END", "x".repeat(2000));
        let tail = tail_chars(&long, STDERR_TAIL_CHARS);
        assert_eq!(tail.chars().count(), STDERR_TAIL_CHARS);
        assert!(tail.ends_with("END"));
    }

    #[tokio::test]
    async fn missing_binary_is_a_conversion_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("input.docx");
        std::fs::write(&input, b"x").unwrap();
        let driver = LocalDriver::new(
            Path::new("/nonexistent/soffice-binary"),
            Duration::from_secs(5),
        );
        let err = driver
            .convert(&input, "docx", "pdf", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::LocalConversionFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn overrunning_soffice_is_killed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("finished");
        let binary = dir.path().join("soffice");
        std::fs::write(
            &binary,
            format!("#!/bin/sh\nsleep 1\ntouch '{}'\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        let input = dir.path().join("input.docx");
        std::fs::write(&input, b"x").unwrap();

        let driver = LocalDriver::new(&binary, Duration::from_millis(200));
        let start = Instant::now();
        let err = driver
            .convert(&input, "docx", "pdf", dir.path())
            .await
            .unwrap_err();
        assert!(start.elapsed() < Duration::from_millis(900));
        match err {
            GatewayError::LocalConversionFailed { detail } => {
                assert!(detail.contains("timed out after 200ms"), "{detail}");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "soffice kept running after the timeout");
    }
}
