//! Comparison renderings between a reference document and its reproduction.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use repro_core::errors::{ErrorInfo, ReproError};
use repro_core::NodeId;
use repro_exec::{shell_quote, Invocation};
use tracing::{debug, warn};

use crate::context::RunContext;

/// Outcome of comparing one reproduced document with its reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub document: String,
    /// Reference and reproduction concatenated page by page.
    pub merged: Option<PathBuf>,
    /// Both documents rasterized next to each other with captions.
    pub side_by_side: Option<PathBuf>,
    pub errors: Vec<ReproError>,
}

fn compare_error(code: &str, message: impl Into<String>, document: &Path) -> ReproError {
    ReproError::Compare(
        ErrorInfo::new(code, message).with_context("document", document.display().to_string()),
    )
}

fn non_empty(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.len() > 0).unwrap_or(false)
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Writes `<stem>_compare.pdf` and `<stem>_side_by_side.pdf` into
/// `dest_plots`. Failures leave an `.ERROR.txt` marker instead and are
/// returned in [`Comparison::errors`]; they never abort distribution.
pub fn compare_document(
    ctx: &RunContext,
    node: &NodeId,
    reference: &Path,
    reproduced: &Path,
    dest_plots: &Path,
) -> Comparison {
    let stem = file_stem(reproduced);
    let mut comparison = Comparison {
        document: reproduced
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        merged: None,
        side_by_side: None,
        errors: Vec::new(),
    };

    let merged = dest_plots.join(format!("{stem}_compare.pdf"));
    let merged_marker = dest_plots.join(format!("{stem}_compare.ERROR.txt"));
    match merge_pages(ctx, node, reference, reproduced, &merged, &stem) {
        Ok(path) => {
            let _ = fs::remove_file(&merged_marker);
            comparison.merged = Some(path);
        }
        Err(err) => {
            warn!(node = %node, error = %err, "page merge failed");
            write_marker(&merged_marker, &err);
            comparison.errors.push(err);
        }
    }

    let composed = dest_plots.join(format!("{stem}_side_by_side.pdf"));
    let composed_marker = dest_plots.join(format!("{stem}_side_by_side.ERROR.txt"));
    match side_by_side(ctx, node, reference, reproduced, &composed, &stem) {
        Ok(path) => {
            let _ = fs::remove_file(&composed_marker);
            comparison.side_by_side = Some(path);
        }
        Err(err) => {
            warn!(node = %node, error = %err, "side-by-side rendering failed");
            write_marker(&composed_marker, &err);
            comparison.errors.push(err);
        }
    }
    comparison
}

fn write_marker(path: &Path, err: &ReproError) {
    if let Err(io) = fs::write(path, format!("{err}\n")) {
        warn!(marker = %path.display(), error = %io, "could not write error marker");
    }
}

/// Concatenates reference and reproduction, retrying until the output exists
/// and is non-empty.
fn merge_pages(
    ctx: &RunContext,
    node: &NodeId,
    reference: &Path,
    reproduced: &Path,
    out: &Path,
    stem: &str,
) -> Result<PathBuf, ReproError> {
    let settings = ctx.config().compare();
    let attempts = settings.merge_attempts.max(1);
    let command = format!(
        "{} {} {} {}",
        shell_quote(&ctx.config().tools().pdf_merge),
        shell_quote(display(reference)),
        shell_quote(display(reproduced)),
        shell_quote(display(out)),
    );
    let mut last = String::new();
    for attempt in 1..=attempts {
        let invocation = Invocation::new(
            node.as_str(),
            command.as_str(),
            ctx.node_dir(node),
            ctx.logs().merge(node, stem, attempt),
        );
        match ctx.executor().run_streamed(&invocation) {
            Ok(result) if result.success() && non_empty(out) => return Ok(out.to_path_buf()),
            Ok(result) => {
                last = format!("exit={} log={}", result.exit_code, result.log.display());
            }
            Err(err) => last = err.to_string(),
        }
        debug!(node = %node, attempt, "page merge attempt failed");
        if attempt < attempts {
            thread::sleep(Duration::from_millis(settings.retry_delay_ms));
        }
    }
    Err(compare_error(
        "repro.compare_merge",
        format!("page merge failed after {attempts} attempts: {last}"),
        reproduced,
    ))
}

fn side_by_side(
    ctx: &RunContext,
    node: &NodeId,
    reference: &Path,
    reproduced: &Path,
    out: &Path,
    stem: &str,
) -> Result<PathBuf, ReproError> {
    let scratch = tempfile::Builder::new()
        .prefix("sbs_")
        .tempdir()
        .map_err(|err| compare_error("repro.compare_scratch", err.to_string(), reproduced))?;
    let left = rasterize(ctx, node, reference, scratch.path(), stem, "left")?;
    let right = rasterize(ctx, node, reproduced, scratch.path(), stem, "right")?;

    let settings = ctx.config().compare();
    let svg = compose_side_by_side_svg(
        &Panel {
            href: "left.png",
            size: left,
            caption: &settings.left_caption,
        },
        &Panel {
            href: "right.png",
            size: right,
            caption: &settings.right_caption,
        },
        settings.dpi,
    );
    let svg_path = scratch.path().join("side_by_side.svg");
    fs::write(&svg_path, svg)
        .map_err(|err| compare_error("repro.compare_svg", err.to_string(), &svg_path))?;

    let command = format!(
        "{} -f pdf -o {} {}",
        shell_quote(&ctx.config().tools().svg_to_pdf),
        shell_quote(display(out)),
        shell_quote("side_by_side.svg"),
    );
    let invocation = Invocation::new(
        node.as_str(),
        command,
        scratch.path(),
        ctx.logs().compose(node, stem),
    );
    let result = ctx.executor().run_streamed(&invocation)?;
    if !result.success() || !non_empty(out) {
        return Err(compare_error(
            "repro.compare_compose",
            format!(
                "svg conversion failed: exit={} log={}",
                result.exit_code,
                result.log.display()
            ),
            reproduced,
        ));
    }
    Ok(out.to_path_buf())
}

/// Rasterizes the first page of `pdf` into `<scratch>/<side>.png` and
/// returns its pixel size.
fn rasterize(
    ctx: &RunContext,
    node: &NodeId,
    pdf: &Path,
    scratch: &Path,
    stem: &str,
    side: &str,
) -> Result<(u32, u32), ReproError> {
    let prefix = scratch.join(side);
    let command = format!(
        "{} -r {} -png -singlefile {} {}",
        shell_quote(&ctx.config().tools().rasterizer),
        ctx.config().compare().dpi,
        shell_quote(display(pdf)),
        shell_quote(display(&prefix)),
    );
    let invocation = Invocation::new(
        node.as_str(),
        command,
        scratch,
        ctx.logs().rasterize(node, stem, side),
    );
    let result = ctx.executor().run_streamed(&invocation)?;
    if !result.success() {
        return Err(compare_error(
            "repro.compare_rasterize",
            format!(
                "rasterizer failed: exit={} log={}",
                result.exit_code,
                result.log.display()
            ),
            pdf,
        ));
    }
    let png = prefix.with_extension("png");
    let bytes = fs::read(&png)
        .map_err(|err| compare_error("repro.compare_png", err.to_string(), &png))?;
    png_dimensions(&bytes)
        .ok_or_else(|| compare_error("repro.compare_png", "not a PNG image", &png))
}

/// Width and height from a PNG's IHDR chunk.
pub fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    const SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
    if bytes.len() < 24 || &bytes[..8] != SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    Some((width, height))
}

/// One half of a side-by-side page.
#[derive(Debug, Clone, Copy)]
pub struct Panel<'a> {
    pub href: &'a str,
    pub size: (u32, u32),
    pub caption: &'a str,
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&apos;")
}

/// Lays two raster images next to each other on a white page padded to the
/// taller one, with a caption band above each. The page keeps the physical
/// size the images had at `dpi`.
pub fn compose_side_by_side_svg(left: &Panel<'_>, right: &Panel<'_>, dpi: u32) -> String {
    let dpi = dpi.max(1) as f64;
    let font = dpi / 72.0 * 12.0;
    let band = font * 2.0;
    let (lw, lh) = left.size;
    let (rw, rh) = right.size;
    let width = (lw + rw) as f64;
    let height = band + lh.max(rh) as f64;
    let to_pt = |px: f64| px * 72.0 / dpi;

    let mut parts = vec![format!(
        "<svg xmlns='http://www.w3.org/2000/svg' xmlns:xlink='http://www.w3.org/1999/xlink' \
         width='{:.2}pt' height='{:.2}pt' viewBox='0 0 {w} {h}'>",
        to_pt(width),
        to_pt(height),
        w = width,
        h = height
    )];
    parts.push(format!(
        "<rect x='0' y='0' width='{width}' height='{height}' fill='#ffffff' />"
    ));
    for (offset, panel) in [(0.0, left), (lw as f64, right)] {
        let (pw, ph) = panel.size;
        parts.push(format!(
            "<text x='{:.2}' y='{:.2}' font-family='sans-serif' font-size='{:.2}' \
             text-anchor='middle'>{}</text>",
            offset + pw as f64 / 2.0,
            band * 0.7,
            font,
            escape_xml(panel.caption)
        ));
        parts.push(format!(
            "<image x='{offset}' y='{band}' width='{pw}' height='{ph}' href='{href}' \
             xlink:href='{href}' />",
            href = escape_xml(panel.href)
        ));
    }
    parts.push("</svg>".into());
    parts.join("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR".to_vec();
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 2, 0, 0, 0]);
        bytes
    }

    #[test]
    fn reads_png_dimensions() {
        assert_eq!(png_dimensions(&png_header(640, 480)), Some((640, 480)));
        assert_eq!(png_dimensions(b"%PDF-1.5 not an image at all"), None);
    }

    #[test]
    fn side_by_side_pads_to_taller_panel() {
        let svg = compose_side_by_side_svg(
            &Panel {
                href: "left.png",
                size: (100, 50),
                caption: "paper plot",
            },
            &Panel {
                href: "right.png",
                size: (120, 80),
                caption: "reproduced <plot>",
            },
            72,
        );
        assert!(svg.starts_with("<svg "));
        assert!(svg.ends_with("</svg>"));
        // 72 dpi: 12px caption font, 24px band, 80px tallest panel.
        assert!(svg.contains("viewBox='0 0 220 104'"));
        assert!(svg.contains("width='220.00pt' height='104.00pt'"));
        assert!(svg.contains("<image x='100' y='24' width='120' height='80'"));
        assert!(svg.contains("reproduced &lt;plot&gt;"));
    }
}
