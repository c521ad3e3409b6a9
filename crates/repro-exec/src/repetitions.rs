use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use repro_core::config::{RepetitionConfig, RepetitionMode};
use repro_core::errors::{config_error, io_error, ReproError};
use tracing::info;

/// Rewrites `VAR=(...)` assignment lines in `text` to `VAR=(value)`.
///
/// Returns `None` when no line changed.
pub fn patch_repetition_line(
    text: &str,
    variable: &str,
    value: u32,
) -> Result<Option<String>, ReproError> {
    let pattern = format!(
        r"(?m)^(\s*{}\s*=\s*)\((?:[^)]*)\)(.*)$",
        regex::escape(variable)
    );
    let re = Regex::new(&pattern)
        .map_err(|err| config_error("repro.repetition_regex", err.to_string()))?;
    let replacement = format!("${{1}}({value})${{2}}");
    let patched = re.replace_all(text, replacement.as_str());
    if patched == text {
        Ok(None)
    } else {
        Ok(Some(patched.into_owned()))
    }
}

/// Applies a repetition count to the runner scripts of one node directory.
///
/// In [`RepetitionMode::Patch`] every configured script present in `dir` has
/// its assignment line rewritten in place; the returned list names the files
/// that changed. [`RepetitionMode::Env`] leaves the scripts untouched.
pub fn apply_repetitions(
    dir: &Path,
    config: &RepetitionConfig,
    value: u32,
) -> Result<Vec<PathBuf>, ReproError> {
    let mut patched = Vec::new();
    if config.mode == RepetitionMode::Env {
        return Ok(patched);
    }
    for script in &config.scripts {
        let path = dir.join(script);
        if !path.is_file() {
            continue;
        }
        let bytes = fs::read(&path).map_err(|err| io_error("repro.repetition_read", &path, err))?;
        let text = String::from_utf8_lossy(&bytes);
        if let Some(updated) = patch_repetition_line(&text, &config.variable, value)? {
            fs::write(&path, updated)
                .map_err(|err| io_error("repro.repetition_write", &path, err))?;
            info!(script = %path.display(), "adjusted {}=({value})", config.variable);
            patched.push(path);
        }
    }
    Ok(patched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_only_the_assignment_line() {
        let script = "#!/bin/bash\nNUM_OF_RUNS=(1 2 3) # runs\necho ${NUM_OF_RUNS[@]}\n";
        let patched = patch_repetition_line(script, "NUM_OF_RUNS", 25)
            .expect("regex")
            .expect("changed");
        assert_eq!(
            patched,
            "#!/bin/bash\nNUM_OF_RUNS=(25) # runs\necho ${NUM_OF_RUNS[@]}\n"
        );
    }

    #[test]
    fn keeps_leading_whitespace() {
        let patched = patch_repetition_line("  NUM_OF_RUNS = (10)\n", "NUM_OF_RUNS", 50)
            .expect("regex")
            .expect("changed");
        assert_eq!(patched, "  NUM_OF_RUNS = (50)\n");
    }

    #[test]
    fn unchanged_text_reports_none() {
        assert!(patch_repetition_line("RUNS=(3)\n", "NUM_OF_RUNS", 5)
            .expect("regex")
            .is_none());
        assert!(patch_repetition_line("NUM_OF_RUNS=(5)\n", "NUM_OF_RUNS", 5)
            .expect("regex")
            .is_none());
    }
}
