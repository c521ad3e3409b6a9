use std::env;
use std::error::Error;
use std::path::{Path, PathBuf};

use clap::Args;
use repro_core::serde::to_canonical_json_bytes;
use repro_core::{CompiledConfig, PipelineConfig};
use repro_pipe::discovery::discover;
use serde::Serialize;

use super::TreeArgs;

#[derive(Args, Debug)]
pub struct DoctorArgs {
    #[command(flatten)]
    pub tree: TreeArgs,
    /// Emit only JSON without additional context.
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: String,
    ok: bool,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    status: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(args: &DoctorArgs) -> Result<(), Box<dyn Error>> {
    let (root, config) = args.tree.load()?;
    let report = diagnose(&root, &config);
    let json = to_canonical_json_bytes(&report)?;
    let rendered = String::from_utf8(json)?;
    if args.quiet {
        print!("{rendered}");
    } else {
        println!("repro doctor status: {}", report.status);
        print!("{rendered}");
    }
    if report.status != "ok" {
        return Err("one or more checks failed".into());
    }
    Ok(())
}

fn diagnose(root: &Path, config: &PipelineConfig) -> DoctorReport {
    let mut checks = Vec::new();
    let tools = &config.tools;
    for (name, program) in [
        ("shell", &tools.shell),
        ("python", &tools.python),
        ("latex", &tools.latex),
        ("pdf_merge", &tools.pdf_merge),
        ("rasterizer", &tools.rasterizer),
        ("svg_to_pdf", &tools.svg_to_pdf),
    ] {
        checks.push(match find_program(program) {
            Some(path) => check(name, true, path.display().to_string()),
            None => check(name, false, format!("{program} not found on PATH")),
        });
    }

    match config.compile() {
        Ok(compiled) => {
            checks.push(check("config", true, "tables compile".into()));
            checks.push(check_nodes(root, &compiled));
        }
        Err(err) => checks.push(check("config", false, err.to_string())),
    }

    let paper = root.join(&config.paper.dir);
    let source = paper.join(&config.paper.source);
    checks.push(if source.is_file() {
        check("paper source", true, source.display().to_string())
    } else {
        check("paper source", false, format!("missing {}", source.display()))
    });

    let status = if checks.iter().all(|check| check.ok) {
        "ok"
    } else {
        "needs-attention"
    };
    DoctorReport {
        status: status.into(),
        checks,
    }
}

fn check(name: &str, ok: bool, detail: String) -> DoctorCheck {
    DoctorCheck {
        name: name.into(),
        ok,
        detail,
    }
}

fn check_nodes(root: &Path, config: &CompiledConfig) -> DoctorCheck {
    let out = root.join(&config.output().root);
    match discover(root, config, &[out]) {
        Ok(nodes) if nodes.is_empty() => check("experiments", false, "no runnable experiments".into()),
        Ok(nodes) => check("experiments", true, format!("{} runnable experiments", nodes.len())),
        Err(err) => check("experiments", false, err.to_string()),
    }
}

/// Resolves a program the way the shell would: paths are checked directly,
/// bare names are searched on `PATH`.
fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|full| full.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_programs_are_checked_directly() {
        assert_eq!(find_program("/bin/sh"), Some(PathBuf::from("/bin/sh")));
        assert_eq!(find_program("/definitely/not/here"), None);
    }

    #[test]
    fn empty_tree_needs_attention() {
        let temp = tempfile::tempdir().expect("temp");
        let report = diagnose(temp.path(), &PipelineConfig::default());
        assert_eq!(report.status, "needs-attention");
        let experiments = report
            .checks
            .iter()
            .find(|check| check.name == "experiments")
            .expect("experiments check");
        assert!(!experiments.ok);
    }
}
