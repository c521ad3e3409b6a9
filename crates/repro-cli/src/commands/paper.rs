use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use repro_pipe::{PaperOutcome, Pipeline, RunOptions};

use super::{build_context, TreeArgs};

#[derive(Args, Debug)]
pub struct PaperArgs {
    #[command(flatten)]
    pub tree: TreeArgs,
    /// Output root (default `<root>/runs`).
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run(args: &PaperArgs) -> Result<(), Box<dyn Error>> {
    let (root, config) = args.tree.load()?;
    let ctx = build_context(root, &config, args.out.clone())?;
    match Pipeline::new(ctx, RunOptions::default()).assemble_paper()? {
        PaperOutcome::Skipped => println!("no paper directory; nothing to build"),
        PaperOutcome::AlreadyBuilt => println!("paper already built"),
        PaperOutcome::Built {
            exit_code,
            reproduced,
            original,
            warnings,
        } => {
            println!("document compiler exit={exit_code}");
            if let Some(path) = reproduced {
                println!("reproduced: {}", path.display());
            }
            if let Some(path) = original {
                println!("original:   {}", path.display());
            }
            for warning in warnings {
                eprintln!("warning: {warning}");
            }
        }
    }
    Ok(())
}
