use std::error::Error;

use clap::Args;
use repro_core::serde::to_canonical_json_bytes;
use repro_core::NodeKind;
use repro_pipe::discovery::discover;

use super::{build_context, TreeArgs};

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    #[command(flatten)]
    pub tree: TreeArgs,
    /// Emit the node list as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &DiscoverArgs) -> Result<(), Box<dyn Error>> {
    let (root, config) = args.tree.load()?;
    let ctx = build_context(root, &config, None)?;
    let nodes = discover(ctx.root(), ctx.config(), &[ctx.out_root().to_path_buf()])?;
    if args.json {
        let bytes = to_canonical_json_bytes(&nodes)?;
        print!("{}", String::from_utf8(bytes)?);
        return Ok(());
    }
    for (idx, node) in nodes.iter().enumerate() {
        let kind = match &node.kind {
            NodeKind::Standard => "standard".to_string(),
            NodeKind::CohortMember(cohort) => format!("cohort:{cohort}"),
            NodeKind::DeferredUntilCohortReady(cohort) => format!("deferred:{cohort}"),
        };
        println!("{:>3}  {:<70} {:<24} {}", idx + 1, node.id, kind, node.runner);
    }
    Ok(())
}
