use std::error::Error;

use clap::Args;

use super::TreeArgs;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub tree: TreeArgs,
}

pub fn run(args: &ConfigArgs) -> Result<(), Box<dyn Error>> {
    let (_, config) = args.tree.load()?;
    config.validate()?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}
