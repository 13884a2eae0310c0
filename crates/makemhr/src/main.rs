mod cli_args;

use clap::Parser;
use makemhr::pipeline::process_definition;
#[cfg(feature = "libmysofa")]
use makemhr::sofa::LibMySofaReader as Reader;
#[cfg(not(feature = "libmysofa"))]
use makemhr::sofa::UnsupportedSofaReader as Reader;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli_args::CliArgs::parse();
    let options = args.to_options();
    let path = process_definition(args.input.as_deref(), &options, &Reader)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}
