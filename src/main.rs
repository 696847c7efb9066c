use anyhow::Result;
use clap::Parser;
use versed::{
    cli::{AppContext, Cli, Commands},
    core::{facade::Facade, handlers},
    infra::{config, logging},
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        compact: cli.compact,
    };

    match cli.command {
        Commands::Init(args) => config::init(args, &ctx),
        Commands::Completions(args) => versed::completion::run(args),
        command => {
            let settings = config::load_config(cli.config.as_deref())?;
            logging::init(&settings.log_dir);
            let facade = Facade::new(settings);
            let code = handlers::run(command, &facade, &ctx)?;
            std::process::exit(code);
        }
    }
}
