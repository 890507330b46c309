mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::*;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "d2item=debug,d2item_cli=debug,info",
        _ => "d2item=trace,d2item_cli=trace,debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load()?;

    match cli.command {
        Commands::Decode {
            input,
            format,
            style,
            yaml,
            output,
        } => {
            let options = config.options(format.version, format.mode, style);
            commands::item::decode(&input, &options, yaml, output.as_deref())?;
        }

        Commands::Encode {
            input,
            output,
            format,
            style,
        } => {
            let options = config.options(format.version, format.mode, style);
            commands::item::encode(&input, &output, &options)?;
        }

        Commands::Convert {
            input,
            from,
            to,
            from_mode,
            to_mode,
            output,
            no_backup,
        } => {
            let target = commands::item::ConvertTarget {
                from,
                from_mode,
                to,
                to_mode: to_mode.unwrap_or(from_mode),
            };
            commands::item::convert(
                &input,
                &target,
                output.as_deref(),
                config.backup && !no_backup,
            )?;
        }

        Commands::Inspect { input, format } => {
            let options = config.options(format.version, format.mode, None);
            commands::item::inspect(&input, &options)?;
        }

        Commands::Edit {
            input,
            format,
            output,
            no_backup,
            op,
        } => {
            let options = config.options(format.version, format.mode, None);
            commands::edit::edit(
                &input,
                &options,
                &op,
                output.as_deref(),
                config.backup && !no_backup,
            )?;
        }

        Commands::Checksum {
            input,
            field,
            store,
        } => {
            commands::checksum::handle(&input, field, store)?;
        }

        Commands::Configure {
            version,
            mode,
            style,
            backup,
            show,
        } => {
            let changes = commands::configure::Changes {
                version,
                mode,
                style,
                backup,
            };
            commands::configure::handle(changes, show)?;
        }
    }

    Ok(())
}
