use basecache_core::{
    fingerprint_images, show_record, verify_cache, CacheError, ConfigOverrides, ExecutionOutcome,
    RecordRequest, VerifyRequest,
};
use clap::Parser;
use color_eyre::Result;
use serde_json::json;

mod cli;
mod output;
mod style;

use cli::{BasecacheCli, CommandGroupCli, VerifyArgs};
use output::OutputOptions;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = BasecacheCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let name = command_name(&cli.command);
    let outcome = dispatch(&cli).unwrap_or_else(|err| error_outcome(&err));
    let opts = OutputOptions {
        quiet: cli.quiet,
        json: cli.json,
        no_color: cli.no_color,
    };
    let code = output::emit_output(&opts, name, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("basecache={level},basecache_cli={level},basecache_core={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn command_name(command: &CommandGroupCli) -> &'static str {
    match command {
        CommandGroupCli::Verify(_) => "verify",
        CommandGroupCli::Fingerprint(_) => "fingerprint",
        CommandGroupCli::Record(_) => "record",
    }
}

fn dispatch(cli: &BasecacheCli) -> anyhow::Result<ExecutionOutcome> {
    match &cli.command {
        CommandGroupCli::Verify(args) => verify_cache(&verify_request_from_args(cli, args)),
        CommandGroupCli::Fingerprint(args) => Ok(fingerprint_images(&args.image_ids)),
        CommandGroupCli::Record(args) => {
            let request = RecordRequest {
                config_file: cli.config.clone(),
                base_file: args.base_file.clone(),
            };
            show_record(&request)
        }
    }
}

/// Outcome for an error that escaped a command.
fn error_outcome(err: &anyhow::Error) -> ExecutionOutcome {
    let cause = err.downcast_ref::<CacheError>();
    let details = json!({ "code": cause.map(CacheError::code) });
    match cause {
        Some(cause) if cause.is_user_error() => {
            ExecutionOutcome::user_error(format!("{err:#}"), details)
        }
        _ => ExecutionOutcome::failure(format!("{err:#}"), details),
    }
}

fn verify_request_from_args(cli: &BasecacheCli, args: &VerifyArgs) -> VerifyRequest {
    let checksum_base_images = match (args.checksum, args.no_checksum) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };
    VerifyRequest {
        config_file: cli.config.clone(),
        overrides: ConfigOverrides {
            instances_path: args.instances_path.clone(),
            host: args.host.clone(),
            checksum_base_images,
            remove_unused_base_images: args.no_remove.then_some(false),
        },
        instances: args.instances.clone(),
    }
}
