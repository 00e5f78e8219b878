use clap::{Arg, ArgAction, Command};

use ngen::core::shell::{Shell, Verbosity};
use ngen::CliResult;

mod commands;

fn cli() -> Command {
    Command::new("ngen")
        .about("A meta-build system that generates Ninja files")
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(true)
        .subcommand_required(true)
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Print nothing on success"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Print extra status information"),
        )
        .subcommand(commands::gen::cli())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = match cli().try_get_matches() {
        Ok(matches) => matches,
        Err(err) => {
            let _ = err.print();
            std::process::exit(if err.use_stderr() { 2 } else { 0 });
        }
    };

    let verbosity = if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };
    let mut shell = Shell::new(verbosity);

    let result: CliResult = match matches.subcommand() {
        Some(("gen", sub_matches)) => commands::gen::exec(sub_matches, &matches, &mut shell),
        _ => unreachable!("subcommand required"),
    };

    if let Err(err) = result {
        if let Some(error) = err.error {
            let _ = shell.error(&error);
        }
        std::process::exit(err.exit_code);
    }
}
