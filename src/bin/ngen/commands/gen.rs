use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command};

use ngen::core::shell::Shell;
use ngen::ops::{self, GenOptions};
use ngen::{CliError, CliResult};

pub fn cli() -> Command {
    Command::new("gen")
        .about("Generate ninja files in the given build directory")
        .arg(
            Arg::new("out_dir")
                .required(true)
                .value_name("OUT_DIR")
                .help("The build output directory, relative to the source root"),
        )
        .arg(
            Arg::new("root")
                .long("root")
                .value_name("DIR")
                .help("Source root directory (defaults to the current directory)"),
        )
        .arg(
            Arg::new("dotfile")
                .long("dotfile")
                .value_name("FILE")
                .help("Use this file instead of <root>/.gn"),
        )
        .arg(
            Arg::new("args")
                .long("args")
                .value_name("ASSIGNMENTS")
                .help("Build argument overrides; persisted into args.gn"),
        )
        .arg(
            Arg::new("root-target")
                .long("root-target")
                .value_name("LABEL")
                .help("Override the root target label"),
        )
        .arg(
            Arg::new("root-pattern")
                .long("root-pattern")
                .value_name("PATTERN")
                .action(ArgAction::Append)
                .help("Limit generation roots to targets matching this pattern"),
        )
        .arg(
            Arg::new("add-export-compile-commands")
                .long("add-export-compile-commands")
                .value_name("PATTERN")
                .action(ArgAction::Append)
                .help("Additional export_compile_commands pattern"),
        )
        .arg(
            Arg::new("script-executable")
                .long("script-executable")
                .value_name("PATH")
                .help("Interpreter for action scripts"),
        )
        .arg(
            Arg::new("fail-on-unused-args")
                .long("fail-on-unused-args")
                .action(ArgAction::SetTrue)
                .help("Treat unused build argument overrides as errors"),
        )
        .arg(
            Arg::new("export-rust-project")
                .long("export-rust-project")
                .action(ArgAction::SetTrue)
                .help("Also write rust-project.json for rust-analyzer"),
        )
        .arg(
            Arg::new("regeneration")
                .long("regeneration")
                .action(ArgAction::SetTrue)
                .hide(true)
                .help("Set on self-invocations from ninja"),
        )
        .arg(
            Arg::new("tracelog")
                .long("tracelog")
                .value_name("FILE")
                .help("Write a JSON timing trace to this file"),
        )
        .arg(
            Arg::new("threads")
                .short('j')
                .long("threads")
                .value_name("N")
                .help("Number of worker threads"),
        )
        .arg(
            Arg::new("time")
                .long("time")
                .action(ArgAction::SetTrue)
                .help("Print a timing summary"),
        )
}

pub fn exec(args: &ArgMatches, global: &ArgMatches, shell: &mut Shell) -> CliResult {
    let num_workers = match args.get_one::<String>("threads") {
        Some(n) => Some(
            n.parse::<usize>()
                .map_err(|_| CliError::new(anyhow::anyhow!("--threads expects a number"), 2))?,
        ),
        None => None,
    };

    let options = GenOptions {
        out_dir: args
            .get_one::<String>("out_dir")
            .expect("required arg")
            .clone(),
        root: args.get_one::<String>("root").map(PathBuf::from),
        dotfile: args.get_one::<String>("dotfile").map(PathBuf::from),
        args: args.get_one::<String>("args").cloned(),
        quiet: global.get_flag("quiet"),
        verbose: global.get_flag("verbose"),
        fail_on_unused_args: args.get_flag("fail-on-unused-args"),
        root_target: args.get_one::<String>("root-target").cloned(),
        root_patterns: args
            .get_many::<String>("root-pattern")
            .map(|v| v.cloned().collect())
            .unwrap_or_default(),
        add_export_compile_commands: args
            .get_many::<String>("add-export-compile-commands")
            .map(|v| v.cloned().collect())
            .unwrap_or_default(),
        script_executable: args.get_one::<String>("script-executable").map(PathBuf::from),
        regeneration: args.get_flag("regeneration"),
        export_rust_project: args.get_flag("export-rust-project"),
        tracelog: args.get_one::<String>("tracelog").map(PathBuf::from),
        num_workers,
    };

    let stats = ops::gen(&options, shell)?;
    ops::print_summary(&stats, shell)?;
    if args.get_flag("time") {
        shell.status("Timing", format!("{}ms total", stats.elapsed_ms))?;
    }
    Ok(())
}
