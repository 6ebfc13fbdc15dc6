//! Converge CLI entry point.

use clap::Parser;
use converge::cli::{commands, Cli, Commands, HookCommands};
use converge::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color || std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }

    init_tracing(cli.verbose, cli.quiet);

    // Auto-JSON for piped stdout so agents never scrape human output.
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use the verbosity flag.
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("converge=info"),
            2 => EnvFilter::new("converge=debug"),
            _ => EnvFilter::new("converge=trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let project_dir = commands::project_dir(cli.dir.as_ref())?;

    match &cli.command {
        Commands::Init => commands::init::execute(&project_dir, json),
        Commands::Snap(args) => commands::snap::execute(&project_dir, args, json),
        Commands::Log { limit, branch, all } => {
            commands::log::execute(&project_dir, *limit, branch.as_deref(), *all, json)
        }
        Commands::Status => commands::status::execute(&project_dir, json),
        Commands::Diff { cell_a, cell_b } => {
            commands::diff::execute(&project_dir, cell_a, cell_b, json)
        }
        Commands::Restore { cell } => commands::restore::execute(&project_dir, cell, json),
        Commands::Fork { name, switch } => {
            commands::fork::execute(&project_dir, name, *switch, json)
        }
        Commands::Switch { name } => commands::switch::execute(&project_dir, name, json),
        Commands::Branches => commands::branches::execute(&project_dir, json),
        Commands::Watch { debounce_ms } => commands::watch::execute(&project_dir, *debounce_ms),
        Commands::Eval { cell } => commands::eval::execute(&project_dir, cell, json),
        Commands::Hook { command } => match command {
            HookCommands::Complete(args) => {
                commands::hook::execute_complete(&project_dir, args, json)
            }
        },
    }
}
