//! `warden`: run one ledger-driven team session for a task.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use warden::exit_codes;
use warden::io::completion::OpenAiCompatClient;
use warden::io::config::{ConfigFlags, load_config};
use warden::io::console::{Console, ConsoleStyle};
use warden::io::human_input::StdinInput;
use warden::io::sandbox::LocalSandbox;
use warden::orchestrator::SessionOutcome;
use warden::session::{Collaborators, confinement_root, run_session};

#[derive(Parser)]
#[command(
    name = "warden",
    version,
    about = "Ledger-driven team orchestrator with human approval gates and confined file access"
)]
struct Cli {
    /// The task for the team to complete.
    task: String,

    /// Enable human oversight, file security and the termination phrase.
    #[arg(long)]
    secure: bool,

    /// Insert human approval turns before code execution, file and web access.
    #[arg(long)]
    enable_human_oversight: bool,

    /// Confine file access to the confinement root.
    #[arg(long)]
    enable_file_security: bool,

    /// End the session when a participant says TERMINATE.
    #[arg(long)]
    enable_terminate: bool,

    /// Frame each message with a boxed header.
    #[arg(long)]
    rich: bool,

    /// Config file; a missing file means defaults.
    #[arg(long, default_value = "warden.toml")]
    config: PathBuf,

    #[arg(long)]
    max_turns: Option<u32>,

    #[arg(long)]
    max_stalls: Option<u32>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(exit_codes::INVALID as u8)
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    config.apply_flags(&ConfigFlags {
        secure: cli.secure,
        enable_human_oversight: cli.enable_human_oversight,
        enable_file_security: cli.enable_file_security,
        enable_terminate: cli.enable_terminate,
        max_turns: cli.max_turns,
        max_stalls: cli.max_stalls,
    });
    config.validate()?;
    warden::logging::init(&config.logging)?;

    let root = confinement_root(&config)?;
    let collaborators = Collaborators {
        client: Arc::new(OpenAiCompatClient::from_config(&config.model)?),
        input: Arc::new(StdinInput::spawn()?),
        sandbox: Arc::new(LocalSandbox::new(root, &config.sandbox)),
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling session");
            on_signal.cancel();
        }
    });

    let console = Console::new(if cli.rich {
        ConsoleStyle::Rich
    } else {
        ConsoleStyle::Plain
    });
    let outcome = run_session(&config, &collaborators, &cli.task, cancel, |message| {
        console.print_message(message);
    })
    .await?;

    print_summary(&outcome);
    let code = exit_codes::for_state(outcome.state);
    Ok(u8::try_from(code).unwrap_or(1))
}

fn print_summary(outcome: &SessionOutcome) {
    println!();
    println!(
        "session {} after {} turns ({} consecutive stalls)",
        outcome.state, outcome.turns, outcome.stalls
    );
    if let Some(answer) = &outcome.final_answer {
        println!("\nFinal answer:\n{}", answer.trim_end());
    }
    if let Some(violation) = &outcome.violation {
        println!(
            "\nSecurity violation by {}: access to {} was refused.",
            violation.participant,
            violation.path.display()
        );
        println!("Instruction: {}", violation.instruction);
        println!("Do not continue this session.");
    }
}
