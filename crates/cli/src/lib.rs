pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use wingdesk_core::AgentRole;

#[derive(Debug, Parser)]
#[command(
    name = "wingdesk",
    about = "Wingdesk operator CLI",
    long_about = "Inspect configuration, check ERP readiness, and talk to the storefront agents from a terminal.",
    after_help = "Examples:\n  wingdesk doctor --json\n  wingdesk config\n  wingdesk ask \"¿Qué ala me recomiendas para empezar?\""
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a wingdesk.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and check that the ERP accepts the configured credentials")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Send one message through triage and print the reply")]
    Ask {
        #[arg(help = "Customer message")]
        message: String,
        #[arg(long, value_enum, help = "Skip triage and talk to this agent directly")]
        agent: Option<AgentArg>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AgentArg {
    Sales,
    Operations,
}

impl From<AgentArg> for AgentRole {
    fn from(value: AgentArg) -> Self {
        match value {
            AgentArg::Sales => AgentRole::Sales,
            AgentArg::Operations => AgentRole::Operations,
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config;

    let result = match cli.command {
        Command::Config => commands::CommandResult {
            exit_code: 0,
            output: commands::config::run(config_path),
        },
        Command::Doctor { json } => commands::doctor::run(config_path, json),
        Command::Ask { message, agent } => {
            commands::ask::run(config_path, &message, agent.map(AgentRole::from))
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
