use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use gpoctl::commands::{Action, ActionContext, Command, Report};
use gpoctl::config::{ConfigLoader, ConfigOverrides, GpoConfig};
use gpoctl::error::{AppError, AppResult, CommandError};
use gpoctl::infrastructure::{AdConnection, GpoContext, SysvolShare};
use gpoctl::logging;

#[derive(Parser, Debug)]
#[command(name = "gpoctl", version)]
#[command(about = "Manage Group Policy Objects, their links and security filtering")]
struct Cli {
    /// DNS name of the domain
    #[arg(long, global = true)]
    domain: Option<String>,

    /// Domain controller to bind to
    #[arg(long, global = true)]
    domain_controller: Option<String>,

    /// Bind as this account instead of the current user
    #[arg(long, global = true, requires = "password")]
    username: Option<String>,

    #[arg(long, global = true, requires = "username")]
    password: Option<String>,

    /// TOML config file (defaults to gpoctl.toml beside the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results and errors as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            domain: self.domain.clone(),
            domain_controller: self.domain_controller.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_file(path);
    }
    let mut config = match loader.load() {
        Ok(config) => config,
        Err(e) => return fail(&e, cli.json),
    };
    config.apply_overrides(cli.overrides());

    let _guard = logging::init_logging(&config.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), command = ?cli.command, "gpoctl starting");

    match run(&cli.command, &config) {
        Ok(report) => match render(&report, cli.json) {
            Ok(text) => {
                println!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => fail(&e, cli.json),
        },
        Err(e) if e.is_benign() => {
            tracing::warn!(error = %e, "Nothing to do");
            if cli.json {
                print_json_error(&e);
            } else {
                println!("{}", e);
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e, cli.json),
    }
}

fn run(command: &Command, config: &GpoConfig) -> AppResult<Report> {
    let connection = AdConnection::connect(config)?;
    let sysvol = SysvolShare::new(connection.shell().clone());
    let ctx = ActionContext {
        gpo: GpoContext::new(&connection, &sysvol, connection.domain().clone()),
        acting_user: config.acting_user(),
    };
    command.execute(&ctx)
}

fn render(report: &Report, json: bool) -> AppResult<String> {
    if json {
        Ok(serde_json::to_string_pretty(report)?)
    } else {
        Ok(report.to_string())
    }
}

fn fail(error: &AppError, json: bool) -> ExitCode {
    tracing::error!(code = error.error_code(), error = %error, "Command failed");
    if json {
        print_json_error(error);
    } else {
        eprintln!("Error: {}", error);
    }
    ExitCode::FAILURE
}

fn print_json_error(error: &AppError) {
    match serde_json::to_string_pretty(&CommandError::from(error)) {
        Ok(text) => println!("{}", text),
        Err(_) => eprintln!("Error: {}", error),
    }
}
