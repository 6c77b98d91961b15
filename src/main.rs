use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use colored::*;
use log::{debug, error, info};

mod config;
mod error;
mod health;
mod inventory;
mod mail;
mod remote;
mod report;
mod run;

use error::ConfigError;
use mail::{Dispatcher, SmtpDispatcher};
use report::{ReportMeta, ReportTemplate};
use run::DispatchStatus;

/// Retrieve drive health data from ESXi hosts and e-mail a report
#[derive(Parser)]
#[command(name = "esxi-getsmart")]
#[command(about = "Retrieve S.M.A.R.T. data for NVMe, SATA SSD and HDD drives from ESXi hosts and mail a report")]
#[command(version)]
struct Cli {
    /// Directory for the run log, like '/home/user/logs/'
    #[arg(short, long, value_name = "DIR")]
    log: PathBuf,
    /// Inventory CSV file, like '/home/user/hosts.csv'
    #[arg(short, long, value_name = "FILE")]
    csv: PathBuf,
    /// ENV file with credentials and SMTP settings, like '/home/user/.env'
    #[arg(short, long, value_name = "FILE")]
    env: PathBuf,
    /// Report template, like '/home/user/report.html.j2'
    #[arg(short, long, value_name = "FILE")]
    rep: PathBuf,
    /// Print the collected drive records as JSON
    #[arg(long)]
    json: bool,
    /// Log at debug level
    #[arg(long)]
    debug: bool,
}

fn init_logging(log_dir: &Path, date: &str, debug: bool) -> Result<PathBuf, ConfigError> {
    if !log_dir.is_dir() {
        return Err(ConfigError::NotFound {
            what: "log directory",
            path: log_dir.to_path_buf(),
        });
    }
    let path = log_dir.join(format!("{date}-esxi-getsmart-log.txt"));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| ConfigError::LogFile {
            path: path.clone(),
            source,
        })?;

    let log_level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .filter_module("russh", log::LevelFilter::Warn)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(path)
}

fn config_failure(e: ConfigError) -> ! {
    error!("{e}");
    eprintln!("{} {}", "Configuration error:".red().bold(), e);
    std::process::exit(2);
}

#[tokio::main]
async fn main() {
    let started = Instant::now();
    let cli = Cli::parse();
    let now = chrono::Local::now();
    let date = now.format("%Y%m%d").to_string();
    let stamp = now.format("%Y%m%d-%H%M%S");

    println!("{} {}", "Starting esxi-getsmart at".blue().bold(), stamp);
    println!("  Log path: {}", cli.log.display());
    println!("  CSV path: {}", cli.csv.display());
    println!("  ENV path: {}", cli.env.display());
    println!("  REP path: {}", cli.rep.display());

    let log_path = init_logging(&cli.log, &date, cli.debug).unwrap_or_else(|e| config_failure(e));
    info!("Starting esxi-getsmart at {}", stamp);

    // Everything is validated before the first host is contacted
    let settings = config::load_settings(&cli.env).unwrap_or_else(|e| config_failure(e));
    info!("Loaded ENV file for organization {}", settings.org);
    debug!("Loaded settings: {:#?}", settings);
    let hosts = inventory::load_hosts(&cli.csv).unwrap_or_else(|e| config_failure(e));
    info!("Loaded the CSV file: {} host(s)", hosts.len());
    let template = ReportTemplate::load(&cli.rep).unwrap_or_else(|e| config_failure(e));

    let reporter = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    let meta = ReportMeta {
        org: settings.org.clone(),
        date,
        reporter,
    };

    let connector = remote::SshConnector::new(&settings);
    let dispatcher = settings.mail.clone().map(SmtpDispatcher::new);
    let outcome = run::execute(
        &connector,
        &hosts,
        &template,
        &meta,
        dispatcher.as_ref().map(|d| d as &dyn Dispatcher),
    )
    .await;

    if cli.json {
        match serde_json::to_string_pretty(&outcome.hosts) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize JSON output: {}", e),
        }
    }

    let drives: usize = outcome.hosts.iter().map(|h| h.drives.len()).sum();
    let unhealthy = outcome
        .hosts
        .iter()
        .flat_map(|h| &h.drives)
        .filter(|d| !d.is_healthy())
        .count();
    let no_data = outcome.hosts.iter().filter(|h| h.drives.is_empty()).count();
    println!(
        "\n{} {} host(s), {} drive(s) read, {} not OK, {} host(s) without data",
        "Summary:".blue().bold(),
        outcome.hosts.len().to_string().cyan(),
        drives.to_string().green(),
        if unhealthy > 0 { unhealthy.to_string().red().bold() } else { unhealthy.to_string().green() },
        if no_data > 0 { no_data.to_string().red().bold() } else { no_data.to_string().green() },
    );

    if let Err(e) = &outcome.report {
        eprintln!("{} {}", "ERROR".red().bold(), e);
    }
    match &outcome.dispatch {
        DispatchStatus::Sent => println!("{} Report sent", "SUCCESS".green().bold()),
        DispatchStatus::Disabled => println!("{} USE_SMTP is not 'yes'. Mail not sent.", "[TEST MODE]".yellow().bold()),
        DispatchStatus::Skipped => eprintln!("{} Report not sent", "ERROR".red().bold()),
        DispatchStatus::Failed(e) => eprintln!("{} Failed to send report: {}", "ERROR".red().bold(), e),
    }

    let finished = chrono::Local::now().format("%Y%m%d-%H%M%S");
    info!("Finished esxi-getsmart at {}", finished);
    info!("Total execution time: {:?}", started.elapsed());
    println!("{} {}", "Finished esxi-getsmart at".blue().bold(), finished);
    println!("Total execution time: {:?} (log: {})", started.elapsed(), log_path.display());

    let code = outcome.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
}
