//! One sequential pass over the inventory: query, parse, render, dispatch.

use colored::*;
use log::{error, info, warn};

use crate::error::{DispatchError, DriveError, ParseError, ReportError};
use crate::health::{self, DriveRecord};
use crate::inventory::{DriveSpec, Host};
use crate::mail::Dispatcher;
use crate::remote::{Connector, RemoteSession, command_for};
use crate::report::{HostReport, ReportMeta, ReportTemplate};

#[derive(Debug)]
pub enum DispatchStatus {
    Sent,
    /// USE_SMTP is not enabled.
    Disabled,
    /// Nothing to send because rendering failed.
    Skipped,
    Failed(DispatchError),
}

#[derive(Debug)]
pub struct RunOutcome {
    pub hosts: Vec<HostReport>,
    pub report: Result<String, ReportError>,
    pub dispatch: DispatchStatus,
}

impl RunOutcome {
    /// Per-host failures never change the exit code; only the final report does.
    pub fn exit_code(&self) -> i32 {
        match (&self.report, &self.dispatch) {
            (Err(_), _) | (_, DispatchStatus::Failed(_)) => 1,
            _ => 0,
        }
    }
}

pub fn subject(meta: &ReportMeta) -> String {
    format!("ESXi getsmart report for {} at {}", meta.org, meta.date)
}

pub async fn execute<C: Connector>(
    connector: &C,
    hosts: &[Host],
    template: &ReportTemplate,
    meta: &ReportMeta,
    dispatcher: Option<&dyn Dispatcher>,
) -> RunOutcome {
    let hosts = collect(connector, hosts).await;

    info!("Rendering the report");
    let report = template.render(meta, &hosts);
    let dispatch = match (&report, dispatcher) {
        (Err(e), _) => {
            error!("{e}");
            DispatchStatus::Skipped
        }
        (Ok(_), None) => DispatchStatus::Disabled,
        (Ok(body), Some(dispatcher)) => {
            info!("Sending the report");
            match dispatcher.send(&subject(meta), body).await {
                Ok(()) => DispatchStatus::Sent,
                Err(e) => {
                    error!("Report dispatch failed: {e}");
                    DispatchStatus::Failed(e)
                }
            }
        }
    };

    RunOutcome {
        hosts,
        report,
        dispatch,
    }
}

/// Queries every host in inventory order, one session at a time.
pub async fn collect<C: Connector>(connector: &C, hosts: &[Host]) -> Vec<HostReport> {
    let mut reports = Vec::with_capacity(hosts.len());
    for host in hosts {
        println!("{} {}", "Querying".blue().bold(), host.label().cyan());
        reports.push(collect_host(connector, host).await);
    }
    reports
}

pub async fn collect_host<C: Connector>(connector: &C, host: &Host) -> HostReport {
    let label = host.label();
    info!("Starting {} ({} drive(s))", label, host.drives.len());

    let mut session = match connector.connect(host).await {
        Ok(session) => session,
        Err(e) => {
            warn!("{label}: {e}; no data for this host");
            println!("  {} {}", "!".red().bold(), e.to_string().red());
            return HostReport {
                host: host.clone(),
                drives: Vec::new(),
                error: Some(e.to_string()),
            };
        }
    };
    info!("{label}: connected");

    let mut drives = Vec::new();
    let mut failures = Vec::new();
    for drive in &host.drives {
        match query_drive(&mut session, host, drive).await {
            Ok(record) => {
                info!("Command for {}, drive {} successful", label, drive.name);
                drives.push(record);
            }
            Err(e) => {
                warn!("Command for {}, drive {} unsuccessful: {}", label, drive.name, e);
                println!("  {} {}: {}", "!".yellow().bold(), drive.name, e.to_string().yellow());
                failures.push(format!("{}: {}", drive.name, e));
            }
        }
    }
    session.close().await;

    println!(
        "  {} {}/{} drive(s) read",
        "OK".green().bold(),
        drives.len(),
        host.drives.len()
    );
    HostReport {
        host: host.clone(),
        drives,
        error: (!failures.is_empty()).then(|| failures.join("; ")),
    }
}

async fn query_drive<S: RemoteSession>(
    session: &mut S,
    host: &Host,
    drive: &DriveSpec,
) -> Result<DriveRecord, DriveError> {
    let output = session.execute(&command_for(drive.class, &drive.name)).await?;
    if output.exit_status != 0 {
        return Err(ParseError::CommandStatus {
            drive: drive.name.clone(),
            status: output.exit_status,
            stderr: output.stderr.trim().to_string(),
        }
        .into());
    }
    Ok(health::parse(drive.class, &host.name, &drive.name, &output.stdout)?)
}
