//! Unit command handlers: on, off, status, process, parse.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tabled::Tabled;

use exhaust_core::{
    Controller, FleetStatus, Group, MemoryEntry, ModuleId, ModuleStatus, ProcessSnapshot,
    RestoreOutcome, Tower, TurnOffAck, TurnOnAck, UnitId, UnitStatus,
};

use crate::cli::{GlobalOpts, OnArgs, StatusArgs, UnitArgs};
use crate::config;
use crate::error::CliError;
use crate::output::{self, or_dash};

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct MemoryRow {
    #[tabled(rename = "Unit")]
    id: String,
    #[tabled(rename = "Module")]
    module: String,
    #[tabled(rename = "Relay")]
    relay: u8,
    #[tabled(rename = "Command")]
    pending: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Expires")]
    expires: String,
    #[tabled(rename = "Left (min)")]
    remaining: String,
    #[tabled(rename = "Retries")]
    retries: u32,
    #[tabled(rename = "Last error")]
    last_error: String,
}

impl From<&MemoryEntry> for MemoryRow {
    fn from(m: &MemoryEntry) -> Self {
        let s = &m.state;
        Self {
            id: s.id.clone(),
            module: s.module_id.to_string(),
            relay: s.relay,
            pending: format!("{:?}", s.pending_command).to_lowercase(),
            status: format!("{:?}", s.process_status).to_lowercase(),
            expires: or_dash(s.expires_at.map(local_time)),
            remaining: or_dash(m.remaining_minutes),
            retries: s.retry_count,
            last_error: or_dash(s.last_error.as_deref()),
        }
    }
}

#[derive(Tabled)]
struct ModuleRow {
    #[tabled(rename = "Module")]
    module: String,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Health")]
    health: String,
    #[tabled(rename = "Error")]
    error: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl ModuleRow {
    fn new(module: ModuleId, status: &ModuleStatus) -> Self {
        Self {
            module: module.to_string(),
            host: status.host.clone(),
            health: if status.is_healthy() { "ok" } else { "failed" }.into(),
            error: match (&status.error_code, &status.error) {
                (Some(code), Some(e)) => format!("{code}: {e}"),
                (Some(code), None) => code.to_string(),
                (None, e) => or_dash(e.as_deref()),
            },
            updated: local_time(status.updated_at),
        }
    }
}

#[derive(Tabled)]
struct RestoreRow {
    #[tabled(rename = "Neighbour")]
    id: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

fn restore_row(id: &str, outcome: &RestoreOutcome) -> RestoreRow {
    let (name, detail) = match outcome {
        RestoreOutcome::Rearmed { expires_at, .. } => (
            "re-armed",
            expires_at.map_or_else(|| "no auto-off".into(), |at| format!("until {}", local_time(at))),
        ),
        RestoreOutcome::Skipped { remaining_minutes } => (
            "skipped",
            format!("{} min left", or_dash(*remaining_minutes)),
        ),
        RestoreOutcome::Failed { error } => ("failed", error.clone()),
    };
    RestoreRow {
        id: id.to_owned(),
        outcome: name.into(),
        detail,
    }
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

// ── Detail views ────────────────────────────────────────────────────

fn turn_on_detail(ack: &TurnOnAck) -> String {
    let mut lines = vec![
        format!("Unit:     {}", ack.id),
        format!("Module:   {} relay {}", ack.module_id, ack.relay),
        format!("Status:   {:?}", ack.process_status),
        format!(
            "Auto-off: {}",
            ack.expires_at
                .map_or_else(|| "never".into(), |at| format!("{} ({} min)", local_time(at), or_dash(ack.auto_off_minutes)))
        ),
    ];
    if let Some(ref e) = ack.error {
        lines.push(format!("Error:    {e}"));
    }
    lines.join("\n")
}

fn turn_off_detail(ack: &TurnOffAck) -> String {
    let mut lines = vec![
        format!("Unit:      {}", ack.id),
        format!("Power cut: {} relay {}", ack.power_module, ack.power_relay),
        format!("Status:    {:?}", ack.process_status),
    ];
    if let Some(ref e) = ack.error {
        lines.push(format!("Error:     {e}"));
    }
    if !ack.restore.is_empty() {
        let rows: Vec<RestoreRow> = ack.restore.iter().map(|(id, o)| restore_row(id, o)).collect();
        lines.push(String::new());
        lines.push(output::render_table(&rows));
    }
    lines.join("\n")
}

fn unit_detail(u: &UnitStatus) -> String {
    let mut lines = vec![
        format!("Unit:    {}", u.id),
        format!("Group:   {} (tower {}, final {})", u.group, u.tower, u.final_digit),
        format!("Module:  {} relay {}", u.module_id, u.relay),
        format!(
            "Health:  {}",
            u.module
                .as_ref()
                .map_or_else(|| "not probed".into(), |m| ModuleRow::new(u.module_id, m).health)
        ),
    ];
    match &u.memory {
        Some(m) => {
            let row = MemoryRow::from(m);
            lines.push(format!("State:   {} / {}", row.pending, row.status));
            lines.push(format!("Expires: {} ({} min left)", row.expires, row.remaining));
            if row.retries > 0 {
                lines.push(format!("Retries: {} (last error: {})", row.retries, row.last_error));
            }
        }
        None => lines.push("State:   idle".into()),
    }
    lines.join("\n")
}

fn fleet_detail(f: &FleetStatus) -> String {
    let modules: Vec<ModuleRow> = f.modules.iter().map(|(id, s)| ModuleRow::new(*id, s)).collect();
    let memory: Vec<MemoryRow> = f.memory.iter().map(MemoryRow::from).collect();
    let modules = if modules.is_empty() {
        "No module status yet (use --probe, or check `exhaust run`)".to_owned()
    } else {
        output::render_table(&modules)
    };
    let memory = if memory.is_empty() {
        "No active exhaust fans".to_owned()
    } else {
        output::render_table(&memory)
    };
    format!("{modules}\n\n{memory}")
}

fn process_detail(p: &ProcessSnapshot) -> String {
    let rows: Vec<MemoryRow> = p.memory.iter().map(MemoryRow::from).collect();
    let mut out = format!("Tracked: {}  (at {})", p.total, local_time(p.generated_at));
    if !rows.is_empty() {
        out.push('\n');
        out.push_str(&output::render_table(&rows));
    }
    out
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn turn_on(args: OnArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let runtime = config::runtime(global)?;
    let OnArgs { id, minutes } = args;
    let ack = Controller::oneshot(runtime, move |c| async move { c.turn_on(&id, minutes).await })
        .await?;

    let out = output::render_single(&global.output, &ack, turn_on_detail, |a| a.id.clone())?;
    output::print_output(&out, global.quiet);

    if ack.is_applied() {
        return Ok(());
    }
    Err(CliError::NotApplied {
        operation: "Turn-on".into(),
        message: ack.error.unwrap_or_else(|| "unknown device error".into()),
        id: ack.id,
    })
}

pub async fn turn_off(args: UnitArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let runtime = config::runtime(global)?;
    let UnitArgs { id } = args;
    let ack = Controller::oneshot(runtime, move |c| async move { c.turn_off(&id).await }).await?;

    let out = output::render_single(&global.output, &ack, turn_off_detail, |a| a.id.clone())?;
    output::print_output(&out, global.quiet);

    if ack.is_applied() {
        return Ok(());
    }
    Err(CliError::NotApplied {
        operation: "Turn-off".into(),
        message: ack.error.unwrap_or_else(|| "unknown device error".into()),
        id: ack.id,
    })
}

pub async fn status(args: StatusArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let controller = Controller::read_only(config::runtime(global)?)?;
    if args.probe {
        controller.refresh_modules().await;
    }

    let out = match args.id {
        Some(id) => {
            let unit = controller.status(&id).await?;
            output::render_single(&global.output, &unit, unit_detail, |u| u.id.clone())?
        }
        None => {
            let fleet = controller.all_modules_status().await;
            output::render_single(&global.output, &fleet, fleet_detail, |f| {
                f.memory
                    .iter()
                    .map(|m| m.state.id.clone())
                    .collect::<Vec<_>>()
                    .join("\n")
            })?
        }
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn process(global: &GlobalOpts) -> Result<(), CliError> {
    let controller = Controller::read_only(config::runtime(global)?)?;
    let snapshot = controller.process_status().await;

    let out = output::render_single(&global.output, &snapshot, process_detail, |p| {
        p.memory
            .iter()
            .map(|m| m.state.id.clone())
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Parse ───────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ParsedUnit {
    id: String,
    tower: Tower,
    #[serde(rename = "final")]
    final_digit: u8,
    group: Group,
    relay: u8,
    module_id: ModuleId,
    power_module: ModuleId,
    power_relay: u8,
}

impl From<UnitId> for ParsedUnit {
    fn from(u: UnitId) -> Self {
        Self {
            id: u.key(),
            tower: u.tower,
            final_digit: u.final_digit,
            group: u.group(),
            relay: u.relay(),
            module_id: u.module(),
            power_module: u.power_cut_module(),
            power_relay: u.tower.power_cut_relay(),
        }
    }
}

pub fn parse(args: &UnitArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let parsed = ParsedUnit::from(UnitId::parse(&args.id)?);

    let out = output::render_single(
        &global.output,
        &parsed,
        |p| {
            [
                format!("Unit:      {}", p.id),
                format!("Group:     {}", p.group),
                format!("Module:    {} relay {}", p.module_id, p.relay),
                format!("Power cut: {} relay {}", p.power_module, p.power_relay),
            ]
            .join("\n")
        },
        |p| p.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
