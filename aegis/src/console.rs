//! Operator console
//!
//! Line-oriented front end for `aegis run`. Commands go to the coordinator
//! through its handle; triage events are printed as they arrive and the
//! queue is reprinted whenever it changes.

use std::fmt::Write as _;
use std::str::FromStr;

use colored::{ColoredString, Colorize};
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::briefing::{BriefingState, BriefingTicketState, LiveRiskState};
use crate::coordinator::{CoordinatorError, CoordinatorHandle, DashboardSnapshot, TriageEvent};
use crate::dispatch::{DispatchError, DispatchOutcome};
use crate::domain::{AlertId, RiskLevel};

/// A parsed operator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Queue,
    Select(AlertId),
    Dispatch(AlertId),
    Brief,
    Sop(String),
    Clear,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let (cmd, rest) = match input.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (input, ""),
        };

        let require_id = |name: &str| {
            if rest.is_empty() {
                Err(format!("Usage: {} <alert-id>", name))
            } else {
                Ok(AlertId::new(rest))
            }
        };

        match cmd.to_lowercase().as_str() {
            "help" | "h" | "?" => Ok(Self::Help),
            "queue" | "q" | "ls" => Ok(Self::Queue),
            "select" | "s" => require_id("select").map(Self::Select),
            "dispatch" | "d" => require_id("dispatch").map(Self::Dispatch),
            "brief" | "b" => Ok(Self::Brief),
            "sop" => Ok(Self::Sop(rest.to_string())),
            "clear" | "c" => Ok(Self::Clear),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("Unknown command: {}", other)),
        }
    }
}

/// What to do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleResult {
    Continue(String),
    Quit,
}

/// Interactive operator console
pub struct Console {
    handle: CoordinatorHandle,
}

impl Console {
    pub fn new(handle: CoordinatorHandle) -> Self {
        Self { handle }
    }

    /// Run until `quit`, end of input, or the coordinator stops
    pub async fn run(self) -> Result<()> {
        let mut events = self.handle.subscribe_events();
        let mut lines = spawn_reader();

        print_welcome();
        println!("{}", render_queue(&self.handle.snapshot().await?));

        loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else {
                        debug!("run: input closed");
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let result = match line.parse::<ConsoleCommand>() {
                        Ok(cmd) => self.execute(cmd).await?,
                        Err(e) => ConsoleResult::Continue(format!("{} {}", "?".yellow(), e)),
                    };
                    match result {
                        ConsoleResult::Continue(text) => {
                            if !text.is_empty() {
                                println!("{}", text);
                            }
                        }
                        ConsoleResult::Quit => break,
                    }
                }
                event = events.recv() => match event {
                    Ok(TriageEvent::QueueChanged(_)) => {
                        println!("{}", render_queue(&self.handle.snapshot().await?));
                    }
                    Ok(event) => {
                        if let Some(text) = render_event(&event) {
                            println!("{}", text);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Console lagged behind triage events");
                        println!("{}", render_queue(&self.handle.snapshot().await?));
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("run: coordinator stopped");
                        break;
                    }
                },
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Execute one command against the coordinator
    ///
    /// Operator-level failures (unknown alert, rejected briefing, store
    /// error) become console text; only a dead coordinator is an error.
    pub async fn execute(&self, cmd: ConsoleCommand) -> Result<ConsoleResult> {
        debug!(?cmd, "execute: called");
        let text = match cmd {
            ConsoleCommand::Help => help_text(),
            ConsoleCommand::Queue => render_queue(&self.handle.snapshot().await?),
            ConsoleCommand::Select(id) => match self.handle.select(&id).await {
                Ok(()) => render_selection(&self.handle.snapshot().await?),
                Err(e) => coordinator_failure(e)?,
            },
            ConsoleCommand::Dispatch(id) => match self.handle.dispatch(&id).await {
                Ok(DispatchOutcome::Dispatched) => format!("{} Dispatched {}", "✓".green(), id),
                Ok(DispatchOutcome::Conflict(conflict)) => {
                    format!("{} {}: {}", "-".dimmed(), id, conflict)
                }
                Err(DispatchError::ChannelClosed) => return Err(eyre::eyre!("Coordinator channel closed")),
                Err(e) => format!("{} {} (alert remains pending)", "✗".red(), e),
            },
            ConsoleCommand::Brief => match self.handle.request_briefing().await {
                Ok(BriefingTicketState::Sent) => "Briefing requested".dimmed().to_string(),
                Ok(BriefingTicketState::AwaitingLiveRisk) => {
                    "Briefing queued until live risk resolves".dimmed().to_string()
                }
                Err(e) => coordinator_failure(e)?,
            },
            ConsoleCommand::Sop(query) => match self.handle.standard_procedure(&query).await {
                Ok(sop) => format!("{}\n{}", "Standard procedure:".bright_cyan(), sop),
                Err(e) => coordinator_failure(e)?,
            },
            ConsoleCommand::Clear => {
                self.handle.clear_selection().await?;
                "Selection cleared".dimmed().to_string()
            }
            ConsoleCommand::Quit => return Ok(ConsoleResult::Quit),
        };
        Ok(ConsoleResult::Continue(text))
    }
}

fn coordinator_failure(e: CoordinatorError) -> Result<String> {
    match e {
        CoordinatorError::ChannelClosed => Err(eyre::eyre!("Coordinator channel closed")),
        e => Ok(format!("{} {}", "✗".red(), e)),
    }
}

/// Read lines on a dedicated thread; readline blocks
fn spawn_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                warn!(error = %e, "Failed to initialize readline");
                return;
            }
        };
        loop {
            match rl.readline(&format!("{} ", ">".bright_green())) {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.trim());
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    warn!(error = %e, "Readline error");
                    break;
                }
            }
        }
    });
    rx
}

fn print_welcome() {
    println!();
    println!("{}", "Aegis Command Center".bright_cyan().bold());
    println!("Type {} for help, {} to quit", "help".yellow(), "quit".yellow());
    println!();
}

fn help_text() -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "Available Commands:".bright_cyan());
    for (cmd, desc) in [
        ("queue", "Show the triage queue"),
        ("select <id>", "Select an alert and load its live risk"),
        ("dispatch <id>", "Dispatch responders to an alert"),
        ("brief", "Generate a briefing for the selected alert"),
        ("sop <query>", "Look up a standard operating procedure"),
        ("clear", "Clear the selection"),
        ("quit", "Exit the console"),
    ] {
        let _ = writeln!(out, "  {:16} {}", cmd.yellow(), desc);
    }
    out
}

fn level_label(level: Option<RiskLevel>) -> ColoredString {
    let text = level.map(|l| l.to_string()).unwrap_or_else(|| "UNSET".to_string());
    let text = format!("{:<6}", text);
    match level {
        Some(RiskLevel::High) => text.red().bold(),
        Some(RiskLevel::Medium) => text.yellow(),
        Some(RiskLevel::Low) => text.green(),
        Some(RiskLevel::Error) | None => text.dimmed(),
    }
}

/// The queue as printed after every change
pub fn render_queue(snapshot: &DashboardSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}  feed {}  {} active",
        "Triage queue".bright_cyan().bold(),
        snapshot.clock.format("%H:%M:%S"),
        snapshot.feed,
        snapshot.entries.len()
    );

    if snapshot.entries.is_empty() {
        let _ = write!(out, "  {}", "No active alerts".dimmed());
        return out;
    }

    let selected = snapshot.selection.as_ref().map(|s| s.id());
    for (i, entry) in snapshot.entries.iter().enumerate() {
        let alert = &entry.alert;
        let marker = if selected == Some(entry.id()) { ">" } else { " " };
        let staged = if snapshot.is_staged(entry.id()) { " [dispatching]" } else { "" };
        let _ = write!(
            out,
            "{}{:>3}. {} {} {:<18} ({:.4}, {:.4}) {} / {}{}",
            marker,
            i + 1,
            level_label(alert.risk_level),
            entry.id(),
            alert.alert_type.to_string(),
            alert.latitude,
            alert.longitude,
            entry.reporter.display_name_or_unknown(),
            entry.reporter.vulnerability,
            staged
        );
        if i + 1 < snapshot.entries.len() {
            out.push('\n');
        }
    }
    out
}

/// The dispatch panel for the current selection
pub fn render_selection(snapshot: &DashboardSnapshot) -> String {
    let Some(view) = snapshot.selection.as_ref() else {
        return "No alert selected".dimmed().to_string();
    };
    let alert = &view.entry.alert;

    let mut out = String::new();
    let _ = writeln!(out, "{} {}", "Alert".bright_cyan().bold(), view.id().short());
    let _ = writeln!(out, "  Type:      {}", alert.alert_type);
    let _ = writeln!(
        out,
        "  Reporter:  {} ({})",
        view.entry.reporter.display_name_or_unknown(),
        view.entry.reporter.vulnerability
    );
    let _ = writeln!(out, "  Location:  ({:.4}, {:.4})", alert.latitude, alert.longitude);
    if !alert.details.is_empty() {
        let _ = writeln!(out, "  Details:   {}", alert.details);
    }
    let _ = writeln!(out, "  Static:    {} {}", level_label(alert.risk_level), alert.risk_reason);
    let live = match &view.live_risk {
        LiveRiskState::Idle => "-".dimmed().to_string(),
        LiveRiskState::Loading => "loading...".dimmed().to_string(),
        LiveRiskState::Ready(a) => format!("{} {}", level_label(Some(a.level)), a.reason),
    };
    let _ = write!(out, "  Live:      {}", live);
    out
}

/// One-line rendering of a triage event; None for events shown elsewhere
pub fn render_event(event: &TriageEvent) -> Option<String> {
    match event {
        TriageEvent::QueueChanged(_) | TriageEvent::Dispatched(_) => None,
        TriageEvent::SelectionChanged(Some(_)) => None,
        TriageEvent::SelectionChanged(None) => Some("Selection cleared".dimmed().to_string()),
        TriageEvent::LiveRiskUpdated { id, assessment } => Some(format!(
            "Live risk for {}: {} {}",
            id.short(),
            level_label(Some(assessment.level)),
            assessment.reason
        )),
        TriageEvent::BriefingUpdated { id, state } => match state {
            BriefingState::Idle | BriefingState::InFlight => None,
            BriefingState::Ready(text) => Some(format!(
                "{} {}\n{}",
                "Briefing for".bright_cyan(),
                id.short(),
                text
            )),
            BriefingState::Failed(message) => {
                Some(format!("{} Briefing for {} failed: {}", "✗".red(), id.short(), message))
            }
        },
        TriageEvent::DispatchFailed { id, message } => {
            Some(format!("{} Dispatch of {} failed: {}", "✗".red(), id, message))
        }
        TriageEvent::FeedStatusChanged(status) => Some(format!("{} {}", "Feed".bright_cyan(), status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::coordinator::{CoordRequest, Coordinator};
    use crate::domain::{Alert, AlertType, ReporterProfile, TriageEntry, VulnerabilityStatus};
    use crate::geo::HeadlessMapProvider;
    use crate::queue::QueueOp;
    use crate::risk::client::mock::MockRiskClient;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    #[test]
    fn test_parse_commands() {
        assert_eq!("queue".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Queue);
        assert_eq!(
            "select  a1 ".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Select(AlertId::new("a1"))
        );
        assert_eq!(
            "DISPATCH a1".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Dispatch(AlertId::new("a1"))
        );
        assert_eq!(
            "sop flood evacuation".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Sop("flood evacuation".to_string())
        );
        assert_eq!("quit".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert!("select".parse::<ConsoleCommand>().unwrap_err().contains("Usage"));
        assert!("launch a1".parse::<ConsoleCommand>().unwrap_err().contains("Unknown"));
    }

    #[test]
    fn test_render_event_skips_queue_changes() {
        assert!(render_event(&TriageEvent::QueueChanged(Default::default())).is_none());
        let text = render_event(&TriageEvent::DispatchFailed {
            id: AlertId::new("a1"),
            message: "store down".to_string(),
        })
        .unwrap();
        assert!(text.contains("store down"));
    }

    async fn console_with(entries: Vec<TriageEntry>) -> (Console, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let map = HeadlessMapProvider::new();
        let coord = Coordinator::new(&Config::default(), store.clone(), Arc::new(MockRiskClient::new()), &map).unwrap();
        let handle = coord.handle();
        tokio::spawn(coord.run());

        for e in &entries {
            store.insert_alert(e.alert.clone());
        }
        handle
            .sender()
            .send(CoordRequest::Ingest(entries.into_iter().map(QueueOp::Upsert).collect()))
            .await
            .unwrap();
        (Console::new(handle), store)
    }

    fn entry(id: &str) -> TriageEntry {
        TriageEntry::new(
            Alert::new(id, "u1", AlertType::Medical, 13.08, 80.27, Utc.timestamp_opt(1, 0).unwrap())
                .with_risk(RiskLevel::High, "elderly reporter"),
            ReporterProfile::new("Priya", VulnerabilityStatus::Elderly),
        )
    }

    fn text(result: ConsoleResult) -> String {
        match result {
            ConsoleResult::Continue(text) => text,
            ConsoleResult::Quit => panic!("unexpected quit"),
        }
    }

    #[tokio::test]
    async fn test_queue_and_select() {
        let (console, _store) = console_with(vec![entry("alert-one")]).await;

        let queue = text(console.execute(ConsoleCommand::Queue).await.unwrap());
        assert!(queue.contains("alert-one"));
        assert!(queue.contains("Priya"));

        let panel = text(console.execute(ConsoleCommand::Select(AlertId::new("alert-one"))).await.unwrap());
        assert!(panel.contains("MEDICAL"));
        assert!(panel.contains("elderly reporter"));

        let missing = text(console.execute(ConsoleCommand::Select(AlertId::new("nope"))).await.unwrap());
        assert!(missing.contains("not found"));
    }

    #[tokio::test]
    async fn test_dispatch_reports_outcome() {
        let (console, store) = console_with(vec![entry("a1")]).await;

        let first = text(console.execute(ConsoleCommand::Dispatch(AlertId::new("a1"))).await.unwrap());
        assert!(first.contains("Dispatched a1"));
        assert!(store.alert(&AlertId::new("a1")).unwrap().status.is_terminal());

        let again = text(console.execute(ConsoleCommand::Dispatch(AlertId::new("a1"))).await.unwrap());
        assert!(again.contains("already dispatched"));
    }

    #[tokio::test]
    async fn test_brief_without_selection_is_reported() {
        let (console, _store) = console_with(vec![]).await;
        let reply = text(console.execute(ConsoleCommand::Brief).await.unwrap());
        assert!(reply.contains("no alert selected"));
        assert_eq!(console.execute(ConsoleCommand::Quit).await.unwrap(), ConsoleResult::Quit);
    }
}
