use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use vkguard_api::{Handle, VulkanCommand, VulkanResponse};
use vkguard_core::{Diagnostic, LayerSettings, MessengerCreateInfo, Severity};
use vkguard_layers::{LayerChain, NullDriver};

/// One recorded API call. `response` is what the application saw when the
/// trace was captured; its created handles are remapped onto the handles the
/// replay produces.
#[derive(Debug, Deserialize)]
pub struct TraceEntry {
    pub command: VulkanCommand,
    #[serde(default)]
    pub response: Option<VulkanResponse>,
}

#[derive(Debug, Serialize)]
pub struct ReplayedDiagnostic {
    /// Index of the trace entry that produced it.
    pub call: usize,
    pub entry_point: &'static str,
    #[serde(flatten)]
    pub diagnostic: Diagnostic,
}

#[derive(Debug, Default, Serialize)]
pub struct ReplayOutcome {
    pub calls: usize,
    pub failed_calls: usize,
    pub diagnostics: Vec<ReplayedDiagnostic>,
}

impl ReplayOutcome {
    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.diagnostic.severity == severity)
            .count()
    }
}

pub fn load_trace(path: &Path) -> anyhow::Result<Vec<TraceEntry>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let entries = serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(entries)
}

pub fn run_replay(path: &Path, settings: LayerSettings) -> anyhow::Result<ReplayOutcome> {
    let trace = load_trace(path)?;
    replay(trace, settings)
}

/// Run `trace` through a layer chain over the null driver.
pub fn replay(trace: Vec<TraceEntry>, settings: LayerSettings) -> anyhow::Result<ReplayOutcome> {
    let driver = NullDriver::new();
    let chain = LayerChain::builder(driver).settings(settings).build()?;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    chain.create_debug_messenger(MessengerCreateInfo::new(move |d| sink.lock().push(d.clone())));

    let mut remap: HashMap<Handle, Handle> = HashMap::new();
    let mut outcome = ReplayOutcome::default();

    for (index, entry) in trace.into_iter().enumerate() {
        let mut cmd = entry.command;
        cmd.for_each_handle_mut(|_, handle| {
            if let Some(live) = remap.get(handle) {
                *handle = *live;
            }
        });
        let entry_point = cmd.entry_point();

        let resp = chain.call(cmd);
        outcome.calls += 1;
        if resp.is_error() {
            outcome.failed_calls += 1;
            tracing::debug!(call = index, "{} failed: {:?}", entry_point.name(), resp.result());
        }

        if let Some(recorded) = entry.response {
            let recorded = recorded.handles();
            let live = resp.handles();
            if recorded.len() != live.len() {
                tracing::warn!(
                    call = index,
                    "{}: trace recorded {} handle(s), replay produced {}",
                    entry_point.name(),
                    recorded.len(),
                    live.len()
                );
            }
            remap.extend(recorded.into_iter().zip(live));
        }

        outcome.diagnostics.extend(seen.lock().drain(..).map(|diagnostic| ReplayedDiagnostic {
            call: index,
            entry_point: entry_point.name(),
            diagnostic,
        }));
    }

    Ok(outcome)
}

// ── Output formatters ───────────────────────────────────────────────────────

pub fn print_pretty(outcome: &ReplayOutcome) {
    println!();
    println!("vkguard replay");
    println!("==============");
    println!();

    for replayed in &outcome.diagnostics {
        let (color_start, color_end) = match replayed.diagnostic.severity {
            Severity::Error => ("\x1b[31m", "\x1b[0m"),
            Severity::Warning => ("\x1b[33m", "\x1b[0m"),
            _ => ("\x1b[90m", "\x1b[0m"),
        };
        println!(
            "  {}#{:<5}{} {}",
            color_start, replayed.call, color_end, replayed.diagnostic
        );
    }
    if !outcome.diagnostics.is_empty() {
        println!();
    }

    println!("-------------------------------");
    println!(
        "  {} calls ({} failed), {} errors, {} warnings",
        outcome.calls,
        outcome.failed_calls,
        outcome.error_count(),
        outcome.count(Severity::Warning)
    );
    println!();
}

pub fn print_json(outcome: &ReplayOutcome) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}
