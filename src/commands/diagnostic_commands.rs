use super::Output;
use crate::api::client::WebApi;
use crate::card;
use crate::diagnostics::{CheckOutcome, DiagnosticLog, DiagnosticReport, DiagnosticRunner};
use crate::error::AppResult;
use crate::scanner::resolver;
use crate::AppState;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Runs the account checks, printing each log entry as it is written.
pub async fn check(state: &AppState, out: Output, no_sdk: bool) -> AppResult<DiagnosticReport> {
    let api: Arc<dyn WebApi> = state.client.clone();
    let mut runner = DiagnosticRunner::new(api, Arc::clone(&state.tokens));
    if !no_sdk {
        runner = runner.with_sdk(state.sdk_factory());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            if !out.is_json() {
                out.entry(&entry);
            }
        }
    });

    let log = DiagnosticLog::with_sink(tx);
    let result = runner.run(&log).await;
    drop(log);
    if let Err(e) = printer.await {
        log::warn!("Log printer failed: {}", e);
    }

    let report = result?;
    out.value(&report, || summary(&report));
    Ok(report)
}

fn summary(report: &DiagnosticReport) -> String {
    let describe = |outcome: &CheckOutcome| match outcome {
        CheckOutcome::Passed => "ok".to_string(),
        CheckOutcome::NonPremiumEvidence => "forbidden (non-premium)".to_string(),
        CheckOutcome::Failed { reason } => format!("failed ({})", reason),
    };
    format!(
        "\nToken: {}\nProfile: {}\nPlayer API: {}\nDevices: {} ({} found)\nPremium: {}",
        report.token_preview,
        describe(&report.profile_check),
        describe(&report.player_check),
        describe(&report.devices_check),
        report.devices.len(),
        if report.premium { "yes" } else { "no" }
    )
}

pub fn resolve(text: &str, out: Output) -> AppResult<()> {
    let track = resolver::resolve(text)?;
    out.value(&track, || {
        format!("Mystery Track #{}\n{}", track.short_label(), track.uri)
    });
    Ok(())
}

pub fn card(state: &AppState, track_url: &str, out: Output) -> AppResult<()> {
    let link = card::card_link(&state.config.card_base_url, track_url)?;
    out.value(&link, || link.url.clone());
    Ok(())
}
