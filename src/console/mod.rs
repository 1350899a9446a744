//! Terminal front-end for mediated sequence runs.
//!
//! [`TerminalAdvisor`] asks the operator what to do between steps using
//! `dialoguer` menus; [`SpinnerIndicator`] renders the running step as an
//! `indicatif` spinner fed by monitor signals.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use crate::catalog::AgentCatalog;
use crate::orchestrator::sequence_executor::{
    AfterFailure, AfterSuccess, Decision, ProgressIndicator, StepAdvisor, StepOutcome,
};

/// Prompts the operator on the controlling terminal.
///
/// Prompts run on the blocking pool. If the terminal cannot be used, a
/// successful step pauses the sequence and a failed one aborts it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalAdvisor;

impl StepAdvisor for TerminalAdvisor {
    fn after_success<'a>(
        &'a self,
        finished: &'a str,
        next: &'a str,
        catalog: &'a AgentCatalog,
    ) -> Decision<'a, AfterSuccess> {
        let finished = finished.to_owned();
        let next = next.to_owned();
        let names: Vec<String> = catalog.all().iter().map(|d| d.name.clone()).collect();

        Box::pin(async move {
            let prompt =
                tokio::task::spawn_blocking(move || prompt_after_success(&finished, &next, &names));
            match prompt.await {
                Ok(Ok(choice)) => choice,
                Ok(Err(err)) => {
                    warn!(%err, "decision prompt failed, pausing sequence");
                    AfterSuccess::Pause
                }
                Err(err) => {
                    warn!(%err, "decision prompt task failed, pausing sequence");
                    AfterSuccess::Pause
                }
            }
        })
    }

    fn after_failure<'a>(&'a self, failed: &'a str, error: &'a str) -> Decision<'a, AfterFailure> {
        let failed = failed.to_owned();
        let error = error.to_owned();

        Box::pin(async move {
            let prompt = tokio::task::spawn_blocking(move || prompt_after_failure(&failed, &error));
            match prompt.await {
                Ok(Ok(choice)) => choice,
                Ok(Err(err)) => {
                    warn!(%err, "recovery prompt failed, aborting sequence");
                    AfterFailure::Abort
                }
                Err(err) => {
                    warn!(%err, "recovery prompt task failed, aborting sequence");
                    AfterFailure::Abort
                }
            }
        })
    }
}

fn prompt_after_success(
    finished: &str,
    next: &str,
    names: &[String],
) -> Result<AfterSuccess, dialoguer::Error> {
    println!(
        "\n{} {} completed successfully",
        style("✓").green(),
        style(finished).bold()
    );
    println!("Next recommended: {}", style(next).cyan());

    let options = &[
        "Continue with sequence",
        "Switch to a different agent",
        "Pause and return",
    ];
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("What would you like to do next?")
        .items(options)
        .default(0)
        .interact()?;

    match selection {
        0 => Ok(AfterSuccess::Continue),
        1 => {
            let pick = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Which agent should run instead?")
                .items(names)
                .default(0)
                .interact()?;
            Ok(names
                .get(pick)
                .cloned()
                .map_or(AfterSuccess::Pause, AfterSuccess::Substitute))
        }
        _ => Ok(AfterSuccess::Pause),
    }
}

fn prompt_after_failure(failed: &str, error: &str) -> Result<AfterFailure, dialoguer::Error> {
    println!(
        "\n{} {} encountered an error:\n{}",
        style("✗").red(),
        style(failed).bold(),
        style(error).red()
    );

    let options = &[
        "Retry this agent",
        "Skip to next agent",
        "Launch recovery agent",
        "Stop sequence",
    ];
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("How would you like to handle this error?")
        .items(options)
        .default(0)
        .interact()?;

    Ok(match selection {
        0 => AfterFailure::Retry,
        1 => AfterFailure::Skip,
        2 => AfterFailure::Recover,
        _ => AfterFailure::Abort,
    })
}

/// One spinner per running step.
#[derive(Debug, Default)]
pub struct SpinnerIndicator {
    bar: Mutex<Option<ProgressBar>>,
}

impl SpinnerIndicator {
    /// A spinner with nothing running yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = guard.as_ref() {
            f(bar);
        }
    }
}

impl ProgressIndicator for SpinnerIndicator {
    fn start(&self, agent: &str) {
        let bar = ProgressBar::new_spinner();
        match ProgressStyle::default_spinner().template("{spinner} {prefix:.bold} {msg}") {
            Ok(spinner_style) => bar.set_style(spinner_style),
            Err(err) => warn!(%err, "invalid spinner template"),
        }
        bar.set_prefix(agent.to_owned());
        bar.set_message("initializing...");
        bar.enable_steady_tick(Duration::from_millis(100));

        let mut guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = guard.replace(bar) {
            previous.abandon();
        }
    }

    fn update(&self, _agent: &str, message: &str) {
        self.with_bar(|bar| bar.set_message(message.to_owned()));
    }

    fn finish(&self, agent: &str, outcome: &StepOutcome) {
        let mut guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(bar) = guard.take() else {
            return;
        };
        match outcome {
            StepOutcome::Completed => {
                bar.finish_with_message(format!("{} {agent} completed", style("✓").green()));
            }
            StepOutcome::Failed(error) => {
                bar.abandon_with_message(format!("{} {agent} failed: {error}", style("✗").red()));
            }
        }
    }
}
