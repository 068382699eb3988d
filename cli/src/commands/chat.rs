use anyhow::{Result, bail};
use serde::Serialize;
use std::io::{self, BufRead, Write};

use ada_core::chat::{ChatSession, ChatTurn};
use ada_core::reconcile::Outcome;
use ada_core::remote::RemoteError;
use ada_core::session::Session;
use ada_core::sync::Syncer;

use super::helpers::print_issues;

const LOGIN_HINT: &str = "Not authorized. Run `ada login <token>` or set ADA_TOKEN";

#[derive(Serialize)]
struct OutcomeOutput<'a> {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_id: Option<&'a str>,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_id: Option<i64>,
}

#[derive(Serialize)]
struct TurnOutput<'a> {
    message: &'a str,
    conversation_id: Option<&'a str>,
    model_used: Option<&'a str>,
    summary: String,
    outcomes: Vec<OutcomeOutput<'a>>,
    issues: Vec<String>,
    warnings: &'a [String],
}

fn describe(outcome: Outcome) -> (&'static str, Option<i64>) {
    match outcome {
        Outcome::Skipped { local_id } => ("skipped", Some(local_id)),
        Outcome::Materialized { local_id } => ("materialized", Some(local_id)),
        Outcome::Synthesized { local_id } => ("synthesized", Some(local_id)),
        Outcome::Inserted { local_id } => ("inserted", Some(local_id)),
        Outcome::ProfileUpdated => ("profile_updated", None),
        Outcome::Dropped => ("dropped", None),
        Outcome::Rejected => ("rejected", None),
    }
}

fn print_turn(turn: &ChatTurn, json: bool) -> Result<()> {
    let report = &turn.report;
    if json {
        let output = TurnOutput {
            message: &turn.message,
            conversation_id: turn.conversation_id.as_deref(),
            model_used: turn.model_used.as_deref(),
            summary: report.summary(),
            outcomes: report
                .outcomes
                .iter()
                .map(|o| {
                    let (outcome, local_id) = describe(o.outcome);
                    OutcomeOutput {
                        kind: o.kind.as_str(),
                        remote_id: o.remote_id.as_deref(),
                        outcome,
                        local_id,
                    }
                })
                .collect(),
            issues: report.issues.iter().map(ToString::to_string).collect(),
            warnings: &report.warnings,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", turn.message);
    if !report.outcomes.is_empty() {
        eprintln!("[{}]", report.summary());
    }
    for warning in &report.warnings {
        eprintln!("Warning: {warning}");
    }
    print_issues(&report.issues);
    if report.unauthorized {
        eprintln!("{LOGIN_HINT}");
    }
    Ok(())
}

async fn send(chat: &ChatSession, text: &str, json: bool) -> Result<()> {
    match chat.send(text).await {
        Ok(turn) => print_turn(&turn, json),
        Err(RemoteError::Unauthorized) => bail!(LOGIN_HINT),
        Err(e) => Err(e.into()),
    }
}

/// One turn when `message` is given, otherwise a line-by-line conversation on stdin.
pub(crate) async fn cmd_chat(
    chat: &ChatSession,
    message: Option<String>,
    new_conversation: bool,
    json: bool,
) -> Result<()> {
    if new_conversation {
        chat.reset_conversation().await?;
    }

    if let Some(message) = message {
        return send(chat, &message, json).await;
    }

    let stdin = io::stdin();
    loop {
        eprint!("> ");
        io::stderr().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "exit" | "quit") {
            break;
        }
        match chat.send(text).await {
            Ok(turn) => print_turn(&turn, json)?,
            Err(RemoteError::Unauthorized) => bail!(LOGIN_HINT),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
    Ok(())
}

pub(crate) async fn cmd_sync(syncer: &Syncer, session: &Session, json: bool) -> Result<()> {
    let report = syncer.push_pending(session).await?;

    if json {
        let output = serde_json::json!({
            "pushed": report.pushed,
            "failed": report.failed,
            "issues": report.issues.iter().map(ToString::to_string).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if report.pushed == 0 && report.failed == 0 {
        println!("Nothing to sync");
    } else {
        println!("Synced {} record(s), {} failed", report.pushed, report.failed);
        print_issues(&report.issues);
    }

    if report.unauthorized {
        bail!(LOGIN_HINT);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_outcomes() {
        assert_eq!(describe(Outcome::Inserted { local_id: 4 }), ("inserted", Some(4)));
        assert_eq!(describe(Outcome::Skipped { local_id: 1 }), ("skipped", Some(1)));
        assert_eq!(describe(Outcome::Rejected), ("rejected", None));
    }
}
