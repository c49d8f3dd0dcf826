use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::reply::{self, ConsoleNotifier};
use crate::app::{AppContext, CrawlError, Result};
use crate::crawl::CrawlService;
use crate::domain::{JobKey, ScrapeRequest};

/// A parsed chat command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Help,
    Search(String),
    MissingDomain,
    Cancel,
    Status,
    Quit,
    Unknown,
}

/// One input line: an optional `@key` prefix followed by a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellLine {
    pub key: Option<String>,
    pub command: ShellCommand,
}

pub fn parse_line(line: &str) -> ShellLine {
    let mut rest = line.trim();
    let mut key = None;

    if let Some(tagged) = rest.strip_prefix('@') {
        let (k, tail) = tagged.split_once(char::is_whitespace).unwrap_or((tagged, ""));
        if !k.is_empty() {
            key = Some(k.to_string());
        }
        rest = tail.trim();
    }

    let rest = rest.trim_start_matches('/');
    let (word, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let arg = arg.trim();

    let command = match word.to_lowercase().as_str() {
        "help" | "hi" | "menu" | "start" | "hello" => ShellCommand::Help,
        "search" if arg.is_empty() => ShellCommand::MissingDomain,
        "search" => ShellCommand::Search(arg.to_string()),
        "cancel" => ShellCommand::Cancel,
        "status" => ShellCommand::Status,
        "quit" | "exit" => ShellCommand::Quit,
        _ => ShellCommand::Unknown,
    };

    ShellLine { key, command }
}

/// Apply a command for `key`, returning the immediate reply if there is one.
///
/// Queue positions and outcomes arrive later through the notifier.
pub fn handle(service: &CrawlService, key: &JobKey, command: &ShellCommand) -> Option<String> {
    match command {
        ShellCommand::Help => Some(reply::HELP.to_string()),
        ShellCommand::MissingDomain => Some(reply::MISSING_DOMAIN.to_string()),
        ShellCommand::Unknown => Some(reply::UNRECOGNIZED.to_string()),
        ShellCommand::Quit => None,
        ShellCommand::Search(input) => {
            let request = match ScrapeRequest::parse_domain(input) {
                Ok(request) => request,
                Err(e) => return Some(reply::invalid_domain(&e.to_string())),
            };
            match service.submit(key.clone(), request) {
                Ok(accepted) => {
                    info!(
                        "Accepted job {} for {} at position {}",
                        accepted.job_id, key, accepted.position
                    );
                    None
                }
                Err(CrawlError::AlreadyActive(_)) => Some(reply::STILL_PROCESSING.to_string()),
                Err(e) => Some(reply::failed(&e.to_string())),
            }
        }
        ShellCommand::Cancel => {
            if service.cancel(key) {
                Some(reply::CANCELLING.to_string())
            } else {
                Some(reply::NOTHING_TO_CANCEL.to_string())
            }
        }
        ShellCommand::Status => Some(match service.poll_position(key) {
            Some(0) => reply::PROCESSING.to_string(),
            Some(position) => reply::queued(position),
            None => reply::IDLE.to_string(),
        }),
    }
}

/// Search every term, one browser at a time, and wait for all reports.
///
/// Ctrl+C cancels everything and waits for the running job to unwind.
pub async fn crawl(ctx: &AppContext, notifier: &ConsoleNotifier, terms: &[String]) -> Result<()> {
    let service = &ctx.service;
    service.start_reaper();

    let mut submitted = 0;
    for input in terms {
        let request = match ScrapeRequest::parse_domain(input) {
            Ok(request) => request,
            Err(e) => {
                notifier.say(input, &reply::invalid_domain(&e.to_string()));
                continue;
            }
        };

        let key = JobKey::new(request.term.clone());
        match service.submit(key.clone(), request) {
            Ok(_) => submitted += 1,
            Err(CrawlError::AlreadyActive(_)) => {
                warn!("Skipping duplicate term {}", key);
            }
            Err(e) => return Err(e),
        }
    }

    if submitted == 0 {
        println!("Nothing to crawl");
        return Ok(());
    }

    println!("Crawling {} domains...", submitted);
    wait_or_cancel(service).await;
    service.shutdown();
    Ok(())
}

/// Read chat-style commands from stdin until EOF or `quit`.
pub async fn shell(ctx: &AppContext, notifier: &ConsoleNotifier, default_key: &str) -> Result<()> {
    let service = &ctx.service;
    service.start_reaper();

    notifier.say(default_key, reply::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let parsed = parse_line(&line);
        if parsed.command == ShellCommand::Quit {
            break;
        }

        let key = JobKey::new(parsed.key.as_deref().unwrap_or(default_key));
        if let Some(text) = handle(service, &key, &parsed.command) {
            notifier.say(key.as_str(), &text);
        }
    }

    if !service.is_idle() {
        println!("Waiting for remaining jobs (Ctrl+C to cancel)...");
        wait_or_cancel(service).await;
    }
    service.shutdown();
    Ok(())
}

async fn wait_or_cancel(service: &CrawlService) {
    tokio::select! {
        _ = service.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            let cancelled = service.cancel_all();
            println!("Cancelling {} jobs...", cancelled);
            service.wait_idle().await;
        }
    }
}
