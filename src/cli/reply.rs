use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::crawl::{JobRef, LogNotifier, Notifier};
use crate::domain::ScrapeRequest;
use crate::scraper::ReportArtifact;

pub const HELP: &str = "🤖 Ad Library Scraper\n\
─────────────────\n\
🔍 search domain.com\n\
⛔ cancel\n\
📍 status\n\
📙 help\n\
─────────────────\n\
⚡ Results in 1-2 mins";

pub const STARTED: &str =
    "🔍 Processing your request. This may take a minute...\n\n💡 Type 'cancel' anytime to stop the process";
pub const PROCESSING: &str = "🔍 Your request is being processed.";
pub const CANCELLING: &str = "⛔ Canceling...";
pub const NOTHING_TO_CANCEL: &str = "👀 No active process to cancel.";
pub const STILL_PROCESSING: &str =
    "⏳ Your previous request is still being processed. Type 'cancel' to stop it.";
pub const CANCELLED: &str = "⛔ Process cancelled successfully!";
pub const NO_RESULTS: &str = "❌ No results found for this domain.";
pub const UNRECOGNIZED: &str = "❌ Unrecognized command. Type 'help' for options";
pub const MISSING_DOMAIN: &str =
    "❌ Please provide a domain to search.\n\n💡 Example: 'search shop.example.com'";
pub const IDLE: &str = "👀 Nothing queued or running.";

pub fn queued(position: usize) -> String {
    format!("⏳ Your request is in waiting list (No #{})", position)
}

pub fn progress(percent: u8) -> String {
    format!("⏳ Progress: {}%", percent)
}

pub fn completed(results: usize) -> String {
    format!("✅ Search completed: {} results.", results)
}

pub fn failed(reason: &str) -> String {
    format!("❌ Error processing request: {}", reason)
}

pub fn invalid_domain(reason: &str) -> String {
    format!(
        "❌ {}.\nPlease provide a valid domain [e.g., shop.example.com]",
        reason
    )
}

/// Prints chat replies to stdout and writes finished reports to disk.
///
/// Every event is also passed to [`LogNotifier`].
pub struct ConsoleNotifier {
    output_dir: PathBuf,
    library_url: String,
    log: LogNotifier,
}

impl ConsoleNotifier {
    pub fn new(output_dir: impl Into<PathBuf>, library_url: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            library_url: library_url.into(),
            log: LogNotifier,
        }
    }

    pub fn say(&self, key: &str, text: &str) {
        println!("[{}] {}", key, text);
    }

    fn write_report(&self, artifact: &ReportArtifact) -> crate::app::Result<PathBuf> {
        let body = artifact.to_json()?;
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(&artifact.filename);
        fs::write(&path, body)?;
        Ok(path)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl Notifier for ConsoleNotifier {
    fn position_changed(&self, job: &JobRef, position: usize) {
        self.log.position_changed(job, position);
        if position == 0 {
            self.say(job.key.as_str(), STARTED);
        } else {
            self.say(job.key.as_str(), &queued(position));
        }
    }

    fn progress(&self, job: &JobRef, percent: u8) {
        self.log.progress(job, percent);
        self.say(job.key.as_str(), &progress(percent));
    }

    fn succeeded(&self, job: &JobRef, artifact: &ReportArtifact) {
        self.log.succeeded(job, artifact);
        let key = job.key.as_str();
        if artifact.is_empty() {
            self.say(key, NO_RESULTS);
            if let Ok(link) = ScrapeRequest::new(job.term.as_str()).search_url(&self.library_url) {
                self.say(key, &format!("🔗 Visit for more info: {}", link));
            }
            return;
        }

        self.say(key, &completed(artifact.len()));
        match self.write_report(artifact) {
            Ok(path) => {
                info!("Wrote report {}", path.display());
                self.say(key, &format!("📎 {}", path.display()));
            }
            Err(e) => error!("Failed to write report {}: {}", artifact.filename, e),
        }
    }

    fn failed(&self, job: &JobRef, reason: &str) {
        self.log.failed(job, reason);
        self.say(job.key.as_str(), &failed(reason));
    }

    fn cancelled(&self, job: &JobRef) {
        self.log.cancelled(job);
        self.say(job.key.as_str(), CANCELLED);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobKey;
    use crate::scraper::AdCard;

    fn job() -> JobRef {
        JobRef {
            id: 1,
            key: JobKey::new("console"),
            term: "shop.example.com".into(),
        }
    }

    #[test]
    fn test_reply_texts() {
        assert_eq!(queued(2), "⏳ Your request is in waiting list (No #2)");
        assert_eq!(completed(5), "✅ Search completed: 5 results.");
        assert!(failed("boom").ends_with("boom"));
        assert_eq!(progress(40), "⏳ Progress: 40%");
    }

    #[test]
    fn test_succeeded_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = ConsoleNotifier::new(dir.path().join("reports"), "https://ads.example.com/");
        let artifact = ReportArtifact::new(
            "shop-example-com_2024-05-01_results.json",
            vec![AdCard {
                text: "Library ID: 1".into(),
                ..Default::default()
            }],
        );

        notifier.succeeded(&job(), &artifact);

        let written = notifier.output_dir().join(&artifact.filename);
        let body = fs::read(written).unwrap();
        let cards: Vec<AdCard> = serde_json::from_slice(&body).unwrap();
        assert_eq!(cards, artifact.cards);
    }

    #[test]
    fn test_empty_result_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = ConsoleNotifier::new(dir.path(), "https://ads.example.com/");
        let artifact = ReportArtifact::new("empty.json", Vec::new());

        notifier.succeeded(&job(), &artifact);

        assert!(!dir.path().join("empty.json").exists());
    }
}
