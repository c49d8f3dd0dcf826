use std::sync::Arc;

use crate::config::Config;
use crate::crawl::{CrawlService, Notifier};
use crate::scraper::{AdLibraryScraper, ScrapeOperation};

pub struct AppContext {
    pub config: Config,
    pub service: Arc<CrawlService>,
}

impl AppContext {
    pub fn new(config: Config, notifier: Arc<dyn Notifier>) -> Self {
        let operation: Arc<dyn ScrapeOperation> =
            Arc::new(AdLibraryScraper::new(config.scraper.clone()));
        Self::with_operation(config, operation, notifier)
    }

    pub fn with_operation(
        config: Config,
        operation: Arc<dyn ScrapeOperation>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let service = Arc::new(CrawlService::new(
            operation,
            notifier,
            config.queue.clone(),
        ));

        Self { config, service }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::testing::{FakeOperation, RecordingNotifier};
    use crate::domain::{JobKey, ScrapeRequest};

    #[tokio::test]
    async fn test_context_runs_jobs() {
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = AppContext::with_operation(
            Config::default(),
            Arc::new(FakeOperation::returning(2)),
            notifier.clone(),
        );

        ctx.service
            .submit(JobKey::new("c1"), ScrapeRequest::new("shop.example.com"))
            .unwrap();
        ctx.service.wait_idle().await;

        assert_eq!(notifier.total_terminal(), 1);
        assert!(ctx.service.is_idle());
    }
}
