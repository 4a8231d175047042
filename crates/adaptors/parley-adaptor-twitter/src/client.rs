//! Twitter service: runs the mention, timeline and post loops on randomized
//! schedules until the runtime is cancelled

use crate::actions::ActionExecutor;
use crate::api::{HttpTwitterApi, TwitterApi};
use crate::base::TwitterBase;
use crate::config::{IntervalRange, TwitterConfig};
use crate::interactions::InteractionHandler;
use crate::meme::{GlifMemeGenerator, MemeGenerator};
use crate::post::PostGenerator;
use async_trait::async_trait;
use parley_core::{AgentRuntime, Logger, Result, Service};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Twitter service wired to an [`AgentRuntime`]
pub struct TwitterClient {
    base: Arc<TwitterBase>,
    meme: Option<Arc<dyn MemeGenerator>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TwitterClient {
    /// Client over `api`
    pub fn new(runtime: Arc<AgentRuntime>, api: Arc<dyn TwitterApi>, config: TwitterConfig) -> Self {
        let meme = config
            .glif_api_key
            .clone()
            .map(|key| Arc::new(GlifMemeGenerator::new(key)) as Arc<dyn MemeGenerator>);
        let cancel = runtime.cancel_token().child_token();
        Self {
            base: Arc::new(TwitterBase::new(runtime, api, config)),
            meme,
            cancel,
            tasks: Vec::new(),
        }
    }

    /// Client over the HTTP gateway, configured from the environment
    pub fn from_env(runtime: Arc<AgentRuntime>) -> Result<Self> {
        let config = TwitterConfig::from_env()?;
        let api = Arc::new(HttpTwitterApi::new(config.api_url.clone(), config.api_token.clone()));
        Ok(Self::new(runtime, api, config))
    }

    /// Replace the meme generator
    pub fn with_meme_generator(mut self, meme: Arc<dyn MemeGenerator>) -> Self {
        self.meme = Some(meme);
        self
    }

    fn spawn_loop<F, Fut>(&mut self, name: &'static str, interval: IntervalRange, tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let logger = self.base.logger(name);
        self.tasks
            .push(tokio::spawn(run_loop(logger, interval, self.cancel.clone(), tick)));
    }
}

/// Run `tick` immediately, then again after each randomized delay, until
/// `cancel` fires
async fn run_loop<F, Fut>(logger: Logger, interval: IntervalRange, cancel: CancellationToken, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick() => {}
        }
        let delay = interval.sample();
        logger.debug(&format!("next run in {}s", delay.as_secs()));
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    logger.debug("loop stopped");
}

#[async_trait]
impl Service for TwitterClient {
    fn service_type(&self) -> &str {
        "twitter"
    }

    async fn start(&mut self) -> Result<()> {
        if !self.tasks.is_empty() {
            return Ok(());
        }
        let config = self.base.config().clone();

        let interactions = Arc::new(InteractionHandler::new(self.base.clone()));
        if let Some(id) = interactions.load_last_checked().await? {
            info!(last_checked = id, "Resuming mentions");
        }
        self.spawn_loop("interactions", config.mention_interval, move || {
            let handler = interactions.clone();
            async move {
                if let Err(e) = handler.check_mentions().await {
                    warn!(error = %e, "Mention check failed");
                }
            }
        });

        if config.enable_actions {
            let mut executor = ActionExecutor::new(self.base.clone());
            if let Some(meme) = &self.meme {
                executor = executor.with_meme_generator(meme.clone());
            }
            let executor = Arc::new(executor);
            self.spawn_loop("actions", config.action_interval, move || {
                let executor = executor.clone();
                async move {
                    if let Err(e) = executor.process_timeline().await {
                        warn!(error = %e, "Timeline actions failed");
                    }
                }
            });
        }

        if config.enable_posts {
            let poster = Arc::new(PostGenerator::new(self.base.clone()));
            self.spawn_loop("post", config.post_interval, move || {
                let poster = poster.clone();
                async move {
                    if let Err(e) = poster.generate_and_post().await {
                        warn!(error = %e, "Scheduled post failed");
                    }
                }
            });
        }

        info!(username = %config.username, loops = self.tasks.len(), "Twitter client started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Twitter loop ended abnormally");
            }
        }
        info!("Twitter client stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.tasks.iter().any(|t| !t.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_loop_reschedules_until_cancelled() {
        let runs = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let interval = IntervalRange {
            min: Duration::from_secs(120),
            max: Duration::from_secs(120),
        };

        let counter = runs.clone();
        let task = tokio::spawn(run_loop(Logger::new("test"), interval, cancel.clone(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        tokio::time::sleep(Duration::from_secs(250)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        cancel.cancel();
        task.await.unwrap();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
