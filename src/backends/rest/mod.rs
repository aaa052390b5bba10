use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{BeaconStatus, ProgressStore};
use crate::config::NetworkConfig;
use crate::models::{EnrollmentId, LessonId, ProgressRecord, SavedProgress};


/// Progress store backed by the LMS REST API.
///
/// Beacons are handed to a dispatcher task spawned on the runtime that built
/// the store. The task owns its own client and keeps running after the session
/// that queued the record is gone, which is what makes it usable at teardown.
#[derive(Debug, Clone)]
pub struct RestProgressStore {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
    beacon_tx: Option<mpsc::UnboundedSender<ProgressRecord>>,
}

impl RestProgressStore {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid base URL {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("Base URL {} cannot carry a path", base_url));
        }

        let mut store = Self {
            client,
            base_url,
            auth_token: config.auth_token.clone(),
            beacon_tx: None,
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let (tx, rx) = mpsc::unbounded_channel();
                handle.spawn(Self::run_beacon_dispatcher(store.clone(), rx));
                store.beacon_tx = Some(tx);
            }
            Err(_) => {
                warn!("No async runtime available, progress beacons disabled");
            }
        }

        Ok(store)
    }

    fn progress_url(&self, enrollment_id: &EnrollmentId, lesson_id: &LessonId) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Base URL {} cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend([
                "enrollments",
                enrollment_id.as_str(),
                "lessons",
                lesson_id.as_str(),
                "progress",
            ]);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn put_progress(&self, record: &ProgressRecord) -> Result<()> {
        let url = self.progress_url(&record.enrollment_id, &record.lesson_id)?;
        let response = self
            .authorize(self.client.put(url))
            .json(record)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to save progress: {}", response.status()));
        }
        Ok(())
    }

    async fn run_beacon_dispatcher(store: Self, mut rx: mpsc::UnboundedReceiver<ProgressRecord>) {
        debug!("Progress beacon dispatcher started");
        // `store` was cloned before the sender was attached, so the loop ends
        // once the last user-facing clone is dropped.
        while let Some(record) = rx.recv().await {
            match store.put_progress(&record).await {
                Ok(()) => info!(
                    "Beacon delivered {}% for lesson {}",
                    record.progress_percentage, record.lesson_id
                ),
                Err(e) => error!("Beacon for lesson {} failed: {}", record.lesson_id, e),
            }
        }
        debug!("Progress beacon dispatcher stopped");
    }
}

#[async_trait]
impl ProgressStore for RestProgressStore {
    async fn fetch_progress(
        &self,
        enrollment_id: &EnrollmentId,
        lesson_id: &LessonId,
    ) -> Result<Option<SavedProgress>> {
        let url = self.progress_url(enrollment_id, lesson_id)?;
        let response = self.authorize(self.client.get(url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("No stored progress for lesson {}", lesson_id);
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow!("Failed to fetch progress: {}", response.status()));
        }

        let saved: SavedProgress = response
            .json()
            .await
            .context("Failed to parse progress response")?;
        Ok(Some(saved))
    }

    async fn save_progress(&self, record: &ProgressRecord) -> Result<()> {
        self.put_progress(record).await
    }

    fn send_beacon(&self, record: &ProgressRecord) -> BeaconStatus {
        match &self.beacon_tx {
            Some(tx) => match tx.send(record.clone()) {
                Ok(()) => BeaconStatus::Queued,
                Err(_) => BeaconStatus::Rejected,
            },
            None => BeaconStatus::Unsupported,
        }
    }
}
