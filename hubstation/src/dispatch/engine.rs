//! The download pipeline.
//!
//! `download()` acquires the payload, resolves the effective download
//! setting and backend, submits the task, normalizes the backend's reply into
//! a task id and records the result. It never fails or panics towards the
//! caller: every failure becomes a [`DownloadOutcome`] with a reason.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use rand::distr::{Alphanumeric, SampleString};
use tracing::{error, info, warn};

use super::request::{DownloadOutcome, DownloadRequest, SettingSelection};
use crate::config::ConfigStore;
use crate::constants::{BYPASS_SETTING_ID, CORRELATION_TAG_LEN, CORRELATION_TAG_PREFIX};
use crate::database::repositories::HistoryStore;
use crate::downloader::adapter::{AddTaskRequest, AdapterFamily};
use crate::downloader::model::{DownloadRecord, DownloadSettingProfile};
use crate::downloader::registry::DownloaderRegistry;
use crate::notification::{NotificationEvent, Notifier};
use crate::payload::{self, Acquired, FetchOptions, PayloadFetcher};
use crate::site::{SiteInfo, SiteProvider};
use crate::subtitle::{SubtitleFetcher, SubtitleJob};
use crate::utils::http_client::ProxySetting;
use crate::Error;

/// A failed run, with the backend id when it was already known.
struct Failure {
    downloader_id: Option<String>,
    error: Error,
}

impl Failure {
    fn new(downloader_id: Option<String>, error: Error) -> Self {
        Self {
            downloader_id,
            error,
        }
    }
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self::new(None, error)
    }
}

/// Submits download requests to backends.
pub struct DispatchEngine {
    config: Arc<ConfigStore>,
    downloaders: Arc<DownloaderRegistry>,
    sites: Arc<dyn SiteProvider>,
    fetcher: Arc<dyn PayloadFetcher>,
    history: Arc<dyn HistoryStore>,
    notifier: Arc<dyn Notifier>,
    subtitles: Arc<dyn SubtitleFetcher>,
}

impl DispatchEngine {
    pub fn new(
        config: Arc<ConfigStore>,
        downloaders: Arc<DownloaderRegistry>,
        sites: Arc<dyn SiteProvider>,
        fetcher: Arc<dyn PayloadFetcher>,
        history: Arc<dyn HistoryStore>,
        notifier: Arc<dyn Notifier>,
        subtitles: Arc<dyn SubtitleFetcher>,
    ) -> Self {
        Self {
            config,
            downloaders,
            sites,
            fetcher,
            history,
            notifier,
            subtitles,
        }
    }

    /// Submit one request.
    pub async fn download(&self, request: DownloadRequest) -> DownloadOutcome {
        let failure = match AssertUnwindSafe(self.run(&request)).catch_unwind().await {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(failure)) => {
                warn!(
                    title = %request.media.title,
                    downloader_id = ?failure.downloader_id,
                    error = %failure.error,
                    "Download not added"
                );
                failure
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(
                    title = %request.media.title,
                    enclosure = ?request.media.enclosure,
                    downloader_id = ?request.downloader_id,
                    setting = ?request.setting,
                    reason = %reason,
                    "Unexpected failure while adding download"
                );
                Failure::new(None, Error::UnexpectedInternal(reason))
            }
        };

        let reason = failure.error.to_string();
        self.notifier.send(NotificationEvent::DownloadFailed {
            media: request.media.clone(),
            reason: reason.clone(),
            origin: request.origin.clone(),
            timestamp: Utc::now(),
        });
        DownloadOutcome::failure(failure.downloader_id, reason)
    }

    async fn run(&self, request: &DownloadRequest) -> Result<DownloadOutcome, Failure> {
        let media = &request.media;

        // 1. payload
        let mut site: Option<SiteInfo> = None;
        let acquired = match &request.payload_path {
            Some(path) => payload::read_local(path).await,
            None => {
                let url = media
                    .enclosure
                    .as_deref()
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .ok_or(Error::EmptyLink)?;
                if url.starts_with("magnet:") {
                    Acquired::magnet(url)
                } else {
                    site = self.sites.site_for_url(url);
                    let options = self.fetch_options(site.as_ref(), request);
                    self.fetcher.acquire(url, &options).await
                }
            }
        };
        if !acquired.message.is_empty() {
            warn!(title = %media.title, message = %acquired.message, "Payload acquisition reported a problem");
        }
        let Some(content) = acquired.content else {
            let reason = if acquired.message.is_empty() {
                "failed to acquire payload".to_string()
            } else {
                acquired.message
            };
            return Err(Error::AcquisitionFailed(reason).into());
        };

        // 2. setting
        let setting = self.resolve_setting(request);
        let setting_name = setting.as_ref().map(|s| s.name.clone());

        // 3. backend; a bypassed setting only takes the caller's backend
        let bypass = request.setting == SettingSelection::Bypass;
        let downloader_id = request
            .downloader_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| setting.as_ref().and_then(|s| s.backend().map(str::to_string)))
            .or_else(|| {
                if bypass {
                    return None;
                }
                self.downloaders
                    .default_setting()
                    .backend()
                    .map(str::to_string)
            });
        let unavailable = || {
            Error::BackendUnavailable(format!(
                "the downloader of download setting {} is not valid or not enabled",
                setting_name.as_deref().unwrap_or("(none)")
            ))
        };
        let Some(downloader_id) = downloader_id else {
            return Err(unavailable().into());
        };
        let (Some(profile), Some(adapter)) = (
            self.downloaders.downloader(&downloader_id),
            self.downloaders.adapter(&downloader_id),
        ) else {
            return Err(unavailable().into());
        };

        // 4. merge
        let mut tags: Vec<String> = Vec::new();
        let requested = setting
            .as_ref()
            .map(DownloadSettingProfile::tag_list)
            .unwrap_or_default();
        for tag in requested.into_iter().chain(request.tags.iter().cloned()) {
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        let defaults = setting.clone().unwrap_or_default();
        let mut category = defaults.category.clone();
        let save_dir = match request.save_dir.as_deref().filter(|d| !d.is_empty()) {
            Some(dir) => Some(dir.to_string()),
            None => {
                let choice = profile.directory_for(media);
                if category.is_none() {
                    category = choice.category;
                }
                choice.path
            }
        };
        let mut add = AddTaskRequest {
            content,
            paused: request.paused.unwrap_or(defaults.paused),
            save_dir,
            tags,
            category,
            upload_limit: request.upload_limit.unwrap_or(defaults.upload_limit),
            download_limit: request.download_limit.unwrap_or(defaults.download_limit),
            ratio_limit: defaults.ratio_limit,
            seeding_time_limit: defaults.seeding_time_limit,
            cookie: site.as_ref().and_then(|s| s.cookie.clone()),
        };

        // 5. submit
        let family = adapter.family();
        let correlation_tag = (family == AdapterFamily::CorrelationTag).then(correlation_tag);
        if let Some(tag) = &correlation_tag {
            add.tags.push(tag.clone());
        }
        info!(
            downloader = %profile.name,
            title = %media.title,
            dir = ?add.save_dir,
            paused = add.paused,
            url = %add.content.describe(),
            "Adding download task"
        );

        let known = Some(downloader_id.clone());
        let outcome = adapter
            .add_task(&add)
            .await
            .map_err(|e| Failure::new(known.clone(), e))?;

        let (accepted, task_id) = match family {
            AdapterFamily::DetailThenApply => match outcome.task_id() {
                Some(id) => {
                    if let Err(e) = adapter.apply_attributes(id, &add.attributes()).await {
                        warn!(downloader = %profile.name, task_id = id, error = %e, "Failed to apply task attributes");
                    }
                    (true, Some(id.to_string()))
                }
                None => (false, None),
            },
            AdapterFamily::CorrelationTag if outcome.is_accepted() => {
                let tag = correlation_tag.as_deref().unwrap_or_default();
                match adapter.find_task_by_tag(tag).await {
                    Ok(id) => (true, id),
                    Err(e) => {
                        warn!(downloader = %profile.name, tag, error = %e, "Task added but its id could not be found");
                        (true, None)
                    }
                }
            }
            AdapterFamily::CorrelationTag => (false, None),
            AdapterFamily::Direct => (outcome.is_accepted(), outcome.task_id().map(str::to_string)),
        };
        if !accepted {
            return Err(Failure::new(
                known,
                Error::SubmissionRejected(format!(
                    "downloader {} failed to add the task, check whether it already exists",
                    profile.name
                )),
            ));
        }

        // 6. record
        let visit_dir = add
            .save_dir
            .as_deref()
            .and_then(|dir| self.downloaders.visit_dir(&downloader_id, dir));
        let (save_path, subtitle_dir): (Option<PathBuf>, Option<PathBuf>) = match visit_dir {
            Some(dir) => match (&acquired.folder, acquired.files.first()) {
                (Some(folder), _) => {
                    let path = dir.join(folder);
                    (Some(path.clone()), Some(path))
                }
                (None, Some(file)) => (Some(dir.join(file)), Some(dir)),
                (None, None) => (None, Some(dir)),
            },
            None => (None, None),
        };

        let record = DownloadRecord {
            backend_id: downloader_id.clone(),
            backend_task_id: task_id.clone(),
            save_path,
            media: media.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.history.insert(&record).await {
            error!(title = %media.title, error = %e, "Failed to record download history");
        }

        self.notifier.send(NotificationEvent::DownloadSucceeded {
            media: media.clone(),
            backend_id: downloader_id.clone(),
            backend_name: profile.name.clone(),
            setting_name,
            origin: request.origin.clone(),
            user_name: request.user_name.clone(),
            timestamp: record.created_at,
        });

        if let (Some(page_url), Some(dir), Some(site)) = (&media.page_url, subtitle_dir, &site)
            && site.subtitle
        {
            self.spawn_subtitle_fetch(SubtitleJob {
                media: media.clone(),
                page_url: page_url.clone(),
                site_id: site.id.clone(),
                cookie: site.cookie.clone(),
                user_agent: site.user_agent.clone(),
                target_dir: dir,
            });
        }

        Ok(DownloadOutcome::success(downloader_id, task_id))
    }

    /// Setting to apply; `None` when settings are bypassed.
    fn resolve_setting(&self, request: &DownloadRequest) -> Option<DownloadSettingProfile> {
        let lookup = |id: &str| {
            if id == BYPASS_SETTING_ID {
                return None;
            }
            Some(
                self.downloaders
                    .download_setting(id)
                    .unwrap_or_else(|| self.downloaders.default_setting()),
            )
        };
        match &request.setting {
            SettingSelection::Bypass => None,
            SettingSelection::Profile(id) => lookup(id),
            SettingSelection::Unspecified => {
                match request
                    .media
                    .site
                    .as_deref()
                    .and_then(|site| self.sites.default_setting_for_site(site))
                {
                    Some(id) => lookup(&id),
                    None => Some(self.downloaders.default_setting()),
                }
            }
        }
    }

    fn fetch_options(&self, site: Option<&SiteInfo>, request: &DownloadRequest) -> FetchOptions {
        let use_proxy = request
            .proxy
            .unwrap_or_else(|| site.is_some_and(|s| s.proxy));
        FetchOptions {
            cookie: site.and_then(|s| s.cookie.clone()),
            user_agent: Some(
                site.and_then(|s| s.user_agent.clone())
                    .filter(|ua| !ua.is_empty())
                    .unwrap_or_else(|| self.config.user_agent()),
            ),
            referer: site
                .filter(|s| s.referer)
                .and(request.media.page_url.clone()),
            proxy: if use_proxy {
                ProxySetting::from_url(self.config.proxy().as_deref())
            } else {
                ProxySetting::Disabled
            },
        }
    }

    fn spawn_subtitle_fetch(&self, job: SubtitleJob) {
        let fetcher = self.subtitles.clone();
        tokio::spawn(async move {
            let title = job.media.title.clone();
            if let Err(e) = fetcher.fetch(job).await {
                warn!(title = %title, error = %e, "Subtitle download failed");
            }
        });
    }
}

fn correlation_tag() -> String {
    format!(
        "{CORRELATION_TAG_PREFIX}{}",
        Alphanumeric.sample_string(&mut rand::rng(), CORRELATION_TAG_LEN)
    )
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
