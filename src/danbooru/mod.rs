use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::ThreadPoolBuilder;

use crate::danbooru::sender::{PostEntry, RequestSender};
use crate::danbooru::store::{ImageFetch, ItemStore, SkipReason, StoreError, StoreOutcome};

pub(crate) mod grabber;
pub(crate) mod io;
pub(crate) mod sender;
pub(crate) mod session;
pub(crate) mod store;

/// What happened to a single post, as reported by the worker that handled it.
#[derive(Debug)]
pub(crate) struct ItemOutcome {
    pub(crate) post_id: Option<u32>,
    pub(crate) result: Result<StoreOutcome, StoreError>,
}

/// Tally of a whole download run, with outcomes in completion order.
#[derive(Debug, Default)]
pub(crate) struct DownloadReport {
    pub(crate) downloaded: usize,
    pub(crate) already_present: usize,
    pub(crate) unsupported: usize,
    pub(crate) malformed: usize,
    pub(crate) failed: usize,
    pub(crate) outcomes: Vec<ItemOutcome>,
}

impl DownloadReport {
    fn record(&mut self, outcome: ItemOutcome) {
        match &outcome.result {
            Ok(StoreOutcome::Downloaded) => self.downloaded += 1,
            Ok(StoreOutcome::Skipped(SkipReason::AlreadyComplete)) => self.already_present += 1,
            Ok(StoreOutcome::Skipped(SkipReason::UnsupportedMedia)) => self.unsupported += 1,
            Ok(StoreOutcome::Malformed) => self.malformed += 1,
            Err(_) => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub(crate) fn total(&self) -> usize {
        self.outcomes.len()
    }
}

/// The connector that fans grabbed posts out across a worker pool and saves
/// them through the item store.
pub(crate) struct DanbooruWebConnector<F> {
    /// Store every worker writes through.
    store: ItemStore<F>,
    /// Progress bar that displays the current download progress.
    progress_bar: ProgressBar,
    /// Number of pool workers.
    workers: usize,
}

impl DanbooruWebConnector<RequestSender> {
    /// Creates a new instance of `DanbooruWebConnector` that downloads
    /// through the given request sender.
    pub(crate) fn new(request_sender: &RequestSender, root: PathBuf) -> Self {
        DanbooruWebConnector::with_store(
            ItemStore::new(request_sender.clone(), root),
            num_cpus::get(),
        )
    }
}

impl<F: ImageFetch + Sync> DanbooruWebConnector<F> {
    pub(crate) fn with_store(store: ItemStore<F>, workers: usize) -> Self {
        DanbooruWebConnector {
            store,
            progress_bar: ProgressBar::hidden(),
            workers: workers.max(1),
        }
    }

    /// Downloads every grabbed post and gathers the outcome of each.
    ///
    /// Workers race, so outcomes land in completion order rather than input
    /// order. A post that fails is logged and counted, never escalated; the
    /// run itself only fails when the pool cannot be built.
    pub(crate) fn download_posts(
        &mut self,
        posts: Vec<PostEntry>,
        tag: &str,
        metadata_only: bool,
    ) -> anyhow::Result<DownloadReport> {
        let mut report = DownloadReport::default();
        if posts.is_empty() {
            info!("No posts to download.");
            return Ok(report);
        }

        let total = posts.len();
        trace!("Download Tag:          \"{tag}\"");
        trace!("Download Post Count:   \"{total}\"");
        trace!("Download Worker Count: \"{}\"", self.workers);
        self.initialize_progress_bar(total as u64, tag);

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|index| format!("download-worker-{index}"))
            .build()
            .context("Failed to create download thread pool")?;

        let (outcome_tx, outcome_rx) = flume::unbounded();
        let completed = AtomicUsize::new(0);
        let store = &self.store;
        let progress_bar = self.progress_bar.clone();

        pool.scope(|s| {
            for post in posts {
                let outcome_tx = outcome_tx.clone();
                let progress_bar = progress_bar.clone();
                let completed = &completed;
                s.spawn(move |_| {
                    let result = store.materialize(&post, tag, metadata_only);
                    let id_label = post
                        .id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "?".to_string());
                    let status = match &result {
                        Ok(StoreOutcome::Downloaded) => {
                            trace!("Saved post {id_label}...");
                            "Downloaded"
                        }
                        Ok(StoreOutcome::Skipped(SkipReason::AlreadyComplete)) => "Already saved",
                        Ok(StoreOutcome::Skipped(SkipReason::UnsupportedMedia)) => "Unsupported",
                        Ok(StoreOutcome::Malformed) => {
                            warn!("Skipping post {id_label}: the record is missing required fields");
                            "Malformed"
                        }
                        Err(error) => {
                            error!("Failed to save post {id_label}: {error}");
                            "Error"
                        }
                    };
                    let count = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress_bar.set_message(format!("[{count}/{total}] {status}: {id_label}"));
                    progress_bar.inc(1);
                    let _ = outcome_tx.send(ItemOutcome {
                        post_id: post.id,
                        result,
                    });
                });
            }
        });

        for outcome in outcome_rx.drain() {
            report.record(outcome);
        }

        self.progress_bar.finish_with_message("All posts processed");
        info!(
            "Finished {}: {} downloaded, {} already saved, {} unsupported, {} malformed, {} failed.",
            styled_tag(tag),
            report.downloaded,
            report.already_present,
            report.unsupported,
            report.malformed,
            report.failed
        );
        Ok(report)
    }

    fn initialize_progress_bar(&mut self, len: u64, tag: &str) {
        const PROGRESS_TEMPLATE: &str =
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {prefix}: {msg}";

        let progress_style = ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        self.progress_bar = ProgressBar::new(len);
        self.progress_bar.set_style(progress_style);
        self.progress_bar.set_prefix(shorten(tag));
        self.progress_bar
            .enable_steady_tick(Duration::from_millis(200));
    }
}

/// Styles a tag the way the console output quotes remote names.
pub(crate) fn styled_tag(tag: &str) -> console::StyledObject<String> {
    console::style(format!("\"{tag}\"")).color256(39).italic()
}

// The prefix is capped so the bar columns stay aligned.
fn shorten(name: &str) -> String {
    if name.chars().count() > 13 {
        let prefix: String = name.chars().take(12).collect();
        format!("{prefix}…")
    } else {
        name.to_string()
    }
}
