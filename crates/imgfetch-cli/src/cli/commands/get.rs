//! `imgfetch get` – fetch and decode images through the scheduler.

use anyhow::{bail, Context, Result};
use clap::Args;
use imgfetch_core::config::{ExecutionOrder, FetcherConfig};
use imgfetch_core::{Completion, FetchOptions, Fetcher, FetcherSettings, RequestDescriptor};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Image URLs to fetch. Repeated URLs share one download.
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Run up to N downloads at once (overrides the config file).
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Start the most recently queued URL first.
    #[arg(long)]
    pub lifo: bool,

    /// Per-download deadline in seconds (overrides the config file).
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Extra request header, e.g. `--header "Referer: https://example.com"`.
    #[arg(long = "header", value_name = "NAME:VALUE")]
    pub headers: Vec<String>,

    /// Basic-auth user name.
    #[arg(long, requires = "password")]
    pub user: Option<String>,

    /// Basic-auth password.
    #[arg(long, requires = "user")]
    pub password: Option<String>,

    /// Accept invalid TLS certificates.
    #[arg(long)]
    pub insecure: bool,

    /// Keep and send cookies during the download.
    #[arg(long)]
    pub cookies: bool,

    /// Ask intermediaries for a fresh copy.
    #[arg(long)]
    pub no_cache: bool,

    /// Report partially decoded images as data arrives.
    #[arg(long)]
    pub progressive: bool,

    #[arg(long, conflicts_with = "low_priority")]
    pub high_priority: bool,

    #[arg(long)]
    pub low_priority: bool,

    /// Downscale very large images after decoding.
    #[arg(long)]
    pub scale_down: bool,
}

impl GetArgs {
    pub fn options(&self) -> FetchOptions {
        let mut options = FetchOptions::NONE;
        for (set, flag) in [
            (self.insecure, FetchOptions::ALLOW_INSECURE_TRANSPORT),
            (self.cookies, FetchOptions::HANDLE_COOKIES),
            (self.no_cache, FetchOptions::IGNORE_CACHE),
            (self.progressive, FetchOptions::PROGRESSIVE),
            (self.high_priority, FetchOptions::HIGH_PRIORITY),
            (self.low_priority, FetchOptions::LOW_PRIORITY),
            (self.scale_down, FetchOptions::SCALE_DOWN_LARGE_RESULT),
        ] {
            if set {
                options |= flag;
            }
        }
        options
    }

    /// Config-file settings with command-line overrides applied.
    pub fn settings(&self, cfg: &FetcherConfig) -> Result<FetcherSettings> {
        let mut settings = FetcherSettings::from(cfg);
        if let Some(jobs) = self.jobs {
            settings.max_concurrent_downloads = jobs.max(1);
        }
        if self.lifo {
            settings.execution_order = ExecutionOrder::Lifo;
        }
        if let Some(secs) = self.timeout {
            settings.download_timeout = Duration::try_from_secs_f64(secs)
                .with_context(|| format!("invalid --timeout {secs}"))?;
        }
        for header in &self.headers {
            let (name, value) = parse_header(header)?;
            settings.headers.set(name, Some(value));
        }
        if self.user.is_some() {
            settings.username = self.user.clone();
            settings.password = self.password.clone();
        }
        Ok(settings)
    }
}

/// Split `Name: value`. The value may be empty; the name may not.
pub fn parse_header(raw: &str) -> Result<(&str, &str)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("header {raw:?} is not in NAME:VALUE form");
    };
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        bail!("header {raw:?} has an invalid name");
    }
    Ok((name, value.trim()))
}

struct Report {
    finished: bool,
    failed: bool,
    line: String,
}

fn describe(url: &str, completion: &Completion) -> Report {
    let label = if completion.finished { "ok" } else { "partial" };
    match &completion.result {
        Ok(fetched) => Report {
            finished: completion.finished,
            failed: false,
            line: format!(
                "{:<8} {:>5}x{:<5} {:>9} bytes  {}",
                label,
                fetched.image.width,
                fetched.image.height,
                fetched.data.len(),
                url
            ),
        },
        Err(e) => Report {
            finished: completion.finished,
            failed: true,
            line: format!("{:<8} {}  ({})", "failed", url, e),
        },
    }
}

pub async fn run_get(cfg: &FetcherConfig, args: GetArgs) -> Result<()> {
    let settings = args.settings(cfg)?;
    let options = args.options();
    tracing::debug!(?settings, ?options, urls = args.urls.len(), "starting get");
    let fetcher = Fetcher::builder().settings(settings).build()?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Report>();
    for url in &args.urls {
        let tx = tx.clone();
        let shown = url.clone();
        let request = RequestDescriptor::new(url.as_str())
            .options(options)
            .on_completion(move |completion: &Completion| {
                let _ = tx.send(describe(&shown, completion));
            });
        // An invalid URL reports through the callback before this returns.
        let _ = fetcher.submit(request);
    }
    drop(tx);

    let total = args.urls.len();
    let mut finished = 0;
    let mut failed = 0;
    while finished < total {
        let Some(report) = rx.recv().await else {
            break;
        };
        println!("{}", report.line);
        if report.finished {
            finished += 1;
            if report.failed {
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {total} download(s) failed");
    }
    Ok(())
}
