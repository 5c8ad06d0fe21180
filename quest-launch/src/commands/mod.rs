use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quest_launch::{api, config::Opts, progress::StepUpdate, CampaignSpec, LaunchSaga};
use std::path::{Path, PathBuf};
use tokio::{
    sync::{
        broadcast::{
            self,
            error::{RecvError, TryRecvError},
        },
        oneshot,
    },
    task::JoinHandle,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about=None)]
pub(crate) struct Cli {
    #[clap(flatten)]
    pub(crate) opts: Opts,

    #[clap(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the launch HTTP API
    Serve {
        /// listen address, overrides httpListen
        #[clap(long)]
        listen: Option<String>,
    },
    /// Launch a campaign, or resume the launch of the same spec
    Launch {
        /// campaign spec json file
        #[clap(long, parse(from_os_str), value_name = "FILE")]
        spec: PathBuf,
    },
    /// Retry the launch owning a draft campaign
    Retry {
        /// campaign id returned by a failed launch
        #[clap(long)]
        campaign: String,
    },
    /// Show the persisted state of a launch
    Status {
        /// launch key
        #[clap(long)]
        key: String,
    },
    /// Print a config template
    ShowConfig,
}

impl Cli {
    pub(crate) fn parse_args() -> Self {
        Cli::parse()
    }

    pub(crate) async fn serve_cmd(saga: LaunchSaga, listen: &str) -> Result<()> {
        api::serve(listen, saga)
            .await
            .with_context(|| format!("http server on {}", listen))
    }

    pub(crate) async fn launch_cmd<P: AsRef<Path>>(saga: LaunchSaga, spec: P) -> Result<()> {
        let raw = std::fs::read_to_string(spec.as_ref())
            .with_context(|| format!("reading {}", spec.as_ref().display()))?;
        let spec: CampaignSpec = serde_json::from_str(&raw).context("parsing campaign spec")?;
        log::info!("launching {} on {}", spec.launch_key(), spec.chain);

        let printer = ProgressPrinter::start(&saga);
        let result = saga.run(&spec).await;
        printer.finish().await;
        Self::report(result)
    }

    pub(crate) async fn retry_cmd(saga: LaunchSaga, campaign: &str) -> Result<()> {
        let printer = ProgressPrinter::start(&saga);
        let result = saga.resume(campaign).await;
        printer.finish().await;
        Self::report(result)
    }

    pub(crate) async fn status_cmd(saga: LaunchSaga, key: &str) -> Result<()> {
        let state = saga
            .state(key)
            .await?
            .with_context(|| format!("no launch {}", key))?;
        println!("{}", serde_json::to_string_pretty(&state)?);
        Ok(())
    }

    fn report(result: quest_launch::saga::LaunchResult) -> Result<()> {
        match result {
            Ok(outcome) => {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                Ok(())
            }
            Err(failure) => {
                if let Some(id) = failure.campaign_id() {
                    log::warn!("draft {} kept, retry with `retry --campaign {}`", id, id);
                }
                if let Some(hash) = failure.chain_tx_hash() {
                    log::error!("funds moved in {}, the record still needs finalizing", hash);
                }
                Err(failure.into())
            }
        }
    }
}

fn render(update: &StepUpdate) -> String {
    match &update.message {
        Some(msg) => format!("[{}] {:?}: {}", update.step, update.state, msg),
        None => format!("[{}] {:?}", update.step, update.state),
    }
}

/// Writes progress of a CLI launch to stdout until the launch returns.
struct ProgressPrinter {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ProgressPrinter {
    fn start(saga: &LaunchSaga) -> Self {
        let (stop, stopped) = oneshot::channel();
        let handle = follow(saga.progress().subscribe(), stopped, |line| println!("{}", line));
        Self { stop, handle }
    }

    /// Prints whatever is still queued, then stops.
    async fn finish(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            log::warn!("progress printer: {}", e);
        }
    }
}

fn follow<F>(
    mut rx: broadcast::Receiver<StepUpdate>,
    mut stop: oneshot::Receiver<()>,
    mut out: F,
) -> JoinHandle<()>
where
    F: FnMut(String) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                update = rx.recv() => match update {
                    Ok(update) => out(render(&update)),
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("progress output fell behind, {} updates skipped", skipped)
                    }
                    Err(RecvError::Closed) => return,
                },
                _ = &mut stop => break,
            }
        }
        loop {
            match rx.try_recv() {
                Ok(update) => out(render(&update)),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quest_launch::{
        progress::{ProgressReporter, CHANNEL_CAPACITY},
        saga::{StepName, StepState},
    };
    use std::sync::{Arc, Mutex};

    type Lines = Arc<Mutex<Vec<String>>>;

    fn collect(reporter: &ProgressReporter) -> (oneshot::Sender<()>, JoinHandle<()>, Lines) {
        let lines = Lines::default();
        let sink = lines.clone();
        let (stop, stopped) = oneshot::channel();
        let handle = follow(reporter.subscribe(), stopped, move |line| {
            sink.lock().unwrap().push(line)
        });
        (stop, handle, lines)
    }

    #[tokio::test]
    async fn queued_updates_are_printed_before_stopping() {
        let reporter = ProgressReporter::new();
        let (stop, handle, lines) = collect(&reporter);
        reporter.publish("k", StepName::Submit, StepState::Processing, None);
        let (funded, live) = ("funded in 0xab".to_string(), "campaign is live".to_string());
        reporter.publish("k", StepName::Submit, StepState::Success, Some(funded));
        reporter.publish("k", StepName::Finalize, StepState::Success, Some(live));

        stop.send(()).unwrap();
        handle.await.unwrap();
        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "[submit] Success: funded in 0xab");
        assert_eq!(lines[2], "[finalize] Success: campaign is live");
    }

    #[tokio::test]
    async fn lagging_printer_keeps_going() {
        let reporter = ProgressReporter::new();
        let (stop, handle, lines) = collect(&reporter);
        let total = CHANNEL_CAPACITY + 10;
        for i in 0..total {
            let message = Some(format!("poll {}", i));
            reporter.publish("k", StepName::Submit, StepState::Processing, message);
        }

        stop.send(()).unwrap();
        handle.await.unwrap();
        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), CHANNEL_CAPACITY);
        assert_eq!(lines.last().unwrap(), &format!("[submit] Processing: poll {}", total - 1));
    }
}
