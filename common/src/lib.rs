//! Core of `upmerge`: keeps a tree of local overrides applied on top of a live configuration
//! directory.
//!
//! Every file under the override (source) tree is compared against its counterpart in the
//! destination tree and either created, left alone, or moved to a single backup slot
//! (`<path>.upmerge~`) and replaced. A backup is never clobbered while it holds content that
//! differs from the file it would be regenerated from; the run is refused instead.
//!
//! The walk is strictly sequential and assumes exclusive access to both trees. Running two
//! instances against the same destination at once is not supported.

pub mod config;
pub mod create;
pub mod filecmp;
pub mod observe;
pub mod reconcile;

#[cfg(test)]
mod testutils;

pub use config::OutputConfig;
pub use observe::{LogObserver, Observation, Observer, RecordingObserver};
pub use reconcile::{
    BACKUP_SUFFIX, DEFAULT_DST, DEFAULT_SRC, Error, Refusal, Settings, Summary, reconcile,
};

/// Name used to prefix the final error line.
pub const PROG_NAME: &str = "upmerge";

fn init_tracing(output: &OutputConfig) {
    let filter = tracing_subscriber::EnvFilter::new(output.log_level());
    // every observation is a single plain line on stderr
    let res = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_level(false)
        .try_init();
    if let Err(error) = res {
        eprintln!("{PROG_NAME}: failed to initialize logging: {error}");
    }
}

/// Sets up logging and a single-threaded runtime, then runs `func` to completion.
///
/// Returns the run's summary, or `None` after logging a one-line error if it failed. With
/// `print_summary` the summary is printed to stdout in both cases.
pub fn run<Fut>(output: &OutputConfig, func: impl FnOnce() -> Fut) -> Option<Summary>
where
    Fut: std::future::Future<Output = Result<Summary, Error>>,
{
    init_tracing(output);
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!("{}: failed to start runtime: {}", PROG_NAME, &error);
            return None;
        }
    };
    match runtime.block_on(func()) {
        Ok(summary) => {
            if output.print_summary {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            tracing::error!("{}: {}", PROG_NAME, &error);
            if output.print_summary {
                println!("{}", &error.summary);
            }
            None
        }
    }
}
