use std::cmp::min;
use std::fmt::Write;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressState, ProgressStyle};

use crate::shutdown::DelegatedShutdownListener;

/// Displays a progress bar while the stages are running to show the user how long is left.
pub(crate) fn start_progress(planned_runtime: Duration, shutdown_listener: DelegatedShutdownListener) {
    let style = match ProgressStyle::with_template(
        "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}]",
    ) {
        Ok(style) => style,
        Err(e) => {
            log::warn!("Not showing progress, invalid progress style: {e}");
            return;
        }
    };

    let total = planned_runtime.as_secs();
    let style = style
        .with_key(
            "planned_runtime",
            move |_state: &ProgressState, w: &mut dyn Write| {
                let _ = write!(
                    w,
                    "{:02}:{:02}:{:02}",
                    total / 3600,
                    (total % 3600) / 60,
                    total % 60
                );
            },
        )
        .progress_chars("#>-");

    let spawned = std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let start_time = Instant::now();
            let pb = ProgressBar::new(total);
            pb.set_style(style);

            loop {
                if shutdown_listener.should_shutdown() {
                    log::trace!("Progress thread shutting down");
                    pb.finish_and_clear();
                    break;
                }

                pb.set_position(min(start_time.elapsed().as_secs(), total));
                std::thread::sleep(Duration::from_millis(250));
            }
        });

    if let Err(e) = spawned {
        log::warn!("Failed to start progress thread: {e}");
    }
}
