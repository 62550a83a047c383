use std::io::BufRead;
use std::thread::JoinHandle;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::acquisition::LocalControl;

/// Reads operator keys from stdin on a dedicated thread: `p` saves the
/// current frame, `q` stops the video worker. The thread is detached so a
/// pending read never holds up process exit.
pub fn spawn_console(controls: mpsc::Sender<LocalControl>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("operator-console".to_string())
        .spawn(move || {
            info!("Operator console ready: 'p' + Enter saves a picture, 'q' + Enter stops video");
            if let Err(e) = forward_keys(std::io::stdin().lock(), controls) {
                error!("Operator console failed: {}", e);
            }
        })
}

/// Blocking; call from a plain thread, not from async code.
pub fn forward_keys<R: BufRead>(input: R, controls: mpsc::Sender<LocalControl>) -> Result<()> {
    for line in input.lines() {
        let line = line?;
        let Some(control) = LocalControl::from_key(&line) else {
            if !line.trim().is_empty() {
                debug!("Ignoring operator input: {}", line.trim());
            }
            continue;
        };

        if controls.blocking_send(control).is_err() {
            debug!("Video worker gone, closing operator console");
            break;
        }
        if control == LocalControl::Quit {
            break;
        }
    }
    Ok(())
}
