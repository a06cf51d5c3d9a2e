//! Background worker: debounced uploads, autosave coalescing and the
//! periodic sync sweep, all driven from one thread.

use super::core::EngineCore;

use std::collections::BTreeMap;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// Upload the slot once its debounce delay has elapsed.
    QueueUpload(u8),
    /// Flush the coalesced autosave once the debounce window closes.
    ScheduleAutosave,
    /// Connectivity changed; `true` triggers an immediate sweep.
    Connectivity(bool),
    Shutdown,
}

pub(crate) fn run(core: Arc<EngineCore>, commands: Receiver<Command>) {
    let config = core.config().clone();
    let mut uploads: BTreeMap<u8, Instant> = BTreeMap::new();
    let mut autosave_due: Option<Instant> = None;
    let mut next_sweep = Instant::now() + config.sync_interval();

    log::debug!("Sync worker started for '{}'", core.game_id());

    loop {
        let next_deadline = uploads
            .values()
            .copied()
            .chain(autosave_due)
            .fold(next_sweep, |earliest, due| earliest.min(due));
        let wait = next_deadline.saturating_duration_since(Instant::now());

        match commands.recv_timeout(wait) {
            Ok(Command::QueueUpload(slot)) => {
                uploads.insert(slot, Instant::now() + config.upload_debounce());
            }
            Ok(Command::ScheduleAutosave) => {
                autosave_due.get_or_insert_with(|| Instant::now() + config.autosave_debounce());
            }
            Ok(Command::Connectivity(true)) => {
                next_sweep = Instant::now();
            }
            Ok(Command::Connectivity(false)) => {
                // Queued slots stay pending in their metadata; the sweep picks them up.
                uploads.clear();
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();

        if autosave_due.is_some_and(|due| due <= now) {
            autosave_due = None;
            if let Err(e) = core.flush_autosave() {
                log::error!("Autosave failed: {}", e);
            }
        }

        let due: Vec<u8> =
            uploads.iter().filter(|(_, due)| **due <= now).map(|(slot, _)| *slot).collect();
        for slot in due {
            uploads.remove(&slot);
            core.upload_slot(slot);
        }

        if next_sweep <= now {
            core.sync_sweep();
            next_sweep = Instant::now() + config.sync_interval();
        }
    }

    log::debug!("Sync worker stopped for '{}'", core.game_id());
}
