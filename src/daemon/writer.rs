use crate::device::{DeviceBackend, InputSink, VirtualInputDevice};
use crate::protocol::EventRecord;
use tokio::sync::mpsc;
use tracing::{error, info, trace, warn};

/// Records of one logical action, normally ending with a SYN_REPORT
pub(super) type Batch = Vec<EventRecord>;

/// Apply batches to the device until every sender is gone, then destroy it.
///
/// Runs on a blocking thread; this is the only code that touches the device
/// once the daemon is serving, so batches never interleave.
pub(super) fn drain<B: DeviceBackend>(
    mut device: VirtualInputDevice<B>,
    mut batches: mpsc::Receiver<Batch>,
) -> u64 {
    let mut written = 0u64;

    while let Some(batch) = batches.blocking_recv() {
        trace!("Writing batch of {} events", batch.len());
        match device.emit_batch(&batch) {
            Ok(()) => written += batch.len() as u64,
            // The device stays up; only this action is lost
            Err(e) => error!("Failed to write batch of {} events: {}", batch.len(), e),
        }
    }

    if let Err(e) = device.destroy() {
        warn!("Failed to destroy virtual input device: {}", e);
    }
    info!("Event writer stopped after {} events", written);
    written
}
