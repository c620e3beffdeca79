use super::TrackerSignal;

/// Receives batches of tracker signals.
///
/// Implemented by in-process subscribers (overlay bridge, test recorders);
/// out-of-process consumers subscribe to the pipeline's broadcast channel
/// instead.
pub trait SignalHandler {
    fn handle_signals(&mut self, signals: &[TrackerSignal]);
}

impl SignalHandler for Vec<TrackerSignal> {
    fn handle_signals(&mut self, signals: &[TrackerSignal]) {
        self.extend_from_slice(signals);
    }
}
