use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Process-wide fan-out of commit signals to stream consumers.
///
/// Edge-triggered: `notify` drains the listener list, so a consumer must
/// re-subscribe before every wait. A single buffered slot per listener is
/// enough because consumers always re-query the log from their cursor;
/// ordering comes from the log, never from the signal.
#[derive(Debug, Default)]
pub struct EventNotifier {
    listeners: Mutex<Vec<mpsc::Sender<()>>>,
}

impl EventNotifier {
    /// Register for the next notify round.
    pub fn subscribe(&self) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        self.listeners.lock().push(tx);
        rx
    }

    /// Wake every currently registered listener.
    pub fn notify(&self) {
        let listeners = std::mem::take(&mut *self.listeners.lock());
        for listener in listeners {
            let _ = listener.try_send(());
        }
    }
}
