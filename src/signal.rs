use std::sync::mpsc::{self, Receiver, SyncSender};

/// A one-shot wake-up signal: fired exactly once, observable by exactly one
/// waiter. Re-settable events are deliberately not used anywhere in this
/// crate — once a generation's unresolved set drains, no further wake-up is
/// possible for that generation, and a one-shot primitive makes that
/// impossible to get wrong.
pub(crate) struct WakeSignal(Receiver<()>);

impl WakeSignal {
    /// Creates a fresh, unfired signal and the sender used to fire it.
    pub(crate) fn pair() -> (SyncSender<()>, WakeSignal) {
        let (tx, rx) = mpsc::sync_channel(1);
        (tx, WakeSignal(rx))
    }

    /// Creates a signal that is already fired, so `wait` returns immediately.
    pub(crate) fn fired() -> WakeSignal {
        let (tx, sig) = Self::pair();
        let _ = tx.send(());
        sig
    }

    /// Blocks until the signal is fired (or its sender is dropped without
    /// firing, which we also treat as "unblocked" since nothing further
    /// will ever arrive on it).
    pub(crate) fn wait(self) {
        let _ = self.0.recv();
    }
}

/// Fires every sender in `chans`, then clears the list. Non-blocking.
pub(crate) fn fire_all(chans: &mut Vec<SyncSender<()>>) {
    for tx in chans.drain(..) {
        let _ = tx.send(());
    }
}
