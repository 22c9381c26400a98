use super::job::HookEvent;
use crate::bindings::BindingChangeListener;
use tokio::sync::mpsc;
use tracing::debug;

/// Forwards binding changes to the scheduler as hook events.
#[derive(Clone)]
pub struct HookNotifier {
    sender: mpsc::Sender<HookEvent>,
}

impl HookNotifier {
    pub fn new(sender: mpsc::Sender<HookEvent>) -> Self {
        Self { sender }
    }
}

impl BindingChangeListener for HookNotifier {
    fn bindings_marked_to_update(&self, count: usize) {
        // A full channel already holds an event that will trigger the sweep
        if self.sender.try_send(HookEvent::OnBindingsChanged).is_err() {
            debug!("Hook channel full, dropping change of {} bindings", count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifier_sends_hook_and_tolerates_full_channel() {
        let (tx, mut rx) = mpsc::channel(1);
        let notifier = HookNotifier::new(tx);

        notifier.bindings_marked_to_update(3);
        notifier.bindings_marked_to_update(2);

        assert_eq!(rx.try_recv().unwrap(), HookEvent::OnBindingsChanged);
        assert!(rx.try_recv().is_err());
    }
}
