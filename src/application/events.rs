// Typed event channel shared by the service and the presentation layer
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardEvent {
    /// Restart chart-data polling from the store's current offsets.
    ReloadChartData,
    Loading(bool),
    /// The host asked to import a project path.
    ImportFile(String),
    /// The host removed or reset the data source.
    FilesRemoved,
    /// A message the user should see.
    Notify(String),
}

#[derive(Debug, Clone)]
pub struct EventChannel {
    tx: broadcast::Sender<DashboardEvent>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: DashboardEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn notify(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        self.emit(DashboardEvent::Notify(message));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_sees_events() {
        let channel = EventChannel::default();
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();

        channel.emit(DashboardEvent::ReloadChartData);
        channel.notify("backend down");

        assert_eq!(a.recv().await.unwrap(), DashboardEvent::ReloadChartData);
        assert_eq!(b.recv().await.unwrap(), DashboardEvent::ReloadChartData);
        assert_eq!(
            a.recv().await.unwrap(),
            DashboardEvent::Notify("backend down".into())
        );
    }

    #[test]
    fn test_emit_without_subscribers() {
        EventChannel::new(0).emit(DashboardEvent::FilesRemoved);
    }
}
