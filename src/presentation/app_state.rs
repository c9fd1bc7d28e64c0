// Application state for HTTP handlers
use crate::application::dashboard_service::DashboardService;
use crate::application::events::{DashboardEvent, EventChannel};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

const MAX_NOTIFICATIONS: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub dashboard: DashboardService,
    pub notifications: NotificationLog,
}

/// The most recent user-facing messages, oldest first.
#[derive(Debug, Clone, Default)]
pub struct NotificationLog(Arc<Mutex<VecDeque<String>>>);

impl NotificationLog {
    pub fn push(&self, message: String) {
        let mut log = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if log.len() == MAX_NOTIFICATIONS {
            log.pop_front();
        }
        log.push_back(message);
    }

    pub fn recent(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Records every `Notify` event from now on.
    pub fn spawn_collector(&self, events: &EventChannel) -> JoinHandle<()> {
        let mut rx = events.subscribe();
        let log = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(DashboardEvent::Notify(message)) => log.push(message),
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("Notification log missed {} events", n);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_keeps_latest_messages() {
        let log = NotificationLog::default();
        for i in 0..MAX_NOTIFICATIONS + 2 {
            log.push(format!("m{}", i));
        }
        let recent = log.recent();
        assert_eq!(recent.len(), MAX_NOTIFICATIONS);
        assert_eq!(recent[0], "m2");
    }

    #[tokio::test]
    async fn test_collector_records_notifications_only() {
        let events = EventChannel::default();
        let log = NotificationLog::default();
        let collector = log.spawn_collector(&events);

        events.emit(DashboardEvent::Loading(true));
        events.notify("request failed: /ScalarVisually/GetAddFiles");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(log.recent(), vec!["request failed: /ScalarVisually/GetAddFiles"]);
        collector.abort();
    }
}
