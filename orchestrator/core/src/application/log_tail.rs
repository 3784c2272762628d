// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Log Tail
//!
//! Follows the remote function's log stream by polling. Each poll asks the
//! source for events at or after the newest timestamp already seen minus a
//! lookback, then drops anything still held in a bounded window of recently
//! printed events. The lookback catches late arrivals stamped before the
//! newest event, which log services deliver when concurrent invocations write
//! to separate streams.
//!
//! An event re-delivered after it was evicted from the window is printed a
//! second time, so the window has to hold every event inside the lookback.

use async_stream::try_stream;
use futures::{pin_mut, Stream, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::domain::logs::LogEvent;
use crate::domain::platform::{Credentials, LogSource, RemoteProvisioningError};

pub const DEFAULT_WINDOW_CAPACITY: usize = 10_000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_LOOKBACK: Duration = Duration::from_secs(60);

pub struct LogTail {
    source: Arc<dyn LogSource>,
    credentials: Credentials,
    function_name: String,
    window: VecDeque<LogEvent>,
    seen: HashSet<LogEvent>,
    capacity: usize,
    lookback_ms: i64,
    cursor: Option<i64>,
}

impl LogTail {
    pub fn new(source: Arc<dyn LogSource>, credentials: Credentials, function_name: impl Into<String>) -> Self {
        Self {
            source,
            credentials,
            function_name: function_name.into(),
            window: VecDeque::new(),
            seen: HashSet::new(),
            capacity: DEFAULT_WINDOW_CAPACITY,
            lookback_ms: millis(DEFAULT_LOOKBACK),
            cursor: None,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback_ms = millis(lookback);
        self
    }

    /// Newest timestamp seen so far
    pub fn cursor(&self) -> Option<i64> {
        self.cursor
    }

    /// `start_time` sent with the next fetch
    pub fn query_start(&self) -> Option<i64> {
        self.cursor.map(|cursor| cursor.saturating_sub(self.lookback_ms))
    }

    /// Fetch once and return events not printed before, in source order.
    ///
    /// The first poll returns the whole visible snapshot.
    pub async fn poll(&mut self) -> Result<Vec<LogEvent>, RemoteProvisioningError> {
        let events = self
            .source
            .fetch_logs(&self.credentials, &self.function_name, self.query_start())
            .await?;

        let mut fresh = Vec::new();
        for event in events {
            if event.is_noise() || self.seen.contains(&event) {
                continue;
            }
            self.cursor = Some(self.cursor.map_or(event.timestamp, |c| c.max(event.timestamp)));
            self.remember(event.clone());
            fresh.push(event);
        }

        debug!(function = %self.function_name, fresh = fresh.len(), cursor = ?self.cursor, "Polled log source");
        Ok(fresh)
    }

    fn remember(&mut self, event: LogEvent) {
        if self.window.len() >= self.capacity {
            if let Some(evicted) = self.window.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        self.seen.insert(event.clone());
        self.window.push_back(event);
    }

    /// Poll forever, sleeping `interval` between polls
    pub fn into_stream(
        mut self,
        interval: Duration,
    ) -> impl Stream<Item = Result<LogEvent, RemoteProvisioningError>> {
        try_stream! {
            loop {
                for event in self.poll().await? {
                    yield event;
                }
                tokio::time::sleep(interval).await;
            }
        }
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Hand every new event to `sink` until `shutdown` resolves.
///
/// Returns `Ok` on shutdown; a failed poll ends the loop with its error.
pub async fn run_tail<F, S>(
    tail: LogTail,
    interval: Duration,
    shutdown: F,
    mut sink: S,
) -> Result<(), RemoteProvisioningError>
where
    F: Future<Output = ()>,
    S: FnMut(&LogEvent),
{
    let stream = tail.into_stream(interval);
    pin_mut!(stream);
    pin_mut!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("Log tail cancelled");
                return Ok(());
            }
            next = stream.next() => match next {
                Some(Ok(event)) => sink(&event),
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves one scripted snapshot per call, repeating the last one
    struct ScriptedSource {
        snapshots: Mutex<VecDeque<Vec<LogEvent>>>,
        cursors: Mutex<Vec<Option<i64>>>,
    }

    impl ScriptedSource {
        fn new(snapshots: Vec<Vec<LogEvent>>) -> Arc<Self> {
            Arc::new(Self {
                snapshots: Mutex::new(snapshots.into()),
                cursors: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LogSource for ScriptedSource {
        async fn fetch_logs(
            &self,
            _credentials: &Credentials,
            _function_name: &str,
            start_time: Option<i64>,
        ) -> Result<Vec<LogEvent>, RemoteProvisioningError> {
            self.cursors.lock().unwrap().push(start_time);
            let mut snapshots = self.snapshots.lock().unwrap();
            if snapshots.len() > 1 {
                Ok(snapshots.pop_front().unwrap())
            } else {
                Ok(snapshots.front().cloned().unwrap_or_default())
            }
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            access_token: "token".to_string(),
            region: None,
        }
    }

    #[tokio::test]
    async fn test_first_poll_returns_snapshot_without_noise() {
        let source = ScriptedSource::new(vec![vec![
            LogEvent::new(1, "START RequestId: a"),
            LogEvent::new(2, "hello"),
            LogEvent::new(3, "REPORT RequestId: a"),
            LogEvent::new(4, "world"),
        ]]);
        let mut tail = LogTail::new(source, credentials(), "blog-dev");

        let events = tail.poll().await.unwrap();
        assert_eq!(events, vec![LogEvent::new(2, "hello"), LogEvent::new(4, "world")]);
        assert_eq!(tail.cursor(), Some(4));
    }

    #[tokio::test]
    async fn test_overlapping_snapshots_print_once() {
        let source = ScriptedSource::new(vec![
            vec![LogEvent::new(1, "a"), LogEvent::new(2, "b")],
            vec![LogEvent::new(2, "b"), LogEvent::new(3, "c")],
        ]);
        let mut tail = LogTail::new(source.clone(), credentials(), "blog-dev")
            .with_lookback(Duration::from_millis(1));

        assert_eq!(tail.poll().await.unwrap().len(), 2);
        assert_eq!(tail.poll().await.unwrap(), vec![LogEvent::new(3, "c")]);
        assert!(tail.poll().await.unwrap().is_empty());

        let cursors = source.cursors.lock().unwrap().clone();
        assert_eq!(cursors, vec![None, Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn test_late_arrival_before_cursor_is_printed() {
        let source = ScriptedSource::new(vec![
            vec![LogEvent::new(100, "a"), LogEvent::new(105, "b")],
            vec![LogEvent::new(100, "a"), LogEvent::new(103, "c"), LogEvent::new(105, "b")],
        ]);
        let mut tail = LogTail::new(source.clone(), credentials(), "blog-dev");

        assert_eq!(tail.poll().await.unwrap().len(), 2);
        assert_eq!(tail.poll().await.unwrap(), vec![LogEvent::new(103, "c")]);
        assert_eq!(tail.cursor(), Some(105));

        let cursors = source.cursors.lock().unwrap().clone();
        assert_eq!(cursors, vec![None, Some(105 - 60_000)]);
    }

    #[tokio::test]
    async fn test_window_evicts_oldest() {
        let source = ScriptedSource::new(vec![
            vec![LogEvent::new(1, "a"), LogEvent::new(2, "b"), LogEvent::new(3, "c")],
            vec![LogEvent::new(1, "a"), LogEvent::new(3, "c")],
        ]);
        let mut tail = LogTail::new(source, credentials(), "blog-dev").with_capacity(2);

        tail.poll().await.unwrap();
        // "a" fell out of the window, so a re-delivery prints it again
        assert_eq!(tail.poll().await.unwrap(), vec![LogEvent::new(1, "a")]);
    }

    #[tokio::test]
    async fn test_run_tail_stops_on_shutdown() {
        let source = ScriptedSource::new(vec![vec![LogEvent::new(1, "a")]]);
        let tail = LogTail::new(source, credentials(), "blog-dev");

        let mut printed = Vec::new();
        run_tail(
            tail,
            Duration::from_millis(5),
            tokio::time::sleep(Duration::from_millis(50)),
            |event| printed.push(event.clone()),
        )
        .await
        .unwrap();

        assert_eq!(printed, vec![LogEvent::new(1, "a")]);
    }
}
