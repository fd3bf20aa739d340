use async_trait::async_trait;
use codex_bot::{ChannelDebouncer, Flush, FlushHandler, PendingMessage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

const WINDOW: Duration = Duration::from_secs(10);

/// Records every flush and how many were in progress at once
struct Recorder {
    flushes: Mutex<Vec<(Instant, String, Vec<String>)>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    hold: Duration,
}

impl Recorder {
    fn new(hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            flushes: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            hold,
        })
    }

    fn batches(&self) -> Vec<Vec<String>> {
        self.flushes.lock().iter().map(|(_, _, b)| b.clone()).collect()
    }
}

#[async_trait]
impl FlushHandler for Recorder {
    async fn handle_flush(&self, flush: Flush) {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        self.flushes.lock().push((
            Instant::now(),
            flush.channel_id.clone(),
            flush.messages.iter().map(|m| m.content.clone()).collect(),
        ));

        if !self.hold.is_zero() {
            sleep(self.hold).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn msg(content: &str) -> PendingMessage {
    PendingMessage::new("alice", content)
}

#[tokio::test(start_paused = true)]
async fn test_burst_flushes_leading_then_trailing() {
    let recorder = Recorder::new(Duration::ZERO);
    let debouncer = ChannelDebouncer::new(WINDOW, true, recorder.clone());
    let t0 = Instant::now();

    debouncer.on_message("c1", "general", msg("a"));
    sleep(Duration::from_secs(2)).await;
    debouncer.on_message("c1", "general", msg("b"));
    sleep(Duration::from_secs(3)).await;
    debouncer.on_message("c1", "general", msg("c"));
    sleep(Duration::from_secs(7)).await;

    assert_eq!(recorder.batches(), vec![vec!["a"], vec!["b", "c"]]);

    let flushes = recorder.flushes.lock();
    let trailing_at = flushes[1].0;
    assert!(trailing_at >= t0 + WINDOW);
    assert!(trailing_at < t0 + WINDOW + Duration::from_secs(1));
    assert_eq!(debouncer.registry().pending_len("c1"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_handler_never_overlaps() {
    let recorder = Recorder::new(Duration::from_secs(15));
    let debouncer = ChannelDebouncer::new(WINDOW, true, recorder.clone());

    debouncer.on_message("c1", "general", msg("a"));
    sleep(Duration::from_secs(2)).await;
    debouncer.on_message("c1", "general", msg("b"));
    sleep(Duration::from_secs(3)).await;
    debouncer.on_message("c1", "general", msg("c"));
    sleep(Duration::from_secs(7)).await;
    // Window has reopened but the first flush is still running
    debouncer.on_message("c1", "general", msg("d"));
    assert!(debouncer.registry().is_in_flight("c1"));
    sleep(Duration::from_secs(8)).await;
    debouncer.on_message("c1", "general", msg("e"));
    sleep(Duration::from_secs(40)).await;

    assert_eq!(recorder.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(
        recorder.batches(),
        vec![vec!["a"], vec!["b", "c", "d"], vec!["e"]]
    );
    assert!(!debouncer.registry().is_in_flight("c1"));
}

#[tokio::test(start_paused = true)]
async fn test_without_trailing_flush_messages_wait_for_next_arrival() {
    let recorder = Recorder::new(Duration::ZERO);
    let debouncer = ChannelDebouncer::new(WINDOW, false, recorder.clone());

    debouncer.on_message("c1", "general", msg("a"));
    sleep(Duration::from_secs(2)).await;
    debouncer.on_message("c1", "general", msg("b"));
    sleep(Duration::from_secs(28)).await;

    assert_eq!(recorder.batches(), vec![vec!["a"]]);
    assert_eq!(debouncer.registry().pending_len("c1"), 1);

    debouncer.on_message("c1", "general", msg("c"));
    sleep(Duration::from_secs(1)).await;
    assert_eq!(recorder.batches(), vec![vec!["a"], vec!["b", "c"]]);
}

#[tokio::test(start_paused = true)]
async fn test_channels_flush_independently() {
    let recorder = Recorder::new(Duration::from_secs(5));
    let debouncer = ChannelDebouncer::new(WINDOW, true, recorder.clone());

    debouncer.on_message("c1", "general", msg("one"));
    debouncer.on_message("c2", "random", msg("two"));
    sleep(Duration::from_secs(1)).await;

    let mut channels: Vec<String> = recorder
        .flushes
        .lock()
        .iter()
        .map(|(_, channel, _)| channel.clone())
        .collect();
    channels.sort();
    assert_eq!(channels, vec!["c1", "c2"]);
    assert_eq!(recorder.max_active.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_every_message_delivered_once_in_order() {
    let recorder = Recorder::new(Duration::from_secs(3));
    let debouncer = ChannelDebouncer::new(WINDOW, true, recorder.clone());

    let sent: Vec<String> = (0..40).map(|i| format!("m{}", i)).collect();
    for content in &sent {
        debouncer.on_message("c1", "general", msg(content));
        sleep(Duration::from_millis(1700)).await;
    }
    sleep(Duration::from_secs(60)).await;

    let delivered: Vec<String> = recorder.batches().into_iter().flatten().collect();
    assert_eq!(delivered, sent);
    assert_eq!(recorder.max_active.load(Ordering::SeqCst), 1);

    // Consecutive flushes are at least one window apart
    let times: Vec<Instant> = recorder.flushes.lock().iter().map(|(t, _, _)| *t).collect();
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= WINDOW);
    }
}
