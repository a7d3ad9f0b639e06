#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use productivity_bot::services::delivery::{
    inline_keyboard, InlineButton, MessageSender, Messenger, OutboundMessage, SenderFactory,
};

/// Records what it sends, or fails every time.
struct MockSender {
    fail: bool,
    sent: Mutex<Vec<OutboundMessage>>,
    attempts: AtomicUsize,
}

impl MockSender {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
        })
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for MockSender {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("connection reset"));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// A factory that hands out `fresh` and counts how often it was asked.
fn factory(fresh: Arc<MockSender>, built: Arc<AtomicUsize>) -> SenderFactory {
    Arc::new(move || {
        built.fetch_add(1, Ordering::SeqCst);
        let sender: Arc<dyn MessageSender> = fresh.clone();
        sender
    })
}

fn message() -> OutboundMessage {
    OutboundMessage::new(555, "🔔 *Reminder*").with_buttons(vec![vec![
        InlineButton::new("✅ Done", "reminder_done_1"),
        InlineButton::new("⏰ Snooze", "reminder_snooze_1"),
    ]])
}

#[tokio::test]
async fn test_primary_success_needs_no_retry() {
    let primary = MockSender::new(false);
    let fresh = MockSender::new(false);
    let built = Arc::new(AtomicUsize::new(0));
    let messenger = Messenger::new(primary.clone(), factory(fresh.clone(), built.clone()));

    assert!(messenger.deliver(&message()).await);

    assert_eq!(primary.sent(), vec![message()]);
    assert_eq!(built.load(Ordering::SeqCst), 0);
    assert_eq!(fresh.attempts(), 0);
}

#[tokio::test]
async fn test_failure_retries_once_on_fresh_client() {
    let primary = MockSender::new(true);
    let fresh = MockSender::new(false);
    let built = Arc::new(AtomicUsize::new(0));
    let messenger = Messenger::new(primary.clone(), factory(fresh.clone(), built.clone()));

    assert!(messenger.deliver(&message()).await);

    assert_eq!(primary.attempts(), 1);
    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert_eq!(fresh.sent(), vec![message()]);
}

#[tokio::test]
async fn test_second_failure_gives_up() {
    let primary = MockSender::new(true);
    let fresh = MockSender::new(true);
    let built = Arc::new(AtomicUsize::new(0));
    let messenger = Messenger::new(primary.clone(), factory(fresh.clone(), built.clone()));

    assert!(!messenger.deliver(&message()).await);

    assert_eq!(primary.attempts(), 1);
    assert_eq!(fresh.attempts(), 1);
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_each_delivery_gets_its_own_retry() {
    let primary = MockSender::new(true);
    let fresh = MockSender::new(false);
    let built = Arc::new(AtomicUsize::new(0));
    let messenger = Messenger::new(primary.clone(), factory(fresh.clone(), built.clone()));

    assert!(messenger.deliver(&message()).await);
    assert!(messenger.clone().deliver(&message()).await);

    assert_eq!(primary.attempts(), 2);
    assert_eq!(built.load(Ordering::SeqCst), 2);
    assert_eq!(fresh.sent().len(), 2);
}

#[test]
fn test_inline_keyboard_keeps_rows() {
    let markup = inline_keyboard(&message().buttons);
    assert_eq!(markup.inline_keyboard.len(), 1);
    assert_eq!(markup.inline_keyboard[0].len(), 2);
    assert_eq!(markup.inline_keyboard[0][0].text, "✅ Done");
}
