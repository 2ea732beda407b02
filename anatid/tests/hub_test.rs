mod common;

use anatid::client::Rejected;
use anatid::{Hub, Mailbox, Payload, Result};
use common::init_tracing;
use std::time::Duration;
use tokio::time::timeout;

fn payload(text: &str) -> Payload {
    Payload::from(text)
}

async fn next(mailbox: &mut Mailbox) -> Option<Payload> {
    timeout(Duration::from_secs(2), mailbox.recv())
        .await
        .expect("mailbox neither delivered nor closed")
}

#[tokio::test]
async fn test_publish_reaches_every_viewer() -> Result<()> {
    init_tracing();
    let hub = Hub::spawn(16);

    let (a, mut mailbox_a) = Mailbox::new(8);
    let (b, mut mailbox_b) = Mailbox::new(8);
    hub.join(a).await?;
    hub.join(b).await?;
    assert_eq!(hub.client_count().await?, 2);

    hub.publish(payload("one")).await?;
    hub.publish(payload("two")).await?;

    for mailbox in [&mut mailbox_a, &mut mailbox_b] {
        assert_eq!(next(mailbox).await.as_deref(), Some("one"));
        assert_eq!(next(mailbox).await.as_deref(), Some("two"));
    }
    Ok(())
}

#[tokio::test]
async fn test_full_queue_is_evicted() -> Result<()> {
    init_tracing();
    let hub = Hub::spawn(16);

    let (healthy_1, mut mailbox_1) = Mailbox::new(8);
    let (healthy_2, mut mailbox_2) = Mailbox::new(8);
    let (stalled, mut stalled_mailbox) = Mailbox::new(1);
    stalled.offer(payload("backlog")).expect("fresh queue has room");
    assert_eq!(stalled.offer(payload("overflow")), Err(Rejected::Full));

    hub.join(healthy_1).await?;
    hub.join(healthy_2).await?;
    hub.join(stalled).await?;
    assert_eq!(hub.client_count().await?, 3);

    hub.publish(payload("P")).await?;
    assert_eq!(hub.client_count().await?, 2);

    assert_eq!(next(&mut mailbox_1).await.as_deref(), Some("P"));
    assert_eq!(next(&mut mailbox_2).await.as_deref(), Some("P"));

    // The evicted viewer drains what it already had, then sees its queue closed.
    assert_eq!(next(&mut stalled_mailbox).await.as_deref(), Some("backlog"));
    assert_eq!(next(&mut stalled_mailbox).await, None);
    Ok(())
}

#[tokio::test]
async fn test_gone_viewer_is_evicted_on_publish() -> Result<()> {
    let hub = Hub::spawn(16);

    let (handle, mailbox) = Mailbox::new(8);
    hub.join(handle).await?;
    drop(mailbox);

    hub.publish(payload("nobody home")).await?;
    assert_eq!(hub.client_count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_leave_closes_queue_and_is_idempotent() -> Result<()> {
    let hub = Hub::spawn(16);

    let (handle, mut mailbox) = Mailbox::new(8);
    let id = handle.id();
    hub.join(handle).await?;
    hub.publish(payload("before leave")).await?;

    hub.leave(id).await?;
    hub.leave(id).await?;
    assert_eq!(hub.client_count().await?, 0);

    assert_eq!(next(&mut mailbox).await.as_deref(), Some("before leave"));
    assert_eq!(next(&mut mailbox).await, None);

    // Publishing afterwards touches nobody and the hub keeps serving.
    hub.publish(payload("after leave")).await?;

    let (fresh, mut fresh_mailbox) = Mailbox::new(8);
    hub.join(fresh).await?;
    hub.publish(payload("welcome back")).await?;
    assert_eq!(hub.client_count().await?, 1);
    assert_eq!(next(&mut fresh_mailbox).await.as_deref(), Some("welcome back"));
    Ok(())
}

#[tokio::test]
async fn test_leave_unknown_viewer_is_noop() -> Result<()> {
    let hub = Hub::spawn(16);

    let (stranger, _mailbox) = Mailbox::new(8);
    hub.leave(stranger.id()).await?;
    assert_eq!(hub.client_count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_run_stops_when_handles_dropped() {
    let (hub, handle) = Hub::new(4);
    let task = tokio::spawn(hub.run());

    drop(handle);
    timeout(Duration::from_secs(2), task)
        .await
        .expect("hub did not stop")
        .expect("hub panicked");
}
