// tests/payment_processor_tests.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use lnnfc_common::models::tag::TagId;
use lnnfc_common::traits::{shared, MockTagTransport, TagTransport};
use lnnfc_common::TransportError;

use lnnfc_core::codec::{lnurl, ReferenceEncoding, TagCodec};
use lnnfc_core::eventbus::{ChannelObserver, LoggingObserver, ProcessorEvent};
use lnnfc_core::services::{CycleOutcome, PaymentProcessor, ProcessorConfig};
use lnnfc_core::test_utils::ManualClock;
use lnnfc_core::transport::{MemoryTag, MemoryTransport, TransportOp};

const LINK: &str = "https://lnbits.test/withdraw/api/v1/lnurl/link0001";

fn tag_x() -> TagId {
    TagId::new(vec![0x04, 0x10, 0x20, 0x30, 0x40, 0x50, 0x60])
}

fn tag_y() -> TagId {
    TagId::new(vec![0x04, 0x99, 0x88, 0x77])
}

fn loaded_tag(id: TagId) -> MemoryTag {
    let image = TagCodec::new().encode(LINK, true).unwrap().to_bytes().unwrap();
    MemoryTag::with_memory(id, image)
}

fn config(cooldown_ms: u64) -> ProcessorConfig {
    ProcessorConfig {
        poll_interval: Duration::from_millis(10),
        cooldown: Duration::from_millis(cooldown_ms),
    }
}

async fn connected_reader() -> MemoryTransport {
    let reader = MemoryTransport::new();
    reader.clone().connect().await.unwrap();
    reader
}

#[tokio::test]
async fn test_repeat_reads_inside_cooldown_are_suppressed() {
    let reader = connected_reader().await;
    reader.insert_tag(loaded_tag(tag_x()));
    reader.place(tag_x());

    let clock = Arc::new(ManualClock::at_millis(0));
    let (observer, mut rx) = ChannelObserver::channel(None);
    let mut processor = PaymentProcessor::new(shared(reader.clone()), Arc::new(observer), config(2_000))
        .unwrap()
        .with_clock(clock.clone());

    let mut processed_at = Vec::new();
    let mut last = 0u64;
    for t in [0u64, 800, 1_500, 2_600] {
        clock.advance(Duration::from_millis(t - last));
        last = t;
        match processor.poll_once().await {
            CycleOutcome::Event(ProcessorEvent::Processed(_)) => processed_at.push(t),
            CycleOutcome::Suppressed(id) => assert_eq!(id, tag_x()),
            other => panic!("unexpected outcome at {t}ms: {other:?}"),
        }
    }
    assert_eq!(processed_at, vec![0, 2_600]);

    let mut delivered = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            ProcessorEvent::Processed(p) => {
                assert_eq!(p.tag_id, tag_x());
                assert_eq!(p.redemption_reference, Some(lnurl::to_lnurl(LINK).unwrap()));
                assert_eq!(p.url.as_deref(), Some(LINK));
                assert_eq!(p.encoding, Some(ReferenceEncoding::Lnurl));
                assert!(p.is_valid);
            }
            ProcessorEvent::Failed(f) => panic!("unexpected failure: {}", f.error),
        }
        delivered += 1;
    }
    assert_eq!(delivered, 2);

    let stats = processor.stats();
    assert_eq!(stats.detections, 4);
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.suppressed, 2);
    assert_eq!(stats.tracked_tags, 1);
}

#[tokio::test]
async fn test_distinct_tags_are_each_processed() {
    let reader = connected_reader().await;
    reader.insert_tag(loaded_tag(tag_x()));
    reader.present(tag_x());
    reader.present(tag_y());
    reader.present(tag_x());

    let clock = Arc::new(ManualClock::at_millis(0));
    let mut processor = PaymentProcessor::new(shared(reader), Arc::new(LoggingObserver), config(2_000))
        .unwrap()
        .with_clock(clock.clone());

    let first = processor.poll_once().await;
    clock.advance(Duration::from_millis(100));
    let second = processor.poll_once().await;
    clock.advance(Duration::from_millis(100));
    let third = processor.poll_once().await;

    assert!(matches!(first, CycleOutcome::Event(ProcessorEvent::Processed(_))));
    match second {
        // a blank tag is still a fresh interaction, it just holds no claim
        CycleOutcome::Event(ProcessorEvent::Processed(p)) => {
            assert_eq!(p.tag_id, tag_y());
            assert!(p.redemption_reference.is_none());
            assert!(p.url.is_none());
            assert!(!p.is_valid);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(third, CycleOutcome::Suppressed(tag_x()));
    assert_eq!(processor.poll_once().await, CycleOutcome::Idle);
}

#[tokio::test]
async fn test_wait_fault_is_isolated() {
    let reader = connected_reader().await;
    reader.insert_tag(loaded_tag(tag_x()));
    reader.place(tag_x());
    reader.fail_next(TransportOp::Wait, TransportError::Fault("rf field collapsed".into()));

    let (observer, mut rx) = ChannelObserver::channel(Some(4));
    let mut processor = PaymentProcessor::new(shared(reader), Arc::new(observer), config(2_000)).unwrap();

    assert_eq!(
        processor.poll_once().await,
        CycleOutcome::Fault(TransportError::Fault("rf field collapsed".into()))
    );
    assert!(rx.try_recv().is_err(), "faults emit nothing");

    assert!(matches!(processor.poll_once().await, CycleOutcome::Event(ProcessorEvent::Processed(_))));
    assert_eq!(processor.stats().faults, 1);
}

#[tokio::test]
async fn test_failed_read_is_retried_on_next_detection() {
    let reader = connected_reader().await;
    reader.insert_tag(loaded_tag(tag_x()));
    reader.place(tag_x());
    reader.fail_next(TransportOp::Read, TransportError::TagLost);

    let clock = Arc::new(ManualClock::at_millis(0));
    let mut processor = PaymentProcessor::new(shared(reader), Arc::new(LoggingObserver), config(2_000))
        .unwrap()
        .with_clock(clock.clone());

    match processor.poll_once().await {
        CycleOutcome::Event(ProcessorEvent::Failed(f)) => assert_eq!(f.tag_id, tag_x()),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!processor.is_suppressed(&tag_x()));

    clock.advance(Duration::from_millis(50));
    assert!(matches!(processor.poll_once().await, CycleOutcome::Event(ProcessorEvent::Processed(_))));
    assert!(processor.is_suppressed(&tag_x()));
    assert_eq!(processor.reset_dedup(), 1);
    assert!(!processor.is_suppressed(&tag_x()));
}

#[tokio::test]
async fn test_unparsable_tag_emits_failure() {
    let reader = connected_reader().await;
    reader.insert_tag(MemoryTag::with_memory(tag_y(), vec![0x55, 0x01, 0x02, 0x03]));
    reader.present(tag_y());

    let mut processor = PaymentProcessor::new(shared(reader), Arc::new(LoggingObserver), config(2_000)).unwrap();
    match processor.poll_once().await {
        CycleOutcome::Event(ProcessorEvent::Failed(f)) => assert!(f.error.contains("Codec"), "{}", f.error),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(processor.stats().failures, 1);
}

#[tokio::test]
async fn test_zero_poll_interval_is_rejected() {
    let cfg = ProcessorConfig {
        poll_interval: Duration::ZERO,
        cooldown: Duration::from_secs(2),
    };
    let result = PaymentProcessor::new(shared(MemoryTransport::new()), Arc::new(LoggingObserver), cfg);
    assert!(result.is_err());
}

#[tokio::test]
async fn test_run_stops_on_shutdown_and_disconnects() {
    let reader = MemoryTransport::new().with_realtime(true);
    reader.insert_tag(loaded_tag(tag_x()));
    reader.place(tag_x());

    let (observer, mut rx) = ChannelObserver::channel(Some(8));
    let mut processor = PaymentProcessor::new(shared(reader.clone()), Arc::new(observer), config(60_000)).unwrap();

    let (tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let result = processor.run(shutdown_rx).await;
        (result, processor)
    });

    let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.event_type(), "tag.processed");

    sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();
    let (result, processor) = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    result.unwrap();

    assert_eq!(reader.connects(), 1);
    assert_eq!(reader.disconnects(), 1);
    assert!(!reader.is_connected());
    let stats = processor.stats();
    assert_eq!(stats.processed, 1);
    assert!(stats.suppressed >= 1);
    // the resting tag is re-polled once per poll interval, not in a busy loop
    assert!(stats.cycles < 40, "{} cycles", stats.cycles);
    assert!(stats.started_at.is_some());
}

#[tokio::test]
async fn test_run_fails_when_reader_cannot_connect() {
    let mut transport = MockTagTransport::new();
    transport
        .expect_connect()
        .times(1)
        .returning(|| Err(TransportError::Fault("no reader on bus".into())));
    transport.expect_wait_for_tag().never();

    let mut processor = PaymentProcessor::new(shared(transport), Arc::new(LoggingObserver), config(2_000)).unwrap();
    let (_tx, rx) = watch::channel(false);
    let err = processor.run(rx).await.unwrap_err();
    assert!(err.to_string().contains("no reader on bus"), "{err}");
}
