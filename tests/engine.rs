use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::Instant;

use cellvisor::{
    CellError, Delivery, Engine, EngineConfig, Event, EventKind, Generate, GenerateFn, Graph,
    Inputs, OverflowPolicy, ProducerError, ProducerStatus, RuntimeError, Schedule, Subscribe,
    Value,
};

fn config() -> EngineConfig {
    EngineConfig {
        grace: Duration::from_secs(1),
        ..EngineConfig::default()
    }
}

async fn next_event(rx: &mut broadcast::Receiver<Event>, pred: impl Fn(&Event) -> bool) -> Event {
    loop {
        match rx.recv().await {
            Ok(ev) if pred(&ev) => return ev,
            Ok(_) => continue,
            Err(err) => panic!("event stream broken: {err}"),
        }
    }
}

/// Events of the next pass triggered by `trigger`, up to and including `PassCompleted`.
async fn next_pass(rx: &mut broadcast::Receiver<Event>, trigger: &str) -> Vec<Event> {
    let mut pass = Vec::new();
    loop {
        let ev = next_event(rx, |ev| ev.trigger.as_deref() == Some(trigger)).await;
        let done = ev.kind == EventKind::PassCompleted;
        pass.push(ev);
        if done {
            return pass;
        }
    }
}

fn named<'a>(pass: &'a [Event], kind: EventKind) -> Vec<&'a str> {
    pass.iter()
        .filter(|ev| ev.kind == kind)
        .filter_map(|ev| ev.name.as_deref())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn channel_items_reach_cells_in_order() {
    let mut graph = Graph::new();
    let mut next = 0.0;
    let generator = GenerateFn::new(move || {
        next += 1.0;
        if next > 3.0 {
            return Err(ProducerError::fail("exhausted"));
        }
        Ok(next)
    });
    let (update, producer) = graph
        .register_producer("update", generator, 2, Duration::ZERO)
        .unwrap();
    let seen = graph.declare_window("seen", "update", 10, None).unwrap();

    let engine = Engine::builder(config()).start(graph).await.unwrap();

    let snapshot = seen.wait_version(3).await.unwrap();
    assert_eq!(snapshot.value.floats(), Some(vec![1.0, 2.0, 3.0]));
    assert!(update.pending() <= 2);
    assert_eq!(
        producer.wait_finished().await,
        ProducerStatus::Failed(ProducerError::fail("exhausted"))
    );
    assert_eq!(engine.stats().arrivals, 3);

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn each_input_change_reevaluates_once() {
    let mut graph = Graph::new();
    let a = graph.declare_control("a", 1.0).unwrap();
    let b = graph.declare_control("b", 1.0).unwrap();
    let sum = graph
        .declare_cell("sum", &["a", "b"], |i: &Inputs| {
            Ok(Value::Float(i.f64("a")? + i.f64("b")?))
        })
        .unwrap();

    let engine = Engine::builder(config()).start(graph).await.unwrap();
    assert_eq!(sum.wait_value().await, Ok(Value::Float(2.0)));

    a.set(2.0);
    assert_eq!(sum.wait_version(2).await.unwrap().value, Value::Float(3.0));
    b.set(3.0);
    assert_eq!(sum.wait_version(3).await.unwrap().value, Value::Float(5.0));
    assert_eq!(engine.current_value(&sum), Ok(Value::Float(5.0)));

    let stats = engine.stats();
    assert_eq!(stats.input_changes, 2);
    assert_eq!(stats.passes, 3);
    assert_eq!(stats.evaluations, 3);
    assert_eq!(sum.version(), 3);

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn inputs_are_read_when_the_engine_starts() {
    use std::sync::atomic::{AtomicI64, Ordering};

    let knob = Arc::new(AtomicI64::new(1));
    let reader = Arc::clone(&knob);
    let mut graph = Graph::new();
    graph
        .declare_input("knob", move || Value::Int(reader.load(Ordering::SeqCst)))
        .unwrap();
    let echo = graph
        .declare_cell("echo", &["knob"], |i: &Inputs| Ok(i.get("knob")?.clone()))
        .unwrap();

    knob.store(7, Ordering::SeqCst);
    let engine = Engine::builder(config()).start(graph).await.unwrap();

    assert_eq!(echo.wait_value().await, Ok(Value::Int(7)));
    assert_eq!(engine.current_value(&echo), Ok(Value::Int(7)));
    assert_eq!(echo.version(), 1);

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn simultaneous_firings_run_as_separate_ordered_passes() {
    let mut graph = Graph::new();
    let channel = graph
        .declare_channel("ch", 4, OverflowPolicy::Block)
        .unwrap();
    let period = Duration::from_secs(10);
    graph
        .declare_timer("tick", Instant::now() + period, Schedule::every(period))
        .unwrap();
    let combined = graph
        .declare_cell("combined", &["ch", "tick"], |i: &Inputs| {
            Ok(Value::Int(i.i64("ch")? * 100 + i.i64("tick")?))
        })
        .unwrap();

    let engine = Engine::builder(config()).build();
    let mut rx = engine.subscribe();
    assert_eq!(channel.channel().put(Value::Int(1)).await, Delivery::Enqueued);
    engine.start(graph).await.unwrap();
    assert_eq!(combined.wait_version(1).await.unwrap().value, Value::Int(100));

    // A second item is queued and the timer comes due before the driver looks again.
    assert_eq!(channel.channel().put(Value::Int(2)).await, Delivery::Enqueued);
    tokio::time::advance(period).await;

    let last = combined.wait_version(3).await.unwrap();
    assert_eq!(last.version, 3);
    // Whichever pass ran second saw the source updated by the first.
    assert_eq!(last.value, Value::Int(201));

    engine.shutdown().await.unwrap();

    let mut open: Option<u64> = None;
    let mut versions = Vec::new();
    let mut triggers = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        match ev.kind {
            EventKind::PassStarted => {
                assert_eq!(open, None, "pass {:?} started inside another", ev.pass);
                open = ev.pass;
            }
            EventKind::CellEvaluated => {
                assert_eq!(ev.pass, open);
                versions.push(ev.version.unwrap());
                triggers.push(ev.trigger.as_deref().unwrap().to_string());
            }
            EventKind::PassCompleted => {
                assert_eq!(ev.pass, open);
                open = None;
            }
            _ => {}
        }
    }
    assert_eq!(open, None);
    assert_eq!(versions, vec![1, 2, 3]);
    let mut simultaneous = triggers[1..].to_vec();
    simultaneous.sort();
    assert_eq!(simultaneous, vec!["ch", "tick"]);
}

#[tokio::test(start_paused = true)]
async fn failing_cell_keeps_value_and_blocks_readers() {
    let mut graph = Graph::new();
    let x = graph.declare_control("x", 2.0).unwrap();
    let ratio = graph
        .declare_cell("ratio", &["x"], |i: &Inputs| {
            let x = i.f64("x")?;
            if x == 0.0 {
                return Err(CellError::fail("division by zero"));
            }
            Ok(Value::Float(1.0 / x))
        })
        .unwrap();
    let percent = graph
        .declare_cell("percent", &["ratio"], |i: &Inputs| {
            Ok(Value::Float(i.f64("ratio")? * 100.0))
        })
        .unwrap();

    let engine = Engine::builder(config()).build();
    let mut rx = engine.subscribe();
    engine.start(graph).await.unwrap();
    assert_eq!(percent.wait_value().await, Ok(Value::Float(50.0)));

    x.set(0.0);
    let pass = next_pass(&mut rx, "x").await;
    assert_eq!(named(&pass, EventKind::CellFailed), vec!["ratio"]);
    assert_eq!(named(&pass, EventKind::CellBlocked), vec!["percent"]);
    assert!(named(&pass, EventKind::CellEvaluated).is_empty());
    let failed = pass
        .iter()
        .find(|ev| ev.kind == EventKind::CellFailed)
        .and_then(|ev| ev.reason.as_deref());
    assert_eq!(failed, Some("error: division by zero"));

    assert_eq!(ratio.version(), 1);
    assert_eq!(ratio.current_value(), Ok(Value::Float(0.5)));
    assert_eq!(percent.version(), 1);
    assert_eq!(percent.current_value(), Ok(Value::Float(50.0)));

    x.set(4.0);
    assert_eq!(percent.wait_version(2).await.unwrap().value, Value::Float(25.0));
    assert_eq!(engine.stats().failures, 1);

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn timer_reschedules_even_when_dependents_fail() {
    let period = Duration::from_secs(10);
    let first = Instant::now() + period;

    let mut graph = Graph::new();
    let timer = graph
        .declare_timer("memory", first, Schedule::every(period))
        .unwrap();
    graph
        .declare_cell("sample", &["memory"], |_: &Inputs| Err(CellError::fail("sampler offline")))
        .unwrap();

    let engine = Engine::builder(config()).build();
    let mut rx = engine.subscribe();
    engine.start(graph).await.unwrap();

    for fires in 1..=3u64 {
        let ev = next_event(&mut rx, |ev| ev.kind == EventKind::TimerFired).await;
        assert_eq!(ev.count, Some(fires));
        assert_eq!(ev.delay_ms, Some(10_000));

        let pass = next_pass(&mut rx, "memory").await;
        assert_eq!(named(&pass, EventKind::CellFailed), vec!["sample"]);
    }
    assert_eq!(timer.fires(), 3);
    assert_eq!(timer.next_due(), first + period * 3);

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn gate_holds_cell_until_enabled() {
    let mut graph = Graph::new();
    let enabled = graph.declare_control("enabled", false).unwrap();
    let level = graph.declare_control("level", 3).unwrap();
    let heavy = graph
        .declare_cell("heavy", &["level"], |i: &Inputs| Ok(Value::Int(i.i64("level")? * 10)))
        .unwrap();
    graph.gate(&heavy, &enabled).unwrap();

    let engine = Engine::builder(config()).build();
    let mut rx = engine.subscribe();
    engine.start(graph).await.unwrap();

    let startup = next_pass(&mut rx, "startup").await;
    assert_eq!(named(&startup, EventKind::CellGated), vec!["heavy"]);
    assert!(matches!(heavy.current_value(), Err(RuntimeError::NotReady { .. })));

    level.set(4);
    let pass = next_pass(&mut rx, "level").await;
    assert_eq!(named(&pass, EventKind::CellGated), vec!["heavy"]);

    enabled.set(true);
    assert_eq!(heavy.wait_value().await, Ok(Value::Int(40)));

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stopping_a_producer_keeps_the_engine_running() {
    let mut graph = Graph::new();
    let mut n = 0i64;
    let generator = GenerateFn::new(move || {
        n += 1;
        Ok::<_, ProducerError>(n)
    });
    let (_update, producer) = graph
        .register_producer("update", generator, 2, Duration::from_secs(2))
        .unwrap();
    let latest = graph
        .declare_cell("latest", &["update"], |i: &Inputs| Ok(i.get("update")?.clone()))
        .unwrap();
    let shift = graph.declare_control("shift", 0).unwrap();
    let shifted = graph
        .declare_cell("shifted", &["latest", "shift"], |i: &Inputs| {
            Ok(Value::Int(i.i64("latest")? + i.i64("shift")?))
        })
        .unwrap();

    let engine = Engine::builder(config()).start(graph).await.unwrap();
    latest.wait_version(2).await.unwrap();

    producer.stop();
    let status = producer.wait_finished().await;
    assert!(matches!(status, ProducerStatus::Stopped { delivered } if delivered >= 2));
    assert!(engine.is_running().await);

    let before = latest.version();
    shift.set(100);
    let shifted_now = shifted.wait_version(before + 1).await.unwrap();
    assert!(shifted_now.value.as_i64().is_some_and(|v| v > 100));
    assert_eq!(latest.version(), before);

    engine.shutdown().await.unwrap();
    assert!(!engine.is_running().await);
}

struct Hang;

#[async_trait]
impl Generate for Hang {
    async fn generate(&mut self) -> Result<Value, ProducerError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn shutdown_reports_producers_stuck_past_grace() {
    let mut graph = Graph::new();
    graph
        .register_producer("hang", Hang, 1, Duration::from_secs(1))
        .unwrap();
    graph
        .register_producer(
            "ok",
            GenerateFn::new(|| Ok::<_, ProducerError>(1.0)),
            1,
            Duration::from_secs(1),
        )
        .unwrap();

    let engine = Engine::builder(config()).start(graph).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(engine.running_producers().await, vec!["hang", "ok"]);

    let err = engine.shutdown().await.unwrap_err();
    assert_eq!(
        err,
        RuntimeError::GraceExceeded {
            grace: Duration::from_secs(1),
            stuck: vec!["hang".to_string()],
        }
    );
    assert_eq!(err.as_label(), "runtime_grace_exceeded");
}

#[tokio::test]
async fn second_start_is_rejected() {
    let engine = Engine::builder(config()).start(Graph::new()).await.unwrap();
    assert_eq!(
        engine.start(Graph::new()).await,
        Err(RuntimeError::AlreadyStarted)
    );
    engine.shutdown().await.unwrap();
}

#[derive(Default)]
struct Record {
    kinds: Mutex<Vec<EventKind>>,
}

#[async_trait]
impl Subscribe for Record {
    async fn on_event(&self, ev: &Event) {
        if let Ok(mut kinds) = self.kinds.lock() {
            kinds.push(ev.kind);
        }
    }

    fn name(&self) -> &'static str {
        "record"
    }
}

#[tokio::test(start_paused = true)]
async fn subscribers_receive_events_until_shutdown_completes() {
    let record = Arc::new(Record::default());
    let mut graph = Graph::new();
    let n = graph.declare_control("n", 1).unwrap();
    let doubled = graph
        .declare_cell("doubled", &["n"], |i: &Inputs| Ok(Value::Int(i.i64("n")? * 2)))
        .unwrap();

    let engine = Engine::builder(config())
        .with_subscribers(vec![record.clone() as Arc<dyn Subscribe>])
        .start(graph)
        .await
        .unwrap();
    doubled.wait_value().await.unwrap();
    n.set(2);
    doubled.wait_version(2).await.unwrap();
    engine.shutdown().await.unwrap();

    let kinds = record.kinds.lock().unwrap().clone();
    assert_eq!(kinds.first(), Some(&EventKind::PassStarted));
    assert!(kinds.contains(&EventKind::EngineStarted));
    assert!(kinds.contains(&EventKind::InputChanged));
    assert_eq!(
        kinds.iter().filter(|k| **k == EventKind::CellEvaluated).count(),
        2
    );
    assert_eq!(
        &kinds[kinds.len() - 2..],
        &[EventKind::ShutdownRequested, EventKind::AllStoppedWithin]
    );
}
