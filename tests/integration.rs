//! Integration tests for trestle.
//!
//! These exercise the public API from outside the crate: table sessions
//! rendered against the headless test widget, state flowing through the
//! payload stream, persisted-state wiring, and external-stream polling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use trestle::host::{KeyValueStore, TableWidget};
use trestle::layout::{BoxStyle, Cell, Container};
use trestle::queue::{BatchQueue, BatchQueueConfig};
use trestle::session::{
    get_table, HookError, PersistConfig, PreloadConfig, RenderContext, RenderNode, RenderOpts,
    Table, TableConfig,
};
use trestle::stream::{RegisterOpts, Stream};
use trestle::testing::{MemoryStore, TestWidget};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Counter {
    count: i32,
}

/// Let spawned render/update tasks drain. Everything in the render path is
/// yield-driven (no timers), so a bounded yield loop is deterministic.
async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

fn counter_rows(ctx: &RenderContext<Counter, ()>) -> Result<Vec<RenderNode>, HookError> {
    let count = ctx.state.as_deref().map_or(0, |s| s.count);
    let cell = Cell::text(format!("count: {count}"), BoxStyle::new())?;
    let row = Container::new(vec![cell.into()], BoxStyle::new(), None)?;
    Ok(vec![row.into()])
}

/// A session rendering one row from `Counter` state, counting provider calls.
fn counter_table(
    widget: Arc<TestWidget>,
    default_state: Counter,
) -> (Table<Counter, (), i32>, Arc<AtomicUsize>) {
    let renders = Arc::new(AtomicUsize::new(0));
    let renders_in_provider = Arc::clone(&renders);
    let config = TableConfig::<Counter, (), i32>::new("counter", move |ctx| {
        renders_in_provider.fetch_add(1, Ordering::SeqCst);
        counter_rows(&ctx)
    })
    .with_default_state(default_state);
    (get_table(config, widget), renders)
}

// ---------------------------------------------------------------------------
// Presentation & state flow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn present_commits_rows_and_resolves_with_final_state() {
    let widget = TestWidget::new();
    let (table, renders) = counter_table(Arc::clone(&widget), Counter { count: 0 });

    let presenter = table.clone();
    let presented = tokio::spawn(async move { presenter.present(RenderOpts::default()).await });
    settle().await;

    assert!(table.is_active());
    assert!(widget.is_presented());
    assert_eq!(renders.load(Ordering::SeqCst), 1);
    assert_eq!(widget.row_count(), 1);
    assert_eq!(widget.rows()[0].cells[0].value, "count: 0");

    table.set_state(Counter { count: 3 });
    settle().await;
    assert_eq!(widget.rows()[0].cells[0].value, "count: 3");

    widget.dismiss();
    let final_state = presented.await.unwrap().unwrap();
    assert_eq!(final_state.as_deref(), Some(&Counter { count: 3 }));
    assert!(!table.is_active());
}

#[tokio::test]
async fn equal_set_state_is_memoized_away() {
    let widget = TestWidget::new();
    let (table, renders) = counter_table(Arc::clone(&widget), Counter { count: 0 });

    let presenter = table.clone();
    let presented = tokio::spawn(async move { presenter.present(RenderOpts::default()).await });
    settle().await;
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    // Identical value: no payload update, no render.
    table.set_state(Counter { count: 0 });
    settle().await;
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    table.set_state(Counter { count: 1 });
    settle().await;
    assert_eq!(renders.load(Ordering::SeqCst), 2);

    widget.dismiss();
    presented.await.unwrap().unwrap();
}

#[tokio::test]
async fn synchronous_state_burst_coalesces_into_one_recompute() {
    let widget = TestWidget::new();
    let (table, renders) = counter_table(Arc::clone(&widget), Counter { count: 0 });

    let presenter = table.clone();
    let presented = tokio::spawn(async move { presenter.present(RenderOpts::default()).await });
    settle().await;
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    for count in 1..=5 {
        table.set_state(Counter { count });
    }
    settle().await;

    // One recompute, reflecting only the last value.
    assert_eq!(renders.load(Ordering::SeqCst), 2);
    assert_eq!(widget.rows()[0].cells[0].value, "count: 5");

    widget.dismiss();
    presented.await.unwrap().unwrap();
}

#[tokio::test]
async fn rerender_bypasses_memoization() {
    let widget = TestWidget::new();
    let (table, renders) = counter_table(Arc::clone(&widget), Counter { count: 0 });

    let presenter = table.clone();
    let presented = tokio::spawn(async move { presenter.present(RenderOpts::default()).await });
    settle().await;

    table.rerender();
    settle().await;
    assert_eq!(renders.load(Ordering::SeqCst), 2);

    widget.dismiss();
    presented.await.unwrap().unwrap();
}

#[tokio::test]
async fn update_state_derives_from_current_state() {
    let widget = TestWidget::new();
    let (table, _renders) = counter_table(Arc::clone(&widget), Counter { count: 10 });

    let presenter = table.clone();
    let presented = tokio::spawn(async move { presenter.present(RenderOpts::default()).await });
    settle().await;

    table.update_state(|state| {
        let current = state.as_deref().map_or(0, |s| s.count);
        Counter { count: current + 5 }
    });
    settle().await;
    assert_eq!(table.get_state().as_deref(), Some(&Counter { count: 15 }));

    widget.dismiss();
    presented.await.unwrap().unwrap();
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hooks_fire_in_order_across_renders() {
    let widget = TestWidget::new();
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let push = |name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>| {
        let log = Arc::clone(log);
        move || {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(name);
                Ok(())
            }
        }
    };

    let config = TableConfig::<Counter, (), ()>::new("hooks", |ctx| counter_rows(&ctx))
        .with_default_state(Counter { count: 0 })
        .on_before_load(push("before_load", &log))
        .on_after_props_load(push("after_props_load", &log))
        .on_before_every_render(push("before_every_render", &log))
        .on_second_render(push("on_second_render", &log))
        .on_after_first_render(push("after_first_render", &log));
    let table = get_table(config, Arc::clone(&widget) as Arc<dyn TableWidget>);

    let presenter = table.clone();
    let presented = tokio::spawn(async move { presenter.present(RenderOpts::default()).await });
    settle().await;
    assert_eq!(
        *log.lock(),
        vec![
            "before_load",
            "after_props_load",
            "before_every_render",
            "after_first_render",
        ]
    );

    // Second render: generation is Once, so on_second_render runs after
    // before_every_render; after_first_render never repeats.
    table.set_state(Counter { count: 1 });
    settle().await;
    assert_eq!(
        &log.lock()[4..],
        &["before_every_render", "on_second_render"]
    );

    // Third render: generation is Many.
    table.set_state(Counter { count: 2 });
    settle().await;
    assert_eq!(&log.lock()[6..], &["before_every_render"]);

    widget.dismiss();
    presented.await.unwrap().unwrap();
}

#[tokio::test]
async fn props_load_once_and_are_visible_to_the_provider() {
    let widget = TestWidget::new();
    let loads = Arc::new(AtomicUsize::new(0));
    let loads_in_loader = Arc::clone(&loads);

    let config = TableConfig::<Counter, String, ()>::new("props", |ctx: RenderContext<Counter, String>| {
        let title = ctx.props.as_deref().cloned().unwrap_or_default();
        let cell = Cell::text(title, BoxStyle::new())?;
        let row = Container::new(vec![cell.into()], BoxStyle::new(), None)?;
        Ok(vec![row.into()])
    })
    .with_props_loader(move || {
        let loads = Arc::clone(&loads_in_loader);
        async move {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok("Inbox".to_owned())
        }
    });
    let table = get_table(config, Arc::clone(&widget) as Arc<dyn TableWidget>);

    let presenter = table.clone();
    let presented = tokio::spawn(async move { presenter.present(RenderOpts::default()).await });
    settle().await;

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(table.get_props().as_deref().map(String::as_str), Some("Inbox"));
    assert_eq!(widget.rows()[0].cells[0].value, "Inbox");

    table.rerender();
    settle().await;
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    widget.dismiss();
    presented.await.unwrap().unwrap();
}

// ---------------------------------------------------------------------------
// Persisted state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn persisted_state_wins_over_the_default() {
    let widget = TestWidget::new();
    let store = MemoryStore::with_entry("counter-state", r#"{"count":9}"#);

    let config = TableConfig::<Counter, (), ()>::new("persisted", |ctx| counter_rows(&ctx))
        .with_default_state(Counter { count: 0 })
        .with_persistence(PersistConfig::json(
            "counter-state",
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
            Duration::from_secs(3600),
        ));
    let table = get_table(config, Arc::clone(&widget) as Arc<dyn TableWidget>);

    let presenter = table.clone();
    let presented = tokio::spawn(async move { presenter.present(RenderOpts::default()).await });
    settle().await;

    assert_eq!(table.get_state().as_deref(), Some(&Counter { count: 9 }));
    assert_eq!(widget.rows()[0].cells[0].value, "count: 9");

    widget.dismiss();
    presented.await.unwrap().unwrap();
}

#[tokio::test]
async fn default_state_seeds_when_the_store_is_empty() {
    let widget = TestWidget::new();
    let store = MemoryStore::new();

    let config = TableConfig::<Counter, (), ()>::new("persisted", |ctx| counter_rows(&ctx))
        .with_default_state(Counter { count: 4 })
        .with_persistence(PersistConfig::json(
            "counter-state",
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
            Duration::from_secs(3600),
        ));
    let table = get_table(config, Arc::clone(&widget) as Arc<dyn TableWidget>);

    let presenter = table.clone();
    let presented = tokio::spawn(async move { presenter.present(RenderOpts::default()).await });
    settle().await;
    assert_eq!(table.get_state().as_deref(), Some(&Counter { count: 4 }));

    widget.dismiss();
    presented.await.unwrap().unwrap();
}

#[tokio::test]
async fn state_changes_sync_back_to_the_store() {
    let widget = TestWidget::new();
    let store = MemoryStore::new();

    let config = TableConfig::<Counter, (), ()>::new("persisted", |ctx| counter_rows(&ctx))
        .with_default_state(Counter { count: 0 })
        .with_persistence(PersistConfig::json(
            "counter-state",
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
            Duration::from_secs(3600),
        ));
    let table = get_table(config, Arc::clone(&widget) as Arc<dyn TableWidget>);

    let presenter = table.clone();
    let presented = tokio::spawn(async move { presenter.present(RenderOpts::default()).await });
    settle().await;

    table.set_state(Counter { count: 2 });
    table.settled().await;
    settle().await;
    assert_eq!(
        store.snapshot().get("counter-state").map(String::as_str),
        Some(r#"{"count":2}"#)
    );

    widget.dismiss();
    presented.await.unwrap().unwrap();
}

// ---------------------------------------------------------------------------
// External stream polling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn external_stream_changes_render_once_per_poll_tick() {
    let widget = TestWidget::new();
    let external: Stream<i32> = Stream::new(0);
    let renders = Arc::new(AtomicUsize::new(0));
    let renders_in_provider = Arc::clone(&renders);
    let external_updates = Arc::new(AtomicUsize::new(0));
    let external_updates_in_hook = Arc::clone(&external_updates);

    let config = TableConfig::<Counter, (), i32>::new("external", move |ctx| {
        renders_in_provider.fetch_add(1, Ordering::SeqCst);
        counter_rows(&ctx)
    })
    .with_default_state(Counter { count: 0 })
    .with_external(external.clone(), Duration::from_millis(100))
    .on_external_update(move || {
        let hits = Arc::clone(&external_updates_in_hook);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    let table = get_table(config, Arc::clone(&widget) as Arc<dyn TableWidget>);

    let presenter = table.clone();
    let presented = tokio::spawn(async move { presenter.present(RenderOpts::default()).await });
    settle().await;
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    // High-frequency external changes only set a flag...
    external.set(1);
    external.set(2);
    external.set(3);
    external.flush().await;
    assert_eq!(renders.load(Ordering::SeqCst), 1);
    assert_eq!(external_updates.load(Ordering::SeqCst), 0);

    // ...until the poll tick folds them into one counter bump and render.
    tokio::time::sleep(Duration::from_millis(150)).await;
    settle().await;
    assert_eq!(renders.load(Ordering::SeqCst), 2);
    assert_eq!(external_updates.load(Ordering::SeqCst), 1);

    widget.dismiss();
    presented.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn connect_attaches_an_external_stream_to_an_active_session() {
    let widget = TestWidget::new();
    let (table, renders) = counter_table(Arc::clone(&widget), Counter { count: 0 });

    let presenter = table.clone();
    let presented = tokio::spawn(async move { presenter.present(RenderOpts::default()).await });
    settle().await;

    let external: Stream<i32> = Stream::new(0);
    table.connect(external.clone(), Duration::from_millis(50));

    external.set(7);
    external.flush().await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    settle().await;
    assert_eq!(renders.load(Ordering::SeqCst), 2);

    widget.dismiss();
    presented.await.unwrap().unwrap();
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn render_errors_surface_as_a_dialog_and_keep_the_session_alive() {
    // Render failures are logged as well as dialogued; keep the subscriber
    // quiet unless RUST_LOG asks for output.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let widget = TestWidget::new();
    let config = TableConfig::<Counter, (), ()>::new("flaky", |ctx: RenderContext<Counter, ()>| {
        let count = ctx.state.as_deref().map_or(0, |s| s.count);
        if count == 1 {
            return Err("provider exploded".into());
        }
        counter_rows(&ctx)
    })
    .with_default_state(Counter { count: 0 });
    let table = get_table(config, Arc::clone(&widget) as Arc<dyn TableWidget>);

    let presenter = table.clone();
    let presented = tokio::spawn(async move { presenter.present(RenderOpts::default()).await });
    settle().await;
    assert!(widget.errors().is_empty());

    table.set_state(Counter { count: 1 });
    settle().await;
    let errors = widget.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].0.contains("flaky"));
    assert!(errors[0].1.contains("provider exploded"));
    // Session intact: the widget still shows the last good rows.
    assert!(table.is_active());
    assert_eq!(widget.rows()[0].cells[0].value, "count: 0");

    table.set_state(Counter { count: 2 });
    settle().await;
    assert_eq!(widget.rows()[0].cells[0].value, "count: 2");

    widget.dismiss();
    presented.await.unwrap().unwrap();
}

// ---------------------------------------------------------------------------
// Preload & queue plumbing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn preload_items_flow_through_the_batch_queue_during_setup() {
    let widget = TestWidget::new();
    let batches: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let batches_in_loader = Arc::clone(&batches);

    let config = TableConfig::<Counter, (), ()>::new("preload", |ctx| counter_rows(&ctx))
        .with_default_state(Counter { count: 0 })
        .with_preload(
            PreloadConfig::new(
                vec!["alarm".into(), "bell".into(), "calendar".into()],
                move |batch| {
                    let batches = Arc::clone(&batches_in_loader);
                    async move {
                        batches.lock().push(batch);
                        Ok(())
                    }
                },
            )
            .with_interval(Duration::ZERO)
            .with_max_per_batch(2),
        );
    let table = get_table(config, Arc::clone(&widget) as Arc<dyn TableWidget>);

    let presenter = table.clone();
    let presented = tokio::spawn(async move { presenter.present(RenderOpts::default()).await });
    settle().await;

    assert_eq!(
        *batches.lock(),
        vec![
            vec!["alarm".to_owned(), "bell".to_owned()],
            vec!["calendar".to_owned()],
        ]
    );

    widget.dismiss();
    presented.await.unwrap().unwrap();
}

#[tokio::test]
async fn stream_and_queue_compose_from_the_public_api() {
    // A stream driving a queue: the pattern the session uses internally.
    let queue_log: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
    let queue_log_in_op = Arc::clone(&queue_log);
    let queue = BatchQueue::new(
        BatchQueueConfig::new(move |batch: Vec<i32>| {
            let log = Arc::clone(&queue_log_in_op);
            async move {
                log.lock().extend(batch);
                Ok(())
            }
        })
        .with_is_equal(|a, b| a == b),
    );

    let stream = Stream::new(0);
    let feeder = queue.clone();
    let _sub = stream.register_update_callback(RegisterOpts::id("feed"), move |_old, new: i32| {
        feeder.push([new]);
        async { Ok(()) }
    });

    for n in [1, 2, 2, 3] {
        stream.set(n);
    }
    stream.flush().await;
    queue.flush().await;

    // 2 was pushed twice but deduplicated while queued entries were pending;
    // the queue may have drained between pushes, so assert order only.
    let seen = queue_log.lock().clone();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.first(), Some(&1));
    assert_eq!(seen.last(), Some(&3));
}
