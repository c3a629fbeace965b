use async_trait::async_trait;
use pretty_assertions::assert_eq;
use recbase_hooks::{Binding, ChainOutcome, Done, Handler, Hook, HookBuilder, HookEvent, Next, Phase, Terminal};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct TestEvent {
    collection: Option<String>,
    log: Vec<String>,
    value: i32,
}

impl TestEvent {
    fn on(collection: &str) -> Self {
        Self {
            collection: Some(collection.to_string()),
            ..Default::default()
        }
    }
}

impl HookEvent for TestEvent {
    type Error = String;

    fn collection_name(&self) -> Option<&str> {
        self.collection.as_deref()
    }
}

/// Logs its name and continues.
struct Tag(&'static str);

#[async_trait]
impl Handler<TestEvent> for Tag {
    async fn handle(&self, e: &mut TestEvent, next: Next<'_, TestEvent>) -> Result<(), String> {
        e.log.push(self.0.to_string());
        next.run(e).await
    }
}

/// Logs its name and stops the chain.
struct Stop(&'static str);

#[async_trait]
impl Handler<TestEvent> for Stop {
    async fn handle(&self, e: &mut TestEvent, _next: Next<'_, TestEvent>) -> Result<(), String> {
        e.log.push(self.0.to_string());
        Ok(())
    }
}

/// Records that the guarded work ran.
#[derive(Default)]
struct Work {
    runs: AtomicUsize,
}

#[async_trait]
impl Terminal<TestEvent> for Work {
    async fn finish(&self, e: &mut TestEvent) -> Result<(), String> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        e.log.push("work".into());
        Ok(())
    }
}

fn hook(bindings: Vec<Binding<TestEvent>>) -> Hook<TestEvent> {
    let mut builder = HookBuilder::new("test");
    for b in bindings {
        builder.bind(b);
    }
    builder.build()
}

// ── Ordering ─────────────────────────────────────────────────────

#[tokio::test]
async fn runs_in_priority_then_registration_order() {
    let hook = hook(vec![
        Binding::new(Tag("b")),
        Binding::new(Tag("late")).priority(10),
        Binding::new(Tag("early")).priority(-5),
        Binding::new(Tag("c")),
    ]);
    let mut e = TestEvent::on("tasks");
    let outcome = hook.trigger(&mut e, &Work::default()).await.unwrap();
    assert_eq!(outcome, ChainOutcome::Completed);
    assert_eq!(e.log, vec!["early", "b", "c", "late", "work"]);
}

#[tokio::test]
async fn scoped_and_unscoped_handlers_interleave_by_registration() {
    let hook = hook(vec![
        Binding::new(Tag("any-1")),
        Binding::new(Tag("tasks-1")).for_collections(["tasks"]),
        Binding::new(Tag("other")).for_collections(["other"]),
        Binding::new(Tag("any-2")),
        Binding::new(Tag("tasks-2")).for_collections(["notes", "tasks"]),
    ]);

    let mut e = TestEvent::on("tasks");
    hook.trigger(&mut e, &Done).await.unwrap();
    assert_eq!(e.log, vec!["any-1", "tasks-1", "any-2", "tasks-2"]);

    let mut e = TestEvent::default();
    hook.trigger(&mut e, &Done).await.unwrap();
    assert_eq!(e.log, vec!["any-1", "any-2"]);
}

#[tokio::test]
async fn unbind_removes_by_id() {
    let mut builder = HookBuilder::new("test");
    builder
        .bind(Binding::new(Tag("keep")))
        .bind(Binding::new(Tag("drop")).id("audit"))
        .unbind("audit");
    assert_eq!(builder.len(), 1);
    let hook = builder.build();

    let mut e = TestEvent::default();
    hook.trigger(&mut e, &Done).await.unwrap();
    assert_eq!(e.log, vec!["keep"]);
}

// ── Halting and errors ───────────────────────────────────────────

#[tokio::test]
async fn not_continuing_halts_before_the_terminal() {
    let hook = hook(vec![Binding::new(Tag("a")), Binding::new(Stop("stop")), Binding::new(Tag("never"))]);
    let work = Work::default();
    let mut e = TestEvent::on("tasks");
    let outcome = hook.trigger(&mut e, &work).await.unwrap();
    assert_eq!(outcome, ChainOutcome::Halted);
    assert_eq!(e.log, vec!["a", "stop"]);
    assert_eq!(work.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn errors_propagate_and_halt() {
    let hook = hook(vec![
        Binding::func(|_e: &mut TestEvent, _next| Box::pin(async move { Err::<(), _>("nope".to_string()) })),
        Binding::new(Tag("never")),
    ]);
    let work = Work::default();
    let mut e = TestEvent::default();
    assert_eq!(hook.trigger(&mut e, &work).await, Err("nope".to_string()));
    assert!(e.log.is_empty());
    assert_eq!(work.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn terminal_errors_reach_the_handlers() {
    struct Failing;
    #[async_trait]
    impl Terminal<TestEvent> for Failing {
        async fn finish(&self, _e: &mut TestEvent) -> Result<(), String> {
            Err("write failed".into())
        }
    }

    let hook = hook(vec![Binding::func(|e: &mut TestEvent, next| {
        Box::pin(async move {
            let result = next.run(e).await;
            e.log.push(format!("saw {result:?}"));
            result
        })
    })]);
    let mut e = TestEvent::default();
    assert_eq!(hook.trigger(&mut e, &Failing).await, Err("write failed".to_string()));
    assert_eq!(e.log, vec![r#"saw Err("write failed")"#]);
}

// ── Continuation semantics ───────────────────────────────────────

#[tokio::test]
async fn changes_before_next_flow_down_and_after_next_see_the_result() {
    let hook = hook(vec![
        Binding::func(|e: &mut TestEvent, next| {
            Box::pin(async move {
                e.value = 1;
                next.run(e).await?;
                e.log.push(format!("after: {}", e.value));
                Ok(())
            })
        }),
        Binding::func(|e: &mut TestEvent, next| {
            Box::pin(async move {
                e.log.push(format!("before: {}", e.value));
                e.value *= 10;
                next.run(e).await
            })
        }),
    ]);
    let mut e = TestEvent::default();
    hook.trigger(&mut e, &Done).await.unwrap();
    assert_eq!(e.log, vec!["before: 1", "after: 10"]);
}

#[tokio::test]
async fn next_reports_remaining_handlers() {
    let hook = hook(vec![
        Binding::func(|e: &mut TestEvent, next| {
            Box::pin(async move {
                e.log.push(next.remaining().to_string());
                next.run(e).await
            })
        }),
        Binding::new(Tag("x")),
    ]);
    let mut e = TestEvent::default();
    hook.trigger(&mut e, &Done).await.unwrap();
    assert_eq!(e.log, vec!["1", "x"]);
}

#[tokio::test]
async fn empty_hook_runs_terminal() {
    let hook: Hook<TestEvent> = Hook::empty("empty");
    assert!(hook.is_empty());
    let work = Work::default();
    let mut e = TestEvent::default();
    assert_eq!(hook.trigger(&mut e, &work).await.unwrap(), ChainOutcome::Completed);
    assert_eq!(work.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn built_hooks_are_shared_across_tasks() {
    let hook = Arc::new(hook(vec![Binding::new(Tag("a")), Binding::new(Tag("b"))]));
    let mut tasks = Vec::new();
    for i in 0..8 {
        let hook = Arc::clone(&hook);
        tasks.push(tokio::spawn(async move {
            let mut e = TestEvent {
                value: i,
                ..Default::default()
            };
            hook.trigger(&mut e, &Done).await.unwrap();
            (i, e)
        }));
    }
    for task in tasks {
        let (i, e) = task.await.unwrap();
        assert_eq!(e.value, i);
        assert_eq!(e.log, vec!["a", "b"]);
    }
}

// ── Phases ───────────────────────────────────────────────────────

#[test]
fn phase_transitions() {
    use Phase::*;
    let happy = [RequestPre, ModelPre, Validate, Execute, Persisted, PostSuccess, RequestPost];
    for pair in happy.windows(2) {
        assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
    }
    assert!(Validate.can_advance_to(PostError));
    assert!(PostError.can_advance_to(RequestPost));
    assert!(ModelPre.can_advance_to(Halted));
    assert!(!Persisted.can_advance_to(Halted));
    assert!(!Persisted.can_advance_to(PostError));
    assert!(!Halted.can_advance_to(RequestPost));
    assert!(PostSuccess.is_committed());
    assert!(!PostError.is_committed());
    assert!(Halted.is_terminal());
}
