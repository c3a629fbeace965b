mod support;

use pretty_assertions::assert_eq;
use recbase_core::{ApiError, AppConfig, HookSettings, MutationMode, RecordEvent};
use recbase_hooks::{Binding, Phase};
use std::sync::Arc;
use std::time::Duration;
use support::*;
use tokio::sync::mpsc;

fn task(id: &str, title: &str) -> recbase_model::Record {
    rec("tasks", id).with("title", title)
}

fn with_timeout(ms: u64) -> AppConfig {
    AppConfig {
        hooks: HookSettings { timeout_ms: ms },
        ..AppConfig::default()
    }
}

// ── Continuation visibility ──────────────────────────────────────

#[tokio::test]
async fn changes_before_next_are_persisted_changes_after_are_not() {
    let app = app(|hooks| {
        hooks.record_update.bind(Binding::<RecordEvent>::func(|e, next| {
            Box::pin(async move {
                e.record.set("note", "before");
                next.run(e).await?;
                e.record.set("done", true);
                Ok(())
            })
        }));
    });

    let t1 = app.dao().find("tasks", "t1").unwrap().unwrap();
    let mutation = app.dao().update(t1).await.unwrap();

    let row = stored(&app, "tasks", "t1").unwrap();
    assert_eq!(row.get_str("note"), Some("before"));
    assert_eq!(row.get("done").as_bool(), Some(false));

    assert_eq!(mutation.phase, Phase::PostSuccess);
    assert_eq!(mutation.record.get_str("note"), Some("before"));
    assert_eq!(mutation.record.get("done").as_bool(), Some(true));
}

#[tokio::test]
async fn original_snapshot_is_the_stored_record() {
    let journal = Journal::default();
    let seen = journal.clone();
    let app = app(move |hooks| {
        hooks.record_update.bind(Binding::<RecordEvent>::func(move |e, next| {
            let seen = seen.clone();
            Box::pin(async move {
                let original = e.record.original().and_then(|o| o.get_str("title").map(str::to_string));
                seen.push(format!("original:{}", original.unwrap_or_default()));
                seen.push(format!("changed:{}", e.record.changed_fields().join(",")));
                next.run(e).await
            })
        }));
    });

    let t1 = app.dao().find("tasks", "t1").unwrap().unwrap().with("title", "Renamed");
    app.dao().update(t1).await.unwrap();
    assert_eq!(journal.entries(), vec!["original:Write tests", "changed:title"]);
}

// ── Post-success / post-error exclusivity ────────────────────────

fn post_hooks(journal: &Journal) -> impl FnOnce(&mut recbase_core::HookRegistryBuilder) + '_ {
    move |hooks| {
        hooks.record_after_create_success.bind(note(journal, "success"));
        hooks.record_after_create_error.bind(note_error(journal, "error"));
        hooks.record_after_update_success.bind(note(journal, "success"));
        hooks.record_after_update_error.bind(note_error(journal, "error"));
    }
}

#[tokio::test]
async fn committed_write_fires_only_post_success() {
    let journal = Journal::default();
    let app = app(post_hooks(&journal));

    let mutation = app.dao().create(task("t2", "ok")).await.unwrap();
    assert!(mutation.is_committed());
    assert!(stored(&app, "tasks", "t2").is_some());
    assert_eq!(journal.entries(), vec!["success"]);
}

#[tokio::test]
async fn failed_write_fires_only_post_error() {
    let journal = Journal::default();
    let store = Arc::new(FlakyStore::seeded());
    let app = app_with(store.clone(), config(), post_hooks(&journal));
    store.fail_writes(true);

    let err = app.dao().create(task("t2", "doomed")).await.unwrap_err();
    assert!(matches!(err, ApiError::StorageFailure(_)), "got {err:?}");
    assert_eq!(err.status_code(), 500);
    assert!(stored(&app, "tasks", "t2").is_none());
    assert_eq!(journal.entries(), vec!["error:storage"]);
}

#[tokio::test]
async fn failed_validation_fires_post_error() {
    let journal = Journal::default();
    let app = app(post_hooks(&journal));

    let err = app.dao().create(rec("tasks", "t2")).await.unwrap_err();
    assert!(matches!(err, ApiError::InputRejected(_)));
    assert!(stored(&app, "tasks", "t2").is_none());
    assert_eq!(journal.entries(), vec!["error:rejected"]);
}

#[tokio::test]
async fn handler_error_before_next_fires_post_error() {
    let journal = Journal::default();
    let app = app(|hooks| {
        post_hooks(&journal)(hooks);
        hooks.record_create.bind(Binding::<RecordEvent>::func(|_e, _next| {
            Box::pin(async move { Err(ApiError::hook("not today")) })
        }));
    });

    let err = app.dao().create(task("t2", "x")).await.unwrap_err();
    assert_eq!(err, ApiError::HookAborted("not today".into()));
    assert_eq!(journal.entries(), vec!["error:hook"]);
}

#[tokio::test]
async fn handler_error_after_commit_keeps_the_commit() {
    let journal = Journal::default();
    let app = app(|hooks| {
        post_hooks(&journal)(hooks);
        hooks.record_create.bind(Binding::<RecordEvent>::func(|e, next| {
            Box::pin(async move {
                next.run(e).await?;
                Err(ApiError::hook("too late"))
            })
        }));
    });

    let mutation = app.dao().create(task("t2", "x")).await.unwrap();
    assert!(mutation.is_committed());
    assert!(stored(&app, "tasks", "t2").is_some());
    assert_eq!(journal.entries(), vec!["success"]);
}

#[tokio::test]
async fn post_success_errors_never_undo_the_write() {
    let app = app(|hooks| {
        hooks.record_after_create_success.bind(Binding::<RecordEvent>::func(|_e, _next| {
            Box::pin(async move { Err(ApiError::hook("listener broke")) })
        }));
    });
    let mutation = app.dao().create(task("t2", "x")).await.unwrap();
    assert_eq!(mutation.phase, Phase::PostSuccess);
    assert!(stored(&app, "tasks", "t2").is_some());
}

#[tokio::test]
async fn swallowed_commit_failure_still_routes_to_post_error() {
    let journal = Journal::default();
    let store = Arc::new(FlakyStore::seeded());
    let app = app_with(store.clone(), config(), |hooks| {
        post_hooks(&journal)(hooks);
        hooks.record_create.bind(Binding::<RecordEvent>::func(|e, next| {
            Box::pin(async move {
                let _ = next.run(e).await;
                Ok(())
            })
        }));
    });
    store.fail_writes(true);

    let err = app.dao().create(task("t2", "x")).await.unwrap_err();
    assert!(matches!(err, ApiError::StorageFailure(_)));
    assert_eq!(journal.entries(), vec!["error:storage"]);
}

#[tokio::test]
async fn validate_hook_can_reject() {
    let app = app(|hooks| {
        hooks.record_validate.bind(
            Binding::<RecordEvent>::func(|e, next| {
                Box::pin(async move {
                    if e.record.get_str("title") == Some("bad") {
                        return Err(ApiError::rejected("title is bad"));
                    }
                    next.run(e).await
                })
            })
            .for_collections(["tasks"]),
        );
    });

    assert!(app.dao().create(task("t2", "bad")).await.is_err());
    assert!(app.dao().create(task("t3", "good")).await.is_ok());
    assert!(stored(&app, "tasks", "t2").is_none());
    assert!(stored(&app, "tasks", "t3").is_some());
}

// ── tasks halt scenario ──────────────────────────────────────────

#[tokio::test]
async fn halting_update_handler_skips_the_write_and_all_post_hooks() {
    let journal = Journal::default();
    let app = app(|hooks| {
        post_hooks(&journal)(hooks);
        hooks.record_update.bind(
            Binding::<RecordEvent>::func(|e, _next| {
                Box::pin(async move {
                    e.record.set("note", "vetoed");
                    Ok(())
                })
            })
            .for_collections(["tasks"]),
        );
    });

    let t1 = app.dao().find("tasks", "t1").unwrap().unwrap().with("done", true);
    let mutation = app.dao().update(t1).await.unwrap();

    assert!(mutation.is_halted());
    assert_eq!(mutation.record.get_str("note"), Some("vetoed"));
    let row = stored(&app, "tasks", "t1").unwrap();
    assert_eq!(row.get("done").as_bool(), Some(false));
    assert_eq!(row.get_str("note"), None);
    assert!(journal.entries().is_empty());

    let o1 = app.dao().find("other", "o1").unwrap().unwrap().with("counter", 3.0);
    assert!(app.dao().update(o1).await.unwrap().is_committed());
    assert_eq!(journal.entries(), vec!["success"]);
}

// ── Cascade and direct nested mutations ──────────────────────────

fn cascading_app(journal: &Journal, mode: MutationMode) -> recbase_core::App {
    app(|hooks| {
        hooks
            .record_update
            .bind(note(journal, "other:update").for_collections(["other"]));
        hooks
            .record_after_update_success
            .bind(note(journal, "other:success").for_collections(["other"]));
        hooks.record_update.bind(
            Binding::<RecordEvent>::func(move |e, next| {
                Box::pin(async move {
                    let dao = match mode {
                        MutationMode::Cascade => e.dao().cascade(),
                        MutationMode::Direct => e.dao().direct(),
                    };
                    let mut other = dao.find("other", "o1")?.ok_or(ApiError::NotFound)?;
                    other.set("counter", 1.0);
                    dao.update(other).await?;
                    next.run(e).await
                })
            })
            .for_collections(["tasks"]),
        );
    })
}

#[tokio::test]
async fn cascade_update_runs_the_target_chain() {
    let journal = Journal::default();
    let app = cascading_app(&journal, MutationMode::Cascade);

    let t1 = app.dao().find("tasks", "t1").unwrap().unwrap().with("done", true);
    app.dao().update(t1).await.unwrap();

    assert_eq!(journal.entries(), vec!["other:update", "other:success"]);
    assert_eq!(stored(&app, "other", "o1").unwrap().get("counter").as_f64(), Some(1.0));
    assert_eq!(stored(&app, "tasks", "t1").unwrap().get("done").as_bool(), Some(true));
}

#[tokio::test]
async fn direct_update_bypasses_the_target_chain() {
    let journal = Journal::default();
    let app = cascading_app(&journal, MutationMode::Direct);

    let t1 = app.dao().find("tasks", "t1").unwrap().unwrap().with("done", true);
    app.dao().update(t1).await.unwrap();

    assert!(journal.entries().is_empty());
    assert_eq!(stored(&app, "other", "o1").unwrap().get("counter").as_f64(), Some(1.0));
}

#[tokio::test]
async fn direct_mode_still_validates_the_schema() {
    let journal = Journal::default();
    let app = app(|hooks| {
        hooks.record_after_update_error.bind(note_error(&journal, "tasks"));
        hooks.record_update.bind(
            Binding::<RecordEvent>::func(|e, next| {
                Box::pin(async move {
                    let mut other = e.dao().find("other", "o1")?.ok_or(ApiError::NotFound)?;
                    other.set("counter", "not a number");
                    e.dao().direct().update(other).await?;
                    next.run(e).await
                })
            })
            .for_collections(["tasks"]),
        );
    });

    let t1 = app.dao().find("tasks", "t1").unwrap().unwrap().with("done", true);
    let err = app.dao().update(t1).await.unwrap_err();
    assert!(matches!(err, ApiError::InputRejected(_)));
    assert_eq!(journal.entries(), vec!["tasks:rejected"]);
    assert_eq!(stored(&app, "other", "o1").unwrap().get("counter").as_f64(), Some(0.0));
    assert_eq!(stored(&app, "tasks", "t1").unwrap().get("done").as_bool(), Some(false));
}

// ── Transactions ─────────────────────────────────────────────────

fn auditing(journal: &Journal) -> impl FnOnce(&mut recbase_core::HookRegistryBuilder) + '_ {
    move |hooks| {
        hooks
            .record_after_create_success
            .bind(note(journal, "audit:success").for_collections(["audits"]));
        hooks
            .record_after_create_error
            .bind(note_error(journal, "audit").for_collections(["audits"]));
        hooks
            .record_after_create_success
            .bind(note(journal, "task:success").for_collections(["tasks"]));
        hooks.record_create.bind(
            Binding::<RecordEvent>::func(|e, next| {
                Box::pin(async move {
                    let entry = format!("created {}", e.record.id());
                    let audit = rec("audits", &format!("a-{}", e.record.id())).with("entry", entry.as_str());
                    e.dao().create(audit).await?;
                    next.run(e).await
                })
            })
            .for_collections(["tasks"]),
        );
    }
}

#[tokio::test]
async fn nested_writes_commit_with_the_outer_write() {
    let journal = Journal::default();
    let app = app(auditing(&journal));

    app.dao().create(task("t2", "audited")).await.unwrap();

    assert!(stored(&app, "tasks", "t2").is_some());
    assert_eq!(stored(&app, "audits", "a-t2").unwrap().get_str("entry"), Some("created t2"));
    assert_eq!(journal.entries(), vec!["audit:success", "task:success"]);
}

#[tokio::test]
async fn nested_writes_roll_back_with_the_outer_failure() {
    let journal = Journal::default();
    let app = app(auditing(&journal));

    // no title: the outer write fails validation after the audit was queued
    let err = app.dao().create(rec("tasks", "t2")).await.unwrap_err();

    assert!(matches!(err, ApiError::InputRejected(_)));
    assert!(stored(&app, "audits", "a-t2").is_none());
    assert_eq!(journal.entries(), vec!["audit:rejected"]);
}

#[tokio::test]
async fn nested_writes_roll_back_when_the_commit_fails() {
    let journal = Journal::default();
    let store = Arc::new(FlakyStore::seeded());
    let app = app_with(store.clone(), config(), auditing(&journal));
    store.fail_writes(true);

    assert!(app.dao().create(task("t2", "x")).await.is_err());
    store.fail_writes(false);
    assert!(stored(&app, "audits", "a-t2").is_none());
    assert!(stored(&app, "tasks", "t2").is_none());
    assert_eq!(journal.entries(), vec!["audit:storage"]);
}

#[tokio::test]
async fn nested_writes_are_visible_inside_the_transaction_only() {
    let journal = Journal::default();
    let seen = journal.clone();
    let app = app(move |hooks| {
        hooks.record_create.bind(
            Binding::<RecordEvent>::func(move |e, next| {
                let seen = seen.clone();
                Box::pin(async move {
                    e.dao().create(rec("audits", "a1").with("entry", "x")).await?;
                    let inside = e.dao().find("audits", "a1")?.is_some();
                    let outside = e.app().dao().find("audits", "a1")?.is_some();
                    seen.push(format!("inside:{inside} outside:{outside}"));
                    next.run(e).await
                })
            })
            .for_collections(["tasks"]),
        );
    });

    app.dao().create(task("t2", "x")).await.unwrap();
    assert_eq!(journal.entries(), vec!["inside:true outside:false"]);
    assert!(stored(&app, "audits", "a1").is_some());
}

#[tokio::test]
async fn nested_post_success_runs_after_the_outer_commit() {
    let journal = Journal::default();
    let seen = journal.clone();
    let app = app(move |hooks| {
        auditing(&Journal::default())(hooks);
        hooks.record_after_create_success.bind(
            Binding::<RecordEvent>::func(move |e, next| {
                let seen = seen.clone();
                Box::pin(async move {
                    let task_id = e.record.id().as_str().trim_start_matches("a-").to_string();
                    let committed = e.app().store().find("tasks", &task_id)?.is_some();
                    seen.push(format!("task committed: {committed}"));
                    next.run(e).await
                })
            })
            .for_collections(["audits"]),
        );
    });

    app.dao().create(task("t2", "x")).await.unwrap();
    assert_eq!(journal.entries(), vec!["task committed: true"]);
}

#[tokio::test]
async fn halted_outer_mutation_discards_nested_writes() {
    let journal = Journal::default();
    let app = app(|hooks| {
        auditing(&journal)(hooks);
        hooks.record_create_execute.bind(
            Binding::<RecordEvent>::func(|_e, _next| Box::pin(async move { Ok(()) })).for_collections(["tasks"]),
        );
    });

    let mutation = app.dao().create(task("t2", "x")).await.unwrap();
    assert!(mutation.is_halted());
    assert!(stored(&app, "tasks", "t2").is_none());
    assert!(stored(&app, "audits", "a-t2").is_none());
    assert_eq!(journal.entries(), vec!["audit:hook"]);
}

#[tokio::test]
async fn post_hook_mutations_run_as_their_own_transaction() {
    let app = app(|hooks| {
        hooks.record_after_create_success.bind(
            Binding::<RecordEvent>::func(|e, next| {
                Box::pin(async move {
                    assert!(!e.dao().in_transaction());
                    let audit = rec("audits", "after").with("entry", "post");
                    let mutation = e.dao().create(audit).await?;
                    assert!(mutation.is_committed());
                    next.run(e).await
                })
            })
            .for_collections(["tasks"]),
        );
    });

    app.dao().create(task("t2", "x")).await.unwrap();
    assert!(stored(&app, "audits", "after").is_some());
}

// ── Model-level edge cases ───────────────────────────────────────

#[tokio::test]
async fn view_collections_are_read_only() {
    let app = app(|_| {});
    let err = app.dao().create(rec("stats", "s2").with("total", 1.0)).await.unwrap_err();
    assert!(matches!(err, ApiError::InputRejected(_)));
}

#[tokio::test]
async fn updating_a_missing_record_is_not_found() {
    let app = app(|_| {});
    assert_eq!(app.dao().update(task("ghost", "x")).await.unwrap_err(), ApiError::NotFound);
}

#[tokio::test]
async fn save_creates_then_updates() {
    let app = app(|_| {});
    let created = app.dao().save(task("t2", "first")).await.unwrap();
    assert!(!created.record.is_new());

    let updated = app.dao().save(created.record.with("title", "second")).await.unwrap();
    assert!(updated.is_committed());
    assert_eq!(stored(&app, "tasks", "t2").unwrap().get_str("title"), Some("second"));
}

#[tokio::test]
async fn delete_skips_validation() {
    let journal = Journal::default();
    let app = app(|hooks| {
        hooks.record_validate.bind(note(&journal, "validate"));
        hooks.record_after_delete_success.bind(note(&journal, "deleted"));
    });
    let t1 = app.dao().find("tasks", "t1").unwrap().unwrap();
    app.dao().delete(t1).await.unwrap();
    assert_eq!(journal.entries(), vec!["deleted"]);
    assert!(stored(&app, "tasks", "t1").is_none());
}

// ── Abort ────────────────────────────────────────────────────────

fn signal_on_post(tx: mpsc::UnboundedSender<String>) -> impl FnOnce(&mut recbase_core::HookRegistryBuilder) {
    move |hooks| {
        let on_error = tx.clone();
        hooks
            .record_after_create_error
            .bind(Binding::<RecordEvent>::func(move |e, next| {
                let on_error = on_error.clone();
                Box::pin(async move {
                    let _ = on_error.send(format!("error:{:?}", e.error));
                    next.run(e).await
                })
            }));
        hooks
            .record_after_create_success
            .bind(Binding::<RecordEvent>::func(move |e, next| {
                let tx = tx.clone();
                Box::pin(async move {
                    let _ = tx.send("success".to_string());
                    next.run(e).await
                })
            }));
    }
}

async fn next_signal(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("post hook never ran")
        .expect("channel closed")
}

#[tokio::test]
async fn deadline_before_commit_aborts_and_rolls_back() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let app = app_with(
        Arc::new(recbase_storage::MemoryStore::with_records(seed())),
        with_timeout(50),
        |hooks| {
            signal_on_post(tx)(hooks);
            hooks.record_create.bind(Binding::<RecordEvent>::func(|e, next| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    next.run(e).await
                })
            }));
        },
    );

    let err = app.dao().create(task("t2", "slow")).await.unwrap_err();
    assert_eq!(err, ApiError::Aborted);
    assert_eq!(err.status_code(), 408);

    assert_eq!(next_signal(&mut rx).await, "error:Some(Aborted)");
    assert!(stored(&app, "tasks", "t2").is_none());
}

#[tokio::test]
async fn abort_after_commit_still_runs_post_success() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let app = app_with(
        Arc::new(recbase_storage::MemoryStore::with_records(seed())),
        with_timeout(50),
        |hooks| {
            signal_on_post(tx)(hooks);
            hooks.record_create.bind(Binding::<RecordEvent>::func(|e, next| {
                Box::pin(async move {
                    next.run(e).await?;
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Ok(())
                })
            }));
        },
    );

    assert_eq!(app.dao().create(task("t2", "fast write")).await.unwrap_err(), ApiError::Aborted);
    assert_eq!(next_signal(&mut rx).await, "success");
    assert!(stored(&app, "tasks", "t2").is_some());
}

#[tokio::test]
async fn dropped_caller_counts_as_an_abort() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let app = app_with(
        Arc::new(recbase_storage::MemoryStore::with_records(seed())),
        with_timeout(0),
        |hooks| {
            signal_on_post(tx)(hooks);
            hooks.record_create.bind(Binding::<RecordEvent>::func(|e, next| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    next.run(e).await
                })
            }));
        },
    );

    let gave_up = tokio::time::timeout(Duration::from_millis(20), app.dao().create(task("t2", "x"))).await;
    assert!(gave_up.is_err());

    assert_eq!(next_signal(&mut rx).await, "error:Some(Aborted)");
    assert!(stored(&app, "tasks", "t2").is_none());
}
