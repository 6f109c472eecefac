use crate::closable::ClosableHandle;
use crate::test_utils::*;
use crate::{
    is_closing, iter, join_all, spawn, spawn_named, suspend, yield_now, Builder, ResumeHandle,
    Status, TaskError, TaskHandle,
};
use rstest::rstest;
use static_assertions::assert_not_impl_any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

// Everything here is Rc-based and must stay on the runtime's thread.
assert_not_impl_any!(TaskHandle<u32>: Send, Sync);
assert_not_impl_any!(ResumeHandle<u32>: Send, Sync);

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

type Stash<T> = Rc<RefCell<Option<T>>>;

fn stash<T>() -> Stash<T> {
    Rc::new(RefCell::new(None))
}

#[test]
fn test_failed_body_surfaces_payload_and_site() {
    let (rt, _host) = runtime_with_host();
    let task = rt.spawn_named("boom", async { Err::<(), _>(TaskError::failed("X")) });

    assert!(task.completed());
    let err = task.wait().unwrap_err();
    let text = err.to_string();
    assert!(text.ends_with(": X"), "got: {text}");
    assert!(text.contains("tests.rs"), "got: {text}");

    let trace = task.traceback(Some(&text));
    assert!(trace.contains("boom"), "got: {trace}");
    assert!(trace.contains("completed"), "got: {trace}");
}

#[test]
fn test_close_cascades_into_awaited_child() {
    let (rt, _host) = runtime_with_host();
    let child_slot: Stash<TaskHandle<()>> = stash();

    let parent = rt.spawn_named("parent", {
        let child_slot = child_slot.clone();
        async move {
            let child = spawn_named("child", eternity());
            *child_slot.borrow_mut() = Some(child.clone());
            child.await
        }
    });
    let child = child_slot.borrow().clone().unwrap();
    assert_eq!(parent.status(), Status::Awaiting);
    assert_eq!(child.status(), Status::Awaiting);

    parent.close();

    assert!(parent.completed());
    assert!(child.completed());
    assert_eq!(parent.wait().unwrap_err(), TaskError::Closed);
    assert_eq!(child.wait().unwrap_err(), TaskError::Closed);
}

#[test]
fn test_unawaited_child_error_interrupts_parent_suspension() {
    let (rt, host) = runtime_with_host();
    let parent = rt.spawn({
        let host = host.clone();
        async move {
            let _child = spawn({
                let host = host.clone();
                async move {
                    sleep(&host, ms(5)).await?;
                    Err::<(), _>(TaskError::failed("CHILD"))
                }
            });
            // The child's failure lands mid-sleep, well before the deadline.
            sleep(&host, ms(500)).await?;
            Ok(())
        }
    });

    let err = parent.wait().unwrap_err();
    let text = err.to_string();
    assert!(text.starts_with("child error: "), "got: {text}");
    assert!(text.ends_with(": CHILD"), "got: {text}");
}

#[test]
fn test_caught_child_errors_are_edge_triggered() {
    let (rt, host) = runtime_with_host();
    let out = rt.block_on({
        let host = host.clone();
        async move {
            let _c1 = spawn({
                let host = host.clone();
                async move {
                    sleep(&host, ms(5)).await?;
                    Err::<(), _>(TaskError::failed("E1"))
                }
            });
            let _c2 = spawn({
                let host = host.clone();
                async move {
                    sleep(&host, ms(15)).await?;
                    Err::<(), _>(TaskError::failed("E2"))
                }
            });

            let first = sleep(&host, ms(500)).await.unwrap_err().to_string();
            let second = sleep(&host, ms(500)).await.unwrap_err().to_string();
            // Both handled; the next await runs undisturbed.
            sleep(&host, ms(5)).await?;
            Ok(format!("{first} then {second} then both handled"))
        }
    });

    let text = out.unwrap();
    assert!(text.contains("E1"), "got: {text}");
    assert!(text.contains("E2"), "got: {text}");
    assert!(text.find("E1").unwrap() < text.find("E2").unwrap(), "got: {text}");
    assert!(text.ends_with("both handled"), "got: {text}");
}

#[test]
fn test_iter_delivers_in_completion_order_and_frames_errors() {
    let (rt, host) = runtime_with_host();
    let out = rt.block_on({
        let host = host.clone();
        async move {
            let tasks: Vec<TaskHandle<usize>> = (0..10)
                .map(|i| {
                    spawn_named(format!("t{i}"), {
                        let host = host.clone();
                        async move {
                            sleep(&host, ms(5 * (i as u64 + 1))).await?;
                            if i == 3 {
                                Err(TaskError::failed("ERROR IN TASK 3"))
                            } else {
                                Ok(i)
                            }
                        }
                    })
                })
                .collect();

            let mut it = iter(tasks);
            let mut values = Vec::new();
            let failure = loop {
                match it.next().await {
                    Some(Ok((index, value))) => {
                        assert_eq!(index, value);
                        values.push(index);
                    }
                    Some(Err(err)) => break err.to_string(),
                    None => break "no error".to_string(),
                }
            };
            Ok((values, failure))
        }
    });

    let (values, failure) = out.unwrap();
    assert_eq!(values, vec![0, 1, 2]);
    assert!(failure.starts_with("iter error[index:3]: "), "got: {failure}");
    assert!(failure.ends_with(": ERROR IN TASK 3"), "got: {failure}");
}

#[test]
fn test_completion_sweep_closes_leftover_children() {
    let (rt, _host) = runtime_with_host();
    let child_slot: Stash<TaskHandle<()>> = stash();

    let parent = rt.spawn({
        let child_slot = child_slot.clone();
        async move {
            let child = spawn_named("t", eternity());
            *child_slot.borrow_mut() = Some(child.clone());
            Ok(())
        }
    });

    assert_eq!(parent.wait(), Ok(()));
    let child = child_slot.borrow().clone().unwrap();
    assert!(child.completed());
    assert_eq!(child.wait().unwrap_err(), TaskError::Closed);
    // No orphans once the parent published.
    assert!(parent.children().is_empty());
}

#[test]
fn test_complete_race_first_caller_wins() {
    let (rt, _host) = runtime_with_host();
    let parent_slot: Stash<TaskHandle<String>> = stash();
    let c1_slot: Stash<TaskHandle<()>> = stash();
    let c2_slot: Stash<TaskHandle<()>> = stash();

    let parent = rt.spawn_named("parent", {
        let parent_slot = parent_slot.clone();
        let c1_slot = c1_slot.clone();
        let c2_slot = c2_slot.clone();
        async move {
            let c1 = spawn_named("c1", {
                let parent_slot = parent_slot.clone();
                async move {
                    yield_now().await?;
                    let parent = parent_slot.borrow().clone().unwrap();
                    assert!(parent.complete("child 1 won".into()).is_ok());
                    Ok(())
                }
            });
            *c1_slot.borrow_mut() = Some(c1);
            let c2 = spawn_named("c2", eternity());
            *c2_slot.borrow_mut() = Some(c2);
            eternity().await?;
            Ok("unreachable".into())
        }
    });
    *parent_slot.borrow_mut() = Some(parent.clone());

    assert_eq!(parent.wait().unwrap(), "child 1 won");
    assert_eq!(
        parent.complete("child 2 won".into()).unwrap_err(),
        TaskError::AlreadyCompleting
    );
    let c2 = c2_slot.borrow().clone().unwrap();
    assert!(c2.completed());
    assert_eq!(c2.wait().unwrap_err(), TaskError::Closed);
}

#[test]
fn test_cancellation_is_level_triggered() {
    let (rt, host) = runtime_with_host();
    let task = rt.spawn({
        let host = host.clone();
        async move {
            let mut caught = 0;
            for _ in 0..5 {
                if let Err(TaskError::Closed) = sleep(&host, ms(5)).await {
                    caught += 1;
                    // Catching `closed` does not clear it.
                    assert!(is_closing());
                }
            }
            Err::<(), _>(TaskError::failed(format!("caught {caught}")))
        }
    });

    task.close();
    assert!(task.completed());
    // The body observed `closed` at all five suspensions, and its own final
    // error wins over the close sentinel at publish.
    let err = task.wait().unwrap_err();
    assert!(err.to_string().ends_with("caught 5"), "got: {err}");
}

#[test]
fn test_closed_task_without_own_error_publishes_closed() {
    let (rt, _host) = runtime_with_host();
    let task = rt.spawn(eternity());
    task.close();
    assert_eq!(task.wait().unwrap_err(), TaskError::Closed);
}

#[test]
fn test_deep_synchronous_continuation_chain() {
    let (rt, _host) = runtime_with_host();
    let out = rt.block_on(async {
        let mut total: u64 = 0;
        for _ in 0..10_000 {
            total += suspend(|resume: ResumeHandle<u64>| {
                resume.resume(1);
                None
            })
            .await?;
        }
        Ok(total)
    });
    assert_eq!(out.unwrap(), 10_000);
}

#[test]
fn test_deep_synchronous_completion_cascade() {
    let (rt, _host) = runtime_with_host();
    let trigger: Stash<ResumeHandle<u64>> = stash();

    let mut prev = rt.spawn({
        let trigger = trigger.clone();
        async move {
            let seed = suspend(move |resume| {
                *trigger.borrow_mut() = Some(resume);
                None
            })
            .await?;
            Ok(seed)
        }
    });
    for _ in 0..10_000 {
        let link = prev.clone();
        prev = rt.spawn(async move { Ok(link.await? + 1) });
    }

    trigger.borrow().as_ref().unwrap().resume(1);
    assert_eq!(prev.wait().unwrap(), 10_001);
}

#[rstest]
#[case::once(1)]
#[case::thrice(3)]
fn test_close_is_idempotent_and_every_callback_fires(#[case] closes: usize) {
    let (rt, _host) = runtime_with_host();
    let spy = SpyClosable::new(false);
    let task = rt.spawn({
        let spy = spy.clone();
        async move {
            suspend(move |_resume: ResumeHandle<()>| Some(spy as ClosableHandle)).await?;
            Ok(())
        }
    });

    let fired = Rc::new(Cell::new(0));
    for _ in 0..closes {
        let fired = fired.clone();
        task.close_with(move || fired.set(fired.get() + 1));
    }
    assert_eq!(spy.close_calls.get(), 1);
    assert_eq!(fired.get(), 0, "close acknowledgement still pending");

    spy.ack();
    assert!(task.completed());
    assert_eq!(fired.get(), closes);
}

#[test]
fn test_already_closing_closable_is_not_reclosed() {
    let (rt, _host) = runtime_with_host();
    let spy = SpyClosable::new(true);
    spy.mark_closing();
    let resume_slot: Stash<ResumeHandle<()>> = stash();

    let task = rt.spawn({
        let spy = spy.clone();
        let resume_slot = resume_slot.clone();
        async move {
            suspend(move |resume| {
                *resume_slot.borrow_mut() = Some(resume);
                Some(spy as ClosableHandle)
            })
            .await?;
            Ok(())
        }
    });

    task.close();
    assert_eq!(spy.close_calls.get(), 0);
    assert!(!task.completed(), "waiting for the original callback");

    // The originally-scheduled callback finally arrives; delivery rewrites
    // its success into `closed`.
    resume_slot.borrow().as_ref().unwrap().resume(());
    assert!(task.completed());
    assert_eq!(task.wait().unwrap_err(), TaskError::Closed);
}

#[test]
fn test_second_resume_is_a_no_op() {
    let (rt, _host) = runtime_with_host();
    let resume_slot: Stash<ResumeHandle<u32>> = stash();

    let task = rt.spawn({
        let resume_slot = resume_slot.clone();
        async move {
            let value = suspend(move |resume| {
                *resume_slot.borrow_mut() = Some(resume);
                None
            })
            .await?;
            Ok(value)
        }
    });

    let resume = resume_slot.borrow().clone().unwrap();
    resume.resume(1);
    assert!(resume.is_spent());
    resume.resume(2);
    assert_eq!(task.wait().unwrap(), 1);
}

#[test]
fn test_no_closable_outlives_completion() {
    let (rt, _host) = runtime_with_host();
    let spy = SpyClosable::new(true);
    let resume_slot: Stash<ResumeHandle<()>> = stash();

    let task = rt.spawn({
        let spy = spy.clone();
        let resume_slot = resume_slot.clone();
        async move {
            suspend(move |resume| {
                *resume_slot.borrow_mut() = Some(resume);
                Some(spy as ClosableHandle)
            })
            .await?;
            Ok(())
        }
    });

    resume_slot.borrow().as_ref().unwrap().resume(());
    assert!(task.completed());
    // The runtime dropped its reference (and closed the handle it released).
    assert_eq!(Rc::strong_count(&spy), 1);
    assert_eq!(spy.close_calls.get(), 1);
}

#[test]
fn test_foreign_pending_future_fails_the_task() {
    let (rt, _host) = runtime_with_host();
    let task = rt.spawn(async {
        std::future::pending::<()>().await;
        Ok(())
    });
    assert_eq!(task.wait().unwrap_err(), TaskError::UnexpectedYield);
}

#[test]
fn test_await_points_outside_task_context_fail() {
    let out = futures::executor::block_on(async {
        suspend(|_resume: ResumeHandle<()>| None).await
    });
    assert_eq!(out.unwrap_err(), TaskError::NotInTask);

    let out = futures::executor::block_on(yield_now());
    assert_eq!(out.unwrap_err(), TaskError::NotInTask);
}

#[test]
fn test_wait_inside_task_fails_fast() {
    let (rt, _host) = runtime_with_host();
    let out = rt.block_on(async {
        let child = spawn(async { Ok(1) });
        Ok(child.wait().unwrap_err())
    });
    assert_eq!(out.unwrap(), TaskError::WaitInTask);
}

#[test]
fn test_wait_timeout_leaves_the_task_running() {
    let (rt, host) = runtime_with_host();
    let task = rt.spawn({
        let host = host.clone();
        async move {
            sleep(&host, ms(60)).await?;
            Ok("slow")
        }
    });

    assert_eq!(task.wait_timeout(ms(10)).unwrap_err(), TaskError::Timeout);
    assert!(!task.completed());
    assert!(!task.is_closing());
    assert_eq!(task.wait().unwrap(), "slow");
}

#[test]
fn test_detached_child_survives_parent_completion() {
    let (rt, _host) = runtime_with_host();
    let child_slot: Stash<TaskHandle<()>> = stash();

    let parent = rt.spawn({
        let child_slot = child_slot.clone();
        async move {
            let child = spawn_named("free", eternity());
            child.detach();
            *child_slot.borrow_mut() = Some(child.clone());
            Ok(())
        }
    });

    assert_eq!(parent.wait(), Ok(()));
    let child = child_slot.borrow().clone().unwrap();
    assert!(!child.completed());
    assert_eq!(child.status(), Status::Awaiting);

    child.close();
    assert_eq!(child.wait().unwrap_err(), TaskError::Closed);
}

#[test]
fn test_status_and_tree_introspection() {
    let (rt, _host) = runtime_with_host();
    let me_slot: Stash<TaskHandle<()>> = stash();

    let task = rt.spawn_named("outer", {
        let me_slot = me_slot.clone();
        async move {
            yield_now().await?;
            let me = me_slot.borrow().clone().unwrap();
            assert_eq!(me.status(), Status::Running);
            let probe = spawn_named("probe", {
                let me = me.clone();
                async move {
                    // The parent is mid-step below us on the stack.
                    assert_eq!(me.status(), Status::Active);
                    Ok(())
                }
            });
            assert!(probe.completed());
            Ok(())
        }
    });
    *me_slot.borrow_mut() = Some(task.clone());

    assert_eq!(task.status(), Status::Awaiting);
    assert_eq!(task.wait(), Ok(()));
    assert_eq!(task.status(), Status::Completed);
    assert_eq!(task.name(), Some("outer"));
    assert!(task.spawned_at().file().ends_with("tests.rs"));
}

#[test]
fn test_traceback_walks_the_await_chain() {
    let (rt, _host) = runtime_with_host();
    let parent = rt.spawn_named("p", async {
        let child = spawn_named("c", async {
            let grandchild = spawn_named("g", eternity());
            grandchild.await
        });
        child.await
    });

    let trace = parent.traceback(None);
    let p = trace.find("task 'p'").expect("missing p");
    let c = trace.find("task 'c'").expect("missing c");
    let g = trace.find("task 'g'").expect("missing g");
    assert!(p < c && c < g, "got: {trace}");

    let children = parent.children();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name(), Some("c"));

    parent.close();
    assert!(parent.completed());
}

#[test]
fn test_join_all_collects_in_input_order() {
    let (rt, host) = runtime_with_host();
    let out = rt.block_on({
        let host = host.clone();
        async move {
            let tasks: Vec<TaskHandle<u32>> = [30u64, 10, 20]
                .into_iter()
                .enumerate()
                .map(|(i, delay)| {
                    spawn({
                        let host = host.clone();
                        async move {
                            sleep(&host, ms(delay)).await?;
                            Ok(i as u32)
                        }
                    })
                })
                .collect();
            join_all(&tasks).await
        }
    });
    assert_eq!(out.unwrap(), vec![0, 1, 2]);
}

#[test]
fn test_join_all_returns_first_error_unframed() {
    let (rt, host) = runtime_with_host();
    let out = rt.block_on({
        let host = host.clone();
        async move {
            let ok = |delay: u64, value: u32| {
                spawn({
                    let host = host.clone();
                    async move {
                        sleep(&host, ms(delay)).await?;
                        Ok(value)
                    }
                })
            };
            let bad = spawn({
                let host = host.clone();
                async move {
                    sleep(&host, ms(10)).await?;
                    Err::<u32, _>(TaskError::failed("E2"))
                }
            });
            let tasks = vec![ok(5, 1), bad, ok(15, 3)];
            Ok(join_all(&tasks).await.unwrap_err().to_string())
        }
    });
    let text = out.unwrap();
    assert!(text.ends_with(": E2"), "got: {text}");
    assert!(!text.starts_with("child error"), "got: {text}");
}

#[test]
fn test_notifiers_fire_in_insertion_order() {
    let (rt, _host) = runtime_with_host();
    let order = Rc::new(RefCell::new(Vec::new()));

    let out = rt.block_on({
        let order = order.clone();
        async move {
            let target = spawn_named("target", eternity());
            let watchers: Vec<TaskHandle<()>> = (0..3)
                .map(|i| {
                    spawn({
                        let target = target.clone();
                        let order = order.clone();
                        async move {
                            let _ = target.clone().await;
                            order.borrow_mut().push(i);
                            Ok(())
                        }
                    })
                })
                .collect();
            target.complete(())?;
            join_all(&watchers).await?;
            Ok(())
        }
    });

    assert!(out.is_ok());
    assert_eq!(*order.borrow(), vec![0, 1, 2]);
}

#[test]
fn test_dropped_iter_leaves_no_callbacks_behind() {
    let (rt, _host) = runtime_with_host();
    let out = rt.block_on(async {
        let tasks: Vec<TaskHandle<()>> = (0..3).map(|_| spawn(eternity())).collect();
        {
            let mut it = iter(tasks.clone());
            // Park once so every notifier is registered, then abandon it.
            let parked = yield_now().await;
            assert!(parked.is_ok());
            drop(it.next());
        }
        Ok(tasks
            .iter()
            .map(|t| t.core.notifier_count())
            .collect::<Vec<_>>())
    });
    assert_eq!(out.unwrap(), vec![0, 0, 0]);
}

#[test]
fn test_child_born_under_closing_parent_starts_closing() {
    let (rt, host) = runtime_with_host();
    let task = rt.spawn({
        let host = host.clone();
        async move {
            let first = sleep(&host, ms(50)).await;
            assert_eq!(first.unwrap_err(), TaskError::Closed);
            let child = spawn(eternity());
            assert!(child.is_closing());
            assert!(child.completed());
            Err::<(), _>(TaskError::Closed)
        }
    });

    task.close();
    assert!(task.completed());
    assert_eq!(task.wait().unwrap_err(), TaskError::Closed);
}

#[test]
fn test_spawn_runs_child_before_returning() {
    let (rt, _host) = runtime_with_host();
    let order = Rc::new(RefCell::new(Vec::new()));
    let out = rt.block_on({
        let order = order.clone();
        async move {
            order.borrow_mut().push("p1");
            let _child = spawn({
                let order = order.clone();
                async move {
                    order.borrow_mut().push("c");
                    Ok(())
                }
            });
            order.borrow_mut().push("p2");
            Ok(())
        }
    });
    assert!(out.is_ok());
    assert_eq!(*order.borrow(), vec!["p1", "c", "p2"]);
}

#[test]
fn test_one_runtime_per_thread() {
    let first = Builder::new().try_build().unwrap();
    assert!(Builder::new().try_build().is_err());
    drop(first);
    assert!(Builder::new().try_build().is_ok());
}

#[test]
fn test_yield_now_interleaves_ready_tasks() {
    let (rt, _host) = runtime_with_host();
    let order = Rc::new(RefCell::new(Vec::new()));
    let out = rt.block_on({
        let order = order.clone();
        async move {
            let a = spawn({
                let order = order.clone();
                async move {
                    for _ in 0..3 {
                        order.borrow_mut().push('a');
                        yield_now().await?;
                    }
                    Ok(())
                }
            });
            let b = spawn({
                let order = order.clone();
                async move {
                    for _ in 0..3 {
                        order.borrow_mut().push('b');
                        yield_now().await?;
                    }
                    Ok(())
                }
            });
            join_all(&[a, b]).await?;
            Ok(())
        }
    });
    assert!(out.is_ok());
    let seen: String = order.borrow().iter().collect();
    assert_eq!(&seen[..4], "abab", "got: {seen}");
}

#[test]
fn test_close_of_awaited_child_acks_before_parent_resumes() {
    let (rt, _host) = runtime_with_host();
    let spy = SpyClosable::new(false);
    let child_slot: Stash<TaskHandle<()>> = stash();

    let parent = rt.spawn({
        let spy = spy.clone();
        let child_slot = child_slot.clone();
        async move {
            let child = spawn({
                let spy = spy.clone();
                async move {
                    suspend(move |_resume: ResumeHandle<()>| Some(spy as ClosableHandle)).await?;
                    Ok(())
                }
            });
            *child_slot.borrow_mut() = Some(child.clone());
            child.await
        }
    });
    let child = child_slot.borrow().clone().unwrap();

    parent.close();

    // The child's teardown is still in flight; the parent must not run again
    // until the close is acknowledged by the child's completion.
    assert!(!child.completed());
    assert!(!parent.completed(), "parent resumed before the child's close ack");
    assert_eq!(spy.close_calls.get(), 1);

    spy.ack();
    assert!(child.completed());
    assert!(parent.completed());
    assert_eq!(parent.wait().unwrap_err(), TaskError::Closed);
    assert_eq!(child.wait().unwrap_err(), TaskError::Closed);
}

#[test]
fn test_sibling_watcher_does_not_swallow_child_error_from_parent() {
    let (rt, host) = runtime_with_host();
    let out = rt.block_on({
        let host = host.clone();
        async move {
            // `failing` is a child of this task; `watcher` is its sibling and
            // holds its own notifier on it through a join.
            let failing = spawn({
                let host = host.clone();
                async move {
                    sleep(&host, ms(5)).await?;
                    Err::<(), _>(TaskError::failed("BOOM"))
                }
            });
            let watcher = spawn({
                let failing = failing.clone();
                async move { Ok(failing.await.unwrap_err().to_string()) }
            });
            // This task never awaits `failing`; the error must still land
            // here even though the sibling observed it too.
            let parent_view = sleep(&host, ms(500)).await.unwrap_err().to_string();
            let sibling_view = watcher.await?;
            Ok((parent_view, sibling_view))
        }
    });

    let (parent_view, sibling_view) = out.unwrap();
    assert!(parent_view.starts_with("child error: "), "got: {parent_view}");
    assert!(parent_view.ends_with(": BOOM"), "got: {parent_view}");
    assert!(sibling_view.ends_with(": BOOM"), "got: {sibling_view}");
    assert!(!sibling_view.starts_with("child error"), "got: {sibling_view}");
}

#[test]
fn test_abandoned_join_leaves_no_callback_on_the_target() {
    let (rt, _host) = runtime_with_host();
    let target_slot: Stash<TaskHandle<()>> = stash();

    let waiter = rt.spawn({
        let target_slot = target_slot.clone();
        async move {
            let target = spawn_named("target", eternity());
            target.detach();
            *target_slot.borrow_mut() = Some(target.clone());
            target.await
        }
    });
    let target = target_slot.borrow().clone().unwrap();
    assert_eq!(target.core.notifier_count(), 1);

    // Force-complete the waiter while it is parked on the join; dropping its
    // body must unregister the notifier it installed on the target.
    waiter.complete(()).unwrap();
    assert!(waiter.completed());
    assert_eq!(target.core.notifier_count(), 0);
    assert!(!target.completed());

    target.close();
    assert_eq!(target.wait().unwrap_err(), TaskError::Closed);
}

#[test]
fn test_breathe_helper_survives_many_ticks() {
    let (rt, _host) = runtime_with_host();
    assert!(rt.block_on(async { breathe(100).await }).is_ok());
}
