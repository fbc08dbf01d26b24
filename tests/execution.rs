// tests/execution.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use devgraph::errors::{ExecutionError, GraphError};
use devgraph::exec::{CompletionSignal, DeviceBuffer, SignalState, signal_pair};
use devgraph::graph::{Graph, NodePayload};
use devgraph_test_utils::{
    TraceEvent, TraceExecutor, host_queue, init_tracing, trace_queue, with_timeout,
};

const N: usize = 16;

#[tokio::test(flavor = "multi_thread")]
async fn recorded_and_explicit_nodes_compose_end_to_end() {
    init_tracing();
    let queue = host_queue();
    let graph = Graph::for_queue(&queue);
    let arr = DeviceBuffer::new(N, 0);

    graph.begin_recording(&queue).unwrap();
    let out = arr.clone();
    let k1 = queue
        .submit(|cg| {
            cg.parallel_for("k1", N, move |i| out.set(i, 42));
        })
        .unwrap();
    graph.end_recording(&queue).unwrap();

    let out = arr.clone();
    graph
        .add(|cg| {
            cg.depends_on(&k1)
                .parallel_for("k2", N, move |i| out.update(i, |v| v * 2));
        })
        .unwrap();

    let exec = graph.finalize().unwrap();
    with_timeout(exec.submit(&queue).unwrap().wait())
        .await
        .unwrap();

    assert_eq!(arr.to_vec(), vec![84; N]);
}

#[tokio::test(flavor = "multi_thread")]
async fn recorded_handle_dependency_is_equivalent_to_node_dependency() {
    let exec_a = TraceExecutor::with_ids(0, 1);
    let queue = trace_queue(&exec_a);

    // Cross-style: recorded node, explicit dependent via its handle.
    let bridged = Graph::for_queue(&queue);
    bridged.begin_recording(&queue).unwrap();
    let first = queue
        .submit(|cg| {
            cg.parallel_for("first", 1, |_| {});
        })
        .unwrap();
    bridged.end_recording(&queue).unwrap();
    let second = bridged
        .add(|cg| {
            cg.depends_on(&first).parallel_for("second", 1, |_| {});
        })
        .unwrap();

    // Same shape built explicitly.
    let explicit = Graph::for_queue(&queue);
    let e1 = explicit.add_node(NodePayload::Empty, []);
    let e2 = explicit.add_node(NodePayload::Empty, [e1.into()]);

    let bridged_exec = bridged.finalize().unwrap();
    let explicit_exec = explicit.finalize().unwrap();
    assert_eq!(
        bridged_exec.predecessors_of(second),
        vec![first.node().unwrap()]
    );
    assert_eq!(explicit_exec.predecessors_of(e2), vec![e1]);

    exec_a.set_delay("first", Duration::from_millis(30));
    with_timeout(bridged_exec.submit(&queue).unwrap().wait())
        .await
        .unwrap();
    let done_first = exec_a
        .position(&TraceEvent::Finished("first".into()))
        .unwrap();
    let start_second = exec_a
        .position(&TraceEvent::Started("second".into()))
        .unwrap();
    assert!(done_first < start_second);
}

#[tokio::test(flavor = "multi_thread")]
async fn independent_nodes_run_concurrently_and_joins_wait_for_all() {
    let exec = TraceExecutor::with_ids(0, 1);
    let queue = trace_queue(&exec);
    let graph = Graph::for_queue(&queue);

    let slow = graph
        .add(|cg| {
            cg.parallel_for("slow", 1, |_| {});
        })
        .unwrap();
    let fast = graph
        .add(|cg| {
            cg.parallel_for("fast", 1, |_| {});
        })
        .unwrap();
    graph
        .add(|cg| {
            cg.depends_on(slow)
                .depends_on(fast)
                .parallel_for("join", 1, |_| {});
        })
        .unwrap();
    exec.set_delay("slow", Duration::from_millis(50));

    let executable = graph.finalize().unwrap();
    with_timeout(executable.submit(&queue).unwrap().wait())
        .await
        .unwrap();

    assert_eq!(exec.finished(), vec!["fast", "slow", "join"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_submissions_are_independent_instances() {
    let queue = host_queue();
    let graph = Graph::for_queue(&queue);
    let hits = Arc::new(AtomicUsize::new(0));

    let h = Arc::clone(&hits);
    let a = graph
        .add(|cg| {
            cg.parallel_for("a", 8, move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            });
        })
        .unwrap();
    let h = Arc::clone(&hits);
    graph
        .add(|cg| {
            cg.depends_on(a).host_task("b", move || {
                h.fetch_add(100, Ordering::SeqCst);
                Ok(())
            });
        })
        .unwrap();
    let exec = graph.finalize().unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let exec = exec.clone();
        let queue = queue.clone();
        tasks.push(tokio::spawn(async move {
            let handle = exec.submit(&queue).unwrap();
            handle.wait().await
        }));
    }
    for t in tasks {
        with_timeout(t).await.unwrap().unwrap();
    }

    assert_eq!(hits.load(Ordering::SeqCst), 8 * (8 + 100));
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_propagates_to_dependents_and_the_instance_handle() {
    let exec = TraceExecutor::with_ids(0, 1);
    let queue = trace_queue(&exec);
    let graph = Graph::for_queue(&queue);

    let root = graph
        .add(|cg| {
            cg.host_task("root", || Err(anyhow::anyhow!("sensor offline")));
        })
        .unwrap();
    graph
        .add(|cg| {
            cg.depends_on(root).parallel_for("downstream", 1, |_| {});
        })
        .unwrap();
    graph
        .add(|cg| {
            cg.parallel_for("unrelated", 1, |_| {});
        })
        .unwrap();

    let executable = graph.finalize().unwrap();
    let err = with_timeout(executable.submit(&queue).unwrap().wait())
        .await
        .unwrap_err();

    match err {
        ExecutionError::HostTask { name, message } => {
            assert_eq!(name, "root");
            assert!(message.contains("sensor offline"));
        }
        other => panic!("expected HostTask failure, got {other:?}"),
    }
    let started = exec.started();
    assert!(!started.contains(&"downstream".to_string()));
    assert!(started.contains(&"unrelated".to_string()));

    // A later instance of a healthy graph is unaffected.
    let healthy = Graph::for_queue(&queue);
    healthy
        .add(|cg| {
            cg.parallel_for("ok", 1, |_| {});
        })
        .unwrap();
    with_timeout(healthy.finalize().unwrap().submit(&queue).unwrap().wait())
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn injected_device_failure_is_reported() {
    let exec = TraceExecutor::with_ids(0, 1);
    let queue = trace_queue(&exec);
    exec.fail_on("k", ExecutionError::Panicked { name: "k".into() });

    let graph = Graph::for_queue(&queue);
    graph
        .add(|cg| {
            cg.parallel_for("k", 1, |_| {});
        })
        .unwrap();
    let err = with_timeout(graph.finalize().unwrap().submit(&queue).unwrap().wait())
        .await
        .unwrap_err();
    assert_eq!(err, ExecutionError::Panicked { name: "k".into() });
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_kernel_fails_the_submission() {
    let queue = host_queue();
    let handle = queue
        .submit(|cg| {
            cg.parallel_for("boom", 1, |_| panic!("kernel bug"));
        })
        .unwrap();
    let err = with_timeout(handle.wait()).await.unwrap_err();
    assert_eq!(err, ExecutionError::Panicked { name: "boom".into() });
}

#[tokio::test(flavor = "multi_thread")]
async fn out_of_bounds_copy_fails() {
    let queue = host_queue();
    let src = DeviceBuffer::new(4, 1);
    let dst = DeviceBuffer::new(2, 0);
    let handle = queue
        .submit(|cg| {
            cg.copy(&src, &dst);
        })
        .unwrap();
    let err = with_timeout(handle.wait()).await.unwrap_err();
    assert!(matches!(err, ExecutionError::OutOfBounds { .. }));
    assert_eq!(dst.to_vec(), vec![0, 0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn submitting_to_a_queue_with_another_context_fails() {
    let exec = TraceExecutor::with_ids(0, 1);
    let other = TraceExecutor::with_ids(0, 2);
    let queue = trace_queue(&exec);
    let foreign = trace_queue(&other);

    let graph = Graph::for_queue(&queue);
    graph.add_node(NodePayload::Empty, []);
    let executable = graph.finalize().unwrap();

    match executable.submit(&foreign) {
        Err(GraphError::ContextMismatch { expected, actual }) => {
            assert_eq!(expected, queue.context());
            assert_eq!(actual, foreign.context());
        }
        res => panic!("expected ContextMismatch, got {res:?}"),
    }
    assert_eq!(other.enqueued(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn executable_graph_can_be_submitted_repeatedly() {
    let queue = host_queue();
    let graph = Graph::for_queue(&queue);
    let buf = DeviceBuffer::new(4, 1);

    let out = buf.clone();
    graph
        .add(|cg| {
            cg.parallel_for("double", 4, move |i| out.update(i, |v| v * 2));
        })
        .unwrap();
    let exec = graph.finalize().unwrap();

    for _ in 0..3 {
        with_timeout(queue.submit_graph(&exec).unwrap().wait())
            .await
            .unwrap();
    }
    assert_eq!(buf.to_vec(), vec![8; 4]);
}

#[tokio::test(flavor = "multi_thread")]
async fn subgraph_node_runs_child_between_its_neighbours() {
    let exec = TraceExecutor::with_ids(0, 1);
    let queue = trace_queue(&exec);

    let child = Graph::for_queue(&queue);
    let c1 = child
        .add(|cg| {
            cg.parallel_for("child-a", 1, |_| {});
        })
        .unwrap();
    child
        .add(|cg| {
            cg.depends_on(c1).parallel_for("child-b", 1, |_| {});
        })
        .unwrap();
    let child_exec = child.finalize().unwrap();

    let parent = Graph::for_queue(&queue);
    parent.begin_recording(&queue).unwrap();
    queue
        .submit(|cg| {
            cg.parallel_for("before", 1, |_| {});
        })
        .unwrap();
    queue.submit_graph(&child_exec).unwrap();
    queue
        .submit(|cg| {
            cg.parallel_for("after", 1, |_| {});
        })
        .unwrap();
    parent.end_recording(&queue).unwrap();

    exec.set_delay("child-b", Duration::from_millis(20));
    let parent_exec = parent.finalize().unwrap();
    assert_eq!(parent_exec.len(), 3);
    with_timeout(parent_exec.submit(&queue).unwrap().wait())
        .await
        .unwrap();

    assert_eq!(exec.finished(), vec!["before", "child-a", "child-b", "after"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn node_waits_for_external_signal() {
    let exec = TraceExecutor::with_ids(0, 1);
    let queue = trace_queue(&exec);
    let (notifier, gate) = signal_pair();

    let graph = Graph::for_queue(&queue);
    graph
        .add(|cg| {
            cg.depends_on(devgraph::exec::CompletionHandle::from(gate.clone()))
                .parallel_for("gated", 1, |_| {});
        })
        .unwrap();
    let handle = graph.finalize().unwrap().submit(&queue).unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(exec.started().is_empty());
    assert_eq!(handle.status(), SignalState::Pending);

    notifier.complete(Ok(()));
    with_timeout(handle.wait()).await.unwrap();
    assert_eq!(exec.finished(), vec!["gated"]);
    assert_eq!(handle.status(), SignalState::Complete);
}

#[tokio::test(flavor = "multi_thread")]
async fn immediate_submission_can_gate_a_graph_node() {
    let queue = host_queue();
    let buf = DeviceBuffer::new(4, 0);

    let filled = queue
        .submit(|cg| {
            cg.fill(&buf, 5);
        })
        .unwrap();

    let graph = Graph::for_queue(&queue);
    let out = buf.clone();
    graph
        .add(|cg| {
            cg.depends_on(&filled)
                .parallel_for("inc", 4, move |i| out.update(i, |v| v + 1));
        })
        .unwrap();
    with_timeout(graph.finalize().unwrap().submit(&queue).unwrap().wait())
        .await
        .unwrap();
    assert_eq!(buf.to_vec(), vec![6; 4]);
}

#[tokio::test(flavor = "multi_thread")]
async fn node_tokens_are_unsubmitted_until_launched_and_cannot_gate_immediate_work() {
    let queue = host_queue();
    let graph = Graph::for_queue(&queue);

    graph.begin_recording(&queue).unwrap();
    let token = queue.submit(|_| {}).unwrap();
    graph.end_recording(&queue).unwrap();
    let node = token.node().unwrap();

    assert!(!token.is_complete());
    assert_eq!(
        token.wait().await,
        Err(ExecutionError::Unsubmitted { node })
    );

    match queue.submit(|cg| {
        cg.depends_on(&token);
    }) {
        Err(GraphError::UnsubmittedDependency { node: n }) => assert_eq!(n, node),
        other => panic!("expected UnsubmittedDependency, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn recorded_node_handle_follows_its_node_once_submitted() {
    let queue = host_queue();
    let graph = Graph::for_queue(&queue);
    let arr = DeviceBuffer::new(4, 0);

    graph.begin_recording(&queue).unwrap();
    let out = arr.clone();
    let k1 = queue
        .submit(|cg| {
            cg.parallel_for("k1", 4, move |i| out.set(i, 42));
        })
        .unwrap();
    graph.end_recording(&queue).unwrap();
    let node = k1.node().unwrap();

    let exec = graph.finalize().unwrap();
    assert_eq!(
        k1.status(),
        SignalState::Failed(ExecutionError::Unsubmitted { node })
    );

    with_timeout(exec.submit(&queue).unwrap().wait())
        .await
        .unwrap();
    assert_eq!(arr.to_vec(), vec![42; 4]);

    assert_eq!(k1.status(), SignalState::Complete);
    assert!(k1.is_complete());
    assert_eq!(with_timeout(k1.wait()).await, Ok(()));
    // A handle fetched from the graph observes the same node.
    assert!(graph.handle(node).is_complete());
}

#[tokio::test(flavor = "multi_thread")]
async fn explicit_node_handle_reports_the_node_failure() {
    let exec = TraceExecutor::with_ids(0, 1);
    let queue = trace_queue(&exec);
    let graph = Graph::for_queue(&queue);

    let ok = graph
        .add(|cg| {
            cg.parallel_for("ok", 1, |_| {});
        })
        .unwrap();
    let bad = graph
        .add(|cg| {
            cg.depends_on(ok).parallel_for("bad", 1, |_| {});
        })
        .unwrap();
    let ok_handle = graph.handle(ok);
    let bad_handle = graph.handle(bad);
    assert!(!bad_handle.is_complete());

    exec.fail_on("bad", ExecutionError::Panicked { name: "bad".into() });
    let instance = graph.finalize().unwrap().submit(&queue).unwrap();
    let _ = with_timeout(instance.wait()).await;

    assert_eq!(with_timeout(ok_handle.wait()).await, Ok(()));
    assert_eq!(
        with_timeout(bad_handle.wait()).await,
        Err(ExecutionError::Panicked { name: "bad".into() })
    );
    // A bare id is not tied to any launch.
    assert_eq!(
        devgraph::exec::CompletionHandle::from(ok).status(),
        SignalState::Failed(ExecutionError::Unsubmitted { node: ok })
    );
}

#[test]
fn completed_signal_is_never_reported_as_abandoned() {
    for _ in 0..200 {
        let (notifier, signal) = signal_pair();
        let worker = std::thread::spawn(move || notifier.complete(Ok(())));
        loop {
            match signal.status() {
                SignalState::Pending => std::thread::yield_now(),
                state => {
                    assert_eq!(state, SignalState::Complete);
                    break;
                }
            }
        }
        worker.join().unwrap();
        assert_eq!(signal.status(), SignalState::Complete);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_graph_submission_completes() {
    let queue = host_queue();
    let graph = Graph::for_queue(&queue);
    let handle = graph.finalize().unwrap().submit(&queue).unwrap();
    with_timeout(handle.wait()).await.unwrap();
}

#[tokio::test]
async fn abandoned_signal_reports_abandoned() {
    let (notifier, signal) = signal_pair();
    drop(notifier);
    assert_eq!(signal.wait().await, Err(ExecutionError::Abandoned));
    assert_eq!(
        signal.status(),
        SignalState::Failed(ExecutionError::Abandoned)
    );

    let done = CompletionSignal::completed();
    assert!(done.is_complete());
    assert_eq!(done.wait().await, Ok(()));
}
