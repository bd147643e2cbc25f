//! End-to-end dispatch tests against the in-memory transport

use livelens_core::*;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn last_document(transport: &MemoryTransport, connection: ConnectionId) -> Document {
    let message = transport
        .last_message(connection)
        .expect("connection received nothing");
    match serde_json::from_str::<ServerMessage>(&message).unwrap() {
        ServerMessage::Render(document) => document,
        other => panic!("Expected render message, got {:?}", other),
    }
}

fn link(id: &str) -> String {
    InvocationRequest::link(id).to_json().unwrap()
}

fn form(id: &str, args: Vec<serde_json::Value>) -> String {
    InvocationRequest::form(id, args).to_json().unwrap()
}

fn counter_app(transport: Arc<MemoryTransport>) -> PerConnectionRenderer {
    PerConnectionRenderer::new(transport, || {
        let count = render(0);
        let target = count.clone();
        render(Action::link("Increment", move || {
            target.update(|v| Value::Int(v.as_int().unwrap_or(0) + 1));
        }));
    })
}

#[test]
fn test_per_connection_isolation() {
    let transport = Arc::new(MemoryTransport::new());
    let renderer = counter_app(transport.clone());

    let a = transport.connect();
    let b = transport.connect();
    let state_a = renderer.on_connect(a);
    let state_b = renderer.on_connect(b);
    let b_before = transport.messages(b);

    let id = last_document(&transport, a)
        .find_callback("Increment")
        .unwrap()
        .to_string();
    renderer.on_message(&state_a, a, &link(&id));

    let counter = last_document(&transport, a);
    assert_eq!(counter.targets[0].value.leaf_value(), Some(&json!(1)));
    // B saw nothing new and its tree is untouched
    assert_eq!(transport.messages(b), b_before);
    assert_eq!(state_b.tree().get(NodeId(0)), Some(Value::Int(0)));

    // A's identifier means nothing to B's registry
    let b_sent = transport.messages(b).len();
    renderer.on_message(&state_b, b, &link(&id));
    assert_eq!(transport.messages(b).len(), b_sent);
    assert_eq!(state_b.tree().get(NodeId(0)), Some(Value::Int(0)));
}

#[test]
fn test_shared_convergence() {
    let transport = Arc::new(MemoryTransport::new());
    let renderer = SharedStateRenderer::new(transport.clone(), || {
        let count = render(0);
        render(Action::link("Increment", move || {
            count.update(|v| Value::Int(v.as_int().unwrap_or(0) + 1));
        }));
    });

    let viewers: Vec<_> = (0..3).map(|_| transport.connect()).collect();
    for viewer in &viewers {
        renderer.on_connect(*viewer);
    }

    for round in 1..=3 {
        let invoker = viewers[round % viewers.len()];
        let id = last_document(&transport, invoker)
            .find_callback("Increment")
            .unwrap()
            .to_string();
        renderer.on_message(&(), invoker, &link(&id));

        let latest: Vec<_> = viewers
            .iter()
            .map(|v| transport.last_message(*v).unwrap())
            .collect();
        assert!(latest.windows(2).all(|w| w[0] == w[1]));
        let document = last_document(&transport, viewers[0]);
        assert_eq!(document.targets[0].value.leaf_value(), Some(&json!(round)));
    }
}

#[test]
fn test_registry_freshness() {
    let transport = Arc::new(MemoryTransport::new());
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let renderer = SharedStateRenderer::new(transport.clone(), move || {
        let counter = counter.clone();
        render(Action::link("Hit", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
    });
    let a = transport.connect();
    renderer.on_connect(a);

    let stale = last_document(&transport, a).find_callback("Hit").unwrap().to_string();
    renderer.refresh();
    let fresh = last_document(&transport, a).find_callback("Hit").unwrap().to_string();
    assert_ne!(stale, fresh);

    let sent = transport.messages(a).len();
    renderer.on_message(&(), a, &link(&stale));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(transport.messages(a).len(), sent);

    renderer.on_message(&(), a, &link(&fresh));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_record_round_trip_and_link_runs_once() {
    let transport = Arc::new(MemoryTransport::new());
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let renderer = PerConnectionRenderer::new(transport.clone(), move || {
        let counter = counter.clone();
        render(Record::new("Pair").field("a", 3).field("b", "x"));
        render(Action::link("Go", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
    });
    let a = transport.connect();
    let state = renderer.on_connect(a);

    let document = last_document(&transport, a);
    let record = document.target(NodeId(0)).unwrap();
    assert_eq!(record.field("a").and_then(DocNode::leaf_value), Some(&json!(3)));
    assert_eq!(record.field("b").and_then(DocNode::leaf_value), Some(&json!("x")));

    let id = document.find_callback("Go").unwrap().to_string();
    renderer.on_message(&state, a, &link(&id));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_form_invocation_and_rejection() {
    let transport = Arc::new(MemoryTransport::new());
    let sums = Arc::new(Mutex::new(Vec::new()));
    let sink = sums.clone();
    let renderer = PerConnectionRenderer::new(transport.clone(), move || {
        let sink = sink.clone();
        let result = render("");
        render(Action::form2("Add", ["a", "b"], move |a: i64, b: i64| {
            sink.lock().push(a + b);
            result.set(a + b);
        }));
    });
    let c = transport.connect();
    let state = renderer.on_connect(c);
    let id = last_document(&transport, c).find_callback("Add").unwrap().to_string();

    renderer.on_message(&state, c, &form(&id, vec![json!(3), json!(4)]));
    assert_eq!(*sums.lock(), vec![7]);
    assert_eq!(
        last_document(&transport, c).targets[0].value.leaf_value(),
        Some(&json!(7))
    );

    let id = last_document(&transport, c).find_callback("Add").unwrap().to_string();
    let sent = transport.messages(c).len();
    renderer.on_message(&state, c, &form(&id, vec![json!("x"), json!(4)]));
    assert_eq!(*sums.lock(), vec![7]);
    assert_eq!(transport.messages(c).len(), sent);

    // A form id invoked as a link is a protocol error, not a call
    renderer.on_message(&state, c, &link(&id));
    assert_eq!(*sums.lock(), vec![7]);
}

#[test]
fn test_nested_context_is_restored_after_dispatch() {
    let transport = Arc::new(MemoryTransport::new());
    let observed = Arc::new(Mutex::new(Vec::new()));
    let log = observed.clone();
    let renderer = PerConnectionRenderer::new(transport.clone(), move || {
        let log = log.clone();
        render(Action::link("Nest", move || {
            let outer = Context::current().unwrap();
            let scratch = RenderTree::new(|_| {});
            let inner = Context::new(Strategy::Shared, outer.transport.clone(), scratch.clone(), None);
            inner.with(|| {
                render("into scratch");
            });
            let restored = Context::current().unwrap();
            log.lock().push((restored == outer, scratch.len()));
        }));
    });

    let a = transport.connect();
    let state = renderer.on_connect(a);
    let id = last_document(&transport, a).find_callback("Nest").unwrap().to_string();
    renderer.on_message(&state, a, &link(&id));

    assert_eq!(*observed.lock(), vec![(true, 1)]);
    assert_eq!(state.tree().len(), 1);
    assert!(!Context::is_active());
}

#[test]
fn test_context_is_restored_after_nested_dispatch() {
    type Peer = (Arc<PerConnectionRenderer>, Arc<ConnectionState>, ConnectionId);

    let transport = Arc::new(MemoryTransport::new());
    let peer: Arc<Mutex<Option<Peer>>> = Arc::new(Mutex::new(None));
    let observed = Arc::new(Mutex::new(Vec::new()));

    let (slot, log, messages) = (peer.clone(), observed.clone(), transport.clone());
    let renderer = Arc::new(PerConnectionRenderer::new(transport.clone(), move || {
        let (slot, messages) = (slot.clone(), messages.clone());
        let outer_log = log.clone();
        render(Action::link("Outer", move || {
            let outer = Context::current().unwrap();
            let (renderer, state, connection) = slot.lock().clone().unwrap();
            let id = last_document(&messages, connection)
                .find_callback("Inner")
                .unwrap()
                .to_string();
            renderer.on_message(&state, connection, &link(&id));
            let restored = Context::current().unwrap();
            outer_log.lock().push(("outer", restored.connection, restored == outer));
        }));
        let inner_log = log.clone();
        render(Action::link("Inner", move || {
            let inner = Context::current().unwrap();
            inner_log.lock().push(("inner", inner.connection, true));
        }));
    }));

    let a = transport.connect();
    let b = transport.connect();
    let state_a = renderer.on_connect(a);
    let state_b = renderer.on_connect(b);
    *peer.lock() = Some((renderer.clone(), state_b, b));

    let id = last_document(&transport, a).find_callback("Outer").unwrap().to_string();
    renderer.on_message(&state_a, a, &link(&id));

    assert_eq!(
        *observed.lock(),
        vec![("inner", Some(b), true), ("outer", Some(a), true)]
    );
    assert!(!Context::is_active());
    // Break the renderer <-> initialiser cycle
    peer.lock().take();
}

#[test]
fn test_concurrent_connections_keep_their_own_context() {
    let transport = Arc::new(MemoryTransport::new());
    let renderer = Arc::new(PerConnectionRenderer::new(transport.clone(), || {
        let connection = Context::current().and_then(|c| c.connection);
        let who = render(format!("{:?}", connection));
        render(Action::link("Who", move || {
            let now = Context::current().and_then(|c| c.connection);
            who.set(format!("{:?}", now));
        }));
    }));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let renderer = renderer.clone();
            let transport = transport.clone();
            thread::spawn(move || {
                let connection = transport.connect();
                let state = renderer.on_connect(connection);
                for _ in 0..20 {
                    let id = last_document(&transport, connection)
                        .find_callback("Who")
                        .unwrap()
                        .to_string();
                    renderer.on_message(&state, connection, &link(&id));
                }
                let expected = format!("{:?}", Some(connection));
                assert_eq!(state.tree().get(NodeId(0)), Some(Value::String(expected)));
                assert!(!Context::is_active());
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_download_goes_to_invoking_connection() {
    let transport = Arc::new(MemoryTransport::new());
    let renderer = PerConnectionRenderer::new(transport.clone(), || {
        render(Action::link("Export", || -> anyhow::Result<()> {
            download("report.txt", "text/plain", || b"hello".to_vec())?;
            Ok(())
        }));
    });
    let a = transport.connect();
    let b = transport.connect();
    let state_a = renderer.on_connect(a);
    renderer.on_connect(b);

    let id = last_document(&transport, a).find_callback("Export").unwrap().to_string();
    renderer.on_message(&state_a, a, &link(&id));

    let notice = transport
        .messages(a)
        .into_iter()
        .filter_map(|m| serde_json::from_str::<ServerMessage>(&m).ok())
        .find_map(|m| match m {
            ServerMessage::Download { url, name } => Some((url, name)),
            _ => None,
        })
        .expect("no download notice");
    assert_eq!(notice.1, "report.txt");
    assert_eq!(transport.blob(&notice.0).unwrap().produce(), b"hello".to_vec());
    assert!(transport
        .messages(b)
        .iter()
        .all(|m| !m.contains("\"download\"")));
}

#[test]
fn test_shared_dispatch_under_concurrent_updates() {
    const VIEWERS: usize = 4;
    const CLICKS: usize = 100;

    let transport = Arc::new(MemoryTransport::new());
    let ticker_slot = Arc::new(Mutex::new(None));
    let hits = Arc::new(AtomicUsize::new(0));

    let (slot, counter) = (ticker_slot.clone(), hits.clone());
    let renderer = Arc::new(SharedStateRenderer::new(transport.clone(), move || {
        *slot.lock() = Some(render(0));
        let count = render(0);
        let counter = counter.clone();
        render(Action::link("Increment", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            count.update(|v| Value::Int(v.as_int().unwrap_or(0) + 1));
        }));
    }));
    let ticker: RenderTarget = ticker_slot.lock().take().unwrap();

    let viewers: Vec<_> = (0..VIEWERS).map(|_| transport.connect()).collect();
    for viewer in &viewers {
        renderer.on_connect(*viewer);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let background = {
        let stop = stop.clone();
        thread::spawn(move || {
            let mut tick = 0;
            while !stop.load(Ordering::SeqCst) {
                tick += 1;
                ticker.set(tick);
                thread::sleep(Duration::from_micros(200));
            }
        })
    };

    let handles: Vec<_> = viewers
        .iter()
        .map(|&viewer| {
            let renderer = renderer.clone();
            let transport = transport.clone();
            thread::spawn(move || {
                for _ in 0..CLICKS {
                    let id = last_document(&transport, viewer)
                        .find_callback("Increment")
                        .unwrap()
                        .to_string();
                    renderer.on_message(&(), viewer, &link(&id));
                }
                assert!(!Context::is_active());
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    stop.store(true, Ordering::SeqCst);
    background.join().unwrap();

    // Each click either ran exactly once or was dropped as stale
    let ran = hits.load(Ordering::SeqCst);
    assert!(ran > 0 && ran <= VIEWERS * CLICKS);
    assert_eq!(renderer.tree().get(NodeId(1)), Some(Value::Int(ran as i64)));

    renderer.refresh();
    let latest: Vec<_> = viewers
        .iter()
        .map(|v| transport.last_message(*v).unwrap())
        .collect();
    assert!(latest.windows(2).all(|w| w[0] == w[1]));
}
