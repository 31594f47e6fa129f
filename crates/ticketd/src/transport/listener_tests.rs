//! Tests for the socket listener.

use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};

use crate::dispatch::EventDispatcher;
use crate::framing::FramingOptions;
use crate::registry::ConnectionRegistry;

use super::listener::SocketListener;
use super::{
    AcceptedStream, ConnectionHandler, CountingHandler, LineConnectionHandler, ListenerError,
};

#[derive(Clone)]
struct CountingFixture {
    count: Arc<AtomicUsize>,
    handler: Arc<CountingHandler>,
}

#[fixture]
fn counting_fixture() -> CountingFixture {
    let (count, handler) = CountingHandler::new();
    CountingFixture { count, handler }
}

#[fixture]
fn loopback_listener() -> SocketListener {
    SocketListener::bind("127.0.0.1", 0).expect("bind tcp listener")
}

fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[rstest]
fn tcp_listener_accepts_connections(
    loopback_listener: SocketListener,
    counting_fixture: CountingFixture,
) {
    let addr = loopback_listener.local_addr();
    let CountingFixture { count, handler } = counting_fixture;
    let handler: Arc<dyn ConnectionHandler> = handler;
    let handle = loopback_listener
        .start(Arc::new(ConnectionRegistry::new()), handler)
        .expect("start listener");

    TcpStream::connect(addr).expect("connect first client");
    TcpStream::connect(addr).expect("connect second client");

    assert!(
        wait_until(|| count.load(Ordering::SeqCst) >= 2),
        "expected two connections"
    );
    handle.shutdown();
    handle.join().expect("join listener");
}

#[rstest]
fn tcp_listener_rejects_port_in_use() {
    let reserved = TcpListener::bind(("127.0.0.1", 0)).expect("reserve port");
    let port = reserved.local_addr().expect("reserved address").port();

    let error = SocketListener::bind("127.0.0.1", port).expect_err("port should be taken");
    assert!(matches!(error, ListenerError::Bind { .. }));
}

#[rstest]
fn shutdown_cancels_idle_connections(loopback_listener: SocketListener) {
    let addr = loopback_listener.local_addr();
    let registry = Arc::new(ConnectionRegistry::new());
    let handler = Arc::new(LineConnectionHandler::new(
        Arc::new(EventDispatcher::new()),
        FramingOptions::default(),
    ));
    let handle = loopback_listener
        .start(Arc::clone(&registry), handler)
        .expect("start listener");

    let _idle = TcpStream::connect(addr).expect("connect idle client");
    assert!(
        wait_until(|| registry.len() == 1),
        "connection should be registered"
    );

    handle.shutdown();
    handle.join().expect("join listener");
    assert!(registry.is_empty(), "cancelled connections must unregister");
}

#[derive(Default)]
struct ThreadNameHandler {
    names: Mutex<Vec<Option<String>>>,
}

impl ConnectionHandler for ThreadNameHandler {
    fn handle(&self, _stream: AcceptedStream) {
        let name = std::thread::current().name().map(str::to_owned);
        self.names.lock().expect("names mutex poisoned").push(name);
    }
}

#[rstest]
fn connections_run_on_named_threads(loopback_listener: SocketListener) {
    let addr = loopback_listener.local_addr();
    let handler = Arc::new(ThreadNameHandler::default());
    let handle = loopback_listener
        .start(
            Arc::new(ConnectionRegistry::new()),
            Arc::clone(&handler) as Arc<dyn ConnectionHandler>,
        )
        .expect("start listener");

    TcpStream::connect(addr).expect("connect client");
    assert!(wait_until(|| {
        !handler.names.lock().expect("names mutex poisoned").is_empty()
    }));
    handle.shutdown();
    handle.join().expect("join listener");

    let names = handler.names.lock().expect("names mutex poisoned").clone();
    assert_eq!(names, [Some("ticketd-conn".to_owned())]);
}

// Holds every connection thread until the test releases it.
struct GatedHandler {
    gate: Mutex<Receiver<()>>,
    handled: AtomicUsize,
}

impl GatedHandler {
    fn new() -> (Sender<()>, Arc<Self>) {
        let (release, gate) = mpsc::channel();
        let handler = Arc::new(Self {
            gate: Mutex::new(gate),
            handled: AtomicUsize::new(0),
        });
        (release, handler)
    }
}

impl ConnectionHandler for GatedHandler {
    fn handle(&self, _stream: AcceptedStream) {
        let _ = self.gate.lock().expect("gate mutex poisoned").recv();
        self.handled.fetch_add(1, Ordering::SeqCst);
    }
}

#[rstest]
fn connections_are_registered_before_their_handler_runs(loopback_listener: SocketListener) {
    let addr = loopback_listener.local_addr();
    let registry = Arc::new(ConnectionRegistry::new());
    let (release, handler) = GatedHandler::new();
    let handle = loopback_listener
        .start(
            Arc::clone(&registry),
            Arc::clone(&handler) as Arc<dyn ConnectionHandler>,
        )
        .expect("start listener");

    let client = TcpStream::connect(addr).expect("connect client");
    let client_addr = client.local_addr().expect("client address");
    assert!(
        wait_until(|| registry.len() == 1),
        "accepted connection should be registered"
    );
    assert_eq!(handler.handled.load(Ordering::SeqCst), 0);
    let peers: Vec<_> = registry.snapshot().iter().map(|c| c.peer()).collect();
    assert_eq!(peers, [client_addr]);

    release.send(()).expect("release handler");
    assert!(wait_until(|| registry.is_empty()), "handled connection should unregister");
    assert_eq!(handler.handled.load(Ordering::SeqCst), 1);

    handle.shutdown();
    handle.join().expect("join listener");
}
