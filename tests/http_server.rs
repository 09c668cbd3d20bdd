//! HTTP server lifecycle tests.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use servicekit::error::Error;
use servicekit::server::HttpServer;
use tokio::net::TcpStream;

mod common;

fn echo_routes() -> servicekit::server::HttpRegisterFn {
    Box::new(|router: Router| router.route("/echo", get(|| async { "hello" })))
}

#[tokio::test]
async fn binding_to_port_zero_records_a_dialable_address() {
    let server = Arc::new(HttpServer::new("localhost:0"));
    assert!(server.local_addr().is_none());

    let runner = server.clone();
    let start = tokio::spawn(async move { runner.start(vec![echo_routes()]).await });
    server.ready().wait().await;

    let addr = server.local_addr().expect("bound address not recorded");
    assert_ne!(addr.port(), 0);

    let response = reqwest::get(format!("http://{addr}/echo")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "hello");

    server.stop(None).await.unwrap();
    start.await.unwrap().unwrap();

    // Once stopped the address no longer accepts connections.
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn readiness_fans_out_to_many_observers() {
    let server = Arc::new(HttpServer::new("localhost:0"));

    let mut waiters = Vec::new();
    for _ in 0..4 {
        let ready = server.ready();
        waiters.push(tokio::spawn(async move { ready.wait().await }));
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(waiters.iter().all(|w| !w.is_finished()));

    let runner = server.clone();
    let start = tokio::spawn(async move { runner.start(Vec::new()).await });

    for waiter in waiters {
        tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("observer never saw readiness")
            .unwrap();
    }

    server.stop(None).await.unwrap();
    start.await.unwrap().unwrap();
}

#[tokio::test]
async fn second_start_is_an_explicit_error() {
    let server = Arc::new(HttpServer::new("localhost:0"));

    let runner = server.clone();
    let start = tokio::spawn(async move { runner.start(Vec::new()).await });
    server.ready().wait().await;

    let err = server.start(Vec::new()).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyStarted { module: "http" }));

    // The original listener is unaffected by the rejected start.
    let addr = server.local_addr().unwrap();
    assert!(TcpStream::connect(addr).await.is_ok());

    server.stop(None).await.unwrap();
    start.await.unwrap().unwrap();
}

#[tokio::test]
async fn stop_never_started_or_twice_is_harmless() {
    let server = HttpServer::new("localhost:0");
    server.stop(None).await.unwrap();
    server.stop(Some(Duration::from_millis(10))).await.unwrap();
}

#[tokio::test]
async fn stop_deadline_expires_while_inflight_request_drains() {
    let server = Arc::new(HttpServer::new("localhost:0"));

    let slow: servicekit::server::HttpRegisterFn = Box::new(|router: Router| {
        router.route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                "done"
            }),
        )
    });

    let runner = server.clone();
    let start = tokio::spawn(async move { runner.start(vec![slow]).await });
    server.ready().wait().await;
    let addr = server.local_addr().unwrap();

    let inflight = tokio::spawn(reqwest::get(format!("http://{addr}/slow")));
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The in-flight request outlives the deadline, so stop reports it.
    let err = server
        .stop(Some(Duration::from_millis(20)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ShutdownTimeout { module: "http" }));

    // New connections are refused as soon as the stop trigger fired.
    assert!(TcpStream::connect(addr).await.is_err());

    // The serve loop still drains gracefully.
    start.await.unwrap().unwrap();
    let _ = inflight.await.unwrap();

    // A second stop after the drain observes completion.
    server.stop(Some(Duration::from_millis(100))).await.unwrap();
}
