use std::collections::BTreeMap;
use std::time::Duration;

use domaind::client::Client;
use domaind::daemon::Daemon;
use domaind::fork::Invocation;
use domaind::msg::{Request, Response};
use domaind::signal::SignalKind;

fn sleeper() -> Invocation {
    Invocation::new(vec!["sleep", "30"]).unwrap()
}

fn message(response: Response) -> String {
    match response {
        Response::Message(message) => message,
        other => panic!("expected a message: {:?}", other),
    }
}

fn processes(response: Response) -> BTreeMap<u32, u32> {
    match response {
        Response::Processes(processes) => processes,
        other => panic!("expected processes: {:?}", other),
    }
}

#[tokio::test]
async fn test_supervise_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("domaind.sock");

    let daemon = Daemon::bind(&socket).await.expect("failed to bind");
    let served = tokio::spawn(daemon.run());

    let mut client = Client::connect(&socket).await.expect("failed to connect");

    for domain in 0..3 {
        let start = Request::Start {
            domain,
            invocation: sleeper(),
        };
        let started = message(client.request(&start).await.unwrap());
        assert_eq!(started, format!("Server for Domain ID '{}' started.", domain));
    }

    let listed = processes(client.request(&Request::List).await.unwrap());
    assert_eq!(listed.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);

    let run = Request::Run {
        domain: 7,
        invocation: Invocation::shell("echo listed"),
        check_server: true,
    };
    let output = message(client.request(&run).await.unwrap());
    assert!(output.contains("not running"));

    let run = Request::Run {
        domain: 1,
        invocation: Invocation::shell("echo listed"),
        check_server: true,
    };
    assert_eq!(message(client.request(&run).await.unwrap()), "listed\n");

    let stop = Request::Stop {
        domain: 1,
        signal: SignalKind::Interrupt,
    };
    assert_eq!(
        message(client.request(&stop).await.unwrap()),
        "Discovery Server for Domain ID '1' stopped."
    );

    // a second connection sees the same registry
    let mut other = Client::connect(&socket).await.expect("failed to connect");
    let listed = processes(other.request(&Request::List).await.unwrap());
    assert_eq!(listed.keys().copied().collect::<Vec<_>>(), vec![0, 2]);

    let stop_all = Request::StopAll {
        signal: SignalKind::Kill,
    };
    assert_eq!(
        message(other.request(&stop_all).await.unwrap()),
        "Discovery Server for Domain ID '0' stopped.\nDiscovery Server for Domain ID '2' stopped.\n"
    );

    client
        .request(&Request::Start {
            domain: 4,
            invocation: sleeper(),
        })
        .await
        .unwrap();
    assert_eq!(
        message(client.request(&Request::Shutdown).await.unwrap()),
        "Discovery Server for Domain ID '4' stopped.\n"
    );

    let summary = served.await.unwrap().expect("daemon failed");
    assert_eq!(summary, "");
    assert!(!socket.exists());
}

#[tokio::test]
async fn test_errors_do_not_stop_the_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("domaind.sock");

    let daemon = Daemon::bind(&socket).await.expect("failed to bind");
    let served = tokio::spawn(daemon.run());
    let mut client = Client::connect(&socket).await.expect("failed to connect");

    let start = Request::Start {
        domain: 3,
        invocation: Invocation::new(vec!["/nonexistent/domaind-test-server"]).unwrap(),
    };
    match client.request(&start).await.unwrap() {
        Response::Error(_) => (),
        other => panic!("expected an error: {:?}", other),
    }

    assert!(processes(client.request(&Request::List).await.unwrap()).is_empty());

    message(client.request(&Request::Shutdown).await.unwrap());
    served.await.unwrap().expect("daemon failed");
}

#[tokio::test]
async fn test_open_connections_close_with_the_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("domaind.sock");
    let sentinel = dir.path().join("started");

    let daemon = Daemon::bind(&socket).await.expect("failed to bind");
    let served = tokio::spawn(daemon.run());

    let mut first = Client::connect(&socket).await.expect("failed to connect");
    let mut second = Client::connect(&socket).await.expect("failed to connect");
    assert!(processes(second.request(&Request::List).await.unwrap()).is_empty());

    message(first.request(&Request::Shutdown).await.unwrap());
    let summary = served.await.unwrap().expect("daemon failed");
    assert_eq!(summary, "");

    let start = Request::Start {
        domain: 9,
        invocation: Invocation::new(vec![
            "touch".to_string(),
            sentinel.display().to_string(),
        ])
        .unwrap(),
    };
    assert!(second.request(&start).await.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!sentinel.exists());
}

#[tokio::test]
async fn test_connect_without_daemon() {
    let dir = tempfile::tempdir().unwrap();

    assert!(Client::connect(&dir.path().join("missing.sock")).await.is_err());
}
