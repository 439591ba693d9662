use std::sync::{Arc, Mutex};

use connections::{ConnectionRef, ConnectionsConfig, Error, ErrorKind, Session};

fn quiet_session(max_connections: usize) -> Session {
    let config = ConnectionsConfig {
        max_connections,
        ..ConnectionsConfig::default()
    };
    Session::with_console(config, Box::new(std::io::sink()), Box::new(std::io::sink()))
        .expect("session")
}

#[test]
fn lazy_connection_opens_per_call() {
    let session = quiet_session(16);
    let con = session.raw("buf", b"a\nb\n", "").expect("raw");
    let mut con = con.lock().expect("lock");
    assert!(!con.is_open());
    assert_eq!(con.mode(), "rb");

    assert_eq!(con.read_lines(-1, true, false).expect("read"), vec!["a", "b"]);
    assert!(!con.is_open());
    // Each on-demand open starts afresh.
    assert_eq!(con.read_lines(1, true, false).expect("read"), vec!["a"]);
    assert!(!con.is_open());
}

#[test]
fn force_open_is_idempotent() {
    let session = quiet_session(16);
    let con = session.raw("buf", b"x\ny\n", "").expect("raw");
    let mut con = con.lock().expect("lock");
    {
        let mut scope = con.force_open(None).expect("open");
        assert!(scope.is_open());
        assert!(scope.is_temporary());
        {
            let inner = scope.force_open(None).expect("reopen");
            assert!(!inner.is_temporary());
        }
        assert!(scope.is_open());
        assert_eq!(scope.read_lines(1, true, false).expect("read"), vec!["x"]);
        assert_eq!(scope.read_lines(1, true, false).expect("read"), vec!["y"]);
    }
    assert!(!con.is_open());
}

#[test]
fn explicit_open_persists() {
    let session = quiet_session(16);
    let con = session.raw("buf", b"1\n2\n3\n", "").expect("raw");
    let mut con = con.lock().expect("lock");
    con.open("rb").expect("open");
    assert_eq!(con.read_lines(1, true, false).expect("read"), vec!["1"]);
    con.close().expect("close");
    assert!(con.is_open());
    assert_eq!(con.read_lines(-1, true, false).expect("read"), vec!["2", "3"]);

    let err = con.open("rb").expect_err("second open");
    assert_eq!(err.kind(), ErrorKind::State);
}

#[test]
fn unknown_mode_is_rejected() {
    let session = quiet_session(16);
    let err = session.raw("buf", b"", "rw").expect_err("bad mode");
    assert!(matches!(err, Error::Mode(_)));
    // The failed constructor does not leak a descriptor.
    assert_eq!(session.get_all_connections(), vec![0, 1, 2]);
}

#[test]
fn destroy_retires_connection_and_reuses_descriptor() {
    let session = quiet_session(16);
    let first = session.raw("first", b"", "").expect("raw");
    assert_eq!(first.descriptor().expect("descriptor"), 3);

    session.close_and_destroy(&first).expect("destroy");
    assert!(first.lock().expect("lock").is_closed());
    assert!(matches!(
        session.close_and_destroy(&first),
        Err(Error::InvalidConnection)
    ));
    assert!(matches!(
        first.lock().expect("lock").read_lines(-1, true, false),
        Err(Error::InvalidConnection)
    ));

    let second = session.raw("second", b"", "").expect("raw");
    assert_eq!(second.descriptor().expect("descriptor"), 3);
    assert!(session.get_connection(3).expect("lookup").ptr_eq(&second));
}

#[test]
fn dropping_every_handle_frees_the_slot() {
    let session = quiet_session(16);
    let con = session.raw("gone", b"", "").expect("raw");
    assert_eq!(session.get_all_connections(), vec![0, 1, 2, 3]);
    drop(con);
    assert_eq!(session.get_all_connections(), vec![0, 1, 2]);
}

#[test]
fn capacity_exhaustion_after_one_reclaim_pass() {
    let session = quiet_session(5);
    let _kept = session.raw("kept", b"", "").expect("raw");
    let stashed: Arc<Mutex<Option<ConnectionRef>>> =
        Arc::new(Mutex::new(Some(session.raw("stashed", b"", "").expect("raw"))));

    let calls = Arc::new(Mutex::new(0));
    {
        let stashed = Arc::clone(&stashed);
        let calls = Arc::clone(&calls);
        session.registry().set_reclaim_hook(move || {
            *calls.lock().unwrap() += 1;
            stashed.lock().unwrap().take();
        });
    }

    // The hook drops the last handle to descriptor 4, so the retry succeeds.
    let reclaimed = session.raw("reclaimed", b"", "").expect("raw after reclaim");
    assert_eq!(reclaimed.descriptor().expect("descriptor"), 4);
    assert_eq!(*calls.lock().unwrap(), 1);

    let err = session.raw("overflow", b"", "").expect_err("table full");
    assert!(matches!(err, Error::AllConnectionsInUse));
    assert_eq!(err.kind(), ErrorKind::Capacity);
    assert_eq!(*calls.lock().unwrap(), 2);
}

#[test]
fn standard_streams_cannot_be_closed() {
    let session = quiet_session(16);
    assert_eq!(session.get_all_connections(), vec![0, 1, 2]);
    let stdout = session.stdout();
    let mut stdout = stdout.lock().expect("lock");
    assert_eq!(stdout.class(), "terminal");
    assert!(stdout.is_open());
    assert!(stdout.close().is_err());
    assert!(stdout.close_and_destroy().is_err());
}

#[test]
fn summary_reports_connection_state() {
    let session = quiet_session(16);
    let con = session.raw("summary", b"", "wb").expect("raw");
    let summary = con.lock().expect("lock").summary();
    assert_eq!(summary.description, "summary");
    assert_eq!(summary.class, "rawConnection");
    assert_eq!(summary.mode, "wb");
    assert!(!summary.text);
    assert!(summary.opened);
    assert!(!summary.can_read);
    assert!(summary.can_write);

    let shown = session.show_connections(false).expect("show");
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].0, 3);
    assert_eq!(session.show_connections(true).expect("show all").len(), 4);
}

#[test]
fn teardown_destroys_user_connections() {
    let session = quiet_session(16);
    let a = session.raw("a", b"", "wb").expect("raw");
    let b = session.raw("b", b"", "").expect("raw");
    assert_eq!(session.teardown(), 2);
    assert!(a.lock().expect("lock").is_closed());
    assert!(b.lock().expect("lock").is_closed());
    assert_eq!(session.get_all_connections(), vec![0, 1, 2]);
}
