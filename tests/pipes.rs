use connections::{ConnectionsConfig, Error, RwMode, SeekMode, Session};
use tempfile::tempdir;

fn quiet_session() -> Session {
    Session::with_console(
        ConnectionsConfig::default(),
        Box::new(std::io::sink()),
        Box::new(std::io::sink()),
    )
    .expect("session")
}

#[test]
fn lazy_pipe_reruns_command_per_read() {
    let session = quiet_session();
    let con = session.pipe("printf 'a\\nb\\n'", "").expect("pipe");
    let mut con = con.lock().expect("lock");
    assert_eq!(con.class(), "pipe");
    assert!(!con.is_open());
    assert_eq!(con.read_lines(-1, true, false).expect("read"), vec!["a", "b"]);
    assert_eq!(con.read_lines(1, true, false).expect("read"), vec!["a"]);
}

#[test]
fn write_pipe_feeds_command() {
    let dir = tempdir().expect("tempdir");
    let target = dir.path().join("out.txt");
    let session = quiet_session();
    let con = session
        .pipe(&format!("cat > '{}'", target.display()), "w")
        .expect("pipe");
    {
        let mut con = con.lock().expect("lock");
        assert!(!con.can_read());
        con.write_lines(&["first", "second"], "\n").expect("write");
    }
    session.close_and_destroy(&con).expect("close");
    assert_eq!(
        std::fs::read_to_string(&target).expect("read back"),
        "first\nsecond\n"
    );
}

#[test]
fn pipes_cannot_seek() {
    let session = quiet_session();
    let con = session.pipe("printf x", "r").expect("pipe");
    let err = con
        .lock()
        .expect("lock")
        .seek(0, SeekMode::Enquire, RwMode::Last)
        .expect_err("unseekable");
    assert!(matches!(err, Error::UnseekableConnection));
}

#[test]
fn fifo_round_trip_in_read_write_mode() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("chan");
    let session = quiet_session();
    let con = session.fifo(&path, "w+", true).expect("fifo");
    let mut con = con.lock().expect("lock");
    assert_eq!(con.class(), "fifo");
    con.write_lines(&["through"], "\n").expect("write");
    assert_eq!(con.read_lines(1, true, false).expect("read"), vec!["through"]);
}
