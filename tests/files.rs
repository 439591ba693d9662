use connections::{
    Compression, ConnectionsConfig, Error, RwMode, SeekMode, Session,
};
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
fn lazy_file_reads_each_call_from_start() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("plain.txt");
    std::fs::write(&path, "one\ntwo\n").expect("write");

    let session = quiet_session();
    let con = session.file(&path, "").expect("file");
    let mut con = con.lock().expect("lock");
    assert_eq!(con.class(), "file");
    assert!(con.is_seekable());
    assert_eq!(con.read_lines(1, true, false).expect("read"), vec!["one"]);
    assert_eq!(con.read_lines(-1, true, false).expect("read"), vec!["one", "two"]);
}

#[test]
fn missing_file_fails_to_open_and_frees_descriptor() {
    let dir = tempdir().expect("tempdir");
    let session = quiet_session();
    let err = session
        .file(dir.path().join("absent.txt"), "r")
        .expect_err("missing");
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(session.get_all_connections(), vec![0, 1, 2]);
}

#[test]
fn read_write_file_keeps_separate_cursors() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("dual.txt");
    let session = quiet_session();
    let con = session.file(&path, "w+").expect("file");
    let mut con = con.lock().expect("lock");

    con.write_string("abc\ndef\n").expect("write");
    assert_eq!(con.read_lines(1, true, false).expect("read"), vec!["abc"]);
    con.write_string("ghi\n").expect("write");

    assert_eq!(con.seek(0, SeekMode::Enquire, RwMode::Write).expect("tell"), 12);
    // The read cursor accounts for text already buffered but not returned.
    assert_eq!(con.seek(0, SeekMode::Enquire, RwMode::Read).expect("tell"), 4);
    assert_eq!(con.read_lines(-1, true, false).expect("read"), vec!["def", "ghi"]);
}

#[test]
fn moving_write_cursor_keeps_read_position() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("update.txt");
    std::fs::write(&path, "0123456789\nsecond\nthird\n").expect("write");

    let session = quiet_session();
    let con = session.file(&path, "r+").expect("file");
    let mut con = con.lock().expect("lock");
    assert_eq!(con.read_lines(1, true, false).expect("read"), vec!["0123456789"]);
    assert_eq!(con.seek(0, SeekMode::Enquire, RwMode::Read).expect("tell"), 11);

    con.seek(10, SeekMode::Start, RwMode::Write).expect("seek");
    assert_eq!(con.seek(0, SeekMode::Enquire, RwMode::Write).expect("tell"), 10);
    assert_eq!(con.seek(0, SeekMode::Enquire, RwMode::Read).expect("tell"), 11);
    assert_eq!(
        con.read_lines(-1, true, false).expect("read"),
        vec!["second", "third"]
    );
}

#[test]
fn seek_discards_buffered_input() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("seek.txt");
    std::fs::write(&path, "first\nsecond\nthird\n").expect("write");

    let session = quiet_session();
    let con = session.file(&path, "r").expect("file");
    let mut con = con.lock().expect("lock");
    assert_eq!(con.read_lines(1, true, false).expect("read"), vec!["first"]);
    con.push_back(&["pushed"], true).expect("push");

    con.seek(6, SeekMode::Start, RwMode::Last).expect("seek");
    assert_eq!(con.push_back_length(), 0);
    assert_eq!(
        con.read_lines(-1, true, false).expect("read"),
        vec!["second", "third"]
    );
}

#[test]
fn seek_requires_open_connection() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("lazy.txt");
    std::fs::write(&path, "x\n").expect("write");

    let session = quiet_session();
    let con = session.file(&path, "").expect("file");
    let err = con
        .lock()
        .expect("lock")
        .seek(0, SeekMode::Enquire, RwMode::Last)
        .expect_err("lazy");
    assert!(matches!(err, Error::State(_)));
}

#[test]
fn truncate_at_write_cursor() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("trunc.bin");
    std::fs::write(&path, "0123456789").expect("write");

    let session = quiet_session();
    let con = session.file(&path, "r+").expect("file");
    {
        let mut con = con.lock().expect("lock");
        con.seek(3, SeekMode::Start, RwMode::Write).expect("seek");
        con.truncate().expect("truncate");
    }
    session.close_and_destroy(&con).expect("close");
    assert_eq!(std::fs::read(&path).expect("read back"), b"012");
}

#[test]
fn truncate_rejects_read_only_connection() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("ro.txt");
    std::fs::write(&path, "abc").expect("write");

    let session = quiet_session();
    let con = session.file(&path, "r").expect("file");
    assert!(con.lock().expect("lock").truncate().is_err());
}

#[test]
fn gzip_round_trip_and_content_sniffing() {
    let dir = tempdir().expect("tempdir");
    // The extension does not matter; the magic bytes do.
    let path = dir.path().join("renamed.txt");

    let session = quiet_session();
    let out = session.gzfile(&path, "w").expect("gzfile");
    {
        let mut out = out.lock().expect("lock");
        assert_eq!(out.class(), "gzfile");
        assert!(!out.is_seekable());
        out.write_lines(&["alpha", "beta"], "\n").expect("write");
    }
    session.close_and_destroy(&out).expect("close");

    let plain = session.file(&path, "").expect("file");
    assert_eq!(
        plain.lock().expect("lock").read_lines(-1, true, false).expect("read"),
        vec!["alpha", "beta"]
    );

    let raw = session.file_with(&path, "", "", true).expect("raw file");
    assert_eq!(raw.lock().expect("lock").read_bin(2).expect("read"), vec![0x1f, 0x8b]);
}

#[test]
fn compressed_reader_follows_magic_over_declared_codec() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("data.bz2");
    let payload: Vec<u8> = (0..4096u32).flat_map(|i| i.to_le_bytes()).collect();

    let session = quiet_session();
    let out = session
        .compressed_file(&path, "wb", Compression::Bzip2)
        .expect("bzfile");
    assert_eq!(out.lock().expect("lock").class(), "bzfile");
    out.lock().expect("lock").write_bin(&payload).expect("write");
    session.close_and_destroy(&out).expect("close");

    let input = session.gzfile(&path, "").expect("gzfile");
    let mut input = input.lock().expect("lock");
    let mut scope = input.force_open(None).expect("open");
    assert_eq!(scope.compression(), Compression::Bzip2);
    let mut read = Vec::new();
    loop {
        let chunk = scope.read_bin(1000).expect("read");
        if chunk.is_empty() {
            break;
        }
        read.extend(chunk);
    }
    assert_eq!(read, payload);
}

#[test]
fn xz_and_zstd_round_trip() {
    let dir = tempdir().expect("tempdir");
    let session = quiet_session();
    for (name, codec) in [("a.xz", Compression::Xz), ("a.zst", Compression::Zstd)] {
        let path = dir.path().join(name);
        let out = session.compressed_file(&path, "w", codec).expect("open");
        out.lock()
            .expect("lock")
            .write_lines(&["packed"], "\n")
            .expect("write");
        session.close_and_destroy(&out).expect("close");

        let input = session.file(&path, "").expect("file");
        assert_eq!(
            input.lock().expect("lock").read_lines(-1, true, false).expect("read"),
            vec!["packed"]
        );
    }
}

#[test]
fn compressed_file_rejects_read_write() {
    let dir = tempdir().expect("tempdir");
    let session = quiet_session();
    let err = session
        .gzfile(dir.path().join("rw.gz"), "w+")
        .expect_err("read-write");
    assert!(matches!(err, Error::Unsupported(_)));
}

#[test]
fn compression_type_changes_class_of_lazy_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("later.gz");

    let session = quiet_session();
    let con = session.file(&path, "").expect("file");
    {
        let mut con = con.lock().expect("lock");
        con.set_compression_type(Compression::Gzip).expect("set");
        assert_eq!(con.class(), "gzfile");
        assert_eq!(con.compression(), Compression::Gzip);
        assert!(!con.is_open());
        con.open("w").expect("open");
        con.write_string("zipped\n").expect("write");
    }
    session.close_and_destroy(&con).expect("close");

    let bytes = std::fs::read(&path).expect("read back");
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
}

#[test]
fn compression_type_refused_on_read_write_file() {
    let dir = tempdir().expect("tempdir");
    let session = quiet_session();
    let con = session.file(dir.path().join("rw.txt"), "w+").expect("file");
    let err = con
        .lock()
        .expect("lock")
        .set_compression_type(Compression::Gzip)
        .expect_err("read-write");
    assert!(matches!(err, Error::Unsupported(_)));
}

#[test]
fn compression_type_refused_on_buffers() {
    let session = quiet_session();
    let con = session.raw("buf", b"", "").expect("raw");
    assert!(con
        .lock()
        .expect("lock")
        .set_compression_type(Compression::Gzip)
        .is_err());
}
