//! Purpose: End-to-end coverage for JSON record files, in-memory streams, and split/join.
//! Exports: Integration tests only.
//! Role: Exercise the public `api` surface against real temp files.
//! Invariants: Every test works in its own tempdir; nothing leaks between tests.
//! Invariants: Byte-level assertions only where the plain encoding is byte-stable.
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use recstream::api::{
    ErrorKind, FieldNaming, FileService, JsonReader, JsonWriter, MarshalOptions, UnmarshalOptions,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .try_init();
}

fn write_objects<W: Write>(mut writer: JsonWriter<W>) {
    let obj1 = HashMap::from([("test", "obj1")]);
    let obj2 = HashMap::from([("test", "obj2")]);
    writer.write(&obj1).expect("write obj1");
    writer.write(&obj2).expect("write obj2");
    writer.close().expect("close");
}

fn read_objects<R: Read>(mut reader: JsonReader<R>) {
    let obj1: HashMap<String, Value> = reader.read().expect("read obj1").expect("obj1");
    assert_eq!(obj1.len(), 1);
    assert_eq!(obj1["test"], "obj1");

    let obj2: HashMap<String, Value> = reader.read().expect("read obj2").expect("obj2");
    assert_eq!(obj2.len(), 1);
    assert_eq!(obj2["test"], "obj2");

    assert!(reader.read::<HashMap<String, Value>>().expect("eof").is_none());
    reader.close().expect("close");
}

fn write_numbered(service: &FileService, path: &Path, count: usize) {
    let mut writer = service.new_json_file(path).expect("create");
    for n in 0..count {
        writer.write(&json!({"test": "obj1", "n": n})).expect("write");
    }
    writer.close().expect("close");
}

fn count_records(service: &FileService, path: &Path) -> usize {
    let mut reader = service.open_json_file(path).expect("open");
    reader.values::<Value>().map(|value| value.expect("value")).count()
}

fn gunzip(path: &Path) -> Vec<u8> {
    let file = std::fs::File::open(path).expect("open");
    let mut out = Vec::new();
    flate2::read::MultiGzDecoder::new(file)
        .read_to_end(&mut out)
        .expect("gunzip");
    out
}

#[test]
fn json_write_and_read() {
    init_tracing();
    let service = FileService::new();
    let dir = tempfile::tempdir().expect("tempdir");

    let path = dir.path().join("json-test.json");
    write_objects(service.new_json_file(&path).expect("create"));
    let mut buf = Vec::new();
    write_objects(service.new_json_stream(&mut buf, false));

    let content = std::fs::read(&path).expect("read file");
    assert_eq!(buf, content);

    read_objects(service.json_stream(content.as_slice(), false).expect("stream"));
    read_objects(service.open_json_file(&path).expect("open"));

    let gz_path = dir.path().join("json-test.json.gz");
    write_objects(service.new_json_file(&gz_path).expect("create gz"));
    read_objects(service.open_json_file(&gz_path).expect("open gz"));
    assert_eq!(gunzip(&gz_path), content);
}

#[test]
fn in_memory_gzip_stream_reads_back() {
    let service = FileService::new();
    let mut buf = Vec::new();
    write_objects(service.new_json_stream(&mut buf, true));
    assert_eq!(&buf[..2], &[0x1f, 0x8b]);
    read_objects(service.json_stream(buf.as_slice(), true).expect("stream"));
}

#[test]
fn plain_and_gzip_decode_identically() {
    let service = FileService::new().with_buffer_size(64);
    let records: Vec<Value> = (0..50)
        .map(|n| json!({"n": n, "name": format!("record-{n}"), "tags": ["a", "b"]}))
        .collect();

    let mut decoded = Vec::new();
    for gzip in [false, true] {
        let mut writer = service.new_json_stream(Vec::new(), gzip);
        for record in &records {
            writer.write(record).expect("write");
        }
        let bytes = writer.finish().expect("finish");
        let mut reader = service.json_stream(bytes.as_slice(), gzip).expect("stream");
        let values: Vec<Value> = reader.values().map(|value| value.expect("value")).collect();
        decoded.push(values);
    }
    assert_eq!(decoded[0], records);
    assert_eq!(decoded[1], records);
}

#[test]
fn reads_past_end_keep_returning_end_of_stream() {
    let service = FileService::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("three.json.gz");
    write_numbered(&service, &path, 3);

    let mut reader = service.open_json_file(&path).expect("open");
    for _ in 0..3 {
        assert!(reader.read_value().expect("read").is_some());
    }
    for _ in 0..5 {
        assert!(reader.read_value().expect("eof").is_none());
    }
}

#[test]
fn json_split_and_join() {
    init_tracing();
    let service = FileService::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let json_path = dir.path().join("json-test.json");

    let mut writer = service.new_json_file(&json_path).expect("create");
    let obj1 = HashMap::from([("test", "obj1")]);
    for _ in 0..100 {
        writer.write(&obj1).expect("write");
    }
    writer.close().expect("close");

    let parts = service
        .split_json_file(&json_path, 10, |i| dir.path().join(format!("json-test_part{i}.json")))
        .expect("split");
    assert_eq!(parts.len(), 10);
    for part in &parts {
        assert_eq!(count_records(&service, part), 10);
    }

    let all = std::fs::read(&json_path).expect("read source");
    service.join_json_files(&json_path, &parts).expect("join");
    let joined = std::fs::read(&json_path).expect("read joined");
    assert_eq!(all, joined);
}

#[test]
fn split_size_edge_cases() {
    let service = FileService::new();
    let dir = tempfile::tempdir().expect("tempdir");

    let empty = dir.path().join("empty.json");
    write_numbered(&service, &empty, 0);
    let parts = service
        .split_json_file(&empty, 10, |i| dir.path().join(format!("empty_part{i}.json")))
        .expect("split empty");
    assert!(parts.is_empty());

    let five = dir.path().join("five.json");
    write_numbered(&service, &five, 5);
    let parts = service
        .split_json_file(&five, 10, |i| dir.path().join(format!("five_part{i}.json")))
        .expect("split five");
    assert_eq!(parts.len(), 1);
    assert_eq!(count_records(&service, &parts[0]), 5);

    let err = service
        .split_json_file(&five, 0, |i| dir.path().join(format!("zero_part{i}.json")))
        .expect_err("zero part size");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(!dir.path().join("zero_part0.json").exists());
}

#[test]
fn mixed_compression_split_and_join() {
    let service = FileService::new();
    let dir = tempfile::tempdir().expect("tempdir");

    let plain = dir.path().join("source.json");
    write_numbered(&service, &plain, 25);
    let original = std::fs::read(&plain).expect("read plain");

    let gz_parts = service
        .split_json_file(&plain, 10, |i| dir.path().join(format!("gz_part{i}.json.gz")))
        .expect("split to gz");
    assert_eq!(gz_parts.len(), 3);
    let rejoined = dir.path().join("rejoined.json");
    service.join_json_files(&rejoined, &gz_parts).expect("join gz parts");
    assert_eq!(std::fs::read(&rejoined).expect("read rejoined"), original);

    let gz_source = dir.path().join("source.json.gz");
    write_numbered(&service, &gz_source, 25);
    let plain_parts: Vec<PathBuf> = service
        .split_json_file(&gz_source, 7, |i| dir.path().join(format!("plain_part{i}.json")))
        .expect("split gz source");
    assert_eq!(plain_parts.len(), 4);
    let gz_joined = dir.path().join("joined.json.gz");
    service.join_json_files(&gz_joined, &plain_parts).expect("join plain parts");
    assert_eq!(gunzip(&gz_joined), original);
}

#[test]
fn join_follows_caller_order() {
    let service = FileService::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("ordered.json");
    write_numbered(&service, &source, 4);

    let mut parts = service
        .split_json_file(&source, 2, |i| dir.path().join(format!("ordered_part{i}.json")))
        .expect("split");
    parts.reverse();
    let dest = dir.path().join("reversed.json");
    service.join_json_files(&dest, &parts).expect("join");

    let mut reader = service.open_json_file(&dest).expect("open");
    let ns: Vec<u64> = reader
        .values::<Value>()
        .map(|value| value.expect("value")["n"].as_u64().expect("n"))
        .collect();
    assert_eq!(ns, vec![2, 3, 0, 1]);
}

#[test]
fn corrupt_record_aborts_join() {
    let service = FileService::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let good = dir.path().join("good.json");
    write_numbered(&service, &good, 2);
    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, b"{\"test\":\"obj1\"}\n{\"test\":").expect("write bad");

    let err = service
        .join_json_files(dir.path().join("out.json"), &[good, bad.clone()])
        .expect_err("should fail");
    assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    assert_eq!(err.path(), Some(bad.as_path()));
}

#[test]
fn failed_part_keeps_earlier_parts_on_disk() {
    let service = FileService::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("source.json");
    write_numbered(&service, &source, 5);

    let bad_part = dir.path().join("missing-dir").join("part1.json");
    let err = service
        .split_json_file(&source, 2, |i| {
            if i == 1 {
                bad_part.clone()
            } else {
                dir.path().join(format!("part{i}.json"))
            }
        })
        .expect_err("should fail");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.path(), Some(bad_part.as_path()));

    let first = dir.path().join("part0.json");
    assert!(first.exists());
    assert_eq!(count_records(&service, &first), 2);
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Endpoint {
    service_name: String,
    field_1: u32,
    #[serde(rename = "URL")]
    url: String,
    labels: HashMap<String, String>,
}

#[test]
fn transport_named_files_read_back_under_any_configuration() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("endpoints.json.gz");
    let endpoint = Endpoint {
        service_name: "api".to_string(),
        field_1: 7,
        url: "https://example.test".to_string(),
        labels: HashMap::from([("team_id".to_string(), "core".to_string())]),
    };

    let writer_service = FileService::new()
        .with_marshal_options(MarshalOptions::new().with_naming(FieldNaming::Transport));
    let mut writer = writer_service.new_json_file(&path).expect("create");
    writer.write(&endpoint).expect("write");
    writer.close().expect("close");

    let wire: Value = serde_json::from_slice(&gunzip(&path)).expect("wire json");
    assert_eq!(
        wire,
        json!({
            "serviceName": "api",
            "field1": 7,
            "URL": "https://example.test",
            "labels": {"team_id": "core"}
        })
    );

    let strict = UnmarshalOptions::new().with_discard_unknown(false);
    for service in [
        writer_service.clone().with_unmarshal_options(strict),
        FileService::new().with_unmarshal_options(strict),
    ] {
        let mut reader = service.open_json_file(&path).expect("open");
        assert_eq!(reader.read::<Endpoint>().expect("read"), Some(endpoint.clone()));
        assert!(reader.read::<Endpoint>().expect("eof").is_none());
    }

    let mut untyped = FileService::new().open_json_file(&path).expect("open");
    assert_eq!(untyped.read_value().expect("read"), Some(wire));
}
