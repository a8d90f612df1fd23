use super::*;
use serde_json::json;

fn payload_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[test]
fn chunk_payload_round_trips_through_map() {
    let payload = ChunkPayload {
        file_path: "src/lib.rs".to_string(),
        code_chunk: "pub fn answer() -> u32 { 42 }".to_string(),
        start_line: 10,
        end_line: 12,
    };

    let point = Point::new("p1", vec![0.1, 0.2], payload.clone());
    assert_eq!(point.payload["filePath"], json!("src/lib.rs"));
    assert_eq!(point.payload["startLine"], json!(10));
    assert_eq!(point.chunk_payload(), Some(payload));
}

#[test]
fn payload_missing_any_required_key_is_invalid() {
    for missing in ChunkPayload::REQUIRED_KEYS {
        let mut map = payload_map(json!({
            "filePath": "a.rs",
            "codeChunk": "fn a() {}",
            "startLine": 1,
            "endLine": 2,
        }));
        map.remove(missing);
        assert_eq!(ChunkPayload::from_map(&map), None, "missing {missing}");
    }
}

#[test]
fn payload_values_are_coerced() {
    let map = payload_map(json!({
        "filePath": "a.rs",
        "codeChunk": 42,
        "startLine": "7",
        "endLine": 9.0,
        "extra": "ignored",
    }));

    let payload = ChunkPayload::from_map(&map).expect("payload should be valid");
    assert_eq!(payload.code_chunk, "42");
    assert_eq!(payload.start_line, 7);
    assert_eq!(payload.end_line, 9);
}

#[test]
fn payload_with_unconvertible_value_is_invalid() {
    let map = payload_map(json!({
        "filePath": null,
        "codeChunk": "x",
        "startLine": 1,
        "endLine": 1,
    }));
    assert_eq!(ChunkPayload::from_map(&map), None);

    let map = payload_map(json!({
        "filePath": "a.rs",
        "codeChunk": "x",
        "startLine": "first",
        "endLine": 1,
    }));
    assert_eq!(ChunkPayload::from_map(&map), None);
}

#[test]
fn chunk_payload_serializes_camel_case() {
    let payload = ChunkPayload {
        file_path: "a.rs".to_string(),
        code_chunk: "x".to_string(),
        start_line: 1,
        end_line: 3,
    };
    let json = serde_json::to_value(&payload).expect("can serialize json");
    assert_eq!(
        json,
        json!({"filePath": "a.rs", "codeChunk": "x", "startLine": 1, "endLine": 3})
    );
}

#[test]
fn directory_prefix_strips_leading_dot_slash() {
    assert_eq!(directory_prefix("./src"), Some("src"));
    assert_eq!(directory_prefix("src/lib"), Some("src/lib"));
    assert_eq!(directory_prefix(".."), Some(".."));
    assert_eq!(directory_prefix("."), None);
    assert_eq!(directory_prefix("./"), None);
    assert_eq!(directory_prefix(""), None);
}

#[cfg(unix)]
#[test]
fn relative_paths_are_normalized_against_workspace() {
    let workspace = Path::new("/ws");

    assert_eq!(workspace_relative_path(workspace, "/ws/src/a.rs"), "src/a.rs");
    assert_eq!(workspace_relative_path(workspace, "./src/./b.rs"), "src/b.rs");
    assert_eq!(workspace_relative_path(workspace, "lib/../src/c.rs"), "src/c.rs");
    assert_eq!(workspace_relative_path(workspace, "../outside.rs"), "../outside.rs");
    assert_eq!(
        workspace_relative_path(workspace, "/elsewhere/d.rs"),
        "/elsewhere/d.rs"
    );
}
