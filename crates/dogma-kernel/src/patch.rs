//! Minimal patch appliers used by [`crate::memory::InMemoryStorage`] to
//! interpret `ApplyJsonPatch` and `ApplyTextPatch` changes.
//!
//! These are intentionally small: the wire payload for a patch is opaque
//! bytes as far as the command model is concerned (§1, "schema evolution of
//! user payloads... is a non-goal"); this module exists only so the
//! in-memory reference storage can exercise the contract in tests.

use dogma_types::DogmaError;
use serde_json::Value;

/// Applies a JSON Patch (RFC 6902) subset — `add`, `remove`, `replace` —
/// addressed by a `/`-separated JSON pointer. `test`, `move`, and `copy`
/// are rejected as unsupported.
pub fn apply_json_patch(document: &Value, patch: &Value) -> Result<Value, DogmaError> {
    let ops = patch
        .as_array()
        .ok_or_else(|| DogmaError::InvalidChange("JSON patch must be an array".to_owned()))?;

    let mut result = document.clone();
    for op in ops {
        let kind = op
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| DogmaError::InvalidChange("patch op missing 'op'".to_owned()))?;
        let pointer = op
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| DogmaError::InvalidChange("patch op missing 'path'".to_owned()))?;

        match kind {
            "add" | "replace" => {
                let value = op
                    .get("value")
                    .cloned()
                    .ok_or_else(|| DogmaError::InvalidChange("patch op missing 'value'".to_owned()))?;
                set_pointer(&mut result, pointer, value)?;
            }
            "remove" => remove_pointer(&mut result, pointer)?,
            other => {
                return Err(DogmaError::InvalidChange(format!("unsupported patch op: {other}")));
            }
        }
    }
    Ok(result)
}

fn set_pointer(root: &mut Value, pointer: &str, value: Value) -> Result<(), DogmaError> {
    if pointer.is_empty() {
        *root = value;
        return Ok(());
    }
    let (parent, last) = split_pointer(pointer)?;
    let target = navigate_mut(root, &parent)?;
    match target {
        Value::Object(map) => {
            map.insert(last, value);
            Ok(())
        }
        Value::Array(arr) => {
            if last == "-" {
                arr.push(value);
            } else {
                let idx: usize = last
                    .parse()
                    .map_err(|_| DogmaError::InvalidChange(format!("invalid array index: {last}")))?;
                if idx > arr.len() {
                    return Err(DogmaError::InvalidChange(format!("array index out of bounds: {idx}")));
                }
                arr.insert(idx, value);
            }
            Ok(())
        }
        _ => Err(DogmaError::InvalidChange(format!("cannot set pointer into scalar: {pointer}"))),
    }
}

fn remove_pointer(root: &mut Value, pointer: &str) -> Result<(), DogmaError> {
    let (parent, last) = split_pointer(pointer)?;
    let target = navigate_mut(root, &parent)?;
    match target {
        Value::Object(map) => {
            map.remove(&last)
                .ok_or_else(|| DogmaError::InvalidChange(format!("no such key: {last}")))?;
            Ok(())
        }
        Value::Array(arr) => {
            let idx: usize = last
                .parse()
                .map_err(|_| DogmaError::InvalidChange(format!("invalid array index: {last}")))?;
            if idx >= arr.len() {
                return Err(DogmaError::InvalidChange(format!("array index out of bounds: {idx}")));
            }
            arr.remove(idx);
            Ok(())
        }
        _ => Err(DogmaError::InvalidChange(format!("cannot remove pointer from scalar: {pointer}"))),
    }
}

fn split_pointer(pointer: &str) -> Result<(Vec<String>, String), DogmaError> {
    if !pointer.starts_with('/') {
        return Err(DogmaError::InvalidChange(format!("invalid JSON pointer: {pointer}")));
    }
    let mut segments: Vec<String> =
        pointer.split('/').skip(1).map(|s| s.replace("~1", "/").replace("~0", "~")).collect();
    let last = segments.pop().ok_or_else(|| DogmaError::InvalidChange("empty JSON pointer".to_owned()))?;
    Ok((segments, last))
}

fn navigate_mut<'a>(root: &'a mut Value, segments: &[String]) -> Result<&'a mut Value, DogmaError> {
    let mut current = root;
    for seg in segments {
        current = match current {
            Value::Object(map) => map
                .get_mut(seg)
                .ok_or_else(|| DogmaError::InvalidChange(format!("no such key: {seg}")))?,
            Value::Array(arr) => {
                let idx: usize =
                    seg.parse().map_err(|_| DogmaError::InvalidChange(format!("invalid array index: {seg}")))?;
                arr.get_mut(idx)
                    .ok_or_else(|| DogmaError::InvalidChange(format!("array index out of bounds: {idx}")))?
            }
            _ => return Err(DogmaError::InvalidChange("pointer traverses a scalar".to_owned())),
        };
    }
    Ok(current)
}

/// Applies a subset of unified-diff text patches: `@@ -l,s +l,s @@` hunk
/// headers followed by ` ` (context), `-` (removed), `+` (added) lines.
/// Context lines must match the source exactly, or the patch is rejected
/// as stale (`DogmaError::Conflict`).
pub fn apply_text_patch(source: &str, patch: &str) -> Result<String, DogmaError> {
    let src_lines: Vec<&str> = source.lines().collect();
    let mut out: Vec<String> = Vec::new();
    let mut cursor = 0usize; // 0-indexed position into src_lines already emitted
    let mut lines = patch.lines().peekable();

    while let Some(line) = lines.next() {
        if !line.starts_with("@@") {
            continue;
        }
        let start = parse_hunk_start(line)?;
        // Copy untouched lines before the hunk.
        while cursor < start {
            out.push(src_lines.get(cursor).copied().unwrap_or_default().to_owned());
            cursor += 1;
        }
        while let Some(&next) = lines.peek() {
            if next.starts_with("@@") {
                break;
            }
            let hunk_line = lines.next().unwrap();
            if let Some(rest) = hunk_line.strip_prefix(' ') {
                let src = src_lines.get(cursor).copied().unwrap_or_default();
                if src != rest {
                    return Err(DogmaError::Conflict);
                }
                out.push(rest.to_owned());
                cursor += 1;
            } else if let Some(rest) = hunk_line.strip_prefix('-') {
                let src = src_lines.get(cursor).copied().unwrap_or_default();
                if src != rest {
                    return Err(DogmaError::Conflict);
                }
                cursor += 1;
            } else if let Some(rest) = hunk_line.strip_prefix('+') {
                out.push(rest.to_owned());
            } else if hunk_line.is_empty() {
                // tolerate trailing blank lines in the patch body
            } else {
                return Err(DogmaError::InvalidChange(format!("malformed patch line: {hunk_line}")));
            }
        }
    }
    while cursor < src_lines.len() {
        out.push(src_lines[cursor].to_owned());
        cursor += 1;
    }
    let mut result = out.join("\n");
    result.push('\n');
    Ok(result)
}

fn parse_hunk_start(header: &str) -> Result<usize, DogmaError> {
    let malformed = || DogmaError::InvalidChange(format!("malformed hunk header: {header}"));
    let minus = header.split(['-', ' ']).find(|s| s.starts_with(char::is_numeric));
    let start: usize = minus
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(malformed)?;
    Ok(start.saturating_sub(1))
}
