//! Targeted in-place edits of YAML text.
//!
//! Re-serializing a document through `serde_yaml` loses comments, quoting
//! and key order, which turns a one-word change into a noisy diff. These
//! helpers change a single scalar on the line that holds its key and leave
//! every other byte alone.

/// Replace the value `old` of mapping key `key` with `new`.
///
/// The key may be bare, single- or double-quoted. Only the first line whose
/// key matches and whose value contains `old` is touched. Returns `None`
/// when no such line exists (for example when the value is a folded block
/// scalar spread across several lines).
pub fn replace_scalar_value(content: &str, key: &str, old: &str, new: &str) -> Option<String> {
    let mut output = String::with_capacity(content.len() + new.len());
    let mut replaced = false;

    for line in content.split_inclusive('\n') {
        if !replaced {
            if let Some(value_start) = value_offset(line, key) {
                let (head, value) = line.split_at(value_start);
                if let Some(pos) = value.find(old) {
                    output.push_str(head);
                    output.push_str(&value[..pos]);
                    output.push_str(new);
                    output.push_str(&value[pos + old.len()..]);
                    replaced = true;
                    continue;
                }
            }
        }
        output.push_str(line);
    }

    replaced.then_some(output)
}

/// Byte offset just past `key:` on `line`, if the line is a mapping entry
/// for `key`.
fn value_offset(line: &str, key: &str) -> Option<usize> {
    let indent = line.len() - line.trim_start().len();
    let rest = &line[indent..];
    let rest_after_dash = rest.strip_prefix("- ").unwrap_or(rest);
    let indent = indent + (rest.len() - rest_after_dash.len());

    for quoted in [format!("\"{key}\""), format!("'{key}'"), key.to_string()] {
        if let Some(after_key) = rest_after_dash.strip_prefix(quoted.as_str()) {
            let after_ws = after_key.trim_start_matches([' ', '\t']);
            if after_ws.starts_with(':') {
                let consumed = rest_after_dash.len() - after_ws.len() + 1;
                return Some(indent + consumed);
            }
        }
    }
    None
}
