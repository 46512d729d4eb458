//! Path traversal over JSON values.
//!
//! Paths are dot-separated segments with optional bracket indices and a `*`
//! wildcard that fans out over array elements: `a.b[0].c`, `tools.*.name`,
//! `matrix[1][2]`. A missing intermediate yields `None` (undefined);
//! traversal through a primitive or `null` short-circuits the same way.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

fn parse_path(path: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            return None;
        }
        if part == "*" {
            segments.push(Segment::Wildcard);
            continue;
        }
        // A part may carry bracket indices: "b[0]", "m[1][2]", or "[3]".
        let mut rest = part;
        if let Some(bracket) = rest.find('[') {
            let key = &rest[..bracket];
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_string()));
            }
            rest = &rest[bracket..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let close = stripped.find(']')?;
                let index: usize = stripped[..close].parse().ok()?;
                segments.push(Segment::Index(index));
                rest = &stripped[close + 1..];
            }
            if !rest.is_empty() {
                return None;
            }
        } else {
            segments.push(Segment::Key(rest.to_string()));
        }
    }
    Some(segments)
}

/// Resolve `path` against `value`. `None` models undefined. A wildcard
/// segment produces an array of the values collected from each element,
/// flattening one level when deeper wildcards also produced arrays.
pub fn extract_field(value: &Value, path: &str) -> Option<Value> {
    let segments = parse_path(path)?;
    walk(value, &segments)
}

fn walk(value: &Value, segments: &[Segment]) -> Option<Value> {
    let Some(first) = segments.first() else {
        return Some(value.clone());
    };
    match first {
        Segment::Key(key) => match value {
            Value::Object(map) => walk(map.get(key)?, &segments[1..]),
            _ => None,
        },
        Segment::Index(i) => match value {
            Value::Array(items) => walk(items.get(*i)?, &segments[1..]),
            _ => None,
        },
        Segment::Wildcard => {
            let Value::Array(items) = value else {
                return None;
            };
            let rest = &segments[1..];
            let nested_wildcard = rest.contains(&Segment::Wildcard);
            let mut collected = Vec::new();
            for item in items {
                match walk(item, rest) {
                    Some(Value::Array(inner)) if nested_wildcard => collected.extend(inner),
                    Some(v) => collected.push(v),
                    None => {}
                }
            }
            Some(Value::Array(collected))
        }
    }
}
