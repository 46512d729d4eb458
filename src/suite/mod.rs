//! YAML test-suite loading and selection.
//!
//! A suite file carries a `description` and a list of tests, each with an
//! `it` label, a full JSON-RPC request to send, and an `expect` block
//! holding the expected response shape and an optional stderr assertion.
//! Validation reports the offending field and test index; glob expansion
//! happens at the CLI boundary, this module takes resolved paths.

use crate::error::{Error, Result};
use crate::types::JSONRPC_VERSION;
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct TestSuite {
    pub description: String,
    pub file_path: PathBuf,
    pub tests: Vec<TestCase>,
}

#[derive(Debug, Clone)]
pub struct TestCase {
    pub it: String,
    pub request: Value,
    pub expect: Expectation,
}

#[derive(Debug, Clone)]
pub struct Expectation {
    pub response: Value,
    /// `"toBeEmpty"`, or a pattern string applied to accumulated stderr.
    pub stderr: Option<String>,
}

/// Load and validate one suite file.
pub fn load_suite(path: &Path) -> Result<TestSuite> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::Suite(format!("Failed to read '{}': {}", path.display(), e))
    })?;
    let yaml: serde_yaml::Value = serde_yaml::from_str(&raw)
        .map_err(|e| Error::Suite(format!("Invalid YAML in '{}': {}", path.display(), e)))?;
    let json = serde_json::to_value(&yaml)
        .map_err(|e| Error::Suite(format!("Unsupported YAML in '{}': {}", path.display(), e)))?;
    parse_suite(json, path)
}

/// Load many files, failing on the first invalid one.
pub fn load_suites(paths: &[PathBuf]) -> Result<Vec<TestSuite>> {
    paths.iter().map(|p| load_suite(p)).collect()
}

fn parse_suite(value: Value, path: &Path) -> Result<TestSuite> {
    let file = path.display();
    let obj = value
        .as_object()
        .ok_or_else(|| Error::Suite(format!("{}: suite must be a mapping", file)))?;

    let description = obj
        .get("description")
        .and_then(|d| d.as_str())
        .ok_or_else(|| {
            Error::Suite(format!("{}: missing or invalid field 'description'", file))
        })?
        .to_string();

    let tests_value = obj
        .get("tests")
        .ok_or_else(|| Error::Suite(format!("{}: missing required field 'tests'", file)))?;
    let tests_array = tests_value
        .as_array()
        .ok_or_else(|| Error::Suite(format!("{}: field 'tests' must be an array", file)))?;

    let mut tests = Vec::with_capacity(tests_array.len());
    for (index, test_value) in tests_array.iter().enumerate() {
        tests.push(parse_test(test_value, index, path)?);
    }

    Ok(TestSuite {
        description,
        file_path: path.to_path_buf(),
        tests,
    })
}

fn parse_test(value: &Value, index: usize, path: &Path) -> Result<TestCase> {
    let at = format!("{}: tests[{}]", path.display(), index);
    let obj = value
        .as_object()
        .ok_or_else(|| Error::Suite(format!("{}: test must be a mapping", at)))?;

    let it = obj
        .get("it")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Suite(format!("{}: missing or invalid field 'it'", at)))?
        .to_string();

    let request = obj
        .get("request")
        .ok_or_else(|| Error::Suite(format!("{}: missing required field 'request'", at)))?;
    if !request.is_object() {
        return Err(Error::Suite(format!("{}: field 'request' must be a mapping", at)));
    }
    match request.get("jsonrpc").and_then(|v| v.as_str()) {
        Some(JSONRPC_VERSION) => {}
        _ => {
            return Err(Error::Suite(format!(
                "{}: field 'request.jsonrpc' must equal \"2.0\"",
                at
            )))
        }
    }
    if request.get("method").and_then(|v| v.as_str()).is_none() {
        return Err(Error::Suite(format!(
            "{}: missing or invalid field 'request.method'",
            at
        )));
    }

    let expect = obj
        .get("expect")
        .ok_or_else(|| Error::Suite(format!("{}: missing required field 'expect'", at)))?;
    let expect_obj = expect
        .as_object()
        .ok_or_else(|| Error::Suite(format!("{}: field 'expect' must be a mapping", at)))?;
    let response = expect_obj
        .get("response")
        .ok_or_else(|| {
            Error::Suite(format!("{}: missing required field 'expect.response'", at))
        })?
        .clone();
    let stderr = match expect_obj.get("stderr") {
        None => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            return Err(Error::Suite(format!(
                "{}: field 'expect.stderr' must be a string",
                at
            )))
        }
    };

    Ok(TestCase {
        it,
        request: request.clone(),
        expect: Expectation { response, stderr },
    })
}

/// Suite/test selection from `--filter`.
///
/// A plain string is a case-sensitive substring test; `/re/` with an
/// optional `i` flag is a regex. The filter selects whole suites by
/// description or individual tests by their `it` text.
#[derive(Debug, Clone)]
pub enum Filter {
    Substring(String),
    Pattern(Regex),
}

impl Filter {
    pub fn parse(spec: &str) -> Result<Self> {
        if spec.len() >= 2 && spec.starts_with('/') {
            if let Some(close) = spec.rfind('/') {
                if close > 0 {
                    let body = &spec[1..close];
                    let flags = &spec[close + 1..];
                    let pattern = if flags.contains('i') {
                        format!("(?i){}", body)
                    } else {
                        body.to_string()
                    };
                    let re = Regex::new(&pattern).map_err(|e| {
                        Error::Config(format!("Invalid filter regex '{}': {}", spec, e))
                    })?;
                    return Ok(Filter::Pattern(re));
                }
            }
        }
        Ok(Filter::Substring(spec.to_string()))
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Filter::Substring(s) => text.contains(s.as_str()),
            Filter::Pattern(re) => re.is_match(text),
        }
    }

    /// Narrow a suite: keep everything when the description matches, else
    /// keep the matching tests. `None` when nothing survives.
    pub fn apply(&self, suite: TestSuite) -> Option<TestSuite> {
        if self.matches(&suite.description) {
            return Some(suite);
        }
        let TestSuite {
            description,
            file_path,
            tests,
        } = suite;
        let tests: Vec<TestCase> = tests.into_iter().filter(|t| self.matches(&t.it)).collect();
        if tests.is_empty() {
            return None;
        }
        Some(TestSuite {
            description,
            file_path,
            tests,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn suite_from_yaml(yaml: &str) -> Result<TestSuite> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        parse_suite(serde_json::to_value(&value).unwrap(), Path::new("suite.yml"))
    }

    const VALID: &str = r#"
description: "Filesystem server conformance"
tests:
  - it: "lists the read_file tool"
    request:
      jsonrpc: "2.0"
      id: 1
      method: tools/list
    expect:
      response:
        jsonrpc: "2.0"
        id: 1
        result:
          tools:
            - name: read_file
              description: Read a file
      stderr: toBeEmpty
"#;

    #[test]
    fn valid_suite_parses() {
        let suite = suite_from_yaml(VALID).unwrap();
        assert_eq!(suite.description, "Filesystem server conformance");
        assert_eq!(suite.tests.len(), 1);
        let test = &suite.tests[0];
        assert_eq!(test.it, "lists the read_file tool");
        assert_eq!(test.request["method"], json!("tools/list"));
        assert_eq!(test.expect.stderr.as_deref(), Some("toBeEmpty"));
    }

    #[test]
    fn missing_description() {
        let err = suite_from_yaml("tests: []").unwrap_err();
        assert!(err.to_string().contains("description"), "{}", err);
    }

    #[test]
    fn missing_tests() {
        let err = suite_from_yaml("description: d").unwrap_err();
        assert!(err.to_string().contains("tests"), "{}", err);
    }

    #[test]
    fn error_names_test_index() {
        let yaml = r#"
description: d
tests:
  - it: ok
    request: {jsonrpc: "2.0", id: 1, method: m}
    expect: {response: {}}
  - request: {jsonrpc: "2.0", id: 2, method: m}
    expect: {response: {}}
"#;
        let err = suite_from_yaml(yaml).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("tests[1]"), "{}", text);
        assert!(text.contains("'it'"), "{}", text);
    }

    #[test]
    fn wrong_jsonrpc_version_rejected() {
        let yaml = r#"
description: d
tests:
  - it: t
    request: {jsonrpc: "1.0", id: 1, method: m}
    expect: {response: {}}
"#;
        let err = suite_from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("request.jsonrpc"), "{}", err);
    }

    #[test]
    fn missing_method_rejected() {
        let yaml = r#"
description: d
tests:
  - it: t
    request: {jsonrpc: "2.0", id: 1}
    expect: {response: {}}
"#;
        let err = suite_from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("request.method"), "{}", err);
    }

    #[test]
    fn missing_expect_response_rejected() {
        let yaml = r#"
description: d
tests:
  - it: t
    request: {jsonrpc: "2.0", id: 1, method: m}
    expect: {}
"#;
        let err = suite_from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("expect.response"), "{}", err);
    }

    #[test]
    fn substring_filter() {
        let filter = Filter::parse("read_file").unwrap();
        let suite = suite_from_yaml(VALID).unwrap();
        let kept = filter.apply(suite).unwrap();
        assert_eq!(kept.tests.len(), 1);

        let filter = Filter::parse("no such test").unwrap();
        let suite = suite_from_yaml(VALID).unwrap();
        assert!(filter.apply(suite).is_none());
    }

    #[test]
    fn description_match_keeps_whole_suite() {
        let filter = Filter::parse("Filesystem").unwrap();
        let suite = suite_from_yaml(VALID).unwrap();
        assert_eq!(filter.apply(suite).unwrap().tests.len(), 1);
    }

    #[test]
    fn regex_filter_with_flag() {
        let filter = Filter::parse("/READ_FILE/i").unwrap();
        assert!(filter.matches("lists the read_file tool"));
        let filter = Filter::parse("/^lists/").unwrap();
        assert!(filter.matches("lists the read_file tool"));
        assert!(!filter.matches("relists"));
    }

    #[test]
    fn invalid_regex_filter_is_an_error() {
        assert!(Filter::parse("/[unclosed/").is_err());
    }
}
