use serde::Deserialize;

/// One input / expected output pair, in submission order.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub input: String,
    pub output: String,
}

/// A problem as pushed by the browser helper. Unknown fields are ignored,
/// missing ones fall back to their zero value.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Problem {
    pub name: String,
    pub group: String,
    pub url: String,
    pub interactive: bool,
    pub memory_limit: u64,
    pub time_limit: u64,
    pub tests: Vec<TestCase>,
}

impl Problem {
    /// File stem for the source file and the test-case prefix.
    pub fn file_stem(&self) -> Option<String> {
        problem_name(&self.name)
    }
}

/// Derives the file stem from a judge's problem title.
///
/// Codeforces titles look like `A. Watermelon` and are cut at the first `.`,
/// AtCoder titles look like `A - Welcome` and are cut at the first `-`.
/// Titles with neither are kept whole. The result is trimmed and stripped of
/// characters that cannot appear in a file name; `None` if nothing is left.
pub fn problem_name(raw: &str) -> Option<String> {
    let stem = match raw.find('.').or_else(|| raw.find('-')) {
        Some(idx) => &raw[..idx],
        None => raw,
    };

    let name: String = stem
        .trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();

    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_judge_suffixes() {
        assert_eq!(problem_name("1234A-B").as_deref(), Some("1234A"));
        assert_eq!(problem_name("1234A.B").as_deref(), Some("1234A"));
        assert_eq!(problem_name("plainname").as_deref(), Some("plainname"));

        assert_eq!(problem_name("A. Watermelon").as_deref(), Some("A"));
        assert_eq!(problem_name("A - Welcome to AtCoder").as_deref(), Some("A"));
    }

    #[test]
    fn dot_wins_over_dash() {
        assert_eq!(problem_name("B. Two-Sum").as_deref(), Some("B"));
    }

    #[test]
    fn unsafe_names() {
        assert_eq!(problem_name("a/b\\c").as_deref(), Some("a_b_c"));
        assert_eq!(problem_name("what?").as_deref(), Some("what_"));
        assert_eq!(problem_name(".hidden"), None);
        assert_eq!(problem_name(" - x"), None);
        assert_eq!(problem_name(""), None);
    }

    #[test]
    fn decodes_with_defaults() {
        let problem: Problem =
            serde_json::from_str(r#"{"name":"A. X","tests":[{"input":"1","output":"2"}]}"#)
                .unwrap();

        assert_eq!(problem.group, "");
        assert_eq!(problem.url, "");
        assert!(!problem.interactive);
        assert_eq!(problem.memory_limit, 0);
        assert_eq!(problem.time_limit, 0);
        assert_eq!(problem.file_stem().as_deref(), Some("A"));
        assert_eq!(
            problem.tests,
            vec![TestCase {
                input: "1".to_string(),
                output: "2".to_string()
            }]
        );
    }

    #[test]
    fn decodes_companion_fields() {
        let problem: Problem = serde_json::from_str(
            r#"{
                "name": "G. Count the Trains",
                "group": "Codeforces - Round #1",
                "url": "https://codeforces.com/problemset/problem/1690/G",
                "interactive": false,
                "memoryLimit": 256,
                "timeLimit": 3000,
                "tests": [],
                "testType": "single",
                "input": { "type": "stdin" },
                "languages": { "java": { "mainClass": "Main" } }
            }"#,
        )
        .unwrap();

        assert_eq!(problem.memory_limit, 256);
        assert_eq!(problem.time_limit, 3000);
        assert!(problem.tests.is_empty());
    }
}
