use anyhow::Result;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// One named extraction rule: the field it fills and the pattern that finds
/// it. Capture group 1 is the extracted value when present, otherwise the
/// whole match.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: String,
    pub pattern: Regex,
}

/// Load field extraction rules from a file of `name = pattern` lines.
/// Blank lines and `#` comments are skipped. There are no built-in rules;
/// every extracted field comes from this file.
pub fn load_field_rules(path: &Path) -> Result<Vec<FieldRule>> {
    let start_time = Instant::now();
    info!(action = "load", component = "field_rules", file_path = ?path, "Loading field rules");

    if !path.exists() {
        anyhow::bail!("Rules file not found: {:?}", path);
    }

    let content = fs::read_to_string(path)?;
    let mut rules = Vec::new();
    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((name, pattern)) = line.split_once('=') else {
            anyhow::bail!(
                "Invalid rule at line {}: expected `name = pattern`",
                line_num + 1
            );
        };
        let name = name.trim();
        let pattern = pattern.trim();
        if name.is_empty() {
            anyhow::bail!("Invalid rule at line {}: empty field name", line_num + 1);
        }

        match Regex::new(pattern) {
            Ok(regex) => rules.push(FieldRule {
                name: name.to_string(),
                pattern: regex,
            }),
            Err(e) => anyhow::bail!("Invalid regex pattern at line {}: {}", line_num + 1, e),
        }
    }

    info!(
        action = "complete",
        component = "field_rules",
        rule_count = rules.len(),
        duration_ms = start_time.elapsed().as_millis(),
        "Field rules compiled"
    );
    Ok(rules)
}

/// Apply every rule to a document's text, in rule order. A rule that does
/// not match yields `None` for its field.
pub fn apply_rules<'a>(rules: &'a [FieldRule], text: &str) -> Vec<(&'a str, Option<String>)> {
    rules
        .iter()
        .map(|rule| {
            let value = rule.pattern.captures(text).map(|captures| {
                captures
                    .get(1)
                    .unwrap_or_else(|| captures.get(0).expect("match has group 0"))
                    .as_str()
                    .trim()
                    .to_string()
            });
            (rule.name.as_str(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_rules(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_named_rules_and_skips_comments() {
        let file = write_rules(
            "# patent fields\n\
             patent_number = Patent Number: (\\d+)\n\
             \n\
             application_date = Application Date: (\\d{4}-\\d{2}-\\d{2})\n",
        );
        let rules = load_field_rules(file.path()).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name, "patent_number");
        assert_eq!(rules[1].name, "application_date");
    }

    #[test]
    fn invalid_regex_is_an_error_with_line_number() {
        let file = write_rules("title = Title: (.+\n");
        let err = load_field_rules(file.path()).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn line_without_separator_is_rejected() {
        let file = write_rules("just a pattern with no name\n");
        assert!(load_field_rules(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_field_rules(Path::new("/no/such/rules.txt")).is_err());
    }

    #[test]
    fn applies_rules_with_capture_group_one() {
        let file = write_rules(
            "patent_number = Patent Number: (\\d+)\n\
             title = Title: (.+)\n\
             grant_year = \\b(19|20)\\d{2}\\b\n",
        );
        let rules = load_field_rules(file.path()).unwrap();
        let text = "Patent Number: 7654321\nTitle: Adaptive widget\nFiled 2015.";

        let extracted = apply_rules(&rules, text);
        assert_eq!(extracted[0], ("patent_number", Some("7654321".to_string())));
        assert_eq!(extracted[1], ("title", Some("Adaptive widget".to_string())));
        // group 1 only covers the century; still group 1 by contract
        assert_eq!(extracted[2], ("grant_year", Some("20".to_string())));
    }

    #[test]
    fn non_matching_rule_yields_none() {
        let file = write_rules("abstract = Abstract: (.+)\n");
        let rules = load_field_rules(file.path()).unwrap();
        let extracted = apply_rules(&rules, "no abstract here");
        assert_eq!(extracted[0], ("abstract", None));
    }
}
