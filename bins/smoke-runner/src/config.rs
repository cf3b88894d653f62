// Suite configuration management for the smoke runner
use crate::selector::CompilerSelector;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use smoke_common::types::{Expectation, LanguageId, NamedCheck, TestCase};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const DEFAULT_SUITES_PATH: &str = "config/suites.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectorConfig {
    #[serde(default)]
    pub name_contains_any: Vec<String>,
    #[serde(default)]
    pub only_ids: Vec<String>,
    #[serde(default)]
    pub exclude_ids: Vec<String>,
}

/// One language/snippet run against every eligible compiler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixSuite {
    pub name: String,
    pub language: LanguageId,
    pub source_code: String,
    pub expectation: Expectation,
    #[serde(default)]
    pub selector: SelectorConfig,
}

impl MatrixSuite {
    pub fn test_case(&self) -> TestCase {
        TestCase::new(self.language.clone(), self.source_code.clone(), self.expectation.clone())
    }

    pub fn selector(&self) -> CompilerSelector {
        CompilerSelector::for_expectation(&self.expectation)
            .name_contains_any(self.selector.name_contains_any.iter().cloned())
            .only_ids(self.selector.only_ids.iter().cloned())
            .exclude_ids(self.selector.exclude_ids.iter().cloned())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedSuite {
    pub name: String,
    #[serde(flatten)]
    pub check: NamedCheck,
}

#[derive(Debug, Serialize, Deserialize)]
struct SuitesJson {
    #[serde(default)]
    matrix: Vec<MatrixSuite>,
    #[serde(default)]
    named: Vec<NamedSuite>,
}

/// Suite configuration manager
#[derive(Debug, Clone)]
pub struct SuiteConfigManager {
    matrix: Vec<MatrixSuite>,
    named: Vec<NamedSuite>,
}

impl SuiteConfigManager {
    /// Load suites from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Suite config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        Self::from_json(&content).with_context(|| format!("Invalid suite config {}", config_path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let suites: SuitesJson = serde_json::from_str(content).context("Failed to parse suites JSON")?;

        let mut seen = HashSet::new();
        for name in suites
            .matrix
            .iter()
            .map(|s| &s.name)
            .chain(suites.named.iter().map(|s| &s.name))
        {
            if !seen.insert(name.as_str()) {
                bail!("Duplicate suite name: {}", name);
            }
        }

        Ok(Self {
            matrix: suites.matrix,
            named: suites.named,
        })
    }

    /// Matrix suites by name; all of them when `names` is empty
    pub fn matrix_suites(&self, names: &[String]) -> Result<Vec<&MatrixSuite>> {
        select_by_name(&self.matrix, names, |s| &s.name, "matrix")
    }

    /// Named-check suites by name; all of them when `names` is empty
    pub fn named_suites(&self, names: &[String]) -> Result<Vec<&NamedSuite>> {
        select_by_name(&self.named, names, |s| &s.name, "named")
    }

    pub fn list_matrix(&self) -> impl Iterator<Item = &MatrixSuite> {
        self.matrix.iter()
    }

    pub fn list_named(&self) -> impl Iterator<Item = &NamedSuite> {
        self.named.iter()
    }
}

fn select_by_name<'a, T>(
    suites: &'a [T],
    names: &[String],
    name_of: impl Fn(&T) -> &String,
    kind: &str,
) -> Result<Vec<&'a T>> {
    if names.is_empty() {
        return Ok(suites.iter().collect());
    }

    names
        .iter()
        .map(|wanted| {
            suites
                .iter()
                .find(|s| name_of(*s) == wanted)
                .with_context(|| format!("No {} suite named '{}'", kind, wanted))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use smoke_common::types::CompilerDescriptor;

    const SHIPPED: &str = include_str!("../../../config/suites.json");

    fn compiler(id: &str, name: &str, exec: bool) -> CompilerDescriptor {
        CompilerDescriptor {
            id: id.to_string(),
            display_name: name.to_string(),
            language: LanguageId::from("fortran"),
            semver: None,
            supports_execution: exec,
        }
    }

    #[test]
    fn test_shipped_config_loads() {
        let manager = SuiteConfigManager::from_json(SHIPPED).expect("shipped suites must parse");

        let matrix: Vec<_> = manager.list_matrix().map(|s| s.name.as_str()).collect();
        assert_eq!(matrix, vec!["cpp", "pascal", "fortran", "d", "go"]);

        let named: Vec<_> = manager.list_named().map(|s| s.name.as_str()).collect();
        assert_eq!(named, vec!["cpp-gcc-10.1"]);
    }

    #[test]
    fn test_shipped_fortran_suite_keeps_leading_space_and_exclusion() {
        let manager = SuiteConfigManager::from_json(SHIPPED).unwrap();
        let fortran = manager.matrix_suites(&["fortran".to_string()]).unwrap()[0];

        match &fortran.expectation {
            Expectation::Execute(e) => {
                assert_eq!(e.exit_code, 123);
                assert_eq!(e.stdout_lines, vec![" hello world"]);
            }
            other => panic!("unexpected expectation {:?}", other),
        }

        let selector = fortran.selector();
        assert!(selector.matches(&compiler("gfortran102", "x86-64 gfortran 10.2", true)));
        assert!(!selector.matches(&compiler("flangtrunk", "flang-trunk", true)));
        assert!(!selector.matches(&compiler("armgfortran", "ARM gfortran", false)));
    }

    #[test]
    fn test_shipped_named_check() {
        let manager = SuiteConfigManager::from_json(SHIPPED).unwrap();
        let named = manager.named_suites(&[]).unwrap();
        let check = &named[0].check;

        assert_eq!(check.language, LanguageId::from("c++"));
        assert_eq!(check.compiler.name, "gcc");
        assert_eq!(check.compiler.version, "10.1");
        assert!(check.compile.filters.directives);
        assert_eq!(check.execute_case().source_code, check.compile_case().source_code);
    }

    #[test]
    fn test_unknown_suite_name_is_error() {
        let manager = SuiteConfigManager::from_json(SHIPPED).unwrap();
        let err = manager.matrix_suites(&["cobol".to_string()]).unwrap_err();
        assert!(err.to_string().contains("cobol"));
    }

    #[test]
    fn test_duplicate_suite_names_rejected() {
        let json = r#"{
            "matrix": [
                {"name": "go", "language": "go", "source_code": "", "expectation": {"kind": "execute", "exit_code": 0, "stdout_lines": []}},
                {"name": "go", "language": "go", "source_code": "", "expectation": {"kind": "execute", "exit_code": 0, "stdout_lines": []}}
            ]
        }"#;
        let err = SuiteConfigManager::from_json(json).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_unknown_selector_field_rejected() {
        let json = r#"{
            "matrix": [
                {"name": "go", "language": "go", "source_code": "", "selector": {"include": ["x"]},
                 "expectation": {"kind": "execute", "exit_code": 0, "stdout_lines": []}}
            ]
        }"#;
        assert!(SuiteConfigManager::from_json(json).is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = SuiteConfigManager::load(Path::new("does/not/exist.json"));
        assert!(result.is_err());
    }
}
