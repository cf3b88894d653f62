/// Compiler Selector - Eligibility Rules
///
/// Decides, per compiler, whether it takes part in a run. Pure predicate over
/// `CompilerDescriptor`; no I/O.
///
/// **Composition:**
/// - The base rule comes from the expectation kind (execute checks need
///   execution support, compile-only checks accept any compiler)
/// - Refinements are ANDed onto the base rule
/// - Name patterns are ORed ("name contains A or name contains B")
/// - Excluded ids are always applied last as AND-NOT

use smoke_common::types::{CompilerDescriptor, Expectation};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Always,
    SupportsExecution,
    /// Case-sensitive substring of the display name
    NameContains(String),
    IdEquals(String),
    All(Vec<Rule>),
    Any(Vec<Rule>),
}

impl Rule {
    pub fn eval(&self, compiler: &CompilerDescriptor) -> bool {
        match self {
            Rule::Always => true,
            Rule::SupportsExecution => compiler.supports_execution,
            Rule::NameContains(pattern) => compiler.display_name.contains(pattern.as_str()),
            Rule::IdEquals(id) => compiler.id == *id,
            Rule::All(rules) => rules.iter().all(|r| r.eval(compiler)),
            Rule::Any(rules) => rules.iter().any(|r| r.eval(compiler)),
        }
    }

    pub fn and(self, other: Rule) -> Rule {
        match (self, other) {
            (Rule::Always, r) | (r, Rule::Always) => r,
            (Rule::All(mut rules), r) => {
                rules.push(r);
                Rule::All(rules)
            }
            (l, r) => Rule::All(vec![l, r]),
        }
    }

    pub fn or(self, other: Rule) -> Rule {
        match (self, other) {
            (Rule::Any(mut rules), r) => {
                rules.push(r);
                Rule::Any(rules)
            }
            (l, r) => Rule::Any(vec![l, r]),
        }
    }

    /// OR over `rules`; an empty set matches nothing
    pub fn any_of(rules: impl IntoIterator<Item = Rule>) -> Rule {
        rules.into_iter().reduce(Rule::or).unwrap_or(Rule::Any(Vec::new()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerSelector {
    rule: Rule,
    excluded_ids: BTreeSet<String>,
}

impl CompilerSelector {
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            excluded_ids: BTreeSet::new(),
        }
    }

    /// Base rule for an expectation kind
    pub fn for_expectation(expectation: &Expectation) -> Self {
        if expectation.requires_execution() {
            Self::new(Rule::SupportsExecution)
        } else {
            Self::new(Rule::Always)
        }
    }

    pub fn require(mut self, rule: Rule) -> Self {
        self.rule = self.rule.and(rule);
        self
    }

    /// Keep only compilers whose display name contains at least one pattern.
    /// An empty pattern list leaves the selector unchanged.
    pub fn name_contains_any<I, S>(self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rules: Vec<Rule> = patterns.into_iter().map(|p| Rule::NameContains(p.into())).collect();
        if rules.is_empty() {
            return self;
        }
        self.require(Rule::any_of(rules))
    }

    /// Keep only the listed compiler ids. An empty list leaves the selector unchanged.
    pub fn only_ids<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rules: Vec<Rule> = ids.into_iter().map(|id| Rule::IdEquals(id.into())).collect();
        if rules.is_empty() {
            return self;
        }
        self.require(Rule::any_of(rules))
    }

    pub fn exclude_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn matches(&self, compiler: &CompilerDescriptor) -> bool {
        !self.excluded_ids.contains(&compiler.id) && self.rule.eval(compiler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smoke_common::types::{
        CompileFilters, CompileOnlyExpectation, ExecuteExpectation, LanguageId,
    };

    fn compiler(id: &str, name: &str, exec: bool) -> CompilerDescriptor {
        CompilerDescriptor {
            id: id.to_string(),
            display_name: name.to_string(),
            language: LanguageId::from("c++"),
            semver: None,
            supports_execution: exec,
        }
    }

    fn catalog() -> Vec<CompilerDescriptor> {
        vec![
            compiler("g101", "x86-64 gcc 10.1", true),
            compiler("clang1000", "x86-64 clang 10.0.0", true),
            compiler("ellcc0133", "x86-64 ellcc 0.1.33", true),
            compiler("armg640", "ARM gcc 6.4", false),
            compiler("avrg540", "AVR gcc 5.4.0", false),
            compiler("mips5", "MIPS gcc 5.4", true),
        ]
    }

    fn execute_expectation() -> Expectation {
        Expectation::Execute(ExecuteExpectation::new(123, vec!["hello world".to_string()]))
    }

    fn compile_expectation() -> Expectation {
        Expectation::CompileOnly(CompileOnlyExpectation::new(CompileFilters {
            directives: true,
            labels: true,
            comment_only: true,
            library_code: true,
        }))
    }

    fn selected_ids(selector: &CompilerSelector) -> Vec<String> {
        catalog()
            .into_iter()
            .filter(|c| selector.matches(c))
            .map(|c| c.id)
            .collect()
    }

    #[test]
    fn test_execute_requires_execution_support() {
        let selector = CompilerSelector::for_expectation(&execute_expectation());
        assert_eq!(selected_ids(&selector), vec!["g101", "clang1000", "ellcc0133", "mips5"]);
    }

    #[test]
    fn test_compile_only_ignores_execution_support() {
        let selector = CompilerSelector::for_expectation(&compile_expectation());
        assert_eq!(selected_ids(&selector).len(), catalog().len());
    }

    #[test]
    fn test_name_substrings_are_ored() {
        let selector = CompilerSelector::for_expectation(&execute_expectation()).name_contains_any(["x86", "ellcc"]);
        assert_eq!(selected_ids(&selector), vec!["g101", "clang1000", "ellcc0133"]);
    }

    #[test]
    fn test_name_match_is_case_sensitive() {
        let selector = CompilerSelector::new(Rule::Always).name_contains_any(["X86"]);
        assert!(selected_ids(&selector).is_empty());
    }

    #[test]
    fn test_exclusion_wins_over_inclusion() {
        let selector = CompilerSelector::for_expectation(&execute_expectation())
            .name_contains_any(["x86"])
            .exclude_ids(["clang1000"]);
        assert_eq!(selected_ids(&selector), vec!["g101", "ellcc0133"]);
    }

    #[test]
    fn test_empty_pattern_list_is_no_refinement() {
        let base = CompilerSelector::for_expectation(&execute_expectation());
        let refined = base.clone().name_contains_any(Vec::<String>::new());
        assert_eq!(base, refined);
    }

    #[test]
    fn test_composition_is_order_independent() {
        let a = Rule::NameContains("gcc".to_string());
        let b = Rule::SupportsExecution;
        let c = Rule::IdEquals("clang1000".to_string());

        for compiler in catalog() {
            let ab_c = a.clone().and(b.clone()).and(c.clone());
            let c_ba = c.clone().and(b.clone().and(a.clone()));
            assert_eq!(ab_c.eval(&compiler), c_ba.eval(&compiler));

            let or_left = a.clone().or(b.clone()).or(c.clone());
            let or_right = c.clone().or(a.clone().or(b.clone()));
            assert_eq!(or_left.eval(&compiler), or_right.eval(&compiler));
        }
    }

    #[test]
    fn test_and_with_always_is_identity() {
        let rule = Rule::SupportsExecution;
        assert_eq!(Rule::Always.and(rule.clone()), rule);
        assert_eq!(rule.clone().and(Rule::Always), rule);
    }

    #[test]
    fn test_only_ids_still_requires_execution() {
        let selector = CompilerSelector::for_expectation(&execute_expectation()).only_ids(["g101", "armg640"]);
        assert_eq!(selected_ids(&selector), vec!["g101"]);
    }

    #[test]
    fn test_any_of_empty_matches_nothing() {
        let selector = CompilerSelector::new(Rule::any_of(Vec::new()));
        assert!(selected_ids(&selector).is_empty());
    }
}
