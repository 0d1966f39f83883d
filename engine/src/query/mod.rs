//! Query planning
//!
//! Classifies a natural-language query, extracts entities and specific
//! targets, and derives an ordered list of per-namespace search
//! strategies for the retrieval executor.

pub mod composer;
pub mod executor;

use crate::store::Filter;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Query intent classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    Conceptual,
    Functional,
    Example,
    Comparison,
    Debugging,
    Implementation,
    FileSearch,
    CodeSearch,
}

/// How much of a codebase the query spans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    File,
    Module,
    CrossCutting,
}

/// Query complexity bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

/// Planner output for one query
#[derive(Debug, Clone)]
pub struct QueryAnalysis {
    pub query_type: QueryType,
    /// Code-like tokens mentioned in the query
    pub entities: Vec<String>,
    /// High-confidence targets: quoted strings, file names, explicit
    /// function/class references
    pub specific_targets: Vec<String>,
    pub scope: Scope,
    pub complexity: Complexity,
    pub intent_keywords: Vec<String>,
}

/// Search strategy families, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    DirectEntity,
    FileStructure,
    Contextual,
    SemanticRepository,
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DirectEntity => "direct_entity_search",
            Self::FileStructure => "file_structure_search",
            Self::Contextual => "contextual_search",
            Self::SemanticRepository => "semantic_repository_search",
        }
    }
}

/// A parameterized retrieval plan scoped to one namespace
#[derive(Debug, Clone)]
pub struct Strategy {
    pub kind: StrategyKind,
    pub namespace: String,
    pub confidence: f32,
    pub filter: Option<Filter>,
    /// Terms appended to the query text before embedding
    pub query_expansion: Vec<String>,
}

/// Repository-specific search hints
#[derive(Debug, Clone, Default)]
pub struct RepoProfile {
    pub keywords: Vec<String>,
    /// File extensions (without dot) the repository mostly consists of
    pub file_extensions: Vec<String>,
    /// Conventional directory names worth probing for file queries
    pub structure_clues: Vec<String>,
}

static TYPE_PATTERNS: OnceLock<Vec<(QueryType, Vec<Regex>)>> = OnceLock::new();

fn type_patterns() -> &'static [(QueryType, Vec<Regex>)] {
    TYPE_PATTERNS.get_or_init(|| {
        let table: &[(QueryType, &[&str])] = &[
            (
                QueryType::Conceptual,
                &[
                    r"\b(?:what is|describe|explain|overview|about|understand|concept)\b",
                    r"\b(?:purpose|goal|meaning|definition)\b",
                ],
            ),
            (
                QueryType::Functional,
                &[
                    r"\b(?:how does|how do|mechanism|process|work|works|function|operate)\b",
                    r"\b(?:algorithm|logic|flow|procedure)\b",
                ],
            ),
            (
                QueryType::Example,
                &[
                    r"\b(?:example|sample|demo|show me|usage|demonstrate)\b",
                    r"\b(?:how to use|tutorial)\b",
                ],
            ),
            (
                QueryType::Comparison,
                &[
                    r"\b(?:compare|difference|vs|versus|better|alternative)\b",
                    r"\b(?:option|choice|between|against)\b",
                ],
            ),
            (
                QueryType::Debugging,
                &[
                    r"\b(?:error|bug|issue|problem|fix|debug|troubleshoot)\b",
                    r"\b(?:not working|broken|fails|wrong)\b",
                ],
            ),
            (
                QueryType::Implementation,
                &[
                    r"\b(?:create|build|implement|add|develop|make)\b",
                    r"\b(?:new feature|functionality|construct)\b",
                ],
            ),
            (
                QueryType::FileSearch,
                &[
                    r"\b(?:find file|locate file|where is|file location)\b",
                    r"\b(?:file|folder|directory|path)\b",
                ],
            ),
            (
                QueryType::CodeSearch,
                &[
                    r"\b(?:find function|find class|find method|locate code)\b",
                    r"\b(?:function|class|method|variable|constant)\b",
                ],
            ),
        ];

        table
            .iter()
            .map(|(kind, patterns)| {
                let compiled =
                    patterns.iter().map(|p| Regex::new(p).expect("valid regex")).collect();
                (*kind, compiled)
            })
            .collect()
    })
}

static CAMEL_RE: OnceLock<Regex> = OnceLock::new();
static SNAKE_RE: OnceLock<Regex> = OnceLock::new();
static DOTTED_RE: OnceLock<Regex> = OnceLock::new();
static FILE_RE: OnceLock<Regex> = OnceLock::new();
static QUOTED_RE: OnceLock<Regex> = OnceLock::new();
static FUNC_REF_RE: OnceLock<Regex> = OnceLock::new();
static CLASS_REF_RE: OnceLock<Regex> = OnceLock::new();

fn camel_re() -> &'static Regex {
    CAMEL_RE.get_or_init(|| Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]+)+\b").expect("valid regex"))
}

fn snake_re() -> &'static Regex {
    SNAKE_RE.get_or_init(|| Regex::new(r"\b[a-z][a-z0-9]*(?:_[a-z0-9]+)+\b").expect("valid regex"))
}

fn dotted_re() -> &'static Regex {
    DOTTED_RE.get_or_init(|| {
        Regex::new(r"\b[a-zA-Z_][a-zA-Z0-9_]*\.[a-zA-Z_][a-zA-Z0-9_]*(?:\(\))?\b")
            .expect("valid regex")
    })
}

fn file_re() -> &'static Regex {
    FILE_RE.get_or_init(|| Regex::new(r"\b[\w/-]+\.[a-zA-Z]{1,5}\b").expect("valid regex"))
}

fn quoted_re() -> &'static Regex {
    QUOTED_RE.get_or_init(|| Regex::new(r#"["'`]([^"'`]+)["'`]"#).expect("valid regex"))
}

fn func_ref_re() -> &'static Regex {
    FUNC_REF_RE.get_or_init(|| {
        Regex::new(r"\b(?:function|def|fn|method)\s+([a-zA-Z_][a-zA-Z0-9_]*)|\b([a-zA-Z_][a-zA-Z0-9_]*)\s*\(\)")
            .expect("valid regex")
    })
}

fn class_ref_re() -> &'static Regex {
    CLASS_REF_RE.get_or_init(|| {
        Regex::new(r"\b(?:class|struct|trait|interface)\s+([A-Za-z_][A-Za-z0-9_]*)")
            .expect("valid regex")
    })
}

const STOPWORDS: &[&str] = &[
    "the", "and", "or", "but", "how", "what", "why", "where", "when", "this", "that", "with",
    "for", "from", "can", "you", "does", "are", "is", "in", "of", "to", "a", "an", "it", "me",
    "show", "find", "file", "files", "locate", "located", "location",
];

const INTENT_TERMS: &[&str] = &[
    "function", "class", "method", "variable", "import", "module", "api", "endpoint", "database",
    "query", "response", "request", "test", "debug", "error", "exception", "config", "setup",
    "component", "service", "model", "view", "controller", "authentication", "authorization",
    "validation", "form", "frontend", "backend", "client", "server", "middleware", "webhook",
    "queue", "embedding", "chunker", "search",
];

/// Classifies queries and derives per-namespace strategies
pub struct QueryPlanner {
    profiles: HashMap<String, RepoProfile>,
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryPlanner {
    pub fn new() -> Self {
        Self { profiles: HashMap::new() }
    }

    /// Register repository-specific hints for a namespace
    pub fn with_profile(mut self, namespace: impl Into<String>, profile: RepoProfile) -> Self {
        self.profiles.insert(namespace.into(), profile);
        self
    }

    /// Analyze a natural-language query
    pub fn analyze(&self, query: &str) -> QueryAnalysis {
        let query_lower = query.to_lowercase();

        let query_type = classify(&query_lower);
        let entities = extract_entities(query);
        let mut specific_targets = extract_specific_targets(query);
        // Lookup-style queries promote their content words to targets:
        // "where is the chunker?" is asking for `chunker` by name
        if specific_targets.is_empty()
            && matches!(query_type, QueryType::FileSearch | QueryType::CodeSearch)
        {
            specific_targets = query_lower
                .split(|c: char| !c.is_alphanumeric() && c != '_')
                .filter(|w| w.len() > 3 && !STOPWORDS.contains(w))
                .map(String::from)
                .collect();
            specific_targets.sort();
            specific_targets.dedup();
        }
        let scope = determine_scope(&query_lower, &entities);
        let complexity = assess_complexity(query, &entities);
        let intent_keywords = INTENT_TERMS
            .iter()
            .filter(|term| query_lower.contains(*term))
            .map(|term| (*term).to_owned())
            .collect();

        QueryAnalysis { query_type, entities, specific_targets, scope, complexity, intent_keywords }
    }

    /// Derive strategies for each target namespace, highest priority
    /// first.
    pub fn plan(&self, analysis: &QueryAnalysis, namespaces: &[String]) -> Vec<Strategy> {
        let mut strategies = Vec::new();

        for namespace in namespaces {
            let profile = self.profiles.get(namespace).cloned().unwrap_or_default();

            // 1. Direct entity search, only with high-confidence targets
            if !analysis.specific_targets.is_empty() {
                let filters: Vec<Filter> = analysis
                    .specific_targets
                    .iter()
                    .flat_map(|target| {
                        vec![
                            Filter::contains("file_path", target.clone()),
                            Filter::contains("content", target.clone()),
                        ]
                    })
                    .collect();
                strategies.push(Strategy {
                    kind: StrategyKind::DirectEntity,
                    namespace: namespace.clone(),
                    confidence: 0.9,
                    filter: Some(Filter::Or(filters)),
                    query_expansion: analysis.specific_targets.clone(),
                });
            }

            // 2. File structure search for file-location queries
            if analysis.query_type == QueryType::FileSearch {
                let mut filters: Vec<Filter> = profile
                    .structure_clues
                    .iter()
                    .map(|clue| Filter::contains("file_path", clue.clone()))
                    .collect();
                for entity in &analysis.entities {
                    if entity.contains('.') || entity.contains('/') {
                        filters.push(Filter::contains("file_path", entity.clone()));
                    }
                }
                strategies.push(Strategy {
                    kind: StrategyKind::FileStructure,
                    namespace: namespace.clone(),
                    confidence: 0.95,
                    filter: if filters.is_empty() { None } else { Some(Filter::Or(filters)) },
                    query_expansion: Vec::new(),
                });
            }

            // 3. Contextual search with repository keyword expansion
            let contextual = contextual_keywords(analysis, &profile);
            if !contextual.is_empty() {
                strategies.push(Strategy {
                    kind: StrategyKind::Contextual,
                    namespace: namespace.clone(),
                    confidence: 0.8,
                    filter: extension_filter(&profile),
                    query_expansion: contextual,
                });
            }

            // 4. Semantic baseline, always included
            strategies.push(Strategy {
                kind: StrategyKind::SemanticRepository,
                namespace: namespace.clone(),
                confidence: 0.7,
                filter: extension_filter(&profile),
                query_expansion: profile.keywords.iter().take(3).cloned().collect(),
            });
        }

        strategies
    }
}

fn classify(query_lower: &str) -> QueryType {
    let mut best = QueryType::Conceptual;
    let mut best_score = 0usize;

    for (kind, patterns) in type_patterns() {
        let score: usize = patterns.iter().map(|re| re.find_iter(query_lower).count()).sum();
        if score > best_score {
            best = *kind;
            best_score = score;
        }
    }

    if best_score == 0 {
        // Fall back on lexical hints
        if ["find", "locate", "where"].iter().any(|w| query_lower.contains(w)) {
            if file_re().is_match(query_lower) {
                return QueryType::FileSearch;
            }
            return QueryType::CodeSearch;
        }
    }

    best
}

fn extract_entities(query: &str) -> Vec<String> {
    let mut entities = Vec::new();
    for re in [camel_re(), snake_re(), dotted_re(), file_re()] {
        for m in re.find_iter(query) {
            let token = m.as_str().trim_matches(|c| c == '(' || c == ')');
            if token.len() > 2 && !STOPWORDS.contains(&token.to_lowercase().as_str()) {
                entities.push(token.to_owned());
            }
        }
    }
    entities.sort();
    entities.dedup();
    entities
}

fn extract_specific_targets(query: &str) -> Vec<String> {
    let mut targets = Vec::new();

    for caps in quoted_re().captures_iter(query) {
        targets.push(caps[1].to_owned());
    }
    for m in file_re().find_iter(query) {
        targets.push(m.as_str().to_owned());
    }
    for caps in func_ref_re().captures_iter(query) {
        if let Some(name) = caps.get(1).or_else(|| caps.get(2)) {
            targets.push(name.as_str().to_owned());
        }
    }
    for caps in class_ref_re().captures_iter(query) {
        targets.push(caps[1].to_owned());
    }
    for m in camel_re().find_iter(query) {
        targets.push(m.as_str().to_owned());
    }

    targets.retain(|t| t.len() > 2 && !STOPWORDS.contains(&t.to_lowercase().as_str()));
    targets.sort();
    targets.dedup();
    targets
}

fn determine_scope(query_lower: &str, entities: &[String]) -> Scope {
    if ["architecture", "system", "project", "repository"].iter().any(|w| query_lower.contains(w)) {
        Scope::CrossCutting
    } else if entities.len() > 3 {
        Scope::CrossCutting
    } else if ["module", "package", "component"].iter().any(|w| query_lower.contains(w)) {
        Scope::Module
    } else if entities.len() == 1
        && ["function", "method", "class"].iter().any(|w| query_lower.contains(w))
    {
        Scope::File
    } else {
        Scope::Module
    }
}

fn assess_complexity(query: &str, entities: &[String]) -> Complexity {
    let words = query.split_whitespace().count();
    if words <= 5 && entities.len() <= 1 {
        Complexity::Simple
    } else if words > 15 || entities.len() > 4 {
        Complexity::Complex
    } else {
        Complexity::Medium
    }
}

fn contextual_keywords(analysis: &QueryAnalysis, profile: &RepoProfile) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();

    for query_kw in analysis.intent_keywords.iter().chain(&analysis.entities) {
        for repo_kw in &profile.keywords {
            let q = query_kw.to_lowercase();
            let r = repo_kw.to_lowercase();
            if q.contains(&r) || r.contains(&q) {
                keywords.push(repo_kw.clone());
            }
        }
    }

    match analysis.query_type {
        QueryType::Example => {
            keywords.extend(["example", "demo", "usage"].map(String::from));
        }
        QueryType::Debugging => {
            keywords.extend(["error", "fix", "debug"].map(String::from));
        }
        QueryType::Implementation => {
            keywords.extend(["implement", "create", "build"].map(String::from));
        }
        _ => {}
    }

    keywords.sort();
    keywords.dedup();
    keywords
}

fn extension_filter(profile: &RepoProfile) -> Option<Filter> {
    if profile.file_extensions.is_empty() {
        return None;
    }
    Some(Filter::In("file_extension".to_owned(), profile.file_extensions.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_types() {
        let planner = QueryPlanner::new();
        assert_eq!(planner.analyze("what is this project about?").query_type, QueryType::Conceptual);
        assert_eq!(planner.analyze("why does login fail with an error?").query_type, QueryType::Debugging);
        assert_eq!(planner.analyze("show me an example of pagination").query_type, QueryType::Example);
        assert_eq!(planner.analyze("where is main.py located").query_type, QueryType::FileSearch);
        assert_eq!(planner.analyze("find function parse_args").query_type, QueryType::CodeSearch);
    }

    #[test]
    fn test_entity_extraction() {
        let analysis = QueryPlanner::new().analyze("how does EmbeddingGenerator.embed_batch work in pipeline.py?");
        assert!(analysis.entities.iter().any(|e| e == "EmbeddingGenerator"));
        assert!(analysis.entities.iter().any(|e| e == "embed_batch"));
        assert!(analysis.entities.iter().any(|e| e == "pipeline.py"));
    }

    #[test]
    fn test_specific_targets() {
        let analysis = QueryPlanner::new().analyze("find class Chunker and the file 'config.yaml'");
        assert!(analysis.specific_targets.iter().any(|t| t == "Chunker"));
        assert!(analysis.specific_targets.iter().any(|t| t == "config.yaml"));
    }

    #[test]
    fn test_scope_and_complexity() {
        let planner = QueryPlanner::new();
        let analysis = planner.analyze("describe the system architecture");
        assert_eq!(analysis.scope, Scope::CrossCutting);

        let simple = planner.analyze("what is auth?");
        assert_eq!(simple.complexity, Complexity::Simple);
    }

    #[test]
    fn test_semantic_baseline_always_planned() {
        let planner = QueryPlanner::new();
        let analysis = planner.analyze("tell me about the weather");
        let strategies = planner.plan(&analysis, &["alpha".to_owned(), "beta".to_owned()]);
        let baselines: Vec<_> =
            strategies.iter().filter(|s| s.kind == StrategyKind::SemanticRepository).collect();
        assert_eq!(baselines.len(), 2);
    }

    #[test]
    fn test_direct_entity_strategy_for_targets() {
        let planner = QueryPlanner::new();
        let analysis = planner.analyze("where is the chunker? see chunker.py");
        let strategies = planner.plan(&analysis, &["ns".to_owned()]);
        let direct = strategies.iter().find(|s| s.kind == StrategyKind::DirectEntity).unwrap();
        assert!(direct.filter.as_ref().unwrap().uses_contains());
        assert!(direct.confidence > 0.8);
        // Direct entity search is planned before the semantic baseline
        assert_eq!(strategies.first().unwrap().kind, StrategyKind::DirectEntity);
    }

    #[test]
    fn test_profile_drives_contextual_strategy() {
        let profile = RepoProfile {
            keywords: vec!["webhook".to_owned(), "queue".to_owned()],
            file_extensions: vec!["py".to_owned()],
            structure_clues: vec!["lambda".to_owned()],
        };
        let planner = QueryPlanner::new().with_profile("backend", profile);
        let analysis = planner.analyze("how does the webhook dedupe work?");
        let strategies = planner.plan(&analysis, &["backend".to_owned()]);
        let contextual = strategies.iter().find(|s| s.kind == StrategyKind::Contextual).unwrap();
        assert!(contextual.query_expansion.iter().any(|k| k == "webhook"));
    }
}
