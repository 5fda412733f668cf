//! Summary fallback chain
//!
//! Strategies are tried in order and the first one that produces text wins:
//! docstring (high confidence), injected generator (medium), naming
//! heuristic (low). The heuristic always answers, so every entity gets a
//! summary with its provenance recorded.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::cache::content_hash;
use crate::detectors::common::{first_paragraph, truncate_to_char_boundary};
use crate::enrich::summarizer::SummaryGenerator;
use crate::schema::{Confidence, EntityKind, Summary, SummarySource};

/// What a strategy may look at
#[derive(Debug, Clone, Copy)]
pub struct SummaryRequest<'a> {
    pub uid: &'a str,
    pub kind: EntityKind,
    pub name: &'a str,
    pub docstring: Option<&'a str>,
    /// Source of the definition; `None` for modules
    pub snippet: Option<&'a str>,
    pub parameters: usize,
    /// Entity counts `(classes, functions, methods)` for module summaries
    pub members: (u32, u32, u32),
}

/// One tier of the chain
pub trait SummaryStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn summarize(&self, request: &SummaryRequest) -> Option<Summary>;
}

// ============================================================================
// Docstring
// ============================================================================

pub struct DocstringStrategy;

impl SummaryStrategy for DocstringStrategy {
    fn name(&self) -> &'static str {
        "docstring"
    }

    fn summarize(&self, request: &SummaryRequest) -> Option<Summary> {
        let doc = request.docstring?.trim();
        if doc.is_empty() {
            return None;
        }
        Some(Summary {
            text: doc.to_string(),
            source: SummarySource::Docstring,
            confidence: Confidence::High,
        })
    }
}

// ============================================================================
// Generator
// ============================================================================

/// Calls the injected generator under a hard timeout. Results are cached by
/// snippet hash; after `max_failures` consecutive failures the generator is
/// skipped for the rest of the build.
pub struct GeneratorStrategy {
    generator: Arc<dyn SummaryGenerator>,
    timeout: Duration,
    max_failures: usize,
    max_snippet_chars: usize,
    consecutive_failures: AtomicUsize,
    tripped: AtomicBool,
    cache: Arc<Mutex<BTreeMap<String, String>>>,
}

impl GeneratorStrategy {
    pub fn new(
        generator: Arc<dyn SummaryGenerator>,
        timeout: Duration,
        max_failures: usize,
        max_snippet_chars: usize,
        cache: Arc<Mutex<BTreeMap<String, String>>>,
    ) -> Self {
        Self {
            generator,
            timeout,
            max_failures: max_failures.max(1),
            max_snippet_chars,
            consecutive_failures: AtomicUsize::new(0),
            tripped: AtomicBool::new(false),
            cache,
        }
    }

    fn call_with_timeout(&self, code: &str) -> anyhow::Result<String> {
        let (tx, rx) = mpsc::channel();
        let generator = Arc::clone(&self.generator);
        let code = code.to_string();
        let timeout = self.timeout;
        std::thread::spawn(move || {
            let _ = tx.send(generator.summarize(&code, timeout));
        });
        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                anyhow::bail!("timed out after {} ms", self.timeout.as_millis())
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => anyhow::bail!("generator thread exited"),
        }
    }

    fn record_failure(&self, uid: &str, err: &anyhow::Error) {
        tracing::warn!("summary generation failed for {}: {}", uid, err);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.max_failures && !self.tripped.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                "summary generator disabled for this build after {} consecutive failures",
                failures
            );
        }
    }
}

impl SummaryStrategy for GeneratorStrategy {
    fn name(&self) -> &'static str {
        "generator"
    }

    fn summarize(&self, request: &SummaryRequest) -> Option<Summary> {
        let snippet = request.snippet?;
        let key = content_hash(snippet.as_bytes());
        let to_summary = |text: String| Summary {
            text,
            source: SummarySource::Generator,
            confidence: Confidence::Medium,
        };

        if let Some(text) = self.cache.lock().get(&key) {
            return Some(to_summary(text.clone()));
        }
        if self.tripped.load(Ordering::Relaxed) {
            return None;
        }

        let code = truncate_to_char_boundary(snippet, self.max_snippet_chars);
        match self.call_with_timeout(code) {
            Ok(text) => {
                let lines: Vec<String> = text.lines().map(String::from).collect();
                match first_paragraph(&lines) {
                    Some(text) => {
                        self.consecutive_failures.store(0, Ordering::Relaxed);
                        self.cache.lock().insert(key, text.clone());
                        Some(to_summary(text))
                    }
                    None => {
                        self.record_failure(request.uid, &anyhow::anyhow!("empty summary"));
                        None
                    }
                }
            }
            Err(e) => {
                self.record_failure(request.uid, &e);
                None
            }
        }
    }
}

// ============================================================================
// Heuristic
// ============================================================================

/// Verb prefixes and the phrase they stand for
const VERB_PATTERNS: &[(&str, &str)] = &[
    ("get", "Returns"),
    ("set", "Sets"),
    ("is", "Checks whether"),
    ("has", "Checks whether it has"),
    ("can", "Checks whether it can"),
    ("create", "Creates"),
    ("make", "Creates"),
    ("build", "Builds"),
    ("load", "Loads"),
    ("read", "Reads"),
    ("fetch", "Fetches"),
    ("save", "Saves"),
    ("write", "Writes"),
    ("store", "Stores"),
    ("parse", "Parses"),
    ("render", "Renders"),
    ("validate", "Validates"),
    ("check", "Checks"),
    ("handle", "Handles"),
    ("on", "Handles"),
    ("to", "Converts to"),
    ("as", "Views as"),
    ("update", "Updates"),
    ("delete", "Deletes"),
    ("remove", "Removes"),
    ("add", "Adds"),
    ("init", "Initializes"),
    ("compute", "Computes"),
    ("calculate", "Calculates"),
    ("find", "Finds"),
    ("run", "Runs"),
];

pub struct HeuristicStrategy;

impl SummaryStrategy for HeuristicStrategy {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn summarize(&self, request: &SummaryRequest) -> Option<Summary> {
        Some(Summary {
            text: heuristic_text(request),
            source: SummarySource::Heuristic,
            confidence: Confidence::Low,
        })
    }
}

/// Split `snake_case`, `camelCase` and `PascalCase` names into lowercase words
pub fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch == '_' || ch == '-' || ch == '$' || ch == '#' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn plural(n: u32, word: &str) -> String {
    if n == 1 {
        format!("1 {}", word)
    } else if let Some(stem) = word.strip_suffix("ss") {
        format!("{} {}sses", n, stem)
    } else {
        format!("{} {}s", n, word)
    }
}

fn heuristic_text(request: &SummaryRequest) -> String {
    let words = split_words(request.name);
    let phrase = words.join(" ");

    match request.kind {
        EntityKind::Module => {
            let (classes, functions, methods) = request.members;
            if classes + functions + methods == 0 {
                format!("Module {} with no definitions", request.uid)
            } else {
                format!(
                    "Module {} defining {}, {} and {}",
                    request.uid,
                    plural(classes, "class"),
                    plural(functions, "function"),
                    plural(methods, "method")
                )
            }
        }
        EntityKind::Class => {
            if request.name.ends_with("Error") || request.name.ends_with("Exception") {
                format!("Error type for {}", phrase)
            } else if request.name.starts_with("Test") {
                format!("Test suite for {}", words.get(1..).unwrap_or(&[]).join(" "))
            } else {
                format!("Type representing {}", phrase)
            }
        }
        EntityKind::Function | EntityKind::Method => {
            match request.name {
                "__init__" | "new" | "constructor" => return "Constructor".to_string(),
                "main" => return "Program entry point".to_string(),
                _ => {}
            }
            if words.first().map(|w| w == "test").unwrap_or(false) {
                return format!("Test case for {}", words[1..].join(" "));
            }
            if let Some((verb, rest)) = words.split_first() {
                if let Some((_, phrase)) = VERB_PATTERNS.iter().find(|(p, _)| p == verb) {
                    if !rest.is_empty() {
                        return format!("{} {}", phrase, rest.join(" "));
                    }
                }
            }
            let what = if request.kind == EntityKind::Method { "Method" } else { "Function" };
            format!("{} {} taking {}", what, phrase, plural(request.parameters as u32, "parameter"))
        }
    }
}

// ============================================================================
// Chain
// ============================================================================

/// Ordered list of strategies; the heuristic tier terminates every chain
pub struct SummaryChain {
    strategies: Vec<Box<dyn SummaryStrategy>>,
}

impl SummaryChain {
    pub fn new(strategies: Vec<Box<dyn SummaryStrategy>>) -> Self {
        Self { strategies }
    }

    /// Docstring, optional generator, heuristic
    pub fn standard(generator: Option<GeneratorStrategy>) -> Self {
        let mut strategies: Vec<Box<dyn SummaryStrategy>> = vec![Box::new(DocstringStrategy)];
        if let Some(generator) = generator {
            strategies.push(Box::new(generator));
        }
        strategies.push(Box::new(HeuristicStrategy));
        Self::new(strategies)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn summarize(&self, request: &SummaryRequest) -> Summary {
        self.strategies
            .iter()
            .find_map(|s| s.summarize(request))
            .unwrap_or_else(|| Summary {
                text: heuristic_text(request),
                source: SummarySource::Heuristic,
                confidence: Confidence::Low,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(kind: EntityKind, name: &'a str, doc: Option<&'a str>, snippet: Option<&'a str>) -> SummaryRequest<'a> {
        SummaryRequest {
            uid: "m.x",
            kind,
            name,
            docstring: doc,
            snippet,
            parameters: 2,
            members: (0, 0, 0),
        }
    }

    struct Fixed(&'static str);

    impl SummaryGenerator for Fixed {
        fn summarize(&self, _code: &str, _timeout: Duration) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing(Arc<AtomicUsize>);

    impl SummaryGenerator for Failing {
        fn summarize(&self, _code: &str, _timeout: Duration) -> anyhow::Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("provider down")
        }
    }

    struct Slow;

    impl SummaryGenerator for Slow {
        fn summarize(&self, _code: &str, _timeout: Duration) -> anyhow::Result<String> {
            std::thread::sleep(Duration::from_secs(5));
            Ok("late".to_string())
        }
    }

    fn generator(g: Arc<dyn SummaryGenerator>, timeout_ms: u64, max_failures: usize) -> GeneratorStrategy {
        GeneratorStrategy::new(g, Duration::from_millis(timeout_ms), max_failures, 1000, Arc::default())
    }

    #[test]
    fn test_docstring_wins() {
        let chain = SummaryChain::standard(Some(generator(Arc::new(Fixed("generated")), 500, 3)));
        let summary = chain.summarize(&request(EntityKind::Function, "load", Some("Load it."), Some("def load(): pass")));
        assert_eq!(summary.text, "Load it.");
        assert_eq!(summary.source, SummarySource::Docstring);
        assert_eq!(summary.confidence, Confidence::High);
    }

    #[test]
    fn test_generator_used_without_docstring() {
        let chain = SummaryChain::standard(Some(generator(Arc::new(Fixed("Loads the file.")), 500, 3)));
        let summary = chain.summarize(&request(EntityKind::Function, "load", None, Some("def load(): pass")));
        assert_eq!(summary.text, "Loads the file.");
        assert_eq!(summary.source, SummarySource::Generator);
        assert_eq!(summary.confidence, Confidence::Medium);
    }

    #[test]
    fn test_generator_timeout_falls_back_to_heuristic() {
        let chain = SummaryChain::standard(Some(generator(Arc::new(Slow), 50, 3)));
        let summary = chain.summarize(&request(EntityKind::Function, "get_user", None, Some("def get_user(): pass")));
        assert_eq!(summary.source, SummarySource::Heuristic);
        assert_eq!(summary.text, "Returns user");
    }

    #[test]
    fn test_circuit_breaker_stops_calling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = generator(Arc::new(Failing(Arc::clone(&calls))), 500, 2);
        for i in 0..5 {
            let snippet = format!("def f{}(): pass", i);
            assert!(strategy.summarize(&request(EntityKind::Function, "f", None, Some(&snippet))).is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_generator_cache_is_shared() {
        let cache: Arc<Mutex<BTreeMap<String, String>>> = Arc::default();
        cache
            .lock()
            .insert(content_hash(b"def f(): pass"), "Cached.".to_string());
        let strategy = GeneratorStrategy::new(
            Arc::new(Failing(Arc::new(AtomicUsize::new(0)))),
            Duration::from_millis(100),
            1,
            100,
            cache,
        );
        let summary = strategy
            .summarize(&request(EntityKind::Function, "f", None, Some("def f(): pass")))
            .unwrap();
        assert_eq!(summary.text, "Cached.");
    }

    #[test]
    fn test_modules_skip_generator() {
        let chain = SummaryChain::standard(Some(generator(Arc::new(Fixed("nope")), 500, 3)));
        let mut req = request(EntityKind::Module, "util", None, None);
        req.members = (1, 2, 0);
        let summary = chain.summarize(&req);
        assert_eq!(summary.source, SummarySource::Heuristic);
        assert_eq!(summary.text, "Module m.x defining 1 class, 2 functions and 0 methods");
    }

    #[test]
    fn test_split_words() {
        assert_eq!(split_words("getUserName"), vec!["get", "user", "name"]);
        assert_eq!(split_words("load_config"), vec!["load", "config"]);
        assert_eq!(split_words("HTTPServer"), vec!["httpserver"]);
        assert_eq!(split_words("#secret"), vec!["secret"]);
    }

    #[test]
    fn test_heuristic_patterns() {
        let h = |kind, name| heuristic_text(&request(kind, name, None, None));
        assert_eq!(h(EntityKind::Function, "is_valid"), "Checks whether valid");
        assert_eq!(h(EntityKind::Method, "__init__"), "Constructor");
        assert_eq!(h(EntityKind::Function, "test_login_flow"), "Test case for login flow");
        assert_eq!(h(EntityKind::Class, "ConfigError"), "Error type for config error");
        assert_eq!(h(EntityKind::Function, "frobnicate"), "Function frobnicate taking 2 parameters");
    }
}
