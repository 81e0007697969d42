//! Resource classification.
//!
//! A request is classified by walking an ordered list of rules; the first
//! rule whose predicate matches decides the class. Anything unmatched is
//! `Other`. Classification is pure and recomputed per request.

use std::fmt;
use std::sync::OnceLock;

use url::Url;

use crate::catalog::CONTENT_EXTENSION;
use crate::config::WorkerConfig;

/// Extensions served from the image partition.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp", "ico"];

/// Shell paths of the shipped application, relative to the scope.
const DEFAULT_SHELL_PATHS: &[&str] = &["/", "/index.html", "/style.css", "/app.js", "/manifest.json"];

static DEFAULT_CLASSIFIER: OnceLock<Classifier> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    Shell,
    Content,
    Image,
    Other,
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceClass::Shell => "shell",
            ResourceClass::Content => "content",
            ResourceClass::Image => "image",
            ResourceClass::Other => "other",
        };
        f.write_str(name)
    }
}

type Predicate = Box<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// One `(predicate, class)` pair. The predicate sees `(path, destination)`.
pub struct Rule {
    pub name: &'static str,
    pub class: ResourceClass,
    predicate: Predicate,
}

impl Rule {
    pub fn new(
        name: &'static str,
        class: ResourceClass,
        predicate: impl Fn(&str, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            class,
            predicate: Box::new(predicate),
        }
    }

    pub fn matches(&self, path: &str, destination: &str) -> bool {
        (self.predicate)(path, destination)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("class", &self.class)
            .finish()
    }
}

#[derive(Debug)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Classifier {
    /// Standard rule order: content extension, image, exact shell path.
    pub fn new(shell_paths: Vec<String>) -> Self {
        Self::from_rules(vec![
            Rule::new("content-extension", ResourceClass::Content, |path, _| {
                has_extension(path, CONTENT_EXTENSION)
            }),
            Rule::new("image", ResourceClass::Image, |path, destination| {
                destination == "image" || IMAGE_EXTENSIONS.iter().any(|ext| has_extension(path, ext))
            }),
            Rule::new("shell-path", ResourceClass::Shell, move |path, _| {
                shell_paths.iter().any(|p| p == path)
            }),
        ])
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Build from the configured shell file list, resolved against the scope.
    /// Entries that resolve outside the scope are dropped.
    pub fn from_config(config: &WorkerConfig, scope: &Url) -> Self {
        let shell_paths = config
            .shell_files
            .iter()
            .filter_map(|file| scope.join(file).ok())
            .filter(|url| url.origin() == scope.origin())
            .filter_map(|url| url.path().strip_prefix(scope.path()).map(|rest| format!("/{}", rest)))
            .collect();
        Self::new(shell_paths)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn classify(&self, path: &str, destination: &str) -> ResourceClass {
        self.rules
            .iter()
            .find(|rule| rule.matches(path, destination))
            .map(|rule| rule.class)
            .unwrap_or(ResourceClass::Other)
    }

    /// Classify a request outside the scope. Suffix and destination rules
    /// still apply but nothing out there is part of the shell.
    pub fn classify_out_of_scope(&self, path: &str, destination: &str) -> ResourceClass {
        self.rules
            .iter()
            .filter(|rule| rule.class != ResourceClass::Shell)
            .find(|rule| rule.matches(path, destination))
            .map(|rule| rule.class)
            .unwrap_or(ResourceClass::Other)
    }
}

/// Classify against the shipped application's shell paths.
pub fn classify(path: &str, destination: &str) -> ResourceClass {
    DEFAULT_CLASSIFIER
        .get_or_init(|| Classifier::new(DEFAULT_SHELL_PATHS.iter().map(|s| s.to_string()).collect()))
        .classify(path, destination)
}

fn has_extension(path: &str, ext: &str) -> bool {
    path.rsplit_once('.')
        .map(|(stem, found)| !stem.ends_with('/') && found.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}
