//! Directive resolvers
//!
//! A directive is a tag on a scalar node (`!include path`, `!env NAME`,
//! `!var NAME`). Resolving it produces a YAML fragment which is parsed and
//! itself resolved, so directives compose: an included file may use `!env`,
//! `!var` or further `!include`s.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::engine;
use crate::error::{Error, Result};
use crate::node::{self, Node};
use crate::variables::Variables;

/// Default limit on how deeply directive fragments may nest
pub const DEFAULT_MAX_DEPTH: usize = 32;

// Global resolver registry for host extensions
static GLOBAL_REGISTRY: OnceLock<RwLock<ResolverRegistry>> = OnceLock::new();

/// Get the global resolver registry.
///
/// This registry is lazily initialized with the built-in directives.
/// Host programs register additional directives here before creating a
/// [`Loader`](crate::Loader), which takes a snapshot of it.
pub fn global_registry() -> &'static RwLock<ResolverRegistry> {
    GLOBAL_REGISTRY.get_or_init(|| RwLock::new(ResolverRegistry::with_builtins()))
}

/// Register a resolver in the global registry.
///
/// Registering a tag that already exists replaces the earlier resolver.
pub fn register_global(tag: &str, resolver: Arc<dyn Resolver>) -> Result<()> {
    let mut registry = global_registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    registry.register(tag, resolver)
}

/// Register a function as a resolver in the global registry
pub fn register_global_fn<F>(tag: &str, func: F) -> Result<()>
where
    F: Fn(&Node, &mut ResolverContext<'_>) -> Result<Node> + Send + Sync + 'static,
{
    register_global(tag, Arc::new(FnResolver::new(func)))
}

/// Copy of the global registry as it is right now
pub(crate) fn global_snapshot() -> ResolverRegistry {
    global_registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Trait for host-supplied resolver implementations
pub trait Resolver: Send + Sync {
    /// Replace a tagged node.
    ///
    /// `node` is the tagged node as it appears in the document. Resolvers
    /// that produce YAML text should hand it to
    /// [`ResolverContext::resolve_fragment`] so nested directives resolve.
    fn resolve(&self, node: &Node, ctx: &mut ResolverContext<'_>) -> Result<Node>;
}

/// A simple function-based resolver
pub struct FnResolver<F>
where
    F: Fn(&Node, &mut ResolverContext<'_>) -> Result<Node> + Send + Sync,
{
    func: F,
}

impl<F> FnResolver<F>
where
    F: Fn(&Node, &mut ResolverContext<'_>) -> Result<Node> + Send + Sync,
{
    /// Create a new function-based resolver
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Resolver for FnResolver<F>
where
    F: Fn(&Node, &mut ResolverContext<'_>) -> Result<Node> + Send + Sync,
{
    fn resolve(&self, node: &Node, ctx: &mut ResolverContext<'_>) -> Result<Node> {
        (self.func)(node, ctx)
    }
}

/// What a registered tag does
#[derive(Clone)]
pub enum Directive {
    /// Replace the node with the contents of the named file
    Include,
    /// Replace the node with the value of the named environment variable
    Env,
    /// Replace the node with the value of the named caller variable
    Var,
    /// Host-supplied resolver
    Custom(Arc<dyn Resolver>),
}

impl Directive {
    /// Resolve `node`, which carries `tag`
    pub fn resolve(&self, tag: &str, node: &Node, ctx: &mut ResolverContext<'_>) -> Result<Node> {
        match self {
            Directive::Include => include_resolver(tag, node, ctx),
            Directive::Env => env_resolver(tag, node, ctx),
            Directive::Var => var_resolver(tag, node, ctx),
            Directive::Custom(resolver) => resolver.resolve(node, ctx),
        }
    }
}

impl fmt::Debug for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Include => write!(f, "Include"),
            Directive::Env => write!(f, "Env"),
            Directive::Var => write!(f, "Var"),
            Directive::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Normalize a tag to its `!name` form
fn normalize_tag(tag: &str) -> Result<String> {
    if tag.is_empty() || tag == "!" {
        return Err(Error::invalid_tag(tag));
    }
    if tag.starts_with('!') {
        Ok(tag.to_string())
    } else {
        Ok(format!("!{}", tag))
    }
}

/// Registry of available directives, keyed by tag
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    directives: HashMap<String, Directive>,
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

impl ResolverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in directives
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtin_resolvers();
        registry
    }

    /// Register the built-in directives (!include, !env, !var)
    fn register_builtin_resolvers(&mut self) {
        self.directives
            .insert("!include".to_string(), Directive::Include);
        self.directives.insert("!env".to_string(), Directive::Env);
        self.directives.insert("!var".to_string(), Directive::Var);
    }

    /// Register a directive under `tag`.
    ///
    /// `"name"` and `"!name"` refer to the same tag. An existing entry for
    /// the tag is replaced. Fails only for an empty tag.
    pub fn register_directive(&mut self, tag: &str, directive: Directive) -> Result<()> {
        let tag = normalize_tag(tag)?;
        if self.directives.insert(tag.clone(), directive).is_some() {
            log::debug!("Replaced resolver for {}", tag);
        }
        Ok(())
    }

    /// Register a resolver
    pub fn register(&mut self, tag: &str, resolver: Arc<dyn Resolver>) -> Result<()> {
        self.register_directive(tag, Directive::Custom(resolver))
    }

    /// Register a function as a resolver
    pub fn register_fn<F>(&mut self, tag: &str, func: F) -> Result<()>
    where
        F: Fn(&Node, &mut ResolverContext<'_>) -> Result<Node> + Send + Sync + 'static,
    {
        self.register(tag, Arc::new(FnResolver::new(func)))
    }

    /// Get the directive registered for a tag
    pub fn get(&self, tag: &str) -> Option<&Directive> {
        let tag = normalize_tag(tag).ok()?;
        self.directives.get(&tag)
    }

    /// Check if a tag is registered
    pub fn contains(&self, tag: &str) -> bool {
        self.get(tag).is_some()
    }

    /// Registered tags, sorted
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.directives.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

/// State for one resolution pass.
///
/// Everything a resolver may consult travels here rather than in globals:
/// the registry, the caller's variables, the include base directory, the
/// document path being resolved (for error messages), the files currently
/// being included and the fragment nesting depth.
#[derive(Debug)]
pub struct ResolverContext<'a> {
    registry: &'a ResolverRegistry,
    variables: &'a Variables,
    base_dir: Option<PathBuf>,
    max_depth: usize,
    depth: usize,
    path: Vec<String>,
    include_stack: Vec<PathBuf>,
}

impl<'a> ResolverContext<'a> {
    /// Create a new resolver context
    pub fn new(registry: &'a ResolverRegistry, variables: &'a Variables) -> Self {
        Self {
            registry,
            variables,
            base_dir: None,
            max_depth: DEFAULT_MAX_DEPTH,
            depth: 0,
            path: Vec::new(),
            include_stack: Vec::new(),
        }
    }

    /// Set the directory relative include paths are resolved against
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Set the fragment nesting limit
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn registry(&self) -> &'a ResolverRegistry {
        self.registry
    }

    pub fn variables(&self) -> &'a Variables {
        self.variables
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Current fragment nesting depth (0 for the top-level document)
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Path of the node being resolved, e.g. `servers[0].host`
    pub fn config_path(&self) -> String {
        let mut out = String::new();
        for segment in &self.path {
            if !out.is_empty() && !segment.starts_with('[') {
                out.push('.');
            }
            out.push_str(segment);
        }
        out
    }

    pub(crate) fn push_path(&mut self, segment: String) {
        self.path.push(segment);
    }

    pub(crate) fn pop_path(&mut self) {
        self.path.pop();
    }

    /// Check if including a file would cause a cycle
    pub fn would_cause_cycle(&self, file: &Path) -> bool {
        self.include_stack.iter().any(|f| f == file)
    }

    /// Push a file onto the include stack
    pub(crate) fn push_include(&mut self, file: PathBuf) {
        self.include_stack.push(file);
    }

    /// Pop a file from the include stack
    pub(crate) fn pop_include(&mut self) {
        self.include_stack.pop();
    }

    /// Get the include chain for error reporting
    pub fn include_chain(&self) -> Vec<String> {
        self.include_stack
            .iter()
            .map(|p| p.display().to_string())
            .collect()
    }

    /// Resolve a node and everything below it
    pub fn resolve(&mut self, node: Node) -> Result<Node> {
        engine::resolve(node, self)
    }

    /// Parse `source` as a standalone YAML document and resolve it.
    ///
    /// Only the first document is used; an empty one resolves to null.
    /// `origin` names where the text came from and is used in parse errors.
    pub fn resolve_fragment(&mut self, source: impl AsRef<[u8]>, origin: &str) -> Result<Node> {
        if self.depth >= self.max_depth {
            return Err(Error::depth_exceeded(self.max_depth).with_path(self.config_path()));
        }

        let source = source.as_ref();
        log::trace!("Parsing fragment from {} ({} bytes)", origin, source.len());
        let fragment = node::parse(source)
            .map_err(|e| Error::from_yaml(&e, origin).with_path(self.config_path()))?;

        self.depth += 1;
        let result = self.resolve(fragment);
        self.depth -= 1;
        result
    }

    fn file_path(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        match self.base_dir() {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Built-in `!include` resolver
///
/// Usage:
///   key: !include path/to/file.yaml   - relative to the base directory
///                                       (or the working directory)
///   key: !include /absolute/file.yaml
fn include_resolver(tag: &str, node: &Node, ctx: &mut ResolverContext<'_>) -> Result<Node> {
    let file = node::require_scalar(tag, node)?;
    let path = ctx.file_path(&file);

    let bytes = std::fs::read(&path).map_err(|e| Error::file_read(&file, &e))?;
    let canonical = path.canonicalize().unwrap_or(path);

    if ctx.would_cause_cycle(&canonical) {
        let mut chain = ctx.include_chain();
        chain.push(canonical.display().to_string());
        return Err(Error::circular_reference(chain));
    }

    log::trace!("Including {} ({} bytes)", canonical.display(), bytes.len());
    ctx.push_include(canonical);
    let result = ctx.resolve_fragment(&bytes, &file);
    ctx.pop_include();
    result
}

/// Built-in `!env` resolver
///
/// An empty value is treated the same as an unset variable.
fn env_resolver(tag: &str, node: &Node, ctx: &mut ResolverContext<'_>) -> Result<Node> {
    let var_name = node::require_scalar(tag, node)?;

    match std::env::var(&var_name) {
        Ok(value) if !value.is_empty() => {
            ctx.resolve_fragment(value, &format!("{} {}", tag, var_name))
        }
        Ok(_) | Err(std::env::VarError::NotPresent) => Err(Error::env_not_set(var_name)),
        Err(std::env::VarError::NotUnicode(_)) => Err(Error::resolver_custom(
            tag,
            format!("environment variable {} is not valid unicode", var_name),
        )),
    }
}

/// Built-in `!var` resolver
fn var_resolver(tag: &str, node: &Node, ctx: &mut ResolverContext<'_>) -> Result<Node> {
    let name = node::require_scalar(tag, node)?;
    let variables = ctx.variables();

    match variables.get(&name) {
        Some(value) => ctx.resolve_fragment(value, &format!("{} {}", tag, name)),
        None => Err(Error::var_not_set(name)),
    }
}
