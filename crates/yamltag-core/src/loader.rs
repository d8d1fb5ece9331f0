//! Load entry points
//!
//! The [`Loader`] owns one registry snapshot, the caller's variables and
//! the load options. Loading parses the input into a tree, resolves every
//! directive, then decodes the resolved tree into the destination type, so
//! destinations never see a directive tag.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::node::{self, Node};
use crate::resolver::{self, Resolver, ResolverContext, ResolverRegistry, DEFAULT_MAX_DEPTH};
use crate::variables::Variables;

/// Options for loading documents
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Directory relative `!include` paths resolve against.
    /// `None` means the process working directory.
    pub base_dir: Option<PathBuf>,
    /// Maximum nesting of directive fragments
    pub max_depth: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            base_dir: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl LoadOptions {
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// YAML loader with directive resolution
#[derive(Debug, Clone)]
pub struct Loader {
    registry: ResolverRegistry,
    variables: Variables,
    options: LoadOptions,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    /// Create a loader using a snapshot of the global registry.
    ///
    /// Resolvers registered globally after this call are not visible to
    /// the loader.
    pub fn new() -> Self {
        Self::with_registry(resolver::global_snapshot())
    }

    /// Create a loader with an explicit registry
    pub fn with_registry(registry: ResolverRegistry) -> Self {
        Self {
            registry,
            variables: Variables::new(),
            options: LoadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn registry(&self) -> &ResolverRegistry {
        &self.registry
    }

    /// Register a resolver with this loader only
    pub fn register(&mut self, tag: &str, resolver: Arc<dyn Resolver>) -> Result<()> {
        self.registry.register(tag, resolver)
    }

    /// Register a function as a resolver with this loader only
    pub fn register_fn<F>(&mut self, tag: &str, func: F) -> Result<()>
    where
        F: Fn(&Node, &mut ResolverContext<'_>) -> Result<Node> + Send + Sync + 'static,
    {
        self.registry.register_fn(tag, func)
    }

    /// Replace the variable table with one built from `key=value` strings
    pub fn set_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.set_variables(Variables::from_args(args));
    }

    /// Replace the variable table
    pub fn set_variables(&mut self, variables: Variables) {
        log::debug!("Using {} caller variable(s)", variables.len());
        self.variables = variables;
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Read a whole document from `reader`, resolve it and decode it.
    ///
    /// `args` are `key=value` strings; they replace the variable table
    /// before anything is read.
    pub fn load<R, T, I, S>(&mut self, mut reader: R, args: I) -> Result<T>
    where
        R: Read,
        T: DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.set_args(args);

        let mut input = Vec::new();
        reader
            .read_to_end(&mut input)
            .map_err(|e| Error::io(format!("Failed to read input: {}", e)))?;

        self.from_slice(&input)
    }

    /// Resolve and decode a document held in memory
    pub fn from_slice<T: DeserializeOwned>(&self, input: &[u8]) -> Result<T> {
        decode(self.resolve_slice(input)?)
    }

    /// Resolve and decode a document held in a string
    pub fn from_str<T: DeserializeOwned>(&self, input: &str) -> Result<T> {
        self.from_slice(input.as_bytes())
    }

    /// Resolve and decode a document file.
    ///
    /// The file counts as the first entry of the include chain, so it may
    /// not include itself.
    pub fn from_path<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> Result<T> {
        let path = path.as_ref();
        let input = std::fs::read(path)
            .map_err(|e| Error::io(format!("Failed to read {}: {}", path.display(), e)))?;
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        decode(self.resolve_source(&input, &path.display().to_string(), Some(canonical))?)
    }

    /// Resolve a document held in memory, returning the resolved tree
    pub fn resolve_slice(&self, input: &[u8]) -> Result<Node> {
        self.resolve_source(input, "<input>", None)
    }

    fn resolve_source(&self, input: &[u8], origin: &str, file: Option<PathBuf>) -> Result<Node> {
        let root = node::parse(input).map_err(|e| Error::from_yaml(&e, origin))?;

        let mut ctx = self.context();
        if let Some(file) = file {
            ctx.push_include(file);
        }
        ctx.resolve(root)
    }

    fn context(&self) -> ResolverContext<'_> {
        let ctx = ResolverContext::new(&self.registry, &self.variables)
            .with_max_depth(self.options.max_depth);
        match &self.options.base_dir {
            Some(dir) => ctx.with_base_dir(dir.clone()),
            None => ctx,
        }
    }
}

fn decode<T: DeserializeOwned>(node: Node) -> Result<T> {
    serde_yaml::from_value(node).map_err(|e| Error::decode(e.to_string()))
}

/// Load a document from `reader` with the global registry and the given
/// `key=value` variables
pub fn load<R, T, I, S>(reader: R, args: I) -> Result<T>
where
    R: Read,
    T: DeserializeOwned,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Loader::new().load(reader, args)
}

/// Resolve and decode a document held in memory, without variables
pub fn from_slice<T: DeserializeOwned>(input: &[u8]) -> Result<T> {
    Loader::new().from_slice(input)
}

/// Resolve and decode a document held in a string, without variables
pub fn from_str<T: DeserializeOwned>(input: &str) -> Result<T> {
    Loader::new().from_str(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ResolverErrorKind};
    use crate::Fragment;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("yamltag_loader_{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Database {
        host: String,
        port: u16,
        replicas: Vec<String>,
    }

    #[test]
    fn test_plain_document_matches_serde_yaml() {
        let yaml = "host: localhost\nport: 5432\nreplicas: [a, b]\n";

        let loaded: Database = from_str(yaml).unwrap();
        let plain: Database = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(loaded, plain);
    }

    #[test]
    fn test_load_with_var() {
        #[derive(Deserialize)]
        struct Doc {
            v: String,
        }

        let doc: Doc = load("v: !var name".as_bytes(), ["name=hello"]).unwrap();
        assert_eq!(doc.v, "hello");
    }

    #[test]
    fn test_load_missing_var_names_it() {
        let err = load::<_, Fragment, _, _>("v: !var name".as_bytes(), ["other=1"]).unwrap_err();

        assert_eq!(
            err.resolver_kind(),
            Some(&ResolverErrorKind::VarNotSet {
                name: "name".into()
            })
        );
        assert!(err.to_string().contains("variable name not set"));
    }

    #[test]
    fn test_var_name_is_exact_scalar_text() {
        let cases = [
            ("v: !var 1.10", "1.10=x"),
            ("v: !var 1e3", "1e3=x"),
            ("v: !var null", "null=x"),
            ("v: !var ~", "~=x"),
            ("v: !var 'quoted name'", "quoted name=x"),
        ];

        for (yaml, arg) in cases {
            let doc: BTreeMap<String, String> = load(yaml.as_bytes(), [arg]).unwrap();
            assert_eq!(doc["v"], "x", "loading {:?}", yaml);
        }
    }

    #[test]
    fn test_missing_var_reports_exact_scalar_text() {
        let err = load::<_, Fragment, _, _>("v: !var 1.10".as_bytes(), ["1.1=x"]).unwrap_err();

        assert_eq!(
            err.resolver_kind(),
            Some(&ResolverErrorKind::VarNotSet {
                name: "1.10".into()
            })
        );
    }

    #[test]
    fn test_include_path_is_exact_scalar_text() {
        let dir = temp_dir("numeric_name");
        std::fs::write(dir.join("2024.10"), "release: october\n").unwrap();

        let loader = Loader::new().with_options(LoadOptions::default().with_base_dir(&dir));
        let doc: BTreeMap<String, BTreeMap<String, String>> =
            loader.from_str("r: !include 2024.10").unwrap();
        assert_eq!(doc["r"]["release"], "october");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_multi_document_fragment_uses_first_document() {
        let doc: BTreeMap<String, String> =
            load("v: !var two".as_bytes(), ["two=a\n---\nb"]).unwrap();

        assert_eq!(doc["v"], "a");
    }

    #[test]
    fn test_multi_document_input_uses_first_document() {
        let doc: BTreeMap<String, String> =
            load("v: !var x\n---\nw: !var missing\n".as_bytes(), ["x=1"]).unwrap();

        assert_eq!(doc.len(), 1);
        assert_eq!(doc["v"], "1");
    }

    #[test]
    fn test_empty_fragment_resolves_to_null() {
        let doc: Fragment = load("v: !var e".as_bytes(), ["e=# comment"]).unwrap();

        assert_eq!(doc.node()["v"], Node::Null);
    }

    #[test]
    fn test_empty_input_is_null() {
        let empty: [&str; 0] = [];
        let doc: Fragment = load("".as_bytes(), empty).unwrap();
        assert_eq!(doc.node(), &Node::Null);

        let doc: Option<BTreeMap<String, String>> = from_str("# nothing here\n").unwrap();
        assert_eq!(doc, None);
    }

    #[test]
    fn test_load_replaces_variables() {
        let mut loader = Loader::new();

        let first: BTreeMap<String, String> = loader
            .load("v: !var name".as_bytes(), ["name=hello"])
            .unwrap();
        assert_eq!(first["v"], "hello");

        let empty: [&str; 0] = [];
        let err = loader
            .load::<_, BTreeMap<String, String>, _, _>("v: !var name".as_bytes(), empty)
            .unwrap_err();
        assert!(err.to_string().contains("variable name not set"));
        assert!(loader.variables().is_empty());
    }

    #[test]
    fn test_env_value_is_parsed_as_yaml() {
        std::env::set_var("YAMLTAG_LOADER_REPLICAS", "[r1, r2]");

        let db: Database = from_str(
            "host: db\nport: 5432\nreplicas: !env YAMLTAG_LOADER_REPLICAS\n",
        )
        .unwrap();
        assert_eq!(db.replicas, vec!["r1".to_string(), "r2".to_string()]);

        std::env::remove_var("YAMLTAG_LOADER_REPLICAS");
    }

    #[test]
    fn test_env_unset_fails_with_name() {
        std::env::remove_var("YAMLTAG_LOADER_UNSET");

        let err = from_str::<Fragment>("key: !env YAMLTAG_LOADER_UNSET").unwrap_err();
        assert!(err
            .to_string()
            .contains("environment variable YAMLTAG_LOADER_UNSET not set"));
        assert_eq!(err.path.as_deref(), Some("key"));
    }

    #[test]
    fn test_include_with_nested_env() {
        std::env::set_var("YAMLTAG_LOADER_FOO", "bar");
        let dir = temp_dir("nested_env");
        let included = dir.join("a.yaml");
        std::fs::write(&included, "x: !env YAMLTAG_LOADER_FOO\n").unwrap();

        #[derive(Deserialize)]
        struct Inc {
            x: String,
        }
        #[derive(Deserialize)]
        struct Doc {
            #[serde(rename = "incData")]
            inc_data: Inc,
        }

        let yaml = format!("incData: !include {}", included.display());
        let doc: Doc = load(yaml.as_bytes(), Vec::<String>::new()).unwrap();
        assert_eq!(doc.inc_data.x, "bar");

        std::fs::remove_dir_all(&dir).ok();
        std::env::remove_var("YAMLTAG_LOADER_FOO");
    }

    #[test]
    fn test_include_relative_to_base_dir() {
        let dir = temp_dir("base_dir");
        std::fs::create_dir_all(dir.join("parts")).unwrap();
        std::fs::write(dir.join("parts/db.yaml"), "host: !var host\nport: 5432\nreplicas: []\n")
            .unwrap();

        let mut loader = Loader::new().with_options(LoadOptions::default().with_base_dir(&dir));
        loader.set_args(["host=db.internal"]);

        let db: Database = loader.from_str("!include parts/db.yaml").unwrap();
        assert_eq!(db.host, "db.internal");
        assert!(db.replicas.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_include_missing_file_is_resource_error() {
        let err = from_str::<Fragment>("a: !include /nonexistent/yamltag/none.yaml").unwrap_err();

        assert!(matches!(
            err.resolver_kind(),
            Some(ResolverErrorKind::FileRead { .. })
        ));
        assert_eq!(err.path.as_deref(), Some("a"));
    }

    #[test]
    fn test_included_parse_error_names_file() {
        let dir = temp_dir("parse_error");
        let broken = dir.join("broken.yaml");
        std::fs::write(&broken, "a: [unclosed\n").unwrap();

        let yaml = format!("x: !include {}", broken.display());
        let err = from_str::<Fragment>(&yaml).unwrap_err();

        assert_eq!(err.kind, ErrorKind::Parse);
        let location = err.source_location.expect("parse error should carry a location");
        assert_eq!(location.file, broken.display().to_string());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_top_level_parse_error() {
        let err = from_str::<Fragment>("a: [unclosed").unwrap_err();

        assert_eq!(err.kind, ErrorKind::Parse);
    }

    #[test]
    fn test_from_path_detects_self_include() {
        let dir = temp_dir("self_include");
        let file = dir.join("self.yaml");
        std::fs::write(&file, "me: !include self.yaml\n").unwrap();

        let loader = Loader::new().with_options(LoadOptions::default().with_base_dir(&dir));
        let err = loader.from_path::<Fragment>(&file).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CircularReference);
        assert_eq!(err.path.as_deref(), Some("me"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_directive_on_non_scalar_fails_for_every_kind() {
        for tag in ["!include", "!env", "!var"] {
            let yaml = format!("a: {} {{nested: true}}", tag);
            let err = from_str::<Fragment>(&yaml).unwrap_err();

            assert_eq!(
                err.resolver_kind(),
                Some(&ResolverErrorKind::NonScalar { tag: tag.into() })
            );
        }
    }

    #[test]
    fn test_custom_double_resolver() {
        #[derive(Debug, Deserialize)]
        struct Doc {
            n: i64,
        }

        let mut loader = Loader::new();
        loader
            .register_fn("!double", |node, ctx| {
                let text = node::require_scalar("!double", node)?;
                let n: i64 = text
                    .parse()
                    .map_err(|_| Error::resolver_custom("!double", format!("'{}' is not a number", text)))?;
                ctx.resolve_fragment((n * 2).to_string(), "!double")
            })
            .unwrap();

        let doc: Doc = loader.from_str("n: !double 21").unwrap();
        assert_eq!(doc.n, 42);

        let err = loader.from_str::<Doc>("n: !double many").unwrap_err();
        assert!(err.to_string().contains("'many' is not a number"));
    }

    #[test]
    fn test_global_registration_visible_to_new_loaders() {
        resolver::register_global_fn("!yamltag_loader_upper", |node, _ctx| {
            let text = node::require_scalar("!yamltag_loader_upper", node)?;
            Ok(Node::from(text.to_uppercase()))
        })
        .unwrap();

        let doc: BTreeMap<String, String> = from_str("k: !yamltag_loader_upper shout").unwrap();
        assert_eq!(doc["k"], "SHOUT");
    }

    #[test]
    fn test_fragment_destination_captures_resolved_tree() {
        #[derive(Deserialize)]
        struct Doc {
            custom: Fragment,
        }

        let mut loader = Loader::new();
        let doc: Doc = loader
            .load("custom: {a: !var x, b: [!var x]}".as_bytes(), ["x=7"])
            .unwrap();

        let expected: Node = serde_yaml::from_str("{a: 7, b: [7]}").unwrap();
        assert_eq!(doc.custom.node(), &expected);
    }

    #[test]
    fn test_decode_error() {
        let err = from_str::<Database>("host: h\nport: not-a-port\nreplicas: []").unwrap_err();

        assert_eq!(err.kind, ErrorKind::Decode);
    }

    #[test]
    fn test_depth_limit_from_options() {
        let mut loader = Loader::new().with_options(LoadOptions::default().with_max_depth(3));

        let err = loader
            .load::<_, Fragment, _, _>("a: !var loop".as_bytes(), ["loop=!var loop"])
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DepthExceeded { limit: 3 });
    }

    #[test]
    fn test_load_reports_reader_failure() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "stream closed"))
            }
        }

        let err = load::<_, Fragment, _, _>(Failing, ["a=b"]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
        assert!(err.to_string().contains("stream closed"));
    }
}
