//! yamltag-core: YAML loading with directive tags
//!
//! Scalars tagged with a registered directive are replaced before the
//! document is decoded:
//!
//! - `!include path` - the parsed contents of a file
//! - `!env NAME` - the parsed value of an environment variable
//! - `!var NAME` - the parsed value of a caller-supplied `NAME=value`
//!
//! Every replacement is itself resolved, so an included file may use
//! further directives. Host programs can add their own directives.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//!
//! let doc: BTreeMap<String, String> =
//!     yamltag_core::load("greeting: !var name".as_bytes(), ["name=hello"]).unwrap();
//! assert_eq!(doc["greeting"], "hello");
//! ```

pub mod engine;
pub mod error;
pub mod node;
pub mod resolver;
pub mod variables;

mod fragment;
mod loader;

pub use error::{Error, Result};
pub use fragment::Fragment;
pub use loader::{from_slice, from_str, load, LoadOptions, Loader};
pub use node::{Node, NodeKind};
pub use resolver::{
    global_registry, register_global, register_global_fn, Directive, FnResolver, Resolver,
    ResolverContext, ResolverRegistry,
};
pub use variables::Variables;
