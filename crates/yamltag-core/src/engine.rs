//! Tag resolution engine
//!
//! Walks a document tree depth-first. A node whose tag has a registered
//! directive is handed to that directive and replaced by its result; the
//! directive is responsible for resolving whatever it produces. Sequences
//! and mappings are rebuilt with every child resolved in order, and the
//! first failure aborts the walk.

use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};

use crate::error::Result;
use crate::node::{self, Node};
use crate::resolver::ResolverContext;

/// Resolve every directive in `node`
pub fn resolve(node: Node, ctx: &mut ResolverContext<'_>) -> Result<Node> {
    match node {
        Value::Tagged(tagged) => resolve_tagged(*tagged, ctx),
        Value::Sequence(seq) => {
            let mut resolved = Vec::with_capacity(seq.len());
            for (index, item) in seq.into_iter().enumerate() {
                ctx.push_path(format!("[{}]", index));
                let item = resolve(item, ctx);
                ctx.pop_path();
                resolved.push(item?);
            }
            Ok(Value::Sequence(resolved))
        }
        Value::Mapping(map) => {
            let mut resolved = Mapping::with_capacity(map.len());
            for (key, value) in map {
                // Keys are children too and may carry directives
                let key = resolve(key, ctx)?;
                if resolved.contains_key(&key) {
                    log::debug!(
                        "Key '{}' in '{}' resolved to a duplicate, later entry wins",
                        path_segment(&key),
                        ctx.config_path()
                    );
                }
                ctx.push_path(path_segment(&key));
                let value = resolve(value, ctx);
                ctx.pop_path();
                resolved.insert(key, value?);
            }
            Ok(Value::Mapping(resolved))
        }
        scalar => Ok(scalar),
    }
}

fn resolve_tagged(tagged: TaggedValue, ctx: &mut ResolverContext<'_>) -> Result<Node> {
    let tag = tagged.tag.to_string();
    let registry = ctx.registry();

    match registry.get(&tag) {
        Some(directive) => {
            log::debug!(
                "Resolving {} {} at '{}' (depth {})",
                tag,
                node::describe(&tagged.value).chars().take(80).collect::<String>(),
                ctx.config_path(),
                ctx.depth()
            );
            let node = Value::Tagged(Box::new(tagged));
            directive
                .resolve(&tag, &node, ctx)
                .map_err(|e| e.or_path(ctx.config_path()))
        }
        None => {
            // Not a directive: keep the tag, resolve what it wraps
            let TaggedValue { tag, value } = tagged;
            let value = resolve(value, ctx)?;
            Ok(Value::Tagged(Box::new(TaggedValue { tag, value })))
        }
    }
}

fn path_segment(key: &Node) -> String {
    node::scalar_text(key).unwrap_or_else(|| node::describe(key))
}
