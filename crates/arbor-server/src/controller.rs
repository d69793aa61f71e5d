//! Controller tree: nested modules of callable methods.
//!
//! The tree is assembled once at startup with [`ControllerBuilder`] and is
//! read-only while serving.

use std::collections::BTreeMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use arbor_core::{Params, RpcError, event_key};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::context::CallContext;

/// Trait implemented by every RPC method.
#[async_trait]
pub trait MethodHandler<C>: Send + Sync {
    /// Execute the method with positional params.
    async fn handle(&self, params: Params, ctx: CallContext<C>) -> Result<Value, RpcError>;
}

/// Adapter turning an async closure into a [`MethodHandler`].
pub struct FnHandler<F, T> {
    f: F,
    _output: PhantomData<fn() -> T>,
}

impl<F, T> FnHandler<F, T> {
    /// Wrap `f`.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _output: PhantomData,
        }
    }
}

#[async_trait]
impl<C, F, Fut, T> MethodHandler<C> for FnHandler<F, T>
where
    C: Send + Sync + 'static,
    F: Fn(Params, CallContext<C>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, RpcError>> + Send + 'static,
    T: Serialize + 'static,
{
    async fn handle(&self, params: Params, ctx: CallContext<C>) -> Result<Value, RpcError> {
        let value = (self.f)(params, ctx).await?;
        Ok(serde_json::to_value(value)?)
    }
}

enum Node<C> {
    Module(BTreeMap<String, Node<C>>),
    Method(Arc<dyn MethodHandler<C>>),
}

/// Fluent builder for a module and its children.
pub struct ControllerBuilder<C> {
    children: BTreeMap<String, Node<C>>,
}

impl<C: Send + Sync + 'static> ControllerBuilder<C> {
    /// Start an empty module.
    pub fn new() -> Self {
        Self {
            children: BTreeMap::new(),
        }
    }

    /// Add a method backed by an async closure.
    #[must_use]
    pub fn method<F, Fut, T>(self, name: &str, f: F) -> Self
    where
        F: Fn(Params, CallContext<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RpcError>> + Send + 'static,
        T: Serialize + 'static,
    {
        self.handler(name, FnHandler::new(f))
    }

    /// Add a method backed by a [`MethodHandler`] implementation.
    #[must_use]
    pub fn handler(self, name: &str, handler: impl MethodHandler<C> + 'static) -> Self {
        self.insert(name, Node::Method(Arc::new(handler)))
    }

    /// Mount a sub-module.
    #[must_use]
    pub fn module(self, name: &str, module: ControllerBuilder<C>) -> Self {
        self.insert(name, Node::Module(module.children))
    }

    fn insert(mut self, name: &str, node: Node<C>) -> Self {
        if name.is_empty() || name.contains('.') {
            warn!(name, "skipping controller with an empty or dotted name");
            return self;
        }
        if self.children.insert(name.to_owned(), node).is_some() {
            warn!(name, "controller name registered twice, keeping the last one");
        }
        self
    }

    /// Freeze into a tree.
    pub fn build(self) -> ControllerTree<C> {
        ControllerTree {
            root: self.children,
        }
    }
}

impl<C: Send + Sync + 'static> Default for ControllerBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable, resolved controller hierarchy.
pub struct ControllerTree<C> {
    root: BTreeMap<String, Node<C>>,
}

impl<C> ControllerTree<C> {
    /// Resolve `namespace` then `method` to a handler.
    ///
    /// Every namespace segment must name a module and `method` must name a
    /// method on the last one; anything else is [`RpcError::Routing`].
    pub fn resolve(
        &self,
        namespace: &[String],
        method: &str,
    ) -> Result<&Arc<dyn MethodHandler<C>>, RpcError> {
        let routing = || RpcError::Routing {
            path: event_key(namespace, method),
        };

        let mut current = &self.root;
        for segment in namespace {
            match current.get(segment) {
                Some(Node::Module(children)) => current = children,
                _ => return Err(routing()),
            }
        }
        match current.get(method) {
            Some(Node::Method(handler)) => Ok(handler),
            _ => Err(routing()),
        }
    }

    /// All callable dot-joined paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_paths(&self.root, &mut Vec::new(), &mut out);
        out.sort();
        out
    }

    /// Whether a dot-joined path names a method.
    pub fn has_path(&self, path: &str) -> bool {
        let mut segments: Vec<String> = path.split('.').map(str::to_owned).collect();
        let Some(method) = segments.pop() else {
            return false;
        };
        self.resolve(&segments, &method).is_ok()
    }
}

fn collect_paths<C>(
    children: &BTreeMap<String, Node<C>>,
    prefix: &mut Vec<String>,
    out: &mut Vec<String>,
) {
    for (name, node) in children {
        match node {
            Node::Method(_) => out.push(event_key(prefix, name)),
            Node::Module(sub) => {
                prefix.push(name.clone());
                collect_paths(sub, prefix, out);
                let _ = prefix.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ClientRequest;
    use assert_matches::assert_matches;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl MethodHandler<()> for Echo {
        async fn handle(&self, params: Params, _ctx: CallContext<()>) -> Result<Value, RpcError> {
            Ok(Value::Array(params.into_inner()))
        }
    }

    fn tree() -> ControllerTree<()> {
        ControllerBuilder::new()
            .method("health", |_p, _ctx| async { Ok("ok") })
            .module(
                "user",
                ControllerBuilder::new()
                    .handler("echo", Echo)
                    .module(
                        "profile",
                        ControllerBuilder::new().method("get", |p: Params, _ctx| async move {
                            Ok(json!({"id": p.required::<u32>(0)?}))
                        }),
                    ),
            )
            .build()
    }

    fn ctx() -> CallContext<()> {
        CallContext::new(Arc::new(()), ClientRequest::new(vec![], "x".into(), None))
    }

    fn ns(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_owned()).collect()
    }

    #[tokio::test]
    async fn resolve_nested_method() {
        let tree = tree();
        let handler = tree.resolve(&ns(&["user", "profile"]), "get").unwrap();
        let out = handler
            .handle(Params::new(vec![json!(7)]), ctx())
            .await
            .unwrap();
        assert_eq!(out, json!({"id": 7}));
    }

    #[tokio::test]
    async fn closure_result_is_serialized() {
        let tree = tree();
        let out = tree
            .resolve(&[], "health")
            .unwrap()
            .handle(Params::default(), ctx())
            .await
            .unwrap();
        assert_eq!(out, json!("ok"));
    }

    #[test]
    fn missing_namespace_is_routing() {
        let err = tree()
            .resolve(&ns(&["chat"]), "join")
            .err()
            .unwrap();
        assert_matches!(err, RpcError::Routing { ref path } if path == "chat.join");
    }

    #[test]
    fn method_used_as_namespace_is_routing() {
        assert_matches!(
            tree().resolve(&ns(&["health"]), "x").err(),
            Some(RpcError::Routing { .. })
        );
    }

    #[test]
    fn module_used_as_method_is_routing() {
        assert_matches!(
            tree().resolve(&ns(&["user"]), "profile").err(),
            Some(RpcError::Routing { .. })
        );
    }

    #[test]
    fn paths_are_sorted_and_complete() {
        assert_eq!(
            tree().paths(),
            vec!["health", "user.echo", "user.profile.get"]
        );
    }

    #[test]
    fn has_path_checks_leaves_only() {
        let tree = tree();
        assert!(tree.has_path("user.profile.get"));
        assert!(tree.has_path("health"));
        assert!(!tree.has_path("user.profile"));
        assert!(!tree.has_path("user.nope"));
        assert!(!tree.has_path(""));
    }

    #[test]
    fn duplicate_name_keeps_last() {
        let tree: ControllerTree<()> = ControllerBuilder::new()
            .method("x", |_p, _c| async { Ok(1) })
            .module("x", ControllerBuilder::new().handler("y", Echo))
            .build();
        assert_eq!(tree.paths(), vec!["x.y"]);
    }

    #[test]
    fn empty_and_dotted_names_are_skipped() {
        let tree: ControllerTree<()> = ControllerBuilder::new()
            .method("", |_p, _c| async { Ok(0) })
            .method("a.b", |_p, _c| async { Ok(1) })
            .module("m.n", ControllerBuilder::new().handler("y", Echo))
            .method("ok", |_p, _c| async { Ok(2) })
            .build();
        assert_eq!(tree.paths(), vec!["ok"]);
        assert!(!tree.has_path("a.b"));
        assert!(tree.resolve(&[], "a.b").is_err());
    }
}
