use std::sync::{Arc, RwLock};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tracing::debug;

use super::controller::{FormController, FormResult, read_lock, write_lock};
use super::state::FieldPath;
use super::validation::ValidateOptions;

/// Capabilities a registered field exposes to form-wide passes.
///
/// Every call receives the controller explicitly; implementations hold
/// their own path and validators, never the form itself.
pub trait FieldApi: Send + Sync {
    /// Groups and lists own child fields but no touchable value.
    fn is_group(&self) -> bool {
        false
    }

    fn pre_validate(&self, form: &FormController, opts: ValidateOptions) -> FormResult<()>;

    fn validate(&self, form: &FormController, opts: ValidateOptions) -> FormResult<()>;

    fn async_validate(
        &self,
        form: &FormController,
        opts: ValidateOptions,
    ) -> BoxFuture<'static, FormResult<()>>;
}

#[derive(Clone)]
pub struct FieldNode {
    pub path: FieldPath,
    pub api: Arc<dyn FieldApi>,
    pub children: Option<FieldTree>,
}

/// Shared registry of sibling fields.
///
/// A group creates its own tree for its children and hands the same handle
/// to its parent when it registers, so the structure seen by a traversal is
/// whatever is registered at that moment.
#[derive(Clone, Default)]
pub struct FieldTree {
    nodes: Arc<RwLock<Vec<FieldNode>>>,
}

impl FieldTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        path: FieldPath,
        api: Arc<dyn FieldApi>,
        children: Option<FieldTree>,
    ) -> FormResult<()> {
        debug!(%path, group = api.is_group(), "registering field");
        write_lock(&self.nodes, "registering field")?.push(FieldNode {
            path,
            api,
            children,
        });
        Ok(())
    }

    pub fn deregister(&self, path: &FieldPath) -> FormResult<()> {
        let mut nodes = write_lock(&self.nodes, "deregistering field")?;
        let before = nodes.len();
        nodes.retain(|node| &node.path != path);
        debug!(%path, removed = before - nodes.len(), "deregistering field");
        Ok(())
    }

    pub fn nodes(&self) -> FormResult<Vec<FieldNode>> {
        Ok(read_lock(&self.nodes, "reading field registry")?.clone())
    }

    pub fn len(&self) -> FormResult<usize> {
        Ok(read_lock(&self.nodes, "counting registered fields")?.len())
    }

    pub fn is_empty(&self) -> FormResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Visits every registered field, children first.
    ///
    /// `visit(node, parent_path)` runs for a node only after the visits of
    /// all its descendants have completed. Siblings and independent roots
    /// run concurrently with no ordering between them. Every started visit
    /// is driven to completion; the first error in registry order is
    /// returned once its siblings have settled.
    pub async fn visit_post_order<F>(&self, visit: F) -> FormResult<()>
    where
        F: Fn(FieldNode, FieldPath) -> BoxFuture<'static, FormResult<()>> + Send + Sync,
    {
        let roots = self.nodes()?;
        settle(join_all(roots.into_iter().map(|root| walk(root, FieldPath::root(), &visit))).await)
    }
}

fn walk<'a, F>(node: FieldNode, parent: FieldPath, visit: &'a F) -> BoxFuture<'a, FormResult<()>>
where
    F: Fn(FieldNode, FieldPath) -> BoxFuture<'static, FormResult<()>> + Send + Sync,
{
    async move {
        let path = parent.join(&node.path);
        let children = match node.children.as_ref() {
            Some(children) => children.nodes()?,
            None => Vec::new(),
        };
        settle(
            join_all(
                children
                    .into_iter()
                    .map(|child| walk(child, path.clone(), visit)),
            )
            .await,
        )?;
        visit(node, parent).await
    }
    .boxed()
}

fn settle(results: Vec<FormResult<()>>) -> FormResult<()> {
    results.into_iter().collect()
}
