//! closure で作る task (`FnTask`)
//!
//! 型を定義せずに一時的な仕事を積める。closure は実行ごとに新しい future を
//! 作る。共有状態は closure に `Arc` で明示的に持たせる。

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use super::{Task, TaskContext};
use crate::error::TaskError;

/// `FnTask` の closure が返す boxed future
pub type TaskFuture<O> = Pin<Box<dyn Future<Output = Result<O, TaskError>> + Send + 'static>>;

type TaskClosure<O> = Box<dyn Fn(TaskContext) -> TaskFuture<O> + Send + Sync>;

/// 関数で作る task
pub struct FnTask<O> {
    kind: &'static str,
    f: TaskClosure<O>,
}

impl<O: Clone + Send + Sync + 'static> FnTask<O> {
    pub fn new<F, Fut>(kind: &'static str, f: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, TaskError>> + Send + 'static,
    {
        Self {
            kind,
            f: Box::new(move |ctx| Box::pin(f(ctx))),
        }
    }
}

#[async_trait]
impl<O: Clone + Send + Sync + 'static> Task for FnTask<O> {
    type Output = O;

    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<O, TaskError> {
        (self.f)(ctx.clone()).await
    }
}

impl<O> std::fmt::Debug for FnTask<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTask").field("kind", &self.kind).finish()
    }
}
