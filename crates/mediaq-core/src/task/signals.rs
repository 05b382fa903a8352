//! ライフサイクル signal と observer 登録
//!
//! task ごとに 4 つの signal がある: `start`, `progress`, `error`, `end`。
//!
//! ルール:
//! - `start` は高々 1 回。
//! - observer から見た `progress` の percent は減らない（戻った値は
//!   直前に届けた percent に丸める）。
//! - `error` と `end` は排他で、高々 1 回。その後は何も届かない。
//! - 1 task の発火は直列化される。observer は一覧の lock の外で呼ぶので、
//!   observer の中から別の observer を登録してよい。
//! - replay はしない。発火後に登録した observer には届かない。

use std::sync::{Arc, Mutex};

use crate::domain::progress::clamp_percent;
use crate::domain::{Progress, TaskId};
use crate::error::TaskError;
use crate::sync::lock;

pub type StartObserver = Arc<dyn Fn(TaskId, &str) + Send + Sync>;
pub type ProgressObserver = Arc<dyn Fn(TaskId, &Progress) + Send + Sync>;
pub type ErrorObserver = Arc<dyn Fn(TaskId, &TaskError) + Send + Sync>;
pub type EndObserver<O> = Arc<dyn Fn(TaskId, &O) + Send + Sync>;

#[derive(Default)]
struct Observers {
    start: Vec<StartObserver>,
    progress: Vec<ProgressObserver>,
    error: Vec<ErrorObserver>,
}

#[derive(Debug, Default)]
struct Emission {
    started: bool,
    last_percent: Option<f64>,
    terminated: bool,
}

/// signal のうち出力型に依存しない半分
///
/// 出力型でジェネリックでない `TaskContext` と共有する。
pub(crate) struct Lifecycle {
    id: TaskId,
    observers: Mutex<Observers>,
    emission: Mutex<Emission>,
}

impl Lifecycle {
    fn new(id: TaskId) -> Self {
        Self {
            id,
            observers: Mutex::new(Observers::default()),
            emission: Mutex::new(Emission::default()),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn emit_start(&self, context: &str) {
        let mut emission = lock(&self.emission);
        if emission.started || emission.terminated {
            return;
        }
        emission.started = true;

        let observers = lock(&self.observers).start.clone();
        for observer in &observers {
            observer(self.id, context);
        }
    }

    pub(crate) fn emit_progress(&self, mut progress: Progress) {
        let mut emission = lock(&self.emission);
        if emission.terminated {
            return;
        }

        progress.percent = clamp_percent(progress.percent);
        if let Some(last) = emission.last_percent
            && progress.percent < last
        {
            progress.percent = last;
        }
        emission.last_percent = Some(progress.percent);

        let observers = lock(&self.observers).progress.clone();
        for observer in &observers {
            observer(self.id, &progress);
        }
    }

    /// 発火 lock の下で `deliver` を 1 回呼び、signal を閉じる。
    /// 既に閉じていれば `false`。
    fn terminate(&self, deliver: impl FnOnce()) -> bool {
        let mut emission = lock(&self.emission);
        if emission.terminated {
            return false;
        }
        emission.terminated = true;
        deliver();
        true
    }

    fn error_observers(&self) -> Vec<ErrorObserver> {
        lock(&self.observers).error.clone()
    }
}

/// task 1 件分の observer 登録簿
pub struct Signals<O> {
    lifecycle: Arc<Lifecycle>,
    end: Mutex<Vec<EndObserver<O>>>,
}

impl<O> Signals<O> {
    pub(crate) fn new(id: TaskId) -> Self {
        Self {
            lifecycle: Arc::new(Lifecycle::new(id)),
            end: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn lifecycle(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.lifecycle)
    }

    pub fn on_start(&self, observer: impl Fn(TaskId, &str) + Send + Sync + 'static) {
        lock(&self.lifecycle.observers).start.push(Arc::new(observer));
    }

    pub fn on_progress(&self, observer: impl Fn(TaskId, &Progress) + Send + Sync + 'static) {
        lock(&self.lifecycle.observers)
            .progress
            .push(Arc::new(observer));
    }

    pub fn on_error(&self, observer: impl Fn(TaskId, &TaskError) + Send + Sync + 'static) {
        lock(&self.lifecycle.observers).error.push(Arc::new(observer));
    }

    pub fn on_end(&self, observer: impl Fn(TaskId, &O) + Send + Sync + 'static) {
        lock(&self.end).push(Arc::new(observer));
    }

    /// `outcome` に応じた終端 signal を届ける。成功なら `end`、失敗なら `error`。
    /// 効くのは最初の 1 回だけ。
    pub(crate) fn finish(&self, outcome: &Result<O, TaskError>) -> bool {
        let id = self.lifecycle.id;
        self.lifecycle.terminate(|| match outcome {
            Ok(output) => {
                let observers = lock(&self.end).clone();
                for observer in &observers {
                    observer(id, output);
                }
            }
            Err(err) => {
                for observer in &self.lifecycle.error_observers() {
                    observer(id, err);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use ulid::Ulid;

    fn signals() -> Signals<String> {
        Signals::new(TaskId::from_ulid(Ulid::new()))
    }

    #[test]
    fn start_is_delivered_once() {
        let signals = signals();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        signals.on_start(move |_, ctx| sink.lock().unwrap().push(ctx.to_string()));

        let lifecycle = signals.lifecycle();
        lifecycle.emit_start("ffmpeg -i a.mp4");
        lifecycle.emit_start("again");

        assert_eq!(*seen.lock().unwrap(), vec!["ffmpeg -i a.mp4".to_string()]);
    }

    #[test]
    fn progress_never_goes_backwards() {
        let signals = signals();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        signals.on_progress(move |_, p| sink.lock().unwrap().push(p.percent));

        let lifecycle = signals.lifecycle();
        for pct in [10.0, 30.0, 20.0, 120.0] {
            lifecycle.emit_progress(Progress::percent(pct));
        }

        assert_eq!(*seen.lock().unwrap(), vec![10.0, 30.0, 30.0, 100.0]);
    }

    #[test]
    fn end_and_error_are_exclusive() {
        let signals = signals();
        let ends = Arc::new(StdMutex::new(Vec::new()));
        let errors = Arc::new(StdMutex::new(Vec::new()));
        {
            let ends = Arc::clone(&ends);
            signals.on_end(move |_, out: &String| ends.lock().unwrap().push(out.clone()));
        }
        {
            let errors = Arc::clone(&errors);
            signals.on_error(move |_, e| errors.lock().unwrap().push(e.clone()));
        }

        assert!(signals.finish(&Err(TaskError::failed("boom"))));
        assert!(!signals.finish(&Ok("late".to_string())));

        assert!(ends.lock().unwrap().is_empty());
        assert_eq!(*errors.lock().unwrap(), vec![TaskError::failed("boom")]);
    }

    #[test]
    fn nothing_is_delivered_after_terminal_signal() {
        let signals = signals();
        let progress = Arc::new(StdMutex::new(0usize));
        let sink = Arc::clone(&progress);
        signals.on_progress(move |_, _| *sink.lock().unwrap() += 1);

        signals.finish(&Ok("done".to_string()));
        signals.lifecycle().emit_progress(Progress::percent(50.0));

        assert_eq!(*progress.lock().unwrap(), 0);
    }

    #[test]
    fn late_observers_get_no_replay() {
        let signals = signals();
        signals.lifecycle().emit_start("early");

        let seen = Arc::new(StdMutex::new(0usize));
        let sink = Arc::clone(&seen);
        signals.on_start(move |_, _| *sink.lock().unwrap() += 1);

        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn observer_may_register_another_observer() {
        let signals = Arc::new(signals());
        let inner = Arc::clone(&signals);
        signals.on_start(move |_, _| inner.on_progress(|_, _| {}));

        signals.lifecycle().emit_start("ok");
        assert_eq!(lock(&signals.lifecycle.observers).progress.len(), 1);
    }
}
