//! 运行层：单轮执行、回合循环与任务生命周期

pub mod context;
pub mod loop_;
pub mod observer;
pub mod turn;

pub use context::{RunOutcome, TaskRun};
pub use loop_::{TaskRunner, DEFAULT_MAX_ROUNDS};
pub use observer::{ConsoleObserver, ObserverEvent, RecordingObserver, RunObserver};
pub use turn::TurnExecutor;
