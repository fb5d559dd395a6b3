//! Ports - 抽象化レイヤー
//!
//! engine の外側にいるコラボレータ（job の実処理、時刻、イベント通知）との
//! 境界を trait で定義します。

pub mod clock;
pub mod executor;
pub mod observer;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::executor::{FnExecutor, JobExecutor};
pub use self::observer::{NoopObserver, TaskObserver};
