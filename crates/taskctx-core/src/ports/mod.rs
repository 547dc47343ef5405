//! Ports - 抽象化レイヤー
//!
//! 投入 API が外部から受け取る協力者を trait として定義します。
//! 実装は `impls` にあり、テストでは差し替えられます。

pub mod clock;
pub mod id_generator;
pub mod scheduler;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::scheduler::{BlockingWork, BoxWork, Scheduler};
