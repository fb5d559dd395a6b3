//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **ExecutorRegistry**: job name で JobExecutor を切り替える dispatcher

pub mod executor_registry;

pub use self::executor_registry::{ExecutorRegistry, RegistryError};
