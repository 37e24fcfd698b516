//! 表情系统
//!
//! 动作轨道直接写入表情权重；手动触发的表情由 MorphPlayer 淡入淡出。

mod player;

pub use player::{MorphPlayer, MorphState};
