//! 动作捕获重定向运行时
//!
//! 读取 BVH / VMD 动作文件，将源骨骼的命名、坐标轴与比例转换到目标骨骼，
//! 并在播放时通过 CCD 求解脚部 IK。
//!
//! 模块划分：
//! - animation: 编解码器、关键帧轨道、贝塞尔缓动、混合播放
//! - retarget: 骨骼映射表、扭转修正、重定向
//! - skeleton: 骨骼树、姿态、附加骨骼、IK 链与求解器
//! - morph: 表情淡入淡出
//! - actor: 每帧更新入口
//! - library: 并发加载

pub mod actor;
pub mod animation;
pub mod config;
pub mod library;
pub mod morph;
pub mod retarget;
pub mod skeleton;

use thiserror::Error;

pub use actor::Actor;
pub use animation::{AnimationClip, AnimationTrack, BezierCurve, BvhFile, VmdFile};
pub use config::{get_config, reset_config, set_config, RetargetConfig};
pub use library::MotionLibrary;
pub use retarget::{BoneMapSet, BoneMapTable, RetargetedClip, Retargeter, SourceMotion, TargetRig};
pub use skeleton::{CcdSolver, IkChain, Pose, Skeleton};

/// 编解码错误（只影响单个文件的加载）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Truncated buffer in {section} section: need {needed} bytes, have {available}")]
    TruncatedBuffer {
        section: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Malformed hierarchy at line {line}: {message}")]
    MalformedHierarchy { line: usize, message: String },

    #[error("Invalid numeric value '{token}' at line {line}")]
    InvalidNumeric { line: usize, token: String },
}

/// 运行时错误
#[derive(Error, Debug)]
pub enum MotionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Bone map error: {0}")]
    BoneMap(String),

    #[error("Skeleton error: {0}")]
    Skeleton(String),

    #[error("Clip unavailable: {0}")]
    ClipUnavailable(String),
}

pub type Result<T> = std::result::Result<T, MotionError>;

/// 重定向警告：不中断处理，使用恒等映射或直通名称继续
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetargetWarning {
    /// 源骨骼在映射表中不存在，按原名直通
    #[error("unmapped bone '{name}' passed through")]
    UnmappedBone { name: String },

    /// 多个映射表都能把根骨骼解析为 Hips，取第一个
    #[error(
        "root '{root}' matches {} bone maps ({}), using '{chosen}'",
        .candidates.len(),
        .candidates.join(", ")
    )]
    AmbiguousBoneMap { root: String, chosen: String, candidates: Vec<String> },

    /// 没有映射表匹配，使用恒等映射
    #[error("no bone map resolves root '{root}' to Hips, using identity")]
    NoBoneMap { root: String },

    /// 源髋部高度接近 0，比例按 1 处理
    #[error("source hip height {height} is degenerate, scale forced to 1")]
    DegenerateHipHeight { height: f32 },

    /// 同一时刻出现重复关键帧，后写入者生效
    #[error("duplicate keyframe at {time}s on '{track}', last write wins")]
    DuplicateKeyframe { track: String, time: f32 },
}

impl RetargetWarning {
    /// 写入日志并返回自身，便于收集
    pub(crate) fn logged(self) -> Self {
        match &self {
            Self::UnmappedBone { .. } => log::debug!("{}", self),
            _ => log::warn!("{}", self),
        }
        self
    }
}
