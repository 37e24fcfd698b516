//! 骨骼系统
//!
//! 核心设计思想：
//! - BoneLink: 单个骨骼节点，只保存静态数据
//! - BoneSet: 骨骼树，支持运行时添加骨骼与重新挂接
//! - Pose: 每帧的局部变换与世界矩阵，由更新流程独占
//! - IkChain / CcdSolver: 合成的腿部 IK 与 CCD 求解

mod bone_link;
mod bone_set;
mod extra_rig;
mod ik_chain;
mod ik_solver;
mod pose;

pub use bone_link::{BoneFlags, BoneLink, Channel};
pub use bone_set::{BoneSet, HumanoidMap, Skeleton};
pub use extra_rig::{add_extra_rig, RigOffsets, CENTER, GROOVE, ROOT, WAIST};
pub use ik_chain::{add_ik_rig, IkChain, IkLink, IkOffsets};
pub use ik_solver::{CcdSolver, SolveReport};
pub use pose::Pose;
