//! 重定向
//!
//! - bone_map: 源骨骼名 -> 规范名与轴向修正
//! - twist: 手臂扭转修正
//! - bone_role: 按规范名决定平移处理方式
//! - source_motion: 各格式统一为规范轨道
//! - retargeter: 绑定到目标骨骼

mod bone_map;
mod bone_role;
mod retargeter;
mod source_motion;
mod twist;

pub use bone_map::{quat_to_axis_angle, BoneMapSelection, BoneMapSet, BoneMapTable, HIPS};
pub use bone_role::{role_of, translation_rule, BoneRole, TranslationRule};
pub use retargeter::{RetargetedClip, Retargeter, TargetRig};
pub use source_motion::{SourceKind, SourceMotion, CAMERA, CAMERA_TARGET};
pub use twist::{TwistPreset, TwistRule, TwistTable};
