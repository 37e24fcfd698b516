//! 附加骨骼
//!
//! 目标模型缺少 MMD 的 Center / Groove / Waist 与手臂扭转骨骼，加载时补齐：
//! Root -> Center -> Groove -> Waist -> Hips
//!                                  -> Spine
//! UpperArm -> ArmTwist -> LowerArm -> HandTwist -> Hand

use glam::Vec3;

use crate::Result;

use super::bone_link::{BoneFlags, BoneLink};
use super::bone_set::{BoneSet, HumanoidMap};

pub const ROOT: &str = "Root";
pub const CENTER: &str = "Center";
pub const GROOVE: &str = "Groove";
pub const WAIST: &str = "Waist";

/// 静止姿态下的关键偏移（修改骨骼树之前计算）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RigOffsets {
    /// 髋部相对父骨骼的偏移
    pub hips: Vec3,
    /// 髋部到脚踝
    pub left_foot: Vec3,
    pub right_foot: Vec3,
    /// 脚踝到脚尖
    pub left_toes: Vec3,
    pub right_toes: Vec3,
}

impl RigOffsets {
    pub fn from_skeleton(skeleton: &BoneSet, names: &HumanoidMap) -> Result<Self> {
        let hips = skeleton.require(names.resolve("Hips"))?;
        let find = |canonical: &str| skeleton.find_humanoid(names, canonical);

        let foot_offset = |foot: &str| find(foot).map_or(Vec3::ZERO, |i| skeleton.chain_offset(Some(hips), i));
        let toes_offset = |foot: &str, toes: &str| match (find(foot), find(toes)) {
            (Some(f), Some(t)) => skeleton.chain_offset(Some(f), t),
            _ => Vec3::ZERO,
        };

        Ok(Self {
            hips: skeleton.chain_offset(Some(hips), hips),
            left_foot: foot_offset("LeftFoot"),
            right_foot: foot_offset("RightFoot"),
            left_toes: toes_offset("LeftFoot", "LeftToes"),
            right_toes: toes_offset("RightFoot", "RightToes"),
        })
    }
}

/// 确保髋部之上有一个根骨骼，返回根骨骼索引
fn ensure_root(skeleton: &mut BoneSet, hips: usize) -> Result<usize> {
    if let Some(parent) = skeleton.parent(hips) {
        let mut root = parent;
        while let Some(p) = skeleton.parent(root) {
            root = p;
        }
        return Ok(root);
    }
    let root = skeleton.add_bone(BoneLink::new(ROOT, None, Vec3::ZERO).with_flags(BoneFlags::SYNTHETIC))?;
    skeleton.set_parent(hips, Some(root))?;
    Ok(root)
}

/// 添加 Center / Groove / Waist 与扭转骨骼
///
/// 已存在 Center 时视为已添加，返回 false。
pub fn add_extra_rig(skeleton: &mut BoneSet, names: &HumanoidMap, offsets: &RigOffsets) -> Result<bool> {
    if skeleton.find(CENTER).is_some() {
        return Ok(false);
    }

    let hips = skeleton.require(names.resolve("Hips"))?;
    let root = ensure_root(skeleton, hips)?;

    let center = skeleton.add_bone(
        BoneLink::new(CENTER, Some(root), offsets.hips).with_flags(BoneFlags::SYNTHETIC),
    )?;
    let groove = skeleton.add_bone(
        BoneLink::new(GROOVE, Some(center), Vec3::ZERO).with_flags(BoneFlags::SYNTHETIC),
    )?;
    let waist = skeleton.add_bone(
        BoneLink::new(WAIST, Some(groove), Vec3::ZERO).with_flags(BoneFlags::SYNTHETIC),
    )?;

    // 髋部与脊柱挂到 Waist 下
    skeleton.set_parent(hips, Some(waist))?;
    skeleton.set_rest_position(hips, Vec3::ZERO);
    if let Some(spine) = skeleton.find_humanoid(names, "Spine") {
        if skeleton.parent(spine) == Some(hips) {
            skeleton.set_parent(spine, Some(waist))?;
        }
    }

    for side in ["Left", "Right"] {
        add_twist(
            skeleton,
            names,
            &format!("{side}UpperArm"),
            &format!("{side}LowerArm"),
            &format!("{side}ArmTwist"),
        )?;
        add_twist(
            skeleton,
            names,
            &format!("{side}LowerArm"),
            &format!("{side}Hand"),
            &format!("{side}HandTwist"),
        )?;
    }

    log::debug!("Extra rig added: {} bones", skeleton.len());
    Ok(true)
}

/// 在 parent 与 child 之间插入扭转骨骼，位置取 child 的静止偏移
fn add_twist(
    skeleton: &mut BoneSet,
    names: &HumanoidMap,
    parent: &str,
    child: &str,
    twist: &str,
) -> Result<()> {
    let (Some(parent), Some(child)) = (
        skeleton.find_humanoid(names, parent),
        skeleton.find_humanoid(names, child),
    ) else {
        log::debug!("Skipping twist bone {}: arm bones missing", twist);
        return Ok(());
    };

    let offset = skeleton.bones()[child].rest_position;
    let twist = skeleton.add_bone(
        BoneLink::new(twist, Some(parent), offset).with_flags(BoneFlags::SYNTHETIC | BoneFlags::TWIST),
    )?;
    skeleton.set_parent(child, Some(twist))?;
    skeleton.set_rest_position(child, Vec3::ZERO);
    Ok(())
}
