//! IK 链模型
//!
//! 目标模型没有 IK 骨骼，加载时为双腿合成：
//! - `*FootIKParent`：位于脚踝的 (x, z)，y = 0，挂在根骨骼下
//! - `*FootIK`：相对父骨骼只有竖直偏移，到达脚踝高度
//! - `*ToeIK`：相对脚 IK 的脚尖偏移

use std::collections::HashMap;
use std::f32::consts::PI;

use glam::Vec3;

use crate::config::RetargetConfig;
use crate::Result;

use super::bone_link::{BoneFlags, BoneLink};
use super::bone_set::{BoneSet, HumanoidMap};

// ============================================================================
// 链定义
// ============================================================================

/// IK 链节点
#[derive(Clone, Debug, PartialEq)]
pub struct IkLink {
    /// 规范骨骼名
    pub bone: String,
    pub enabled: bool,
    /// 欧拉角下限（XYZ）
    pub rotation_min: Option<Vec3>,
    /// 欧拉角上限（XYZ）
    pub rotation_max: Option<Vec3>,
    /// 旋转轴限制
    pub limitation: Option<Vec3>,
}

impl IkLink {
    pub fn new(bone: impl Into<String>) -> Self {
        Self {
            bone: bone.into(),
            enabled: false,
            rotation_min: None,
            rotation_max: None,
            limitation: None,
        }
    }

    pub fn with_limits(mut self, min: Vec3, max: Vec3) -> Self {
        self.rotation_min = Some(min);
        self.rotation_max = Some(max);
        self
    }
}

/// IK 链
#[derive(Clone, Debug, PartialEq)]
pub struct IkChain {
    /// IK 目标骨骼
    pub target: String,
    /// 末端骨骼（规范名）
    pub effector: String,
    /// 最大迭代次数
    pub iteration: u32,
    /// 按求解顺序排列
    pub links: Vec<IkLink>,
    /// 单步角度下限（弧度）
    pub min_angle: Option<f32>,
    /// 单步角度上限（弧度）
    pub max_angle: Option<f32>,
}

impl IkChain {
    /// 腿部 IK 链（默认全部关闭，由动作数据开启）
    pub fn default_leg_chains(config: &RetargetConfig) -> Vec<Self> {
        let mut chains = Vec::with_capacity(4);
        for side in ["Right", "Left"] {
            chains.push(Self {
                target: format!("{side}FootIK"),
                effector: format!("{side}Foot"),
                iteration: config.foot_ik_iterations,
                links: vec![
                    // 膝盖只能绕 X 轴向后弯曲
                    IkLink::new(format!("{side}LowerLeg"))
                        .with_limits(Vec3::new(-PI, 0.0, 0.0), Vec3::ZERO),
                    IkLink::new(format!("{side}UpperLeg")),
                ],
                min_angle: Some(-2.0),
                max_angle: None,
            });
            chains.push(Self {
                target: format!("{side}ToeIK"),
                effector: format!("{side}Toes"),
                iteration: config.toe_ik_iterations,
                links: vec![IkLink::new(format!("{side}Foot"))],
                min_angle: Some(-4.0),
                max_angle: None,
            });
        }
        chains
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        for link in &mut self.links {
            link.enabled = enabled;
        }
    }

    /// 任一节点启用即视为启用
    pub fn is_enabled(&self) -> bool {
        self.links.iter().any(|l| l.enabled)
    }
}

// ============================================================================
// IK 骨骼合成
// ============================================================================

/// 合成 IK 骨骼的局部偏移
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IkOffsets {
    offsets: HashMap<String, Vec3>,
}

impl IkOffsets {
    pub fn get(&self, name: &str) -> Option<Vec3> {
        self.offsets.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Vec3)> {
        self.offsets.iter().map(|(k, v)| (k.as_str(), *v))
    }

    fn record(&mut self, skeleton: &BoneSet, name: &str) {
        if let Some(bone) = skeleton.bone(name) {
            self.offsets.insert(name.to_string(), bone.rest_position);
        }
    }
}

/// 根骨骼：髋部所在树的顶端
fn tree_root(skeleton: &BoneSet, mut index: usize) -> usize {
    while let Some(parent) = skeleton.parent(index) {
        index = parent;
    }
    index
}

/// 为双腿添加 IK 骨骼，返回各 IK 骨骼的局部偏移
///
/// 已存在的 IK 骨骼不会重复添加；缺少脚踝的一侧跳过。
pub fn add_ik_rig(skeleton: &mut BoneSet, names: &HumanoidMap) -> Result<IkOffsets> {
    let hips = skeleton.require(names.resolve("Hips"))?;
    let root = tree_root(skeleton, hips);
    let mut offsets = IkOffsets::default();

    for side in ["Right", "Left"] {
        let parent_name = format!("{side}FootIKParent");
        let ik_name = format!("{side}FootIK");
        let toe_name = format!("{side}ToeIK");

        if skeleton.find(&ik_name).is_none() {
            let Some(foot) = skeleton.find_humanoid(names, &format!("{side}Foot")) else {
                log::warn!("No {}Foot bone, skipping {} rig", side, ik_name);
                continue;
            };
            let foot_offset = skeleton.chain_offset(Some(root), foot);

            // BVH 末端节点优先，否则使用脚尖骨骼本身
            let toes = names.resolve(&format!("{side}Toes")).to_string();
            let toe_offset = skeleton
                .find(&format!("{toes}_end"))
                .or_else(|| skeleton.find(&toes))
                .map_or(foot_offset, |i| skeleton.chain_offset(Some(root), i));

            let parent = skeleton.add_bone(
                BoneLink::new(
                    parent_name.as_str(),
                    Some(root),
                    Vec3::new(foot_offset.x, 0.0, foot_offset.z),
                )
                .with_flags(BoneFlags::SYNTHETIC | BoneFlags::IK),
            )?;
            let ik = skeleton.add_bone(
                BoneLink::new(ik_name.as_str(), Some(parent), Vec3::new(0.0, foot_offset.y, 0.0))
                    .with_flags(BoneFlags::SYNTHETIC | BoneFlags::IK),
            )?;
            skeleton.add_bone(
                BoneLink::new(
                    toe_name.as_str(),
                    Some(ik),
                    Vec3::new(
                        -foot_offset.x + toe_offset.x,
                        -foot_offset.y,
                        -foot_offset.z + toe_offset.z,
                    ),
                )
                .with_flags(BoneFlags::SYNTHETIC | BoneFlags::IK),
            )?;
        }

        offsets.record(skeleton, &parent_name);
        offsets.record(skeleton, &ik_name);
        offsets.record(skeleton, &toe_name);
    }

    log::debug!("IK rig ready: {} IK bones", offsets.len());
    Ok(offsets)
}
