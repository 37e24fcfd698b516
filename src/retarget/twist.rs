//! 扭转修正表
//!
//! 源模型与目标模型的肘部扭转轴不同，手臂、手指需要额外的固定旋转：
//! `q' = R(pre) * q * R(post)`，R 为绕参考轴的旋转，角度以度表示。
//! 映射表可以只声明预设，角度在加载时由 `RetargetConfig::twist_degrees` 决定。

use std::collections::HashMap;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// 单个骨骼的扭转修正（度）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TwistRule {
    #[serde(default)]
    pub pre: f32,
    #[serde(default)]
    pub post: f32,
}

/// 预设规则集
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwistPreset {
    /// 见 [`TwistTable::vocaloid_arms`]
    VocaloidArms,
}

/// 扭转修正表（按规范骨骼名称索引）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwistTable {
    /// 参考轴
    #[serde(default = "default_axis")]
    pub axis: [f32; 3],
    /// 尚未展开的预设
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<TwistPreset>,
    /// 显式规则，覆盖预设中的同名骨骼
    #[serde(default)]
    pub rules: HashMap<String, TwistRule>,
}

fn default_axis() -> [f32; 3] {
    [0.0, 0.0, 1.0]
}

impl Default for TwistTable {
    fn default() -> Self {
        Self {
            axis: default_axis(),
            preset: None,
            rules: HashMap::new(),
        }
    }
}

/// 前后都要修正的左侧骨骼
const LEFT_CHAIN: &[&str] = &[
    "LeftLowerArm",
    "LeftHand",
    "LeftThumb1",
    "LeftThumb2",
    "LeftThumb3",
    "LeftIndex1",
    "LeftIndex2",
    "LeftIndex3",
    "LeftMiddle1",
    "LeftMiddle2",
    "LeftMiddle3",
    "LeftRing1",
    "LeftRing2",
    "LeftRing3",
    "LeftLittle1",
    "LeftLittle2",
    "LeftLittle3",
    "LeftArmTwist",
    "LeftHandTwist",
];

impl TwistTable {
    /// MMD 标准模型（A 字姿态）到 T 字姿态目标的手臂修正
    ///
    /// 上臂只做后乘；下臂、手、手指、扭转骨骼前后对称修正，右侧角度取反。
    pub fn vocaloid_arms(degrees: f32) -> Self {
        let mut rules = HashMap::new();
        rules.insert("LeftUpperArm".to_string(), TwistRule { pre: 0.0, post: degrees });
        rules.insert("RightUpperArm".to_string(), TwistRule { pre: 0.0, post: -degrees });
        for left in LEFT_CHAIN {
            rules.insert(left.to_string(), TwistRule { pre: -degrees, post: degrees });
            let right = left.replacen("Left", "Right", 1);
            rules.insert(right, TwistRule { pre: degrees, post: -degrees });
        }
        Self {
            axis: default_axis(),
            preset: None,
            rules,
        }
    }

    /// 按给定角度展开预设，显式规则优先
    pub fn expand_preset(&mut self, degrees: f32) {
        let Some(preset) = self.preset.take() else {
            return;
        };
        let mut rules = match preset {
            TwistPreset::VocaloidArms => Self::vocaloid_arms(degrees).rules,
        };
        rules.extend(self.rules.drain());
        self.rules = rules;
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule(&self, canonical: &str) -> Option<&TwistRule> {
        self.rules.get(canonical)
    }

    /// 应用扭转修正，表中没有的骨骼原样返回
    pub fn apply(&self, canonical: &str, rotation: Quat) -> Quat {
        let Some(rule) = self.rules.get(canonical) else {
            return rotation;
        };
        let axis = Vec3::from_array(self.axis).normalize_or_zero();
        if axis == Vec3::ZERO {
            return rotation;
        }
        let pre = Quat::from_axis_angle(axis, rule.pre.to_radians());
        let post = Quat::from_axis_angle(axis, rule.post.to_radians());
        pre * rotation * post
    }
}
