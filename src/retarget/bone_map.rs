//! 骨骼映射表
//!
//! 每种源格式一张表：源骨骼名 -> 规范名，外加轴向修正向量 [sx, sy, sz, sAngle]。
//! 映射表作为参数显式传入编解码器与重定向器，不存在全局的“当前映射表”。

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use glam::{Quat, Vec3};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::config::{get_config, RetargetConfig};
use crate::{MotionError, Result, RetargetWarning};

use super::twist::TwistTable;

/// 根骨骼（骨盆）的规范名称
pub const HIPS: &str = "Hips";

/// 内置映射表
const BUILTIN_MAPS: &str = include_str!("../../maps/bone_maps.json");

static IDENTITY_MAP: Lazy<BoneMapTable> = Lazy::new(BoneMapTable::identity);

fn identity_adjust() -> [f32; 4] {
    [1.0, 1.0, 1.0, 1.0]
}

/// 骨骼映射表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneMapTable {
    pub name: String,
    /// 源骨骼名 -> 规范名
    #[serde(default)]
    pub bones: HashMap<String, String>,
    /// 源表情名 -> 规范名
    #[serde(default)]
    pub morphs: HashMap<String, String>,
    /// [sx, sy, sz, sAngle]
    #[serde(default = "identity_adjust")]
    pub adjust: [f32; 4],
    #[serde(default)]
    pub twist: TwistTable,
}

impl BoneMapTable {
    /// 恒等映射：名称直通，不做轴向修正
    pub fn identity() -> Self {
        Self {
            name: "Identity".to_string(),
            bones: HashMap::new(),
            morphs: HashMap::new(),
            adjust: identity_adjust(),
            twist: TwistTable::default(),
        }
    }

    pub fn is_identity_adjust(&self) -> bool {
        self.adjust == identity_adjust()
    }

    /// 查找规范名
    pub fn canonical_name(&self, source: &str) -> Option<&str> {
        self.bones.get(source).map(String::as_str)
    }

    /// 规范名，不在表中时直通源名称
    pub fn resolve<'a>(&'a self, source: &'a str) -> &'a str {
        self.canonical_name(source).unwrap_or(source)
    }

    /// 规范名，不在表中时直通并记录警告
    pub fn resolve_logged(&self, source: &str, warnings: &mut Vec<RetargetWarning>) -> String {
        match self.canonical_name(source) {
            Some(name) => name.to_string(),
            None => {
                if !self.bones.is_empty() {
                    warnings.push(
                        RetargetWarning::UnmappedBone {
                            name: source.to_string(),
                        }
                        .logged(),
                    );
                }
                source.to_string()
            }
        }
    }

    pub fn morph_name(&self, source: &str) -> Option<&str> {
        self.morphs.get(source).map(String::as_str)
    }

    #[inline]
    fn axis_scale(&self) -> Vec3 {
        Vec3::new(self.adjust[0], self.adjust[1], self.adjust[2])
    }

    /// 位置按 [sx, sy, sz] 逐分量缩放
    #[inline]
    pub fn adjust_position(&self, v: Vec3) -> Vec3 {
        v * self.axis_scale()
    }

    /// 旋转转为轴角，轴按 [sx, sy, sz] 缩放后归一化，角度乘 sAngle
    pub fn adjust_rotation(&self, q: Quat) -> Quat {
        let (axis, angle) = quat_to_axis_angle(q);
        let axis = (axis * self.axis_scale()).normalize_or_zero();
        if axis == Vec3::ZERO {
            return Quat::IDENTITY;
        }
        Quat::from_axis_angle(axis, angle * self.adjust[3])
    }

    /// 轴向修正后再做扭转修正
    pub fn adjust_bone_rotation(&self, canonical: &str, q: Quat) -> Quat {
        self.twist.apply(canonical, self.adjust_rotation(q))
    }
}

/// 四元数转轴角
///
/// 接近恒等时 (sin(θ/2) < 0.001) 不做除法，直接使用虚部作为轴。
pub fn quat_to_axis_angle(q: Quat) -> (Vec3, f32) {
    let w = (q.w as f64).clamp(-1.0, 1.0);
    let angle = 2.0 * w.acos();
    let s = (1.0 - w * w).sqrt();
    let xyz = [q.x as f64, q.y as f64, q.z as f64];
    let axis = if s < 0.001 {
        xyz
    } else {
        [xyz[0] / s, xyz[1] / s, xyz[2] / s]
    };
    (
        Vec3::new(axis[0] as f32, axis[1] as f32, axis[2] as f32),
        angle as f32,
    )
}

/// 映射表检测结果
#[derive(Debug, Clone)]
pub struct BoneMapSelection<'a> {
    pub table: &'a BoneMapTable,
    pub warning: Option<RetargetWarning>,
}

/// 映射表集合（顺序即检测优先级）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoneMapSet {
    pub maps: Vec<BoneMapTable>,
}

impl BoneMapSet {
    pub fn new(maps: Vec<BoneMapTable>) -> Self {
        Self { maps }
    }

    /// 随库发布的映射表（Vocaloid、BVH、Mixamo），扭转角度取全局配置
    pub fn builtin() -> Result<Self> {
        Self::from_json_str(BUILTIN_MAPS)
    }

    pub fn builtin_with(config: &RetargetConfig) -> Result<Self> {
        Self::from_json_str_with(BUILTIN_MAPS, config)
    }

    /// 解析 `{"maps": [...]}` 格式的 JSON
    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::from_json_str_with(text, &get_config())
    }

    /// 解析 JSON 并按 `config.twist_degrees` 展开扭转预设
    pub fn from_json_str_with(text: &str, config: &RetargetConfig) -> Result<Self> {
        let mut set: Self = serde_json::from_str(text)
            .map_err(|e| MotionError::BoneMap(format!("Failed to parse bone maps: {}", e)))?;
        for map in &mut set.maps {
            map.twist.expand_preset(config.twist_degrees);
        }
        Ok(set)
    }

    /// 从文件加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let set = Self::from_json_str(&text)?;
        log::info!(
            "Loaded {} bone maps from {}",
            set.maps.len(),
            path.as_ref().display()
        );
        Ok(set)
    }

    pub fn get(&self, name: &str) -> Option<&BoneMapTable> {
        self.maps.iter().find(|m| m.name == name)
    }

    /// 按名称取表，不存在时返回错误
    pub fn require(&self, name: &str) -> Result<&BoneMapTable> {
        self.get(name)
            .ok_or_else(|| MotionError::BoneMap(format!("Bone map '{}' not found", name)))
    }

    pub fn push(&mut self, table: BoneMapTable) {
        self.maps.push(table);
    }

    /// 根据根骨骼名称选择映射表
    ///
    /// 取第一张把根骨骼映射为 Hips 的表；多张匹配时记录歧义警告，
    /// 没有匹配时使用恒等映射并记录警告。
    pub fn detect(&self, root_name: &str) -> BoneMapSelection<'_> {
        let candidates: Vec<&BoneMapTable> = self
            .maps
            .iter()
            .filter(|m| m.canonical_name(root_name) == Some(HIPS))
            .collect();

        match candidates.as_slice() {
            [] => BoneMapSelection {
                table: &IDENTITY_MAP,
                warning: Some(
                    RetargetWarning::NoBoneMap {
                        root: root_name.to_string(),
                    }
                    .logged(),
                ),
            },
            [only] => BoneMapSelection {
                table: only,
                warning: None,
            },
            [first, ..] => BoneMapSelection {
                table: first,
                warning: Some(
                    RetargetWarning::AmbiguousBoneMap {
                        root: root_name.to_string(),
                        chosen: first.name.clone(),
                        candidates: candidates.iter().map(|m| m.name.clone()).collect(),
                    }
                    .logged(),
                ),
            },
        }
    }
}
