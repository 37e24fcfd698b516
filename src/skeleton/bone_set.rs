//! 骨骼集合
//!
//! 以数组保存骨骼树，按名称精确查找，支持运行时添加骨骼与重新挂接父骨骼。

use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{MotionError, Result};

use super::bone_link::{BoneFlags, BoneLink};

/// 规范名 -> 目标模型骨骼名
///
/// 不在表中的规范名按原名查找（合成骨骼直接使用规范名）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HumanoidMap {
    names: HashMap<String, String>,
}

impl HumanoidMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, canonical: impl Into<String>, target: impl Into<String>) {
        self.names.insert(canonical.into(), target.into());
    }

    pub fn resolve<'a>(&'a self, canonical: &'a str) -> &'a str {
        self.names.get(canonical).map_or(canonical, String::as_str)
    }

    pub fn contains(&self, canonical: &str) -> bool {
        self.names.contains_key(canonical)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HumanoidMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            names: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// 骨骼集合
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoneSet {
    bones: Vec<BoneLink>,
    name_to_index: HashMap<String, usize>,
}

impl BoneSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加骨骼，返回索引
    pub fn add_bone(&mut self, mut bone: BoneLink) -> Result<usize> {
        if self.name_to_index.contains_key(&bone.name) {
            return Err(MotionError::Skeleton(format!("Duplicate bone name '{}'", bone.name)));
        }
        if let Some(parent) = bone.parent {
            if parent >= self.bones.len() {
                return Err(MotionError::Skeleton(format!(
                    "Parent index {} out of range for bone '{}'",
                    parent, bone.name
                )));
            }
        }

        let index = self.bones.len();
        bone.children.clear();
        if let Some(parent) = bone.parent {
            self.bones[parent].children.push(index);
        }
        self.name_to_index.insert(bone.name.clone(), index);
        self.bones.push(bone);
        Ok(index)
    }

    /// 便捷方法：按父骨骼名称添加
    pub fn add(
        &mut self,
        name: &str,
        parent: Option<&str>,
        rest_position: Vec3,
        flags: BoneFlags,
    ) -> Result<usize> {
        let parent = match parent {
            Some(parent_name) => Some(self.require(parent_name)?),
            None => None,
        };
        self.add_bone(BoneLink::new(name, parent, rest_position).with_flags(flags))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&BoneLink> {
        self.bones.get(index)
    }

    #[inline]
    pub fn bones(&self) -> &[BoneLink] {
        &self.bones
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoneLink> {
        self.bones.iter()
    }

    /// 按名称查找骨骼索引
    pub fn find(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn bone(&self, name: &str) -> Option<&BoneLink> {
        self.find(name).map(|i| &self.bones[i])
    }

    pub fn require(&self, name: &str) -> Result<usize> {
        self.find(name)
            .ok_or_else(|| MotionError::Skeleton(format!("Bone '{}' not found", name)))
    }

    /// 通过规范名查找
    pub fn find_humanoid(&self, names: &HumanoidMap, canonical: &str) -> Option<usize> {
        self.find(names.resolve(canonical))
    }

    /// 第一个根骨骼
    pub fn root(&self) -> Option<usize> {
        self.bones.iter().position(BoneLink::is_root)
    }

    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.bones
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_root())
            .map(|(i, _)| i)
    }

    #[inline]
    pub fn children(&self, index: usize) -> &[usize] {
        match self.bones.get(index) {
            Some(bone) => &bone.children,
            None => &[],
        }
    }

    #[inline]
    pub fn parent(&self, index: usize) -> Option<usize> {
        self.bones.get(index).and_then(|b| b.parent)
    }

    pub fn set_rest_position(&mut self, index: usize, position: Vec3) {
        if let Some(bone) = self.bones.get_mut(index) {
            bone.rest_position = position;
        }
    }

    /// `ancestor` 是否为 `index` 自身或其祖先
    pub fn is_ancestor(&self, ancestor: usize, index: usize) -> bool {
        let mut current = Some(index);
        while let Some(i) = current {
            if i == ancestor {
                return true;
            }
            current = self.parent(i);
        }
        false
    }

    /// 重新挂接父骨骼
    pub fn set_parent(&mut self, index: usize, new_parent: Option<usize>) -> Result<()> {
        if index >= self.bones.len() {
            return Err(MotionError::Skeleton(format!("Bone index {} out of range", index)));
        }
        if let Some(parent) = new_parent {
            if parent >= self.bones.len() || self.is_ancestor(index, parent) {
                return Err(MotionError::Skeleton(format!(
                    "Cannot parent '{}' under bone index {}",
                    self.bones[index].name, parent
                )));
            }
        }

        if let Some(old) = self.bones[index].parent {
            self.bones[old].children.retain(|&c| c != index);
        }
        self.bones[index].parent = new_parent;
        if let Some(parent) = new_parent {
            self.bones[parent].children.push(index);
        }
        Ok(())
    }

    /// 链式偏移求和
    ///
    /// 从 `to` 沿父链向上累加静止偏移，直到（并包含）`from`；`from` 为 None 时累加到根。
    pub fn chain_offset(&self, from: Option<usize>, to: usize) -> Vec3 {
        let mut sum = Vec3::ZERO;
        let mut current = Some(to);
        while let Some(i) = current {
            sum += self.bones[i].rest_position;
            if Some(i) == from {
                break;
            }
            current = self.bones[i].parent;
        }
        sum
    }

    /// 父骨骼先于子骨骼的遍历顺序
    pub fn evaluation_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.bones.len());
        let mut stack: Vec<usize> = self.roots().collect();
        stack.reverse();
        while let Some(i) = stack.pop() {
            order.push(i);
            stack.extend(self.bones[i].children.iter().rev());
        }
        order
    }

    /// 以 `index` 为根的子树（先序）
    pub fn subtree(&self, index: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            out.push(i);
            stack.extend(self.children(i).iter().rev());
        }
        out
    }
}

/// 骨骼集合别名
pub type Skeleton = BoneSet;
