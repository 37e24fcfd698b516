//! 姿态
//!
//! 每帧由轨道采样写入，IK 求解器随后修改，渲染端读取。
//! 同一时刻只有当前帧的更新流程持有可变引用。

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};

use super::bone_set::BoneSet;

/// 骨骼姿态缓冲区
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    /// 局部平移（相对父骨骼）
    pub translations: Vec<Vec3>,
    /// 局部旋转
    pub rotations: Vec<Quat>,
    /// 世界矩阵
    world: Vec<Mat4>,
    /// 表情权重
    pub morph_weights: HashMap<String, f32>,
    /// 父先子后的遍历顺序
    order: Vec<usize>,
}

impl Pose {
    /// 静止姿态
    pub fn rest(skeleton: &BoneSet) -> Self {
        let mut pose = Self {
            translations: skeleton.iter().map(|b| b.rest_position).collect(),
            rotations: skeleton.iter().map(|b| b.rest_rotation).collect(),
            world: vec![Mat4::IDENTITY; skeleton.len()],
            morph_weights: HashMap::new(),
            order: skeleton.evaluation_order(),
        };
        pose.update_world(skeleton);
        pose
    }

    /// 恢复到静止姿态（表情权重保留）
    pub fn reset(&mut self, skeleton: &BoneSet) {
        if self.translations.len() != skeleton.len() {
            let morphs = std::mem::take(&mut self.morph_weights);
            *self = Self::rest(skeleton);
            self.morph_weights = morphs;
            return;
        }
        for (i, bone) in skeleton.iter().enumerate() {
            self.translations[i] = bone.rest_position;
            self.rotations[i] = bone.rest_rotation;
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.translations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.translations.is_empty()
    }

    /// 局部矩阵
    #[inline]
    pub fn local_matrix(&self, index: usize) -> Mat4 {
        Mat4::from_rotation_translation(self.rotations[index], self.translations[index])
    }

    #[inline]
    pub fn world_matrix(&self, index: usize) -> Mat4 {
        self.world[index]
    }

    #[inline]
    pub fn world_position(&self, index: usize) -> Vec3 {
        self.world[index].w_axis.truncate()
    }

    /// 世界旋转
    pub fn world_rotation(&self, index: usize) -> Quat {
        let (_, rotation, _) = self.world[index].to_scale_rotation_translation();
        rotation
    }

    fn compute_world(&mut self, skeleton: &BoneSet, index: usize) {
        let local = self.local_matrix(index);
        self.world[index] = match skeleton.parent(index) {
            Some(parent) => self.world[parent] * local,
            None => local,
        };
    }

    /// 重新计算全部世界矩阵
    pub fn update_world(&mut self, skeleton: &BoneSet) {
        for k in 0..self.order.len() {
            let index = self.order[k];
            self.compute_world(skeleton, index);
        }
    }

    /// 重新计算某骨骼及其全部子孙的世界矩阵
    pub fn update_subtree(&mut self, skeleton: &BoneSet, index: usize) {
        self.compute_world(skeleton, index);
        for &child in skeleton.children(index) {
            self.update_subtree(skeleton, child);
        }
    }

    pub fn morph_weight(&self, name: &str) -> f32 {
        self.morph_weights.get(name).copied().unwrap_or(0.0)
    }

    pub fn set_morph_weight(&mut self, name: &str, weight: f32) {
        match self.morph_weights.get_mut(name) {
            Some(w) => *w = weight,
            None => {
                self.morph_weights.insert(name.to_string(), weight);
            }
        }
    }
}
