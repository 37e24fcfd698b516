//! 骨骼节点
//!
//! BoneLink 是骨骼树中的单个节点，只保存静态数据（名称、父子关系、静止姿态）。
//! 每帧变化的局部变换与世界矩阵保存在 `Pose` 中。

use glam::{Quat, Vec3};
use bitflags::bitflags;

// ============================================================================
// 骨骼标志
// ============================================================================

bitflags! {
    /// 骨骼标志位
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BoneFlags: u32 {
        /// BVH 末端节点（无通道，不生成轨道）
        const END_SITE = 1 << 0;
        /// 运行时合成的骨骼（Center、Groove、Waist 等）
        const SYNTHETIC = 1 << 1;
        /// IK 辅助骨骼
        const IK = 1 << 2;
        /// 扭转骨骼
        const TWIST = 1 << 3;
    }
}

// ============================================================================
// 通道
// ============================================================================

/// BVH 动画通道
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    XPosition,
    YPosition,
    ZPosition,
    XRotation,
    YRotation,
    ZRotation,
}

impl Channel {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "Xposition" => Some(Self::XPosition),
            "Yposition" => Some(Self::YPosition),
            "Zposition" => Some(Self::ZPosition),
            "Xrotation" => Some(Self::XRotation),
            "Yrotation" => Some(Self::YRotation),
            "Zrotation" => Some(Self::ZRotation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::XPosition => "Xposition",
            Self::YPosition => "Yposition",
            Self::ZPosition => "Zposition",
            Self::XRotation => "Xrotation",
            Self::YRotation => "Yrotation",
            Self::ZRotation => "Zrotation",
        }
    }

    /// 旋转通道的轴
    pub fn rotation_axis(&self) -> Option<Vec3> {
        match self {
            Self::XRotation => Some(Vec3::X),
            Self::YRotation => Some(Vec3::Y),
            Self::ZRotation => Some(Vec3::Z),
            _ => None,
        }
    }

    pub fn is_position(&self) -> bool {
        matches!(self, Self::XPosition | Self::YPosition | Self::ZPosition)
    }
}

// ============================================================================
// 骨骼节点
// ============================================================================

/// 骨骼节点
#[derive(Clone, Debug, PartialEq)]
pub struct BoneLink {
    /// 骨骼名称
    pub name: String,

    /// 父骨骼索引（None 表示根骨骼）
    pub parent: Option<usize>,

    /// 子骨骼索引
    pub children: Vec<usize>,

    /// 相对于父骨骼的静止偏移
    pub rest_position: Vec3,

    /// 静止旋转
    pub rest_rotation: Quat,

    /// BVH 通道（按声明顺序）
    pub channels: Vec<Channel>,

    /// 骨骼标志
    pub flags: BoneFlags,
}

impl BoneLink {
    pub fn new(name: impl Into<String>, parent: Option<usize>, rest_position: Vec3) -> Self {
        Self {
            name: name.into(),
            parent,
            children: Vec::new(),
            rest_position,
            rest_rotation: Quat::IDENTITY,
            channels: Vec::new(),
            flags: BoneFlags::empty(),
        }
    }

    pub fn with_flags(mut self, flags: BoneFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_channels(mut self, channels: Vec<Channel>) -> Self {
        self.channels = channels;
        self
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    pub fn is_end_site(&self) -> bool {
        self.flags.contains(BoneFlags::END_SITE)
    }

    /// 是否携带动画通道
    #[inline]
    pub fn has_channels(&self) -> bool {
        !self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse() {
        for token in ["Xposition", "Yposition", "Zposition", "Xrotation", "Yrotation", "Zrotation"] {
            let channel = Channel::parse(token).unwrap();
            assert_eq!(channel.as_str(), token);
        }
        assert!(Channel::parse("Wrotation").is_none());
        assert_eq!(Channel::YRotation.rotation_axis(), Some(Vec3::Y));
        assert!(Channel::XPosition.rotation_axis().is_none());
    }
}
