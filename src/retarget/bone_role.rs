//! 骨骼角色表
//!
//! 按规范名称决定平移轨道如何处理。新增源骨骼约定时只需增加表项。

use crate::skeleton::CENTER;

/// 平移轨道的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationRule {
    /// 丢弃（只保留旋转）
    Ignore,
    /// 按髋部高度比例缩放后写入同名骨骼
    Scaled,
    /// 缩放后改写到承载骨骼；源动作自身驱动承载骨骼时丢弃
    Carried(&'static str),
}

/// 骨骼角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoneRole {
    pub canonical: &'static str,
    pub translation: TranslationRule,
}

const fn scaled(canonical: &'static str) -> BoneRole {
    BoneRole {
        canonical,
        translation: TranslationRule::Scaled,
    }
}

static ROLES: &[BoneRole] = &[
    scaled("Root"),
    scaled(CENTER),
    // 旋转留在髋部，平移由 Center 承载
    BoneRole {
        canonical: "Hips",
        translation: TranslationRule::Carried(CENTER),
    },
    // IK 目标骨骼
    scaled("LeftFootIKParent"),
    scaled("LeftFootIK"),
    scaled("LeftToeIK"),
    scaled("RightFootIKParent"),
    scaled("RightFootIK"),
    scaled("RightToeIK"),
];

/// 查找角色，不在表中的骨骼为普通骨骼
pub fn role_of(canonical: &str) -> Option<&'static BoneRole> {
    ROLES.iter().find(|r| r.canonical == canonical)
}

/// 平移处理方式，普通骨骼忽略平移
pub fn translation_rule(canonical: &str) -> TranslationRule {
    role_of(canonical).map_or(TranslationRule::Ignore, |r| r.translation)
}
