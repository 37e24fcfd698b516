//! 关键帧定义

use glam::{Quat, Vec3};

use super::bezier_curve::BezierCurve;

/// 插值方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// 阶跃（保持前一帧）
    Step,
    /// 线性 / 球面线性
    #[default]
    Linear,
    /// 每帧携带贝塞尔曲线
    Bezier,
}

/// 关键帧值类型
pub trait KeyframeValue: Copy + std::fmt::Debug + PartialEq {
    /// 使用的曲线数量（向量每轴一条，其余一条）
    const CURVES: usize;

    /// 按权重插值，`weights` 按曲线顺序排列
    fn blend(a: &Self, b: &Self, weights: [f32; 3]) -> Self;

    /// 中性值（零位移、单位旋转、零权重）
    fn neutral() -> Self;

    /// 近似相等
    fn approx_eq(&self, other: &Self, epsilon: f32) -> bool;
}

impl KeyframeValue for Vec3 {
    const CURVES: usize = 3;

    #[inline]
    fn blend(a: &Self, b: &Self, weights: [f32; 3]) -> Self {
        *a + (*b - *a) * Vec3::from_array(weights)
    }

    fn neutral() -> Self {
        Vec3::ZERO
    }

    fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.abs_diff_eq(*other, epsilon)
    }
}

impl KeyframeValue for Quat {
    const CURVES: usize = 1;

    #[inline]
    fn blend(a: &Self, b: &Self, weights: [f32; 3]) -> Self {
        a.slerp(*b, weights[0])
    }

    fn neutral() -> Self {
        Quat::IDENTITY
    }

    fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        // q 与 -q 表示同一旋转
        self.abs_diff_eq(*other, epsilon) || self.abs_diff_eq(-*other, epsilon)
    }
}

impl KeyframeValue for f32 {
    const CURVES: usize = 1;

    #[inline]
    fn blend(a: &Self, b: &Self, weights: [f32; 3]) -> Self {
        a + (b - a) * weights[0]
    }

    fn neutral() -> Self {
        0.0
    }

    fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        (self - other).abs() <= epsilon
    }
}

/// 关键帧
///
/// `curves` 描述从前一帧到本帧的缓动，只在 `Interpolation::Bezier` 下使用。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keyframe<T> {
    /// 时间（秒）
    pub time: f32,
    pub value: T,
    pub curves: [BezierCurve; 3],
}

impl<T: KeyframeValue> Keyframe<T> {
    /// 线性关键帧
    pub fn new(time: f32, value: T) -> Self {
        Self {
            time,
            value,
            curves: [BezierCurve::LINEAR; 3],
        }
    }

    /// 单曲线关键帧（旋转、标量）
    pub fn with_curve(time: f32, value: T, curve: BezierCurve) -> Self {
        Self {
            time,
            value,
            curves: [curve; 3],
        }
    }

    /// 每轴曲线关键帧（位置）
    pub fn with_curves(time: f32, value: T, curves: [BezierCurve; 3]) -> Self {
        Self { time, value, curves }
    }
}

/// 骨骼关键帧（位置 + 旋转）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneKeyframe {
    pub time: f32,
    pub position: Vec3,
    pub rotation: Quat,
    /// x, y, z, 旋转
    pub curves: [BezierCurve; 4],
}

impl BoneKeyframe {
    pub fn position_key(&self) -> Keyframe<Vec3> {
        Keyframe::with_curves(self.time, self.position, [self.curves[0], self.curves[1], self.curves[2]])
    }

    pub fn rotation_key(&self) -> Keyframe<Quat> {
        Keyframe::with_curve(self.time, self.rotation, self.curves[3])
    }
}
