//! 动画轨道
//!
//! 存储单个骨骼属性或表情的所有关键帧，并提供查找和插值功能

use glam::{Quat, Vec3};

use crate::RetargetWarning;

use super::keyframe::{Interpolation, Keyframe, KeyframeValue};

/// 动画轨道 trait
pub trait MotionTrack {
    type Value;

    /// 求值指定时间
    fn sample(&self, time: f32) -> Self::Value;

    /// 查找最近的前后关键帧索引
    fn search_closest(&self, time: f32) -> (Option<usize>, Option<usize>);

    /// 获取轨道长度
    fn len(&self) -> usize;

    /// 是否为空
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 最后一帧的时间
    fn duration(&self) -> f32;
}

/// 关键帧轨道（按时间升序，时间唯一）
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeTrack<T> {
    keyframes: Vec<Keyframe<T>>,
    interpolation: Interpolation,
    /// 贝塞尔吸附阈值（秒）
    snap_seconds: f32,
}

impl<T: KeyframeValue> KeyframeTrack<T> {
    pub fn new(interpolation: Interpolation) -> Self {
        Self {
            keyframes: Vec::new(),
            interpolation,
            snap_seconds: 0.0,
        }
    }

    /// 设置贝塞尔吸附阈值
    pub fn with_snap(mut self, snap_seconds: f32) -> Self {
        self.snap_seconds = snap_seconds;
        self
    }

    /// 由无序关键帧构建
    ///
    /// 稳定排序后合并同一时刻的关键帧，后写入者生效，每次合并记录一条警告。
    pub fn from_keyframes(
        name: &str,
        mut keyframes: Vec<Keyframe<T>>,
        interpolation: Interpolation,
        warnings: &mut Vec<RetargetWarning>,
    ) -> Self {
        keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));

        let mut merged: Vec<Keyframe<T>> = Vec::with_capacity(keyframes.len());
        for key in keyframes {
            match merged.last_mut() {
                Some(last) if last.time == key.time => {
                    warnings.push(
                        RetargetWarning::DuplicateKeyframe {
                            track: name.to_string(),
                            time: key.time,
                        }
                        .logged(),
                    );
                    *last = key;
                }
                _ => merged.push(key),
            }
        }

        Self {
            keyframes: merged,
            interpolation,
            snap_seconds: 0.0,
        }
    }

    /// 插入关键帧，同一时刻已有关键帧时替换并返回旧值
    pub fn insert(&mut self, keyframe: Keyframe<T>) -> Option<Keyframe<T>> {
        match self
            .keyframes
            .binary_search_by(|k| k.time.total_cmp(&keyframe.time))
        {
            Ok(index) => Some(std::mem::replace(&mut self.keyframes[index], keyframe)),
            Err(index) => {
                self.keyframes.insert(index, keyframe);
                None
            }
        }
    }

    #[inline]
    pub fn keyframes(&self) -> &[Keyframe<T>] {
        &self.keyframes
    }

    #[inline]
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn times(&self) -> Vec<f32> {
        self.keyframes.iter().map(|k| k.time).collect()
    }

    pub fn values(&self) -> Vec<T> {
        self.keyframes.iter().map(|k| k.value).collect()
    }

    pub fn first_value(&self) -> Option<T> {
        self.keyframes.first().map(|k| k.value)
    }

    /// 对所有值应用变换
    pub fn map_values(&mut self, mut f: impl FnMut(T) -> T) {
        for key in &mut self.keyframes {
            key.value = f(key.value);
        }
    }

    /// 删除与前后帧都相同的中间关键帧
    pub fn optimize(&mut self) {
        const EPSILON: f32 = 1e-6;
        let len = self.keyframes.len();
        if len <= 2 {
            return;
        }

        let mut kept: Vec<Keyframe<T>> = Vec::with_capacity(len);
        for i in 0..len {
            let key = self.keyframes[i];
            let redundant = i > 0
                && i + 1 < len
                && kept.last().is_some_and(|prev| prev.value.approx_eq(&key.value, EPSILON))
                && self.keyframes[i + 1].value.approx_eq(&key.value, EPSILON);
            if !redundant {
                kept.push(key);
            }
        }
        self.keyframes = kept;
    }

    /// 只有一帧且为中性值（或为空）的轨道视为退化
    pub fn is_degenerate(&self) -> bool {
        match self.keyframes.as_slice() {
            [] => true,
            [only] => only.value.approx_eq(&T::neutral(), 1e-6),
            _ => false,
        }
    }

    fn interpolate(&self, k0: &Keyframe<T>, k1: &Keyframe<T>, time: f32) -> T {
        match self.interpolation {
            Interpolation::Step => k0.value,
            Interpolation::Linear => {
                let span = k1.time - k0.time;
                let w = if span > 0.0 { (time - k0.time) / span } else { 0.0 };
                T::blend(&k0.value, &k1.value, [w; 3])
            }
            Interpolation::Bezier => {
                // 曲线取自后一帧
                let mut weights = [0.0; 3];
                for (i, weight) in weights.iter_mut().enumerate().take(T::CURVES) {
                    *weight = k1.curves[i].weight(k0.time, k1.time, time, self.snap_seconds);
                }
                if T::CURVES == 1 {
                    weights = [weights[0]; 3];
                }
                T::blend(&k0.value, &k1.value, weights)
            }
        }
    }
}

impl KeyframeTrack<Vec3> {
    /// 所有位置乘以统一比例
    pub fn scale(&mut self, factor: f32) {
        self.map_values(|v| v * factor);
    }
}

impl<T: KeyframeValue> MotionTrack for KeyframeTrack<T> {
    type Value = T;

    fn sample(&self, time: f32) -> T {
        match self.search_closest(time) {
            (Some(i0), Some(i1)) => self.interpolate(&self.keyframes[i0], &self.keyframes[i1], time),
            (Some(i), None) | (None, Some(i)) => self.keyframes[i].value,
            (None, None) => T::neutral(),
        }
    }

    fn search_closest(&self, time: f32) -> (Option<usize>, Option<usize>) {
        let next = self.keyframes.partition_point(|k| k.time <= time);
        let prev = next.checked_sub(1);
        let next = (next < self.keyframes.len()).then_some(next);
        (prev, next)
    }

    #[inline]
    fn len(&self) -> usize {
        self.keyframes.len()
    }

    fn duration(&self) -> f32 {
        self.keyframes.last().map_or(0.0, |k| k.time)
    }
}

/// 轨道属性
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackProperty {
    Position,
    Rotation,
    /// 表情权重
    Weight,
    /// 相机视角
    Fov,
}

impl TrackProperty {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Rotation => "quaternion",
            Self::Weight => "weight",
            Self::Fov => "fov",
        }
    }
}

/// 轨道数据
#[derive(Debug, Clone, PartialEq)]
pub enum TrackData {
    Vector(KeyframeTrack<Vec3>),
    Rotation(KeyframeTrack<Quat>),
    Scalar(KeyframeTrack<f32>),
}

/// 采样结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackValue {
    Vector(Vec3),
    Rotation(Quat),
    Scalar(f32),
}

/// 命名动画轨道，名称形如 `Hips.quaternion`
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationTrack {
    /// 目标骨骼（或表情、相机）名称
    pub target: String,
    pub property: TrackProperty,
    pub data: TrackData,
}

impl AnimationTrack {
    pub fn position(target: impl Into<String>, track: KeyframeTrack<Vec3>) -> Self {
        Self {
            target: target.into(),
            property: TrackProperty::Position,
            data: TrackData::Vector(track),
        }
    }

    pub fn rotation(target: impl Into<String>, track: KeyframeTrack<Quat>) -> Self {
        Self {
            target: target.into(),
            property: TrackProperty::Rotation,
            data: TrackData::Rotation(track),
        }
    }

    pub fn weight(target: impl Into<String>, track: KeyframeTrack<f32>) -> Self {
        Self {
            target: target.into(),
            property: TrackProperty::Weight,
            data: TrackData::Scalar(track),
        }
    }

    pub fn fov(target: impl Into<String>, track: KeyframeTrack<f32>) -> Self {
        Self {
            target: target.into(),
            property: TrackProperty::Fov,
            data: TrackData::Scalar(track),
        }
    }

    /// 轨道名称
    pub fn name(&self) -> String {
        format!("{}.{}", self.target, self.property.suffix())
    }

    /// 名称是否匹配（避免分配）
    pub fn is_named(&self, name: &str) -> bool {
        name.strip_prefix(self.target.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|suffix| suffix == self.property.suffix())
    }

    pub fn as_vector(&self) -> Option<&KeyframeTrack<Vec3>> {
        match &self.data {
            TrackData::Vector(track) => Some(track),
            _ => None,
        }
    }

    pub fn as_rotation(&self) -> Option<&KeyframeTrack<Quat>> {
        match &self.data {
            TrackData::Rotation(track) => Some(track),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&KeyframeTrack<f32>> {
        match &self.data {
            TrackData::Scalar(track) => Some(track),
            _ => None,
        }
    }

    pub fn as_vector_mut(&mut self) -> Option<&mut KeyframeTrack<Vec3>> {
        match &mut self.data {
            TrackData::Vector(track) => Some(track),
            _ => None,
        }
    }

    pub fn sample(&self, time: f32) -> TrackValue {
        match &self.data {
            TrackData::Vector(track) => TrackValue::Vector(track.sample(time)),
            TrackData::Rotation(track) => TrackValue::Rotation(track.sample(time)),
            TrackData::Scalar(track) => TrackValue::Scalar(track.sample(time)),
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            TrackData::Vector(track) => track.len(),
            TrackData::Rotation(track) => track.len(),
            TrackData::Scalar(track) => track.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration(&self) -> f32 {
        match &self.data {
            TrackData::Vector(track) => track.duration(),
            TrackData::Rotation(track) => track.duration(),
            TrackData::Scalar(track) => track.duration(),
        }
    }

    pub fn is_degenerate(&self) -> bool {
        match &self.data {
            TrackData::Vector(track) => track.is_degenerate(),
            TrackData::Rotation(track) => track.is_degenerate(),
            TrackData::Scalar(track) => track.is_degenerate(),
        }
    }

    pub fn optimize(&mut self) {
        match &mut self.data {
            TrackData::Vector(track) => track.optimize(),
            TrackData::Rotation(track) => track.optimize(),
            TrackData::Scalar(track) => track.optimize(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::BezierCurve;

    fn linear(keys: &[(f32, f32)]) -> KeyframeTrack<f32> {
        let mut track = KeyframeTrack::new(Interpolation::Linear);
        for &(t, v) in keys {
            track.insert(Keyframe::new(t, v));
        }
        track
    }

    #[test]
    fn test_sample_clamps_outside_range() {
        let track = linear(&[(1.0, 2.0), (2.0, 4.0)]);
        assert_eq!(track.sample(0.0), 2.0);
        assert_eq!(track.sample(5.0), 4.0);
        assert!((track.sample(1.5) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_track_is_neutral() {
        let track: KeyframeTrack<Quat> = KeyframeTrack::new(Interpolation::Linear);
        assert_eq!(track.sample(1.0), Quat::IDENTITY);
        assert!(track.is_degenerate());
    }

    #[test]
    fn test_duplicate_times_last_write_wins() {
        let mut warnings = Vec::new();
        let track = KeyframeTrack::from_keyframes(
            "Morph.weight",
            vec![Keyframe::new(1.0, 0.2), Keyframe::new(0.0, 0.0), Keyframe::new(1.0, 0.7)],
            Interpolation::Linear,
            &mut warnings,
        );
        assert_eq!(track.len(), 2);
        assert_eq!(track.values(), vec![0.0, 0.7]);
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], RetargetWarning::DuplicateKeyframe { .. }));
    }

    #[test]
    fn test_step_interpolation() {
        let mut track = KeyframeTrack::new(Interpolation::Step);
        track.insert(Keyframe::new(0.0, 30.0_f32));
        track.insert(Keyframe::new(1.0, 45.0_f32));
        assert_eq!(track.sample(0.99), 30.0);
        assert_eq!(track.sample(1.0), 45.0);
    }

    #[test]
    fn test_bezier_uses_next_key_curve() {
        let ease_in = BezierCurve::new(0.5, 1.0, 0.0, 1.0);
        let mut track = KeyframeTrack::new(Interpolation::Bezier).with_snap(0.05);
        track.insert(Keyframe::with_curve(0.0, 0.0_f32, BezierCurve::LINEAR));
        track.insert(Keyframe::with_curve(1.0, 1.0_f32, ease_in));
        assert!(track.sample(0.5) < 0.5);
    }

    #[test]
    fn test_bezier_snap_near_duplicate() {
        let mut track = KeyframeTrack::new(Interpolation::Bezier).with_snap(0.05);
        track.insert(Keyframe::new(0.0, Vec3::ZERO));
        track.insert(Keyframe::new(0.03, Vec3::ONE));
        assert_eq!(track.sample(0.02), Vec3::ZERO);
    }

    #[test]
    fn test_optimize_drops_flat_interior() {
        let mut track = linear(&[(0.0, 1.0), (1.0, 1.0), (2.0, 1.0), (3.0, 2.0)]);
        track.optimize();
        assert_eq!(track.times(), vec![0.0, 2.0, 3.0]);
    }

    #[test]
    fn test_track_name() {
        let track = AnimationTrack::weight("Blink", linear(&[(0.0, 1.0)]));
        assert_eq!(track.name(), "Blink.weight");
        assert!(track.is_named("Blink.weight"));
        assert!(!track.is_named("Blink.position"));
    }
}
