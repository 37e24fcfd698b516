//! 动画混合播放
//!
//! 每个片段对应一个动作，动作有自己的时间、循环方式与权重。
//! 采样时按权重累加到姿态，权重不足 1 的部分由静止姿态补齐。

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Quat, Vec3};

use crate::skeleton::{BoneSet, Pose};

use super::clip::AnimationClip;
use super::motion_track::{TrackProperty, TrackValue};

/// 循环方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// 循环播放
    #[default]
    Repeat,
    /// 播放一次后停在最后一帧
    Once,
}

/// 权重渐变
#[derive(Clone, Copy, Debug, PartialEq)]
struct Fade {
    from: f32,
    to: f32,
    elapsed: f32,
    duration: f32,
}

impl Fade {
    fn weight(&self) -> f32 {
        if self.duration <= 0.0 {
            return self.to;
        }
        let t = (self.elapsed / self.duration).clamp(0.0, 1.0);
        self.from + (self.to - self.from) * t
    }

    fn is_done(&self) -> bool {
        self.elapsed >= self.duration
    }
}

/// 轨道绑定
#[derive(Clone, Debug, PartialEq)]
enum Binding {
    Bone(usize),
    Morph,
    Unbound,
}

/// 动作：片段的一次播放实例
#[derive(Clone, Debug)]
pub struct AnimationAction {
    clip: Arc<AnimationClip>,
    bindings: Vec<Binding>,
    duration: f32,
    pub time: f32,
    pub loop_mode: LoopMode,
    pub paused: bool,
    running: bool,
    finished: bool,
    weight: f32,
    fade: Option<Fade>,
}

impl AnimationAction {
    fn new(clip: Arc<AnimationClip>, skeleton: &BoneSet, loop_mode: LoopMode) -> Self {
        let bindings = clip
            .tracks
            .iter()
            .map(|track| match track.property {
                TrackProperty::Position | TrackProperty::Rotation => {
                    skeleton.find(&track.target).map_or(Binding::Unbound, Binding::Bone)
                }
                TrackProperty::Weight => Binding::Morph,
                TrackProperty::Fov => Binding::Unbound,
            })
            .collect::<Vec<_>>();

        let unbound = bindings.iter().filter(|b| **b == Binding::Unbound).count();
        if unbound > 0 {
            log::debug!("Clip '{}': {} tracks have no target bone", clip.name, unbound);
        }

        Self {
            duration: clip.duration(),
            clip,
            bindings,
            time: 0.0,
            loop_mode,
            paused: false,
            running: false,
            finished: false,
            weight: 1.0,
            fade: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.clip.name
    }

    pub fn clip(&self) -> &AnimationClip {
        &self.clip
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 当前有效权重
    pub fn effective_weight(&self) -> f32 {
        if !self.running {
            return 0.0;
        }
        self.fade.map_or(self.weight, |f| f.weight())
    }

    pub fn reset(&mut self) {
        self.time = 0.0;
        self.finished = false;
    }

    /// 沿用被替换动作的播放状态，时间截断到新片段时长
    fn inherit(&mut self, previous: &AnimationAction) {
        self.running = previous.running;
        self.paused = previous.paused;
        self.weight = previous.weight;
        self.fade = previous.fade;
        self.time = previous.time.clamp(0.0, self.duration.max(0.0));
        self.finished = previous.finished && self.loop_mode == LoopMode::Once && self.time >= self.duration;
    }

    fn start(&mut self) {
        self.running = true;
        self.paused = false;
    }

    fn stop(&mut self) {
        self.running = false;
        self.fade = None;
        self.weight = 1.0;
    }

    fn fade_to(&mut self, to: f32, duration: f32) {
        let from = self.effective_weight();
        self.fade = Some(Fade {
            from,
            to,
            elapsed: 0.0,
            duration,
        });
    }

    /// 推进时间，返回本次是否播放结束
    fn advance(&mut self, dt: f32) -> bool {
        if !self.running {
            return false;
        }

        if let Some(fade) = &mut self.fade {
            fade.elapsed += dt;
            if fade.is_done() {
                self.weight = fade.to;
                self.fade = None;
                if self.weight <= 0.0 {
                    self.stop();
                    return false;
                }
            }
        }

        if self.paused || self.finished {
            return false;
        }

        self.time += dt;
        if self.duration <= 0.0 {
            self.time = 0.0;
            return false;
        }
        match self.loop_mode {
            LoopMode::Repeat => {
                self.time = self.time.rem_euclid(self.duration);
                false
            }
            LoopMode::Once => {
                if self.time >= self.duration {
                    self.time = self.duration;
                    self.finished = true;
                    true
                } else {
                    false
                }
            }
        }
    }
}

// ============================================================================
// 混合器
// ============================================================================

/// 单个骨骼属性的累加器
#[derive(Clone, Copy, Debug, Default)]
struct Accumulator<T> {
    value: T,
    weight: f32,
}

/// 动画混合器
#[derive(Clone, Debug, Default)]
pub struct AnimationMixer {
    actions: Vec<AnimationAction>,
    current: Option<usize>,
}

impl AnimationMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加片段，已存在同名片段时替换并沿用其播放状态
    pub fn add_clip(&mut self, clip: Arc<AnimationClip>, skeleton: &BoneSet, loop_mode: LoopMode) -> usize {
        let mut action = AnimationAction::new(clip, skeleton, loop_mode);
        match self.index_of(action.name()) {
            Some(index) => {
                action.inherit(&self.actions[index]);
                self.actions[index] = action;
                index
            }
            None => {
                self.actions.push(action);
                self.actions.len() - 1
            }
        }
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.actions.iter().position(|a| a.name() == name)
    }

    pub fn action(&self, name: &str) -> Option<&AnimationAction> {
        self.index_of(name).map(|i| &self.actions[i])
    }

    pub fn action_mut(&mut self, name: &str) -> Option<&mut AnimationAction> {
        let index = self.index_of(name)?;
        Some(&mut self.actions[index])
    }

    pub fn actions(&self) -> &[AnimationAction] {
        &self.actions
    }

    /// 当前播放的动作
    pub fn current(&self) -> Option<&AnimationAction> {
        self.current.map(|i| &self.actions[i])
    }

    /// 播放动作；已有其他动作在播放时交叉淡化
    pub fn play(&mut self, name: &str, crossfade: f32) -> bool {
        let Some(index) = self.index_of(name) else {
            log::warn!("Animation '{}' not loaded", name);
            return false;
        };

        match self.current {
            Some(current) if current == index => {
                self.actions[index].paused = false;
            }
            Some(current) => {
                self.actions[current].fade_to(0.0, crossfade);
                let next = &mut self.actions[index];
                next.reset();
                next.weight = 1.0;
                next.start();
                next.fade_to(1.0, crossfade);
                // 从 0 开始淡入
                if let Some(fade) = &mut next.fade {
                    fade.from = 0.0;
                }
            }
            None => {
                let next = &mut self.actions[index];
                next.reset();
                next.weight = 1.0;
                next.fade = None;
                next.start();
            }
        }
        self.current = Some(index);
        true
    }

    /// 暂停动作（保持当前帧）
    pub fn pause(&mut self, name: &str) -> bool {
        match self.action_mut(name) {
            Some(action) => {
                action.paused = true;
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        for action in &mut self.actions {
            action.stop();
        }
        self.current = None;
    }

    /// 推进所有动作，返回本次播放结束的动作名称
    pub fn update(&mut self, dt: f32) -> Vec<String> {
        let mut finished = Vec::new();
        for action in &mut self.actions {
            if action.advance(dt) {
                finished.push(action.name().to_string());
            }
        }
        finished
    }

    /// 采样所有动作并写入姿态（调用前姿态应为静止姿态）
    pub fn sample_into(&self, pose: &mut Pose) {
        let bones = pose.len();
        let mut positions: Vec<Accumulator<Vec3>> = vec![Accumulator::default(); bones];
        let mut rotations: Vec<Accumulator<Quat>> = vec![
            Accumulator {
                value: Quat::IDENTITY,
                weight: 0.0
            };
            bones
        ];
        let mut morphs: HashMap<&str, Accumulator<f32>> = HashMap::new();

        for action in &self.actions {
            let weight = action.effective_weight();
            if weight <= 0.0 {
                continue;
            }

            for (track, binding) in action.clip.tracks.iter().zip(&action.bindings) {
                match (binding, track.sample(action.time)) {
                    (Binding::Bone(bone), TrackValue::Vector(v)) if *bone < bones => {
                        let acc = &mut positions[*bone];
                        acc.value += v * weight;
                        acc.weight += weight;
                    }
                    (Binding::Bone(bone), TrackValue::Rotation(q)) if *bone < bones => {
                        let acc = &mut rotations[*bone];
                        acc.weight += weight;
                        acc.value = if acc.weight == weight {
                            q
                        } else {
                            acc.value.slerp(q, weight / acc.weight)
                        };
                    }
                    (Binding::Morph, TrackValue::Scalar(w)) => {
                        let acc = morphs.entry(track.target.as_str()).or_default();
                        acc.value += w * weight;
                        acc.weight += weight;
                    }
                    _ => {}
                }
            }
        }

        for (bone, acc) in positions.iter().enumerate() {
            if acc.weight <= 0.0 {
                continue;
            }
            pose.translations[bone] = if acc.weight < 1.0 {
                acc.value + pose.translations[bone] * (1.0 - acc.weight)
            } else {
                acc.value / acc.weight
            };
        }
        for (bone, acc) in rotations.iter().enumerate() {
            if acc.weight <= 0.0 {
                continue;
            }
            pose.rotations[bone] = if acc.weight < 1.0 {
                pose.rotations[bone].slerp(acc.value, acc.weight)
            } else {
                acc.value
            };
        }
        for (name, acc) in morphs {
            let weight = if acc.weight < 1.0 { acc.value } else { acc.value / acc.weight };
            pose.set_morph_weight(name, weight);
        }
    }
}
