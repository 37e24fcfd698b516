//! 表情淡入淡出
//!
//! 状态机：OFF -> IN -> ON -> OUT -> OFF。
//! IN 使用 smoothstep 缓动，OUT 线性衰减；ON 可设置持续时间，到时自动淡出。

use crate::skeleton::Pose;

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MorphState {
    #[default]
    Off,
    In,
    On,
    Out,
}

/// 单个表情的播放器
#[derive(Debug, Clone)]
pub struct MorphPlayer {
    name: String,
    state: MorphState,
    /// 过渡时长（秒）
    transition: f32,
    /// ON 状态剩余时间，None 表示一直保持到 `end`
    duration: Option<f32>,
    started: bool,
    time: f32,
    target: f32,
    weight: f32,
}

#[inline]
fn smoothstep(x: f32) -> f32 {
    x * x * (3.0 - 2.0 * x)
}

#[inline]
fn lerp(from: f32, to: f32, amount: f32) -> f32 {
    amount * to + (1.0 - amount) * from
}

impl MorphPlayer {
    pub fn new(name: impl Into<String>, transition: f32) -> Self {
        Self {
            name: name.into(),
            state: MorphState::Off,
            transition: transition.max(0.0),
            duration: None,
            started: false,
            time: 0.0,
            target: 0.0,
            weight: 0.0,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn state(&self) -> MorphState {
        self.state
    }

    #[inline]
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// 开始淡入到 `value`，`duration` 为 ON 状态保持时间
    pub fn start(&mut self, value: f32, duration: Option<f32>) {
        self.started = true;
        self.time = 0.0;
        self.target = value.clamp(0.0, 1.0);
        self.duration = duration;
    }

    /// 请求淡出
    pub fn end(&mut self) {
        self.started = false;
        self.time = 0.0;
        self.target = 0.0;
    }

    /// 推进状态机，返回当前权重
    pub fn update(&mut self, dt: f32) -> f32 {
        match self.state {
            MorphState::Off => {
                if self.started {
                    self.state = MorphState::In;
                }
            }
            MorphState::In => {
                self.time += dt;
                if self.transition > 0.0 && self.time <= self.transition {
                    let x = self.time / self.transition;
                    self.weight = lerp(self.weight, self.target, smoothstep(x)).min(1.0);
                } else {
                    self.weight = self.target;
                    self.state = MorphState::On;
                    self.time = 0.0;
                }
            }
            MorphState::On => match self.duration.as_mut() {
                Some(remaining) => {
                    *remaining = (*remaining - dt).max(0.0);
                    if *remaining == 0.0 {
                        self.end();
                        self.state = MorphState::Out;
                    }
                }
                None => {
                    if !self.started {
                        self.state = MorphState::Out;
                    }
                }
            },
            MorphState::Out => {
                self.time += dt;
                if self.transition > 0.0 && self.time <= self.transition {
                    let x = self.time / self.transition;
                    self.weight = lerp(self.weight, self.target, x).max(0.0);
                } else {
                    self.weight = 0.0;
                    self.state = MorphState::Off;
                    self.time = 0.0;
                }
            }
        }
        self.weight
    }

    /// 推进并写入姿态
    pub fn apply(&mut self, dt: f32, pose: &mut Pose) {
        let before = self.state;
        let weight = self.update(dt);
        if before != MorphState::Off || self.state != MorphState::Off {
            pose.set_morph_weight(&self.name, weight);
        }
    }
}
